//! Control vector and outbound control channels
//!
//! The tracker pushes a [`ControlVector`] through a [`ControlChannel`] on
//! every live sample and every release frame. Channels must not block: they
//! are called while the tracker state is locked.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::protocol::{AxisMessage, Envelope};

/// Four-axis value object sent downstream
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlVector {
    pub throttle: f64,
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl ControlVector {
    pub fn is_centered(&self) -> bool {
        self.throttle == 0.0 && self.pitch == 0.0 && self.roll == 0.0 && self.yaw == 0.0
    }
}

/// Axis labelling on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisLabels {
    /// One `control/sticks` message carrying all four axes
    #[default]
    Sticks,
    /// One message per axis: `power`, `orientation`, `tilt_up_down`, `tilt_left_right`
    Legacy,
}

/// Outbound transport for control updates
pub trait ControlChannel: Send + Sync {
    fn send(&self, vector: &ControlVector);
}

/// ControlChannel that only logs updates
///
/// Useful for running the UI without a device attached.
pub struct LoggingChannel {
    name: String,
    sent: AtomicU64,
}

impl LoggingChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: AtomicU64::new(0),
        }
    }

    /// Number of updates seen so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl ControlChannel for LoggingChannel {
    fn send(&self, vector: &ControlVector) {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "🎮 [{}] '{}' → throttle={:.1} pitch={:.1} roll={:.1} yaw={:.1} [update #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            vector.throttle,
            vector.pitch,
            vector.roll,
            vector.yaw,
            n
        );
    }
}

/// ControlChannel publishing encoded frames to every connected device
///
/// Clones share the sender and the labelling scheme.
#[derive(Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<Arc<str>>,
    labels: Arc<RwLock<AxisLabels>>,
}

impl BroadcastChannel {
    pub fn new(tx: broadcast::Sender<Arc<str>>, labels: AxisLabels) -> Self {
        Self {
            tx,
            labels: Arc::new(RwLock::new(labels)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    /// Number of connected devices
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn labels(&self) -> AxisLabels {
        *self.labels.read()
    }

    pub fn set_labels(&self, labels: AxisLabels) {
        *self.labels.write() = labels;
    }

    /// Publish a non-control envelope (standby, settings, get)
    pub fn publish(&self, envelope: &Envelope) {
        match serde_json::to_string(envelope) {
            Ok(json) => self.publish_raw(json),
            Err(e) => debug!("Failed to encode envelope: {}", e),
        }
    }

    fn publish_raw(&self, json: String) {
        // No receivers just means no device is connected yet
        if self.tx.send(Arc::from(json)).is_err() {
            trace!("No device connected, dropping frame");
        }
    }
}

impl ControlChannel for BroadcastChannel {
    fn send(&self, vector: &ControlVector) {
        match self.labels() {
            AxisLabels::Sticks => self.publish(&Envelope::sticks(vector)),
            AxisLabels::Legacy => {
                for message in AxisMessage::legacy(vector) {
                    match serde_json::to_string(&message) {
                        Ok(json) => self.publish_raw(json),
                        Err(e) => debug!("Failed to encode axis message: {}", e),
                    }
                }
            }
        }
    }
}

/// Forwards every update to several channels in order
pub struct Fanout(Vec<Arc<dyn ControlChannel>>);

impl Fanout {
    pub fn new(channels: Vec<Arc<dyn ControlChannel>>) -> Self {
        Self(channels)
    }
}

impl ControlChannel for Fanout {
    fn send(&self, vector: &ControlVector) {
        for channel in &self.0 {
            channel.send(vector);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample() -> ControlVector {
        ControlVector {
            throttle: 50.0,
            pitch: -10.0,
            roll: 5.0,
            yaw: 0.0,
        }
    }

    fn parse(frame: &Arc<str>) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[test]
    fn test_sticks_labels_send_one_envelope() {
        let (tx, mut rx) = broadcast::channel(16);
        let channel = BroadcastChannel::new(tx, AxisLabels::Sticks);

        channel.send(&sample());

        let frame = rx.try_recv().unwrap();
        assert_eq!(
            parse(&frame),
            json!({
                "event": "control",
                "type": "sticks",
                "data": { "throttle": 50.0, "pitch": -10.0, "roll": 5.0, "yaw": 0.0 }
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_legacy_labels_send_one_message_per_axis() {
        let (tx, mut rx) = broadcast::channel(16);
        let channel = BroadcastChannel::new(tx, AxisLabels::Legacy);

        channel.send(&sample());

        let frames: Vec<Value> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|f| parse(&f))
            .collect();
        assert_eq!(
            frames,
            vec![
                json!({ "event": "power", "value": 50.0 }),
                json!({ "event": "orientation", "value": 0.0 }),
                json!({ "event": "tilt_up_down", "value": -10.0 }),
                json!({ "event": "tilt_left_right", "value": 5.0 }),
            ]
        );
    }

    #[test]
    fn test_label_switch_applies_to_clones() {
        let (tx, mut rx) = broadcast::channel(16);
        let channel = BroadcastChannel::new(tx, AxisLabels::Sticks);
        let clone = channel.clone();

        channel.set_labels(AxisLabels::Legacy);
        clone.send(&sample());

        assert_eq!(parse(&rx.try_recv().unwrap())["event"], json!("power"));
        assert_eq!(clone.receiver_count(), 1);
    }

    #[test]
    fn test_send_without_devices_is_harmless() {
        let (tx, rx) = broadcast::channel(16);
        drop(rx);
        let channel = BroadcastChannel::new(tx, AxisLabels::Sticks);
        channel.send(&sample());
    }

    #[test]
    fn test_fanout_reaches_every_channel() {
        let a = Arc::new(LoggingChannel::new("a"));
        let b = Arc::new(LoggingChannel::new("b"));
        let fanout = Fanout::new(vec![
            a.clone() as Arc<dyn ControlChannel>,
            b.clone() as Arc<dyn ControlChannel>,
        ]);

        fanout.send(&sample());
        fanout.send(&ControlVector::default());

        assert_eq!(a.sent(), 2);
        assert_eq!(b.sent(), 2);
    }

    #[test]
    fn test_is_centered() {
        assert!(ControlVector::default().is_centered());
        assert!(!sample().is_centered());
    }
}
