//! Input session - one browser connection driving one tracker
//!
//! Decodes inbound [`InputEvent`]s and routes them either to the session's
//! own [`DualTouchTracker`] or, for settings commands, straight to the
//! device link.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::control::{BroadcastChannel, ControlChannel, Fanout, LoggingChannel};
use crate::joystick::{DualTouchTracker, PointSample};
use crate::protocol::{Action, Envelope, InputEvent, ProtocolError};

/// Viewport assumed until the surface reports its size
pub const DEFAULT_VIEWPORT: (f64, f64) = (800.0, 600.0);

pub struct InputSession {
    id: u64,
    tracker: DualTouchTracker,
    control: Arc<dyn ControlChannel>,
    device: BroadcastChannel,
}

impl InputSession {
    pub fn new(id: u64, config: &AppConfig, device: BroadcastChannel) -> Self {
        let control: Arc<dyn ControlChannel> = if config.control.log_updates {
            let logger: Arc<dyn ControlChannel> =
                Arc::new(LoggingChannel::new(format!("session-{}", id)));
            let link: Arc<dyn ControlChannel> = Arc::new(device.clone());
            Arc::new(Fanout::new(vec![link, logger]))
        } else {
            Arc::new(device.clone())
        };

        let tracker = DualTouchTracker::new(
            config.joystick.clone(),
            DEFAULT_VIEWPORT.0,
            DEFAULT_VIEWPORT.1,
            Arc::clone(&control),
        );

        info!("Input session {} opened", id);

        Self {
            id,
            tracker,
            control,
            device,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tracker(&self) -> &DualTouchTracker {
        &self.tracker
    }

    /// Decode and apply one text frame
    pub fn handle_text(&self, text: &str) -> Result<(), ProtocolError> {
        let event = InputEvent::parse(text)?;
        self.handle(event);
        Ok(())
    }

    pub fn handle(&self, event: InputEvent) {
        match event {
            InputEvent::Viewport { width, height } => self.tracker.set_viewport(width, height),
            InputEvent::TouchStart { touches } => self.tracker.touch_start(&touches),
            InputEvent::TouchMove { touches } => self.tracker.touch_move(&touches),
            InputEvent::TouchEnd { touches } => self.tracker.touch_end(&touches),
            InputEvent::MouseDown { x, y } => self.tracker.mouse_down(PointSample::new(x, y)),
            InputEvent::MouseMove { x, y } => self.tracker.mouse_move(PointSample::new(x, y)),
            InputEvent::MouseUp => self.tracker.mouse_up(),
            InputEvent::Standby { on } => {
                info!("Session {}: standby {}", self.id, if on { "on" } else { "off" });
                self.device.publish(&Envelope::standby(on));
            }
            InputEvent::Tune { axis, pid } => {
                info!(
                    "Session {}: tune {:?} kp={} ki={} kd={}",
                    self.id, axis, pid.kp, pid.ki, pid.kd
                );
                self.device.publish(&Envelope::tune(axis, pid));
            }
            InputEvent::GetTune => self.device.publish(&Envelope::get(Action::Tune)),
            InputEvent::GetTilt => self.device.publish(&Envelope::get(Action::Tilt)),
            InputEvent::CalibrateTilt => {
                info!("Session {}: tilt calibration requested", self.id);
                self.device.publish(&Envelope::calibrate_tilt());
            }
            InputEvent::Sticks { vector } => {
                debug!("Session {}: direct stick values {:?}", self.id, vector);
                self.control.send(&vector);
            }
        }
    }

    /// Center everything; called when the surface disconnects
    pub fn close(&self) {
        self.tracker.reset();
        info!("Input session {} closed", self.id);
    }
}
