//! Wire protocol
//!
//! Inbound: JSON input events from the browser surface, tagged by `kind`.
//! Outbound: `{ "event", "type", "data" }` envelopes understood by the
//! device side, plus the legacy one-message-per-axis format.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::control::ControlVector;
use crate::joystick::PointSample;

/// Errors decoding inbound frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("expected a '{expected}' envelope, got '{got}'")]
    UnexpectedCommand { expected: Command, got: Command },
}

/// Top-level event name of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Control,
    Settings,
    Get,
    Response,
    KeepAlive,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Control => "control",
            Command::Settings => "settings",
            Command::Get => "get",
            Command::Response => "response",
            Command::KeepAlive => "keep_alive",
        };
        f.write_str(name)
    }
}

/// Envelope `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Sticks,
    Standby,
    Tune,
    Tilt,
    CalibrateTilt,
    TiltOffset,
}

/// Device-bound (or device-originated) message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: Command,
    #[serde(rename = "type")]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Envelope {
    pub fn sticks(vector: &ControlVector) -> Self {
        Self {
            event: Command::Control,
            action: Action::Sticks,
            data: json!(vector),
        }
    }

    /// Engine switch; `on` means standby is engaged
    pub fn standby(on: bool) -> Self {
        Self {
            event: Command::Control,
            action: Action::Standby,
            data: json!({ "on": on }),
        }
    }

    pub fn tune(axis: TuneAxis, pid: Pid) -> Self {
        Self {
            event: Command::Settings,
            action: Action::Tune,
            data: json!({
                "type": axis.code(),
                "kp": pid.kp,
                "ki": pid.ki,
                "kd": pid.kd,
            }),
        }
    }

    pub fn calibrate_tilt() -> Self {
        Self {
            event: Command::Settings,
            action: Action::CalibrateTilt,
            data: Value::Null,
        }
    }

    pub fn get(action: Action) -> Self {
        Self {
            event: Command::Get,
            action,
            data: Value::Null,
        }
    }

    /// Parse a frame sent by a device; only responses are accepted
    pub fn parse_response(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        if envelope.event != Command::Response {
            return Err(ProtocolError::UnexpectedCommand {
                expected: Command::Response,
                got: envelope.event,
            });
        }
        Ok(envelope)
    }
}

/// Frame received on a device connection
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    KeepAlive,
    Response(Envelope),
}

impl DeviceMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        #[derive(Deserialize)]
        struct Probe {
            event: Command,
        }

        let probe: Probe = serde_json::from_str(text)?;
        match probe.event {
            Command::KeepAlive => Ok(DeviceMessage::KeepAlive),
            _ => Envelope::parse_response(text).map(DeviceMessage::Response),
        }
    }
}

/// Reply to a keep-alive probe
pub fn keep_alive_frame() -> String {
    json!({ "event": Command::KeepAlive }).to_string()
}

/// Legacy single-axis message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisMessage {
    pub event: String,
    pub value: f64,
}

impl AxisMessage {
    /// Split a vector into `power`, `orientation`, `tilt_up_down`, `tilt_left_right`
    pub fn legacy(vector: &ControlVector) -> [AxisMessage; 4] {
        let msg = |event: &str, value: f64| AxisMessage {
            event: event.to_string(),
            value,
        };
        [
            msg("power", vector.throttle),
            msg("orientation", vector.yaw),
            msg("tilt_up_down", vector.pitch),
            msg("tilt_left_right", vector.roll),
        ]
    }
}

/// Axis selector for PID tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TuneAxis {
    Pitch,
    Roll,
    Yaw,
}

impl TuneAxis {
    /// Numeric code used on the device link
    pub fn code(self) -> u8 {
        match self {
            TuneAxis::Pitch => 1,
            TuneAxis::Roll => 2,
            TuneAxis::Yaw => 3,
        }
    }
}

/// PID gains
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pid {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Message from the browser surface
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    Viewport { width: f64, height: f64 },
    TouchStart { touches: Vec<PointSample> },
    TouchMove { touches: Vec<PointSample> },
    /// `touches` holds the touches still down
    TouchEnd { touches: Vec<PointSample> },
    MouseDown { x: f64, y: f64 },
    MouseMove { x: f64, y: f64 },
    MouseUp,
    Standby { on: bool },
    Tune {
        axis: TuneAxis,
        #[serde(flatten)]
        pid: Pid,
    },
    GetTune,
    GetTilt,
    CalibrateTilt,
    /// Direct values from the slider screen
    Sticks {
        #[serde(flatten)]
        vector: ControlVector,
    },
}

impl InputEvent {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
