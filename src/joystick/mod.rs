//! Dual-touch virtual joystick input model
//!
//! Interprets raw pointer/touch samples as one or two independent joystick
//! gestures, converts them into bounded axis values and animates released
//! sticks back to their origin.

pub mod axis;
pub mod release;
pub mod tracker;

use serde::{Deserialize, Serialize};

pub use release::{ReleaseAnimation, ReleaseAnimator, ReleaseCallbacks, ReleaseHandle};
pub use tracker::{DrawHandle, DualTouchTracker, TouchState};

/// Stroke color of the left stick
pub const LEFT_JOYSTICK_COLOR: &str = "#5555ff";
/// Stroke color of the right stick
pub const RIGHT_JOYSTICK_COLOR: &str = "#ff5555";
/// Stroke color of the single mouse-driven stick
pub const MOUSE_JOYSTICK_COLOR: &str = "white";

/// A single pointer/touch position at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointSample {
    pub x: f64,
    pub y: f64,
}

impl PointSample {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation towards `target`; `t >= 1.0` returns `target` as is
    pub fn lerp(self, target: PointSample, t: f64) -> PointSample {
        if t >= 1.0 {
            return target;
        }
        let t = t.max(0.0);
        PointSample {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
        }
    }
}

/// Which half of the surface a sample belongs to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoystickSide {
    Left,
    Right,
}

impl JoystickSide {
    pub const ALL: [JoystickSide; 2] = [JoystickSide::Left, JoystickSide::Right];

    /// Classify a sample by screen half.
    ///
    /// `x > width / 2` is RIGHT; everything else, the midline included, is LEFT.
    pub fn classify(x: f64, viewport_width: f64) -> Self {
        if x > viewport_width / 2.0 {
            JoystickSide::Right
        } else {
            JoystickSide::Left
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            JoystickSide::Left => 0,
            JoystickSide::Right => 1,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            JoystickSide::Left => LEFT_JOYSTICK_COLOR,
            JoystickSide::Right => RIGHT_JOYSTICK_COLOR,
        }
    }
}

impl std::fmt::Display for JoystickSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoystickSide::Left => write!(f, "left"),
            JoystickSide::Right => write!(f, "right"),
        }
    }
}
