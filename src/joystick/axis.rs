//! Axis math (displacement, distance, range clamp)
//!
//! Pure functions mapping a pointer sample and its reference origin to
//! axis values. Screen coordinates grow downwards, so the vertical axis is
//! inverted to make "up" positive.

use super::PointSample;

/// Maximum throw from the origin, in display pixels
pub const DEFAULT_MAX_RANGE: f64 = 100.0;

/// Vertical displacement, positive when `current` is above `origin`
pub fn primary_axis(current: PointSample, origin: PointSample) -> f64 {
    origin.y - current.y
}

/// Horizontal displacement, positive when `current` is right of `origin`
pub fn secondary_axis(current: PointSample, origin: PointSample) -> f64 {
    current.x - origin.x
}

/// Euclidean distance between two points
///
/// Returns 0 if either point is absent.
pub fn distance(a: Option<PointSample>, b: Option<PointSample>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => (a.x - b.x).hypot(a.y - b.y),
        _ => 0.0,
    }
}

/// Whether `point` is further than `max_range` from `origin`
///
/// A missing origin is never out of range.
pub fn is_out_of_range(point: PointSample, origin: Option<PointSample>, max_range: f64) -> bool {
    distance(Some(point), origin) > max_range
}

/// Whether a held axis value is far enough from center to keep the stick live
pub fn hold_if_beyond_threshold(value: f64, threshold: f64) -> bool {
    value.abs() > threshold
}
