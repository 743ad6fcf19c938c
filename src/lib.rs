//! Dualstick GW - dual-touch virtual joystick gateway
//!
//! Turns raw touch/mouse samples from a browser surface into four-axis
//! control updates for a remote device.

pub mod config;
pub mod control;
pub mod joystick;
pub mod protocol;
pub mod server;
pub mod session;
