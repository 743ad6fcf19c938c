//! Configuration management for Dualstick GW
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.
//! Every field has a default, so an empty file is a valid configuration.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::control::AxisLabels;
use crate::joystick::JoystickSide;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub joystick: JoystickConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Frames buffered per device connection before the slowest one lags
    #[serde(default = "default_device_buffer")]
    pub device_buffer: usize,
}

/// Virtual joystick behaviour
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JoystickConfig {
    /// Maximum throw from the origin (display pixels); farther samples are ignored
    #[serde(default = "default_max_range")]
    pub max_range: f64,
    /// Release animation frame rate
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Release animation duration
    #[serde(default = "default_release_duration_ms")]
    pub release_duration_ms: u64,
    #[serde(default)]
    pub origin_capture: OriginCapture,
    /// Primary-axis magnitude beyond which a held side stays put on release
    #[serde(default = "default_hold_threshold")]
    pub hold_threshold: f64,
    #[serde(default)]
    pub hold_left: bool,
    #[serde(default)]
    pub hold_right: bool,
    /// Side driven by the mouse when touch is unavailable
    #[serde(default = "default_mouse_side")]
    pub mouse_side: JoystickSide,
}

/// When a touch start recaptures the side's origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginCapture {
    /// Every touch start recaptures
    Always,
    /// Only if the side is not already being tracked
    IfNotTracking,
    /// As `IfNotTracking`, but a held side keeps its origin
    #[default]
    HoldAware,
}

/// Outbound control configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub labels: AxisLabels,
    /// Also log every control update at info level
    #[serde(default)]
    pub log_updates: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            device_buffer: default_device_buffer(),
        }
    }
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            max_range: default_max_range(),
            frame_rate: default_frame_rate(),
            release_duration_ms: default_release_duration_ms(),
            origin_capture: OriginCapture::default(),
            hold_threshold: default_hold_threshold(),
            hold_left: false,
            hold_right: false,
            mouse_side: default_mouse_side(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // serde_yaml reads an empty document as null
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host cannot be empty");
        }
        if self.server.device_buffer == 0 {
            anyhow::bail!("server.device_buffer must be at least 1");
        }

        self.joystick.validate().context("Invalid joystick section")?;

        Ok(())
    }
}

impl JoystickConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.max_range.is_finite() || self.max_range <= 0.0 {
            anyhow::bail!("max_range must be a positive number (got {})", self.max_range);
        }
        if !(1..=240).contains(&self.frame_rate) {
            anyhow::bail!("frame_rate must be 1-240 (got {})", self.frame_rate);
        }
        if self.release_duration_ms > 10_000 {
            anyhow::bail!(
                "release_duration_ms must be at most 10000 (got {})",
                self.release_duration_ms
            );
        }
        if !self.hold_threshold.is_finite() || self.hold_threshold < 0.0 {
            anyhow::bail!("hold_threshold must be >= 0 (got {})", self.hold_threshold);
        }
        if (self.hold_left || self.hold_right) && self.hold_threshold >= self.max_range {
            anyhow::bail!(
                "hold_threshold ({}) must be below max_range ({})",
                self.hold_threshold,
                self.max_range
            );
        }
        Ok(())
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_device_buffer() -> usize { 256 }
fn default_max_range() -> f64 { crate::joystick::axis::DEFAULT_MAX_RANGE }
fn default_frame_rate() -> u32 { 30 }
fn default_release_duration_ms() -> u64 { 100 }
fn default_hold_threshold() -> f64 { 10.0 }
fn default_mouse_side() -> JoystickSide { JoystickSide::Left }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.joystick.max_range, 100.0);
        assert_eq!(config.joystick.frame_rate, 30);
        assert_eq!(config.joystick.origin_capture, OriginCapture::HoldAware);
        assert!(!config.joystick.hold_left);
        assert!(!config.joystick.hold_right);
    }

    #[test]
    fn test_partial_document() {
        let config = AppConfig::from_yaml(
            r#"
server:
  port: 9000
joystick:
  release_duration_ms: 500
  origin_capture: if_not_tracking
  mouse_side: right
control:
  labels: legacy
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.joystick.release_duration_ms, 500);
        assert_eq!(config.joystick.origin_capture, OriginCapture::IfNotTracking);
        assert_eq!(config.joystick.mouse_side, JoystickSide::Right);
        assert_eq!(config.control.labels, AxisLabels::Legacy);
        assert!(!config.control.log_updates);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AppConfig::from_yaml("joystick:\n  frame_rate: 0\n").is_err());
        assert!(AppConfig::from_yaml("joystick:\n  max_range: -5\n").is_err());
        assert!(AppConfig::from_yaml("joystick:\n  hold_left: true\n  hold_threshold: 150\n").is_err());
        assert!(AppConfig::from_yaml("server:\n  device_buffer: 0\n").is_err());
        assert!(AppConfig::from_yaml("joystick:\n  origin_capture: sometimes\n").is_err());

        // Holding disabled, the threshold is irrelevant
        assert!(AppConfig::from_yaml(
            "joystick:\n  hold_threshold: 150\n"
        )
        .is_ok());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");

        let mut config = AppConfig::default();
        config.joystick.release_duration_ms = 250;
        config.control.labels = AxisLabels::Legacy;

        config.save(&path).await?;
        let loaded = AppConfig::load(&path).await?;

        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = AppConfig::load("/definitely/not/here.yaml").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
