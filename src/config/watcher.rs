//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Delay before re-reading, lets editors finish writing
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the config file and yields each successfully reloaded config
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    ///
    /// The parent directory is watched rather than the file itself so that
    /// editors replacing the file (write-to-temp then rename) are noticed.
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<(Self, Arc<AppConfig>)> {
        let config_path: PathBuf = config_path.into();
        let (tx, rx) = mpsc::channel(10);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let watch_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        // notify callbacks run on their own OS thread, not in the runtime
        let runtime_handle = tokio::runtime::Handle::current();
        let reload_path = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Watch error: {}", e);
                    return;
                }
            };

            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if !touches_config {
                return;
            }

            debug!("Config file changed: {:?}", event.paths);
            let path = reload_path.clone();
            let tx = tx.clone();

            runtime_handle.spawn(async move {
                tokio::time::sleep(RELOAD_DEBOUNCE).await;

                match AppConfig::load(&path).await {
                    Ok(new_config) => {
                        info!("Configuration reloaded");
                        if let Err(e) = tx.send(new_config).await {
                            error!("Failed to send config update: {}", e);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to reload config (keeping old config): {:#}", e);
                    }
                }
            });
        })?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", watch_dir.display()))?;

        info!("Config file watcher started for: {}", config_path.display());

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            Arc::new(initial_config),
        ))
    }

    /// Wait for the next config update
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_reloads() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("dualstick.yaml");

        fs::write(
            &config_path,
            "joystick:\n  release_duration_ms: 100\n",
        )?;

        let (mut watcher, config) = ConfigWatcher::new(config_path.clone()).await?;
        assert_eq!(config.joystick.release_duration_ms, 100);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &config_path,
            "joystick:\n  release_duration_ms: 500\n",
        )?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config())
            .await
            .context("No reload within 2s")?
            .context("Watcher closed")?;

        assert_eq!(new_config.joystick.release_duration_ms, 500);

        Ok(())
    }

    #[tokio::test]
    async fn test_config_watcher_rejects_invalid_initial_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("dualstick.yaml");
        fs::write(&config_path, "joystick:\n  frame_rate: 0\n")?;

        assert!(ConfigWatcher::new(config_path).await.is_err());
        Ok(())
    }
}
