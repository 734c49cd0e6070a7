use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub media: MediaSettings,
}

impl Config {
    /// Load config from file. A missing file means all defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

/// WebSocket listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Handshake path clients must request.
    #[serde(default = "default_ws_path")]
    pub path: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8002
}
fn default_ws_path() -> String {
    "/ws".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_ws_path(),
        }
    }
}

/// Device monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Number of device nodes to watch, `<prefix>0 .. <prefix>{n-1}`.
    #[serde(default = "default_device_count")]
    pub device_count: u32,

    #[serde(default = "default_device_prefix")]
    pub device_prefix: String,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Capacity of the queue feeding the probe workers. A full queue
    /// defers the probe to the next scan cycle.
    #[serde(default = "default_probe_queue_depth")]
    pub probe_queue_depth: usize,
}

fn default_poll_interval() -> u64 {
    100
}
fn default_device_count() -> u32 {
    10
}
fn default_device_prefix() -> String {
    "/dev/video".to_string()
}
fn default_probe_timeout() -> u64 {
    2000
}
fn default_probe_queue_depth() -> usize {
    8
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            device_count: default_device_count(),
            device_prefix: default_device_prefix(),
            probe_timeout_ms: default_probe_timeout(),
            probe_queue_depth: default_probe_queue_depth(),
        }
    }
}

impl MonitorSettings {
    #[must_use]
    pub fn device_paths(&self) -> Vec<String> {
        (0..self.device_count)
            .map(|i| format!("{}{i}", self.device_prefix))
            .collect()
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Capture output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_snapshot_format")]
    pub snapshot_format: String,

    #[serde(default = "default_recording_format")]
    pub recording_format: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("captures")
}
fn default_snapshot_format() -> String {
    "jpeg".to_string()
}
fn default_recording_format() -> String {
    "mp4".to_string()
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            snapshot_format: default_snapshot_format(),
            recording_format: default_recording_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.port, 8002);
        assert_eq!(config.server.path, "/ws");
        assert_eq!(config.monitor.poll_interval_ms, 100);
        assert_eq!(config.monitor.device_count, 10);
        assert_eq!(config.media.snapshot_format, "jpeg");
        assert_eq!(config.media.recording_format, "mp4");
    }

    #[test]
    fn test_config_load_missing_file_gives_defaults() {
        let config = Config::load(Path::new("/nonexistent/camwatch.json")).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.monitor.probe_queue_depth, 8);
    }

    #[test]
    fn test_config_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server": {{"port": 9100}}, "monitor": {{"deviceCount": 2}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        // Untouched fields keep their defaults
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.monitor.device_count, 2);
        assert_eq!(config.monitor.poll_interval_ms, 100);
    }

    #[test]
    fn test_config_load_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_device_paths_range() {
        let monitor = MonitorSettings {
            device_count: 3,
            ..MonitorSettings::default()
        };
        assert_eq!(
            monitor.device_paths(),
            vec!["/dev/video0", "/dev/video1", "/dev/video2"]
        );
    }

    #[test]
    fn test_durations() {
        let monitor = MonitorSettings::default();
        assert_eq!(monitor.poll_interval(), Duration::from_millis(100));
        assert_eq!(monitor.probe_timeout(), Duration::from_millis(2000));
    }
}
