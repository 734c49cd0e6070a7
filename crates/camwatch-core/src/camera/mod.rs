//! Camera presence model: per-device records, the shared device table,
//! capability probing, and the scan loop that keeps the table accurate.

pub mod monitor;
pub mod probe;
pub mod table;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Presence of a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CameraStatus {
    Connected,
    Disconnected,
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraStatus::Connected => write!(f, "CONNECTED"),
            CameraStatus::Disconnected => write!(f, "DISCONNECTED"),
        }
    }
}

/// What the capability probe learned about a connected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraCapabilities {
    /// `WxH`, e.g. `"1280x720"`.
    pub resolution: String,
    pub fps: u32,
    pub formats: Vec<String>,
}

impl CameraCapabilities {
    /// Capabilities assumed when a device opens but format enumeration
    /// yields nothing usable.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            resolution: "640x480".to_string(),
            fps: 30,
            formats: vec!["MJPG".to_string()],
        }
    }
}

/// One row of the device table.
///
/// A `CONNECTED` record with `capabilities: None` marks a probe still in
/// flight; a `DISCONNECTED` record never carries capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraRecord {
    pub device: String,
    pub status: CameraStatus,
    #[serde(flatten)]
    pub capabilities: Option<CameraCapabilities>,
    pub last_changed_at: DateTime<Utc>,
}

impl CameraRecord {
    #[must_use]
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            status: CameraStatus::Disconnected,
            capabilities: None,
            last_changed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == CameraStatus::Connected
    }

    /// Params object for a `camera_status_update` notification describing
    /// this record. Resolution and fps appear only when connected with a
    /// resolved probe.
    #[must_use]
    pub fn notification_params(&self) -> Value {
        let mut params = json!({
            "status": self.status,
            "device": self.device,
        });
        if self.status == CameraStatus::Connected {
            if let Some(caps) = &self.capabilities {
                params["resolution"] = json!(caps.resolution);
                params["fps"] = json!(caps.fps);
            }
        }
        params
    }
}

/// Transition event produced by the monitor and fanned out to clients.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub device: String,
    pub status: CameraStatus,
    pub capabilities: Option<CameraCapabilities>,
}

impl StatusUpdate {
    /// Params object for the `camera_status_update` notification.
    #[must_use]
    pub fn notification_params(&self) -> Value {
        let mut params = json!({
            "status": self.status,
            "device": self.device,
        });
        if self.status == CameraStatus::Connected {
            if let Some(caps) = &self.capabilities {
                params["resolution"] = json!(caps.resolution);
                params["fps"] = json!(caps.fps);
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&CameraStatus::Connected).unwrap(),
            "\"CONNECTED\""
        );
        assert_eq!(
            serde_json::to_string(&CameraStatus::Disconnected).unwrap(),
            "\"DISCONNECTED\""
        );
    }

    #[test]
    fn test_fallback_capabilities() {
        let caps = CameraCapabilities::fallback();
        assert_eq!(caps.resolution, "640x480");
        assert_eq!(caps.fps, 30);
    }

    #[test]
    fn test_record_serialization_flattens_capabilities() {
        let record = CameraRecord {
            device: "/dev/video0".to_string(),
            status: CameraStatus::Connected,
            capabilities: Some(CameraCapabilities {
                resolution: "1280x720".to_string(),
                fps: 60,
                formats: vec!["YUYV".to_string()],
            }),
            last_changed_at: Utc::now(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["device"], "/dev/video0");
        assert_eq!(value["status"], "CONNECTED");
        assert_eq!(value["resolution"], "1280x720");
        assert_eq!(value["fps"], 60);
        assert!(value.get("capabilities").is_none());
        assert!(value.get("lastChangedAt").is_some());
    }

    #[test]
    fn test_disconnected_record_omits_capability_fields() {
        let record = CameraRecord::disconnected("/dev/video1");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "DISCONNECTED");
        assert!(value.get("resolution").is_none());
        assert!(value.get("fps").is_none());
    }

    #[test]
    fn test_notification_params_connected() {
        let update = StatusUpdate {
            device: "/dev/video0".to_string(),
            status: CameraStatus::Connected,
            capabilities: Some(CameraCapabilities::fallback()),
        };
        let params = update.notification_params();
        assert_eq!(params["status"], "CONNECTED");
        assert_eq!(params["device"], "/dev/video0");
        assert_eq!(params["resolution"], "640x480");
        assert_eq!(params["fps"], 30);
    }

    #[test]
    fn test_notification_params_disconnected_has_no_capabilities() {
        let update = StatusUpdate {
            device: "/dev/video2".to_string(),
            status: CameraStatus::Disconnected,
            capabilities: None,
        };
        let params = update.notification_params();
        assert_eq!(params["status"], "DISCONNECTED");
        assert!(params.get("resolution").is_none());
        assert!(params.get("fps").is_none());
    }
}
