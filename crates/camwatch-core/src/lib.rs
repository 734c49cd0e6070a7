//! Core library for the camwatch camera server.
//!
//! Holds the device table and monitor that track camera presence, the
//! media session manager that owns snapshots and recordings, and the
//! configuration layer. The daemon crate puts a JSON-RPC surface on top.

pub mod camera;
pub mod config;
pub mod media;

mod error;

pub use camera::monitor::CameraMonitor;
pub use camera::probe::{CapabilityProbe, V4l2Probe};
pub use camera::table::DeviceTable;
pub use camera::{CameraCapabilities, CameraRecord, CameraStatus, StatusUpdate};
pub use config::Config;
pub use error::{Error, Result};
pub use media::capture::{CaptureExecutor, CaptureHandle, FfmpegExecutor};
pub use media::manager::SessionManager;
pub use media::{MediaKind, MediaSession, SessionId, SessionState};
