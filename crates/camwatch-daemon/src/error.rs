//! Error types for the camwatch daemon.

use camwatch_rpc::protocol::RpcError;
use tracing::debug;

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Device not present in the device table
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A non-terminal recording already owns the device
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Unknown or already-terminal media session
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(camwatch_core::Error),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Domain errors in the core crate carry their own wire codes; everything
/// else crossing this boundary is an internal failure.
impl From<camwatch_core::Error> for DaemonError {
    fn from(err: camwatch_core::Error) -> Self {
        match err {
            camwatch_core::Error::DeviceNotFound(device) => DaemonError::DeviceNotFound(device),
            camwatch_core::Error::DeviceBusy(device) => DaemonError::DeviceBusy(device),
            camwatch_core::Error::SessionNotFound(id) => DaemonError::SessionNotFound(id),
            camwatch_core::Error::InvalidSchedule(msg) => DaemonError::InvalidParams(msg),
            other => DaemonError::Core(other),
        }
    }
}

impl From<DaemonError> for RpcError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::DeviceNotFound(device) => RpcError::device_not_found(device),
            DaemonError::DeviceBusy(device) => RpcError::device_busy(device),
            DaemonError::SessionNotFound(id) => RpcError::session_not_found(id),
            DaemonError::InvalidParams(msg) => RpcError::invalid_params(msg),
            DaemonError::MethodNotFound(name) => RpcError::method_not_found(name),
            other => {
                // Detail stays in the log; clients get the generic message.
                debug!("internal error surfaced to client: {other}");
                RpcError::internal_error()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_rpc::protocol;

    #[test]
    fn test_daemon_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = DaemonError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_daemon_error_display_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = DaemonError::Json(json_err);
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_daemon_error_display_device_not_found() {
        let err = DaemonError::DeviceNotFound("/dev/video9".to_string());
        assert_eq!(err.to_string(), "Device not found: /dev/video9");
    }

    #[test]
    fn test_daemon_error_display_device_busy() {
        let err = DaemonError::DeviceBusy("/dev/video0".to_string());
        assert_eq!(err.to_string(), "Device busy: /dev/video0");
    }

    #[test]
    fn test_daemon_error_display_session_not_found() {
        let err = DaemonError::SessionNotFound("abc123".to_string());
        assert_eq!(err.to_string(), "Session not found: abc123");
    }

    #[test]
    fn test_daemon_error_display_method_not_found() {
        let err = DaemonError::MethodNotFound("bogus_method".to_string());
        assert_eq!(err.to_string(), "Method not found: bogus_method");
    }

    #[test]
    fn test_rpc_error_from_device_not_found() {
        let rpc: RpcError = DaemonError::DeviceNotFound("/dev/video9".to_string()).into();
        assert_eq!(rpc.code, protocol::DEVICE_NOT_FOUND);
        assert!(rpc.message.contains("/dev/video9"));
    }

    #[test]
    fn test_rpc_error_from_device_busy() {
        let rpc: RpcError = DaemonError::DeviceBusy("/dev/video0".to_string()).into();
        assert_eq!(rpc.code, protocol::DEVICE_BUSY);
    }

    #[test]
    fn test_rpc_error_from_session_not_found() {
        let rpc: RpcError = DaemonError::SessionNotFound("abc".to_string()).into();
        assert_eq!(rpc.code, protocol::SESSION_NOT_FOUND);
        assert!(rpc.message.contains("abc"));
    }

    #[test]
    fn test_rpc_error_from_method_not_found_names_method() {
        let rpc: RpcError = DaemonError::MethodNotFound("frobnicate".to_string()).into();
        assert_eq!(rpc.code, protocol::METHOD_NOT_FOUND);
        assert!(rpc.message.contains("frobnicate"));
    }

    #[test]
    fn test_rpc_error_from_invalid_params() {
        let rpc: RpcError = DaemonError::InvalidParams("missing device".to_string()).into();
        assert_eq!(rpc.code, protocol::INVALID_PARAMS);
        assert!(rpc.message.contains("missing device"));
    }

    #[test]
    fn test_rpc_error_from_internal_never_leaks_detail() {
        let io_err = std::io::Error::other("secret path /var/lib/thing");
        let rpc: RpcError = DaemonError::Io(io_err).into();
        assert_eq!(rpc.code, protocol::INTERNAL_ERROR);
        assert_eq!(rpc.message, "Internal error");
    }

    #[test]
    fn test_core_domain_errors_map_through() {
        let err: DaemonError = camwatch_core::Error::DeviceBusy("/dev/video1".to_string()).into();
        assert!(matches!(err, DaemonError::DeviceBusy(_)));

        let err: DaemonError =
            camwatch_core::Error::InvalidSchedule("startTime must be in the future".to_string())
                .into();
        assert!(matches!(err, DaemonError::InvalidParams(_)));

        let err: DaemonError =
            camwatch_core::Error::Capture("ffmpeg exited with status 1".to_string()).into();
        assert!(matches!(err, DaemonError::Core(_)));
        let rpc: RpcError = err.into();
        assert_eq!(rpc.code, protocol::INTERNAL_ERROR);
    }
}
