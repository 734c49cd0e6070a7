use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "device node missing");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("IO error"));
        assert!(err.to_string().contains("device node missing"));
    }

    #[test]
    fn test_error_display_json() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err = Error::Json(json_err);
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Config error: missing field");
    }

    #[test]
    fn test_error_display_probe() {
        let err = Error::Probe("v4l2-ctl timed out".to_string());
        assert_eq!(err.to_string(), "Probe error: v4l2-ctl timed out");
    }

    #[test]
    fn test_error_display_capture() {
        let err = Error::Capture("ffmpeg exited with status 1".to_string());
        assert!(err.to_string().contains("ffmpeg"));
    }

    #[test]
    fn test_error_display_device_not_found() {
        let err = Error::DeviceNotFound("/dev/video3".to_string());
        assert_eq!(err.to_string(), "Device not found: /dev/video3");
    }

    #[test]
    fn test_error_display_device_busy() {
        let err = Error::DeviceBusy("/dev/video0".to_string());
        assert_eq!(err.to_string(), "Device busy: /dev/video0");
    }

    #[test]
    fn test_error_display_session_not_found() {
        let err = Error::SessionNotFound("abc-123".to_string());
        assert_eq!(err.to_string(), "Session not found: abc-123");
    }

    #[test]
    fn test_error_display_invalid_schedule() {
        let err = Error::InvalidSchedule("startTime is in the past".to_string());
        assert!(err.to_string().contains("past"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
