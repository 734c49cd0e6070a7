//! Capability probing via `v4l2-ctl`.
//!
//! The probe is behind a trait so the monitor can be exercised with a
//! simulated implementation. The real probe shells out to `v4l2-ctl`
//! with a hard timeout; it is only ever invoked from the probe worker
//! pool, never from the scan loop or a connection task.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use super::CameraCapabilities;
use crate::{Error, Result};

#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Query one device path for supported resolution/fps.
    async fn probe(&self, device: &str) -> Result<CameraCapabilities>;
}

/// `v4l2-ctl`-backed probe. Primary query is `--list-formats-ext`; when
/// that yields nothing usable the current format from `--get-fmt-video`
/// is used instead.
#[derive(Debug, Clone)]
pub struct V4l2Probe {
    timeout: Duration,
}

impl V4l2Probe {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run_v4l2(&self, device: &str, flag: &str) -> Result<String> {
        let child = Command::new("v4l2-ctl")
            .args(["--device", device, flag])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| Error::Probe(format!("v4l2-ctl timed out for {device}")))?
            .map_err(|e| Error::Probe(format!("failed to run v4l2-ctl: {e}")))?;

        if !output.status.success() {
            return Err(Error::Probe(format!(
                "v4l2-ctl {flag} exited with {} for {device}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl CapabilityProbe for V4l2Probe {
    async fn probe(&self, device: &str) -> Result<CameraCapabilities> {
        match self.run_v4l2(device, "--list-formats-ext").await {
            Ok(output) => {
                if let Some(caps) = parse_list_formats(&output) {
                    return Ok(caps);
                }
                debug!("no formats parsed from --list-formats-ext for {device}");
            }
            Err(e) => debug!("--list-formats-ext failed for {device}: {e}"),
        }

        let output = self.run_v4l2(device, "--get-fmt-video").await?;
        Ok(parse_get_fmt(&output).unwrap_or_else(CameraCapabilities::fallback))
    }
}

/// Parse `v4l2-ctl --list-formats-ext` output, picking the largest
/// discrete frame size and the highest frame rate offered at it.
#[must_use]
pub fn parse_list_formats(output: &str) -> Option<CameraCapabilities> {
    // "[0]: 'MJPG' (Motion-JPEG, compressed)"
    let format_re = Regex::new(r"\[\d+\]:\s*'(\w+)'").ok()?;
    // "Size: Discrete 1280x720"
    let size_re = Regex::new(r"Size:\s*Discrete\s*(\d+)x(\d+)").ok()?;
    // "(30.000 fps)"
    let fps_re = Regex::new(r"\((\d+(?:\.\d+)?)\s*fps\)").ok()?;

    let mut formats = Vec::new();
    let mut best: Option<(u64, String)> = None;
    let mut best_fps = 0u32;
    let mut in_best_size = false;

    for line in output.lines() {
        if let Some(m) = format_re.captures(line) {
            let name = m[1].to_string();
            if !formats.contains(&name) {
                formats.push(name);
            }
            continue;
        }

        if let Some(m) = size_re.captures(line) {
            let (w, h): (u64, u64) = (m[1].parse().ok()?, m[2].parse().ok()?);
            let area = w * h;
            if best.as_ref().is_none_or(|(best_area, _)| area > *best_area) {
                best = Some((area, format!("{w}x{h}")));
                best_fps = 0;
                in_best_size = true;
            } else {
                in_best_size = false;
            }
            continue;
        }

        if in_best_size {
            if let Some(m) = fps_re.captures(line) {
                if let Ok(fps) = m[1].parse::<f64>() {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    // v4l2 frame rates are small positive values
                    let fps = fps.round() as u32;
                    best_fps = best_fps.max(fps);
                }
            }
        }
    }

    let (_, resolution) = best?;
    Some(CameraCapabilities {
        resolution,
        fps: if best_fps == 0 { 30 } else { best_fps },
        formats,
    })
}

/// Parse `v4l2-ctl --get-fmt-video` output (current format only; no
/// frame-rate information, so the fallback rate is assumed).
#[must_use]
pub fn parse_get_fmt(output: &str) -> Option<CameraCapabilities> {
    // "Width/Height      : 640/480"
    let size_re = Regex::new(r"Width/Height\s*:\s*(\d+)/(\d+)").ok()?;
    // "Pixel Format      : 'YUYV'"
    let format_re = Regex::new(r"Pixel Format\s*:\s*'(\w+)'").ok()?;

    let size = size_re.captures(output)?;
    let resolution = format!("{}x{}", &size[1], &size[2]);
    let formats = format_re
        .captures(output)
        .map(|m| vec![m[1].to_string()])
        .unwrap_or_default();

    Some(CameraCapabilities {
        resolution,
        fps: 30,
        formats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_FORMATS_OUTPUT: &str = "\
ioctl: VIDIOC_ENUM_FMT
\tType: Video Capture

\t[0]: 'MJPG' (Motion-JPEG, compressed)
\t\tSize: Discrete 1920x1080
\t\t\tInterval: Discrete 0.033s (30.000 fps)
\t\t\tInterval: Discrete 0.067s (15.000 fps)
\t\tSize: Discrete 640x480
\t\t\tInterval: Discrete 0.017s (60.000 fps)
\t[1]: 'YUYV' (YUYV 4:2:2)
\t\tSize: Discrete 640x480
\t\t\tInterval: Discrete 0.033s (30.000 fps)
";

    const GET_FMT_OUTPUT: &str = "\
Format Video Capture:
\tWidth/Height      : 1280/720
\tPixel Format      : 'YUYV' (YUYV 4:2:2)
\tField             : None
\tBytes per Line    : 2560
";

    #[test]
    fn test_parse_list_formats_picks_largest_size() {
        let caps = parse_list_formats(LIST_FORMATS_OUTPUT).unwrap();
        assert_eq!(caps.resolution, "1920x1080");
        assert_eq!(caps.fps, 30, "highest rate at the largest size");
        assert_eq!(caps.formats, vec!["MJPG", "YUYV"]);
    }

    #[test]
    fn test_parse_list_formats_empty_output() {
        assert!(parse_list_formats("").is_none());
        assert!(parse_list_formats("ioctl: VIDIOC_ENUM_FMT\n").is_none());
    }

    #[test]
    fn test_parse_list_formats_size_without_interval_defaults_fps() {
        let output = "\t[0]: 'MJPG' (Motion-JPEG)\n\t\tSize: Discrete 800x600\n";
        let caps = parse_list_formats(output).unwrap();
        assert_eq!(caps.resolution, "800x600");
        assert_eq!(caps.fps, 30);
    }

    #[test]
    fn test_parse_get_fmt() {
        let caps = parse_get_fmt(GET_FMT_OUTPUT).unwrap();
        assert_eq!(caps.resolution, "1280x720");
        assert_eq!(caps.fps, 30);
        assert_eq!(caps.formats, vec!["YUYV"]);
    }

    #[test]
    fn test_parse_get_fmt_garbage() {
        assert!(parse_get_fmt("no format here").is_none());
    }

    #[tokio::test]
    async fn test_probe_missing_device_errors() {
        let probe = V4l2Probe::new(Duration::from_millis(500));
        // Either v4l2-ctl is absent or the device does not exist; both
        // must surface as a probe error, not a hang or panic.
        let result = probe.probe("/dev/video-does-not-exist").await;
        assert!(result.is_err());
    }
}
