//! Capture executor: the opaque backend that turns a device path and
//! format into pixels on disk. The real implementation shells out to
//! `ffmpeg`; tests substitute a simulated executor through the trait.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, warn};

use crate::{Error, Result};

#[async_trait]
pub trait CaptureExecutor: Send + Sync {
    /// Grab a single frame to `output`. Resolves when the file is
    /// written (or the attempt failed).
    async fn snapshot(&self, device: &str, format: &str, output: &Path) -> Result<()>;

    /// Start a continuous capture to `output`, returning a handle that
    /// halts it.
    async fn begin_recording(
        &self,
        device: &str,
        format: &str,
        output: &Path,
    ) -> Result<CaptureHandle>;
}

/// Handle to a running capture process. Executors with no real process
/// (test doubles) hand out a detached handle.
#[derive(Debug)]
pub struct CaptureHandle {
    child: Option<Child>,
}

impl CaptureHandle {
    #[must_use]
    pub fn from_child(child: Child) -> Self {
        Self { child: Some(child) }
    }

    #[must_use]
    pub fn detached() -> Self {
        Self { child: None }
    }

    /// Halt the capture process. Idempotent for detached handles.
    pub async fn stop(mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("failed to kill capture process: {e}");
            }
        }
    }
}

fn spawn_stderr_logger(device: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let reader = BufReader::new(stderr);
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}] ffmpeg: {}", device, line);
        }
    });
}

/// `ffmpeg`-backed executor reading from v4l2 devices.
#[derive(Debug, Default)]
pub struct FfmpegExecutor;

impl FfmpegExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureExecutor for FfmpegExecutor {
    async fn snapshot(&self, device: &str, _format: &str, output: &Path) -> Result<()> {
        let result = Command::new("ffmpeg")
            .args(["-f", "v4l2", "-i", device, "-frames:v", "1", "-y"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Capture(format!("failed to run ffmpeg: {e}")))?;

        if !result.status.success() {
            return Err(Error::Capture(format!(
                "ffmpeg snapshot of {device} exited with {}",
                result.status
            )));
        }
        Ok(())
    }

    async fn begin_recording(
        &self,
        device: &str,
        _format: &str,
        output: &Path,
    ) -> Result<CaptureHandle> {
        let mut child = Command::new("ffmpeg")
            .args(["-f", "v4l2", "-i", device, "-y"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("failed to spawn ffmpeg: {e}")))?;

        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(device.to_string(), stderr);
        }

        debug!("recording started: {device} -> {}", output.display());
        Ok(CaptureHandle::from_child(child))
    }
}
