//! Session lifecycle and per-device mutual exclusion for captures.
//!
//! The session table is its own lock, separate from the device table;
//! the busy-check-then-insert sequence happens under one guard so two
//! concurrent `start_recording` calls for the same device can never both
//! win. Timed transitions (scheduled starts, duration stops) flow
//! through a single min-ordered schedule drained by one scheduler task.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::capture::{CaptureExecutor, CaptureHandle};
use super::{MediaKind, MediaSession, SessionId, SessionState};
use crate::camera::table::DeviceTable;
use crate::config::MediaSettings;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ScheduledAction {
    Start,
    Stop,
}

/// Future transition keyed by fire time; earliest first via
/// `Reverse<ScheduleEntry>` in the heap.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduleEntry {
    fire_at: Instant,
    session: SessionId,
    action: ScheduledAction,
}

pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, MediaSession>>,
    handles: Mutex<HashMap<SessionId, CaptureHandle>>,
    schedule: Mutex<BinaryHeap<Reverse<ScheduleEntry>>>,
    schedule_wake: Notify,
    executor: Arc<dyn CaptureExecutor>,
    table: Arc<DeviceTable>,
    settings: MediaSettings,
    shutting_down: AtomicBool,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        executor: Arc<dyn CaptureExecutor>,
        table: Arc<DeviceTable>,
        settings: MediaSettings,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
            schedule: Mutex::new(BinaryHeap::new()),
            schedule_wake: Notify::new(),
            executor,
            table,
            settings,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub async fn get(&self, id: &SessionId) -> Option<MediaSession> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// `(active, total)` session counts; active means non-terminal.
    pub async fn counts(&self) -> (usize, usize) {
        let sessions = self.sessions.lock().await;
        let active = sessions
            .values()
            .filter(|s| !s.state.is_terminal())
            .count();
        (active, sessions.len())
    }

    /// Capture a single frame. Fails with `DeviceNotFound` when the
    /// device table shows the device absent; executor failures leave the
    /// session `FAILED` and surface as a capture error.
    pub async fn capture_snapshot(&self, device: &str, format: &str) -> Result<MediaSession> {
        if !self.table.is_connected(device).await {
            return Err(Error::DeviceNotFound(device.to_string()));
        }

        let session = MediaSession {
            id: SessionId::new(),
            device: device.to_string(),
            kind: MediaKind::Snapshot,
            state: SessionState::Pending,
            format: format.to_string(),
            scheduled_at: None,
            started_at: Some(Utc::now()),
            stopped_at: None,
            duration_secs: None,
            output_path: self.output_path("snapshot", device, format),
        };
        let id = session.id.clone();
        self.sessions
            .lock()
            .await
            .insert(id.clone(), session.clone());

        if let Err(e) = tokio::fs::create_dir_all(&self.settings.output_dir).await {
            self.transition(&id, |s| s.state = SessionState::Failed)
                .await;
            return Err(e.into());
        }
        match self
            .executor
            .snapshot(device, format, &session.output_path)
            .await
        {
            Ok(()) => {
                let updated = self
                    .transition(&id, |s| {
                        s.state = SessionState::Done;
                        s.stopped_at = Some(Utc::now());
                    })
                    .await;
                let updated = updated.ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
                self.write_metadata(&updated).await;
                info!("snapshot done: {} -> {}", device, updated.output_path.display());
                Ok(updated)
            }
            Err(e) => {
                self.transition(&id, |s| s.state = SessionState::Failed)
                    .await;
                Err(e)
            }
        }
    }

    /// Start a recording immediately. `DeviceBusy` when a non-terminal
    /// recording (running or scheduled) exists for the device.
    pub async fn start_recording(
        &self,
        device: &str,
        format: &str,
        duration_secs: Option<u64>,
    ) -> Result<MediaSession> {
        if !self.table.is_connected(device).await {
            return Err(Error::DeviceNotFound(device.to_string()));
        }

        let session = {
            let mut sessions = self.sessions.lock().await;
            if sessions.values().any(|s| s.blocks_device(device)) {
                return Err(Error::DeviceBusy(device.to_string()));
            }
            let session = MediaSession {
                id: SessionId::new(),
                device: device.to_string(),
                kind: MediaKind::Recording,
                state: SessionState::Running,
                format: format.to_string(),
                scheduled_at: None,
                started_at: Some(Utc::now()),
                stopped_at: None,
                duration_secs,
                output_path: self.output_path("recording", device, format),
            };
            sessions.insert(session.id.clone(), session.clone());
            session
        };

        self.launch(session).await
    }

    /// Stop a recording (or cancel a scheduled one). `SessionNotFound`
    /// for unknown ids, snapshots, and sessions already terminal; the
    /// terminal-state check is the guard against racing a timed stop.
    pub async fn stop_recording(&self, id: &SessionId) -> Result<MediaSession> {
        let updated = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
            if session.kind != MediaKind::Recording || session.state.is_terminal() {
                return Err(Error::SessionNotFound(id.to_string()));
            }

            let now = Utc::now();
            session.state = SessionState::Stopped;
            session.stopped_at = Some(now);
            if let Some(started) = session.started_at {
                #[allow(clippy::cast_sign_loss)]
                // Clamped to zero before the cast
                let elapsed = (now - started).num_seconds().max(0) as u64;
                session.duration_secs = Some(elapsed);
            }
            session.clone()
        };

        if let Some(handle) = self.handles.lock().await.remove(id) {
            handle.stop().await;
        }
        if updated.started_at.is_some() {
            self.write_metadata(&updated).await;
        }
        info!("recording stopped: {}", updated.id);
        Ok(updated)
    }

    /// Arm a recording to start at `start_time`. `InvalidSchedule` when
    /// the time is not in the future; the busy check applies at creation
    /// so the one-non-terminal-recording-per-device invariant holds for
    /// scheduled sessions too.
    pub async fn schedule_recording(
        &self,
        device: &str,
        start_time: DateTime<Utc>,
        duration_secs: u64,
        format: &str,
    ) -> Result<MediaSession> {
        let now = Utc::now();
        if start_time <= now {
            return Err(Error::InvalidSchedule(
                "startTime must be in the future".to_string(),
            ));
        }
        if !self.table.contains(device).await {
            return Err(Error::DeviceNotFound(device.to_string()));
        }

        let session = {
            let mut sessions = self.sessions.lock().await;
            if sessions.values().any(|s| s.blocks_device(device)) {
                return Err(Error::DeviceBusy(device.to_string()));
            }
            let session = MediaSession {
                id: SessionId::new(),
                device: device.to_string(),
                kind: MediaKind::Recording,
                state: SessionState::Scheduled,
                format: format.to_string(),
                scheduled_at: Some(start_time),
                started_at: None,
                stopped_at: None,
                duration_secs: Some(duration_secs),
                output_path: self.output_path("recording", device, format),
            };
            sessions.insert(session.id.clone(), session.clone());
            session
        };

        let delay = (start_time - now).to_std().unwrap_or_default();
        self.push_entry(
            Instant::now() + delay,
            session.id.clone(),
            ScheduledAction::Start,
        )
        .await;
        info!(
            "recording scheduled: {} on {} at {}",
            session.id, device, start_time
        );
        Ok(session)
    }

    /// Drain the schedule until shutdown. One task owns all timed
    /// transitions; inserts wake it through the notify.
    pub fn run_scheduler(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if self.shutting_down.load(Ordering::Relaxed) {
                    break;
                }

                let next_fire = self
                    .schedule
                    .lock()
                    .await
                    .peek()
                    .map(|Reverse(e)| e.fire_at);

                match next_fire {
                    Some(fire_at) if fire_at <= Instant::now() => {
                        let entry = self.schedule.lock().await.pop();
                        if let Some(Reverse(entry)) = entry {
                            self.fire(entry).await;
                        }
                    }
                    Some(fire_at) => {
                        tokio::select! {
                            () = tokio::time::sleep_until(fire_at) => {}
                            () = self.schedule_wake.notified() => {}
                        }
                    }
                    None => {
                        tokio::select! {
                            () = self.schedule_wake.notified() => {}
                            () = tokio::time::sleep(Duration::from_millis(500)) => {}
                        }
                    }
                }
            }
            info!("media scheduler stopped");
        })
    }

    /// Stop the scheduler, kill active captures, and mark non-terminal
    /// recordings stopped.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        self.schedule_wake.notify_waiters();

        let handles: Vec<_> = self.handles.lock().await.drain().collect();
        for (id, handle) in handles {
            debug!("killing capture for session {id}");
            handle.stop().await;
        }

        let mut sessions = self.sessions.lock().await;
        for session in sessions.values_mut() {
            if session.kind == MediaKind::Recording && !session.state.is_terminal() {
                session.state = SessionState::Stopped;
                session.stopped_at = Some(Utc::now());
            }
        }
    }

    async fn launch(&self, session: MediaSession) -> Result<MediaSession> {
        if let Err(e) = tokio::fs::create_dir_all(&self.settings.output_dir).await {
            self.transition(&session.id, |s| s.state = SessionState::Failed)
                .await;
            return Err(e.into());
        }

        match self
            .executor
            .begin_recording(&session.device, &session.format, &session.output_path)
            .await
        {
            Ok(handle) => {
                // Re-check under the sessions lock: a stop that landed
                // while the capture was spawning has already swept an
                // empty handles map, so inserting now would leave the
                // process running with nothing left to halt it.
                let stopped_meanwhile = {
                    let sessions = self.sessions.lock().await;
                    let active = sessions
                        .get(&session.id)
                        .is_some_and(|s| !s.state.is_terminal());
                    if active {
                        self.handles
                            .lock()
                            .await
                            .insert(session.id.clone(), handle);
                        None
                    } else {
                        Some(handle)
                    }
                };
                if let Some(handle) = stopped_meanwhile {
                    debug!("session {} stopped before capture began", session.id);
                    handle.stop().await;
                    let current = self.get(&session.id).await.unwrap_or(session);
                    return Ok(current);
                }
                if let Some(duration) = session.duration_secs {
                    self.push_entry(
                        Instant::now() + Duration::from_secs(duration),
                        session.id.clone(),
                        ScheduledAction::Stop,
                    )
                    .await;
                }
                info!("recording started: {} on {}", session.id, session.device);
                Ok(session)
            }
            Err(e) => {
                self.transition(&session.id, |s| s.state = SessionState::Failed)
                    .await;
                Err(e)
            }
        }
    }

    async fn fire(&self, entry: ScheduleEntry) {
        match entry.action {
            ScheduledAction::Stop => match self.stop_recording(&entry.session).await {
                Ok(session) => info!("timed stop fired for {}", session.id),
                // Already stopped explicitly; the terminal-state guard
                // turned the double-stop into a no-op.
                Err(_) => debug!("timed stop skipped for {}", entry.session),
            },
            ScheduledAction::Start => self.fire_scheduled_start(&entry.session).await,
        }
    }

    async fn fire_scheduled_start(&self, id: &SessionId) {
        let device = {
            let sessions = self.sessions.lock().await;
            match sessions.get(id) {
                Some(s) if s.state == SessionState::Scheduled => s.device.clone(),
                // Cancelled or gone; lazily drop the stale entry.
                _ => return,
            }
        };

        if !self.table.is_connected(&device).await {
            warn!("scheduled recording {id} failed: {device} not connected");
            self.transition(id, |s| s.state = SessionState::Failed)
                .await;
            return;
        }

        let session = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(id) else {
                return;
            };
            if session.state != SessionState::Scheduled {
                return;
            }
            session.state = SessionState::Running;
            session.started_at = Some(Utc::now());
            session.clone()
        };

        if let Err(e) = self.launch(session).await {
            warn!("scheduled recording {id} failed to launch: {e}");
        }
    }

    async fn transition(
        &self,
        id: &SessionId,
        apply: impl FnOnce(&mut MediaSession),
    ) -> Option<MediaSession> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(id)?;
        apply(session);
        Some(session.clone())
    }

    async fn push_entry(&self, fire_at: Instant, session: SessionId, action: ScheduledAction) {
        self.schedule.lock().await.push(Reverse(ScheduleEntry {
            fire_at,
            session,
            action,
        }));
        self.schedule_wake.notify_waiters();
    }

    fn output_path(&self, prefix: &str, device: &str, format: &str) -> PathBuf {
        let device = device.trim_start_matches('/').replace('/', "_");
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        self.settings
            .output_dir
            .join(format!("{prefix}_{device}_{stamp}.{format}"))
    }

    /// Sidecar metadata document next to the media file. Failures are
    /// logged, not propagated; the capture itself already succeeded.
    async fn write_metadata(&self, session: &MediaSession) {
        let capabilities = self
            .table
            .get(&session.device)
            .await
            .and_then(|r| r.capabilities);

        let metadata = json!({
            "sessionId": session.id,
            "device": session.device,
            "kind": session.kind,
            "format": session.format,
            "timestamp": session.started_at.map(|t| t.to_rfc3339()),
            "resolution": capabilities.as_ref().map(|c| c.resolution.clone()),
            "fps": capabilities.as_ref().map(|c| c.fps),
            "durationSecs": session.duration_secs,
        });

        let path = PathBuf::from(format!("{}.json", session.output_path.display()));
        let bytes = match serde_json::to_vec_pretty(&metadata) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to serialize metadata for {}: {e}", session.id);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            warn!("failed to write metadata {}: {e}", path.display());
        }
    }
}
