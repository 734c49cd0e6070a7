//! Background scan loop that keeps the device table accurate.
//!
//! The loop diffs path presence against the table on a fixed interval.
//! Path existence checks run on the blocking pool and probes go through
//! a bounded queue to a small worker pool, so neither a slow filesystem
//! nor a hung probe can delay detection of other devices.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::probe::CapabilityProbe;
use super::table::DeviceTable;
use super::{CameraStatus, StatusUpdate};
use crate::config::MonitorSettings;

const PROBE_WORKERS: usize = 2;

pub struct CameraMonitor {
    table: Arc<DeviceTable>,
    probe: Arc<dyn CapabilityProbe>,
    events: mpsc::UnboundedSender<StatusUpdate>,
    shutdown: Arc<AtomicBool>,
    settings: MonitorSettings,
}

impl CameraMonitor {
    #[must_use]
    pub fn new(
        table: Arc<DeviceTable>,
        probe: Arc<dyn CapabilityProbe>,
        events: mpsc::UnboundedSender<StatusUpdate>,
        shutdown: Arc<AtomicBool>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            table,
            probe,
            events,
            shutdown,
            settings,
        }
    }

    /// Start the scan loop and its probe workers. The returned handle
    /// resolves once the shutdown flag is observed; workers exit when
    /// the probe queue closes behind the loop.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        let (probe_tx, probe_rx) = mpsc::channel::<String>(self.settings.probe_queue_depth);
        let probe_rx = Arc::new(Mutex::new(probe_rx));

        for worker in 0..PROBE_WORKERS {
            let probe = Arc::clone(&self.probe);
            let table = Arc::clone(&self.table);
            let events = self.events.clone();
            let rx = Arc::clone(&probe_rx);
            tokio::spawn(async move {
                loop {
                    let Some(device) = rx.lock().await.recv().await else {
                        break;
                    };
                    probe_one(&*probe, &table, &events, &device).await;
                }
                debug!("probe worker {worker} exiting");
            });
        }

        tokio::spawn(async move {
            self.scan_loop(probe_tx).await;
        })
    }

    async fn scan_loop(self, probe_tx: mpsc::Sender<String>) {
        let mut interval = tokio::time::interval(self.settings.poll_interval());
        let device_paths = self.settings.device_paths();
        info!(
            "camera monitor watching {} paths every {:?}",
            device_paths.len(),
            self.settings.poll_interval()
        );

        loop {
            interval.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                info!("camera monitor shutting down");
                break;
            }

            let paths = device_paths.clone();
            let present = tokio::task::spawn_blocking(move || {
                paths
                    .into_iter()
                    .map(|p| {
                        let exists = Path::new(&p).exists();
                        (p, exists)
                    })
                    .collect::<Vec<_>>()
            })
            .await;

            let Ok(present) = present else {
                warn!("device scan task failed");
                continue;
            };

            for (device, exists) in present {
                self.apply_presence(&device, exists, &probe_tx).await;
            }
        }
    }

    async fn apply_presence(&self, device: &str, exists: bool, probe_tx: &mpsc::Sender<String>) {
        let Some(record) = self.table.get(device).await else {
            return;
        };

        match (record.status, exists) {
            (CameraStatus::Disconnected, true) => {
                // Newly present. Announce only once the probe resolves,
                // so CONNECTED notifications always carry capabilities.
                self.table.mark_pending(device).await;
                match probe_tx.try_send(device.to_string()) {
                    Ok(()) => debug!("queued capability probe for {device}"),
                    Err(_) => {
                        // Queue full or closed; revert so the next scan
                        // retries the whole transition.
                        self.table.mark_disconnected(device).await;
                    }
                }
            }
            (CameraStatus::Connected, false) => {
                let previous = self.table.mark_disconnected(device).await;
                // A device that vanished while its probe was pending was
                // never announced as connected; stay silent for it.
                let announced = previous.is_some_and(|p| p.capabilities.is_some());
                if announced {
                    info!("camera disconnected: {device}");
                    let _ = self.events.send(StatusUpdate {
                        device: device.to_string(),
                        status: CameraStatus::Disconnected,
                        capabilities: None,
                    });
                }
            }
            _ => {}
        }
    }
}

async fn probe_one(
    probe: &dyn CapabilityProbe,
    table: &DeviceTable,
    events: &mpsc::UnboundedSender<StatusUpdate>,
    device: &str,
) {
    match probe.probe(device).await {
        Ok(caps) => {
            if table.resolve_probe(device, caps.clone()).await {
                info!(
                    "camera connected: {device} ({} @ {}fps)",
                    caps.resolution, caps.fps
                );
                let _ = events.send(StatusUpdate {
                    device: device.to_string(),
                    status: CameraStatus::Connected,
                    capabilities: Some(caps),
                });
            } else {
                debug!("probe for {device} resolved after unplug, dropping result");
            }
        }
        Err(e) => {
            // Degrade gracefully: leave the device unannounced and let
            // the next scan cycle retry the probe.
            warn!("capability probe failed for {device}: {e}");
            self_heal(table, device).await;
        }
    }
}

async fn self_heal(table: &DeviceTable, device: &str) {
    table.mark_disconnected(device).await;
}
