//! Concurrency-safe device table, the single source of truth for camera
//! presence. Mutated only by the monitor; read by handlers and the
//! notification fan-out.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use super::{CameraCapabilities, CameraRecord, CameraStatus};

#[derive(Debug)]
pub struct DeviceTable {
    records: RwLock<HashMap<String, CameraRecord>>,
}

impl DeviceTable {
    /// Seed the table with every configured path as `DISCONNECTED`, so
    /// the burst sent to a joining client always covers the full range.
    #[must_use]
    pub fn new(device_paths: &[String]) -> Self {
        let records = device_paths
            .iter()
            .map(|path| (path.clone(), CameraRecord::disconnected(path.clone())))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn get(&self, device: &str) -> Option<CameraRecord> {
        self.records.read().await.get(device).cloned()
    }

    /// True when the device is a known path currently marked connected.
    pub async fn is_connected(&self, device: &str) -> bool {
        self.records
            .read()
            .await
            .get(device)
            .is_some_and(CameraRecord::is_connected)
    }

    pub async fn contains(&self, device: &str) -> bool {
        self.records.read().await.contains_key(device)
    }

    /// Full table, ordered by device path for stable listings.
    pub async fn snapshot(&self) -> Vec<CameraRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.device.cmp(&b.device));
        records
    }

    /// `(total, connected)` counts.
    pub async fn counts(&self) -> (usize, usize) {
        let records = self.records.read().await;
        let connected = records.values().filter(|r| r.is_connected()).count();
        (records.len(), connected)
    }

    /// Mark a device connected with `capabilities: None` while its probe
    /// is in flight. Returns false for unknown paths.
    pub async fn mark_pending(&self, device: &str) -> bool {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(device) else {
            return false;
        };
        record.status = CameraStatus::Connected;
        record.capabilities = None;
        record.last_changed_at = Utc::now();
        true
    }

    /// Resolve a probe: attach capabilities to a connected record.
    /// Returns false if the device is unknown or no longer connected
    /// (unplugged while the probe ran).
    pub async fn resolve_probe(&self, device: &str, capabilities: CameraCapabilities) -> bool {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(device) else {
            return false;
        };
        if record.status != CameraStatus::Connected {
            return false;
        }
        record.capabilities = Some(capabilities);
        record.last_changed_at = Utc::now();
        true
    }

    /// Mark a device disconnected, dropping capabilities. Returns the
    /// previous record so the caller can decide whether the transition
    /// was ever announced.
    pub async fn mark_disconnected(&self, device: &str) -> Option<CameraRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(device)?;
        let previous = record.clone();
        record.status = CameraStatus::Disconnected;
        record.capabilities = None;
        record.last_changed_at = Utc::now();
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(n: u32) -> Vec<String> {
        (0..n).map(|i| format!("/dev/video{i}")).collect()
    }

    #[tokio::test]
    async fn test_new_seeds_all_paths_disconnected() {
        let table = DeviceTable::new(&paths(3));
        let snapshot = table.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert!(
            snapshot
                .iter()
                .all(|r| r.status == CameraStatus::Disconnected)
        );
        assert!(snapshot.iter().all(|r| r.capabilities.is_none()));
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted_by_device() {
        let table = DeviceTable::new(&paths(10));
        let snapshot = table.snapshot().await;
        let devices: Vec<_> = snapshot.iter().map(|r| r.device.clone()).collect();
        let mut sorted = devices.clone();
        sorted.sort();
        assert_eq!(devices, sorted);
    }

    #[tokio::test]
    async fn test_mark_pending_then_resolve() {
        let table = DeviceTable::new(&paths(1));
        assert!(table.mark_pending("/dev/video0").await);

        let record = table.get("/dev/video0").await.unwrap();
        assert_eq!(record.status, CameraStatus::Connected);
        assert!(record.capabilities.is_none(), "probe still pending");

        assert!(
            table
                .resolve_probe("/dev/video0", CameraCapabilities::fallback())
                .await
        );
        let record = table.get("/dev/video0").await.unwrap();
        assert_eq!(
            record.capabilities.as_ref().unwrap().resolution,
            "640x480"
        );
    }

    #[tokio::test]
    async fn test_resolve_probe_after_unplug_is_rejected() {
        let table = DeviceTable::new(&paths(1));
        table.mark_pending("/dev/video0").await;
        table.mark_disconnected("/dev/video0").await;

        assert!(
            !table
                .resolve_probe("/dev/video0", CameraCapabilities::fallback())
                .await
        );
        let record = table.get("/dev/video0").await.unwrap();
        assert!(record.capabilities.is_none());
    }

    #[tokio::test]
    async fn test_mark_disconnected_returns_previous_record() {
        let table = DeviceTable::new(&paths(1));
        table.mark_pending("/dev/video0").await;
        table
            .resolve_probe("/dev/video0", CameraCapabilities::fallback())
            .await;

        let previous = table.mark_disconnected("/dev/video0").await.unwrap();
        assert_eq!(previous.status, CameraStatus::Connected);
        assert!(previous.capabilities.is_some());

        let current = table.get("/dev/video0").await.unwrap();
        assert_eq!(current.status, CameraStatus::Disconnected);
        assert!(current.capabilities.is_none());
    }

    #[tokio::test]
    async fn test_unknown_device_operations() {
        let table = DeviceTable::new(&paths(1));
        assert!(!table.mark_pending("/dev/video9").await);
        assert!(table.mark_disconnected("/dev/video9").await.is_none());
        assert!(table.get("/dev/video9").await.is_none());
        assert!(!table.contains("/dev/video9").await);
        assert!(!table.is_connected("/dev/video9").await);
    }

    #[tokio::test]
    async fn test_counts() {
        let table = DeviceTable::new(&paths(4));
        table.mark_pending("/dev/video1").await;
        table.mark_pending("/dev/video2").await;

        let (total, connected) = table.counts().await;
        assert_eq!(total, 4);
        assert_eq!(connected, 2);
    }
}
