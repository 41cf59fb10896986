//! Bounded audit trail of print attempts.
//!
//! Records are kept newest-first. Every append trims the log to the cap
//! passed in by the caller, evicting the oldest entries.
//!
//! Inside a tokio runtime the file is rewritten on the blocking pool so a
//! workflow task never waits on disk; later snapshots always win over
//! earlier ones that finish writing late.

use crate::config::ConfigManager;
use crate::models::PrintAttemptRecord;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Print history, optionally persisted through a [`ConfigManager`].
///
/// Clones share the same records.
#[derive(Clone)]
pub struct HistoryLog {
    records: Arc<Mutex<VecDeque<PrintAttemptRecord>>>,
    persistence: Option<ConfigManager>,
    next_seq: Arc<AtomicU64>,
    written_seq: Arc<Mutex<u64>>,
}

impl HistoryLog {
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::new())),
            persistence: None,
            next_seq: Arc::new(AtomicU64::new(0)),
            written_seq: Arc::new(Mutex::new(0)),
        }
    }

    /// Load the persisted history; an unreadable file starts an empty log.
    pub fn persistent(config_manager: ConfigManager) -> Self {
        let records = match config_manager.load_history() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Starting with empty history: {:#}", e);
                Vec::new()
            }
        };

        Self {
            records: Arc::new(Mutex::new(records.into())),
            persistence: Some(config_manager),
            next_seq: Arc::new(AtomicU64::new(0)),
            written_seq: Arc::new(Mutex::new(0)),
        }
    }

    /// Insert `record` as the newest entry and trim to `cap` entries.
    pub fn append(&self, record: PrintAttemptRecord, cap: usize) {
        let staged = {
            let mut records = self.lock();
            records.push_front(record);
            records.truncate(cap);
            self.stage(&records)
        };
        self.persist(staged);
    }

    /// Re-apply a cap without appending.
    pub fn trim(&self, cap: usize) {
        let staged = {
            let mut records = self.lock();
            if records.len() <= cap {
                return;
            }
            records.truncate(cap);
            self.stage(&records)
        };
        tracing::debug!("Trimmed history to {} records", cap);
        self.persist(staged);
    }

    pub fn clear(&self) {
        let staged = {
            let mut records = self.lock();
            records.clear();
            self.stage(&records)
        };
        self.persist(staged);
        tracing::info!("History cleared");
    }

    /// All records, most recent first.
    pub fn list(&self) -> Vec<PrintAttemptRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PrintAttemptRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number and copy a snapshot for writing; called with the records locked
    /// so sequence order matches mutation order.
    fn stage(
        &self,
        records: &VecDeque<PrintAttemptRecord>,
    ) -> Option<(u64, Vec<PrintAttemptRecord>)> {
        self.persistence.as_ref()?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        Some((seq, records.iter().cloned().collect()))
    }

    fn persist(&self, staged: Option<(u64, Vec<PrintAttemptRecord>)>) {
        let (Some(manager), Some((seq, records))) = (self.persistence.clone(), staged) else {
            return;
        };
        let written_seq = Arc::clone(&self.written_seq);

        let save = move || {
            let mut written = written_seq.lock().unwrap_or_else(|e| e.into_inner());
            if seq <= *written {
                return;
            }
            match manager.save_history(&records) {
                Ok(()) => *written = seq,
                Err(e) => tracing::warn!("Failed to persist history: {:#}", e),
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(save);
            }
            Err(_) => save(),
        }
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrintStatus;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn record(name: &str) -> PrintAttemptRecord {
        PrintAttemptRecord::new(name, format!("/dl/{}", name), PrintStatus::Printed, None, None)
    }

    #[test]
    fn test_append_keeps_newest_first() {
        let log = HistoryLog::in_memory();
        log.append(record("a.pdf"), 10);
        log.append(record("b.pdf"), 10);

        let names: Vec<String> = log.list().into_iter().map(|r| r.filename).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn test_append_evicts_oldest() {
        let log = HistoryLog::in_memory();
        for i in 0..7 {
            log.append(record(&format!("{}.pdf", i)), 3);
        }

        let names: Vec<String> = log.list().into_iter().map(|r| r.filename).collect();
        assert_eq!(names, vec!["6.pdf", "5.pdf", "4.pdf"]);
    }

    #[test]
    fn test_zero_cap_keeps_nothing() {
        let log = HistoryLog::in_memory();
        log.append(record("a.pdf"), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_trim_and_clear() {
        let log = HistoryLog::in_memory();
        for i in 0..5 {
            log.append(record(&format!("{}.pdf", i)), 100);
        }

        log.trim(2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.list()[0].filename, "4.pdf");

        log.clear();
        assert!(log.list().is_empty());
    }

    #[test]
    fn test_persistent_history_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let log = HistoryLog::persistent(ConfigManager::new(&dir).unwrap());
        log.append(record("a.pdf"), 5);
        log.append(record("b.pdf"), 5);

        let reloaded = HistoryLog::persistent(ConfigManager::new(&dir).unwrap());
        let names: Vec<String> = reloaded.list().into_iter().map(|r| r.filename).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_persists_off_the_async_thread_and_keeps_latest() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&dir).unwrap();

        let log = HistoryLog::persistent(manager.clone());
        for i in 0..20 {
            log.append(record(&format!("{}.pdf", i)), 5);
        }

        let expected: Vec<String> = log.list().into_iter().map(|r| r.filename).collect();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let on_disk: Vec<String> = manager
                .load_history()
                .unwrap_or_default()
                .into_iter()
                .map(|r| r.filename)
                .collect();
            if on_disk == expected {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "disk has {:?}", on_disk);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        // Nothing older may land after the newest snapshot
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let on_disk: Vec<String> = manager
            .load_history()
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(on_disk, vec!["19.pdf", "18.pdf", "17.pdf", "16.pdf", "15.pdf"]);
    }

    #[test]
    fn test_corrupt_history_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&dir).unwrap();
        std::fs::write(manager.history_path(), "{{{{ not yaml").unwrap();

        let log = HistoryLog::persistent(manager);
        assert!(log.is_empty());
    }
}
