use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_RECORD_ID: AtomicI64 = AtomicI64::new(0);

/// Terminal status of a print attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintStatus {
    /// The print action was triggered.
    Printed,
    /// The print action could not be invoked; the file was left open for
    /// the user to print by hand.
    Manual,
    Error,
}

impl PrintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrintStatus::Printed => "printed",
            PrintStatus::Manual => "manual",
            PrintStatus::Error => "error",
        }
    }

    /// `Printed` and `Manual` both mean the file reached the user.
    pub fn is_success(&self) -> bool {
        !matches!(self, PrintStatus::Error)
    }
}

impl fmt::Display for PrintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the print audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintAttemptRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    pub full_path: String,
    pub status: PrintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PrintAttemptRecord {
    pub fn new(
        filename: impl Into<String>,
        full_path: impl Into<String>,
        status: PrintStatus,
        file_size: Option<u64>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id: Self::next_id(),
            timestamp: Utc::now(),
            filename: filename.into(),
            full_path: full_path.into(),
            status,
            file_size,
            error_message,
        }
    }

    /// Time-derived id (epoch milliseconds), strictly increasing within the process.
    pub fn next_id() -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = LAST_RECORD_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_RECORD_ID.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let ids: Vec<i64> = (0..50).map(|_| PrintAttemptRecord::next_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let record = PrintAttemptRecord::new("a.pdf", "/tmp/a.pdf", PrintStatus::Manual, Some(12), None);
        let yaml = serde_yaml_ng::to_string(&record).unwrap();
        assert!(yaml.contains("status: manual"));
        assert!(yaml.contains("fullPath: /tmp/a.pdf"));
        assert!(yaml.contains("fileSize: 12"));
        assert!(!yaml.contains("errorMessage"));
    }

    #[test]
    fn test_success_statuses() {
        assert!(PrintStatus::Printed.is_success());
        assert!(PrintStatus::Manual.is_success());
        assert!(!PrintStatus::Error.is_success());
    }
}
