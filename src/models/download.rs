use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a download by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State a download transitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    #[serde(alias = "in-progress")]
    InProgress,
    Complete,
    Interrupted,
    #[serde(alias = "cancelled")]
    Canceled,
}

/// Download-state-change notification.
///
/// The raw event may lack details; `full_path` is `None` when the source
/// only reported the id and the new state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEvent {
    pub id: DownloadId,
    pub full_path: Option<Utf8PathBuf>,
    pub byte_size: Option<u64>,
    pub state_transitioned_to: DownloadState,
}

impl DownloadEvent {
    /// Event carrying only the id and the new state.
    pub fn transition(id: u64, state: DownloadState) -> Self {
        Self {
            id: DownloadId(id),
            full_path: None,
            byte_size: None,
            state_transitioned_to: state,
        }
    }

    /// Completed-download event with the full record attached.
    pub fn completed(id: u64, full_path: impl Into<Utf8PathBuf>, byte_size: Option<u64>) -> Self {
        Self {
            id: DownloadId(id),
            full_path: Some(full_path.into()),
            byte_size,
            state_transitioned_to: DownloadState::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state_transitioned_to == DownloadState::Complete
    }

    /// The resolved record, if the event carried it.
    pub fn item(&self) -> Option<DownloadItem> {
        self.full_path.as_ref().map(|path| DownloadItem {
            id: self.id,
            full_path: path.clone(),
            byte_size: self.byte_size,
        })
    }
}

/// Full download record as known to the download source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    pub id: DownloadId,
    pub full_path: Utf8PathBuf,
    pub byte_size: Option<u64>,
}
