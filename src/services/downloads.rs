//! Download records and the inbound event feed.
//!
//! The daemon reads one JSON object per line:
//!
//! ```text
//! {"id": 7, "filename": "/home/me/Downloads/invoice.pdf", "fileSize": 5120, "state": {"current": "in_progress"}}
//! {"id": 7, "state": {"current": "complete"}}
//! ```
//!
//! Lines that carry `filename` upsert the [`DownloadRegistry`]; lines with a
//! `state` become [`DownloadEvent`]s for the orchestrator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::models::{DownloadEvent, DownloadId, DownloadItem, DownloadState};
use crate::services::printing::PrintError;

/// Resolves a download id to its full record.
#[async_trait]
pub trait DownloadLookup: Send + Sync {
    async fn resolve(&self, id: DownloadId) -> Result<DownloadItem, PrintError>;

    /// Drop whatever is kept for a download that reached a terminal state.
    fn forget(&self, _id: DownloadId) {}
}

/// In-memory download records keyed by id.
#[derive(Debug, Default)]
pub struct DownloadRegistry {
    items: RwLock<HashMap<DownloadId, DownloadItem>>,
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a record. A missing size keeps the previously known one.
    pub fn upsert(&self, item: DownloadItem) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let byte_size = item
            .byte_size
            .or_else(|| items.get(&item.id).and_then(|known| known.byte_size));
        items.insert(item.id, DownloadItem { byte_size, ..item });
    }

    pub fn get(&self, id: DownloadId) -> Option<DownloadItem> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn remove(&self, id: DownloadId) -> Option<DownloadItem> {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DownloadLookup for DownloadRegistry {
    async fn resolve(&self, id: DownloadId) -> Result<DownloadItem, PrintError> {
        self.get(id).ok_or(PrintError::DownloadNotFound(id))
    }

    fn forget(&self, id: DownloadId) {
        self.remove(id);
    }
}

#[derive(Debug, Deserialize)]
struct FeedState {
    current: DownloadState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedLine {
    id: u64,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    state: Option<FeedState>,
}

/// One decoded feed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    /// Record details carried by the line, if any
    pub item: Option<DownloadItem>,
    /// State transition carried by the line, if any
    pub event: Option<DownloadEvent>,
}

/// Decode one feed line. Returns `Ok(None)` for blank lines.
pub fn parse_feed_line(line: &str) -> Result<Option<FeedMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let raw: FeedLine = serde_json::from_str(line)
        .with_context(|| format!("Failed to parse download event: {}", line))?;

    let id = DownloadId(raw.id);
    let item = raw
        .filename
        .filter(|f| !f.is_empty())
        .map(|filename| DownloadItem {
            id,
            full_path: Utf8PathBuf::from(filename),
            byte_size: raw.file_size,
        });

    let event = raw.state.map(|state| DownloadEvent {
        id,
        full_path: item.as_ref().map(|i| i.full_path.clone()),
        byte_size: item.as_ref().and_then(|i| i.byte_size),
        state_transitioned_to: state.current,
    });

    Ok(Some(FeedMessage { item, event }))
}

/// Read feed lines from `reader` until EOF, keeping `registry` current and
/// forwarding every state transition to `events`.
///
/// Interrupted and canceled downloads are dropped from the registry here;
/// completed ones are dropped by the orchestrator once it has resolved them.
/// Malformed lines are logged and skipped. Returns the number of events
/// forwarded; stops early if the receiving side is gone.
pub async fn pump_feed<R>(
    reader: R,
    registry: &DownloadRegistry,
    events: mpsc::Sender<DownloadEvent>,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read download feed")? {
        let message = match parse_feed_line(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Skipping feed line: {:#}", e);
                continue;
            }
        };

        if let Some(item) = message.item {
            registry.upsert(item);
        }

        if let Some(event) = message.event {
            if matches!(
                event.state_transitioned_to,
                DownloadState::Interrupted | DownloadState::Canceled
            ) {
                registry.remove(event.id);
            }
            if events.send(event).await.is_err() {
                tracing::warn!("Orchestrator stopped, closing download feed");
                break;
            }
            forwarded += 1;
        }
    }

    Ok(forwarded)
}
