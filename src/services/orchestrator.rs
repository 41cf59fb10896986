//! Print orchestration.
//!
//! Each completed download runs its own workflow:
//!
//! ```text
//! FilterCheck -> Opening -> AwaitingReady -> (settle) -> Triggering -> Finalizing
//! ```
//!
//! Workflows for different downloads overlap freely; they share only the
//! cached settings snapshot (read-only) and the history log (append).
//! A started workflow always runs to its own terminal state, even if
//! auto-printing is disabled while it is in flight.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;

use crate::history::HistoryLog;
use crate::metrics::Metrics;
use crate::models::{DownloadEvent, DownloadItem, PrintAttemptRecord, PrintStatus, Settings};
use crate::services::downloads::DownloadLookup;
use crate::services::filter::{self, MatchVerdict, leaf_filename};
use crate::services::notification::{NotificationKind, Notifier};
use crate::services::printing::{PrintCapability, PrintError, Readiness, Surface, await_ready};
use crate::state::{SettingsStore, SettingsSubscription};

const NOTIFICATION_TITLE: &str = "AutoPrint";

/// Waits applied while driving a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintTimings {
    /// Upper bound on waiting for the ready signal
    pub ready_timeout: Duration,
    /// Pause between readiness and triggering the print
    pub settle_delay: Duration,
    /// Delay before a surface is disposed, so a print dialog stays visible
    pub dispose_delay: Duration,
}

impl Default for PrintTimings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_millis(500),
            dispose_delay: Duration::from_secs(5),
        }
    }
}

/// Enabled/disabled indicator derived from the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBadge {
    On,
    Off,
}

impl StatusBadge {
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.enabled {
            StatusBadge::On
        } else {
            StatusBadge::Off
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusBadge::On => "ON",
            StatusBadge::Off => "OFF",
        }
    }
}

/// How one download event was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    /// The event was not a transition into `complete`
    Ignored,
    /// Auto-printing is disabled
    Disabled,
    /// The download record could not be resolved
    Unresolved,
    /// The filter rule rejected the file
    Filtered(MatchVerdict),
    /// A print was attempted and recorded
    Finished(PrintAttemptRecord),
}

impl WorkflowOutcome {
    pub fn record(&self) -> Option<&PrintAttemptRecord> {
        match self {
            WorkflowOutcome::Finished(record) => Some(record),
            _ => None,
        }
    }
}

struct SharedSettings {
    cached: RwLock<Settings>,
    badge_tx: watch::Sender<StatusBadge>,
}

impl SharedSettings {
    fn refresh(&self, settings: &Settings, history: &HistoryLog) {
        let previous = {
            let mut cached = self.cached.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *cached, settings.clone())
        };

        self.badge_tx.send_replace(StatusBadge::from_settings(settings));

        if settings.max_history_items < previous.max_history_items {
            history.trim(settings.max_history_items);
        }

        tracing::info!(
            "Settings refreshed: enabled={}, prefix={:?}, extension={:?}, notifications={}, max_history={}",
            settings.enabled,
            settings.prefix_filter,
            settings.extension_filter,
            settings.show_notifications,
            settings.max_history_items
        );
    }
}

/// Drives completed downloads through the print workflow.
///
/// Cheap to clone; clones share settings, collaborators and metrics.
#[derive(Clone)]
pub struct PrintOrchestrator {
    shared: Arc<SharedSettings>,
    downloads: Arc<dyn DownloadLookup>,
    printer: Arc<dyn PrintCapability>,
    notifier: Arc<dyn Notifier>,
    history: HistoryLog,
    metrics: Arc<Metrics>,
    timings: PrintTimings,
    _subscription: Arc<SettingsSubscription>,
}

impl PrintOrchestrator {
    /// Create an orchestrator that follows every change published by `store`.
    ///
    /// `history` is trimmed to the current retention cap right away.
    pub fn new(
        store: &SettingsStore,
        downloads: Arc<dyn DownloadLookup>,
        printer: Arc<dyn PrintCapability>,
        notifier: Arc<dyn Notifier>,
        history: HistoryLog,
    ) -> Self {
        let initial = store.current();
        // The cap may have been lowered while nothing was running
        history.trim(initial.max_history_items);

        let (badge_tx, _) = watch::channel(StatusBadge::from_settings(&initial));
        let shared = Arc::new(SharedSettings {
            cached: RwLock::new(initial),
            badge_tx,
        });

        let listener_shared = Arc::clone(&shared);
        let listener_history = history.clone();
        let subscription = store.on_change(move |settings| {
            listener_shared.refresh(settings, &listener_history);
        });

        Self {
            shared,
            downloads,
            printer,
            notifier,
            history,
            metrics: Arc::new(Metrics::new()),
            timings: PrintTimings::default(),
            _subscription: Arc::new(subscription),
        }
    }

    pub fn with_timings(mut self, timings: PrintTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn timings(&self) -> PrintTimings {
        self.timings
    }

    /// Cached settings snapshot
    pub fn settings(&self) -> Settings {
        self.shared
            .cached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn badge(&self) -> StatusBadge {
        *self.shared.badge_tx.borrow()
    }

    pub fn watch_badge(&self) -> watch::Receiver<StatusBadge> {
        self.shared.badge_tx.subscribe()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Spawn a workflow for `event` if it is a transition into `complete`.
    pub fn handle_event(&self, event: DownloadEvent) -> Option<JoinHandle<WorkflowOutcome>> {
        if !event.is_complete() {
            tracing::trace!(
                "Ignoring download {} transition to {:?}",
                event.id,
                event.state_transitioned_to
            );
            return None;
        }

        let this = self.clone();
        Some(tokio::spawn(async move { this.process(event).await }))
    }

    /// Consume download events until the channel closes.
    ///
    /// Each completed download gets its own task. Returns once every spawned
    /// workflow has reached its terminal state.
    pub async fn run(&self, mut events: mpsc::Receiver<DownloadEvent>) {
        let mut in_flight = JoinSet::new();

        while let Some(event) = events.recv().await {
            if !event.is_complete() {
                continue;
            }

            let this = self.clone();
            in_flight.spawn(async move { this.process(event).await });

            while let Some(result) = in_flight.try_join_next() {
                if let Err(e) = result {
                    tracing::error!("Print workflow task failed: {}", e);
                }
            }
        }

        tracing::info!("Download feed closed, waiting for {} workflow(s)", in_flight.len());

        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                tracing::error!("Print workflow task failed: {}", e);
            }
        }
    }

    /// Run one workflow to its terminal state.
    pub async fn process(&self, event: DownloadEvent) -> WorkflowOutcome {
        if !event.is_complete() {
            return WorkflowOutcome::Ignored;
        }
        self.metrics.record_download();

        // FilterCheck
        let settings = self.settings();
        if !settings.enabled {
            tracing::debug!("Auto-print disabled, ignoring download {}", event.id);
            self.metrics.record_disabled();
            self.downloads.forget(event.id);
            return WorkflowOutcome::Disabled;
        }

        let item = match self.resolve(&event).await {
            Ok(item) => item,
            Err(e) => {
                tracing::error!("Could not resolve download {}: {}", event.id, e);
                self.metrics.record_unresolved();
                return WorkflowOutcome::Unresolved;
            }
        };

        let filename = leaf_filename(item.full_path.as_str()).to_string();
        let verdict = filter::evaluate(&filename, &settings.filter_rule());
        tracing::debug!(
            reasons = ?verdict.reasons,
            "Filter verdict for {}: matches={}",
            filename,
            verdict.matches
        );

        if !verdict.matches {
            self.metrics.record_filtered();
            return WorkflowOutcome::Filtered(verdict);
        }

        tracing::info!("Printing {} (download {})", filename, item.id);
        let started = Instant::now();

        let (status, error_message) = match self.print(&item).await {
            Ok(status) => (status, None),
            Err(e) => {
                tracing::error!("Print workflow for {} failed: {}", filename, e);
                (PrintStatus::Error, Some(e.to_string()))
            }
        };

        self.metrics.record_attempt(status, started.elapsed());
        WorkflowOutcome::Finished(self.finalize(&item, filename, status, error_message))
    }

    /// The record of a completed download is looked up once and then
    /// forgotten by the lookup, whether or not it was found.
    async fn resolve(&self, event: &DownloadEvent) -> Result<DownloadItem, PrintError> {
        let resolved = match event.item() {
            Some(item) => Ok(item),
            None => self.downloads.resolve(event.id).await,
        };
        self.downloads.forget(event.id);
        let item = resolved?;

        if item.full_path.as_str().is_empty() {
            return Err(PrintError::MissingPath(item.id));
        }
        Ok(item)
    }

    /// Opening through Triggering. The surface is scheduled for disposal,
    /// or released to the user when it falls back to manual printing.
    async fn print(&self, item: &DownloadItem) -> Result<PrintStatus, PrintError> {
        tracing::debug!("Opening {}", item.full_path);
        let surface = self.printer.open(&item.full_path).await?;

        let result = self.drive(&surface).await;

        if matches!(result, Ok(PrintStatus::Manual)) {
            let id = surface.id;
            match self.printer.release(surface).await {
                Ok(()) => tracing::debug!("Released surface {} for manual printing", id),
                Err(e) => tracing::warn!("Could not hand surface {} to the user: {}", id, e),
            }
        } else {
            self.schedule_dispose(surface);
        }

        result
    }

    async fn drive(&self, surface: &Surface) -> Result<PrintStatus, PrintError> {
        match await_ready(self.printer.as_ref(), surface, self.timings.ready_timeout).await? {
            Readiness::Ready => tracing::debug!("Surface {} ready", surface.id),
            Readiness::TimedOut => {
                tracing::warn!(
                    "Surface {} not ready after {:?}, printing anyway",
                    surface.id,
                    self.timings.ready_timeout
                );
                self.metrics.record_ready_timeout();
            }
        }

        sleep(self.timings.settle_delay).await;

        match self.printer.trigger_print(surface).await {
            Ok(()) => Ok(PrintStatus::Printed),
            Err(e) if e.is_trigger_failure() => {
                tracing::warn!(
                    "{}; {} left open for manual printing",
                    e,
                    surface.path
                );
                Ok(PrintStatus::Manual)
            }
            Err(e) => Err(e),
        }
    }

    fn schedule_dispose(&self, surface: Surface) {
        let printer = Arc::clone(&self.printer);
        let delay = self.timings.dispose_delay;

        tokio::spawn(async move {
            sleep(delay).await;
            let id = surface.id;
            if let Err(e) = printer.dispose(surface).await {
                tracing::debug!("Ignoring dispose failure for surface {}: {}", id, e);
            }
        });
    }

    fn finalize(
        &self,
        item: &DownloadItem,
        filename: String,
        status: PrintStatus,
        error_message: Option<String>,
    ) -> PrintAttemptRecord {
        let settings = self.settings();

        let record = PrintAttemptRecord::new(
            filename,
            item.full_path.to_string(),
            status,
            item.byte_size,
            error_message,
        );
        self.history.append(record.clone(), settings.max_history_items);

        if settings.show_notifications {
            let (message, kind) = notification_for(&record);
            self.notifier.notify(NOTIFICATION_TITLE, &message, kind);
        }

        tracing::info!("Recorded {} for {}", record.status, record.filename);
        record
    }
}

fn notification_for(record: &PrintAttemptRecord) -> (String, NotificationKind) {
    match record.status {
        PrintStatus::Printed => (
            format!("Printing {}", record.filename),
            NotificationKind::Success,
        ),
        PrintStatus::Manual => (
            format!("{} is open and ready for manual printing", record.filename),
            NotificationKind::Info,
        ),
        PrintStatus::Error => (
            format!(
                "Failed to print {}: {}",
                record.filename,
                record.error_message.as_deref().unwrap_or("unknown error")
            ),
            NotificationKind::Error,
        ),
    }
}
