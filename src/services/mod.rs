//! Services module - the filter engine, the print workflow and the capabilities it drives.
//!
//! The services are framework-agnostic: nothing here knows whether events
//! come from stdin, a browser or a test.
//!
//! # Components
//!
//! - [`filter`]: pure filename matching ([`evaluate`] -> [`MatchVerdict`])
//! - [`PrintOrchestrator`]: per-download workflow `FilterCheck -> Opening -> AwaitingReady ->
//!   Triggering -> Finalizing`, history logging and notifications
//! - [`PrintCapability`]: open / wait-ready / trigger-print / dispose seam, with
//!   [`CommandPrinter`] as the subprocess-backed implementation
//! - [`Notifier`]: best-effort user alerts ([`TracingNotifier`], [`CommandNotifier`])
//! - [`DownloadLookup`]: resolves download ids to full records ([`DownloadRegistry`])
//!
//! # Failure handling
//!
//! A failure in one workflow never reaches another. Print-trigger failures
//! degrade to [`PrintStatus::Manual`](crate::models::PrintStatus::Manual);
//! any other failure after the filter check ends the attempt as `error`.
//! Nothing is retried.

pub mod downloads;
pub mod filter;
pub mod notification;
pub mod orchestrator;
pub mod printing;

pub use downloads::{DownloadLookup, DownloadRegistry, FeedMessage, parse_feed_line};
pub use filter::{MatchVerdict, evaluate, leaf_filename};
pub use notification::{
    CommandNotifier, Notification, NotificationKind, Notifier, RecordingNotifier, TracingNotifier,
};
pub use orchestrator::{PrintOrchestrator, PrintTimings, StatusBadge, WorkflowOutcome};
pub use printing::{CommandPrinter, PrintCapability, PrintError, Readiness, Surface, await_ready};
