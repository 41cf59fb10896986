//! Data models for the AutoPrint application.
//!
//! - [`Settings`]: user preferences persisted in `Settings.yaml`
//! - [`FilterRule`]: the prefix/extension pair evaluated by the filter engine
//! - [`DownloadEvent`] / [`DownloadItem`]: inbound download-state notifications and resolved records
//! - [`PrintAttemptRecord`] / [`PrintStatus`]: entries of the bounded print history
//! - [`AppConfig`]: runtime options of the daemon

pub mod config;
pub mod download;
pub mod history;
pub mod settings;

pub use config::AppConfig;
pub use download::{DownloadEvent, DownloadId, DownloadItem, DownloadState};
pub use history::{PrintAttemptRecord, PrintStatus};
pub use settings::{DEFAULT_MAX_HISTORY_ITEMS, FilterRule, Settings, normalize_extension};
