// AutoPrint - print completed downloads that match a filter rule
//
// This is the library crate containing the filter engine, the print workflow and its collaborators.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use history::HistoryLog;
pub use models::{AppConfig, DownloadEvent, FilterRule, PrintAttemptRecord, PrintStatus, Settings};
pub use services::{PrintOrchestrator, WorkflowOutcome};
pub use state::{SettingsChange, SettingsStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
