//! AutoPrint - print completed downloads that match a filter rule
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! `autoprint run` initializes:
//! - Logging infrastructure (file rotation + console output on stderr)
//! - Tokio runtime for the per-download print workflows
//! - Settings store ([`SettingsStore`]) backed by `Settings.yaml`, with a file watcher
//! - Print history ([`HistoryLog`]) backed by `History.yaml`
//! - The [`PrintOrchestrator`], fed by JSON-lines download events on stdin
//!
//! The other subcommands read or change the persisted state and exit.
//!
//! # Execution Flow (run)
//!
//! 1. Load runtime options (autoprint.yaml + AUTOPRINT_* env)
//! 2. Initialize logging -> logs/autoprint.<date>
//! 3. Load settings and history from the data directory
//! 4. Start watching Settings.yaml for live changes
//! 5. Pump stdin into the orchestrator until EOF
//! 6. Wait for in-flight workflows, log the metrics summary

mod cli;

use anyhow::Result;
use autoprint::config::{ConfigManager, load_app_config};
use autoprint::logging::{LogOptions, setup_logging};
use autoprint::services::{
    CommandNotifier, CommandPrinter, DownloadRegistry, Notifier, PrintOrchestrator, PrintTimings,
    TracingNotifier, downloads::pump_feed,
};
use autoprint::state::SettingsStore;
use autoprint::{APP_NAME, AppConfig, HistoryLog, Settings, VERSION};
use camino::Utf8PathBuf;
use clap::Parser;
use cli::{Args, Command, SetArgs, SettingsCommand};
use std::sync::Arc;
use tokio::sync::mpsc;

fn main() -> Result<()> {
    let args = Args::parse();

    let app_config = load_app_config(args.config.as_deref())?;
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from(&app_config.data_dir));

    let command = args.command.unwrap_or(Command::Run);

    // Only the daemon logs to the console; one-shot commands keep stderr quiet
    let mut log_options = LogOptions::new(&app_config.log_dir, "autoprint");
    log_options.debug_mode = app_config.debug || args.verbose > 0;
    log_options.console_output = command == Command::Run || args.verbose > 0;
    let _guard = setup_logging(&log_options)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&data_dir)?;

    match command {
        Command::Run => run(app_config, config_manager),
        Command::History { limit } => {
            show_history(&config_manager, limit);
            Ok(())
        }
        Command::ClearHistory => {
            HistoryLog::persistent(config_manager).clear();
            println!("History cleared");
            Ok(())
        }
        Command::Settings { action } => match action {
            SettingsCommand::Show => {
                print_settings(&config_manager.load_settings());
                Ok(())
            }
            SettingsCommand::Set(set) => set_settings(config_manager, set),
        },
    }
}

fn run(app_config: AppConfig, config_manager: ConfigManager) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("autoprint-worker")
        .build()?;

    runtime.block_on(async move {
        let store = SettingsStore::with_persistence(config_manager.clone());
        let history = HistoryLog::persistent(config_manager.clone());
        let registry = Arc::new(DownloadRegistry::new());

        let mut printer =
            CommandPrinter::new(app_config.print_command.clone(), app_config.print_timeout());
        if let Some(viewer) = &app_config.viewer_command {
            printer = printer.with_viewer(viewer.clone());
        }
        let printer = Arc::new(printer);
        let notifier: Arc<dyn Notifier> = match &app_config.notify_command {
            Some(program) => Arc::new(CommandNotifier::new(program.clone())),
            None => Arc::new(TracingNotifier),
        };

        let orchestrator =
            PrintOrchestrator::new(&store, registry.clone(), printer, notifier, history)
                .with_timings(PrintTimings {
                    ready_timeout: app_config.ready_timeout(),
                    settle_delay: app_config.settle_delay(),
                    dispose_delay: app_config.dispose_delay(),
                });

        let _watcher = match config_manager.watch_settings(store.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!("Live settings reload unavailable: {:#}", e);
                None
            }
        };

        let mut badge_rx = orchestrator.watch_badge();
        tracing::info!("Auto-print {}", badge_rx.borrow_and_update().label());
        let badge_task = tokio::spawn(async move {
            while badge_rx.changed().await.is_ok() {
                tracing::info!("Auto-print {}", badge_rx.borrow_and_update().label());
            }
        });

        let (tx, rx) = mpsc::channel(100);
        let feed_registry = registry.clone();
        let feed = tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            pump_feed(stdin, &feed_registry, tx).await
        });

        orchestrator.run(rx).await;

        match feed.await {
            Ok(Ok(count)) => tracing::info!("Download feed ended after {} events", count),
            Ok(Err(e)) => tracing::error!("Download feed failed: {:#}", e),
            Err(e) => tracing::error!("Download feed task failed: {}", e),
        }

        badge_task.abort();
        orchestrator.metrics().log_summary();
    });

    // Let fire-and-forget dispose timers finish
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    tracing::info!("Shutdown complete");
    Ok(())
}

fn show_history(config_manager: &ConfigManager, limit: Option<usize>) {
    let history = HistoryLog::persistent(config_manager.clone());
    let records = history.list();

    if records.is_empty() {
        println!("No print attempts recorded");
        return;
    }

    for record in records.iter().take(limit.unwrap_or(usize::MAX)) {
        let size = record
            .file_size
            .map(|s| format!(" ({} bytes)", s))
            .unwrap_or_default();
        let error = record
            .error_message
            .as_deref()
            .map(|e| format!(" - {}", e))
            .unwrap_or_default();
        println!(
            "{}  {:<7}  {}{}{}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.status,
            record.full_path,
            size,
            error
        );
    }
}

fn print_settings(settings: &Settings) {
    println!("enabled:            {}", settings.enabled);
    println!("prefix filter:      {:?}", settings.prefix_filter);
    println!("extension filter:   {:?}", settings.extension_filter);
    println!("show notifications: {}", settings.show_notifications);
    println!("max history items:  {}", settings.max_history_items);
}

fn set_settings(config_manager: ConfigManager, set: SetArgs) -> Result<()> {
    if set.is_empty() {
        anyhow::bail!("Nothing to change; see `autoprint settings set --help`");
    }

    let store = SettingsStore::with_persistence(config_manager.clone());
    let changes = store.update(|s| {
        if let Some(enabled) = set.enabled {
            s.enabled = enabled;
        }
        if let Some(prefix) = set.prefix {
            s.prefix_filter = prefix;
        }
        if let Some(extension) = set.extension {
            s.extension_filter = extension;
        }
        if let Some(show) = set.notifications {
            s.show_notifications = show;
        }
        if let Some(max) = set.max_history {
            s.max_history_items = max;
        }
    });

    let settings = store.current();
    // Apply a lowered retention cap to the stored history right away
    HistoryLog::persistent(config_manager).trim(settings.max_history_items);

    if changes.is_empty() {
        println!("Settings unchanged");
    }
    print_settings(&settings);
    Ok(())
}
