use crate::models::{AppConfig, DEFAULT_MAX_HISTORY_ITEMS, PrintAttemptRecord, Settings, normalize_extension};
use crate::state::SettingsStore;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_yaml_ng::Value;
use std::ffi::OsStr;
use std::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// File backing the `settings` key
pub const SETTINGS_FILE: &str = "Settings.yaml";

/// File backing the `history` key
pub const HISTORY_FILE: &str = "History.yaml";

/// Configuration manager for the persisted key-value state.
///
/// Manages two files in the data directory:
/// - `Settings.yaml`: the user [`Settings`], validated field-by-field on every read
/// - `History.yaml`: the print history, newest first
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    history_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified data directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create data directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            history_path: config_dir.join(HISTORY_FILE),
            config_dir,
        })
    }

    /// Load the user settings.
    ///
    /// Never fails: a missing or unreadable file yields defaults, and each
    /// missing or mistyped field falls back to its own default.
    pub fn load_settings(&self) -> Settings {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            return Settings::default();
        }

        let contents = match fs::read_to_string(&self.settings_path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!("Failed to read settings {}: {}", self.settings_path, e);
                return Settings::default();
            }
        };

        match serde_yaml_ng::from_str::<Value>(&contents) {
            Ok(value) => {
                tracing::info!("Loaded settings from {}", self.settings_path);
                validate_settings(&value)
            }
            Err(e) => {
                tracing::error!(
                    "Failed to parse settings {}: {}; using defaults",
                    self.settings_path,
                    e
                );
                Settings::default()
            }
        }
    }

    /// Save the user settings in normalized form.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(&settings.clone().normalized())
            .context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Load the print history, newest first.
    ///
    /// Returns an empty history if the file doesn't exist.
    pub fn load_history(&self) -> Result<Vec<PrintAttemptRecord>> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.history_path)
            .with_context(|| format!("Failed to read history: {}", self.history_path))?;

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<PrintAttemptRecord> = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse history: {}", self.history_path))?;

        tracing::debug!("Loaded {} history records from {}", records.len(), self.history_path);
        Ok(records)
    }

    /// Save the print history.
    pub fn save_history(&self, records: &[PrintAttemptRecord]) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(records).context("Failed to serialize history to YAML")?;

        fs::write(&self.history_path, yaml_string)
            .with_context(|| format!("Failed to write history: {}", self.history_path))?;

        tracing::debug!("Saved {} history records to {}", records.len(), self.history_path);
        Ok(())
    }

    /// Watch `Settings.yaml` and push every external edit into `store`.
    ///
    /// Must be called from within a tokio runtime. Watching stops when the
    /// returned [`SettingsWatcher`] is dropped.
    pub fn watch_settings(&self, store: SettingsStore) -> Result<SettingsWatcher> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .context("Failed to create settings watcher")?;

        watcher
            .watch(self.config_dir.as_std_path(), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.config_dir))?;

        let manager = self.clone();
        let task = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) if is_settings_write(&event) => {
                        store.apply_external(manager.load_settings());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Watch error: {}", e),
                }
            }
        });

        tracing::info!("Watching {} for settings changes", self.config_dir);
        Ok(SettingsWatcher {
            _watcher: watcher,
            task,
        })
    }

    /// Get the data directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    pub fn history_path(&self) -> &Utf8Path {
        &self.history_path
    }
}

fn is_settings_write(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(OsStr::new(SETTINGS_FILE)))
}

/// Keeps the settings file watch alive.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Build [`Settings`] from a loosely-typed document.
///
/// Each field is taken only if present with the right type; otherwise its
/// default is used. The extension filter is normalized.
pub fn validate_settings(value: &Value) -> Settings {
    let defaults = Settings::default();

    if !value.is_mapping() {
        tracing::warn!("Settings document is not a mapping, using defaults");
        return defaults;
    }

    let field = |key: &str| {
        let found = value.get(key);
        if found.is_none() {
            tracing::debug!("Settings field {} missing, using default", key);
        }
        found
    };

    let mistyped = |key: &str| {
        tracing::warn!("Settings field {} has an unexpected type, using default", key);
    };

    let enabled = match field("enabled") {
        Some(v) => v.as_bool().unwrap_or_else(|| {
            mistyped("enabled");
            defaults.enabled
        }),
        None => defaults.enabled,
    };

    let prefix_filter = match field("prefixFilter") {
        Some(v) => v.as_str().map(str::to_string).unwrap_or_else(|| {
            mistyped("prefixFilter");
            defaults.prefix_filter.clone()
        }),
        None => defaults.prefix_filter.clone(),
    };

    let extension_filter = match field("extensionFilter") {
        Some(v) => v.as_str().map(normalize_extension).unwrap_or_else(|| {
            mistyped("extensionFilter");
            defaults.extension_filter.clone()
        }),
        None => defaults.extension_filter.clone(),
    };

    let show_notifications = match field("showNotifications") {
        Some(v) => v.as_bool().unwrap_or_else(|| {
            mistyped("showNotifications");
            defaults.show_notifications
        }),
        None => defaults.show_notifications,
    };

    let max_history_items = match field("maxHistoryItems") {
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_else(|| {
                mistyped("maxHistoryItems");
                DEFAULT_MAX_HISTORY_ITEMS
            }),
        None => defaults.max_history_items,
    };

    Settings {
        enabled,
        prefix_filter,
        extension_filter,
        show_notifications,
        max_history_items,
    }
}

/// Load runtime options.
///
/// Sources, later ones overriding earlier ones:
/// 1. built-in defaults
/// 2. `file` if given (required), otherwise an optional `autoprint.{yaml,toml,json}` in the working directory
/// 3. `AUTOPRINT_*` environment variables (e.g. `AUTOPRINT_PRINT_COMMAND`)
pub fn load_app_config(file: Option<&Utf8Path>) -> Result<AppConfig> {
    let builder = ::config::Config::builder();

    let builder = match file {
        Some(path) => builder.add_source(::config::File::with_name(path.as_str()).required(true)),
        None => builder.add_source(::config::File::with_name("autoprint").required(false)),
    };

    let config = builder
        .add_source(::config::Environment::with_prefix("AUTOPRINT").try_parsing(true))
        .build()
        .context("Failed to load runtime configuration")?;

    let app_config: AppConfig = config
        .try_deserialize()
        .context("Failed to parse runtime configuration")?;

    tracing::debug!("Runtime configuration: {:?}", app_config);
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrintStatus;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_missing_settings_use_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert_eq!(manager.load_settings(), Settings::default());
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_config_manager();

        let settings = Settings {
            enabled: true,
            prefix_filter: "invoice_".to_string(),
            extension_filter: ".PDF".to_string(),
            show_notifications: false,
            max_history_items: 10,
        };
        manager.save_settings(&settings).unwrap();

        let loaded = manager.load_settings();
        assert!(loaded.enabled);
        assert_eq!(loaded.prefix_filter, "invoice_");
        assert_eq!(loaded.extension_filter, "pdf");
        assert!(!loaded.show_notifications);
        assert_eq!(loaded.max_history_items, 10);
    }

    #[test]
    fn test_mistyped_fields_fall_back_individually() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(
            manager.settings_path(),
            "enabled: \"yes\"\nprefixFilter: scan_\nextensionFilter: 7\nshowNotifications: false\nmaxHistoryItems: -3\nunknown: 1\n",
        )
        .unwrap();

        let loaded = manager.load_settings();
        assert!(!loaded.enabled);
        assert_eq!(loaded.prefix_filter, "scan_");
        assert_eq!(loaded.extension_filter, "");
        assert!(!loaded.show_notifications);
        assert_eq!(loaded.max_history_items, 100);
    }

    #[test]
    fn test_non_mapping_settings_use_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.settings_path(), "- just\n- a list\n").unwrap();
        assert_eq!(manager.load_settings(), Settings::default());

        fs::write(manager.settings_path(), "enabled: [unclosed").unwrap();
        assert_eq!(manager.load_settings(), Settings::default());
    }

    #[test]
    fn test_load_save_history() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.load_history().unwrap().is_empty());

        let records = vec![
            PrintAttemptRecord::new("b.pdf", "/dl/b.pdf", PrintStatus::Error, None, Some("boom".into())),
            PrintAttemptRecord::new("a.pdf", "/dl/a.pdf", PrintStatus::Printed, Some(3), None),
        ];
        manager.save_history(&records).unwrap();

        let loaded = manager.load_history().unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_load_app_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("runtime.yaml")).unwrap();
        fs::write(&path, "print_command: \"lpr {path}\"\nready_timeout_ms: 1500\n").unwrap();

        let config = load_app_config(Some(&path)).unwrap();
        assert_eq!(config.print_command, "lpr {path}");
        assert_eq!(config.ready_timeout_ms, 1500);
        assert_eq!(config.settle_delay_ms, 500);
    }
}
