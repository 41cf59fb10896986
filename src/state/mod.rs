// State management module
//
// This module provides the SettingsStore which wraps Settings with thread-safe access
// using Arc<RwLock<T>>, emits change events and calls registered listeners.

use crate::config::ConfigManager;
use crate::models::Settings;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::broadcast;

/// Change events emitted when settings are modified
#[derive(Clone, Debug, PartialEq)]
pub enum SettingsChange {
    /// Auto-printing was switched on or off
    EnabledChanged { enabled: bool },

    /// Prefix or extension filter was updated
    FilterChanged { prefix: String, extension: String },

    /// Notification preference was toggled
    NotificationsChanged { show: bool },

    /// History retention cap was changed
    RetentionChanged { max_history_items: usize },
}

type Listener = Arc<dyn Fn(&Settings) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    callbacks: Mutex<BTreeMap<u64, Listener>>,
}

/// Thread-safe settings store with event emission
///
/// This is the configuration provider consumed by the orchestrator:
/// - [`current()`](Self::current) returns a snapshot of the live settings
/// - [`update()`](Self::update) / [`replace()`](Self::replace) mutate, normalize, persist and notify
/// - [`subscribe()`](Self::subscribe) yields [`SettingsChange`] events on a broadcast channel
/// - [`on_change()`](Self::on_change) registers a callback that receives the new snapshot
///
/// Mutations are serialized end to end: the change, its write to disk and
/// the listener calls for one update all finish before the next update
/// starts, so listeners always see snapshots in commit order and the last
/// snapshot delivered equals [`current()`](Self::current). Listeners run
/// synchronously inside the mutating call and must not mutate the store.
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    mutation: Arc<Mutex<()>>,
    change_tx: broadcast::Sender<SettingsChange>,
    listeners: Arc<Listeners>,
    persistence: Option<ConfigManager>,
}

impl SettingsStore {
    /// Create a store holding `initial`, without persistence
    ///
    /// The broadcast channel buffers 100 events.
    pub fn new(initial: Settings) -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            settings: Arc::new(RwLock::new(initial.normalized())),
            mutation: Arc::new(Mutex::new(())),
            change_tx,
            listeners: Arc::new(Listeners::default()),
            persistence: None,
        }
    }

    /// Load the persisted settings and write back every local change
    pub fn with_persistence(config_manager: ConfigManager) -> Self {
        let initial = config_manager.load_settings();
        let mut store = Self::new(initial);
        store.persistence = Some(config_manager);
        store
    }

    /// Get a snapshot of the current settings
    pub fn current(&self) -> Settings {
        self.settings.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Execute a function with read access to the settings
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Settings) -> R,
    {
        let settings = self.settings.read().unwrap_or_else(|e| e.into_inner());
        f(&settings)
    }

    /// Update the settings, persist them and emit change events
    ///
    /// Returns the changes that were emitted; an update that changes nothing
    /// emits nothing and skips persistence.
    pub fn update<F>(&self, update_fn: F) -> Vec<SettingsChange>
    where
        F: FnOnce(&mut Settings),
    {
        let _serialized = self.lock_mutation();
        let (changes, snapshot) = self.apply(update_fn);

        if !changes.is_empty() {
            if let Some(manager) = &self.persistence {
                if let Err(e) = manager.save_settings(&snapshot) {
                    tracing::error!("Failed to persist settings: {:#}", e);
                }
            }
            self.notify(&changes, &snapshot);
        }

        changes
    }

    /// Overwrite all settings (the "save settings" path)
    pub fn replace(&self, settings: Settings) -> Vec<SettingsChange> {
        self.update(move |s| *s = settings)
    }

    /// Adopt settings that were changed outside this process
    ///
    /// Same as [`replace()`](Self::replace) but never writes back, so a file
    /// watcher feeding this does not loop on its own writes.
    pub fn apply_external(&self, settings: Settings) -> Vec<SettingsChange> {
        let _serialized = self.lock_mutation();
        let (changes, snapshot) = self.apply(move |s| *s = settings);
        if !changes.is_empty() {
            tracing::info!("Settings reloaded: {} change(s)", changes.len());
            self.notify(&changes, &snapshot);
        }
        changes
    }

    /// Subscribe to settings change events
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.change_tx.subscribe()
    }

    /// Register a callback invoked with the new snapshot after every change
    ///
    /// The listener stays registered until the returned subscription is
    /// dropped or [`unsubscribe()`](SettingsSubscription::unsubscribe)d.
    pub fn on_change<F>(&self, callback: F) -> SettingsSubscription
    where
        F: Fn(&Settings) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(callback));

        SettingsSubscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of registered `on_change` listeners
    pub fn listener_count(&self) -> usize {
        self.listeners
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn lock_mutation(&self) -> std::sync::MutexGuard<'_, ()> {
        self.mutation.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply<F>(&self, update_fn: F) -> (Vec<SettingsChange>, Settings)
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        let old = settings.clone();

        update_fn(&mut settings);
        *settings = settings.clone().normalized();

        let changes = Self::detect_changes(&old, &settings);
        (changes, settings.clone())
    }

    fn notify(&self, changes: &[SettingsChange], snapshot: &Settings) {
        for change in changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.change_tx.send(change.clone());
        }

        // Clone the callbacks out so a listener may register or drop subscriptions
        let callbacks: Vec<Listener> = self
            .listeners
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        for callback in callbacks {
            callback(snapshot);
        }
    }

    /// Detect what changed between two snapshots and generate events
    fn detect_changes(old: &Settings, new: &Settings) -> Vec<SettingsChange> {
        let mut changes = Vec::new();

        if old.enabled != new.enabled {
            changes.push(SettingsChange::EnabledChanged {
                enabled: new.enabled,
            });
        }

        if old.prefix_filter != new.prefix_filter || old.extension_filter != new.extension_filter {
            changes.push(SettingsChange::FilterChanged {
                prefix: new.prefix_filter.clone(),
                extension: new.extension_filter.clone(),
            });
        }

        if old.show_notifications != new.show_notifications {
            changes.push(SettingsChange::NotificationsChanged {
                show: new.show_notifications,
            });
        }

        if old.max_history_items != new.max_history_items {
            changes.push(SettingsChange::RetentionChanged {
                max_history_items: new.max_history_items,
            });
        }

        changes
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

// Clones share the same settings, channel and listeners
impl Clone for SettingsStore {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            mutation: Arc::clone(&self.mutation),
            change_tx: self.change_tx.clone(),
            listeners: Arc::clone(&self.listeners),
            persistence: self.persistence.clone(),
        }
    }
}

/// Handle returned by [`SettingsStore::on_change`]; removes the listener when dropped
pub struct SettingsSubscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl SettingsSubscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for SettingsSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .callbacks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[test]
    fn test_new_store_normalizes() {
        let store = SettingsStore::new(Settings {
            extension_filter: ".PDF".to_string(),
            ..Settings::default()
        });
        assert_eq!(store.current().extension_filter, "pdf");
    }

    #[test]
    fn test_update_with_change_detection() {
        let store = SettingsStore::default();

        let changes = store.update(|s| {
            s.enabled = true;
            s.prefix_filter = "invoice_".to_string();
        });

        assert_eq!(changes.len(), 2);
        assert!(matches!(changes[0], SettingsChange::EnabledChanged { enabled: true }));
        assert!(matches!(changes[1], SettingsChange::FilterChanged { .. }));
    }

    #[test]
    fn test_noop_update_emits_nothing() {
        let store = SettingsStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = store.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let changes = store.replace(Settings::default());
        assert!(changes.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_normalization_is_not_a_change() {
        let store = SettingsStore::new(Settings {
            extension_filter: "pdf".to_string(),
            ..Settings::default()
        });
        let changes = store.update(|s| s.extension_filter = ".PDF".to_string());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_on_change_receives_snapshot() {
        let store = SettingsStore::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.on_change(move |s| sink.lock().unwrap().push(s.enabled));

        store.update(|s| s.enabled = true);
        store.update(|s| s.enabled = false);

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let store = SettingsStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = store.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(store.listener_count(), 1);

        store.update(|s| s.enabled = true);
        sub.unsubscribe();
        assert_eq!(store.listener_count(), 0);

        store.update(|s| s.enabled = false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_to_changes() {
        let store = SettingsStore::default();
        let mut rx = store.subscribe();

        store.update(|s| s.max_history_items = 5);

        let event = rx.try_recv();
        assert!(matches!(
            event,
            Ok(SettingsChange::RetentionChanged { max_history_items: 5 })
        ));
    }

    #[test]
    fn test_clone_shares_state() {
        let store1 = SettingsStore::default();
        let store2 = store1.clone();

        store1.update(|s| s.show_notifications = false);
        assert!(!store2.current().show_notifications);
    }

    #[test]
    fn test_persistence_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let dir = camino::Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let store = SettingsStore::with_persistence(ConfigManager::new(&dir).unwrap());
        store.update(|s| {
            s.enabled = true;
            s.extension_filter = "PDF".to_string();
        });

        let reloaded = SettingsStore::with_persistence(ConfigManager::new(&dir).unwrap());
        let settings = reloaded.current();
        assert!(settings.enabled);
        assert_eq!(settings.extension_filter, "pdf");
    }

    #[test]
    fn test_apply_external_does_not_persist() {
        let temp_dir = TempDir::new().unwrap();
        let dir = camino::Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&dir).unwrap();

        let store = SettingsStore::with_persistence(manager.clone());
        let changes = store.apply_external(Settings {
            enabled: true,
            ..Settings::default()
        });

        assert_eq!(changes.len(), 1);
        assert!(store.current().enabled);
        assert!(!manager.settings_path().exists());
    }
}
