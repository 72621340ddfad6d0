//! UI-only state: selections and modal flags.
//!
//! Nothing server-sourced lives here. Anything that can go stale relative to
//! the backend belongs in the query cache.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::nav::Tab;
use crate::persistence::{self, PersistedState, PersistenceError};

pub const ACTIVE_TAB: &str = "activeTab";

/// Keys written to disk. Everything else is session-scoped.
pub const PERSISTED_KEYS: &[&str] = &[ACTIVE_TAB];

pub fn is_persisted(key: &str) -> bool {
    PERSISTED_KEYS.contains(&key)
}

/// Key/value preference store with synchronous reads and writes.
pub struct UiStore {
    values: DashMap<String, Value>,
    path: Option<PathBuf>,
}

impl UiStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            values: DashMap::new(),
            path: None,
        }
    }

    /// Load persisted preferences from `path`. Unknown keys in the file are ignored.
    pub fn restore(path: &Path) -> Result<Self, PersistenceError> {
        let store = Self {
            values: DashMap::new(),
            path: Some(path.to_path_buf()),
        };
        if let Some(state) = persistence::load(path)? {
            for (key, value) in state.values {
                if is_persisted(&key) {
                    store.values.insert(key, value);
                } else {
                    debug!(key = %key, "ignoring non-persisted key in preference file");
                }
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Set a value. Allow-listed keys are written through to disk.
    pub fn set(&self, key: &str, value: Value) -> Result<(), PersistenceError> {
        self.values.insert(key.to_string(), value);
        if is_persisted(key) {
            self.flush()?;
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let removed = self.values.remove(key).is_some();
        if removed && is_persisted(key) {
            self.flush()?;
        }
        Ok(())
    }

    /// Drop every value, in memory and on disk.
    pub fn reset(&self) -> Result<(), PersistenceError> {
        self.values.clear();
        match &self.path {
            Some(path) => persistence::clear(path),
            None => Ok(()),
        }
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut state = PersistedState::default();
        for key in PERSISTED_KEYS {
            if let Some(value) = self.get(key) {
                state.values.insert((*key).to_string(), value);
            }
        }
        persistence::save(path, &state)
    }
}

/// The active tab, persisted under [`ACTIVE_TAB`] and watchable.
///
/// Any component that needs to switch tabs calls [`TabStore::set_active_tab`].
pub struct TabStore {
    active: watch::Sender<Tab>,
}

impl TabStore {
    /// Start from the persisted tab if there is one, else `default`.
    pub fn new(store: &UiStore, default: Tab) -> Self {
        let initial = store
            .get(ACTIVE_TAB)
            .and_then(|value| serde_json::from_value::<Tab>(value).ok())
            .unwrap_or(default);
        Self {
            active: watch::Sender::new(initial),
        }
    }

    pub fn active_tab(&self) -> Tab {
        *self.active.borrow()
    }

    pub fn set_active_tab(&self, store: &UiStore, tab: Tab) {
        match serde_json::to_value(tab) {
            Ok(value) => {
                if let Err(err) = store.set(ACTIVE_TAB, value) {
                    warn!(error = %err, "failed to persist active tab");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode active tab"),
        }
        self.active.send_replace(tab);
    }

    pub fn watch(&self) -> watch::Receiver<Tab> {
        self.active.subscribe()
    }

    /// Back to `default` without persisting it.
    pub fn reset(&self, default: Tab) {
        self.active.send_replace(default);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalState {
    pub open: bool,
    /// UI payload (e.g. the id of the row being edited). Never server data.
    pub payload: Option<Value>,
}

/// Open/closed flags per modal id. Session-scoped, never persisted.
#[derive(Default)]
pub struct ModalStore {
    modals: DashMap<String, ModalState>,
}

impl ModalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, id: &str, payload: Option<Value>) {
        self.modals
            .insert(id.to_string(), ModalState { open: true, payload });
    }

    pub fn close(&self, id: &str) {
        self.modals.remove(id);
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.modals.get(id).is_some_and(|m| m.open)
    }

    pub fn state(&self, id: &str) -> ModalState {
        self.modals
            .get(id)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        self.modals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_allow_listed_keys_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = UiStore::restore(&path).unwrap();

        store.set("sidebarCollapsed", json!(true)).unwrap();
        assert!(!path.exists());
        store.set(ACTIVE_TAB, json!("plans")).unwrap();

        let restored = UiStore::restore(&path).unwrap();
        assert_eq!(restored.get(ACTIVE_TAB), Some(json!("plans")));
        assert_eq!(restored.get("sidebarCollapsed"), None);
    }

    #[test]
    fn test_reset_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = UiStore::restore(&path).unwrap();
        store.set(ACTIVE_TAB, json!("history")).unwrap();
        assert!(path.exists());

        store.reset().unwrap();
        assert!(!path.exists());
        assert_eq!(store.get_or(ACTIVE_TAB, json!("none")), json!("none"));
    }

    #[test]
    fn test_tab_store_restores_and_notifies() {
        let store = UiStore::in_memory();
        store.set(ACTIVE_TAB, json!("enrollments")).unwrap();
        let tabs = TabStore::new(&store, Tab::History);
        assert_eq!(tabs.active_tab(), Tab::Enrollments);

        let mut rx = tabs.watch();
        tabs.set_active_tab(&store, Tab::Experiences);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Tab::Experiences);
        assert_eq!(store.get(ACTIVE_TAB), Some(json!("experiences")));
    }

    #[test]
    fn test_tab_store_ignores_unknown_persisted_tab() {
        let store = UiStore::in_memory();
        store.set(ACTIVE_TAB, json!("dashboard-v1")).unwrap();
        assert_eq!(TabStore::new(&store, Tab::Plans).active_tab(), Tab::Plans);
    }

    #[test]
    fn test_modal_store() {
        let modals = ModalStore::new();
        modals.open("confirm-unenroll", Some(json!({"enrollment": 3})));
        assert!(modals.is_open("confirm-unenroll"));
        assert_eq!(modals.state("confirm-unenroll").payload, Some(json!({"enrollment": 3})));

        modals.close("confirm-unenroll");
        assert!(!modals.is_open("confirm-unenroll"));
        modals.open("upload", None);
        modals.reset();
        assert!(!modals.is_open("upload"));
    }
}
