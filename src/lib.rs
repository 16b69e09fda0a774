pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod profile;
pub mod reminder;
pub mod scheduler;
pub mod storage;

use chrono::{DateTime, Local, TimeZone};
use config::Config;
use engine::ReminderEngine;
use error::AppResult;
use log::{debug, info, warn};
use profile::Profile;
use reminder::EnrichedEntry;
use scheduler::RefreshTimer;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use storage::{FileStore, MemoryStore, SharedStore};

/// Everything one session holds: the shared store and the views bound to it.
/// Consumers get this by reference; there is no global instance.
pub struct AppState {
    store: SharedStore,
    pub engine: Mutex<ReminderEngine>,
    pub profile: Mutex<Profile>,
}

impl AppState {
    pub fn new(store: SharedStore) -> Self {
        Self {
            engine: Mutex::new(ReminderEngine::new(store.clone())),
            profile: Mutex::new(Profile::load(store.clone())),
            store,
        }
    }

    /// Lock the engine, recovering from poison if needed
    pub fn lock_engine(&self) -> MutexGuard<'_, ReminderEngine> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the profile, recovering from poison if needed
    pub fn lock_profile(&self) -> MutexGuard<'_, Profile> {
        self.profile.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn list_reminders(&self) -> Vec<EnrichedEntry> {
        self.list_reminders_at(&Local::now())
    }

    pub fn list_reminders_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<EnrichedEntry> {
        self.lock_engine().view(now)
    }

    pub fn add_reminder(&self, name: &str, dose: &str, time: Option<&str>) -> Option<String> {
        self.lock_engine().add(name, dose, time)
    }

    pub fn mark_taken(&self, id: &str) -> bool {
        self.lock_engine().mark_taken(id, Local::now().timestamp_millis())
    }

    pub fn remove_reminder(&self, id: &str) -> bool {
        self.lock_engine().remove(id)
    }

    /// Clear every application key and rebind the views to the now empty
    /// slots. Returns the number of keys removed.
    pub fn sign_out(&self) -> usize {
        let removed = storage::sign_out(self.store.as_ref());
        self.lock_engine().reload();
        self.lock_profile().reload();
        info!("Signed out, {} keys cleared", removed);
        removed
    }

    /// Pick up writes from other handles. The profile follows changes to
    /// its keys; the reminder list does not and only changes on `reload`.
    pub fn sync_external_changes(&self) -> bool {
        let changed = self.store.reload();
        if changed.is_empty() {
            return false;
        }
        debug!("External changes to {:?}", changed);
        self.lock_profile().on_storage_change(&changed)
    }

    /// Recompute the reminder view every `interval` and hand it to
    /// `on_refresh`, after syncing external profile changes. Ticks never
    /// write the reminders slot. Dropping or stopping the returned timer
    /// ends the refresh.
    pub fn start_refresh<F>(self: &Arc<Self>, interval: Duration, mut on_refresh: F) -> RefreshTimer
    where
        F: FnMut(Vec<EnrichedEntry>) + Send + 'static,
    {
        let state = Arc::clone(self);
        RefreshTimer::start(interval, move || {
            state.sync_external_changes();
            on_refresh(state.list_reminders())
        })
    }
}

/// Open the on-disk store named by `config`, falling back to a memory-only
/// store when the data directory is unusable
pub fn open_store(config: &Config) -> SharedStore {
    match FileStore::open(config.store_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                "Could not open store at {:?}, changes will not be kept: {}",
                config.store_path(),
                e
            );
            Arc::new(MemoryStore::new())
        }
    }
}

/// Entry point for the `med-reminders` binary
pub fn run() -> AppResult<()> {
    let config = Config::from_env();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let command = cli::Command::parse(std::env::args().skip(1))?;
    let state = Arc::new(AppState::new(open_store(&config)));
    cli::execute(command, &state, &config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PROFILE_NAME_KEY, REMINDERS_KEY, STORE_FILE_NAME};
    use crate::engine::append_reminder;
    use crate::storage::KeyValueStore;
    use std::sync::mpsc;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn test_state_operations() {
        let state = state();
        let id = state.add_reminder("Aspirin", "100mg", Some("08:00")).unwrap();
        assert_eq!(state.list_reminders().len(), 1);

        assert!(state.mark_taken(&id));
        assert!(state.lock_engine().entries()[0].last_taken.is_some());

        assert!(state.remove_reminder(&id));
        assert!(state.list_reminders().is_empty());
    }

    #[test]
    fn test_sign_out_resets_views() {
        let state = state();
        state.add_reminder("Aspirin", "", None).unwrap();
        state.lock_profile().set_name("Ana");
        state.store().set("other_app", "1").unwrap();

        assert_eq!(state.sign_out(), 2);
        assert!(state.lock_engine().is_empty());
        assert_eq!(state.lock_profile().name(), "");
        assert_eq!(state.store().get(REMINDERS_KEY).unwrap(), None);
        assert_eq!(state.store().get(PROFILE_NAME_KEY).unwrap(), None);
        assert_eq!(state.store().get("other_app").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_refresh_delivers_views_without_writing() {
        let state = state();
        state.add_reminder("Aspirin", "", Some("08:00")).unwrap();
        let raw_before = state.store().get(REMINDERS_KEY).unwrap();

        let (tx, rx) = mpsc::channel();
        let mut timer = state.start_refresh(Duration::from_millis(10), move |view| {
            let _ = tx.send(view);
        });

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        timer.stop();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].entry.name, "Aspirin");
        assert_eq!(state.store().get(REMINDERS_KEY).unwrap(), raw_before);
    }

    #[test]
    fn test_refresh_sees_latest_mutation() {
        let state = state();
        let (tx, rx) = mpsc::channel();
        let mut timer = state.start_refresh(Duration::from_millis(10), move |view| {
            let _ = tx.send(view.len());
        });

        state.add_reminder("Aspirin", "", None).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut seen = 0;
        while seen == 0 && std::time::Instant::now() < deadline {
            seen = rx.recv_timeout(Duration::from_secs(5)).unwrap_or(0);
        }
        timer.stop();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_refresh_follows_external_profile_changes_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE_NAME);
        let state = Arc::new(AppState::new(Arc::new(FileStore::open(&path).unwrap())));

        let other: SharedStore = Arc::new(FileStore::open(&path).unwrap());
        Profile::load(other.clone()).set_name("Ana");
        assert!(append_reminder(other.as_ref(), Some("Vitamin D"), None, None));

        let (tx, rx) = mpsc::channel();
        let mut timer = state.start_refresh(Duration::from_millis(10), move |view| {
            let _ = tx.send(view.len());
        });
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        timer.stop();

        assert_eq!(state.lock_profile().name(), "Ana");
        assert_eq!(seen, 0);
        assert!(state.lock_engine().is_empty());

        state.lock_engine().reload();
        assert_eq!(state.lock_engine().len(), 1);
    }

    #[test]
    fn test_sync_ignores_unrelated_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE_NAME);
        let state = AppState::new(Arc::new(FileStore::open(&path).unwrap()));

        assert!(!state.sync_external_changes());

        FileStore::open(&path).unwrap().set("theme", "light").unwrap();
        assert!(!state.sync_external_changes());
        assert_eq!(state.lock_profile().theme(), profile::Theme::Light);
    }

    #[test]
    fn test_open_store_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().join("data"),
            ..Config::default()
        };

        let store = open_store(&config);
        store.set("bt_name", "\"Ana\"").unwrap();
        assert!(config.store_path().exists());
    }
}
