mod local;
mod memory;
pub mod persisted;

use crate::config::{NAMESPACE_PREFIX, THEME_KEY};
use crate::error::AppResult;
use log::{debug, warn};
use std::sync::Arc;

pub use local::FileStore;
pub use memory::MemoryStore;
pub use persisted::Persisted;

/// Synchronous string key-value storage, the shape of a browser's local
/// storage. Values are opaque text; JSON encoding happens one layer up in
/// [`Persisted`].
///
/// Implementations use interior locking so one instance can be shared by
/// the engine, the profile view and the refresh timer.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> AppResult<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> AppResult<()>;

    fn keys(&self) -> AppResult<Vec<String>>;

    /// Pick up writes made by other handles and return the keys they
    /// changed. Stores nobody else can write to have nothing to report.
    fn reload(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Handle threaded through every consumer instead of a global store
pub type SharedStore = Arc<dyn KeyValueStore>;

/// True for keys owned by the application and wiped on sign-out
pub fn is_app_key(key: &str) -> bool {
    key.starts_with(NAMESPACE_PREFIX) || key == THEME_KEY
}

/// Clear every application key. Failures are logged and skipped; keys
/// outside the namespace are never touched. Returns how many keys were
/// removed.
pub fn sign_out(store: &dyn KeyValueStore) -> usize {
    let keys = match store.keys() {
        Ok(keys) => keys,
        Err(e) => {
            warn!("Sign-out could not list storage keys: {}", e);
            return 0;
        }
    };

    let mut removed = 0;
    for key in keys.iter().filter(|k| is_app_key(k)) {
        match store.remove(key) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Sign-out failed to remove {}: {}", key, e),
        }
    }

    debug!("Sign-out removed {} keys", removed);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REMINDERS_KEY;

    #[test]
    fn test_is_app_key() {
        assert!(is_app_key(REMINDERS_KEY));
        assert!(is_app_key("bt_name"));
        assert!(is_app_key("theme"));
        assert!(!is_app_key("themes"));
        assert!(!is_app_key("other_app"));
    }

    #[test]
    fn test_sign_out_clears_namespace_only() {
        let store = MemoryStore::new();
        store.set(REMINDERS_KEY, "[]").unwrap();
        store.set("bt_name", "\"Ana\"").unwrap();
        store.set("theme", "light").unwrap();
        store.set("unrelated", "keep").unwrap();

        let removed = sign_out(&store);

        assert_eq!(removed, 3);
        assert_eq!(store.keys().unwrap(), vec!["unrelated".to_string()]);
        assert_eq!(store.get("unrelated").unwrap().as_deref(), Some("keep"));
    }

    #[test]
    fn test_sign_out_on_empty_store() {
        let store = MemoryStore::new();
        assert_eq!(sign_out(&store), 0);
    }

    #[test]
    fn test_memory_store_reload_reports_nothing() {
        let store = MemoryStore::new();
        store.set("bt_name", "\"Ana\"").unwrap();
        assert!(store.reload().is_empty());
    }
}
