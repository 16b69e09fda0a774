use super::{KeyValueStore, SharedStore};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed value mirrored into one storage slot.
///
/// Binding never fails: a missing, empty, unreadable or undecodable slot
/// yields the caller's initial value. Updates take effect in memory
/// immediately and are then written best-effort; a failed write is logged
/// and not rolled back, so memory and storage may diverge until the next
/// successful write.
pub struct Persisted<T> {
    store: SharedStore,
    key: String,
    initial: T,
    value: T,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn bind<K: Into<String>>(store: SharedStore, key: K, initial: T) -> Self {
        let key = key.into();
        let value = read_slot(&store, &key).unwrap_or_else(|| initial.clone());
        Self {
            store,
            key,
            initial,
            value,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.write();
    }

    /// Replace the value with `f(current)` and persist it
    pub fn update<F>(&mut self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.value);
        self.set(next);
    }

    /// Re-read the slot, falling back to the initial value exactly as
    /// [`Persisted::bind`] does
    pub fn reload(&mut self) {
        self.value = read_slot(&self.store, &self.key).unwrap_or_else(|| self.initial.clone());
    }

    fn write(&self) {
        let encoded = match serde_json::to_string(&self.value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Skipping write of {}: {}", self.key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &encoded) {
            warn!("Skipping write of {}: {}", self.key, e);
        }
    }
}

fn read_slot<T: DeserializeOwned>(store: &SharedStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) if !raw.is_empty() => raw,
        Ok(_) => return None,
        Err(e) => {
            warn!("Failed to read {}, using default: {}", key, e);
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Slot {} does not decode, using default: {}", key, e);
            None
        }
    }
}
