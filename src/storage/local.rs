use super::KeyValueStore;
use crate::error::{AppError, AppResult};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

type Entries = BTreeMap<String, String>;

#[derive(Debug, Default)]
struct Snapshot {
    entries: Entries,
    /// Keys another writer changed that were picked up by a commit but not
    /// yet reported through `reload`
    unreported: BTreeSet<String>,
}

/// Key-value store persisted as one JSON object file on disk.
///
/// Reads are served from an in-memory snapshot. A write re-reads the file,
/// applies its single-key change on top of whatever is on disk, and
/// replaces the file through a temp file and rename. The snapshot only
/// moves once that succeeded, so a failed write leaves the previous value
/// readable and other writers' keys are never dropped.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    snapshot: Mutex<Snapshot>,
}

impl FileStore {
    /// Open the store at `path`, creating parent directories as needed.
    /// A missing file is an empty store; a corrupt one is logged and
    /// treated as empty.
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = load_entries(&path);
        debug!("Opened store {:?} with {} keys", path, entries.len());
        Ok(Self {
            path,
            snapshot: Mutex::new(Snapshot {
                entries,
                unreported: BTreeSet::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock the snapshot, recovering from poison if needed
    fn lock_snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit<F>(&self, mutate: F) -> AppResult<()>
    where
        F: FnOnce(&mut Entries),
    {
        let mut snapshot = self.lock_snapshot();
        let on_disk = load_entries(&self.path);

        let mut next = on_disk.clone();
        mutate(&mut next);
        save_entries(&self.path, &next)?;

        let external = changed_keys(&snapshot.entries, &on_disk);
        snapshot.unreported.extend(external);
        snapshot.entries = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.lock_snapshot().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.commit(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.commit(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        Ok(self.lock_snapshot().entries.keys().cloned().collect())
    }

    /// Re-read the file and return the keys whose value changed (added,
    /// modified or removed) by another writer since the last reload.
    fn reload(&self) -> Vec<String> {
        let fresh = load_entries(&self.path);
        let mut snapshot = self.lock_snapshot();

        let mut changed = std::mem::take(&mut snapshot.unreported);
        changed.extend(changed_keys(&snapshot.entries, &fresh));
        snapshot.entries = fresh;
        changed.into_iter().collect()
    }
}

fn changed_keys(old: &Entries, new: &Entries) -> BTreeSet<String> {
    let mut changed: BTreeSet<String> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    changed.extend(old.keys().filter(|k| !new.contains_key(*k)).cloned());
    changed
}

fn load_entries(path: &Path) -> Entries {
    if !path.exists() {
        return Entries::new();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read store {:?}, starting empty: {}", path, e);
            return Entries::new();
        }
    };

    match serde_json::from_str::<Entries>(&content) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Store {:?} is corrupt, starting empty: {}", path, e);
            Entries::new()
        }
    }
}

fn save_entries(path: &Path, entries: &Entries) -> AppResult<()> {
    let content = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, content)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|e| {
            let _ = fs::remove_file(&tmp);
            AppError::storage(format!("failed to write {:?}: {}", path, e))
        })
}
