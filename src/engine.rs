use crate::config::{DEFAULT_REMINDER_TIME, REMINDERS_KEY};
use crate::reminder::{enrich_and_sort, EnrichedEntry, ReminderEntry, ReminderTime};
use crate::storage::{KeyValueStore, Persisted, SharedStore};
use chrono::{DateTime, TimeZone};
use log::{debug, info, warn};

/// Source of fresh reminder ids
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> String;
}

/// Random v4 UUIDs in their 32-character simple form
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Owns the reminder list and keeps it mirrored in the reminders slot.
///
/// Mutations never fail from the caller's point of view: invalid input
/// and unknown ids are ignored, and storage problems are left to the
/// persistence binding. The ordered, enriched view is computed on demand
/// from the current list and an explicit `now`.
pub struct ReminderEngine {
    entries: Persisted<Vec<ReminderEntry>>,
    ids: Box<dyn IdGenerator>,
}

impl ReminderEngine {
    pub fn new(store: SharedStore) -> Self {
        Self::with_ids(store, Box::new(UuidIds))
    }

    pub fn with_ids(store: SharedStore, ids: Box<dyn IdGenerator>) -> Self {
        let entries = Persisted::bind(store, REMINDERS_KEY, Vec::new());
        debug!("Loaded {} reminders", entries.get().len());
        Self { entries, ids }
    }

    /// Entries in storage order
    pub fn entries(&self) -> &[ReminderEntry] {
        self.entries.get()
    }

    pub fn len(&self) -> usize {
        self.entries.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.get().is_empty()
    }

    /// Append a reminder. A blank name or a malformed time is ignored and
    /// returns `None`; a blank dose becomes empty and a missing time falls
    /// back to the default slot.
    pub fn add(&mut self, name: &str, dose: &str, time: Option<&str>) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            debug!("Ignoring reminder with empty name");
            return None;
        }

        let time = match ReminderTime::parse(time.unwrap_or(DEFAULT_REMINDER_TIME)) {
            Ok(time) => time,
            Err(e) => {
                debug!("Ignoring reminder {}: {}", name, e);
                return None;
            }
        };

        let id = self.fresh_id();
        let entry = ReminderEntry::new(id.clone(), name.to_string(), dose.trim().to_string(), time);
        info!("Adding reminder {} ({}) at {}", entry.name, entry.id, entry.time);

        self.entries.update(|list| {
            let mut next = list.clone();
            next.push(entry);
            next
        });
        Some(id)
    }

    /// Record a dose taken at `now_ms`. The mark never moves backwards, so
    /// a clock that jumped back keeps the later mark. Returns false when no
    /// entry has this id.
    pub fn mark_taken(&mut self, id: &str, now_ms: i64) -> bool {
        if !self.entries.get().iter().any(|e| e.id == id) {
            debug!("mark_taken: no reminder {}", id);
            return false;
        }

        self.entries.update(|list| {
            list.iter()
                .cloned()
                .map(|mut e| {
                    if e.id == id {
                        e.last_taken = Some(e.last_taken.map_or(now_ms, |prev| prev.max(now_ms)));
                    }
                    e
                })
                .collect()
        });
        info!("Marked reminder {} taken", id);
        true
    }

    /// Delete by id. Returns false when no entry has this id.
    pub fn remove(&mut self, id: &str) -> bool {
        if !self.entries.get().iter().any(|e| e.id == id) {
            debug!("remove: no reminder {}", id);
            return false;
        }

        self.entries.update(|list| list.iter().filter(|e| e.id != id).cloned().collect());
        info!("Removed reminder {}", id);
        true
    }

    /// Entries enriched against `now`, soonest first. Pure: repeated calls
    /// with the same `now` return the same list.
    pub fn view<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<EnrichedEntry> {
        enrich_and_sort(self.entries.get(), now)
    }

    /// Re-read the slot, picking up writes made outside this engine
    pub fn reload(&mut self) {
        self.entries.reload();
        debug!("Reloaded {} reminders", self.entries.get().len());
    }

    fn fresh_id(&mut self) -> String {
        loop {
            let id = self.ids.next_id();
            if !self.entries.get().iter().any(|e| e.id == id) {
                return id;
            }
            warn!("Generated duplicate reminder id {}, retrying", id);
        }
    }
}

/// Append a reminder straight into the reminders slot, for writers that do
/// not hold an engine (such as an assistant command). Missing fields get
/// sensible defaults. Returns false if the slot could not be read, decoded
/// or written; a running engine only sees the entry after `reload`.
pub fn append_reminder(
    store: &dyn KeyValueStore,
    name: Option<&str>,
    time: Option<&str>,
    dose: Option<&str>,
) -> bool {
    let name = non_blank_or(name, "Vitamin D");
    let dose = non_blank_or(dose, "1000 IU");

    let time = match ReminderTime::parse(&non_blank_or(time, DEFAULT_REMINDER_TIME)) {
        Ok(time) => time,
        Err(e) => {
            warn!("Not appending reminder: {}", e);
            return false;
        }
    };

    let mut list: Vec<ReminderEntry> = match store.get(REMINDERS_KEY) {
        Ok(Some(raw)) if !raw.is_empty() => match serde_json::from_str(&raw) {
            Ok(list) => list,
            Err(e) => {
                warn!("Not appending reminder, slot is corrupt: {}", e);
                return false;
            }
        },
        Ok(_) => Vec::new(),
        Err(e) => {
            warn!("Not appending reminder: {}", e);
            return false;
        }
    };

    let mut ids = UuidIds;
    let id = loop {
        let id = ids.next_id();
        if !list.iter().any(|e| e.id == id) {
            break id;
        }
    };

    list.push(ReminderEntry::new(id, name, dose, time));

    let encoded = match serde_json::to_string(&list) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!("Not appending reminder: {}", e);
            return false;
        }
    };
    match store.set(REMINDERS_KEY, &encoded) {
        Ok(()) => true,
        Err(e) => {
            warn!("Not appending reminder: {}", e);
            false
        }
    }
}

fn non_blank_or(value: Option<&str>, fallback: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
