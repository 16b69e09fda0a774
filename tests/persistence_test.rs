//! Persistence Integration Tests
//!
//! Exercises the reminder engine against the real file-backed store:
//! - Reminders survive a full reload from disk
//! - Writes from another handle become visible after reload
//! - Two handles writing different keys never erase each other
//! - A failing disk never breaks in-memory updates
//! - Sign-out wipes application data only

use std::fs;
use std::sync::Arc;

use chrono::{FixedOffset, TimeZone};
use tempfile::TempDir;

use med_reminders_lib::config::{REMINDERS_KEY, STORE_FILE_NAME};
use med_reminders_lib::engine::{append_reminder, ReminderEngine};
use med_reminders_lib::profile::Profile;
use med_reminders_lib::reminder::Urgency;
use med_reminders_lib::storage::{FileStore, KeyValueStore, SharedStore};
use med_reminders_lib::AppState;

// ============================================================================
// Helpers
// ============================================================================

fn open(dir: &TempDir) -> Arc<FileStore> {
    Arc::new(FileStore::open(dir.path().join(STORE_FILE_NAME)).unwrap())
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_reminder_survives_reload() {
    let dir = TempDir::new().unwrap();

    {
        let store: SharedStore = open(&dir);
        let mut engine = ReminderEngine::new(store);
        engine.add("Metformin", "500mg", Some("08:00")).unwrap();
    }

    let store: SharedStore = open(&dir);
    let engine = ReminderEngine::new(store);
    assert_eq!(engine.len(), 1);

    let entry = &engine.entries()[0];
    assert_eq!(entry.name, "Metformin");
    assert_eq!(entry.dose, "500mg");
    assert_eq!(entry.time.to_string(), "08:00");
}

#[test]
fn test_taken_mark_survives_reload() {
    let dir = TempDir::new().unwrap();
    let tz = FixedOffset::east_opt(0).unwrap();
    let taken = tz.with_ymd_and_hms(2024, 6, 1, 8, 10, 0).unwrap();

    let id = {
        let mut engine = ReminderEngine::new(open(&dir));
        let id = engine.add("Aspirin", "", Some("08:00")).unwrap();
        engine.mark_taken(&id, taken.timestamp_millis());
        id
    };

    let engine = ReminderEngine::new(open(&dir));
    let now = tz.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let view = engine.view(&now);
    assert_eq!(view[0].entry.id, id);
    assert_eq!(view[0].urgency(), Urgency::Normal);
    assert_eq!(
        view[0].due_at,
        tz.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap().timestamp_millis()
    );
}

#[test]
fn test_external_append_visible_after_reload() {
    let dir = TempDir::new().unwrap();
    let ours = open(&dir);
    let mut engine = ReminderEngine::new(ours.clone());
    engine.add("Aspirin", "", Some("07:00")).unwrap();

    let theirs = open(&dir);
    assert!(append_reminder(&*theirs, Some("Vitamin D"), None, None));

    // no cross-process notification for reminders
    assert_eq!(engine.len(), 1);

    let changed = ours.reload();
    assert_eq!(changed, vec![REMINDERS_KEY.to_string()]);
    engine.reload();
    assert_eq!(engine.len(), 2);
}

#[test]
fn test_profile_follows_external_changes() {
    let dir = TempDir::new().unwrap();
    let ours = open(&dir);
    let mut profile = Profile::load(ours.clone());

    let theirs = open(&dir);
    let mut other = Profile::load(theirs);
    other.set_name("Ana");

    let changed = ours.reload();
    assert!(profile.on_storage_change(&changed));
    assert_eq!(profile.name(), "Ana");
    assert_eq!(profile.initial(), Some('A'));
}

#[test]
fn test_profile_write_keeps_reminders_from_other_handle() {
    let dir = TempDir::new().unwrap();
    let ours = open(&dir);
    let mut profile = Profile::load(ours.clone());

    let theirs = open(&dir);
    let mut engine = ReminderEngine::new(theirs);
    engine.add("Metformin", "500mg", Some("08:00")).unwrap();

    profile.set_name("Ana");

    let reopened = open(&dir);
    assert_eq!(ReminderEngine::new(reopened.clone()).len(), 1);
    assert_eq!(Profile::load(reopened).name(), "Ana");
}

#[test]
fn test_disk_failure_keeps_memory_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(STORE_FILE_NAME);
    let store: SharedStore = open(&dir);
    let mut engine = ReminderEngine::new(store);
    engine.add("Aspirin", "", None).unwrap();

    // make the store file unwritable by turning it into a directory
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();

    let id = engine.add("Metformin", "500mg", Some("20:00"));
    assert!(id.is_some());
    assert_eq!(engine.len(), 2);
    assert!(engine.remove(&id.unwrap()));
    assert_eq!(engine.len(), 1);
}

#[test]
fn test_corrupt_store_file_starts_fresh() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(STORE_FILE_NAME), "\u{0}garbage").unwrap();

    let mut engine = ReminderEngine::new(open(&dir));
    assert!(engine.is_empty());
    engine.add("Aspirin", "", None).unwrap();

    let reopened = ReminderEngine::new(open(&dir));
    assert_eq!(reopened.len(), 1);
}

#[test]
fn test_sign_out_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.set("someone_else", "\"keep\"").unwrap();

    let state = AppState::new(store.clone());
    state.add_reminder("Aspirin", "", None).unwrap();
    state.lock_profile().set_name("Ana");
    state.lock_profile().set_theme(med_reminders_lib::profile::Theme::Light);

    assert_eq!(state.sign_out(), 3);

    let reopened = open(&dir);
    assert_eq!(reopened.keys().unwrap(), vec!["someone_else".to_string()]);
}
