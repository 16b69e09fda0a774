use crate::config::{PROFILE_AVATAR_KEY, PROFILE_NAME_KEY, THEME_KEY};
use crate::storage::{KeyValueStore, Persisted, SharedStore};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    /// Anything other than `light` is the dark default
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "light" => Theme::Light,
            _ => Theme::Dark,
        }
    }
}

/// Display name, avatar and theme.
///
/// Name and avatar react to storage changes made elsewhere (see
/// [`Profile::on_storage_change`]). The theme is kept as bare text rather
/// than JSON.
pub struct Profile {
    store: SharedStore,
    name: Persisted<String>,
    avatar: Persisted<Option<String>>,
}

impl Profile {
    pub fn load(store: SharedStore) -> Self {
        let name = Persisted::bind(store.clone(), PROFILE_NAME_KEY, String::new());
        let avatar = Persisted::bind(store.clone(), PROFILE_AVATAR_KEY, None);
        Self { store, name, avatar }
    }

    pub fn name(&self) -> &str {
        self.name.get()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name.set(name.to_string());
    }

    pub fn avatar(&self) -> Option<&str> {
        self.avatar.get().as_deref()
    }

    pub fn set_avatar(&mut self, avatar: Option<String>) {
        self.avatar.set(avatar);
    }

    /// First letter of the trimmed name, upper-cased
    pub fn initial(&self) -> Option<char> {
        self.name
            .get()
            .trim()
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
    }

    pub fn theme(&self) -> Theme {
        match self.store.get(THEME_KEY) {
            Ok(Some(raw)) => Theme::from_raw(&raw),
            Ok(None) => Theme::default(),
            Err(e) => {
                warn!("Failed to read theme, using default: {}", e);
                Theme::default()
            }
        }
    }

    pub fn set_theme(&self, theme: Theme) {
        if let Err(e) = self.store.set(THEME_KEY, theme.as_str()) {
            warn!("Skipping theme write: {}", e);
        }
    }

    /// Reload name and avatar when another writer touched either key.
    /// Returns whether anything was reloaded.
    pub fn on_storage_change<S: AsRef<str>>(&mut self, changed: &[S]) -> bool {
        let relevant = changed
            .iter()
            .any(|k| k.as_ref() == PROFILE_NAME_KEY || k.as_ref() == PROFILE_AVATAR_KEY);
        if !relevant {
            return false;
        }
        self.reload();
        debug!("Profile reloaded after external change");
        true
    }

    pub fn reload(&mut self) {
        self.name.reload();
        self.avatar.reload();
    }
}
