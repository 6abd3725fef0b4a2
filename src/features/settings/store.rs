//! # Settings Store
//!
//! Per-project, per-instance settings kept as one small JSON file each under
//! the platform config directory:
//!
//! ```text
//! <root>/<slug>_cls_<instance_id>/settings.json
//! ```
//!
//! Records are loaded lazily on first access, created with defaults when
//! missing, and cached for the rest of the process. A record that cannot be
//! read falls back to in-memory defaults for the run; a record that cannot be
//! written stays updated in memory.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

use crate::core::error::{Error, Result};
use crate::core::Config;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use uuid::Uuid;

const SETTINGS_FILE: &str = "settings.json";

/// Composite key: (project_slug, instance_id)
pub type SettingsKey = (String, String);

/// Build a settings key from its parts
pub fn settings_key(project_slug: &str, instance_id: &str) -> SettingsKey {
    (project_slug.to_string(), instance_id.to_string())
}

/// The persisted consent record for one project instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    #[serde(default)]
    pub opted_out: bool,
    #[serde(default)]
    pub prompt_answered: bool,
    #[serde(default)]
    pub last_prompt_at: Option<DateTime<Utc>>,
    /// Pseudonymous id generated on first dispatch and reused across runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

pub struct SettingsStore {
    /// `None` when the platform has no config directory
    root: Option<PathBuf>,
    cache: DashMap<SettingsKey, PersistedSettings>,
    /// Serializes load-and-create and change-and-save per key, so the file
    /// on disk always matches the cached record
    write_locks: DashMap<SettingsKey, Arc<Mutex<()>>>,
}

impl SettingsStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        SettingsStore {
            root,
            cache: DashMap::new(),
            write_locks: DashMap::new(),
        }
    }

    /// Use `CLS_SETTINGS_DIR` when given, the platform config dir otherwise
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.settings_dir.clone().or_else(dirs::config_dir))
    }

    /// Location of the settings file for a key
    pub fn path_for(&self, key: &SettingsKey) -> Result<PathBuf> {
        let root = self.root.as_ref().ok_or(Error::NoSettingsDir)?;
        let (slug, instance_id) = key;
        Ok(root
            .join(format!(
                "{}_cls_{}",
                sanitize_component(slug),
                sanitize_component(instance_id)
            ))
            .join(SETTINGS_FILE))
    }

    fn write_lock(&self, key: &SettingsKey) -> Arc<Mutex<()>> {
        self.write_locks.entry(key.clone()).or_default().value().clone()
    }

    /// Current settings for a key. The first access loads the record from
    /// disk, creating the file with defaults when there is none yet.
    pub fn get(&self, key: &SettingsKey) -> PersistedSettings {
        if let Some(cached) = self.cache.get(key) {
            return cached.value().clone();
        }

        let lock = self.write_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_locked(key)
    }

    /// Cached record, loading or creating it first. Caller holds the key's
    /// write lock.
    fn load_locked(&self, key: &SettingsKey) -> PersistedSettings {
        if let Some(cached) = self.cache.get(key) {
            return cached.value().clone();
        }

        let loaded = match self.path_for(key) {
            Ok(path) => match load(&path) {
                Ok(Some(settings)) => settings,
                Ok(None) => {
                    let defaults = PersistedSettings::default();
                    match save(&path, &defaults) {
                        Ok(()) => debug!("Created settings at {}", path.display()),
                        Err(e) => warn!("Settings will not persist this run: {e}"),
                    }
                    defaults
                }
                Err(e) => {
                    warn!("Using default settings for this run: {e}");
                    PersistedSettings::default()
                }
            },
            Err(e) => {
                warn!("Using default settings for this run: {e}");
                PersistedSettings::default()
            }
        };

        self.cache.insert(key.clone(), loaded.clone());
        loaded
    }

    /// Apply a change to the settings for a key and persist it.
    ///
    /// Changes to one key are applied and written one at a time. The
    /// in-memory record is updated even when writing fails, so the change
    /// still holds for the rest of the process.
    pub fn update<F>(&self, key: &SettingsKey, change: F) -> Result<PersistedSettings>
    where
        F: FnOnce(&mut PersistedSettings),
    {
        let lock = self.write_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut updated = self.load_locked(key);
        change(&mut updated);
        self.cache.insert(key.clone(), updated.clone());

        let path = self.path_for(key)?;
        save(&path, &updated)?;
        debug!("Saved settings to {}", path.display());
        Ok(updated)
    }
}

/// Read a settings file; `Ok(None)` when it does not exist yet
pub fn load(path: &Path) -> Result<Option<PersistedSettings>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::Storage {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| Error::CorruptSettings {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a settings file atomically: temp file in the same directory, then rename
pub fn save(path: &Path, settings: &PersistedSettings) -> Result<()> {
    let storage_err = |source| Error::Storage {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(storage_err)?;
    }

    let body = serde_json::to_vec_pretty(settings).map_err(|e| storage_err(e.into()))?;
    // Unique per write so concurrent writers never share a temp file
    let tmp_path = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));

    let written = fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(&body)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(storage_err(e));
    }
    Ok(())
}

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid path character class"));

/// Replace anything outside `[A-Za-z0-9._-]` so ids cannot escape the root
fn sanitize_component(raw: &str) -> String {
    UNSAFE_CHARS.replace_all(raw, "_").into_owned()
}
