//! Persisted manager state
//!
//! The configuration is a small JSON document stored at
//! `~/.blender_manager/config.json`:
//!
//! ```json
//! {
//!   "installed_versions": {
//!     "4.2": "/Users/me/.blender_manager/versions/Blender 4.2/Blender.app"
//!   },
//!   "active_version": "4.2",
//!   "last_check": "2024-11-02T10:15:00Z"
//! }
//! ```
//!
//! The document is always written whole, through a temporary file that is renamed
//! over the old one, so a crash mid-write never leaves a truncated file behind.
//!
//! # Examples
//!
//! ```no_run
//! use blenders::ConfigStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = ConfigStore::load_default()?;
//! store.update(|config| config.active_version = Some("4.2".to_string()))?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Name of the directory under the home directory holding all manager state
pub const CONFIG_DIR_NAME: &str = ".blender_manager";

/// Name of the configuration document inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "BLENDERS_CONFIG_DIR";

/// The configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Installed versions mapped to their runnable entry point
    #[serde(default)]
    pub installed_versions: BTreeMap<String, PathBuf>,

    /// Version currently selected by the user
    #[serde(default)]
    pub active_version: Option<String>,

    /// When the catalog was last refreshed
    ///
    /// Timestamps without an offset are read as UTC; unreadable ones as `None`.
    #[serde(default, deserialize_with = "deserialize_last_check")]
    pub last_check: Option<DateTime<Utc>>,
}

fn deserialize_last_check<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| parse_timestamp(&value)))
}

/// RFC 3339, or a naive ISO 8601 date-time taken as UTC
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    tracing::warn!(%value, "ignoring unreadable last_check timestamp");
    None
}

impl Config {
    /// True when `version` has a record whose path still exists
    pub fn is_installed(&self, version: &str) -> bool {
        self.installed_versions
            .get(version)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Versions whose recorded path is gone from disk
    pub fn stale_versions(&self) -> Vec<String> {
        self.installed_versions
            .iter()
            .filter(|(_, path)| !path.exists())
            .map(|(version, _)| version.clone())
            .collect()
    }
}

/// The configuration document together with the file it lives in
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    /// Directory holding the config file and the install root
    ///
    /// Uses BLENDERS_CONFIG_DIR if set, otherwise ~/.blender_manager
    pub fn default_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;

        Ok(home.join(CONFIG_DIR_NAME))
    }

    /// Open the config in the default directory
    pub fn load_default() -> Result<Self> {
        Self::open(Self::default_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Open the config at `path`, writing the default document if it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            let store = Self {
                path,
                config: Config::default(),
            };
            write_atomic(&store.path, &store.config)?;
            tracing::debug!(path = %store.path.display(), "created default config");
            return Ok(store);
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the config file
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply `change` and persist the whole document
    ///
    /// The change is made on a copy; the in-memory config is only replaced once
    /// the write has succeeded.
    pub fn update<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut next = self.config.clone();
        change(&mut next);
        write_atomic(&self.path, &next)?;
        self.config = next;
        Ok(())
    }
}

fn write_atomic(path: &Path, config: &Config) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut tmp, config)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
