//! Engine configuration

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use sojourn_history::DEFAULT_MAX_ENTRIES;

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL of the entry the list starts with
    pub initial_url: String,
    /// State payload of the initial entry
    pub initial_state: Option<Value>,
    /// Oldest entries are dropped once the list grows past this
    pub max_entries: usize,
    /// SQLite file for persisted history; `None` keeps history in memory
    pub database_path: Option<PathBuf>,
}

impl Config {
    pub fn new(initial_url: impl Into<String>) -> Self {
        Self {
            initial_url: initial_url.into(),
            ..Self::default()
        }
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist history under `data_dir`.
    pub fn with_persistence(mut self, data_dir: PathBuf) -> Self {
        self.database_path = Some(data_dir.join("history.db"));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CoreError::Config(
                "max_entries must be at least 1".to_string(),
            ));
        }
        if self.initial_url.trim().is_empty() {
            return Err(CoreError::Config("initial_url is empty".to_string()));
        }
        Ok(())
    }

    /// Platform data directory for history databases, `.sojourn` when none is known.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Sojourn"))
            .unwrap_or_else(|| PathBuf::from(".sojourn"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_url: "about:blank".to_string(),
            initial_state: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            database_path: None,
        }
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
