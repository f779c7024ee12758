use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::db::{DB_FILE_NAME, SqliteStorage, default_data_dir};
use crate::storage::StorageError;

pub mod env_vars {
    pub const STORAGE_KEY: &str = "LOCAL_NOTES_KEY";
    pub const DATA_DIR: &str = "LOCAL_NOTES_DATA_DIR";
    /// Set to 0 to disable the quota.
    pub const QUOTA_BYTES: &str = "LOCAL_NOTES_QUOTA_BYTES";
    pub const AUTOSAVE_MS: &str = "LOCAL_NOTES_AUTOSAVE_MS";
}

pub mod defaults {
    pub const STORAGE_KEY: &str = crate::store::DEFAULT_STORAGE_KEY;
    pub const QUOTA_BYTES: usize = 5 * 1024 * 1024;
    pub const AUTOSAVE_MS: u64 = 600;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub storage_key: String,
    /// `None` means the platform data directory.
    pub data_dir: Option<PathBuf>,
    pub quota_bytes: Option<usize>,
    pub autosave_quiet: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_key: defaults::STORAGE_KEY.to_string(),
            data_dir: None,
            quota_bytes: Some(defaults::QUOTA_BYTES),
            autosave_quiet: Duration::from_millis(defaults::AUTOSAVE_MS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(key) = lookup(env_vars::STORAGE_KEY) {
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::Empty(env_vars::STORAGE_KEY));
            }
            config.storage_key = key.to_string();
        }

        if let Some(dir) = lookup(env_vars::DATA_DIR).filter(|dir| !dir.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(raw) = lookup(env_vars::QUOTA_BYTES) {
            let quota: usize = parse_number(env_vars::QUOTA_BYTES, &raw)?;
            config.quota_bytes = (quota > 0).then_some(quota);
        }

        if let Some(raw) = lookup(env_vars::AUTOSAVE_MS) {
            let ms: u64 = parse_number(env_vars::AUTOSAVE_MS, &raw)?;
            config.autosave_quiet = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub fn database_path(&self) -> Result<PathBuf, StorageError> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        Ok(dir.join(DB_FILE_NAME))
    }

    pub fn open_storage(&self) -> Result<SqliteStorage, StorageError> {
        SqliteStorage::open(self.database_path()?, self.quota_bytes)
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_apply_without_variables() {
        assert_eq!(config_from(&[]).unwrap(), Config::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = config_from(&[
            (env_vars::STORAGE_KEY, "work-notes"),
            (env_vars::DATA_DIR, "/tmp/notes"),
            (env_vars::QUOTA_BYTES, "0"),
            (env_vars::AUTOSAVE_MS, " 250 "),
        ])
        .unwrap();

        assert_eq!(config.storage_key, "work-notes");
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/notes")));
        assert_eq!(config.quota_bytes, None);
        assert_eq!(config.autosave_quiet, Duration::from_millis(250));
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/notes").join(DB_FILE_NAME)
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = config_from(&[(env_vars::QUOTA_BYTES, "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var, .. } if var == env_vars::QUOTA_BYTES));

        let err = config_from(&[(env_vars::STORAGE_KEY, "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Empty(_)));
    }
}
