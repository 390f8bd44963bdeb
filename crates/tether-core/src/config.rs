//! Opaque backend configuration.
//!
//! The contract never interprets option keys; each backend defines its own
//! and extracts them into a typed struct with [`Options::parse`].

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or interpreting options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Options file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Options text is not valid TOML.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An option is present but has the wrong shape for the backend.
    #[error("invalid option '{key}': {message}")]
    Invalid { key: String, message: String },
}

/// Backend-specific options, kept as an untyped TOML table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(toml::Table);

impl Options {
    /// Create an empty option bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a TOML file.
    ///
    /// A missing file yields an empty bag.
    ///
    /// # Errors
    /// Returns error if the file exists but can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Set an option, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Check whether an option is set.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of options set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extract a single option as `T`.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if the value can't be deserialized as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.0
            .get(key)
            .cloned()
            .map(|value| {
                value.try_into().map_err(|e: toml::de::Error| ConfigError::Invalid {
                    key: key.into(),
                    message: e.message().to_string(),
                })
            })
            .transpose()
    }

    /// Extract the whole bag into a typed options struct.
    ///
    /// Unknown keys are ignored unless `T` denies them.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if a recognized key has the wrong shape.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        toml::Value::Table(self.0.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid {
                key: "*".into(),
                message: e.message().to_string(),
            })
    }
}

impl FromStr for Options {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(toml::from_str(s)?))
    }
}

impl From<toml::Table> for Options {
    fn from(table: toml::Table) -> Self {
        Self(table)
    }
}
