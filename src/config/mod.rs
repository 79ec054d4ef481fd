//! Deployment configuration.
//!
//! Sources are merged in this order (later sources override earlier):
//! 1. [`PageConfig::default()`]
//! 2. a TOML file, when one is given
//! 3. environment variables prefixed with `LAMBDA_PAGE_`, using `__` between nested keys
//!    (e.g. `LAMBDA_PAGE_CACHE__MAX_AGE_SECS=60`, `LAMBDA_PAGE_ROUTING=resource`)

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cache::DEFAULT_MAX_AGE_SECS;
use crate::gateway::RoutingMode;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LAMBDA_PAGE_";

/// Address the local development server binds by default.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:9000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Invalid(Box::new(err))
    }
}

/// Cache window and key namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds an entry stays fresh after its last write.
    pub max_age_secs: u64,
    /// Prepended to every fingerprint when naming stored objects.
    pub prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            prefix: String::new(),
        }
    }
}

/// Local development server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_SERVER_ADDRESS.to_owned(),
        }
    }
}

/// Everything a deployment configures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub routing: RoutingMode,
    pub cache: CacheSettings,
    pub server: ServerSettings,
}

impl PageConfig {
    /// Loads defaults overridden by the environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when a value has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::figment())
    }

    /// Loads defaults, then `path`, then the environment. A missing file is skipped.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when the file or a value is malformed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), exists = path.exists(), "loading configuration file");
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Self::env());
        Self::extract(figment)
    }

    /// The default figment: built-in defaults merged with the environment.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Self::env())
    }

    /// Extracts a config from any figment, e.g. one with extra providers merged in.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when a value has the wrong type.
    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }
}
