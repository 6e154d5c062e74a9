//! Application configuration management.
//!
//! [`Config`] is the resolved, read-only configuration consumed by the index
//! and the duplicate scanner. [`Config::load`] builds it from layered
//! sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`<config dir>/config.toml`, or an explicit path)
//! 3. Environment variables prefixed with `DF_`
//!
//! The short environment names `DF_MINSIZE`, `DF_DBFILE` and
//! `DF_BINARY_COMPARE_SIZE` are accepted for `min_file_size`, `db_path` and
//! `sample_size`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::scanner::{HashPolicy, SampleMode};

/// Default minimum tracked file size in bytes.
pub const DEFAULT_MIN_FILE_SIZE: u64 = 1024;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DF_";

const DB_FILE_NAME: &str = "dupefiles.db";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    MissingFile(PathBuf),

    /// A source could not be parsed or a value has the wrong type.
    #[error("Invalid configuration: {0}")]
    Invalid(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Invalid(Box::new(e))
    }
}

/// Resolved application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raise the default log level to debug.
    pub debug: bool,
    /// Files strictly smaller than this are not tracked. 0 tracks everything.
    pub min_file_size: u64,
    /// Location of the index store.
    pub db_path: PathBuf,
    /// Bytes sampled per binary comparison. 0 compares whole files.
    pub sample_size: u64,
    /// How sampled comparison chooses positions.
    pub sample_mode: SampleMode,
    /// Digest selection by file size.
    pub hash_policy: HashPolicy,
    /// Worker thread cap. `None` uses the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            min_file_size: DEFAULT_MIN_FILE_SIZE,
            db_path: default_db_path(),
            sample_size: 0,
            sample_mode: SampleMode::default(),
            hash_policy: HashPolicy::default(),
            workers: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, a TOML file, and the environment.
    ///
    /// When `explicit` is `None`, the file in the platform config directory
    /// is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if `explicit` does not exist, or
    /// [`ConfigError::Invalid`] if any source fails to deserialize.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::MissingFile(path.to_path_buf()));
                }
                Some(path.to_path_buf())
            }
            None => Self::config_path().filter(|p| p.is_file()),
        };
        Self::figment(file.as_deref()).extract().map_err(ConfigError::from)
    }

    /// Defaults, then the optional TOML file, then the environment.
    fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            log::debug!("Loading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).map(|key| {
            let name = key.as_str();
            if name.eq_ignore_ascii_case("minsize") {
                "min_file_size".into()
            } else if name.eq_ignore_ascii_case("dbfile") {
                "db_path".into()
            } else if name.eq_ignore_ascii_case("binary_compare_size") {
                "sample_size".into()
            } else {
                key.into()
            }
        }))
    }

    /// Default configuration file location.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dupefiles").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if a value cannot be represented.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Worker count after applying the cap to the hardware parallelism.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        let available = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        match self.workers {
            Some(0) | None => available,
            Some(n) => n,
        }
    }
}

fn default_db_path() -> PathBuf {
    ProjectDirs::from("", "", "dupefiles")
        .map(|dirs| dirs.config_dir().join(DB_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DB_FILE_NAME))
}
