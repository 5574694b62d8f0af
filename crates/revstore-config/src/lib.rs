//! # revstore-config
//!
//! Configuration management for revstore.
//!
//! Loads configuration from:
//! 1. `~/.revstore/config.toml` (global)
//! 2. `.revstore/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod path;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

/// Directory mode used when none is configured: owner rwx.
///
/// Directories need the execute bit to be traversable, so plain `0o600`
/// would make the created shard tree unusable.
pub const DEFAULT_PERMISSIONS: u32 = 0o700;

/// First id handed out by a fresh store.
pub const DEFAULT_NEXT_ID: u64 = 1;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> =
    Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub resolve: ResolveConfig,
    pub write: WriteConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut layers = Vec::new();

        // 1. Global config (~/.revstore/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                layers.push(global_path);
            }
        }

        // 2. Project config (.revstore/config.toml) overrides global
        let project_path = PathBuf::from(".revstore/config.toml");
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            layers.push(project_path);
        }

        let mut config = Self::load_layered(&layers)?;

        // 3. Environment variable overrides
        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Load a single config file without consulting any other source.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_layered(&[path])
    }

    /// Load several files, later ones overriding earlier ones key by key.
    ///
    /// Layering happens on the parsed TOML tables, so a later file can set a
    /// key back to its default value.
    pub fn load_layered<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in paths {
            let contents = std::fs::read_to_string(path.as_ref())?;
            overlay(&mut merged, toml::from_str(&contents)?);
        }
        let config: Config = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no store can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.next_id == 0 {
            return Err(ConfigError::InvalidValue {
                key: "repository.next_id",
                value: "0".to_string(),
            });
        }
        if self.repository.repository_permissions > 0o7777 {
            return Err(ConfigError::InvalidValue {
                key: "repository.repository_permissions",
                value: format!("{:o}", self.repository.repository_permissions),
            });
        }
        Ok(())
    }

    /// Global config path: ~/.revstore/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".revstore/config.toml"))
    }

    /// Repository root with `~` expanded.
    pub fn repository_root(&self) -> PathBuf {
        path::expand_home(&self.repository.repository_path)
    }

    /// Merge another config over this one.
    ///
    /// Only values that differ from the defaults replace ours, so a project
    /// file that names a single key does not reset the rest. A value equal to
    /// its default therefore cannot override anything; file layering goes
    /// through [`Config::load_layered`], which has no such limitation.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();

        if other.repository.repository_path != defaults.repository.repository_path {
            self.repository.repository_path = other.repository.repository_path;
        }
        if other.repository.repository_permissions != defaults.repository.repository_permissions {
            self.repository.repository_permissions = other.repository.repository_permissions;
        }
        if other.repository.next_id != defaults.repository.next_id {
            self.repository.next_id = other.repository.next_id;
        }
        if other.resolve.latest != defaults.resolve.latest {
            self.resolve.latest = other.resolve.latest;
        }
        if other.write.cleanup_on_failure != defaults.write.cleanup_on_failure {
            self.write.cleanup_on_failure = other.write.cleanup_on_failure;
        }
        if other.logging.level != defaults.logging.level {
            self.logging.level = other.logging.level;
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("REVSTORE_REPOSITORY") {
            self.repository.repository_path = PathBuf::from(path);
        }
        if let Ok(mode) = std::env::var("REVSTORE_PERMISSIONS") {
            self.repository.repository_permissions =
                parse_octal_mode(&mode).ok_or(ConfigError::InvalidValue {
                    key: "REVSTORE_PERMISSIONS",
                    value: mode,
                })?;
        }
        if let Ok(next) = std::env::var("REVSTORE_NEXT_ID") {
            self.repository.next_id = match next.parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "REVSTORE_NEXT_ID",
                        value: next,
                    })
                }
            };
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

fn overlay(base: &mut toml::Table, top: toml::Table) {
    for (key, value) in top {
        if let toml::Value::Table(inner) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                overlay(existing, inner);
                continue;
            }
            base.insert(key, toml::Value::Table(inner));
        } else {
            base.insert(key, value);
        }
    }
}

/// Parse a directory mode written as octal, with or without a `0o` / `0` prefix.
pub fn parse_octal_mode(s: &str) -> Option<u32> {
    let digits = s.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let mode = u32::from_str_radix(digits, 8).ok()?;
    (mode <= 0o7777).then_some(mode)
}

/// Repository location and allocation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Root directory holding the sharded document tree
    pub repository_path: PathBuf,
    /// Mode applied to every directory the store creates
    pub repository_permissions: u32,
    /// Id handed to the next successful add
    pub next_id: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            repository_path: PathBuf::from("~/.revstore/repository"),
            repository_permissions: DEFAULT_PERMISSIONS,
            next_id: DEFAULT_NEXT_ID,
        }
    }
}

/// Which numeric revision an omitted revision resolves to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionPolicy {
    /// Smallest numeric entry. Matches the historical layout readers.
    #[default]
    Lowest,
    /// Largest numeric entry, i.e. the most recent revision.
    Highest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub latest: RevisionPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Remove directories created by a failed add
    pub cleanup_on_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
