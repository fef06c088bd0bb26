//! Configuration management for the synchronization engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod cache;
mod listener;
mod write_path;
pub use cache::*;
pub use listener::*;
pub use write_path::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

const ENV_PREFIX: &str = "CELLSYNC";

/// Main configuration container for one engine instance (one process).
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with the `CELLSYNC__` prefix (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct SyncConfig {
    /// Fixed origin tag for this process. A random tag is generated when
    /// unset, which is what every deployment running more than one process
    /// per host should do.
    #[serde(default)]
    pub origin_tag: Option<String>,
    /// Change-capture and key-space listener parameters
    #[serde(default)]
    pub listener: ListenerConfig,
    /// Worker shards and drain behavior of the write path
    #[serde(default)]
    pub write_path: WritePathConfig,
    /// Sizing hints for the value cache
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Debug for SyncConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("origin_tag", &self.origin_tag)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl SyncConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so further overrides can be layered with
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CELLSYNC__WRITE_PATH__WORKERS", "8");
    /// let cfg = SyncConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        if let Some(tag) = &self.origin_tag {
            validate_origin_tag(tag)?;
        }
        self.listener.validate()?;
        self.write_path.validate()?;
        self.cache.validate()?;
        Ok(self)
    }
}

/// Origin tags travel inside the comma-separated notification prefix.
pub(crate) fn validate_origin_tag(tag: &str) -> Result<()> {
    if tag.is_empty() || tag.contains(',') || tag.contains('\'') {
        return Err(Error::Config(ConfigError::Message(format!(
            "origin_tag {tag:?} must be non-empty and contain no commas or quotes"
        ))));
    }
    Ok(())
}
