//! Configuration management for klinevault
//!
//! Centralized configuration handling with support for:
//! - Default values
//! - Configuration files (TOML)
//! - Environment variables
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables (`KLINEVAULT_` prefix)
//! 2. Configuration file
//! 3. Default values
//!
//! The core never reads configuration globally; everything here is resolved
//! once and passed in at construction time.

mod app;
mod data;
mod limits;

pub use app::{AppConfig, LogLevel};
pub use data::DataConfig;
pub use limits::LimitsConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure containing all configuration categories
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application-wide settings
    pub app: AppConfig,

    /// Data source, cache and fetch configuration
    pub data: DataConfig,

    /// Provider rate limits and source thresholds
    pub limits: LimitsConfig,
}

impl Settings {
    /// Load configuration from defaults, an optional `klinevault.toml` in the
    /// working directory, and `KLINEVAULT_`-prefixed environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(
                config::File::with_name("klinevault")
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("KLINEVAULT")
                    .prefix_separator("_")
                    .separator("_"),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from a specific file path, layered over defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::from(path).format(config::FileFormat::Toml));

        let config = builder.build()?;
        config.try_deserialize()
    }
}
