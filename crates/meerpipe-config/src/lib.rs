//! Configuration system for the meerpipe pipeline.
//!
//! Provides TOML-based configuration with:
//! - Path roots for inputs, outputs, working directories, ephemerides and templates
//! - Engine sizing (job concurrency, retry attempts, database)
//! - Per-stage resource factors (`[resources.clean]`, `[resources.toas]`, ...)
//! - Config file layering (user config dir + project-local + explicit file)
//! - Catalog token resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    config_dir, load_config, load_config_file, load_config_with_options, user_config_path,
    ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use secrets::{resolve_catalog_token, ResolvedSecret, SecretSource, CATALOG_TOKEN_ENV};
pub use types::*;
