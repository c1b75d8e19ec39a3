// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! # megfield configuration system
//!
//! TOML-based configuration for the mapping engine with environment
//! variable overrides:
//!
//! ```rust,no_run
//! use megfield_config::{load_config, validate_config};
//!
//! let cfg = load_config(None).expect("failed to load config");
//! let mapping = validate_config(&cfg).expect("invalid configuration");
//! assert!(mapping.int_rad > 0.0);
//! ```
//!
//! Validation is where free-form strings ("fast", "meg", ...) become the
//! closed enums the core works with; invalid values never make it past
//! this crate.

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_environment_overrides, find_config_file, load_config};
pub use types::{MappingSettings, MegfieldConfig, TableSettings};
pub use validation::validate_config;

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("validation failed: {0}")]
    ValidationError(String),
}
