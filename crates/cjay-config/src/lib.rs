//! cjay Configuration System
//!
//! Loads the settings used to launch the foreign runtime from `cjay.toml`:
//! - JNI interface version
//! - Class path entries
//! - Raw runtime option strings
//! - Optional location of the runtime's shared library
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Project config (./cjay.toml, searched upward)
//! 3. Environment variables (CJAY_CLASSPATH, CJAY_JVM_OPTIONS)
//!
//! # Example
//!
//! ```no_run
//! use cjay_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let loaded = loader.load_from_directory(Path::new(".")).unwrap();
//! let options = loaded.config.jvm.option_strings();
//! ```

pub mod jvm;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unsupported JNI version: {0}")]
    InvalidVersion(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use jvm::{is_launch_option, BridgeConfig, JniVersion, JvmConfig, HOOK_OPTIONS};
pub use loader::{ConfigLoader, LoadedConfig, CONFIG_FILE_NAME};
