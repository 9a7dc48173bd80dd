//! Runtime launch configuration (the `[jvm]` table of cjay.toml)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Separator used when joining class path entries into a single option
#[cfg(windows)]
pub const CLASS_PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
pub const CLASS_PATH_SEPARATOR: &str = ":";

/// Top-level bridge configuration from cjay.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Runtime launch settings
    #[serde(default)]
    pub jvm: JvmConfig,
}

/// JNI interface version requested at launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum JniVersion {
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "1.4")]
    V1_4,
    #[serde(rename = "1.6")]
    V1_6,
    #[default]
    #[serde(rename = "1.8")]
    V1_8,
    #[serde(rename = "9")]
    V9,
    #[serde(rename = "10")]
    V10,
    #[serde(rename = "19")]
    V19,
    #[serde(rename = "21")]
    V21,
}

impl JniVersion {
    /// Encoded version number as passed in the launch arguments
    pub fn as_raw(self) -> i32 {
        match self {
            JniVersion::V1_1 => 0x0001_0001,
            JniVersion::V1_2 => 0x0001_0002,
            JniVersion::V1_4 => 0x0001_0004,
            JniVersion::V1_6 => 0x0001_0006,
            JniVersion::V1_8 => 0x0001_0008,
            JniVersion::V9 => 0x0009_0000,
            JniVersion::V10 => 0x000a_0000,
            JniVersion::V19 => 0x0013_0000,
            JniVersion::V21 => 0x0015_0000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JniVersion::V1_1 => "1.1",
            JniVersion::V1_2 => "1.2",
            JniVersion::V1_4 => "1.4",
            JniVersion::V1_6 => "1.6",
            JniVersion::V1_8 => "1.8",
            JniVersion::V9 => "9",
            JniVersion::V10 => "10",
            JniVersion::V19 => "19",
            JniVersion::V21 => "21",
        }
    }
}

impl fmt::Display for JniVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JniVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.1" => Ok(JniVersion::V1_1),
            "1.2" => Ok(JniVersion::V1_2),
            "1.4" => Ok(JniVersion::V1_4),
            "1.6" => Ok(JniVersion::V1_6),
            "1.8" => Ok(JniVersion::V1_8),
            "9" => Ok(JniVersion::V9),
            "10" => Ok(JniVersion::V10),
            "19" => Ok(JniVersion::V19),
            "21" => Ok(JniVersion::V21),
            other => Err(ConfigError::InvalidVersion(other.to_string())),
        }
    }
}

/// Settings used to launch the foreign runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct JvmConfig {
    /// JNI interface version (default: 1.8)
    #[serde(default)]
    pub version: JniVersion,

    /// Class path entries, joined into `-Djava.class.path`
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub class_path: Vec<PathBuf>,

    /// Raw option strings passed verbatim to the runtime
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    /// Let the runtime skip options it does not recognize
    #[serde(default)]
    pub ignore_unrecognized: bool,

    /// Explicit path to the runtime's shared library
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libjvm: Option<PathBuf>,
}

/// Hook options the invocation interface defines without a leading dash
pub const HOOK_OPTIONS: [&str; 3] = ["vfprintf", "exit", "abort"];

/// Whether `option` has the shape of a launch option: a dash-prefixed flag
/// or one of the hook names
pub fn is_launch_option(option: &str) -> bool {
    option.starts_with('-') || HOOK_OPTIONS.contains(&option)
}

impl JvmConfig {
    /// Validate class path entries and option strings
    pub fn validate(&self) -> ConfigResult<()> {
        for entry in &self.class_path {
            if entry.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "jvm.class-path".to_string(),
                    reason: "class path entries cannot be empty".to_string(),
                });
            }
        }

        for option in &self.options {
            if !is_launch_option(option) {
                return Err(ConfigError::InvalidValue {
                    field: "jvm.options".to_string(),
                    reason: format!(
                        "option '{}' must start with '-' or be one of {}",
                        option,
                        HOOK_OPTIONS.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }

    /// Class path entries joined with the platform separator
    pub fn joined_class_path(&self) -> String {
        self.class_path
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(CLASS_PATH_SEPARATOR)
    }

    /// Option strings in launch order: class path first, then raw options
    pub fn option_strings(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.options.len() + 1);
        if !self.class_path.is_empty() {
            out.push(format!("-Djava.class.path={}", self.joined_class_path()));
        }
        out.extend(self.options.iter().cloned());
        out
    }

    /// Resolve relative class path entries and library path against `root`
    pub fn resolve_paths(&mut self, root: &Path) {
        for entry in &mut self.class_path {
            if entry.is_relative() {
                *entry = root.join(&*entry);
            }
        }
        if let Some(lib) = self.libjvm.as_mut() {
            if lib.is_relative() {
                *lib = root.join(&*lib);
            }
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration document
    pub fn from_toml_str(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: origin.to_path_buf(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load bridge configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::from_toml_str(&content, path)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.jvm.validate()
    }
}
