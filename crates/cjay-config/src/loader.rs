//! Configuration Loader
//!
//! Handles finding cjay.toml and applying environment overrides.

use crate::jvm::BridgeConfig;
use crate::ConfigResult;
use std::env;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "cjay.toml";

/// Replaces the configured class path (platform path list)
pub const ENV_CLASSPATH: &str = "CJAY_CLASSPATH";

/// Appended to the configured options (whitespace separated)
pub const ENV_JVM_OPTIONS: &str = "CJAY_JVM_OPTIONS";

/// Configuration loader
///
/// Sources, lowest priority first:
/// 1. Built-in defaults
/// 2. Project config (cjay.toml)
/// 3. Environment variables (CJAY_*)
pub struct ConfigLoader {
    /// Skip environment overrides (used by embedders that pass settings explicitly)
    ignore_env: bool,
}

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BridgeConfig,

    /// Directory containing the cjay.toml that was used
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Loader that never consults the environment
    pub fn without_env() -> Self {
        Self { ignore_env: true }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find cjay.toml. Relative paths in the
    /// file are resolved against the directory it was found in.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let (project_root, mut config) = self.find_project_config(start_dir)?;

        if let Some(root) = &project_root {
            config.jvm.resolve_paths(root);
        }

        let config = self.apply_env_overrides(config)?;

        Ok(LoadedConfig {
            config,
            project_root,
        })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<LoadedConfig> {
        let mut config = BridgeConfig::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());

        if let Some(root) = &project_root {
            config.jvm.resolve_paths(root);
        }

        let config = self.apply_env_overrides(config)?;

        Ok(LoadedConfig {
            config,
            project_root,
        })
    }

    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, BridgeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = BridgeConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, BridgeConfig::default())),
            }
        }
    }

    fn apply_env_overrides(&self, mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Some(class_path) = env::var_os(ENV_CLASSPATH) {
            config.jvm.class_path = env::split_paths(&class_path)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }

        if let Ok(options) = env::var(ENV_JVM_OPTIONS) {
            config
                .jvm
                .options
                .extend(options.split_whitespace().map(str::to_string));
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadedConfig {
    /// Check if a cjay.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[jvm]
options = ["-Xmx64m"]
"#,
        );

        let loader = ConfigLoader::without_env();
        let loaded = loader.load_from_directory(temp_dir.path()).unwrap();

        assert!(loaded.is_project());
        assert_eq!(loaded.config.jvm.options, vec!["-Xmx64m".to_string()]);
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[jvm]
class-path = ["classes"]
"#,
        );

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let loader = ConfigLoader::without_env();
        let loaded = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(loaded.project_root(), Some(temp_dir.path()));
        assert_eq!(loaded.config.jvm.class_path, vec![temp_dir.path().join("classes")]);
    }

    #[test]
    fn test_no_project_config() {
        let temp_dir = TempDir::new().unwrap();

        let loader = ConfigLoader::without_env();
        let loaded = loader.load_from_directory(temp_dir.path()).unwrap();

        assert!(!loaded.is_project());
        assert_eq!(loaded.config, BridgeConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::without_env();
        let result = loader.load_from_file(&temp_dir.path().join(CONFIG_FILE_NAME));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_env_override_class_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config_file(
            temp_dir.path(),
            r#"
[jvm]
class-path = ["ignored"]
"#,
        );

        let joined = env::join_paths(["/a/classes", "/b/lib.jar"]).unwrap();
        env::set_var(ENV_CLASSPATH, &joined);

        let loaded = ConfigLoader::new().load_from_file(&config_path).unwrap();
        assert_eq!(
            loaded.config.jvm.class_path,
            vec![PathBuf::from("/a/classes"), PathBuf::from("/b/lib.jar")]
        );

        env::remove_var(ENV_CLASSPATH);
    }

    #[test]
    #[serial]
    fn test_env_override_options_appended() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config_file(
            temp_dir.path(),
            r#"
[jvm]
options = ["-Xmx64m"]
"#,
        );

        env::set_var(ENV_JVM_OPTIONS, "-Xcheck:jni  -verbose:jni");

        let loaded = ConfigLoader::new().load_from_file(&config_path).unwrap();
        assert_eq!(
            loaded.config.jvm.options,
            vec![
                "-Xmx64m".to_string(),
                "-Xcheck:jni".to_string(),
                "-verbose:jni".to_string()
            ]
        );

        env::remove_var(ENV_JVM_OPTIONS);
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_option() {
        env::set_var(ENV_JVM_OPTIONS, "Xmx64m");

        let temp_dir = TempDir::new().unwrap();
        let result = ConfigLoader::new().load_from_directory(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        env::remove_var(ENV_JVM_OPTIONS);
    }
}
