//! JVM shared library location
//!
//! Resolves the platform's JVM library from a Java home directory:
//! - Linux: `libjvm.so`
//! - macOS: `libjvm.dylib`
//! - Windows: `jvm.dll`

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the Java installation
pub const JAVA_HOME: &str = "JAVA_HOME";

/// Library location errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("{library} not found; searched: {}", format_searched(.searched))]
    NotFound {
        library: String,
        searched: Vec<PathBuf>,
    },

    #[error("no Java home configured; set JAVA_HOME or add a search root")]
    NoJavaHome,
}

fn format_searched(searched: &[PathBuf]) -> String {
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Platform file name of the JVM library
pub fn library_file_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "jvm.dll"
    } else if cfg!(target_os = "macos") {
        "libjvm.dylib"
    } else {
        "libjvm.so"
    }
}

/// Architecture directory used by older JDK layouts (`jre/lib/<arch>`)
fn arch_dir() -> &'static str {
    match env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "powerpc64" => "ppc64",
        other => other,
    }
}

/// Searches Java home directories for the JVM library
///
/// Custom roots are searched before `JAVA_HOME`.
#[derive(Debug, Clone, Default)]
pub struct JvmLocator {
    roots: Vec<PathBuf>,
    use_env: bool,
}

impl JvmLocator {
    /// Locator that consults `JAVA_HOME`
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            use_env: true,
        }
    }

    /// Locator restricted to explicitly added roots
    pub fn without_env() -> Self {
        Self::default()
    }

    /// Add a Java home to search ahead of `JAVA_HOME`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    fn homes(&self) -> Vec<PathBuf> {
        let mut homes = self.roots.clone();
        if self.use_env {
            if let Some(home) = env::var_os(JAVA_HOME).filter(|h| !h.is_empty()) {
                homes.push(PathBuf::from(home));
            }
        }
        homes
    }

    /// Candidate directories under one Java home, in search order
    pub fn candidate_dirs(home: &Path) -> Vec<PathBuf> {
        let arch = arch_dir();
        vec![
            home.join("lib").join("server"),
            home.join("jre").join("lib").join("server"),
            home.join("lib").join(arch).join("server"),
            home.join("jre").join("lib").join(arch).join("server"),
            home.join("bin").join("server"),
        ]
    }

    /// Find the JVM library
    pub fn locate(&self) -> Result<PathBuf, LocateError> {
        let homes = self.homes();
        if homes.is_empty() {
            return Err(LocateError::NoJavaHome);
        }

        let library = library_file_name();
        let mut searched = Vec::new();
        for home in &homes {
            for dir in Self::candidate_dirs(home) {
                let candidate = dir.join(library);
                if candidate.is_file() {
                    log::debug!("jvm library located at {}", candidate.display());
                    return Ok(candidate);
                }
                searched.push(dir);
            }
        }

        Err(LocateError::NotFound {
            library: library.to_string(),
            searched,
        })
    }
}
