//! Foreign runtime backends
//!
//! The bridge core reaches the foreign runtime only through `ForeignRuntime`.
//! The primitives follow the invocation interface closely: lookups return
//! `None` and leave an exception pending, invocations return the zero value
//! of their kind and leave an exception pending. Callers inspect and clear
//! that state through the `exception_*` primitives.
//!
//! - `memory`: in-process reference runtime, always available
//! - `jvm`: a real JVM through the invocation API (feature `jvm`)

pub mod memory;

#[cfg(feature = "jvm")]
pub mod jvm;

use crate::descriptor::ReturnKind;
use crate::value::{ClassHandle, MethodHandle, ObjectHandle, Value};
use cjay_config::{JniVersion, JvmConfig};
use std::path::PathBuf;
use thiserror::Error;

pub use memory::{ClassDef, MemoryVm};

#[cfg(feature = "jvm")]
pub use jvm::JvmRuntime;

/// Arguments used to launch a runtime
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaunchOptions {
    pub version: JniVersion,
    /// Raw option strings, passed verbatim
    pub options: Vec<String>,
    pub ignore_unrecognized: bool,
    /// Explicit runtime library; located automatically when absent
    pub libjvm: Option<PathBuf>,
}

impl LaunchOptions {
    pub fn new<S: AsRef<str>>(options: &[S]) -> Self {
        Self {
            options: options.iter().map(|s| s.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn from_config(config: &JvmConfig) -> Self {
        Self {
            version: config.version,
            options: config.option_strings(),
            ignore_unrecognized: config.ignore_unrecognized,
            libjvm: config.libjvm.clone(),
        }
    }
}

/// Launch failures reported by a backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaunchError {
    #[error("runtime returned status {status}: {message}")]
    Status { status: i32, message: String },

    #[error("runtime library unavailable: {0}")]
    Library(String),

    #[error("a runtime was already launched in this process")]
    AlreadyLaunched,
}

/// Invocation-interface status codes
pub mod status {
    pub const OK: i32 = 0;
    pub const ERR: i32 = -1;
    pub const EVERSION: i32 = -3;
    pub const EEXIST: i32 = -5;
    pub const EINVAL: i32 = -6;
}

/// Pinned UTF-8 contents of a foreign string
///
/// Must be handed back through `release_string_utf_chars`.
#[derive(Debug, PartialEq, Eq)]
pub struct StringChars {
    pin: u64,
    text: String,
}

impl StringChars {
    pub fn new(pin: u64, text: String) -> Self {
        Self { pin, text }
    }

    pub fn pin(&self) -> u64 {
        self.pin
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Primitive operations of a foreign runtime instance
pub trait ForeignRuntime {
    /// Start a runtime instance
    fn launch(options: &LaunchOptions) -> Result<Self, LaunchError>
    where
        Self: Sized;

    /// Tear the runtime down; no other primitive is called afterwards
    fn destroy(&mut self);

    /// Look up a class by internal name (`java/util/ArrayList`)
    fn find_class(&mut self, name: &str) -> Option<ClassHandle>;

    /// Resolve a dispatch handle for an instance or static method
    fn method_id(
        &mut self,
        class: ClassHandle,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> Option<MethodHandle>;

    /// Allocate an instance and run the constructor `ctor` on it
    fn new_object(
        &mut self,
        class: ClassHandle,
        ctor: MethodHandle,
        args: &[Value],
    ) -> Option<ObjectHandle>;

    /// Invoke an instance method, expecting a result of `kind`
    fn call_method(
        &mut self,
        obj: ObjectHandle,
        method: MethodHandle,
        kind: ReturnKind,
        args: &[Value],
    ) -> Value;

    /// Invoke a static method, expecting a result of `kind`
    fn call_static_method(
        &mut self,
        class: ClassHandle,
        method: MethodHandle,
        kind: ReturnKind,
        args: &[Value],
    ) -> Value;

    /// Allocate a foreign string; the result is a local reference
    fn new_string_utf(&mut self, text: &str) -> Option<ObjectHandle>;

    /// Pin a foreign string's UTF-8 contents
    fn string_utf_chars(&mut self, string: ObjectHandle) -> Option<StringChars>;

    fn release_string_utf_chars(&mut self, string: ObjectHandle, chars: StringChars);

    fn delete_local_ref(&mut self, obj: ObjectHandle);

    fn exception_check(&mut self) -> bool;

    /// Describe the pending exception without clearing it
    fn exception_describe(&mut self) -> Option<String>;

    fn exception_clear(&mut self);
}
