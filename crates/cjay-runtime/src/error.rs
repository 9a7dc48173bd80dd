//! Bridge error types

use crate::descriptor::ReturnKind;
use thiserror::Error;

/// Errors raised by the bridge core
///
/// Every failure is raised at the point of detection. Foreign exception
/// state is described and cleared before one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Malformed method descriptor '{descriptor}': {reason}")]
    MalformedDescriptor { descriptor: String, reason: String },

    #[error("Unable to launch runtime: {0}")]
    RuntimeStartFailure(String),

    #[error("Runtime session is not live; call create() first")]
    SessionNotReady,

    #[error("Runtime session is already in use by another operation")]
    SessionBusy,

    #[error("Can't find class: {class}")]
    ClassNotFound {
        class: String,
        cause: Option<String>,
    },

    #[error("Failed to resolve method '{method}' with descriptor '{descriptor}' on class {class}")]
    MethodResolutionFailed {
        class: String,
        method: String,
        descriptor: String,
        cause: Option<String>,
    },

    #[error("Method '{0}' is not registered")]
    UnknownMethod(String),

    #[error("Constructor is not bound; register it and call bind_class() first")]
    ConstructorNotBound,

    #[error("Method '{0}' has no dispatch handle; call bind_class() first")]
    MethodNotBound(String),

    #[error("Instance method '{0}' called before an instance was constructed")]
    InstanceNotBound(String),

    #[error("Method '{method}' returns {declared}, but {requested} was requested")]
    ReturnKindMismatch {
        method: String,
        declared: ReturnKind,
        requested: ReturnKind,
    },

    #[error("Arguments do not match '{method}': {reason}")]
    ArgumentMismatch { method: String, reason: String },

    #[error("Foreign exception in '{method}': {description}")]
    ForeignException { method: String, description: String },

    #[error("Null reference: {0}")]
    NullReference(String),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
