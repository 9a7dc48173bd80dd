//! cjay Runtime - Typed bridge into a JVM
//!
//! This library binds native code to classes inside a running JVM:
//! - Method descriptor parsing
//! - Runtime session lifecycle
//! - Class binding and registry-driven dispatch
//! - Value conversion for scalars, strings and lists
//!
//! All foreign access goes through the `ForeignRuntime` trait. `MemoryVm`
//! is an in-process implementation; `JvmRuntime` (feature `jvm`) drives a
//! real JVM.
//!
//! # Example
//!
//! ```
//! use cjay_runtime::{ClassBinding, Converter, MemoryVm, Session};
//!
//! let session: Session<MemoryVm> = Session::new();
//! session.create(&["-Xmx64m"]).unwrap();
//!
//! let mut list = ClassBinding::new(&session);
//! list.register_constructor("()V").unwrap();
//! list.register_signature("isEmpty", "()Z", false).unwrap();
//! list.bind_class("java/util/ArrayList").unwrap();
//!
//! let handle = list.construct(&[]).unwrap();
//! assert!(list.call::<bool>("isEmpty", &[]).unwrap());
//!
//! let converter = Converter::new(&session).unwrap();
//! assert_eq!(converter.size_of(handle).unwrap(), 0);
//! ```

/// cjay runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod backend;
pub mod binding;
pub mod convert;
pub mod descriptor;
pub mod error;
pub mod locate;
pub mod session;
pub mod signature;
pub mod value;

pub use backend::{ClassDef, ForeignRuntime, LaunchError, LaunchOptions, MemoryVm};
pub use binding::{BindingState, ClassBinding};
pub use convert::{narrow_byte, narrow_float, narrow_int, narrow_short, Converter, Unbox};
pub use descriptor::{parse_descriptor, MethodDescriptor, ParamType, ReturnKind};
pub use error::{BridgeError, BridgeResult};
pub use locate::{JvmLocator, LocateError};
pub use session::{LocalRef, Session, SessionStatus};
pub use signature::{SignatureEntry, SignatureRegistry, CONSTRUCTOR_NAME};
pub use value::{ClassHandle, FromForeign, MethodHandle, ObjectHandle, ToForeign, Value};

#[cfg(feature = "jvm")]
pub use backend::JvmRuntime;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        assert_eq!(VERSION, "0.1.0");
    }
}
