//! Values and handles crossing the native/foreign boundary
//!
//! - `ClassHandle`, `MethodHandle`, `ObjectHandle`: opaque tokens issued by a backend
//! - `Value`: a typed argument or result, one variant per return kind
//! - `ToForeign` / `FromForeign`: conversions between native scalars and `Value`

use crate::descriptor::{ParamType, ReturnKind};
use std::fmt;
use std::num::NonZeroU64;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU64);

        impl $name {
            pub fn new(raw: NonZeroU64) -> Self {
                Self(raw)
            }

            /// Wrap a backend-issued token; zero is the null token
            pub fn from_raw(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            pub fn as_raw(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

define_handle!(
    /// A loaded class
    ClassHandle
);
define_handle!(
    /// A resolved method on a specific class (dispatch handle)
    MethodHandle
);
define_handle!(
    /// A local reference to a foreign object
    ObjectHandle
);

/// A value passed to or returned from a foreign invocation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Void,
    Boolean(bool),
    Byte(i8),
    /// One UTF-16 code unit
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(ObjectHandle),
    Null,
}

impl Value {
    /// Return kind this value belongs to (`Null` is an object)
    pub fn kind(&self) -> ReturnKind {
        match self {
            Value::Void => ReturnKind::Void,
            Value::Boolean(_) => ReturnKind::Boolean,
            Value::Byte(_) => ReturnKind::Byte,
            Value::Char(_) => ReturnKind::Char,
            Value::Short(_) => ReturnKind::Short,
            Value::Int(_) => ReturnKind::Int,
            Value::Long(_) => ReturnKind::Long,
            Value::Float(_) => ReturnKind::Float,
            Value::Double(_) => ReturnKind::Double,
            Value::Object(_) | Value::Null => ReturnKind::Object,
        }
    }

    /// The value a primitive of `kind` yields when an invocation fails
    pub fn zero(kind: ReturnKind) -> Value {
        match kind {
            ReturnKind::Boolean => Value::Boolean(false),
            ReturnKind::Byte => Value::Byte(0),
            ReturnKind::Char => Value::Char(0),
            ReturnKind::Short => Value::Short(0),
            ReturnKind::Int => Value::Int(0),
            ReturnKind::Long => Value::Long(0),
            ReturnKind::Float => Value::Float(0.0),
            ReturnKind::Double => Value::Double(0.0),
            ReturnKind::Object => Value::Null,
            ReturnKind::Void => Value::Void,
        }
    }

    /// Check whether this value can be passed for `param`
    pub fn matches(&self, param: &ParamType) -> bool {
        match self {
            Value::Void => false,
            other => other.kind() == param.kind(),
        }
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            other => other.kind().display_name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Byte(b) => write!(f, "{}", b),
            Value::Char(c) => match char::from_u32(*c as u32) {
                Some(ch) => write!(f, "{}", ch),
                None => write!(f, "\\u{:04x}", c),
            },
            Value::Short(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Double(x) => write!(f, "{:?}", x),
            Value::Object(h) => write!(f, "{}", h),
            Value::Null => write!(f, "null"),
        }
    }
}

/// Trait for converting native scalars to a foreign `Value`
///
/// Conversions are reinterpretations with no range validation.
pub trait ToForeign {
    fn to_foreign(self) -> Value;
}

/// Trait for extracting a native value from a foreign `Value`
pub trait FromForeign: Sized {
    /// Return kind a method must declare to produce this type
    const KIND: ReturnKind;

    /// Extract from a value of kind `KIND`; `None` on any other variant
    fn from_foreign(value: Value) -> Option<Self>;
}

macro_rules! scalar_conversions {
    ($($ty:ty => $variant:ident, $kind:ident;)*) => {
        $(
            impl ToForeign for $ty {
                fn to_foreign(self) -> Value {
                    Value::$variant(self)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl FromForeign for $ty {
                const KIND: ReturnKind = ReturnKind::$kind;

                fn from_foreign(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

scalar_conversions! {
    bool => Boolean, Boolean;
    i8 => Byte, Byte;
    u16 => Char, Char;
    i16 => Short, Short;
    i32 => Int, Int;
    i64 => Long, Long;
    f32 => Float, Float;
    f64 => Double, Double;
}

/// Truncates to a single UTF-16 code unit
impl ToForeign for char {
    fn to_foreign(self) -> Value {
        Value::Char(self as u32 as u16)
    }
}

impl From<ObjectHandle> for Value {
    fn from(handle: ObjectHandle) -> Self {
        Value::Object(handle)
    }
}

impl ToForeign for ObjectHandle {
    fn to_foreign(self) -> Value {
        Value::Object(self)
    }
}

impl ToForeign for Option<ObjectHandle> {
    fn to_foreign(self) -> Value {
        match self {
            Some(handle) => Value::Object(handle),
            None => Value::Null,
        }
    }
}

impl FromForeign for () {
    const KIND: ReturnKind = ReturnKind::Void;

    fn from_foreign(value: Value) -> Option<Self> {
        match value {
            Value::Void => Some(()),
            _ => None,
        }
    }
}

impl FromForeign for Option<ObjectHandle> {
    const KIND: ReturnKind = ReturnKind::Object;

    fn from_foreign(value: Value) -> Option<Self> {
        match value {
            Value::Object(handle) => Some(Some(handle)),
            Value::Null => Some(None),
            _ => None,
        }
    }
}
