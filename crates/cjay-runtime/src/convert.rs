//! Value conversion between native and foreign representations
//!
//! Scalars cross through `ToForeign`/`FromForeign` (see `value`). This
//! module adds strings and collections, using two pre-resolved adapters:
//!
//! - list adapter: `java/util/ArrayList` `size`, `get`, `toString`
//! - number adapter: `java/lang/Number` unboxing accessors
//!
//! Every foreign handle manufactured while converting is released before
//! returning, on success and on error.

use crate::backend::{ForeignRuntime, StringChars};
use crate::binding::ClassBinding;
use crate::descriptor::ReturnKind;
use crate::error::{BridgeError, BridgeResult};
use crate::session::{take_pending, LocalRef, Session};
use crate::value::{FromForeign, ObjectHandle, Value};

const LIST_CLASS: &str = "java/util/ArrayList";
const NUMBER_CLASS: &str = "java/lang/Number";

/// Native numeric types that can be unboxed from a `java/lang/Number`
pub trait Unbox: FromForeign {
    /// Accessor on `java/lang/Number` producing this type
    const ACCESSOR: &'static str;
    const DESCRIPTOR: &'static str;
}

macro_rules! unbox_impls {
    ($($ty:ty => $accessor:expr, $desc:expr;)*) => {
        $(
            impl Unbox for $ty {
                const ACCESSOR: &'static str = $accessor;
                const DESCRIPTOR: &'static str = $desc;
            }
        )*
    };
}

unbox_impls! {
    i8 => "byteValue", "()B";
    i16 => "shortValue", "()S";
    i32 => "intValue", "()I";
    i64 => "longValue", "()J";
    f32 => "floatValue", "()F";
    f64 => "doubleValue", "()D";
}

/// Narrow to 8 bits, keeping the low-order bits
pub fn narrow_byte(value: i64) -> i8 {
    value as i8
}

/// Narrow to 16 bits, keeping the low-order bits
pub fn narrow_short(value: i64) -> i16 {
    value as i16
}

/// Narrow to 32 bits, keeping the low-order bits
pub fn narrow_int(value: i64) -> i32 {
    value as i32
}

/// Round to single precision; out-of-range values become infinite
pub fn narrow_float(value: f64) -> f32 {
    value as f32
}

/// String and collection converter bound to a session
pub struct Converter<'s, R: ForeignRuntime> {
    session: &'s Session<R>,
    list: ClassBinding<'s, R>,
    number: ClassBinding<'s, R>,
}

impl<'s, R: ForeignRuntime> Converter<'s, R> {
    /// Resolve the list and number adapters
    pub fn new(session: &'s Session<R>) -> BridgeResult<Self> {
        let mut list = ClassBinding::new(session);
        list.register_signature("size", "()I", false)?;
        list.register_signature("get", "(I)Ljava/lang/Object;", false)?;
        list.register_signature("toString", "()Ljava/lang/String;", false)?;
        list.bind_class(LIST_CLASS)?;

        let mut number = ClassBinding::new(session);
        for (name, descriptor) in accessors() {
            number.register_signature(name, descriptor, false)?;
        }
        number.bind_class(NUMBER_CLASS)?;

        log::debug!("converter adapters resolved");
        Ok(Self {
            session,
            list,
            number,
        })
    }

    pub fn session(&self) -> &'s Session<R> {
        self.session
    }

    /// Allocate a foreign copy of `text`
    pub fn new_string(&self, text: &str) -> BridgeResult<LocalRef<'s, R>> {
        self.session.new_string(text)
    }

    /// Copy a foreign string's contents
    ///
    /// The pinned buffer is released before returning.
    pub fn string_from(&self, string: ObjectHandle) -> BridgeResult<String> {
        let mut ctx = self.session.active_context()?;
        let chars = ctx.string_utf_chars(string);
        if let Some(description) = take_pending(&mut *ctx) {
            if let Some(chars) = chars {
                ctx.release_string_utf_chars(string, chars);
            }
            return Err(BridgeError::ForeignException {
                method: "GetStringUTFChars".to_string(),
                description,
            });
        }
        let chars = chars.ok_or_else(|| {
            BridgeError::NullReference("GetStringUTFChars returned null".to_string())
        })?;

        let pinned = PinnedChars {
            runtime: &mut *ctx,
            string,
            chars: Some(chars),
        };
        let text = pinned.as_str().to_string();
        Ok(text)
    }

    /// Number of elements in a foreign list
    pub fn size_of(&self, list: ObjectHandle) -> BridgeResult<i32> {
        let value = self.list.invoke_on(list, "size", &[])?;
        i32::from_foreign(value).ok_or_else(|| unexpected("size", ReturnKind::Int, value))
    }

    /// Unbox every element of a foreign list of numbers
    pub fn to_vec<T: Unbox>(&self, list: ObjectHandle) -> BridgeResult<Vec<T>> {
        let size = self.size_of(list)?;
        self.to_vec_with_size(list, size)
    }

    /// Unbox the first `size` elements of a foreign list of numbers
    pub fn to_vec_with_size<T: Unbox>(&self, list: ObjectHandle, size: i32) -> BridgeResult<Vec<T>> {
        let mut out = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        for index in 0..size {
            let element = self
                .element(list, index)?
                .ok_or_else(|| BridgeError::NullReference(format!("list element {} is null", index)))?;
            let value = self.number.invoke_on(element.handle(), T::ACCESSOR, &[])?;
            out.push(T::from_foreign(value).ok_or_else(|| unexpected(T::ACCESSOR, T::KIND, value))?);
        }
        log::trace!("unboxed {} list element(s)", size);
        Ok(out)
    }

    /// Elements of a foreign list as scoped references; `None` for null
    pub fn to_object_vec(&self, list: ObjectHandle) -> BridgeResult<Vec<Option<LocalRef<'s, R>>>> {
        let size = self.size_of(list)?;
        (0..size).map(|index| self.element(list, index)).collect()
    }

    /// The list's `toString` rendering
    pub fn list_to_string(&self, list: ObjectHandle) -> BridgeResult<String> {
        let value = self.list.invoke_on(list, "toString", &[])?;
        match value {
            Value::Object(handle) => {
                let text = self.session.local(handle);
                self.string_from(text.handle())
            }
            Value::Null => Err(BridgeError::NullReference("toString returned null".to_string())),
            other => Err(unexpected("toString", ReturnKind::Object, other)),
        }
    }

    /// Release a foreign local reference
    pub fn release_reference(&self, handle: ObjectHandle) -> BridgeResult<()> {
        self.session.release_reference(handle)
    }

    fn element(&self, list: ObjectHandle, index: i32) -> BridgeResult<Option<LocalRef<'s, R>>> {
        match self.list.invoke_on(list, "get", &[Value::Int(index)])? {
            Value::Object(handle) => Ok(Some(self.session.local(handle))),
            Value::Null => Ok(None),
            other => Err(unexpected("get", ReturnKind::Object, other)),
        }
    }
}

fn accessors() -> [(&'static str, &'static str); 6] {
    [
        (<i8 as Unbox>::ACCESSOR, <i8 as Unbox>::DESCRIPTOR),
        (<i16 as Unbox>::ACCESSOR, <i16 as Unbox>::DESCRIPTOR),
        (<i32 as Unbox>::ACCESSOR, <i32 as Unbox>::DESCRIPTOR),
        (<i64 as Unbox>::ACCESSOR, <i64 as Unbox>::DESCRIPTOR),
        (<f32 as Unbox>::ACCESSOR, <f32 as Unbox>::DESCRIPTOR),
        (<f64 as Unbox>::ACCESSOR, <f64 as Unbox>::DESCRIPTOR),
    ]
}

fn unexpected(method: &str, declared: ReturnKind, value: Value) -> BridgeError {
    BridgeError::ReturnKindMismatch {
        method: method.to_string(),
        declared,
        requested: value.kind(),
    }
}

/// Pinned string contents, released on drop
struct PinnedChars<'c, R: ForeignRuntime> {
    runtime: &'c mut R,
    string: ObjectHandle,
    chars: Option<StringChars>,
}

impl<R: ForeignRuntime> PinnedChars<'_, R> {
    fn as_str(&self) -> &str {
        self.chars.as_ref().map(StringChars::as_str).unwrap_or_default()
    }
}

impl<R: ForeignRuntime> Drop for PinnedChars<'_, R> {
    fn drop(&mut self) {
        if let Some(chars) = self.chars.take() {
            self.runtime.release_string_utf_chars(self.string, chars);
        }
    }
}
