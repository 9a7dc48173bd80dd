//! Class binding
//!
//! A `ClassBinding` pairs one foreign class with a registry of method
//! signatures. Registration is purely local; `bind_class` loads the class
//! and resolves every registered signature in one step, after which
//! methods can be invoked through the registry.
//!
//! State machine:
//!
//! ```text
//! Unbound --bind_class--> Bound --construct--> Instantiated
//! ```
//!
//! Static methods are callable once `Bound`; instance methods also need
//! `Instantiated` (or an explicit receiver through `invoke_on`).

use crate::backend::ForeignRuntime;
use crate::descriptor::{MethodDescriptor, ReturnKind};
use crate::error::{BridgeError, BridgeResult};
use crate::session::{check_pending, LocalRef, Session};
use crate::signature::{SignatureEntry, SignatureRegistry, CONSTRUCTOR_NAME};
use crate::value::{ClassHandle, FromForeign, MethodHandle, ObjectHandle, Value};
use std::fmt;

/// Lifecycle of a class binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Bound,
    Instantiated,
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingState::Unbound => write!(f, "unbound"),
            BindingState::Bound => write!(f, "bound"),
            BindingState::Instantiated => write!(f, "instantiated"),
        }
    }
}

/// Invocation target of a dispatch
#[derive(Debug, Clone, Copy)]
enum Target {
    Class(ClassHandle),
    Instance(ObjectHandle),
}

/// A foreign class and its registered method signatures
///
/// # Examples
///
/// ```
/// use cjay_runtime::{ClassBinding, MemoryVm, Session};
///
/// let session: Session<MemoryVm> = Session::new();
/// session.create(&["-Djava.class.path=."]).unwrap();
///
/// let mut integer = ClassBinding::new(&session);
/// integer.register_signature("valueOf", "(I)Ljava/lang/Integer;", true).unwrap();
/// integer.bind_class("java/lang/Integer").unwrap();
///
/// let boxed = integer.call_object("valueOf", &[41i32.into()]).unwrap();
/// assert!(boxed.is_some());
/// ```
pub struct ClassBinding<'s, R: ForeignRuntime> {
    session: &'s Session<R>,
    class_name: Option<String>,
    class: Option<ClassHandle>,
    instance: Option<ObjectHandle>,
    registry: SignatureRegistry,
}

impl<'s, R: ForeignRuntime> ClassBinding<'s, R> {
    pub fn new(session: &'s Session<R>) -> Self {
        Self {
            session,
            class_name: None,
            class: None,
            instance: None,
            registry: SignatureRegistry::new(),
        }
    }

    /// Register a method signature, replacing any entry with the same name
    ///
    /// The entry stays unresolved until the next `bind_class`.
    pub fn register_signature(
        &mut self,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> BridgeResult<()> {
        let entry = SignatureEntry::new(name, descriptor, is_static)?;
        log::debug!("signature registered: {}", entry);
        self.registry.insert(entry);
        Ok(())
    }

    /// Register the class's constructor
    pub fn register_constructor(&mut self, descriptor: &str) -> BridgeResult<()> {
        self.register_signature(CONSTRUCTOR_NAME, descriptor, false)
    }

    /// Load `class_name` and resolve every registered signature
    ///
    /// Resolution is all or nothing: if any signature fails to resolve,
    /// the class, instance and dispatch handles are left as they were.
    /// A successful rebind releases the previous instance.
    pub fn bind_class(&mut self, class_name: &str) -> BridgeResult<()> {
        let (class, handles) = self.resolve(class_name).map_err(|e| {
            log::debug!("class binding failed for {}: {}", class_name, e);
            e
        })?;

        self.release_instance();
        self.registry.commit(handles);
        self.class = Some(class);
        self.class_name = Some(class_name.to_string());
        log::debug!(
            "class bound: {} ({} methods)",
            class_name,
            self.registry.len()
        );
        Ok(())
    }

    fn resolve(&self, class_name: &str) -> BridgeResult<(ClassHandle, Vec<MethodHandle>)> {
        let class = self.session.find_class(class_name)?;
        let handles = self
            .registry
            .iter()
            .map(|entry| {
                self.session.method_id(
                    class,
                    class_name,
                    entry.name(),
                    entry.descriptor().as_str(),
                    entry.is_static(),
                )
            })
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok((class, handles))
    }

    /// Invoke the registered constructor and keep the new instance
    ///
    /// A previously constructed instance is released first.
    pub fn construct(&mut self, args: &[Value]) -> BridgeResult<ObjectHandle> {
        let entry = self
            .registry
            .get(CONSTRUCTOR_NAME)
            .ok_or(BridgeError::ConstructorNotBound)?;
        let ctor = entry.dispatch().ok_or(BridgeError::ConstructorNotBound)?;
        let class = self.class.ok_or(BridgeError::ConstructorNotBound)?;
        check_arguments(entry, args)?;

        let created = {
            let mut ctx = self.session.active_context()?;
            log::trace!("construct {:?} with {} argument(s)", self.class_name, args.len());
            let created = ctx.new_object(class, ctor, args);
            if let Err(e) = check_pending(&mut *ctx, CONSTRUCTOR_NAME) {
                if let Some(orphan) = created {
                    ctx.delete_local_ref(orphan);
                }
                return Err(e);
            }
            created
        };

        let instance = created
            .ok_or_else(|| BridgeError::NullReference("constructor returned null".to_string()))?;
        self.release_instance();
        self.instance = Some(instance);
        Ok(instance)
    }

    /// Invoke a registered method, converting the result to `T`
    ///
    /// `T` must correspond to the return kind recorded for `name`.
    pub fn call<T: FromForeign>(&self, name: &str, args: &[Value]) -> BridgeResult<T> {
        let entry = self.entry(name)?;
        let declared = entry.return_kind();
        if T::KIND != declared {
            return Err(BridgeError::ReturnKindMismatch {
                method: name.to_string(),
                declared,
                requested: T::KIND,
            });
        }
        let value = self.call_value(name, args)?;
        T::from_foreign(value).ok_or(BridgeError::ReturnKindMismatch {
            method: name.to_string(),
            declared,
            requested: value.kind(),
        })
    }

    /// Invoke a registered method; the result is tagged by its recorded kind
    ///
    /// Object results are raw local references owned by the caller.
    pub fn call_value(&self, name: &str, args: &[Value]) -> BridgeResult<Value> {
        let entry = self.entry(name)?;
        let target = if entry.is_static() {
            Target::Class(self.class.ok_or_else(|| not_bound(name))?)
        } else {
            Target::Instance(
                self.instance
                    .ok_or_else(|| BridgeError::InstanceNotBound(name.to_string()))?,
            )
        };
        self.dispatch(entry, target, args)
    }

    /// Invoke an object-returning method; `None` for a null result
    pub fn call_object(&self, name: &str, args: &[Value]) -> BridgeResult<Option<LocalRef<'s, R>>> {
        let value = self.call::<Option<ObjectHandle>>(name, args)?;
        Ok(value.map(|handle| self.session.local(handle)))
    }

    /// Invoke a registered method on an explicit receiver
    ///
    /// Static entries ignore the receiver and dispatch on the class.
    pub fn invoke_on(&self, receiver: ObjectHandle, name: &str, args: &[Value]) -> BridgeResult<Value> {
        let entry = self.entry(name)?;
        let target = if entry.is_static() {
            Target::Class(self.class.ok_or_else(|| not_bound(name))?)
        } else {
            Target::Instance(receiver)
        };
        self.dispatch(entry, target, args)
    }

    fn entry(&self, name: &str) -> BridgeResult<&SignatureEntry> {
        self.registry
            .get(name)
            .ok_or_else(|| BridgeError::UnknownMethod(name.to_string()))
    }

    fn dispatch(&self, entry: &SignatureEntry, target: Target, args: &[Value]) -> BridgeResult<Value> {
        let method = entry.dispatch().ok_or_else(|| not_bound(entry.name()))?;
        check_arguments(entry, args)?;

        let kind = entry.return_kind();
        let mut ctx = self.session.active_context()?;
        log::trace!(
            "dispatch {} -> {} (static: {})",
            entry.name(),
            kind,
            entry.is_static()
        );

        let result = match (entry.is_static(), target) {
            (true, Target::Class(class)) => ctx.call_static_method(class, method, kind, args),
            (false, Target::Instance(obj)) => ctx.call_method(obj, method, kind, args),
            (true, Target::Instance(_)) | (false, Target::Class(_)) => {
                return Err(not_bound(entry.name()))
            }
        };

        if let Err(e) = check_pending(&mut *ctx, entry.name()) {
            if let Value::Object(orphan) = result {
                ctx.delete_local_ref(orphan);
            }
            return Err(e);
        }

        if result.kind() != kind {
            if let Value::Object(orphan) = result {
                ctx.delete_local_ref(orphan);
            }
            return Err(BridgeError::ReturnKindMismatch {
                method: entry.name().to_string(),
                declared: kind,
                requested: result.kind(),
            });
        }
        Ok(result)
    }

    fn release_instance(&mut self) {
        if let Some(instance) = self.instance.take() {
            if let Err(e) = self.session.release_reference(instance) {
                log::debug!("instance reference {} not released: {}", instance, e);
            }
        }
    }

    pub fn signature_count(&self) -> usize {
        self.registry.len()
    }

    /// Registered signatures, ordered by name
    pub fn list_signatures(&self) -> Vec<&SignatureEntry> {
        self.registry.iter().collect()
    }

    pub fn signature(&self, name: &str) -> Option<&SignatureEntry> {
        self.registry.get(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&MethodDescriptor> {
        self.registry.get(name).map(SignatureEntry::descriptor)
    }

    pub fn return_kind(&self, name: &str) -> Option<ReturnKind> {
        self.registry.get(name).map(SignatureEntry::return_kind)
    }

    pub fn dispatch_handle(&self, name: &str) -> Option<MethodHandle> {
        self.registry.get(name).and_then(SignatureEntry::dispatch)
    }

    pub fn class_handle(&self) -> Option<ClassHandle> {
        self.class
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn instance(&self) -> Option<ObjectHandle> {
        self.instance
    }

    pub fn state(&self) -> BindingState {
        match (self.class, self.instance) {
            (None, _) => BindingState::Unbound,
            (Some(_), None) => BindingState::Bound,
            (Some(_), Some(_)) => BindingState::Instantiated,
        }
    }

    pub fn session(&self) -> &'s Session<R> {
        self.session
    }
}

impl<R: ForeignRuntime> Drop for ClassBinding<'_, R> {
    fn drop(&mut self) {
        self.release_instance();
    }
}

impl<R: ForeignRuntime> fmt::Debug for ClassBinding<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBinding")
            .field("class_name", &self.class_name)
            .field("state", &self.state())
            .field("signatures", &self.registry.len())
            .finish()
    }
}

fn not_bound(name: &str) -> BridgeError {
    BridgeError::MethodNotBound(name.to_string())
}

/// Check an argument list against the entry's parameter types
fn check_arguments(entry: &SignatureEntry, args: &[Value]) -> BridgeResult<()> {
    let params = entry.descriptor().params();
    let mismatch = |reason: String| BridgeError::ArgumentMismatch {
        method: entry.name().to_string(),
        reason,
    };

    if params.len() != args.len() {
        return Err(mismatch(format!(
            "expected {} argument(s), got {}",
            params.len(),
            args.len()
        )));
    }
    for (i, (param, arg)) in params.iter().zip(args).enumerate() {
        if !arg.matches(param) {
            return Err(mismatch(format!(
                "argument {} expects {}, got {}",
                i,
                param,
                arg.type_name()
            )));
        }
    }
    Ok(())
}
