//! In-process reference runtime
//!
//! `MemoryVm` implements `ForeignRuntime` without a real JVM. Classes are
//! described with `ClassDef` builders whose methods are Rust closures, and
//! objects live in a heap addressed through local-reference handles.
//!
//! Builtin classes:
//! - `java/lang/Object`: `<init>()V`, `toString`, `hashCode`
//! - `java/lang/String`: `length`, `isEmpty`
//! - `java/lang/Number`: `intValue`, `longValue`, `floatValue`, `doubleValue`,
//!   `shortValue`, `byteValue`
//! - `java/lang/{Byte,Short,Integer,Long,Float,Double}`: static `valueOf`
//! - `java/util/ArrayList`: `<init>()V`, `size`, `get`, `add`, `isEmpty`
//!
//! Failures follow the invocation interface: a null/zero result plus a
//! pending throwable.

use super::{status, ForeignRuntime, LaunchError, LaunchOptions, StringChars};
use crate::descriptor::{MethodDescriptor, ParamType, ReturnKind};
use crate::value::{ClassHandle, MethodHandle, ObjectHandle, Value};
use cjay_config::JniVersion;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::rc::Rc;

/// Shared pointer to a heap object
pub type ObjRef = Rc<RefCell<Object>>;

type InstanceFn = Rc<dyn Fn(&mut Heap, &ObjRef, &[Value]) -> Result<Value, Throwable>>;
type StaticFn = Rc<dyn Fn(&mut Heap, &[Value]) -> Result<Value, Throwable>>;

const OBJECT_CLASS: &str = "java/lang/Object";
const CONSTRUCTOR: &str = "<init>";

/// A heap object
#[derive(Debug)]
pub enum Object {
    Str(String),
    List(Vec<Option<ObjRef>>),
    Boxed(Boxed),
    Instance(Instance),
}

/// Boxed numeric value (`java/lang/Number` subclasses)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boxed {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

/// Instance of a user-defined class
#[derive(Debug)]
pub struct Instance {
    class: String,
    fields: HashMap<String, Slot>,
}

/// Field storage; object fields hold the object, not a local reference
#[derive(Debug, Clone)]
pub enum Slot {
    Prim(Value),
    Ref(Option<ObjRef>),
}

/// A foreign exception
#[derive(Debug, Clone, PartialEq)]
pub struct Throwable {
    class: String,
    message: String,
}

impl Throwable {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }

    pub fn null_pointer(message: impl Into<String>) -> Self {
        Self::new("java/lang/NullPointerException", message)
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new("java/lang/IllegalArgumentException", message)
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class.replace('/', "."), self.message)
    }
}

impl Boxed {
    pub fn class_name(self) -> &'static str {
        match self {
            Boxed::Byte(_) => "java/lang/Byte",
            Boxed::Short(_) => "java/lang/Short",
            Boxed::Int(_) => "java/lang/Integer",
            Boxed::Long(_) => "java/lang/Long",
            Boxed::Float(_) => "java/lang/Float",
            Boxed::Double(_) => "java/lang/Double",
        }
    }

    pub fn long_value(self) -> i64 {
        match self {
            Boxed::Byte(v) => v as i64,
            Boxed::Short(v) => v as i64,
            Boxed::Int(v) => v as i64,
            Boxed::Long(v) => v,
            Boxed::Float(v) => v as i64,
            Boxed::Double(v) => v as i64,
        }
    }

    pub fn int_value(self) -> i32 {
        match self {
            Boxed::Float(v) => v as i32,
            Boxed::Double(v) => v as i32,
            other => other.long_value() as i32,
        }
    }

    pub fn float_value(self) -> f32 {
        match self {
            Boxed::Float(v) => v,
            Boxed::Double(v) => v as f32,
            other => other.long_value() as f32,
        }
    }

    pub fn double_value(self) -> f64 {
        match self {
            Boxed::Float(v) => v as f64,
            Boxed::Double(v) => v,
            other => other.long_value() as f64,
        }
    }
}

impl fmt::Display for Boxed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boxed::Byte(v) => write!(f, "{}", v),
            Boxed::Short(v) => write!(f, "{}", v),
            Boxed::Int(v) => write!(f, "{}", v),
            Boxed::Long(v) => write!(f, "{}", v),
            Boxed::Float(v) => write!(f, "{:?}", v),
            Boxed::Double(v) => write!(f, "{:?}", v),
        }
    }
}

impl Object {
    /// Runtime class of this object
    pub fn class_name(&self) -> &str {
        match self {
            Object::Str(_) => "java/lang/String",
            Object::List(_) => "java/util/ArrayList",
            Object::Boxed(b) => b.class_name(),
            Object::Instance(i) => &i.class,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Slot> {
        match self {
            Object::Instance(i) => i.fields.get(name),
            _ => None,
        }
    }

    pub fn set_field(&mut self, name: &str, slot: Slot) -> Result<(), Throwable> {
        match self {
            Object::Instance(i) => {
                i.fields.insert(name.to_string(), slot);
                Ok(())
            }
            other => Err(Throwable::new(
                "java/lang/NoSuchFieldError",
                format!("{} has no field {}", other.class_name(), name),
            )),
        }
    }
}

/// Render an object the way `toString` does
fn render(obj: &ObjRef) -> String {
    render_nested(obj, &mut Vec::new())
}

/// `enclosing` holds the lists currently being rendered; a list found
/// inside itself prints as `(this Collection)`
fn render_nested(obj: &ObjRef, enclosing: &mut Vec<usize>) -> String {
    match &*obj.borrow() {
        Object::Str(s) => s.clone(),
        Object::Boxed(b) => b.to_string(),
        Object::List(items) => {
            enclosing.push(identity(obj));
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Some(elem) if enclosing.contains(&identity(elem)) => {
                        "(this Collection)".to_string()
                    }
                    Some(elem) => render_nested(elem, enclosing),
                    None => "null".to_string(),
                })
                .collect();
            enclosing.pop();
            format!("[{}]", parts.join(", "))
        }
        Object::Instance(i) => format!("{}@{:x}", i.class.replace('/', "."), identity(obj)),
    }
}

fn identity(obj: &ObjRef) -> usize {
    Rc::as_ptr(obj) as *const () as usize
}

/// Local references to heap objects
pub struct Heap {
    refs: HashMap<NonZeroU64, ObjRef>,
    next: NonZeroU64,
}

impl Heap {
    fn new() -> Self {
        Self {
            refs: HashMap::new(),
            next: NonZeroU64::MIN,
        }
    }

    /// Allocate an object and return a new local reference to it
    pub fn alloc(&mut self, obj: Object) -> Value {
        let obj = Rc::new(RefCell::new(obj));
        Value::Object(self.local(&obj))
    }

    /// Create a new local reference to an existing object
    pub fn local(&mut self, obj: &ObjRef) -> ObjectHandle {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        self.refs.insert(id, Rc::clone(obj));
        ObjectHandle::new(id)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<ObjRef> {
        NonZeroU64::new(handle.as_raw()).and_then(|id| self.refs.get(&id).cloned())
    }

    /// Resolve an object argument; `Null` yields `None`
    pub fn deref(&self, value: &Value) -> Result<Option<ObjRef>, Throwable> {
        match value {
            Value::Null => Ok(None),
            Value::Object(handle) => self.get(*handle).map(Some).ok_or_else(|| {
                Throwable::illegal_argument(format!("stale local reference {}", handle))
            }),
            other => Err(Throwable::illegal_argument(format!(
                "expected object, got {}",
                other.type_name()
            ))),
        }
    }

    /// Read a `java/lang/String` argument
    pub fn string(&self, value: &Value) -> Result<String, Throwable> {
        let obj = self
            .deref(value)?
            .ok_or_else(|| Throwable::null_pointer("string argument is null"))?;
        let borrowed = obj.borrow();
        match &*borrowed {
            Object::Str(s) => Ok(s.clone()),
            other => Err(Throwable::new(
                "java/lang/ClassCastException",
                format!("{} cannot be cast to java.lang.String", other.class_name()),
            )),
        }
    }

    /// Convert an argument into field storage
    pub fn store(&self, value: &Value) -> Result<Slot, Throwable> {
        match value {
            Value::Object(_) | Value::Null => Ok(Slot::Ref(self.deref(value)?)),
            Value::Void => Err(Throwable::illegal_argument("void is not storable")),
            prim => Ok(Slot::Prim(*prim)),
        }
    }

    /// Convert field storage into a result value
    pub fn load(&mut self, slot: &Slot) -> Value {
        match slot {
            Slot::Prim(v) => *v,
            Slot::Ref(Some(obj)) => Value::Object(self.local(obj)),
            Slot::Ref(None) => Value::Null,
        }
    }

    fn release(&mut self, handle: ObjectHandle) -> bool {
        NonZeroU64::new(handle.as_raw())
            .map(|id| self.refs.remove(&id).is_some())
            .unwrap_or(false)
    }

    fn live(&self) -> usize {
        self.refs.len()
    }

    fn clear(&mut self) {
        self.refs.clear();
    }
}

#[derive(Clone)]
enum Body {
    Instance(InstanceFn),
    Static(StaticFn),
    Abstract,
}

#[derive(Clone)]
struct MethodDef {
    name: String,
    descriptor: String,
    body: Body,
}

impl MethodDef {
    fn is_static(&self) -> bool {
        matches!(self.body, Body::Static(_))
    }
}

/// Class definition for `MemoryVm`
///
/// # Examples
///
/// ```
/// # use cjay_runtime::backend::memory::ClassDef;
/// # use cjay_runtime::Value;
/// let counter = ClassDef::new("demo/Counter")
///     .constructor("(I)V", |heap, this, args| {
///         let slot = heap.store(&args[0])?;
///         this.borrow_mut().set_field("count", slot)
///     })
///     .method("get", "()I", |heap, this, _| {
///         let slot = this.borrow().field("count").cloned();
///         Ok(slot.map(|s| heap.load(&s)).unwrap_or(Value::Int(0)))
///     });
/// assert_eq!(counter.name(), "demo/Counter");
/// ```
#[derive(Clone)]
pub struct ClassDef {
    name: String,
    superclass: Option<String>,
    methods: Vec<MethodDef>,
}

impl ClassDef {
    /// New class extending `java/lang/Object`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: Some(OBJECT_CLASS.to_string()),
            methods: Vec::new(),
        }
    }

    fn root(name: &str) -> Self {
        Self {
            name: name.to_string(),
            superclass: None,
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn constructor<F>(self, descriptor: &str, body: F) -> Self
    where
        F: Fn(&mut Heap, &ObjRef, &[Value]) -> Result<(), Throwable> + 'static,
    {
        self.method(CONSTRUCTOR, descriptor, move |heap, this, args| {
            body(heap, this, args).map(|_| Value::Void)
        })
    }

    pub fn method<F>(mut self, name: &str, descriptor: &str, body: F) -> Self
    where
        F: Fn(&mut Heap, &ObjRef, &[Value]) -> Result<Value, Throwable> + 'static,
    {
        self.methods.push(MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            body: Body::Instance(Rc::new(body)),
        });
        self
    }

    pub fn static_method<F>(mut self, name: &str, descriptor: &str, body: F) -> Self
    where
        F: Fn(&mut Heap, &[Value]) -> Result<Value, Throwable> + 'static,
    {
        self.methods.push(MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            body: Body::Static(Rc::new(body)),
        });
        self
    }

    /// Declared here, implemented by subclasses
    pub fn abstract_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            body: Body::Abstract,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    fn declared(&self, name: &str, descriptor: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field(
                "methods",
                &self
                    .methods
                    .iter()
                    .map(|m| format!("{}{}", m.name, m.descriptor))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Resolved {
    owner: String,
    name: String,
    descriptor: String,
    is_static: bool,
    params: Vec<ParamType>,
    kind: ReturnKind,
}

/// In-process reference runtime
pub struct MemoryVm {
    launch: LaunchOptions,
    classes: HashMap<String, ClassDef>,
    loaded: Vec<String>,
    methods: Vec<Resolved>,
    heap: Heap,
    pending: Option<Throwable>,
    pinned: HashMap<u64, ObjectHandle>,
    next_pin: u64,
    destroyed: bool,
}

impl MemoryVm {
    /// Add or replace a class definition
    pub fn define_class(&mut self, def: ClassDef) {
        self.classes.insert(def.name.clone(), def);
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Launch arguments this instance was started with
    pub fn launch_options(&self) -> &LaunchOptions {
        &self.launch
    }

    /// Number of local references not yet released
    pub fn live_references(&self) -> usize {
        self.heap.live()
    }

    /// Number of string buffers not yet released
    pub fn pinned_strings(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Allocate an object directly, bypassing constructors
    pub fn alloc(&mut self, obj: Object) -> Option<ObjectHandle> {
        self.heap.alloc(obj).as_object()
    }

    /// Raise a throwable as the pending exception
    pub fn throw(&mut self, throwable: Throwable) {
        log::trace!("memory vm: exception raised: {}", throwable);
        self.pending = Some(throwable);
    }

    pub fn pending_exception(&self) -> Option<&Throwable> {
        self.pending.as_ref()
    }

    fn class_at(&self, class: ClassHandle) -> Option<&str> {
        let index = usize::try_from(class.as_raw()).ok()?.checked_sub(1)?;
        self.loaded.get(index).map(String::as_str)
    }

    fn resolved(&self, method: MethodHandle) -> Result<Resolved, Throwable> {
        usize::try_from(method.as_raw())
            .ok()
            .and_then(|raw| raw.checked_sub(1))
            .and_then(|index| self.methods.get(index))
            .cloned()
            .ok_or_else(|| Throwable::illegal_argument(format!("unknown method {}", method)))
    }

    /// `name` followed by its superclasses
    fn lineage(&self, name: &str) -> Vec<&ClassDef> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(name);
        while let Some(def) = current {
            if chain.len() > self.classes.len() {
                break;
            }
            chain.push(def);
            current = def.superclass.as_deref().and_then(|s| self.classes.get(s));
        }
        chain
    }

    fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        self.lineage(class).iter().any(|def| def.name == ancestor)
    }

    fn find_impl(&self, runtime_class: &str, name: &str, descriptor: &str) -> Option<InstanceFn> {
        self.lineage(runtime_class)
            .into_iter()
            .filter_map(|def| def.declared(name, descriptor))
            .find_map(|m| match &m.body {
                Body::Instance(f) => Some(Rc::clone(f)),
                _ => None,
            })
    }

    fn check_call(&self, resolved: &Resolved, kind: ReturnKind, args: &[Value]) -> Result<(), Throwable> {
        if resolved.kind != kind {
            return Err(Throwable::new(
                "java/lang/IncompatibleClassChangeError",
                format!(
                    "{}.{}{} returns {}, invoked as {}",
                    resolved.owner, resolved.name, resolved.descriptor, resolved.kind, kind
                ),
            ));
        }
        if args.len() != resolved.params.len()
            || !args.iter().zip(&resolved.params).all(|(a, p)| a.matches(p))
        {
            return Err(Throwable::illegal_argument(format!(
                "arguments do not match {}{}",
                resolved.name, resolved.descriptor
            )));
        }
        Ok(())
    }

    fn check_result(resolved: &Resolved, result: Value) -> Result<Value, Throwable> {
        if result.kind() == resolved.kind {
            Ok(result)
        } else {
            Err(Throwable::new(
                "java/lang/IllegalStateException",
                format!(
                    "{}.{} produced {} for a {} method",
                    resolved.owner,
                    resolved.name,
                    result.type_name(),
                    resolved.kind
                ),
            ))
        }
    }

    fn resolve_method(
        &mut self,
        class: ClassHandle,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> Result<MethodHandle, Throwable> {
        let class_name = self
            .class_at(class)
            .ok_or_else(|| Throwable::illegal_argument(format!("unknown class {}", class)))?
            .to_string();

        let no_such_method = || {
            Throwable::new(
                "java/lang/NoSuchMethodError",
                format!("{}.{}{}", class_name, name, descriptor),
            )
        };

        let owner = if name == CONSTRUCTOR {
            self.classes
                .get(&class_name)
                .and_then(|def| def.declared(name, descriptor))
                .map(|m| (class_name.clone(), m.is_static()))
        } else {
            self.lineage(&class_name).into_iter().find_map(|def| {
                def.declared(name, descriptor)
                    .map(|m| (def.name.clone(), m.is_static()))
            })
        };

        let (owner, declared_static) = owner.ok_or_else(no_such_method)?;
        if declared_static != is_static {
            return Err(no_such_method());
        }

        let parsed = MethodDescriptor::parse(descriptor)
            .map_err(|e| Throwable::new("java/lang/ClassFormatError", e.to_string()))?;

        let existing = self
            .methods
            .iter()
            .position(|m| m.owner == owner && m.name == name && m.descriptor == descriptor);
        let index = match existing {
            Some(index) => index,
            None => {
                self.methods.push(Resolved {
                    owner,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    is_static,
                    params: parsed.params().to_vec(),
                    kind: parsed.return_kind(),
                });
                self.methods.len() - 1
            }
        };

        MethodHandle::from_raw(index as u64 + 1)
            .ok_or_else(|| Throwable::illegal_argument("method table overflow"))
    }

    fn construct(
        &mut self,
        class: ClassHandle,
        ctor: MethodHandle,
        args: &[Value],
    ) -> Result<ObjectHandle, Throwable> {
        let class_name = self
            .class_at(class)
            .ok_or_else(|| Throwable::illegal_argument(format!("unknown class {}", class)))?
            .to_string();
        let resolved = self.resolved(ctor)?;
        if resolved.name != CONSTRUCTOR || resolved.owner != class_name {
            return Err(Throwable::illegal_argument(format!(
                "{}{} is not a constructor of {}",
                resolved.name, resolved.descriptor, class_name
            )));
        }
        self.check_call(&resolved, ReturnKind::Void, args)?;

        let object = match class_name.as_str() {
            "java/util/ArrayList" => Object::List(Vec::new()),
            "java/lang/String" => Object::Str(String::new()),
            _ => Object::Instance(Instance {
                class: class_name.clone(),
                fields: HashMap::new(),
            }),
        };
        let receiver = Rc::new(RefCell::new(object));

        let body = self
            .find_impl(&class_name, CONSTRUCTOR, &resolved.descriptor)
            .ok_or_else(|| Throwable::new("java/lang/InstantiationError", class_name.clone()))?;
        body(&mut self.heap, &receiver, args)?;

        Ok(self.heap.local(&receiver))
    }

    fn invoke_instance(
        &mut self,
        obj: ObjectHandle,
        method: MethodHandle,
        kind: ReturnKind,
        args: &[Value],
    ) -> Result<Value, Throwable> {
        let resolved = self.resolved(method)?;
        if resolved.is_static {
            return Err(Throwable::new(
                "java/lang/IncompatibleClassChangeError",
                format!("{}.{} is static", resolved.owner, resolved.name),
            ));
        }
        self.check_call(&resolved, kind, args)?;

        let receiver = self
            .heap
            .get(obj)
            .ok_or_else(|| Throwable::null_pointer(format!("receiver of {}", resolved.name)))?;
        let runtime_class = receiver.borrow().class_name().to_string();
        if !self.is_subclass(&runtime_class, &resolved.owner) {
            return Err(Throwable::new(
                "java/lang/IncompatibleClassChangeError",
                format!("{} is not a {}", runtime_class, resolved.owner),
            ));
        }

        let body = self
            .find_impl(&runtime_class, &resolved.name, &resolved.descriptor)
            .ok_or_else(|| {
                Throwable::new(
                    "java/lang/AbstractMethodError",
                    format!("{}.{}{}", runtime_class, resolved.name, resolved.descriptor),
                )
            })?;

        let result = body(&mut self.heap, &receiver, args)?;
        Self::check_result(&resolved, result)
    }

    fn invoke_static(
        &mut self,
        class: ClassHandle,
        method: MethodHandle,
        kind: ReturnKind,
        args: &[Value],
    ) -> Result<Value, Throwable> {
        let class_name = self
            .class_at(class)
            .ok_or_else(|| Throwable::illegal_argument(format!("unknown class {}", class)))?
            .to_string();
        let resolved = self.resolved(method)?;
        if !resolved.is_static {
            return Err(Throwable::new(
                "java/lang/IncompatibleClassChangeError",
                format!("{}.{} is not static", resolved.owner, resolved.name),
            ));
        }
        self.check_call(&resolved, kind, args)?;

        if !self.is_subclass(&class_name, &resolved.owner) {
            return Err(Throwable::new(
                "java/lang/IncompatibleClassChangeError",
                format!("{} does not inherit {}", class_name, resolved.owner),
            ));
        }

        let body = self
            .classes
            .get(&resolved.owner)
            .and_then(|def| def.declared(&resolved.name, &resolved.descriptor))
            .and_then(|m| match &m.body {
                Body::Static(f) => Some(Rc::clone(f)),
                _ => None,
            })
            .ok_or_else(|| {
                Throwable::new(
                    "java/lang/NoSuchMethodError",
                    format!("{}.{}", resolved.owner, resolved.name),
                )
            })?;

        let result = body(&mut self.heap, args)?;
        Self::check_result(&resolved, result)
    }

    fn recognized(option: &str) -> bool {
        cjay_config::is_launch_option(option)
    }
}

impl ForeignRuntime for MemoryVm {
    fn launch(options: &LaunchOptions) -> Result<Self, LaunchError> {
        if options.version == JniVersion::V1_1 {
            return Err(LaunchError::Status {
                status: status::EVERSION,
                message: "JNI version 1.1 is not supported".to_string(),
            });
        }

        let mut accepted = options.clone();
        if let Some(bad) = options.options.iter().find(|o| !Self::recognized(o)) {
            if !options.ignore_unrecognized {
                return Err(LaunchError::Status {
                    status: status::EINVAL,
                    message: format!("Unrecognized option: {}", bad),
                });
            }
            accepted.options.retain(|o| Self::recognized(o));
        }

        let mut vm = MemoryVm {
            launch: accepted,
            classes: HashMap::new(),
            loaded: Vec::new(),
            methods: Vec::new(),
            heap: Heap::new(),
            pending: None,
            pinned: HashMap::new(),
            next_pin: 0,
            destroyed: false,
        };
        for def in builtin_classes() {
            vm.define_class(def);
        }
        Ok(vm)
    }

    fn destroy(&mut self) {
        self.heap.clear();
        self.pinned.clear();
        self.loaded.clear();
        self.methods.clear();
        self.pending = None;
        self.destroyed = true;
    }

    fn find_class(&mut self, name: &str) -> Option<ClassHandle> {
        if !self.classes.contains_key(name) {
            self.throw(Throwable::new(
                "java/lang/NoClassDefFoundError",
                name.to_string(),
            ));
            return None;
        }
        let index = match self.loaded.iter().position(|c| c == name) {
            Some(index) => index,
            None => {
                self.loaded.push(name.to_string());
                self.loaded.len() - 1
            }
        };
        ClassHandle::from_raw(index as u64 + 1)
    }

    fn method_id(
        &mut self,
        class: ClassHandle,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> Option<MethodHandle> {
        match self.resolve_method(class, name, descriptor, is_static) {
            Ok(handle) => Some(handle),
            Err(t) => {
                self.throw(t);
                None
            }
        }
    }

    fn new_object(
        &mut self,
        class: ClassHandle,
        ctor: MethodHandle,
        args: &[Value],
    ) -> Option<ObjectHandle> {
        match self.construct(class, ctor, args) {
            Ok(handle) => Some(handle),
            Err(t) => {
                self.throw(t);
                None
            }
        }
    }

    fn call_method(
        &mut self,
        obj: ObjectHandle,
        method: MethodHandle,
        kind: ReturnKind,
        args: &[Value],
    ) -> Value {
        match self.invoke_instance(obj, method, kind, args) {
            Ok(value) => value,
            Err(t) => {
                self.throw(t);
                Value::zero(kind)
            }
        }
    }

    fn call_static_method(
        &mut self,
        class: ClassHandle,
        method: MethodHandle,
        kind: ReturnKind,
        args: &[Value],
    ) -> Value {
        match self.invoke_static(class, method, kind, args) {
            Ok(value) => value,
            Err(t) => {
                self.throw(t);
                Value::zero(kind)
            }
        }
    }

    fn new_string_utf(&mut self, text: &str) -> Option<ObjectHandle> {
        self.heap.alloc(Object::Str(text.to_string())).as_object()
    }

    fn string_utf_chars(&mut self, string: ObjectHandle) -> Option<StringChars> {
        match self.heap.string(&Value::Object(string)) {
            Ok(text) => {
                self.next_pin += 1;
                self.pinned.insert(self.next_pin, string);
                Some(StringChars::new(self.next_pin, text))
            }
            Err(t) => {
                self.throw(t);
                None
            }
        }
    }

    fn release_string_utf_chars(&mut self, _string: ObjectHandle, chars: StringChars) {
        self.pinned.remove(&chars.pin());
    }

    fn delete_local_ref(&mut self, obj: ObjectHandle) {
        self.heap.release(obj);
    }

    fn exception_check(&mut self) -> bool {
        self.pending.is_some()
    }

    fn exception_describe(&mut self) -> Option<String> {
        self.pending.as_ref().map(|t| t.to_string())
    }

    fn exception_clear(&mut self) {
        self.pending = None;
    }
}

fn with_list<T>(
    this: &ObjRef,
    f: impl FnOnce(&mut Vec<Option<ObjRef>>) -> Result<T, Throwable>,
) -> Result<T, Throwable> {
    match &mut *this.borrow_mut() {
        Object::List(items) => f(items),
        other => Err(Throwable::new(
            "java/lang/ClassCastException",
            format!("{} cannot be cast to java.util.ArrayList", other.class_name()),
        )),
    }
}

fn unbox(this: &ObjRef) -> Result<Boxed, Throwable> {
    match &*this.borrow() {
        Object::Boxed(b) => Ok(*b),
        other => Err(Throwable::new(
            "java/lang/ClassCastException",
            format!("{} cannot be cast to java.lang.Number", other.class_name()),
        )),
    }
}

fn utf16_len(this: &ObjRef) -> Result<i32, Throwable> {
    match &*this.borrow() {
        Object::Str(s) => Ok(s.encode_utf16().count() as i32),
        other => Err(Throwable::new(
            "java/lang/ClassCastException",
            format!("{} cannot be cast to java.lang.String", other.class_name()),
        )),
    }
}

macro_rules! boxed_class {
    ($name:expr, $desc:expr, $variant:ident, $boxed:ident) => {
        ClassDef::new($name)
            .extends("java/lang/Number")
            .static_method("valueOf", $desc, |heap, args| match args {
                [Value::$variant(v)] => Ok(heap.alloc(Object::Boxed(Boxed::$boxed(*v)))),
                _ => Err(Throwable::illegal_argument("valueOf")),
            })
    };
}

fn builtin_classes() -> Vec<ClassDef> {
    let object = ClassDef::root(OBJECT_CLASS)
        .constructor("()V", |_, _, _| Ok(()))
        .method("toString", "()Ljava/lang/String;", |heap, this, _| {
            Ok(heap.alloc(Object::Str(render(this))))
        })
        .method("hashCode", "()I", |_, this, _| {
            Ok(Value::Int(identity(this) as i32))
        });

    let string = ClassDef::new("java/lang/String")
        .method("length", "()I", |_, this, _| Ok(Value::Int(utf16_len(this)?)))
        .method("isEmpty", "()Z", |_, this, _| {
            Ok(Value::Boolean(utf16_len(this)? == 0))
        });

    let number = ClassDef::new("java/lang/Number")
        .method("intValue", "()I", |_, this, _| {
            Ok(Value::Int(unbox(this)?.int_value()))
        })
        .method("longValue", "()J", |_, this, _| {
            Ok(Value::Long(unbox(this)?.long_value()))
        })
        .method("floatValue", "()F", |_, this, _| {
            Ok(Value::Float(unbox(this)?.float_value()))
        })
        .method("doubleValue", "()D", |_, this, _| {
            Ok(Value::Double(unbox(this)?.double_value()))
        })
        .method("shortValue", "()S", |_, this, _| {
            Ok(Value::Short(unbox(this)?.int_value() as i16))
        })
        .method("byteValue", "()B", |_, this, _| {
            Ok(Value::Byte(unbox(this)?.int_value() as i8))
        });

    let array_list = ClassDef::new("java/util/ArrayList")
        .constructor("()V", |_, _, _| Ok(()))
        .method("size", "()I", |_, this, _| {
            with_list(this, |items| Ok(Value::Int(items.len() as i32)))
        })
        .method("isEmpty", "()Z", |_, this, _| {
            with_list(this, |items| Ok(Value::Boolean(items.is_empty())))
        })
        .method("get", "(I)Ljava/lang/Object;", |heap, this, args| {
            let index = match args {
                [Value::Int(i)] => *i,
                _ => return Err(Throwable::illegal_argument("get")),
            };
            let elem = with_list(this, |items| {
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        Throwable::new(
                            "java/lang/IndexOutOfBoundsException",
                            format!("Index {} out of bounds for length {}", index, items.len()),
                        )
                    })
            })?;
            Ok(match elem {
                Some(obj) => Value::Object(heap.local(&obj)),
                None => Value::Null,
            })
        })
        .method("add", "(Ljava/lang/Object;)Z", |heap, this, args| {
            let elem = match args {
                [value] => heap.deref(value)?,
                _ => return Err(Throwable::illegal_argument("add")),
            };
            with_list(this, |items| {
                items.push(elem);
                Ok(Value::Boolean(true))
            })
        });

    vec![
        object,
        string,
        number,
        boxed_class!("java/lang/Byte", "(B)Ljava/lang/Byte;", Byte, Byte),
        boxed_class!("java/lang/Short", "(S)Ljava/lang/Short;", Short, Short),
        boxed_class!("java/lang/Integer", "(I)Ljava/lang/Integer;", Int, Int),
        boxed_class!("java/lang/Long", "(J)Ljava/lang/Long;", Long, Long),
        boxed_class!("java/lang/Float", "(F)Ljava/lang/Float;", Float, Float),
        boxed_class!("java/lang/Double", "(D)Ljava/lang/Double;", Double, Double),
        array_list,
    ]
}
