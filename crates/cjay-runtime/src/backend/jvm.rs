//! JVM backend over the invocation API
//!
//! Every class and object the bridge sees is promoted to a `GlobalRef`
//! and addressed through a handle table; the JNI local frame is emptied
//! after each primitive. Only one JVM can be launched per process; a launch
//! that fails before the VM exists does not count. Classes and method ids
//! are interned, so rebinding the same class reuses their handles.

use super::{status, ForeignRuntime, LaunchError, LaunchOptions, StringChars};
use crate::descriptor::ReturnKind;
use crate::locate::JvmLocator;
use crate::value::{ClassHandle, MethodHandle, ObjectHandle, Value};
use jni::errors::Error as JniError;
use jni::objects::{
    GlobalRef, JClass, JMethodID, JObject, JStaticMethodID, JString, JValue, JValueOwned,
};
use jni::signature::{Primitive, ReturnType};
use jni::sys::jvalue;
use jni::{InitArgsBuilder, JNIEnv, JNIVersion, JavaVM};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

static LAUNCHED: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy)]
enum MethodId {
    Instance(JMethodID),
    Static(JStaticMethodID),
}

/// Append-only table addressed by 1-based raw handles. A key seen before
/// maps back to the handle it was first given.
struct Interned<K, V> {
    entries: Vec<V>,
    keys: HashMap<K, u64>,
}

impl<K, V> Default for Interned<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            keys: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Interned<K, V> {
    fn lookup<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.keys.get(key).copied()
    }

    fn insert(&mut self, key: K, value: V) -> u64 {
        if let Some(raw) = self.keys.get(&key) {
            return *raw;
        }
        self.entries.push(value);
        let raw = self.entries.len() as u64;
        self.keys.insert(key, raw);
        raw
    }

    fn get(&self, raw: u64) -> Option<&V> {
        let index = usize::try_from(raw).ok()?.checked_sub(1)?;
        self.entries.get(index)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }
}

/// (class handle, name, descriptor, static)
type MethodKey = (u64, String, String, bool);

#[derive(Default)]
struct Handles {
    classes: Interned<String, GlobalRef>,
    methods: Interned<MethodKey, MethodId>,
    objects: HashMap<u64, GlobalRef>,
    next_object: u64,
    next_pin: u64,
}

impl Handles {
    fn class(&self, handle: ClassHandle) -> Option<&GlobalRef> {
        self.classes.get(handle.as_raw())
    }

    fn method(&self, handle: MethodHandle) -> Option<MethodId> {
        self.methods.get(handle.as_raw()).copied()
    }

    fn object(&self, handle: ObjectHandle) -> Option<&GlobalRef> {
        self.objects.get(&handle.as_raw())
    }

    /// Promote a local reference into the object table
    fn adopt(&mut self, env: &mut JNIEnv<'_>, obj: JObject<'_>) -> Option<ObjectHandle> {
        if obj.is_null() {
            return None;
        }
        let global = env.new_global_ref(&obj).ok();
        let _ = env.delete_local_ref(obj);
        let global = global?;
        self.next_object += 1;
        self.objects.insert(self.next_object, global);
        ObjectHandle::from_raw(self.next_object)
    }

    fn arguments(&self, args: &[Value]) -> Option<Vec<jvalue>> {
        args.iter()
            .map(|arg| {
                Some(match arg {
                    Value::Boolean(b) => JValue::Bool(u8::from(*b)).as_jni(),
                    Value::Byte(b) => JValue::Byte(*b).as_jni(),
                    Value::Char(c) => JValue::Char(*c).as_jni(),
                    Value::Short(s) => JValue::Short(*s).as_jni(),
                    Value::Int(i) => JValue::Int(*i).as_jni(),
                    Value::Long(l) => JValue::Long(*l).as_jni(),
                    Value::Float(f) => JValue::Float(*f).as_jni(),
                    Value::Double(d) => JValue::Double(*d).as_jni(),
                    Value::Object(h) => JValue::Object(self.object(*h)?.as_obj()).as_jni(),
                    Value::Null => JValue::Object(&JObject::null()).as_jni(),
                    Value::Void => return None,
                })
            })
            .collect()
    }
}

/// A JVM instance created through the invocation API
pub struct JvmRuntime {
    vm: JavaVM,
    handles: Handles,
}

fn jni_version(options: &LaunchOptions) -> JNIVersion {
    JNIVersion::from(options.version.as_raw())
}

fn return_type(kind: ReturnKind) -> ReturnType {
    match kind {
        ReturnKind::Boolean => ReturnType::Primitive(Primitive::Boolean),
        ReturnKind::Byte => ReturnType::Primitive(Primitive::Byte),
        ReturnKind::Char => ReturnType::Primitive(Primitive::Char),
        ReturnKind::Short => ReturnType::Primitive(Primitive::Short),
        ReturnKind::Int => ReturnType::Primitive(Primitive::Int),
        ReturnKind::Long => ReturnType::Primitive(Primitive::Long),
        ReturnKind::Float => ReturnType::Primitive(Primitive::Float),
        ReturnKind::Double => ReturnType::Primitive(Primitive::Double),
        ReturnKind::Void => ReturnType::Primitive(Primitive::Void),
        ReturnKind::Object => ReturnType::Object,
    }
}

fn env(vm: &JavaVM) -> Option<JNIEnv<'_>> {
    match vm.get_env() {
        Ok(env) => Some(env),
        Err(e) => {
            log::error!("no JNI environment for this thread: {}", e);
            None
        }
    }
}

/// Make sure a failed primitive leaves an exception pending
fn raise(env: &mut JNIEnv<'_>, err: JniError) {
    if matches!(err, JniError::JavaException) {
        return;
    }
    let _ = env.throw_new("java/lang/RuntimeException", err.to_string());
}

impl JvmRuntime {
    fn start(options: &LaunchOptions) -> Result<JavaVM, LaunchError> {
        let mut builder = InitArgsBuilder::new()
            .version(jni_version(options))
            .ignore_unrecognized(options.ignore_unrecognized);
        for option in &options.options {
            builder = builder.option(option.as_str());
        }
        let args = builder.build().map_err(|e| LaunchError::Status {
            status: status::EINVAL,
            message: e.to_string(),
        })?;

        let libjvm = match &options.libjvm {
            Some(path) => Some(path.clone()),
            None => match JvmLocator::new().locate() {
                Ok(path) => Some(path),
                Err(e) => {
                    log::debug!("{}; falling back to the jni crate's java lookup", e);
                    None
                }
            },
        };
        let started = match libjvm {
            Some(path) => {
                log::debug!("loading jvm library from {}", path.display());
                JavaVM::with_libjvm(args, || Ok(path))
            }
            None => JavaVM::new(args),
        };
        started.map_err(|e| LaunchError::Status {
            status: status::ERR,
            message: e.to_string(),
        })
    }

    fn invoke(
        &mut self,
        target: Result<ObjectHandle, ClassHandle>,
        method: MethodHandle,
        kind: ReturnKind,
        args: &[Value],
    ) -> Value {
        let Some(mut env) = env(&self.vm) else {
            return Value::zero(kind);
        };
        let (Some(id), Some(jargs)) = (self.handles.method(method), self.handles.arguments(args))
        else {
            let _ = env.throw_new("java/lang/IllegalArgumentException", "stale handle");
            return Value::zero(kind);
        };

        let ret = return_type(kind);
        // SAFETY: method ids were resolved against these classes and the
        // argument list was checked against the descriptor by the caller.
        let result: Result<JValueOwned<'_>, JniError> = match (target, id) {
            (Ok(obj), MethodId::Instance(id)) => match self.handles.object(obj) {
                Some(receiver) => unsafe {
                    env.call_method_unchecked(receiver.as_obj(), id, ret, &jargs)
                },
                None => Err(JniError::NullPtr("receiver")),
            },
            (Err(class), MethodId::Static(id)) => match self.handles.class(class) {
                Some(class) => unsafe {
                    env.call_static_method_unchecked(<&JClass>::from(class.as_obj()), id, ret, &jargs)
                },
                None => Err(JniError::NullPtr("class")),
            },
            _ => Err(JniError::WrongJValueType("static", "instance")),
        };

        let value = result.and_then(|v| match kind {
            ReturnKind::Boolean => v.z().map(Value::Boolean),
            ReturnKind::Byte => v.b().map(Value::Byte),
            ReturnKind::Char => v.c().map(Value::Char),
            ReturnKind::Short => v.s().map(Value::Short),
            ReturnKind::Int => v.i().map(Value::Int),
            ReturnKind::Long => v.j().map(Value::Long),
            ReturnKind::Float => v.f().map(Value::Float),
            ReturnKind::Double => v.d().map(Value::Double),
            ReturnKind::Void => v.v().map(|_| Value::Void),
            ReturnKind::Object => v.l().map(|obj| match self.handles.adopt(&mut env, obj) {
                Some(handle) => Value::Object(handle),
                None => Value::Null,
            }),
        });

        match value {
            Ok(value) => value,
            Err(e) => {
                raise(&mut env, e);
                Value::zero(kind)
            }
        }
    }
}

impl ForeignRuntime for JvmRuntime {
    fn launch(options: &LaunchOptions) -> Result<Self, LaunchError> {
        if LAUNCHED.swap(true, Ordering::SeqCst) {
            return Err(LaunchError::AlreadyLaunched);
        }
        // no VM exists yet, so a later launch may try again
        let vm = Self::start(options).map_err(|e| {
            LAUNCHED.store(false, Ordering::SeqCst);
            e
        })?;
        vm.attach_current_thread_permanently()
            .map_err(|e| LaunchError::Library(e.to_string()))?;
        Ok(Self {
            vm,
            handles: Handles::default(),
        })
    }

    fn destroy(&mut self) {
        self.handles.objects.clear();
        self.handles.classes.clear();
        self.handles.methods.clear();
        // SAFETY: every global reference was dropped above and no JNIEnv
        // outlives a single primitive.
        if let Err(e) = unsafe { self.vm.destroy() } {
            log::error!("DestroyJavaVM failed: {}", e);
        }
    }

    fn find_class(&mut self, name: &str) -> Option<ClassHandle> {
        if let Some(raw) = self.handles.classes.lookup(name) {
            return ClassHandle::from_raw(raw);
        }
        let mut env = env(&self.vm)?;
        let class = match env.find_class(name) {
            Ok(class) => class,
            Err(e) => {
                raise(&mut env, e);
                return None;
            }
        };
        let global = env.new_global_ref(&class);
        let _ = env.delete_local_ref(class);
        match global {
            Ok(global) => {
                ClassHandle::from_raw(self.handles.classes.insert(name.to_string(), global))
            }
            Err(e) => {
                raise(&mut env, e);
                None
            }
        }
    }

    fn method_id(
        &mut self,
        class: ClassHandle,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> Option<MethodHandle> {
        let key = (class.as_raw(), name.to_string(), descriptor.to_string(), is_static);
        if let Some(raw) = self.handles.methods.lookup(&key) {
            return MethodHandle::from_raw(raw);
        }
        let mut env = env(&self.vm)?;
        let global = self.handles.class(class)?;
        let class = <&JClass>::from(global.as_obj());
        let resolved = if is_static {
            env.get_static_method_id(class, name, descriptor)
                .map(MethodId::Static)
        } else {
            env.get_method_id(class, name, descriptor)
                .map(MethodId::Instance)
        };
        match resolved {
            Ok(id) => MethodHandle::from_raw(self.handles.methods.insert(key, id)),
            Err(e) => {
                raise(&mut env, e);
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
        let mut env = env(&self.vm)?;
        let (Some(global), Some(MethodId::Instance(id)), Some(jargs)) = (
            self.handles.class(class),
            self.handles.method(ctor),
            self.handles.arguments(args),
        ) else {
            let _ = env.throw_new("java/lang/IllegalArgumentException", "stale handle");
            return None;
        };

        // SAFETY: `id` is a constructor of `global` and the arguments match
        // its descriptor.
        let created =
            unsafe { env.new_object_unchecked(<&JClass>::from(global.as_obj()), id, &jargs) };
        match created {
            Ok(obj) => self.handles.adopt(&mut env, obj),
            Err(e) => {
                raise(&mut env, e);
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
        self.invoke(Ok(obj), method, kind, args)
    }

    fn call_static_method(
        &mut self,
        class: ClassHandle,
        method: MethodHandle,
        kind: ReturnKind,
        args: &[Value],
    ) -> Value {
        self.invoke(Err(class), method, kind, args)
    }

    fn new_string_utf(&mut self, text: &str) -> Option<ObjectHandle> {
        let mut env = env(&self.vm)?;
        match env.new_string(text) {
            Ok(s) => self.handles.adopt(&mut env, JObject::from(s)),
            Err(e) => {
                raise(&mut env, e);
                None
            }
        }
    }

    fn string_utf_chars(&mut self, string: ObjectHandle) -> Option<StringChars> {
        let mut env = env(&self.vm)?;
        let global = self.handles.object(string)?;
        let text = env
            .get_string(<&JString>::from(global.as_obj()))
            .map(String::from);
        match text {
            Ok(text) => {
                self.handles.next_pin += 1;
                Some(StringChars::new(self.handles.next_pin, text))
            }
            Err(e) => {
                raise(&mut env, e);
                None
            }
        }
    }

    fn release_string_utf_chars(&mut self, _string: ObjectHandle, _chars: StringChars) {
        // the JavaStr buffer was released when its contents were copied
    }

    fn delete_local_ref(&mut self, obj: ObjectHandle) {
        self.handles.objects.remove(&obj.as_raw());
    }

    fn exception_check(&mut self) -> bool {
        env(&self.vm)
            .and_then(|env| env.exception_check().ok())
            .unwrap_or(false)
    }

    fn exception_describe(&mut self) -> Option<String> {
        let mut env = env(&self.vm)?;
        if !env.exception_check().ok()? {
            return None;
        }
        let throwable = env.exception_occurred().ok()?;
        env.exception_clear().ok()?;

        let description = env
            .call_method(&throwable, "toString", "()Ljava/lang/String;", &[])
            .and_then(|v| v.l())
            .and_then(|s| env.get_string(&JString::from(s)).map(String::from));
        let _ = env.exception_clear();
        let _ = env.throw(&throwable);

        Some(description.unwrap_or_else(|_| "java.lang.Throwable".to_string()))
    }

    fn exception_clear(&mut self) {
        if let Some(env) = env(&self.vm) {
            let _ = env.exception_clear();
        }
    }
}
