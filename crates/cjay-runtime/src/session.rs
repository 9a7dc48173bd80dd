//! Runtime session
//!
//! A `Session` owns the one foreign runtime instance a process talks to.
//! Class bindings and converters borrow it; nothing reaches the runtime
//! through ambient global state.
//!
//! Lifecycle: `Idle → Live → Destroyed`. A destroyed session is never
//! relaunched.

use crate::backend::{ForeignRuntime, LaunchOptions};
use crate::error::{BridgeError, BridgeResult};
use crate::value::{ClassHandle, MethodHandle, ObjectHandle, ToForeign, Value};
use cjay_config::BridgeConfig;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Live,
    Destroyed,
}

enum SessionState<R> {
    Idle,
    Live(R),
    Destroyed,
}

/// Ownership-bearing context for a foreign runtime
///
/// The session is `!Sync`; the runtime's execution context must not be
/// shared across threads.
///
/// # Examples
///
/// ```
/// use cjay_runtime::{MemoryVm, Session};
///
/// let session: Session<MemoryVm> = Session::new();
/// session.create(&["-Xmx64m"]).unwrap();
/// assert!(session.is_live());
///
/// // a second create keeps the first runtime
/// session.create(&["-Xmx1g"]).unwrap();
/// assert_eq!(session.launch_options().unwrap().options, vec!["-Xmx64m"]);
///
/// session.destroy();
/// ```
pub struct Session<R: ForeignRuntime> {
    state: RefCell<SessionState<R>>,
    launch: RefCell<Option<LaunchOptions>>,
}

impl<R: ForeignRuntime> Session<R> {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(SessionState::Idle),
            launch: RefCell::new(None),
        }
    }

    /// Start the runtime with raw option strings
    ///
    /// No-op when the session is already live.
    pub fn create<S: AsRef<str>>(&self, options: &[S]) -> BridgeResult<()> {
        self.create_with(LaunchOptions::new(options))
    }

    /// Start the runtime with the launch arguments from a configuration
    pub fn create_from_config(&self, config: &BridgeConfig) -> BridgeResult<()> {
        self.create_with(LaunchOptions::from_config(&config.jvm))
    }

    /// Start the runtime with explicit launch arguments
    pub fn create_with(&self, options: LaunchOptions) -> BridgeResult<()> {
        let mut state = self
            .state
            .try_borrow_mut()
            .map_err(|_| BridgeError::SessionBusy)?;

        match &*state {
            SessionState::Live(_) => {
                log::debug!(
                    "runtime already live; create is a no-op (ignored options: {:?})",
                    options.options
                );
                return Ok(());
            }
            SessionState::Destroyed => {
                return Err(BridgeError::RuntimeStartFailure(
                    "the runtime was destroyed and cannot be created again".to_string(),
                ));
            }
            SessionState::Idle => {}
        }

        let runtime = R::launch(&options).map_err(|e| {
            log::error!("runtime launch failed: {}", e);
            BridgeError::RuntimeStartFailure(e.to_string())
        })?;

        log::info!(
            "runtime created (version {}, {} option(s))",
            options.version,
            options.options.len()
        );
        *state = SessionState::Live(runtime);
        *self.launch.borrow_mut() = Some(options);
        Ok(())
    }

    /// Tear the runtime down
    ///
    /// Idempotent: destroying an idle or destroyed session does nothing.
    /// Bindings and converters must be finished with the session first;
    /// references they still hold are not released afterwards.
    pub fn destroy(&self) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            log::warn!("destroy called while the runtime is in use; ignored");
            return;
        };
        if let SessionState::Live(runtime) = &mut *state {
            runtime.destroy();
            log::info!("runtime destroyed");
            *state = SessionState::Destroyed;
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.state.try_borrow() {
            Ok(state) => match &*state {
                SessionState::Idle => SessionStatus::Idle,
                SessionState::Live(_) => SessionStatus::Live,
                SessionState::Destroyed => SessionStatus::Destroyed,
            },
            // only a live runtime can be borrowed
            Err(_) => SessionStatus::Live,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status() == SessionStatus::Live
    }

    /// Options the live runtime was launched with
    pub fn launch_options(&self) -> Option<Ref<'_, LaunchOptions>> {
        Ref::filter_map(self.launch.borrow(), Option::as_ref).ok()
    }

    /// Borrow the live runtime's execution context
    ///
    /// Fails with `SessionNotReady` unless the session is live, and with
    /// `SessionBusy` if the context is already borrowed.
    pub fn active_context(&self) -> BridgeResult<RefMut<'_, R>> {
        let state = self
            .state
            .try_borrow_mut()
            .map_err(|_| BridgeError::SessionBusy)?;
        RefMut::filter_map(state, |state| match state {
            SessionState::Live(runtime) => Some(runtime),
            _ => None,
        })
        .map_err(|_| BridgeError::SessionNotReady)
    }

    /// Release a foreign local reference
    pub fn release_reference(&self, handle: ObjectHandle) -> BridgeResult<()> {
        self.active_context()?.delete_local_ref(handle);
        Ok(())
    }

    /// Adopt a local reference into a scoped guard
    pub fn local(&self, handle: ObjectHandle) -> LocalRef<'_, R> {
        LocalRef {
            session: self,
            handle,
        }
    }

    /// Allocate a foreign string
    pub fn new_string(&self, text: &str) -> BridgeResult<LocalRef<'_, R>> {
        let handle = {
            let mut ctx = self.active_context()?;
            let handle = ctx.new_string_utf(text);
            check_pending(&mut *ctx, "NewStringUTF")?;
            handle
        };
        handle
            .map(|h| self.local(h))
            .ok_or_else(|| BridgeError::NullReference("NewStringUTF returned null".to_string()))
    }

    /// Look up a class by internal name
    pub fn find_class(&self, name: &str) -> BridgeResult<ClassHandle> {
        let mut ctx = self.active_context()?;
        let found = ctx.find_class(name);
        let cause = take_pending(&mut *ctx);
        match found {
            Some(handle) if cause.is_none() => Ok(handle),
            _ => Err(BridgeError::ClassNotFound {
                class: name.to_string(),
                cause,
            }),
        }
    }

    /// Resolve a dispatch handle on a loaded class
    pub fn method_id(
        &self,
        class: ClassHandle,
        class_name: &str,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> BridgeResult<MethodHandle> {
        let mut ctx = self.active_context()?;
        let found = ctx.method_id(class, name, descriptor, is_static);
        let cause = take_pending(&mut *ctx);
        match found {
            Some(handle) if cause.is_none() => Ok(handle),
            _ => Err(BridgeError::MethodResolutionFailed {
                class: class_name.to_string(),
                method: name.to_string(),
                descriptor: descriptor.to_string(),
                cause,
            }),
        }
    }
}

impl<R: ForeignRuntime> Default for Session<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ForeignRuntime> fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status())
            .finish()
    }
}

/// Describe and clear the pending foreign exception, if any
pub(crate) fn take_pending<R: ForeignRuntime + ?Sized>(runtime: &mut R) -> Option<String> {
    if !runtime.exception_check() {
        return None;
    }
    let description = runtime
        .exception_describe()
        .unwrap_or_else(|| "unknown foreign exception".to_string());
    runtime.exception_clear();
    log::warn!("foreign exception cleared: {}", description);
    Some(description)
}

/// Raise a pending foreign exception as `ForeignException`
pub(crate) fn check_pending<R: ForeignRuntime + ?Sized>(
    runtime: &mut R,
    method: &str,
) -> BridgeResult<()> {
    match take_pending(runtime) {
        Some(description) => Err(BridgeError::ForeignException {
            method: method.to_string(),
            description,
        }),
        None => Ok(()),
    }
}

/// Scoped local reference
///
/// Deletes the reference when dropped, unless it was handed out with
/// `into_raw`.
pub struct LocalRef<'s, R: ForeignRuntime> {
    session: &'s Session<R>,
    handle: ObjectHandle,
}

impl<'s, R: ForeignRuntime> LocalRef<'s, R> {
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Give up ownership; the caller must release the handle
    pub fn into_raw(self) -> ObjectHandle {
        let handle = self.handle;
        std::mem::forget(self);
        handle
    }

    pub fn session(&self) -> &'s Session<R> {
        self.session
    }
}

impl<R: ForeignRuntime> Drop for LocalRef<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.session.release_reference(self.handle) {
            log::debug!("local reference {} not released: {}", self.handle, e);
        }
    }
}

impl<R: ForeignRuntime> fmt::Debug for LocalRef<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalRef").field(&self.handle).finish()
    }
}

impl<R: ForeignRuntime> ToForeign for &LocalRef<'_, R> {
    fn to_foreign(self) -> Value {
        Value::Object(self.handle())
    }
}
