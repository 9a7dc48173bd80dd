//! Signature registry
//!
//! Each class binding owns one registry keyed by method name. Entries are
//! replaced wholesale on re-registration; the only in-place mutation is the
//! dispatch handle filled in when the class is bound.

use crate::descriptor::{MethodDescriptor, ReturnKind};
use crate::error::BridgeResult;
use crate::value::MethodHandle;
use std::collections::BTreeMap;
use std::fmt;

/// Registry name of a class's constructor
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// A registered method
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureEntry {
    name: String,
    descriptor: MethodDescriptor,
    is_static: bool,
    dispatch: Option<MethodHandle>,
}

impl SignatureEntry {
    /// Create an unresolved entry, parsing its descriptor
    pub fn new(name: impl Into<String>, descriptor: &str, is_static: bool) -> BridgeResult<Self> {
        Ok(Self {
            name: name.into(),
            descriptor: MethodDescriptor::parse(descriptor)?,
            is_static,
            dispatch: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn return_kind(&self) -> ReturnKind {
        self.descriptor.return_kind()
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Dispatch handle, present once the owning class is bound
    pub fn dispatch(&self) -> Option<MethodHandle> {
        self.dispatch
    }

    pub(crate) fn set_dispatch(&mut self, handle: Option<MethodHandle>) {
        self.dispatch = handle;
    }
}

impl fmt::Display for SignatureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Method:{}, Descriptor:{}, isStatic:{}>",
            self.name, self.descriptor, self.is_static
        )
    }
}

/// Signature entries keyed by method name, iterated in name order
#[derive(Debug, Clone, Default)]
pub struct SignatureRegistry {
    entries: BTreeMap<String, SignatureEntry>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the one it replaced
    pub fn insert(&mut self, entry: SignatureEntry) -> Option<SignatureEntry> {
        self.entries.insert(entry.name.clone(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&SignatureEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignatureEntry> {
        self.entries.values()
    }

    /// Install resolved handles, all or nothing
    ///
    /// `handles` must hold one handle per entry, in iteration order.
    pub(crate) fn commit(&mut self, handles: Vec<MethodHandle>) {
        debug_assert_eq!(handles.len(), self.entries.len());
        for (entry, handle) in self.entries.values_mut().zip(handles) {
            entry.set_dispatch(Some(handle));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[test]
    fn test_entry_display() {
        let entry = SignatureEntry::new("max", "(II)I", true).unwrap();
        assert_eq!(
            entry.to_string(),
            "<Method:max, Descriptor:(II)I, isStatic:true>"
        );
        assert_eq!(entry.return_kind(), ReturnKind::Int);
        assert!(entry.dispatch().is_none());
    }

    #[test]
    fn test_entry_rejects_bad_descriptor() {
        assert!(matches!(
            SignatureEntry::new("f", "()Q", false),
            Err(BridgeError::MalformedDescriptor { .. })
        ));
    }

    #[test]
    fn test_insert_replaces() {
        let mut registry = SignatureRegistry::new();
        registry.insert(SignatureEntry::new("f", "()I", false).unwrap());
        let old = registry.insert(SignatureEntry::new("f", "()J", true).unwrap());
        assert_eq!(registry.len(), 1);
        assert_eq!(old.map(|e| e.return_kind()), Some(ReturnKind::Int));
        assert!(registry.get("f").unwrap().is_static());
    }

    #[test]
    fn test_iteration_is_name_ordered() {
        let mut registry = SignatureRegistry::new();
        for name in ["zeta", "alpha", CONSTRUCTOR_NAME, "mid"] {
            registry.insert(SignatureEntry::new(name, "()V", false).unwrap());
        }
        let names: Vec<&str> = registry.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["<init>", "alpha", "mid", "zeta"]);
    }
}
