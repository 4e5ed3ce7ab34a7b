//! Handles and query results
//!
//! Handles are plain host words. The adapter never fabricates one: every
//! handle it returns was read out of host memory.

use std::fmt;

use lineage_facts::Address;
use rustc_hash::FxHashSet;

pub use lineage_facts::MethodVisibility;

/// Set of method names; iteration order carries no meaning
pub type MethodSet = FxHashSet<String>;

/// A class, module, singleton class or included-module proxy
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassHandle(Address);

impl ClassHandle {
    /// Wrap a raw host address
    pub const fn from_raw(addr: Address) -> Self {
        Self(addr)
    }

    /// Raw host address
    pub const fn raw(self) -> Address {
        self.0
    }
}

impl fmt::Debug for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassHandle({:#x})", self.0)
    }
}

/// Any host value: a heap reference or an immediate
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// Wrap a raw host value word
    pub const fn from_raw(word: u64) -> Self {
        Self(word)
    }

    /// Raw host value word
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({:#x})", self.0)
    }
}

impl From<ClassHandle> for ObjectHandle {
    /// Classes are objects too
    fn from(class: ClassHandle) -> Self {
        Self(class.raw())
    }
}

/// The class or module behind an ancestry slot
///
/// A proxy and the module it wraps share one identity. An origin proxy (a
/// class's own storage moved behind a prepended module) maps to the class
/// itself with `origin` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleIdentity {
    module: ClassHandle,
    origin: bool,
}

impl ModuleIdentity {
    pub(crate) fn new(module: ClassHandle, origin: bool) -> Self {
        Self { module, origin }
    }

    /// The class or module
    pub fn module(&self) -> ClassHandle {
        self.module
    }

    /// Check if the slot is the class's own storage behind a prepend
    pub fn is_origin(&self) -> bool {
        self.origin
    }
}

impl PartialEq<ClassHandle> for ModuleIdentity {
    fn eq(&self, other: &ClassHandle) -> bool {
        self.module == *other
    }
}
