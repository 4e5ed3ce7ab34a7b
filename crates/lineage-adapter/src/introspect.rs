//! The introspection surface
//!
//! Each query has one meaning on every host; how a release encodes the
//! answer is the implementor's business. [`Adapter`](crate::Adapter) is the
//! memory-backed implementation.

use rustc_hash::FxHashSet;

use crate::error::{AdapterError, AdapterResult};
use crate::handle::{ClassHandle, MethodSet, MethodVisibility, ModuleIdentity, ObjectHandle};

/// Uniform read-only queries over a host object model
pub trait Introspect {
    /// Next link of the internal ancestry chain, proxies included
    ///
    /// `None` at the root.
    fn superclass(&self, class: ClassHandle) -> AdapterResult<Option<ClassHandle>>;

    /// Internal class of any value, singleton class included
    fn class_of(&self, object: ObjectHandle) -> AdapterResult<ClassHandle>;

    /// The class or module an ancestry slot stands for
    fn real_module(&self, class: ClassHandle) -> AdapterResult<ModuleIdentity>;

    /// Host-visible name; empty for anonymous classes and modules
    fn module_name(&self, class: ClassHandle) -> AdapterResult<String>;

    /// Check if the handle is a singleton class
    fn is_singleton(&self, class: ClassHandle) -> AdapterResult<bool>;

    /// Check if the handle is an included-module proxy
    fn is_included_proxy(&self, class: ClassHandle) -> AdapterResult<bool>;

    /// The one object a singleton class is attached to
    fn singleton_instance(&self, class: ClassHandle) -> AdapterResult<ObjectHandle>;

    /// Names defined directly on the handle with exactly `visibility`
    fn instance_methods(
        &self,
        class: ClassHandle,
        visibility: MethodVisibility,
    ) -> AdapterResult<MethodSet>;

    /// Names explicitly undefined directly on the handle
    ///
    /// Empty (with a one-time warning) on hosts that cannot tell.
    fn undefined_instance_methods(&self, class: ClassHandle) -> AdapterResult<MethodSet>;

    /// Public names defined directly on the handle
    fn public_instance_methods(&self, class: ClassHandle) -> AdapterResult<MethodSet> {
        self.instance_methods(class, MethodVisibility::Public)
    }

    /// Protected names defined directly on the handle
    fn protected_instance_methods(&self, class: ClassHandle) -> AdapterResult<MethodSet> {
        self.instance_methods(class, MethodVisibility::Protected)
    }

    /// Private names defined directly on the handle
    fn private_instance_methods(&self, class: ClassHandle) -> AdapterResult<MethodSet> {
        self.instance_methods(class, MethodVisibility::Private)
    }

    /// The handle and every link above it, in lookup order
    fn ancestry(&self, class: ClassHandle) -> AdapterResult<Vec<ClassHandle>> {
        let mut seen = FxHashSet::default();
        let mut chain = Vec::new();
        let mut current = Some(class);

        while let Some(link) = current {
            if !seen.insert(link) {
                return Err(AdapterError::InternalInconsistency(format!(
                    "ancestry of {:#x} revisits {:#x}",
                    class.raw(),
                    link.raw()
                )));
            }
            chain.push(link);
            current = self.superclass(link)?;
        }
        Ok(chain)
    }

    /// Modules consulted, in order, when looking up a method on `object`
    fn lookup_modules(&self, object: ObjectHandle) -> AdapterResult<Vec<ModuleIdentity>> {
        let class = self.class_of(object)?;
        self.ancestry(class)?
            .into_iter()
            .map(|link| self.real_module(link))
            .collect()
    }
}
