//! Lineage Introspection Adapter
//!
//! Read-only queries over a host runtime's internal object model: the real
//! ancestry chain (included-module proxies and singleton classes included),
//! method tables split by visibility, and explicitly undefined methods.
//!
//! The queries mean the same thing on every supported release; the
//! [`lineage_facts`] entry the adapter is bound to supplies the layouts.
//!
//! ```ignore
//! use lineage_adapter::{Adapter, Introspect, MethodVisibility, ObjectHandle};
//!
//! let adapter = Adapter::from_image(facts, image)?;
//! for module in adapter.lookup_modules(ObjectHandle::from_raw(word))? {
//!     let name = adapter.module_name(module.module())?;
//!     let public = adapter.instance_methods(module.module(), MethodVisibility::Public)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod adapter;
pub mod binding;
pub mod error;
pub mod handle;
pub mod introspect;
mod methods;
pub mod warning;

pub use adapter::{Adapter, Capabilities, ORIGIN_SUFFIX};
pub use binding::{Binding, BindingState};
pub use error::{AdapterError, AdapterResult};
pub use handle::{ClassHandle, MethodSet, MethodVisibility, ModuleIdentity, ObjectHandle};
pub use introspect::Introspect;
pub use warning::{CapabilityWarning, UNDEFINED_METHODS_WARNING};
