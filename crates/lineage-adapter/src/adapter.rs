//! Memory-backed adapter
//!
//! Answers [`Introspect`] queries by decoding host memory with one facts
//! entry. Identity queries live here; method-table queries in `methods`.

use lineage_facts::{
    Capability, ClassField, HeapImage, Header, HostImage, HostMemory, HostRoots, ObjectKind,
    ObjectModel, ObjectModelFacts, OriginLayout, SingletonMarker, UndefinedMarker, ValueWord,
};

use crate::error::{AdapterError, AdapterResult};
use crate::handle::{ClassHandle, MethodSet, MethodVisibility, ModuleIdentity, ObjectHandle};
use crate::introspect::Introspect;
use crate::warning::{CapabilityWarning, UNDEFINED_METHODS_WARNING};

/// Suffix on the name of a class's own storage behind a prepended module
pub const ORIGIN_SUFFIX: &str = " (origin)";

/// What the bound facts can and cannot answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// How undefined methods are marked
    pub undefined_methods: UndefinedMarker,
    /// Origin proxy support
    pub origin_proxies: Capability<OriginLayout>,
}

impl Capabilities {
    /// Check if undefined names can be reported exactly
    pub fn detects_undefined(&self) -> bool {
        self.undefined_methods.is_detectable()
    }
}

/// Introspection adapter over one host's memory
pub struct Adapter<M: HostMemory> {
    pub(crate) facts: ObjectModelFacts,
    memory: M,
    roots: HostRoots,
    pub(crate) undefined_warning: &'static CapabilityWarning,
}

impl<M: HostMemory> Adapter<M> {
    /// Create an adapter; the facts are validated first
    pub fn new(facts: ObjectModelFacts, memory: M, roots: HostRoots) -> AdapterResult<Self> {
        facts.validate()?;
        tracing::debug!(
            release = %facts.release,
            detects_undefined = facts.detects_undefined(),
            origins = facts.origin.is_supported(),
            "adapter created"
        );
        Ok(Self {
            facts,
            memory,
            roots,
            undefined_warning: &UNDEFINED_METHODS_WARNING,
        })
    }

    /// Use a different latch for the degraded undefined-methods warning
    pub fn with_undefined_warning(mut self, latch: &'static CapabilityWarning) -> Self {
        self.undefined_warning = latch;
        self
    }

    /// Facts this adapter decodes with
    pub fn facts(&self) -> &ObjectModelFacts {
        &self.facts
    }

    /// Capability summary for the bound facts
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            undefined_methods: self.facts.undefined,
            origin_proxies: self.facts.origin,
        }
    }

    pub(crate) fn model(&self) -> ObjectModel<'_, M> {
        ObjectModel::new(&self.facts, &self.memory, &self.roots)
    }

    /// Header and kind of a handle that must be class-like
    pub(crate) fn class_header(&self, class: ClassHandle) -> AdapterResult<(Header, ObjectKind)> {
        let raw = class.raw();
        let model = self.model();
        if let ValueWord::Immediate(kind) = model.classify_word(raw) {
            return Err(AdapterError::invalid_handle(
                raw,
                format!("{:?} immediate is not a class", kind),
            ));
        }
        let header = model
            .header(raw)
            .map_err(|e| AdapterError::unreadable_handle(raw, e))?;
        let kind = model.kind(&header);
        if !kind.is_class_like() {
            return Err(AdapterError::invalid_handle(
                raw,
                format!("{:?} is not a class, module or proxy", kind),
            ));
        }
        Ok((header, kind))
    }

    pub(crate) fn field(&self, class: ClassHandle, field: ClassField) -> AdapterResult<u64> {
        self.model()
            .class_field(class.raw(), field)
            .map_err(|e| AdapterError::inconsistent(format_args!("{:?} of {:?}", field, class), e))
    }

    fn kind_of(&self, addr: u64) -> AdapterResult<ObjectKind> {
        let model = self.model();
        let header = model
            .header(addr)
            .map_err(|e| AdapterError::inconsistent(format_args!("header of {:#x}", addr), e))?;
        Ok(model.kind(&header))
    }

    fn singleton_flag(&self, class: ClassHandle, header: &Header, kind: ObjectKind) -> AdapterResult<bool> {
        Ok(match self.facts.singleton {
            SingletonMarker::FlagBit { mask } => kind == ObjectKind::Class && header.flags & mask != 0,
            SingletonMarker::TypeTag => kind == ObjectKind::Metaclass,
            SingletonMarker::AttachedNonNull => {
                kind == ObjectKind::Class && self.field(class, ClassField::Attached)? != 0
            }
        })
    }
}

impl Adapter<HeapImage> {
    /// Create an adapter over a finished heap image
    pub fn from_image(facts: ObjectModelFacts, image: HostImage) -> AdapterResult<Self> {
        Self::new(facts, image.memory, image.roots)
    }
}

impl<M: HostMemory> Introspect for Adapter<M> {
    fn superclass(&self, class: ClassHandle) -> AdapterResult<Option<ClassHandle>> {
        self.class_header(class)?;
        let link = self.field(class, ClassField::Super)?;
        Ok((link != 0).then(|| ClassHandle::from_raw(link)))
    }

    fn class_of(&self, object: ObjectHandle) -> AdapterResult<ClassHandle> {
        let raw = object.raw();
        let model = self.model();
        match model.classify_word(raw) {
            ValueWord::Immediate(kind) => model
                .immediate_class(kind)
                .map(ClassHandle::from_raw)
                .ok_or_else(|| {
                    AdapterError::InternalInconsistency(format!(
                        "no class registered for {:?} immediates",
                        kind
                    ))
                }),
            ValueWord::Heap(addr) => {
                let header = model
                    .header(addr)
                    .map_err(|e| AdapterError::unreadable_handle(raw, e))?;
                match model.kind(&header) {
                    ObjectKind::Proxy => {
                        return Err(AdapterError::invalid_handle(raw, "proxies are not host values"))
                    }
                    ObjectKind::Other(tag) => {
                        return Err(AdapterError::invalid_handle(
                            raw,
                            format!("unknown type tag {:#x}", tag),
                        ))
                    }
                    _ => {}
                }
                if header.klass == 0 {
                    return Err(AdapterError::InternalInconsistency(format!(
                        "object {:#x} has no class",
                        addr
                    )));
                }
                Ok(ClassHandle::from_raw(header.klass))
            }
        }
    }

    fn real_module(&self, class: ClassHandle) -> AdapterResult<ModuleIdentity> {
        let (header, kind) = self.class_header(class)?;
        if kind != ObjectKind::Proxy {
            return Ok(ModuleIdentity::new(class, false));
        }

        let target = ClassHandle::from_raw(header.klass);
        match self.kind_of(header.klass)? {
            ObjectKind::Module => Ok(ModuleIdentity::new(target, false)),
            ObjectKind::Class | ObjectKind::Metaclass => {
                if !self.facts.origin.is_supported() {
                    return Err(AdapterError::InternalInconsistency(format!(
                        "proxy {:?} wraps class {:?} but {} has no origin proxies",
                        class, target, self.facts.release
                    )));
                }
                let origin = self.field(target, ClassField::Origin)?;
                if origin != class.raw() {
                    return Err(AdapterError::InternalInconsistency(format!(
                        "proxy {:?} wraps class {:?} whose origin is {:#x}",
                        class, target, origin
                    )));
                }
                Ok(ModuleIdentity::new(target, true))
            }
            other => Err(AdapterError::InternalInconsistency(format!(
                "proxy {:?} wraps {:?}",
                class, other
            ))),
        }
    }

    fn module_name(&self, class: ClassHandle) -> AdapterResult<String> {
        let identity = self.real_module(class)?;
        let ptr = self.field(identity.module(), ClassField::Name)?;
        let mut name = if ptr == 0 {
            String::new()
        } else {
            self.model()
                .string(ptr)
                .map_err(|e| AdapterError::inconsistent(format_args!("name of {:?}", identity.module()), e))?
        };
        if identity.is_origin() {
            name.push_str(ORIGIN_SUFFIX);
        }
        Ok(name)
    }

    fn is_singleton(&self, class: ClassHandle) -> AdapterResult<bool> {
        let raw = class.raw();
        let model = self.model();
        if let ValueWord::Immediate(_) = model.classify_word(raw) {
            return Ok(false);
        }
        let header = model
            .header(raw)
            .map_err(|e| AdapterError::unreadable_handle(raw, e))?;
        let kind = model.kind(&header);
        if !kind.is_class_like() {
            return Ok(false);
        }
        self.singleton_flag(class, &header, kind)
    }

    fn is_included_proxy(&self, class: ClassHandle) -> AdapterResult<bool> {
        let raw = class.raw();
        let model = self.model();
        if let ValueWord::Immediate(_) = model.classify_word(raw) {
            return Ok(false);
        }
        let header = model
            .header(raw)
            .map_err(|e| AdapterError::unreadable_handle(raw, e))?;
        Ok(model.kind(&header) == ObjectKind::Proxy)
    }

    fn singleton_instance(&self, class: ClassHandle) -> AdapterResult<ObjectHandle> {
        let (header, kind) = self.class_header(class)?;
        if !self.singleton_flag(class, &header, kind)? {
            return Err(AdapterError::NotSingleton { handle: class.raw() });
        }
        match self.field(class, ClassField::Attached)? {
            0 => Err(AdapterError::InternalInconsistency(format!(
                "can't find singleton object for {:?}",
                class
            ))),
            attached => Ok(ObjectHandle::from_raw(attached)),
        }
    }

    fn instance_methods(
        &self,
        class: ClassHandle,
        visibility: MethodVisibility,
    ) -> AdapterResult<MethodSet> {
        self.collect_defined(class, visibility)
    }

    fn undefined_instance_methods(&self, class: ClassHandle) -> AdapterResult<MethodSet> {
        self.collect_undefined(class)
    }
}
