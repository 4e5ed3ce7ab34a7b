//! Heap image authoring
//!
//! [`ImageBuilder`] lays out a small host heap in the exact byte format a
//! facts entry describes: class records, proxies, singleton classes, method
//! tables in the release's storage shape, method records in the release's
//! visibility and undefined encodings, and the symbol table. The result is a
//! [`HostImage`] that any adapter can decode.
//!
//! Class records and method records are written as soon as they are created.
//! Method tables and the symbol table change until the end, so they are kept
//! as models and serialized by [`ImageBuilder::finish`].

use rustc_hash::FxHashMap;

use crate::decode::HostRoots;
use crate::error::{FactsError, FactsResult};
use crate::facts::{
    ImmediateKind, MethodTableShape, MethodVisibility, ObjectModelFacts, SingletonMarker,
    UndefinedMarker, VisibilityLocation,
};
use crate::memory::{Address, HeapImage, WORD};

/// Default image base address
pub const DEFAULT_BASE: Address = 0x10_0000;

/// A finished heap image with its roots
#[derive(Debug, Clone)]
pub struct HostImage {
    /// The heap bytes
    pub memory: HeapImage,
    /// Host-global addresses
    pub roots: HostRoots,
}

#[derive(Debug, Default)]
struct TableModel {
    // Insertion order; redefinition keeps the original slot.
    entries: Vec<(u64, Address)>,
}

impl TableModel {
    fn insert(&mut self, serial: u64, record: Address) {
        match self.entries.iter_mut().find(|(s, _)| *s == serial) {
            Some(slot) => slot.1 = record,
            None => self.entries.push((serial, record)),
        }
    }

    fn remove(&mut self, serial: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(s, _)| *s != serial);
        self.entries.len() != before
    }
}

#[derive(Debug, Clone, Copy)]
struct ClassModel {
    table: usize,
    origin: Option<Address>,
}

/// Builds heap images in any facts layout
///
/// # Panics
///
/// Class, module and object addresses passed to the builder must have been
/// returned by the same builder. Methods that take them panic on an address
/// from another builder or image.
pub struct ImageBuilder {
    facts: ObjectModelFacts,
    base: Address,
    bytes: Vec<u8>,
    classes: FxHashMap<Address, ClassModel>,
    tables: Vec<TableModel>,
    symbols: FxHashMap<String, u64>,
    next_serial: u64,
    object_class: Address,
    module_class: Address,
    class_class: Address,
    immediate_classes: FxHashMap<ImmediateKind, Address>,
}

impl ImageBuilder {
    /// Start an image at [`DEFAULT_BASE`] with the core classes in place
    pub fn new(facts: ObjectModelFacts) -> FactsResult<Self> {
        Self::with_base(facts, DEFAULT_BASE)
    }

    /// Start an image at `base`
    pub fn with_base(facts: ObjectModelFacts, base: Address) -> FactsResult<Self> {
        facts.validate()?;
        if base == 0 || base % WORD != 0 {
            return Err(FactsError::InvalidFacts {
                release: facts.release.clone(),
                reason: format!("image base {:#x} must be non-null and aligned", base),
            });
        }

        let next_serial = facts.symbols.allocator_serial + 1;
        let mut builder = Self {
            facts,
            base,
            bytes: Vec::new(),
            classes: FxHashMap::default(),
            tables: Vec::new(),
            symbols: FxHashMap::default(),
            next_serial,
            object_class: 0,
            module_class: 0,
            class_class: 0,
            immediate_classes: FxHashMap::default(),
        };

        let class_tag = builder.facts.tags.class;
        let object = builder.alloc_class_record(class_tag, 0, 0, Some("Object"));
        let module = builder.alloc_class_record(class_tag, 0, object, Some("Module"));
        let class = builder.alloc_class_record(class_tag, 0, module, Some("Class"));
        for core in [object, module, class] {
            builder.write_word(core + WORD, class);
        }
        builder.object_class = object;
        builder.module_class = module;
        builder.class_class = class;

        let kinds: Vec<ImmediateKind> = builder.facts.immediates.iter().map(|r| r.kind).collect();
        for kind in kinds {
            let name = match kind {
                ImmediateKind::Integer => "Integer",
                ImmediateKind::Float => "Float",
                ImmediateKind::Symbol => "Symbol",
                ImmediateKind::Nil => "NilClass",
                ImmediateKind::True => "TrueClass",
                ImmediateKind::False => "FalseClass",
            };
            let klass = builder.define_class(name, Some(object));
            builder.immediate_classes.insert(kind, klass);
        }

        Ok(builder)
    }

    /// Facts the image is laid out with
    pub fn facts(&self) -> &ObjectModelFacts {
        &self.facts
    }

    /// The root `Object` class
    pub fn object_class(&self) -> Address {
        self.object_class
    }

    /// The `Module` class
    pub fn module_class(&self) -> Address {
        self.module_class
    }

    /// The `Class` class
    pub fn class_class(&self) -> Address {
        self.class_class
    }

    /// Class registered for an immediate kind
    pub fn immediate_class(&self, kind: ImmediateKind) -> Option<Address> {
        self.immediate_classes.get(&kind).copied()
    }

    /// A representative value word of an immediate kind
    pub fn immediate_value(&self, kind: ImmediateKind) -> Option<u64> {
        let rule = self.facts.immediates.iter().find(|r| r.kind == kind)?;
        if rule.mask == u64::MAX {
            return Some(rule.pattern);
        }
        let payload_shift = 64 - rule.mask.leading_zeros();
        Some(rule.pattern | (42u64 << payload_shift))
    }

    /// Define a named class
    pub fn define_class(&mut self, name: &str, superclass: Option<Address>) -> Address {
        let tag = self.facts.tags.class;
        let klass = self.class_class;
        self.alloc_class_record(tag, klass, superclass.unwrap_or(0), Some(name))
    }

    /// Define an anonymous class
    pub fn define_anonymous_class(&mut self, superclass: Option<Address>) -> Address {
        let tag = self.facts.tags.class;
        let klass = self.class_class;
        self.alloc_class_record(tag, klass, superclass.unwrap_or(0), None)
    }

    /// Define a named module
    pub fn define_module(&mut self, name: &str) -> Address {
        let tag = self.facts.tags.module;
        let klass = self.module_class;
        self.alloc_class_record(tag, klass, 0, Some(name))
    }

    /// Define an anonymous module
    pub fn define_anonymous_module(&mut self) -> Address {
        let tag = self.facts.tags.module;
        let klass = self.module_class;
        self.alloc_class_record(tag, klass, 0, None)
    }

    /// Allocate a plain object of `class`
    pub fn new_object(&mut self, class: Address) -> Address {
        let obj = self.alloc(2 * WORD);
        self.write_word(obj, self.facts.tags.object);
        self.write_word(obj + WORD, class);
        obj
    }

    /// Splice `module` into `class`'s ancestry just above the class storage
    ///
    /// Returns the new proxy.
    pub fn include_module(&mut self, class: Address, module: Address) -> Address {
        let anchor = self.origin_of(class).unwrap_or(class);
        let table = self.class_model(module).table;
        self.splice_proxy(anchor, module, table)
    }

    /// Splice `module` in front of `class`'s own storage
    ///
    /// The first prepend moves the class's method table into an origin proxy.
    /// Returns the module proxy.
    pub fn prepend_module(&mut self, class: Address, module: Address) -> FactsResult<Address> {
        let origin_offset = self.facts.origin_offset().ok_or_else(|| FactsError::InvalidFacts {
            release: self.facts.release.clone(),
            reason: "host has no origin proxies; prepend is unavailable".to_string(),
        })?;

        if self.origin_of(class).is_none() {
            let own_table = self.class_model(class).table;
            let origin = self.splice_proxy(class, class, own_table);
            self.write_word(class + origin_offset, origin);

            let fresh = self.new_table();
            let model = self.classes.entry(class).or_insert(ClassModel { table: fresh, origin: None });
            model.table = fresh;
            model.origin = Some(origin);
        }

        let table = self.class_model(module).table;
        Ok(self.splice_proxy(class, module, table))
    }

    /// The singleton class of `object`, created on first request
    pub fn singleton_class(&mut self, object: Address) -> Address {
        let current = self.read_word(object + WORD);
        if self.is_singleton_of(current, object) {
            return current;
        }

        let (tag, extra_flags) = match self.facts.singleton {
            SingletonMarker::FlagBit { mask } => (self.facts.tags.class, mask),
            // `validate` guarantees the metaclass tag exists for this marker.
            SingletonMarker::TypeTag => (self.facts.tags.metaclass.unwrap_or(self.facts.tags.class), 0),
            SingletonMarker::AttachedNonNull => (self.facts.tags.class, 0),
        };
        let klass = self.class_class;
        let singleton = self.alloc_class_record(tag, klass, current, None);
        let flags = self.read_word(singleton);
        self.write_word(singleton, flags | extra_flags);
        let attached = self.facts.class_layout.attached_offset;
        self.write_word(singleton + attached, object);
        self.write_word(object + WORD, singleton);
        singleton
    }

    /// Define (or redefine) a method directly on `owner`
    pub fn define_method(&mut self, owner: Address, name: &str, visibility: MethodVisibility) {
        let serial = self.intern(name);
        let record = self.alloc_method_record(MethodState::Defined(visibility));
        let table = self.definition_table(owner);
        self.tables[table].insert(serial, record);
    }

    /// Mark `name` as explicitly undefined on `owner`
    pub fn undef_method(&mut self, owner: Address, name: &str) {
        let serial = self.intern(name);
        let record = self.alloc_method_record(MethodState::Undefined);
        let table = self.definition_table(owner);
        self.tables[table].insert(serial, record);
    }

    /// Delete `name` from `owner`'s table; returns whether it existed
    pub fn remove_method(&mut self, owner: Address, name: &str) -> bool {
        let serial = self.intern(name);
        let table = self.definition_table(owner);
        self.tables[table].remove(serial)
    }

    /// Add the reserved allocator slot to `owner`'s table
    pub fn define_allocator(&mut self, owner: Address) {
        let serial = self.facts.symbols.allocator_serial;
        let record = self.alloc_method_record(MethodState::Defined(MethodVisibility::Private));
        let table = self.definition_table(owner);
        self.tables[table].insert(serial, record);
    }

    /// Serialize tables and symbols and produce the image
    pub fn finish(mut self) -> HostImage {
        let tables = std::mem::take(&mut self.tables);
        let addresses: Vec<Address> = tables.iter().map(|t| self.write_table(t)).collect();

        let mut owners: Vec<(Address, usize)> =
            self.classes.iter().map(|(addr, model)| (*addr, model.table)).collect();
        owners.sort_unstable();
        let m_tbl = self.facts.class_layout.method_table_offset;
        for (class, table) in owners {
            self.write_word(class + m_tbl, addresses[table]);
        }

        let symbol_table = self.write_symbol_table();
        let roots = HostRoots {
            symbol_table,
            immediate_classes: self.immediate_classes.clone(),
        };

        tracing::debug!(
            release = %self.facts.release,
            bytes = self.bytes.len(),
            "finished heap image"
        );

        HostImage {
            memory: HeapImage::new(self.base, self.bytes),
            roots,
        }
    }

    fn origin_of(&self, class: Address) -> Option<Address> {
        self.classes.get(&class).and_then(|m| m.origin)
    }

    fn class_model(&self, class: Address) -> ClassModel {
        match self.classes.get(&class) {
            Some(model) => *model,
            None => panic!("{:#x} is not a class or module of this image", class),
        }
    }

    fn definition_table(&self, owner: Address) -> usize {
        match self.origin_of(owner) {
            Some(origin) => self.class_model(origin).table,
            None => self.class_model(owner).table,
        }
    }

    fn new_table(&mut self) -> usize {
        self.tables.push(TableModel::default());
        self.tables.len() - 1
    }

    fn is_singleton_of(&self, class: Address, object: Address) -> bool {
        if class == 0 {
            return false;
        }
        let attached = self.facts.class_layout.attached_offset;
        self.classes.contains_key(&class) && self.read_word(class + attached) == object
    }

    fn splice_proxy(&mut self, below: Address, target: Address, table: usize) -> Address {
        let tag = self.facts.tags.proxy;
        let super_offset = self.facts.class_layout.super_offset;
        let old_super = self.read_word(below + super_offset);
        let proxy = self.alloc_class_record(tag, target, old_super, None);
        self.write_word(below + super_offset, proxy);
        self.classes.insert(proxy, ClassModel { table, origin: None });
        proxy
    }

    fn alloc_class_record(
        &mut self,
        tag: u64,
        klass: Address,
        superclass: Address,
        name: Option<&str>,
    ) -> Address {
        let layout = self.facts.class_layout;
        let record = self.alloc(layout.record_size);
        self.write_word(record, tag);
        self.write_word(record + WORD, klass);
        self.write_word(record + layout.super_offset, superclass);
        if let Some(name) = name {
            let ptr = self.alloc_string(name);
            self.write_word(record + layout.name_offset, ptr);
        }
        if tag != self.facts.tags.proxy {
            let table = self.new_table();
            self.classes.insert(record, ClassModel { table, origin: None });
        }
        record
    }

    fn alloc_method_record(&mut self, state: MethodState) -> Address {
        let layout = self.facts.method_record;
        let codec = self.facts.visibility;

        let visibility_word = match state {
            MethodState::Defined(visibility) => codec.encode(visibility),
            MethodState::Undefined => codec
                .encode_not_callable()
                .unwrap_or_else(|| codec.encode(MethodVisibility::Public)),
        };

        let null_body = state == MethodState::Undefined
            && self.facts.undefined == UndefinedMarker::NullBody;
        let body = if null_body { 0 } else { self.alloc_body(state) };

        let record = self.alloc(layout.record_size);
        self.write_word(record + layout.body_offset, body);
        match layout.visibility {
            VisibilityLocation::Record { offset } => self.write_word(record + offset, visibility_word),
            VisibilityLocation::Body { offset } if body != 0 => {
                self.write_word(body + offset, visibility_word)
            }
            VisibilityLocation::Body { .. } => {}
        }
        record
    }

    fn alloc_body(&mut self, state: MethodState) -> Address {
        let mut size = WORD;
        if let VisibilityLocation::Body { offset } = self.facts.method_record.visibility {
            size = size.max(offset + WORD);
        }
        if let UndefinedMarker::BodyType { offset, .. } = self.facts.undefined {
            size = size.max(offset + WORD);
        }
        let body = self.alloc(size);

        if let UndefinedMarker::BodyType { offset, mask, value } = self.facts.undefined {
            let defined_type = if value & mask == 1 { 2 } else { 1 };
            let body_type = match state {
                MethodState::Undefined => value,
                MethodState::Defined(_) => defined_type,
            };
            self.write_word(body + offset, body_type);
        }
        body
    }

    fn write_table(&mut self, table: &TableModel) -> Address {
        let keys: Vec<(u64, Address)> = table
            .entries
            .iter()
            .map(|&(serial, record)| (self.table_key(serial), record))
            .collect();

        match self.facts.method_table {
            MethodTableShape::StChained => {
                let num_bins = (keys.len() as u64 / 2).max(1).next_power_of_two();
                let header = self.alloc(3 * WORD);
                let bins = self.alloc(num_bins * WORD);
                self.write_word(header, num_bins);
                self.write_word(header + WORD, keys.len() as u64);
                self.write_word(header + 2 * WORD, bins);
                for (key, record) in keys {
                    let hash = mix(key);
                    let slot = bins + (hash % num_bins) * WORD;
                    let entry = self.alloc(4 * WORD);
                    self.write_word(entry, hash);
                    self.write_word(entry + WORD, key);
                    self.write_word(entry + 2 * WORD, record);
                    let head = self.read_word(slot);
                    self.write_word(entry + 3 * WORD, head);
                    self.write_word(slot, entry);
                }
                header
            }
            MethodTableShape::IdTable => {
                let capacity = (keys.len() as u64 * 2).max(4).next_power_of_two();
                let header = self.alloc(4 * WORD);
                let key_array = self.alloc(capacity * WORD);
                let value_array = self.alloc(capacity * WORD);
                self.write_word(header, capacity);
                self.write_word(header + WORD, keys.len() as u64);
                self.write_word(header + 2 * WORD, key_array);
                self.write_word(header + 3 * WORD, value_array);
                for (key, record) in keys {
                    let mut slot = mix(key) & (capacity - 1);
                    while self.read_word(key_array + slot * WORD) != 0 {
                        slot = (slot + 1) & (capacity - 1);
                    }
                    self.write_word(key_array + slot * WORD, key);
                    self.write_word(value_array + slot * WORD, record);
                }
                header
            }
            MethodTableShape::EntryList => {
                let header = self.alloc(2 * WORD);
                let list = self.alloc((keys.len() as u64 * 2).max(1) * WORD);
                self.write_word(header, keys.len() as u64);
                self.write_word(header + WORD, list);
                for (i, (key, record)) in keys.into_iter().enumerate() {
                    let slot = list + i as u64 * 2 * WORD;
                    self.write_word(slot, key);
                    self.write_word(slot + WORD, record);
                }
                header
            }
        }
    }

    fn write_symbol_table(&mut self) -> Address {
        let mut names: Vec<(u64, String)> =
            self.symbols.iter().map(|(name, serial)| (*serial, name.clone())).collect();
        names.sort_unstable();

        let count = self.next_serial;
        let table = self.alloc((count + 1) * WORD);
        self.write_word(table, count);
        for (serial, name) in names {
            let ptr = self.alloc_string(&name);
            self.write_word(table + (serial + 1) * WORD, ptr);
        }
        table
    }

    fn table_key(&self, serial: u64) -> u64 {
        if self.facts.method_table.keys_are_serials() {
            serial
        } else {
            self.facts.symbols.id_of(serial)
        }
    }

    fn intern(&mut self, name: &str) -> u64 {
        if let Some(serial) = self.symbols.get(name) {
            return *serial;
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        self.symbols.insert(name.to_string(), serial);
        serial
    }

    fn alloc_string(&mut self, s: &str) -> Address {
        let len = s.len() as u64;
        let addr = self.alloc(WORD + len);
        self.write_word(addr, len);
        let start = (addr + WORD - self.base) as usize;
        self.bytes[start..start + s.len()].copy_from_slice(s.as_bytes());
        addr
    }

    fn alloc(&mut self, size: u64) -> Address {
        let addr = self.base + self.bytes.len() as u64;
        let padded = (size.max(WORD) + WORD - 1) / WORD * WORD;
        self.bytes.resize(self.bytes.len() + padded as usize, 0);
        addr
    }

    fn offset_of(&self, addr: Address) -> usize {
        match addr.checked_sub(self.base) {
            Some(offset) if offset + WORD <= self.bytes.len() as u64 => offset as usize,
            _ => panic!("{:#x} is not an address of this image", addr),
        }
    }

    fn write_word(&mut self, addr: Address, value: u64) {
        let start = self.offset_of(addr);
        self.bytes[start..start + WORD as usize].copy_from_slice(&value.to_le_bytes());
    }

    fn read_word(&self, addr: Address) -> u64 {
        let start = self.offset_of(addr);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[start..start + WORD as usize]);
        u64::from_le_bytes(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodState {
    Defined(MethodVisibility),
    Undefined,
}

fn mix(key: u64) -> u64 {
    key.wrapping_mul(0x9e37_79b9_7f4a_7c15) >> 7
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{ClassField, ObjectKind, ObjectModel};
    use crate::memory::HostMemory;

    fn each_release(mut check: impl FnMut(ObjectModelFacts)) {
        for facts in ObjectModelFacts::builtin() {
            check(facts);
        }
    }

    #[test]
    fn test_core_classes_chain() {
        each_release(|facts| {
            let builder = ImageBuilder::new(facts.clone()).unwrap();
            let (object, module, class) =
                (builder.object_class(), builder.module_class(), builder.class_class());
            let image = builder.finish();
            let model = ObjectModel::new(&facts, &image.memory, &image.roots);

            assert_eq!(model.class_field(class, ClassField::Super).unwrap(), module);
            assert_eq!(model.class_field(module, ClassField::Super).unwrap(), object);
            assert_eq!(model.class_field(object, ClassField::Super).unwrap(), 0);
            let header = model.header(class).unwrap();
            assert_eq!(header.klass, class);
            assert_eq!(model.kind(&header), ObjectKind::Class);
        });
    }

    #[test]
    fn test_method_tables_decode_in_every_shape() {
        each_release(|facts| {
            let mut builder = ImageBuilder::new(facts.clone()).unwrap();
            let animal = builder.define_class("Animal", Some(builder.object_class()));
            for i in 0..20 {
                builder.define_method(animal, &format!("m{}", i), MethodVisibility::Public);
            }
            builder.define_allocator(animal);
            let image = builder.finish();
            let model = ObjectModel::new(&facts, &image.memory, &image.roots);

            let table = model.class_field(animal, ClassField::MethodTable).unwrap();
            let entries = model.method_entries(table).unwrap();
            assert_eq!(entries.len(), 21, "{}", facts.release);

            let mut names: Vec<String> = entries
                .iter()
                .filter(|e| e.serial != facts.symbols.allocator_serial)
                .map(|e| model.symbol_name(e.serial).unwrap())
                .collect();
            names.sort();
            let mut expected: Vec<String> = (0..20).map(|i| format!("m{}", i)).collect();
            expected.sort();
            assert_eq!(names, expected, "{}", facts.release);
        });
    }

    #[test]
    fn test_include_shares_module_table() {
        each_release(|facts| {
            let mut builder = ImageBuilder::new(facts.clone()).unwrap();
            let flying = builder.define_module("Flying");
            builder.define_method(flying, "fly", MethodVisibility::Public);
            let bird = builder.define_class("Bird", Some(builder.object_class()));
            let proxy = builder.include_module(bird, flying);
            let image = builder.finish();
            let model = ObjectModel::new(&facts, &image.memory, &image.roots);

            assert_eq!(model.class_field(bird, ClassField::Super).unwrap(), proxy);
            assert_eq!(model.header(proxy).unwrap().klass, flying);
            assert_eq!(
                model.class_field(proxy, ClassField::MethodTable).unwrap(),
                model.class_field(flying, ClassField::MethodTable).unwrap()
            );
        });
    }

    #[test]
    fn test_prepend_requires_origin_support() {
        let facts = ObjectModelFacts::for_host(&"ruby 1.9.3".parse().unwrap()).unwrap();
        let mut builder = ImageBuilder::new(facts).unwrap();
        let m = builder.define_module("M");
        let c = builder.define_class("C", None);
        assert!(builder.prepend_module(c, m).is_err());
    }

    #[test]
    fn test_prepend_moves_storage_to_origin() {
        let facts = ObjectModelFacts::for_host(&"ruby 2.0.0".parse().unwrap()).unwrap();
        let mut builder = ImageBuilder::new(facts.clone()).unwrap();
        let m = builder.define_module("M");
        let c = builder.define_class("C", Some(builder.object_class()));
        builder.define_method(c, "before", MethodVisibility::Public);
        let proxy = builder.prepend_module(c, m).unwrap();
        builder.define_method(c, "after", MethodVisibility::Public);
        let image = builder.finish();
        let model = ObjectModel::new(&facts, &image.memory, &image.roots);

        let origin = model.class_field(c, ClassField::Origin).unwrap();
        assert_eq!(model.class_field(c, ClassField::Super).unwrap(), proxy);
        assert_eq!(model.class_field(proxy, ClassField::Super).unwrap(), origin);
        assert_eq!(model.header(origin).unwrap().klass, c);

        let own = model.class_field(c, ClassField::MethodTable).unwrap();
        assert!(model.method_entries(own).unwrap().is_empty());
        let moved = model.class_field(origin, ClassField::MethodTable).unwrap();
        assert_eq!(model.method_entries(moved).unwrap().len(), 2);
    }

    #[test]
    fn test_singleton_class_is_reused() {
        each_release(|facts| {
            let mut builder = ImageBuilder::new(facts).unwrap();
            let obj = builder.new_object(builder.object_class());
            let first = builder.singleton_class(obj);
            let second = builder.singleton_class(obj);
            assert_eq!(first, second);
            let image = builder.finish();
            assert_eq!(image.memory.read_word(obj + WORD).unwrap(), first);
        });
    }

    #[test]
    fn test_remove_method_reports_presence() {
        let facts = ObjectModelFacts::builtin().remove(0);
        let mut builder = ImageBuilder::new(facts).unwrap();
        let c = builder.define_class("C", None);
        builder.define_method(c, "f", MethodVisibility::Public);
        assert!(builder.remove_method(c, "f"));
        assert!(!builder.remove_method(c, "f"));
    }

    #[test]
    #[should_panic(expected = "is not an address of this image")]
    fn test_foreign_object_address_panics() {
        let facts = ObjectModelFacts::builtin().remove(0);
        let mut builder = ImageBuilder::new(facts).unwrap();
        builder.singleton_class(DEFAULT_BASE + (1 << 20));
    }

    #[test]
    #[should_panic(expected = "is not a class or module of this image")]
    fn test_method_on_plain_object_panics() {
        let facts = ObjectModelFacts::builtin().remove(0);
        let mut builder = ImageBuilder::new(facts).unwrap();
        let obj = builder.new_object(builder.object_class());
        builder.define_method(obj, "f", MethodVisibility::Public);
    }
}
