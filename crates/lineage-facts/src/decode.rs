//! Struct-layout decoding
//!
//! [`ObjectModel`] is the only place raw host words are interpreted as
//! headers, class records, method tables, symbols and strings. It reports
//! what the bytes say and nothing more; deciding what a decoded record
//! *means* (visibility, undefined, singleton) is left to the adapter.

use rustc_hash::FxHashMap;

use crate::error::{MemoryError, MemoryResult};
use crate::facts::{
    ImmediateKind, MethodTableShape, ObjectModelFacts, UndefinedMarker, VisibilityLocation,
};
use crate::memory::{Address, HostMemory, WORD};

/// Upper bound on any host-reported element count
const MAX_ELEMENTS: u64 = 1 << 24;

/// Upper bound on a host string length
const MAX_STRING: u64 = 1 << 20;

/// `base + delta`; a host pointer that would wrap the address space is corrupt
fn displace(base: Address, delta: u64) -> MemoryResult<Address> {
    base.checked_add(delta).ok_or_else(|| MemoryError::Corrupt {
        addr: base,
        reason: format!("offset {:#x} wraps the address space", delta),
    })
}

/// Address of element `index` in an array of `stride`-byte elements at `base`
fn element(base: Address, index: u64, stride: u64) -> MemoryResult<Address> {
    let delta = index.checked_mul(stride).ok_or_else(|| MemoryError::Corrupt {
        addr: base,
        reason: format!("element {} wraps the address space", index),
    })?;
    displace(base, delta)
}

/// Host-global addresses the decoder needs besides the handles themselves
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRoots {
    /// Symbol table `[count][string ptr; count]`
    pub symbol_table: Address,
    /// Class of each immediate kind
    pub immediate_classes: FxHashMap<ImmediateKind, Address>,
}

/// Object header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Flags word (type tag in the low bits)
    pub flags: u64,
    /// Class pointer
    pub klass: Address,
}

/// Kind of a heap object, from its type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Plain object
    Object,
    /// Class
    Class,
    /// Module
    Module,
    /// Included-module proxy
    Proxy,
    /// Singleton class on hosts with a distinct metaclass tag
    Metaclass,
    /// Any other tag
    Other(u64),
}

impl ObjectKind {
    /// Check if the object can sit in an ancestry chain
    pub fn is_class_like(self) -> bool {
        matches!(
            self,
            ObjectKind::Class | ObjectKind::Module | ObjectKind::Proxy | ObjectKind::Metaclass
        )
    }
}

/// A host value word, split into immediates and heap references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueWord {
    /// Non-pointer value
    Immediate(ImmediateKind),
    /// Pointer to a heap object
    Heap(Address),
}

/// Class record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassField {
    /// Superclass link
    Super,
    /// Method table pointer
    MethodTable,
    /// Name string pointer
    Name,
    /// Singleton back-reference
    Attached,
    /// Origin proxy pointer
    Origin,
}

/// One raw method table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMethodEntry {
    /// Symbol serial of the method name
    pub serial: u64,
    /// Method record address
    pub record: Address,
}

/// Words read from a method record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRecord {
    /// Body / definition pointer (0 when absent)
    pub body: Address,
    /// Visibility word, unless it lives behind a null body
    pub visibility_word: Option<u64>,
    /// Body type word, when the facts mark undefined methods by body type
    pub body_type: Option<u64>,
}

/// Layout-aware reader over host memory
pub struct ObjectModel<'a, M: HostMemory> {
    facts: &'a ObjectModelFacts,
    memory: &'a M,
    roots: &'a HostRoots,
}

impl<'a, M: HostMemory> ObjectModel<'a, M> {
    /// Create a reader
    pub fn new(facts: &'a ObjectModelFacts, memory: &'a M, roots: &'a HostRoots) -> Self {
        Self { facts, memory, roots }
    }

    /// Facts this reader decodes with
    pub fn facts(&self) -> &'a ObjectModelFacts {
        self.facts
    }

    /// Split a value word into immediate or heap reference
    pub fn classify_word(&self, word: u64) -> ValueWord {
        self.facts
            .immediates
            .iter()
            .find(|rule| word & rule.mask == rule.pattern)
            .map(|rule| ValueWord::Immediate(rule.kind))
            .unwrap_or(ValueWord::Heap(word))
    }

    /// Class registered for an immediate kind
    pub fn immediate_class(&self, kind: ImmediateKind) -> Option<Address> {
        self.roots.immediate_classes.get(&kind).copied()
    }

    /// Read an object header
    pub fn header(&self, addr: Address) -> MemoryResult<Header> {
        Ok(Header {
            flags: self.memory.read_word(addr)?,
            klass: self.memory.read_word(displace(addr, WORD)?)?,
        })
    }

    /// Kind of the object a header belongs to
    pub fn kind(&self, header: &Header) -> ObjectKind {
        let tags = &self.facts.tags;
        let tag = header.flags & tags.mask;
        if tag == tags.object {
            ObjectKind::Object
        } else if tag == tags.class {
            ObjectKind::Class
        } else if tag == tags.module {
            ObjectKind::Module
        } else if tag == tags.proxy {
            ObjectKind::Proxy
        } else if Some(tag) == tags.metaclass {
            ObjectKind::Metaclass
        } else {
            ObjectKind::Other(tag)
        }
    }

    /// Read a class record field; `Origin` reads 0 on hosts without origins
    pub fn class_field(&self, class: Address, field: ClassField) -> MemoryResult<u64> {
        let layout = &self.facts.class_layout;
        let offset = match field {
            ClassField::Super => layout.super_offset,
            ClassField::MethodTable => layout.method_table_offset,
            ClassField::Name => layout.name_offset,
            ClassField::Attached => layout.attached_offset,
            ClassField::Origin => match self.facts.origin_offset() {
                Some(offset) => offset,
                None => return Ok(0),
            },
        };
        self.memory.read_word(displace(class, offset)?)
    }

    /// Read a `[len][bytes]` string record
    pub fn string(&self, addr: Address) -> MemoryResult<String> {
        let len = self.memory.read_word(addr)?;
        if len > MAX_STRING {
            return Err(MemoryError::BadString {
                addr,
                reason: format!("length {} too large", len),
            });
        }
        let bytes = self.memory.read_bytes(displace(addr, WORD)?, len as usize)?;
        String::from_utf8(bytes).map_err(|e| MemoryError::BadString {
            addr,
            reason: e.to_string(),
        })
    }

    /// Name of a symbol serial
    pub fn symbol_name(&self, serial: u64) -> MemoryResult<String> {
        let table = self.roots.symbol_table;
        let count = self.count(table, self.memory.read_word(table)?)?;
        if serial >= count {
            return Err(MemoryError::Corrupt {
                addr: table,
                reason: format!("symbol serial {} beyond table of {}", serial, count),
            });
        }
        let ptr = self.memory.read_word(element(table, 1 + serial, WORD)?)?;
        if ptr == 0 {
            return Err(MemoryError::Corrupt {
                addr: table,
                reason: format!("symbol serial {} has no name", serial),
            });
        }
        self.string(ptr)
    }

    /// Every slot of a method table, in the storage's native order
    ///
    /// A null table pointer is an empty table.
    pub fn method_entries(&self, table: Address) -> MemoryResult<Vec<RawMethodEntry>> {
        if table == 0 {
            return Ok(Vec::new());
        }
        let entries = match self.facts.method_table {
            MethodTableShape::StChained => self.st_entries(table)?,
            MethodTableShape::IdTable => self.id_table_entries(table)?,
            MethodTableShape::EntryList => self.list_entries(table)?,
        };
        tracing::trace!(table, count = entries.len(), "decoded method table");
        Ok(entries)
    }

    /// Read the words of a method record the facts care about
    pub fn method_record(&self, record: Address) -> MemoryResult<MethodRecord> {
        let layout = &self.facts.method_record;
        let body = self.memory.read_word(displace(record, layout.body_offset)?)?;

        let visibility_word = match layout.visibility {
            VisibilityLocation::Record { offset } => {
                Some(self.memory.read_word(displace(record, offset)?)?)
            }
            VisibilityLocation::Body { .. } if body == 0 => None,
            VisibilityLocation::Body { offset } => Some(self.memory.read_word(displace(body, offset)?)?),
        };

        let body_type = match self.facts.undefined {
            UndefinedMarker::BodyType { offset, .. } if body != 0 => {
                Some(self.memory.read_word(displace(body, offset)?)?)
            }
            _ => None,
        };

        Ok(MethodRecord {
            body,
            visibility_word,
            body_type,
        })
    }

    fn count(&self, addr: Address, n: u64) -> MemoryResult<u64> {
        if n > MAX_ELEMENTS {
            return Err(MemoryError::Corrupt {
                addr,
                reason: format!("element count {} too large", n),
            });
        }
        Ok(n)
    }

    fn serial_of_key(&self, key: u64) -> u64 {
        if self.facts.method_table.keys_are_serials() {
            key
        } else {
            self.facts.symbols.serial_of(key)
        }
    }

    // [num_bins][num_entries][bins] -> bins[i] -> [hash][key][record][next]
    fn st_entries(&self, table: Address) -> MemoryResult<Vec<RawMethodEntry>> {
        let num_bins = self.count(table, self.memory.read_word(table)?)?;
        let num_entries = self.count(table, self.memory.read_word(element(table, 1, WORD)?)?)?;
        let bins = self.memory.read_word(element(table, 2, WORD)?)?;

        let mut entries = Vec::with_capacity(num_entries as usize);
        for bin in 0..num_bins {
            let mut entry = self.memory.read_word(element(bins, bin, WORD)?)?;
            while entry != 0 {
                if entries.len() as u64 >= num_entries {
                    return Err(MemoryError::Corrupt {
                        addr: table,
                        reason: "chain longer than entry count (cycle?)".to_string(),
                    });
                }
                let key = self.memory.read_word(element(entry, 1, WORD)?)?;
                let record = self.memory.read_word(element(entry, 2, WORD)?)?;
                entries.push(RawMethodEntry {
                    serial: self.serial_of_key(key),
                    record,
                });
                entry = self.memory.read_word(element(entry, 3, WORD)?)?;
            }
        }
        Ok(entries)
    }

    // [capacity][num][keys][values]; key 0 is an open slot
    fn id_table_entries(&self, table: Address) -> MemoryResult<Vec<RawMethodEntry>> {
        let capacity = self.count(table, self.memory.read_word(table)?)?;
        let num = self.memory.read_word(element(table, 1, WORD)?)?;
        let keys = self.memory.read_word(element(table, 2, WORD)?)?;
        let values = self.memory.read_word(element(table, 3, WORD)?)?;

        let mut entries = Vec::with_capacity(num.min(capacity) as usize);
        for slot in 0..capacity {
            let key = self.memory.read_word(element(keys, slot, WORD)?)?;
            if key == 0 {
                continue;
            }
            entries.push(RawMethodEntry {
                serial: self.serial_of_key(key),
                record: self.memory.read_word(element(values, slot, WORD)?)?,
            });
        }
        if entries.len() as u64 != num {
            return Err(MemoryError::Corrupt {
                addr: table,
                reason: format!("id table holds {} keys, header says {}", entries.len(), num),
            });
        }
        Ok(entries)
    }

    // [count][entries] -> [key][record] * count
    fn list_entries(&self, table: Address) -> MemoryResult<Vec<RawMethodEntry>> {
        let count = self.count(table, self.memory.read_word(table)?)?;
        let list = self.memory.read_word(element(table, 1, WORD)?)?;

        (0..count)
            .map(|i| {
                let slot = element(list, i, 2 * WORD)?;
                Ok(RawMethodEntry {
                    serial: self.serial_of_key(self.memory.read_word(slot)?),
                    record: self.memory.read_word(displace(slot, WORD)?)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapImage;

    fn words_image(base: Address, words: &[u64]) -> HeapImage {
        let bytes = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        HeapImage::new(base, bytes)
    }

    fn facts(release: &str) -> ObjectModelFacts {
        ObjectModelFacts::builtin()
            .into_iter()
            .find(|f| f.release == release)
            .unwrap()
    }

    #[test]
    fn test_null_table_is_empty() {
        let facts = facts("mri-3.2");
        let image = words_image(0x1000, &[0]);
        let roots = HostRoots::default();
        let model = ObjectModel::new(&facts, &image, &roots);
        assert!(model.method_entries(0).unwrap().is_empty());
    }

    #[test]
    fn test_st_chain_cycle_is_corrupt() {
        let facts = facts("mri-1.8");
        // table @0x1000: 1 bin, 1 entry, bins @0x1018
        // bins[0] @0x1018 -> entry @0x1020, whose next points at itself
        let image = words_image(
            0x1000,
            &[1, 1, 0x1018, 0x1020, 0, 8 << 3, 0x2000, 0x1020],
        );
        let roots = HostRoots::default();
        let model = ObjectModel::new(&facts, &image, &roots);
        assert!(matches!(
            model.method_entries(0x1000),
            Err(MemoryError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_id_table_count_mismatch_is_corrupt() {
        let facts = facts("mri-2.4");
        // capacity 2, num 2, keys @0x1020, values @0x1030, only one key set
        let image = words_image(0x1000, &[2, 2, 0x1020, 0x1030, 5, 0, 0x2000, 0]);
        let roots = HostRoots::default();
        let model = ObjectModel::new(&facts, &image, &roots);
        assert!(matches!(
            model.method_entries(0x1000),
            Err(MemoryError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_entry_list_serials() {
        let facts = facts("rubinius");
        let shift = facts.symbols.serial_shift;
        let image = words_image(0x1000, &[2, 0x1010, 3 << shift, 0xa0, 7 << shift, 0xb0]);
        let roots = HostRoots::default();
        let model = ObjectModel::new(&facts, &image, &roots);
        assert_eq!(
            model.method_entries(0x1000).unwrap(),
            vec![
                RawMethodEntry { serial: 3, record: 0xa0 },
                RawMethodEntry { serial: 7, record: 0xb0 },
            ]
        );
    }

    #[test]
    fn test_wrapping_pointers_are_corrupt() {
        let facts = facts("jruby");
        let image = words_image(0x1000, &[0; 4]);
        let roots = HostRoots::default();
        let model = ObjectModel::new(&facts, &image, &roots);

        assert!(matches!(
            model.method_record(u64::MAX - 7),
            Err(MemoryError::Corrupt { .. })
        ));
        assert!(matches!(
            model.class_field(u64::MAX - 7, ClassField::Super),
            Err(MemoryError::Corrupt { .. })
        ));
        assert!(model.header(u64::MAX - 7).is_err());
    }

    #[test]
    fn test_string_and_symbol_reads() {
        let facts = facts("mri-3.2");
        // symbol table @0x1000: count 2, [0, ptr]; string @0x1018: len 5 "speak"
        let mut words = vec![2, 0, 0x1018, 5];
        let mut name = [0u8; 8];
        name[..5].copy_from_slice(b"speak");
        words.push(u64::from_le_bytes(name));
        let image = words_image(0x1000, &words);
        let roots = HostRoots {
            symbol_table: 0x1000,
            ..HostRoots::default()
        };
        let model = ObjectModel::new(&facts, &image, &roots);

        assert_eq!(model.symbol_name(1).unwrap(), "speak");
        assert!(model.symbol_name(0).is_err());
        assert!(model.symbol_name(9).is_err());
    }

    #[test]
    fn test_classify_word() {
        let facts = facts("mri-2.0");
        let image = words_image(0x1000, &[]);
        let roots = HostRoots::default();
        let model = ObjectModel::new(&facts, &image, &roots);

        assert_eq!(model.classify_word(0x55), ValueWord::Immediate(ImmediateKind::Integer));
        assert_eq!(model.classify_word(0x08), ValueWord::Immediate(ImmediateKind::Nil));
        assert_eq!(model.classify_word(0x14), ValueWord::Immediate(ImmediateKind::True));
        assert_eq!(model.classify_word(0x00), ValueWord::Immediate(ImmediateKind::False));
        assert_eq!(model.classify_word(0x1c0c), ValueWord::Immediate(ImmediateKind::Symbol));
        assert_eq!(model.classify_word(0x1000), ValueWord::Heap(0x1000));
    }
}
