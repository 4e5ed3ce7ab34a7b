//! Object-model facts
//!
//! One [`ObjectModelFacts`] value describes how a single host release lays
//! out its classes, method tables, method entries and markers. The decoder
//! and the adapter are written once and parameterized over this value, so a
//! new host release needs a new facts entry, not new query code.
//!
//! ## Record layouts
//!
//! ```text
//! object header:  [flags][klass]
//! class record:   [flags][klass] ... super / m_tbl / name / attached / origin
//! string record:  [len][bytes, padded to 8]
//! symbol table:   [count][string ptr; count]     (indexed by serial)
//! ```

use serde::{Deserialize, Serialize};

use crate::catalog::Engine;
use crate::error::{FactsError, FactsResult};
use crate::memory::{Address, WORD};

/// Method visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodVisibility {
    /// Callable from anywhere
    Public,
    /// Callable from instances of the defining class and its descendants
    Protected,
    /// Callable only with an implicit receiver
    Private,
}

impl MethodVisibility {
    /// All visibilities, in display order
    pub const ALL: [MethodVisibility; 3] = [
        MethodVisibility::Public,
        MethodVisibility::Protected,
        MethodVisibility::Private,
    ];

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            MethodVisibility::Public => "public",
            MethodVisibility::Protected => "protected",
            MethodVisibility::Private => "private",
        }
    }
}

impl std::fmt::Display for MethodVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability a host release may or may not expose
///
/// `Unsupported` is an explicit marker, never the same as "present but empty".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Capability<T> {
    /// The host exposes the feature with this layout
    Supported(T),
    /// The host does not expose the feature
    Unsupported,
}

impl<T> Capability<T> {
    /// Check if the capability is present
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }

    /// Layout of a supported capability
    pub fn layout(&self) -> Option<&T> {
        match self {
            Capability::Supported(layout) => Some(layout),
            Capability::Unsupported => None,
        }
    }
}

/// Type tags stored in the low bits of the header flags word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTags {
    /// Mask selecting the tag bits
    pub mask: u64,
    /// Plain object
    pub object: u64,
    /// Class
    pub class: u64,
    /// Module
    pub module: u64,
    /// Included-module proxy
    pub proxy: u64,
    /// Singleton class, on hosts that give singletons their own tag
    #[serde(default)]
    pub metaclass: Option<u64>,
}

/// Field offsets of a class record, relative to the record start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLayout {
    /// Superclass link (0 at the top of the chain)
    pub super_offset: u64,
    /// Method table pointer
    pub method_table_offset: u64,
    /// Name string pointer (0 when anonymous)
    pub name_offset: u64,
    /// Singleton back-reference to the attached object (0 when none)
    pub attached_offset: u64,
    /// Total record size in bytes
    pub record_size: u64,
}

/// Where a class keeps its origin proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginLayout {
    /// Offset of the origin pointer inside the class record
    pub origin_offset: u64,
}

/// Associative storage backing a method table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodTableShape {
    /// Chained hash: `[num_bins][num_entries][bins]`, entry `[hash][key][record][next]`
    StChained,
    /// Open addressing: `[capacity][num][keys][values]`, empty slot key is 0
    IdTable,
    /// Insertion-ordered list: `[count][entries]`, entry `[key][record]`
    EntryList,
}

impl MethodTableShape {
    /// Check if table keys hold symbol serials rather than full IDs
    pub fn keys_are_serials(self) -> bool {
        matches!(self, MethodTableShape::IdTable)
    }
}

/// Symbol ID layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLayout {
    /// `serial = id >> serial_shift`
    pub serial_shift: u32,
    /// Serial of the reserved allocator slot in method tables
    pub allocator_serial: u64,
}

impl SymbolLayout {
    /// Serial of a full ID
    pub fn serial_of(&self, id: u64) -> u64 {
        id >> self.serial_shift
    }

    /// Full ID of a serial (scope bits clear)
    pub fn id_of(&self, serial: u64) -> u64 {
        serial << self.serial_shift
    }
}

/// Where the visibility bits of a method record live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "in", rename_all = "snake_case")]
pub enum VisibilityLocation {
    /// In the record itself
    Record {
        /// Offset of the visibility word
        offset: u64,
    },
    /// In the node the record's body pointer names
    Body {
        /// Offset of the visibility word inside the body node
        offset: u64,
    },
}

/// Field offsets of a method record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRecordLayout {
    /// Body / definition pointer
    pub body_offset: u64,
    /// Visibility word location
    pub visibility: VisibilityLocation,
    /// Total record size in bytes
    pub record_size: u64,
}

/// How visibility is represented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingStyle {
    /// Flag bits embedded in a syntax-tree node
    NodeFlag,
    /// Flag bits in a dedicated method-entry field
    EntryField,
    /// A distinct enumerated value
    Enumerated,
}

/// Result of decoding a visibility word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedVisibility {
    /// One of the three visibilities
    Visible(MethodVisibility),
    /// The codec's "not callable" value
    NotCallable,
    /// A value the codec does not know
    Unknown(u64),
}

/// Mapping between visibility kinds and host bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityEncoding {
    /// Representation style
    ///
    /// Descriptive only: decoding is driven by `shift`, `mask` and the values.
    pub style: EncodingStyle,
    /// Right shift applied before masking
    pub shift: u32,
    /// Mask applied after shifting
    pub mask: u64,
    /// Encoded public
    pub public: u64,
    /// Encoded protected
    pub protected: u64,
    /// Encoded private
    pub private: u64,
    /// Encoded "entry exists but is not callable", where the host has one
    #[serde(default)]
    pub not_callable: Option<u64>,
}

impl VisibilityEncoding {
    /// Decode the visibility bits of `word`
    pub fn decode(&self, word: u64) -> EncodedVisibility {
        let value = (word >> self.shift) & self.mask;
        if value == self.public {
            EncodedVisibility::Visible(MethodVisibility::Public)
        } else if value == self.protected {
            EncodedVisibility::Visible(MethodVisibility::Protected)
        } else if value == self.private {
            EncodedVisibility::Visible(MethodVisibility::Private)
        } else if Some(value) == self.not_callable {
            EncodedVisibility::NotCallable
        } else {
            EncodedVisibility::Unknown(value)
        }
    }

    /// Encoded value of a visibility, positioned in the word
    pub fn encode(&self, visibility: MethodVisibility) -> u64 {
        let value = match visibility {
            MethodVisibility::Public => self.public,
            MethodVisibility::Protected => self.protected,
            MethodVisibility::Private => self.private,
        };
        value << self.shift
    }

    /// Encoded "not callable" value, positioned in the word
    pub fn encode_not_callable(&self) -> Option<u64> {
        self.not_callable.map(|value| value << self.shift)
    }

    fn validate(&self) -> FactsResult<()> {
        let values = [
            ("public", self.public),
            ("protected", self.protected),
            ("private", self.private),
        ];
        let extra = self.not_callable.map(|v| ("not_callable", v));
        let all: Vec<(&'static str, u64)> = values.iter().copied().chain(extra).collect();

        for &(kind, value) in &all {
            if value & !self.mask != 0 {
                return Err(FactsError::ValueOutsideMask { kind, value, mask: self.mask });
            }
        }
        for (i, &(first, a)) in all.iter().enumerate() {
            for &(second, b) in &all[i + 1..] {
                if a == b {
                    return Err(FactsError::AmbiguousVisibility { first, second, value: a });
                }
            }
        }
        Ok(())
    }
}

/// How an explicitly undefined method is marked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndefinedMarker {
    /// The record's body pointer is null
    NullBody,
    /// The body node's type word equals `value`
    BodyType {
        /// Offset of the type word in the body node
        offset: u64,
        /// Mask applied to the type word
        mask: u64,
        /// Undefined-method type
        value: u64,
    },
    /// The visibility word holds the codec's not-callable value
    VisibilityValue,
    /// Not-callable entries are recognizable but cannot be attributed to undef
    Opaque,
}

impl UndefinedMarker {
    /// Check if undefined names can be reported exactly
    pub fn is_detectable(self) -> bool {
        !matches!(self, UndefinedMarker::Opaque)
    }
}

/// How a singleton class is recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SingletonMarker {
    /// A flag bit on a class-tagged header
    FlagBit {
        /// Flag mask
        mask: u64,
    },
    /// The header carries the metaclass tag
    TypeTag,
    /// The class record's attached back-reference is non-null
    AttachedNonNull,
}

/// Immediate (non-pointer) value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmediateKind {
    /// Tagged small integer
    Integer,
    /// Tagged float
    Float,
    /// Static symbol
    Symbol,
    /// nil
    Nil,
    /// true
    True,
    /// false
    False,
}

/// Recognizes one immediate kind: `word & mask == pattern`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmediateRule {
    /// Immediate kind
    pub kind: ImmediateKind,
    /// Bits tested
    pub mask: u64,
    /// Expected bits
    pub pattern: u64,
}

/// Everything the decoder needs to know about one host release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectModelFacts {
    /// Human-readable release label, e.g. `mri-2.4..3.1`
    pub release: String,
    /// Host engine
    pub engine: Engine,
    /// Header type tags
    pub tags: ObjectTags,
    /// Class record layout
    pub class_layout: ClassLayout,
    /// Origin proxies (class storage moved behind a prepended module)
    pub origin: Capability<OriginLayout>,
    /// Method table storage
    pub method_table: MethodTableShape,
    /// Method record layout
    pub method_record: MethodRecordLayout,
    /// Visibility codec
    pub visibility: VisibilityEncoding,
    /// Undefined-method marker
    pub undefined: UndefinedMarker,
    /// Singleton marker
    pub singleton: SingletonMarker,
    /// Symbol ID layout
    pub symbols: SymbolLayout,
    /// Immediate value rules, tested in order
    pub immediates: Vec<ImmediateRule>,
}

impl ObjectModelFacts {
    /// Load a facts entry from JSON and validate it
    pub fn from_json_str(json: &str) -> FactsResult<Self> {
        let facts: ObjectModelFacts = serde_json::from_str(json)?;
        facts.validate()?;
        Ok(facts)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> FactsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that the entry is self-consistent
    pub fn validate(&self) -> FactsResult<()> {
        self.visibility.validate()?;

        match self.undefined {
            UndefinedMarker::VisibilityValue | UndefinedMarker::Opaque
                if self.visibility.not_callable.is_none() =>
            {
                return Err(self.invalid("undefined marker needs a not-callable visibility value"));
            }
            UndefinedMarker::BodyType { offset, .. } if offset % WORD != 0 => {
                return Err(self.invalid("body type offset is not word aligned"));
            }
            _ => {}
        }

        if self.singleton == SingletonMarker::TypeTag && self.tags.metaclass.is_none() {
            return Err(self.invalid("type-tag singleton marker needs a metaclass tag"));
        }

        let tags = &self.tags;
        let mut tag_values = vec![tags.object, tags.class, tags.module, tags.proxy];
        tag_values.extend(tags.metaclass);
        for (i, a) in tag_values.iter().enumerate() {
            if a & !tags.mask != 0 {
                return Err(self.invalid(format!("type tag {:#x} outside mask {:#x}", a, tags.mask)));
            }
            if tag_values[i + 1..].contains(a) {
                return Err(self.invalid(format!("type tag {:#x} used twice", a)));
            }
        }

        let layout = &self.class_layout;
        let mut offsets = vec![
            layout.super_offset,
            layout.method_table_offset,
            layout.name_offset,
            layout.attached_offset,
        ];
        if let Some(origin) = self.origin.layout() {
            offsets.push(origin.origin_offset);
        }
        for (i, offset) in offsets.iter().enumerate() {
            if *offset < 2 * WORD || offset % WORD != 0 {
                return Err(self.invalid(format!("class field offset {} overlaps header or is unaligned", offset)));
            }
            if *offset + WORD > layout.record_size {
                return Err(self.invalid(format!("class field offset {} exceeds record size", offset)));
            }
            if offsets[i + 1..].contains(offset) {
                return Err(self.invalid(format!("class field offset {} used twice", offset)));
            }
        }

        let record = &self.method_record;
        let visibility_offset = match record.visibility {
            VisibilityLocation::Record { offset } | VisibilityLocation::Body { offset } => offset,
        };
        for offset in [record.body_offset, visibility_offset] {
            if offset % WORD != 0 || offset + WORD > record.record_size {
                return Err(self.invalid(format!("method record offset {} out of range", offset)));
            }
        }
        if let VisibilityLocation::Record { offset } = record.visibility {
            if offset == record.body_offset {
                return Err(self.invalid("visibility word overlaps body pointer"));
            }
        }

        if self.symbols.allocator_serial == 0 {
            return Err(self.invalid("allocator serial 0 collides with empty table slots"));
        }
        if self.symbols.serial_shift >= 32 {
            return Err(self.invalid("serial shift too large"));
        }

        Ok(())
    }

    /// Check if explicitly undefined methods can be reported exactly
    pub fn detects_undefined(&self) -> bool {
        self.undefined.is_detectable()
    }

    /// Origin pointer offset, when the host has origin proxies
    pub fn origin_offset(&self) -> Option<Address> {
        self.origin.layout().map(|origin| origin.origin_offset)
    }

    fn invalid(&self, reason: impl Into<String>) -> FactsError {
        FactsError::InvalidFacts {
            release: self.release.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> VisibilityEncoding {
        VisibilityEncoding {
            style: EncodingStyle::Enumerated,
            shift: 4,
            mask: 0x3,
            public: 1,
            protected: 3,
            private: 2,
            not_callable: Some(0),
        }
    }

    #[test]
    fn test_visibility_decode_round_trip() {
        let codec = codec();
        for visibility in MethodVisibility::ALL {
            let word = codec.encode(visibility) | 0xff00;
            assert_eq!(codec.decode(word), EncodedVisibility::Visible(visibility));
        }
        assert_eq!(codec.decode(0), EncodedVisibility::NotCallable);
    }

    #[test]
    fn test_visibility_decode_unknown_value() {
        let mut codec = codec();
        codec.not_callable = None;
        assert_eq!(codec.decode(0), EncodedVisibility::Unknown(0));
    }

    #[test]
    fn test_visibility_must_be_injective() {
        let mut codec = codec();
        codec.private = codec.protected;
        assert!(matches!(
            codec.validate(),
            Err(FactsError::AmbiguousVisibility { first: "protected", second: "private", .. })
        ));

        let mut codec = self::codec();
        codec.not_callable = Some(1);
        assert!(matches!(
            codec.validate(),
            Err(FactsError::AmbiguousVisibility { second: "not_callable", .. })
        ));
    }

    #[test]
    fn test_visibility_value_must_fit_mask() {
        let mut codec = codec();
        codec.private = 4;
        assert!(matches!(
            codec.validate(),
            Err(FactsError::ValueOutsideMask { kind: "private", value: 4, .. })
        ));
    }

    #[test]
    fn test_capability_accessors() {
        let origin = Capability::Supported(OriginLayout { origin_offset: 48 });
        assert!(origin.is_supported());
        assert_eq!(origin.layout().map(|o| o.origin_offset), Some(48));

        let absent: Capability<OriginLayout> = Capability::Unsupported;
        assert!(!absent.is_supported());
        assert!(absent.layout().is_none());
    }
}
