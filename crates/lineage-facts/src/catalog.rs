//! Built-in facts catalogue and host identity
//!
//! | release     | method table | visibility            | undefined        | singleton  |
//! |-------------|--------------|-----------------------|------------------|------------|
//! | mri-1.8     | chained hash | node flag (record)    | null body        | flag bit   |
//! | mri-1.9     | chained hash | node flag (body node) | null body        | flag bit   |
//! | mri-2.0     | chained hash | entry field           | body type        | flag bit   |
//! | mri-2.3     | chained hash | enumerated            | opaque           | flag bit   |
//! | mri-2.4     | id table     | enumerated            | opaque           | flag bit   |
//! | mri-3.2     | id table     | enumerated            | body type        | flag bit   |
//! | jruby       | entry list   | enumerated            | body type        | type tag   |
//! | rubinius    | entry list   | enumerated            | visibility value | back-ref   |

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{FactsError, FactsResult};
use crate::facts::{
    Capability, ClassLayout, EncodingStyle, ImmediateKind, ImmediateRule, MethodRecordLayout,
    MethodTableShape, ObjectModelFacts, ObjectTags, OriginLayout, SingletonMarker, SymbolLayout,
    UndefinedMarker, VisibilityEncoding, VisibilityLocation,
};

/// Host engine family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// The reference C implementation
    Mri,
    /// The JVM implementation
    #[serde(rename = "jruby")]
    JRuby,
    /// The C++ implementation
    Rubinius,
}

impl Engine {
    /// Canonical short name
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Mri => "mri",
            Engine::JRuby => "jruby",
            Engine::Rubinius => "rbx",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The running host's reported implementation and version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostIdentity {
    /// Engine family
    pub engine: Engine,
    /// Engine version
    pub version: Version,
}

impl HostIdentity {
    /// Create an identity from parts
    pub fn new(engine: Engine, major: u64, minor: u64, patch: u64) -> Self {
        Self {
            engine,
            version: Version::new(major, minor, patch),
        }
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.engine, self.version)
    }
}

impl FromStr for HostIdentity {
    type Err = FactsError;

    /// Parse `ruby 3.2.1`, `mri-2.0`, `jruby-9.4.0.0`, `rbx-3.107`, `ruby 2.7.8p225`
    fn from_str(s: &str) -> FactsResult<Self> {
        let malformed = || FactsError::MalformedIdentity(s.to_string());
        let trimmed = s.trim();
        let (name, rest) = trimmed
            .split_once(|c: char| c == '-' || c == ' ')
            .ok_or_else(malformed)?;

        let engine = match name.to_ascii_lowercase().as_str() {
            "ruby" | "mri" | "cruby" => Engine::Mri,
            "jruby" => Engine::JRuby,
            "rbx" | "rubinius" => Engine::Rubinius,
            _ => return Err(malformed()),
        };

        // Keep the leading dotted numeric run; drop patchlevel or build suffixes.
        let numeric: String = rest
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.').filter(|p| !p.is_empty());
        let mut next = || -> FactsResult<u64> {
            match parts.next() {
                Some(part) => part.parse().map_err(|_| malformed()),
                None => Ok(0),
            }
        };
        if numeric.is_empty() {
            return Err(malformed());
        }
        let (major, minor, patch) = (next()?, next()?, next()?);

        Ok(Self::new(engine, major, minor, patch))
    }
}

impl ObjectModelFacts {
    /// Select the built-in facts entry for a host
    pub fn for_host(host: &HostIdentity) -> FactsResult<Self> {
        let v = &host.version;
        let at_least = |major, minor| *v >= Version::new(major, minor, 0);

        let facts = match host.engine {
            Engine::Mri if at_least(3, 2) => mri_3_2(),
            Engine::Mri if at_least(2, 4) => mri_2_4(),
            Engine::Mri if at_least(2, 3) => mri_2_3(),
            Engine::Mri if at_least(2, 0) => mri_2_0(),
            Engine::Mri if at_least(1, 9) => mri_1_9(),
            Engine::Mri if at_least(1, 8) => mri_1_8(),
            Engine::JRuby if at_least(1, 6) => jruby(),
            Engine::Rubinius if at_least(2, 0) => rubinius(),
            _ => return Err(FactsError::UnsupportedHost(host.to_string())),
        };
        tracing::debug!(host = %host, release = %facts.release, "selected object-model facts");
        Ok(facts)
    }

    /// Every built-in entry
    pub fn builtin() -> Vec<Self> {
        vec![
            mri_1_8(),
            mri_1_9(),
            mri_2_0(),
            mri_2_3(),
            mri_2_4(),
            mri_3_2(),
            jruby(),
            rubinius(),
        ]
    }
}

const FL_SINGLETON: u64 = 1 << 12;
const FL_USHIFT: u32 = 12;

fn mri_tags() -> ObjectTags {
    ObjectTags {
        mask: 0x1f,
        object: 0x01,
        class: 0x02,
        module: 0x03,
        proxy: 0x1c,
        metaclass: None,
    }
}

fn noex(style: EncodingStyle) -> VisibilityEncoding {
    VisibilityEncoding {
        style,
        shift: 0,
        mask: 0x6,
        public: 0x0,
        protected: 0x4,
        private: 0x2,
        not_callable: None,
    }
}

fn method_visi() -> VisibilityEncoding {
    VisibilityEncoding {
        style: EncodingStyle::Enumerated,
        shift: FL_USHIFT,
        mask: 0x3,
        public: 0x1,
        protected: 0x3,
        private: 0x2,
        not_callable: Some(0x0),
    }
}

fn legacy_immediates() -> Vec<ImmediateRule> {
    vec![
        ImmediateRule { kind: ImmediateKind::Integer, mask: 0x1, pattern: 0x1 },
        ImmediateRule { kind: ImmediateKind::Symbol, mask: 0xff, pattern: 0x0e },
        ImmediateRule { kind: ImmediateKind::False, mask: u64::MAX, pattern: 0x0 },
        ImmediateRule { kind: ImmediateKind::True, mask: u64::MAX, pattern: 0x2 },
        ImmediateRule { kind: ImmediateKind::Nil, mask: u64::MAX, pattern: 0x4 },
    ]
}

fn flonum_immediates() -> Vec<ImmediateRule> {
    vec![
        ImmediateRule { kind: ImmediateKind::Integer, mask: 0x1, pattern: 0x1 },
        ImmediateRule { kind: ImmediateKind::Float, mask: 0x3, pattern: 0x2 },
        ImmediateRule { kind: ImmediateKind::Symbol, mask: 0xff, pattern: 0x0c },
        ImmediateRule { kind: ImmediateKind::False, mask: u64::MAX, pattern: 0x0 },
        ImmediateRule { kind: ImmediateKind::Nil, mask: u64::MAX, pattern: 0x08 },
        ImmediateRule { kind: ImmediateKind::True, mask: u64::MAX, pattern: 0x14 },
    ]
}

fn mri_1_8() -> ObjectModelFacts {
    ObjectModelFacts {
        release: "mri-1.8".to_string(),
        engine: Engine::Mri,
        tags: mri_tags(),
        class_layout: ClassLayout {
            super_offset: 32,
            method_table_offset: 24,
            name_offset: 40,
            attached_offset: 48,
            record_size: 56,
        },
        origin: Capability::Unsupported,
        method_table: MethodTableShape::StChained,
        method_record: MethodRecordLayout {
            body_offset: 16,
            visibility: VisibilityLocation::Record { offset: 32 },
            record_size: 40,
        },
        visibility: noex(EncodingStyle::NodeFlag),
        undefined: UndefinedMarker::NullBody,
        singleton: SingletonMarker::FlagBit { mask: FL_SINGLETON },
        symbols: SymbolLayout { serial_shift: 3, allocator_serial: 1 },
        immediates: legacy_immediates(),
    }
}

fn mri_1_9() -> ObjectModelFacts {
    ObjectModelFacts {
        release: "mri-1.9".to_string(),
        method_record: MethodRecordLayout {
            body_offset: 16,
            visibility: VisibilityLocation::Body { offset: 32 },
            record_size: 40,
        },
        ..mri_1_8()
    }
}

fn mri_2_0() -> ObjectModelFacts {
    ObjectModelFacts {
        release: "mri-2.0".to_string(),
        engine: Engine::Mri,
        tags: mri_tags(),
        class_layout: ClassLayout {
            super_offset: 16,
            method_table_offset: 32,
            name_offset: 40,
            attached_offset: 48,
            record_size: 64,
        },
        origin: Capability::Supported(OriginLayout { origin_offset: 56 }),
        method_table: MethodTableShape::StChained,
        method_record: MethodRecordLayout {
            body_offset: 16,
            visibility: VisibilityLocation::Record { offset: 0 },
            record_size: 40,
        },
        visibility: noex(EncodingStyle::EntryField),
        undefined: UndefinedMarker::BodyType { offset: 0, mask: 0xf, value: 0x5 },
        singleton: SingletonMarker::FlagBit { mask: FL_SINGLETON },
        symbols: SymbolLayout { serial_shift: 4, allocator_serial: 1 },
        immediates: flonum_immediates(),
    }
}

fn mri_2_3() -> ObjectModelFacts {
    ObjectModelFacts {
        release: "mri-2.3".to_string(),
        visibility: method_visi(),
        undefined: UndefinedMarker::Opaque,
        ..mri_2_0()
    }
}

fn mri_2_4() -> ObjectModelFacts {
    ObjectModelFacts {
        release: "mri-2.4".to_string(),
        method_table: MethodTableShape::IdTable,
        ..mri_2_3()
    }
}

fn mri_3_2() -> ObjectModelFacts {
    ObjectModelFacts {
        release: "mri-3.2".to_string(),
        class_layout: ClassLayout {
            super_offset: 16,
            method_table_offset: 24,
            name_offset: 48,
            attached_offset: 40,
            record_size: 64,
        },
        origin: Capability::Supported(OriginLayout { origin_offset: 32 }),
        undefined: UndefinedMarker::BodyType { offset: 0, mask: 0xf, value: 0x6 },
        ..mri_2_4()
    }
}

fn jruby() -> ObjectModelFacts {
    ObjectModelFacts {
        release: "jruby".to_string(),
        engine: Engine::JRuby,
        tags: ObjectTags {
            mask: 0xff,
            object: 0x10,
            class: 0x20,
            module: 0x21,
            proxy: 0x22,
            metaclass: Some(0x23),
        },
        class_layout: ClassLayout {
            super_offset: 16,
            method_table_offset: 24,
            name_offset: 32,
            attached_offset: 40,
            record_size: 48,
        },
        origin: Capability::Unsupported,
        method_table: MethodTableShape::EntryList,
        method_record: MethodRecordLayout {
            body_offset: 16,
            visibility: VisibilityLocation::Record { offset: 8 },
            record_size: 24,
        },
        visibility: VisibilityEncoding {
            style: EncodingStyle::Enumerated,
            shift: 0,
            mask: 0x7,
            public: 0x2,
            protected: 0x1,
            private: 0x0,
            not_callable: None,
        },
        undefined: UndefinedMarker::BodyType { offset: 0, mask: 0xff, value: 0x40 },
        singleton: SingletonMarker::TypeTag,
        symbols: SymbolLayout { serial_shift: 0, allocator_serial: 1 },
        immediates: Vec::new(),
    }
}

fn rubinius() -> ObjectModelFacts {
    ObjectModelFacts {
        release: "rubinius".to_string(),
        engine: Engine::Rubinius,
        tags: ObjectTags {
            mask: 0x3f,
            object: 0x01,
            class: 0x08,
            module: 0x09,
            proxy: 0x0a,
            metaclass: None,
        },
        class_layout: ClassLayout {
            super_offset: 40,
            method_table_offset: 16,
            name_offset: 24,
            attached_offset: 32,
            record_size: 48,
        },
        origin: Capability::Unsupported,
        method_table: MethodTableShape::EntryList,
        method_record: MethodRecordLayout {
            body_offset: 16,
            visibility: VisibilityLocation::Record { offset: 8 },
            record_size: 24,
        },
        visibility: VisibilityEncoding {
            style: EncodingStyle::Enumerated,
            shift: 0,
            mask: 0x7,
            public: 0x1,
            protected: 0x3,
            private: 0x2,
            not_callable: Some(0x4),
        },
        undefined: UndefinedMarker::VisibilityValue,
        singleton: SingletonMarker::AttachedNonNull,
        symbols: SymbolLayout { serial_shift: 2, allocator_serial: 1 },
        immediates: legacy_immediates(),
    }
}
