//! Lineage Object-Model Facts
//!
//! Read-only knowledge of how each supported host release encodes its
//! object model, plus the narrow boundary that decodes host memory with it:
//! - **Facts**: per-release layouts and encodings (`facts`, `catalog`)
//! - **Memory**: word and byte reads of host memory (`memory`)
//! - **Decoding**: headers, class records, method tables, symbols (`decode`)
//! - **Images**: authoring heap images in any release's layout (`image`)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod catalog;
pub mod decode;
pub mod error;
pub mod facts;
pub mod image;
pub mod memory;

pub use catalog::{Engine, HostIdentity};
pub use decode::{
    ClassField, Header, HostRoots, MethodRecord, ObjectKind, ObjectModel, RawMethodEntry,
    ValueWord,
};
pub use error::{FactsError, FactsResult, MemoryError, MemoryResult};
pub use facts::{
    Capability, ClassLayout, EncodedVisibility, EncodingStyle, ImmediateKind, ImmediateRule,
    MethodRecordLayout, MethodTableShape, MethodVisibility, ObjectModelFacts, ObjectTags,
    OriginLayout, SingletonMarker, SymbolLayout, UndefinedMarker, VisibilityEncoding,
    VisibilityLocation,
};
pub use image::{HostImage, ImageBuilder};
pub use memory::{Address, HeapImage, HostMemory, RawMemory, NULL_PAGE, WORD};
