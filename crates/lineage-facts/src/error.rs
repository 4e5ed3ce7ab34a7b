//! Facts and memory errors

use thiserror::Error;

use crate::memory::Address;

/// Errors in an object-model facts entry or in host selection
#[derive(Debug, Error)]
pub enum FactsError {
    /// Two visibility kinds share one encoded value
    #[error("Visibility encoding is not injective: {first} and {second} both encode as {value:#x}")]
    AmbiguousVisibility {
        /// First visibility sharing the value
        first: &'static str,
        /// Second visibility sharing the value
        second: &'static str,
        /// The shared encoded value
        value: u64,
    },

    /// An encoded value does not fit the codec mask
    #[error("Visibility value {value:#x} for {kind} does not fit mask {mask:#x}")]
    ValueOutsideMask {
        /// Which value is out of range
        kind: &'static str,
        /// The value
        value: u64,
        /// The codec mask
        mask: u64,
    },

    /// The facts entry is internally inconsistent
    #[error("Invalid facts for {release}: {reason}")]
    InvalidFacts {
        /// Release label of the offending entry
        release: String,
        /// What is wrong
        reason: String,
    },

    /// No catalogue entry matches the host
    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    /// A host identity string could not be parsed
    #[error("Malformed host identity: {0:?}")]
    MalformedIdentity(String),

    /// Facts JSON could not be deserialized
    #[error("Facts JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reading host memory
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The address range is not backed by the memory source
    #[error("Unmapped read of {len} bytes at {addr:#x}")]
    Unmapped {
        /// Start address
        addr: Address,
        /// Length of the read
        len: usize,
    },

    /// Word reads must be 8-byte aligned
    #[error("Misaligned word read at {0:#x}")]
    Misaligned(Address),

    /// A host string record is not valid UTF-8 or has an absurd length
    #[error("Bad string record at {addr:#x}: {reason}")]
    BadString {
        /// Record address
        addr: Address,
        /// What is wrong
        reason: String,
    },

    /// A host structure is malformed (cycle, absurd count, null where required)
    #[error("Corrupt host structure at {addr:#x}: {reason}")]
    Corrupt {
        /// Structure address
        addr: Address,
        /// What is wrong
        reason: String,
    },
}

/// Result alias for facts operations
pub type FactsResult<T> = Result<T, FactsError>;

/// Result alias for memory reads
pub type MemoryResult<T> = Result<T, MemoryError>;
