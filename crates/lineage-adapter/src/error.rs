//! Adapter errors

use lineage_facts::{FactsError, MemoryError};
use thiserror::Error;

/// Errors raised by adapter queries and adapter construction
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The input is not the kind of handle the query needs
    #[error("Invalid handle {handle:#x}: {reason}")]
    InvalidHandle {
        /// Raw handle word
        handle: u64,
        /// Why it was rejected
        reason: String,
    },

    /// A singleton-only query was given an ordinary class
    #[error("Not a singleton class: {handle:#x}")]
    NotSingleton {
        /// Raw handle word
        handle: u64,
    },

    /// Host metadata contradicts the facts the adapter was built with
    ///
    /// Signals a stale facts entry or a host/adapter mismatch; not recoverable.
    #[error("[lineage bug] internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// The facts entry is invalid or no entry matches the host
    #[error("Facts error: {0}")]
    Facts(#[from] FactsError),

    /// The process binding is already fixed
    #[error("Adapter already bound to {0}")]
    AlreadyBound(String),

    /// No facts have been bound yet
    #[error("No object-model facts bound")]
    Unbound,
}

impl AdapterError {
    pub(crate) fn invalid_handle(handle: u64, reason: impl Into<String>) -> Self {
        AdapterError::InvalidHandle {
            handle,
            reason: reason.into(),
        }
    }

    pub(crate) fn unreadable_handle(handle: u64, err: MemoryError) -> Self {
        AdapterError::InvalidHandle {
            handle,
            reason: err.to_string(),
        }
    }

    pub(crate) fn inconsistent(context: impl std::fmt::Display, err: MemoryError) -> Self {
        AdapterError::InternalInconsistency(format!("{}: {}", context, err))
    }

    /// Check if the error signals a facts/host mismatch rather than a caller mistake
    pub fn is_fatal(&self) -> bool {
        matches!(self, AdapterError::InternalInconsistency(_))
    }
}

/// Result alias for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;
