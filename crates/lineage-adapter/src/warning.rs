//! One-time capability warnings
//!
//! A degraded query warns the first time it runs in a process and never
//! again. The latch starts unset and has a single transition to set; racing
//! first callers block on the latch, so exactly one of them emits.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Once, OnceState};

/// Process-wide latch for "undefined methods cannot be detected"
pub static UNDEFINED_METHODS_WARNING: CapabilityWarning = CapabilityWarning::new(
    "undefined_methods",
    "undefined methods cannot be detected on this host; results are always empty",
);

/// A warning emitted at most once per latch
#[derive(Debug)]
pub struct CapabilityWarning {
    capability: &'static str,
    message: &'static str,
    once: Once,
    emitted: AtomicUsize,
}

impl CapabilityWarning {
    /// Create an unset latch
    pub const fn new(capability: &'static str, message: &'static str) -> Self {
        Self {
            capability,
            message,
            once: Once::new(),
            emitted: AtomicUsize::new(0),
        }
    }

    /// Emit the warning unless it already has been; returns whether this call emitted
    pub fn warn_once(&self, host: &str) -> bool {
        let mut emitted_now = false;
        self.once.call_once(|| {
            tracing::warn!(
                capability = self.capability,
                host = %host,
                "{}",
                self.message
            );
            self.emitted.fetch_add(1, Ordering::SeqCst);
            emitted_now = true;
        });
        emitted_now
    }

    /// Check if the latch is set
    pub fn has_fired(&self) -> bool {
        self.once.state() == OnceState::Done
    }

    /// Number of times the warning was emitted (0 or 1)
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    /// Capability the latch guards
    pub fn capability(&self) -> &'static str {
        self.capability
    }
}
