//! Process binding
//!
//! Facts are chosen once per process, before the first query, and stay
//! fixed: `Unselected` moves to `Bound` exactly once, with no way back.

use lineage_facts::{HostIdentity, HostMemory, HostRoots, ObjectModelFacts};
use once_cell::sync::OnceCell;

use crate::adapter::Adapter;
use crate::error::{AdapterError, AdapterResult};

static PROCESS: Binding = Binding::new();

/// Binding lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// No facts chosen yet
    Unselected,
    /// Facts are fixed
    Bound,
}

/// A write-once slot for the facts a process runs against
#[derive(Debug, Default)]
pub struct Binding {
    facts: OnceCell<ObjectModelFacts>,
}

impl Binding {
    /// Create an unselected binding
    pub const fn new() -> Self {
        Self {
            facts: OnceCell::new(),
        }
    }

    /// The process-wide binding
    pub fn process() -> &'static Binding {
        &PROCESS
    }

    /// Current lifecycle state
    pub fn state(&self) -> BindingState {
        match self.facts.get() {
            Some(_) => BindingState::Bound,
            None => BindingState::Unselected,
        }
    }

    /// Fix the facts; fails if they are invalid or already fixed
    pub fn bind(&self, facts: ObjectModelFacts) -> AdapterResult<&ObjectModelFacts> {
        facts.validate()?;
        let release = facts.release.clone();
        let mut fresh = false;
        let bound = self.facts.get_or_init(|| {
            fresh = true;
            facts
        });
        if !fresh {
            return Err(AdapterError::AlreadyBound(bound.release.clone()));
        }
        tracing::debug!(release = %release, "bound object-model facts");
        Ok(bound)
    }

    /// Select the built-in facts for `host` and fix them
    pub fn bind_host(&self, host: &HostIdentity) -> AdapterResult<&ObjectModelFacts> {
        self.bind(ObjectModelFacts::for_host(host)?)
    }

    /// Bound facts, if any
    pub fn facts(&self) -> Option<&ObjectModelFacts> {
        self.facts.get()
    }

    /// Create an adapter over `memory` with the bound facts
    pub fn adapter<M: HostMemory>(&self, memory: M, roots: HostRoots) -> AdapterResult<Adapter<M>> {
        let facts = self.facts.get().ok_or(AdapterError::Unbound)?;
        Adapter::new(facts.clone(), memory, roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_facts::FactsError;

    #[test]
    fn test_bind_once() {
        let binding = Binding::new();
        assert_eq!(binding.state(), BindingState::Unselected);
        assert!(binding.facts().is_none());

        let host: HostIdentity = "ruby 3.1.0".parse().unwrap();
        let facts = binding.bind_host(&host).unwrap();
        assert_eq!(facts.release, "mri-2.4");
        assert_eq!(binding.state(), BindingState::Bound);

        let other: HostIdentity = "ruby 1.8.7".parse().unwrap();
        match binding.bind_host(&other) {
            Err(AdapterError::AlreadyBound(release)) => assert_eq!(release, "mri-2.4"),
            other => panic!("expected AlreadyBound, got {:?}", other),
        }
        assert_eq!(binding.facts().unwrap().release, "mri-2.4");
    }

    #[test]
    fn test_unsupported_host_stays_unselected() {
        let binding = Binding::new();
        let host: HostIdentity = "ruby 1.6.8".parse().unwrap();
        assert!(matches!(
            binding.bind_host(&host),
            Err(AdapterError::Facts(FactsError::UnsupportedHost(_)))
        ));
        assert_eq!(binding.state(), BindingState::Unselected);
    }

    #[test]
    fn test_invalid_facts_rejected() {
        let binding = Binding::new();
        let mut facts = ObjectModelFacts::builtin().remove(0);
        facts.visibility.protected = facts.visibility.public;
        assert!(matches!(
            binding.bind(facts),
            Err(AdapterError::Facts(FactsError::AmbiguousVisibility { .. }))
        ));
        assert_eq!(binding.state(), BindingState::Unselected);
    }

    #[test]
    fn test_adapter_requires_binding() {
        let binding = Binding::new();
        let memory = lineage_facts::HeapImage::new(0x1000, vec![0; 16]);
        assert!(matches!(
            binding.adapter(memory, HostRoots::default()),
            Err(AdapterError::Unbound)
        ));
    }
}
