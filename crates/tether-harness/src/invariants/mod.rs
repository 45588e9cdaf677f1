//! Invariant checking for sync state.
//!
//! Invariants are properties that must hold after every change, whatever
//! sequence of session events produced it. They are checked against a
//! [`StateSnapshot`], which is taken under one read lock and so reflects a
//! state readers could actually observe.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = state.snapshot()?;
//! registry.check_all(&snapshot)?;
//! ```

mod checks;

pub use checks::{
    BufferIndexMatchesBuffers, OrderIndexMatchesObjects, ParticipantsReferenceLiveBuffers,
    ReadyBuffersHaveNetwork,
};
use tether_state::StateSnapshot;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a state snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    fn check(&self, state: &StateSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with every structural invariant of the store.
    ///
    /// Includes:
    /// - [`ReadyBuffersHaveNetwork`]: readiness agrees with network liveness
    /// - [`OrderIndexMatchesObjects`]: ordering indices hold exactly the
    ///   live ids
    /// - [`BufferIndexMatchesBuffers`]: buffer-by-network index matches
    ///   buffer records
    /// - [`ParticipantsReferenceLiveBuffers`]: presence only in live
    ///   buffers of the same network
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(ReadyBuffersHaveNetwork);
        registry.add(OrderIndexMatchesObjects);
        registry.add(BufferIndexMatchesBuffers);
        registry.add(ParticipantsReferenceLiveBuffers);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &StateSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
