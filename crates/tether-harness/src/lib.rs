//! Test harness for the sync state.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks structural properties of a
//! [`tether_state::StateSnapshot`], such as secondary indices agreeing with
//! the records they index. Use [`InvariantRegistry::standard()`] for the full set.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation. Operations are
//! applied to both the model and the real state, and their observable states
//! are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;

pub use invariants::{
    BufferIndexMatchesBuffers, Invariant, InvariantRegistry, InvariantResult,
    OrderIndexMatchesObjects, ParticipantsReferenceLiveBuffers, ReadyBuffersHaveNetwork,
    Violation,
};
pub use model::{
    ModelBufferKind, ModelState, ObservableBuffer, ObservableState, Operation, apply_operation,
};
