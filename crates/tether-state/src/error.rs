//! Error types for the sync state layer.
//!
//! Absence is not an error: lookups of unknown ids return `Ok(None)`,
//! removals of unknown ids are no-ops and duplicate puts merge. The one
//! failure mode is touching a [`crate::SyncState`] after it was torn down,
//! which is a bug in the caller rather than a runtime condition.

use thiserror::Error;

/// Errors returned by [`crate::SyncState`] and its collections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The state was torn down and can no longer be used.
    #[error("sync state used after teardown: {operation}")]
    TornDown {
        /// Operation that was attempted
        operation: &'static str,
    },
}

impl StateError {
    /// Returns true if this error reflects a broken caller contract.
    ///
    /// Contract violations are never retried; the caller holds a stale
    /// handle and must build a new state for the next session.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::TornDown { .. })
    }
}
