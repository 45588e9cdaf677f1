//! Model-based testing.
//!
//! The same [`Operation`] sequence is applied to the naive [`ModelState`] and
//! to a real [`tether_state::SyncState`]; their [`ObservableState`]s must be
//! equal after every step.

mod operation;
mod world;

pub use operation::{
    ID_SPACE, ModelBufferKind, ModelId, NICKS, Operation, apply_operation, model_id, network_name,
    nick, topic,
};
pub use world::{ModelState, ObservableBuffer, ObservableState};
