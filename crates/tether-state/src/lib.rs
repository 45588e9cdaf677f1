//! Live in-memory mirror of a chat core's state.
//!
//! A bridged chat core (one that keeps IRC connections alive on behalf of
//! clients) streams identities, networks, buffers and their participants to
//! the client. This crate holds the client-side copy of that state and fans
//! every change out to presentation components.
//!
//! # Components
//!
//! - [`SyncState`]: Session-scoped context owning the store and the bus
//! - [`ObjectRegistry`]: Storage of every live synced object, keyed by kind
//!   and id
//! - [`Identities`], [`Networks`], [`Buffers`], [`Participants`]: Typed
//!   collections with ordering, cascades and secondary indices
//! - [`BufferView`]: Buffer joined with its network plus kind-derived
//!   capabilities
//! - [`EventBus`]: Typed publish/subscribe of change notifications
//! - [`SessionSink`]: Seam through which the connection session applies
//!   decoded mutations
//! - [`color`]: Deterministic nick color selection
//!
//! # Ownership
//!
//! Every entity is owned by the store. Readers receive clones; an
//! [`EntityHandle`] re-resolves its id on every read, so it observes merges
//! and removals as they happen.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod buffer_view;
mod bus;
mod collection;
pub mod color;
mod entity;
mod error;
mod id;
mod index;
mod registry;
mod session;
mod state;

pub use buffer_view::{
    BufferCapabilities, BufferView, ParticipantPane, display_title, visible_topic,
};
pub use bus::{
    BusEvent, ClearScope, CollectionCleared, ConnectionStatusChanged, EntityPut, EntityRemoved,
    Event, EventBus, EventKind, SubscriptionId,
};
pub use collection::{Buffers, Identities, Networks, Participants};
pub use color::{DEFAULT_PALETTE, PALETTE_SIZE, Palette, color_index_for_nick, q_checksum};
pub use entity::{
    Buffer, BufferKind, Identity, Merge, Network, NetworkConnectionState, Participant,
};
pub use error::StateError;
pub use id::{BufferId, EntityKey, IdentityId, NetworkId, ObjectKey, ObjectKind};
pub use index::{JoinOutcome, LeaveOutcome, OrderIndex, ParticipantIndex, fold_nick};
pub use registry::{Entity, ObjectRegistry, PutOutcome, SyncObject};
pub use session::{ConnectionStatus, SessionEvent, SessionSink};
pub use state::{EntityHandle, StateConfig, StateSnapshot, SyncState};
