//! Operations for model-based testing.
//!
//! Operations are the session events the core can deliver, in a compact form.
//! They are generated randomly (by proptest or a fuzzer through
//! `arbitrary`) and applied to both the model and a real [`SyncState`].
//!
//! Ids and nicks are drawn from small spaces so random sequences collide
//! often: re-syncs, orphans, cascades and case-folded nick clashes all show
//! up within a few dozen operations.

use arbitrary::Arbitrary;
use tether_state::{
    Buffer, BufferId, BufferKind, ConnectionStatus, Identity, IdentityId, Network, NetworkId,
    StateError, SyncState,
};

/// Model object id, reduced into [`ID_SPACE`].
pub type ModelId = u8;

/// Distinct ids per kind.
pub const ID_SPACE: u8 = 4;

/// Nicks operations pick from. Two fold to the same key.
pub const NICKS: [&str; 5] = ["alice", "Alice", "bob", "carol", "dave_"];

/// Buffer kinds operations pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelBufferKind {
    /// Server status buffer.
    Status,
    /// Channel.
    Channel,
    /// Private conversation.
    Query,
}

impl From<ModelBufferKind> for BufferKind {
    fn from(kind: ModelBufferKind) -> Self {
        match kind {
            ModelBufferKind::Status => Self::Status,
            ModelBufferKind::Channel => Self::Channel,
            ModelBufferKind::Query => Self::Query,
        }
    }
}

/// Operations that can be applied to the state.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Identity synced.
    PutIdentity {
        /// Identity id.
        id: ModelId,
    },

    /// Identity removed.
    RemoveIdentity {
        /// Identity id.
        id: ModelId,
    },

    /// Network synced.
    PutNetwork {
        /// Network id.
        id: ModelId,
        /// Selects the network name.
        name: u8,
    },

    /// Network removed, cascading to its buffers.
    RemoveNetwork {
        /// Network id.
        id: ModelId,
    },

    /// Buffer synced, possibly before its network.
    PutBuffer {
        /// Buffer id.
        id: ModelId,
        /// Owning network id.
        network_id: ModelId,
        /// Kind on first sync. Later syncs cannot change it.
        kind: ModelBufferKind,
    },

    /// Buffer removed.
    RemoveBuffer {
        /// Buffer id.
        id: ModelId,
    },

    /// Buffer topic changed.
    SetTopic {
        /// Buffer id.
        buffer_id: ModelId,
        /// Selects the topic; `None` clears it.
        topic: Option<u8>,
    },

    /// Message arrived in a buffer.
    Activity {
        /// Buffer id.
        buffer_id: ModelId,
        /// Message timestamp.
        timestamp: u16,
        /// Whether it highlights us.
        highlight: bool,
    },

    /// Buffer read.
    MarkRead {
        /// Buffer id.
        buffer_id: ModelId,
    },

    /// Participant joined a buffer.
    Join {
        /// Network id.
        network_id: ModelId,
        /// Index into [`NICKS`].
        nick: u8,
        /// Buffer id.
        buffer_id: ModelId,
    },

    /// Participant left a buffer.
    Leave {
        /// Network id.
        network_id: ModelId,
        /// Index into [`NICKS`].
        nick: u8,
        /// Buffer id.
        buffer_id: ModelId,
    },

    /// Participant changed nick.
    Rename {
        /// Network id.
        network_id: ModelId,
        /// Index into [`NICKS`] of the current nick.
        old: u8,
        /// Index into [`NICKS`] of the new nick.
        new: u8,
    },

    /// Every collection cleared.
    Clear,

    /// Buffer collection cleared.
    ClearBuffers,

    /// Session connected.
    Connect,

    /// Session dropped.
    Disconnect,
}

/// Reduce an arbitrary id into the model id space.
pub fn model_id(id: ModelId) -> u32 {
    u32::from(id % ID_SPACE)
}

/// Nick selected by an arbitrary index.
pub fn nick(index: u8) -> &'static str {
    NICKS[usize::from(index) % NICKS.len()]
}

/// Network name selected by an arbitrary value.
pub fn network_name(name: u8) -> String {
    format!("net{}", name % 3)
}

/// Topic selected by an arbitrary value.
pub fn topic(topic: Option<u8>) -> Option<String> {
    topic.map(|t| format!("topic {}", t % 3))
}

/// Apply an operation to a real state.
///
/// Outcomes such as "unknown buffer" are part of normal operation and are
/// not reported; only use after teardown fails.
pub fn apply_operation(state: &SyncState, op: &Operation) -> Result<(), StateError> {
    tracing::trace!(?op, "Applying operation");
    match *op {
        Operation::PutIdentity { id } => {
            let id = IdentityId(model_id(id));
            state.identities().put(Identity::new(id, format!("identity {id}"))).map(drop)
        },
        Operation::RemoveIdentity { id } => {
            state.identities().remove(IdentityId(model_id(id))).map(drop)
        },
        Operation::PutNetwork { id, name } => {
            state.networks().put(Network::new(NetworkId(model_id(id)), network_name(name))).map(drop)
        },
        Operation::RemoveNetwork { id } => state.networks().remove(NetworkId(model_id(id))).map(drop),
        Operation::PutBuffer { id, network_id, kind } => {
            let id = model_id(id);
            let buffer = Buffer::new(
                BufferId(id),
                NetworkId(model_id(network_id)),
                kind.into(),
                format!("#b{id}"),
            );
            state.buffers().put(buffer).map(drop)
        },
        Operation::RemoveBuffer { id } => state.buffers().remove(BufferId(model_id(id))).map(drop),
        Operation::SetTopic { buffer_id, topic: t } => {
            state.buffers().set_topic(BufferId(model_id(buffer_id)), topic(t)).map(drop)
        },
        Operation::Activity { buffer_id, timestamp, highlight } => state
            .buffers()
            .record_activity(BufferId(model_id(buffer_id)), u64::from(timestamp), highlight)
            .map(drop),
        Operation::MarkRead { buffer_id } => {
            state.buffers().mark_read(BufferId(model_id(buffer_id))).map(drop)
        },
        Operation::Join { network_id, nick: n, buffer_id } => state
            .participants()
            .join(NetworkId(model_id(network_id)), nick(n), BufferId(model_id(buffer_id)))
            .map(drop),
        Operation::Leave { network_id, nick: n, buffer_id } => state
            .participants()
            .leave(NetworkId(model_id(network_id)), nick(n), BufferId(model_id(buffer_id)))
            .map(drop),
        Operation::Rename { network_id, old, new } => state
            .participants()
            .rename(NetworkId(model_id(network_id)), nick(old), nick(new))
            .map(drop),
        Operation::Clear => state.clear().map(drop),
        Operation::ClearBuffers => state.buffers().clear().map(drop),
        Operation::Connect => state.set_connection_status(ConnectionStatus::Connected, None),
        Operation::Disconnect => state.set_connection_status(ConnectionStatus::Disconnected, None),
    }
}
