//! Connection session seam.
//!
//! The connection session decodes the core's protocol and owns the socket.
//! This module is the boundary it talks to: [`SessionEvent`] is the decoded
//! mutation stream, [`SessionSink`] is the set of callbacks that apply it.
//! [`crate::SyncState`] implements the sink.

use std::fmt;

use crate::{
    entity::{Buffer, Identity, Network, NetworkConnectionState},
    error::StateError,
    id::{BufferId, NetworkId, ObjectKind},
};

/// Connection status between this client and the core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No session.
    #[default]
    Disconnected,
    /// Handshake and initial sync in progress.
    Connecting,
    /// Session established.
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Decoded mutation delivered by the connection session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Identity created or re-synced.
    IdentitySynced(Identity),

    /// Network created or re-synced.
    NetworkSynced(Network),

    /// Buffer created or re-synced.
    BufferSynced(Buffer),

    /// A participant entered a buffer.
    ParticipantJoined {
        /// Network the participant is on.
        network_id: NetworkId,
        /// Participant nick.
        nick: String,
        /// Buffer entered.
        buffer_id: BufferId,
    },

    /// A participant left a buffer.
    ParticipantLeft {
        /// Network the participant is on.
        network_id: NetworkId,
        /// Participant nick.
        nick: String,
        /// Buffer left.
        buffer_id: BufferId,
    },

    /// A participant changed nick.
    ParticipantRenamed {
        /// Network the participant is on.
        network_id: NetworkId,
        /// Previous nick.
        old_nick: String,
        /// New nick.
        new_nick: String,
    },

    /// Participant attributes changed.
    ParticipantUpdated {
        /// Network the participant is on.
        network_id: NetworkId,
        /// Participant nick.
        nick: String,
        /// `user@host`, if reported.
        hostmask: Option<String>,
        /// User mode letters.
        modes: String,
    },

    /// Object removed by the core.
    Removed {
        /// Type tag of the removed object.
        kind: ObjectKind,
        /// Raw id of the removed object.
        id: u32,
    },

    /// Buffer topic changed.
    TopicChanged {
        /// Buffer whose topic changed.
        buffer_id: BufferId,
        /// New topic. `None` if cleared.
        topic: Option<String>,
    },

    /// Network connection state changed on the core side.
    NetworkStateChanged {
        /// Network whose state changed.
        network_id: NetworkId,
        /// New state.
        state: NetworkConnectionState,
    },

    /// A message arrived in a buffer.
    BufferActivity {
        /// Buffer that received the message.
        buffer_id: BufferId,
        /// Message timestamp, milliseconds since the epoch.
        timestamp: u64,
        /// Whether the message highlights us.
        highlight: bool,
    },

    /// A buffer was read up to its latest message.
    BufferRead {
        /// Buffer that was read.
        buffer_id: BufferId,
    },

    /// Session connection status changed.
    ConnectionStatusChanged {
        /// New status.
        status: ConnectionStatus,
        /// Human-readable cause, mostly for disconnects.
        reason: Option<String>,
    },
}

/// Receiver of decoded session mutations.
///
/// Every callback returns `Ok` for unknown ids; the only error is use after
/// teardown.
pub trait SessionSink {
    /// Identity created or re-synced.
    fn on_identity_synced(&self, identity: Identity) -> Result<(), StateError>;

    /// Network created or re-synced.
    fn on_network_synced(&self, network: Network) -> Result<(), StateError>;

    /// Buffer created or re-synced.
    fn on_buffer_synced(&self, buffer: Buffer) -> Result<(), StateError>;

    /// A participant entered a buffer.
    fn on_participant_joined(
        &self,
        network_id: NetworkId,
        nick: &str,
        buffer_id: BufferId,
    ) -> Result<(), StateError>;

    /// A participant left a buffer.
    fn on_participant_left(
        &self,
        network_id: NetworkId,
        nick: &str,
        buffer_id: BufferId,
    ) -> Result<(), StateError>;

    /// A participant changed nick.
    fn on_participant_renamed(
        &self,
        network_id: NetworkId,
        old_nick: &str,
        new_nick: &str,
    ) -> Result<(), StateError>;

    /// Participant attributes changed.
    fn on_participant_updated(
        &self,
        network_id: NetworkId,
        nick: &str,
        hostmask: Option<String>,
        modes: String,
    ) -> Result<(), StateError>;

    /// Object removed by the core.
    fn on_removed(&self, kind: ObjectKind, id: u32) -> Result<(), StateError>;

    /// Buffer topic changed.
    fn on_topic_changed(&self, buffer_id: BufferId, topic: Option<String>)
    -> Result<(), StateError>;

    /// Network connection state changed on the core side.
    fn on_network_state_changed(
        &self,
        network_id: NetworkId,
        state: NetworkConnectionState,
    ) -> Result<(), StateError>;

    /// A message arrived in a buffer.
    fn on_buffer_activity(
        &self,
        buffer_id: BufferId,
        timestamp: u64,
        highlight: bool,
    ) -> Result<(), StateError>;

    /// A buffer was read.
    fn on_buffer_read(&self, buffer_id: BufferId) -> Result<(), StateError>;

    /// Session connection status changed.
    fn on_connection_status_changed(
        &self,
        status: ConnectionStatus,
        reason: Option<String>,
    ) -> Result<(), StateError>;

    /// Route a decoded event to its callback.
    fn apply(&self, event: SessionEvent) -> Result<(), StateError> {
        match event {
            SessionEvent::IdentitySynced(identity) => self.on_identity_synced(identity),
            SessionEvent::NetworkSynced(network) => self.on_network_synced(network),
            SessionEvent::BufferSynced(buffer) => self.on_buffer_synced(buffer),
            SessionEvent::ParticipantJoined { network_id, nick, buffer_id } => {
                self.on_participant_joined(network_id, &nick, buffer_id)
            },
            SessionEvent::ParticipantLeft { network_id, nick, buffer_id } => {
                self.on_participant_left(network_id, &nick, buffer_id)
            },
            SessionEvent::ParticipantRenamed { network_id, old_nick, new_nick } => {
                self.on_participant_renamed(network_id, &old_nick, &new_nick)
            },
            SessionEvent::ParticipantUpdated { network_id, nick, hostmask, modes } => {
                self.on_participant_updated(network_id, &nick, hostmask, modes)
            },
            SessionEvent::Removed { kind, id } => self.on_removed(kind, id),
            SessionEvent::TopicChanged { buffer_id, topic } => {
                self.on_topic_changed(buffer_id, topic)
            },
            SessionEvent::NetworkStateChanged { network_id, state } => {
                self.on_network_state_changed(network_id, state)
            },
            SessionEvent::BufferActivity { buffer_id, timestamp, highlight } => {
                self.on_buffer_activity(buffer_id, timestamp, highlight)
            },
            SessionEvent::BufferRead { buffer_id } => self.on_buffer_read(buffer_id),
            SessionEvent::ConnectionStatusChanged { status, reason } => {
                self.on_connection_status_changed(status, reason)
            },
        }
    }

    /// Apply events in order, stopping at the first error.
    fn apply_all<I>(&self, events: I) -> Result<(), StateError>
    where
        I: IntoIterator<Item = SessionEvent>,
        Self: Sized,
    {
        events.into_iter().try_for_each(|event| self.apply(event))
    }
}
