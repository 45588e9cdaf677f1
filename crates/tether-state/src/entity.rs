//! Synced entity records.
//!
//! Entities are plain data. Visibility and atomicity are provided by the
//! store lock in [`crate::SyncState`], not per field. A sync for an id that is
//! already live is applied through [`Merge`], which mutates the stored record
//! in place instead of replacing it.

use std::collections::BTreeSet;

use crate::{
    color,
    id::{BufferId, IdentityId, NetworkId},
};

/// In-place merge of a freshly synced record into the live one.
pub trait Merge {
    /// Fold `incoming` into `self`. The id is never changed.
    fn merge(&mut self, incoming: Self);
}

/// A configured identity: display name plus the nicks to try, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Core-assigned id.
    pub id: IdentityId,
    /// Display name of the identity.
    pub name: String,
    /// Real name sent on registration.
    pub real_name: String,
    /// Configured nicks. The first one is the default.
    pub nicks: Vec<String>,
}

impl Identity {
    /// Identity with a name and no nicks configured yet.
    pub fn new(id: IdentityId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), real_name: String::new(), nicks: Vec::new() }
    }

    /// Builder-style nick list.
    pub fn with_nicks<I, S>(mut self, nicks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nicks = nicks.into_iter().map(Into::into).collect();
        self
    }

    /// First configured nick. `None` if the list is empty.
    pub fn default_nick(&self) -> Option<&str> {
        self.nicks.first().map(String::as_str)
    }

    /// Sender color index of the default nick.
    pub fn color_index(&self) -> Option<u8> {
        self.default_nick().map(color::color_index_for_nick)
    }
}

impl Merge for Identity {
    fn merge(&mut self, incoming: Self) {
        debug_assert_eq!(self.id, incoming.id);
        self.name = incoming.name;
        self.real_name = incoming.real_name;
        self.nicks = incoming.nicks;
    }
}

/// Connection state of a network as reported by the core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NetworkConnectionState {
    /// Not connected to the IRC server.
    #[default]
    Disconnected,
    /// Socket is being opened.
    Connecting,
    /// Registered, initial state still being synced.
    Initializing,
    /// Fully connected.
    Connected,
}

/// An IRC network the core is configured for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    /// Core-assigned id.
    pub id: NetworkId,
    /// Network display name.
    pub name: String,
    /// Connection state on the core side.
    pub state: NetworkConnectionState,
    /// Identity used on this network, if any.
    pub identity_id: Option<IdentityId>,
    /// Our current nick on this network.
    pub my_nick: Option<String>,
}

impl Network {
    /// Disconnected network with no identity.
    pub fn new(id: NetworkId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: NetworkConnectionState::Disconnected,
            identity_id: None,
            my_nick: None,
        }
    }

    /// Whether the network is usable for sending.
    pub fn is_connected(&self) -> bool {
        self.state == NetworkConnectionState::Connected
    }
}

impl Merge for Network {
    fn merge(&mut self, incoming: Self) {
        debug_assert_eq!(self.id, incoming.id);
        self.name = incoming.name;
        self.state = incoming.state;
        self.identity_id = incoming.identity_id;
        if incoming.my_nick.is_some() {
            self.my_nick = incoming.my_nick;
        }
    }
}

/// Classification of a buffer, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-network server messages.
    Status,
    /// A channel.
    Channel,
    /// A private conversation with one participant.
    Query,
    /// Anything else the core reports (group buffers, invalid).
    Other,
}

/// A conversation buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    /// Core-assigned id.
    pub id: BufferId,
    /// Owning network. May not be live yet (orphan).
    pub network_id: NetworkId,
    /// Fixed classification.
    pub kind: BufferKind,
    /// Channel name, query partner, or network name for status buffers.
    pub name: String,
    /// Current topic. `None` if the core never reported one.
    pub topic: Option<String>,
    /// Timestamp of the last message, milliseconds since the epoch.
    pub last_activity: u64,
    /// Unread messages since last read.
    pub unread: u32,
    /// Unread highlights since last read.
    pub highlights: u32,
}

impl Buffer {
    /// Buffer with no topic and zero counters.
    pub fn new(
        id: BufferId,
        network_id: NetworkId,
        kind: BufferKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            network_id,
            kind,
            name: name.into(),
            topic: None,
            last_activity: 0,
            unread: 0,
            highlights: 0,
        }
    }

    /// Builder-style topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

impl Merge for Buffer {
    /// Server fields follow the incoming record. The kind is fixed, and the
    /// activity counters are local: `last_activity` only moves forward and
    /// `unread`/`highlights` are left to `record_activity`/`mark_read`.
    fn merge(&mut self, incoming: Self) {
        debug_assert_eq!(self.id, incoming.id);
        if incoming.kind != self.kind {
            tracing::warn!(
                buffer_id = %self.id,
                stored = ?self.kind,
                incoming = ?incoming.kind,
                "Ignoring buffer kind change"
            );
        }
        self.network_id = incoming.network_id;
        self.name = incoming.name;
        self.topic = incoming.topic;
        self.last_activity = self.last_activity.max(incoming.last_activity);
    }
}

/// A user seen on a network (IrcUser on the core).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Network the participant belongs to.
    pub network_id: NetworkId,
    /// Nick in its original case.
    pub nick: String,
    /// `user@host`, once known.
    pub hostmask: Option<String>,
    /// User mode letters.
    pub modes: String,
    /// Buffers the participant is currently present in.
    pub buffers: BTreeSet<BufferId>,
}

impl Participant {
    /// Participant not present in any buffer yet.
    pub fn new(network_id: NetworkId, nick: impl Into<String>) -> Self {
        Self {
            network_id,
            nick: nick.into(),
            hostmask: None,
            modes: String::new(),
            buffers: BTreeSet::new(),
        }
    }

    /// Full `nick!user@host` prefix when the hostmask is known.
    pub fn prefix(&self) -> String {
        match &self.hostmask {
            Some(host) => format!("{}!{}", self.nick, host),
            None => self.nick.clone(),
        }
    }

    /// Sender color index of this participant's nick.
    pub fn color_index(&self) -> u8 {
        color::color_index_for_nick(&self.nick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_merge_keeps_kind_and_local_counters() {
        let mut stored = Buffer::new(BufferId(1), NetworkId(1), BufferKind::Channel, "#rust");
        stored.unread = 4;
        stored.highlights = 1;
        stored.last_activity = 500;

        let mut incoming =
            Buffer::new(BufferId(1), NetworkId(2), BufferKind::Query, "#rust-beginners")
                .with_topic("welcome");
        incoming.last_activity = 100;
        stored.merge(incoming);

        assert_eq!(stored.kind, BufferKind::Channel);
        assert_eq!(stored.network_id, NetworkId(2));
        assert_eq!(stored.name, "#rust-beginners");
        assert_eq!(stored.topic.as_deref(), Some("welcome"));
        assert_eq!(stored.last_activity, 500);
        assert_eq!((stored.unread, stored.highlights), (4, 1));
    }

    #[test]
    fn network_merge_keeps_known_nick() {
        let mut stored = Network::new(NetworkId(1), "libera");
        stored.my_nick = Some("tether".into());

        let mut incoming = Network::new(NetworkId(1), "Libera.Chat");
        incoming.state = NetworkConnectionState::Connected;
        stored.merge(incoming);

        assert_eq!(stored.name, "Libera.Chat");
        assert!(stored.is_connected());
        assert_eq!(stored.my_nick.as_deref(), Some("tether"));
    }

    #[test]
    fn identity_default_nick_is_first() {
        let identity = Identity::new(IdentityId(1), "Default").with_nicks(["tether", "tether_"]);
        assert_eq!(identity.default_nick(), Some("tether"));
        assert_eq!(identity.color_index(), Some(color::color_index_for_nick("tether")));

        let empty = Identity::new(IdentityId(2), "Empty");
        assert_eq!(empty.default_nick(), None);
        assert_eq!(empty.color_index(), None);
    }

    #[test]
    fn participant_prefix() {
        let mut p = Participant::new(NetworkId(1), "alice");
        assert_eq!(p.prefix(), "alice");
        p.hostmask = Some("al@example.org".into());
        assert_eq!(p.prefix(), "alice!al@example.org");
    }
}
