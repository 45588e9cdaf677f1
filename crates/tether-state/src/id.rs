//! Entity identifiers and type tags.
//!
//! Ids are assigned by the remote core and are only unique within their own
//! type namespace, so the registry keys objects by `(ObjectKind, u32)`. The
//! typed newtypes keep a `BufferId` from being passed where a `NetworkId` is
//! expected.

use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            /// Raw numeric id as assigned by the core.
            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identity id, unique among identities.
    IdentityId
);
entity_id!(
    /// Network id, unique among networks.
    NetworkId
);
entity_id!(
    /// Buffer id, unique among buffers.
    BufferId
);

/// Type tag of a registry object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// [`crate::Identity`]
    Identity,
    /// [`crate::Network`]
    Network,
    /// [`crate::Buffer`]
    Buffer,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identity => "Identity",
            Self::Network => "Network",
            Self::Buffer => "BufferInfo",
        };
        f.write_str(name)
    }
}

/// Registry key: type tag plus the id within that tag's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Type namespace.
    pub kind: ObjectKind,
    /// Id within the namespace.
    pub id: u32,
}

impl ObjectKey {
    /// Build a key from its parts.
    pub const fn new(kind: ObjectKind, id: u32) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Address of anything a change notification can be about.
///
/// Participants are not registry objects; they are addressed by their
/// network and ASCII case-folded nick.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// An identity.
    Identity(IdentityId),
    /// A network.
    Network(NetworkId),
    /// A buffer.
    Buffer(BufferId),
    /// A participant on a network.
    Participant {
        /// Network the participant is scoped to.
        network_id: NetworkId,
        /// Case-folded nick.
        nick: String,
    },
}

impl EntityKey {
    /// Registry key, `None` for participants.
    pub fn object_key(&self) -> Option<ObjectKey> {
        match self {
            Self::Identity(id) => Some(ObjectKey::new(ObjectKind::Identity, id.0)),
            Self::Network(id) => Some(ObjectKey::new(ObjectKind::Network, id.0)),
            Self::Buffer(id) => Some(ObjectKey::new(ObjectKind::Buffer, id.0)),
            Self::Participant { .. } => None,
        }
    }

    /// Key of a participant. The nick is case-folded.
    pub fn participant(network_id: NetworkId, nick: &str) -> Self {
        Self::Participant { network_id, nick: crate::index::fold_nick(nick) }
    }
}

impl From<IdentityId> for EntityKey {
    fn from(id: IdentityId) -> Self {
        Self::Identity(id)
    }
}

impl From<NetworkId> for EntityKey {
    fn from(id: NetworkId) -> Self {
        Self::Network(id)
    }
}

impl From<BufferId> for EntityKey {
    fn from(id: BufferId) -> Self {
        Self::Buffer(id)
    }
}
