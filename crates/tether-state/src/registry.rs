//! Object registry.
//!
//! Single source of truth for which entities exist. Objects are keyed by
//! `(ObjectKind, id)`; a put for a live key merges into the stored record,
//! so the stored instance lives for as long as its id does. The registry has
//! no notion of parents or cascades. Those belong to the collections, which
//! compose registry calls under the store lock.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    hash::Hash,
};

use crate::{
    entity::{Buffer, Identity, Merge, Network},
    id::{BufferId, EntityKey, IdentityId, NetworkId, ObjectKey, ObjectKind},
};

/// Any object the registry can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncObject {
    /// An identity.
    Identity(Identity),
    /// A network.
    Network(Network),
    /// A buffer.
    Buffer(Buffer),
}

impl SyncObject {
    /// Type tag of this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Identity(_) => ObjectKind::Identity,
            Self::Network(_) => ObjectKind::Network,
            Self::Buffer(_) => ObjectKind::Buffer,
        }
    }

    /// Registry key of this object.
    pub fn key(&self) -> ObjectKey {
        let id = match self {
            Self::Identity(identity) => identity.id.0,
            Self::Network(network) => network.id.0,
            Self::Buffer(buffer) => buffer.id.0,
        };
        ObjectKey::new(self.kind(), id)
    }
}

impl Merge for SyncObject {
    fn merge(&mut self, incoming: Self) {
        match (self, incoming) {
            (Self::Identity(stored), Self::Identity(incoming)) => stored.merge(incoming),
            (Self::Network(stored), Self::Network(incoming)) => stored.merge(incoming),
            (Self::Buffer(stored), Self::Buffer(incoming)) => stored.merge(incoming),
            (stored, incoming) => {
                // Keys carry the kind, so this only happens on a caller bug.
                debug_assert_eq!(stored.kind(), incoming.kind(), "merging objects of different kinds");
                tracing::error!(
                    stored = %stored.key(),
                    incoming = %incoming.key(),
                    "Merging objects of different kinds, ignored"
                );
            },
        }
    }
}

/// Typed view of a [`SyncObject`] variant.
pub trait Entity: Merge + Clone + fmt::Debug + Send + Sync + 'static {
    /// Typed id.
    type Id: Copy + Eq + Hash + Ord + fmt::Display + fmt::Debug + Into<EntityKey> + Send + Sync;

    /// Type tag shared by every instance.
    const KIND: ObjectKind;

    /// Id of this instance.
    fn id(&self) -> Self::Id;

    /// Raw numeric id.
    fn raw_id(id: Self::Id) -> u32;

    /// Wrap into the registry representation.
    fn into_object(self) -> SyncObject;

    /// Borrow from the registry representation. `None` on kind mismatch.
    fn from_object(object: &SyncObject) -> Option<&Self>;

    /// Mutably borrow from the registry representation.
    fn from_object_mut(object: &mut SyncObject) -> Option<&mut Self>;

    /// Unwrap an owned registry object. `None` on kind mismatch.
    fn from_owned(object: SyncObject) -> Option<Self>;

    /// Registry key for an id.
    fn key(id: Self::Id) -> ObjectKey {
        ObjectKey::new(Self::KIND, Self::raw_id(id))
    }
}

macro_rules! impl_entity {
    ($ty:ident, $id:ident) => {
        impl Entity for $ty {
            type Id = $id;

            const KIND: ObjectKind = ObjectKind::$ty;

            fn id(&self) -> $id {
                self.id
            }

            fn raw_id(id: $id) -> u32 {
                id.0
            }

            fn into_object(self) -> SyncObject {
                SyncObject::$ty(self)
            }

            fn from_object(object: &SyncObject) -> Option<&Self> {
                match object {
                    SyncObject::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_object_mut(object: &mut SyncObject) -> Option<&mut Self> {
                match object {
                    SyncObject::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_owned(object: SyncObject) -> Option<Self> {
                match object {
                    SyncObject::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_entity!(Identity, IdentityId);
impl_entity!(Network, NetworkId);
impl_entity!(Buffer, BufferId);

/// Outcome of [`ObjectRegistry::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was not live; the object was stored as-is.
    Inserted,
    /// The key was live; the object was merged into the stored one.
    Merged,
}

/// Heterogeneous store of live objects keyed by type tag and id.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: HashMap<ObjectKey, SyncObject>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge an object of any kind.
    pub fn put_object(&mut self, object: SyncObject) -> PutOutcome {
        match self.objects.entry(object.key()) {
            Entry::Vacant(slot) => {
                slot.insert(object);
                PutOutcome::Inserted
            },
            Entry::Occupied(mut slot) => {
                slot.get_mut().merge(object);
                PutOutcome::Merged
            },
        }
    }

    /// Insert or merge a typed entity.
    pub fn put<T: Entity>(&mut self, entity: T) -> PutOutcome {
        self.put_object(entity.into_object())
    }

    /// Object stored under `key`. `None` if not live.
    pub fn get_object(&self, key: ObjectKey) -> Option<&SyncObject> {
        self.objects.get(&key)
    }

    /// Typed entity by id. `None` if not live.
    pub fn get<T: Entity>(&self, id: T::Id) -> Option<&T> {
        self.objects.get(&T::key(id)).and_then(T::from_object)
    }

    /// Mutable typed entity by id. `None` if not live.
    pub fn get_mut<T: Entity>(&mut self, id: T::Id) -> Option<&mut T> {
        self.objects.get_mut(&T::key(id)).and_then(T::from_object_mut)
    }

    /// Check if `key` is live.
    pub fn contains(&self, key: ObjectKey) -> bool {
        self.objects.contains_key(&key)
    }

    /// Remove an object of any kind, returning it if it was live.
    pub fn remove_object(&mut self, key: ObjectKey) -> Option<SyncObject> {
        self.objects.remove(&key)
    }

    /// Remove a typed entity, returning it if it was live.
    pub fn remove<T: Entity>(&mut self, id: T::Id) -> Option<T> {
        self.objects.remove(&T::key(id)).and_then(T::from_owned)
    }

    /// Live keys of one kind, in no particular order.
    pub fn keys_of(&self, kind: ObjectKind) -> impl Iterator<Item = ObjectKey> + '_ {
        self.objects.keys().filter(move |key| key.kind == kind).copied()
    }

    /// Number of live objects of one kind.
    pub fn count_of(&self, kind: ObjectKind) -> usize {
        self.keys_of(kind).count()
    }

    /// Drop every object. Returns how many were live.
    pub fn clear(&mut self) -> usize {
        let count = self.objects.len();
        self.objects.clear();
        count
    }

    /// Total number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if no object is live.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::BufferKind;

    #[test]
    fn put_then_get() {
        let mut registry = ObjectRegistry::new();

        assert_eq!(registry.put(Network::new(NetworkId(1), "libera")), PutOutcome::Inserted);

        let network = registry.get::<Network>(NetworkId(1));
        assert_eq!(network.map(|n| n.name.as_str()), Some("libera"));
        assert!(registry.get::<Network>(NetworkId(2)).is_none());
    }

    #[test]
    fn namespaces_are_separate() {
        let mut registry = ObjectRegistry::new();
        registry.put(Network::new(NetworkId(1), "libera"));
        registry.put(Buffer::new(BufferId(1), NetworkId(1), BufferKind::Status, "libera"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.count_of(ObjectKind::Network), 1);
        assert_eq!(registry.count_of(ObjectKind::Buffer), 1);
        assert!(registry.get::<Identity>(IdentityId(1)).is_none());
    }

    #[test]
    fn duplicate_put_merges_in_place() {
        let mut registry = ObjectRegistry::new();
        let mut buffer = Buffer::new(BufferId(3), NetworkId(1), BufferKind::Channel, "#a");
        buffer.unread = 2;
        registry.put(buffer);

        let outcome =
            registry.put(Buffer::new(BufferId(3), NetworkId(1), BufferKind::Channel, "#b"));
        assert_eq!(outcome, PutOutcome::Merged);

        let stored = registry.get::<Buffer>(BufferId(3));
        assert_eq!(stored.map(|b| (b.name.as_str(), b.unread)), Some(("#b", 2)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "different kinds")]
    fn merging_different_kinds_is_caught() {
        let mut stored = SyncObject::Network(Network::new(NetworkId(1), "libera"));
        stored.merge(SyncObject::Identity(Identity::new(IdentityId(1), "me")));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn merging_different_kinds_keeps_stored() {
        let network = Network::new(NetworkId(1), "libera");
        let mut stored = SyncObject::Network(network.clone());
        stored.merge(SyncObject::Identity(Identity::new(IdentityId(1), "me")));
        assert_eq!(stored, SyncObject::Network(network));
    }

    #[test]
    fn remove_missing_is_none() {
        let mut registry = ObjectRegistry::new();
        assert!(registry.remove::<Buffer>(BufferId(9)).is_none());
        assert!(registry.remove_object(ObjectKey::new(ObjectKind::Identity, 9)).is_none());
    }

    #[test]
    fn remove_returns_entity() {
        let mut registry = ObjectRegistry::new();
        registry.put(Identity::new(IdentityId(4), "work"));

        let removed = registry.remove::<Identity>(IdentityId(4));
        assert_eq!(removed.map(|i| i.name), Some("work".to_string()));
        assert!(!registry.contains(ObjectKey::new(ObjectKind::Identity, 4)));
    }

    #[test]
    fn clear_reports_count() {
        let mut registry = ObjectRegistry::new();
        registry.put(Identity::new(IdentityId(1), "a"));
        registry.put(Identity::new(IdentityId(2), "b"));

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.clear(), 0);
    }
}
