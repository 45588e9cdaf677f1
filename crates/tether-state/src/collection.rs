//! Typed collections over the shared store.
//!
//! [`Store`] owns the registry and every secondary index. All of its methods
//! run under the store write lock held by [`crate::SyncState`], which is what
//! makes a multi-step change such as a network cascade indivisible to
//! readers. Events produced by a change are collected into an outbox and
//! enqueued on the bus before the lock is released.
//!
//! The façades ([`Identities`], [`Networks`], [`Buffers`], [`Participants`])
//! are borrowed views handed out by `SyncState`; they hold no state of their
//! own.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    buffer_view::BufferView,
    bus::Event,
    entity::{Buffer, Identity, Network, NetworkConnectionState, Participant},
    error::StateError,
    id::{BufferId, EntityKey, IdentityId, NetworkId, ObjectKey, ObjectKind},
    index::{JoinOutcome, LeaveOutcome, OrderIndex, ParticipantIndex, fold_nick},
    registry::{Entity, ObjectRegistry, PutOutcome},
    session::ConnectionStatus,
    state::{StateSnapshot, SyncState},
};

/// Events produced while the store lock is held.
pub(crate) type Outbox = Vec<Event>;

/// Registry plus indices, guarded as one unit.
#[derive(Debug, Default)]
pub(crate) struct Store {
    pub(crate) registry: ObjectRegistry,
    identity_order: OrderIndex<IdentityId>,
    network_order: OrderIndex<NetworkId>,
    buffer_order: OrderIndex<BufferId>,
    buffers_by_network: HashMap<NetworkId, OrderIndex<BufferId>>,
    participants: ParticipantIndex,
    pub(crate) status: ConnectionStatus,
}

impl Store {
    fn put_identity(&mut self, identity: Identity, out: &mut Outbox) -> PutOutcome {
        let id = identity.id;
        let outcome = self.registry.put(identity);
        self.identity_order.insert(id);
        tracing::debug!(identity_id = %id, ?outcome, "Identity synced");
        out.push(Event::put(id, outcome == PutOutcome::Inserted));
        outcome
    }

    fn remove_identity(&mut self, id: IdentityId, out: &mut Outbox) -> bool {
        if self.registry.remove::<Identity>(id).is_none() {
            return false;
        }
        self.identity_order.remove(id);
        tracing::debug!(identity_id = %id, "Identity removed");
        out.push(Event::removed(id));
        true
    }

    fn put_network(&mut self, network: Network, out: &mut Outbox) -> PutOutcome {
        let id = network.id;
        let outcome = self.registry.put(network);
        self.network_order.insert(id);
        tracing::debug!(network_id = %id, ?outcome, "Network synced");
        out.push(Event::put(id, outcome == PutOutcome::Inserted));
        outcome
    }

    /// Remove a network and everything hanging off it.
    ///
    /// Dependent buffers go first, each with its own removal event; the
    /// network's event is last. Orphan buffers of an unknown network are
    /// left alone: removing an absent id is a no-op.
    fn remove_network(&mut self, id: NetworkId, out: &mut Outbox) -> bool {
        if !self.registry.contains(Network::key(id)) {
            return false;
        }

        let dependents: Vec<BufferId> =
            self.buffers_by_network.get(&id).map(|index| index.iter().collect()).unwrap_or_default();
        for buffer_id in &dependents {
            self.remove_buffer(*buffer_id, out);
        }

        let participants = self.participants.drop_network(id);
        self.registry.remove::<Network>(id);
        self.network_order.remove(id);

        tracing::debug!(
            network_id = %id,
            buffers = dependents.len(),
            participants,
            "Network removed"
        );
        out.push(Event::removed(id));
        true
    }

    fn put_buffer(&mut self, buffer: Buffer, out: &mut Outbox) -> PutOutcome {
        let (id, network_id) = (buffer.id, buffer.network_id);
        let previous_network = self.registry.get::<Buffer>(id).map(|b| b.network_id);

        let outcome = self.registry.put(buffer);
        self.buffer_order.insert(id);
        match previous_network {
            Some(previous) => self.relink_buffer(id, previous, network_id),
            None => self.link_buffer(id, network_id),
        }

        tracing::debug!(
            buffer_id = %id,
            network_id = %network_id,
            orphaned = !self.registry.contains(Network::key(network_id)),
            ?outcome,
            "Buffer synced"
        );
        out.push(Event::put(id, outcome == PutOutcome::Inserted));
        outcome
    }

    fn remove_buffer(&mut self, id: BufferId, out: &mut Outbox) -> bool {
        let Some(buffer) = self.registry.remove::<Buffer>(id) else {
            return false;
        };
        self.buffer_order.remove(id);
        self.unlink_buffer(id, buffer.network_id);
        self.participants.drop_buffer(buffer.network_id, id);
        tracing::debug!(buffer_id = %id, network_id = %buffer.network_id, "Buffer removed");
        out.push(Event::removed(id));
        true
    }

    fn link_buffer(&mut self, id: BufferId, network_id: NetworkId) {
        self.buffers_by_network.entry(network_id).or_default().insert(id);
    }

    fn unlink_buffer(&mut self, id: BufferId, network_id: NetworkId) {
        if let Some(index) = self.buffers_by_network.get_mut(&network_id) {
            index.remove(id);
            if index.is_empty() {
                self.buffers_by_network.remove(&network_id);
            }
        }
    }

    /// Move a buffer between networks in the secondary index. Participant
    /// presence is network scoped and does not follow the move.
    fn relink_buffer(&mut self, id: BufferId, from: NetworkId, to: NetworkId) {
        if from == to {
            return;
        }
        self.unlink_buffer(id, from);
        self.participants.drop_buffer(from, id);
        self.link_buffer(id, to);
    }

    fn update_identity(
        &mut self,
        id: IdentityId,
        f: impl FnOnce(&mut Identity),
        out: &mut Outbox,
    ) -> bool {
        let Some(identity) = self.registry.get_mut::<Identity>(id) else {
            return false;
        };
        f(identity);
        identity.id = id;
        out.push(Event::put(id, false));
        true
    }

    fn update_network(
        &mut self,
        id: NetworkId,
        f: impl FnOnce(&mut Network),
        out: &mut Outbox,
    ) -> bool {
        let Some(network) = self.registry.get_mut::<Network>(id) else {
            return false;
        };
        f(network);
        network.id = id;
        out.push(Event::put(id, false));
        true
    }

    fn update_buffer(&mut self, id: BufferId, f: impl FnOnce(&mut Buffer), out: &mut Outbox) -> bool {
        let Some(buffer) = self.registry.get_mut::<Buffer>(id) else {
            return false;
        };
        let (kind, previous_network) = (buffer.kind, buffer.network_id);
        f(buffer);
        buffer.id = id;
        if buffer.kind != kind {
            tracing::warn!(
                buffer_id = %id,
                stored = ?kind,
                attempted = ?buffer.kind,
                "Reverting buffer kind change"
            );
            buffer.kind = kind;
        }
        let network_id = buffer.network_id;
        self.relink_buffer(id, previous_network, network_id);
        out.push(Event::put(id, false));
        true
    }

    fn join_participant(
        &mut self,
        network_id: NetworkId,
        nick: &str,
        buffer_id: BufferId,
        out: &mut Outbox,
    ) -> bool {
        match self.registry.get::<Buffer>(buffer_id) {
            Some(buffer) if buffer.network_id == network_id => {},
            Some(buffer) => {
                tracing::warn!(
                    %nick,
                    buffer_id = %buffer_id,
                    buffer_network = %buffer.network_id,
                    network_id = %network_id,
                    "Ignoring join into buffer of another network"
                );
                return false;
            },
            None => {
                tracing::debug!(%nick, buffer_id = %buffer_id, "Ignoring join into unknown buffer");
                return false;
            },
        }

        let key = EntityKey::participant(network_id, nick);
        match self.participants.join(network_id, nick, buffer_id) {
            JoinOutcome::Created => out.push(Event::put(key, true)),
            JoinOutcome::Joined => out.push(Event::put(key, false)),
            JoinOutcome::AlreadyPresent => return false,
        }
        true
    }

    fn leave_participant(
        &mut self,
        network_id: NetworkId,
        nick: &str,
        buffer_id: BufferId,
        out: &mut Outbox,
    ) -> bool {
        let key = EntityKey::participant(network_id, nick);
        match self.participants.leave(network_id, nick, buffer_id) {
            LeaveOutcome::NotPresent => return false,
            LeaveOutcome::Left => out.push(Event::put(key, false)),
            LeaveOutcome::Gone => out.push(Event::removed(key)),
        }
        true
    }

    fn rename_participant(
        &mut self,
        network_id: NetworkId,
        old: &str,
        new: &str,
        out: &mut Outbox,
    ) -> bool {
        if !self.participants.rename(network_id, old, new) {
            return false;
        }
        let (old_key, new_key) =
            (EntityKey::participant(network_id, old), EntityKey::participant(network_id, new));
        if old_key != new_key {
            out.push(Event::removed(old_key));
        }
        out.push(Event::put(new_key, false));
        true
    }

    fn update_participant(
        &mut self,
        network_id: NetworkId,
        nick: &str,
        hostmask: Option<String>,
        modes: String,
        out: &mut Outbox,
    ) -> bool {
        let Some(participant) = self.participants.get_mut(network_id, nick) else {
            return false;
        };
        if hostmask.is_some() {
            participant.hostmask = hostmask;
        }
        participant.modes = modes;
        out.push(Event::put(EntityKey::participant(network_id, nick), false));
        true
    }

    fn clear_identities(&mut self) -> usize {
        let ids: Vec<IdentityId> = self.identity_order.iter().collect();
        for id in &ids {
            self.registry.remove::<Identity>(*id);
        }
        self.identity_order.clear();
        ids.len()
    }

    fn clear_buffers(&mut self) -> usize {
        let ids: Vec<BufferId> = self.buffer_order.iter().collect();
        for id in &ids {
            self.registry.remove::<Buffer>(*id);
        }
        self.buffer_order.clear();
        self.buffers_by_network.clear();
        self.participants.clear();
        ids.len()
    }

    fn clear_networks(&mut self) -> usize {
        let ids: Vec<NetworkId> = self.network_order.iter().collect();
        for id in &ids {
            self.registry.remove::<Network>(*id);
        }
        self.network_order.clear();
        ids.len() + self.clear_buffers()
    }

    /// Drop every object and index entry. Returns how many objects were
    /// live.
    pub(crate) fn clear_all(&mut self) -> usize {
        let removed = self.registry.clear();
        self.identity_order.clear();
        self.network_order.clear();
        self.buffer_order.clear();
        self.buffers_by_network.clear();
        self.participants.clear();
        removed
    }

    fn is_ready(&self, buffer: &Buffer) -> bool {
        self.registry.contains(Network::key(buffer.network_id))
    }

    fn ordered<'a, T: Entity>(
        &'a self,
        order: &'a OrderIndex<T::Id>,
    ) -> impl Iterator<Item = &'a T> + 'a {
        order.iter().filter_map(|id| self.registry.get::<T>(id))
    }

    fn buffers(&self) -> impl Iterator<Item = &Buffer> + '_ {
        self.ordered::<Buffer>(&self.buffer_order)
    }

    fn view(&self, id: BufferId) -> Option<BufferView> {
        let buffer = self.registry.get::<Buffer>(id)?;
        let network = self.registry.get::<Network>(buffer.network_id);
        Some(BufferView::new(buffer.clone(), network.cloned()))
    }

    /// Consistent copy of everything, in observation order.
    pub(crate) fn snapshot(&self) -> StateSnapshot {
        let mut participants: Vec<Participant> = self.participants.iter().cloned().collect();
        participants.sort_by_cached_key(|p| (p.network_id, fold_nick(&p.nick)));

        let mut order: BTreeMap<ObjectKind, Vec<u32>> = BTreeMap::new();
        order.insert(ObjectKind::Identity, self.identity_order.iter().map(|id| id.0).collect());
        order.insert(ObjectKind::Network, self.network_order.iter().map(|id| id.0).collect());
        order.insert(ObjectKind::Buffer, self.buffer_order.iter().map(|id| id.0).collect());

        let registry_keys: BTreeSet<ObjectKey> = [
            ObjectKind::Identity,
            ObjectKind::Network,
            ObjectKind::Buffer,
        ]
        .into_iter()
        .flat_map(|kind| self.registry.keys_of(kind))
        .collect();

        StateSnapshot {
            status: self.status,
            identities: self.ordered::<Identity>(&self.identity_order).cloned().collect(),
            networks: self.ordered::<Network>(&self.network_order).cloned().collect(),
            buffers: self.buffers().cloned().collect(),
            participants,
            registry_keys,
            order,
            buffers_by_network: self
                .buffers_by_network
                .iter()
                .map(|(network_id, index)| (*network_id, index.iter().collect::<Vec<_>>()))
                .collect(),
        }
    }
}

/// Identity collection.
#[derive(Debug, Clone, Copy)]
pub struct Identities<'a> {
    pub(crate) state: &'a SyncState,
}

impl Identities<'_> {
    /// Insert a new identity or merge into the live one.
    pub fn put(&self, identity: Identity) -> Result<PutOutcome, StateError> {
        self.state.write("identities.put", |store, out| store.put_identity(identity, out))
    }

    /// Remove an identity. Returns `false` if it was not live.
    ///
    /// Networks referring to it keep the id and resolve it to `None`.
    pub fn remove(&self, id: IdentityId) -> Result<bool, StateError> {
        self.state.write("identities.remove", |store, out| store.remove_identity(id, out))
    }

    /// Identity by id. `None` if not live.
    pub fn get(&self, id: IdentityId) -> Result<Option<Identity>, StateError> {
        self.state.read("identities.get", |store| store.registry.get::<Identity>(id).cloned())
    }

    /// All identities in observation order.
    pub fn all(&self) -> Result<Vec<Identity>, StateError> {
        self.state.read("identities.all", |store| {
            store.ordered::<Identity>(&store.identity_order).cloned().collect()
        })
    }

    /// Ids in observation order.
    pub fn ids(&self) -> Result<Vec<IdentityId>, StateError> {
        self.state.read("identities.ids", |store| store.identity_order.iter().collect())
    }

    /// Mutate a live identity. Returns `false` if not live.
    ///
    /// `f` runs on a copy with no lock held, so it may read or write this
    /// state. The copy is written back afterwards; a concurrent update to
    /// the same identity in between is overwritten.
    pub fn update(
        &self,
        id: IdentityId,
        f: impl FnOnce(&mut Identity),
    ) -> Result<bool, StateError> {
        let current =
            self.state.read("identities.update", |store| store.registry.get::<Identity>(id).cloned())?;
        let Some(mut identity) = current else {
            return Ok(false);
        };
        f(&mut identity);
        self.state.write("identities.update", |store, out| {
            store.update_identity(id, |stored| *stored = identity, out)
        })
    }

    /// Number of live identities.
    pub fn len(&self) -> Result<usize, StateError> {
        self.state.read("identities.len", |store| store.identity_order.len())
    }

    /// Check if no identity is live.
    pub fn is_empty(&self) -> Result<bool, StateError> {
        self.len().map(|len| len == 0)
    }

    /// Drop every identity. Returns how many were live.
    pub fn clear(&self) -> Result<usize, StateError> {
        self.state.clear_scoped(ObjectKind::Identity, Store::clear_identities)
    }
}

/// Network collection.
#[derive(Debug, Clone, Copy)]
pub struct Networks<'a> {
    pub(crate) state: &'a SyncState,
}

impl Networks<'_> {
    /// Insert a new network or merge into the live one.
    ///
    /// Buffers synced earlier for this id become ready.
    pub fn put(&self, network: Network) -> Result<PutOutcome, StateError> {
        self.state.write("networks.put", |store, out| store.put_network(network, out))
    }

    /// Remove a network and cascade to its buffers and participants.
    ///
    /// Readers observe the whole cascade at once. One removal event is
    /// published per buffer, then one for the network.
    pub fn remove(&self, id: NetworkId) -> Result<bool, StateError> {
        self.state.write("networks.remove", |store, out| store.remove_network(id, out))
    }

    /// Network by id. `None` if not live.
    pub fn get(&self, id: NetworkId) -> Result<Option<Network>, StateError> {
        self.state.read("networks.get", |store| store.registry.get::<Network>(id).cloned())
    }

    /// All networks in observation order.
    pub fn all(&self) -> Result<Vec<Network>, StateError> {
        self.state.read("networks.all", |store| {
            store.ordered::<Network>(&store.network_order).cloned().collect()
        })
    }

    /// Ids in observation order.
    pub fn ids(&self) -> Result<Vec<NetworkId>, StateError> {
        self.state.read("networks.ids", |store| store.network_order.iter().collect())
    }

    /// First network, in observation order, with the given name.
    pub fn by_name(&self, name: &str) -> Result<Option<Network>, StateError> {
        self.state.read("networks.by_name", |store| {
            store.ordered::<Network>(&store.network_order).find(|n| n.name == name).cloned()
        })
    }

    /// Buffer ids of a network in observation order, orphans included.
    pub fn buffer_ids(&self, id: NetworkId) -> Result<Vec<BufferId>, StateError> {
        self.state.read("networks.buffer_ids", |store| {
            store
                .buffers_by_network
                .get(&id)
                .map(|index| index.iter().collect::<Vec<_>>())
                .unwrap_or_default()
        })
    }

    /// Identity used by a network. `None` if either is not live.
    pub fn identity_of(&self, id: NetworkId) -> Result<Option<Identity>, StateError> {
        self.state.read("networks.identity_of", |store| {
            store
                .registry
                .get::<Network>(id)
                .and_then(|network| network.identity_id)
                .and_then(|identity_id| store.registry.get::<Identity>(identity_id))
                .cloned()
        })
    }

    /// Mutate a live network. Returns `false` if not live.
    ///
    /// `f` runs on a copy with no lock held, so it may read or write this
    /// state. The copy is written back afterwards; a concurrent update to
    /// the same network in between is overwritten.
    pub fn update(&self, id: NetworkId, f: impl FnOnce(&mut Network)) -> Result<bool, StateError> {
        let current =
            self.state.read("networks.update", |store| store.registry.get::<Network>(id).cloned())?;
        let Some(mut network) = current else {
            return Ok(false);
        };
        f(&mut network);
        self.state.write("networks.update", |store, out| {
            store.update_network(id, |stored| *stored = network, out)
        })
    }

    /// Set the core-side connection state. Returns `false` if not live.
    pub fn set_state(
        &self,
        id: NetworkId,
        state: NetworkConnectionState,
    ) -> Result<bool, StateError> {
        self.state.write("networks.set_state", |store, out| {
            store.update_network(id, |network| network.state = state, out)
        })
    }

    /// Number of live networks.
    pub fn len(&self) -> Result<usize, StateError> {
        self.state.read("networks.len", |store| store.network_order.len())
    }

    /// Check if no network is live.
    pub fn is_empty(&self) -> Result<bool, StateError> {
        self.len().map(|len| len == 0)
    }

    /// Drop every network together with all buffers and participants.
    /// Returns how many objects were live.
    pub fn clear(&self) -> Result<usize, StateError> {
        self.state.clear_scoped(ObjectKind::Network, Store::clear_networks)
    }
}

/// Buffer collection.
#[derive(Debug, Clone, Copy)]
pub struct Buffers<'a> {
    pub(crate) state: &'a SyncState,
}

impl Buffers<'_> {
    /// Insert a new buffer or merge into the live one.
    ///
    /// A buffer naming an unknown network is stored as orphaned and shows up
    /// in [`Self::ready`] once that network is synced.
    pub fn put(&self, buffer: Buffer) -> Result<PutOutcome, StateError> {
        self.state.write("buffers.put", |store, out| store.put_buffer(buffer, out))
    }

    /// Remove a buffer. Returns `false` if it was not live.
    pub fn remove(&self, id: BufferId) -> Result<bool, StateError> {
        self.state.write("buffers.remove", |store, out| store.remove_buffer(id, out))
    }

    /// Buffer by id. `None` if not live. Orphans are returned too.
    pub fn get(&self, id: BufferId) -> Result<Option<Buffer>, StateError> {
        self.state.read("buffers.get", |store| store.registry.get::<Buffer>(id).cloned())
    }

    /// All buffers in observation order, orphans included.
    pub fn all(&self) -> Result<Vec<Buffer>, StateError> {
        self.state.read("buffers.all", |store| store.buffers().cloned().collect())
    }

    /// Buffers whose network is live, in observation order.
    pub fn ready(&self) -> Result<Vec<Buffer>, StateError> {
        self.state.read("buffers.ready", |store| {
            store.buffers().filter(|b| store.is_ready(b)).cloned().collect()
        })
    }

    /// Buffers whose network is not live, in observation order.
    pub fn orphaned(&self) -> Result<Vec<Buffer>, StateError> {
        self.state.read("buffers.orphaned", |store| {
            store.buffers().filter(|b| !store.is_ready(b)).cloned().collect()
        })
    }

    /// Whether a buffer is live and its network is live.
    pub fn is_ready(&self, id: BufferId) -> Result<bool, StateError> {
        self.state.read("buffers.is_ready", |store| {
            store.registry.get::<Buffer>(id).is_some_and(|b| store.is_ready(b))
        })
    }

    /// Buffers of one network in observation order.
    pub fn on_network(&self, network_id: NetworkId) -> Result<Vec<Buffer>, StateError> {
        self.state.read("buffers.on_network", |store| {
            store
                .buffers_by_network
                .get(&network_id)
                .map(|index| store.ordered::<Buffer>(index).cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Buffer of a network by name, ASCII case-insensitively. Orphans of
    /// that network id are found too.
    pub fn by_name(&self, network_id: NetworkId, name: &str) -> Result<Option<Buffer>, StateError> {
        let folded = fold_nick(name);
        self.state.read("buffers.by_name", |store| {
            store
                .buffers_by_network
                .get(&network_id)
                .and_then(|index| {
                    store.ordered::<Buffer>(index).find(|b| fold_nick(&b.name) == folded)
                })
                .cloned()
        })
    }

    /// Buffer joined with its network. `None` if the buffer is not live.
    pub fn view(&self, id: BufferId) -> Result<Option<BufferView>, StateError> {
        self.state.read("buffers.view", |store| store.view(id))
    }

    /// Mutate a live buffer. Returns `false` if not live.
    ///
    /// The kind is fixed; a changed kind is reverted. `f` runs on a copy
    /// with no lock held, so it may read or write this state. The copy is
    /// written back afterwards; a concurrent update to the same buffer in
    /// between, activity counters included, is overwritten.
    pub fn update(&self, id: BufferId, f: impl FnOnce(&mut Buffer)) -> Result<bool, StateError> {
        let current =
            self.state.read("buffers.update", |store| store.registry.get::<Buffer>(id).cloned())?;
        let Some(mut buffer) = current else {
            return Ok(false);
        };
        f(&mut buffer);
        self.modify("buffers.update", id, |stored| *stored = buffer)
    }

    fn modify(
        &self,
        operation: &'static str,
        id: BufferId,
        f: impl FnOnce(&mut Buffer),
    ) -> Result<bool, StateError> {
        self.state.write(operation, |store, out| store.update_buffer(id, f, out))
    }

    /// Replace the topic. Returns `false` if not live.
    pub fn set_topic(&self, id: BufferId, topic: Option<String>) -> Result<bool, StateError> {
        self.modify("buffers.set_topic", id, |buffer| buffer.topic = topic)
    }

    /// Count a new message. Returns `false` if not live.
    pub fn record_activity(
        &self,
        id: BufferId,
        timestamp: u64,
        highlight: bool,
    ) -> Result<bool, StateError> {
        self.modify("buffers.record_activity", id, |buffer| {
            buffer.last_activity = buffer.last_activity.max(timestamp);
            buffer.unread = buffer.unread.saturating_add(1);
            if highlight {
                buffer.highlights = buffer.highlights.saturating_add(1);
            }
        })
    }

    /// Zero the unread counters. Returns `false` if not live or already
    /// read.
    pub fn mark_read(&self, id: BufferId) -> Result<bool, StateError> {
        self.state.write("buffers.mark_read", |store, out| {
            let unread = store
                .registry
                .get::<Buffer>(id)
                .is_some_and(|buffer| buffer.unread > 0 || buffer.highlights > 0);
            unread
                && store.update_buffer(
                    id,
                    |buffer| {
                        buffer.unread = 0;
                        buffer.highlights = 0;
                    },
                    out,
                )
        })
    }

    /// Number of live buffers.
    pub fn len(&self) -> Result<usize, StateError> {
        self.state.read("buffers.len", |store| store.buffer_order.len())
    }

    /// Check if no buffer is live.
    pub fn is_empty(&self) -> Result<bool, StateError> {
        self.len().map(|len| len == 0)
    }

    /// Drop every buffer and participant. Returns how many buffers were
    /// live.
    pub fn clear(&self) -> Result<usize, StateError> {
        self.state.clear_scoped(ObjectKind::Buffer, Store::clear_buffers)
    }
}

/// Participants, scoped by network and present in buffers.
#[derive(Debug, Clone, Copy)]
pub struct Participants<'a> {
    pub(crate) state: &'a SyncState,
}

impl Participants<'_> {
    /// Record `nick` as present in `buffer_id`.
    ///
    /// Returns `false` if already present, or if the buffer is not live or
    /// belongs to another network.
    pub fn join(
        &self,
        network_id: NetworkId,
        nick: &str,
        buffer_id: BufferId,
    ) -> Result<bool, StateError> {
        self.state.write("participants.join", |store, out| {
            store.join_participant(network_id, nick, buffer_id, out)
        })
    }

    /// Record `nick` as gone from `buffer_id`. A participant leaving its
    /// last buffer is dropped. Returns `false` if it was not present.
    pub fn leave(
        &self,
        network_id: NetworkId,
        nick: &str,
        buffer_id: BufferId,
    ) -> Result<bool, StateError> {
        self.state.write("participants.leave", |store, out| {
            store.leave_participant(network_id, nick, buffer_id, out)
        })
    }

    /// Apply a nick change. Returns `false` if `old` is unknown or `new` is
    /// taken by someone else.
    pub fn rename(&self, network_id: NetworkId, old: &str, new: &str) -> Result<bool, StateError> {
        self.state.write("participants.rename", |store, out| {
            store.rename_participant(network_id, old, new, out)
        })
    }

    /// Update hostmask (when given) and modes. Returns `false` if unknown.
    pub fn update(
        &self,
        network_id: NetworkId,
        nick: &str,
        hostmask: Option<String>,
        modes: String,
    ) -> Result<bool, StateError> {
        self.state.write("participants.update", |store, out| {
            store.update_participant(network_id, nick, hostmask, modes, out)
        })
    }

    /// Participant by nick, case-insensitively. `None` if unknown.
    pub fn get(&self, network_id: NetworkId, nick: &str) -> Result<Option<Participant>, StateError> {
        self.state
            .read("participants.get", |store| store.participants.get(network_id, nick).cloned())
    }

    /// Participants on a network, sorted by folded nick.
    pub fn on_network(&self, network_id: NetworkId) -> Result<Vec<Participant>, StateError> {
        self.state.read("participants.on_network", |store| {
            sorted(store.participants.on_network(network_id).cloned().collect())
        })
    }

    /// Participants present in a buffer, sorted by folded nick.
    pub fn in_buffer(&self, buffer_id: BufferId) -> Result<Vec<Participant>, StateError> {
        self.state.read("participants.in_buffer", |store| {
            store
                .registry
                .get::<Buffer>(buffer_id)
                .map(|buffer| {
                    let present = store.participants.in_buffer(buffer.network_id, buffer_id);
                    sorted(present.cloned().collect())
                })
                .unwrap_or_default()
        })
    }

    /// Total number of participants.
    pub fn len(&self) -> Result<usize, StateError> {
        self.state.read("participants.len", |store| store.participants.len())
    }

    /// Check if no participant is known.
    pub fn is_empty(&self) -> Result<bool, StateError> {
        self.len().map(|len| len == 0)
    }
}

fn sorted(mut participants: Vec<Participant>) -> Vec<Participant> {
    participants.sort_by_cached_key(|p| fold_nick(&p.nick));
    participants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::BufferKind;

    fn channel(id: u32, network: u32, name: &str) -> Buffer {
        Buffer::new(BufferId(id), NetworkId(network), BufferKind::Channel, name)
    }

    #[test]
    fn put_buffer_indexes_by_network() {
        let mut store = Store::default();
        let mut out = Outbox::new();
        store.put_buffer(channel(1, 1, "#a"), &mut out);
        store.put_buffer(channel(2, 1, "#b"), &mut out);
        store.put_buffer(channel(3, 2, "#c"), &mut out);

        let on_one: Vec<_> = store.buffers_by_network[&NetworkId(1)].iter().collect();
        assert_eq!(on_one, vec![BufferId(1), BufferId(2)]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn moving_buffer_relinks_and_drops_presence() {
        let mut store = Store::default();
        let mut out = Outbox::new();
        store.put_buffer(channel(1, 1, "#a"), &mut out);
        assert!(store.join_participant(NetworkId(1), "alice", BufferId(1), &mut out));

        store.put_buffer(channel(1, 2, "#a"), &mut out);

        assert!(!store.buffers_by_network.contains_key(&NetworkId(1)));
        assert_eq!(store.buffers_by_network[&NetworkId(2)].len(), 1);
        assert!(store.participants.is_empty());
    }

    #[test]
    fn cascade_orders_network_event_last() {
        let mut store = Store::default();
        let mut out = Outbox::new();
        store.put_network(Network::new(NetworkId(1), "libera"), &mut out);
        store.put_buffer(channel(1, 1, "#a"), &mut out);
        store.put_buffer(channel(2, 1, "#b"), &mut out);
        out.clear();

        assert!(store.remove_network(NetworkId(1), &mut out));
        assert_eq!(out, vec![
            Event::removed(BufferId(1)),
            Event::removed(BufferId(2)),
            Event::removed(NetworkId(1)),
        ]);
        assert!(store.registry.is_empty());
        assert!(store.buffers_by_network.is_empty());
    }

    #[test]
    fn removing_unknown_network_leaves_orphans() {
        let mut store = Store::default();
        let mut out = Outbox::new();
        store.put_buffer(channel(1, 9, "#orphan"), &mut out);
        out.clear();

        assert!(!store.remove_network(NetworkId(9), &mut out));
        assert!(out.is_empty());
        assert!(store.registry.get::<Buffer>(BufferId(1)).is_some());
    }

    #[test]
    fn join_requires_live_buffer_on_same_network() {
        let mut store = Store::default();
        let mut out = Outbox::new();
        store.put_buffer(channel(1, 1, "#a"), &mut out);
        out.clear();

        assert!(!store.join_participant(NetworkId(1), "bob", BufferId(2), &mut out));
        assert!(!store.join_participant(NetworkId(2), "bob", BufferId(1), &mut out));
        assert!(out.is_empty());
        assert!(store.join_participant(NetworkId(1), "bob", BufferId(1), &mut out));
        assert_eq!(out, vec![Event::put(EntityKey::participant(NetworkId(1), "bob"), true)]);
    }

    #[test]
    fn update_buffer_reverts_kind_change() {
        let mut store = Store::default();
        let mut out = Outbox::new();
        store.put_buffer(channel(1, 1, "#a"), &mut out);

        assert!(store.update_buffer(
            BufferId(1),
            |b| {
                b.kind = BufferKind::Query;
                b.name = "#renamed".into();
            },
            &mut out
        ));

        let stored = store.registry.get::<Buffer>(BufferId(1));
        assert_eq!(stored.map(|b| (b.kind, b.name.as_str())), Some((BufferKind::Channel, "#renamed")));
    }

    #[test]
    fn clear_networks_takes_buffers_but_not_identities() {
        let mut store = Store::default();
        let mut out = Outbox::new();
        store.put_identity(Identity::new(IdentityId(1), "default"), &mut out);
        store.put_network(Network::new(NetworkId(1), "libera"), &mut out);
        store.put_buffer(channel(1, 1, "#a"), &mut out);
        store.put_buffer(channel(2, 5, "#orphan"), &mut out);

        assert_eq!(store.clear_networks(), 3);
        assert_eq!(store.registry.len(), 1);
        assert!(store.buffer_order.is_empty());
    }
}
