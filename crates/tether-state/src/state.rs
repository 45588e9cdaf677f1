//! The sync state context.
//!
//! [`SyncState`] bundles the store (registry plus collection indices) and the
//! event bus. It is created when a session starts, handed to the connection
//! session and to presentation components, and torn down when the session
//! ends. Clones share the same state.
//!
//! # Concurrency
//!
//! One `RwLock` guards the whole store. Writers (the connection session)
//! take it exclusively for the full extent of a change, cascades included,
//! and enqueue the resulting events before releasing it. Readers share it,
//! so every read is a consistent snapshot. Event delivery runs after the
//! lock is released.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::RwLock;

use crate::{
    bus::{BusEvent, ClearScope, CollectionCleared, ConnectionStatusChanged, Event, EventBus, SubscriptionId},
    collection::{Buffers, Identities, Networks, Outbox, Participants, Store},
    color::Palette,
    entity::{Buffer, Identity, Network, NetworkConnectionState, Participant},
    error::StateError,
    id::{BufferId, IdentityId, NetworkId, ObjectKey, ObjectKind},
    registry::Entity,
    session::{ConnectionStatus, SessionSink},
};

/// Pending deliveries above which publishing logs a warning.
const DEFAULT_BUS_BACKLOG_WARN: usize = 1024;

/// Sync state configuration.
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Palette used by [`SyncState::nick_color`].
    pub palette: Palette,
    /// Pending deliveries above which publishing logs a warning.
    pub bus_backlog_warn: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { palette: Palette::default(), bus_backlog_warn: DEFAULT_BUS_BACKLOG_WARN }
    }
}

/// Consistent copy of the whole state, taken under one read lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Session connection status.
    pub status: ConnectionStatus,
    /// Identities in observation order.
    pub identities: Vec<Identity>,
    /// Networks in observation order.
    pub networks: Vec<Network>,
    /// Buffers in observation order, orphans included.
    pub buffers: Vec<Buffer>,
    /// Participants sorted by network, then folded nick.
    pub participants: Vec<Participant>,
    /// Every live registry key.
    pub registry_keys: BTreeSet<ObjectKey>,
    /// Raw contents of each ordering index.
    pub order: BTreeMap<ObjectKind, Vec<u32>>,
    /// Raw contents of the buffer-by-network index.
    pub buffers_by_network: BTreeMap<NetworkId, Vec<BufferId>>,
}

impl StateSnapshot {
    /// Network by id.
    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.iter().find(|n| n.id == id)
    }

    /// Buffer by id.
    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.id == id)
    }

    /// Buffers whose network is live.
    pub fn ready_buffers(&self) -> impl Iterator<Item = &Buffer> + '_ {
        self.buffers.iter().filter(|b| self.network(b.network_id).is_some())
    }

    /// Check if nothing is live.
    pub fn is_empty(&self) -> bool {
        self.registry_keys.is_empty() && self.participants.is_empty()
    }
}

struct Shared {
    store: RwLock<Store>,
    bus: EventBus,
    torn_down: AtomicBool,
    config: StateConfig,
}

/// Live mirror of the core's state plus its change bus.
#[derive(Clone)]
pub struct SyncState {
    shared: Arc<Shared>,
}

impl fmt::Debug for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncState")
            .field("torn_down", &self.is_torn_down())
            .field("bus", &self.shared.bus)
            .finish_non_exhaustive()
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    /// Create an empty state with default configuration.
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    /// Create an empty state.
    pub fn with_config(config: StateConfig) -> Self {
        let bus = EventBus::new(config.bus_backlog_warn);
        Self {
            shared: Arc::new(Shared {
                store: RwLock::new(Store::default()),
                bus,
                torn_down: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Identity collection.
    pub fn identities(&self) -> Identities<'_> {
        Identities { state: self }
    }

    /// Network collection.
    pub fn networks(&self) -> Networks<'_> {
        Networks { state: self }
    }

    /// Buffer collection.
    pub fn buffers(&self) -> Buffers<'_> {
        Buffers { state: self }
    }

    /// Participant collection.
    pub fn participants(&self) -> Participants<'_> {
        Participants { state: self }
    }

    /// The change bus.
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Configuration this state was built with.
    pub fn config(&self) -> &StateConfig {
        &self.shared.config
    }

    /// Subscribe a typed handler.
    pub fn subscribe<E, F>(&self, handler: F) -> Result<SubscriptionId, StateError>
    where
        E: BusEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.ensure_live("subscribe")?;
        Ok(self.shared.bus.subscribe(handler))
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    /// Subscribe and capture current state in one step.
    ///
    /// Registration and the snapshot happen under the store lock, so the
    /// handler receives exactly the changes the snapshot does not contain.
    pub fn subscribe_with_snapshot<E, F>(
        &self,
        handler: F,
    ) -> Result<(SubscriptionId, StateSnapshot), StateError>
    where
        E: BusEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.read("subscribe_with_snapshot", |store| {
            let id = self.shared.bus.subscribe(handler);
            (id, store.snapshot())
        })
    }

    /// Consistent copy of the whole state.
    pub fn snapshot(&self) -> Result<StateSnapshot, StateError> {
        self.read("snapshot", Store::snapshot)
    }

    /// Last session connection status.
    pub fn connection_status(&self) -> Result<ConnectionStatus, StateError> {
        self.read("connection_status", |store| store.status)
    }

    /// Record a session status change.
    ///
    /// On `Disconnected` every collection is cleared first; subscribers see
    /// [`CollectionCleared`] (when anything was live) before
    /// [`ConnectionStatusChanged`]. A repeated status publishes nothing.
    pub fn set_connection_status(
        &self,
        status: ConnectionStatus,
        reason: Option<String>,
    ) -> Result<(), StateError> {
        self.write("set_connection_status", |store, out| {
            let previous = std::mem::replace(&mut store.status, status);

            if status == ConnectionStatus::Disconnected {
                push_cleared(out, ClearScope::All, store.clear_all());
            }

            if previous != status {
                tracing::info!(%previous, %status, reason = ?reason, "Connection status changed");
                out.push(Event::ConnectionStatusChanged(ConnectionStatusChanged { status, reason }));
            }
        })
    }

    /// Empty every collection at once. Returns how many objects were live.
    ///
    /// Idempotent: clearing an empty state publishes nothing.
    pub fn clear(&self) -> Result<usize, StateError> {
        self.write("clear", |store, out| {
            let removed = store.clear_all();
            push_cleared(out, ClearScope::All, removed);
            removed
        })
    }

    /// Make this state unusable.
    ///
    /// Clears everything and drops all subscriptions. Deliveries already
    /// queued still reach the handlers they were queued for. Every later
    /// call on this state or its clones fails with [`StateError::TornDown`].
    pub fn teardown(&self) -> Result<(), StateError> {
        let removed = {
            let mut store = self.shared.store.write();
            if self.shared.torn_down.swap(true, Ordering::SeqCst) {
                return Err(StateError::TornDown { operation: "teardown" });
            }
            store.status = ConnectionStatus::Disconnected;
            store.clear_all()
        };
        self.shared.bus.unsubscribe_all();
        self.shared.bus.dispatch_pending();
        tracing::info!(removed, "Sync state torn down");
        Ok(())
    }

    /// Whether [`Self::teardown`] was called.
    pub fn is_torn_down(&self) -> bool {
        self.shared.torn_down.load(Ordering::SeqCst)
    }

    /// RGB sender color for a nick from the configured palette.
    pub fn nick_color(&self, nick: &str) -> u32 {
        self.shared.config.palette.color_for_nick(nick)
    }

    /// Id-based handle that reads through to the live instance.
    pub fn handle<T: Entity>(&self, id: T::Id) -> EntityHandle<T> {
        EntityHandle { state: self.clone(), id, _entity: PhantomData }
    }

    fn ensure_live(&self, operation: &'static str) -> Result<(), StateError> {
        if self.is_torn_down() { Err(StateError::TornDown { operation }) } else { Ok(()) }
    }

    /// Run `f` under the shared lock.
    pub(crate) fn read<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Store) -> R,
    ) -> Result<R, StateError> {
        let store = self.shared.store.read();
        self.ensure_live(operation)?;
        Ok(f(&store))
    }

    /// Run `f` under the exclusive lock, enqueue what it produced, then
    /// deliver once the lock is released.
    pub(crate) fn write<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Store, &mut Outbox) -> R,
    ) -> Result<R, StateError> {
        let result = {
            let mut store = self.shared.store.write();
            self.ensure_live(operation)?;
            let mut out = Outbox::new();
            let result = f(&mut store, &mut out);
            for event in out {
                self.shared.bus.enqueue(event);
            }
            result
        };
        self.shared.bus.dispatch_pending();
        Ok(result)
    }

    pub(crate) fn clear_scoped(
        &self,
        kind: ObjectKind,
        clear: impl FnOnce(&mut Store) -> usize,
    ) -> Result<usize, StateError> {
        self.write("clear_scoped", |store, out| {
            let removed = clear(store);
            push_cleared(out, ClearScope::Collection(kind), removed);
            removed
        })
    }
}

fn push_cleared(out: &mut Outbox, scope: ClearScope, removed: usize) {
    if removed == 0 {
        return;
    }
    tracing::info!(?scope, removed, "Collections cleared");
    out.push(Event::CollectionCleared(CollectionCleared { scope, removed }));
}

/// Id held by a consumer, resolved against the live store on every read.
///
/// A merge for the same id is visible through an existing handle; once the
/// entity is removed the handle resolves to `None`.
pub struct EntityHandle<T: Entity> {
    state: SyncState,
    id: T::Id,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for EntityHandle<T> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone(), id: self.id, _entity: PhantomData }
    }
}

impl<T: Entity> fmt::Debug for EntityHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle").field("kind", &T::KIND).field("id", &self.id).finish()
    }
}

impl<T: Entity> EntityHandle<T> {
    /// Id this handle refers to.
    pub fn id(&self) -> T::Id {
        self.id
    }

    /// Current value. `None` once removed.
    pub fn get(&self) -> Result<Option<T>, StateError> {
        self.state.read("handle.get", |store| store.registry.get::<T>(self.id).cloned())
    }

    /// Whether the entity is live.
    pub fn is_live(&self) -> Result<bool, StateError> {
        self.state.read("handle.is_live", |store| store.registry.contains(T::key(self.id)))
    }
}

impl SessionSink for SyncState {
    fn on_identity_synced(&self, identity: Identity) -> Result<(), StateError> {
        self.identities().put(identity).map(drop)
    }

    fn on_network_synced(&self, network: Network) -> Result<(), StateError> {
        self.networks().put(network).map(drop)
    }

    fn on_buffer_synced(&self, buffer: Buffer) -> Result<(), StateError> {
        self.buffers().put(buffer).map(drop)
    }

    fn on_participant_joined(
        &self,
        network_id: NetworkId,
        nick: &str,
        buffer_id: BufferId,
    ) -> Result<(), StateError> {
        self.participants().join(network_id, nick, buffer_id).map(drop)
    }

    fn on_participant_left(
        &self,
        network_id: NetworkId,
        nick: &str,
        buffer_id: BufferId,
    ) -> Result<(), StateError> {
        self.participants().leave(network_id, nick, buffer_id).map(drop)
    }

    fn on_participant_renamed(
        &self,
        network_id: NetworkId,
        old_nick: &str,
        new_nick: &str,
    ) -> Result<(), StateError> {
        self.participants().rename(network_id, old_nick, new_nick).map(drop)
    }

    fn on_participant_updated(
        &self,
        network_id: NetworkId,
        nick: &str,
        hostmask: Option<String>,
        modes: String,
    ) -> Result<(), StateError> {
        self.participants().update(network_id, nick, hostmask, modes).map(drop)
    }

    fn on_removed(&self, kind: ObjectKind, id: u32) -> Result<(), StateError> {
        let removed = match kind {
            ObjectKind::Identity => self.identities().remove(IdentityId(id))?,
            ObjectKind::Network => self.networks().remove(NetworkId(id))?,
            ObjectKind::Buffer => self.buffers().remove(BufferId(id))?,
        };
        if !removed {
            tracing::debug!(%kind, id, "Removal of unknown object ignored");
        }
        Ok(())
    }

    fn on_topic_changed(
        &self,
        buffer_id: BufferId,
        topic: Option<String>,
    ) -> Result<(), StateError> {
        self.buffers().set_topic(buffer_id, topic).map(drop)
    }

    fn on_network_state_changed(
        &self,
        network_id: NetworkId,
        state: NetworkConnectionState,
    ) -> Result<(), StateError> {
        self.networks().set_state(network_id, state).map(drop)
    }

    fn on_buffer_activity(
        &self,
        buffer_id: BufferId,
        timestamp: u64,
        highlight: bool,
    ) -> Result<(), StateError> {
        self.buffers().record_activity(buffer_id, timestamp, highlight).map(drop)
    }

    fn on_buffer_read(&self, buffer_id: BufferId) -> Result<(), StateError> {
        self.buffers().mark_read(buffer_id).map(drop)
    }

    fn on_connection_status_changed(
        &self,
        status: ConnectionStatus,
        reason: Option<String>,
    ) -> Result<(), StateError> {
        self.set_connection_status(status, reason)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::{bus::EntityRemoved, entity::BufferKind, id::EntityKey};

    #[test]
    fn handle_observes_merge() {
        let state = SyncState::new();
        state.networks().put(Network::new(NetworkId(1), "libera")).ok();
        let handle = state.handle::<Network>(NetworkId(1));

        state.networks().put(Network::new(NetworkId(1), "Libera.Chat")).ok();

        let name = handle.get().ok().flatten().map(|n| n.name);
        assert_eq!(name.as_deref(), Some("Libera.Chat"));

        state.networks().remove(NetworkId(1)).ok();
        assert_eq!(handle.get(), Ok(None));
        assert_eq!(handle.is_live(), Ok(false));
    }

    #[test]
    fn teardown_is_distinct_from_absence() {
        let state = SyncState::new();
        assert_eq!(state.buffers().get(BufferId(1)), Ok(None));

        assert!(state.teardown().is_ok());
        assert!(state.is_torn_down());

        let err = state.buffers().get(BufferId(1));
        assert!(matches!(err, Err(StateError::TornDown { operation: "buffers.get" })));
        assert!(state.teardown().is_err());
        assert!(state.clone().snapshot().is_err());
    }

    #[test]
    fn teardown_drops_subscriptions() {
        let state = SyncState::new();
        state.subscribe::<EntityRemoved, _>(|_| {}).ok();
        assert_eq!(state.bus().subscriber_count(), 1);

        state.teardown().ok();
        assert_eq!(state.bus().subscriber_count(), 0);
        assert!(state.subscribe::<EntityRemoved, _>(|_| {}).is_err());
    }

    #[test]
    fn teardown_delivers_queued_events() {
        let state = SyncState::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        state.subscribe::<EntityRemoved, _>(move |e| sink.lock().push(e.key.clone())).ok();

        state.bus().enqueue(Event::removed(BufferId(7)));
        assert_eq!(state.bus().pending_len(), 1);

        state.teardown().ok();

        assert_eq!(state.bus().pending_len(), 0);
        assert_eq!(*seen.lock(), vec![EntityKey::Buffer(BufferId(7))]);
    }

    #[test]
    fn handler_can_read_state_during_delivery() {
        let state = SyncState::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reader = state.clone();
        let sink = Arc::clone(&seen);
        state
            .subscribe::<crate::bus::EntityPut, _>(move |event| {
                if let EntityKey::Buffer(id) = event.key {
                    let ready = reader.buffers().is_ready(id).unwrap_or(false);
                    sink.lock().push((id, ready));
                }
            })
            .ok();

        state.buffers().put(Buffer::new(BufferId(1), NetworkId(1), BufferKind::Channel, "#a")).ok();
        state.networks().put(Network::new(NetworkId(1), "libera")).ok();
        state.buffers().put(Buffer::new(BufferId(1), NetworkId(1), BufferKind::Channel, "#a")).ok();

        assert_eq!(*seen.lock(), vec![(BufferId(1), false), (BufferId(1), true)]);
    }

    #[test]
    fn default_config() {
        let config = StateConfig::default();
        assert_eq!(config.bus_backlog_warn, DEFAULT_BUS_BACKLOG_WARN);
        assert_eq!(config.palette, crate::color::DEFAULT_PALETTE);

        let state = SyncState::new();
        assert_eq!(state.nick_color("bob"), crate::color::DEFAULT_PALETTE.color(0));
    }
}
