//! In-process event bus.
//!
//! Handlers subscribe to one event kind with a typed callback and get back a
//! [`SubscriptionId`]. Publishing happens in two steps: [`EventBus::enqueue`]
//! appends the event together with the handlers subscribed at that moment,
//! then [`EventBus::dispatch_pending`] runs deliveries in FIFO order.
//! [`crate::SyncState`] enqueues while holding its store lock and dispatches
//! after releasing it, so handlers may read state and always observe the
//! store at least as new as the event they are handling.
//!
//! Only one thread delivers at a time. A dispatch attempt that finds another
//! dispatcher active (including a handler publishing re-entrantly) returns
//! immediately; the active dispatcher drains what was queued. Unsubscribing
//! stops future enqueues but never retracts deliveries already queued.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    id::{EntityKey, ObjectKind},
    session::ConnectionStatus,
};

/// Discriminant of [`Event`], used to route subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`EntityPut`]
    EntityPut,
    /// [`EntityRemoved`]
    EntityRemoved,
    /// [`CollectionCleared`]
    CollectionCleared,
    /// [`ConnectionStatusChanged`]
    ConnectionStatusChanged,
}

/// An entity was created or changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPut {
    /// Entity that changed.
    pub key: EntityKey,
    /// `true` on first sighting, `false` on merge or update.
    pub created: bool,
}

/// An entity is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRemoved {
    /// Entity that was removed.
    pub key: EntityKey,
}

/// Which collections a clear covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Every collection (full disconnect or teardown).
    All,
    /// One collection and whatever depends on it.
    Collection(ObjectKind),
}

/// One or more collections were emptied at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionCleared {
    /// Collections that were cleared.
    pub scope: ClearScope,
    /// Number of registry objects dropped.
    pub removed: usize,
}

/// The session connection status changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatusChanged {
    /// New status.
    pub status: ConnectionStatus,
    /// Cause reported by the session.
    pub reason: Option<String>,
}

/// Change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// See [`EntityPut`].
    EntityPut(EntityPut),
    /// See [`EntityRemoved`].
    EntityRemoved(EntityRemoved),
    /// See [`CollectionCleared`].
    CollectionCleared(CollectionCleared),
    /// See [`ConnectionStatusChanged`].
    ConnectionStatusChanged(ConnectionStatusChanged),
}

impl Event {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::EntityPut(_) => EventKind::EntityPut,
            Self::EntityRemoved(_) => EventKind::EntityRemoved,
            Self::CollectionCleared(_) => EventKind::CollectionCleared,
            Self::ConnectionStatusChanged(_) => EventKind::ConnectionStatusChanged,
        }
    }

    /// Entity put notification.
    pub fn put(key: impl Into<EntityKey>, created: bool) -> Self {
        Self::EntityPut(EntityPut { key: key.into(), created })
    }

    /// Entity removal notification.
    pub fn removed(key: impl Into<EntityKey>) -> Self {
        Self::EntityRemoved(EntityRemoved { key: key.into() })
    }
}

/// Payload type that can be subscribed to.
pub trait BusEvent: Clone + Send + Sync + 'static {
    /// Kind this payload is delivered under.
    const KIND: EventKind;

    /// Borrow the payload out of an event. `None` for other kinds.
    fn from_event(event: &Event) -> Option<&Self>;
}

macro_rules! impl_bus_event {
    ($ty:ident) => {
        impl BusEvent for $ty {
            const KIND: EventKind = EventKind::$ty;

            fn from_event(event: &Event) -> Option<&Self> {
                match event {
                    Event::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_bus_event!(EntityPut);
impl_bus_event!(EntityRemoved);
impl_bus_event!(CollectionCleared);
impl_bus_event!(ConnectionStatusChanged);

/// Handle returned by subscribe calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    /// `None` receives every kind.
    kind: Option<EventKind>,
    handler: Handler,
}

struct Delivery {
    event: Event,
    handlers: Vec<Handler>,
}

/// Ordered publish/subscribe channel.
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    pending: Mutex<VecDeque<Delivery>>,
    dispatching: Mutex<()>,
    backlog_warn: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.lock().len())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl EventBus {
    /// Create a bus that warns once more than `backlog_warn` deliveries are
    /// queued.
    pub fn new(backlog_warn: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            dispatching: Mutex::new(()),
            backlog_warn,
        }
    }

    /// Subscribe a typed handler to one event kind.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: BusEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Some(E::KIND), move |event| {
            if let Some(payload) = E::from_event(event) {
                handler(payload);
            }
        })
    }

    /// Subscribe a handler to every event kind.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(None, handler)
    }

    /// Subscribe to one event kind through an unbounded channel.
    ///
    /// Deliveries after the receiver is dropped are discarded; call
    /// [`Self::unsubscribe`] to stop them.
    pub fn subscribe_channel<E: BusEvent>(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe::<E, _>(move |payload| {
            if tx.send(payload.clone()).is_err() {
                tracing::trace!("Dropping event for closed channel subscription");
            }
        });
        (id, rx)
    }

    fn register<F>(&self, kind: Option<EventKind>, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber { id, kind, handler: Arc::new(handler) });
        tracing::debug!(subscription = %id, ?kind, "Subscribed");
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    ///
    /// Deliveries already queued for it still run.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        if removed {
            tracing::debug!(subscription = %id, "Unsubscribed");
        }
        removed
    }

    /// Drop every subscription.
    pub fn unsubscribe_all(&self) {
        self.subscribers.lock().clear();
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Queue an event for every handler currently subscribed to its kind.
    pub fn enqueue(&self, event: Event) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.kind.is_none_or(|k| k == kind))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        if handlers.is_empty() {
            return;
        }

        let mut pending = self.pending.lock();
        pending.push_back(Delivery { event, handlers });
        if pending.len() > self.backlog_warn {
            tracing::warn!(pending = pending.len(), threshold = self.backlog_warn, "Event backlog");
        }
    }

    /// Enqueue and deliver.
    pub fn publish(&self, event: Event) {
        self.enqueue(event);
        self.dispatch_pending();
    }

    /// Deliver queued events in order.
    ///
    /// Returns immediately if another dispatch is in progress; that
    /// dispatcher picks up everything queued before it finishes.
    pub fn dispatch_pending(&self) {
        loop {
            let Some(token) = self.dispatching.try_lock() else {
                return;
            };

            while let Some(delivery) = self.pop() {
                for handler in &delivery.handlers {
                    handler(&delivery.event);
                }
            }

            drop(token);

            // An enqueue racing with the release above saw the token held and
            // left its delivery to us.
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    /// Number of queued deliveries.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    fn pop(&self) -> Option<Delivery> {
        self.pending.lock().pop_front()
    }
}
