//! Model-based property tests.
//!
//! Random session event sequences are applied to the reference model and to
//! a real `SyncState`. Observable state must match after every operation,
//! and the store's structural invariants must hold throughout.
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelState     SyncState       Compare
//!      (reference)    (real)          Observable
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use tether_harness::{
    InvariantRegistry, ModelBufferKind, ModelState, ObservableState, Operation, apply_operation,
};
use tether_state::{EntityKey, EntityRemoved, NetworkId, SyncState};

fn kind_strategy() -> impl Strategy<Value = ModelBufferKind> {
    prop_oneof![
        1 => Just(ModelBufferKind::Status),
        4 => Just(ModelBufferKind::Channel),
        2 => Just(ModelBufferKind::Query),
    ]
}

/// Strategy for object syncs, removals and buffer updates.
fn object_strategy() -> impl Strategy<Value = Operation> {
    let id = any::<u8>();

    prop_oneof![
        2 => id.clone().prop_map(|id| Operation::PutIdentity { id }),
        1 => id.clone().prop_map(|id| Operation::RemoveIdentity { id }),
        4 => (id.clone(), any::<u8>()).prop_map(|(id, name)| Operation::PutNetwork { id, name }),
        2 => id.clone().prop_map(|id| Operation::RemoveNetwork { id }),
        6 => (id.clone(), id.clone(), kind_strategy()).prop_map(|(id, network_id, kind)| {
            Operation::PutBuffer { id, network_id, kind }
        }),
        2 => id.clone().prop_map(|id| Operation::RemoveBuffer { id }),
        2 => (id.clone(), any::<Option<u8>>())
            .prop_map(|(buffer_id, topic)| Operation::SetTopic { buffer_id, topic }),
        3 => (id.clone(), any::<u16>(), any::<bool>()).prop_map(|(buffer_id, timestamp, highlight)| {
            Operation::Activity { buffer_id, timestamp, highlight }
        }),
        1 => id.prop_map(|buffer_id| Operation::MarkRead { buffer_id }),
    ]
}

/// Strategy for participant presence and session-wide events.
fn presence_strategy() -> impl Strategy<Value = Operation> {
    let id = any::<u8>();
    let nick = any::<u8>();

    prop_oneof![
        6 => (id.clone(), nick.clone(), id.clone()).prop_map(|(network_id, nick, buffer_id)| {
            Operation::Join { network_id, nick, buffer_id }
        }),
        3 => (id.clone(), nick.clone(), id.clone()).prop_map(|(network_id, nick, buffer_id)| {
            Operation::Leave { network_id, nick, buffer_id }
        }),
        2 => (id, nick.clone(), nick).prop_map(|(network_id, old, new)| {
            Operation::Rename { network_id, old, new }
        }),
        1 => Just(Operation::Clear),
        1 => Just(Operation::ClearBuffers),
        1 => Just(Operation::Connect),
        1 => Just(Operation::Disconnect),
    ]
}

/// Strategy for generating operations, weighted towards syncs and presence.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        23 => object_strategy(),
        15 => presence_strategy(),
    ]
}

proptest! {
    /// Real state matches the model after every operation.
    #[test]
    fn prop_model_matches_real(ops in prop::collection::vec(operation_strategy(), 0..80)) {
        let mut model = ModelState::new();
        let real = SyncState::new();

        for (i, op) in ops.iter().enumerate() {
            model.apply(op);
            prop_assert!(apply_operation(&real, op).is_ok());

            let snapshot = real.snapshot().unwrap();
            prop_assert_eq!(
                ObservableState::from_snapshot(&snapshot),
                model.observable_state(),
                "Divergence at operation {}: {:?}",
                i,
                op
            );
        }
    }

    /// Structural invariants hold after any operation sequence.
    #[test]
    fn prop_invariants_hold(ops in prop::collection::vec(operation_strategy(), 0..120)) {
        let state = SyncState::new();
        let invariants = InvariantRegistry::standard();

        for op in ops {
            prop_assert!(apply_operation(&state, &op).is_ok());

            let snapshot = state.snapshot().unwrap();
            let result = invariants.check_all(&snapshot);
            prop_assert!(result.is_ok(), "Invariant violation after {:?}: {:?}", op, result);
        }
    }

    /// Every successful removal publishes exactly one event per removed
    /// object, and a network's event follows those of its buffers.
    #[test]
    fn prop_removal_events_match_cascade(ops in prop::collection::vec(operation_strategy(), 0..80)) {
        let state = SyncState::new();
        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&removed);
        state.subscribe::<EntityRemoved, _>(move |e| sink.lock().push(e.key.clone())).unwrap();

        for op in ops {
            let Operation::RemoveNetwork { id } = op else {
                prop_assert!(apply_operation(&state, &op).is_ok());
                continue;
            };

            let network_id = NetworkId(tether_harness::model::model_id(id));
            let live = state.networks().get(network_id).unwrap().is_some();
            let buffers = state.networks().buffer_ids(network_id).unwrap();
            removed.lock().clear();

            prop_assert!(apply_operation(&state, &op).is_ok());

            let events: Vec<EntityKey> = removed.lock().iter()
                .filter(|key| !matches!(key, EntityKey::Participant { .. }))
                .cloned()
                .collect();
            if live {
                let mut expected: Vec<EntityKey> = buffers.into_iter().map(EntityKey::from).collect();
                expected.push(EntityKey::from(network_id));
                prop_assert_eq!(events, expected);
            } else {
                prop_assert!(events.is_empty());
            }
        }
    }
}

#[test]
fn disconnect_then_resync_matches_model() {
    let ops = [
        Operation::Connect,
        Operation::PutBuffer { id: 1, network_id: 1, kind: ModelBufferKind::Channel },
        Operation::PutNetwork { id: 1, name: 0 },
        Operation::Join { network_id: 1, nick: 0, buffer_id: 1 },
        Operation::Join { network_id: 1, nick: 1, buffer_id: 1 },
        Operation::Rename { network_id: 1, old: 1, new: 2 },
        Operation::Disconnect,
        Operation::Connect,
        Operation::PutNetwork { id: 1, name: 1 },
    ];

    let mut model = ModelState::new();
    let real = SyncState::new();
    for op in &ops {
        model.apply(op);
        apply_operation(&real, op).unwrap();
    }

    let observed = ObservableState::from_snapshot(&real.snapshot().unwrap());
    assert_eq!(observed, model.observable_state());
    assert_eq!(observed.networks, vec![(1, "net1".to_string())]);
    assert!(observed.buffers.is_empty());
}
