//! Concurrent access tests
//!
//! One writer thread plays the connection session while readers and bus
//! handlers observe. Readers must never see a half-applied cascade.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use tether_state::{
    Buffer, BufferId, BufferKind, EntityKey, EntityRemoved, Network, NetworkId, SyncState,
};

const NETWORKS: u32 = 4;
const BUFFERS_PER_NETWORK: u32 = 8;
const ROUNDS: usize = 200;

fn populate(state: &SyncState, network: u32) {
    state.networks().put(Network::new(NetworkId(network), format!("net{network}"))).unwrap();
    for i in 0..BUFFERS_PER_NETWORK {
        let id = network * 100 + i;
        state
            .buffers()
            .put(Buffer::new(BufferId(id), NetworkId(network), BufferKind::Channel, format!("#c{id}")))
            .unwrap();
    }
}

/// Networks are put before their buffers and removed in one cascade, so a
/// snapshot never holds a buffer whose network is missing.
#[test]
fn readers_never_observe_partial_cascade() {
    let state = SyncState::new();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            for round in 0..ROUNDS {
                let network = (round as u32 % NETWORKS) + 1;
                populate(&state, network);
                state.networks().remove(NetworkId(network)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        for _ in 0..3 {
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let snapshot = state.snapshot().unwrap();
                    for buffer in &snapshot.buffers {
                        assert!(
                            snapshot.network(buffer.network_id).is_some(),
                            "buffer {} visible without network {}",
                            buffer.id,
                            buffer.network_id
                        );
                    }
                }
            });
        }
    });

    assert!(state.buffers().is_empty().unwrap());
    assert!(state.networks().is_empty().unwrap());
}

#[test]
fn every_cascade_removal_is_delivered_once() {
    let state = SyncState::new();
    let removed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&removed);
    state.subscribe::<EntityRemoved, _>(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    thread::scope(|s| {
        for network in 1..=NETWORKS {
            let state = &state;
            s.spawn(move || {
                for _ in 0..10 {
                    populate(state, network);
                    state.networks().remove(NetworkId(network)).unwrap();
                }
            });
        }
    });

    let per_round = (BUFFERS_PER_NETWORK + 1) as usize;
    assert_eq!(removed.load(Ordering::SeqCst), NETWORKS as usize * 10 * per_round);
    assert_eq!(state.bus().pending_len(), 0);
}

/// Handlers run after the writer releases the store, so a network removal
/// is delivered only once the whole cascade is visible.
#[test]
fn handler_observes_completed_cascade() {
    let state = SyncState::new();
    let stale = Arc::new(AtomicUsize::new(0));

    let reader = state.clone();
    let counter = Arc::clone(&stale);
    state
        .subscribe::<EntityRemoved, _>(move |event| {
            if let EntityKey::Network(id) = event.key {
                let network_live = reader.networks().get(id).unwrap().is_some();
                let buffers = reader.networks().buffer_ids(id).unwrap();
                if network_live || !buffers.is_empty() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
        .unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for round in 0..ROUNDS {
                let network = (round as u32 % NETWORKS) + 1;
                populate(&state, network);
                state.networks().remove(NetworkId(network)).unwrap();
            }
        });
    });

    assert_eq!(stale.load(Ordering::SeqCst), 0);
}
