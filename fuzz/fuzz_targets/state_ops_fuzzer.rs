//! Fuzz target for sync state operation sequences
//!
//! Drives a real `SyncState` with arbitrary session events and checks it
//! against the reference model.
//!
//! # Invariants
//!
//! - Observable state equals the model after every operation
//! - Structural invariants hold after every operation
//! - Nothing is published for a removal of an absent object
//! - No delivery is left queued once a call returns

#![no_main]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use libfuzzer_sys::fuzz_target;
use tether_harness::{
    InvariantRegistry, ModelState, ObservableState, Operation, apply_operation,
};
use tether_state::SyncState;

fuzz_target!(|ops: Vec<Operation>| {
    let state = SyncState::new();
    let mut model = ModelState::new();
    let invariants = InvariantRegistry::standard();

    let published = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&published);
    state.bus().subscribe_all(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for op in ops.iter().take(256) {
        let before = state.snapshot().expect("state is live");
        let published_before = published.load(Ordering::SeqCst);

        model.apply(op);
        apply_operation(&state, op).expect("operation on live state");

        assert_eq!(state.bus().pending_len(), 0, "delivery left queued after {op:?}");

        let snapshot = state.snapshot().expect("state is live");
        if let Err(violations) = invariants.check_all(&snapshot) {
            panic!("invariant violation after {op:?}: {violations:?}");
        }

        assert_eq!(
            ObservableState::from_snapshot(&snapshot),
            model.observable_state(),
            "model divergence after {op:?}"
        );

        let is_removal = matches!(
            op,
            Operation::RemoveIdentity { .. }
                | Operation::RemoveNetwork { .. }
                | Operation::RemoveBuffer { .. }
        );
        if is_removal && before == snapshot {
            assert_eq!(
                published.load(Ordering::SeqCst),
                published_before,
                "event published for absent object: {op:?}"
            );
        }
    }
});
