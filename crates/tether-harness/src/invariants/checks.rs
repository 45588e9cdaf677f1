//! Standard invariant checks.
//!
//! Each check compares two views of the same data that the store maintains
//! separately (registry, ordering indices, secondary indices). A mismatch
//! means an update reached one structure but not the other.

use std::collections::{BTreeSet, HashSet};

use tether_state::{BufferId, ObjectKey, ObjectKind, StateSnapshot, fold_nick};

use super::{Invariant, InvariantResult, Violation};

/// A buffer is ready exactly when its network is live.
///
/// Liveness is taken from the registry keys, readiness from the buffer
/// records, so orphans left behind by a partial cascade are caught.
pub struct ReadyBuffersHaveNetwork;

impl Invariant for ReadyBuffersHaveNetwork {
    fn name(&self) -> &'static str {
        "ready_buffers_have_network"
    }

    fn check(&self, state: &StateSnapshot) -> InvariantResult {
        let ready: HashSet<BufferId> = state.ready_buffers().map(|b| b.id).collect();

        for buffer in &state.buffers {
            let network_live = state
                .registry_keys
                .contains(&ObjectKey::new(ObjectKind::Network, buffer.network_id.get()));
            if network_live != ready.contains(&buffer.id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "buffer {}: network {} live={network_live} but ready={}",
                        buffer.id,
                        buffer.network_id,
                        ready.contains(&buffer.id)
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Ordering indices hold exactly the live ids of their kind, once each.
pub struct OrderIndexMatchesObjects;

impl Invariant for OrderIndexMatchesObjects {
    fn name(&self) -> &'static str {
        "order_index_matches_objects"
    }

    fn check(&self, state: &StateSnapshot) -> InvariantResult {
        let listed: [(ObjectKind, Vec<u32>); 3] = [
            (ObjectKind::Identity, state.identities.iter().map(|i| i.id.get()).collect()),
            (ObjectKind::Network, state.networks.iter().map(|n| n.id.get()).collect()),
            (ObjectKind::Buffer, state.buffers.iter().map(|b| b.id.get()).collect()),
        ];

        for (kind, objects) in listed {
            let order = state.order.get(&kind).cloned().unwrap_or_default();
            let unique: BTreeSet<u32> = order.iter().copied().collect();
            if unique.len() != order.len() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{kind} order has duplicates: {order:?}"),
                });
            }

            let live: BTreeSet<u32> = state
                .registry_keys
                .iter()
                .filter(|key| key.kind == kind)
                .map(|key| key.id)
                .collect();
            if unique != live {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{kind} order {order:?} but registry holds {live:?}"),
                });
            }

            if objects != order {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{kind} listed as {objects:?} but ordered as {order:?}"),
                });
            }
        }
        Ok(())
    }
}

/// The buffer-by-network index agrees with each buffer's network field.
pub struct BufferIndexMatchesBuffers;

impl Invariant for BufferIndexMatchesBuffers {
    fn name(&self) -> &'static str {
        "buffer_index_matches_buffers"
    }

    fn check(&self, state: &StateSnapshot) -> InvariantResult {
        let mut indexed = 0;
        for (network_id, buffer_ids) in &state.buffers_by_network {
            if buffer_ids.is_empty() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("network {network_id}: empty index entry kept"),
                });
            }
            for buffer_id in buffer_ids {
                match state.buffer(*buffer_id) {
                    Some(buffer) if buffer.network_id == *network_id => indexed += 1,
                    Some(buffer) => {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "buffer {buffer_id} indexed under network {network_id} but \
                                 belongs to {}",
                                buffer.network_id
                            ),
                        });
                    },
                    None => {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "network {network_id} indexes removed buffer {buffer_id}"
                            ),
                        });
                    },
                }
            }
        }

        if indexed != state.buffers.len() {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{indexed} buffers indexed, {} live", state.buffers.len()),
            });
        }
        Ok(())
    }
}

/// Participants are present only in live buffers of their own network, and
/// nicks are unique per network after case folding.
pub struct ParticipantsReferenceLiveBuffers;

impl Invariant for ParticipantsReferenceLiveBuffers {
    fn name(&self) -> &'static str {
        "participants_reference_live_buffers"
    }

    fn check(&self, state: &StateSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();

        for participant in &state.participants {
            let key = (participant.network_id, fold_nick(&participant.nick));
            if !seen.insert(key) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "network {}: nick {} appears twice",
                        participant.network_id, participant.nick
                    ),
                });
            }

            if participant.buffers.is_empty() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("participant {} kept without buffers", participant.nick),
                });
            }

            for buffer_id in &participant.buffers {
                let same_network = state
                    .buffer(*buffer_id)
                    .is_some_and(|buffer| buffer.network_id == participant.network_id);
                if !same_network {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "participant {} on network {} present in buffer {buffer_id}",
                            participant.nick, participant.network_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tether_state::{Buffer, BufferKind, Network, NetworkId, Participant};

    use super::*;

    fn consistent() -> StateSnapshot {
        let network = Network::new(NetworkId(1), "libera");
        let buffer = Buffer::new(BufferId(1), NetworkId(1), BufferKind::Channel, "#rust");
        let mut participant = Participant::new(NetworkId(1), "alice");
        participant.buffers.insert(BufferId(1));

        StateSnapshot {
            networks: vec![network],
            buffers: vec![buffer],
            participants: vec![participant],
            registry_keys: [
                ObjectKey::new(ObjectKind::Network, 1),
                ObjectKey::new(ObjectKind::Buffer, 1),
            ]
            .into_iter()
            .collect(),
            order: [
                (ObjectKind::Identity, vec![]),
                (ObjectKind::Network, vec![1]),
                (ObjectKind::Buffer, vec![1]),
            ]
            .into_iter()
            .collect(),
            buffers_by_network: [(NetworkId(1), vec![BufferId(1)])].into_iter().collect(),
            ..StateSnapshot::default()
        }
    }

    #[test]
    fn consistent_snapshot_passes() {
        let state = consistent();
        assert!(ReadyBuffersHaveNetwork.check(&state).is_ok());
        assert!(OrderIndexMatchesObjects.check(&state).is_ok());
        assert!(BufferIndexMatchesBuffers.check(&state).is_ok());
        assert!(ParticipantsReferenceLiveBuffers.check(&state).is_ok());
    }

    #[test]
    fn stale_order_entry_detected() {
        let mut state = consistent();
        state.order.insert(ObjectKind::Buffer, vec![1, 2]);
        assert!(OrderIndexMatchesObjects.check(&state).is_err());
    }

    #[test]
    fn misfiled_buffer_detected() {
        let mut state = consistent();
        state.buffers_by_network = [(NetworkId(2), vec![BufferId(1)])].into_iter().collect();
        assert!(BufferIndexMatchesBuffers.check(&state).is_err());
    }

    #[test]
    fn presence_in_removed_buffer_detected() {
        let mut state = consistent();
        state.participants[0].buffers.insert(BufferId(9));
        assert!(ParticipantsReferenceLiveBuffers.check(&state).is_err());
    }

    #[test]
    fn duplicate_folded_nick_detected() {
        let mut state = consistent();
        let mut shadow = Participant::new(NetworkId(1), "ALICE");
        shadow.buffers.insert(BufferId(1));
        state.participants.push(shadow);
        assert!(ParticipantsReferenceLiveBuffers.check(&state).is_err());
    }
}
