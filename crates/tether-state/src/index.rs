//! Secondary indices maintained next to the registry.
//!
//! - [`OrderIndex`]: ids in first-observation order, the default iteration
//!   order handed to consumers.
//! - [`ParticipantIndex`]: participants per network, keyed by case-folded
//!   nick, each carrying the set of buffers it is present in.
//!
//! Both are only ever mutated under the store write lock together with the
//! registry, so they never hold an id the registry no longer has.

use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
};

use crate::{
    entity::Participant,
    id::{BufferId, NetworkId},
};

/// Case-fold a nick for lookup. ASCII only, so lookups do not depend on the
/// process locale.
pub fn fold_nick(nick: &str) -> String {
    nick.to_ascii_lowercase()
}

/// Ids in the order they were first observed.
#[derive(Debug, Clone)]
pub struct OrderIndex<Id> {
    next_seq: u64,
    order: BTreeMap<u64, Id>,
    positions: HashMap<Id, u64>,
}

impl<Id> Default for OrderIndex<Id> {
    fn default() -> Self {
        Self { next_seq: 0, order: BTreeMap::new(), positions: HashMap::new() }
    }
}

impl<Id: Copy + Eq + Hash> OrderIndex<Id> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` if unseen. Returns `true` if it was appended.
    ///
    /// Re-inserting a live id keeps its original position.
    pub fn insert(&mut self, id: Id) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.positions.insert(id, seq);
        self.order.insert(seq, id);
        true
    }

    /// Remove `id`. Returns `true` if it was present.
    pub fn remove(&mut self, id: Id) -> bool {
        match self.positions.remove(&id) {
            Some(seq) => {
                self.order.remove(&seq);
                true
            },
            None => false,
        }
    }

    /// Check if `id` is present.
    pub fn contains(&self, id: Id) -> bool {
        self.positions.contains_key(&id)
    }

    /// Ids in observation order.
    pub fn iter(&self) -> impl Iterator<Item = Id> + '_ {
        self.order.values().copied()
    }

    /// Number of ids.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Drop every id. Sequence numbers keep counting so that stale
    /// positions can never collide with new ones.
    pub fn clear(&mut self) {
        self.order.clear();
        self.positions.clear();
    }
}

/// Result of [`ParticipantIndex::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// First sighting of this nick on the network.
    Created,
    /// Known participant entered another buffer.
    Joined,
    /// Already present in that buffer.
    AlreadyPresent,
}

/// Result of [`ParticipantIndex::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Nick unknown or not present in that buffer.
    NotPresent,
    /// Left the buffer, still present elsewhere.
    Left,
    /// Left its last buffer and was dropped.
    Gone,
}

/// Participants grouped by network.
#[derive(Debug, Clone, Default)]
pub struct ParticipantIndex {
    networks: HashMap<NetworkId, HashMap<String, Participant>>,
}

impl ParticipantIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `nick` as present in `buffer_id`.
    pub fn join(&mut self, network_id: NetworkId, nick: &str, buffer_id: BufferId) -> JoinOutcome {
        let participants = self.networks.entry(network_id).or_default();
        match participants.get_mut(&fold_nick(nick)) {
            Some(participant) => {
                if participant.buffers.insert(buffer_id) {
                    JoinOutcome::Joined
                } else {
                    JoinOutcome::AlreadyPresent
                }
            },
            None => {
                let mut participant = Participant::new(network_id, nick);
                participant.buffers.insert(buffer_id);
                participants.insert(fold_nick(nick), participant);
                JoinOutcome::Created
            },
        }
    }

    /// Record `nick` as gone from `buffer_id`.
    pub fn leave(&mut self, network_id: NetworkId, nick: &str, buffer_id: BufferId) -> LeaveOutcome {
        let Some(participants) = self.networks.get_mut(&network_id) else {
            return LeaveOutcome::NotPresent;
        };
        let key = fold_nick(nick);
        let Some(participant) = participants.get_mut(&key) else {
            return LeaveOutcome::NotPresent;
        };
        if !participant.buffers.remove(&buffer_id) {
            return LeaveOutcome::NotPresent;
        }
        if participant.buffers.is_empty() {
            participants.remove(&key);
            if participants.is_empty() {
                self.networks.remove(&network_id);
            }
            LeaveOutcome::Gone
        } else {
            LeaveOutcome::Left
        }
    }

    /// Rename a participant, keeping its presence.
    ///
    /// Returns `false` if `old` is unknown or `new` already names a
    /// different participant.
    pub fn rename(&mut self, network_id: NetworkId, old: &str, new: &str) -> bool {
        let Some(participants) = self.networks.get_mut(&network_id) else {
            return false;
        };
        let (old_key, new_key) = (fold_nick(old), fold_nick(new));
        if old_key != new_key && participants.contains_key(&new_key) {
            return false;
        }
        match participants.remove(&old_key) {
            Some(mut participant) => {
                participant.nick = new.to_string();
                participants.insert(new_key, participant);
                true
            },
            None => false,
        }
    }

    /// Participant by nick, case-insensitively.
    pub fn get(&self, network_id: NetworkId, nick: &str) -> Option<&Participant> {
        self.networks.get(&network_id)?.get(&fold_nick(nick))
    }

    /// Mutable participant by nick, case-insensitively.
    pub fn get_mut(&mut self, network_id: NetworkId, nick: &str) -> Option<&mut Participant> {
        self.networks.get_mut(&network_id)?.get_mut(&fold_nick(nick))
    }

    /// All participants on a network, in no particular order.
    pub fn on_network(&self, network_id: NetworkId) -> impl Iterator<Item = &Participant> + '_ {
        self.networks.get(&network_id).into_iter().flat_map(HashMap::values)
    }

    /// All participants present in a buffer.
    pub fn in_buffer(
        &self,
        network_id: NetworkId,
        buffer_id: BufferId,
    ) -> impl Iterator<Item = &Participant> + '_ {
        self.on_network(network_id).filter(move |p| p.buffers.contains(&buffer_id))
    }

    /// Every participant on every network.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> + '_ {
        self.networks.values().flat_map(HashMap::values)
    }

    /// Forget a buffer. Participants left without buffers are dropped.
    ///
    /// Returns how many participants were dropped.
    pub fn drop_buffer(&mut self, network_id: NetworkId, buffer_id: BufferId) -> usize {
        let Some(participants) = self.networks.get_mut(&network_id) else {
            return 0;
        };
        let before = participants.len();
        participants.retain(|_, p| {
            p.buffers.remove(&buffer_id);
            !p.buffers.is_empty()
        });
        let dropped = before - participants.len();
        if participants.is_empty() {
            self.networks.remove(&network_id);
        }
        dropped
    }

    /// Forget every participant on a network. Returns how many there were.
    pub fn drop_network(&mut self, network_id: NetworkId) -> usize {
        self.networks.remove(&network_id).as_ref().map_or(0, HashMap::len)
    }

    /// Total number of participants.
    pub fn len(&self) -> usize {
        self.networks.values().map(HashMap::len).sum()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.networks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_index_keeps_first_observation() {
        let mut index = OrderIndex::new();
        assert!(index.insert(3));
        assert!(index.insert(1));
        assert!(!index.insert(3));
        assert!(index.insert(2));

        assert_eq!(index.iter().collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn order_index_reinsert_after_remove_goes_last() {
        let mut index = OrderIndex::new();
        index.insert(1);
        index.insert(2);
        assert!(index.remove(1));
        assert!(!index.remove(1));
        index.insert(1);

        assert_eq!(index.iter().collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn join_and_leave_track_presence() {
        let mut index = ParticipantIndex::new();
        let net = NetworkId(1);

        assert_eq!(index.join(net, "Alice", BufferId(10)), JoinOutcome::Created);
        assert_eq!(index.join(net, "alice", BufferId(11)), JoinOutcome::Joined);
        assert_eq!(index.join(net, "ALICE", BufferId(11)), JoinOutcome::AlreadyPresent);

        let alice = index.get(net, "aLiCe");
        assert_eq!(alice.map(|p| p.nick.as_str()), Some("Alice"));
        assert_eq!(alice.map(|p| p.buffers.len()), Some(2));

        assert_eq!(index.leave(net, "alice", BufferId(10)), LeaveOutcome::Left);
        assert_eq!(index.leave(net, "alice", BufferId(10)), LeaveOutcome::NotPresent);
        assert_eq!(index.leave(net, "alice", BufferId(11)), LeaveOutcome::Gone);
        assert!(index.get(net, "alice").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn participants_are_scoped_by_network() {
        let mut index = ParticipantIndex::new();
        index.join(NetworkId(1), "bob", BufferId(1));
        index.join(NetworkId(2), "bob", BufferId(2));

        assert_eq!(index.len(), 2);
        assert_eq!(index.drop_network(NetworkId(1)), 1);
        assert!(index.get(NetworkId(1), "bob").is_none());
        assert!(index.get(NetworkId(2), "bob").is_some());
    }

    #[test]
    fn rename_refuses_collisions() {
        let mut index = ParticipantIndex::new();
        let net = NetworkId(1);
        index.join(net, "alice", BufferId(1));
        index.join(net, "bob", BufferId(1));

        assert!(!index.rename(net, "alice", "Bob"));
        assert!(index.rename(net, "alice", "Alice"));
        assert!(index.rename(net, "alice", "carol"));
        assert!(index.get(net, "alice").is_none());
        assert_eq!(index.get(net, "carol").map(|p| p.buffers.len()), Some(1));
    }

    #[test]
    fn drop_buffer_removes_orphaned_participants() {
        let mut index = ParticipantIndex::new();
        let net = NetworkId(1);
        index.join(net, "alice", BufferId(1));
        index.join(net, "bob", BufferId(1));
        index.join(net, "bob", BufferId(2));

        assert_eq!(index.drop_buffer(net, BufferId(1)), 1);
        assert!(index.get(net, "alice").is_none());
        assert_eq!(index.in_buffer(net, BufferId(2)).count(), 1);
        assert_eq!(index.in_buffer(net, BufferId(1)).count(), 0);
    }
}
