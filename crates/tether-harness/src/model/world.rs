//! Reference model of the sync state.
//!
//! A deliberately naive implementation: plain vectors and linear scans, no
//! secondary indices and no bus. Applying the same operations to the model
//! and to a real [`tether_state::SyncState`] must yield the same
//! [`ObservableState`].

use std::collections::{BTreeMap, BTreeSet};

use tether_state::{ConnectionStatus, StateSnapshot, fold_nick};

use super::operation::{ModelBufferKind, Operation, model_id, network_name, nick, topic};

/// State observable through the public read API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservableState {
    /// Session status.
    pub status: ConnectionStatus,
    /// Identity ids in observation order.
    pub identities: Vec<u32>,
    /// Network ids and names in observation order.
    pub networks: Vec<(u32, String)>,
    /// Buffers in observation order.
    pub buffers: Vec<ObservableBuffer>,
    /// Participants keyed by network and folded nick, with their buffers.
    pub participants: BTreeMap<(u32, String), (String, BTreeSet<u32>)>,
}

/// Buffer fields compared between model and real state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableBuffer {
    /// Buffer id.
    pub id: u32,
    /// Owning network id.
    pub network_id: u32,
    /// Whether the network is live.
    pub ready: bool,
    /// Kind fixed at first sync.
    pub kind: ModelBufferKind,
    /// Topic.
    pub topic: Option<String>,
    /// Unread messages.
    pub unread: u32,
    /// Unread highlights.
    pub highlights: u32,
    /// Latest message timestamp.
    pub last_activity: u64,
}

impl ObservableState {
    /// Extract the observable state from a real snapshot.
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let buffers = snapshot
            .buffers
            .iter()
            .map(|b| ObservableBuffer {
                id: b.id.get(),
                network_id: b.network_id.get(),
                ready: snapshot.network(b.network_id).is_some(),
                kind: match b.kind {
                    tether_state::BufferKind::Status => ModelBufferKind::Status,
                    tether_state::BufferKind::Query => ModelBufferKind::Query,
                    _ => ModelBufferKind::Channel,
                },
                topic: b.topic.clone(),
                unread: b.unread,
                highlights: b.highlights,
                last_activity: b.last_activity,
            })
            .collect();

        let participants = snapshot
            .participants
            .iter()
            .map(|p| {
                let buffers = p.buffers.iter().map(|id| id.get()).collect();
                ((p.network_id.get(), fold_nick(&p.nick)), (p.nick.clone(), buffers))
            })
            .collect();

        Self {
            status: snapshot.status,
            identities: snapshot.identities.iter().map(|i| i.id.get()).collect(),
            networks: snapshot.networks.iter().map(|n| (n.id.get(), n.name.clone())).collect(),
            buffers,
            participants,
        }
    }
}

#[derive(Debug, Clone)]
struct ModelBuffer {
    id: u32,
    network_id: u32,
    kind: ModelBufferKind,
    topic: Option<String>,
    unread: u32,
    highlights: u32,
    last_activity: u64,
}

#[derive(Debug, Clone)]
struct ModelParticipant {
    nick: String,
    buffers: BTreeSet<u32>,
}

/// Reference implementation.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    status: ConnectionStatus,
    identities: Vec<u32>,
    networks: Vec<(u32, String)>,
    buffers: Vec<ModelBuffer>,
    participants: BTreeMap<(u32, String), ModelParticipant>,
}

impl ModelState {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation.
    pub fn apply(&mut self, op: &Operation) {
        match *op {
            Operation::PutIdentity { id } => {
                let id = model_id(id);
                if !self.identities.contains(&id) {
                    self.identities.push(id);
                }
            },
            Operation::RemoveIdentity { id } => {
                let id = model_id(id);
                self.identities.retain(|i| *i != id);
            },
            Operation::PutNetwork { id, name } => self.put_network(model_id(id), network_name(name)),
            Operation::RemoveNetwork { id } => self.remove_network(model_id(id)),
            Operation::PutBuffer { id, network_id, kind } => {
                self.put_buffer(model_id(id), model_id(network_id), kind);
            },
            Operation::RemoveBuffer { id } => self.remove_buffer(model_id(id)),
            Operation::SetTopic { buffer_id, topic: t } => {
                if let Some(buffer) = self.buffer_mut(model_id(buffer_id)) {
                    buffer.topic = topic(t);
                }
            },
            Operation::Activity { buffer_id, timestamp, highlight } => {
                if let Some(buffer) = self.buffer_mut(model_id(buffer_id)) {
                    buffer.last_activity = buffer.last_activity.max(u64::from(timestamp));
                    buffer.unread += 1;
                    if highlight {
                        buffer.highlights += 1;
                    }
                }
            },
            Operation::MarkRead { buffer_id } => {
                if let Some(buffer) = self.buffer_mut(model_id(buffer_id)) {
                    buffer.unread = 0;
                    buffer.highlights = 0;
                }
            },
            Operation::Join { network_id, nick: n, buffer_id } => {
                self.join(model_id(network_id), nick(n), model_id(buffer_id));
            },
            Operation::Leave { network_id, nick: n, buffer_id } => {
                self.leave(model_id(network_id), nick(n), model_id(buffer_id));
            },
            Operation::Rename { network_id, old, new } => {
                self.rename(model_id(network_id), nick(old), nick(new));
            },
            Operation::Clear => self.clear(),
            Operation::ClearBuffers => {
                self.buffers.clear();
                self.participants.clear();
            },
            Operation::Connect => self.status = ConnectionStatus::Connected,
            Operation::Disconnect => {
                self.status = ConnectionStatus::Disconnected;
                self.clear();
            },
        }
    }

    /// Observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let network_ids: BTreeSet<u32> = self.networks.iter().map(|(id, _)| *id).collect();
        ObservableState {
            status: self.status,
            identities: self.identities.clone(),
            networks: self.networks.clone(),
            buffers: self
                .buffers
                .iter()
                .map(|b| ObservableBuffer {
                    id: b.id,
                    network_id: b.network_id,
                    ready: network_ids.contains(&b.network_id),
                    kind: b.kind,
                    topic: b.topic.clone(),
                    unread: b.unread,
                    highlights: b.highlights,
                    last_activity: b.last_activity,
                })
                .collect(),
            participants: self
                .participants
                .iter()
                .map(|(key, p)| (key.clone(), (p.nick.clone(), p.buffers.clone())))
                .collect(),
        }
    }

    fn put_network(&mut self, id: u32, name: String) {
        match self.networks.iter_mut().find(|(n, _)| *n == id) {
            Some(entry) => entry.1 = name,
            None => self.networks.push((id, name)),
        }
    }

    fn remove_network(&mut self, id: u32) {
        if !self.networks.iter().any(|(n, _)| *n == id) {
            return;
        }
        self.buffers.retain(|b| b.network_id != id);
        self.participants.retain(|(network_id, _), _| *network_id != id);
        self.networks.retain(|(n, _)| *n != id);
    }

    fn put_buffer(&mut self, id: u32, network_id: u32, kind: ModelBufferKind) {
        let previous = self.buffers.iter().position(|b| b.id == id);
        match previous {
            Some(index) => {
                let from = self.buffers[index].network_id;
                let buffer = &mut self.buffers[index];
                buffer.network_id = network_id;
                buffer.topic = None;
                if from != network_id {
                    self.drop_presence(from, id);
                }
            },
            None => self.buffers.push(ModelBuffer {
                id,
                network_id,
                kind,
                topic: None,
                unread: 0,
                highlights: 0,
                last_activity: 0,
            }),
        }
    }

    fn remove_buffer(&mut self, id: u32) {
        if let Some(index) = self.buffers.iter().position(|b| b.id == id) {
            let buffer = self.buffers.remove(index);
            self.drop_presence(buffer.network_id, id);
        }
    }

    fn drop_presence(&mut self, network_id: u32, buffer_id: u32) {
        self.participants.retain(|(network, _), p| {
            if *network == network_id {
                p.buffers.remove(&buffer_id);
            }
            !p.buffers.is_empty()
        });
    }

    fn buffer_mut(&mut self, id: u32) -> Option<&mut ModelBuffer> {
        self.buffers.iter_mut().find(|b| b.id == id)
    }

    fn join(&mut self, network_id: u32, nick: &str, buffer_id: u32) {
        let on_network = self.buffers.iter().any(|b| b.id == buffer_id && b.network_id == network_id);
        if !on_network {
            return;
        }
        self.participants
            .entry((network_id, fold_nick(nick)))
            .or_insert_with(|| ModelParticipant { nick: nick.to_string(), buffers: BTreeSet::new() })
            .buffers
            .insert(buffer_id);
    }

    fn leave(&mut self, network_id: u32, nick: &str, buffer_id: u32) {
        let key = (network_id, fold_nick(nick));
        if let Some(participant) = self.participants.get_mut(&key) {
            participant.buffers.remove(&buffer_id);
            if participant.buffers.is_empty() {
                self.participants.remove(&key);
            }
        }
    }

    fn rename(&mut self, network_id: u32, old: &str, new: &str) {
        let (old_key, new_key) = ((network_id, fold_nick(old)), (network_id, fold_nick(new)));
        if old_key != new_key && self.participants.contains_key(&new_key) {
            return;
        }
        if let Some(mut participant) = self.participants.remove(&old_key) {
            participant.nick = new.to_string();
            self.participants.insert(new_key, participant);
        }
    }

    fn clear(&mut self) {
        self.identities.clear();
        self.networks.clear();
        self.buffers.clear();
        self.participants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_removes_buffers_and_presence() {
        let mut model = ModelState::new();
        model.apply(&Operation::PutNetwork { id: 1, name: 0 });
        model.apply(&Operation::PutBuffer { id: 1, network_id: 1, kind: ModelBufferKind::Channel });
        model.apply(&Operation::Join { network_id: 1, nick: 0, buffer_id: 1 });

        model.apply(&Operation::RemoveNetwork { id: 1 });

        let state = model.observable_state();
        assert!(state.buffers.is_empty());
        assert!(state.participants.is_empty());
    }

    #[test]
    fn orphan_survives_unknown_network_removal() {
        let mut model = ModelState::new();
        model.apply(&Operation::PutBuffer { id: 1, network_id: 3, kind: ModelBufferKind::Query });
        model.apply(&Operation::RemoveNetwork { id: 3 });

        let state = model.observable_state();
        assert_eq!(state.buffers.len(), 1);
        assert!(!state.buffers[0].ready);
    }
}
