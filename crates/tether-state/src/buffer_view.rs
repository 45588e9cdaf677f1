//! Buffer capabilities derived at read time.
//!
//! Nothing here is stored. Capabilities follow from the buffer's fixed kind,
//! and the title of a status buffer is joined from its network on every
//! read, so a network synced after its buffers is picked up without any
//! repair step.

use crate::entity::{Buffer, BufferKind, Network};

/// Side pane offered for a buffer's participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantPane {
    /// Channel member list.
    NickList,
    /// Details of the single query partner.
    Details,
}

/// What a buffer exposes to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCapabilities {
    /// Topic line is shown.
    pub shows_topic: bool,
    /// Topic can be opened and edited. Channels only.
    pub topic_interactive: bool,
    /// Participant pane, if any.
    pub participant_pane: Option<ParticipantPane>,
}

impl BufferCapabilities {
    /// Capabilities of a buffer kind.
    pub const fn for_kind(kind: BufferKind) -> Self {
        match kind {
            BufferKind::Channel => Self {
                shows_topic: true,
                topic_interactive: true,
                participant_pane: Some(ParticipantPane::NickList),
            },
            BufferKind::Query => Self {
                shows_topic: true,
                topic_interactive: false,
                participant_pane: Some(ParticipantPane::Details),
            },
            BufferKind::Status | BufferKind::Other => {
                Self { shows_topic: true, topic_interactive: false, participant_pane: None }
            },
        }
    }

    /// Whether a participant list affordance is shown.
    pub const fn shows_participants(&self) -> bool {
        self.participant_pane.is_some()
    }
}

/// Title shown for a buffer.
///
/// Status buffers are titled after their network; when the network is not
/// live yet the buffer's own name is used.
pub fn display_title(buffer: &Buffer, network: Option<&Network>) -> String {
    match (buffer.kind, network) {
        (BufferKind::Status, Some(network)) => network.name.clone(),
        _ => buffer.name.clone(),
    }
}

/// Topic to show, if the kind shows one and it is not blank.
pub fn visible_topic(buffer: &Buffer) -> Option<&str> {
    if !BufferCapabilities::for_kind(buffer.kind).shows_topic {
        return None;
    }
    buffer.topic.as_deref().filter(|topic| !topic.trim().is_empty())
}

/// A buffer joined with its network at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferView {
    /// The buffer record.
    pub buffer: Buffer,
    /// Owning network. `None` while the buffer is orphaned.
    pub network: Option<Network>,
}

impl BufferView {
    /// Join a buffer with its (possibly absent) network.
    pub fn new(buffer: Buffer, network: Option<Network>) -> Self {
        Self { buffer, network }
    }

    /// Whether the buffer may be surfaced: its network is live.
    pub fn is_ready(&self) -> bool {
        self.network.is_some()
    }

    /// Derived capabilities.
    pub fn capabilities(&self) -> BufferCapabilities {
        BufferCapabilities::for_kind(self.buffer.kind)
    }

    /// Display title.
    pub fn title(&self) -> String {
        display_title(&self.buffer, self.network.as_ref())
    }

    /// Topic to show. `None` if hidden or blank.
    pub fn topic(&self) -> Option<&str> {
        visible_topic(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{BufferId, NetworkId};

    fn buffer(kind: BufferKind) -> Buffer {
        Buffer::new(BufferId(1), NetworkId(1), kind, "name").with_topic("topic")
    }

    #[test]
    fn participant_list_only_for_channels_and_queries() {
        assert!(BufferCapabilities::for_kind(BufferKind::Channel).shows_participants());
        assert!(BufferCapabilities::for_kind(BufferKind::Query).shows_participants());
        assert!(!BufferCapabilities::for_kind(BufferKind::Status).shows_participants());
        assert!(!BufferCapabilities::for_kind(BufferKind::Other).shows_participants());
    }

    #[test]
    fn panes_differ_by_kind() {
        assert_eq!(
            BufferCapabilities::for_kind(BufferKind::Channel).participant_pane,
            Some(ParticipantPane::NickList)
        );
        assert_eq!(
            BufferCapabilities::for_kind(BufferKind::Query).participant_pane,
            Some(ParticipantPane::Details)
        );
    }

    #[test]
    fn topic_shown_for_every_kind() {
        for kind in [BufferKind::Channel, BufferKind::Status, BufferKind::Query, BufferKind::Other] {
            assert_eq!(visible_topic(&buffer(kind)), Some("topic"), "{kind:?}");
        }
        assert!(BufferCapabilities::for_kind(BufferKind::Channel).topic_interactive);
        assert!(!BufferCapabilities::for_kind(BufferKind::Query).topic_interactive);
    }

    #[test]
    fn other_buffer_shows_topic_without_affordances() {
        let caps = BufferCapabilities::for_kind(BufferKind::Other);
        assert!(caps.shows_topic);
        assert!(!caps.topic_interactive);
        assert!(!caps.shows_participants());

        let mut other = buffer(BufferKind::Other);
        other.topic = Some("hello".into());
        assert_eq!(visible_topic(&other), Some("hello"));
    }

    #[test]
    fn blank_topic_is_hidden() {
        let mut b = buffer(BufferKind::Channel);
        b.topic = Some("   ".into());
        assert_eq!(visible_topic(&b), None);
        b.topic = None;
        assert_eq!(visible_topic(&b), None);
    }

    #[test]
    fn status_title_comes_from_network() {
        let network = Network::new(NetworkId(1), "Libera.Chat");
        let status = buffer(BufferKind::Status);
        assert_eq!(display_title(&status, Some(&network)), "Libera.Chat");
        assert_eq!(display_title(&status, None), "name");

        let channel = buffer(BufferKind::Channel);
        assert_eq!(display_title(&channel, Some(&network)), "name");
    }

    #[test]
    fn view_readiness_follows_network() {
        let orphan = BufferView::new(buffer(BufferKind::Status), None);
        assert!(!orphan.is_ready());
        assert_eq!(orphan.title(), "name");

        let ready =
            BufferView::new(buffer(BufferKind::Status), Some(Network::new(NetworkId(1), "net")));
        assert!(ready.is_ready());
        assert_eq!(ready.title(), "net");
        assert_eq!(ready.topic(), Some("topic"));
    }
}
