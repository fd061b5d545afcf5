//! # Membership Source
//!
//! The interface events arrive through: an embedder translates IGMPv3 membership reports (or
//! whatever group-membership protocol it runs) into [`MembershipEvent`]s and feeds them to the
//! [`crate::controller::Controller`]. Kept as a trait rather than a concrete IGMP parser, the same
//! way the teacher leaves contact-plan parsing to its `parsing` layer rather than baking it into
//! `Pathfinding`.

use crate::types::{GroupIp, NodeId, SourceIp};

/// A membership change reported for a single `(group, source)` pair at a single subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    /// `subscriber` wants to receive `(group, source)` traffic (IGMPv3 `TO_INCLUDE`/`ALLOW`
    /// semantics collapsed to their multicast-routing effect).
    Join {
        /// Multicast group.
        group: GroupIp,
        /// Multicast source.
        source: SourceIp,
        /// The host (or the switch it is reported as attached behind).
        subscriber: NodeId,
        /// The switch that should act as this tree's root, i.e. where the source attaches.
        root_switch: NodeId,
    },
    /// `subscriber` no longer wants `(group, source)` traffic.
    Leave {
        /// Multicast group.
        group: GroupIp,
        /// Multicast source.
        source: SourceIp,
        /// The subscriber leaving.
        subscriber: NodeId,
    },
}

/// Source of membership change notifications. An embedder implements this over its IGMP snooping
/// stack, a gRPC stream, a test fixture, or anything else that can hand back queued events.
pub trait MembershipSource {
    /// Returns the next pending membership event, if any, without blocking.
    fn poll_event(&mut self) -> Option<MembershipEvent>;
}

/// A simple in-memory, FIFO [`MembershipSource`] useful for tests and embedders that already
/// collect events elsewhere and just need to hand them to the controller in order.
#[derive(Debug, Default)]
pub struct QueuedMembershipSource {
    queue: std::collections::VecDeque<MembershipEvent>,
}

impl QueuedMembershipSource {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the back of the queue.
    pub fn push(&mut self, event: MembershipEvent) {
        self.queue.push_back(event);
    }
}

impl MembershipSource for QueuedMembershipSource {
    fn poll_event(&mut self) -> Option<MembershipEvent> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mac;

    #[test]
    fn events_drain_in_fifo_order() {
        let mut src = QueuedMembershipSource::new();
        src.push(MembershipEvent::Join {
            group: GroupIp(1),
            source: SourceIp(1),
            subscriber: NodeId::Host(Mac(1)),
            root_switch: NodeId::Switch(1),
        });
        src.push(MembershipEvent::Leave {
            group: GroupIp(1),
            source: SourceIp(1),
            subscriber: NodeId::Host(Mac(1)),
        });

        assert!(matches!(src.poll_event(), Some(MembershipEvent::Join { .. })));
        assert!(matches!(src.poll_event(), Some(MembershipEvent::Leave { .. })));
        assert!(src.poll_event().is_none());
    }
}
