//! # Controller Façade
//!
//! Wires the [`MembershipSource`] to the [`TreeBuilder`], [`Compiler`] and [`SwitchDriver`], and
//! applies [`TopologyEvent`]s to the [`Topology`]. Per §5, the control plane processes one event
//! to completion before starting the next: there is no internal concurrency here, matching the
//! teacher's synchronous `NodeManager`/`ContactManager` call pattern (each call runs to
//! completion against `&mut self` before the next is issued).

use crate::compiler::Compiler;
use crate::config::Config;
use crate::error::ControlPlaneError;
use crate::membership::{MembershipEvent, MembershipSource};
use crate::path_strategy::PathStrategy;
use crate::switch_driver::SwitchDriver;
use crate::topology::{Topology, TopologyEvent};
use crate::tree::TreeRegistry;

use crate::builder::TreeBuilder;

/// Synchronous event dispatcher tying every other module together.
pub struct Controller<S: PathStrategy, D: SwitchDriver> {
    topology: Topology,
    builder: TreeBuilder<S>,
    compiler: Compiler,
    driver: D,
}

impl<S: PathStrategy, D: SwitchDriver> Controller<S, D> {
    /// Creates a controller over an empty topology, with no trees installed yet.
    pub fn new(strategy: S, driver: D, config: Config) -> Self {
        Self {
            topology: Topology::new(),
            builder: TreeBuilder::new(strategy, config),
            compiler: Compiler::new(),
            driver,
        }
    }

    /// Read access to the live topology, e.g. for a management API.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Read access to the tree registry.
    pub fn trees(&self) -> &TreeRegistry {
        self.builder.trees()
    }

    /// Read access to the underlying driver, e.g. for a management API or test assertions on
    /// installed flow/group state.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Applies a topology change. Link-down events are forwarded to the Tree Builder's repair
    /// hook after the graph itself is updated, so the hook observes the post-failure topology.
    pub fn apply_topology_event(&mut self, event: TopologyEvent) {
        if let TopologyEvent::LinkDelete { u, v } = event {
            self.topology.apply_event(event);
            self.builder.on_link_down(u, v);
            return;
        }
        self.topology.apply_event(event);
    }

    /// Drains every event currently queued on `source`, applying each to completion before
    /// pulling the next.
    pub fn run_membership_events(&mut self, source: &mut dyn MembershipSource) -> Result<(), ControlPlaneError> {
        while let Some(event) = source.poll_event() {
            self.apply_membership_event(event)?;
        }
        Ok(())
    }

    /// Applies one membership event.
    pub fn apply_membership_event(&mut self, event: MembershipEvent) -> Result<(), ControlPlaneError> {
        match event {
            MembershipEvent::Join {
                group,
                source,
                subscriber,
                root_switch,
            } => {
                match self.builder.add_subscriber(
                    &self.topology,
                    &mut self.compiler,
                    &mut self.driver,
                    group,
                    source,
                    root_switch,
                    subscriber,
                ) {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_idempotent() => {
                        log::debug!("join no-op for {:?}/{:?}/{:?}: {}", group, source, subscriber, e);
                        Ok(())
                    }
                    Err(e) => Err(ControlPlaneError::Builder(e)),
                }
            }
            MembershipEvent::Leave {
                group,
                source,
                subscriber,
            } => match self
                .builder
                .remove_subscriber(&self.topology, &mut self.compiler, &mut self.driver, group, source, subscriber)
            {
                Ok(()) => Ok(()),
                Err(e) if e.is_idempotent() => {
                    log::debug!("leave no-op for {:?}/{:?}/{:?}: {}", group, source, subscriber, e);
                    Ok(())
                }
                Err(e) => Err(ControlPlaneError::Builder(e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::QueuedMembershipSource;
    use crate::path_strategy::SptStrategy;
    use crate::switch_driver::test_driver::FakeDriver;
    use crate::topology::TopologyEvent;
    use crate::types::{EdgeInfo, GroupIp, Mac, NodeId, SourceIp};

    fn sw(id: u64) -> NodeId {
        NodeId::Switch(id)
    }

    #[test]
    fn join_then_leave_round_trips_cleanly() {
        let mut controller = Controller::new(SptStrategy, FakeDriver::default(), Config { protection_level: 0 });
        controller.apply_topology_event(TopologyEvent::SwitchEnter(1));
        controller.apply_topology_event(TopologyEvent::SwitchEnter(2));
        controller.apply_topology_event(TopologyEvent::LinkAdd {
            u: sw(1),
            v: sw(2),
            info: EdgeInfo {
                src_port: 1,
                dst_port: 1,
                live: true,
            },
        });
        controller.apply_topology_event(TopologyEvent::LinkAdd {
            u: sw(2),
            v: sw(1),
            info: EdgeInfo {
                src_port: 1,
                dst_port: 1,
                live: true,
            },
        });
        controller.apply_topology_event(TopologyEvent::HostFound {
            host: Mac(0xAB),
            switch: 2,
            port: 9,
        });

        let mut events = QueuedMembershipSource::new();
        events.push(MembershipEvent::Join {
            group: GroupIp(1),
            source: SourceIp(1),
            subscriber: NodeId::Host(Mac(0xAB)),
            root_switch: sw(1),
        });
        controller.run_membership_events(&mut events).unwrap();

        let tree_id = controller.trees().lookup(GroupIp(1), SourceIp(1)).unwrap();
        assert!(controller.trees().get(tree_id).unwrap().contains(NodeId::Host(Mac(0xAB))));

        events.push(MembershipEvent::Leave {
            group: GroupIp(1),
            source: SourceIp(1),
            subscriber: NodeId::Host(Mac(0xAB)),
        });
        controller.run_membership_events(&mut events).unwrap();

        assert!(controller.trees().lookup(GroupIp(1), SourceIp(1)).is_none());
    }
}
