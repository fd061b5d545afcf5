//! # Switch Driver
//!
//! The narrow write interface the Forwarding Compiler uses to push state to a switch, kept
//! separate from the wire protocol so the compiler never depends on OpenFlow/P4Runtime/whatever
//! concretely. Grounded in the teacher's split between its pluggable `NodeManager`/`ContactManager`
//! traits (decision logic) and whatever owns the actual contact-plan I/O: here the decision logic
//! is the Forwarding Compiler and the I/O is whatever implements this trait.

use crate::compiler::actions::{Action, FlowEntry, GroupId};
use crate::error::CompilerError;
use crate::types::NodeId;

/// A single fast-failover bucket: an ordered candidate the group falls through to if its watched
/// port is down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Port(s) whose liveness this bucket watches. More than one when §4.4.4's Case B coalesces
    /// two protected ports that reroute the same way into a single shared bucket.
    pub watch_ports: Vec<crate::types::PortNumber>,
    /// Actions run if this bucket is selected. Empty for a drop-marked bucket (§4.4.4 Case C):
    /// it exists only to hold its index in a cloned group, never to forward traffic.
    pub actions: Vec<Action>,
    /// `true` for a Case-C clone's drop-marked prefix entries.
    pub is_drop: bool,
}

/// Pushes compiled forwarding state to switches.
///
/// Every method is named `..._strict` where the spec requires strict (fail if absent/present)
/// semantics, matching OpenFlow's `OFPFC_ADD`/`OFPFC_MODIFY_STRICT`/`OFPFC_DELETE_STRICT`
/// distinction: the compiler always knows exactly which single entry it means to touch.
pub trait SwitchDriver {
    /// Installs a brand new flow entry. Implementations should treat a duplicate match+priority
    /// as a driver-level bug (the compiler is responsible for not doing this).
    fn add_flow(&mut self, switch: NodeId, flow: FlowEntry) -> Result<(), CompilerError>;

    /// Replaces the action list of the single existing entry matching `flow`'s match+priority.
    fn modify_flow_strict(&mut self, switch: NodeId, flow: FlowEntry) -> Result<(), CompilerError>;

    /// Deletes the single entry matching `flow`'s match+priority.
    fn delete_flow_strict(&mut self, switch: NodeId, flow: FlowEntry) -> Result<(), CompilerError>;

    /// Installs a new fast-failover group.
    fn add_group(&mut self, switch: NodeId, group: GroupId, buckets: Vec<Bucket>) -> Result<(), CompilerError>;

    /// Replaces the bucket list of an existing group.
    fn modify_group(&mut self, switch: NodeId, group: GroupId, buckets: Vec<Bucket>) -> Result<(), CompilerError>;

    /// Deletes a group.
    fn delete_group(&mut self, switch: NodeId, group: GroupId) -> Result<(), CompilerError>;

    /// Blocks until every previously issued command to `switch` has taken effect, per §6's
    /// ordering guarantee that a barrier must separate a group update from the flow update that
    /// depends on it.
    fn barrier(&mut self, switch: NodeId) -> Result<(), CompilerError>;
}

/// An in-memory [`SwitchDriver`] used by this crate's own tests and available to integration
/// tests and embedders wiring up a [`crate::controller::Controller`] before a real driver exists.
pub mod test_driver {
    use super::*;
    use std::collections::HashMap;

    /// In-memory `SwitchDriver` used by compiler and controller tests.
    #[derive(Debug, Default)]
    pub struct FakeDriver {
        pub flows: HashMap<NodeId, Vec<FlowEntry>>,
        pub groups: HashMap<(NodeId, GroupId), Vec<Bucket>>,
        pub present: std::collections::HashSet<NodeId>,
        pub barriers: u32,
    }

    impl FakeDriver {
        pub fn mark_present(&mut self, switch: NodeId) {
            self.present.insert(switch);
        }

        fn check_present(&self, switch: NodeId) -> Result<(), CompilerError> {
            if self.present.is_empty() || self.present.contains(&switch) {
                Ok(())
            } else {
                Err(CompilerError::SwitchAbsent(switch))
            }
        }
    }

    impl SwitchDriver for FakeDriver {
        fn add_flow(&mut self, switch: NodeId, flow: FlowEntry) -> Result<(), CompilerError> {
            self.check_present(switch)?;
            self.flows.entry(switch).or_default().push(flow);
            Ok(())
        }

        fn modify_flow_strict(&mut self, switch: NodeId, flow: FlowEntry) -> Result<(), CompilerError> {
            self.check_present(switch)?;
            let entries = self.flows.entry(switch).or_default();
            let found = entries
                .iter_mut()
                .find(|e| e.matching == flow.matching && e.priority == flow.priority);
            match found {
                Some(e) => {
                    e.actions = flow.actions;
                    Ok(())
                }
                None => Err(CompilerError::NoSuchFlow(switch)),
            }
        }

        fn delete_flow_strict(&mut self, switch: NodeId, flow: FlowEntry) -> Result<(), CompilerError> {
            self.check_present(switch)?;
            let entries = self.flows.entry(switch).or_default();
            let before = entries.len();
            entries.retain(|e| !(e.matching == flow.matching && e.priority == flow.priority));
            if entries.len() == before {
                Err(CompilerError::NoSuchFlow(switch))
            } else {
                Ok(())
            }
        }

        fn add_group(&mut self, switch: NodeId, group: GroupId, buckets: Vec<Bucket>) -> Result<(), CompilerError> {
            self.check_present(switch)?;
            self.groups.insert((switch, group), buckets);
            Ok(())
        }

        fn modify_group(&mut self, switch: NodeId, group: GroupId, buckets: Vec<Bucket>) -> Result<(), CompilerError> {
            self.check_present(switch)?;
            if !self.groups.contains_key(&(switch, group)) {
                return Err(CompilerError::NoSuchFlow(switch));
            }
            self.groups.insert((switch, group), buckets);
            Ok(())
        }

        fn delete_group(&mut self, switch: NodeId, group: GroupId) -> Result<(), CompilerError> {
            self.check_present(switch)?;
            self.groups.remove(&(switch, group));
            Ok(())
        }

        fn barrier(&mut self, switch: NodeId) -> Result<(), CompilerError> {
            self.check_present(switch)?;
            self.barriers += 1;
            Ok(())
        }
    }
}
