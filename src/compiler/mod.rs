//! # Forwarding-State Compiler
//!
//! Translates tree/backup edges into concrete flow and fast-failover-group state on switches, via
//! a [`crate::switch_driver::SwitchDriver`]. Kept as its own module, independent of the Tree
//! Builder, the same way the teacher keeps `route_storage` (what actually gets written down)
//! separate from `routing` (the algorithm that decides what to write).

pub mod actions;

use std::collections::HashMap;

use crate::compiler::actions::{Action, FlowEntry, FlowMatch, GroupId, Priority};
use crate::error::CompilerError;
use crate::switch_driver::{Bucket, SwitchDriver};
use crate::types::{GroupIp, NodeId, PortNumber, SourceIp};

/// Per-switch, per-flow compiled state. Flows are keyed by `(switch, group, source, tag)` per
/// §3's flow key `(group_ip, source_ip, tag, inbound_switch)`: `tag` is `None` for the untagged
/// primary delivery flow, and `Some(origin_tag)` for the flow a nested `add_backup` call extends
/// when a backup path's own first hop is itself protected one level deeper.
#[derive(Debug, Clone, Default)]
struct FlowState {
    /// Fast-failover group id backing this flow's table entry, once at least one backup has
    /// promoted a plain `Output` action into a group bucket.
    primary_group: Option<GroupId>,
    /// Plain output ports with no backup protection yet.
    plain_outputs: Vec<PortNumber>,
    /// Upstream switch this flow's traffic enters from, if known. Carried in the flow's match.
    inbound_switch: Option<NodeId>,
    /// Physical port this flow's traffic enters through, if known. Used only to substitute
    /// `Action::InPort` for an `Output` action that would otherwise loop back the way it came.
    inbound_port: Option<PortNumber>,
    /// Top-level backup buckets, in the order they were installed. `protected_ports` holds more
    /// than one port once §4.4.4 Case B coalesces two ports that reroute identically.
    backup_buckets: Vec<BackupBucket>,
    /// Independent fast-failover groups cloned off this flow's base group by §4.4.4 Case C, each
    /// holding the drop-marked prefix it diverged from plus its own live bucket.
    clones: Vec<ClonedGroup>,
}

#[derive(Debug, Clone)]
struct BackupBucket {
    /// Primary ports this bucket is the alternate route for.
    protected_ports: Vec<PortNumber>,
    tag: u16,
    /// Port the bucket reroutes onto when `protected_ports` goes down, needed to rebuild the
    /// group's full bucket list whenever a sibling bucket is added or removed.
    reroute_port: PortNumber,
    /// Other switches along the backup path (relays and the rejoin switch) that carry a
    /// tag-matching table-1 rule for this backup and must be torn down alongside it.
    relay_switches: Vec<NodeId>,
    /// `true` once this bucket has been cloned into a divergent group and is kept only to
    /// preserve bucket-index numbering (§4.4.4 Case C); such a bucket forwards nothing.
    is_drop: bool,
}

#[derive(Debug, Clone)]
struct ClonedGroup {
    group_id: GroupId,
    /// The cloned, drop-marked prefix followed by exactly one live bucket: the divergent backup
    /// this clone exists for.
    buckets: Vec<BackupBucket>,
}

/// Compiles tree state into switch forwarding state.
#[derive(Debug, Default)]
pub struct Compiler {
    flows: HashMap<(NodeId, GroupIp, SourceIp, Option<u16>), FlowState>,
    next_group: HashMap<NodeId, GroupId>,
}

impl Compiler {
    /// Creates an empty compiler.
    pub fn new() -> Self {
        Self {
            flows: HashMap::new(),
            next_group: HashMap::new(),
        }
    }

    fn alloc_group(&mut self, switch: NodeId) -> GroupId {
        let next = self.next_group.entry(switch).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn flow_match(group: GroupIp, source: SourceIp, tag: Option<u16>, inbound_switch: Option<NodeId>) -> FlowMatch {
        FlowMatch {
            group,
            source,
            vlan: tag,
            inbound_switch,
        }
    }

    /// Untagged primary traffic lives in table 0 at `Medium` priority; a nested flow (one that
    /// extends protection past a backup's own first hop) is itself VLAN-tagged traffic, so it
    /// lives in table 1 alongside relay/rejoin rules at `High` priority, per §4.4.1's tagged >
    /// untagged ordering.
    fn home_table(tag: Option<u16>) -> u8 {
        if tag.is_some() {
            1
        } else {
            0
        }
    }

    fn home_priority(tag: Option<u16>) -> Priority {
        if tag.is_some() {
            Priority::High
        } else {
            Priority::Medium
        }
    }

    /// Substitutes `Action::InPort` for `Action::Output(port)` when `port` is the same port this
    /// flow's traffic arrived on (§4.4.4's inbound-port substitution rule).
    fn output_action(port: PortNumber, inbound_port: Option<PortNumber>) -> Action {
        if inbound_port == Some(port) {
            Action::InPort
        } else {
            Action::Output(port)
        }
    }

    fn bucket_from(bucket: &BackupBucket, inbound_port: Option<PortNumber>) -> Bucket {
        Bucket {
            watch_ports: bucket.protected_ports.clone(),
            actions: if bucket.is_drop {
                Vec::new()
            } else {
                vec![
                    Action::PushVlan,
                    Action::SetVlanVid(bucket.tag),
                    Self::output_action(bucket.reroute_port, inbound_port),
                ]
            },
            is_drop: bucket.is_drop,
        }
    }

    /// Reconstructs a group's complete bucket list from compiled state, since
    /// [`SwitchDriver::modify_group`] replaces the whole list rather than appending to it.
    fn rebuild_buckets(state: &FlowState) -> Vec<Bucket> {
        let mut buckets: Vec<Bucket> = state
            .plain_outputs
            .iter()
            .map(|p| Bucket {
                watch_ports: vec![*p],
                actions: vec![Self::output_action(*p, state.inbound_port)],
                is_drop: false,
            })
            .collect();
        buckets.extend(state.backup_buckets.iter().map(|b| Self::bucket_from(b, state.inbound_port)));
        buckets
    }

    /// §4.4.2 — installs the primary (untagged) delivery rule for `(group, source)` on `switch`,
    /// with plain `Output` actions to `out_ports`. `inbound_switch`, when known, completes the
    /// flow's match per §3's `(group_ip, source_ip, tag, inbound_switch)` key.
    pub fn add_flow(
        &mut self,
        driver: &mut dyn SwitchDriver,
        switch: NodeId,
        group: GroupIp,
        source: SourceIp,
        out_ports: Vec<PortNumber>,
        inbound_switch: Option<NodeId>,
    ) -> Result<(), CompilerError> {
        self.add_flow_tagged(driver, switch, group, source, out_ports, inbound_switch, None)
    }

    /// Installs or updates a flow's output ports under an explicit `tag`, rather than always the
    /// untagged primary one. Used by the Tree Builder for the one case a backup tree's own root
    /// needs its outputs rewritten directly: when a leave prunes a child of that root and the
    /// root's nested (tagged) flow — installed by a deeper `add_backup` call — needs its
    /// remaining output set refreshed the same way the untagged primary does.
    pub(crate) fn add_flow_tagged(
        &mut self,
        driver: &mut dyn SwitchDriver,
        switch: NodeId,
        group: GroupIp,
        source: SourceIp,
        out_ports: Vec<PortNumber>,
        inbound_switch: Option<NodeId>,
        tag: Option<u16>,
    ) -> Result<(), CompilerError> {
        let key = (switch, group, source, tag);
        let already_installed = self.flows.contains_key(&key);
        let state = self.flows.entry(key).or_default();
        state.plain_outputs = out_ports.clone();
        state.inbound_switch = inbound_switch;

        // If a fast-failover group already backs this rule (an earlier backup promoted it), a
        // growing plain-output set is a bucket-list change on the group, not a table rewrite: the
        // primary rule keeps pointing at the same `OutputGroup(gid)`.
        if let Some(gid) = state.primary_group {
            let buckets = Self::rebuild_buckets(state);
            return driver.modify_group(switch, gid, buckets);
        }

        let flow = FlowEntry {
            table: Self::home_table(tag),
            matching: Self::flow_match(group, source, tag, inbound_switch),
            priority: Self::home_priority(tag),
            actions: out_ports
                .iter()
                .map(|p| Self::output_action(*p, state.inbound_port))
                .collect(),
        };
        if already_installed {
            driver.modify_flow_strict(switch, flow)
        } else {
            driver.add_flow(switch, flow)
        }
    }

    /// §4.4.3 — removes the primary rule and every backup rule installed for `(group, source)`
    /// on `switch`.
    pub fn remove_flow(
        &mut self,
        driver: &mut dyn SwitchDriver,
        switch: NodeId,
        group: GroupIp,
        source: SourceIp,
    ) -> Result<(), CompilerError> {
        self.remove_flow_tagged(driver, switch, group, source, None)
    }

    /// Tears down an entire flow entry (primary *or* a nested, tagged one) and everything it
    /// owns: every relay/rejoin rule any of its buckets tracked, every group it allocated
    /// (base plus any Case-C clones), and the table entry itself.
    pub(crate) fn remove_flow_tagged(
        &mut self,
        driver: &mut dyn SwitchDriver,
        switch: NodeId,
        group: GroupIp,
        source: SourceIp,
        tag: Option<u16>,
    ) -> Result<(), CompilerError> {
        let key = (switch, group, source, tag);
        let Some(state) = self.flows.remove(&key) else {
            return Err(CompilerError::NoSuchFlow(switch));
        };

        for bucket in state
            .backup_buckets
            .iter()
            .chain(state.clones.iter().flat_map(|c| c.buckets.iter()))
        {
            for relay_switch in &bucket.relay_switches {
                let _ = driver.delete_flow_strict(
                    *relay_switch,
                    FlowEntry {
                        table: 1,
                        matching: FlowMatch {
                            group,
                            source,
                            vlan: Some(bucket.tag),
                            inbound_switch: None,
                        },
                        priority: Priority::High,
                        actions: Vec::new(),
                    },
                );
            }
        }

        for clone in &state.clones {
            let _ = driver.delete_group(switch, clone.group_id);
        }
        if let Some(gid) = state.primary_group {
            let _ = driver.delete_group(switch, gid);
        }

        driver.delete_flow_strict(
            switch,
            FlowEntry {
                table: Self::home_table(tag),
                matching: Self::flow_match(group, source, tag, state.inbound_switch),
                priority: Self::home_priority(tag),
                actions: Vec::new(),
            },
        )
    }

    /// §4.4.4 — installs the fast-failover bucket on `switch` (the switch directly upstream of
    /// the protected edge) that pushes `new_tag` and reroutes to `reroute_port` when
    /// `protected_port` goes down. `origin_tag` names the flow being extended: `None` for a
    /// primary-tree edge, `Some(parent_tag)` when `switch` is itself the root of a backup tree
    /// and this call is protecting *that* backup's own first hop one level deeper. If no flow
    /// exists yet for `(switch, group, source, origin_tag)` — true the first time a backup's own
    /// root gets its own nested protection — one is allocated on the spot, seeded with
    /// `protected_port` as its sole existing output (step 2 of §4.4.4). The table-1 rules that
    /// carry the tagged traffic back down to the rejoin point are installed separately via
    /// [`Compiler::add_relay`] and [`Compiler::add_rejoin`], since they live on different
    /// switches than the one calling `add_backup`.
    ///
    /// Three cases, distinguished by what is already occupying this flow's bucket list:
    /// - **Case A**: no backup bucket exists yet. A new fast-failover group is allocated,
    ///   wrapping the existing plain outputs plus the new protected bucket.
    /// - **Case B**: an existing live bucket already reroutes via the exact same `reroute_port`
    ///   and `new_tag` (two subscribers' backups converging on the same alternate route) and this
    ///   call does not itself need further nesting (`needs_more = false`). The two protected
    ///   ports are coalesced into that bucket's port list.
    /// - **Case C**: this backup diverges from whatever already occupies the bucket list (no
    ///   coalesce target, or `needs_more = true` because this backup will itself be protected one
    ///   level deeper and so needs an unambiguous bucket index of its own). The existing prefix is
    ///   cloned into a brand new group with its entries drop-marked, and the new bucket is
    ///   appended live to the clone.
    #[allow(clippy::too_many_arguments)]
    pub fn add_backup(
        &mut self,
        driver: &mut dyn SwitchDriver,
        switch: NodeId,
        group: GroupIp,
        source: SourceIp,
        origin_tag: Option<u16>,
        protected_port: PortNumber,
        reroute_port: PortNumber,
        new_tag: u16,
        needs_more: bool,
        inbound_port: Option<PortNumber>,
    ) -> Result<(), CompilerError> {
        let key = (switch, group, source, origin_tag);
        if !self.flows.contains_key(&key) {
            self.flows.insert(
                key,
                FlowState {
                    plain_outputs: vec![protected_port],
                    inbound_port,
                    ..Default::default()
                },
            );
        }
        let mut state = self.flows.get(&key).expect("just inserted above").clone();

        let already_live = state
            .backup_buckets
            .iter()
            .chain(state.clones.iter().filter_map(|c| c.buckets.last()))
            .any(|b| !b.is_drop && b.protected_ports.contains(&protected_port));
        if already_live {
            return Err(CompilerError::AlreadyInstalled {
                switch,
                backup_port: protected_port,
            });
        }

        let new_bucket = BackupBucket {
            protected_ports: vec![protected_port],
            tag: new_tag,
            reroute_port,
            relay_switches: Vec::new(),
            is_drop: false,
        };

        let coalesce_target = if needs_more {
            None
        } else {
            state
                .backup_buckets
                .iter()
                .position(|b| !b.is_drop && b.reroute_port == reroute_port && b.tag == new_tag)
        };

        if state.backup_buckets.is_empty() {
            // Case A: first backup ever attached to this flow — promote the plain outputs into
            // a fast-failover group.
            let gid = self.alloc_group(switch);
            state.backup_buckets.push(new_bucket);
            let buckets = Self::rebuild_buckets(&state);
            driver.add_group(switch, gid, buckets)?;
            driver.modify_flow_strict(
                switch,
                FlowEntry {
                    table: Self::home_table(origin_tag),
                    matching: Self::flow_match(group, source, origin_tag, state.inbound_switch),
                    priority: Self::home_priority(origin_tag),
                    actions: vec![Action::OutputGroup(gid)],
                },
            )?;
            state.primary_group = Some(gid);
        } else if let Some(idx) = coalesce_target {
            // Case B: coalesce into the bucket already rerouting this way.
            state.backup_buckets[idx].protected_ports.push(protected_port);
            let gid = state.primary_group.expect("non-empty backup_buckets implies an allocated group");
            let buckets = Self::rebuild_buckets(&state);
            driver.modify_group(switch, gid, buckets)?;
        } else {
            // Case C: divergent — clone the existing prefix, drop-marked, into a fresh group and
            // append this backup as the clone's own live bucket.
            let clone_prefix: Vec<BackupBucket> = state
                .backup_buckets
                .iter()
                .cloned()
                .map(|mut b| {
                    b.relay_switches.clear();
                    b.is_drop = true;
                    b
                })
                .collect();
            let new_gid = self.alloc_group(switch);
            let mut clone_buckets = clone_prefix;
            clone_buckets.push(new_bucket);
            let driver_buckets: Vec<Bucket> = clone_buckets
                .iter()
                .map(|b| Self::bucket_from(b, state.inbound_port))
                .collect();
            driver.add_group(switch, new_gid, driver_buckets)?;
            state.clones.push(ClonedGroup {
                group_id: new_gid,
                buckets: clone_buckets,
            });
        }

        driver.barrier(switch)?;
        self.flows.insert(key, state);
        Ok(())
    }

    /// Installs a pass-through table-1 rule on an intermediate switch along a backup path: match
    /// traffic tagged `tag` and forward it to `out_port`, without touching the tag.
    #[allow(clippy::too_many_arguments)]
    pub fn add_relay(
        &mut self,
        driver: &mut dyn SwitchDriver,
        origin_switch: NodeId,
        relay_switch: NodeId,
        group: GroupIp,
        source: SourceIp,
        origin_tag: Option<u16>,
        protected_port: PortNumber,
        tag: u16,
        out_port: PortNumber,
    ) -> Result<(), CompilerError> {
        driver.add_flow(
            relay_switch,
            FlowEntry {
                table: 1,
                matching: FlowMatch {
                    group,
                    source,
                    vlan: Some(tag),
                    inbound_switch: None,
                },
                priority: Priority::High,
                actions: vec![Action::Output(out_port)],
            },
        )?;
        self.track_relay(origin_switch, group, source, origin_tag, protected_port, relay_switch)
    }

    /// Installs the rejoin table-1 rule: pops the tag and delivers via the primary's normal
    /// output ports from this point on.
    #[allow(clippy::too_many_arguments)]
    pub fn add_rejoin(
        &mut self,
        driver: &mut dyn SwitchDriver,
        origin_switch: NodeId,
        rejoin_switch: NodeId,
        group: GroupIp,
        source: SourceIp,
        origin_tag: Option<u16>,
        protected_port: PortNumber,
        tag: u16,
        out_ports: Vec<PortNumber>,
    ) -> Result<(), CompilerError> {
        let mut actions = vec![Action::PopVlan];
        actions.extend(out_ports.into_iter().map(Action::Output));
        driver.add_flow(
            rejoin_switch,
            FlowEntry {
                table: 1,
                matching: FlowMatch {
                    group,
                    source,
                    vlan: Some(tag),
                    inbound_switch: None,
                },
                priority: Priority::High,
                actions,
            },
        )?;
        self.track_relay(origin_switch, group, source, origin_tag, protected_port, rejoin_switch)
    }

    fn track_relay(
        &mut self,
        origin_switch: NodeId,
        group: GroupIp,
        source: SourceIp,
        origin_tag: Option<u16>,
        protected_port: PortNumber,
        relay_switch: NodeId,
    ) -> Result<(), CompilerError> {
        let state = self
            .flows
            .get_mut(&(origin_switch, group, source, origin_tag))
            .ok_or(CompilerError::SwitchAbsent(origin_switch))?;
        if let Some(bucket) = state
            .backup_buckets
            .iter_mut()
            .find(|b| !b.is_drop && b.protected_ports.contains(&protected_port))
        {
            bucket.relay_switches.push(relay_switch);
        } else if let Some(clone) = state
            .clones
            .iter_mut()
            .find(|c| c.buckets.last().map(|b| !b.is_drop && b.protected_ports.contains(&protected_port)).unwrap_or(false))
        {
            clone.buckets.last_mut().expect("checked above").relay_switches.push(relay_switch);
        }
        Ok(())
    }

    /// §4.4.5 — removes backup protection for `protected_port` from the flow keyed by
    /// `(switch, group, source, origin_tag)`, demoting the rule back to a plain `Output` action
    /// if this was the last remaining bucket, or deleting a Case-C clone outright if the removed
    /// bucket was one.
    pub fn remove_backup(
        &mut self,
        driver: &mut dyn SwitchDriver,
        switch: NodeId,
        group: GroupIp,
        source: SourceIp,
        origin_tag: Option<u16>,
        protected_port: PortNumber,
    ) -> Result<(), CompilerError> {
        let key = (switch, group, source, origin_tag);
        let mut state = self.flows.get(&key).ok_or(CompilerError::SwitchAbsent(switch))?.clone();

        if let Some(idx) = state
            .backup_buckets
            .iter()
            .position(|b| !b.is_drop && b.protected_ports.contains(&protected_port))
        {
            let relays = state.backup_buckets[idx].relay_switches.clone();
            let tag = state.backup_buckets[idx].tag;
            for relay_switch in &relays {
                driver.delete_flow_strict(
                    *relay_switch,
                    FlowEntry {
                        table: 1,
                        matching: FlowMatch {
                            group,
                            source,
                            vlan: Some(tag),
                            inbound_switch: None,
                        },
                        priority: Priority::High,
                        actions: Vec::new(),
                    },
                )?;
            }
            state.backup_buckets[idx].protected_ports.retain(|p| *p != protected_port);
            if state.backup_buckets[idx].protected_ports.is_empty() {
                state.backup_buckets.remove(idx);
            }
        } else if let Some(cidx) = state.clones.iter().position(|c| {
            c.buckets
                .last()
                .map(|b| !b.is_drop && b.protected_ports.contains(&protected_port))
                .unwrap_or(false)
        }) {
            let clone = state.clones.remove(cidx);
            let live = clone.buckets.last().expect("clone always has a live bucket");
            for relay_switch in &live.relay_switches {
                driver.delete_flow_strict(
                    *relay_switch,
                    FlowEntry {
                        table: 1,
                        matching: FlowMatch {
                            group,
                            source,
                            vlan: Some(live.tag),
                            inbound_switch: None,
                        },
                        priority: Priority::High,
                        actions: Vec::new(),
                    },
                )?;
            }
            driver.delete_group(switch, clone.group_id)?;
        } else {
            return Err(CompilerError::NoSuchFlow(switch));
        }

        if state.backup_buckets.is_empty() {
            if let Some(gid) = state.primary_group.take() {
                driver.delete_group(switch, gid)?;
                driver.modify_flow_strict(
                    switch,
                    FlowEntry {
                        table: Self::home_table(origin_tag),
                        matching: Self::flow_match(group, source, origin_tag, state.inbound_switch),
                        priority: Self::home_priority(origin_tag),
                        actions: state
                            .plain_outputs
                            .iter()
                            .map(|p| Self::output_action(*p, state.inbound_port))
                            .collect(),
                    },
                )?;
            }
        } else if let Some(gid) = state.primary_group {
            let buckets = Self::rebuild_buckets(&state);
            driver.modify_group(switch, gid, buckets)?;
        }

        driver.barrier(switch)?;
        self.flows.insert(key, state);
        Ok(())
    }

    /// `true` if any flow state (primary or nested) is still tracked for `switch` under
    /// `(group, source, tag)`. Used by the Tree Builder to decide whether a backup's root still
    /// has forwarding state of its own to tear down during a leave.
    pub(crate) fn has_flow(&self, switch: NodeId, group: GroupIp, source: SourceIp, tag: Option<u16>) -> bool {
        self.flows.contains_key(&(switch, group, source, tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch_driver::test_driver::FakeDriver;

    fn sw(id: u64) -> NodeId {
        NodeId::Switch(id)
    }

    #[test]
    fn add_flow_installs_plain_output_rule() {
        let mut driver = FakeDriver::default();
        let mut compiler = Compiler::new();
        compiler
            .add_flow(&mut driver, sw(1), GroupIp(1), SourceIp(1), vec![2, 3], None)
            .unwrap();

        let flows = &driver.flows[&sw(1)];
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].actions, vec![Action::Output(2), Action::Output(3)]);
    }

    #[test]
    fn add_backup_promotes_plain_output_to_group() {
        let mut driver = FakeDriver::default();
        let mut compiler = Compiler::new();
        compiler
            .add_flow(&mut driver, sw(1), GroupIp(1), SourceIp(1), vec![2], None)
            .unwrap();
        compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 2, 5, 10, false, None)
            .unwrap();

        let primary = driver.flows[&sw(1)].iter().find(|f| f.table == 0).unwrap();
        assert!(matches!(primary.actions[0], Action::OutputGroup(_)));
        assert_eq!(driver.groups.len(), 1);
        assert_eq!(driver.barriers, 1);
    }

    #[test]
    fn add_backup_twice_on_same_port_errors() {
        let mut driver = FakeDriver::default();
        let mut compiler = Compiler::new();
        compiler
            .add_flow(&mut driver, sw(1), GroupIp(1), SourceIp(1), vec![2], None)
            .unwrap();
        compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 2, 5, 10, false, None)
            .unwrap();

        let err = compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 2, 6, 11, false, None)
            .unwrap_err();
        assert_eq!(
            err,
            CompilerError::AlreadyInstalled {
                switch: sw(1),
                backup_port: 2
            }
        );
    }

    #[test]
    fn add_backup_coalesces_same_reroute_into_shared_bucket() {
        // Scenario C: two subscribers whose backups exit the same switch via the same reroute
        // port and tag must share one bucket rather than erroring or duplicating groups.
        let mut driver = FakeDriver::default();
        let mut compiler = Compiler::new();
        compiler
            .add_flow(&mut driver, sw(1), GroupIp(1), SourceIp(1), vec![2, 3], None)
            .unwrap();
        compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 2, 9, 20, false, None)
            .unwrap();
        compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 3, 9, 20, false, None)
            .unwrap();

        assert_eq!(driver.groups.len(), 1);
        let buckets = driver.groups.values().next().unwrap();
        let reroute_bucket = buckets.iter().find(|b| !b.is_drop && b.watch_ports.len() > 1).unwrap();
        assert_eq!(reroute_bucket.watch_ports, vec![2, 3]);
    }

    #[test]
    fn add_backup_clones_group_when_divergent_and_needs_more() {
        // Scenario D: a second, independently-protected backup for the same flow forces Case C —
        // a brand new group cloning the first bucket as a drop marker.
        let mut driver = FakeDriver::default();
        let mut compiler = Compiler::new();
        compiler
            .add_flow(&mut driver, sw(1), GroupIp(1), SourceIp(1), vec![2], None)
            .unwrap();
        compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 2, 5, 10, false, None)
            .unwrap();
        compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 7, 8, 11, true, None)
            .unwrap();

        assert_eq!(driver.groups.len(), 2, "base group plus one Case-C clone");
        let clone = driver
            .groups
            .values()
            .find(|buckets| buckets.iter().any(|b| b.is_drop))
            .expect("a clone with a drop-marked prefix must exist");
        assert!(clone.first().unwrap().is_drop);
        assert!(!clone.last().unwrap().is_drop);
        assert_eq!(clone.last().unwrap().watch_ports, vec![7]);
    }

    #[test]
    fn remove_backup_demotes_group_back_to_plain_output() {
        let mut driver = FakeDriver::default();
        let mut compiler = Compiler::new();
        compiler
            .add_flow(&mut driver, sw(1), GroupIp(1), SourceIp(1), vec![2], None)
            .unwrap();
        compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 2, 5, 10, false, None)
            .unwrap();
        compiler
            .remove_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 2)
            .unwrap();

        let primary = driver.flows[&sw(1)].iter().find(|f| f.table == 0).unwrap();
        assert_eq!(primary.actions, vec![Action::Output(2)]);
        assert!(driver.groups.is_empty());
    }

    #[test]
    fn remove_flow_tears_down_backups_too() {
        let mut driver = FakeDriver::default();
        let mut compiler = Compiler::new();
        compiler
            .add_flow(&mut driver, sw(1), GroupIp(1), SourceIp(1), vec![2], None)
            .unwrap();
        compiler
            .add_backup(&mut driver, sw(1), GroupIp(1), SourceIp(1), None, 2, 5, 10, false, None)
            .unwrap();
        compiler
            .remove_flow(&mut driver, sw(1), GroupIp(1), SourceIp(1))
            .unwrap();

        assert!(driver.flows[&sw(1)].is_empty());
        assert!(driver.groups.is_empty());
    }
}
