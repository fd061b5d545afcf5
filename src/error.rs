//! Module containing all error types.

use thiserror::Error;

use crate::types::{GroupIp, NodeId, SourceIp};

/// Errors raised while compiling tree/backup edges into switch-local forwarding state.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum CompilerError {
    /// `add_backup` was asked to install a `(backup_port, flow_key)` pair that is already
    /// registered in `ff_groups`.
    #[error("backup for port {backup_port} already installed on {switch:?}")]
    AlreadyInstalled {
        /// Switch the backup was being installed on.
        switch: NodeId,
        /// Output port the backup bucket would have used.
        backup_port: i32,
    },
    /// An operation referenced a switch that the Topology Oracle has already marked as gone.
    /// Per the spec, this is allowed to fail silently at the driver boundary; the compiler
    /// still reports it so the caller can log it.
    #[error("switch {0:?} is no longer present in the topology")]
    SwitchAbsent(NodeId),
    /// A flow/group removal referenced a flow key that has no installed state.
    #[error("no installed flow for the given key on {0:?}")]
    NoSuchFlow(NodeId),
}

/// Errors raised while the Tree Builder walks the join/leave algorithms.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum BuilderError {
    /// The configured path strategy returned an empty path: no admissible route exists.
    #[error("no admissible path found for subscriber {subscriber:?} on ({group:?}, {source_ip:?})")]
    NoPath {
        /// Multicast group being joined.
        group: GroupIp,
        /// Multicast source being joined.
        source_ip: SourceIp,
        /// Subscriber that could not be attached.
        subscriber: NodeId,
    },
    /// The subscriber is already present in the tree (or the group already has a primary tree
    /// on a `create`). Idempotent: the caller should treat this as success.
    #[error("subscriber {subscriber:?} is already attached to ({group:?}, {source_ip:?})")]
    DuplicateRequest {
        /// Multicast group.
        group: GroupIp,
        /// Multicast source.
        source_ip: SourceIp,
        /// Subscriber already present.
        subscriber: NodeId,
    },
    /// A join/leave/remove targeted a `(group, source)` pair with no known primary tree.
    #[error("no tree registered for ({0:?}, {1:?})")]
    UnknownGroup(GroupIp, SourceIp),
    /// Propagated from the Forwarding Compiler.
    #[error("compiler error: {0}")]
    Compiler(#[from] CompilerError),
}

/// Top-level error type returned by the Controller façade.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ControlPlaneError {
    /// Propagated from the Tree Builder.
    #[error("builder error: {0}")]
    Builder(#[from] BuilderError),
    /// Propagated from the Forwarding Compiler directly (e.g. topology-driven teardown that
    /// does not go through the builder).
    #[error("compiler error: {0}")]
    Compiler(#[from] CompilerError),
}

impl BuilderError {
    /// Returns `true` for error kinds the spec defines as idempotent no-ops: the caller should
    /// log them and report success to its own caller rather than aborting.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            BuilderError::DuplicateRequest { .. } | BuilderError::UnknownGroup(..)
        )
    }
}

impl CompilerError {
    /// Returns `true` for error kinds that are expected once a switch has left the topology and
    /// should be swallowed rather than surfaced as a real failure.
    pub fn is_switch_absent(&self) -> bool {
        matches!(self, CompilerError::SwitchAbsent(_))
    }
}
