//! Module containing the control plane's single runtime tunable.

/// Configuration for the resilient multicast control plane.
///
/// There is exactly one tunable at this layer: the per-link protection level. File/CLI parsing
/// is left to the embedder, the same way `snowcap`'s configuration parsing lives in its `_main`
/// binary rather than in the `snowcap` library crate itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of simultaneous link failures protected against per primary edge. This is
    /// also the recursion depth of the backup-tree hierarchy.
    pub protection_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self { protection_level: 3 }
    }
}
