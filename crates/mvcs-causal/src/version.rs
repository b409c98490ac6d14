//! Version identifiers.
//!
//! A replica numbers every operation it learns of with a dense local version
//! (LV). LVs are cheap to compare and index but mean nothing outside the
//! replica that assigned them; the globally meaningful identifier is the
//! `(agent, seq)` raw version carried on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local version: dense integer id for an operation on this replica.
pub type LV = usize;

/// Reserved local version of the root of the ownership forest. Never
/// produced by admission.
pub const ROOT_LV: LV = usize::MAX;

/// Reserved agent name backing [`RawVersion::root`]. Rejected for real
/// operations.
pub const ROOT_AGENT: &str = "ROOT";

/// Globally unique operation id, independent of any replica's local
/// numbering. Ordered by `(agent, seq)`; this ordering is what makes
/// tie-breaks agree across replicas.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RawVersion {
    pub agent: String,
    pub seq: u64,
}

impl RawVersion {
    pub fn new(agent: impl Into<String>, seq: u64) -> Self {
        Self {
            agent: agent.into(),
            seq,
        }
    }

    /// The reserved id that maps to [`ROOT_LV`].
    pub fn root() -> Self {
        Self::new(ROOT_AGENT, 0)
    }

    pub fn is_root(&self) -> bool {
        self.agent == ROOT_AGENT
    }
}

impl fmt::Display for RawVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent, self.seq)
    }
}

impl From<(&str, u64)> for RawVersion {
    fn from((agent, seq): (&str, u64)) -> Self {
        Self::new(agent, seq)
    }
}
