//! # mvcs-causal
//!
//! Causal graph for the Multi-Value Causal Store (MVCS).
//!
//! Every operation a replica learns of, locally generated or delivered from
//! a peer, is admitted here and assigned a dense local version (LV) in
//! admission order. The graph records each version's parents and answers the
//! questions the merge engine asks:
//!
//! - Translation between LVs and globally unique `(agent, seq)` raw versions
//! - The current causal frontier (the tips of known history)
//! - Dominance: is a version causally contained in a frontier?
//! - Tie-break: which of a set of concurrent writes wins, deterministically
//!   and identically on every replica
//!
//! Admission is the only mutation; every query is pure.

pub mod error;
pub mod graph;
pub mod version;

pub use error::CausalError;
pub use graph::{Admission, CausalGraph};
pub use version::{RawVersion, LV, ROOT_AGENT, ROOT_LV};
