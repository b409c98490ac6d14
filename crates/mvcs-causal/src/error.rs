//! Error types for the causal graph.

use crate::version::RawVersion;
use thiserror::Error;

/// Errors raised while admitting or translating versions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CausalError {
    /// Translation of an id that was never admitted. Operations must be
    /// delivered after their parents; hitting this means the transport broke
    /// that contract.
    #[error("unknown version {0}")]
    UnknownVersion(RawVersion),

    /// The agent name "ROOT" is reserved for the root version.
    #[error("agent name {0:?} is reserved")]
    ReservedAgent(String),
}

pub type Result<T> = std::result::Result<T, CausalError>;
