//! Error types for the replica core.

use mvcs_causal::{CausalError, RawVersion, LV};
use thiserror::Error;

/// Errors raised while applying operations.
///
/// Every variant is fatal to the offending call: the replica is left
/// untouched and the caller is responsible for quarantining the operation.
/// The soft conditions (duplicate delivery, reclaimed target) are not
/// errors; they are reported through the apply outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    /// Node creation with an id that is already live.
    #[error("node {0} already exists")]
    DuplicateNode(LV),

    /// The node targeted by a local constructor is not live.
    #[error("node {0} is not live")]
    MissingNode(LV),

    /// The action kind does not match the target node's variant.
    #[error("operation expects a {expected} node but the target is a {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The op would retain a register pair that its own parents dominate.
    /// The author observed that pair without superseding it, so the op is
    /// malformed.
    #[error("operation {op} fails to supersede {version} despite observing it")]
    InvalidParents { op: RawVersion, version: RawVersion },

    /// A locally constructed op reused an already-admitted id.
    #[error("version {0} has already been applied")]
    AlreadyApplied(RawVersion),

    #[error(transparent)]
    Causal(#[from] CausalError),
}

pub type Result<T> = std::result::Result<T, DbError>;
