//! Operations: the unit of replication.
//!
//! An operation names its author (`id`), the causal frontier the author had
//! observed (`global_parents`), the node it targets, and what it does there.
//! The encoded shape is the natural serde data model of these types and is
//! deterministic for a given value.

use crate::node::{CrdtKind, Primitive};
use mvcs_causal::RawVersion;
use serde::{Deserialize, Serialize};

/// The payload of a write: a primitive, or an instruction to create a fresh
/// nested CRDT of the given kind. The created node's id is the writing
/// operation's own version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CreateValue {
    Primitive(Primitive),
    NewCrdt(CrdtKind),
}

impl From<Primitive> for CreateValue {
    fn from(p: Primitive) -> Self {
        CreateValue::Primitive(p)
    }
}

impl From<bool> for CreateValue {
    fn from(v: bool) -> Self {
        CreateValue::Primitive(v.into())
    }
}

impl From<i64> for CreateValue {
    fn from(v: i64) -> Self {
        CreateValue::Primitive(v.into())
    }
}

impl From<f64> for CreateValue {
    fn from(v: f64) -> Self {
        CreateValue::Primitive(v.into())
    }
}

impl From<&str> for CreateValue {
    fn from(v: &str) -> Self {
        CreateValue::Primitive(v.into())
    }
}

impl From<String> for CreateValue {
    fn from(v: String) -> Self {
        CreateValue::Primitive(v.into())
    }
}

/// What an operation does to its target node.
///
/// `local_parents` on the write actions is the author's view of the target
/// register's surviving pairs: the writes this op claims to supersede.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OpAction {
    /// Overwrite a register node.
    RegisterSet {
        local_parents: Vec<RawVersion>,
        value: CreateValue,
    },
    /// Overwrite one key's register in a map node.
    MapSet {
        key: String,
        local_parents: Vec<RawVersion>,
        value: CreateValue,
    },
    /// Insert a new entry into a set node.
    SetInsert { value: CreateValue },
    /// Delete an observed entry from a set node.
    SetDelete { target: RawVersion },
}

impl OpAction {
    /// The node variant this action applies to.
    pub fn expected_kind(&self) -> CrdtKind {
        match self {
            OpAction::RegisterSet { .. } => CrdtKind::Register,
            OpAction::MapSet { .. } => CrdtKind::Map,
            OpAction::SetInsert { .. } | OpAction::SetDelete { .. } => CrdtKind::Set,
        }
    }
}

/// A single replicated operation.
///
/// Transports must deliver an op only after every version in
/// `global_parents` has been delivered; within that constraint delivery
/// order does not matter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: RawVersion,
    pub global_parents: Vec<RawVersion>,
    pub target: RawVersion,
    pub action: OpAction,
}
