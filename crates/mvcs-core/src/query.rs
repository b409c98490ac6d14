//! Materialization: walk the ownership forest and resolve conflicts.
//!
//! Reads never mutate. Conflict resolution happens here, at query time: the
//! causal graph's tie-break picks one surviving write per register, so two
//! replicas that admitted the same operations render identical trees no
//! matter what order they learned them in.

use crate::node::{CrdtNode, MvRegister, Primitive, RegisterValue};
use crate::replica::Replica;
use mvcs_causal::{RawVersion, LV, ROOT_LV};
use std::collections::BTreeMap;

/// A plain, conflict-resolved value tree.
#[derive(Clone, Debug, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A materialized map node.
    Map(BTreeMap<String, DbValue>),
    /// A materialized set node, keyed by the raw version of each insert:
    /// the stable cross-replica identity of the entry.
    Set(BTreeMap<RawVersion, DbValue>),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            DbValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a key of a materialized map.
    pub fn get(&self, key: &str) -> Option<&DbValue> {
        match self {
            DbValue::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Render to JSON. Set entries are keyed by their `agent/seq` id.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DbValue::Null => serde_json::Value::Null,
            DbValue::Bool(b) => (*b).into(),
            DbValue::Int(i) => (*i).into(),
            DbValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DbValue::Str(s) => s.clone().into(),
            DbValue::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            DbValue::Set(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&Primitive> for DbValue {
    fn from(p: &Primitive) -> Self {
        match p {
            Primitive::Null => DbValue::Null,
            Primitive::Bool(b) => DbValue::Bool(*b),
            Primitive::Int(i) => DbValue::Int(*i),
            Primitive::Float(f) => DbValue::Float(*f),
            Primitive::Str(s) => DbValue::Str(s.clone()),
        }
    }
}

impl Replica {
    /// Materialize the whole database from the root map.
    pub fn get(&self) -> DbValue {
        self.get_at(ROOT_LV)
    }

    /// Materialize the value tree rooted at one node. A reclaimed node
    /// renders as `Null`.
    pub fn get_at(&self, id: LV) -> DbValue {
        match self.nodes().get(id) {
            None => DbValue::Null,
            Some(CrdtNode::Register(reg)) => self.read_register(reg),
            Some(CrdtNode::Map(entries)) => DbValue::Map(
                entries
                    .iter()
                    .map(|(key, reg)| (key.clone(), self.read_register(reg)))
                    .collect(),
            ),
            Some(CrdtNode::Set(entries)) => DbValue::Set(
                entries
                    .iter()
                    .map(|(lv, value)| (self.causal_graph().lv_to_raw(*lv), self.read_value(value)))
                    .collect(),
            ),
        }
    }

    /// The surviving concurrent writes of a register node, each resolved
    /// value paired with its authoring version. Empty when the node holds a
    /// single write or is not a live register.
    pub fn conflicts_at(&self, register_id: LV) -> Vec<(RawVersion, DbValue)> {
        match self.nodes().get(register_id) {
            Some(CrdtNode::Register(reg)) => self.surviving_writes(reg),
            _ => Vec::new(),
        }
    }

    /// The surviving concurrent writes of one map key, each resolved value
    /// paired with its authoring version. Empty when the key holds a single
    /// write or is unknown.
    pub fn conflicts(&self, map_id: LV, key: &str) -> Vec<(RawVersion, DbValue)> {
        let Some(CrdtNode::Map(entries)) = self.nodes().get(map_id) else {
            return Vec::new();
        };
        match entries.get(key) {
            Some(reg) => self.surviving_writes(reg),
            None => Vec::new(),
        }
    }

    fn surviving_writes(&self, reg: &MvRegister) -> Vec<(RawVersion, DbValue)> {
        if !reg.is_conflicted() {
            return Vec::new();
        }
        reg.pairs()
            .iter()
            .map(|(lv, value)| (self.causal_graph().lv_to_raw(*lv), self.read_value(value)))
            .collect()
    }

    fn read_register(&self, reg: &MvRegister) -> DbValue {
        match self.causal_graph().tie_break(reg.pairs()) {
            Some((_, value)) => self.read_value(value),
            None => DbValue::Null,
        }
    }

    fn read_value(&self, value: &RegisterValue) -> DbValue {
        match value {
            RegisterValue::Primitive(p) => p.into(),
            RegisterValue::Crdt(id) => self.get_at(*id),
        }
    }
}
