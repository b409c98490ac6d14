//! In-memory value model: CRDT nodes and the registers that reference them.
//!
//! Live nodes form an ownership forest rooted at [`ROOT_LV`]: a register
//! pair holding `RegisterValue::Crdt(id)` owns the node `id`, no node has
//! two owners, and a node is live iff it is reachable from the root. The
//! merge engine preserves that equivalence on every transition.

use mvcs_causal::{LV, ROOT_LV};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The primitive value domain. Fixed so every replica serializes values
/// identically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Primitive::Bool(v)
    }
}

impl From<i64> for Primitive {
    fn from(v: i64) -> Self {
        Primitive::Int(v)
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Primitive::Float(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Primitive::Str(v.to_string())
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Primitive::Str(v)
    }
}

/// One stored register value: a primitive leaf, or an owning reference to a
/// nested CRDT node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RegisterValue {
    Primitive(Primitive),
    Crdt(LV),
}

/// The node variants a write can create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrdtKind {
    Map,
    Register,
    Set,
}

impl CrdtKind {
    pub fn name(self) -> &'static str {
        match self {
            CrdtKind::Map => "map",
            CrdtKind::Register => "register",
            CrdtKind::Set => "set",
        }
    }
}

/// A multi-value register: every write that has not been causally superseded
/// survives as a `(LV, value)` pair, and surviving pairs are pairwise
/// concurrent.
///
/// Pairs are kept sorted ascending by LV. That is a canonical order for
/// traversal and serialization only; read-time priority among pairs is the
/// causal graph's tie-break, not this ordering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MvRegister {
    pairs: Vec<(LV, RegisterValue)>,
}

impl MvRegister {
    /// A register holding exactly one write.
    pub fn single(lv: LV, value: RegisterValue) -> Self {
        Self {
            pairs: vec![(lv, value)],
        }
    }

    pub(crate) fn from_pairs(mut pairs: Vec<(LV, RegisterValue)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Self { pairs }
    }

    pub fn pairs(&self) -> &[(LV, RegisterValue)] {
        &self.pairs
    }

    /// The LVs of the surviving writes.
    pub fn versions(&self) -> Vec<LV> {
        self.pairs.iter().map(|(lv, _)| *lv).collect()
    }

    /// More than one write survives: concurrent updates nobody has
    /// superseded yet.
    pub fn is_conflicted(&self) -> bool {
        self.pairs.len() > 1
    }
}

/// A live CRDT node, identified by the LV of the operation that created it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CrdtNode {
    /// Named registers.
    Map(BTreeMap<String, MvRegister>),
    /// A single register.
    Register(MvRegister),
    /// Observed-remove set: entries keyed by the inserting operation's LV.
    /// Entry keys are never reused, so concurrent inserts never collide.
    Set(BTreeMap<LV, RegisterValue>),
}

impl CrdtNode {
    pub fn kind(&self) -> CrdtKind {
        match self {
            CrdtNode::Map(_) => CrdtKind::Map,
            CrdtNode::Register(_) => CrdtKind::Register,
            CrdtNode::Set(_) => CrdtKind::Set,
        }
    }
}

/// The single mutable table of live nodes.
///
/// Constructed holding the root map; all further mutation flows through the
/// merge engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeTable {
    nodes: BTreeMap<LV, CrdtNode>,
}

impl NodeTable {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_LV, CrdtNode::Map(BTreeMap::new()));
        Self { nodes }
    }

    pub fn get(&self, id: LV) -> Option<&CrdtNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn map(&self, id: LV) -> Option<&BTreeMap<String, MvRegister>> {
        match self.nodes.get(&id) {
            Some(CrdtNode::Map(entries)) => Some(entries),
            _ => None,
        }
    }

    pub(crate) fn map_mut(&mut self, id: LV) -> Option<&mut BTreeMap<String, MvRegister>> {
        match self.nodes.get_mut(&id) {
            Some(CrdtNode::Map(entries)) => Some(entries),
            _ => None,
        }
    }

    pub(crate) fn register(&self, id: LV) -> Option<&MvRegister> {
        match self.nodes.get(&id) {
            Some(CrdtNode::Register(reg)) => Some(reg),
            _ => None,
        }
    }

    pub(crate) fn register_mut(&mut self, id: LV) -> Option<&mut MvRegister> {
        match self.nodes.get_mut(&id) {
            Some(CrdtNode::Register(reg)) => Some(reg),
            _ => None,
        }
    }

    pub(crate) fn set_mut(&mut self, id: LV) -> Option<&mut BTreeMap<LV, RegisterValue>> {
        match self.nodes.get_mut(&id) {
            Some(CrdtNode::Set(entries)) => Some(entries),
            _ => None,
        }
    }

    pub(crate) fn insert(&mut self, id: LV, node: CrdtNode) {
        self.nodes.insert(id, node);
    }

    pub(crate) fn remove(&mut self, id: LV) -> Option<CrdtNode> {
        self.nodes.remove(&id)
    }

    pub fn contains(&self, id: LV) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every live node, ascending.
    pub fn ids(&self) -> impl Iterator<Item = LV> + '_ {
        self.nodes.keys().copied()
    }
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_table_holds_root_map() {
        let table = NodeTable::new();
        assert_eq!(table.len(), 1);
        assert!(matches!(table.get(ROOT_LV), Some(CrdtNode::Map(_))));
    }

    #[test]
    fn test_register_pairs_sort_by_lv() {
        let reg = MvRegister::from_pairs(vec![
            (7, RegisterValue::Primitive(Primitive::Int(2))),
            (3, RegisterValue::Primitive(Primitive::Int(1))),
        ]);
        assert_eq!(reg.versions(), vec![3, 7]);
        assert!(reg.is_conflicted());
    }

    #[test]
    fn test_single_register_is_not_conflicted() {
        let reg = MvRegister::single(0, RegisterValue::Primitive(Primitive::Null));
        assert!(!reg.is_conflicted());
        assert_eq!(reg.versions(), vec![0]);
    }

    #[test]
    fn test_node_table_serde_round_trip() {
        let mut table = NodeTable::new();
        table.insert(
            4,
            CrdtNode::Register(MvRegister::single(
                4,
                RegisterValue::Primitive(Primitive::Str("x".into())),
            )),
        );
        let mut set = BTreeMap::new();
        set.insert(9, RegisterValue::Crdt(4));
        table.insert(8, CrdtNode::Set(set));

        let encoded = serde_json::to_string(&table).unwrap();
        let decoded: NodeTable = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, table);
    }
}
