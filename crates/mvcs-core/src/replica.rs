//! The replica: causal admission, register merge, recursive reclamation.
//!
//! A replica is single-threaded and synchronous. Operations are applied in
//! the order they are delivered; the materialized state depends only on the
//! set of applied operations, provided each op's parents arrive first.

use crate::error::{DbError, Result};
use crate::node::{CrdtKind, CrdtNode, MvRegister, NodeTable, Primitive, RegisterValue};
use crate::op::{CreateValue, OpAction, Operation};
use mvcs_causal::{Admission, CausalGraph, RawVersion, LV};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Result of delivering an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The op was admitted and assigned this local version.
    Applied(LV),
    /// The op was already known; nothing changed.
    Duplicate,
}

impl ApplyOutcome {
    pub fn lv(self) -> Option<LV> {
        match self {
            ApplyOutcome::Applied(lv) => Some(lv),
            ApplyOutcome::Duplicate => None,
        }
    }
}

/// A local replica of the store: the causal graph of everything it has
/// learned plus the live node table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    cg: CausalGraph,
    nodes: NodeTable,
}

impl Replica {
    pub fn new() -> Self {
        Self {
            cg: CausalGraph::new(),
            nodes: NodeTable::new(),
        }
    }

    pub fn causal_graph(&self) -> &CausalGraph {
        &self.cg
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Deliver an operation, locally generated or from a peer.
    ///
    /// Re-delivery is idempotent. An op whose target has been reclaimed by a
    /// concurrent overwrite is admitted to the causal graph but has no
    /// effect on the node table.
    pub fn apply_remote_op(&mut self, op: &Operation) -> Result<ApplyOutcome> {
        let lv = match self.cg.add_raw(&op.id, &op.global_parents)? {
            Admission::New(lv) => lv,
            Admission::Duplicate(_) => {
                debug!(op = %op.id, "duplicate delivery ignored");
                return Ok(ApplyOutcome::Duplicate);
            }
        };
        let global_parents = self.cg.raw_to_lv_list(&op.global_parents)?;
        let target = self.cg.raw_to_lv(&op.target)?;

        let found = match self.nodes.get(target) {
            None => return Ok(self.voided(op, lv)),
            Some(node) => node.kind(),
        };
        let expected = op.action.expected_kind();
        if found != expected {
            return Err(DbError::TypeMismatch {
                expected: expected.name(),
                found: found.name(),
            });
        }

        match &op.action {
            OpAction::RegisterSet {
                local_parents,
                value,
            } => {
                let old = self
                    .nodes
                    .register(target)
                    .map(|reg| reg.pairs().to_vec())
                    .unwrap_or_default();
                let local_parents = self.cg.raw_to_lv_list(local_parents)?;
                let merged = self.merge_register(lv, &global_parents, old, &local_parents, value)?;
                if let Some(reg) = self.nodes.register_mut(target) {
                    *reg = merged;
                }
            }
            OpAction::MapSet {
                key,
                local_parents,
                value,
            } => {
                let old = self
                    .nodes
                    .map(target)
                    .and_then(|entries| entries.get(key))
                    .map(|reg| reg.pairs().to_vec())
                    .unwrap_or_default();
                let local_parents = self.cg.raw_to_lv_list(local_parents)?;
                let merged = self.merge_register(lv, &global_parents, old, &local_parents, value)?;
                if let Some(entries) = self.nodes.map_mut(target) {
                    entries.insert(key.clone(), merged);
                }
            }
            OpAction::SetInsert { value } => {
                let stored = self.materialize(lv, value)?;
                if let Some(entries) = self.nodes.set_mut(target) {
                    entries.insert(lv, stored);
                }
            }
            OpAction::SetDelete { target: deleted } => {
                let deleted_lv = self.cg.raw_to_lv(deleted)?;
                let removed = self
                    .nodes
                    .set_mut(target)
                    .and_then(|entries| entries.remove(&deleted_lv));
                // Absent entry: already deleted, or its insert was voided.
                // Concurrent deletes of the same entry land here and no-op.
                if let Some(value) = removed {
                    self.remove_recursive(&value);
                }
            }
        }

        Ok(ApplyOutcome::Applied(lv))
    }

    fn voided(&self, op: &Operation, lv: LV) -> ApplyOutcome {
        warn!(
            op = %op.id,
            target = %op.target,
            "target reclaimed by a concurrent overwrite; operation has no effect"
        );
        ApplyOutcome::Applied(lv)
    }

    /// Merge a new write into a register's surviving pairs.
    ///
    /// Pairs the author observed (named in `local_parents`) are superseded
    /// and their subtrees reclaimed; every other pair is retained. A
    /// retained pair must be concurrent with the new write: if the op's
    /// `global_parents` dominate one, the author observed it without
    /// superseding it and the op is rejected before any state changes.
    ///
    /// This rule is what keeps surviving pairs pairwise concurrent: anyone
    /// who had observed a pair would have named it.
    fn merge_register(
        &mut self,
        new_lv: LV,
        global_parents: &[LV],
        old: Vec<(LV, RegisterValue)>,
        local_parents: &[LV],
        value: &CreateValue,
    ) -> Result<MvRegister> {
        for (v, _) in old.iter().filter(|(v, _)| !local_parents.contains(v)) {
            if self.cg.version_contains(global_parents, *v) {
                return Err(DbError::InvalidParents {
                    op: self.cg.lv_to_raw(new_lv),
                    version: self.cg.lv_to_raw(*v),
                });
            }
        }

        let mut pairs = vec![(new_lv, self.materialize(new_lv, value)?)];
        for (v, value) in old {
            if local_parents.contains(&v) {
                self.remove_recursive(&value);
            } else {
                pairs.push((v, value));
            }
        }
        Ok(MvRegister::from_pairs(pairs))
    }

    /// Turn a write payload into a stored value, creating the nested node
    /// for `NewCrdt` kinds under the writing op's own version.
    fn materialize(&mut self, lv: LV, value: &CreateValue) -> Result<RegisterValue> {
        Ok(match value {
            CreateValue::Primitive(p) => RegisterValue::Primitive(p.clone()),
            CreateValue::NewCrdt(kind) => {
                self.create_crdt(lv, *kind)?;
                RegisterValue::Crdt(lv)
            }
        })
    }

    fn create_crdt(&mut self, id: LV, kind: CrdtKind) -> Result<()> {
        if self.nodes.contains(id) {
            return Err(DbError::DuplicateNode(id));
        }
        let node = match kind {
            CrdtKind::Map => CrdtNode::Map(BTreeMap::new()),
            CrdtKind::Set => CrdtNode::Set(BTreeMap::new()),
            CrdtKind::Register => CrdtNode::Register(MvRegister::single(
                id,
                RegisterValue::Primitive(Primitive::Null),
            )),
        };
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Reclaim the subtree owned by a register value.
    ///
    /// Post-order over the ownership forest; sound because ownership is
    /// acyclic (a child is always created after its ancestors, so no owned
    /// reference can point upward). Primitives and already-reclaimed ids
    /// return immediately.
    fn remove_recursive(&mut self, value: &RegisterValue) {
        let RegisterValue::Crdt(id) = value else {
            return;
        };
        let Some(node) = self.nodes.remove(*id) else {
            return;
        };
        match node {
            CrdtNode::Map(entries) => {
                for reg in entries.values() {
                    for (_, value) in reg.pairs() {
                        self.remove_recursive(value);
                    }
                }
            }
            CrdtNode::Register(reg) => {
                for (_, value) in reg.pairs() {
                    self.remove_recursive(value);
                }
            }
            CrdtNode::Set(entries) => {
                for value in entries.values() {
                    self.remove_recursive(value);
                }
            }
        }
    }

    /// Package a local write to one key of a map node and run it through the
    /// normal delivery path. Returns the op for transport along with its
    /// assigned local version.
    pub fn local_map_insert(
        &mut self,
        id: RawVersion,
        map_id: LV,
        key: &str,
        value: CreateValue,
    ) -> Result<(Operation, LV)> {
        let prior = match self.nodes.get(map_id) {
            Some(CrdtNode::Map(entries)) => entries
                .get(key)
                .map(|reg| reg.versions())
                .unwrap_or_default(),
            Some(node) => return Err(mismatch(CrdtKind::Map, node)),
            None => return Err(DbError::MissingNode(map_id)),
        };
        let action = OpAction::MapSet {
            key: key.to_string(),
            local_parents: self.cg.lv_to_raw_list(&prior),
            value,
        };
        self.build_local_op(id, map_id, action)
    }

    /// Package a local overwrite of a register node.
    pub fn local_register_set(
        &mut self,
        id: RawVersion,
        register_id: LV,
        value: CreateValue,
    ) -> Result<(Operation, LV)> {
        let prior = match self.nodes.get(register_id) {
            Some(CrdtNode::Register(reg)) => reg.versions(),
            Some(node) => return Err(mismatch(CrdtKind::Register, node)),
            None => return Err(DbError::MissingNode(register_id)),
        };
        let action = OpAction::RegisterSet {
            local_parents: self.cg.lv_to_raw_list(&prior),
            value,
        };
        self.build_local_op(id, register_id, action)
    }

    /// Package a local insert into a set node.
    pub fn local_set_insert(
        &mut self,
        id: RawVersion,
        set_id: LV,
        value: CreateValue,
    ) -> Result<(Operation, LV)> {
        match self.nodes.get(set_id) {
            Some(CrdtNode::Set(_)) => {}
            Some(node) => return Err(mismatch(CrdtKind::Set, node)),
            None => return Err(DbError::MissingNode(set_id)),
        }
        self.build_local_op(id, set_id, OpAction::SetInsert { value })
    }

    /// Package a local delete of an observed set entry.
    pub fn local_set_delete(
        &mut self,
        id: RawVersion,
        set_id: LV,
        target: RawVersion,
    ) -> Result<(Operation, LV)> {
        match self.nodes.get(set_id) {
            Some(CrdtNode::Set(_)) => {}
            Some(node) => return Err(mismatch(CrdtKind::Set, node)),
            None => return Err(DbError::MissingNode(set_id)),
        }
        self.build_local_op(id, set_id, OpAction::SetDelete { target })
    }

    fn build_local_op(
        &mut self,
        id: RawVersion,
        target: LV,
        action: OpAction,
    ) -> Result<(Operation, LV)> {
        let op = Operation {
            id,
            global_parents: self.cg.lv_to_raw_list(self.cg.frontier()),
            target: self.cg.lv_to_raw(target),
            action,
        };
        match self.apply_remote_op(&op)? {
            ApplyOutcome::Applied(lv) => Ok((op, lv)),
            ApplyOutcome::Duplicate => Err(DbError::AlreadyApplied(op.id)),
        }
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch(expected: CrdtKind, found: &CrdtNode) -> DbError {
    DbError::TypeMismatch {
        expected: expected.name(),
        found: found.kind().name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvcs_causal::ROOT_LV;

    fn rv(agent: &str, seq: u64) -> RawVersion {
        RawVersion::new(agent, seq)
    }

    fn map_set(id: RawVersion, gp: Vec<RawVersion>, key: &str, lp: Vec<RawVersion>, value: CreateValue) -> Operation {
        Operation {
            id,
            global_parents: gp,
            target: RawVersion::root(),
            action: OpAction::MapSet {
                key: key.to_string(),
                local_parents: lp,
                value,
            },
        }
    }

    #[test]
    fn test_apply_assigns_lv() {
        let mut db = Replica::new();
        let op = map_set(rv("seph", 0), vec![], "yo", vec![], 123i64.into());
        let outcome = db.apply_remote_op(&op).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied(0));
    }

    #[test]
    fn test_duplicate_delivery_is_reported_and_ignored() {
        let mut db = Replica::new();
        let op = map_set(rv("seph", 0), vec![], "yo", vec![], 123i64.into());
        db.apply_remote_op(&op).unwrap();
        let before = db.clone();

        let outcome = db.apply_remote_op(&op).unwrap();
        assert_eq!(outcome, ApplyOutcome::Duplicate);
        assert_eq!(db, before);
    }

    #[test]
    fn test_concurrent_writes_both_survive() {
        let mut db = Replica::new();
        db.apply_remote_op(&map_set(rv("mike", 0), vec![], "c", vec![], "mike".into()))
            .unwrap();
        db.apply_remote_op(&map_set(rv("seph", 1), vec![], "c", vec![], "seph".into()))
            .unwrap();

        let Some(CrdtNode::Map(entries)) = db.nodes().get(ROOT_LV) else {
            panic!("root must be a map");
        };
        assert!(entries["c"].is_conflicted());
        assert_eq!(entries["c"].versions(), vec![0, 1]);
    }

    #[test]
    fn test_supersede_collapses_conflict() {
        let mut db = Replica::new();
        db.apply_remote_op(&map_set(rv("mike", 0), vec![], "c", vec![], "mike".into()))
            .unwrap();
        db.apply_remote_op(&map_set(rv("seph", 1), vec![], "c", vec![], "seph".into()))
            .unwrap();
        db.apply_remote_op(&map_set(
            rv("mike", 1),
            vec![rv("mike", 0), rv("seph", 1)],
            "c",
            vec![rv("mike", 0), rv("seph", 1)],
            "both".into(),
        ))
        .unwrap();

        let Some(CrdtNode::Map(entries)) = db.nodes().get(ROOT_LV) else {
            panic!("root must be a map");
        };
        assert!(!entries["c"].is_conflicted());
        assert_eq!(entries["c"].versions(), vec![2]);
    }

    #[test]
    fn test_invalid_parents_rejected_without_mutation() {
        let mut db = Replica::new();
        db.apply_remote_op(&map_set(rv("a", 0), vec![], "k", vec![], 1i64.into()))
            .unwrap();
        db.apply_remote_op(&map_set(
            rv("a", 1),
            vec![rv("a", 0)],
            "k",
            vec![rv("a", 0)],
            2i64.into(),
        ))
        .unwrap();
        let before_nodes = db.nodes().clone();

        // Observes ("a", 1) through its parents but claims no local parents:
        // retaining the dominated pair would break pairwise concurrency.
        let bad = map_set(rv("b", 0), vec![rv("a", 1)], "k", vec![], 3i64.into());
        let err = db.apply_remote_op(&bad).unwrap_err();
        assert!(matches!(err, DbError::InvalidParents { .. }));
        assert_eq!(db.nodes(), &before_nodes);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut db = Replica::new();
        let op = Operation {
            id: rv("seph", 0),
            global_parents: vec![],
            target: RawVersion::root(),
            action: OpAction::SetInsert { value: 1i64.into() },
        };
        let err = db.apply_remote_op(&op).unwrap_err();
        assert_eq!(
            err,
            DbError::TypeMismatch {
                expected: "set",
                found: "map"
            }
        );
    }

    #[test]
    fn test_overwrite_reclaims_subtree() {
        let mut db = Replica::new();
        let (_, inner) = db
            .local_map_insert(
                rv("seph", 0),
                ROOT_LV,
                "stuff",
                CreateValue::NewCrdt(CrdtKind::Map),
            )
            .unwrap();
        db.local_map_insert(rv("seph", 1), inner, "cool", "definitely".into())
            .unwrap();
        assert!(db.nodes().contains(inner));

        db.local_map_insert(rv("seph", 2), ROOT_LV, "stuff", 0i64.into())
            .unwrap();
        assert!(!db.nodes().contains(inner));
    }

    #[test]
    fn test_overwrite_reclaims_nested_chain() {
        let mut db = Replica::new();
        let (_, outer) = db
            .local_map_insert(
                rv("seph", 0),
                ROOT_LV,
                "a",
                CreateValue::NewCrdt(CrdtKind::Map),
            )
            .unwrap();
        let (_, mid) = db
            .local_map_insert(rv("seph", 1), outer, "b", CreateValue::NewCrdt(CrdtKind::Set))
            .unwrap();
        let (_, entry) = db
            .local_set_insert(rv("seph", 2), mid, CreateValue::NewCrdt(CrdtKind::Register))
            .unwrap();
        assert_eq!(db.nodes().len(), 4);

        db.local_map_insert(rv("seph", 3), ROOT_LV, "a", Primitive::Null.into())
            .unwrap();
        assert!(!db.nodes().contains(outer));
        assert!(!db.nodes().contains(mid));
        assert!(!db.nodes().contains(entry));
        assert_eq!(db.nodes().len(), 1);
    }

    #[test]
    fn test_op_on_reclaimed_target_is_void_but_admitted() {
        let mut db = Replica::new();
        let (_, inner) = db
            .local_map_insert(
                rv("seph", 0),
                ROOT_LV,
                "stuff",
                CreateValue::NewCrdt(CrdtKind::Map),
            )
            .unwrap();
        db.local_map_insert(rv("seph", 1), ROOT_LV, "stuff", 0i64.into())
            .unwrap();

        // A concurrent writer who still believed the inner map was live.
        let op = Operation {
            id: rv("mike", 0),
            global_parents: vec![rv("seph", 0)],
            target: rv("seph", 0),
            action: OpAction::MapSet {
                key: "late".to_string(),
                local_parents: vec![],
                value: 1i64.into(),
            },
        };
        let outcome = db.apply_remote_op(&op).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied(2));
        assert!(!db.nodes().contains(inner));

        // Still idempotent on re-delivery.
        assert_eq!(db.apply_remote_op(&op).unwrap(), ApplyOutcome::Duplicate);
    }

    #[test]
    fn test_set_insert_and_delete() {
        let mut db = Replica::new();
        let (_, set_id) = db
            .local_map_insert(
                rv("seph", 0),
                ROOT_LV,
                "tags",
                CreateValue::NewCrdt(CrdtKind::Set),
            )
            .unwrap();
        let (insert_op, _) = db
            .local_set_insert(rv("seph", 1), set_id, "crdt".into())
            .unwrap();

        let Some(CrdtNode::Set(entries)) = db.nodes().get(set_id) else {
            panic!("expected a set node");
        };
        assert_eq!(entries.len(), 1);

        db.local_set_delete(rv("seph", 2), set_id, insert_op.id.clone())
            .unwrap();
        let Some(CrdtNode::Set(entries)) = db.nodes().get(set_id) else {
            panic!("expected a set node");
        };
        assert!(entries.is_empty());
    }

    #[test]
    fn test_concurrent_set_deletes_are_idempotent() {
        let mut db = Replica::new();
        let (_, set_id) = db
            .local_map_insert(
                rv("seph", 0),
                ROOT_LV,
                "tags",
                CreateValue::NewCrdt(CrdtKind::Set),
            )
            .unwrap();
        let (insert_op, _) = db.local_set_insert(rv("seph", 1), set_id, 7i64.into()).unwrap();

        // Two replicas delete the same observed entry concurrently.
        let delete = |id: RawVersion| Operation {
            id,
            global_parents: vec![rv("seph", 1)],
            target: rv("seph", 0),
            action: OpAction::SetDelete {
                target: insert_op.id.clone(),
            },
        };
        db.apply_remote_op(&delete(rv("mike", 0))).unwrap();
        db.apply_remote_op(&delete(rv("alice", 0))).unwrap();

        let Some(CrdtNode::Set(entries)) = db.nodes().get(set_id) else {
            panic!("expected a set node");
        };
        assert!(entries.is_empty());
    }

    #[test]
    fn test_set_delete_reclaims_owned_subtree() {
        let mut db = Replica::new();
        let (_, set_id) = db
            .local_map_insert(
                rv("seph", 0),
                ROOT_LV,
                "items",
                CreateValue::NewCrdt(CrdtKind::Set),
            )
            .unwrap();
        let (insert_op, inner) = db
            .local_set_insert(rv("seph", 1), set_id, CreateValue::NewCrdt(CrdtKind::Map))
            .unwrap();
        db.local_map_insert(rv("seph", 2), inner, "x", 1i64.into())
            .unwrap();
        assert!(db.nodes().contains(inner));

        db.local_set_delete(rv("seph", 3), set_id, insert_op.id.clone())
            .unwrap();
        assert!(!db.nodes().contains(inner));
    }

    #[test]
    fn test_fresh_register_node_holds_null() {
        let mut db = Replica::new();
        let (_, reg_id) = db
            .local_map_insert(
                rv("seph", 0),
                ROOT_LV,
                "r",
                CreateValue::NewCrdt(CrdtKind::Register),
            )
            .unwrap();

        let Some(CrdtNode::Register(reg)) = db.nodes().get(reg_id) else {
            panic!("expected a register node");
        };
        assert_eq!(
            reg.pairs(),
            &[(reg_id, RegisterValue::Primitive(Primitive::Null))]
        );

        db.local_register_set(rv("seph", 1), reg_id, "set".into())
            .unwrap();
        let Some(CrdtNode::Register(reg)) = db.nodes().get(reg_id) else {
            panic!("expected a register node");
        };
        assert_eq!(reg.versions(), vec![1]);
    }

    #[test]
    fn test_local_op_on_missing_node_fails() {
        let mut db = Replica::new();
        let err = db
            .local_map_insert(rv("seph", 0), 42, "k", 1i64.into())
            .unwrap_err();
        assert_eq!(err, DbError::MissingNode(42));
    }

    #[test]
    fn test_local_op_id_reuse_fails() {
        let mut db = Replica::new();
        db.local_map_insert(rv("seph", 0), ROOT_LV, "a", 1i64.into())
            .unwrap();
        let err = db
            .local_map_insert(rv("seph", 0), ROOT_LV, "b", 2i64.into())
            .unwrap_err();
        assert_eq!(err, DbError::AlreadyApplied(rv("seph", 0)));
    }
}
