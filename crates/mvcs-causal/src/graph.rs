//! The causal graph: admission, translation, dominance, tie-break.
//!
//! One entry is recorded per admitted operation; the entry's index in the
//! list is its LV, so assignment is dense and monotone. Parents are stored
//! in LV form, which gives dominance queries a cheap pruning rule: a
//! version's parents are always numerically smaller than the version itself.

use crate::error::{CausalError, Result};
use crate::version::{RawVersion, LV, ROOT_AGENT, ROOT_LV};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

/// Result of admitting an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The op was unknown and has been assigned this local version.
    New(LV),
    /// The op was already admitted under this local version.
    Duplicate(LV),
}

/// One admitted operation. An empty parent list means the op is parented at
/// the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct CgEntry {
    agent: String,
    seq: u64,
    parents: Vec<LV>,
}

/// The causal graph of everything this replica has learned of.
///
/// Only the entry list is serialized; the agent index and frontier are
/// rebuilt by replay on deserialize, so a decoded graph is always internally
/// consistent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CgEntry>", into = "Vec<CgEntry>")]
pub struct CausalGraph {
    /// One entry per admitted op; the index is the LV.
    entries: Vec<CgEntry>,
    /// Per-agent `seq -> LV` index.
    agents: HashMap<String, BTreeMap<u64, LV>>,
    /// Causal tips of known history, sorted ascending.
    frontier: Vec<LV>,
}

impl CausalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of admitted operations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The current causal frontier: every admitted LV not dominated by
    /// another admitted LV.
    pub fn frontier(&self) -> &[LV] {
        &self.frontier
    }

    /// First unused sequence number for an agent. Hosts generating local op
    /// ids start here.
    pub fn next_seq(&self, agent: &str) -> u64 {
        self.agents
            .get(agent)
            .and_then(|seqs| seqs.keys().next_back())
            .map(|seq| seq + 1)
            .unwrap_or(0)
    }

    /// Admit an operation authored as `raw` with the given causal parents.
    ///
    /// Idempotent on `(agent, seq)`: re-admission returns
    /// [`Admission::Duplicate`] and changes nothing. Parents must already be
    /// admitted.
    pub fn add_raw(&mut self, raw: &RawVersion, parents: &[RawVersion]) -> Result<Admission> {
        if raw.agent == ROOT_AGENT {
            return Err(CausalError::ReservedAgent(raw.agent.clone()));
        }
        if let Some(lv) = self.try_raw_to_lv(raw) {
            return Ok(Admission::Duplicate(lv));
        }

        let parent_lvs: Vec<LV> = self
            .raw_to_lv_list(parents)?
            .into_iter()
            .filter(|&p| p != ROOT_LV)
            .collect();

        let lv = self.entries.len();
        self.agents
            .entry(raw.agent.clone())
            .or_default()
            .insert(raw.seq, lv);
        self.advance_frontier(lv, &parent_lvs);
        self.entries.push(CgEntry {
            agent: raw.agent.clone(),
            seq: raw.seq,
            parents: parent_lvs,
        });
        Ok(Admission::New(lv))
    }

    /// A new tip replaces exactly the frontier entries it names as parents.
    /// Any other tip is necessarily concurrent with it: a parent dominating
    /// a tip would have evicted that tip when the parent was admitted.
    fn advance_frontier(&mut self, lv: LV, parents: &[LV]) {
        self.frontier.retain(|v| !parents.contains(v));
        self.frontier.push(lv);
        self.frontier.sort_unstable();
    }

    pub fn try_raw_to_lv(&self, raw: &RawVersion) -> Option<LV> {
        if raw.is_root() {
            return Some(ROOT_LV);
        }
        self.agents.get(&raw.agent)?.get(&raw.seq).copied()
    }

    pub fn raw_to_lv(&self, raw: &RawVersion) -> Result<LV> {
        self.try_raw_to_lv(raw)
            .ok_or_else(|| CausalError::UnknownVersion(raw.clone()))
    }

    pub fn raw_to_lv_list(&self, raws: &[RawVersion]) -> Result<Vec<LV>> {
        raws.iter().map(|raw| self.raw_to_lv(raw)).collect()
    }

    /// Translate an assigned LV back to its raw id.
    ///
    /// Panics if `lv` was never assigned; LVs only come from this graph, so
    /// an unknown one is a caller bug rather than bad input.
    pub fn lv_to_raw(&self, lv: LV) -> RawVersion {
        if lv == ROOT_LV {
            return RawVersion::root();
        }
        let entry = &self.entries[lv];
        RawVersion::new(entry.agent.clone(), entry.seq)
    }

    pub fn lv_to_raw_list(&self, lvs: &[LV]) -> Vec<RawVersion> {
        lvs.iter().map(|&lv| self.lv_to_raw(lv)).collect()
    }

    /// Dominance: is `target` causally contained in `frontier`?
    ///
    /// True iff `target` is one of the frontier versions or an ancestor of
    /// one. The walk visits ancestors highest-LV-first and prunes every
    /// branch numerically below `target`.
    pub fn version_contains(&self, frontier: &[LV], target: LV) -> bool {
        if target == ROOT_LV || frontier.contains(&target) {
            return true;
        }
        let mut queue: BinaryHeap<LV> = frontier
            .iter()
            .copied()
            .filter(|&v| v != ROOT_LV && v > target)
            .collect();
        let mut seen = HashSet::new();
        while let Some(v) = queue.pop() {
            if !seen.insert(v) {
                continue;
            }
            for &parent in &self.entries[v].parents {
                if parent == target {
                    return true;
                }
                if parent > target {
                    queue.push(parent);
                }
            }
        }
        false
    }

    /// Deterministic winner among concurrent entries: the maximum by the
    /// `(agent, seq)` of each entry's LV. Never consults local numbering, so
    /// every replica that admitted the same ops picks the same winner.
    pub fn tie_break<'a, T>(&self, entries: &'a [(LV, T)]) -> Option<&'a (LV, T)> {
        entries
            .iter()
            .max_by(|(a, _), (b, _)| self.raw_ord(*a).cmp(&self.raw_ord(*b)))
    }

    fn raw_ord(&self, lv: LV) -> (&str, u64) {
        if lv == ROOT_LV {
            return (ROOT_AGENT, 0);
        }
        let entry = &self.entries[lv];
        (entry.agent.as_str(), entry.seq)
    }
}

impl From<Vec<CgEntry>> for CausalGraph {
    fn from(entries: Vec<CgEntry>) -> Self {
        let mut graph = CausalGraph::default();
        for entry in entries {
            let lv = graph.entries.len();
            graph
                .agents
                .entry(entry.agent.clone())
                .or_default()
                .insert(entry.seq, lv);
            let parents = entry.parents.clone();
            graph.advance_frontier(lv, &parents);
            graph.entries.push(entry);
        }
        graph
    }
}

impl From<CausalGraph> for Vec<CgEntry> {
    fn from(graph: CausalGraph) -> Self {
        graph.entries
    }
}
