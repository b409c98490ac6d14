//! # mvcs-core
//!
//! Replica core for the Multi-Value Causal Store (MVCS): a causal,
//! multi-value CRDT database. A replica accepts operations, locally
//! generated or delivered from peers, merges them into a causally
//! consistent node table, and answers point queries for the current
//! materialized value.
//!
//! The replicated type is a recursive composition of three primitives:
//! multi-value registers, maps of named registers, and observed-remove
//! sets. Register values may themselves be nested CRDTs, forming an
//! ownership forest rooted at a distinguished root map. Overwriting the
//! last surviving reference to a subtree reclaims it recursively.
//!
//! ## Example
//!
//! ```
//! use mvcs_core::{CrdtKind, CreateValue, RawVersion, Replica, ROOT_LV};
//!
//! let mut db = Replica::new();
//!
//! db.local_map_insert(RawVersion::new("seph", 0), ROOT_LV, "yo", 123i64.into())
//!     .unwrap();
//!
//! let (_, inner) = db
//!     .local_map_insert(
//!         RawVersion::new("seph", 1),
//!         ROOT_LV,
//!         "stuff",
//!         CreateValue::NewCrdt(CrdtKind::Map),
//!     )
//!     .unwrap();
//! db.local_map_insert(RawVersion::new("seph", 2), inner, "cool", "definitely".into())
//!     .unwrap();
//!
//! assert_eq!(
//!     db.get().to_json(),
//!     serde_json::json!({ "yo": 123, "stuff": { "cool": "definitely" } })
//! );
//! ```

pub mod error;
pub mod node;
pub mod op;
pub mod query;
pub mod replica;
pub mod snapshot;

pub use error::DbError;
pub use node::{CrdtKind, CrdtNode, MvRegister, NodeTable, Primitive, RegisterValue};
pub use op::{CreateValue, OpAction, Operation};
pub use query::DbValue;
pub use replica::{ApplyOutcome, Replica};

// Re-exported so hosts only need one dependency.
pub use mvcs_causal::{Admission, CausalError, CausalGraph, RawVersion, LV, ROOT_LV};
