//! Core error types for `constellation-core`.
//!
//! These cover invariant violations in the value/type model and the DAG IR
//! itself -- not source-level compile errors (those live in
//! `constellation-check` and `constellation-compiler`, which carry spans and
//! suggestions). A `CoreError` surfacing from valid, already-checked input
//! indicates a compiler bug.

use thiserror::Error;

use crate::id::{DataId, ModuleNodeId};

/// Errors produced while building or querying the core value/type model and
/// DAG IR.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record or union literal declared the same field/tag twice.
    #[error("duplicate field '{name}' in {kind}")]
    DuplicateField { kind: &'static str, name: String },

    /// A data node referenced by UUID was not present in the `DagSpec`.
    #[error("data node not found: {id}")]
    DataNodeNotFound { id: DataId },

    /// A module-call node referenced by UUID was not present in the `DagSpec`.
    #[error("module node not found: {id}")]
    ModuleNodeNotFound { id: ModuleNodeId },

    /// A `declaredOutputs` entry has no matching `outputBindings` entry.
    #[error("unbound output: '{name}'")]
    UnboundOutput { name: String },

    /// The compute graph induced by `inEdges ∪ outEdges` contains a cycle.
    #[error("cycle detected in DAG involving node {id}")]
    CycleDetected { id: DataId },

    /// A data node is neither a user input, the sole output of a module,
    /// nor carries a populated inline transform.
    #[error("data node {id} has no producer (not input, module output, or transform)")]
    UnproducedDataNode { id: DataId },

    /// Internal invariant violation; never expected to be observable from
    /// valid source once the checker has passed.
    #[error("internal error at {site}: {detail}")]
    Internal { site: &'static str, detail: String },
}
