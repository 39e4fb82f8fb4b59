//! Errors produced while lowering a [`constellation_check::TypedProgram`]
//! into a [`constellation_core::DagSpec`], and while hashing/rehydrating the
//! resulting [`crate::image::ProgramImage`].
//!
//! Grounded on `lmlang_codegen::error::CodegenError`'s one-enum-per-crate
//! `thiserror` style, retargeted from LLVM failure modes to DAG-lowering
//! failure modes.

use constellation_core::{CoreError, Span};
use thiserror::Error;

/// Failures from `constellation-compiler`'s lowering pass and image
/// construction. Unlike `CheckError`, lowering never accumulates: a typed
/// program that reached this crate has already passed the checker, so any
/// `LowerError` here is either `UnsupportedOperation` (a documented
/// compile-time outcome, `spec.md` §4.5/§9) or an internal bug.
#[derive(Debug, Error)]
pub enum LowerError {
    /// A higher-order call the checker resolved and typed but the lowering
    /// pass has no `Transform` for (`spec.md` §9 open question: `sortBy`).
    #[error("unsupported operation '{name}' at {span:?}")]
    UnsupportedOperation { name: String, span: Span },

    /// A variable reference that the checker should have already resolved
    /// against its environment was missing from the lowering pass's own
    /// environment. Indicates a compiler bug, not a source-level error.
    #[error("internal error: unbound variable '{name}' during lowering at {span:?}")]
    UnboundVariable { name: String, span: Span },

    /// A `ListLiteral`/`RecordLiteral` surface form (only valid as a
    /// constant, e.g. inside `@example`) contained a non-constant
    /// sub-expression. See `DESIGN.md` for why these two forms are
    /// constant-only in this implementation.
    #[error("non-constant literal at {span:?}: {detail}")]
    NonConstantLiteral { detail: String, span: Span },

    /// A `DagSpec` invariant (`spec.md` §3) failed to hold after lowering.
    #[error(transparent)]
    Invariant(#[from] CoreError),
}

/// Failures from canonicalization, hashing, and rehydration (`spec.md` §4.6).
#[derive(Debug, Error)]
pub enum HashError {
    /// Canonical-form serialization failed; should not happen for a valid
    /// `DagSpec` since every canonical record is built from owned,
    /// already-validated data.
    #[error("failed to serialize canonical form: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures rehydrating synthetic modules from a stored image (`spec.md`
/// §4.6: only `branch` modules are reconstructable this way).
#[derive(Debug, Error)]
pub enum RehydrateError {
    #[error("module node {0} is not a synthetic module and cannot be rehydrated")]
    NotSynthetic(String),

    #[error("module node {0} not found in the stored DagSpec")]
    ModuleNotFound(String),
}
