//! Errors for `constellation-runtime`.
//!
//! Grounded on `lmlang-server`'s one-enum-per-crate `thiserror` shape (e.g.
//! its `ApiError`, `concurrency::lock_manager::LockError`).
//! Per `spec.md` §7, parse/compile errors are an accumulated list and
//! execution errors are per-module statuses folded into a `DataSignature`,
//! not `Result::Err` values -- `RuntimeError` is reserved for failures that
//! happen before or around an execution: bad input maps, unknown modules,
//! double-resume races, and the internal invariant violations §7 calls out
//! (double cell write, missing data node lookup).

use constellation_core::id::DataId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown input `{name}`: no user-input data node with that name")]
    UnknownInput { name: String },

    #[error("input `{name}` has type {actual}, expected {expected}")]
    InputTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("input validation failed: {0:?}")]
    InvalidInputs(Vec<RuntimeError>),

    #[error("module `{name}` is not registered")]
    ModuleNotFound { name: String },

    #[error("a resume is already in progress for execution {execution_id}")]
    ResumeInProgress { execution_id: uuid::Uuid },

    #[error("cannot resume: execution {execution_id} has no suspended snapshot on file")]
    NoSuchSuspension { execution_id: uuid::Uuid },

    #[error("resume input `{name}` does not match the declared type")]
    ResumeTypeMismatch { name: String },

    #[error("resume input `{name}` conflicts with a previously provided value")]
    ResumeConflict { name: String },

    #[error("manually resolved node `{name}` already has a computed value")]
    AlreadyResolved { name: String },

    #[error("internal invariant violated in {site}: {detail}")]
    Internal { site: &'static str, detail: String },

    #[error("data node {id} written twice: single-assignment violation")]
    DoubleWrite { id: DataId },
}
