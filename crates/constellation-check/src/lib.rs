//! Name/namespace resolution and bidirectional type checking for the
//! Constellation surface language: takes a `constellation_parser::ast::Program`
//! plus a [`FunctionRegistry`] of host modules and produces a [`TypedProgram`]
//! ready for `constellation-compiler`'s DAG lowering, or the full list of
//! [`CheckError`]s found along the way.

mod checker;
mod diagnostics;
mod registry;
mod typed;

pub use checker::{check_program, compile_source};
pub use diagnostics::{levenshtein, suggest, CheckError};
pub use registry::FunctionRegistry;
pub use typed::{HofOp, TypedDecl, TypedExpr, TypedProgram};
