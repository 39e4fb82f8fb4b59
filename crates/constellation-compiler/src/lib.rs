//! IR lowering and the content-addressed program image (`spec.md` §4.5,
//! §4.6): translates a `constellation-check`-typed program into a
//! `constellation_core::DagSpec`, computes its structural and syntactic
//! hashes, and assembles the `ProgramImage`/`LoadedProgram` pair
//! `constellation-runtime` executes.
//!
//! # Modules
//!
//! - [`lowering`] -- the `DagCompiler`: typed AST -> `DagSpec`
//! - [`hash`] -- canonicalization and SHA-256 structural/syntactic hashing
//! - [`image`] -- `ProgramImage`, `LoadedProgram`, rehydration
//! - [`error`] -- `LowerError`, `HashError`, `RehydrateError`

pub mod error;
pub mod hash;
pub mod image;
pub mod lowering;

pub use error::{HashError, LowerError, RehydrateError};
pub use hash::{registry_hash, structural_hash, syntactic_hash};
pub use image::{
    compile, rehydrate, validate_rehydration, CompileError, LoadedProgram, ModuleCallOptions,
    OnErrorPolicy, ProgramImage, RetryPolicy, SyntheticModule,
};
pub use lowering::lower_program;
