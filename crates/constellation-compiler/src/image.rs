//! `spec.md` §3/§4.6: the content-addressed `ProgramImage`, the call-option
//! envelope `spec.md` §7 describes attaching per module call, and
//! rehydration of synthetic `branch` modules from a stored image.
//!
//! Grounded on `lmlang_codegen::{CompileOptions, CompileResult}`'s
//! "small, serde-roundtrippable struct describing one compilation" shape,
//! retargeted from a native-binary compile result to a `DagSpec` image.

use std::time::{SystemTime, UNIX_EPOCH};

use constellation_check::FunctionRegistry;
use constellation_core::{DagSpec, ModuleNodeId, SyntheticKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{LowerError, RehydrateError};
use crate::hash::{structural_hash, syntactic_hash};
use crate::lowering::lower_program;

/// Retry/backoff/throttle/priority/timeout envelope attached to one
/// `ModuleCall` node (`spec.md` §7: "part of the module call envelope;
/// their precise semantics are implementation-defined except that
/// `timeoutMs` imposes the `moduleTimeout` and that `priority` feeds the
/// scheduler"). `constellation-runtime` is the only crate that interprets
/// these; `constellation-compiler` only carries them through the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleCallOptions {
    /// Wall-clock budget for the call body itself (`spec.md` §4.9
    /// `moduleTimeout`). `None` means no explicit bound.
    pub timeout_ms: Option<u64>,
    /// Wall-clock budget from fiber spawn until the module returns
    /// (`spec.md` §4.9 `inputsTimeout`).
    pub inputs_timeout_ms: Option<u64>,
    /// Scheduler priority, 0-100, default 50 (`spec.md` §4.8).
    pub priority: u8,
    pub retry: Option<RetryPolicy>,
    pub on_error: OnErrorPolicy,
}

impl Default for ModuleCallOptions {
    fn default() -> Self {
        ModuleCallOptions {
            timeout_ms: None,
            inputs_timeout_ms: None,
            priority: 50,
            retry: None,
            on_error: OnErrorPolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnErrorPolicy {
    /// A module failure reports `Failed` and leaves the output cell unfilled.
    Fail,
    /// A module failure is swallowed and the output cell left unfilled,
    /// same as a timeout -- downstream fibers see it as pending, not failed.
    Ignore,
}

/// The complete, content-addressed description of one compiled program
/// (`spec.md` §3 `ProgramImage`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramImage {
    pub structural_hash: String,
    pub syntactic_hash: String,
    pub dag: DagSpec,
    pub call_options: IndexMap<ModuleNodeId, ModuleCallOptions>,
    pub compiled_at_epoch_ms: u64,
}

/// `(ProgramImage, synthetic-modules-by-UUID)`, ready to execute (`spec.md`
/// GLOSSARY: `LoadedProgram`). The map holds only `branch` modules --
/// `Filter`/`Map`/`All`/`Any` are plain `Transform` nodes with no host
/// closure at all, so there is nothing to rehydrate for them (see
/// `DESIGN.md` for why this resolves `spec.md` §6's "for HOF and branch"
/// phrasing without contradiction).
#[derive(Debug, Clone)]
pub struct LoadedProgram {
    pub image: ProgramImage,
    pub synthetic_modules: IndexMap<ModuleNodeId, SyntheticModule>,
}

/// A reconstructed synthetic module closure description. `constellation
/// -runtime` interprets `Branch` by evaluating `cond0, cond1, ...` in
/// order and returning the first matching arm's `expr`, or `otherwise`.
#[derive(Debug, Clone)]
pub enum SyntheticModule {
    Branch { arm_count: u32 },
}

/// Compiles source text against `registry` into a fresh [`LoadedProgram`]
/// (`spec.md` §6 Host embedding API): runs the checker, then the lowering
/// pass, then computes both hashes.
pub fn compile(source: &str, program_name: &str, registry: &FunctionRegistry) -> Result<LoadedProgram, CompileError> {
    let typed = constellation_check::compile_source(source, registry).map_err(CompileError::Check)?;
    let dag = lower_program(&typed, program_name).map_err(CompileError::Lower)?;
    let image = ProgramImage {
        structural_hash: structural_hash(&dag),
        syntactic_hash: syntactic_hash(source),
        call_options: default_call_options(&dag),
        dag,
        compiled_at_epoch_ms: epoch_ms(),
    };
    let synthetic_modules = synthetic_modules_of(&image.dag);
    Ok(LoadedProgram { image, synthetic_modules })
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{} type/name-resolution error(s)", .0.len())]
    Check(Vec<constellation_check::CheckError>),
    #[error(transparent)]
    Lower(#[from] LowerError),
}

fn default_call_options(dag: &DagSpec) -> IndexMap<ModuleNodeId, ModuleCallOptions> {
    dag.modules.keys().map(|id| (*id, ModuleCallOptions::default())).collect()
}

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn synthetic_modules_of(dag: &DagSpec) -> IndexMap<ModuleNodeId, SyntheticModule> {
    dag.modules
        .iter()
        .filter_map(|(id, spec)| match &spec.synthetic {
            Some(SyntheticKind::Branch { arm_count }) => Some((*id, SyntheticModule::Branch { arm_count: *arm_count })),
            None => None,
        })
        .collect()
}

/// Rehydrates a stored [`ProgramImage`] into a [`LoadedProgram`] (`spec.md`
/// §4.6): only synthetic `branch` modules can be reconstructed from the
/// `DagSpec` alone. Programs whose `DagSpec` contains `Filter`/`Map`/`All`/
/// `Any` transforms rehydrate fine too, since their bodies are plain data
/// nodes already fully present in the stored `DagSpec` -- it is only
/// arbitrary host closures (absent from this IR by construction, `spec.md`
/// §9) that a stored image could never carry.
pub fn rehydrate(image: ProgramImage) -> LoadedProgram {
    let synthetic_modules = synthetic_modules_of(&image.dag);
    LoadedProgram { image, synthetic_modules }
}

/// Validates that every `ModuleNodeId` marked synthetic in `dag` has a
/// rehydratable entry, and that no entry claims a module id that isn't
/// marked synthetic. Used by `constellation-storage` after decoding a
/// persisted image to catch corruption early.
pub fn validate_rehydration(dag: &DagSpec, synthetic_modules: &IndexMap<ModuleNodeId, SyntheticModule>) -> Result<(), RehydrateError> {
    for id in synthetic_modules.keys() {
        if !dag.modules.contains_key(id) {
            return Err(RehydrateError::ModuleNotFound(id.to_string()));
        }
    }
    for (id, spec) in &dag.modules {
        if spec.synthetic.is_some() && !synthetic_modules.contains_key(id) {
            return Err(RehydrateError::NotSynthetic(id.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_assigns_both_hashes() {
        let loaded = compile("in x: Int\nout x", "p", &FunctionRegistry::new()).unwrap();
        assert!(!loaded.image.structural_hash.is_empty());
        assert!(!loaded.image.syntactic_hash.is_empty());
    }

    #[test]
    fn rehydrate_recovers_branch_synthetic_module() {
        use constellation_core::{CType, FunctionSignature, ModuleRef};
        let mut reg = FunctionRegistry::new();
        reg.register(FunctionSignature::new(
            "gt",
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CBoolean,
            ModuleRef::new("gt"),
        ));
        let src = "in x: Int\nr = branch { gt(x, 0) -> x, otherwise -> 0 }\nout r";
        let loaded = compile(src, "p", &reg).unwrap();
        assert_eq!(loaded.synthetic_modules.len(), 1);

        let rehydrated = rehydrate(loaded.image.clone());
        assert_eq!(rehydrated.synthetic_modules.len(), 1);
        validate_rehydration(&rehydrated.image.dag, &rehydrated.synthetic_modules).unwrap();
    }

    #[test]
    fn compile_determinism_same_structural_hash_across_runs() {
        let src = "in a: {x:Int}\nin b: {y:Int}\nr = a + b\nout r";
        let one = compile(src, "p", &FunctionRegistry::new()).unwrap();
        let two = compile(src, "p", &FunctionRegistry::new()).unwrap();
        assert_eq!(one.image.structural_hash, two.image.structural_hash);
    }
}
