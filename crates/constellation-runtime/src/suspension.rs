//! Suspension & resume (`spec.md` §4.10): a [`SuspendedExecution`] snapshot
//! carries enough of a stalled run to continue it later without needing the
//! original [`LoadedProgram`] at all -- the `DagSpec` travels with the
//! snapshot. [`SuspensionCodec`] serializes a snapshot for storage;
//! [`SuspensionRegistry`] holds in-flight snapshots plus the per-execution
//! exclusive-access guard that keeps two resumes of the same execution from
//! racing (`spec.md` §5: "the suspension in-flight set is a concurrent map
//! keyed by executionId").

use std::collections::BTreeMap;

use constellation_compiler::{rehydrate, ModuleCallOptions, ProgramImage};
use constellation_core::id::{DataId, ModuleNodeId};
use constellation_core::ir::{DagSpec, DataOrigin};
use constellation_core::types::CValue;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::signature::DataSignature;

/// Enough state to continue a stalled execution: grounded on `spec.md`
/// §4.10's exact field list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendedExecution {
    pub execution_id: Uuid,
    pub structural_hash: String,
    pub resumption_count: u32,
    pub dag: DagSpec,
    pub call_options: IndexMap<ModuleNodeId, ModuleCallOptions>,
    pub inputs_provided: IndexMap<String, CValue>,
    pub computed_values: BTreeMap<DataId, CValue>,
    pub module_statuses: BTreeMap<String, String>,
}

impl SuspendedExecution {
    fn to_program_image(&self) -> ProgramImage {
        ProgramImage {
            structural_hash: self.structural_hash.clone(),
            syntactic_hash: String::new(),
            dag: self.dag.clone(),
            call_options: self.call_options.clone(),
            compiled_at_epoch_ms: 0,
        }
    }
}

/// `spec.md` §6: "a trait with `encode(snapshot) -> bytes` and `decode(bytes)
/// -> snapshot` returning a typed codec error on failure."
pub trait SuspensionCodec {
    fn encode(&self, snapshot: &SuspendedExecution) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<SuspendedExecution, CodecError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode suspended execution: {0}")]
    Encode(String),
    #[error("failed to decode suspended execution: {0}")]
    Decode(String),
}

/// The default codec, grounded on the same `serde_json` round-trip
/// `constellation-storage` uses for a persisted `ProgramImage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSuspensionCodec;

impl SuspensionCodec for JsonSuspensionCodec {
    fn encode(&self, snapshot: &SuspendedExecution) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(snapshot).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<SuspendedExecution, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Held for the lifetime of one resume attempt. Dropping it (including via
/// an early `?` return) releases the exclusive-access guard.
pub struct ResumeGuard<'a> {
    registry: &'a DashMap<Uuid, ()>,
    execution_id: Uuid,
}

impl Drop for ResumeGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.execution_id);
    }
}

/// In-flight suspended executions, keyed by id, plus the exclusive-access
/// guard over resume attempts.
#[derive(Default)]
pub struct SuspensionRegistry {
    snapshots: DashMap<Uuid, SuspendedExecution>,
    resuming: DashMap<Uuid, ()>,
}

impl SuspensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, snapshot: SuspendedExecution) {
        self.snapshots.insert(snapshot.execution_id, snapshot);
    }

    pub fn get(&self, execution_id: Uuid) -> Option<SuspendedExecution> {
        self.snapshots.get(&execution_id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, execution_id: Uuid) {
        self.snapshots.remove(&execution_id);
    }

    /// Acquires the exclusive-access guard for `execution_id`, failing with
    /// `ResumeInProgress` if another resume is already underway.
    pub fn begin_resume(&self, execution_id: Uuid) -> Result<ResumeGuard<'_>, RuntimeError> {
        match self.resuming.entry(execution_id) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(ResumeGuard { registry: &self.resuming, execution_id })
            }
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RuntimeError::ResumeInProgress { execution_id })
            }
        }
    }
}

/// One additional input or manually-resolved node value supplied on resume.
#[derive(Debug, Clone)]
pub struct ResumeInputs {
    /// Additional user inputs, merged with what the snapshot already has.
    /// A name repeated from the snapshot with a differing value is an error;
    /// repeating the same value is accepted as a no-op.
    pub additional_inputs: IndexMap<String, CValue>,
    /// Values for data nodes resolved out-of-band (by surface variable
    /// name) rather than by re-running their producer.
    pub manual_resolutions: IndexMap<String, CValue>,
}

/// Resumes `execution_id` against whatever snapshot `registry` holds for it,
/// merging `resume_inputs` and re-executing with the combined inputs and
/// pre-populated cells (`spec.md` §4.10). The snapshot is re-stored if the
/// resumed run is still not `Completed`, and dropped otherwise.
pub async fn resume(
    executor: &Executor,
    registry: &SuspensionRegistry,
    execution_id: Uuid,
    resume_inputs: ResumeInputs,
) -> Result<DataSignature, RuntimeError> {
    let _guard = registry.begin_resume(execution_id)?;
    let snapshot = registry.get(execution_id).ok_or(RuntimeError::NoSuchSuspension { execution_id })?;

    validate_additional_inputs(&snapshot, &resume_inputs.additional_inputs)?;
    let manual_resolved = validate_manual_resolutions(&snapshot, &resume_inputs.manual_resolutions)?;

    let mut merged_inputs = snapshot.inputs_provided.clone();
    for (name, value) in resume_inputs.additional_inputs {
        merged_inputs.insert(name, value);
    }

    let mut extra_resolved: IndexMap<DataId, CValue> =
        snapshot.computed_values.iter().map(|(id, v)| (*id, v.clone())).collect();
    for (id, value) in manual_resolved {
        extra_resolved.insert(id, value);
    }

    let loaded = rehydrate(snapshot.to_program_image());
    let (signature, computed_by_id) = executor
        .run(&loaded, execution_id, merged_inputs, snapshot.resumption_count + 1, extra_resolved)
        .await;

    if signature.is_completed() {
        registry.remove(execution_id);
    } else {
        registry.store(SuspendedExecution {
            execution_id,
            structural_hash: signature.structural_hash.clone(),
            resumption_count: signature.resumption_count,
            dag: snapshot.dag,
            call_options: snapshot.call_options,
            inputs_provided: signature.inputs.clone(),
            computed_values: computed_by_id,
            module_statuses: signature.module_statuses.iter().map(|(k, v)| (k.clone(), format!("{v:?}"))).collect(),
        });
    }

    Ok(signature)
}

fn validate_additional_inputs(
    snapshot: &SuspendedExecution,
    additional_inputs: &IndexMap<String, CValue>,
) -> Result<(), RuntimeError> {
    for (name, value) in additional_inputs {
        let Some(id) = snapshot.dag.find_input_by_name(name) else {
            return Err(RuntimeError::UnknownInput { name: name.clone() });
        };
        let declared_ty = &snapshot.dag.data[&id].ty;
        if !value.matches_type(declared_ty) {
            return Err(RuntimeError::ResumeTypeMismatch { name: name.clone() });
        }
        if let Some(existing) = snapshot.inputs_provided.get(name) {
            if format!("{existing:?}") != format!("{value:?}") {
                return Err(RuntimeError::ResumeConflict { name: name.clone() });
            }
        }
    }
    Ok(())
}

/// Validates manually-resolved nodes (`spec.md` §4.10: "the referenced
/// surface name must exist, the value type must equal the declared type,
/// and the node must not already have a computed value") and resolves each
/// surface name to its `DataId`.
fn validate_manual_resolutions(
    snapshot: &SuspendedExecution,
    manual_resolutions: &IndexMap<String, CValue>,
) -> Result<Vec<(DataId, CValue)>, RuntimeError> {
    let mut resolved = Vec::new();
    for (name, value) in manual_resolutions {
        let Some((id, _)) = named_node(&snapshot.dag, name) else {
            return Err(RuntimeError::UnknownInput { name: name.clone() });
        };
        let declared_ty = &snapshot.dag.data[&id].ty;
        if !value.matches_type(declared_ty) {
            return Err(RuntimeError::ResumeTypeMismatch { name: name.clone() });
        }
        if snapshot.computed_values.contains_key(&id) {
            return Err(RuntimeError::AlreadyResolved { name: name.clone() });
        }
        resolved.push((id, value.clone()));
    }
    Ok(resolved)
}

fn named_node<'a>(dag: &'a DagSpec, name: &str) -> Option<(DataId, &'a DataOrigin)> {
    dag.data
        .iter()
        .find(|(_, spec)| spec.name.as_deref() == Some(name))
        .map(|(id, spec)| (*id, &spec.origin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModuleRegistry;
    use crate::scheduler::Scheduler;
    use constellation_check::FunctionRegistry;
    use constellation_compiler::compile;

    fn fresh_executor() -> Executor {
        Executor::new(ModuleRegistry::new(), Scheduler::unbounded())
    }

    #[tokio::test]
    async fn suspend_then_resume_completes_and_bumps_resumption_count() {
        let loaded = compile("in x: Int\nout x", "p", &FunctionRegistry::new()).unwrap();
        let executor = fresh_executor();
        let registry = SuspensionRegistry::new();

        let first = executor.execute(&loaded, Uuid::new_v4(), IndexMap::new()).await;
        assert!(!first.is_completed());
        assert_eq!(first.missing_inputs, vec!["x".to_string()]);

        registry.store(SuspendedExecution {
            execution_id: first.execution_id,
            structural_hash: first.structural_hash.clone(),
            resumption_count: first.resumption_count,
            dag: loaded.image.dag.clone(),
            call_options: loaded.image.call_options.clone(),
            inputs_provided: first.inputs.clone(),
            computed_values: BTreeMap::new(),
            module_statuses: BTreeMap::new(),
        });

        let mut additional = IndexMap::new();
        additional.insert("x".to_string(), CValue::Int(7));
        let resumed = resume(
            &executor,
            &registry,
            first.execution_id,
            ResumeInputs { additional_inputs: additional, manual_resolutions: IndexMap::new() },
        )
        .await
        .unwrap();

        assert!(resumed.is_completed());
        assert_eq!(resumed.resumption_count, 1);
        assert!(matches!(resumed.outputs.get("x"), Some(CValue::Int(7))));
        assert!(registry.get(first.execution_id).is_none());
    }

    #[tokio::test]
    async fn resume_with_unknown_input_name_is_rejected() {
        let loaded = compile("in x: Int\nout x", "p", &FunctionRegistry::new()).unwrap();
        let executor = fresh_executor();
        let registry = SuspensionRegistry::new();
        let execution_id = Uuid::new_v4();
        registry.store(SuspendedExecution {
            execution_id,
            structural_hash: loaded.image.structural_hash.clone(),
            resumption_count: 0,
            dag: loaded.image.dag.clone(),
            call_options: loaded.image.call_options.clone(),
            inputs_provided: IndexMap::new(),
            computed_values: BTreeMap::new(),
            module_statuses: BTreeMap::new(),
        });

        let mut additional = IndexMap::new();
        additional.insert("nope".to_string(), CValue::Int(1));
        let err = resume(
            &executor,
            &registry,
            execution_id,
            ResumeInputs { additional_inputs: additional, manual_resolutions: IndexMap::new() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownInput { .. }));
    }

    #[tokio::test]
    async fn concurrent_resume_of_the_same_execution_is_rejected() {
        let registry = SuspensionRegistry::new();
        let execution_id = Uuid::new_v4();
        let _first_guard = registry.begin_resume(execution_id).unwrap();
        let err = registry.begin_resume(execution_id).unwrap_err();
        assert!(matches!(err, RuntimeError::ResumeInProgress { .. }));
    }

    #[test]
    fn json_codec_round_trips() {
        let snapshot = SuspendedExecution {
            execution_id: Uuid::new_v4(),
            structural_hash: "abc".to_string(),
            resumption_count: 2,
            dag: DagSpec::new("p"),
            call_options: IndexMap::new(),
            inputs_provided: IndexMap::new(),
            computed_values: BTreeMap::new(),
            module_statuses: BTreeMap::new(),
        };
        let codec = JsonSuspensionCodec;
        let bytes = codec.encode(&snapshot).unwrap();
        let back = codec.decode(&bytes).unwrap();
        assert_eq!(back.structural_hash, "abc");
        assert_eq!(back.resumption_count, 2);
    }
}
