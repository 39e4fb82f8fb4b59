//! The structured outcome of one execution run (`spec.md` §4.9, §7,
//! GLOSSARY: "DataSignature").

use std::collections::BTreeMap;

use constellation_core::types::CValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-module outcome recorded during one execution (`spec.md` §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModuleStatus {
    /// Completed within both timeouts; records wall-clock latency and an
    /// optional implementation-defined context blob (e.g. a retry count).
    Fired { latency_ms: u64, context: Option<serde_json::Value> },
    /// Exceeded `inputsTimeout` -- never started its call body.
    Timed,
    /// The call body raised an error.
    Failed { cause: String },
    /// A declared dependency never arrived; the module's own fiber never
    /// ran to completion or failure.
    Unfired,
}

/// Overall status of one execution (`spec.md` §7): `Failed` iff any module
/// status is `Failed`/`Timed`; else `Suspended` iff any declared output is
/// pending; else `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Completed,
    Suspended,
    Failed,
}

/// The full observable result of one execution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSignature {
    pub execution_id: Uuid,
    pub structural_hash: String,
    pub resumption_count: u32,
    pub status: ExecutionStatus,
    pub inputs: BTreeMap<String, CValue>,
    /// Every computed data node value, keyed by its surface variable name
    /// (nameless synthetic nodes are omitted).
    pub computed_nodes: BTreeMap<String, CValue>,
    /// The subset of `computed_nodes` matching `declaredOutputs`.
    pub outputs: BTreeMap<String, CValue>,
    pub missing_inputs: Vec<String>,
    pub pending_outputs: Vec<String>,
    pub module_statuses: BTreeMap<String, ModuleStatus>,
    pub errors: Vec<String>,
}

impl DataSignature {
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}
