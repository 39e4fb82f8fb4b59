//! The DAG intermediate representation: data nodes, module-call nodes, and
//! the closed set of inline transforms surface syntax lowers to.
//!
//! A [`DagSpec`] is the complete, immutable description of one compiled
//! program: every data node and module-call node it contains, the edges
//! between them, and which data nodes are bound to declared outputs. No
//! arbitrary user code survives lowering into it -- every inline transform
//! is one of the tagged [`Transform`] variants, carrying only field names,
//! literal parts, and child node references (see `DESIGN.md`).

use std::collections::BTreeSet;

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{DataId, ModuleNodeId};
use crate::signature::ModuleRef;
use crate::span::Span;
use crate::types::{CType, CValue};

/// How a data node's value comes to exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataOrigin {
    /// A user-supplied input, named at the program surface.
    Input { source_name: String },
    /// A compile-time constant.
    Literal { value: CValue },
    /// The (sole) output of a module-call node.
    ModuleOutput {
        module: ModuleNodeId,
        field: String,
    },
    /// One of the closed set of data-only inline operators.
    Transform(Transform),
    /// The per-element binding introduced inside a `Filter`/`Map`/`All`/`Any`
    /// transform's body subgraph. Not independently producible; its value is
    /// supplied by the enclosing transform's fiber once per element.
    BoundElement,
}

/// The closed set of inline (data-only) transforms lowered from surface
/// syntax. See §4.5 of the language design for the surface-to-IR mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Transform {
    FieldAccess { source: DataId, field: String },
    Project { source: DataId, fields: Vec<String> },
    Merge { lhs: DataId, rhs: DataId },
    Conditional { cond: DataId, then_branch: DataId, else_branch: DataId },
    And { lhs: DataId, rhs: DataId },
    Or { lhs: DataId, rhs: DataId },
    Not { operand: DataId },
    Guard { value: DataId, cond: DataId },
    Coalesce { primary: DataId, fallback: DataId },
    /// `parts.len() == exprs.len() + 1`; empty strings mark adjacency at the
    /// start/end of the interpolated literal.
    StringInterpolation { parts: Vec<String>, exprs: Vec<DataId> },
    Filter { source: DataId, element: DataId, body: DataId },
    Map { source: DataId, element: DataId, body: DataId },
    All { source: DataId, element: DataId, body: DataId },
    Any { source: DataId, element: DataId, body: DataId },
}

impl Transform {
    /// The data nodes this transform directly reads, keyed by the port name
    /// under which `DagSpec::transform_inputs` would list them. Order
    /// matches the declaration order so callers that need a stable sequence
    /// (e.g. canonicalization) don't have to special-case each variant.
    pub fn inputs(&self) -> Vec<(&'static str, DataId)> {
        match self {
            Transform::FieldAccess { source, .. } => vec![("source", *source)],
            Transform::Project { source, .. } => vec![("source", *source)],
            Transform::Merge { lhs, rhs } => vec![("lhs", *lhs), ("rhs", *rhs)],
            Transform::Conditional { cond, then_branch, else_branch } => {
                vec![("cond", *cond), ("then", *then_branch), ("else", *else_branch)]
            }
            Transform::And { lhs, rhs } => vec![("lhs", *lhs), ("rhs", *rhs)],
            Transform::Or { lhs, rhs } => vec![("lhs", *lhs), ("rhs", *rhs)],
            Transform::Not { operand } => vec![("operand", *operand)],
            Transform::Guard { value, cond } => vec![("value", *value), ("cond", *cond)],
            Transform::Coalesce { primary, fallback } => {
                vec![("primary", *primary), ("fallback", *fallback)]
            }
            Transform::StringInterpolation { exprs, .. } => exprs
                .iter()
                .enumerate()
                .map(|(i, id)| (leak_index("expr", i), *id))
                .collect(),
            Transform::Filter { source, body, .. }
            | Transform::Map { source, body, .. }
            | Transform::All { source, body, .. }
            | Transform::Any { source, body, .. } => vec![("source", *source), ("body", *body)],
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Transform::FieldAccess { .. } => "FieldAccess",
            Transform::Project { .. } => "Project",
            Transform::Merge { .. } => "Merge",
            Transform::Conditional { .. } => "Conditional",
            Transform::And { .. } => "And",
            Transform::Or { .. } => "Or",
            Transform::Not { .. } => "Not",
            Transform::Guard { .. } => "Guard",
            Transform::Coalesce { .. } => "Coalesce",
            Transform::StringInterpolation { .. } => "StringInterpolation",
            Transform::Filter { .. } => "Filter",
            Transform::Map { .. } => "Map",
            Transform::All { .. } => "All",
            Transform::Any { .. } => "Any",
        }
    }
}

/// Leaks a small `"expr{i}"` string for use as a `&'static str` port name.
/// Bounded by the number of interpolation holes in one source string, so the
/// leak is negligible in practice (one process-lifetime compile unit).
fn leak_index(prefix: &str, i: usize) -> &'static str {
    Box::leak(format!("{prefix}{i}").into_boxed_str())
}

/// A single data node: its declared type, where its value comes from, the
/// per-consumer nicknames it is known by, and its source span (absent for
/// compiler-synthesized nodes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataNodeSpec {
    /// Surface-level variable name, if this node was bound by `name = expr`.
    pub name: Option<String>,
    pub ty: CType,
    pub origin: DataOrigin,
    /// Per-consumer parameter name: a node used as argument `P` of module
    /// call `M` has `nicknames[M] == P`.
    pub nicknames: IndexMap<ModuleNodeId, String>,
    pub span: Option<Span>,
}

/// Discriminates compiler-synthesized module-call nodes from ordinary calls
/// to a registered host module. Only `Branch` is rehydratable from the
/// `DagSpec` alone (§4.6); HOF transform bodies are plain `Transform` nodes,
/// not `ModuleCall`s, and carry no closures at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyntheticKind {
    /// `branch { c0 -> e0, ..., otherwise -> ed }`, lowered to a synthetic
    /// module with named inputs `cond0, expr0, ..., otherwise`.
    Branch { arm_count: u32 },
}

/// A module-call node: a named invocation of a host module (or a
/// compiler-synthesized module such as `branch`), with its named argument
/// data nodes and the data node it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleNodeSpec {
    pub module: ModuleRef,
    pub display_name: String,
    pub inputs: IndexMap<String, DataId>,
    pub output: DataId,
    pub return_type: CType,
    pub synthetic: Option<SyntheticKind>,
    pub span: Option<Span>,
}

/// The complete, immutable DAG for one compiled program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagSpec {
    pub program_name: String,
    pub modules: IndexMap<ModuleNodeId, ModuleNodeSpec>,
    pub data: IndexMap<DataId, DataNodeSpec>,
    pub in_edges: BTreeSet<(DataId, ModuleNodeId)>,
    pub out_edges: BTreeSet<(ModuleNodeId, DataId)>,
    pub declared_outputs: Vec<String>,
    pub output_bindings: IndexMap<String, DataId>,
}

impl DagSpec {
    pub fn new(program_name: impl Into<String>) -> Self {
        DagSpec {
            program_name: program_name.into(),
            modules: IndexMap::new(),
            data: IndexMap::new(),
            in_edges: BTreeSet::new(),
            out_edges: BTreeSet::new(),
            declared_outputs: Vec::new(),
            output_bindings: IndexMap::new(),
        }
    }

    /// Data nodes with no transform/module producer, i.e. user inputs.
    pub fn user_inputs(&self) -> impl Iterator<Item = (DataId, &DataNodeSpec)> {
        self.data
            .iter()
            .filter(|(_, spec)| matches!(spec.origin, DataOrigin::Input { .. }))
            .map(|(id, spec)| (*id, spec))
    }

    pub fn find_input_by_name(&self, name: &str) -> Option<DataId> {
        self.data.iter().find_map(|(id, spec)| match &spec.origin {
            DataOrigin::Input { source_name } if source_name == name => Some(*id),
            _ => None,
        })
    }

    /// Validates the five invariants required of every compiled `DagSpec`
    /// (§3). Intended to run once, right after lowering; a failure here
    /// indicates a compiler bug, not a source-level error.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.validate_acyclic()?;
        self.validate_producers()?;
        self.validate_outputs_bound()?;
        self.validate_nicknames()?;
        Ok(())
    }

    // Invariant 4 (argument subtype-assignability) is enforced by
    // constellation-check before any ModuleCall node is emitted; a DagSpec
    // only records each argument's resolved data id, not the callee's
    // declared parameter type, so it cannot be re-checked structurally here.

    fn validate_acyclic(&self) -> Result<(), CoreError> {
        let mut graph: DiGraphMap<GraphNode, ()> = DiGraphMap::new();
        for (data, spec) in &self.data {
            graph.add_node(GraphNode::Data(*data));
            if let DataOrigin::Transform(t) = &spec.origin {
                for (_, input) in t.inputs() {
                    graph.add_edge(GraphNode::Data(input), GraphNode::Data(*data), ());
                }
            }
        }
        for (data, module) in &self.in_edges {
            graph.add_edge(GraphNode::Data(*data), GraphNode::Module(*module), ());
        }
        for (module, data) in &self.out_edges {
            graph.add_edge(GraphNode::Module(*module), GraphNode::Data(*data), ());
        }
        if toposort(&graph, None).is_err() {
            // Report an arbitrary node in the cycle-containing SCC; good
            // enough for an internal-invariant error.
            let offending = self.data.keys().next().copied().unwrap_or(DataId(uuid::Uuid::nil()));
            return Err(CoreError::CycleDetected { id: offending });
        }
        Ok(())
    }

    fn validate_producers(&self) -> Result<(), CoreError> {
        for (id, spec) in &self.data {
            match &spec.origin {
                DataOrigin::Input { .. } | DataOrigin::Literal { .. } | DataOrigin::BoundElement => {}
                DataOrigin::ModuleOutput { module, .. } => {
                    if !self.modules.contains_key(module) {
                        return Err(CoreError::ModuleNodeNotFound { id: *module });
                    }
                }
                DataOrigin::Transform(t) => {
                    for (_, input) in t.inputs() {
                        if !self.data.contains_key(&input) {
                            return Err(CoreError::DataNodeNotFound { id: input });
                        }
                    }
                }
            }
            let _ = id;
        }
        Ok(())
    }

    fn validate_outputs_bound(&self) -> Result<(), CoreError> {
        for name in &self.declared_outputs {
            match self.output_bindings.get(name) {
                Some(id) if self.data.contains_key(id) => {}
                _ => return Err(CoreError::UnboundOutput { name: name.clone() }),
            }
        }
        Ok(())
    }

    fn validate_nicknames(&self) -> Result<(), CoreError> {
        for (data_id, module_id) in &self.in_edges {
            let data = self
                .data
                .get(data_id)
                .ok_or(CoreError::DataNodeNotFound { id: *data_id })?;
            if !data.nicknames.contains_key(module_id) {
                return Err(CoreError::Internal {
                    site: "DagSpec::validate_nicknames",
                    detail: format!("{data_id} used by {module_id} has no nickname entry"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum GraphNode {
    Data(DataId),
    Module(ModuleNodeId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{DataId, ModuleNodeId};

    fn input_node(name: &str) -> DataNodeSpec {
        DataNodeSpec {
            name: Some(name.to_string()),
            ty: CType::CInt,
            origin: DataOrigin::Input { source_name: name.to_string() },
            nicknames: IndexMap::new(),
            span: None,
        }
    }

    #[test]
    fn empty_spec_validates() {
        let spec = DagSpec::new("p");
        spec.validate().unwrap();
    }

    #[test]
    fn unbound_declared_output_fails() {
        let mut spec = DagSpec::new("p");
        spec.declared_outputs.push("x".to_string());
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, CoreError::UnboundOutput { .. }));
    }

    #[test]
    fn single_input_output_roundtrip() {
        let mut spec = DagSpec::new("p");
        let x = DataId::new_v4();
        spec.data.insert(x, input_node("x"));
        spec.declared_outputs.push("x".to_string());
        spec.output_bindings.insert("x".to_string(), x);
        spec.validate().unwrap();
    }

    #[test]
    fn transform_referencing_missing_input_fails() {
        let mut spec = DagSpec::new("p");
        let missing = DataId::new_v4();
        let derived = DataId::new_v4();
        spec.data.insert(
            derived,
            DataNodeSpec {
                name: None,
                ty: CType::CBoolean,
                origin: DataOrigin::Transform(Transform::Not { operand: missing }),
                nicknames: IndexMap::new(),
                span: None,
            },
        );
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, CoreError::DataNodeNotFound { .. }));
    }

    #[test]
    fn cycle_is_rejected() {
        let mut spec = DagSpec::new("p");
        let a = DataId::new_v4();
        let b = DataId::new_v4();
        spec.data.insert(
            a,
            DataNodeSpec {
                name: None,
                ty: CType::CBoolean,
                origin: DataOrigin::Transform(Transform::Not { operand: b }),
                nicknames: IndexMap::new(),
                span: None,
            },
        );
        spec.data.insert(
            b,
            DataNodeSpec {
                name: None,
                ty: CType::CBoolean,
                origin: DataOrigin::Transform(Transform::Not { operand: a }),
                nicknames: IndexMap::new(),
                span: None,
            },
        );
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, CoreError::CycleDetected { .. }));
    }

    #[test]
    fn module_output_requires_known_module_and_nickname() {
        let mut spec = DagSpec::new("p");
        let arg = DataId::new_v4();
        let out = DataId::new_v4();
        let module_id = ModuleNodeId::new_v4();

        let mut nicknames = IndexMap::new();
        nicknames.insert(module_id, "a".to_string());
        spec.data.insert(
            arg,
            DataNodeSpec {
                name: None,
                ty: CType::CInt,
                origin: DataOrigin::Input { source_name: "a".to_string() },
                nicknames,
                span: None,
            },
        );
        spec.data.insert(
            out,
            DataNodeSpec {
                name: None,
                ty: CType::CInt,
                origin: DataOrigin::ModuleOutput { module: module_id, field: "out".to_string() },
                nicknames: IndexMap::new(),
                span: None,
            },
        );
        let mut inputs = IndexMap::new();
        inputs.insert("a".to_string(), arg);
        spec.modules.insert(
            module_id,
            ModuleNodeSpec {
                module: ModuleRef::new("identity"),
                display_name: "identity".to_string(),
                inputs,
                output: out,
                return_type: CType::CInt,
                synthetic: None,
                span: None,
            },
        );
        spec.in_edges.insert((arg, module_id));
        spec.out_edges.insert((module_id, out));

        spec.validate().unwrap();
    }
}
