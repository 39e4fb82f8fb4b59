//! The execution engine (`spec.md` §4.9): validates the provided inputs,
//! allocates one single-assignment [`Cell`] per top-level data node, spawns a
//! fiber per producer (module call or inline transform), and folds the
//! result into a terminal [`DataSignature`].
//!
//! Higher-order transform bodies (`Filter`/`Map`/`All`/`Any`) are the one
//! exception to "one cell per data node": a body subgraph is re-entered once
//! per source element, so its interior nodes (everything reachable from the
//! transform's `body` id, down to but excluding the enclosing `source`) are
//! evaluated by a plain recursive function instead of being allocated their
//! own cells -- a single-assignment cell cannot hold more than one element's
//! worth of value.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use constellation_compiler::{LoadedProgram, ModuleCallOptions, OnErrorPolicy, SyntheticModule};
use constellation_core::id::{DataId, ModuleNodeId};
use constellation_core::ir::{DagSpec, DataOrigin, ModuleNodeSpec, Transform};
use constellation_core::types::{CType, CValue};
use indexmap::IndexMap;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::cell::Cell;
use crate::error::RuntimeError;
use crate::listener::ListenerFanout;
use crate::registry::{ModuleImpl, ModuleRegistry};
use crate::scheduler::Scheduler;
use crate::signature::{DataSignature, ExecutionStatus, ModuleStatus};

/// Shared, read-only context every spawned fiber needs: the DAG itself, the
/// set of cells one per top-level data node, and the body-interior id set.
/// `Arc`-wrapped so spawning a fiber is a handful of pointer clones rather
/// than a deep copy of the program.
struct ExecutionContext {
    dag: DagSpec,
    cells: IndexMap<DataId, Cell>,
    interior: HashSet<DataId>,
}

/// Runs compiled programs against a set of host module implementations.
/// Cheap to clone: every field is itself shared (`Arc`-backed or trivially
/// copyable).
#[derive(Clone)]
pub struct Executor {
    registry: ModuleRegistry,
    scheduler: Scheduler,
    listeners: ListenerFanout,
}

impl Executor {
    pub fn new(registry: ModuleRegistry, scheduler: Scheduler) -> Self {
        Executor { registry, scheduler, listeners: ListenerFanout::new() }
    }

    pub fn with_listeners(mut self, listeners: ListenerFanout) -> Self {
        self.listeners = listeners;
        self
    }

    /// Runs `program` to completion (or suspension), given `inputs` keyed by
    /// surface input name.
    pub async fn execute(
        &self,
        program: &LoadedProgram,
        execution_id: Uuid,
        inputs: IndexMap<String, CValue>,
    ) -> DataSignature {
        self.run(program, execution_id, inputs, 0, IndexMap::new()).await.0
    }

    /// Shared entry point for both a fresh execution and a resume: `extra`
    /// carries already-computed data node values (keyed by data node id,
    /// empty on a fresh run) that seed their cells before any fiber spawns.
    /// Returns the signature alongside every resolved value keyed by data
    /// node id, which [`crate::suspension`] needs to snapshot a stalled run.
    pub(crate) async fn run(
        &self,
        program: &LoadedProgram,
        execution_id: Uuid,
        inputs: IndexMap<String, CValue>,
        resumption_count: u32,
        extra_resolved: IndexMap<DataId, CValue>,
    ) -> (DataSignature, BTreeMap<DataId, CValue>) {
        let dag = program.image.dag.clone();

        if let Err(errors) = validate_inputs(&dag, &inputs) {
            let signature = DataSignature {
                execution_id,
                structural_hash: program.image.structural_hash.clone(),
                resumption_count,
                status: ExecutionStatus::Failed,
                inputs,
                computed_nodes: BTreeMap::new(),
                outputs: BTreeMap::new(),
                missing_inputs: Vec::new(),
                pending_outputs: dag.declared_outputs.clone(),
                module_statuses: BTreeMap::new(),
                errors: errors.into_iter().map(|e| e.to_string()).collect(),
            };
            return (signature, BTreeMap::new());
        }

        self.listeners.notify_execution_start(execution_id);

        let interior = body_interior_nodes(&dag);
        let mut cells: IndexMap<DataId, Cell> = IndexMap::new();
        for id in dag.data.keys() {
            if !interior.contains(id) {
                cells.insert(*id, Cell::new());
            }
        }

        let mut missing_inputs = Vec::new();
        for (id, spec) in dag.user_inputs() {
            let DataOrigin::Input { source_name } = &spec.origin else { unreachable!() };
            if let Some(value) = extra_resolved.get(&id) {
                let _ = cells[&id].write(id, value.clone());
            } else if let Some(value) = inputs.get(source_name) {
                let _ = cells[&id].write(id, value.clone());
            } else if let CType::COptional(_) = &spec.ty {
                let _ = cells[&id].write(id, CValue::Optional(None));
            } else {
                missing_inputs.push(source_name.clone());
            }
        }
        for (id, spec) in &dag.data {
            if let DataOrigin::Literal { value } = &spec.origin {
                if let Some(cell) = cells.get(id) {
                    let _ = cell.write(*id, value.clone());
                }
            }
        }

        let context = Arc::new(ExecutionContext { dag, cells, interior });
        let module_statuses = Arc::new(AsyncMutex::new(BTreeMap::<String, ModuleStatus>::new()));
        let errors = Arc::new(AsyncMutex::new(Vec::<String>::new()));

        let mut handles = Vec::new();
        for (module_id, module_spec) in &context.dag.modules {
            handles.push(tokio::spawn(self.clone().run_module_fiber(
                Arc::clone(&context),
                program.image.call_options.get(module_id).cloned().unwrap_or_default(),
                program.synthetic_modules.get(module_id).cloned(),
                execution_id,
                *module_id,
                module_spec.clone(),
                Arc::clone(&module_statuses),
                Arc::clone(&errors),
            )));
        }
        for (id, spec) in &context.dag.data {
            if context.interior.contains(id) {
                continue;
            }
            if let DataOrigin::Transform(transform) = &spec.origin {
                handles.push(tokio::spawn(run_transform_fiber(Arc::clone(&context), *id, transform.clone())));
            }
        }

        let deadline = overall_deadline(&program.image.call_options);
        let _ = tokio::time::timeout(deadline, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;

        let mut computed_nodes = BTreeMap::new();
        let mut computed_by_id = BTreeMap::new();
        for (id, spec) in &context.dag.data {
            if let Some(value) = context.cells.get(id).and_then(Cell::peek) {
                if let Some(name) = &spec.name {
                    computed_nodes.insert(name.clone(), value.clone());
                }
                computed_by_id.insert(*id, value);
            }
        }

        let mut outputs = BTreeMap::new();
        let mut pending_outputs = Vec::new();
        for name in &context.dag.declared_outputs {
            let Some(id) = context.dag.output_bindings.get(name) else { continue };
            match context.cells.get(id).and_then(Cell::peek) {
                Some(value) => {
                    outputs.insert(name.clone(), value);
                }
                None => pending_outputs.push(name.clone()),
            }
        }

        let module_statuses = Arc::try_unwrap(module_statuses).map(AsyncMutex::into_inner).unwrap_or_default();
        let errors = Arc::try_unwrap(errors).map(AsyncMutex::into_inner).unwrap_or_default();

        let any_failed = module_statuses
            .values()
            .any(|s| matches!(s, ModuleStatus::Failed { .. } | ModuleStatus::Timed));
        let status = if any_failed {
            ExecutionStatus::Failed
        } else if !pending_outputs.is_empty() || !missing_inputs.is_empty() {
            ExecutionStatus::Suspended
        } else {
            ExecutionStatus::Completed
        };

        let signature = DataSignature {
            execution_id,
            structural_hash: program.image.structural_hash.clone(),
            resumption_count,
            status,
            inputs,
            computed_nodes,
            outputs,
            missing_inputs,
            pending_outputs,
            module_statuses,
            errors,
        };

        match &signature.status {
            ExecutionStatus::Completed | ExecutionStatus::Failed => {
                self.listeners.notify_execution_complete(signature.clone());
            }
            ExecutionStatus::Suspended => {}
        }
        (signature, computed_by_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_module_fiber(
        self,
        context: Arc<ExecutionContext>,
        call_options: ModuleCallOptions,
        synthetic: Option<SyntheticModule>,
        execution_id: Uuid,
        module_id: ModuleNodeId,
        module_spec: ModuleNodeSpec,
        module_statuses: Arc<AsyncMutex<BTreeMap<String, ModuleStatus>>>,
        errors: Arc<AsyncMutex<Vec<String>>>,
    ) {
        let display_name = module_spec.display_name.clone();
        self.listeners.notify_module_start(execution_id, module_id, display_name.clone());
        let start = std::time::Instant::now();

        let input_cells: IndexMap<String, Cell> = module_spec
            .inputs
            .iter()
            .filter_map(|(name, id)| context.cells.get(id).map(|c| (name.clone(), c.clone())))
            .collect();

        let inputs_timeout = call_options.inputs_timeout_ms.map(Duration::from_millis);
        let Some(arguments) = await_inputs(&input_cells, inputs_timeout).await else {
            tracing::warn!(execution = %execution_id, module = %display_name, "inputs never resolved within inputsTimeout");
            module_statuses.lock().await.insert(display_name, ModuleStatus::Timed);
            return;
        };

        let _permit = self.scheduler.acquire(call_options.priority).await;

        let outcome = if let Some(SyntheticModule::Branch { arm_count }) = synthetic {
            evaluate_branch(arm_count, &arguments)
        } else {
            match self.registry.get(&module_spec.module.0) {
                Some(implementation) => {
                    let module_timeout = call_options.timeout_ms.map(Duration::from_millis);
                    run_with_retry(implementation, arguments, module_timeout, call_options.retry.as_ref()).await
                }
                None => Err(format!("module `{}` is not registered", module_spec.module.0)),
            }
        };

        match outcome {
            Ok(value) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                if let Some(cell) = context.cells.get(&module_spec.output) {
                    let _ = cell.write(module_spec.output, value);
                }
                module_statuses
                    .lock()
                    .await
                    .insert(display_name, ModuleStatus::Fired { latency_ms, context: None });
                self.listeners.notify_module_complete(execution_id, module_id, latency_ms);
            }
            Err(cause) => {
                if call_options.on_error == OnErrorPolicy::Ignore {
                    tracing::debug!(execution = %execution_id, module = %display_name, %cause, "module failed, ignored by onError policy");
                    module_statuses.lock().await.insert(display_name, ModuleStatus::Unfired);
                } else {
                    tracing::warn!(execution = %execution_id, module = %display_name, %cause, "module failed");
                    module_statuses.lock().await.insert(display_name, ModuleStatus::Failed { cause: cause.clone() });
                    errors.lock().await.push(format!("{}: {cause}", module_spec.display_name));
                    self.listeners.notify_module_failed(execution_id, module_id, cause);
                }
            }
        }
    }
}

async fn run_transform_fiber(context: Arc<ExecutionContext>, id: DataId, transform: Transform) {
    let Some(cell) = context.cells.get(&id).cloned() else { return };
    if let Some(value) = eval_transform(&transform, &context, None).await {
        let _ = cell.write(id, value);
    }
}

/// Awaits every named input cell, bounded by `timeout` if one applies.
/// Returns `None` if the bound expires first.
async fn await_inputs(
    cells: &IndexMap<String, Cell>,
    timeout: Option<Duration>,
) -> Option<IndexMap<String, CValue>> {
    let collect = async {
        let mut out = IndexMap::new();
        for (name, cell) in cells {
            out.insert(name.clone(), cell.await_value().await);
        }
        out
    };
    match timeout {
        Some(duration) => tokio::time::timeout(duration, collect).await.ok(),
        None => Some(collect.await),
    }
}

async fn run_with_retry(
    implementation: ModuleImpl,
    arguments: IndexMap<String, CValue>,
    module_timeout: Option<Duration>,
    retry: Option<&constellation_compiler::RetryPolicy>,
) -> Result<CValue, String> {
    let max_attempts = retry.map(|r| r.max_attempts.max(1)).unwrap_or(1);
    let backoff = retry.map(|r| Duration::from_millis(r.backoff_ms)).unwrap_or_default();
    let mut last_err = String::new();
    for attempt in 0..max_attempts {
        let call = implementation(arguments.clone());
        let outcome = match module_timeout {
            Some(duration) => match tokio::time::timeout(duration, call).await {
                Ok(result) => result,
                Err(_) => Err("module call exceeded its timeout".to_string()),
            },
            None => call.await,
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = err;
                if attempt + 1 < max_attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(last_err)
}

/// Interprets a compiler-synthesized `branch` module: evaluates `cond0,
/// cond1, ...` in order and returns the first matching arm's `exprN`, or
/// `otherwise` if none matched.
fn evaluate_branch(arm_count: u32, arguments: &IndexMap<String, CValue>) -> Result<CValue, String> {
    for i in 0..arm_count {
        let cond_key = format!("cond{i}");
        let expr_key = format!("expr{i}");
        match arguments.get(&cond_key) {
            Some(CValue::Bool(true)) => {
                return arguments
                    .get(&expr_key)
                    .cloned()
                    .ok_or_else(|| format!("branch arm {i} missing its expression value"));
            }
            Some(CValue::Bool(false)) => continue,
            Some(_) => return Err(format!("branch condition {i} did not evaluate to a boolean")),
            None => return Err(format!("branch condition {cond_key} was never supplied")),
        }
    }
    arguments
        .get("otherwise")
        .cloned()
        .ok_or_else(|| "branch matched no arm and has no otherwise clause".to_string())
}

/// The set of data node ids reachable only from inside a `Filter`/`Map`/
/// `All`/`Any` body -- these are re-entered once per source element and so
/// never get a standalone cell.
fn body_interior_nodes(dag: &DagSpec) -> HashSet<DataId> {
    let mut interior = HashSet::new();
    for spec in dag.data.values() {
        if let DataOrigin::Transform(
            Transform::Filter { body, .. }
            | Transform::Map { body, .. }
            | Transform::All { body, .. }
            | Transform::Any { body, .. },
        ) = &spec.origin
        {
            collect_interior(dag, *body, &mut interior);
        }
    }
    interior
}

/// Marks `id` (and, if it is a transform, everything it reads) as
/// body-interior. An `Input`/`Literal`/`ModuleOutput` node reached from
/// inside a body is an outer capture (a closure over an enclosing variable),
/// not part of the per-element expression tree, so it keeps its own
/// top-level cell instead of being swept in here.
fn collect_interior(dag: &DagSpec, id: DataId, interior: &mut HashSet<DataId>) {
    let Some(spec) = dag.data.get(&id) else { return };
    match &spec.origin {
        DataOrigin::BoundElement => {
            interior.insert(id);
        }
        DataOrigin::Transform(t) => {
            if !interior.insert(id) {
                return;
            }
            for (_, input) in t.inputs() {
                collect_interior(dag, input, interior);
            }
        }
        DataOrigin::Input { .. } | DataOrigin::Literal { .. } | DataOrigin::ModuleOutput { .. } => {}
    }
}

/// Evaluates a non-HOF transform, or the top level of a `Filter`/`Map`/
/// `All`/`Any` (whose body is evaluated per-element by [`resolve_node`]).
/// Returns `None` only if an input never resolves within this execution's
/// overall deadline; ordinary missing-input suspension is detected by the
/// caller's final cell scan, not here.
fn eval_transform<'a>(
    transform: &'a Transform,
    context: &'a ExecutionContext,
    element: Option<&'a CValue>,
) -> Pin<Box<dyn Future<Output = Option<CValue>> + Send + 'a>> {
    Box::pin(async move {
        let resolve = |id: DataId| resolve_node(context, id, element);
        Some(match transform {
            Transform::FieldAccess { source, field } => {
                let source = resolve(*source).await?;
                field_of(&source, field)?
            }
            Transform::Project { source, fields } => {
                let source = resolve(*source).await?;
                let CValue::Product(map) = source else { return None };
                let mut out = IndexMap::new();
                for f in fields {
                    out.insert(f.clone(), map.get(f).cloned()?);
                }
                CValue::Product(out)
            }
            Transform::Merge { lhs, rhs } => {
                let lhs = resolve(*lhs).await?;
                let rhs = resolve(*rhs).await?;
                let (CValue::Product(mut a), CValue::Product(b)) = (lhs, rhs) else { return None };
                for (k, v) in b {
                    a.insert(k, v);
                }
                CValue::Product(a)
            }
            Transform::Conditional { cond, then_branch, else_branch } => {
                let cond = resolve(*cond).await?;
                let CValue::Bool(b) = cond else { return None };
                if b { resolve(*then_branch).await? } else { resolve(*else_branch).await? }
            }
            Transform::And { lhs, rhs } => {
                let (CValue::Bool(a), CValue::Bool(b)) = (resolve(*lhs).await?, resolve(*rhs).await?) else {
                    return None;
                };
                CValue::Bool(a && b)
            }
            Transform::Or { lhs, rhs } => {
                let (CValue::Bool(a), CValue::Bool(b)) = (resolve(*lhs).await?, resolve(*rhs).await?) else {
                    return None;
                };
                CValue::Bool(a || b)
            }
            Transform::Not { operand } => {
                let CValue::Bool(b) = resolve(*operand).await? else { return None };
                CValue::Bool(!b)
            }
            Transform::Guard { value, cond } => {
                let cond = resolve(*cond).await?;
                let CValue::Bool(b) = cond else { return None };
                if b { CValue::Optional(Some(Box::new(resolve(*value).await?))) } else { CValue::Optional(None) }
            }
            Transform::Coalesce { primary, fallback } => {
                let primary = resolve(*primary).await?;
                match primary {
                    CValue::Optional(Some(v)) => *v,
                    CValue::Optional(None) => resolve(*fallback).await?,
                    other => other,
                }
            }
            Transform::StringInterpolation { parts, exprs } => {
                let mut out = String::new();
                for (i, part) in parts.iter().enumerate() {
                    out.push_str(part);
                    if let Some(expr) = exprs.get(i) {
                        let value = resolve(*expr).await?;
                        out.push_str(&render(&value));
                    }
                }
                CValue::Str(out)
            }
            Transform::Filter { source, element: elem_id, body } => {
                let source = resolve(*source).await?;
                let CValue::List(items) = source else { return None };
                let mut out = Vec::new();
                for item in &items {
                    let kept = resolve_node(context, *body, Some(item)).await?;
                    let _ = elem_id;
                    if matches!(kept, CValue::Bool(true)) {
                        out.push(item.clone());
                    }
                }
                CValue::List(out)
            }
            Transform::Map { source, body, .. } => {
                let source = resolve(*source).await?;
                let CValue::List(items) = source else { return None };
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(resolve_node(context, *body, Some(item)).await?);
                }
                CValue::List(out)
            }
            Transform::All { source, body, .. } => {
                let source = resolve(*source).await?;
                let CValue::List(items) = source else { return None };
                let mut result = true;
                for item in &items {
                    let value = resolve_node(context, *body, Some(item)).await?;
                    if !matches!(value, CValue::Bool(true)) {
                        result = false;
                        break;
                    }
                }
                CValue::Bool(result)
            }
            Transform::Any { source, body, .. } => {
                let source = resolve(*source).await?;
                let CValue::List(items) = source else { return None };
                let mut result = false;
                for item in &items {
                    let value = resolve_node(context, *body, Some(item)).await?;
                    if matches!(value, CValue::Bool(true)) {
                        result = true;
                        break;
                    }
                }
                CValue::Bool(result)
            }
        })
    })
}

/// Resolves a data node's value. Nodes allocated a standalone cell await it;
/// `BoundElement` resolves to the current per-iteration `element` (only
/// meaningful while evaluating a HOF body); anything else recurses through
/// [`eval_transform`] directly, for a literal or nested transform living
/// entirely inside a body.
fn resolve_node<'a>(
    context: &'a ExecutionContext,
    id: DataId,
    element: Option<&'a CValue>,
) -> Pin<Box<dyn Future<Output = Option<CValue>> + Send + 'a>> {
    Box::pin(async move {
        if let Some(cell) = context.cells.get(&id) {
            return Some(cell.await_value().await);
        }
        let spec = context.dag.data.get(&id)?;
        match &spec.origin {
            DataOrigin::BoundElement => element.cloned(),
            DataOrigin::Literal { value } => Some(value.clone()),
            DataOrigin::Transform(t) => eval_transform(t, context, element).await,
            DataOrigin::Input { .. } | DataOrigin::ModuleOutput { .. } => None,
        }
    })
}

fn field_of(value: &CValue, field: &str) -> Option<CValue> {
    match value {
        CValue::Product(fields) => fields.get(field).cloned(),
        _ => None,
    }
}

fn render(value: &CValue) -> String {
    match value {
        CValue::Str(s) => s.clone(),
        CValue::Int(i) => i.to_string(),
        CValue::Float(f) => f.to_string(),
        CValue::Bool(b) => b.to_string(),
        other => format!("{other:?}"),
    }
}

/// Checks every provided input against the program's declared user inputs:
/// unknown names and type mismatches are collected, never short-circuited,
/// so a caller sees every problem at once.
fn validate_inputs(dag: &DagSpec, inputs: &IndexMap<String, CValue>) -> Result<(), Vec<RuntimeError>> {
    let mut errors = Vec::new();
    for (name, value) in inputs {
        match dag.find_input_by_name(name) {
            None => errors.push(RuntimeError::UnknownInput { name: name.clone() }),
            Some(id) => {
                let spec = &dag.data[&id];
                if !value.matches_type(&spec.ty) {
                    errors.push(RuntimeError::InputTypeMismatch {
                        name: name.clone(),
                        expected: format!("{:?}", spec.ty),
                        actual: format!("{value:?}"),
                    });
                }
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// One deadline for the whole execution, generous enough to cover every
/// module's own `inputsTimeout` + `moduleTimeout`, so a stalled dependency
/// chain still converges to a terminal `DataSignature` instead of hanging.
fn overall_deadline(call_options: &IndexMap<ModuleNodeId, ModuleCallOptions>) -> Duration {
    const FLOOR_MS: u64 = 5_000;
    let longest = call_options
        .values()
        .map(|o| o.inputs_timeout_ms.unwrap_or(0) + o.timeout_ms.unwrap_or(0))
        .max()
        .unwrap_or(0);
    Duration::from_millis(longest.max(FLOOR_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_check::FunctionRegistry;
    use constellation_compiler::compile;

    fn identity_module() -> ModuleImpl {
        Arc::new(|mut args: IndexMap<String, CValue>| {
            Box::pin(async move { args.shift_remove("a").ok_or_else(|| "missing a".to_string()) })
        })
    }

    fn add_module() -> ModuleImpl {
        Arc::new(|args: IndexMap<String, CValue>| {
            Box::pin(async move {
                let (Some(CValue::Int(a)), Some(CValue::Int(b))) = (args.get("a"), args.get("b")) else {
                    return Err("expected two ints".to_string());
                };
                Ok(CValue::Int(a + b))
            })
        })
    }

    fn executor_with(name: &str, implementation: ModuleImpl) -> Executor {
        let mut registry = ModuleRegistry::new();
        registry.register(name, implementation);
        Executor::new(registry, Scheduler::unbounded())
    }

    #[tokio::test]
    async fn pure_input_to_output_program_completes_without_any_module() {
        let loaded = compile("in x: Int\nout x", "p", &FunctionRegistry::new()).unwrap();
        let executor = Executor::new(ModuleRegistry::new(), Scheduler::unbounded());
        let mut inputs = IndexMap::new();
        inputs.insert("x".to_string(), CValue::Int(5));
        let signature = executor.execute(&loaded, Uuid::new_v4(), inputs).await;
        assert_eq!(signature.status, ExecutionStatus::Completed);
        assert!(matches!(signature.outputs.get("x"), Some(CValue::Int(5))));
    }

    #[tokio::test]
    async fn missing_required_input_suspends() {
        let loaded = compile("in x: Int\nout x", "p", &FunctionRegistry::new()).unwrap();
        let executor = Executor::new(ModuleRegistry::new(), Scheduler::unbounded());
        let signature = executor.execute(&loaded, Uuid::new_v4(), IndexMap::new()).await;
        assert_eq!(signature.status, ExecutionStatus::Suspended);
        assert_eq!(signature.missing_inputs, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn module_call_fires_and_produces_output() {
        use constellation_core::{CType, FunctionSignature, ModuleRef};
        let mut registry = FunctionRegistry::new();
        registry.register(FunctionSignature::new(
            "identity",
            vec![("a".into(), CType::CInt)],
            CType::CInt,
            ModuleRef::new("identity"),
        ));
        let loaded = compile("in x: Int\nr = identity(x)\nout r", "p", &registry).unwrap();
        let executor = executor_with("identity", identity_module());
        let mut inputs = IndexMap::new();
        inputs.insert("x".to_string(), CValue::Int(9));
        let signature = executor.execute(&loaded, Uuid::new_v4(), inputs).await;
        assert_eq!(signature.status, ExecutionStatus::Completed);
        assert!(matches!(signature.outputs.get("r"), Some(CValue::Int(9))));
    }

    #[tokio::test]
    async fn unregistered_module_fails_the_execution() {
        use constellation_core::{CType, FunctionSignature, ModuleRef};
        let mut registry = FunctionRegistry::new();
        registry.register(FunctionSignature::new(
            "mystery",
            vec![("a".into(), CType::CInt)],
            CType::CInt,
            ModuleRef::new("mystery"),
        ));
        let loaded = compile("in x: Int\nr = mystery(x)\nout r", "p", &registry).unwrap();
        let executor = Executor::new(ModuleRegistry::new(), Scheduler::unbounded());
        let mut inputs = IndexMap::new();
        inputs.insert("x".to_string(), CValue::Int(1));
        let signature = executor.execute(&loaded, Uuid::new_v4(), inputs).await;
        assert_eq!(signature.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_input_name_is_rejected_before_any_fiber_runs() {
        let loaded = compile("in x: Int\nout x", "p", &FunctionRegistry::new()).unwrap();
        let executor = Executor::new(ModuleRegistry::new(), Scheduler::unbounded());
        let mut inputs = IndexMap::new();
        inputs.insert("nope".to_string(), CValue::Int(1));
        let signature = executor.execute(&loaded, Uuid::new_v4(), inputs).await;
        assert_eq!(signature.status, ExecutionStatus::Failed);
        assert!(!signature.errors.is_empty());
    }

    #[tokio::test]
    async fn two_input_module_call_completes() {
        use constellation_core::{CType, FunctionSignature, ModuleRef};
        let mut registry = FunctionRegistry::new();
        registry.register(FunctionSignature::new(
            "add",
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CInt,
            ModuleRef::new("add"),
        ));
        let loaded = compile("in a: Int\nin b: Int\nr = add(a, b)\nout r", "p", &registry).unwrap();
        let executor = executor_with("add", add_module());
        let mut inputs = IndexMap::new();
        inputs.insert("a".to_string(), CValue::Int(2));
        inputs.insert("b".to_string(), CValue::Int(3));
        let signature = executor.execute(&loaded, Uuid::new_v4(), inputs).await;
        assert_eq!(signature.status, ExecutionStatus::Completed);
        assert!(matches!(signature.outputs.get("r"), Some(CValue::Int(5))));
    }
}
