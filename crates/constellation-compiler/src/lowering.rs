//! `spec.md` §4.5: lowers a checked [`TypedProgram`] into a [`DagSpec`].
//!
//! This is the hardest pass in the workspace. Grounded on
//! `lmlang-core/src/graph.rs`'s `ProgramGraph` builder idiom (a mutable
//! accumulator struct with one `add_*` method per node kind, invariant
//! checks deferred to the end) and on `spec.md` §9's design note that every
//! surface operator must lower to one of a closed set of tagged
//! [`Transform`] variants carrying only data -- no user code survives
//! lowering except as a named [`ModuleNodeSpec`] resolved at execution time.
//!
//! Two lowering decisions `spec.md` leaves implicit are recorded here and
//! in `DESIGN.md`:
//!
//! - `ListLiteral`/`RecordLiteral` (`constellation_parser::ast::Literal::
//!   List`/`Record`) are surface-constant forms only -- the grammar lists
//!   record/union syntax as *type* grammar, and §4.4 only ever discusses
//!   list/record *literals* in the context of `@example`. Lowering folds
//!   them straight into a `Literal` data node; a non-constant sub-expression
//!   inside one is `LowerError::NonConstantLiteral`.
//! - Every `ModuleCall`'s single produced field is named `"out"`, since
//!   `FunctionSignature` carries no separate output-field name and `spec.md`
//!   never names one either.

use std::collections::HashMap;

use constellation_check::{HofOp, TypedDecl, TypedExpr, TypedProgram};
use constellation_core::{
    CType, DagSpec, DataId, DataNodeSpec, DataOrigin, ModuleNodeId, ModuleNodeSpec, Span,
    SyntheticKind, Transform,
};
use indexmap::IndexMap;

use crate::error::LowerError;

/// Name of the single output field every `ModuleCall` (synthetic or host)
/// produces. See the module doc comment for why this is a constant rather
/// than derived per-call.
const CALL_OUTPUT_FIELD: &str = "out";

/// Lowers a type-checked program into a [`DagSpec`], running the five
/// `spec.md` §3 invariants (via [`DagSpec::validate`]) before returning.
pub fn lower_program(program: &TypedProgram, program_name: &str) -> Result<DagSpec, LowerError> {
    let mut ctx = LowerCtx::new(program_name);
    for decl in &program.declarations {
        ctx.lower_decl(decl)?;
    }
    ctx.dag.validate()?;
    Ok(ctx.dag)
}

struct LowerCtx {
    dag: DagSpec,
    /// Surface variable name (including HOF lambda parameters, which shadow
    /// for the duration of lowering their body) -> data node.
    env: HashMap<String, DataId>,
}

impl LowerCtx {
    fn new(program_name: &str) -> Self {
        LowerCtx {
            dag: DagSpec::new(program_name),
            env: HashMap::new(),
        }
    }

    fn new_data_node(&mut self, ty: CType, origin: DataOrigin, span: Option<Span>) -> DataId {
        let id = DataId::new_v4();
        self.dag.data.insert(
            id,
            DataNodeSpec {
                name: None,
                ty,
                origin,
                nicknames: IndexMap::new(),
                span,
            },
        );
        id
    }

    fn lower_decl(&mut self, decl: &TypedDecl) -> Result<(), LowerError> {
        match decl {
            TypedDecl::Input { name, ty, example: _, span } => {
                // `@example` is a checker-time-only annotation (spec.md
                // §4.4): it constrains what the checker accepts as a
                // compile-time sample value, but nothing in §3's `DagSpec`
                // shape carries it forward into the compiled program.
                let id = self.new_data_node(
                    ty.clone(),
                    DataOrigin::Input { source_name: name.clone() },
                    Some(*span),
                );
                if let Some(node) = self.dag.data.get_mut(&id) {
                    node.name = Some(name.clone());
                }
                self.env.insert(name.clone(), id);
            }
            TypedDecl::Assign { name, value, span: _ } => {
                let id = self.lower_expr(value)?;
                if let Some(node) = self.dag.data.get_mut(&id) {
                    if node.name.is_none() {
                        node.name = Some(name.clone());
                    }
                }
                self.env.insert(name.clone(), id);
            }
            TypedDecl::Output { name, span } => {
                let id = self.env.get(name).copied().ok_or_else(|| LowerError::UnboundVariable {
                    name: name.clone(),
                    span: *span,
                })?;
                self.dag.declared_outputs.push(name.clone());
                self.dag.output_bindings.insert(name.clone(), id);
            }
        }
        Ok(())
    }

    fn lower_expr(&mut self, expr: &TypedExpr) -> Result<DataId, LowerError> {
        match expr {
            TypedExpr::Literal { value, ty, span } => {
                Ok(self.new_data_node(ty.clone(), DataOrigin::Literal { value: value.clone() }, Some(*span)))
            }
            TypedExpr::ListLiteral { items, ty, span } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.const_fold(item)?);
                }
                Ok(self.new_data_node(
                    ty.clone(),
                    DataOrigin::Literal { value: constellation_core::CValue::List(values) },
                    Some(*span),
                ))
            }
            TypedExpr::RecordLiteral { fields, ty, span } => {
                let mut out = IndexMap::new();
                for (name, value) in fields {
                    out.insert(name.clone(), self.const_fold(value)?);
                }
                Ok(self.new_data_node(
                    ty.clone(),
                    DataOrigin::Literal { value: constellation_core::CValue::Product(out) },
                    Some(*span),
                ))
            }
            TypedExpr::Var { name, span, .. } => self.env.get(name).copied().ok_or_else(|| {
                LowerError::UnboundVariable { name: name.clone(), span: *span }
            }),
            TypedExpr::FieldAccess { source, field, ty, span } => {
                let src = self.lower_expr(source)?;
                Ok(self.new_data_node(
                    ty.clone(),
                    DataOrigin::Transform(Transform::FieldAccess { source: src, field: field.clone() }),
                    Some(*span),
                ))
            }
            TypedExpr::Project { source, fields, ty, span } => {
                let src = self.lower_expr(source)?;
                Ok(self.new_data_node(
                    ty.clone(),
                    DataOrigin::Transform(Transform::Project { source: src, fields: fields.clone() }),
                    Some(*span),
                ))
            }
            TypedExpr::Merge { lhs, rhs, ty, span } => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                Ok(self.new_data_node(
                    ty.clone(),
                    DataOrigin::Transform(Transform::Merge { lhs: l, rhs: r }),
                    Some(*span),
                ))
            }
            TypedExpr::Conditional { cond, then_branch, else_branch, ty, span } => {
                let c = self.lower_expr(cond)?;
                let t = self.lower_expr(then_branch)?;
                let e = self.lower_expr(else_branch)?;
                Ok(self.new_data_node(
                    ty.clone(),
                    DataOrigin::Transform(Transform::Conditional { cond: c, then_branch: t, else_branch: e }),
                    Some(*span),
                ))
            }
            TypedExpr::And(lhs, rhs, span) => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                Ok(self.new_data_node(
                    CType::CBoolean,
                    DataOrigin::Transform(Transform::And { lhs: l, rhs: r }),
                    Some(*span),
                ))
            }
            TypedExpr::Or(lhs, rhs, span) => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                Ok(self.new_data_node(
                    CType::CBoolean,
                    DataOrigin::Transform(Transform::Or { lhs: l, rhs: r }),
                    Some(*span),
                ))
            }
            TypedExpr::Not(operand, span) => {
                let o = self.lower_expr(operand)?;
                Ok(self.new_data_node(
                    CType::CBoolean,
                    DataOrigin::Transform(Transform::Not { operand: o }),
                    Some(*span),
                ))
            }
            TypedExpr::Guard { value, cond, ty, span } => {
                let v = self.lower_expr(value)?;
                let c = self.lower_expr(cond)?;
                Ok(self.new_data_node(
                    ty.clone(),
                    DataOrigin::Transform(Transform::Guard { value: v, cond: c }),
                    Some(*span),
                ))
            }
            TypedExpr::Coalesce { primary, fallback, ty, span } => {
                let p = self.lower_expr(primary)?;
                let f = self.lower_expr(fallback)?;
                Ok(self.new_data_node(
                    ty.clone(),
                    DataOrigin::Transform(Transform::Coalesce { primary: p, fallback: f }),
                    Some(*span),
                ))
            }
            TypedExpr::Interpolation { parts, exprs, span } => {
                let mut ids = Vec::with_capacity(exprs.len());
                for e in exprs {
                    ids.push(self.lower_expr(e)?);
                }
                Ok(self.new_data_node(
                    CType::CString,
                    DataOrigin::Transform(Transform::StringInterpolation { parts: parts.clone(), exprs: ids }),
                    Some(*span),
                ))
            }
            TypedExpr::Call { signature, args, ty, span } => {
                let mut inputs = IndexMap::new();
                let module_id = ModuleNodeId::new_v4();
                for (arg, (param_name, _param_ty)) in args.iter().zip(signature.params.iter()) {
                    let arg_id = self.lower_expr(arg)?;
                    inputs.insert(param_name.clone(), arg_id);
                    self.dag.in_edges.insert((arg_id, module_id));
                    if let Some(node) = self.dag.data.get_mut(&arg_id) {
                        node.nicknames.insert(module_id, param_name.clone());
                    }
                }
                let output = self.new_data_node(
                    ty.clone(),
                    DataOrigin::ModuleOutput { module: module_id, field: CALL_OUTPUT_FIELD.to_string() },
                    Some(*span),
                );
                self.dag.out_edges.insert((module_id, output));
                self.dag.modules.insert(
                    module_id,
                    ModuleNodeSpec {
                        module: signature.module.clone(),
                        display_name: signature.qualified_name(),
                        inputs,
                        output,
                        return_type: ty.clone(),
                        synthetic: None,
                        span: Some(*span),
                    },
                );
                Ok(output)
            }
            TypedExpr::HofCall { op: HofOp::SortBy, span, .. } => {
                Err(LowerError::UnsupportedOperation { name: "sortBy".to_string(), span: *span })
            }
            TypedExpr::HofCall { op, source, param, body, ty, span } => {
                let source_id = self.lower_expr(source)?;
                let element_ty = match &source.ty() {
                    CType::CList(elem) => (**elem).clone(),
                    other => other.clone(),
                };
                let element_id = self.new_data_node(element_ty, DataOrigin::BoundElement, Some(*span));

                let shadowed = self.env.insert(param.clone(), element_id);
                let body_id = self.lower_expr(body);
                match shadowed {
                    Some(prev) => {
                        self.env.insert(param.clone(), prev);
                    }
                    None => {
                        self.env.remove(param);
                    }
                }
                let body_id = body_id?;

                let transform = match op {
                    HofOp::Filter => Transform::Filter { source: source_id, element: element_id, body: body_id },
                    HofOp::Map => Transform::Map { source: source_id, element: element_id, body: body_id },
                    HofOp::All => Transform::All { source: source_id, element: element_id, body: body_id },
                    HofOp::Any => Transform::Any { source: source_id, element: element_id, body: body_id },
                    HofOp::SortBy => unreachable!("handled above"),
                };
                Ok(self.new_data_node(ty.clone(), DataOrigin::Transform(transform), Some(*span)))
            }
            TypedExpr::Branch { arms, otherwise, ty, span } => {
                let module_id = ModuleNodeId::new_v4();
                let mut inputs = IndexMap::new();
                for (i, (cond, body)) in arms.iter().enumerate() {
                    let cond_id = self.lower_expr(cond)?;
                    let body_id = self.lower_expr(body)?;
                    let cond_name = format!("cond{i}");
                    let expr_name = format!("expr{i}");
                    for (port, id) in [(&cond_name, cond_id), (&expr_name, body_id)] {
                        self.dag.in_edges.insert((id, module_id));
                        if let Some(node) = self.dag.data.get_mut(&id) {
                            node.nicknames.insert(module_id, port.clone());
                        }
                        inputs.insert(port.clone(), id);
                    }
                }
                let otherwise_id = self.lower_expr(otherwise)?;
                self.dag.in_edges.insert((otherwise_id, module_id));
                if let Some(node) = self.dag.data.get_mut(&otherwise_id) {
                    node.nicknames.insert(module_id, "otherwise".to_string());
                }
                inputs.insert("otherwise".to_string(), otherwise_id);

                let output = self.new_data_node(
                    ty.clone(),
                    DataOrigin::ModuleOutput { module: module_id, field: CALL_OUTPUT_FIELD.to_string() },
                    Some(*span),
                );
                self.dag.out_edges.insert((module_id, output));
                self.dag.modules.insert(
                    module_id,
                    ModuleNodeSpec {
                        module: constellation_core::ModuleRef::new("__branch"),
                        display_name: "branch".to_string(),
                        inputs,
                        output,
                        return_type: ty.clone(),
                        synthetic: Some(SyntheticKind::Branch { arm_count: arms.len() as u32 }),
                        span: Some(*span),
                    },
                );
                Ok(output)
            }
        }
    }

    /// Evaluates a `TypedExpr` to a `CValue` without emitting any data
    /// nodes, for the constant-only contents of `ListLiteral`/
    /// `RecordLiteral`. See the module doc comment.
    fn const_fold(&self, expr: &TypedExpr) -> Result<constellation_core::CValue, LowerError> {
        use constellation_core::CValue;
        match expr {
            TypedExpr::Literal { value, .. } => Ok(value.clone()),
            TypedExpr::ListLiteral { items, .. } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.const_fold(item)?);
                }
                Ok(CValue::List(out))
            }
            TypedExpr::RecordLiteral { fields, .. } => {
                let mut out = IndexMap::new();
                for (name, value) in fields {
                    out.insert(name.clone(), self.const_fold(value)?);
                }
                Ok(CValue::Product(out))
            }
            other => Err(LowerError::NonConstantLiteral {
                detail: "list/record literal contents must themselves be constant".to_string(),
                span: other.span(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_check::compile_source;
    use constellation_check::FunctionRegistry;
    use constellation_core::{is_assignable, FunctionSignature, ModuleRef};

    fn compile(src: &str, registry: &FunctionRegistry) -> DagSpec {
        let typed = compile_source(src, registry).expect("typecheck failed");
        lower_program(&typed, "test").expect("lowering failed")
    }

    #[test]
    fn simple_input_output_roundtrip() {
        let dag = compile("in x: Int\nout x", &FunctionRegistry::new());
        assert_eq!(dag.declared_outputs, vec!["x".to_string()]);
        let x = dag.find_input_by_name("x").unwrap();
        assert_eq!(dag.output_bindings.get("x"), Some(&x));
    }

    #[test]
    fn record_merge_lowers_to_merge_transform() {
        let src = "in a: {x:Int}\nin b: {y:Int}\nr = a + b\nout r";
        let dag = compile(src, &FunctionRegistry::new());
        let r = dag.output_bindings.get("r").unwrap();
        assert!(matches!(
            dag.data.get(r).unwrap().origin,
            DataOrigin::Transform(Transform::Merge { .. })
        ));
    }

    #[test]
    fn function_call_produces_module_node_with_out_field() {
        let mut reg = FunctionRegistry::new();
        reg.register(FunctionSignature::new(
            "gt",
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CBoolean,
            ModuleRef::new("gt"),
        ));
        let src = "in x: Int\nin y: Int\nr = gt(x, y)\nout r";
        let dag = compile(src, &reg);
        let r = dag.output_bindings.get("r").unwrap();
        let origin = &dag.data.get(r).unwrap().origin;
        match origin {
            DataOrigin::ModuleOutput { module, field } => {
                assert_eq!(field, "out");
                assert!(dag.modules.contains_key(module));
            }
            _ => panic!("expected ModuleOutput"),
        }
    }

    #[test]
    fn branch_lowers_to_synthetic_module_call() {
        let mut reg = FunctionRegistry::new();
        reg.register(FunctionSignature::new(
            "gt",
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CBoolean,
            ModuleRef::new("gt"),
        ));
        reg.register(FunctionSignature::new(
            "lt",
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CBoolean,
            ModuleRef::new("lt"),
        ));
        let src = "in x: Int\nin high: Int\nin low: Int\nr = branch { gt(x, high) -> high, lt(x, low) -> low, otherwise -> x }\nout r";
        let dag = compile(src, &reg);
        let r = dag.output_bindings.get("r").unwrap();
        let module_id = match &dag.data.get(r).unwrap().origin {
            DataOrigin::ModuleOutput { module, .. } => *module,
            _ => panic!("expected ModuleOutput"),
        };
        let module = dag.modules.get(&module_id).unwrap();
        assert!(matches!(module.synthetic, Some(SyntheticKind::Branch { arm_count: 2 })));
        assert_eq!(module.inputs.len(), 5); // cond0,expr0,cond1,expr1,otherwise
    }

    #[test]
    fn filter_lowers_to_filter_transform_with_bound_element() {
        let src = "in xs: List<Int>\nr = filter(xs, (x) -> gt(x, 0))\nout r";
        let mut reg = FunctionRegistry::new();
        reg.register(FunctionSignature::new(
            "gt",
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CBoolean,
            ModuleRef::new("gt"),
        ));
        let dag = compile(src, &reg);
        let r = dag.output_bindings.get("r").unwrap();
        match &dag.data.get(r).unwrap().origin {
            DataOrigin::Transform(Transform::Filter { element, .. }) => {
                assert!(matches!(dag.data.get(element).unwrap().origin, DataOrigin::BoundElement));
            }
            other => panic!("expected Filter transform, got {other:?}"),
        }
    }

    #[test]
    fn sort_by_is_unsupported_operation() {
        let src = "in xs: List<Int>\nr = sortBy(xs, (x) -> x)\nout r";
        let typed = compile_source(src, &FunctionRegistry::new()).expect("typecheck failed");
        let err = lower_program(&typed, "test").unwrap_err();
        assert!(matches!(err, LowerError::UnsupportedOperation { .. }));
    }

    #[test]
    fn merge_type_is_assignable_superset() {
        let src = "in a: {x:Int}\nin b: {y:Int}\nr = a + b\nout r";
        let dag = compile(src, &FunctionRegistry::new());
        let r = dag.output_bindings.get("r").unwrap();
        let ty = &dag.data.get(r).unwrap().ty;
        assert!(is_assignable(ty, ty));
    }
}
