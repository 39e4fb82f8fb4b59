//! A small built-in module set so `constellation run` and `constellation
//! compile` do something useful without a `--registry` manifest -- enough
//! to exercise `spec.md` §8 scenario 4 (`branch { x>high -> high, x<low ->
//! low, otherwise -> x }` with `gt`/`lt` registered) out of the box.
//!
//! Grounded on `lmlang-core`'s intrinsic-function registration (a fixed
//! set of arithmetic/comparison primitives the compiler ships with,
//! independent of any user-supplied registry), retargeted from LLVM
//! intrinsics to `ModuleImpl` async closures over `CValue`.

use std::sync::Arc;

use indexmap::IndexMap;

use constellation_check::FunctionRegistry;
use constellation_core::types::CValue;
use constellation_core::{CType, FunctionSignature, ModuleRef};
use constellation_runtime::{ModuleImpl, ModuleRegistry};

/// Signatures for the built-in modules, registered under no namespace so
/// bare calls like `gt(x, 0)` resolve.
pub fn function_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    for name in ["gt", "lt", "gte", "lte", "eq"] {
        registry.register(FunctionSignature::new(
            name,
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CBoolean,
            ModuleRef::new(name),
        ));
    }
    for name in ["add", "sub", "mul"] {
        registry.register(FunctionSignature::new(
            name,
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CInt,
            ModuleRef::new(name),
        ));
    }
    registry
}

/// Implementations matching [`function_registry`] one for one.
pub fn module_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register("gt", int_compare(|a, b| a > b));
    registry.register("lt", int_compare(|a, b| a < b));
    registry.register("gte", int_compare(|a, b| a >= b));
    registry.register("lte", int_compare(|a, b| a <= b));
    registry.register("eq", int_compare(|a, b| a == b));
    registry.register("add", int_binop(|a, b| a + b));
    registry.register("sub", int_binop(|a, b| a - b));
    registry.register("mul", int_binop(|a, b| a * b));
    registry
}

fn take_int(args: &IndexMap<String, CValue>, name: &str) -> Result<i64, String> {
    match args.get(name) {
        Some(CValue::Int(n)) => Ok(*n),
        Some(_) => Err(format!("argument '{name}' is not an Int")),
        None => Err(format!("missing argument '{name}'")),
    }
}

fn int_compare(op: fn(i64, i64) -> bool) -> ModuleImpl {
    Arc::new(move |args: IndexMap<String, CValue>| {
        Box::pin(async move {
            let a = take_int(&args, "a")?;
            let b = take_int(&args, "b")?;
            Ok(CValue::Bool(op(a, b)))
        })
    })
}

fn int_binop(op: fn(i64, i64) -> i64) -> ModuleImpl {
    Arc::new(move |args: IndexMap<String, CValue>| {
        Box::pin(async move {
            let a = take_int(&args, "a")?;
            let b = take_int(&args, "b")?;
            Ok(CValue::Int(op(a, b)))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gt_compares_ints() {
        let registry = module_registry();
        let gt = registry.get("gt").unwrap();
        let mut args = IndexMap::new();
        args.insert("a".to_string(), CValue::Int(5));
        args.insert("b".to_string(), CValue::Int(3));
        match gt(args).await {
            Ok(CValue::Bool(true)) => {}
            other => panic!("expected Ok(Bool(true)), got {other:?}"),
        }
    }

    #[test]
    fn function_and_module_registries_agree_on_names() {
        let functions = function_registry();
        let modules = module_registry();
        for name in functions.names() {
            assert!(modules.get(name).is_some(), "missing module impl for {name}");
        }
    }
}
