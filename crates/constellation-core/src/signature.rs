//! Function signatures: the shape a host module or synthetic operator
//! exposes to name resolution and the type checker.

use serde::{Deserialize, Serialize};

use crate::types::CType;

/// Identifies a host-provided module implementation, independent of any one
/// `ModuleCall` node that invokes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleRef(pub String);

impl ModuleRef {
    pub fn new(id: impl Into<String>) -> Self {
        ModuleRef(id.into())
    }
}

/// A registered function's name, ordered parameters, and return type.
///
/// Higher-order operators describe their last parameter with a
/// `CType::CList`/function-shaped annotation understood by the checker; see
/// `constellation-check`'s resolver for how HOF call sites are matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<(String, CType)>,
    pub return_type: CType,
    pub module: ModuleRef,
    pub namespace: Option<String>,
}

impl FunctionSignature {
    pub fn new(
        name: impl Into<String>,
        params: Vec<(String, CType)>,
        return_type: CType,
        module: ModuleRef,
    ) -> Self {
        FunctionSignature {
            name: name.into(),
            params,
            return_type,
            module,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Fully qualified name as it would appear at a `ns.func` call site.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_includes_namespace() {
        let sig = FunctionSignature::new(
            "add",
            vec![("a".into(), CType::CInt), ("b".into(), CType::CInt)],
            CType::CInt,
            ModuleRef::new("math.add"),
        )
        .with_namespace("math");
        assert_eq!(sig.qualified_name(), "math.add");
    }

    #[test]
    fn qualified_name_without_namespace_is_bare() {
        let sig = FunctionSignature::new("gt", vec![], CType::CBoolean, ModuleRef::new("gt"));
        assert_eq!(sig.qualified_name(), "gt");
    }
}
