//! Function registry: the set of host modules and namespaces known to the
//! checker (`spec.md` §4.3, §6). Grounded on `lmlang-core`'s registry-style
//! lookup tables, generalized from its single-namespace function table to
//! Constellation's qualified/bare/aliased resolution.

use indexmap::IndexMap;
use std::collections::HashMap;

use constellation_core::FunctionSignature;

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    /// Keyed by `qualified_name()` (`ns.func` or bare `func`).
    by_qualified: IndexMap<String, FunctionSignature>,
    /// Bare short name -> first-registered qualified name. Per `spec.md`
    /// §6: "bare lookup consults a short-name index (first registration
    /// wins on collision)".
    short_name_first: HashMap<String, String>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, signature: FunctionSignature) {
        let qualified = signature.qualified_name();
        self.short_name_first
            .entry(signature.name.clone())
            .or_insert_with(|| qualified.clone());
        self.by_qualified.insert(qualified, signature);
    }

    pub fn deregister(&mut self, qualified_name: &str) -> Option<FunctionSignature> {
        let removed = self.by_qualified.shift_remove(qualified_name);
        if let Some(sig) = &removed {
            if self.short_name_first.get(&sig.name) == Some(&qualified_name.to_string()) {
                self.short_name_first.remove(&sig.name);
                // Re-elect the next remaining registration with this short name.
                if let Some((qn, _)) = self
                    .by_qualified
                    .iter()
                    .find(|(_, s)| s.name == sig.name)
                {
                    self.short_name_first.insert(sig.name.clone(), qn.clone());
                }
            }
        }
        removed
    }

    /// Fully-qualified (`ns.func`) or bare (`func`, via the short-name
    /// index) lookup, per `spec.md` §6's module registry rule.
    pub fn get(&self, name: &str) -> Option<&FunctionSignature> {
        self.by_qualified
            .get(name)
            .or_else(|| self.short_name_first.get(name).and_then(|qn| self.by_qualified.get(qn)))
    }

    pub fn has_namespace(&self, ns: &str) -> bool {
        self.by_qualified
            .values()
            .any(|sig| sig.namespace.as_deref() == Some(ns))
    }

    pub fn resolve_qualified(&self, ns: &str, func: &str) -> Option<&FunctionSignature> {
        self.by_qualified.get(&format!("{ns}.{func}"))
    }

    /// Candidate signatures for a bare call to `name`, restricted to
    /// those with no namespace or a namespace in `active_namespaces`
    /// (`spec.md` §4.3 rule (b)).
    pub fn candidates_for_bare(
        &self,
        name: &str,
        active_namespaces: &[String],
    ) -> Vec<&FunctionSignature> {
        self.by_qualified
            .values()
            .filter(|sig| sig.name == name)
            .filter(|sig| match &sig.namespace {
                None => true,
                Some(ns) => active_namespaces.iter().any(|a| a == ns),
            })
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_qualified.keys().map(String::as_str)
    }

    pub fn list(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.by_qualified.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_core::{CType, ModuleRef};

    fn sig(name: &str, ns: Option<&str>) -> FunctionSignature {
        let base = FunctionSignature::new(name, vec![], CType::CBoolean, ModuleRef::new(name));
        match ns {
            Some(ns) => base.with_namespace(ns),
            None => base,
        }
    }

    #[test]
    fn first_registration_wins_short_name_collision() {
        let mut reg = FunctionRegistry::new();
        reg.register(sig("gt", Some("math")));
        reg.register(sig("gt", Some("compare")));
        assert_eq!(reg.get("gt").unwrap().namespace.as_deref(), Some("math"));
    }

    #[test]
    fn qualified_lookup_is_exact() {
        let mut reg = FunctionRegistry::new();
        reg.register(sig("gt", Some("math")));
        assert!(reg.resolve_qualified("math", "gt").is_some());
        assert!(reg.resolve_qualified("compare", "gt").is_none());
    }

    #[test]
    fn candidates_for_bare_respects_active_namespaces() {
        let mut reg = FunctionRegistry::new();
        reg.register(sig("gt", Some("math")));
        reg.register(sig("gt", Some("compare")));
        reg.register(sig("abs", None));
        let candidates = reg.candidates_for_bare("gt", &["math".to_string()]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].namespace.as_deref(), Some("math"));
    }

    #[test]
    fn deregister_reelects_short_name() {
        let mut reg = FunctionRegistry::new();
        reg.register(sig("gt", Some("math")));
        reg.register(sig("gt", Some("compare")));
        reg.deregister("math.gt");
        assert_eq!(reg.get("gt").unwrap().namespace.as_deref(), Some("compare"));
    }
}
