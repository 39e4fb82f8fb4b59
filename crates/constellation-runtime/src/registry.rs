//! The module registry: host-provided effectful implementations, looked up
//! by the `ModuleRef` each `ModuleNodeSpec` carries (`spec.md` §6, §5:
//! "supports register/deregister; an index of short names and namespaces
//! is maintained for O(1) lookup"). Shaped after
//! `constellation_check::FunctionRegistry`'s qualified/bare/short-name
//! resolution, generalized here from signature bookkeeping to holding the
//! actual callable.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;

use constellation_core::types::CValue;

/// A module's async implementation: named argument values in, a single
/// output value (or a module-level failure message) out.
pub type ModuleFuture = Pin<Box<dyn Future<Output = Result<CValue, String>> + Send>>;
pub type ModuleImpl = Arc<dyn Fn(IndexMap<String, CValue>) -> ModuleFuture + Send + Sync>;

/// Host module implementations, keyed the same way as
/// `constellation_check::FunctionRegistry`: fully-qualified (`ns.name`) or
/// bare, with first-registration-wins short-name resolution.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    by_qualified: IndexMap<String, ModuleImpl>,
    short_name_first: HashMap<String, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `implementation` under `name`, which may be qualified
    /// (`ns.func`) or bare. The first registration of a given short name
    /// (the part after the last `.`) wins bare lookups.
    pub fn register(&mut self, name: impl Into<String>, implementation: ModuleImpl) {
        let name = name.into();
        let short = short_name(&name);
        self.short_name_first.entry(short.to_string()).or_insert_with(|| name.clone());
        self.by_qualified.insert(name, implementation);
    }

    pub fn deregister(&mut self, name: &str) -> Option<ModuleImpl> {
        let removed = self.by_qualified.shift_remove(name);
        if removed.is_some() {
            let short = short_name(name);
            if self.short_name_first.get(short) == Some(&name.to_string()) {
                self.short_name_first.remove(short);
                if let Some((qn, _)) =
                    self.by_qualified.iter().find(|(qn, _)| short_name(qn) == short)
                {
                    self.short_name_first.insert(short.to_string(), qn.clone());
                }
            }
        }
        removed
    }

    /// Fully-qualified or bare lookup, mirroring `FunctionRegistry::get`.
    pub fn get(&self, name: &str) -> Option<ModuleImpl> {
        self.by_qualified
            .get(name)
            .or_else(|| self.short_name_first.get(name).and_then(|qn| self.by_qualified.get(qn)))
            .cloned()
    }

    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.by_qualified.keys().map(String::as_str)
    }
}

fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_module() -> ModuleImpl {
        Arc::new(|mut args: IndexMap<String, CValue>| {
            Box::pin(async move { args.shift_remove("x").ok_or_else(|| "missing x".to_string()) })
        })
    }

    #[test]
    fn bare_registration_is_retrievable_by_bare_name() {
        let mut reg = ModuleRegistry::new();
        reg.register("identity", identity_module());
        assert!(reg.get("identity").is_some());
    }

    #[test]
    fn qualified_lookup_is_exact_and_bare_resolves_via_short_name() {
        let mut reg = ModuleRegistry::new();
        reg.register("math.add", identity_module());
        assert!(reg.get("math.add").is_some());
        assert!(reg.get("add").is_some());
        assert!(reg.get("other.add").is_none());
    }

    #[test]
    fn first_registration_wins_short_name_collision() {
        let mut reg = ModuleRegistry::new();
        reg.register("math.gt", identity_module());
        reg.register("compare.gt", identity_module());
        // Both are independently retrievable by qualified name...
        assert!(reg.get("math.gt").is_some());
        assert!(reg.get("compare.gt").is_some());
        // ...but the bare short name always means the first registrant.
        reg.deregister("math.gt");
        // After removing the first registrant the bare name re-elects
        // whichever qualified registration remains.
        assert!(reg.get("gt").is_some());
    }

    #[test]
    fn deregister_removes_entry() {
        let mut reg = ModuleRegistry::new();
        reg.register("abs", identity_module());
        assert!(reg.deregister("abs").is_some());
        assert!(reg.get("abs").is_none());
    }
}
