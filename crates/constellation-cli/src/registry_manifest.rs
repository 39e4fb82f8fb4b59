//! Optional JSON registry-manifest loading (`SPEC_FULL.md` §1 ambient
//! stack: "a small `serde`-deserialized registry-manifest file
//! (`--registry <path>`)", mirroring `lmlang-cli`'s flag layout).
//!
//! A manifest entry's parameter and return types are
//! `constellation_core::CType`'s own serde representation directly, the
//! same reasoning as `main::parse_input`'s `CValue` handling: the core
//! type/value model already round-trips through serde everywhere else in
//! this workspace (`ProgramImage`, `DataSignature`, `SuspendedExecution`),
//! so there is no separate textual type grammar to invent and maintain
//! just for this file.
//!
//! A manifest can only describe *signatures* for the type checker -- it
//! carries no code, so a manifest-only function has no
//! `constellation_runtime::ModuleImpl` and will report `Unfired` at
//! execution time unless the built-in set already covers it. Supplying
//! real host module implementations is an embedding concern outside a
//! thin CLI's scope (`spec.md` §1).

use std::fs;
use std::path::Path;

use serde::Deserialize;

use constellation_check::FunctionRegistry;
use constellation_core::{CType, FunctionSignature, ModuleRef};

use crate::builtins;

#[derive(Debug, Deserialize)]
struct ManifestFunction {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    params: Vec<(String, CType)>,
    returns: CType,
}

#[derive(Debug, Deserialize, Default)]
struct RegistryManifest {
    #[serde(default)]
    functions: Vec<ManifestFunction>,
}

/// Starts from [`builtins::function_registry`] and layers `path`'s
/// manifest entries on top when given. A manifest entry whose name
/// collides with a built-in overwrites it, matching
/// `FunctionRegistry::register`'s own keyed-by-qualified-name behavior.
pub fn load_registry(path: Option<&Path>) -> Result<FunctionRegistry, String> {
    let mut registry = builtins::function_registry();
    let Some(path) = path else { return Ok(registry) };

    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read registry manifest {}: {e}", path.display()))?;
    let manifest: RegistryManifest = serde_json::from_str(&text)
        .map_err(|e| format!("invalid registry manifest {}: {e}", path.display()))?;

    for entry in manifest.functions {
        let module_id = match &entry.namespace {
            Some(ns) => format!("{ns}.{}", entry.name),
            None => entry.name.clone(),
        };
        let mut signature =
            FunctionSignature::new(entry.name, entry.params, entry.returns, ModuleRef::new(module_id));
        if let Some(ns) = entry.namespace {
            signature = signature.with_namespace(ns);
        }
        registry.register(signature);
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_returns_builtins_only() {
        let registry = load_registry(None).unwrap();
        assert!(registry.get("gt").is_some());
    }

    #[test]
    fn manifest_entries_layer_on_top_of_builtins() {
        let path = std::env::temp_dir().join(format!("constellation-cli-test-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"{"functions": [{"name": "reverse", "params": [["s", "CString"]], "returns": "CString"}]}"#,
        )
        .unwrap();
        let registry = load_registry(Some(&path)).unwrap();
        fs::remove_file(&path).ok();
        assert!(registry.get("gt").is_some());
        assert!(registry.get("reverse").is_some());
    }
}
