//! UUID-based identifiers for DAG entities.
//!
//! Every data node and module-call node in a [`crate::ir::DagSpec`] is keyed
//! by a UUID rather than a dense index. UUIDs are assigned once, during
//! lowering, from a process-local counter-backed generator and are never
//! meant to be meaningful across processes -- [`crate::ir::DagSpec`]
//! canonicalization (owned by `constellation-compiler`) is the only place
//! that is allowed to depend on relative node ordering; everywhere else,
//! UUID identity is an opaque key.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a data node within a [`crate::ir::DagSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataId(pub Uuid);

/// Identifies a module-call node within a [`crate::ir::DagSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleNodeId(pub Uuid);

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{}", self.0)
    }
}

impl fmt::Display for ModuleNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module:{}", self.0)
    }
}

impl DataId {
    pub fn new_v4() -> Self {
        DataId(Uuid::new_v4())
    }
}

impl ModuleNodeId {
    pub fn new_v4() -> Self {
        ModuleNodeId(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types_with_same_uuid_kind() {
        let u = Uuid::new_v4();
        let data = DataId(u);
        let module = ModuleNodeId(u);
        assert_eq!(data.0, module.0);
    }

    #[test]
    fn display_formats() {
        let u = Uuid::nil();
        assert_eq!(format!("{}", DataId(u)), format!("data:{}", u));
        assert_eq!(format!("{}", ModuleNodeId(u)), format!("module:{}", u));
    }

    #[test]
    fn serde_roundtrip() {
        let id = DataId::new_v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: DataId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
