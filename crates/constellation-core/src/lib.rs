//! Value & type model, function signatures, and DAG IR shared across every
//! Constellation crate: the parser's spans, the checker's types, and the
//! compiler's lowered program image all build on the types defined here.

pub mod error;
pub mod id;
pub mod ir;
pub mod signature;
pub mod span;
pub mod subtype;
pub mod types;

pub use error::CoreError;
pub use id::{DataId, ModuleNodeId};
pub use ir::{DagSpec, DataNodeSpec, DataOrigin, ModuleNodeSpec, SyntheticKind, Transform};
pub use signature::{FunctionSignature, ModuleRef};
pub use span::Span;
pub use subtype::{is_assignable, least_upper_bound};
pub use types::{CType, CValue, RawValue};
