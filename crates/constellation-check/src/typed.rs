//! The typed AST handed to `constellation-compiler`'s lowering pass.
//!
//! Mirrors `constellation_parser::ast` one-for-one but with every node
//! carrying its checked `CType`, and call sites carrying a resolved
//! [`FunctionSignature`] instead of a raw, unresolved [`Callee`].

use constellation_core::{CType, FunctionSignature, Span};

#[derive(Debug, Clone)]
pub struct TypedProgram {
    pub declarations: Vec<TypedDecl>,
}

#[derive(Debug, Clone)]
pub enum TypedDecl {
    Input {
        name: String,
        ty: CType,
        example: Option<TypedExpr>,
        span: Span,
    },
    Assign {
        name: String,
        value: TypedExpr,
        span: Span,
    },
    Output {
        name: String,
        span: Span,
    },
}

/// The four closed higher-order operators the lowering pass has a
/// `Transform` variant for, plus `SortBy`, which the checker resolves and
/// types but the lowering pass rejects with `UnsupportedOperation`
/// (`spec.md` §4.5, §9 open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HofOp {
    Filter,
    Map,
    All,
    Any,
    SortBy,
}

impl HofOp {
    pub fn from_name(name: &str) -> Option<HofOp> {
        Some(match name {
            "filter" => HofOp::Filter,
            "map" => HofOp::Map,
            "all" => HofOp::All,
            "any" => HofOp::Any,
            "sortBy" => HofOp::SortBy,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            HofOp::Filter => "filter",
            HofOp::Map => "map",
            HofOp::All => "all",
            HofOp::Any => "any",
            HofOp::SortBy => "sortBy",
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypedExpr {
    /// A scalar constant (`Int`/`Float`/`Bool`/`Str`). List and record
    /// literals get their own variants below since their elements are
    /// arbitrary sub-expressions, not necessarily constants.
    Literal {
        value: constellation_core::CValue,
        ty: CType,
        span: Span,
    },
    ListLiteral {
        items: Vec<TypedExpr>,
        ty: CType,
        span: Span,
    },
    RecordLiteral {
        fields: Vec<(String, TypedExpr)>,
        ty: CType,
        span: Span,
    },
    Var {
        name: String,
        ty: CType,
        span: Span,
    },
    FieldAccess {
        source: Box<TypedExpr>,
        field: String,
        ty: CType,
        span: Span,
    },
    Project {
        source: Box<TypedExpr>,
        fields: Vec<String>,
        ty: CType,
        span: Span,
    },
    Merge {
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
        ty: CType,
        span: Span,
    },
    Conditional {
        cond: Box<TypedExpr>,
        then_branch: Box<TypedExpr>,
        else_branch: Box<TypedExpr>,
        ty: CType,
        span: Span,
    },
    And(Box<TypedExpr>, Box<TypedExpr>, Span),
    Or(Box<TypedExpr>, Box<TypedExpr>, Span),
    Not(Box<TypedExpr>, Span),
    Guard {
        value: Box<TypedExpr>,
        cond: Box<TypedExpr>,
        ty: CType,
        span: Span,
    },
    Coalesce {
        primary: Box<TypedExpr>,
        fallback: Box<TypedExpr>,
        ty: CType,
        span: Span,
    },
    Interpolation {
        parts: Vec<String>,
        exprs: Vec<TypedExpr>,
        span: Span,
    },
    Call {
        signature: FunctionSignature,
        args: Vec<TypedExpr>,
        ty: CType,
        span: Span,
    },
    HofCall {
        op: HofOp,
        source: Box<TypedExpr>,
        param: String,
        body: Box<TypedExpr>,
        ty: CType,
        span: Span,
    },
    Branch {
        arms: Vec<(TypedExpr, TypedExpr)>,
        otherwise: Box<TypedExpr>,
        ty: CType,
        span: Span,
    },
}

impl TypedExpr {
    pub fn ty(&self) -> CType {
        match self {
            TypedExpr::Literal { ty, .. }
            | TypedExpr::ListLiteral { ty, .. }
            | TypedExpr::RecordLiteral { ty, .. }
            | TypedExpr::FieldAccess { ty, .. }
            | TypedExpr::Project { ty, .. }
            | TypedExpr::Merge { ty, .. }
            | TypedExpr::Conditional { ty, .. }
            | TypedExpr::Guard { ty, .. }
            | TypedExpr::Coalesce { ty, .. }
            | TypedExpr::Call { ty, .. }
            | TypedExpr::HofCall { ty, .. }
            | TypedExpr::Branch { ty, .. }
            | TypedExpr::Var { ty, .. } => ty.clone(),
            TypedExpr::And(..) | TypedExpr::Or(..) | TypedExpr::Not(..) => CType::CBoolean,
            TypedExpr::Interpolation { .. } => CType::CString,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TypedExpr::Literal { span, .. }
            | TypedExpr::ListLiteral { span, .. }
            | TypedExpr::RecordLiteral { span, .. }
            | TypedExpr::Var { span, .. }
            | TypedExpr::FieldAccess { span, .. }
            | TypedExpr::Project { span, .. }
            | TypedExpr::Merge { span, .. }
            | TypedExpr::Conditional { span, .. }
            | TypedExpr::And(_, _, span)
            | TypedExpr::Or(_, _, span)
            | TypedExpr::Not(_, span)
            | TypedExpr::Guard { span, .. }
            | TypedExpr::Coalesce { span, .. }
            | TypedExpr::Interpolation { span, .. }
            | TypedExpr::Call { span, .. }
            | TypedExpr::HofCall { span, .. }
            | TypedExpr::Branch { span, .. } => *span,
        }
    }
}
