//! The Constellation value & type model.
//!
//! [`CType`] is the algebraic, recursive type language: scalars, lists,
//! maps, structural records (`CProduct`), tagged unions (`CUnion`), and
//! optionals. [`CValue`] mirrors it value-for-value. [`RawValue`] offers an
//! unboxed representation for bulk numeric data paths; conversion to/from
//! `CValue` is lossless given the originating `CType`.
//!
//! Structural equality on `CType`/`CValue` is field-order-insensitive for
//! `CProduct`/`CUnion` (backed by `IndexMap`'s order-independent `PartialEq`)
//! while canonicalization (owned by `constellation-compiler`) is responsible
//! for making field *iteration* order deterministic when it matters, e.g.
//! for hashing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The Constellation type language.
///
/// `Candidates<T>` in the surface language is sugar for `CList(T)` and does
/// not get its own variant here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CType {
    CString,
    CInt,
    CFloat,
    CBoolean,
    CList(Box<CType>),
    CMap(Box<CType>, Box<CType>),
    /// Ordered mapping field-name -> type. Iteration order is preserved at
    /// canonicalization time; equality ignores it.
    CProduct(IndexMap<String, CType>),
    /// Ordered mapping tag -> type. Iteration order is preserved at
    /// canonicalization time; equality ignores it.
    CUnion(IndexMap<String, CType>),
    COptional(Box<CType>),
}

impl CType {
    pub fn list(elem: CType) -> CType {
        CType::CList(Box::new(elem))
    }

    pub fn map(key: CType, value: CType) -> CType {
        CType::CMap(Box::new(key), Box::new(value))
    }

    pub fn optional(inner: CType) -> CType {
        CType::COptional(Box::new(inner))
    }

    pub fn product(fields: IndexMap<String, CType>) -> CType {
        CType::CProduct(fields)
    }

    /// Builds a union, flattening any nested unions so that
    /// `CUnion({... CUnion(inner) ...})` collapses to one level and tags
    /// stay unique (later occurrences of a duplicate tag are dropped).
    pub fn union(variants: IndexMap<String, CType>) -> CType {
        let mut flat = IndexMap::new();
        for (tag, ty) in variants {
            flatten_union_into(&mut flat, tag, ty);
        }
        CType::CUnion(flat)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, CType::COptional(_))
    }

    pub fn is_product(&self) -> bool {
        matches!(self, CType::CProduct(_))
    }

    pub fn is_list_of_product(&self) -> bool {
        matches!(self, CType::CList(inner) if inner.is_product())
    }

    /// Strips one layer of `COptional`, returning the inner type, or `self`
    /// unchanged if it is not optional.
    pub fn strip_optional(&self) -> &CType {
        match self {
            CType::COptional(inner) => inner,
            other => other,
        }
    }

    /// Short tag used to synthesize union variant names for primitives and
    /// containers. Struct-like types derive theirs from a field fingerprint
    /// (see [`Self::synthesized_tag`]).
    pub fn base_tag(&self) -> String {
        match self {
            CType::CString => "String".to_string(),
            CType::CInt => "Int".to_string(),
            CType::CFloat => "Float".to_string(),
            CType::CBoolean => "Boolean".to_string(),
            CType::CList(elem) => format!("ListOf{}", elem.base_tag()),
            CType::CMap(k, v) => format!("MapOf{}To{}", k.base_tag(), v.base_tag()),
            CType::COptional(inner) => format!("OptionalOf{}", inner.base_tag()),
            CType::CProduct(_) => self.synthesized_tag(),
            CType::CUnion(_) => "Union".to_string(),
        }
    }

    /// Deterministic tag for record types, derived from a fingerprint of
    /// their (sorted) field names so that structurally distinct records
    /// never collide and identical shapes always agree.
    fn synthesized_tag(&self) -> String {
        match self {
            CType::CProduct(fields) => {
                let mut names: Vec<&str> = fields.keys().map(String::as_str).collect();
                names.sort_unstable();
                format!("Record_{}", names.join("_"))
            }
            other => other.base_tag(),
        }
    }
}

fn flatten_union_into(flat: &mut IndexMap<String, CType>, tag: String, ty: CType) {
    match ty {
        CType::CUnion(inner) => {
            for (inner_tag, inner_ty) in inner {
                flatten_union_into(flat, inner_tag, inner_ty);
            }
        }
        other => {
            flat.entry(tag).or_insert(other);
        }
    }
}

/// A Constellation runtime value. Every `CValue` can name its [`CType`] via
/// [`Self::type_of`], except for the empty list/map literals, whose element
/// type is indeterminate from the value alone (the type checker resolves
/// those against an expected type at the `@example`/literal site).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<CValue>),
    /// Ordered key/value pairs; `CValue` has no `Hash`/`Ord` impl so this is
    /// not a `HashMap`.
    Map(Vec<(CValue, CValue)>),
    Product(IndexMap<String, CValue>),
    Union { tag: String, value: Box<CValue> },
    Optional(Option<Box<CValue>>),
}

impl CValue {
    /// Attempts to derive the exact `CType` of this value without external
    /// context. Returns `None` for empty lists/maps, whose element type
    /// cannot be recovered from the value alone.
    pub fn type_of(&self) -> Option<CType> {
        Some(match self {
            CValue::Str(_) => CType::CString,
            CValue::Int(_) => CType::CInt,
            CValue::Float(_) => CType::CFloat,
            CValue::Bool(_) => CType::CBoolean,
            CValue::List(items) => {
                let mut elem_ty: Option<CType> = None;
                for item in items {
                    let item_ty = item.type_of()?;
                    elem_ty = Some(match elem_ty {
                        None => item_ty,
                        Some(acc) => crate::subtype::least_upper_bound(&acc, &item_ty),
                    });
                }
                CType::list(elem_ty?)
            }
            CValue::Map(pairs) => {
                let mut key_ty: Option<CType> = None;
                let mut val_ty: Option<CType> = None;
                for (k, v) in pairs {
                    let kt = k.type_of()?;
                    let vt = v.type_of()?;
                    key_ty = Some(match key_ty {
                        None => kt,
                        Some(acc) => crate::subtype::least_upper_bound(&acc, &kt),
                    });
                    val_ty = Some(match val_ty {
                        None => vt,
                        Some(acc) => crate::subtype::least_upper_bound(&acc, &vt),
                    });
                }
                CType::map(key_ty?, val_ty?)
            }
            CValue::Product(fields) => {
                let mut out = IndexMap::new();
                for (name, value) in fields {
                    out.insert(name.clone(), value.type_of()?);
                }
                CType::product(out)
            }
            CValue::Union { tag, value } => {
                let mut variants = IndexMap::new();
                variants.insert(tag.clone(), value.type_of()?);
                CType::union(variants)
            }
            CValue::Optional(inner) => match inner {
                Some(v) => CType::optional(v.type_of()?),
                None => return None,
            },
        })
    }

    /// Structural match of this value against a declared type -- used by the
    /// runtime to validate provided inputs (§4.9) without needing a fully
    /// recoverable `type_of`.
    pub fn matches_type(&self, ty: &CType) -> bool {
        match (self, ty) {
            (CValue::Str(_), CType::CString) => true,
            (CValue::Int(_), CType::CInt) => true,
            (CValue::Float(_), CType::CFloat) => true,
            (CValue::Bool(_), CType::CBoolean) => true,
            (CValue::List(items), CType::CList(elem)) => {
                items.iter().all(|item| item.matches_type(elem))
            }
            (CValue::Map(pairs), CType::CMap(k, v)) => pairs
                .iter()
                .all(|(key, value)| key.matches_type(k) && value.matches_type(v)),
            (CValue::Product(fields), CType::CProduct(decl)) => {
                decl.len() == fields.len()
                    && decl
                        .iter()
                        .all(|(name, ty)| fields.get(name).is_some_and(|v| v.matches_type(ty)))
            }
            (CValue::Union { tag, value }, CType::CUnion(variants)) => variants
                .get(tag)
                .is_some_and(|variant_ty| value.matches_type(variant_ty)),
            (CValue::Optional(inner), CType::COptional(inner_ty)) => match inner {
                Some(v) => v.matches_type(inner_ty),
                None => true,
            },
            // A present, non-optional value is still assignable to an
            // optional-typed slot (T <: COptional(T)).
            (value, CType::COptional(inner_ty)) => value.matches_type(inner_ty),
            _ => false,
        }
    }
}

/// Unboxed bulk representation for numeric/text/boolean data, used on
/// high-throughput paths where boxing every scalar in a [`CValue::List`]
/// would be wasteful. Conversion to/from `CValue` is lossless given the
/// originating `CType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Longs(Vec<i64>),
    Doubles(Vec<f64>),
    Strings(Vec<String>),
    Bools(Vec<bool>),
}

impl RawValue {
    /// Converts to a `CList(elem)` `CValue`. `elem` must match the raw
    /// variant (`CInt`/`CFloat`/`CString`/`CBoolean`) or this returns `None`.
    pub fn to_cvalue(&self, elem: &CType) -> Option<CValue> {
        let items: Vec<CValue> = match (self, elem) {
            (RawValue::Longs(v), CType::CInt) => v.iter().copied().map(CValue::Int).collect(),
            (RawValue::Doubles(v), CType::CFloat) => {
                v.iter().copied().map(CValue::Float).collect()
            }
            (RawValue::Strings(v), CType::CString) => {
                v.iter().cloned().map(CValue::Str).collect()
            }
            (RawValue::Bools(v), CType::CBoolean) => v.iter().copied().map(CValue::Bool).collect(),
            _ => return None,
        };
        Some(CValue::List(items))
    }

    /// Attempts a lossless conversion from a homogeneous primitive
    /// `CValue::List`. Returns `None` if the list is empty (no raw kind can
    /// be inferred) or mixes shapes.
    pub fn from_cvalues(values: &[CValue]) -> Option<RawValue> {
        match values.first()? {
            CValue::Int(_) => values
                .iter()
                .map(|v| match v {
                    CValue::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(RawValue::Longs),
            CValue::Float(_) => values
                .iter()
                .map(|v| match v {
                    CValue::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(RawValue::Doubles),
            CValue::Str(_) => values
                .iter()
                .map(|v| match v {
                    CValue::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(RawValue::Strings),
            CValue::Bool(_) => values
                .iter()
                .map(|v| match v {
                    CValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(RawValue::Bools),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawValue::Longs(v) => v.len(),
            RawValue::Doubles(v) => v.len(),
            RawValue::Strings(v) => v.len(),
            RawValue::Bools(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_equality_is_field_order_insensitive() {
        let mut a = IndexMap::new();
        a.insert("x".to_string(), CType::CInt);
        a.insert("y".to_string(), CType::CString);

        let mut b = IndexMap::new();
        b.insert("y".to_string(), CType::CString);
        b.insert("x".to_string(), CType::CInt);

        assert_eq!(CType::product(a), CType::product(b));
    }

    #[test]
    fn union_flattens_nested_unions_and_dedupes_tags() {
        let mut inner = IndexMap::new();
        inner.insert("Int".to_string(), CType::CInt);
        inner.insert("String".to_string(), CType::CString);

        let mut outer = IndexMap::new();
        outer.insert("nested".to_string(), CType::CUnion(inner));
        outer.insert("Int".to_string(), CType::CBoolean); // dup tag, dropped

        let flattened = CType::union(outer);
        match flattened {
            CType::CUnion(variants) => {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants.get("Int"), Some(&CType::CInt));
                assert_eq!(variants.get("String"), Some(&CType::CString));
            }
            _ => panic!("expected CUnion"),
        }
    }

    #[test]
    fn value_type_of_scalars() {
        assert_eq!(CValue::Int(1).type_of(), Some(CType::CInt));
        assert_eq!(CValue::Str("a".into()).type_of(), Some(CType::CString));
        assert_eq!(CValue::Bool(true).type_of(), Some(CType::CBoolean));
    }

    #[test]
    fn value_type_of_empty_list_is_indeterminate() {
        assert_eq!(CValue::List(vec![]).type_of(), None);
    }

    #[test]
    fn matches_type_lifts_into_optional() {
        let ty = CType::optional(CType::CInt);
        assert!(CValue::Int(1).matches_type(&ty));
        assert!(CValue::Optional(None).matches_type(&ty));
        assert!(CValue::Optional(Some(Box::new(CValue::Int(1)))).matches_type(&ty));
        assert!(!CValue::Str("x".into()).matches_type(&ty));
    }

    #[test]
    fn matches_type_product_requires_same_arity() {
        let mut decl = IndexMap::new();
        decl.insert("x".to_string(), CType::CInt);
        let ty = CType::product(decl);

        let mut matching = IndexMap::new();
        matching.insert("x".to_string(), CValue::Int(1));
        assert!(CValue::Product(matching).matches_type(&ty));

        let mut extra = IndexMap::new();
        extra.insert("x".to_string(), CValue::Int(1));
        extra.insert("y".to_string(), CValue::Int(2));
        assert!(!CValue::Product(extra).matches_type(&ty));
    }

    #[test]
    fn raw_value_roundtrip_longs() {
        let raw = RawValue::Longs(vec![1, 2, 3]);
        let values = raw.to_cvalue(&CType::CInt).unwrap();
        match &values {
            CValue::List(items) => {
                let back = RawValue::from_cvalues(items).unwrap();
                assert_eq!(back, raw);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn raw_value_from_empty_is_none() {
        assert!(RawValue::from_cvalues(&[]).is_none());
    }
}
