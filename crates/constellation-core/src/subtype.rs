//! Subtyping and least-upper-bound for [`CType`].
//!
//! `T <: T` always. `T <: COptional(T)`. Subtyping lifts elementwise through
//! lists, map values, records (width + depth: a wider record is a subtype of
//! a narrower one with compatible field types), and unions (every variant of
//! the subtype union must be covered, subtype-wise, by some variant of the
//! supertype union).

use indexmap::IndexMap;

use crate::types::CType;

/// Returns `true` if `src` is assignable to `dst` under the subtype
/// relation described in the module docs.
pub fn is_assignable(src: &CType, dst: &CType) -> bool {
    if src == dst {
        return true;
    }
    match (src, dst) {
        // T <: Optional(T), and lifts through to Optional(U) when T <: U.
        (_, CType::COptional(dst_inner)) => is_assignable(src, dst_inner),
        // Optional(T) <: Optional(U) already covered by T == U short-circuit
        // above plus the arm below for strict subtype widening.
        (CType::COptional(src_inner), CType::COptional(_)) => {
            is_assignable(src_inner, dst.strip_optional())
        }
        (CType::CList(src_elem), CType::CList(dst_elem)) => is_assignable(src_elem, dst_elem),
        (CType::CMap(src_k, src_v), CType::CMap(dst_k, dst_v)) => {
            is_assignable(src_k, dst_k) && is_assignable(src_v, dst_v)
        }
        (CType::CProduct(src_fields), CType::CProduct(dst_fields)) => dst_fields
            .iter()
            .all(|(name, dst_ty)| src_fields.get(name).is_some_and(|s| is_assignable(s, dst_ty))),
        (CType::CUnion(src_variants), CType::CUnion(dst_variants)) => src_variants
            .values()
            .all(|src_ty| dst_variants.values().any(|dst_ty| is_assignable(src_ty, dst_ty))),
        // A non-union value type is assignable to a union if some variant
        // accepts it (used when merging LUB candidates into a union).
        (_, CType::CUnion(dst_variants)) => {
            dst_variants.values().any(|dst_ty| is_assignable(src, dst_ty))
        }
        _ => false,
    }
}

/// Least upper bound: `a` if `a <: b`, `b` if `b <: a`, otherwise a
/// two-variant `CUnion` tagged deterministically via [`CType::base_tag`].
pub fn least_upper_bound(a: &CType, b: &CType) -> CType {
    if a == b {
        return a.clone();
    }
    if is_assignable(a, b) {
        return b.clone();
    }
    if is_assignable(b, a) {
        return a.clone();
    }

    let mut variants = IndexMap::new();
    insert_lub_branch(&mut variants, a.clone());
    insert_lub_branch(&mut variants, b.clone());
    CType::union(variants)
}

fn insert_lub_branch(variants: &mut IndexMap<String, CType>, ty: CType) {
    match ty {
        CType::CUnion(inner) => {
            for (tag, inner_ty) in inner {
                variants.entry(tag).or_insert(inner_ty);
            }
        }
        other => {
            let tag = other.base_tag();
            variants.entry(tag).or_insert(other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflexive_subtype() {
        assert!(is_assignable(&CType::CInt, &CType::CInt));
    }

    #[test]
    fn lifts_into_optional() {
        assert!(is_assignable(&CType::CInt, &CType::optional(CType::CInt)));
        assert!(!is_assignable(&CType::optional(CType::CInt), &CType::CInt));
    }

    #[test]
    fn lifts_through_list() {
        assert!(is_assignable(
            &CType::list(CType::CInt),
            &CType::list(CType::optional(CType::CInt))
        ));
    }

    #[test]
    fn record_width_subtyping() {
        let mut wide = IndexMap::new();
        wide.insert("x".to_string(), CType::CInt);
        wide.insert("y".to_string(), CType::CString);

        let mut narrow = IndexMap::new();
        narrow.insert("x".to_string(), CType::CInt);

        // wide has every field narrow needs => wide <: narrow
        assert!(is_assignable(
            &CType::product(wide),
            &CType::product(narrow)
        ));
    }

    #[test]
    fn lub_of_equal_types_is_identity() {
        assert_eq!(
            least_upper_bound(&CType::CInt, &CType::CInt),
            CType::CInt
        );
    }

    #[test]
    fn lub_of_t_and_optional_t_is_optional_t() {
        let opt = CType::optional(CType::CInt);
        assert_eq!(least_upper_bound(&CType::CInt, &opt), opt);
    }

    #[test]
    fn lub_of_unrelated_types_forms_union() {
        let lub = least_upper_bound(&CType::CInt, &CType::CString);
        match lub {
            CType::CUnion(variants) => {
                assert_eq!(variants.len(), 2);
                assert!(variants.contains_key("Int"));
                assert!(variants.contains_key("String"));
            }
            _ => panic!("expected union"),
        }
    }

    #[test]
    fn lub_flattens_existing_unions() {
        let mut existing = IndexMap::new();
        existing.insert("Int".to_string(), CType::CInt);
        let union = CType::CUnion(existing);

        let lub = least_upper_bound(&union, &CType::CString);
        match lub {
            CType::CUnion(variants) => {
                assert_eq!(variants.len(), 2);
            }
            _ => panic!("expected union"),
        }
    }
}
