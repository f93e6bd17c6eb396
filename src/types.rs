// C3: Type manager — typedef resolution, union membership, array-type
// parsing, type compatibility, range checks (range-check arithmetic
// itself lives in `value.rs`; this module owns the name tables that
// `value::range_check`/`value::coerce_to` are driven by).

use crate::ast::{TypeRef, TypeTag, UnionMember};
use crate::diagnostics::CbError;
use crate::value::Value;
use std::collections::HashMap;

pub type Result<T> = std::result::Result<T, CbError>;

#[derive(Default)]
pub struct TypeManager {
    typedefs: HashMap<String, TypeRef>,
    unions: HashMap<String, Vec<UnionMember>>,
}

impl TypeManager {
    pub fn new() -> TypeManager {
        TypeManager::default()
    }

    pub fn register_typedef(&mut self, alias: String, target: TypeRef) {
        self.typedefs.insert(alias, target);
    }

    pub fn register_union(&mut self, name: String, members: Vec<UnionMember>) {
        self.unions.insert(name, members);
    }

    pub fn is_union_type(&self, name: &str) -> bool {
        self.unions.contains_key(name)
    }

    pub fn is_value_allowed_for_union(&self, name: &str, value: &Value) -> Result<bool> {
        let members = self
            .unions
            .get(name)
            .ok_or_else(|| CbError::UnionConstraintViolation {
                union_name: name.to_string(),
                value: format!("{:?}", value),
            })?;
        let allowed = members.iter().any(|m| match (m, value) {
            (UnionMember::Int(i), Value::Int(v)) => i == v,
            (UnionMember::Str(s), Value::Str(v)) => s == v,
            _ => false,
        });
        Ok(allowed)
    }

    /// Iterative substitution until a fixed point (spec §4.3). Array
    /// typedefs (`typedef T[N] Alias;`) carry their dimension
    /// expressions along in the stored `TypeRef`; a plain `struct X`
    /// alias just resolves to `TypeRef::named(Struct, "X")`.
    ///
    /// A cycle is detected with a visited-name guard and reported as
    /// `CbError::TypeMismatch` (SPEC_FULL.md §9, resolution 5 — the
    /// spec's error taxonomy has no dedicated "typedef cycle" kind, so
    /// this picks the nearest-named one rather than inventing an entry).
    pub fn resolve_typedef(&self, type_ref: &TypeRef) -> Result<TypeRef> {
        let mut current = type_ref.clone();
        let mut visited = Vec::new();
        loop {
            let alias_name = match (&current.name, current.base) {
                (Some(n), TypeTag::Unknown) => Some(n.clone()),
                (Some(n), _) if self.typedefs.contains_key(n) && current.array_dims.is_empty() => {
                    Some(n.clone())
                }
                _ => None,
            };
            let name = match alias_name {
                Some(n) => n,
                None => return Ok(current),
            };
            if visited.contains(&name) {
                return Err(CbError::TypeMismatch(format!("typedef cycle: {}", visited.join(" -> "))));
            }
            match self.typedefs.get(&name) {
                Some(target) => {
                    visited.push(name);
                    current = target.clone();
                }
                None => return Ok(current),
            }
        }
    }

    pub fn string_to_type_tag(&self, name: &str) -> TypeTag {
        match name {
            "void" => TypeTag::Void,
            "tiny" => TypeTag::Tiny,
            "short" => TypeTag::Short,
            "int" => TypeTag::Int,
            "long" => TypeTag::Long,
            "bool" => TypeTag::Bool,
            "char" => TypeTag::Char,
            "string" => TypeTag::String,
            "float" => TypeTag::Float,
            "double" => TypeTag::Double,
            "quad" => TypeTag::Quad,
            _ => TypeTag::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_typedef_follows_chain_to_fixed_point() {
        let mut tm = TypeManager::new();
        tm.register_typedef("Celsius".to_string(), TypeRef::scalar(TypeTag::Double));
        tm.register_typedef("Temperature".to_string(), TypeRef::named(TypeTag::Unknown, "Celsius"));
        let resolved = tm
            .resolve_typedef(&TypeRef::named(TypeTag::Unknown, "Temperature"))
            .unwrap();
        assert_eq!(resolved.base, TypeTag::Double);
    }

    #[test]
    fn resolve_typedef_leaves_unaliased_name_as_unknown() {
        let tm = TypeManager::new();
        let resolved = tm
            .resolve_typedef(&TypeRef::named(TypeTag::Unknown, "Counter"))
            .unwrap();
        assert_eq!(resolved.base, TypeTag::Unknown);
        assert_eq!(resolved.name.as_deref(), Some("Counter"));
    }

    #[test]
    fn resolve_typedef_rejects_cycles() {
        let mut tm = TypeManager::new();
        tm.register_typedef("A".to_string(), TypeRef::named(TypeTag::Unknown, "B"));
        tm.register_typedef("B".to_string(), TypeRef::named(TypeTag::Unknown, "A"));
        let err = tm.resolve_typedef(&TypeRef::named(TypeTag::Unknown, "A")).unwrap_err();
        assert!(matches!(err, CbError::TypeMismatch(_)));
    }

    #[test]
    fn union_membership_checks_admitted_values() {
        let mut tm = TypeManager::new();
        tm.register_union(
            "Status".to_string(),
            vec![UnionMember::Int(200), UnionMember::Str("error".to_string())],
        );
        assert!(tm.is_union_type("Status"));
        assert!(!tm.is_union_type("NotAUnion"));
        assert!(tm.is_value_allowed_for_union("Status", &Value::Int(200)).unwrap());
        assert!(!tm.is_value_allowed_for_union("Status", &Value::Int(404)).unwrap());
        assert!(tm
            .is_value_allowed_for_union("Status", &Value::Str("error".to_string()))
            .unwrap());
    }

    #[test]
    fn union_membership_on_unknown_union_is_an_error() {
        let tm = TypeManager::new();
        assert!(tm.is_value_allowed_for_union("Nope", &Value::Int(1)).is_err());
    }

    #[test]
    fn string_to_type_tag_maps_keywords() {
        let tm = TypeManager::new();
        assert_eq!(tm.string_to_type_tag("int"), TypeTag::Int);
        assert_eq!(tm.string_to_type_tag("quad"), TypeTag::Quad);
        assert_eq!(tm.string_to_type_tag("frobnicate"), TypeTag::Unknown);
    }
}
