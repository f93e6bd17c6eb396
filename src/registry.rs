// C5: Struct/Interface/Impl registry.
//
// Method dispatch keys are a genuine `HashMap<(String, String),
// Node<FuncDef>>` keyed `(struct_name, method_name)`, as SPEC_FULL.md
// §4.5 prescribes — the original source's `"S::m"` / `"Iface_S_m"`
// string-key synthesis survives here only as a `Display` impl used for
// diagnostics (`DispatchKey`), never as the actual lookup mechanism.

use crate::ast::{EnumDef, FuncDef, InterfaceDef, Node, StructDef};
use crate::diagnostics::CbError;
use std::collections::HashMap;
use std::fmt;

pub type Result<T> = std::result::Result<T, CbError>;

pub struct DispatchKey<'a>(pub &'a str, pub &'a str);

impl<'a> fmt::Display for DispatchKey<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::{}", self.0, self.1)
    }
}

#[derive(Default)]
pub struct Registry {
    pub structs: HashMap<String, Node<StructDef>>,
    pub interfaces: HashMap<String, Node<InterfaceDef>>,
    pub enums: HashMap<String, Node<EnumDef>>,
    pub functions: HashMap<String, Node<FuncDef>>,
    /// `(struct_name, method_name) -> method`. Spec §8.1 property 8:
    /// dispatch is by this pair alone, independent of interface.
    pub methods: HashMap<(String, String), Node<FuncDef>>,
    /// Which interfaces a struct implements, for diagnostics and for
    /// resolving `<Iface>_<Struct>_<method>`-style lookups when a call
    /// only knows the interface-typed variable (spec §4.6 Function
    /// call).
    pub impls_by_struct: HashMap<String, Vec<String>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register_struct(&mut self, def: Node<StructDef>) -> Result<()> {
        self.structs.insert(def.name.clone(), def);
        self.check_no_cycles()
    }

    pub fn register_interface(&mut self, def: Node<InterfaceDef>) {
        self.interfaces.insert(def.name.clone(), def);
    }

    pub fn register_enum(&mut self, def: Node<EnumDef>) {
        self.enums.insert(def.name.clone(), def);
    }

    pub fn register_function(&mut self, def: Node<FuncDef>) {
        self.functions.insert(def.name.clone(), def);
    }

    /// Installs every method of an impl block under the
    /// `(struct, method)` dispatch key, stamping each method AST node's
    /// `type_name`/`qualified_name` the way `ImplDefinition` registration
    /// does in spec §3.5.
    pub fn register_impl(&mut self, interface_name: &str, struct_name: &str, methods: &[Node<FuncDef>]) {
        self.impls_by_struct
            .entry(struct_name.to_string())
            .or_insert_with(Vec::new)
            .push(interface_name.to_string());
        for m in methods {
            let stamped = FuncDef {
                name: m.name.clone(),
                return_type: m.return_type.clone(),
                params: m.params.clone(),
                body: m.body.clone(),
                type_name: Some(struct_name.to_string()),
                qualified_name: Some(format!("{}::{}", struct_name, m.name)),
            };
            self.methods
                .insert((struct_name.to_string(), m.name.clone()), Node::new(stamped));
        }
    }

    pub fn resolve_method(&self, struct_name: &str, method: &str) -> Option<Node<FuncDef>> {
        self.methods.get(&(struct_name.to_string(), method.to_string())).cloned()
    }

    pub fn implements(&self, struct_name: &str, interface_name: &str) -> bool {
        self.impls_by_struct
            .get(struct_name)
            .map(|v| v.iter().any(|i| i == interface_name))
            .unwrap_or(false)
    }

    /// DFS over the struct-definition graph, following only non-pointer
    /// struct-typed members, rejecting a back edge with a cycle-path
    /// diagnostic (spec §3.5 invariant, §8.1 property 7).
    pub fn check_no_cycles(&self) -> Result<()> {
        for name in self.structs.keys() {
            let mut visiting = Vec::new();
            self.visit_struct(name, &mut visiting)?;
        }
        Ok(())
    }

    fn visit_struct(&self, name: &str, visiting: &mut Vec<String>) -> Result<()> {
        if let Some(pos) = visiting.iter().position(|n| n == name) {
            let mut path: Vec<String> = visiting[pos..].to_vec();
            path.push(name.to_string());
            return Err(CbError::StructCycleError(path.join(" -> ")));
        }
        let def = match self.structs.get(name) {
            Some(d) => d.clone(),
            None => return Ok(()),
        };
        visiting.push(name.to_string());
        for member in &def.members {
            if member.type_ref.is_pointer {
                continue;
            }
            // A member's type ref reads `Struct` only if it was spelled
            // `struct Foo`; the common bare-name form (`Foo foo;`) comes
            // out of the parser tagged `Unknown` with a name, resolved
            // against the registry only at evaluation time (see
            // `Interpreter::resolve_type`). Registration runs before any
            // evaluator exists, so the cycle check matches bare names
            // against `self.structs` directly instead.
            let is_struct_ref = member.type_ref.base == crate::ast::TypeTag::Struct
                || member.type_ref.base == crate::ast::TypeTag::Unknown;
            if is_struct_ref {
                if let Some(child) = &member.type_ref.name {
                    if self.structs.contains_key(child) {
                        self.visit_struct(child, visiting)?;
                    }
                }
            }
        }
        visiting.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Node, StructDef, StructMember, TypeRef, TypeTag};

    fn member(name: &str, type_ref: TypeRef) -> StructMember {
        StructMember {
            name: name.to_string(),
            type_ref,
            is_private: false,
            is_const: false,
        }
    }

    fn struct_def(name: &str, members: Vec<StructMember>) -> Node<StructDef> {
        Node::new(StructDef {
            name: name.to_string(),
            members,
        })
    }

    #[test]
    fn direct_cycle_through_bare_name_member_is_rejected() {
        let mut reg = Registry::new();
        reg.register_struct(struct_def(
            "A",
            vec![member("b", TypeRef::named(TypeTag::Unknown, "B"))],
        ))
        .unwrap();
        let err = reg
            .register_struct(struct_def(
                "B",
                vec![member("a", TypeRef::named(TypeTag::Unknown, "A"))],
            ))
            .unwrap_err();
        assert!(matches!(err, CbError::StructCycleError(_)));
    }

    #[test]
    fn self_referential_pointer_member_breaks_the_cycle() {
        let mut reg = Registry::new();
        let mut next_ref = TypeRef::named(TypeTag::Unknown, "Node");
        next_ref.is_pointer = true;
        reg.register_struct(struct_def(
            "Node",
            vec![
                member("val", TypeRef::scalar(TypeTag::Int)),
                member("next", next_ref),
            ],
        ))
        .unwrap();
    }

    #[test]
    fn unrelated_structs_register_without_error() {
        let mut reg = Registry::new();
        reg.register_struct(struct_def("Point", vec![member("x", TypeRef::scalar(TypeTag::Int))]))
            .unwrap();
        reg.register_struct(struct_def("Line", vec![member("p", TypeRef::named(TypeTag::Unknown, "Point"))]))
            .unwrap();
    }

    #[test]
    fn method_dispatch_is_keyed_by_struct_and_method_name_alone() {
        use crate::ast::{FuncDef, Param, StmtNode};

        let mut reg = Registry::new();
        let body = StmtNode::new(crate::ast::Stmt::CompoundStmt(vec![]), crate::diagnostics::SourceLocation::unknown());
        let method = Node::new(FuncDef {
            name: "next".to_string(),
            return_type: TypeRef::scalar(TypeTag::Int),
            params: Vec::<Param>::new(),
            body,
            type_name: None,
            qualified_name: None,
        });
        reg.register_impl("Tick", "Counter", &[method]);

        assert!(reg.implements("Counter", "Tick"));
        assert!(!reg.implements("Counter", "OtherIface"));
        let resolved = reg.resolve_method("Counter", "next").unwrap();
        assert_eq!(resolved.type_name.as_deref(), Some("Counter"));
        assert_eq!(resolved.qualified_name.as_deref(), Some("Counter::next"));
        assert!(reg.resolve_method("Counter", "missing").is_none());
    }
}
