// C2: Scope & Variable store.
//
// Generalizes the teacher's `env::Env<T>` — a `RefCell`-guarded map plus
// a parent link — into a concrete stack of scopes owned outright by the
// `Interpreter` (spec §3.4). Rather than persistent `Rc` parent-chaining
// (useful for the teacher's tree-shaped closures, which may outlive
// their defining scope), Cb's call scopes are pushed/popped in strict
// LIFO order, so a plain `Vec<VarMap>` stack is the direct idiomatic
// translation — same "lookup walks outward, define touches the
// innermost frame" contract, lighter weight for the strictly nested
// case spec §3.4/§5 describes.
//
// The function table and static-variable table are the "`env::Env<T>`
// reused twice" SPEC_FULL.md describes: one map for variables (this
// file), a second flat map for static storage, and a third
// (`registry::FunctionTable`) for callable definitions.

use crate::ast::TypeTag;
use crate::diagnostics::CbError;
use crate::value::{Variable, VarMap};
use std::collections::HashMap;

pub type Result<T> = std::result::Result<T, CbError>;

/// A stack of lexical scopes, the global scope at the bottom (index 0),
/// plus the function-local static-variable table (spec §3.4/§3.6).
pub struct Env {
    scopes: Vec<VarMap>,
    /// Parallel to `scopes`: local name -> static-table key, so that
    /// `pop_scope` can flush a static variable's latest value back to
    /// `statics` before the local copy is dropped.
    static_backing: Vec<HashMap<String, String>>,
    statics: VarMap,
    /// `"<function>::<name>"` keys that have already been initialized,
    /// so repeat encounters of a `static` declaration are no-ops (spec
    /// §3.6).
    statics_initialized: std::collections::HashSet<String>,
}

impl Env {
    pub fn new() -> Env {
        Env {
            scopes: vec![VarMap::new()],
            static_backing: vec![HashMap::new()],
            statics: VarMap::new(),
            statics_initialized: std::collections::HashSet::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(VarMap::new());
        self.static_backing.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        let backing = self.static_backing.pop().expect("scope stack underflow");
        let scope = self.scopes.pop().expect("scope stack underflow");
        for (name, key) in backing {
            if let Some(var) = scope.get(&name) {
                self.statics.insert(key, var.clone());
            }
        }
        assert!(!self.scopes.is_empty(), "popped the global scope");
    }

    fn global_mut(&mut self) -> &mut VarMap {
        self.scopes.first_mut().expect("global scope missing")
    }

    pub fn global(&self) -> &VarMap {
        self.scopes.first().expect("global scope missing")
    }

    /// `find_variable(name)`: local stack top-down, then global (spec
    /// §4.2). Static-backed names are ordinary local entries by the
    /// time this runs — the static table is consulted only at
    /// declaration time (see `declare_static`).
    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v);
            }
        }
        None
    }

    pub fn find_variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                return scope.get_mut(name);
            }
        }
        None
    }

    /// True if `name` is defined in the global scope specifically
    /// (const-global registration needs this to avoid shadowing rules
    /// mattering at the top level).
    pub fn is_global(&self, name: &str) -> bool {
        self.global().contains_key(name)
    }

    pub fn define_local(&mut self, name: &str, var: Variable) {
        self.scopes
            .last_mut()
            .expect("scope stack empty")
            .insert(name.to_string(), var);
    }

    pub fn define_global(&mut self, name: &str, var: Variable) {
        self.global_mut().insert(name.to_string(), var);
    }

    /// Whether `"<func>::<name>"` has already been initialized, so a
    /// caller can decide whether it needs to evaluate an initializer
    /// expression before calling `declare_static` (spec §3.6: static
    /// initializers run exactly once).
    pub fn is_static_initialized(&self, func_name: &str, var_name: &str) -> bool {
        self.statics_initialized.contains(&format!("{}::{}", func_name, var_name))
    }

    /// Declares a `static` local: seeds `statics` on first encounter,
    /// reuses the stored value on every later call, and records the
    /// local->static key binding so `pop_scope` flushes mutations back.
    pub fn declare_static<F>(&mut self, func_name: &str, var_name: &str, init: F) -> Result<()>
    where
        F: FnOnce() -> Result<Variable>,
    {
        let key = format!("{}::{}", func_name, var_name);
        if !self.statics_initialized.contains(&key) {
            let var = init()?;
            self.statics.insert(key.clone(), var);
            self.statics_initialized.insert(key.clone());
        }
        let var = self.statics.get(&key).cloned().expect("static just inserted");
        self.define_local(var_name, var);
        self.static_backing
            .last_mut()
            .expect("scope stack empty")
            .insert(var_name.to_string(), key);
        Ok(())
    }

    /// Assigns into an already-declared variable, searching outward
    /// from the innermost scope (spec §4.2). Fails with
    /// `UndefinedVariable` if no such name has been declared anywhere.
    pub fn assign(&mut self, name: &str, var: Variable) -> Result<()> {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                scope.insert(name.to_string(), var);
                return Ok(());
            }
        }
        Err(CbError::UndefinedVariable(name.to_string()))
    }

    pub fn zero_value_warning(name: &str, tag: TypeTag) -> String {
        format!(
            "reading unassigned variable '{}' (type {}) yields the zero value",
            name,
            tag.name()
        )
    }
}

impl Default for Env {
    fn default() -> Env {
        Env::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn var(n: i64) -> Variable {
        Variable::new(TypeTag::Int, Value::Int(n))
    }

    #[test]
    fn local_shadows_global_and_pop_restores_global() {
        let mut env = Env::new();
        env.define_global("x", var(1));
        env.push_scope();
        env.define_local("x", var(2));
        assert_eq!(env.find_variable("x").unwrap().value, Value::Int(2));
        env.pop_scope();
        assert_eq!(env.find_variable("x").unwrap().value, Value::Int(1));
    }

    #[test]
    fn assign_walks_outward_to_the_declaring_scope() {
        let mut env = Env::new();
        env.define_global("g", var(0));
        env.push_scope();
        env.assign("g", var(42)).unwrap();
        assert_eq!(env.find_variable("g").unwrap().value, Value::Int(42));
    }

    #[test]
    fn assign_to_undeclared_name_is_an_error() {
        let mut env = Env::new();
        assert!(matches!(env.assign("nope", var(1)), Err(CbError::UndefinedVariable(_))));
    }

    #[test]
    fn static_initializes_once_and_persists_across_scopes() {
        let mut env = Env::new();
        let mut init_calls = 0;

        env.push_scope();
        assert!(!env.is_static_initialized("counter", "x"));
        env.declare_static("counter", "x", || {
            init_calls += 1;
            Ok(var(0))
        })
        .unwrap();
        env.assign("x", var(1)).unwrap();
        env.pop_scope();

        env.push_scope();
        env.declare_static("counter", "x", || {
            init_calls += 1;
            Ok(var(0))
        })
        .unwrap();
        assert_eq!(env.find_variable("x").unwrap().value, Value::Int(1));
        env.assign("x", var(2)).unwrap();
        env.pop_scope();

        assert_eq!(init_calls, 1, "static initializer must run exactly once");

        env.push_scope();
        env.declare_static("counter", "x", || Ok(var(0))).unwrap();
        assert_eq!(env.find_variable("x").unwrap().value, Value::Int(2));
        env.pop_scope();
    }
}
