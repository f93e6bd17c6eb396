// C6/C7: the tree-walking evaluator itself. `expr.rs` owns expression
// evaluation, `stmt.rs` owns statement execution; this file owns the
// `Interpreter` state they both thread through and the `Flow`/
// `ReturnValue` control-transfer types of spec §4.7.
//
// Return/Break/Continue are modeled as an explicit control enum
// returned by every statement-execution function rather than as Rust
// exceptions — the "channel-style ... trampolined evaluator with an
// explicit control enum" alternative SPEC_FULL.md's Design Notes call
// "equally acceptable" to throwing, and the one that reads naturally in
// Rust, the same way the teacher's `ControlFlow` enum
// (`Advance`/`Branch`/`Yield`) threads through `vm::VM::step`/`exec`.

pub mod expr;
pub mod stmt;

use crate::array::ArrayValue;
use crate::ast::TypeTag;
use crate::diagnostics::{CbError, SourceLocation, TraceSink};
use crate::env::Env;
use crate::registry::Registry;
use crate::types::TypeManager;
use crate::value::{TypedValue, Variable};
use std::io::Write;

pub type Result<T> = std::result::Result<T, CbError>;

/// The payload a `return` statement carries out of a function body
/// (spec §4.7 table, SPEC_FULL.md Design Notes `ReturnException`).
/// Scalars/strings/bools/enums all collapse into `Scalar` since
/// `TypedValue` already carries the tag needed to range-check/coerce at
/// the call site; arrays and structs get their own variants because
/// they need the 3-D canonicalization (§4.4) and the member-sync
/// (§3.3/§4.7) respectively before the caller can use them.
pub enum ReturnValue {
    Scalar(TypedValue),
    Array3D { canonical: Vec<Vec<Vec<crate::value::Value>>>, base_type: TypeTag },
    Struct(Variable),
    /// `T&` return: spec §4.7 "if the returned variable is itself a
    /// reference, unwraps it; otherwise throws with a pointer to the
    /// variable". This implementation has no live aliasing (§3.2
    /// values are owned), so a reference return carries a deep copy of
    /// the referenced variable — what it actually buys over a plain
    /// scalar/struct return is the dangling-local check in
    /// `stmt::exec_return`.
    Reference(Variable),
}

pub enum Flow {
    Normal,
    Return(ReturnValue),
    /// `break expr;`/`continue expr;` condition (spec §4.7): non-zero
    /// breaks/continues, zero is a no-op that doesn't propagate as
    /// `Flow` at all (the statement executor only constructs this
    /// variant once the condition evaluated non-zero).
    Break,
    Continue,
}

pub struct Interpreter<'a> {
    pub env: Env,
    pub types: TypeManager,
    pub registry: Registry,
    pub trace: &'a mut dyn TraceSink,
    pub out: &'a mut dyn Write,
    pub file: String,
    /// Name of the function currently executing, for the
    /// `"<function>::<name>"` static-variable key (spec §3.4/§3.6).
    pub current_function: String,
    /// The struct type of the `impl` context currently executing, if
    /// any — drives the private-member access rule (spec §4.2 Access
    /// rules / §8.1 property 10).
    pub current_impl_struct: Option<String>,
    /// Scratch slot `call_function` deposits `self`'s post-call state
    /// into (spec §4.5's "after the call, self's mutations are flushed
    /// to v"), so `eval_method_call` can read it back out once the
    /// call's own scope has already been popped.
    pub(crate) last_self: Option<Variable>,
    /// The declared return type of the function currently executing,
    /// so `exec_return` knows whether to package its value as a plain
    /// scalar, a 3-D array, a struct, or a checked reference (spec
    /// §4.7 Return from function).
    pub(crate) current_return_type: Option<crate::ast::TypeRef>,
}

impl<'a> Interpreter<'a> {
    pub fn new(file: &str, trace: &'a mut dyn TraceSink, out: &'a mut dyn Write) -> Interpreter<'a> {
        Interpreter {
            env: Env::new(),
            types: TypeManager::new(),
            registry: Registry::new(),
            trace,
            out,
            file: file.to_string(),
            current_function: String::new(),
            current_impl_struct: None,
            last_self: None,
            current_return_type: None,
        }
    }

    pub fn err_here(&self, e: CbError, loc: SourceLocation) -> String {
        e.render(&self.file, loc)
    }

    /// Resolves a `TypeRef` to a concrete `(TypeTag, array dims)` pair,
    /// evaluating dimension-size expressions (which may reference
    /// already-declared const globals, spec §3.6) and running typedef
    /// resolution (§4.3).
    ///
    /// The parser tags any bare identifier type name `Unknown` — it has
    /// no registry to consult (spec §6.3's "Counter c = {0};" never
    /// writes out `struct Counter`). Typedef resolution only rewrites
    /// aliases it knows about, so a plain struct/interface/enum/union
    /// name used directly as a type still reads `Unknown` coming out of
    /// it; this is where that name gets matched against the registry
    /// and re-tagged.
    pub fn resolve_type(&mut self, type_ref: &crate::ast::TypeRef) -> Result<(crate::ast::TypeRef, Vec<usize>)> {
        let mut resolved = self.types.resolve_typedef(type_ref)?;
        resolved.base = self.effective_base(&resolved);
        let mut dims = Vec::with_capacity(resolved.array_dims.len());
        for dim_expr in &resolved.array_dims {
            let v = self.eval_expr(dim_expr, SourceLocation::unknown())?;
            let n = v.value.as_i64()?;
            if n < 0 {
                return Err(CbError::DynamicArrayNotSupported(
                    "array type has no fixed size (`T[]`)".to_string(),
                ));
            }
            dims.push(n as usize);
        }
        Ok((resolved, dims))
    }

    /// Resolves a member/declaration's effective base tag the way
    /// `resolve_type` does for a full declaration, for the cases (struct
    /// member defaults, `zero_value`) that only have a `TypeRef` in hand
    /// and no const-expression dimensions to evaluate — a bare struct
    /// name still reads `Unknown` out of the parser (see `resolve_type`).
    fn effective_base(&self, type_ref: &crate::ast::TypeRef) -> TypeTag {
        if type_ref.base != TypeTag::Unknown {
            return type_ref.base;
        }
        match &type_ref.name {
            Some(name) if self.registry.structs.contains_key(name) => TypeTag::Struct,
            Some(name) if self.registry.interfaces.contains_key(name) => TypeTag::Interface,
            Some(name) if self.registry.enums.contains_key(name) => TypeTag::Enum,
            Some(name) if self.types.is_union_type(name) => TypeTag::Union,
            _ => TypeTag::Unknown,
        }
    }

    /// `Value::zero_for` generalized to arrays/structs: the "read an
    /// unassigned variable" zero value of spec §4.6 Identifier, and the
    /// default payload a freshly declared variable gets before its
    /// initializer (if any) runs.
    pub fn zero_value(&self, type_ref: &crate::ast::TypeRef, dims: &[usize]) -> crate::value::Value {
        // A pointer member's zero value is always null, never a fresh
        // instance of the pointee — building one would recurse forever
        // for exactly the self-referential shapes (`struct Node { Node*
        // next; }`) pointer members exist to permit (spec §3.5
        // invariant: "pointer-typed members break the edge").
        if type_ref.is_pointer {
            return crate::value::Value::Null;
        }
        let base = self.effective_base(type_ref);
        if !dims.is_empty() {
            let len: usize = dims.iter().product();
            return crate::value::Value::Array(ArrayValue {
                base_type: base,
                dims: dims.to_vec(),
                data: vec![crate::value::Value::zero_for(base); len],
            });
        }
        if base == TypeTag::Struct {
            if let Some(name) = &type_ref.name {
                if let Some(def) = self.registry.structs.get(name).cloned() {
                    let members = def
                        .members
                        .iter()
                        .map(|m| {
                            let mdims: Vec<usize> = m
                                .type_ref
                                .array_dims
                                .iter()
                                .filter_map(|e| match e.as_ref() {
                                    crate::ast::Expr::Number(n, _) if *n >= 0 => Some(*n as usize),
                                    _ => None,
                                })
                                .collect();
                            let mbase = self.effective_base(&m.type_ref);
                            let mut child = Variable::new(mbase, self.zero_value(&m.type_ref, &mdims));
                            child = child
                                .with_flag(crate::value::VarFlag::Const, m.is_const)
                                .with_flag(crate::value::VarFlag::PrivateMember, m.is_private)
                                .with_flag(crate::value::VarFlag::Array, !mdims.is_empty())
                                .with_flag(crate::value::VarFlag::Unsigned, m.type_ref.is_unsigned)
                                .with_flag(crate::value::VarFlag::Pointer, m.type_ref.is_pointer)
                                .with_flag(crate::value::VarFlag::Struct, mbase == TypeTag::Struct);
                            child.dims = mdims;
                            child.struct_type = m.type_ref.name.clone();
                            (m.name.clone(), child)
                        })
                        .collect();
                    return crate::value::Value::Struct(crate::value::StructValue {
                        type_name: name.clone(),
                        members,
                    });
                }
            }
        }
        crate::value::Value::zero_for(base)
    }
}
