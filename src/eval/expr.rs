// C6: Expression evaluator (spec §4.6). Every branch returns a
// `TypedValue` (value + inferred type) so that assignment sites can
// range-check/unsigned-clamp without re-inspecting the AST.

use super::{Interpreter, Result};
use crate::array;
use crate::ast::{
    ArrayLitElem, BinOp, Expr, IncDecOp, Node, StructLitField, TypeTag, UnOp,
};
use crate::diagnostics::{CbError, SourceLocation};
use crate::value::{self, ArrayValue, InterfaceValue, StructValue, TypedValue, Value, VarFlag, Variable};

/// A flattened lvalue path: the root variable's name plus a sequence of
/// member/index steps. Index expressions are evaluated eagerly while
/// flattening (so side effects inside `a[i++]` run left-to-right, once),
/// then the whole path is replayed over an owned clone of the root
/// variable in `assign_path` — sidesteps the borrow-checker fight of
/// holding a `&mut Variable` alive while recursing into `self` to
/// evaluate index expressions.
enum Seg {
    Member(String),
    Index(Vec<i64>),
}

impl<'a> Interpreter<'a> {
    pub fn eval_expr(&mut self, expr: &Expr, loc: SourceLocation) -> Result<TypedValue> {
        match expr {
            Expr::Number(v, tag) => Ok(TypedValue::new(Value::Int(*v), *tag)),
            Expr::FloatLiteral(v, tag) => Ok(TypedValue::new(Value::Float(*v), *tag)),
            Expr::StringLiteral(s) => Ok(TypedValue::new(Value::Str(s.clone()), TypeTag::String)),
            Expr::BoolLiteral(b) => Ok(TypedValue::new(Value::Bool(*b), TypeTag::Bool)),
            Expr::Null => Ok(TypedValue::new(Value::Null, TypeTag::Void)),

            Expr::Identifier(name) => self.eval_identifier(name, loc),

            Expr::BinaryOp(op, l, r) => self.eval_binary(*op, l, r, loc),
            Expr::UnaryOp(op, e) => self.eval_unary(*op, e, loc),

            Expr::PreIncDec(op, target) => self.eval_incdec(*op, target, true, loc),
            Expr::PostIncDec(op, target) => self.eval_incdec(*op, target, false, loc),

            Expr::Assign(lhs, rhs) => {
                let rv = self.eval_expr(rhs, loc)?;
                self.assign_lvalue(lhs, rv, loc)
            }

            Expr::ArrayRef(base, idx_exprs) => self.eval_array_ref(base, idx_exprs, loc),
            Expr::ArrayLiteral(elems) => self.eval_array_literal_bare(elems, loc),

            Expr::MemberAccess(base, name) => self.eval_member_access(base, name, loc),
            Expr::ArrowAccess(base, name) => self.eval_member_access(base, name, loc),
            Expr::MemberArrayAccess(base, name, idx_exprs) => {
                let member = self.eval_member_access(base, name, loc)?;
                self.index_value(member, idx_exprs, loc)
            }

            Expr::FuncCall(name, args) => self.eval_func_call(name, args, loc),
            Expr::MethodCall(recv, name, args) => self.eval_method_call(recv, name, args, loc),

            Expr::Ternary(cond, t, f) => {
                if self.eval_expr(cond, loc)?.value.as_bool()? {
                    self.eval_expr(t, loc)
                } else {
                    self.eval_expr(f, loc)
                }
            }

            Expr::Cast(type_ref, e) => {
                let v = self.eval_expr(e, loc)?;
                let (resolved, _) = self.resolve_type(type_ref)?;
                let coerced = value::coerce_to(resolved.base, &v.value, resolved.is_unsigned)?;
                Ok(TypedValue::new(coerced, resolved.base).unsigned(resolved.is_unsigned))
            }

            Expr::StructLiteral(fields) => self.eval_struct_literal_bare(fields, loc),
            Expr::EnumRef(enum_name, member) => self.eval_enum_ref(enum_name, member, loc),
        }
    }

    fn eval_identifier(&mut self, name: &str, _loc: SourceLocation) -> Result<TypedValue> {
        let var = self
            .env
            .find_variable(name)
            .ok_or_else(|| CbError::UndefinedVariable(name.to_string()))?;
        if !var.is_assigned() {
            self.trace.warn(&crate::env::Env::zero_value_warning(name, var.type_tag));
        }
        Ok(TypedValue::new(var.value.clone(), var.type_tag)
            .unsigned(var.is_unsigned())
            .with_struct_name(var.struct_type.clone()))
    }

    fn eval_binary(&mut self, op: BinOp, l: &Expr, r: &Expr, loc: SourceLocation) -> Result<TypedValue> {
        if op == BinOp::And {
            let lv = self.eval_expr(l, loc)?.value.as_bool()?;
            if !lv {
                return Ok(TypedValue::new(Value::Bool(false), TypeTag::Bool));
            }
            let rv = self.eval_expr(r, loc)?.value.as_bool()?;
            return Ok(TypedValue::new(Value::Bool(rv), TypeTag::Bool));
        }
        if op == BinOp::Or {
            let lv = self.eval_expr(l, loc)?.value.as_bool()?;
            if lv {
                return Ok(TypedValue::new(Value::Bool(true), TypeTag::Bool));
            }
            let rv = self.eval_expr(r, loc)?.value.as_bool()?;
            return Ok(TypedValue::new(Value::Bool(rv), TypeTag::Bool));
        }

        let lv = self.eval_expr(l, loc)?;
        let rv = self.eval_expr(r, loc)?;
        let widened_tag = widen(lv.type_tag, rv.type_tag);

        let result = match op {
            BinOp::Add if lv.value.type_tag() == TypeTag::String || rv.value.type_tag() == TypeTag::String => {
                let mut s = as_display_string(&lv.value);
                s.push_str(&as_display_string(&rv.value));
                return Ok(TypedValue::new(Value::Str(s), TypeTag::String));
            }
            BinOp::Add => lv.value.add(&rv.value)?,
            BinOp::Sub => lv.value.sub(&rv.value)?,
            BinOp::Mul => lv.value.mul(&rv.value)?,
            BinOp::Div => lv.value.div(&rv.value)?,
            BinOp::Mod => lv.value.modulo(&rv.value)?,
            BinOp::Lt => lv.value.lt(&rv.value)?,
            BinOp::Gt => lv.value.gt(&rv.value)?,
            BinOp::Lte => lv.value.lte(&rv.value)?,
            BinOp::Gte => lv.value.gte(&rv.value)?,
            BinOp::Eq => lv.value.eq_value(&rv.value)?,
            BinOp::Ne => lv.value.ne_value(&rv.value)?,
            BinOp::BitAnd => lv.value.bitand(&rv.value)?,
            BinOp::BitOr => lv.value.bitor(&rv.value)?,
            BinOp::BitXor => lv.value.bitxor(&rv.value)?,
            BinOp::Shl => lv.value.shl(&rv.value)?,
            BinOp::Shr => lv.value.shr(&rv.value)?,
            BinOp::And | BinOp::Or => unreachable!("short-circuited above"),
        };

        let tag = match op {
            BinOp::Lt | BinOp::Gt | BinOp::Lte | BinOp::Gte | BinOp::Eq | BinOp::Ne => TypeTag::Bool,
            _ => widened_tag,
        };
        Ok(TypedValue::new(result, tag))
    }

    fn eval_unary(&mut self, op: UnOp, e: &Expr, loc: SourceLocation) -> Result<TypedValue> {
        let v = self.eval_expr(e, loc)?;
        match op {
            UnOp::Neg => Ok(TypedValue::new(v.value.neg()?, v.type_tag).unsigned(v.is_unsigned)),
            UnOp::Not => Ok(TypedValue::new(v.value.not()?, TypeTag::Bool)),
            UnOp::BitNot => Ok(TypedValue::new(v.value.bitnot()?, v.type_tag)),
        }
    }

    fn eval_incdec(&mut self, op: IncDecOp, target: &Expr, is_pre: bool, loc: SourceLocation) -> Result<TypedValue> {
        let before = self.eval_expr(target, loc)?;
        let delta = match op {
            IncDecOp::Inc => 1,
            IncDecOp::Dec => -1,
        };
        let after_value = match &before.value {
            Value::Float(f) => Value::Float(f + delta as f64),
            _ => Value::Int(before.value.as_i64()? + delta),
        };
        let after = TypedValue::new(after_value, before.type_tag).unsigned(before.is_unsigned);
        let written = self.assign_lvalue(target, after, loc)?;
        Ok(if is_pre { written } else { before })
    }

    // --- arrays / strings -------------------------------------------

    fn eval_array_ref(&mut self, base: &Expr, idx_exprs: &[Node<Expr>], loc: SourceLocation) -> Result<TypedValue> {
        let base_val = self.eval_expr(base, loc)?;
        self.index_value(base_val, idx_exprs, loc)
    }

    fn index_value(&mut self, base_val: TypedValue, idx_exprs: &[Node<Expr>], loc: SourceLocation) -> Result<TypedValue> {
        let mut indices = Vec::with_capacity(idx_exprs.len());
        for e in idx_exprs {
            indices.push(self.eval_expr(e, loc)?.value.as_i64()?);
        }
        match &base_val.value {
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = indices
                    .first()
                    .copied()
                    .ok_or_else(|| CbError::TypeMismatch("string index requires one index".to_string()))?;
                if i < 0 || (i as usize) >= chars.len() {
                    return Err(CbError::StringOutOfBounds { index: i, len: chars.len() });
                }
                Ok(TypedValue::new(Value::Str(chars[i as usize].to_string()), TypeTag::Char))
            }
            Value::Array(av) => {
                if indices.len() == av.dims.len() {
                    let v = array::get(av, &indices)?;
                    Ok(TypedValue::new(v, av.base_type).unsigned(base_val.is_unsigned))
                } else if indices.len() < av.dims.len() {
                    let sliced = array::slice(av, &indices)?;
                    Ok(TypedValue::new(Value::Array(sliced), av.base_type).unsigned(base_val.is_unsigned))
                } else {
                    Err(CbError::ArrayOutOfBounds {
                        index: *indices.last().unwrap(),
                        dim: av.dims.len(),
                        size: 0,
                    })
                }
            }
            other => Err(CbError::TypeMismatch(format!("cannot index {:?}", other))),
        }
    }

    fn eval_array_literal_bare(&mut self, elems: &[ArrayLitElem], loc: SourceLocation) -> Result<TypedValue> {
        // An array literal with no declared shape (e.g. inside a nested
        // literal or a call argument) infers its own shape and base
        // type from its first leaf, the way §4.4's depth-first walk
        // does when there's no declaration driving it.
        let dims = infer_literal_dims(elems);
        let base_type = infer_leaf_type(self, elems, loc)?;
        let mut data = Vec::new();
        for e in elems {
            data.extend(array::build_from_literal(e, &dims[1..], &mut |expr| {
                Ok(self.eval_expr(expr, loc)?.value)
            })?);
        }
        Ok(TypedValue::new(
            Value::Array(ArrayValue { base_type, dims, data }),
            base_type,
        ))
    }

    // --- structs / interfaces -----------------------------------------

    fn eval_member_access(&mut self, base: &Expr, name: &str, loc: SourceLocation) -> Result<TypedValue> {
        let base_val = self.eval_expr(base, loc)?;
        let is_self = matches!(base, Expr::Identifier(n) if n == "self");
        match &base_val.value {
            Value::Struct(sv) => self.read_struct_member(sv, name, is_self, loc),
            Value::Interface(iv) => self.read_struct_member(&iv.inner, name, is_self, loc),
            other => Err(CbError::TypeMismatch(format!("member access on non-struct {:?}", other))),
        }
    }

    fn read_struct_member(&mut self, sv: &StructValue, name: &str, is_self: bool, _loc: SourceLocation) -> Result<TypedValue> {
        let child = sv.get(name).ok_or_else(|| CbError::UnknownStructMember {
            struct_name: sv.type_name.clone(),
            member: name.to_string(),
        })?;
        let allowed = is_self
            || self.current_impl_struct.as_deref() == Some(sv.type_name.as_str())
            || !child.is_private();
        if !allowed {
            return Err(CbError::PrivateMemberAccess {
                struct_name: sv.type_name.clone(),
                member: name.to_string(),
            });
        }
        Ok(TypedValue::new(child.value.clone(), child.type_tag)
            .unsigned(child.is_unsigned())
            .with_struct_name(child.struct_type.clone()))
    }

    fn eval_struct_literal_bare(&mut self, fields: &[StructLitField], _loc: SourceLocation) -> Result<TypedValue> {
        // A struct literal's type is driven by the declaration it
        // initializes (VarDecl resolves the concrete StructDef and
        // calls `build_struct_value` directly). Read in isolation — as
        // a bare expression with no declared type to bind field
        // names/positions to — it has nothing to build against.
        let _ = fields;
        Err(CbError::TypeMismatch(
            "struct literal used outside of a declaration with a known struct type".to_string(),
        ))
    }

    pub fn build_struct_value(&mut self, struct_name: &str, fields: &[StructLitField], loc: SourceLocation) -> Result<Value> {
        let def = self
            .registry
            .structs
            .get(struct_name)
            .cloned()
            .ok_or_else(|| CbError::TypeMismatch(format!("unknown struct type '{}'", struct_name)))?;

        let mut zero = self.zero_value(&crate::ast::TypeRef::named(TypeTag::Struct, struct_name), &[]);
        let members = match &mut zero {
            Value::Struct(sv) => &mut sv.members,
            _ => unreachable!(),
        };

        let all_named = fields.iter().all(|f| matches!(f, StructLitField::Named(_, _)));
        if all_named {
            for f in fields {
                if let StructLitField::Named(name, expr) = f {
                    let idx = members
                        .iter()
                        .position(|(n, _)| n == name)
                        .ok_or_else(|| CbError::UnknownStructMember {
                            struct_name: struct_name.to_string(),
                            member: name.clone(),
                        })?;
                    let v = self.eval_expr(expr, loc)?;
                    self.store_into_member(&mut members[idx].1, v)?;
                }
            }
        } else {
            if fields.len() > def.members.len() {
                return Err(CbError::TypeMismatch(format!(
                    "too many initializers for struct '{}': expected at most {}, got {}",
                    struct_name,
                    def.members.len(),
                    fields.len()
                )));
            }
            for (i, f) in fields.iter().enumerate() {
                if let StructLitField::Positional(expr) = f {
                    let v = self.eval_expr(expr, loc)?;
                    self.store_into_member(&mut members[i].1, v)?;
                }
            }
        }
        Ok(zero)
    }

    fn store_into_member(&mut self, member: &mut Variable, v: TypedValue) -> Result<()> {
        let (checked, _warn) = coerce_and_range_check(member.type_tag, member.is_unsigned(), &v.value)?;
        member.value = checked;
        member.flags.insert(VarFlag::Assigned);
        Ok(())
    }

    fn eval_enum_ref(&mut self, enum_name: &str, member: &str, _loc: SourceLocation) -> Result<TypedValue> {
        let def = self
            .registry
            .enums
            .get(enum_name)
            .ok_or_else(|| CbError::UndefinedVariable(format!("{}::{}", enum_name, member)))?;
        let (_, val) = def
            .members
            .iter()
            .find(|(n, _)| n == member)
            .ok_or_else(|| CbError::UnknownStructMember {
                struct_name: enum_name.to_string(),
                member: member.to_string(),
            })?;
        Ok(TypedValue::new(Value::Enum(*val, enum_name.to_string()), TypeTag::Enum))
    }

    // --- calls ----------------------------------------------------------

    fn eval_func_call(&mut self, name: &str, arg_exprs: &[Node<Expr>], loc: SourceLocation) -> Result<TypedValue> {
        if name == "len" && !self.registry.functions.contains_key(name) {
            return self.eval_len_builtin(arg_exprs, loc);
        }
        let def = self
            .registry
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| CbError::UndefinedFunction(name.to_string()))?;
        let mut args = Vec::with_capacity(arg_exprs.len());
        for e in arg_exprs {
            args.push(self.eval_expr(e, loc)?);
        }
        self.call_function(&def, args, None, loc)
    }

    /// `len(s)` / `len(a)`: code-point count for strings (spec §3.2,
    /// §8.1 property 6), element count of the outermost dimension for
    /// arrays. Not a user-callable symbol in the global function table
    /// — a user-defined `len` shadows it, checked by the caller.
    fn eval_len_builtin(&mut self, arg_exprs: &[Node<Expr>], loc: SourceLocation) -> Result<TypedValue> {
        if arg_exprs.len() != 1 {
            return Err(CbError::ArgumentCountMismatch {
                name: "len".to_string(),
                expected: 1,
                got: arg_exprs.len(),
            });
        }
        let v = self.eval_expr(&arg_exprs[0], loc)?;
        let n = match &v.value {
            Value::Str(s) => s.chars().count() as i64,
            Value::Array(av) => *av.dims.first().unwrap_or(&0) as i64,
            other => return Err(CbError::TypeMismatch(format!("len() expects a string or array, got {:?}", other))),
        };
        Ok(TypedValue::new(Value::Int(n), TypeTag::Int))
    }

    fn eval_method_call(
        &mut self,
        recv: &Expr,
        name: &str,
        arg_exprs: &[Node<Expr>],
        loc: SourceLocation,
    ) -> Result<TypedValue> {
        let recv_val = self.eval_expr(recv, loc)?;
        let struct_name = match &recv_val.value {
            Value::Struct(sv) => sv.type_name.clone(),
            Value::Interface(iv) => iv.inner.type_name.clone(),
            other => return Err(CbError::TypeMismatch(format!("method call on non-struct {:?}", other))),
        };
        let def = self
            .registry
            .resolve_method(&struct_name, name)
            .ok_or_else(|| CbError::UndefinedFunction(format!("{}::{}", struct_name, name)))?;

        let mut args = Vec::with_capacity(arg_exprs.len());
        for e in arg_exprs {
            args.push(self.eval_expr(e, loc)?);
        }

        let self_struct = match recv_val.value {
            Value::Struct(sv) => sv,
            Value::Interface(iv) => *iv.inner,
            _ => unreachable!(),
        };
        let self_var = Variable::new(TypeTag::Struct, Value::Struct(self_struct))
            .with_flag(VarFlag::Struct, true);
        let result = self.call_function(&def, args, Some(self_var.clone()), loc)?;

        // Flush `self`'s mutations back to the receiver (spec §4.5
        // "After the call, self's mutations are flushed to v").
        if let Some(updated_self) = self.take_last_self() {
            self.assign_lvalue(recv, TypedValue::new(updated_self.value, updated_self.type_tag), loc)?;
        }
        Ok(result)
    }
}

/// `self`'s post-call state is stashed in a scope-local slot named
/// `"self"` inside the callee's own scope (popped before this runs), so
/// `call_function` copies it out into `last_self` before popping.
impl<'a> Interpreter<'a> {
    pub(super) fn take_last_self(&mut self) -> Option<Variable> {
        self.last_self.take()
    }
}

fn widen(a: TypeTag, b: TypeTag) -> TypeTag {
    if a.is_float() || b.is_float() {
        if a == TypeTag::Quad || b == TypeTag::Quad {
            TypeTag::Quad
        } else if a == TypeTag::Double || b == TypeTag::Double {
            TypeTag::Double
        } else {
            TypeTag::Float
        }
    } else {
        rank(a).max(rank(b)).to_tag()
    }
}

fn rank(t: TypeTag) -> u8 {
    match t {
        TypeTag::Bool => 0,
        TypeTag::Tiny | TypeTag::Char => 1,
        TypeTag::Short => 2,
        TypeTag::Int | TypeTag::Enum => 3,
        TypeTag::Long => 4,
        _ => 3,
    }
}

trait ToTag {
    fn to_tag(self) -> TypeTag;
}
impl ToTag for u8 {
    fn to_tag(self) -> TypeTag {
        match self {
            0 => TypeTag::Bool,
            1 => TypeTag::Tiny,
            2 => TypeTag::Short,
            4 => TypeTag::Long,
            _ => TypeTag::Int,
        }
    }
}

fn as_display_string(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Enum(i, _) => i.to_string(),
        Value::Null => "null".to_string(),
        other => format!("{:?}", other),
    }
}

fn infer_literal_dims(elems: &[ArrayLitElem]) -> Vec<usize> {
    let mut dims = vec![elems.len()];
    if let Some(ArrayLitElem::Nested(inner)) = elems.first() {
        dims.extend(infer_literal_dims(inner));
    }
    dims
}

fn infer_leaf_type(interp: &mut Interpreter, elems: &[ArrayLitElem], loc: SourceLocation) -> Result<TypeTag> {
    match elems.first() {
        Some(ArrayLitElem::Leaf(e)) => Ok(interp.eval_expr(e, loc)?.type_tag),
        Some(ArrayLitElem::Nested(inner)) => infer_leaf_type(interp, inner, loc),
        None => Ok(TypeTag::Unknown),
    }
}

pub(crate) fn coerce_and_range_check(tag: TypeTag, unsigned: bool, value: &Value) -> Result<(Value, Option<String>)> {
    if tag.is_integer() {
        let raw = value.as_i64()?;
        let (checked, warn) = value::range_check(tag, raw, unsigned)?;
        Ok((Value::Int(checked), warn))
    } else {
        Ok((value::coerce_to(tag, value, unsigned)?, None))
    }
}

// --- lvalue assignment -----------------------------------------------

impl<'a> Interpreter<'a> {
    pub(crate) fn assign_lvalue(&mut self, target: &Expr, rv: TypedValue, loc: SourceLocation) -> Result<TypedValue> {
        let (root, segs) = self.flatten_lvalue(target, loc)?;
        if segs.is_empty() {
            return self.assign_identifier(&root, rv, loc);
        }
        let mut var = self
            .env
            .find_variable(&root)
            .cloned()
            .ok_or_else(|| CbError::UndefinedVariable(root.clone()))?;
        let written = write_path(&mut var, &segs, rv)?;
        self.env.assign(&root, var)?;
        if root == "self" {
            if let Some(v) = self.env.find_variable("self") {
                self.last_self = Some(v.clone());
            }
        }
        Ok(written)
    }

    fn assign_identifier(&mut self, name: &str, rv: TypedValue, _loc: SourceLocation) -> Result<TypedValue> {
        let mut var = self
            .env
            .find_variable(name)
            .cloned()
            .ok_or_else(|| CbError::UndefinedVariable(name.to_string()))?;
        if var.is_const() && var.is_assigned() {
            return Err(CbError::ConstReassign(name.to_string()));
        }
        if var.is_array() && !matches!(rv.value, Value::Array(_)) {
            return Err(CbError::TypeMismatch(format!(
                "cannot assign a scalar directly to array variable '{}'",
                name
            )));
        }
        if let Value::Array(new_arr) = &rv.value {
            if var.is_array() {
                let old_dims = var.dims.clone();
                if old_dims != new_arr.dims {
                    return Err(CbError::ArrayShapeMismatch(format!(
                        "cannot assign array of shape {:?} to '{}' of shape {:?}",
                        new_arr.dims, name, old_dims
                    )));
                }
                var.value = Value::Array(new_arr.clone());
                var.flags.insert(VarFlag::Assigned);
                self.env.assign(name, var)?;
                return Ok(rv);
            }
        }
        if var.type_tag == TypeTag::Union {
            let union_name = var
                .struct_type
                .clone()
                .ok_or_else(|| CbError::TypeMismatch("union variable missing its type name".to_string()))?;
            if !self.types.is_value_allowed_for_union(&union_name, &rv.value)? {
                return Err(CbError::UnionConstraintViolation {
                    union_name,
                    value: format!("{:?}", rv.value),
                });
            }
            var.value = rv.value.clone();
            var.flags.insert(VarFlag::Assigned);
            self.env.assign(name, var)?;
            return Ok(rv);
        }
        if var.type_tag == TypeTag::Struct {
            if let Value::Struct(_) = &rv.value {
                var.value = rv.value.clone();
                var.flags.insert(VarFlag::Assigned);
                self.env.assign(name, var)?;
                return Ok(rv);
            }
        }
        let (checked, warn) = coerce_and_range_check(var.type_tag, var.is_unsigned(), &rv.value)?;
        if let Some(w) = warn {
            self.trace.warn(&w);
        }
        var.value = checked.clone();
        var.flags.insert(VarFlag::Assigned);
        self.env.assign(name, var)?;
        Ok(TypedValue::new(checked, rv.type_tag).unsigned(rv.is_unsigned))
    }

    fn flatten_lvalue(&mut self, expr: &Expr, loc: SourceLocation) -> Result<(String, Vec<Seg>)> {
        match expr {
            Expr::Identifier(name) => Ok((name.clone(), Vec::new())),
            Expr::MemberAccess(base, name) | Expr::ArrowAccess(base, name) => {
                let (root, mut segs) = self.flatten_lvalue(base, loc)?;
                segs.push(Seg::Member(name.clone()));
                Ok((root, segs))
            }
            Expr::ArrayRef(base, idx_exprs) => {
                let (root, mut segs) = self.flatten_lvalue(base, loc)?;
                let mut idxs = Vec::with_capacity(idx_exprs.len());
                for e in idx_exprs {
                    idxs.push(self.eval_expr(e, loc)?.value.as_i64()?);
                }
                segs.push(Seg::Index(idxs));
                Ok((root, segs))
            }
            Expr::MemberArrayAccess(base, name, idx_exprs) => {
                let (root, mut segs) = self.flatten_lvalue(base, loc)?;
                segs.push(Seg::Member(name.clone()));
                let mut idxs = Vec::with_capacity(idx_exprs.len());
                for e in idx_exprs {
                    idxs.push(self.eval_expr(e, loc)?.value.as_i64()?);
                }
                segs.push(Seg::Index(idxs));
                Ok((root, segs))
            }
            _ => Err(CbError::TypeMismatch("expression is not assignable".to_string())),
        }
    }
}

/// Replays a flattened path over an owned clone of the root `Variable`,
/// returning the value actually stored at the leaf (post range-check).
/// Operating on an owned clone (rather than threading `&mut self`
/// through a recursive mutable borrow of `env`) is the direct
/// idiomatic-Rust dodge for "assign through an arbitrarily nested
/// struct/array path" — the clone is written back by the caller via
/// `env.assign`.
fn write_path(var: &mut Variable, segs: &[Seg], rv: TypedValue) -> Result<TypedValue> {
    if segs.is_empty() {
        if var.is_const() && var.is_assigned() {
            return Err(CbError::ConstReassign("struct member".to_string()));
        }
        let (checked, _warn) = coerce_and_range_check(var.type_tag, var.is_unsigned(), &rv.value)?;
        var.value = checked.clone();
        var.flags.insert(VarFlag::Assigned);
        return Ok(TypedValue::new(checked, rv.type_tag).unsigned(rv.is_unsigned));
    }
    match &segs[0] {
        Seg::Member(name) => {
            let sv = match &mut var.value {
                Value::Struct(sv) => sv,
                Value::Interface(InterfaceValue { inner, .. }) => &mut **inner,
                other => return Err(CbError::TypeMismatch(format!("cannot access member on {:?}", other))),
            };
            let struct_name = sv.type_name.clone();
            let child = sv.get_mut(name).ok_or_else(|| CbError::UnknownStructMember {
                struct_name,
                member: name.clone(),
            })?;
            write_path(child, &segs[1..], rv)
        }
        Seg::Index(indices) => {
            if var.is_const() {
                return Err(CbError::ConstArrayAssign("array element".to_string()));
            }
            let av = match &mut var.value {
                Value::Array(av) => av,
                Value::Str(s) => {
                    return write_string_index(s, indices, rv);
                }
                other => return Err(CbError::TypeMismatch(format!("cannot index {:?}", other))),
            };
            if indices.len() != av.dims.len() {
                return Err(CbError::ArrayShapeMismatch(
                    "partial index not supported in an assignment target".to_string(),
                ));
            }
            for (dim_no, (&i, &d)) in indices.iter().zip(av.dims.iter()).enumerate() {
                if i < 0 || (i as usize) >= d {
                    return Err(CbError::ArrayOutOfBounds { index: i, dim: dim_no, size: d });
                }
            }
            let idx: Vec<usize> = indices.iter().map(|&i| i as usize).collect();
            let flat = av.flat_index(&idx);
            if segs.len() == 1 {
                let base_type = av.base_type;
                let (checked, _warn) = coerce_and_range_check(base_type, var.is_unsigned(), &rv.value)?;
                av.data[flat] = checked.clone();
                var.flags.insert(VarFlag::Assigned);
                Ok(TypedValue::new(checked, rv.type_tag).unsigned(rv.is_unsigned))
            } else {
                // array-of-struct element: recurse as a synthetic
                // Variable wrapping that element's Value so the Member
                // branch above can navigate it uniformly.
                let mut elem_var = Variable::new(av.base_type, av.data[flat].clone());
                let result = write_path(&mut elem_var, &segs[1..], rv)?;
                av.data[flat] = elem_var.value;
                Ok(result)
            }
        }
    }
}

fn write_string_index(s: &mut String, indices: &[i64], rv: TypedValue) -> Result<TypedValue> {
    let i = indices
        .first()
        .copied()
        .ok_or_else(|| CbError::TypeMismatch("string index requires one index".to_string()))?;
    let mut chars: Vec<char> = s.chars().collect();
    if i < 0 || (i as usize) >= chars.len() {
        return Err(CbError::StringOutOfBounds { index: i, len: chars.len() });
    }
    let repl = match &rv.value {
        Value::Str(rs) => rs.chars().next().ok_or_else(|| CbError::TypeMismatch("empty string assigned to a character".to_string()))?,
        Value::Int(n) => char::from_u32(*n as u32).ok_or_else(|| CbError::TypeMismatch("invalid code point".to_string()))?,
        other => return Err(CbError::TypeMismatch(format!("cannot assign {:?} to a string index", other))),
    };
    chars[i as usize] = repl;
    *s = chars.into_iter().collect();
    Ok(TypedValue::new(Value::Str(repl.to_string()), TypeTag::Char))
}

