// C7: Statement executor (spec §4.7). Every function here returns a
// `Flow` so `return`/`break`/`continue` thread back out through nested
// `if`/`while`/`for`/compound blocks without Rust-level exceptions.

use super::expr::coerce_and_range_check;
use super::{Flow, Interpreter, Result, ReturnValue};
use crate::array;
use crate::ast::{FuncDef, Node, Param, PrintKind, Stmt, StmtNode, TypeRef, TypeTag};
use crate::diagnostics::CbError;
use crate::value::{TypedValue, Value, VarFlag, Variable};

impl<'a> Interpreter<'a> {
    pub fn exec_block(&mut self, stmts: &[Node<StmtNode>]) -> Result<Flow> {
        self.env.push_scope();
        let result = self.exec_stmts(stmts);
        self.env.pop_scope();
        result
    }

    fn exec_stmts(&mut self, stmts: &[Node<StmtNode>]) -> Result<Flow> {
        for s in stmts {
            match self.exec_stmt(s)? {
                Flow::Normal => continue,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    pub fn exec_stmt(&mut self, node: &Node<StmtNode>) -> Result<Flow> {
        let loc = node.loc;
        match &node.stmt {
            Stmt::VarDecl { name, type_ref, init, is_const, is_static } => {
                self.exec_var_decl(name, type_ref, init.as_deref(), *is_const, *is_static, loc)?;
                Ok(Flow::Normal)
            }
            Stmt::MultipleVarDecl(decls) => {
                for d in decls {
                    if let Stmt::VarDecl { name, type_ref, init, is_const, is_static } = d {
                        self.exec_var_decl(name, type_ref, init.as_deref(), *is_const, *is_static, loc)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ExprStmt(e) => {
                self.eval_expr(e, loc)?;
                Ok(Flow::Normal)
            }
            Stmt::CompoundStmt(stmts) => self.exec_block(stmts),
            Stmt::If { cond, then_branch, else_branch } => {
                if self.eval_expr(cond, loc)?.value.as_bool()? {
                    self.exec_stmt(then_branch)
                } else if let Some(e) = else_branch {
                    self.exec_stmt(e)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => self.exec_while(cond, body, loc),
            Stmt::For { init, cond, update, body } => self.exec_for(init.as_deref(), cond.as_deref(), update.as_deref(), body, loc),
            Stmt::Return(e) => self.exec_return(e.as_deref(), loc),
            Stmt::Break(e) => match e {
                None => Ok(Flow::Break),
                Some(expr) => {
                    if self.eval_expr(expr, loc)?.value.as_bool()? {
                        Ok(Flow::Break)
                    } else {
                        Ok(Flow::Normal)
                    }
                }
            },
            Stmt::Continue(e) => match e {
                None => Ok(Flow::Continue),
                Some(expr) => {
                    if self.eval_expr(expr, loc)?.value.as_bool()? {
                        Ok(Flow::Continue)
                    } else {
                        Ok(Flow::Normal)
                    }
                }
            },
            Stmt::Print(kind, args) => {
                self.exec_print(*kind, args, loc)?;
                Ok(Flow::Normal)
            }
            Stmt::Assert(e) => {
                if !self.eval_expr(e, loc)?.value.as_bool()? {
                    return Err(CbError::AssertionFailed { line: loc.line });
                }
                Ok(Flow::Normal)
            }
            Stmt::FuncDecl(def) => {
                self.registry.register_function(def.clone());
                Ok(Flow::Normal)
            }
            Stmt::StructDecl(def) => {
                self.registry.register_struct(def.clone())?;
                Ok(Flow::Normal)
            }
            Stmt::EnumDecl(def) => {
                self.registry.register_enum(def.clone());
                Ok(Flow::Normal)
            }
            Stmt::TypedefDecl(name, target) => {
                self.types.register_typedef(name.clone(), target.clone());
                Ok(Flow::Normal)
            }
            Stmt::UnionTypedefDecl(name, members) => {
                self.types.register_union(name.clone(), members.clone());
                Ok(Flow::Normal)
            }
            Stmt::InterfaceDecl(def) => {
                self.registry.register_interface(def.clone());
                Ok(Flow::Normal)
            }
            Stmt::ImplDecl(def) => {
                self.registry.register_impl(&def.interface_name, &def.struct_name, &def.methods);
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_while(&mut self, cond: &crate::ast::Expr, body: &Node<StmtNode>, loc: crate::diagnostics::SourceLocation) -> Result<Flow> {
        loop {
            if !self.eval_expr(cond, loc)?.value.as_bool()? {
                return Ok(Flow::Normal);
            }
            match self.exec_stmt(body)? {
                Flow::Normal | Flow::Continue => continue,
                Flow::Break => return Ok(Flow::Normal),
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Node<StmtNode>>,
        cond: Option<&crate::ast::Expr>,
        update: Option<&crate::ast::Expr>,
        body: &Node<StmtNode>,
        loc: crate::diagnostics::SourceLocation,
    ) -> Result<Flow> {
        self.env.push_scope();
        let result = (|| -> Result<Flow> {
            if let Some(i) = init {
                match self.exec_stmt(i)? {
                    Flow::Normal => {}
                    other => return Ok(other),
                }
            }
            loop {
                if let Some(c) = cond {
                    if !self.eval_expr(c, loc)?.value.as_bool()? {
                        return Ok(Flow::Normal);
                    }
                }
                match self.exec_stmt(body)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => return Ok(Flow::Normal),
                    ret @ Flow::Return(_) => return Ok(ret),
                }
                if let Some(u) = update {
                    self.eval_expr(u, loc)?;
                }
            }
        })();
        self.env.pop_scope();
        result
    }

    fn exec_print(&mut self, kind: PrintKind, args: &[Node<crate::ast::Expr>], loc: crate::diagnostics::SourceLocation) -> Result<()> {
        use std::io::Write as _;
        match kind {
            PrintKind::PrintlnEmpty => {
                writeln!(self.out).ok();
                return Ok(());
            }
            PrintKind::Print | PrintKind::Println => {
                let mut out = String::new();
                for a in args {
                    out.push_str(&display_value(&self.eval_expr(a, loc)?.value));
                }
                if kind == PrintKind::Println {
                    out.push('\n');
                }
                write!(self.out, "{}", out).ok();
            }
            PrintKind::Printf | PrintKind::Printlnf => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval_expr(a, loc)?);
                }
                let fmt = match values.first() {
                    Some(v) => match &v.value {
                        Value::Str(s) => s.clone(),
                        other => display_value(other),
                    },
                    None => String::new(),
                };
                let rest = if values.is_empty() { &[][..] } else { &values[1..] };
                let mut out = format_string(&fmt, rest)?;
                if kind == PrintKind::Printlnf {
                    out.push('\n');
                }
                write!(self.out, "{}", out).ok();
            }
        }
        Ok(())
    }

    fn exec_var_decl(
        &mut self,
        name: &str,
        type_ref: &TypeRef,
        init: Option<&crate::ast::Expr>,
        is_const: bool,
        is_static: bool,
        loc: crate::diagnostics::SourceLocation,
    ) -> Result<()> {
        let (resolved, dims) = self.resolve_type(type_ref)?;
        if is_static {
            let func_name = self.current_function.clone();
            let needs_init = !self.env.is_static_initialized(&func_name, name);
            let computed = if needs_init {
                Some(self.build_decl_value(&resolved, &dims, init, is_const, loc)?)
            } else {
                None
            };
            self.env
                .declare_static(&func_name, name, || Ok(computed.expect("computed exactly when needed")))?;
        } else {
            let var = self.build_decl_value(&resolved, &dims, init, is_const, loc)?;
            self.env.define_local(name, var);
        }
        Ok(())
    }

    /// Shared by local `VarDecl` execution and global pre-registration
    /// in the driver (spec §4.8): builds the fully-flagged `Variable`
    /// a declaration produces, whether or not it has an initializer.
    pub(crate) fn build_decl_value(
        &mut self,
        resolved: &TypeRef,
        dims: &[usize],
        init: Option<&crate::ast::Expr>,
        is_const: bool,
        loc: crate::diagnostics::SourceLocation,
    ) -> Result<Variable> {
        let (value, assigned) = if !dims.is_empty() {
            match init {
                Some(crate::ast::Expr::ArrayLiteral(_)) | None => {
                    let v = match init {
                        Some(crate::ast::Expr::ArrayLiteral(elems)) => {
                            let wrapped = crate::ast::ArrayLitElem::Nested(elems.clone());
                            let data = array::build_from_literal(&wrapped, dims, &mut |expr| {
                                let v = self.eval_expr(expr, loc)?.value;
                                let (checked, warn) =
                                    coerce_and_range_check(resolved.base, resolved.is_unsigned, &v)?;
                                if let Some(w) = warn {
                                    self.trace.warn(&w);
                                }
                                Ok(checked)
                            })?;
                            Value::Array(crate::value::ArrayValue {
                                base_type: resolved.base,
                                dims: dims.to_vec(),
                                data,
                            })
                        }
                        None => self.zero_value(resolved, dims),
                        _ => unreachable!(),
                    };
                    (v, init.is_some())
                }
                Some(other_expr) => {
                    let rv = self.eval_expr(other_expr, loc)?;
                    match rv.value {
                        Value::Array(av) if av.dims == dims => (Value::Array(av), true),
                        Value::Array(av) => {
                            return Err(CbError::ArrayShapeMismatch(format!(
                                "cannot initialize array of shape {:?} from value of shape {:?}",
                                dims, av.dims
                            )))
                        }
                        _ => return Err(CbError::TypeMismatch("array declaration initialized from a non-array value".to_string())),
                    }
                }
            }
        } else if resolved.base == TypeTag::Struct {
            match init {
                Some(crate::ast::Expr::StructLiteral(fields)) => {
                    let name = resolved
                        .name
                        .clone()
                        .ok_or_else(|| CbError::TypeMismatch("struct declaration missing a type name".to_string()))?;
                    (self.build_struct_value(&name, fields, loc)?, true)
                }
                Some(other_expr) => {
                    let rv = self.eval_expr(other_expr, loc)?;
                    (rv.value, true)
                }
                None => (self.zero_value(resolved, dims), false),
            }
        } else {
            match init {
                Some(e) => {
                    let rv = self.eval_expr(e, loc)?;
                    let (checked, warn) = coerce_and_range_check(resolved.base, resolved.is_unsigned, &rv.value)?;
                    if let Some(w) = warn {
                        self.trace.warn(&w);
                    }
                    (checked, true)
                }
                None => (self.zero_value(resolved, dims), false),
            }
        };

        let mut var = Variable::new(resolved.base, value);
        var.dims = dims.to_vec();
        var.struct_type = resolved.name.clone();
        var = var
            .with_flag(VarFlag::Const, is_const)
            .with_flag(VarFlag::Unsigned, resolved.is_unsigned)
            .with_flag(VarFlag::Array, !dims.is_empty())
            .with_flag(VarFlag::Multidimensional, dims.len() > 1)
            .with_flag(VarFlag::Struct, resolved.base == TypeTag::Struct)
            .with_flag(VarFlag::Reference, resolved.is_reference)
            .with_flag(VarFlag::Pointer, resolved.is_pointer)
            .with_flag(VarFlag::Assigned, assigned);
        Ok(var)
    }

    fn exec_return(&mut self, expr: Option<&crate::ast::Expr>, loc: crate::diagnostics::SourceLocation) -> Result<Flow> {
        let return_type = self.current_return_type.clone();
        let resolved = match &return_type {
            Some(t) => self.resolve_type(t)?.0,
            None => TypeRef::scalar(TypeTag::Void),
        };

        if resolved.is_reference {
            let name = match expr {
                Some(crate::ast::Expr::Identifier(n)) => n.clone(),
                _ => {
                    return Err(CbError::TypeMismatch(
                        "a reference return must name a variable directly".to_string(),
                    ))
                }
            };
            let var = self
                .env
                .find_variable(&name)
                .cloned()
                .ok_or_else(|| CbError::UndefinedVariable(name.clone()))?;
            if !var.flags.contains(VarFlag::Reference) {
                return Err(CbError::TypeMismatch(format!(
                    "cannot return a reference to local variable '{}': it does not outlive the call",
                    name
                )));
            }
            return Ok(Flow::Return(ReturnValue::Reference(var)));
        }

        let rv = match expr {
            Some(e) => self.eval_expr(e, loc)?,
            None => TypedValue::new(Value::Null, TypeTag::Void),
        };

        let packaged = match &rv.value {
            Value::Array(av) => ReturnValue::Array3D {
                canonical: array::to_canonical_3d(av),
                base_type: av.base_type,
            },
            Value::Struct(sv) => {
                let var = Variable::new(TypeTag::Struct, Value::Struct(sv.clone()))
                    .with_flag(VarFlag::Struct, true);
                ReturnValue::Struct(var)
            }
            _ => ReturnValue::Scalar(rv),
        };
        Ok(Flow::Return(packaged))
    }

    /// Runs `def`'s body in a fresh scope with `args` bound to its
    /// parameters (spec §4.5/§4.7). `self_var`, when present, is bound
    /// under the name `"self"`; its post-call state is stashed in
    /// `self.last_self` for the method-call dispatcher to flush back
    /// into the receiver.
    pub(crate) fn call_function(
        &mut self,
        def: &Node<FuncDef>,
        args: Vec<TypedValue>,
        self_var: Option<Variable>,
        loc: crate::diagnostics::SourceLocation,
    ) -> Result<TypedValue> {
        if args.len() != def.params.len() {
            return Err(CbError::ArgumentCountMismatch {
                name: def.name.clone(),
                expected: def.params.len(),
                got: args.len(),
            });
        }

        let prev_function = std::mem::replace(&mut self.current_function, def.name.clone());
        let prev_impl_struct = std::mem::replace(&mut self.current_impl_struct, def.type_name.clone());
        let prev_return_type = std::mem::replace(&mut self.current_return_type, Some(def.return_type.clone()));

        self.env.push_scope();
        if let Some(sv) = self_var {
            self.env.define_local("self", sv);
        }
        for (param, arg) in def.params.iter().zip(args.into_iter()) {
            let var = self.bind_param(param, arg, loc)?;
            self.env.define_local(&param.name, var);
        }

        let flow = self.exec_stmts(std::slice::from_ref(&body_stmts(&def.body)));
        let self_after = self.env.find_variable("self").cloned();
        self.env.pop_scope();

        self.current_function = prev_function;
        self.current_impl_struct = prev_impl_struct;
        self.current_return_type = prev_return_type;
        self.last_self = self_after;

        let flow = flow?;
        self.unpack_return(flow, &def.return_type, loc)
    }

    fn bind_param(&mut self, param: &Param, arg: TypedValue, loc: crate::diagnostics::SourceLocation) -> Result<Variable> {
        let (resolved, dims) = self.resolve_type(&param.type_ref)?;
        if resolved.is_reference {
            // Parameters declared `T&` bind the caller's actual
            // variable state (a deep copy, since this implementation
            // has no live aliasing) and are flagged `Reference` so a
            // `return param;` inside the callee passes the
            // dangling-reference check in `exec_return`.
            let mut var = Variable::new(resolved.base, arg.value);
            var.dims = dims;
            var.struct_type = resolved.name.clone();
            var = var.with_flag(VarFlag::Reference, true).with_flag(VarFlag::Assigned, true);
            return Ok(var);
        }
        if !dims.is_empty() {
            match arg.value {
                Value::Array(av) => {
                    let mut var = Variable::new(resolved.base, Value::Array(av));
                    var.dims = dims;
                    var.struct_type = resolved.name.clone();
                    var = var.with_flag(VarFlag::Array, true).with_flag(VarFlag::Assigned, true);
                    return Ok(var);
                }
                _ => return Err(CbError::TypeMismatch(format!("parameter '{}' expects an array", param.name))),
            }
        }
        if resolved.base == TypeTag::Struct {
            let mut var = Variable::new(resolved.base, arg.value);
            var.struct_type = resolved.name.clone();
            var = var.with_flag(VarFlag::Struct, true).with_flag(VarFlag::Assigned, true);
            return Ok(var);
        }
        let (checked, warn) = coerce_and_range_check(resolved.base, resolved.is_unsigned, &arg.value)?;
        if let Some(w) = warn {
            self.trace.warn(&w);
        }
        let mut var = Variable::new(resolved.base, checked);
        var = var.with_flag(VarFlag::Unsigned, resolved.is_unsigned).with_flag(VarFlag::Assigned, true);
        let _ = loc;
        Ok(var)
    }

    fn unpack_return(&mut self, flow: Flow, declared: &TypeRef, loc: crate::diagnostics::SourceLocation) -> Result<TypedValue> {
        let (resolved, dims) = self.resolve_type(declared)?;
        let rv = match flow {
            Flow::Return(rv) => rv,
            Flow::Normal => ReturnValue::Scalar(TypedValue::new(Value::Null, TypeTag::Void)),
            Flow::Break | Flow::Continue => {
                return Err(CbError::TypeMismatch("break/continue escaped a function body".to_string()))
            }
        };
        match rv {
            ReturnValue::Scalar(tv) => {
                if resolved.base == TypeTag::Void {
                    return Ok(tv);
                }
                let (checked, warn) = coerce_and_range_check(resolved.base, resolved.is_unsigned, &tv.value)?;
                if let Some(w) = warn {
                    self.trace.warn(&w);
                }
                Ok(TypedValue::new(checked, resolved.base).unsigned(resolved.is_unsigned))
            }
            ReturnValue::Array3D { canonical, base_type } => {
                let arr = array::reshape_from_return(&canonical, &dims, base_type)?;
                Ok(TypedValue::new(Value::Array(arr), base_type))
            }
            ReturnValue::Struct(var) => {
                let _ = loc;
                Ok(TypedValue::new(var.value, TypeTag::Struct).with_struct_name(var.struct_type))
            }
            ReturnValue::Reference(var) => Ok(TypedValue::new(var.value, var.type_tag).unsigned(var.is_unsigned())),
        }
    }
}

fn body_stmts(body: &Node<StmtNode>) -> Node<StmtNode> {
    body.clone()
}

fn display_value(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Enum(i, _) => i.to_string(),
        Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

/// `%d %i %lld %s %c %%` with optional zero-padded width (spec's
/// ambient print/format family). Extra trailing arguments beyond the
/// format string's specifiers are appended space-separated, the way
/// a loosely-typed `printf` wrapper commonly behaves.
fn format_string(fmt: &str, args: &[TypedValue]) -> Result<String> {
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut arg_idx = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut width = String::new();
        let mut zero_pad = false;
        while let Some(&p) = chars.peek() {
            if p == '0' && width.is_empty() {
                zero_pad = true;
                chars.next();
            } else if p.is_ascii_digit() {
                width.push(p);
                chars.next();
            } else {
                break;
            }
        }
        let spec = chars.next().ok_or_else(|| CbError::TypeMismatch("dangling '%' at end of format string".to_string()))?;
        let formatted = match spec {
            '%' => "%".to_string(),
            'd' | 'i' => {
                let v = next_arg(args, &mut arg_idx)?;
                pad_numeric(&v.value.as_i64()?.to_string(), &width, zero_pad)
            }
            'l' => {
                // `%lld`: consume the rest of the "lld"/"ld" run.
                while matches!(chars.peek(), Some('l')) {
                    chars.next();
                }
                if chars.next() != Some('d') {
                    return Err(CbError::TypeMismatch("unsupported format specifier".to_string()));
                }
                let v = next_arg(args, &mut arg_idx)?;
                pad_numeric(&v.value.as_i64()?.to_string(), &width, zero_pad)
            }
            's' => {
                let v = next_arg(args, &mut arg_idx)?;
                display_value(&v.value)
            }
            'c' => {
                let v = next_arg(args, &mut arg_idx)?;
                match &v.value {
                    Value::Str(s) => s.clone(),
                    other => char::from_u32(other.as_i64()? as u32)
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                }
            }
            other => return Err(CbError::TypeMismatch(format!("unsupported format specifier '%{}'", other))),
        };
        out.push_str(&formatted);
    }

    for extra in &args[arg_idx..] {
        out.push(' ');
        out.push_str(&display_value(&extra.value));
    }
    Ok(out)
}

fn next_arg<'a>(args: &'a [TypedValue], idx: &mut usize) -> Result<&'a TypedValue> {
    let v = args
        .get(*idx)
        .ok_or_else(|| CbError::TypeMismatch("not enough arguments for format string".to_string()))?;
    *idx += 1;
    Ok(v)
}

fn pad_numeric(digits: &str, width: &str, zero_pad: bool) -> String {
    let w: usize = width.parse().unwrap_or(0);
    if digits.len() >= w {
        return digits.to_string();
    }
    let pad_char = if zero_pad { '0' } else { ' ' };
    let (sign, rest) = if let Some(stripped) = digits.strip_prefix('-') {
        ("-", stripped)
    } else {
        ("", digits)
    };
    let pad = pad_char.to_string().repeat(w - digits.len());
    if zero_pad {
        format!("{}{}{}", sign, pad, rest)
    } else {
        format!("{}{}", pad, digits)
    }
}
