// Ambient, out-of-core-scope recursive-descent parser (spec §1) that
// turns the `lexer` token stream into the AST of `ast.rs`/spec §6.2. Has
// no semantic opinions of its own — typedef resolution, struct-cycle
// checking, range checks and the rest all happen downstream in the
// evaluator.

use crate::ast::*;
use crate::diagnostics::{CbError, SourceLocation};
use crate::lexer::{SpannedToken, Token};

pub type Result<T> = std::result::Result<T, CbError>;

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Parser {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut program = Vec::new();
        while !self.check(&Token::Eof) {
            program.extend(self.parse_top_level()?);
        }
        Ok(program)
    }

    // --- token plumbing -----------------------------------------------

    fn tok_at(&self, i: usize) -> Token {
        self.tokens.get(i).map(|t| t.token.clone()).unwrap_or(Token::Eof)
    }

    fn peek_tok(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_loc(&self) -> SourceLocation {
        self.tokens[self.pos.min(self.tokens.len() - 1)].loc
    }

    fn check(&self, t: &Token) -> bool {
        self.peek_tok() == t
    }

    fn advance(&mut self) -> Token {
        let t = self.peek_tok().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: Token) -> bool {
        if self.check(&t) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: Token) -> Result<()> {
        if self.eat(t.clone()) {
            Ok(())
        } else {
            Err(CbError::ParseError(format!(
                "expected {:?}, found {:?} at {}",
                t,
                self.peek_tok(),
                self.peek_loc()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek_tok().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(CbError::ParseError(format!(
                "expected identifier, found {:?} at {}",
                other,
                self.peek_loc()
            ))),
        }
    }

    fn expect_int(&mut self) -> Result<i64> {
        let neg = self.eat(Token::Minus);
        match self.peek_tok().clone() {
            Token::Int(v) => {
                self.advance();
                Ok(if neg { -v } else { v })
            }
            other => Err(CbError::ParseError(format!(
                "expected integer literal, found {:?} at {}",
                other,
                self.peek_loc()
            ))),
        }
    }

    // --- types ----------------------------------------------------------

    fn is_type_keyword(t: &Token) -> bool {
        matches!(
            t,
            Token::KwInt
                | Token::KwLong
                | Token::KwShort
                | Token::KwTiny
                | Token::KwBool
                | Token::KwChar
                | Token::KwString
                | Token::KwFloat
                | Token::KwDouble
                | Token::KwQuad
                | Token::KwVoid
        )
    }

    fn looks_like_decl(&self) -> bool {
        let mut i = self.pos;
        if matches!(self.tok_at(i), Token::KwUnsigned) {
            i += 1;
        }
        match self.tok_at(i) {
            t if Self::is_type_keyword(&t) => {
                i += 1;
            }
            Token::KwStruct => {
                i += 1;
                if matches!(self.tok_at(i), Token::Ident(_)) {
                    i += 1;
                } else {
                    return false;
                }
            }
            Token::Ident(_) => {
                i += 1;
            }
            _ => return false,
        }
        loop {
            if matches!(self.tok_at(i), Token::LBracket) {
                let mut depth = 1;
                i += 1;
                while depth > 0 {
                    match self.tok_at(i) {
                        Token::LBracket => {
                            depth += 1;
                            i += 1;
                        }
                        Token::RBracket => {
                            depth -= 1;
                            i += 1;
                        }
                        Token::Eof => return false,
                        _ => {
                            i += 1;
                        }
                    }
                }
            } else {
                break;
            }
        }
        matches!(self.tok_at(i), Token::Ident(_))
    }

    fn parse_base_type(&mut self) -> Result<(TypeTag, Option<String>)> {
        let tag = match self.peek_tok().clone() {
            Token::KwVoid => TypeTag::Void,
            Token::KwTiny => TypeTag::Tiny,
            Token::KwShort => TypeTag::Short,
            Token::KwInt => TypeTag::Int,
            Token::KwLong => TypeTag::Long,
            Token::KwBool => TypeTag::Bool,
            Token::KwChar => TypeTag::Char,
            Token::KwString => TypeTag::String,
            Token::KwFloat => TypeTag::Float,
            Token::KwDouble => TypeTag::Double,
            Token::KwQuad => TypeTag::Quad,
            Token::KwStruct => {
                self.advance();
                let name = self.expect_ident()?;
                return Ok((TypeTag::Struct, Some(name)));
            }
            Token::Ident(name) => {
                self.advance();
                // Unknown covers typedef aliases, struct/interface/enum/union
                // names — resolved downstream by the type manager/registry.
                return Ok((TypeTag::Unknown, Some(name)));
            }
            other => {
                return Err(CbError::ParseError(format!(
                    "expected a type, found {:?} at {}",
                    other,
                    self.peek_loc()
                )))
            }
        };
        self.advance();
        Ok((tag, None))
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef> {
        let is_unsigned = self.eat(Token::KwUnsigned);
        let (base, name) = self.parse_base_type()?;
        let mut type_ref = TypeRef {
            base,
            name,
            is_unsigned,
            array_dims: Vec::new(),
            is_reference: false,
            is_pointer: false,
        };
        while self.eat(Token::LBracket) {
            if self.check(&Token::RBracket) {
                self.advance();
                // `T[]` — dynamic length, unsupported (spec §6.3); kept
                // parseable so the evaluator can raise
                // DynamicArrayNotSupported rather than the parser.
                type_ref.array_dims.push(Node::new(Expr::Number(-1, TypeTag::Int)));
            } else {
                let e = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                type_ref.array_dims.push(Node::new(e));
            }
        }
        if self.eat(Token::Amp) {
            type_ref.is_reference = true;
        }
        if self.eat(Token::Star) {
            type_ref.is_pointer = true;
        }
        Ok(type_ref)
    }

    // --- top level --------------------------------------------------

    fn parse_top_level(&mut self) -> Result<Vec<TopLevel>> {
        match self.peek_tok().clone() {
            Token::KwTypedef => self.parse_typedef(),
            Token::KwStruct => Ok(vec![TopLevel::Struct(self.parse_struct_def()?)]),
            Token::KwEnum => Ok(vec![TopLevel::Enum(self.parse_enum_def()?)]),
            Token::KwUnion => {
                let (name, members) = self.parse_union_typedef()?;
                Ok(vec![TopLevel::UnionTypedef(name, members)])
            }
            Token::KwInterface => Ok(vec![TopLevel::Interface(self.parse_interface_def()?)]),
            Token::KwImpl => Ok(vec![TopLevel::Impl(self.parse_impl_def()?)]),
            _ => {
                let stmt = self.parse_decl_like()?;
                Ok(match stmt {
                    Stmt::FuncDecl(f) => vec![TopLevel::Func(f)],
                    Stmt::MultipleVarDecl(decls) => decls.into_iter().map(TopLevel::Var).collect(),
                    other => vec![TopLevel::Var(other)],
                })
            }
        }
    }

    fn parse_struct_body(&mut self) -> Result<Vec<StructMember>> {
        self.expect(Token::LBrace)?;
        let mut members = Vec::new();
        let mut is_private = false;
        while !self.check(&Token::RBrace) {
            if self.eat(Token::KwPrivate) {
                self.expect(Token::Colon)?;
                is_private = true;
                continue;
            }
            if self.eat(Token::KwPublic) {
                self.expect(Token::Colon)?;
                is_private = false;
                continue;
            }
            let is_const = self.eat(Token::KwConst);
            let type_ref = self.parse_type_ref()?;
            let mname = self.expect_ident()?;
            self.expect(Token::Semi)?;
            members.push(StructMember {
                name: mname,
                type_ref,
                is_private,
                is_const,
            });
        }
        self.expect(Token::RBrace)?;
        Ok(members)
    }

    fn parse_struct_def(&mut self) -> Result<Node<StructDef>> {
        self.expect(Token::KwStruct)?;
        let name = self.expect_ident()?;
        let members = self.parse_struct_body()?;
        self.eat(Token::Semi);
        Ok(Node::new(StructDef { name, members }))
    }

    fn parse_typedef(&mut self) -> Result<Vec<TopLevel>> {
        self.expect(Token::KwTypedef)?;
        if self.check(&Token::KwStruct) {
            self.advance();
            let name = self.expect_ident()?;
            let members = self.parse_struct_body()?;
            let alias = self.expect_ident()?;
            self.expect(Token::Semi)?;
            let struct_def = Node::new(StructDef {
                name: name.clone(),
                members,
            });
            return Ok(vec![
                TopLevel::Struct(struct_def),
                TopLevel::Typedef(alias, TypeRef::named(TypeTag::Struct, &name)),
            ]);
        }
        let target = self.parse_type_ref()?;
        let alias = self.expect_ident()?;
        self.expect(Token::Semi)?;
        Ok(vec![TopLevel::Typedef(alias, target)])
    }

    fn parse_union_typedef(&mut self) -> Result<(String, Vec<UnionMember>)> {
        self.expect(Token::KwUnion)?;
        let name = self.expect_ident()?;
        self.expect(Token::Eq)?;
        let mut members = Vec::new();
        loop {
            match self.peek_tok().clone() {
                Token::Int(v) => {
                    self.advance();
                    members.push(UnionMember::Int(v));
                }
                Token::Str(s) => {
                    self.advance();
                    members.push(UnionMember::Str(s));
                }
                other => {
                    return Err(CbError::ParseError(format!(
                        "expected a literal union member, found {:?} at {}",
                        other,
                        self.peek_loc()
                    )))
                }
            }
            if self.eat(Token::Pipe) {
                continue;
            }
            break;
        }
        self.expect(Token::Semi)?;
        Ok((name, members))
    }

    fn parse_enum_def(&mut self) -> Result<Node<EnumDef>> {
        self.expect(Token::KwEnum)?;
        let name = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        let mut members = Vec::new();
        let mut next_val = 0i64;
        if !self.check(&Token::RBrace) {
            loop {
                let mname = self.expect_ident()?;
                if self.eat(Token::Eq) {
                    next_val = self.expect_int()?;
                }
                members.push((mname, next_val));
                next_val += 1;
                if self.eat(Token::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RBrace)?;
        self.eat(Token::Semi);
        Ok(Node::new(EnumDef { name, members }))
    }

    fn parse_interface_def(&mut self) -> Result<Node<InterfaceDef>> {
        self.expect(Token::KwInterface)?;
        let name = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&Token::RBrace) {
            let return_type = self.parse_type_ref()?;
            let mname = self.expect_ident()?;
            self.expect(Token::LParen)?;
            let params = self.parse_params()?;
            self.expect(Token::RParen)?;
            self.expect(Token::Semi)?;
            methods.push(MethodSig {
                name: mname,
                return_type,
                params,
            });
        }
        self.expect(Token::RBrace)?;
        self.eat(Token::Semi);
        Ok(Node::new(InterfaceDef { name, methods }))
    }

    fn parse_impl_def(&mut self) -> Result<Node<ImplDef>> {
        self.expect(Token::KwImpl)?;
        let interface_name = self.expect_ident()?;
        self.expect(Token::KwFor)?;
        let struct_name = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&Token::RBrace) {
            let return_type = self.parse_type_ref()?;
            let mname = self.expect_ident()?;
            self.expect(Token::LParen)?;
            let params = self.parse_params()?;
            self.expect(Token::RParen)?;
            let body = self.parse_compound_stmt()?;
            methods.push(Node::new(FuncDef {
                name: mname.clone(),
                return_type,
                params,
                body,
                type_name: Some(struct_name.clone()),
                qualified_name: Some(format!("{}::{}", struct_name, mname)),
            }));
        }
        self.expect(Token::RBrace)?;
        self.eat(Token::Semi);
        Ok(Node::new(ImplDef {
            interface_name,
            struct_name,
            methods,
        }))
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        if self.check(&Token::RParen) {
            return Ok(params);
        }
        loop {
            let type_ref = self.parse_type_ref()?;
            let name = self.expect_ident()?;
            let is_unsigned = type_ref.is_unsigned;
            params.push(Param {
                name,
                type_ref,
                is_unsigned,
            });
            if self.eat(Token::Comma) {
                continue;
            }
            break;
        }
        Ok(params)
    }

    /// Parses a variable declaration, a multi-declaration (`int a, b;`),
    /// or — if a `(` follows the name — a function definition. Both
    /// declaration flavors share a type+name prefix, so they're parsed
    /// together (spec's closed node-kind set allows `FuncDecl` wherever
    /// other declarations appear, not just at the top level).
    fn parse_decl_like(&mut self) -> Result<Stmt> {
        let is_const = self.eat(Token::KwConst);
        let is_static = self.eat(Token::KwStatic);
        let type_ref = self.parse_type_ref()?;
        let name = self.expect_ident()?;
        if self.check(&Token::LParen) {
            self.advance();
            let params = self.parse_params()?;
            self.expect(Token::RParen)?;
            let body = self.parse_compound_stmt()?;
            return Ok(Stmt::FuncDecl(Node::new(FuncDef {
                name,
                return_type: type_ref,
                params,
                body,
                type_name: None,
                qualified_name: None,
            })));
        }

        let mut decls = Vec::new();
        let mut cur_name = name;
        loop {
            let init = if self.eat(Token::Eq) {
                Some(Node::new(self.parse_assignment()?))
            } else {
                None
            };
            decls.push(Stmt::VarDecl {
                name: cur_name,
                type_ref: type_ref.clone(),
                init,
                is_const,
                is_static,
            });
            if self.eat(Token::Comma) {
                cur_name = self.expect_ident()?;
                continue;
            }
            break;
        }
        self.expect(Token::Semi)?;
        if decls.len() == 1 {
            Ok(decls.pop().unwrap())
        } else {
            Ok(Stmt::MultipleVarDecl(decls))
        }
    }

    // --- statements -----------------------------------------------------

    fn parse_compound_stmt(&mut self) -> Result<Node<StmtNode>> {
        let loc = self.peek_loc();
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(Token::RBrace)?;
        Ok(StmtNode::new(Stmt::CompoundStmt(stmts), loc))
    }

    fn parse_if(&mut self) -> Result<Node<StmtNode>> {
        let loc = self.peek_loc();
        self.expect(Token::KwIf)?;
        self.expect(Token::LParen)?;
        let cond = Node::new(self.parse_expr()?);
        self.expect(Token::RParen)?;
        let then_branch = self.parse_stmt()?;
        let else_branch = if self.eat(Token::KwElse) {
            Some(self.parse_stmt()?)
        } else {
            None
        };
        Ok(StmtNode::new(
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            },
            loc,
        ))
    }

    fn parse_while(&mut self) -> Result<Node<StmtNode>> {
        let loc = self.peek_loc();
        self.expect(Token::KwWhile)?;
        self.expect(Token::LParen)?;
        let cond = Node::new(self.parse_expr()?);
        self.expect(Token::RParen)?;
        let body = self.parse_stmt()?;
        Ok(StmtNode::new(Stmt::While { cond, body }, loc))
    }

    fn parse_for(&mut self) -> Result<Node<StmtNode>> {
        let loc = self.peek_loc();
        self.expect(Token::KwFor)?;
        self.expect(Token::LParen)?;
        let init = if self.check(&Token::Semi) {
            None
        } else if self.looks_like_decl() {
            Some(StmtNode::new(self.parse_decl_like()?, self.peek_loc()))
        } else {
            let e = self.parse_expr()?;
            self.expect(Token::Semi)?;
            Some(StmtNode::new(Stmt::ExprStmt(Node::new(e)), loc))
        };
        let cond = if self.check(&Token::Semi) {
            None
        } else {
            Some(Node::new(self.parse_expr()?))
        };
        self.expect(Token::Semi)?;
        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(Node::new(self.parse_expr()?))
        };
        self.expect(Token::RParen)?;
        let body = self.parse_stmt()?;
        Ok(StmtNode::new(
            Stmt::For {
                init,
                cond,
                update,
                body,
            },
            loc,
        ))
    }

    fn parse_print(&mut self) -> Result<Node<StmtNode>> {
        let loc = self.peek_loc();
        let kind = match self.advance() {
            Token::KwPrint => PrintKind::Print,
            Token::KwPrintln => PrintKind::Println,
            Token::KwPrintf => PrintKind::Printf,
            Token::KwPrintlnf => PrintKind::Printlnf,
            other => {
                return Err(CbError::ParseError(format!("not a print statement: {:?}", other)))
            }
        };
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(Node::new(self.parse_assignment()?));
                if self.eat(Token::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RParen)?;
        self.expect(Token::Semi)?;
        let kind = if kind == PrintKind::Println && args.is_empty() {
            PrintKind::PrintlnEmpty
        } else {
            kind
        };
        Ok(StmtNode::new(Stmt::Print(kind, args), loc))
    }

    fn parse_stmt(&mut self) -> Result<Node<StmtNode>> {
        let loc = self.peek_loc();
        match self.peek_tok().clone() {
            Token::LBrace => self.parse_compound_stmt(),
            Token::KwIf => self.parse_if(),
            Token::KwWhile => self.parse_while(),
            Token::KwFor => self.parse_for(),
            Token::KwReturn => {
                self.advance();
                let e = if self.check(&Token::Semi) {
                    None
                } else {
                    Some(Node::new(self.parse_expr()?))
                };
                self.expect(Token::Semi)?;
                Ok(StmtNode::new(Stmt::Return(e), loc))
            }
            Token::KwBreak => {
                self.advance();
                let e = if self.check(&Token::Semi) {
                    None
                } else {
                    Some(Node::new(self.parse_expr()?))
                };
                self.expect(Token::Semi)?;
                Ok(StmtNode::new(Stmt::Break(e), loc))
            }
            Token::KwContinue => {
                self.advance();
                let e = if self.check(&Token::Semi) {
                    None
                } else {
                    Some(Node::new(self.parse_expr()?))
                };
                self.expect(Token::Semi)?;
                Ok(StmtNode::new(Stmt::Continue(e), loc))
            }
            Token::KwAssert => {
                self.advance();
                let e = Node::new(self.parse_expr()?);
                self.expect(Token::Semi)?;
                Ok(StmtNode::new(Stmt::Assert(e), loc))
            }
            Token::KwPrint | Token::KwPrintln | Token::KwPrintf | Token::KwPrintlnf => self.parse_print(),
            Token::KwStruct => Ok(StmtNode::new(Stmt::StructDecl(self.parse_struct_def()?), loc)),
            Token::KwEnum => Ok(StmtNode::new(Stmt::EnumDecl(self.parse_enum_def()?), loc)),
            Token::KwInterface => Ok(StmtNode::new(Stmt::InterfaceDecl(self.parse_interface_def()?), loc)),
            Token::KwImpl => Ok(StmtNode::new(Stmt::ImplDecl(self.parse_impl_def()?), loc)),
            Token::KwUnion => {
                let (name, members) = self.parse_union_typedef()?;
                Ok(StmtNode::new(Stmt::UnionTypedefDecl(name, members), loc))
            }
            Token::KwTypedef => {
                let decls = self.parse_typedef()?;
                // Nested `typedef struct` expands to two items; only
                // the plain-alias form is representable as a single
                // statement node, which is the only form that shows up
                // inside a function body in practice.
                match decls.into_iter().next() {
                    Some(TopLevel::Typedef(alias, target)) => {
                        Ok(StmtNode::new(Stmt::TypedefDecl(alias, target), loc))
                    }
                    Some(TopLevel::Struct(def)) => Ok(StmtNode::new(Stmt::StructDecl(def), loc)),
                    _ => unreachable!(),
                }
            }
            _ if self.looks_like_decl() => {
                let s = self.parse_decl_like()?;
                Ok(StmtNode::new(s, loc))
            }
            _ => {
                let e = self.parse_expr()?;
                self.expect(Token::Semi)?;
                Ok(StmtNode::new(Stmt::ExprStmt(Node::new(e)), loc))
            }
        }
    }

    // --- expressions ------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let lhs = self.parse_ternary()?;
        let compound = match self.peek_tok() {
            Token::Eq => None,
            Token::PlusEq => Some(BinOp::Add),
            Token::MinusEq => Some(BinOp::Sub),
            Token::StarEq => Some(BinOp::Mul),
            Token::SlashEq => Some(BinOp::Div),
            Token::PercentEq => Some(BinOp::Mod),
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_assignment()?;
        match compound {
            None => Ok(Expr::Assign(Node::new(lhs), Node::new(rhs))),
            Some(op) => Ok(Expr::Assign(
                Node::new(lhs.clone()),
                Node::new(Expr::BinaryOp(op, Node::new(lhs), Node::new(rhs))),
            )),
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let cond = self.parse_or()?;
        if self.eat(Token::Question) {
            let t = self.parse_assignment()?;
            self.expect(Token::Colon)?;
            let f = self.parse_assignment()?;
            Ok(Expr::Ternary(Node::new(cond), Node::new(t), Node::new(f)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut l = self.parse_and()?;
        while self.eat(Token::OrOr) {
            let r = self.parse_and()?;
            l = Expr::BinaryOp(BinOp::Or, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut l = self.parse_bitor()?;
        while self.eat(Token::AndAnd) {
            let r = self.parse_bitor()?;
            l = Expr::BinaryOp(BinOp::And, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        let mut l = self.parse_bitxor()?;
        while self.eat(Token::Pipe) {
            let r = self.parse_bitxor()?;
            l = Expr::BinaryOp(BinOp::BitOr, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        let mut l = self.parse_bitand()?;
        while self.eat(Token::Caret) {
            let r = self.parse_bitand()?;
            l = Expr::BinaryOp(BinOp::BitXor, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        let mut l = self.parse_eq()?;
        while self.eat(Token::Amp) {
            let r = self.parse_eq()?;
            l = Expr::BinaryOp(BinOp::BitAnd, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_eq(&mut self) -> Result<Expr> {
        let mut l = self.parse_rel()?;
        loop {
            let op = match self.peek_tok() {
                Token::EqEq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let r = self.parse_rel()?;
            l = Expr::BinaryOp(op, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_rel(&mut self) -> Result<Expr> {
        let mut l = self.parse_shift()?;
        loop {
            let op = match self.peek_tok() {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Lte,
                Token::Ge => BinOp::Gte,
                _ => break,
            };
            self.advance();
            let r = self.parse_shift()?;
            l = Expr::BinaryOp(op, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        let mut l = self.parse_add()?;
        loop {
            let op = match self.peek_tok() {
                Token::Shl => BinOp::Shl,
                Token::Shr => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let r = self.parse_add()?;
            l = Expr::BinaryOp(op, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut l = self.parse_mul()?;
        loop {
            let op = match self.peek_tok() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let r = self.parse_mul()?;
            l = Expr::BinaryOp(op, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut l = self.parse_unary()?;
        loop {
            let op = match self.peek_tok() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let r = self.parse_unary()?;
            l = Expr::BinaryOp(op, Node::new(l), Node::new(r));
        }
        Ok(l)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek_tok() {
            Token::Minus => {
                self.advance();
                Ok(Expr::UnaryOp(UnOp::Neg, Node::new(self.parse_unary()?)))
            }
            Token::Bang => {
                self.advance();
                Ok(Expr::UnaryOp(UnOp::Not, Node::new(self.parse_unary()?)))
            }
            Token::Tilde => {
                self.advance();
                Ok(Expr::UnaryOp(UnOp::BitNot, Node::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.advance();
                self.parse_unary()
            }
            Token::PlusPlus => {
                self.advance();
                Ok(Expr::PreIncDec(IncDecOp::Inc, Node::new(self.parse_unary()?)))
            }
            Token::MinusMinus => {
                self.advance();
                Ok(Expr::PreIncDec(IncDecOp::Dec, Node::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_index_list(&mut self) -> Result<Vec<Node<Expr>>> {
        let mut indices = Vec::new();
        while self.check(&Token::LBracket) {
            self.advance();
            let e = self.parse_expr()?;
            self.expect(Token::RBracket)?;
            indices.push(Node::new(e));
        }
        Ok(indices)
    }

    fn parse_args(&mut self) -> Result<Vec<Node<Expr>>> {
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(Node::new(self.parse_assignment()?));
                if self.eat(Token::Comma) {
                    continue;
                }
                break;
            }
        }
        Ok(args)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_tok().clone() {
                Token::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    if self.check(&Token::LParen) {
                        self.advance();
                        let args = self.parse_args()?;
                        self.expect(Token::RParen)?;
                        expr = Expr::MethodCall(Node::new(expr), name, args);
                    } else if self.check(&Token::LBracket) {
                        let indices = self.parse_index_list()?;
                        expr = Expr::MemberArrayAccess(Node::new(expr), name, indices);
                    } else {
                        expr = Expr::MemberAccess(Node::new(expr), name);
                    }
                }
                Token::Arrow => {
                    self.advance();
                    let name = self.expect_ident()?;
                    if self.check(&Token::LParen) {
                        self.advance();
                        let args = self.parse_args()?;
                        self.expect(Token::RParen)?;
                        expr = Expr::MethodCall(Node::new(expr), name, args);
                    } else {
                        expr = Expr::ArrowAccess(Node::new(expr), name);
                    }
                }
                Token::LBracket => {
                    let indices = self.parse_index_list()?;
                    expr = Expr::ArrayRef(Node::new(expr), indices);
                }
                Token::PlusPlus => {
                    self.advance();
                    expr = Expr::PostIncDec(IncDecOp::Inc, Node::new(expr));
                }
                Token::MinusMinus => {
                    self.advance();
                    expr = Expr::PostIncDec(IncDecOp::Dec, Node::new(expr));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn is_cast_ahead(&self) -> bool {
        let mut i = self.pos + 1;
        if matches!(self.tok_at(i), Token::KwUnsigned) {
            i += 1;
        }
        if !Self::is_type_keyword(&self.tok_at(i)) {
            return false;
        }
        i += 1;
        matches!(self.tok_at(i), Token::RParen)
    }

    fn parse_array_literal(&mut self) -> Result<Expr> {
        self.expect(Token::LBracket)?;
        let mut elems = Vec::new();
        if !self.check(&Token::RBracket) {
            loop {
                let elem = if self.check(&Token::LBracket) {
                    match self.parse_array_literal()? {
                        Expr::ArrayLiteral(inner) => ArrayLitElem::Nested(inner),
                        _ => unreachable!(),
                    }
                } else {
                    ArrayLitElem::Leaf(Node::new(self.parse_assignment()?))
                };
                elems.push(elem);
                if self.eat(Token::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RBracket)?;
        Ok(Expr::ArrayLiteral(elems))
    }

    fn parse_struct_literal(&mut self) -> Result<Expr> {
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        if !self.check(&Token::RBrace) {
            loop {
                if let Token::Ident(name) = self.peek_tok().clone() {
                    if self.tok_at(self.pos + 1) == Token::Colon {
                        self.advance();
                        self.advance();
                        let e = self.parse_assignment()?;
                        fields.push(StructLitField::Named(name, Node::new(e)));
                        if self.eat(Token::Comma) {
                            continue;
                        }
                        break;
                    }
                }
                let e = self.parse_assignment()?;
                fields.push(StructLitField::Positional(Node::new(e)));
                if self.eat(Token::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(Expr::StructLiteral(fields))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek_tok().clone() {
            Token::Int(v) => {
                self.advance();
                Ok(Expr::Number(v, TypeTag::Int))
            }
            Token::Float(v) => {
                self.advance();
                Ok(Expr::FloatLiteral(v, TypeTag::Double))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::StringLiteral(s))
            }
            Token::KwTrue => {
                self.advance();
                Ok(Expr::BoolLiteral(true))
            }
            Token::KwFalse => {
                self.advance();
                Ok(Expr::BoolLiteral(false))
            }
            Token::KwNull => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::KwSelf => {
                self.advance();
                Ok(Expr::Identifier("self".to_string()))
            }
            Token::LParen => {
                if self.is_cast_ahead() {
                    self.advance();
                    let type_ref = self.parse_type_ref()?;
                    self.expect(Token::RParen)?;
                    let e = self.parse_unary()?;
                    Ok(Expr::Cast(type_ref, Node::new(e)))
                } else {
                    self.advance();
                    let e = self.parse_expr()?;
                    self.expect(Token::RParen)?;
                    Ok(e)
                }
            }
            Token::LBracket => self.parse_array_literal(),
            Token::LBrace => self.parse_struct_literal(),
            Token::Ident(name) => {
                self.advance();
                if self.check(&Token::ColonColon) {
                    self.advance();
                    let member = self.expect_ident()?;
                    Ok(Expr::EnumRef(name, member))
                } else if self.check(&Token::LParen) {
                    self.advance();
                    let args = self.parse_args()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::FuncCall(name, args))
                } else {
                    Ok(Expr::Identifier(name))
                }
            }
            other => Err(CbError::ParseError(format!(
                "unexpected token {:?} at {}",
                other,
                self.peek_loc()
            ))),
        }
    }
}

pub fn parse(source: &str) -> Result<Program> {
    let tokens = crate::lexer::Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr_str(text: &str) -> Expr {
        let tokens = crate::lexer::Lexer::new(text).tokenize().unwrap();
        let mut p = Parser::new(tokens);
        p.parse_expr().unwrap()
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let e = parse_expr_str("3 + 4 * 5");
        assert_eq!(
            e,
            Expr::BinaryOp(
                BinOp::Add,
                Node::new(Expr::Number(3, TypeTag::Int)),
                Node::new(Expr::BinaryOp(
                    BinOp::Mul,
                    Node::new(Expr::Number(4, TypeTag::Int)),
                    Node::new(Expr::Number(5, TypeTag::Int))
                ))
            )
        );
    }

    #[test]
    fn parses_array_literal() {
        let e = parse_expr_str("[[1,2,3],[4,5,6]]");
        match e {
            Expr::ArrayLiteral(outer) => assert_eq!(outer.len(), 2),
            _ => panic!("expected array literal"),
        }
    }

    #[test]
    fn parses_method_call() {
        let e = parse_expr_str("c.next()");
        match e {
            Expr::MethodCall(_, name, args) => {
                assert_eq!(name, "next");
                assert!(args.is_empty());
            }
            _ => panic!("expected method call"),
        }
    }

    #[test]
    fn parses_full_program() {
        let program = parse(
            "int a = 10; int b = 5; int main() { println(a + b); return 0; }",
        )
        .unwrap();
        assert_eq!(program.len(), 3);
    }
}
