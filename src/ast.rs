// The AST handed to the evaluator by the lexer/parser (spec §6.2).
//
// Shaped the way the teacher's `ast::Expr`/`ast::Statement` are shaped —
// a recursive sum type with `Node<T> = Rc<T>` children and `Vec`/`AList`
// sequences — generalized with the arithmetic/struct/array/control-flow
// node kinds Cb needs that the teacher's small expression language
// didn't have.

use crate::diagnostics::SourceLocation;
use std::rc::Rc;

pub type Node<T> = Rc<T>;
pub type AList<T> = Vec<(String, T)>;

/// The closed `TypeInfo` tag set of spec §3.1. Array-ness is carried
/// alongside a `TypeRef`, never folded into this tag (the
/// `TYPE_ARRAY_BASE` offset the original source used is explicitly
/// dropped, per spec §9 / SPEC_FULL.md §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Tiny,
    Short,
    Int,
    Long,
    Bool,
    Char,
    String,
    Float,
    Double,
    Quad,
    Struct,
    Union,
    Interface,
    Enum,
    Unknown,
}

impl TypeTag {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeTag::Tiny | TypeTag::Short | TypeTag::Int | TypeTag::Long | TypeTag::Bool | TypeTag::Char
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeTag::Float | TypeTag::Double | TypeTag::Quad)
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Tiny => "tiny",
            TypeTag::Short => "short",
            TypeTag::Int => "int",
            TypeTag::Long => "long",
            TypeTag::Bool => "bool",
            TypeTag::Char => "char",
            TypeTag::String => "string",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::Quad => "quad",
            TypeTag::Struct => "struct",
            TypeTag::Union => "union",
            TypeTag::Interface => "interface",
            TypeTag::Enum => "enum",
            TypeTag::Unknown => "unknown",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Ne,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

/// A parsed type reference: `int`, `MyStruct`, `int[4]`, `int[4][2]`,
/// `T&`, `T*`. Dimension sizes are themselves expressions, since array
/// declarations may size off a previously declared `const`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeRef {
    pub base: TypeTag,
    pub name: Option<String>,
    pub is_unsigned: bool,
    pub array_dims: Vec<Node<Expr>>,
    pub is_reference: bool,
    pub is_pointer: bool,
}

impl TypeRef {
    pub fn scalar(base: TypeTag) -> TypeRef {
        TypeRef {
            base,
            name: None,
            is_unsigned: false,
            array_dims: Vec::new(),
            is_reference: false,
            is_pointer: false,
        }
    }

    pub fn named(base: TypeTag, name: &str) -> TypeRef {
        TypeRef {
            base,
            name: Some(name.to_string()),
            is_unsigned: false,
            array_dims: Vec::new(),
            is_reference: false,
            is_pointer: false,
        }
    }

    pub fn is_array(&self) -> bool {
        !self.array_dims.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(i64, TypeTag),
    FloatLiteral(f64, TypeTag),
    StringLiteral(String),
    BoolLiteral(bool),
    Null,
    Identifier(String),
    BinaryOp(BinOp, Node<Expr>, Node<Expr>),
    UnaryOp(UnOp, Node<Expr>),
    PreIncDec(IncDecOp, Node<Expr>),
    PostIncDec(IncDecOp, Node<Expr>),
    Assign(Node<Expr>, Node<Expr>),
    /// `lhs op= rhs`, desugared at parse time into `Assign(lhs, BinaryOp(op, lhs, rhs))`
    /// by the parser — kept here only for completeness of the closed tag set.
    ArrayRef(Node<Expr>, Vec<Node<Expr>>),
    ArrayLiteral(Vec<ArrayLitElem>),
    MemberAccess(Node<Expr>, String),
    MemberArrayAccess(Node<Expr>, String, Vec<Node<Expr>>),
    ArrowAccess(Node<Expr>, String),
    FuncCall(String, Vec<Node<Expr>>),
    MethodCall(Node<Expr>, String, Vec<Node<Expr>>),
    Ternary(Node<Expr>, Node<Expr>, Node<Expr>),
    Cast(TypeRef, Node<Expr>),
    StructLiteral(Vec<StructLitField>),
    EnumRef(String, String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArrayLitElem {
    Nested(Vec<ArrayLitElem>),
    Leaf(Node<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum StructLitField {
    Named(String, Node<Expr>),
    Positional(Node<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_ref: TypeRef,
    pub is_unsigned: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    VarDecl {
        name: String,
        type_ref: TypeRef,
        init: Option<Node<Expr>>,
        is_const: bool,
        is_static: bool,
    },
    MultipleVarDecl(Vec<Stmt>),
    ExprStmt(Node<Expr>),
    CompoundStmt(Vec<Node<StmtNode>>),
    If {
        cond: Node<Expr>,
        then_branch: Node<StmtNode>,
        else_branch: Option<Node<StmtNode>>,
    },
    While {
        cond: Node<Expr>,
        body: Node<StmtNode>,
    },
    For {
        init: Option<Node<StmtNode>>,
        cond: Option<Node<Expr>>,
        update: Option<Node<Expr>>,
        body: Node<StmtNode>,
    },
    Return(Option<Node<Expr>>),
    Break(Option<Node<Expr>>),
    Continue(Option<Node<Expr>>),
    Print(PrintKind, Vec<Node<Expr>>),
    Assert(Node<Expr>),
    FuncDecl(Node<FuncDef>),
    StructDecl(Node<StructDef>),
    EnumDecl(Node<EnumDef>),
    TypedefDecl(String, TypeRef),
    UnionTypedefDecl(String, Vec<UnionMember>),
    InterfaceDecl(Node<InterfaceDef>),
    ImplDecl(Node<ImplDef>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrintKind {
    Print,
    Println,
    Printf,
    Printlnf,
    PrintlnEmpty,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UnionMember {
    Int(i64),
    Str(String),
}

/// A statement paired with its source location, for diagnostics (line
/// number in `assert`, range-error messages, etc.)
#[derive(Clone, Debug, PartialEq)]
pub struct StmtNode {
    pub stmt: Stmt,
    pub loc: SourceLocation,
}

impl StmtNode {
    pub fn new(stmt: Stmt, loc: SourceLocation) -> Node<StmtNode> {
        Rc::new(StmtNode { stmt, loc })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncDef {
    pub name: String,
    pub return_type: TypeRef,
    pub params: Vec<Param>,
    pub body: Node<StmtNode>,
    /// Set by impl registration: the struct this method is attached to.
    pub type_name: Option<String>,
    pub qualified_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub type_ref: TypeRef,
    pub is_private: bool,
    pub is_const: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub members: Vec<StructMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodSig {
    pub name: String,
    pub return_type: TypeRef,
    pub params: Vec<Param>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDef {
    pub name: String,
    pub methods: Vec<MethodSig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImplDef {
    pub interface_name: String,
    pub struct_name: String,
    pub methods: Vec<Node<FuncDef>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<(String, i64)>,
}

/// A parsed top-level declaration, in source order. The driver (C8)
/// re-sorts these into the registration order of spec §4.8; the parser
/// itself imposes no ordering.
#[derive(Clone, Debug, PartialEq)]
pub enum TopLevel {
    Var(Stmt),
    Struct(Node<StructDef>),
    Enum(Node<EnumDef>),
    Typedef(String, TypeRef),
    UnionTypedef(String, Vec<UnionMember>),
    Interface(Node<InterfaceDef>),
    Impl(Node<ImplDef>),
    Func(Node<FuncDef>),
}

pub type Program = Vec<TopLevel>;
