//! The abstract syntax tree. Nodes are discriminated variants carrying their
//! source span; children are reference counted so that later compilation
//! stages can hold on to the syntax they were created from without tying
//! their lifetime to the tree.

use crate::keywords::Kw;
use crate::token::{Bit, DirectiveKind, LiteralBase, Op, TimeUnit, Token};
use mead_common::name::{Name, RcStr};
use mead_common::source::{Span, Spanned};
use std::rc::Rc;

/// A processed compiler directive, kept around as token trivia so that the
/// original source text remains reconstructible.
#[derive(Clone, Debug)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Every token consumed as part of the directive, in source order,
    /// starting with the directive token itself.
    pub tokens: Vec<Token>,
}

impl Directive {
    pub fn new(kind: DirectiveKind, tokens: Vec<Token>) -> Directive {
        Directive {
            kind: kind,
            tokens: tokens,
        }
    }

    /// Reconstruct the original source text of this directive.
    pub fn write_to(&self, out: &mut String) {
        for token in &self.tokens {
            token.write_to(out);
        }
    }
}

/// The root node of a parsed file.
#[derive(Debug)]
pub struct SourceUnit {
    pub members: Vec<Rc<Member>>,
    pub span: Span,
}

/// An item that can appear in a compilation unit, module, or package body.
#[derive(Debug)]
pub struct Member {
    pub kind: MemberKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum MemberKind {
    Module(Rc<ModuleDecl>),
    Package(Rc<PackageDecl>),
    Import(ImportDecl),
    Param(Rc<ParamDecl>),
    Data(DataDecl),
    Net(NetDecl),
    Typedef(TypedefDecl),
    Subroutine(Rc<SubroutineDecl>),
    Instantiation(Instantiation),
    ContAssign(ContAssign),
    ProceduralBlock(ProceduralBlock),
    GenerateRegion(Vec<Rc<Member>>),
    Empty,
}

/// Whether a hierarchy definition is a module, interface, or program.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModuleKind {
    Module,
    Interface,
    Program,
}

impl ModuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::Module => "module",
            ModuleKind::Interface => "interface",
            ModuleKind::Program => "program",
        }
    }
}

/// A module, interface, or program declaration.
#[derive(Debug)]
pub struct ModuleDecl {
    pub kind: ModuleKind,
    pub lifetime: Option<Kw>,
    pub name: Spanned<Name>,
    /// Declarations from the `#(...)` parameter port list.
    pub param_ports: Vec<Rc<ParamDecl>>,
    /// ANSI port declarations, shape only.
    pub ports: Vec<PortDecl>,
    pub members: Vec<Rc<Member>>,
}

/// An ANSI port declaration shell.
#[derive(Debug)]
pub struct PortDecl {
    pub dir: Option<Kw>,
    pub ty: Option<Rc<DataType>>,
    pub name: Spanned<Name>,
    pub dims: Vec<Rc<Dimension>>,
    pub span: Span,
}

/// A package declaration.
#[derive(Debug)]
pub struct PackageDecl {
    pub name: Spanned<Name>,
    pub members: Vec<Rc<Member>>,
}

/// A package import declaration, e.g. `import p::*;`.
#[derive(Debug)]
pub struct ImportDecl {
    pub items: Vec<ImportItem>,
}

#[derive(Debug)]
pub struct ImportItem {
    pub package: Spanned<Name>,
    /// `None` stands for a wildcard import.
    pub item: Option<Spanned<Name>>,
    pub span: Span,
}

/// A parameter or localparam declaration.
#[derive(Debug)]
pub struct ParamDecl {
    /// The `parameter` or `localparam` keyword; `None` inside a parameter
    /// port list where the keyword of the preceding declaration is inherited.
    pub keyword: Option<Kw>,
    pub ty: Rc<DataType>,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

/// A variable declaration.
#[derive(Debug)]
pub struct DataDecl {
    pub konst: bool,
    pub ty: Rc<DataType>,
    pub declarators: Vec<Declarator>,
}

/// A net declaration.
#[derive(Debug)]
pub struct NetDecl {
    pub net_type: Kw,
    pub ty: Rc<DataType>,
    pub declarators: Vec<Declarator>,
}

/// A single name being declared, with optional unpacked dimensions and an
/// optional initializer.
#[derive(Debug)]
pub struct Declarator {
    pub name: Spanned<Name>,
    pub dims: Vec<Rc<Dimension>>,
    pub init: Option<Rc<Expr>>,
    pub span: Span,
}

/// A typedef declaration.
#[derive(Debug)]
pub struct TypedefDecl {
    pub ty: Rc<DataType>,
    pub name: Spanned<Name>,
    pub dims: Vec<Rc<Dimension>>,
}

/// A task or function declaration.
#[derive(Debug)]
pub struct SubroutineDecl {
    pub is_task: bool,
    pub lifetime: Option<Kw>,
    /// The return type; `None` for tasks and implicit-return functions.
    pub return_ty: Option<Rc<DataType>>,
    pub name: Spanned<Name>,
    pub args: Vec<FormalArg>,
    /// Body statements are consumed but not modeled.
    pub span: Span,
}

/// A formal argument of a subroutine.
#[derive(Debug)]
pub struct FormalArg {
    pub dir: Option<Kw>,
    pub ty: Rc<DataType>,
    pub name: Spanned<Name>,
    pub default: Option<Rc<Expr>>,
    pub span: Span,
}

/// A hierarchy instantiation, e.g. `foo #(.N(4)) f1(), f2();`.
#[derive(Debug)]
pub struct Instantiation {
    pub target: Spanned<Name>,
    pub params: Vec<(Option<Spanned<Name>>, Option<Rc<Expr>>)>,
    pub instances: Vec<InstanceDecl>,
}

#[derive(Debug)]
pub struct InstanceDecl {
    pub name: Spanned<Name>,
    pub conns: Vec<(Option<Spanned<Name>>, Option<Rc<Expr>>)>,
    pub span: Span,
}

/// A continuous assignment.
#[derive(Debug)]
pub struct ContAssign {
    pub assignments: Vec<Rc<Expr>>,
}

/// A procedural block; the body is consumed but only its assignments are
/// retained.
#[derive(Debug)]
pub struct ProceduralBlock {
    pub kind: ProceduralBlockKind,
    pub stmts: Vec<Rc<Expr>>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProceduralBlockKind {
    Initial,
    Final,
    Always,
    AlwaysComb,
    AlwaysFf,
    AlwaysLatch,
}

/// A data type as written in the source.
#[derive(Debug)]
pub struct DataType {
    pub kind: DataTypeKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum DataTypeKind {
    /// An implicit type, e.g. just a signing and/or packed dimensions.
    Implicit {
        signing: Option<Kw>,
        dims: Vec<Rc<Dimension>>,
    },
    /// `bit`, `logic`, or `reg` with optional signing and packed dimensions.
    IntVec {
        kw: Kw,
        signing: Option<Kw>,
        dims: Vec<Rc<Dimension>>,
    },
    /// `byte`, `shortint`, `int`, `longint`, `integer`, or `time`.
    IntAtom { kw: Kw, signing: Option<Kw> },
    /// `shortreal`, `real`, or `realtime`.
    Real { kw: Kw },
    String,
    Chandle,
    Event,
    Void,
    /// A struct or union with its member declarations.
    StructUnion {
        is_union: bool,
        packed: bool,
        signing: Option<Kw>,
        members: Vec<StructMemberDecl>,
        dims: Vec<Rc<Dimension>>,
    },
    /// An enum with optional base type.
    Enum {
        base: Option<Rc<DataType>>,
        variants: Vec<EnumVariant>,
        dims: Vec<Rc<Dimension>>,
    },
    /// A named (user-defined) type, possibly scoped.
    Named { name: NameRef, dims: Vec<Rc<Dimension>> },
}

#[derive(Debug)]
pub struct StructMemberDecl {
    pub ty: Rc<DataType>,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

#[derive(Debug)]
pub struct EnumVariant {
    pub name: Spanned<Name>,
    pub init: Option<Rc<Expr>>,
}

/// A packed or unpacked dimension.
#[derive(Debug)]
pub struct Dimension {
    pub kind: DimKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum DimKind {
    /// `[msb:lsb]`
    Range(Rc<Expr>, Rc<Expr>),
    /// `[size]`
    Size(Rc<Expr>),
    /// `[]`
    Unsized,
}

/// An expression.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum ExprKind {
    Literal(Lit),
    Name(NameRef),
    Paren(Rc<Expr>),
    Unary {
        op: UnaryOp,
        expr: Rc<Expr>,
    },
    Binary {
        op: Op,
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    },
    Assign {
        /// The operator for compound assignments, `None` for plain `=`.
        op: Option<Op>,
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    },
    Ternary {
        cond: Rc<Expr>,
        true_expr: Rc<Expr>,
        false_expr: Rc<Expr>,
    },
    Concat {
        exprs: Vec<Rc<Expr>>,
    },
    /// `{N{x}}`
    Replication {
        count: Rc<Expr>,
        concat: Rc<Expr>,
    },
    MemberAccess {
        value: Rc<Expr>,
        member: Spanned<Name>,
    },
    ElementSelect {
        value: Rc<Expr>,
        index: Rc<Expr>,
    },
    RangeSelect {
        value: Rc<Expr>,
        kind: RangeSelectKind,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Invocation {
        callee: Rc<Expr>,
        args: Vec<Rc<Expr>>,
    },
    /// `'{...}` assignment pattern, shape only.
    AssignmentPattern {
        exprs: Vec<Rc<Expr>>,
    },
    /// A data type in expression position, e.g. as argument to `$bits`.
    DataType(Rc<DataType>),
}

/// The different literals.
#[derive(Clone, Debug)]
pub enum Lit {
    Int(i32),
    /// A sized vector literal; the digit text is decoded during binding.
    Vector {
        size: Option<u32>,
        signed: bool,
        base: LiteralBase,
        digits: RcStr,
    },
    UnbasedUnsized(Bit),
    Real(f64),
    Time { value: f64, unit: TimeUnit },
    Str(RcStr),
    Null,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Plus,
    Minus,
    LogicNot,
    BitNot,
    RedAnd,
    RedOr,
    RedXor,
    RedNand,
    RedNor,
    RedXnor,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RangeSelectKind {
    /// `[l:r]`
    Simple,
    /// `[l+:w]`
    IndexedUp,
    /// `[l-:w]`
    IndexedDown,
}

/// A possibly scoped name as it appears in expression position.
#[derive(Clone, Debug)]
pub enum NameRef {
    Ident(Spanned<Name>),
    System(Spanned<Name>),
    /// `package::item`
    Scoped {
        scope: Spanned<Name>,
        item: Spanned<Name>,
    },
}

impl NameRef {
    pub fn span(&self) -> Span {
        match self {
            NameRef::Ident(n) | NameRef::System(n) => n.span,
            NameRef::Scoped { scope, item } => Span::union(scope.span, item.span),
        }
    }
}
