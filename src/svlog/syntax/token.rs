//! Defines all tokens that may result from performing lexical analysis on a
//! SystemVerilog source file, together with the trivia model that makes the
//! token stream a lossless representation of the input text.

use crate::ast;
use crate::keywords::Kw;
use mead_common::name::{Name, RcStr};
use mead_common::source::{Location, Span};
use std::fmt;
use std::rc::Rc;

/// The kind of a lexical token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TokenKind {
    // Markers
    Eof,
    EndOfDirective,
    Unknown,
    /// A zero-width placeholder for an omitted macro argument.
    EmptyMacroArgument,

    // Identifiers and literals
    Ident,
    SysIdent,
    EscIdent,
    StringLiteral,
    IntegerLiteral,
    IntegerBase,
    UnbasedUnsizedLiteral,
    RealLiteral,
    TimeLiteral,
    OneStep,
    IncludeFileName,

    // Punctuation
    Comma,
    Period,
    PeriodStar,
    Semicolon,
    Colon,
    ColonEquals,
    ColonSlash,
    Namespace,
    StarNamespaceStar,
    AddColon,
    SubColon,
    Hashtag,
    DoubleHashtag,
    Ternary,
    At,
    AtStar,
    DoubleAt,
    Dollar,
    Apostrophe,
    ApostropheOpenBrace,
    OpenAttr,
    CloseAttr,
    OpenCloseAttr,

    /// An opening delimiter.
    OpenDelim(DelimKind),
    /// A closing delimiter.
    CloseDelim(DelimKind),
    /// An operator.
    Operator(Op),
    /// A keyword under the active keyword version.
    Keyword(Kw),
    /// A compiler directive, including macro usages.
    Directive(DirectiveKind),

    // Macro punctuation
    MacroQuote,
    MacroEscapedQuote,
    MacroPaste,
}

impl TokenKind {
    /// Check whether this kind can begin a directive trivia chain.
    pub fn is_directive(self) -> bool {
        match self {
            TokenKind::Directive(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TokenKind::Keyword(kw) => write!(f, "{}", kw),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// A delimiter token such as parentheses or brackets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DelimKind {
    /// A round parenthesis `(` or `)`.
    Paren,
    /// A square bracket `[` or `]`.
    Brack,
    /// A curly brace `{` or `}`.
    Brace,
}

/// The operators of the language.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Op {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Inc,
    Dec,

    // Assignment
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,
    AssignBitAnd,
    AssignBitOr,
    AssignBitXor,
    AssignLogicShL,
    AssignLogicShR,
    AssignArithShL,
    AssignArithShR,

    // Logic
    LogicNot,
    LogicAnd,
    LogicOr,
    LogicImpl,
    LogicEquiv,
    LogicEq,
    LogicNeq,
    CaseEq,
    CaseNeq,
    WildcardEq,
    WildcardNeq,

    // Relational
    Lt,
    Leq,
    Gt,
    Geq,

    // Bitwise
    BitNot,
    BitAnd,
    BitNand,
    BitOr,
    BitNor,
    BitXor,
    BitXnor,
    BitNxor,

    // Shift
    LogicShL,
    LogicShR,
    ArithShL,
    ArithShR,

    // Sequence
    SeqImplOl,
    SeqImplNol,
    SeqFollowOl,
    SeqFollowNol,

    // Others
    TripleAnd,
    MinusDoubleArrow,
    EqArrow,
    StarArrow,
}

/// The known compiler directives. Unrecognized directive names are treated as
/// macro usages; whether such a macro actually exists is decided by the
/// preprocessor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DirectiveKind {
    BeginKeywords,
    EndKeywords,
    CellDefine,
    EndCellDefine,
    DefaultNetType,
    Define,
    Else,
    ElsIf,
    EndIf,
    IfDef,
    IfNDef,
    Include,
    Line,
    NoUnconnectedDrive,
    Pragma,
    ResetAll,
    Timescale,
    UnconnectedDrive,
    Undef,
    UndefineAll,
    MacroUsage,
    Unknown,
}

impl DirectiveKind {
    /// Classify a directive name (without the leading backtick).
    pub fn from_str(name: &str) -> DirectiveKind {
        match name {
            "begin_keywords" => DirectiveKind::BeginKeywords,
            "end_keywords" => DirectiveKind::EndKeywords,
            "celldefine" => DirectiveKind::CellDefine,
            "endcelldefine" => DirectiveKind::EndCellDefine,
            "default_nettype" => DirectiveKind::DefaultNetType,
            "define" => DirectiveKind::Define,
            "else" => DirectiveKind::Else,
            "elsif" => DirectiveKind::ElsIf,
            "endif" => DirectiveKind::EndIf,
            "ifdef" => DirectiveKind::IfDef,
            "ifndef" => DirectiveKind::IfNDef,
            "include" => DirectiveKind::Include,
            "line" => DirectiveKind::Line,
            "nounconnected_drive" => DirectiveKind::NoUnconnectedDrive,
            "pragma" => DirectiveKind::Pragma,
            "resetall" => DirectiveKind::ResetAll,
            "timescale" => DirectiveKind::Timescale,
            "unconnected_drive" => DirectiveKind::UnconnectedDrive,
            "undef" => DirectiveKind::Undef,
            "undefineall" => DirectiveKind::UndefineAll,
            _ => DirectiveKind::MacroUsage,
        }
    }

    /// Check whether this directive belongs to a conditional chain.
    pub fn is_conditional(self) -> bool {
        match self {
            DirectiveKind::IfDef
            | DirectiveKind::IfNDef
            | DirectiveKind::ElsIf
            | DirectiveKind::Else
            | DirectiveKind::EndIf => true,
            _ => false,
        }
    }
}

/// A single four-state bit, as it appears in unbased unsized literals.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Bit {
    Zero,
    One,
    X,
    Z,
}

impl Bit {
    pub fn is_unknown(self) -> bool {
        match self {
            Bit::X | Bit::Z => true,
            _ => false,
        }
    }
}

/// The base of a sized vector literal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LiteralBase {
    Binary,
    Octal,
    Decimal,
    Hex,
}

impl LiteralBase {
    pub fn from_char(c: char) -> Option<LiteralBase> {
        Some(match c {
            'b' | 'B' => LiteralBase::Binary,
            'o' | 'O' => LiteralBase::Octal,
            'd' | 'D' => LiteralBase::Decimal,
            'h' | 'H' => LiteralBase::Hex,
            _ => return None,
        })
    }

    pub fn radix(self) -> u32 {
        match self {
            LiteralBase::Binary => 2,
            LiteralBase::Octal => 8,
            LiteralBase::Decimal => 10,
            LiteralBase::Hex => 16,
        }
    }
}

/// A unit of time as it appears in time literals and `timescale directives.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TimeUnit {
    Femtoseconds,
    Picoseconds,
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    pub fn from_suffix(s: &str) -> Option<TimeUnit> {
        Some(match s {
            "s" => TimeUnit::Seconds,
            "ms" => TimeUnit::Milliseconds,
            "us" => TimeUnit::Microseconds,
            "ns" => TimeUnit::Nanoseconds,
            "ps" => TimeUnit::Picoseconds,
            "fs" => TimeUnit::Femtoseconds,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Microseconds => "us",
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Picoseconds => "ps",
            TimeUnit::Femtoseconds => "fs",
        }
    }
}

/// The magnitude of a `timescale value; one of 1, 10, or 100.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TimescaleMagnitude {
    One = 1,
    Ten = 10,
    Hundred = 100,
}

/// One half of a `timescale directive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimescaleValue {
    pub magnitude: TimescaleMagnitude,
    pub unit: TimeUnit,
}

impl TimescaleValue {
    /// The value expressed in femtoseconds, for comparing precisions.
    pub fn femtoseconds(self) -> u64 {
        let unit = match self.unit {
            TimeUnit::Femtoseconds => 1,
            TimeUnit::Picoseconds => 1_000,
            TimeUnit::Nanoseconds => 1_000_000,
            TimeUnit::Microseconds => 1_000_000_000,
            TimeUnit::Milliseconds => 1_000_000_000_000,
            TimeUnit::Seconds => 1_000_000_000_000_000,
        };
        self.magnitude as u64 * unit
    }
}

/// An active `timescale setting.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Timescale {
    pub base: TimescaleValue,
    pub precision: TimescaleValue,
}

impl fmt::Display for Timescale {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{} / {}{}",
            self.base.magnitude as u32,
            self.base.unit.as_str(),
            self.precision.magnitude as u32,
            self.precision.unit.as_str()
        )
    }
}

/// The kind-specific payload of a token.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenValue {
    None,
    /// The interned text of an identifier, with escapes stripped.
    Name(Name),
    /// The value of a string literal, with escape sequences processed.
    Str(RcStr),
    /// The value of a decimal integer literal.
    Int(i32),
    /// The value of a real literal.
    Real(f64),
    /// The single bit of an unbased unsized literal.
    Bit(Bit),
    /// The numeric flags of an integer base token.
    NumBase { base: LiteralBase, signed: bool },
    /// The value and unit of a time literal.
    Time { value: f64, unit: TimeUnit },
}

bitflags! {
    /// Extra bits of token state.
    pub struct TokenFlags: u8 {
        /// The token was fabricated in place of missing input.
        const MISSING = 1 << 0;
        /// The token is the product of a macro expansion.
        const FROM_MACRO = 1 << 1;
    }
}

/// A piece of trivia attached to a token: whitespace, comments, line
/// endings, line continuations, disabled conditional text, skipped tokens,
/// or a processed directive.
#[derive(Clone, Debug)]
pub enum Trivia {
    Whitespace(RcStr),
    EndOfLine(RcStr),
    LineContinuation(RcStr),
    LineComment(RcStr),
    BlockComment(RcStr),
    DisabledText(Rc<[Token]>),
    SkippedTokens(Rc<[Token]>),
    Directive(Rc<ast::Directive>),
}

impl Trivia {
    /// Reconstruct the original source text of this trivia.
    pub fn write_to(&self, out: &mut String) {
        match self {
            Trivia::Whitespace(s)
            | Trivia::EndOfLine(s)
            | Trivia::LineContinuation(s)
            | Trivia::LineComment(s)
            | Trivia::BlockComment(s) => out.push_str(s),
            Trivia::DisabledText(tokens) | Trivia::SkippedTokens(tokens) => {
                for token in tokens.iter() {
                    token.write_to(out);
                }
            }
            Trivia::Directive(dir) => dir.write_to(out),
        }
    }
}

/// A lexical token: a kind, a source location, the raw lexeme text, leading
/// trivia, and a kind-tagged payload. Tokens are immutable value objects.
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Location,
    pub raw: RcStr,
    pub trivia: Vec<Trivia>,
    pub value: TokenValue,
    pub flags: TokenFlags,
}

impl Token {
    pub fn new(kind: TokenKind, loc: Location, raw: RcStr) -> Token {
        Token {
            kind: kind,
            loc: loc,
            raw: raw,
            trivia: Vec::new(),
            value: TokenValue::None,
            flags: TokenFlags::empty(),
        }
    }

    /// Fabricate a missing token of the given kind at a location.
    pub fn missing(kind: TokenKind, loc: Location) -> Token {
        let mut token = Token::new(kind, loc, RcStr::new(""));
        token.flags |= TokenFlags::MISSING;
        token
    }

    /// The source range covered by the raw text of this token.
    pub fn span(&self) -> Span {
        Span::new(self.loc.source, self.loc.offset, self.loc.offset + self.raw.len())
    }

    pub fn is_missing(&self) -> bool {
        self.flags.contains(TokenFlags::MISSING)
    }

    /// The interned identifier name carried by this token, if any.
    pub fn name(&self) -> Option<Name> {
        match self.value {
            TokenValue::Name(name) => Some(name),
            _ => None,
        }
    }

    /// The cooked text of this token: identifier names with escapes stripped,
    /// string literal contents, and the raw text for everything else.
    pub fn value_text(&self) -> RcStr {
        match &self.value {
            TokenValue::Name(name) => name.as_str(),
            TokenValue::Str(s) => s.clone(),
            _ => self.raw.clone(),
        }
    }

    /// Append the leading trivia and raw text of this token to a string.
    /// Concatenating this over a whole token stream reproduces the input.
    pub fn write_to(&self, out: &mut String) {
        for trivia in &self.trivia {
            trivia.write_to(out);
        }
        out.push_str(&self.raw);
    }

    /// The full text of this token including leading trivia.
    pub fn full_text(&self) -> String {
        let mut s = String::new();
        self.write_to(&mut s);
        s
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
