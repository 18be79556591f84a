//! Diagnostics and error reporting facilities.
//!
//! Recoverable problems in the input are represented as [`Diagnostic`] values
//! carrying a [`DiagCode`], a severity, a primary source span, and optional
//! notes. They accumulate in an append-only [`Diagnostics`] store and are
//! sorted by source location only when results are requested.

use crate::source::{Span, INVALID_SPAN};
use std::cell::RefCell;
use std::fmt;

/// The different kinds of diagnostics the compiler can produce. Each value
/// identifies one error or warning condition; the human readable default
/// message is available via [`DiagCode::message`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum DiagCode {
    // Lexer
    NonPrintableChar,
    UTF8Char,
    UnicodeBOM,
    EmbeddedNull,
    ExpectedClosingQuote,
    OctalEscapeCodeTooBig,
    InvalidHexEscapeCode,
    UnknownEscapeCode,
    EscapedWhitespace,
    UnterminatedBlockComment,
    NestedBlockComment,
    SplitBlockCommentInDirective,
    MisplacedDirectiveChar,
    ExpectedIntegerBaseAfterSigned,
    ExpectedVectorDigits,
    MissingFractionalDigits,
    MissingExponentDigits,
    RealExponentOverflow,
    SignedIntegerOverflow,
    LiteralSizeIsZero,
    LiteralSizeTooLarge,
    TooManyLexerErrors,

    // Preprocessor
    IncludeNotFirstOnLine,
    ExpectedIncludeFileName,
    ExceededMaxIncludeDepth,
    UnknownDirective,
    ExpectedToken,
    ExpectedEndOfDirective,
    ExpectedIdentifier,
    NotEnoughMacroArgs,
    TooManyActualMacroArgs,
    ExpectedMacroArgs,
    ExpectedMacroStringifyEnd,
    BadMacroPaste,
    RecursiveMacro,
    UnexpectedConditionalDirective,
    UndefineBuiltinDirective,
    InvalidTimescaleSpecifier,

    // Parser
    ExpectedExpression,
    ExpectedMember,
    ColonShouldBeDot,
    ExpectedClassScope,

    // Declarations
    MaxInstanceDepthExceeded,
    BodyParamNoInitializer,
    LocalParamNoInitializer,
    NetTypeNotAllowed,
    Redefinition,
    NotePreviousDefinition,

    // Lookup
    UndeclaredIdentifier,
    UsedBeforeDeclared,
    NoteDeclarationHere,

    // Expressions
    ExpressionNotConstant,
    NotAValue,
    MemberAccessNotStructUnion,
    UnknownMember,
    NoImplicitConversion,
    BadAssignment,
    ExpressionNotAssignable,
    BadUnaryExpression,
    BadBinaryExpression,
    BadIndexExpression,
    CannotIndexScalar,
    IndexMustBeIntegral,
    BadConcatExpression,
    ValueExceedsMaxBitWidth,
    ReplicationZeroOutsideConcat,
    ValueMustNotBeUnknown,
    ValueMustBePositive,
    ExpressionNotCallable,
    NotASubroutine,
    TooManyArguments,
}

impl DiagCode {
    /// The default message text for this code.
    pub fn message(self) -> &'static str {
        match self {
            DiagCode::NonPrintableChar => "non-printable character in source text",
            DiagCode::UTF8Char => "UTF-8 sequence in source text",
            DiagCode::UnicodeBOM => "unicode byte order mark at start of file",
            DiagCode::EmbeddedNull => "embedded NUL in source text",
            DiagCode::ExpectedClosingQuote => "missing closing quote",
            DiagCode::OctalEscapeCodeTooBig => "octal escape code is too large",
            DiagCode::InvalidHexEscapeCode => "invalid hexadecimal escape code",
            DiagCode::UnknownEscapeCode => "unknown character escape sequence",
            DiagCode::EscapedWhitespace => "backslash must be followed by a printable character",
            DiagCode::UnterminatedBlockComment => "block comment is not terminated",
            DiagCode::NestedBlockComment => "nested block comments are disallowed",
            DiagCode::SplitBlockCommentInDirective => {
                "block comments on the same line as a directive may not contain a newline"
            }
            DiagCode::MisplacedDirectiveChar => "expected directive name",
            DiagCode::ExpectedIntegerBaseAfterSigned => "expected integer base specifier after signed specifier",
            DiagCode::ExpectedVectorDigits => "expected vector literal digits",
            DiagCode::MissingFractionalDigits => "expected fractional digits after decimal point",
            DiagCode::MissingExponentDigits => "expected exponent digits",
            DiagCode::RealExponentOverflow => "real literal overflows the representable range",
            DiagCode::SignedIntegerOverflow => "signed integer constant overflows 32 bits",
            DiagCode::LiteralSizeIsZero => "size of vector literal cannot be zero",
            DiagCode::LiteralSizeTooLarge => "size of vector literal is too large",
            DiagCode::TooManyLexerErrors => "lexer has encountered too many errors (input is a binary file?)",
            DiagCode::IncludeNotFirstOnLine => "include directives must begin on their own line",
            DiagCode::ExpectedIncludeFileName => "expected an include file name",
            DiagCode::ExceededMaxIncludeDepth => "exceeded maximum include depth",
            DiagCode::UnknownDirective => "unknown compiler directive",
            DiagCode::ExpectedToken => "expected token",
            DiagCode::ExpectedEndOfDirective => "expected end of directive",
            DiagCode::ExpectedIdentifier => "expected identifier",
            DiagCode::NotEnoughMacroArgs => "not enough arguments provided to macro",
            DiagCode::TooManyActualMacroArgs => "too many arguments provided to macro",
            DiagCode::ExpectedMacroArgs => "expected macro arguments for function-like macro",
            DiagCode::ExpectedMacroStringifyEnd => "expected end of macro stringification",
            DiagCode::BadMacroPaste => "paste operands do not form a valid token",
            DiagCode::RecursiveMacro => "macro expansion is recursive",
            DiagCode::UnexpectedConditionalDirective => "unexpected conditional directive",
            DiagCode::UndefineBuiltinDirective => "cannot undefine built-in directive",
            DiagCode::InvalidTimescaleSpecifier => "invalid timescale specifier",
            DiagCode::ExpectedExpression => "expected expression",
            DiagCode::ExpectedMember => "expected member",
            DiagCode::ColonShouldBeDot => "colon should be a dot here",
            DiagCode::ExpectedClassScope => "expected a class scope before '::'",
            DiagCode::MaxInstanceDepthExceeded => "module instantiation is too deeply nested",
            DiagCode::BodyParamNoInitializer => "parameter declaration is missing an initializer",
            DiagCode::LocalParamNoInitializer => "local parameter is missing an initializer",
            DiagCode::NetTypeNotAllowed => "net type not allowed in this context",
            DiagCode::Redefinition => "redefinition of name",
            DiagCode::NotePreviousDefinition => "previous definition here",
            DiagCode::UndeclaredIdentifier => "use of undeclared identifier",
            DiagCode::UsedBeforeDeclared => "identifier used before its declaration",
            DiagCode::NoteDeclarationHere => "declared here",
            DiagCode::ExpressionNotConstant => "expression is not constant",
            DiagCode::NotAValue => "symbol does not denote a value",
            DiagCode::MemberAccessNotStructUnion => "member access of a type that is not a struct or union",
            DiagCode::UnknownMember => "no such member",
            DiagCode::NoImplicitConversion => "no implicit conversion between types; explicit cast required",
            DiagCode::BadAssignment => "value is not assignable to the target type",
            DiagCode::ExpressionNotAssignable => "expression is not assignable",
            DiagCode::BadUnaryExpression => "invalid operand type for unary operator",
            DiagCode::BadBinaryExpression => "invalid operand types for binary operator",
            DiagCode::BadIndexExpression => "value cannot be indexed",
            DiagCode::CannotIndexScalar => "cannot index a scalar value",
            DiagCode::IndexMustBeIntegral => "index must be an integral value",
            DiagCode::BadConcatExpression => "invalid operand in concatenation",
            DiagCode::ValueExceedsMaxBitWidth => "value exceeds the maximum supported bit width",
            DiagCode::ReplicationZeroOutsideConcat => {
                "replication with zero count is only allowed inside a concatenation"
            }
            DiagCode::ValueMustNotBeUnknown => "value must not have any unknown bits",
            DiagCode::ValueMustBePositive => "value must be positive",
            DiagCode::ExpressionNotCallable => "expression is not callable",
            DiagCode::NotASubroutine => "symbol is not a task or function",
            DiagCode::TooManyArguments => "too many arguments to subroutine call",
        }
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
    Bug,
}

impl Severity {
    pub fn to_str(self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Bug => "compiler bug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// A note attached to a diagnostic, e.g. pointing at a previous definition or
/// carrying a nested evaluation failure.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagNote {
    pub message: String,
    pub span: Span,
}

/// A structured diagnostic message.
#[must_use]
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<DiagNote>,
}

impl Diagnostic {
    pub fn new<S: Into<Span>>(severity: Severity, code: DiagCode, span: S) -> Diagnostic {
        Diagnostic {
            code: code,
            severity: severity,
            message: code.message().to_string(),
            span: span.into(),
            notes: Vec::new(),
        }
    }

    pub fn error<S: Into<Span>>(code: DiagCode, span: S) -> Diagnostic {
        Diagnostic::new(Severity::Error, code, span)
    }

    pub fn warning<S: Into<Span>>(code: DiagCode, span: S) -> Diagnostic {
        Diagnostic::new(Severity::Warning, code, span)
    }

    /// Replace the default message text.
    pub fn with_message<S: Into<String>>(mut self, message: S) -> Diagnostic {
        self.message = message.into();
        self
    }

    /// Attach a note without a source span.
    pub fn add_note<S: Into<String>>(mut self, message: S) -> Diagnostic {
        self.notes.push(DiagNote {
            message: message.into(),
            span: INVALID_SPAN,
        });
        self
    }

    /// Attach a note pointing at a source span.
    pub fn add_note_span<S: Into<String>, P: Into<Span>>(mut self, message: S, span: P) -> Diagnostic {
        self.notes.push(DiagNote {
            message: message.into(),
            span: span.into(),
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.severity, self.message, self.code)?;
        for note in &self.notes {
            write!(f, "\n  note: {}", note.message)?;
        }
        Ok(())
    }
}

/// Emits diagnostic messages.
pub trait DiagEmitter {
    /// Emit a diagnostic message.
    fn emit(&self, diag: Diagnostic);
}

impl<'a, T> DiagEmitter for &'a T
where
    T: DiagEmitter + ?Sized,
{
    fn emit(&self, diag: Diagnostic) {
        (*self).emit(diag)
    }
}

/// An append-only list of diagnostics. Shared via `Rc` between the lexer,
/// preprocessor, and parser working on one syntax tree, and owned by the
/// compilation for semantic analysis.
#[derive(Default)]
pub struct Diagnostics {
    list: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Default::default()
    }

    pub fn add(&self, diag: Diagnostic) {
        self.list.borrow_mut().push(diag);
    }

    pub fn extend<I: IntoIterator<Item = Diagnostic>>(&self, diags: I) {
        self.list.borrow_mut().extend(diags);
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.borrow().is_empty()
    }

    /// Clone out the current list in insertion order.
    pub fn collect(&self) -> Vec<Diagnostic> {
        self.list.borrow().clone()
    }

    /// Clone out the current list, sorted by source location.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut v = self.collect();
        v.sort_by_key(|d| (d.span.source, d.span.begin));
        v
    }

    /// Check whether any diagnostic of `Error` or higher severity is present.
    pub fn has_errors(&self) -> bool {
        self.list.borrow().iter().any(|d| d.severity >= Severity::Error)
    }
}

impl DiagEmitter for Diagnostics {
    fn emit(&self, diag: Diagnostic) {
        self.add(diag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Source, Span};

    #[test]
    fn sorted_output() {
        let diags = Diagnostics::new();
        let s = Source(1);
        diags.add(Diagnostic::error(DiagCode::ExpectedExpression, Span::new(s, 8, 9)));
        diags.add(Diagnostic::error(DiagCode::ExpectedToken, Span::new(s, 2, 3)));
        let sorted = diags.sorted();
        assert_eq!(sorted[0].code, DiagCode::ExpectedToken);
        assert_eq!(sorted[1].code, DiagCode::ExpectedExpression);
    }

    #[test]
    fn notes() {
        let d = Diagnostic::error(DiagCode::ExpressionNotConstant, Span::new(Source(1), 0, 4))
            .add_note("variable reference is not allowed here");
        assert_eq!(d.notes.len(), 1);
    }
}
