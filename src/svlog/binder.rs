//! The expression binder.
//!
//! Binding happens in two conceptual phases. `create` builds a typed
//! expression node bottom-up, self-determining the operands that need it.
//! Context propagation then widens context-determined subexpressions by
//! wrapping them in implicit conversion nodes once the parent has decided
//! the final type; truncations back down are conversions as well.
//!
//! Errors convert the offending subexpression into a bad expression whose
//! type is the error type; operators seeing an error-typed operand silently
//! produce another bad expression, so a single problem does not cascade.

use crate::builtins::SystemSubroutine;
use crate::compilation::Compilation;
use crate::eval::EvalContext;
use crate::symbols::{LookupLocation, LookupNameKind, Symbol, SymbolKind};
use crate::ty::{IntegralFlags, ConstantRange, Type, TypeKind};
use crate::value::{IntegerValue, LogicBit, MAX_BITS};
use mead_common::errors::{DiagCode, Diagnostic};
use mead_common::name::RcStr;
use mead_common::source::Span;
use mead_svlog_syntax::ast;
use mead_svlog_syntax::token::{Bit, LiteralBase, Op};
use num::bigint::BigInt;
use num::traits::Zero;
use std::rc::Rc;

bitflags! {
    /// Modifiers for the binding process.
    pub struct BindFlags: u8 {
        /// The expression is in a constant context and will be evaluated.
        const CONSTANT = 1 << 0;
        /// The expression is an operand of a concatenation.
        const INSIDE_CONCATENATION = 1 << 1;
        /// The expression must be a constant integer.
        const INTEGRAL_CONSTANT = 1 << 2;
        /// A data type is acceptable in place of an expression here.
        const ALLOW_DATA_TYPE = 1 << 3;
        /// The expression is the target context of a procedural assignment.
        const PROCEDURAL_ASSIGNMENT = 1 << 4;
        /// The expression appears in an event control.
        const EVENT_EXPRESSION = 1 << 5;
        /// Pattern matches are acceptable here.
        const ALLOW_PATTERN_MATCH = 1 << 6;
    }
}

/// Everything the binder needs to know about where an expression occurs.
#[derive(Clone, Copy)]
pub struct BindContext<'gcx> {
    pub scope: &'gcx Symbol<'gcx>,
    pub lookup_location: LookupLocation,
    pub lookup_kind: LookupNameKind,
    pub flags: BindFlags,
}

impl<'gcx> BindContext<'gcx> {
    pub fn new(scope: &'gcx Symbol<'gcx>) -> BindContext<'gcx> {
        BindContext {
            scope: scope,
            lookup_location: LookupLocation::max(),
            lookup_kind: LookupNameKind::Variable,
            flags: BindFlags::empty(),
        }
    }

    pub fn constant(scope: &'gcx Symbol<'gcx>) -> BindContext<'gcx> {
        BindContext {
            scope: scope,
            lookup_location: LookupLocation::max(),
            lookup_kind: LookupNameKind::Variable,
            flags: BindFlags::CONSTANT,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.flags.contains(BindFlags::CONSTANT)
    }

    /// A copy of this context with extra flags set, and the one-shot flags
    /// cleared.
    pub fn with(&self, extra: BindFlags) -> BindContext<'gcx> {
        let mut ctx = *self;
        ctx.flags &= !(BindFlags::INSIDE_CONCATENATION
            | BindFlags::INTEGRAL_CONSTANT
            | BindFlags::ALLOW_DATA_TYPE);
        ctx.flags |= extra;
        ctx
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOperator {
    Plus,
    Minus,
    BitwiseNot,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseNand,
    BitwiseNor,
    BitwiseXnor,
    LogicalNot,
    Preincrement,
    Predecrement,
    Postincrement,
    Postdecrement,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    BinaryAnd,
    BinaryOr,
    BinaryXor,
    BinaryXnor,
    Equality,
    Inequality,
    CaseEquality,
    CaseInequality,
    WildcardEquality,
    WildcardInequality,
    GreaterThanEqual,
    GreaterThan,
    LessThanEqual,
    LessThan,
    LogicalAnd,
    LogicalOr,
    LogicalImplication,
    LogicalEquivalence,
    LogicalShiftLeft,
    LogicalShiftRight,
    ArithmeticShiftLeft,
    ArithmeticShiftRight,
    Power,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConversionKind {
    /// A widening or reinterpreting conversion inserted by context
    /// propagation.
    Implicit,
    /// A truncation back down to the width of an assignment target.
    IntTruncation,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RangeSelectionKind {
    Simple,
    IndexedUp,
    IndexedDown,
}

/// The target of a call expression.
#[derive(Clone)]
pub enum CallTarget<'gcx> {
    Subroutine(&'gcx Symbol<'gcx>),
    System(Rc<dyn SystemSubroutine>),
}

/// A bound, typed expression.
pub struct Expression<'gcx> {
    pub kind: ExpressionKind<'gcx>,
    pub ty: Type<'gcx>,
    pub span: Span,
}

pub enum ExpressionKind<'gcx> {
    /// An irrecoverably broken expression; its type is the error type.
    Invalid(Option<&'gcx Expression<'gcx>>),
    IntegerLiteral(IntegerValue),
    RealLiteral(f64),
    StringLiteral(RcStr),
    NullLiteral,
    UnbasedUnsizedLiteral(LogicBit),
    NamedValue(&'gcx Symbol<'gcx>),
    /// A data type in expression position; the type of the expression is
    /// the named type itself.
    DataType,
    Unary {
        op: UnaryOperator,
        operand: &'gcx Expression<'gcx>,
    },
    Binary {
        op: BinaryOperator,
        lhs: &'gcx Expression<'gcx>,
        rhs: &'gcx Expression<'gcx>,
    },
    Conditional {
        cond: &'gcx Expression<'gcx>,
        lhs: &'gcx Expression<'gcx>,
        rhs: &'gcx Expression<'gcx>,
    },
    Assignment {
        op: Option<BinaryOperator>,
        lhs: &'gcx Expression<'gcx>,
        rhs: &'gcx Expression<'gcx>,
    },
    Concat(Vec<&'gcx Expression<'gcx>>),
    Replication {
        count: &'gcx Expression<'gcx>,
        operand: &'gcx Expression<'gcx>,
    },
    ElementSelect {
        value: &'gcx Expression<'gcx>,
        index: &'gcx Expression<'gcx>,
    },
    RangeSelect {
        kind: RangeSelectionKind,
        value: &'gcx Expression<'gcx>,
        left: &'gcx Expression<'gcx>,
        right: &'gcx Expression<'gcx>,
    },
    MemberAccess {
        value: &'gcx Expression<'gcx>,
        field: &'gcx Symbol<'gcx>,
        /// The bit offset of the field from the LSB of a packed struct.
        offset: u32,
    },
    Call {
        target: CallTarget<'gcx>,
        args: Vec<&'gcx Expression<'gcx>>,
    },
    Conversion {
        kind: ConversionKind,
        operand: &'gcx Expression<'gcx>,
    },
}

impl<'gcx> Expression<'gcx> {
    /// Whether this expression or its type is broken.
    pub fn bad(&self) -> bool {
        match self.kind {
            ExpressionKind::Invalid(..) => true,
            _ => self.ty.is_error(),
        }
    }

    /// An expression is an lvalue iff it is a named value, element select,
    /// range select, or member access.
    pub fn is_lvalue(&self) -> bool {
        match self.kind {
            ExpressionKind::NamedValue(..)
            | ExpressionKind::ElementSelect { .. }
            | ExpressionKind::RangeSelect { .. }
            | ExpressionKind::MemberAccess { .. } => true,
            _ => false,
        }
    }
}

impl<'gcx> Compilation<'gcx> {
    /// Bind an expression in a self-determined context and apply the
    /// constant-context check.
    pub fn bind_expression(
        &self,
        syntax: &ast::Expr,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let result = self.create_expression(syntax, ctx);
        self.check_bind_flags(result, ctx);
        result
    }

    /// Bind the right hand side of an assignment to a target type.
    pub fn bind_assignment(
        &self,
        lhs_ty: Type<'gcx>,
        rhs: &ast::Expr,
        location: mead_common::source::Location,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let expr = self.create_expression(rhs, ctx);
        if expr.bad() || lhs_ty.is_error() {
            return expr;
        }
        let result = self.convert_assignment(lhs_ty, expr, location, None);
        self.check_bind_flags(result, ctx);
        result
    }

    /// In a constant context, evaluate the bound expression and surface any
    /// evaluation failures as notes under `ExpressionNotConstant`.
    fn check_bind_flags(&self, expr: &'gcx Expression<'gcx>, ctx: &BindContext<'gcx>) {
        if !ctx.is_constant() || expr.bad() {
            return;
        }
        let mut eval = EvalContext::new();
        expr.eval(self, &mut eval);
        if !eval.diagnostics.is_empty() {
            let mut diag = Diagnostic::error(DiagCode::ExpressionNotConstant, expr.span);
            for note in eval.diagnostics {
                diag = diag.add_note_span(note.message, note.span);
            }
            self.emit(diag);
        }
    }

    pub fn bad_expr(&self, inner: Option<&'gcx Expression<'gcx>>) -> &'gcx Expression<'gcx> {
        let span = inner.map(|e| e.span).unwrap_or(mead_common::source::INVALID_SPAN);
        self.alloc_expr(Expression {
            kind: ExpressionKind::Invalid(inner),
            ty: self.error_type(),
            span: span,
        })
    }

    /// Widen a context-determined subexpression to its parent's type by
    /// inserting an implicit conversion.
    pub fn propagate(
        &self,
        expr: &'gcx Expression<'gcx>,
        ty: Type<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        if expr.bad() || ty.is_error() {
            return expr;
        }
        if expr.ty.is_matching(ty) {
            return expr;
        }
        if !expr.ty.is_numeric() || !ty.is_numeric() {
            return expr;
        }
        self.alloc_expr(Expression {
            kind: ExpressionKind::Conversion {
                kind: ConversionKind::Implicit,
                operand: expr,
            },
            ty: ty,
            span: expr.span,
        })
    }

    /// Convert an expression for assignment to the given target type:
    /// compatibility check, context-determined widening, then truncation
    /// back down if the propagated width exceeds the target.
    pub fn convert_assignment(
        &self,
        ty: Type<'gcx>,
        expr: &'gcx Expression<'gcx>,
        location: mead_common::source::Location,
        lhs_span: Option<Span>,
    ) -> &'gcx Expression<'gcx> {
        let rt = expr.ty;
        if !ty.is_assignment_compatible(rt) {
            let code = if ty.is_cast_compatible(rt) {
                DiagCode::NoImplicitConversion
            } else {
                DiagCode::BadAssignment
            };
            let mut diag = Diagnostic::error(code, location)
                .with_message(format!("cannot assign `{}` to `{}`", rt, ty))
                .add_note_span("value given here", expr.span);
            if let Some(span) = lhs_span {
                diag = diag.add_note_span("assignment target here", span);
            }
            self.emit(diag);
            return self.bad_expr(Some(expr));
        }

        let rt = self.binary_operator_type(ty, rt, false);
        let mut result = self.propagate(expr, rt);

        // After widening we may still need to truncate back down to the
        // actual size of the target.
        if rt.bit_width() > ty.bit_width() {
            result = self.alloc_expr(Expression {
                kind: ExpressionKind::Conversion {
                    kind: ConversionKind::IntTruncation,
                    operand: result,
                },
                ty: ty,
                span: result.span,
            });
        }
        result
    }

    fn check_lvalue(&self, expr: &Expression<'gcx>, location: mead_common::source::Location) -> bool {
        if !expr.is_lvalue() {
            self.emit(
                Diagnostic::error(DiagCode::ExpressionNotAssignable, location)
                    .add_note_span("expression is here", expr.span),
            );
            return false;
        }
        true
    }

    /// Build a typed expression from syntax with a provisional type derived
    /// from its own subexpressions.
    pub fn create_expression(
        &self,
        syntax: &ast::Expr,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let span = syntax.span;
        match &syntax.kind {
            ast::ExprKind::Literal(lit) => self.bind_literal(lit, span),
            ast::ExprKind::Paren(inner) => self.create_expression(inner, ctx),
            ast::ExprKind::Name(name) => self.bind_name(name, span, ctx),
            ast::ExprKind::Unary { op, expr } => self.bind_unary(*op, expr, span, ctx),
            ast::ExprKind::Binary { op, lhs, rhs } => self.bind_binary(*op, lhs, rhs, span, ctx),
            ast::ExprKind::Assign { op, lhs, rhs } => self.bind_assign_expr(*op, lhs, rhs, span, ctx),
            ast::ExprKind::Ternary {
                cond,
                true_expr,
                false_expr,
            } => self.bind_conditional(cond, true_expr, false_expr, span, ctx),
            ast::ExprKind::Concat { exprs } => self.bind_concat(exprs, span, ctx),
            ast::ExprKind::Replication { count, concat } => {
                self.bind_replication(count, concat, span, ctx)
            }
            ast::ExprKind::ElementSelect { value, index } => {
                let value = self.create_expression(value, ctx);
                self.bind_element_select(value, index, span, ctx)
            }
            ast::ExprKind::RangeSelect {
                value,
                kind,
                left,
                right,
            } => {
                let value = self.create_expression(value, ctx);
                self.bind_range_select(value, *kind, left, right, span, ctx)
            }
            ast::ExprKind::MemberAccess { value, member } => {
                self.bind_member_access(value, *member, span, ctx)
            }
            ast::ExprKind::Invocation { callee, args } => self.bind_call(callee, args, span, ctx),
            ast::ExprKind::AssignmentPattern { exprs } => {
                // Recognized syntactically; no semantic support yet.
                for expr in exprs {
                    let _ = self.create_expression(expr, ctx);
                }
                self.emit(
                    Diagnostic::error(DiagCode::ExpectedExpression, span)
                        .with_message("assignment patterns are not supported in this context"),
                );
                self.bad_expr(None)
            }
            ast::ExprKind::DataType(dt) => {
                if !ctx.flags.contains(BindFlags::ALLOW_DATA_TYPE) {
                    self.emit(Diagnostic::error(DiagCode::ExpectedExpression, span));
                    return self.bad_expr(None);
                }
                let ty = self.get_type_from_syntax(dt, ctx.scope, ctx.lookup_location);
                self.alloc_expr(Expression {
                    kind: ExpressionKind::DataType,
                    ty: ty,
                    span: span,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Literals
    // ------------------------------------------------------------------

    fn bind_literal(&self, lit: &ast::Lit, span: Span) -> &'gcx Expression<'gcx> {
        match lit {
            ast::Lit::Int(v) => self.alloc_expr(Expression {
                kind: ExpressionKind::IntegerLiteral(IntegerValue::from_i64(32, true, *v as i64)),
                ty: self.int_type(),
                span: span,
            }),
            ast::Lit::Vector {
                size,
                signed,
                base,
                digits,
            } => {
                let value = self.decode_vector_literal(*size, *signed, *base, digits, span);
                let mut flags = IntegralFlags::empty();
                if value.is_signed() {
                    flags |= IntegralFlags::SIGNED;
                }
                if value.has_unknown() {
                    flags |= IntegralFlags::FOUR_STATE;
                }
                let ty = self.get_type(value.width(), flags);
                self.alloc_expr(Expression {
                    kind: ExpressionKind::IntegerLiteral(value),
                    ty: ty,
                    span: span,
                })
            }
            ast::Lit::Real(v) => self.alloc_expr(Expression {
                kind: ExpressionKind::RealLiteral(*v),
                ty: self.real_type(),
                span: span,
            }),
            ast::Lit::Time { value, .. } => self.alloc_expr(Expression {
                kind: ExpressionKind::RealLiteral(*value),
                ty: self.intern_type(TypeKind::Float(crate::ty::FloatKind::RealTime)),
                span: span,
            }),
            ast::Lit::UnbasedUnsized(bit) => {
                // Defaults to a width of one, but can grow during context
                // propagation.
                let (logic, flags) = match bit {
                    Bit::Zero => (LogicBit::Zero, IntegralFlags::empty()),
                    Bit::One => (LogicBit::One, IntegralFlags::empty()),
                    Bit::X => (LogicBit::X, IntegralFlags::FOUR_STATE),
                    Bit::Z => (LogicBit::Z, IntegralFlags::FOUR_STATE),
                };
                self.alloc_expr(Expression {
                    kind: ExpressionKind::UnbasedUnsizedLiteral(logic),
                    ty: self.get_type(1, flags),
                    span: span,
                })
            }
            ast::Lit::Str(s) => {
                // An empty literal still gets one byte; there is no
                // zero-width integer.
                let width = if s.is_empty() { 8 } else { s.len() as u32 * 8 };
                let ty = self.get_type(width.min(MAX_BITS), IntegralFlags::empty());
                self.alloc_expr(Expression {
                    kind: ExpressionKind::StringLiteral(s.clone()),
                    ty: ty,
                    span: span,
                })
            }
            ast::Lit::Null => self.alloc_expr(Expression {
                kind: ExpressionKind::NullLiteral,
                ty: self.null_type(),
                span: span,
            }),
        }
    }

    /// Decode the digit text of a sized vector literal into a four-state
    /// value. The digits were only classified by the lexer.
    fn decode_vector_literal(
        &self,
        size: Option<u32>,
        signed: bool,
        base: LiteralBase,
        digits: &str,
        span: Span,
    ) -> IntegerValue {
        let mut bits: Vec<LogicBit> = Vec::new();
        match base {
            LiteralBase::Decimal => {
                let clean: String = digits.chars().filter(|c| c.is_ascii_digit()).collect();
                let all_special = digits
                    .chars()
                    .filter(|c| *c != '_')
                    .all(|c| matches!(c, 'x' | 'X' | 'z' | 'Z' | '?'));
                if clean.is_empty() && all_special {
                    let bit = match digits.chars().find(|c| *c != '_') {
                        Some('z') | Some('Z') | Some('?') => LogicBit::Z,
                        _ => LogicBit::X,
                    };
                    let width = size.unwrap_or(32);
                    return IntegerValue::from_bits(&vec![bit; width as usize], signed);
                }
                let value = clean.parse::<BigInt>().unwrap_or_else(|_| BigInt::zero());
                let needed = value.bits().max(1) as u32;
                let width = size.unwrap_or(needed.max(32));
                if size.is_none() && needed > width {
                    self.emit(Diagnostic::error(DiagCode::LiteralSizeTooLarge, span));
                }
                return IntegerValue::new(width, signed, value);
            }
            _ => {
                let digit_bits = match base {
                    LiteralBase::Binary => 1,
                    LiteralBase::Octal => 3,
                    _ => 4,
                };
                for c in digits.chars().rev() {
                    match c {
                        '_' => continue,
                        'x' | 'X' => bits.extend(vec![LogicBit::X; digit_bits]),
                        'z' | 'Z' | '?' => bits.extend(vec![LogicBit::Z; digit_bits]),
                        _ => match c.to_digit(16) {
                            Some(d) if d < base.radix() => {
                                for i in 0..digit_bits {
                                    bits.push(LogicBit::from_bool(d & (1 << i) != 0));
                                }
                            }
                            _ => (),
                        },
                    }
                }
            }
        }
        if bits.is_empty() {
            bits.push(LogicBit::Zero);
        }

        let width = size.unwrap_or((bits.len() as u32).max(32));
        // Adjust to the requested width: truncate from the top, or extend
        // with zeros (an x/z top digit extends with itself).
        let fill = match bits.last() {
            Some(LogicBit::X) => LogicBit::X,
            Some(LogicBit::Z) => LogicBit::Z,
            _ => LogicBit::Zero,
        };
        while (bits.len() as u32) < width {
            bits.push(fill);
        }
        if bits.len() as u32 > width {
            if size.is_some() {
                // Dropping nonzero bits from a sized literal is worth a
                // diagnostic.
                if bits[width as usize..]
                    .iter()
                    .any(|b| *b != LogicBit::Zero && *b != fill)
                {
                    self.emit(Diagnostic::error(DiagCode::LiteralSizeTooLarge, span));
                }
            }
            bits.truncate(width as usize);
        }
        IntegerValue::from_bits(&bits, signed)
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    fn bind_name(
        &self,
        name: &ast::NameRef,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let result = self.lookup_name(
            ctx.scope,
            name,
            ctx.lookup_location,
            ctx.lookup_kind,
            ctx.flags,
        );

        if let Some(subroutine) = result.system_subroutine {
            // A bare system name is a call with no arguments.
            let ty = subroutine.check_arguments(self, &[], span);
            return self.alloc_expr(Expression {
                kind: ExpressionKind::Call {
                    target: CallTarget::System(subroutine),
                    args: Vec::new(),
                },
                ty: ty,
                span: span,
            });
        }

        let symbol = match result.found {
            Some(symbol) => symbol,
            None => return self.bad_expr(None),
        };

        if symbol.is_type() {
            if ctx.flags.contains(BindFlags::ALLOW_DATA_TYPE) {
                let target = self.alias_target(symbol);
                let ty = self.intern_type(TypeKind::Named {
                    name: symbol.name,
                    target: target,
                });
                return self.alloc_expr(Expression {
                    kind: ExpressionKind::DataType,
                    ty: ty,
                    span: span,
                });
            }
        }

        if !symbol.is_value() {
            self.emit(
                Diagnostic::error(DiagCode::NotAValue, span)
                    .with_message(format!("`{}` does not denote a value", symbol.name)),
            );
            return self.bad_expr(None);
        }

        let ty = self.value_type(symbol);
        self.alloc_expr(Expression {
            kind: ExpressionKind::NamedValue(symbol),
            ty: ty,
            span: span,
        })
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn bind_unary(
        &self,
        op: ast::UnaryOp,
        operand_syntax: &ast::Expr,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let operand = self.create_expression(operand_syntax, &ctx.with(BindFlags::empty()));
        let ty = operand.ty;
        if operand.bad() {
            return self.bad_expr(Some(operand));
        }

        let (unop, good, result_ty) = match op {
            // Result is the same as the input type.
            ast::UnaryOp::Plus => (UnaryOperator::Plus, ty.is_numeric(), ty),
            ast::UnaryOp::Minus => (UnaryOperator::Minus, ty.is_numeric(), ty),
            // Result is a single bit.
            ast::UnaryOp::LogicNot => (
                UnaryOperator::LogicalNot,
                ty.is_numeric(),
                self.single_bit_for(ty),
            ),
            ast::UnaryOp::BitNot => (
                UnaryOperator::BitwiseNot,
                ty.is_integral(),
                self.single_bit_for(ty),
            ),
            ast::UnaryOp::RedAnd => (
                UnaryOperator::BitwiseAnd,
                ty.is_integral(),
                self.single_bit_for(ty),
            ),
            ast::UnaryOp::RedOr => (
                UnaryOperator::BitwiseOr,
                ty.is_integral(),
                self.single_bit_for(ty),
            ),
            ast::UnaryOp::RedXor => (
                UnaryOperator::BitwiseXor,
                ty.is_integral(),
                self.single_bit_for(ty),
            ),
            ast::UnaryOp::RedNand => (
                UnaryOperator::BitwiseNand,
                ty.is_integral(),
                self.single_bit_for(ty),
            ),
            ast::UnaryOp::RedNor => (
                UnaryOperator::BitwiseNor,
                ty.is_integral(),
                self.single_bit_for(ty),
            ),
            ast::UnaryOp::RedXnor => (
                UnaryOperator::BitwiseXnor,
                ty.is_integral(),
                self.single_bit_for(ty),
            ),
            // The operand must also be an assignable lvalue.
            ast::UnaryOp::PreInc | ast::UnaryOp::PostInc | ast::UnaryOp::PreDec
            | ast::UnaryOp::PostDec => {
                let unop = match op {
                    ast::UnaryOp::PreInc => UnaryOperator::Preincrement,
                    ast::UnaryOp::PreDec => UnaryOperator::Predecrement,
                    ast::UnaryOp::PostInc => UnaryOperator::Postincrement,
                    _ => UnaryOperator::Postdecrement,
                };
                if !self.check_lvalue(operand, span.begin()) {
                    return self.bad_expr(Some(operand));
                }
                (unop, ty.is_numeric(), ty)
            }
        };

        if !good {
            self.emit(
                Diagnostic::error(DiagCode::BadUnaryExpression, span)
                    .with_message(format!("invalid operand type `{}`", ty)),
            );
            return self.bad_expr(Some(operand));
        }
        self.alloc_expr(Expression {
            kind: ExpressionKind::Unary {
                op: unop,
                operand: operand,
            },
            ty: result_ty,
            span: span,
        })
    }

    fn single_bit_for(&self, ty: Type<'gcx>) -> Type<'gcx> {
        if ty.is_four_state() {
            self.logic_type()
        } else {
            self.bit_type()
        }
    }

    fn bind_binary(
        &self,
        op: Op,
        lhs_syntax: &ast::Expr,
        rhs_syntax: &ast::Expr,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let sub_ctx = ctx.with(BindFlags::empty());
        let mut lhs = self.create_expression(lhs_syntax, &sub_ctx);
        let mut rhs = self.create_expression(rhs_syntax, &sub_ctx);
        let lt = lhs.ty;
        let rt = rhs.ty;
        if lhs.bad() || rhs.bad() {
            return self.bad_expr(Some(lhs));
        }

        let both_integral = lt.is_integral() && rt.is_integral();
        let both_numeric = lt.is_numeric() && rt.is_numeric();

        let binop = binary_operator(op);
        let good;
        let result_ty;
        match binop {
            BinaryOperator::Add | BinaryOperator::Subtract | BinaryOperator::Multiply => {
                good = both_numeric;
                result_ty = self.binary_operator_type(lt, rt, false);
                lhs = self.propagate(lhs, result_ty);
                rhs = self.propagate(rhs, result_ty);
            }
            BinaryOperator::Divide => {
                // Forced to four state because the result can be x.
                good = both_numeric;
                result_ty = self.binary_operator_type(lt, rt, true);
                lhs = self.propagate(lhs, result_ty);
                rhs = self.propagate(rhs, result_ty);
            }
            BinaryOperator::Mod => {
                // As for divide, but only integers are allowed.
                good = both_integral;
                result_ty = self.binary_operator_type(lt, rt, true);
                lhs = self.propagate(lhs, result_ty);
                rhs = self.propagate(rhs, result_ty);
            }
            BinaryOperator::BinaryAnd
            | BinaryOperator::BinaryOr
            | BinaryOperator::BinaryXor
            | BinaryOperator::BinaryXnor => {
                good = both_integral;
                result_ty = self.binary_operator_type(lt, rt, false);
                lhs = self.propagate(lhs, result_ty);
                rhs = self.propagate(rhs, result_ty);
            }
            BinaryOperator::LogicalShiftLeft
            | BinaryOperator::LogicalShiftRight
            | BinaryOperator::ArithmeticShiftLeft
            | BinaryOperator::ArithmeticShiftRight => {
                // The result is the lhs type, four-stated if the rhs is four
                // state; the rhs stays self-determined.
                good = both_integral;
                result_ty = if rt.is_four_state() {
                    self.force_four_state(lt)
                } else {
                    lt
                };
                lhs = self.propagate(lhs, result_ty);
            }
            BinaryOperator::Power => {
                good = both_numeric;
                result_ty = self.force_four_state(lt);
                lhs = self.propagate(lhs, result_ty);
            }
            BinaryOperator::GreaterThanEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::LessThanEqual
            | BinaryOperator::LessThan => {
                // The result is a single bit, but the operands affect each
                // other as in any context-determined operator.
                good = both_numeric;
                result_ty = self.single_bit_type(lt, rt);
                let nt = self.binary_operator_type(lt, rt, false);
                lhs = self.propagate(lhs, nt);
                rhs = self.propagate(rhs, nt);
            }
            BinaryOperator::LogicalAnd
            | BinaryOperator::LogicalOr
            | BinaryOperator::LogicalImplication
            | BinaryOperator::LogicalEquivalence => {
                good = both_numeric;
                result_ty = self.single_bit_type(lt, rt);
            }
            BinaryOperator::Equality
            | BinaryOperator::Inequality
            | BinaryOperator::CaseEquality
            | BinaryOperator::CaseInequality
            | BinaryOperator::WildcardEquality
            | BinaryOperator::WildcardInequality => {
                return self.bind_equality(binop, lhs, rhs, span);
            }
        }

        if !good {
            self.emit(
                Diagnostic::error(DiagCode::BadBinaryExpression, span)
                    .with_message(format!("invalid operand types `{}` and `{}`", lt, rt)),
            );
            return self.bad_expr(Some(lhs));
        }
        self.alloc_expr(Expression {
            kind: ExpressionKind::Binary {
                op: binop,
                lhs: lhs,
                rhs: rhs,
            },
            ty: result_ty,
            span: span,
        })
    }

    /// Two operands are comparable iff both are numeric; or both aggregates
    /// and equivalent; or a handle/null pairing.
    fn bind_equality(
        &self,
        op: BinaryOperator,
        mut lhs: &'gcx Expression<'gcx>,
        mut rhs: &'gcx Expression<'gcx>,
        span: Span,
    ) -> &'gcx Expression<'gcx> {
        let lt = lhs.ty;
        let rt = rhs.ty;

        let result_ty;
        if lt.is_numeric() && rt.is_numeric() {
            result_ty = match op {
                // Equality and inequality are four state if either operand
                // is; case forms never are; wildcard forms follow the lhs.
                BinaryOperator::Equality | BinaryOperator::Inequality => {
                    self.single_bit_type(lt, rt)
                }
                BinaryOperator::CaseEquality | BinaryOperator::CaseInequality => self.bit_type(),
                _ => {
                    if lt.is_four_state() {
                        self.logic_type()
                    } else {
                        self.bit_type()
                    }
                }
            };
            let nt = self.binary_operator_type(lt, rt, false);
            lhs = self.propagate(lhs, nt);
            rhs = self.propagate(rhs, nt);
        } else if lt.is_aggregate() && lt.is_equivalent(rt) {
            // Aggregate equality stays four state until the member-wise
            // two-state drill-down exists.
            result_ty = self.logic_type();
        } else if (lt.is_chandle() || lt.is_null()) && (rt.is_chandle() || rt.is_null()) {
            result_ty = self.bit_type();
        } else if (lt.is_string() || lt.is_null()) && (rt.is_string() || rt.is_null()) {
            result_ty = self.bit_type();
        } else {
            self.emit(
                Diagnostic::error(DiagCode::BadBinaryExpression, span)
                    .with_message(format!("types `{}` and `{}` are not comparable", lt, rt)),
            );
            return self.bad_expr(Some(lhs));
        }

        self.alloc_expr(Expression {
            kind: ExpressionKind::Binary {
                op: op,
                lhs: lhs,
                rhs: rhs,
            },
            ty: result_ty,
            span: span,
        })
    }

    fn bind_conditional(
        &self,
        cond_syntax: &ast::Expr,
        lhs_syntax: &ast::Expr,
        rhs_syntax: &ast::Expr,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let sub_ctx = ctx.with(BindFlags::empty());
        let cond = self.create_expression(cond_syntax, &sub_ctx);
        let lhs = self.create_expression(lhs_syntax, &sub_ctx);
        let rhs = self.create_expression(rhs_syntax, &sub_ctx);
        if cond.bad() || lhs.bad() || rhs.bad() {
            return self.bad_expr(Some(cond));
        }

        // The branches are context determined against each other; the result
        // is forced four state for the ambiguous-condition case.
        let ty = self.binary_operator_type(lhs.ty, rhs.ty, true);
        if ty.is_error() {
            self.emit(
                Diagnostic::error(DiagCode::BadBinaryExpression, span).with_message(format!(
                    "branch types `{}` and `{}` are incompatible",
                    lhs.ty, rhs.ty
                )),
            );
            return self.bad_expr(Some(cond));
        }
        let lhs = self.propagate(lhs, ty);
        let rhs = self.propagate(rhs, ty);
        self.alloc_expr(Expression {
            kind: ExpressionKind::Conditional {
                cond: cond,
                lhs: lhs,
                rhs: rhs,
            },
            ty: ty,
            span: span,
        })
    }

    fn bind_assign_expr(
        &self,
        op: Option<Op>,
        lhs_syntax: &ast::Expr,
        rhs_syntax: &ast::Expr,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let sub_ctx = ctx.with(BindFlags::empty());
        let lhs = self.create_expression(lhs_syntax, &sub_ctx);
        let rhs = self.create_expression(rhs_syntax, &sub_ctx);
        if lhs.bad() || rhs.bad() {
            return self.bad_expr(Some(lhs));
        }
        if !self.check_lvalue(lhs, span.begin()) {
            return self.bad_expr(Some(lhs));
        }

        let rhs = self.convert_assignment(lhs.ty, rhs, span.begin(), Some(lhs.span));
        if rhs.bad() {
            return self.bad_expr(Some(rhs));
        }
        self.alloc_expr(Expression {
            kind: ExpressionKind::Assignment {
                op: op.map(binary_operator),
                lhs: lhs,
                rhs: rhs,
            },
            ty: lhs.ty,
            span: span,
        })
    }

    // ------------------------------------------------------------------
    // Concatenation and replication
    // ------------------------------------------------------------------

    fn bind_concat(
        &self,
        exprs: &[Rc<ast::Expr>],
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let mut errored = false;
        let mut flags = IntegralFlags::empty();
        let mut total_width = 0u32;
        let mut operands = Vec::new();

        for arg in exprs {
            // Replications inside of concatenations are allowed to have a
            // width of zero.
            let sub_ctx = match arg.kind {
                ast::ExprKind::Replication { .. } => ctx.with(BindFlags::INSIDE_CONCATENATION),
                _ => ctx.with(BindFlags::empty()),
            };
            let operand = self.create_expression(arg, &sub_ctx);
            operands.push(operand);
            if operand.bad() {
                errored = true;
                break;
            }

            // A void placeholder from a zero-width replication contributes
            // nothing.
            if operand.ty.is_void() {
                continue;
            }
            if !operand.ty.is_integral() {
                errored = true;
                self.emit(Diagnostic::error(DiagCode::BadConcatExpression, operand.span));
                continue;
            }

            let new_width = total_width.checked_add(operand.ty.bit_width());
            match new_width {
                Some(w) if w <= MAX_BITS => total_width = w,
                _ => {
                    errored = true;
                    self.emit(Diagnostic::error(DiagCode::ValueExceedsMaxBitWidth, span));
                    break;
                }
            }
            if operand.ty.is_four_state() {
                flags |= IntegralFlags::FOUR_STATE;
            }
        }

        if errored || total_width == 0 {
            if total_width == 0 && !errored {
                self.emit(Diagnostic::error(DiagCode::BadConcatExpression, span));
            }
            return self.bad_expr(None);
        }
        self.alloc_expr(Expression {
            kind: ExpressionKind::Concat(operands),
            ty: self.get_type(total_width, flags),
            span: span,
        })
    }

    fn bind_replication(
        &self,
        count_syntax: &ast::Expr,
        operand_syntax: &ast::Expr,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let count_ctx = ctx.with(BindFlags::CONSTANT | BindFlags::INTEGRAL_CONSTANT);
        let count = self.bind_expression(count_syntax, &count_ctx);
        let operand = self.create_expression(operand_syntax, &ctx.with(BindFlags::empty()));
        if count.bad() || operand.bad() {
            return self.bad_expr(Some(operand));
        }

        let mut eval = EvalContext::new();
        let count_value = count.eval(self, &mut eval);
        let count_value = match count_value.integer() {
            Some(value) => value.clone(),
            // The constant check has already reported the failure.
            None => return self.bad_expr(Some(count)),
        };

        if !self.check_no_unknowns(&count_value, count.span)
            || !self.check_positive(&count_value, count.span)
        {
            return self.bad_expr(Some(count));
        }

        if count_value.is_zero() {
            if !ctx.flags.contains(BindFlags::INSIDE_CONCATENATION) {
                self.emit(Diagnostic::error(
                    DiagCode::ReplicationZeroOutsideConcat,
                    count.span,
                ));
                return self.bad_expr(Some(count));
            }
            // A placeholder type tells the enclosing concatenation that this
            // had zero width.
            return self.alloc_expr(Expression {
                kind: ExpressionKind::Replication {
                    count: count,
                    operand: operand,
                },
                ty: self.void_type(),
                span: span,
            });
        }

        let total = count_value
            .as_u32()
            .map(|c| c as u64 * operand.ty.bit_width() as u64)
            .unwrap_or(u64::from(MAX_BITS) + 1);
        let width = IntegerValue::from_u64(64, false, total);
        let width = match self.check_valid_bit_width(&width, span) {
            Some(width) => width,
            None => return self.bad_expr(Some(operand)),
        };

        let flags = if operand.ty.is_four_state() {
            IntegralFlags::FOUR_STATE
        } else {
            IntegralFlags::empty()
        };
        self.alloc_expr(Expression {
            kind: ExpressionKind::Replication {
                count: count,
                operand: operand,
            },
            ty: self.get_type(width, flags),
            span: span,
        })
    }

    // ------------------------------------------------------------------
    // Selects and member access
    // ------------------------------------------------------------------

    pub fn bind_element_select(
        &self,
        value: &'gcx Expression<'gcx>,
        index_syntax: &ast::Expr,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let index = self.create_expression(index_syntax, &ctx.with(BindFlags::empty()));
        if value.bad() || index.bad() {
            return self.bad_expr(Some(value));
        }

        let vt = value.ty;
        let result_ty = if !vt.is_integral() {
            self.emit(
                Diagnostic::error(DiagCode::BadIndexExpression, index_syntax.span)
                    .with_message(format!("value of type `{}` cannot be indexed", vt)),
            );
            return self.bad_expr(Some(value));
        } else if vt.is_scalar() {
            self.emit(Diagnostic::error(DiagCode::CannotIndexScalar, index_syntax.span));
            return self.bad_expr(Some(value));
        } else if let Some(elem) = vt.element_type() {
            elem
        } else {
            self.single_bit_for(vt)
        };

        if !index.ty.is_integral() {
            self.emit(Diagnostic::error(DiagCode::IndexMustBeIntegral, index.span));
            return self.bad_expr(Some(value));
        }

        self.alloc_expr(Expression {
            kind: ExpressionKind::ElementSelect {
                value: value,
                index: index,
            },
            ty: result_ty,
            span: span,
        })
    }

    pub fn bind_range_select(
        &self,
        value: &'gcx Expression<'gcx>,
        kind: ast::RangeSelectKind,
        left_syntax: &ast::Expr,
        right_syntax: &ast::Expr,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        // Both bounds must be constant; non-constant bounds are a binder
        // error rather than a guess.
        let bound_ctx = ctx.with(BindFlags::CONSTANT);
        let left = self.bind_expression(left_syntax, &bound_ctx);
        let right = self.bind_expression(right_syntax, &bound_ctx);
        if value.bad() || left.bad() || right.bad() {
            return self.bad_expr(Some(value));
        }

        let vt = value.ty;
        if !vt.is_integral() {
            self.emit(
                Diagnostic::error(DiagCode::BadIndexExpression, span)
                    .with_message(format!("value of type `{}` cannot be sliced", vt)),
            );
            return self.bad_expr(Some(value));
        }
        if vt.is_scalar() {
            self.emit(Diagnostic::error(DiagCode::CannotIndexScalar, span));
            return self.bad_expr(Some(value));
        }

        let elem = vt.element_type().unwrap_or_else(|| self.single_bit_for(vt));

        let selection_kind = match kind {
            ast::RangeSelectKind::Simple => RangeSelectionKind::Simple,
            ast::RangeSelectKind::IndexedUp => RangeSelectionKind::IndexedUp,
            ast::RangeSelectKind::IndexedDown => RangeSelectionKind::IndexedDown,
        };

        let mut eval = EvalContext::new();
        let width = match selection_kind {
            RangeSelectionKind::Simple => {
                let l = left.eval(self, &mut eval);
                let r = right.eval(self, &mut eval);
                match (
                    l.integer().and_then(|v| v.as_i64()),
                    r.integer().and_then(|v| v.as_i64()),
                ) {
                    (Some(l), Some(r)) => ((l - r).abs() + 1) as u64,
                    _ => return self.bad_expr(Some(value)),
                }
            }
            _ => {
                let w = right.eval(self, &mut eval);
                match w.integer().and_then(|v| v.as_i64()) {
                    Some(w) if w > 0 => w as u64,
                    Some(_) => {
                        self.emit(Diagnostic::error(DiagCode::ValueMustBePositive, right.span));
                        return self.bad_expr(Some(value));
                    }
                    None => return self.bad_expr(Some(value)),
                }
            }
        };
        if width > u64::from(MAX_BITS) {
            self.emit(Diagnostic::error(DiagCode::ValueExceedsMaxBitWidth, span));
            return self.bad_expr(Some(value));
        }

        let ty = self.get_packed_array(elem, ConstantRange::new(width as i32 - 1, 0));
        self.alloc_expr(Expression {
            kind: ExpressionKind::RangeSelect {
                kind: selection_kind,
                value: value,
                left: left,
                right: right,
            },
            ty: ty,
            span: span,
        })
    }

    fn bind_member_access(
        &self,
        value_syntax: &ast::Expr,
        member: mead_common::source::Spanned<mead_common::name::Name>,
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let value = self.create_expression(value_syntax, &ctx.with(BindFlags::empty()));
        if value.bad() {
            return self.bad_expr(Some(value));
        }

        if !value.ty.is_struct_union() {
            self.emit(
                Diagnostic::error(DiagCode::MemberAccessNotStructUnion, member.span)
                    .with_message(format!(
                        "cannot access member of non-struct type `{}`",
                        value.ty
                    )),
            );
            return self.bad_expr(Some(value));
        }

        let scope_symbol = value.ty.struct_scope().unwrap();
        let field = scope_symbol
            .scope()
            .unwrap()
            .find(self, scope_symbol, member.value);
        let field = match field {
            Some(field) => field,
            None => {
                self.emit(
                    Diagnostic::error(DiagCode::UnknownMember, member.span).with_message(format!(
                        "no member `{}` in type `{}`",
                        member.value, value.ty
                    )),
                );
                return self.bad_expr(Some(value));
            }
        };

        // For a packed struct, compute the field's bit offset from the LSB:
        // the first declared field sits in the most significant bits.
        let mut offset = 0u32;
        let is_union = match value.ty.resolve() {
            TypeKind::Struct { is_union, .. } => *is_union,
            _ => false,
        };
        if !is_union {
            let members = scope_symbol.scope().unwrap().members();
            for other in members.iter().rev() {
                if other.name == field.name {
                    break;
                }
                offset += self.value_type(other).bit_width();
            }
        }

        let field_ty = self.value_type(field);
        self.alloc_expr(Expression {
            kind: ExpressionKind::MemberAccess {
                value: value,
                field: field,
                offset: offset,
            },
            ty: field_ty,
            span: span,
        })
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn bind_call(
        &self,
        callee: &ast::Expr,
        args: &[Rc<ast::Expr>],
        span: Span,
        ctx: &BindContext<'gcx>,
    ) -> &'gcx Expression<'gcx> {
        let name = match &callee.kind {
            ast::ExprKind::Name(name) => name,
            _ => {
                self.emit(Diagnostic::error(DiagCode::ExpressionNotCallable, callee.span));
                return self.bad_expr(None);
            }
        };

        let result = self.lookup_name(
            ctx.scope,
            name,
            ctx.lookup_location,
            LookupNameKind::Callable,
            ctx.flags,
        );

        if let Some(subroutine) = result.system_subroutine {
            let mut bound = Vec::new();
            for (i, arg) in args.iter().enumerate() {
                let extra = if i == 0 && subroutine.allow_data_type_arg() {
                    BindFlags::ALLOW_DATA_TYPE
                } else {
                    BindFlags::empty()
                };
                bound.push(self.create_expression(arg, &ctx.with(extra)));
            }
            let ty = subroutine.check_arguments(self, &bound, span);
            let expr = self.alloc_expr(Expression {
                kind: ExpressionKind::Call {
                    target: CallTarget::System(subroutine),
                    args: bound,
                },
                ty: ty,
                span: span,
            });
            if ty.is_error() {
                return self.bad_expr(Some(expr));
            }
            if let ExpressionKind::Call { args, .. } = &expr.kind {
                if args.iter().any(|a| a.bad()) {
                    return self.bad_expr(Some(expr));
                }
            }
            return expr;
        }

        let symbol = match result.found {
            Some(symbol) => symbol,
            None => return self.bad_expr(None),
        };
        match symbol.kind {
            SymbolKind::Subroutine(..) => (),
            _ => {
                self.emit(
                    Diagnostic::error(DiagCode::NotASubroutine, callee.span)
                        .with_message(format!("`{}` is not a task or function", symbol.name)),
                );
                return self.bad_expr(None);
            }
        }

        // Arguments are positional; each actual binds against the type of
        // its formal.
        let formals = self.subroutine_args(symbol);
        if args.len() > formals.len() {
            self.emit(
                Diagnostic::error(DiagCode::TooManyArguments, callee.span).with_message(format!(
                    "expected {} arguments, found {}",
                    formals.len(),
                    args.len()
                )),
            );
            return self.bad_expr(None);
        }

        let mut bound = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            let formal_ty = self.value_type(formals[i]);
            bound.push(self.bind_assignment(formal_ty, arg, arg.span.begin(), ctx));
        }
        // Missing trailing arguments must have defaults.
        for formal in formals.iter().skip(args.len()) {
            let has_default = match &formal.kind {
                SymbolKind::FormalArg(data) => data.init_syntax.is_some(),
                _ => false,
            };
            if !has_default {
                self.emit(
                    Diagnostic::error(DiagCode::ExpectedExpression, span).with_message(format!(
                        "missing argument for formal `{}`",
                        formal.name
                    )),
                );
                return self.bad_expr(None);
            }
        }

        let return_ty = self.subroutine_return_type(symbol);
        self.alloc_expr(Expression {
            kind: ExpressionKind::Call {
                target: CallTarget::Subroutine(symbol),
                args: bound,
            },
            ty: return_ty,
            span: span,
        })
    }
}

/// Map a syntax-level operator token to the bound operator.
pub fn binary_operator(op: Op) -> BinaryOperator {
    match op {
        Op::Add => BinaryOperator::Add,
        Op::Sub => BinaryOperator::Subtract,
        Op::Mul => BinaryOperator::Multiply,
        Op::Div => BinaryOperator::Divide,
        Op::Mod => BinaryOperator::Mod,
        Op::BitAnd => BinaryOperator::BinaryAnd,
        Op::BitOr => BinaryOperator::BinaryOr,
        Op::BitXor => BinaryOperator::BinaryXor,
        Op::BitXnor | Op::BitNxor => BinaryOperator::BinaryXnor,
        Op::LogicEq => BinaryOperator::Equality,
        Op::LogicNeq => BinaryOperator::Inequality,
        Op::CaseEq => BinaryOperator::CaseEquality,
        Op::CaseNeq => BinaryOperator::CaseInequality,
        Op::WildcardEq => BinaryOperator::WildcardEquality,
        Op::WildcardNeq => BinaryOperator::WildcardInequality,
        Op::Geq => BinaryOperator::GreaterThanEqual,
        Op::Gt => BinaryOperator::GreaterThan,
        Op::Leq => BinaryOperator::LessThanEqual,
        Op::Lt => BinaryOperator::LessThan,
        Op::LogicAnd => BinaryOperator::LogicalAnd,
        Op::LogicOr => BinaryOperator::LogicalOr,
        Op::LogicImpl => BinaryOperator::LogicalImplication,
        Op::LogicEquiv => BinaryOperator::LogicalEquivalence,
        Op::LogicShL => BinaryOperator::LogicalShiftLeft,
        Op::LogicShR => BinaryOperator::LogicalShiftRight,
        Op::ArithShL => BinaryOperator::ArithmeticShiftLeft,
        Op::ArithShR => BinaryOperator::ArithmeticShiftRight,
        Op::Pow => BinaryOperator::Power,
        _ => unreachable!("not a binary operator: {:?}", op),
    }
}
