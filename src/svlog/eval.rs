//! Compile-time evaluation of bound expressions.
//!
//! The evaluator collects its failures into the context rather than the
//! compilation; a caller that required a constant turns them into notes
//! under `ExpressionNotConstant`.

use crate::binder::{
    BinaryOperator, CallTarget, ConversionKind, Expression, ExpressionKind, RangeSelectionKind,
    UnaryOperator,
};
use crate::compilation::Compilation;
use crate::symbols::SymbolKind;
use crate::value::{ConstantValue, IntegerValue, LogicBit};
use mead_common::errors::{DiagCode, Diagnostic};
use mead_common::source::Span;
use num::bigint::BigInt;

/// The state of one constant evaluation.
pub struct EvalContext {
    pub diagnostics: Vec<Diagnostic>,
}

impl EvalContext {
    pub fn new() -> EvalContext {
        EvalContext {
            diagnostics: Vec::new(),
        }
    }

    pub fn not_constant<S: Into<String>>(&mut self, message: S, span: Span) {
        self.diagnostics.push(
            Diagnostic::error(DiagCode::ExpressionNotConstant, span).with_message(message),
        );
    }
}

impl Default for EvalContext {
    fn default() -> EvalContext {
        EvalContext::new()
    }
}

impl<'gcx> Expression<'gcx> {
    /// Evaluate this expression to a constant value. Failures produce
    /// `ConstantValue::Undefined` and a diagnostic in the context.
    pub fn eval(&self, cx: &Compilation<'gcx>, ctx: &mut EvalContext) -> ConstantValue {
        match &self.kind {
            ExpressionKind::Invalid(..) => ConstantValue::Undefined,
            ExpressionKind::IntegerLiteral(value) => ConstantValue::Int(value.clone()),
            ExpressionKind::RealLiteral(value) => ConstantValue::Real(*value),
            ExpressionKind::StringLiteral(s) => {
                // A string literal in an integral context is its bytes.
                let width = self.ty.bit_width().max(8);
                let mut value = BigInt::from(0);
                for byte in s.bytes() {
                    value = (value << 8) + BigInt::from(byte);
                }
                ConstantValue::Int(IntegerValue::new(width, false, value))
            }
            ExpressionKind::NullLiteral => ConstantValue::Null,
            ExpressionKind::UnbasedUnsizedLiteral(bit) => {
                ConstantValue::Int(IntegerValue::from_bits(&[*bit], false))
            }
            ExpressionKind::NamedValue(symbol) => match &symbol.kind {
                SymbolKind::Parameter(..) => {
                    let value = cx.parameter_value(symbol);
                    if value.is_undefined() {
                        ctx.not_constant(
                            format!("value of parameter `{}` is not available", symbol.name),
                            self.span,
                        );
                    }
                    value
                }
                SymbolKind::EnumValue(..) => cx.enum_value(symbol),
                _ => {
                    ctx.not_constant(
                        format!("reference to `{}` is not constant", symbol.name),
                        self.span,
                    );
                    ConstantValue::Undefined
                }
            },
            ExpressionKind::DataType => ConstantValue::Undefined,
            ExpressionKind::Unary { op, operand } => self.eval_unary(cx, ctx, *op, operand),
            ExpressionKind::Binary { op, lhs, rhs } => self.eval_binary(cx, ctx, *op, lhs, rhs),
            ExpressionKind::Conditional { cond, lhs, rhs } => {
                let cond_value = cond.eval(cx, ctx);
                if cond_value.is_undefined() {
                    return ConstantValue::Undefined;
                }
                let unknown = match &cond_value {
                    ConstantValue::Int(v) => v.has_unknown(),
                    _ => false,
                };
                if unknown {
                    // An ambiguous condition poisons the result.
                    return self.all_x_result();
                }
                if cond_value.is_true() {
                    lhs.eval(cx, ctx)
                } else {
                    rhs.eval(cx, ctx)
                }
            }
            ExpressionKind::Assignment { .. } => {
                ctx.not_constant("assignment is not allowed in a constant expression", self.span);
                ConstantValue::Undefined
            }
            ExpressionKind::Concat(operands) => {
                let mut result: Option<IntegerValue> = None;
                for operand in operands {
                    if operand.ty.is_void() {
                        continue;
                    }
                    let value = operand.eval(cx, ctx);
                    let value = match value.integer() {
                        Some(value) => value.clone(),
                        None => return ConstantValue::Undefined,
                    };
                    result = Some(match result {
                        None => value,
                        Some(acc) => acc.concat(&value),
                    });
                }
                match result {
                    Some(value) => ConstantValue::Int(value),
                    None => ConstantValue::Undefined,
                }
            }
            ExpressionKind::Replication { count, operand } => {
                let count_value = count.eval(cx, ctx);
                let count_value = match count_value.integer().and_then(|v| v.as_u32()) {
                    Some(v) => v,
                    None => return ConstantValue::Undefined,
                };
                if count_value == 0 {
                    return ConstantValue::Undefined;
                }
                let operand_value = operand.eval(cx, ctx);
                match operand_value.integer() {
                    Some(value) => ConstantValue::Int(value.replicate(count_value)),
                    None => ConstantValue::Undefined,
                }
            }
            ExpressionKind::ElementSelect { value, index } => {
                let array = value.eval(cx, ctx);
                let array = match array.integer() {
                    Some(v) => v.clone(),
                    None => return ConstantValue::Undefined,
                };
                let index_value = index.eval(cx, ctx);
                let index_value = match index_value.integer() {
                    Some(v) => v.clone(),
                    None => return ConstantValue::Undefined,
                };
                let elem_width = self.ty.bit_width().max(1);
                if index_value.has_unknown() {
                    return ConstantValue::Int(IntegerValue::all_x(elem_width, false));
                }
                let index_value = match index_value.as_i64() {
                    Some(v) => v,
                    None => return ConstantValue::Undefined,
                };
                match value.ty.packed_range() {
                    Some(range) => {
                        if !range.contains(index_value) {
                            return ConstantValue::Int(IntegerValue::all_x(elem_width, false));
                        }
                        let offset = range.translate_index(index_value) * elem_width as i64;
                        ConstantValue::Int(array.extract(offset, elem_width))
                    }
                    None => ConstantValue::Int(array.extract(index_value, elem_width)),
                }
            }
            ExpressionKind::RangeSelect {
                kind,
                value,
                left,
                right,
            } => {
                let array = value.eval(cx, ctx);
                let array = match array.integer() {
                    Some(v) => v.clone(),
                    None => return ConstantValue::Undefined,
                };
                let l = left.eval(cx, ctx).integer().and_then(|v| v.as_i64());
                let r = right.eval(cx, ctx).integer().and_then(|v| v.as_i64());
                let (l, r) = match (l, r) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return ConstantValue::Undefined,
                };
                let width = self.ty.bit_width();
                let elem_width = self
                    .ty
                    .element_type()
                    .map(|e| e.bit_width())
                    .unwrap_or(1)
                    .max(1);

                // Figure out the source-level index span being selected.
                let (lo_index, hi_index) = match kind {
                    RangeSelectionKind::Simple => (l.min(r), l.max(r)),
                    RangeSelectionKind::IndexedUp => (l, l + (width / elem_width) as i64 - 1),
                    RangeSelectionKind::IndexedDown => (l - (width / elem_width) as i64 + 1, l),
                };
                match value.ty.packed_range() {
                    Some(range) => {
                        let a = range.translate_index(lo_index);
                        let b = range.translate_index(hi_index);
                        let lsb = a.min(b) * elem_width as i64;
                        ConstantValue::Int(array.extract(lsb, width))
                    }
                    None => ConstantValue::Int(array.extract(lo_index, width)),
                }
            }
            ExpressionKind::MemberAccess { value, offset, .. } => {
                if value.ty.is_aggregate() {
                    ctx.not_constant(
                        "member access of an unpacked aggregate is not constant",
                        self.span,
                    );
                    return ConstantValue::Undefined;
                }
                let struct_value = value.eval(cx, ctx);
                match struct_value.integer() {
                    Some(v) => {
                        ConstantValue::Int(v.extract(*offset as i64, self.ty.bit_width().max(1)))
                    }
                    None => ConstantValue::Undefined,
                }
            }
            ExpressionKind::Call { target, args } => match target {
                CallTarget::System(subroutine) => subroutine.eval(cx, args, self.span, ctx),
                CallTarget::Subroutine(symbol) => {
                    ctx.not_constant(
                        format!("call to `{}` is not constant", symbol.name),
                        self.span,
                    );
                    ConstantValue::Undefined
                }
            },
            ExpressionKind::Conversion { kind, operand } => {
                self.eval_conversion(cx, ctx, *kind, operand)
            }
        }
    }

    fn all_x_result(&self) -> ConstantValue {
        let width = self.ty.bit_width().max(1);
        ConstantValue::Int(IntegerValue::all_x(width, self.ty.is_signed()))
    }

    fn eval_conversion(
        &self,
        cx: &Compilation<'gcx>,
        ctx: &mut EvalContext,
        _kind: ConversionKind,
        operand: &'gcx Expression<'gcx>,
    ) -> ConstantValue {
        let width = self.ty.bit_width().max(1);
        let signed = self.ty.is_signed();

        // An unbased unsized literal grows by filling every bit with its
        // single bit value rather than by zero extension.
        if let ExpressionKind::UnbasedUnsizedLiteral(bit) = operand.kind {
            return ConstantValue::Int(IntegerValue::from_bits(
                &vec![bit; width as usize],
                signed,
            ));
        }

        let value = operand.eval(cx, ctx);
        match value {
            ConstantValue::Int(v) => {
                if self.ty.is_floating() {
                    match v.as_i64() {
                        Some(i) => ConstantValue::Real(i as f64),
                        None => ConstantValue::Real(std::f64::NAN),
                    }
                } else {
                    ConstantValue::Int(v.resize(width, signed))
                }
            }
            ConstantValue::Real(r) => {
                if self.ty.is_floating() {
                    ConstantValue::Real(r)
                } else {
                    ConstantValue::Int(IntegerValue::from_i64(width, signed, r as i64))
                }
            }
            other => other,
        }
    }

    fn eval_unary(
        &self,
        cx: &Compilation<'gcx>,
        ctx: &mut EvalContext,
        op: UnaryOperator,
        operand: &'gcx Expression<'gcx>,
    ) -> ConstantValue {
        let value = operand.eval(cx, ctx);
        if value.is_undefined() {
            return ConstantValue::Undefined;
        }

        // Real operands only support a few of the operators.
        if let ConstantValue::Real(r) = value {
            return match op {
                UnaryOperator::Plus => ConstantValue::Real(r),
                UnaryOperator::Minus => ConstantValue::Real(-r),
                UnaryOperator::LogicalNot => {
                    ConstantValue::Int(IntegerValue::from_u64(1, false, (r == 0.0) as u64))
                }
                _ => {
                    ctx.not_constant("invalid real operand", self.span);
                    ConstantValue::Undefined
                }
            };
        }

        let v = match value.integer() {
            Some(v) => v.clone(),
            None => return ConstantValue::Undefined,
        };
        let width = self.ty.bit_width().max(1);
        let signed = self.ty.is_signed();

        let result = match op {
            UnaryOperator::Plus => v.resize(width, signed),
            UnaryOperator::Minus => v.negate(width.max(v.width()), signed),
            UnaryOperator::BitwiseNot => v.not().resize(width, signed),
            UnaryOperator::BitwiseAnd => bit_result(v.reduce(LogicBit::and)),
            UnaryOperator::BitwiseOr => bit_result(v.reduce(LogicBit::or)),
            UnaryOperator::BitwiseXor => bit_result(v.reduce(LogicBit::xor)),
            UnaryOperator::BitwiseNand => bit_result(v.reduce(LogicBit::and).not()),
            UnaryOperator::BitwiseNor => bit_result(v.reduce(LogicBit::or).not()),
            UnaryOperator::BitwiseXnor => bit_result(v.reduce(LogicBit::xor).not()),
            UnaryOperator::LogicalNot => {
                if v.has_unknown() {
                    IntegerValue::all_x(1, false)
                } else {
                    IntegerValue::from_u64(1, false, v.is_zero() as u64)
                }
            }
            UnaryOperator::Preincrement
            | UnaryOperator::Predecrement
            | UnaryOperator::Postincrement
            | UnaryOperator::Postdecrement => {
                ctx.not_constant(
                    "increment and decrement are not allowed in constant expressions",
                    self.span,
                );
                return ConstantValue::Undefined;
            }
        };
        ConstantValue::Int(result)
    }

    fn eval_binary(
        &self,
        cx: &Compilation<'gcx>,
        ctx: &mut EvalContext,
        op: BinaryOperator,
        lhs: &'gcx Expression<'gcx>,
        rhs: &'gcx Expression<'gcx>,
    ) -> ConstantValue {
        let lv = lhs.eval(cx, ctx);
        let rv = rhs.eval(cx, ctx);
        if lv.is_undefined() || rv.is_undefined() {
            return ConstantValue::Undefined;
        }

        // Mixed or real arithmetic happens in floating point.
        if matches!(lv, ConstantValue::Real(..)) || matches!(rv, ConstantValue::Real(..)) {
            return self.eval_binary_real(ctx, op, &lv, &rv);
        }

        let l = match lv.integer() {
            Some(v) => v.clone(),
            None => return ConstantValue::Undefined,
        };
        let r = match rv.integer() {
            Some(v) => v.clone(),
            None => return ConstantValue::Undefined,
        };
        let width = self.ty.bit_width().max(1);
        let signed = self.ty.is_signed();

        let result = match op {
            BinaryOperator::Add => l.add(&r, width, signed),
            BinaryOperator::Subtract => l.sub(&r, width, signed),
            BinaryOperator::Multiply => l.mul(&r, width, signed),
            BinaryOperator::Divide => l.div(&r, width, signed),
            BinaryOperator::Mod => l.rem(&r, width, signed),
            BinaryOperator::Power => l.pow(&r, width, signed),
            BinaryOperator::BinaryAnd => l.and(&r, width, signed),
            BinaryOperator::BinaryOr => l.or(&r, width, signed),
            BinaryOperator::BinaryXor => l.xor(&r, width, signed),
            BinaryOperator::BinaryXnor => l.xnor(&r, width, signed),
            BinaryOperator::LogicalShiftLeft => l.shl(&r),
            BinaryOperator::LogicalShiftRight => l.shr(&r, false),
            BinaryOperator::ArithmeticShiftLeft => l.shl(&r),
            BinaryOperator::ArithmeticShiftRight => l.shr(&r, true),
            BinaryOperator::Equality => bit_result(l.logic_eq(&r)),
            BinaryOperator::Inequality => bit_result(l.logic_eq(&r).not()),
            BinaryOperator::CaseEquality => {
                IntegerValue::from_u64(1, false, l.case_eq(&r) as u64)
            }
            BinaryOperator::CaseInequality => {
                IntegerValue::from_u64(1, false, !l.case_eq(&r) as u64)
            }
            BinaryOperator::WildcardEquality => bit_result(l.wildcard_eq(&r)),
            BinaryOperator::WildcardInequality => bit_result(l.wildcard_eq(&r).not()),
            BinaryOperator::LessThan => bit_result(l.compare_lt(&r)),
            BinaryOperator::GreaterThan => bit_result(r.compare_lt(&l)),
            BinaryOperator::LessThanEqual => bit_result(r.compare_lt(&l).not()),
            BinaryOperator::GreaterThanEqual => bit_result(l.compare_lt(&r).not()),
            BinaryOperator::LogicalAnd => logic_bool(&l, &r, |a, b| LogicBit::and(a, b)),
            BinaryOperator::LogicalOr => logic_bool(&l, &r, |a, b| LogicBit::or(a, b)),
            BinaryOperator::LogicalImplication => {
                logic_bool(&l, &r, |a, b| LogicBit::or(a.not(), b))
            }
            BinaryOperator::LogicalEquivalence => {
                logic_bool(&l, &r, |a, b| LogicBit::xor(a, b).not())
            }
        };
        ConstantValue::Int(result)
    }

    fn eval_binary_real(
        &self,
        ctx: &mut EvalContext,
        op: BinaryOperator,
        lv: &ConstantValue,
        rv: &ConstantValue,
    ) -> ConstantValue {
        let l = match lv.to_real() {
            Some(v) => v,
            None => return ConstantValue::Undefined,
        };
        let r = match rv.to_real() {
            Some(v) => v,
            None => return ConstantValue::Undefined,
        };
        let bool_result = |b: bool| ConstantValue::Int(IntegerValue::from_u64(1, false, b as u64));
        match op {
            BinaryOperator::Add => ConstantValue::Real(l + r),
            BinaryOperator::Subtract => ConstantValue::Real(l - r),
            BinaryOperator::Multiply => ConstantValue::Real(l * r),
            BinaryOperator::Divide => ConstantValue::Real(l / r),
            BinaryOperator::Power => ConstantValue::Real(l.powf(r)),
            BinaryOperator::Equality => bool_result(l == r),
            BinaryOperator::Inequality => bool_result(l != r),
            BinaryOperator::LessThan => bool_result(l < r),
            BinaryOperator::LessThanEqual => bool_result(l <= r),
            BinaryOperator::GreaterThan => bool_result(l > r),
            BinaryOperator::GreaterThanEqual => bool_result(l >= r),
            BinaryOperator::LogicalAnd => bool_result(l != 0.0 && r != 0.0),
            BinaryOperator::LogicalOr => bool_result(l != 0.0 || r != 0.0),
            BinaryOperator::LogicalImplication => bool_result(l == 0.0 || r != 0.0),
            BinaryOperator::LogicalEquivalence => bool_result((l != 0.0) == (r != 0.0)),
            _ => {
                ctx.not_constant("operator is not defined for real operands", self.span);
                ConstantValue::Undefined
            }
        }
    }
}

fn bit_result(bit: LogicBit) -> IntegerValue {
    IntegerValue::from_bits(&[bit], false)
}

fn logic_bool(
    l: &IntegerValue,
    r: &IntegerValue,
    f: impl Fn(LogicBit, LogicBit) -> LogicBit,
) -> IntegerValue {
    let lb = if l.has_unknown() {
        LogicBit::X
    } else {
        LogicBit::from_bool(!l.is_zero())
    };
    let rb = if r.has_unknown() {
        LogicBit::X
    } else {
        LogicBit::from_bool(!r.is_zero())
    };
    bit_result(f(lb, rb))
}
