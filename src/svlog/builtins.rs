//! Built-in system subroutines.
//!
//! System subroutines are variadic as far as the binder is concerned; each
//! implementation checks its own argument list and reports the result type.

use crate::binder::Expression;
use crate::compilation::Compilation;
use crate::eval::EvalContext;
use crate::ty::Type;
use crate::value::{ConstantValue, IntegerValue};
use mead_common::errors::{DiagCode, Diagnostic};
use mead_common::source::Span;
use num::traits::Zero;
use std::rc::Rc;

pub trait SystemSubroutine {
    /// The name without the leading `$`.
    fn name(&self) -> &'static str;

    /// Whether the first argument may be a data type.
    fn allow_data_type_arg(&self) -> bool {
        false
    }

    /// Check the bound arguments and report the return type; the error type
    /// marks a failed check.
    fn check_arguments<'gcx>(
        &self,
        cx: &Compilation<'gcx>,
        args: &[&'gcx Expression<'gcx>],
        span: Span,
    ) -> Type<'gcx>;

    /// Evaluate a call at compile time.
    fn eval<'gcx>(
        &self,
        cx: &Compilation<'gcx>,
        args: &[&'gcx Expression<'gcx>],
        span: Span,
        ctx: &mut EvalContext,
    ) -> ConstantValue;
}

/// All subroutines registered with a new compilation.
pub fn all() -> Vec<Rc<dyn SystemSubroutine>> {
    vec![Rc::new(Clog2), Rc::new(Bits)]
}

fn check_arg_count<'gcx>(
    cx: &Compilation<'gcx>,
    name: &str,
    args: &[&'gcx Expression<'gcx>],
    expected: usize,
    span: Span,
) -> bool {
    if args.len() != expected {
        cx.emit(
            Diagnostic::error(DiagCode::TooManyArguments, span).with_message(format!(
                "${} expects {} argument(s), found {}",
                name,
                expected,
                args.len()
            )),
        );
        return false;
    }
    true
}

/// `$clog2(n)`: the ceiling of the base-2 logarithm.
pub struct Clog2;

impl SystemSubroutine for Clog2 {
    fn name(&self) -> &'static str {
        "clog2"
    }

    fn check_arguments<'gcx>(
        &self,
        cx: &Compilation<'gcx>,
        args: &[&'gcx Expression<'gcx>],
        span: Span,
    ) -> Type<'gcx> {
        if !check_arg_count(cx, self.name(), args, 1, span) {
            return cx.error_type();
        }
        if !args[0].ty.is_integral() {
            cx.emit(Diagnostic::error(DiagCode::BadUnaryExpression, args[0].span));
            return cx.error_type();
        }
        cx.int_type()
    }

    fn eval<'gcx>(
        &self,
        cx: &Compilation<'gcx>,
        args: &[&'gcx Expression<'gcx>],
        span: Span,
        ctx: &mut EvalContext,
    ) -> ConstantValue {
        let value = args[0].eval(cx, ctx);
        let value = match value.integer() {
            Some(v) if !v.has_unknown() => v.signed_value(),
            _ => {
                ctx.not_constant("argument to $clog2 is not a known constant", span);
                return ConstantValue::Undefined;
            }
        };
        // clog2(x) is the number of bits needed to address x items.
        let result = if value.is_zero() {
            0
        } else {
            (value - num::bigint::BigInt::from(1)).bits() as i64
        };
        ConstantValue::Int(IntegerValue::from_i64(32, true, result))
    }
}

/// `$bits(x)`: the bit width of an expression or data type.
pub struct Bits;

impl SystemSubroutine for Bits {
    fn name(&self) -> &'static str {
        "bits"
    }

    fn allow_data_type_arg(&self) -> bool {
        true
    }

    fn check_arguments<'gcx>(
        &self,
        cx: &Compilation<'gcx>,
        args: &[&'gcx Expression<'gcx>],
        span: Span,
    ) -> Type<'gcx> {
        if !check_arg_count(cx, self.name(), args, 1, span) {
            return cx.error_type();
        }
        if args[0].ty.bit_width() == 0 {
            cx.emit(Diagnostic::error(DiagCode::BadUnaryExpression, args[0].span));
            return cx.error_type();
        }
        cx.int_type()
    }

    fn eval<'gcx>(
        &self,
        _cx: &Compilation<'gcx>,
        args: &[&'gcx Expression<'gcx>],
        _span: Span,
        _ctx: &mut EvalContext,
    ) -> ConstantValue {
        ConstantValue::Int(IntegerValue::from_i64(
            32,
            true,
            args[0].ty.bit_width() as i64,
        ))
    }
}
