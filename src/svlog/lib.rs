//! Semantic analysis for SystemVerilog: an interned type graph, a
//! hierarchical symbol and scope model with lazy member evaluation, an
//! expression binder with the language's context-determined operand rules,
//! and a compile-time constant evaluator. The `Compilation` in this crate
//! ties any number of parsed syntax trees into one symbol graph.

#[macro_use]
extern crate log;
#[macro_use]
extern crate bitflags;

pub mod binder;
pub mod builtins;
pub mod compilation;
pub mod eval;
pub mod symbols;
pub mod ty;
pub mod value;

#[cfg(test)]
mod tests;

pub use crate::binder::{BindContext, BindFlags, Expression, ExpressionKind};
pub use crate::compilation::{Compilation, CompilationError, GlobalArenas};
pub use crate::eval::EvalContext;
pub use crate::symbols::{LookupLocation, LookupNameKind, Scope, Symbol, SymbolKind};
pub use crate::ty::{IntegralFlags, Type, TypeKind};
pub use crate::value::{ConstantValue, IntegerValue, LogicBit};
