//! This crate implements lexing, preprocessing, and parsing of SystemVerilog
//! source files into an abstract syntax tree.
//!
//! Control is pull-based: the parser calls `next()` on the preprocessor,
//! which in turn drives a stack of lexers that grows with every `include
//! directive. The emitted token stream carries all whitespace, comments, and
//! processed directives as trivia, such that the original source text can be
//! reconstructed from it verbatim.

#[macro_use]
extern crate log;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;

pub mod ast;
pub mod keywords;
pub mod lexer;
pub mod parser;
pub mod preproc;
pub mod token;
pub mod tree;

pub use crate::keywords::{Kw, KeywordVersion};
pub use crate::lexer::{Lexer, LexerMode, LexerOptions};
pub use crate::preproc::{Preprocessor, PreprocessorOptions};
pub use crate::token::{DirectiveKind, Op, Token, TokenKind, Trivia};
pub use crate::tree::SyntaxTree;
