//! A SystemVerilog compiler front end.
//!
//! This umbrella crate ties the pieces together: the shared infrastructure
//! in [`common`], the lexer/preprocessor/parser in [`syntax`], and the type
//! system, symbol graph, and expression binder in [`svlog`].
//!
//! A typical embedding registers source text with a [`SourceManager`],
//! parses it into [`SyntaxTree`]s, and feeds those to a
//! [`svlog::Compilation`]:
//!
//! ```
//! use std::rc::Rc;
//! use mead::common::source::SourceManager;
//! use mead::syntax::SyntaxTree;
//! use mead::svlog::{Compilation, GlobalArenas};
//!
//! let sm = Rc::new(SourceManager::new());
//! let tree = SyntaxTree::from_text(sm, "module top; int x = 42; endmodule");
//!
//! let arena = GlobalArenas::default();
//! let compilation = Compilation::new(&arena);
//! compilation.add_syntax_tree(tree).unwrap();
//! let root = compilation.get_root();
//! assert_eq!(compilation.top_instances().len(), 1);
//! assert!(compilation.get_all_diagnostics().is_empty());
//! # let _ = root;
//! ```

// Re-export everything from the common crate.
pub extern crate mead_common as common;
pub use crate::common::*;

// Pull in the language crates.
pub extern crate mead_svlog as svlog;
pub extern crate mead_svlog_syntax as syntax;
