//! A parsed syntax tree together with the diagnostics produced while lexing,
//! preprocessing, and parsing it.

use crate::ast;
use crate::parser::Parser;
use crate::preproc::{Preprocessor, PreprocessorOptions};
use mead_common::errors::{Diagnostic, Diagnostics};
use mead_common::source::{Source, SourceManager};
use std::rc::Rc;

/// The result of parsing one source buffer: the root syntax node, the
/// diagnostics collected on the way, and the source manager that owns the
/// underlying text.
pub struct SyntaxTree {
    root: ast::SourceUnit,
    diagnostics: Rc<Diagnostics>,
    sm: Rc<SourceManager>,
}

impl SyntaxTree {
    /// Parse a buffer that has been registered with the source manager.
    pub fn from_source(sm: Rc<SourceManager>, source: Source) -> Rc<SyntaxTree> {
        SyntaxTree::from_source_with_options(sm, source, Default::default())
    }

    pub fn from_source_with_options(
        sm: Rc<SourceManager>,
        source: Source,
        options: PreprocessorOptions,
    ) -> Rc<SyntaxTree> {
        let diagnostics = Rc::new(Diagnostics::new());
        let mut pp = Preprocessor::new(sm.clone(), diagnostics.clone(), options);
        pp.push_source(source);
        let mut parser = Parser::new(&mut pp);
        let root = parser.parse_source_unit();
        Rc::new(SyntaxTree {
            root: root,
            diagnostics: diagnostics,
            sm: sm,
        })
    }

    /// Register the given text as an anonymous buffer and parse it.
    pub fn from_text(sm: Rc<SourceManager>, text: &str) -> Rc<SyntaxTree> {
        let source = sm.add_anonymous(text);
        SyntaxTree::from_source(sm, source)
    }

    pub fn root(&self) -> &ast::SourceUnit {
        &self.root
    }

    pub fn source_manager(&self) -> &Rc<SourceManager> {
        &self.sm
    }

    /// The lexer, preprocessor, and parser diagnostics for this tree.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.collect()
    }
}

/// Parse a standalone expression, e.g. for tests and tools.
pub fn parse_expression_text(sm: Rc<SourceManager>, text: &str) -> (Option<Rc<ast::Expr>>, Vec<Diagnostic>) {
    let source = sm.add_anonymous(text);
    let diagnostics = Rc::new(Diagnostics::new());
    let mut pp = Preprocessor::new(sm, diagnostics.clone(), Default::default());
    pp.push_source(source);
    let mut parser = Parser::new(&mut pp);
    let expr = parser.parse_expression().ok();
    (expr, diagnostics.collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_a_tree() {
        let sm = Rc::new(SourceManager::new());
        let tree = SyntaxTree::from_text(sm, "module top; int x = 1; endmodule");
        assert!(tree.diagnostics().is_empty());
        assert_eq!(tree.root().members.len(), 1);
    }
}
