//! The preprocessor sits between the lexers and the parser. It handles the
//! messy business of include directives, conditional compilation, and macro
//! expansion, and presents the parser with one coherent token stream.
//!
//! Internally it drives a stack of lexers; every `include pushes a new one.
//! Work performed for a directive is attached to the next emitted token as
//! trivia, so the consumer sees an uninterrupted stream.

use crate::ast::Directive;
use crate::keywords::{Kw, KeywordVersion};
use crate::lexer::{concatenate_tokens, stringify_tokens, Lexer, LexerMode, LexerOptions};
use crate::token::*;
use mead_common::errors::{DiagCode, Diagnostic, Diagnostics};
use mead_common::name::{get_name_table, Name, RcStr};
use mead_common::source::{Location, Source, SourceManager, INVALID_LOCATION};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Options that control preprocessing behavior.
#[derive(Clone, Debug)]
pub struct PreprocessorOptions {
    /// The maximum depth of the include stack; further attempts to include a
    /// file will result in an error.
    pub max_include_depth: u32,
    /// The name to associate with errors produced by macros specified via
    /// the `predefines` option.
    pub predefine_source: String,
    /// Macros to predefine, in the form `NAME=value` or just `NAME` (which
    /// defines it to `1`).
    pub predefines: Vec<String>,
    /// Macro names to undefine at the start of preprocessing.
    pub undefines: Vec<String>,
}

impl Default for PreprocessorOptions {
    fn default() -> PreprocessorOptions {
        PreprocessorOptions {
            max_include_depth: 1024,
            predefine_source: "<api>".to_string(),
            predefines: Vec::new(),
            undefines: Vec::new(),
        }
    }
}

/// Intrinsic macros whose expansion is computed at the usage site.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum MacroIntrinsic {
    Line,
    File,
}

/// A formal argument of a function-like macro.
#[derive(Clone, Debug)]
struct MacroFormal {
    name: Name,
    default: Option<Vec<Token>>,
}

/// A saved macro definition.
#[derive(Clone, Debug)]
struct MacroDef {
    intrinsic: Option<MacroIntrinsic>,
    formals: Option<Vec<MacroFormal>>,
    body: Vec<Token>,
}

impl MacroDef {
    fn needs_args(&self) -> bool {
        self.intrinsic.is_none() && self.formals.is_some()
    }
}

/// One frame of the conditional-compilation branch stack.
struct BranchEntry {
    /// Whether any sibling branch in this chain has been taken yet; used to
    /// decide whether an `elsif or `else branch should be taken.
    any_taken: bool,
    /// Whether the current branch is active.
    current_active: bool,
    /// Whether this chain has seen an `else already.
    has_else: bool,
}

/// The `line directive state for `__LINE__`/`__FILE__`.
struct LineOverride {
    source: Source,
    anchor_line: usize,
    line: u64,
    file: RcStr,
}

/// Interface between lexer and parser, handling all compiler directives.
pub struct Preprocessor {
    sm: Rc<SourceManager>,
    diagnostics: Rc<Diagnostics>,
    options: PreprocessorOptions,
    lexer_options: LexerOptions,

    /// Stack of active lexers; each `include pushes a new one.
    lexer_stack: Vec<Lexer>,
    /// Nested conditional directive state.
    branch_stack: Vec<BranchEntry>,
    /// Macro name to definition.
    macros: HashMap<Name, MacroDef>,
    /// Expanded macro tokens to drain before continuing with the lexers.
    expanded: VecDeque<Token>,
    /// A token consumed by `peek` but not yet used.
    current: Option<Token>,
    /// A token pulled ahead while checking for implicit concatenation.
    lookahead: Option<Token>,
    /// Directives are not processed while lexing a macro body.
    in_macro_body: bool,
    /// Total macro expansions performed for the current top-level usage;
    /// guards against recursive macros.
    expansion_count: u32,

    base_keyword_version: KeywordVersion,
    keyword_stack: Vec<KeywordVersion>,
    timescale: Option<Timescale>,
    default_net_type: TokenKind,
    line_override: Option<LineOverride>,
}

const MAX_EXPANSIONS: u32 = 1024;

impl Preprocessor {
    pub fn new(
        sm: Rc<SourceManager>,
        diagnostics: Rc<Diagnostics>,
        options: PreprocessorOptions,
    ) -> Preprocessor {
        let nt = get_name_table();
        let mut macros = HashMap::new();
        macros.insert(
            nt.intern("__LINE__"),
            MacroDef {
                intrinsic: Some(MacroIntrinsic::Line),
                formals: None,
                body: Vec::new(),
            },
        );
        macros.insert(
            nt.intern("__FILE__"),
            MacroDef {
                intrinsic: Some(MacroIntrinsic::File),
                formals: None,
                body: Vec::new(),
            },
        );

        let mut pp = Preprocessor {
            sm: sm,
            diagnostics: diagnostics,
            options: options.clone(),
            lexer_options: LexerOptions::default(),
            lexer_stack: Vec::new(),
            branch_stack: Vec::new(),
            macros: macros,
            expanded: VecDeque::new(),
            current: None,
            lookahead: None,
            in_macro_body: false,
            expansion_count: 0,
            base_keyword_version: KeywordVersion::default(),
            keyword_stack: vec![KeywordVersion::default()],
            timescale: None,
            default_net_type: TokenKind::Keyword(Kw::Wire),
            line_override: None,
        };

        let file_name = options.predefine_source.clone();
        for predef in &options.predefines {
            pp.predefine(predef, &file_name);
        }
        for undef in &options.undefines {
            pp.undefine(undef);
        }
        pp
    }

    /// Push a source buffer onto the lexer stack.
    pub fn push_source(&mut self, source: Source) {
        let lexer = Lexer::new(source, &self.sm, self.diagnostics.clone(), self.lexer_options);
        self.lexer_stack.push(lexer);
    }

    /// Register the given text as an anonymous buffer and push it.
    pub fn push_text(&mut self, text: &str) -> Source {
        let source = self.sm.add_anonymous(text);
        self.push_source(source);
        source
    }

    /// Predefine a macro. The definition string is lexed as if it appeared
    /// after a `define directive in a source file.
    pub fn predefine(&mut self, definition: &str, _file_name: &str) {
        let (name, value) = match definition.find('=') {
            Some(idx) => (&definition[..idx], &definition[idx + 1..]),
            None => (definition, "1"),
        };
        let text = format!("`define {} {}\n", name, value);
        let source = self.sm.add_anonymous(text);

        // Process the definition on a pristine stack so that it cannot eat
        // into tokens of whatever is currently being preprocessed.
        let saved_stack = std::mem::replace(&mut self.lexer_stack, Vec::new());
        let saved_current = self.current.take();
        let saved_lookahead = self.lookahead.take();
        let saved_expanded = std::mem::replace(&mut self.expanded, VecDeque::new());
        self.push_source(source);
        loop {
            if self.next().kind == TokenKind::Eof {
                break;
            }
        }
        self.lexer_stack = saved_stack;
        self.current = saved_current;
        self.lookahead = saved_lookahead;
        self.expanded = saved_expanded;
    }

    /// Undefine a previously defined macro. Returns false if the macro is
    /// not defined or is an intrinsic.
    pub fn undefine(&mut self, name: &str) -> bool {
        let name = get_name_table().intern(name);
        match self.macros.get(&name) {
            Some(def) if def.intrinsic.is_none() => {
                self.macros.remove(&name);
                true
            }
            _ => false,
        }
    }

    /// Undefine all user-defined macros.
    pub fn undefine_all(&mut self) {
        self.macros.retain(|_, def| def.intrinsic.is_some());
    }

    /// Check whether a macro is defined. Intrinsics count as defined.
    pub fn is_defined(&self, name: &str) -> bool {
        get_name_table()
            .find(name)
            .map(|n| self.macros.contains_key(&n))
            .unwrap_or(false)
    }

    /// Set the base keyword version for the current compilation unit. This
    /// does not override versions explicitly requested via `begin_keywords.
    pub fn set_keyword_version(&mut self, version: KeywordVersion) {
        self.base_keyword_version = version;
        self.keyword_stack[0] = version;
    }

    /// Reset the state of all compiler directives, as if `resetall had been
    /// encountered. Macro definitions are left alone.
    pub fn reset_all_directives(&mut self) {
        self.keyword_stack = vec![self.base_keyword_version];
        self.timescale = None;
        self.default_net_type = TokenKind::Keyword(Kw::Wire);
        self.line_override = None;
    }

    /// The currently active timescale, if any has been set.
    pub fn timescale(&self) -> Option<Timescale> {
        self.timescale
    }

    /// The default net type; `TokenKind::Unknown` if set to `none`.
    pub fn default_net_type(&self) -> TokenKind {
        self.default_net_type
    }

    pub fn source_manager(&self) -> &Rc<SourceManager> {
        &self.sm
    }

    pub fn diagnostics(&self) -> &Rc<Diagnostics> {
        &self.diagnostics
    }

    fn keyword_version(&self) -> KeywordVersion {
        *self.keyword_stack.last().unwrap()
    }

    /// Get the next token in the stream, after applying preprocessor rules.
    pub fn next(&mut self) -> Token {
        self.next_mode(LexerMode::Normal)
    }

    fn next_mode(&mut self, mode: LexerMode) -> Token {
        let mut extra_trivia = Vec::new();
        let mut token = loop {
            let mut token = self.next_raw(mode);
            if !self.in_macro_body && token.kind.is_directive() {
                token = self.handle_directives(mode, token);
            }
            // Placeholders for omitted macro arguments never reach the
            // consumer; their trivia carries over to the next token.
            if token.kind == TokenKind::EmptyMacroArgument {
                extra_trivia.extend(token.trivia);
                continue;
            }
            break token;
        };
        if !extra_trivia.is_empty() {
            extra_trivia.extend(token.trivia);
            token.trivia = extra_trivia;
        }

        // Implicit concatenation: a macro-expanded token that abuts its
        // neighbor re-lexes into a single token with it where possible.
        loop {
            if token.kind == TokenKind::Eof {
                break;
            }
            let next = match self.lookahead.take() {
                Some(t) => t,
                None => self.next_raw(mode),
            };

            // Resolve an abutting macro usage first so that its expansion
            // can take part in the merge.
            let next = if next.kind.is_directive()
                && next.trivia.is_empty()
                && matches!(
                    next.kind,
                    TokenKind::Directive(DirectiveKind::MacroUsage)
                )
                && !self.in_macro_body
            {
                self.handle_directives(mode, next)
            } else {
                next
            };

            let abuts = next
                .trivia
                .iter()
                .all(|t| matches!(t, Trivia::Directive(_)));
            let involves_macro = token.flags.contains(TokenFlags::FROM_MACRO)
                || next.flags.contains(TokenFlags::FROM_MACRO);

            if abuts && involves_macro && next.kind != TokenKind::Eof {
                if let Some(merged) = concatenate_tokens(&token, &next) {
                    trace!("implicit concatenation: {} ++ {}", token.raw, next.raw);
                    token = merged;
                    continue;
                }
            }
            self.lookahead = Some(next);
            break;
        }
        token
    }

    /// Pull the next token from the expansion queue or the lexer stack,
    /// without processing directives.
    fn next_raw(&mut self, mode: LexerMode) -> Token {
        if let Some(token) = self.current.take() {
            return token;
        }
        if let Some(token) = self.lookahead.take() {
            return token;
        }
        if let Some(token) = self.expanded.pop_front() {
            return token;
        }

        let mut pending_trivia: Vec<Trivia> = Vec::new();
        loop {
            let version = self.keyword_version();
            let lexer = match self.lexer_stack.last_mut() {
                Some(lexer) => lexer,
                None => return Token::new(TokenKind::Eof, INVALID_LOCATION, RcStr::new("")),
            };
            let mut token = lexer.lex(mode, version);
            if token.kind == TokenKind::Eof && self.lexer_stack.len() > 1 {
                // The include file is exhausted; keep its trailing trivia
                // and continue with the enclosing file.
                self.lexer_stack.pop();
                pending_trivia.extend(token.trivia);
                continue;
            }
            if !pending_trivia.is_empty() {
                pending_trivia.extend(token.trivia);
                token.trivia = pending_trivia;
            }
            return token;
        }
    }

    fn peek(&mut self, mode: LexerMode) -> &Token {
        if self.current.is_none() {
            self.current = Some(self.next_raw(mode));
        }
        self.current.as_ref().unwrap()
    }

    fn consume(&mut self, mode: LexerMode) -> Token {
        self.peek(mode);
        self.current.take().unwrap()
    }

    fn expect(&mut self, kind: TokenKind, mode: LexerMode) -> Token {
        if self.peek(mode).kind == kind {
            return self.consume(mode);
        }
        let loc = self.peek(mode).loc;
        self.add_error(DiagCode::ExpectedToken, loc);
        Token::missing(kind, loc)
    }

    fn add_error(&self, code: DiagCode, loc: Location) {
        self.diagnostics.add(Diagnostic::error(code, loc));
    }

    /// Dispatch directives until a normal token appears, accumulating the
    /// processed work as trivia on that token.
    fn handle_directives(&mut self, mode: LexerMode, mut token: Token) -> Token {
        let mut trivia: Vec<Trivia> = Vec::new();
        loop {
            match token.kind {
                TokenKind::Directive(kind) => {
                    trivia.extend(token.trivia.drain(..));
                    match kind {
                        DirectiveKind::Include => self.handle_include(token, &mut trivia),
                        DirectiveKind::Define => self.handle_define(token, &mut trivia),
                        DirectiveKind::MacroUsage | DirectiveKind::Unknown => {
                            self.handle_macro_usage(token, &mut trivia)
                        }
                        DirectiveKind::IfDef => self.handle_ifdef(token, false, &mut trivia),
                        DirectiveKind::IfNDef => self.handle_ifdef(token, true, &mut trivia),
                        DirectiveKind::ElsIf => self.handle_elsif(token, &mut trivia),
                        DirectiveKind::Else => self.handle_else(token, &mut trivia),
                        DirectiveKind::EndIf => self.handle_endif(token, &mut trivia),
                        DirectiveKind::Timescale => self.handle_timescale(token, &mut trivia),
                        DirectiveKind::DefaultNetType => {
                            self.handle_default_net_type(token, &mut trivia)
                        }
                        DirectiveKind::Line => self.handle_line(token, &mut trivia),
                        DirectiveKind::Undef => self.handle_undef(token, &mut trivia),
                        DirectiveKind::UndefineAll => {
                            self.undefine_all();
                            self.create_simple_directive(kind, token, &mut trivia);
                        }
                        DirectiveKind::ResetAll => {
                            self.reset_all_directives();
                            self.create_simple_directive(kind, token, &mut trivia);
                        }
                        DirectiveKind::BeginKeywords => {
                            self.handle_begin_keywords(token, &mut trivia)
                        }
                        DirectiveKind::EndKeywords => self.handle_end_keywords(token, &mut trivia),
                        DirectiveKind::Pragma
                        | DirectiveKind::CellDefine
                        | DirectiveKind::EndCellDefine
                        | DirectiveKind::UnconnectedDrive
                        | DirectiveKind::NoUnconnectedDrive => {
                            self.create_simple_directive(kind, token, &mut trivia);
                        }
                    }
                    token = self.next_raw(mode);
                }
                _ => {
                    trivia.extend(token.trivia.drain(..));
                    token.trivia = trivia;
                    return token;
                }
            }
        }
    }

    /// Consume the rest of the current directive line. Extra tokens before
    /// the end of the directive are collected and reported.
    fn parse_eod(&mut self, suppress_error: bool) -> (Vec<Token>, Token) {
        let mut extras = Vec::new();
        loop {
            let token = self.next_raw(LexerMode::Directive);
            match token.kind {
                TokenKind::EndOfDirective | TokenKind::Eof => return (extras, token),
                _ => {
                    if extras.is_empty() && !suppress_error {
                        self.add_error(DiagCode::ExpectedEndOfDirective, token.loc);
                    }
                    extras.push(token);
                }
            }
        }
    }

    fn finish_directive(
        &mut self,
        kind: DirectiveKind,
        mut tokens: Vec<Token>,
        trivia: &mut Vec<Trivia>,
    ) {
        let (extras, eod) = self.parse_eod(true);
        tokens.extend(extras);
        tokens.push(eod);
        trivia.push(Trivia::Directive(Rc::new(Directive::new(kind, tokens))));
    }

    fn create_simple_directive(
        &mut self,
        kind: DirectiveKind,
        directive: Token,
        trivia: &mut Vec<Trivia>,
    ) {
        self.finish_directive(kind, vec![directive], trivia);
    }

    // ------------------------------------------------------------------
    // Include handling
    // ------------------------------------------------------------------

    fn handle_include(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let mut tokens = vec![directive.clone()];
        let mut file_token = self.next_raw(LexerMode::IncludeFileName);

        // The file name may come from a macro expansion.
        if file_token.kind.is_directive() {
            tokens.push(file_token.clone());
            self.expand_usage_inline(file_token.clone(), &mut tokens);
            file_token = self.next_raw(LexerMode::Normal);
        }
        tokens.push(file_token.clone());

        let path = file_token.raw.clone();
        let valid = match file_token.kind {
            TokenKind::IncludeFileName | TokenKind::StringLiteral => {
                !file_token.is_missing() && path.len() >= 3
            }
            _ => false,
        };

        if !valid {
            self.add_error(DiagCode::ExpectedIncludeFileName, file_token.loc);
            self.finish_directive(DirectiveKind::Include, tokens, trivia);
            return;
        }

        let system = path.starts_with('<');
        let name = &path[1..path.len() - 1];

        if self.lexer_stack.len() as u32 >= self.options.max_include_depth {
            self.add_error(DiagCode::ExceededMaxIncludeDepth, file_token.loc);
        } else {
            let from = self
                .lexer_stack
                .last()
                .map(|l| l.source())
                .unwrap_or(mead_common::source::INVALID_SOURCE);
            match self.sm.open_include(name, from, system) {
                Some(source) => {
                    debug!("including {:?}", self.sm.get_path(source));
                    self.push_source(source);
                }
                None => {
                    self.diagnostics.add(
                        Diagnostic::error(DiagCode::ExpectedIncludeFileName, file_token.loc)
                            .with_message(format!("could not find or open include file {}", path)),
                    );
                }
            }
        }

        self.finish_directive(DirectiveKind::Include, tokens, trivia);
    }

    // ------------------------------------------------------------------
    // Macro definition and expansion
    // ------------------------------------------------------------------

    fn handle_define(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let mut tokens = vec![directive];
        let mut bad = false;

        let name_token = self.consume(LexerMode::Directive);
        let name = match name_token.kind {
            TokenKind::Ident | TokenKind::EscIdent => name_token.name().unwrap(),
            TokenKind::EndOfDirective | TokenKind::Eof => {
                self.add_error(DiagCode::ExpectedIdentifier, name_token.loc);
                tokens.push(name_token);
                trivia.push(Trivia::Directive(Rc::new(Directive::new(
                    DirectiveKind::Define,
                    tokens,
                ))));
                return;
            }
            _ => {
                self.add_error(DiagCode::ExpectedIdentifier, name_token.loc);
                bad = true;
                get_name_table().intern("")
            }
        };
        if let Some(def) = self.macros.get(&name) {
            if def.intrinsic.is_some() {
                self.add_error(DiagCode::UndefineBuiltinDirective, name_token.loc);
                bad = true;
            }
        }
        let function_like =
            self.peek(LexerMode::Directive).kind == TokenKind::OpenDelim(DelimKind::Paren)
                && self.peek(LexerMode::Directive).trivia.is_empty();
        tokens.push(name_token);

        self.in_macro_body = true;
        let formals = if function_like {
            match self.parse_formal_list(&mut tokens) {
                Some(formals) => Some(formals),
                None => {
                    bad = true;
                    None
                }
            }
        } else {
            None
        };

        // Collect the macro body up to the end of the directive.
        let mut body = Vec::new();
        let eod = loop {
            let token = self.next_raw(LexerMode::Directive);
            match token.kind {
                TokenKind::EndOfDirective | TokenKind::Eof => break token,
                _ => body.push(token),
            }
        };
        self.in_macro_body = false;

        tokens.extend(body.iter().cloned());
        tokens.push(eod);

        if !bad {
            trace!("defined macro {}", name);
            self.macros.insert(
                name,
                MacroDef {
                    intrinsic: None,
                    formals: formals,
                    body: body,
                },
            );
        }
        trivia.push(Trivia::Directive(Rc::new(Directive::new(
            DirectiveKind::Define,
            tokens,
        ))));
    }

    fn parse_formal_list(&mut self, tokens: &mut Vec<Token>) -> Option<Vec<MacroFormal>> {
        tokens.push(self.consume(LexerMode::Directive)); // the open paren
        let mut formals = Vec::new();
        loop {
            let name_token = self.consume(LexerMode::Directive);
            let name = match name_token.kind {
                TokenKind::Ident | TokenKind::EscIdent => name_token.name().unwrap(),
                // Keywords are acceptable as macro formal names.
                TokenKind::Keyword(kw) => get_name_table().intern(kw.as_str()),
                _ => {
                    self.add_error(DiagCode::ExpectedIdentifier, name_token.loc);
                    tokens.push(name_token);
                    return None;
                }
            };
            tokens.push(name_token);

            let mut default = None;
            if self.peek(LexerMode::Directive).kind == TokenKind::Operator(Op::Assign) {
                tokens.push(self.consume(LexerMode::Directive));
                let mut value = Vec::new();
                let mut depth = 0u32;
                loop {
                    let t = self.peek(LexerMode::Directive);
                    match t.kind {
                        TokenKind::Comma if depth == 0 => break,
                        TokenKind::CloseDelim(DelimKind::Paren) if depth == 0 => break,
                        TokenKind::EndOfDirective | TokenKind::Eof => break,
                        TokenKind::OpenDelim(_) => depth += 1,
                        TokenKind::CloseDelim(_) => depth = depth.saturating_sub(1),
                        _ => (),
                    }
                    let t = self.consume(LexerMode::Directive);
                    tokens.push(t.clone());
                    value.push(t);
                }
                default = Some(value);
            }
            formals.push(MacroFormal {
                name: name,
                default: default,
            });

            let t = self.consume(LexerMode::Directive);
            match t.kind {
                TokenKind::Comma => tokens.push(t),
                TokenKind::CloseDelim(DelimKind::Paren) => {
                    tokens.push(t);
                    return Some(formals);
                }
                _ => {
                    self.add_error(DiagCode::ExpectedToken, t.loc);
                    tokens.push(t);
                    return None;
                }
            }
        }
    }

    /// Handle a macro usage: parse any arguments, expand, and queue the
    /// resulting tokens. The consumed tokens become directive trivia.
    fn handle_macro_usage(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let mut tokens = Vec::new();
        self.expand_usage_inline(directive, &mut tokens);
        trivia.push(Trivia::Directive(Rc::new(Directive::new(
            DirectiveKind::MacroUsage,
            tokens,
        ))));
    }

    /// The work horse behind `handle_macro_usage`: records consumed tokens
    /// into `tokens` and pushes the expansion onto the front of the queue.
    fn expand_usage_inline(&mut self, directive: Token, tokens: &mut Vec<Token>) {
        tokens.push(directive.clone());
        let name = get_name_table().intern(&directive.raw[1..]);
        let def = match self.macros.get(&name) {
            Some(def) => def.clone(),
            None => {
                self.diagnostics.add(
                    Diagnostic::error(DiagCode::UnknownDirective, directive.loc)
                        .with_message(format!("unknown macro or compiler directive {}", directive.raw)),
                );
                return;
            }
        };

        let actual_args = if def.needs_args() {
            if self.peek(LexerMode::Normal).kind == TokenKind::OpenDelim(DelimKind::Paren) {
                match self.parse_actual_args(tokens) {
                    Some(args) => Some(args),
                    None => return,
                }
            } else {
                self.add_error(DiagCode::ExpectedMacroArgs, directive.loc);
                return;
            }
        } else {
            None
        };

        let mut dest = Vec::new();
        self.expansion_count = 0;
        if !self.expand_macro(&def, &directive, actual_args.as_ref(), &mut dest) {
            return;
        }
        if !self.expand_replacement_list(&mut dest) {
            return;
        }

        for token in dest.iter_mut() {
            token.flags |= TokenFlags::FROM_MACRO;
        }
        for token in dest.into_iter().rev() {
            self.expanded.push_front(token);
        }
    }

    /// Parse the comma-separated actual argument list of a function-like
    /// macro usage, tracking delimiter nesting.
    fn parse_actual_args(&mut self, tokens: &mut Vec<Token>) -> Option<Vec<Vec<Token>>> {
        self.in_macro_body = true;
        let open = self.consume(LexerMode::Normal);
        tokens.push(open);

        let mut args: Vec<Vec<Token>> = Vec::new();
        let mut arg: Vec<Token> = Vec::new();
        let mut depth = 0u32;
        loop {
            let token = self.consume(LexerMode::Normal);
            match token.kind {
                TokenKind::CloseDelim(DelimKind::Paren) if depth == 0 => {
                    tokens.push(token);
                    args.push(arg);
                    self.in_macro_body = false;
                    return Some(args);
                }
                TokenKind::Comma if depth == 0 => {
                    tokens.push(token);
                    args.push(std::mem::replace(&mut arg, Vec::new()));
                }
                TokenKind::Eof => {
                    self.add_error(DiagCode::ExpectedToken, token.loc);
                    self.in_macro_body = false;
                    return None;
                }
                TokenKind::OpenDelim(_) => {
                    depth += 1;
                    tokens.push(token.clone());
                    arg.push(token);
                }
                TokenKind::CloseDelim(_) => {
                    depth = depth.saturating_sub(1);
                    tokens.push(token.clone());
                    arg.push(token);
                }
                _ => {
                    tokens.push(token.clone());
                    arg.push(token);
                }
            }
        }
    }

    /// Expand one macro definition into `dest`, substituting arguments and
    /// applying the stringification and pasting operators.
    fn expand_macro(
        &mut self,
        def: &MacroDef,
        usage: &Token,
        actual_args: Option<&Vec<Vec<Token>>>,
        dest: &mut Vec<Token>,
    ) -> bool {
        if let Some(intrinsic) = def.intrinsic {
            let token = self.expand_intrinsic(intrinsic, usage);
            dest.push(token);
            return true;
        }

        // Bind formal names to their actual token lists.
        let mut arg_map: HashMap<Name, Vec<Token>> = HashMap::new();
        if let Some(formals) = &def.formals {
            let empty = Vec::new();
            let args = actual_args.unwrap_or(&empty);
            let mut args: &[Vec<Token>] = args;
            // A lone empty argument to a macro without formals is the
            // canonical way to write a no-argument call.
            if formals.is_empty() && args.len() == 1 && args[0].is_empty() {
                args = &[];
            }
            if args.len() > formals.len() {
                self.add_error(DiagCode::TooManyActualMacroArgs, usage.loc);
                return false;
            }
            for (i, formal) in formals.iter().enumerate() {
                let tokens = match args.get(i) {
                    Some(a) if !a.is_empty() => {
                        let mut a = a.clone();
                        // Arguments are fully macro-expanded before being
                        // substituted into the body.
                        if !self.expand_replacement_list(&mut a) {
                            return false;
                        }
                        a
                    }
                    Some(_) => match &formal.default {
                        Some(d) => d.clone(),
                        None => vec![Token::new(
                            TokenKind::EmptyMacroArgument,
                            usage.loc,
                            RcStr::new(""),
                        )],
                    },
                    None => match &formal.default {
                        Some(d) => d.clone(),
                        None => {
                            self.add_error(DiagCode::NotEnoughMacroArgs, usage.loc);
                            return false;
                        }
                    },
                };
                arg_map.insert(formal.name, tokens);
            }
        }

        let body = &def.body;
        let mut is_first = true;
        let mut i = 0;
        while i < body.len() {
            let token = &body[i];
            match token.kind {
                TokenKind::MacroQuote => {
                    let quote = token.clone();
                    i += 1;
                    let mut sub = Vec::new();
                    let mut found_end = false;
                    while i < body.len() {
                        if body[i].kind == TokenKind::MacroQuote {
                            found_end = true;
                            break;
                        }
                        self.substitute(&body[i], &arg_map, &mut sub);
                        i += 1;
                    }
                    if !found_end {
                        self.add_error(DiagCode::ExpectedMacroStringifyEnd, quote.loc);
                        return false;
                    }
                    if !self.expand_replacement_list(&mut sub) {
                        return false;
                    }
                    let sub = self.apply_pastes(sub);
                    let mut result = stringify_tokens(quote.loc, quote.trivia.clone(), &sub, false);
                    self.append_body_token(&mut result, usage, &mut is_first);
                    dest.push(result);
                    i += 1;
                }
                TokenKind::MacroPaste => {
                    i += 1;
                    if i >= body.len() {
                        self.add_error(DiagCode::BadMacroPaste, token.loc);
                        continue;
                    }
                    // Pasting across whitespace is not meaningful.
                    if !body[i].trivia.is_empty() {
                        self.add_error(DiagCode::BadMacroPaste, token.loc);
                        continue;
                    }
                    let mut rhs = Vec::new();
                    self.substitute(&body[i], &arg_map, &mut rhs);
                    rhs.retain(|t| t.kind != TokenKind::EmptyMacroArgument);
                    i += 1;

                    let lhs = dest.pop();
                    match (lhs, rhs.first().cloned()) {
                        (Some(l), Some(_)) => match concatenate_tokens(&l, &rhs[0]) {
                            Some(merged) => {
                                dest.push(merged);
                                dest.extend(rhs.into_iter().skip(1));
                            }
                            None => {
                                self.add_error(DiagCode::BadMacroPaste, token.loc);
                                dest.push(l);
                                dest.extend(rhs);
                            }
                        },
                        (Some(l), None) => dest.push(l),
                        (None, _) => dest.extend(rhs),
                    }
                }
                _ => {
                    let mut sub = Vec::new();
                    self.substitute(token, &arg_map, &mut sub);
                    for mut t in sub {
                        self.append_body_token(&mut t, usage, &mut is_first);
                        dest.push(t);
                    }
                }
            }
        }
        true
    }

    /// Apply `` paste operators over an already-substituted token list, as
    /// needed inside a stringification span.
    fn apply_pastes(&mut self, tokens: Vec<Token>) -> Vec<Token> {
        let mut result: Vec<Token> = Vec::new();
        let mut iter = tokens.into_iter().peekable();
        while let Some(token) = iter.next() {
            if token.kind != TokenKind::MacroPaste {
                result.push(token);
                continue;
            }
            let rhs = match iter.next() {
                Some(rhs) => rhs,
                None => {
                    self.add_error(DiagCode::BadMacroPaste, token.loc);
                    continue;
                }
            };
            match result.pop() {
                Some(lhs) => match concatenate_tokens(&lhs, &rhs) {
                    Some(merged) => result.push(merged),
                    None => {
                        self.add_error(DiagCode::BadMacroPaste, token.loc);
                        result.push(lhs);
                        result.push(rhs);
                    }
                },
                None => result.push(rhs),
            }
        }
        result
    }

    /// The first token of an expansion inherits the trivia of the usage
    /// site, so that the expansion sits in the text exactly where the usage
    /// was.
    fn append_body_token(&self, token: &mut Token, usage: &Token, is_first: &mut bool) {
        if *is_first {
            token.trivia = usage.trivia.clone();
            *is_first = false;
        }
    }

    /// Substitute a single body token: formal argument names are replaced by
    /// their bound actual tokens, and directives whose name matches a formal
    /// are rewritten into directives named by the actual text.
    fn substitute(&self, token: &Token, arg_map: &HashMap<Name, Vec<Token>>, dest: &mut Vec<Token>) {
        let formal_name = match token.kind {
            TokenKind::Ident | TokenKind::EscIdent => token.name(),
            TokenKind::Keyword(kw) => get_name_table().find(kw.as_str()),
            TokenKind::Directive(_) if token.raw.len() > 1 => {
                get_name_table().find(&token.raw[1..])
            }
            _ => None,
        };
        let actual = formal_name.and_then(|n| arg_map.get(&n));

        match (token.kind, actual) {
            (TokenKind::Directive(_), Some(actual)) => {
                // A directive whose name is a formal argument: `name becomes
                // a directive named by the actual text.
                let text = actual
                    .iter()
                    .map(|t| t.raw.to_string())
                    .collect::<Vec<_>>()
                    .join("");
                let raw = format!("`{}", text);
                let mut new = Token::new(
                    TokenKind::Directive(DirectiveKind::from_str(&text)),
                    token.loc,
                    RcStr::from(raw),
                );
                new.trivia = token.trivia.clone();
                dest.push(new);
            }
            (TokenKind::Directive(_), None) | (_, None) => dest.push(token.clone()),
            (_, Some(actual)) => {
                let mut actual = actual.clone();
                if let Some(first) = actual.first_mut() {
                    // The substitution takes over the formal's position in
                    // the text, including its leading trivia.
                    first.trivia = token.trivia.clone();
                }
                dest.extend(actual);
            }
        }
    }

    /// Scan a token list for macro usages and expand them in place,
    /// recursively and with a cycle guard.
    fn expand_replacement_list(&mut self, list: &mut Vec<Token>) -> bool {
        let mut i = 0;
        while i < list.len() {
            let is_usage = match list[i].kind {
                TokenKind::Directive(DirectiveKind::MacroUsage) => true,
                _ => false,
            };
            if !is_usage {
                i += 1;
                continue;
            }

            self.expansion_count += 1;
            if self.expansion_count > MAX_EXPANSIONS {
                self.add_error(DiagCode::RecursiveMacro, list[i].loc);
                return false;
            }

            let usage = list[i].clone();
            let name = get_name_table().intern(&usage.raw[1..]);
            let def = match self.macros.get(&name) {
                Some(def) => def.clone(),
                None => {
                    self.diagnostics.add(
                        Diagnostic::error(DiagCode::UnknownDirective, usage.loc)
                            .with_message(format!("unknown macro or compiler directive {}", usage.raw)),
                    );
                    list.remove(i);
                    continue;
                }
            };

            // Parse the actual arguments out of the list itself.
            let mut end = i + 1;
            let actual_args = if def.needs_args() {
                if end < list.len() && list[end].kind == TokenKind::OpenDelim(DelimKind::Paren) {
                    let mut args: Vec<Vec<Token>> = Vec::new();
                    let mut arg: Vec<Token> = Vec::new();
                    let mut depth = 0u32;
                    end += 1;
                    let mut closed = false;
                    while end < list.len() {
                        let t = &list[end];
                        match t.kind {
                            TokenKind::CloseDelim(DelimKind::Paren) if depth == 0 => {
                                args.push(std::mem::replace(&mut arg, Vec::new()));
                                end += 1;
                                closed = true;
                                break;
                            }
                            TokenKind::Comma if depth == 0 => {
                                args.push(std::mem::replace(&mut arg, Vec::new()));
                            }
                            TokenKind::OpenDelim(_) => {
                                depth += 1;
                                arg.push(t.clone());
                            }
                            TokenKind::CloseDelim(_) => {
                                depth = depth.saturating_sub(1);
                                arg.push(t.clone());
                            }
                            _ => arg.push(t.clone()),
                        }
                        end += 1;
                    }
                    if !closed {
                        self.add_error(DiagCode::ExpectedToken, usage.loc);
                        return false;
                    }
                    Some(args)
                } else {
                    // The argument list is not part of this buffer; leave the
                    // usage in place so that it is expanded against the main
                    // token stream once it reaches the output queue.
                    i = end;
                    continue;
                }
            } else {
                None
            };

            let mut sub = Vec::new();
            if !self.expand_macro(&def, &usage, actual_args.as_ref(), &mut sub) {
                return false;
            }
            list.splice(i..end, sub);
            // Continue scanning from the same index so that tokens produced
            // by this expansion are themselves expanded.
        }
        true
    }

    fn expand_intrinsic(&self, intrinsic: MacroIntrinsic, usage: &Token) -> Token {
        match intrinsic {
            MacroIntrinsic::Line => {
                let line = self.current_line(usage.loc);
                let mut token = Token::new(
                    TokenKind::IntegerLiteral,
                    usage.loc,
                    RcStr::from(line.to_string()),
                );
                token.value = TokenValue::Int(line as i32);
                token.trivia = usage.trivia.clone();
                token
            }
            MacroIntrinsic::File => {
                let file = self.current_file(usage.loc);
                let mut token = Token::new(
                    TokenKind::StringLiteral,
                    usage.loc,
                    RcStr::from(format!("\"{}\"", file)),
                );
                token.value = TokenValue::Str(file);
                token.trivia = usage.trivia.clone();
                token
            }
        }
    }

    fn current_line(&self, loc: Location) -> u64 {
        if !loc.source.is_valid() {
            return 0;
        }
        let (line, _) = self.sm.human(loc);
        if let Some(o) = &self.line_override {
            if o.source == loc.source && line > o.anchor_line {
                return o.line + (line - o.anchor_line - 1) as u64;
            }
        }
        line as u64
    }

    fn current_file(&self, loc: Location) -> RcStr {
        if let Some(o) = &self.line_override {
            if o.source == loc.source {
                return o.file.clone();
            }
        }
        if loc.source.is_valid() {
            self.sm.get_path(loc.source)
        } else {
            RcStr::new("<unknown>")
        }
    }

    // ------------------------------------------------------------------
    // Conditional directives
    // ------------------------------------------------------------------

    fn all_branches_active(&self) -> bool {
        self.branch_stack.iter().all(|b| b.current_active)
    }

    /// Read the condition name of a conditional directive. The name is
    /// itself macro-expandable.
    fn expect_condition_name(&mut self, tokens: &mut Vec<Token>) -> Option<Name> {
        let token = self.consume(LexerMode::Directive);
        match token.kind {
            TokenKind::Ident | TokenKind::EscIdent => {
                let name = token.name();
                tokens.push(token);
                name
            }
            TokenKind::Directive(DirectiveKind::MacroUsage) => {
                self.expand_usage_inline(token, tokens);
                let inner = self.next_raw(LexerMode::Directive);
                match inner.kind {
                    TokenKind::Ident | TokenKind::EscIdent => inner.name(),
                    _ => {
                        self.add_error(DiagCode::ExpectedIdentifier, inner.loc);
                        self.current = Some(inner);
                        None
                    }
                }
            }
            _ => {
                self.add_error(DiagCode::ExpectedIdentifier, token.loc);
                tokens.push(token);
                None
            }
        }
    }

    fn handle_ifdef(&mut self, directive: Token, inverted: bool, trivia: &mut Vec<Trivia>) {
        let kind = if inverted {
            DirectiveKind::IfNDef
        } else {
            DirectiveKind::IfDef
        };
        let mut tokens = vec![directive];
        let condition = self.expect_condition_name(&mut tokens);

        let mut take = false;
        if self.all_branches_active() {
            take = condition.map(|n| self.macros.contains_key(&n)).unwrap_or(false);
            if inverted {
                take = !take;
            }
        }
        self.branch_stack.push(BranchEntry {
            any_taken: take,
            current_active: take,
            has_else: false,
        });
        self.parse_branch_directive(kind, tokens, take, trivia);
    }

    fn handle_elsif(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let loc = directive.loc;
        let mut tokens = vec![directive];
        let condition = self.expect_condition_name(&mut tokens);
        let defined = condition.map(|n| self.macros.contains_key(&n)).unwrap_or(false);
        let take = self.decide_else_branch(loc, true, defined);
        self.parse_branch_directive(DirectiveKind::ElsIf, tokens, take, trivia);
    }

    fn handle_else(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let loc = directive.loc;
        let take = self.decide_else_branch(loc, false, true);
        self.parse_branch_directive(DirectiveKind::Else, vec![directive], take, trivia);
    }

    fn decide_else_branch(&mut self, loc: Location, is_elsif: bool, condition: bool) -> bool {
        let enclosing_active = self
            .branch_stack
            .iter()
            .rev()
            .skip(1)
            .all(|b| b.current_active);
        let (take, unexpected) = match self.branch_stack.last_mut() {
            None => (false, true),
            Some(top) if top.has_else => {
                top.current_active = false;
                (false, true)
            }
            Some(top) => {
                let take = enclosing_active && !top.any_taken && condition;
                top.current_active = take;
                top.any_taken |= take;
                top.has_else = !is_elsif;
                (take, false)
            }
        };
        if unexpected {
            self.add_error(DiagCode::UnexpectedConditionalDirective, loc);
        }
        take
    }

    fn handle_endif(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        if self.branch_stack.pop().is_none() {
            self.add_error(DiagCode::UnexpectedConditionalDirective, directive.loc);
        }
        let take = self.all_branches_active();
        self.parse_branch_directive(DirectiveKind::EndIf, vec![directive], take, trivia);
    }

    /// Finish a conditional directive and, if the branch is not taken, skip
    /// raw tokens up to the next conditional directive, keeping them as
    /// disabled-text trivia.
    fn parse_branch_directive(
        &mut self,
        kind: DirectiveKind,
        mut tokens: Vec<Token>,
        taken: bool,
        trivia: &mut Vec<Trivia>,
    ) {
        let (extras, eod) = self.parse_eod(true);
        tokens.extend(extras);
        tokens.push(eod);
        trivia.push(Trivia::Directive(Rc::new(Directive::new(kind, tokens))));

        if !taken {
            let mut skipped = Vec::new();
            loop {
                let token = self.next_raw(LexerMode::Normal);
                match token.kind {
                    TokenKind::Eof => break,
                    TokenKind::Directive(k) if k.is_conditional() => {
                        // Hand the directive back for regular dispatch.
                        self.current = Some(token);
                        break;
                    }
                    _ => skipped.push(token),
                }
            }
            if !skipped.is_empty() {
                trivia.push(Trivia::DisabledText(Rc::from(skipped)));
            }
        }
    }

    // ------------------------------------------------------------------
    // Remaining directives
    // ------------------------------------------------------------------

    fn handle_undef(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let mut tokens = vec![directive];
        let name_token = self.consume(LexerMode::Directive);
        match name_token.kind {
            TokenKind::Ident | TokenKind::EscIdent => {
                let name = name_token.name().unwrap();
                match self.macros.get(&name) {
                    Some(def) if def.intrinsic.is_some() => {
                        self.add_error(DiagCode::UndefineBuiltinDirective, name_token.loc);
                    }
                    Some(_) => {
                        self.macros.remove(&name);
                    }
                    None => {
                        self.diagnostics.add(
                            Diagnostic::warning(DiagCode::UnknownDirective, name_token.loc)
                                .with_message(format!("macro {} is not defined", name)),
                        );
                    }
                }
            }
            _ => self.add_error(DiagCode::ExpectedIdentifier, name_token.loc),
        }
        tokens.push(name_token);
        self.finish_directive(DirectiveKind::Undef, tokens, trivia);
    }

    fn handle_begin_keywords(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let mut tokens = vec![directive];
        let version_token = self.expect(TokenKind::StringLiteral, LexerMode::Directive);
        match KeywordVersion::from_str(&version_token.value_text()) {
            Some(version) => self.keyword_stack.push(version),
            None => {
                if !version_token.is_missing() {
                    self.diagnostics.add(
                        Diagnostic::error(DiagCode::ExpectedToken, version_token.loc)
                            .with_message("unknown keyword version string"),
                    );
                }
            }
        }
        tokens.push(version_token);
        self.finish_directive(DirectiveKind::BeginKeywords, tokens, trivia);
    }

    fn handle_end_keywords(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        if self.keyword_stack.len() > 1 {
            self.keyword_stack.pop();
        } else {
            self.diagnostics.add(
                Diagnostic::error(DiagCode::UnexpectedConditionalDirective, directive.loc)
                    .with_message("end_keywords directive without matching begin_keywords"),
            );
        }
        self.create_simple_directive(DirectiveKind::EndKeywords, directive, trivia);
    }

    fn handle_default_net_type(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let mut tokens = vec![directive];
        let token = self.consume(LexerMode::Directive);
        match token.kind {
            TokenKind::Keyword(kw) => match kw {
                Kw::Wire
                | Kw::Uwire
                | Kw::Wand
                | Kw::Wor
                | Kw::Tri
                | Kw::Tri0
                | Kw::Tri1
                | Kw::Triand
                | Kw::Trior
                | Kw::Trireg => self.default_net_type = TokenKind::Keyword(kw),
                _ => self.add_error(DiagCode::ExpectedToken, token.loc),
            },
            TokenKind::Ident if &*token.value_text() == "none" => {
                self.default_net_type = TokenKind::Unknown;
            }
            _ => self.add_error(DiagCode::ExpectedToken, token.loc),
        }
        tokens.push(token);
        self.finish_directive(DirectiveKind::DefaultNetType, tokens, trivia);
    }

    fn handle_line(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let mut tokens = vec![directive.clone()];
        let line_token = self.expect(TokenKind::IntegerLiteral, LexerMode::Directive);
        let file_token = self.expect(TokenKind::StringLiteral, LexerMode::Directive);
        let level_token = self.expect(TokenKind::IntegerLiteral, LexerMode::Directive);

        if !line_token.is_missing() && !file_token.is_missing() {
            let line = match line_token.value {
                TokenValue::Int(v) => v as u64,
                _ => 0,
            };
            if let TokenValue::Int(level) = level_token.value {
                if level < 0 || level > 2 {
                    self.add_error(DiagCode::ExpectedToken, level_token.loc);
                }
            }
            let (anchor_line, _) = self.sm.human(directive.loc);
            self.line_override = Some(LineOverride {
                source: directive.loc.source,
                anchor_line: anchor_line,
                line: line,
                file: file_token.value_text(),
            });
        }
        tokens.push(line_token);
        tokens.push(file_token);
        tokens.push(level_token);
        self.finish_directive(DirectiveKind::Line, tokens, trivia);
    }

    fn handle_timescale(&mut self, directive: Token, trivia: &mut Vec<Trivia>) {
        let mut tokens = vec![directive];
        let base = self.expect_timescale_value(&mut tokens);
        let slash = self.consume(LexerMode::Directive);
        let slash_ok = slash.kind == TokenKind::Operator(Op::Div);
        if !slash_ok {
            self.add_error(DiagCode::ExpectedToken, slash.loc);
        }
        tokens.push(slash);
        let precision = self.expect_timescale_value(&mut tokens);

        if let (Some(base), Some(precision), true) = (base, precision, slash_ok) {
            if precision.femtoseconds() > base.femtoseconds() {
                self.diagnostics.add(
                    Diagnostic::error(DiagCode::InvalidTimescaleSpecifier, tokens[0].loc)
                        .with_message("timescale precision must be at most as large as the base"),
                );
            } else {
                self.timescale = Some(Timescale {
                    base: base,
                    precision: precision,
                });
            }
        }
        self.finish_directive(DirectiveKind::Timescale, tokens, trivia);
    }

    fn expect_timescale_value(&mut self, tokens: &mut Vec<Token>) -> Option<TimescaleValue> {
        let token = self.consume(LexerMode::Directive);
        let result = match &token.value {
            TokenValue::Time { value, unit } => {
                magnitude_of(*value).map(|magnitude| TimescaleValue {
                    magnitude: magnitude,
                    unit: *unit,
                })
            }
            TokenValue::Int(v) => {
                let magnitude = magnitude_of(*v as f64);
                tokens.push(token.clone());
                let unit_token = self.consume(LexerMode::Directive);
                let unit = match unit_token.kind {
                    TokenKind::Ident => TimeUnit::from_suffix(&unit_token.value_text()),
                    // `s` on its own lexes as a time literal of value NaN; it
                    // cannot, so an identifier is the only valid shape here.
                    _ => None,
                };
                let result = match (magnitude, unit) {
                    (Some(magnitude), Some(unit)) => Some(TimescaleValue {
                        magnitude: magnitude,
                        unit: unit,
                    }),
                    _ => None,
                };
                if result.is_none() {
                    self.add_error(DiagCode::InvalidTimescaleSpecifier, unit_token.loc);
                }
                tokens.push(unit_token);
                return result;
            }
            _ => None,
        };
        if result.is_none() {
            self.add_error(DiagCode::InvalidTimescaleSpecifier, token.loc);
        }
        tokens.push(token);
        result
    }
}

fn magnitude_of(value: f64) -> Option<TimescaleMagnitude> {
    if value == 1.0 {
        Some(TimescaleMagnitude::One)
    } else if value == 10.0 {
        Some(TimescaleMagnitude::Ten)
    } else if value == 100.0 {
        Some(TimescaleMagnitude::Hundred)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mead_common::errors::Diagnostic;

    fn setup(text: &str) -> (Preprocessor, Rc<Diagnostics>) {
        let sm = Rc::new(SourceManager::new());
        let source = sm.add("test.sv", text);
        let diagnostics = Rc::new(Diagnostics::new());
        let mut pp = Preprocessor::new(sm, diagnostics.clone(), Default::default());
        pp.push_source(source);
        (pp, diagnostics)
    }

    fn all_tokens(pp: &mut Preprocessor) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = pp.next();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn first_token(text: &str) -> (Token, Vec<Diagnostic>) {
        let (mut pp, diagnostics) = setup(text);
        let token = pp.next();
        (token, diagnostics.collect())
    }

    fn texts(text: &str) -> (Vec<String>, Vec<Diagnostic>) {
        let (mut pp, diagnostics) = setup(text);
        let tokens = all_tokens(&mut pp);
        let texts = tokens[..tokens.len() - 1]
            .iter()
            .map(|t| t.value_text().to_string())
            .collect();
        (texts, diagnostics.collect())
    }

    #[test]
    fn macro_simple() {
        let (texts, diags) = texts("`define FOO 42\n`FOO");
        assert_eq!(texts, vec!["42"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_function_like() {
        let (texts, diags) = texts("`define FOO(x) x+1\n`FOO(bar)");
        assert_eq!(texts, vec!["bar", "+", "1"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_defaults() {
        let (texts, diags) = texts("`define FOO(x=9(,), y=2) x+y\n`FOO(,3)");
        assert_eq!(texts, vec!["9", "(", ",", ")", "+", "3"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_nesting() {
        let (texts, diags) = texts("`define BLAHBLAH(x) x\n`define BAR(x) `BLAHBLAH(x)\n`define BAZ(x) `BAR(x)\n`define FOO(y) `BAZ(y)\n`FOO(15)");
        assert_eq!(texts, vec!["15"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_undefined_usage() {
        let (_, diags) = texts("`FOO");
        assert_eq!(diags[0].code, DiagCode::UnknownDirective);
    }

    #[test]
    fn macro_too_few_args() {
        let (_, diags) = texts("`define FOO(a,b) a b\n`FOO(1)");
        assert_eq!(diags[0].code, DiagCode::NotEnoughMacroArgs);
    }

    #[test]
    fn macro_too_many_args() {
        let (_, diags) = texts("`define FOO(a) a\n`FOO(1,2)");
        assert_eq!(diags[0].code, DiagCode::TooManyActualMacroArgs);
    }

    #[test]
    fn macro_missing_args() {
        let (_, diags) = texts("`define FOO(a) a\n`FOO");
        assert_eq!(diags[0].code, DiagCode::ExpectedMacroArgs);
    }

    #[test]
    fn macro_pasting_identifiers() {
        let (token, diags) = first_token("`define FOO(x,y) x``_blah``y\n`FOO(   bar,    _BAZ)");
        assert_eq!(token.kind, TokenKind::Ident);
        assert_eq!(&*token.value_text(), "bar_blah_BAZ");
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_pasting_operator() {
        let (token, diags) = first_token("`define FOO(x) x``+\n`FOO(+)");
        assert_eq!(token.kind, TokenKind::Operator(Op::Inc));
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_pasting_keyword() {
        let (token, diags) = first_token("`define FOO(x) x``gic\n`FOO(lo)");
        assert_eq!(token.kind, TokenKind::Keyword(Kw::Logic));
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_pasting_whitespace() {
        let (token, diags) = first_token("`define FOO(x) x`` y\n`FOO(a)");
        assert_eq!(token.kind, TokenKind::Ident);
        assert_eq!(&*token.value_text(), "a");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagCode::BadMacroPaste);
    }

    #[test]
    fn macro_stringify() {
        let (token, diags) =
            first_token("`define FOO(x) `\" `\\`\" x``foo``42 `\\`\" `\"\n`FOO(bar_)");
        assert_eq!(token.kind, TokenKind::StringLiteral);
        assert_eq!(&*token.value_text(), " \" bar_foo42 \"");
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_stringify_whitespace() {
        let (token, diags) = first_token("`define FOO(x,y) `\" x ( y)\t  x   x`\"\n`FOO(bar,)");
        assert_eq!(token.kind, TokenKind::StringLiteral);
        assert_eq!(&*token.value_text(), " bar ( )\t  bar   bar");
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_nested_stringification() {
        let (token, diags) =
            first_token("`define THRU(d) d\n`define MSG(m) `\"m`\"\n`MSG(`THRU(hello))");
        assert_eq!(token.kind, TokenKind::StringLiteral);
        assert_eq!(&*token.value_text(), "hello");
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_meta_repetition() {
        let text = "`define REPEAT(n, d) `REPEAT_``n(d)\n\
                    `define REPEAT_0(d)\n\
                    `define REPEAT_1(d) d\n\
                    `define REPEAT_2(d) `REPEAT_1(d) d\n\
                    `define REPEAT_3(d) `REPEAT_2(d) d\n\
                    `define FUNC(n) n\n\
                    `REPEAT(`FUNC(3), \"hello\")";
        let (texts, diags) = texts(text);
        assert_eq!(texts, vec!["hello", "hello", "hello"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_directive_substitution_via_arg() {
        let (texts, diags) = texts("`define FOO 1\n`define FROB(asdf) `asdf\n`FROB(FOO)");
        assert_eq!(texts, vec!["1"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_recursive_is_bounded() {
        let (_, diags) = texts("`define X `X\n`X");
        assert!(diags.iter().any(|d| d.code == DiagCode::RecursiveMacro));
    }

    #[test]
    fn macro_implicit_concatenate() {
        let (token, diags) = first_token("`define FOO 8\r\n`define BAR 9\n1`FOO`BAR");
        assert_eq!(token.kind, TokenKind::IntegerLiteral);
        assert_eq!(token.value, TokenValue::Int(189));
        assert!(diags.is_empty());
    }

    #[test]
    fn macro_nested_implicit_concatenate() {
        let (token, diags) = first_token("`define FOO 8\n`define BAR 9`FOO\n1`BAR");
        assert_eq!(token.kind, TokenKind::IntegerLiteral);
        assert_eq!(token.value, TokenValue::Int(198));
        assert!(diags.is_empty());
    }

    #[test]
    fn ifdef_taken() {
        let (texts, diags) = texts("`define FOO\n`ifdef FOO\na\n`endif");
        assert_eq!(texts, vec!["a"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn ifdef_not_taken() {
        let (texts, diags) = texts("`ifdef FOO\na\n`endif\nb");
        assert_eq!(texts, vec!["b"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn ifndef_else() {
        let (texts, diags) = texts("`ifndef FOO\na\n`else\nb\n`endif");
        assert_eq!(texts, vec!["a"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn elsif_chain() {
        let (texts, diags) = texts("`define BAR\n`ifdef FOO\na\n`elsif BAR\nb\n`else\nc\n`endif");
        assert_eq!(texts, vec!["b"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn nested_branches() {
        let text = "`define FOO\n\
                    `ifdef BLAH\nx\n\
                    `ifdef FOO\ny\n`endif\n\
                    z\n\
                    `elsif FOO\n\
                    a\n\
                    `ifndef GLORP\nb\n`else\nc\n`endif\n\
                    d\n\
                    `else\ne\n`endif\n\
                    f";
        let (texts, diags) = texts(text);
        assert_eq!(texts, vec!["a", "b", "d", "f"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn ifdef_condition_via_macro() {
        let (texts, diags) =
            texts("`define DEFINED\n`define IND(d) d\n`ifdef `IND(DEFINED)\na\n`else\nb\n`endif");
        assert_eq!(texts, vec!["a"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn line_intrinsic() {
        let (texts, diags) = texts("`__LINE__\nx\n`__LINE__");
        assert_eq!(texts, vec!["1", "x", "3"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn file_intrinsic() {
        let (token, diags) = first_token("`__FILE__");
        assert_eq!(token.kind, TokenKind::StringLiteral);
        assert_eq!(&*token.value_text(), "test.sv");
        assert!(diags.is_empty());
    }

    #[test]
    fn line_directive_overrides() {
        let (texts, diags) = texts("`line 100 \"other.sv\" 0\n`__LINE__ `__FILE__");
        assert_eq!(texts, vec!["100", "other.sv"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn undef() {
        let (texts, diags) =
            texts("`define FOO\n`ifdef FOO\na\n`endif\n`undef FOO\n`ifdef FOO\nb\n`endif\nc");
        assert_eq!(texts, vec!["a", "c"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn undef_builtin() {
        let (_, diags) = texts("`undef __LINE__");
        assert_eq!(diags[0].code, DiagCode::UndefineBuiltinDirective);
    }

    #[test]
    fn undefineall() {
        let (texts, diags) = texts("`define FOO\n`undefineall\n`ifdef FOO\na\n`endif\nb");
        assert_eq!(texts, vec!["b"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn begin_keywords() {
        // Under 1364-2001, "logic" is not a keyword.
        let (mut pp, diags) = setup("`begin_keywords \"1364-2001\"\nlogic\n`end_keywords\nlogic");
        let t1 = pp.next();
        assert_eq!(t1.kind, TokenKind::Ident);
        let t2 = pp.next();
        assert_eq!(t2.kind, TokenKind::Keyword(Kw::Logic));
        assert!(diags.collect().is_empty());
    }

    #[test]
    fn timescale() {
        let (mut pp, diags) = setup("`timescale 10ns / 1ns\nx");
        pp.next();
        let ts = pp.timescale().expect("timescale should be set");
        assert_eq!(ts.base.magnitude, TimescaleMagnitude::Ten);
        assert_eq!(ts.base.unit, TimeUnit::Nanoseconds);
        assert_eq!(ts.precision.magnitude, TimescaleMagnitude::One);
        assert!(diags.collect().is_empty());

        // Precision larger than the base is rejected.
        let (mut pp, diags) = setup("`timescale 1ns / 10ns\nx");
        pp.next();
        assert!(pp.timescale().is_none());
        assert_eq!(diags.collect()[0].code, DiagCode::InvalidTimescaleSpecifier);
    }

    #[test]
    fn default_nettype() {
        let (mut pp, _) = setup("`default_nettype uwire\nx");
        pp.next();
        assert_eq!(pp.default_net_type(), TokenKind::Keyword(Kw::Uwire));

        let (mut pp, _) = setup("`default_nettype none\nx");
        pp.next();
        assert_eq!(pp.default_net_type(), TokenKind::Unknown);
    }

    #[test]
    fn resetall() {
        let (mut pp, _) = setup("`default_nettype none\n`resetall\nx");
        pp.next();
        assert_eq!(pp.default_net_type(), TokenKind::Keyword(Kw::Wire));
    }

    #[test]
    fn include_file() {
        let sm = Rc::new(SourceManager::new());
        sm.add("inc.svh", "int y;\n");
        let source = sm.add("top.sv", "`include \"inc.svh\"\nint x;\n");
        let diagnostics = Rc::new(Diagnostics::new());
        let mut pp = Preprocessor::new(sm, diagnostics.clone(), Default::default());
        pp.push_source(source);
        let tokens = all_tokens(&mut pp);
        let texts: Vec<_> = tokens[..tokens.len() - 1]
            .iter()
            .map(|t| t.value_text().to_string())
            .collect();
        assert_eq!(texts, vec!["int", "y", ";", "int", "x", ";"]);
        assert!(diagnostics.collect().is_empty());
    }

    #[test]
    fn include_missing_file() {
        let (_, diags) = texts("`include \"does_not_exist.svh\"\nx");
        assert_eq!(diags[0].code, DiagCode::ExpectedIncludeFileName);
    }

    #[test]
    fn predefine_api() {
        let sm = Rc::new(SourceManager::new());
        let source = sm.add("t.sv", "`ifdef FOO\n`FOO\n`endif");
        let diagnostics = Rc::new(Diagnostics::new());
        let mut pp = Preprocessor::new(sm, diagnostics.clone(), Default::default());
        pp.predefine("FOO=42", "<api>");
        assert!(pp.is_defined("FOO"));
        pp.push_source(source);
        let token = pp.next();
        assert_eq!(token.value, TokenValue::Int(42));
        assert!(pp.undefine("FOO"));
        assert!(!pp.is_defined("FOO"));
        assert!(!pp.undefine("__LINE__"));
    }

    #[test]
    fn round_trip_with_directives() {
        let text = "`define FOO 1\n`ifdef BAR\nhidden text\n`else\nint x;\n`endif\n";
        let (mut pp, diags) = setup(text);
        let tokens = all_tokens(&mut pp);
        let mut rebuilt = String::new();
        for token in &tokens {
            token.write_to(&mut rebuilt);
        }
        assert_eq!(rebuilt, text);
        assert!(diags.collect().is_empty());
    }
}
