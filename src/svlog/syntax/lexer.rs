//! A lexical analyzer for SystemVerilog files, based on IEEE 1800-2017
//! section 5. The lexer chops the source text into tokens and attaches all
//! whitespace, comments, and line endings as leading trivia, so that the
//! original file can be pieced back together from the token stream.

use crate::keywords::{find_keyword, KeywordVersion};
use crate::token::*;
use mead_common::errors::{DiagCode, Diagnostic, Diagnostics};
use mead_common::name::{get_name_table, RcStr};
use mead_common::source::{Location, Source, SourceManager};
use std::rc::Rc;

/// The lexer can interpret source characters differently depending on mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LexerMode {
    /// Normal lexing mode.
    Normal,
    /// Inside a directive; end of line turns into an `EndOfDirective` token.
    Directive,
    /// Lexing an include file name, possibly delimited by angle brackets.
    IncludeFileName,
}

/// Options that control lexing behavior.
#[derive(Clone, Copy, Debug)]
pub struct LexerOptions {
    /// The maximum number of errors that can occur before the rest of the
    /// source buffer is skipped.
    pub max_errors: u32,
}

impl Default for LexerOptions {
    fn default() -> LexerOptions {
        LexerOptions { max_errors: 16 }
    }
}

const MAX_MANTISSA_DIGITS: i32 = 18;

/// The lexer takes source text and chops it up into tokens. Helper functions
/// for token-level surgery (concatenation for macro pasting, stringification)
/// also live here.
pub struct Lexer {
    source: Source,
    content: Rc<String>,
    diagnostics: Rc<Diagnostics>,
    options: LexerOptions,
    pos: usize,
    marker: usize,
    error_count: u32,
    on_new_line: bool,
}

impl Lexer {
    /// Create a lexer over a buffer registered with the given source manager.
    pub fn new(
        source: Source,
        sm: &SourceManager,
        diagnostics: Rc<Diagnostics>,
        options: LexerOptions,
    ) -> Lexer {
        Lexer::from_text(source, sm.get_content(source), diagnostics, options)
    }

    fn from_text(
        source: Source,
        content: Rc<String>,
        diagnostics: Rc<Diagnostics>,
        options: LexerOptions,
    ) -> Lexer {
        let mut lexer = Lexer {
            source: source,
            content: content,
            diagnostics: diagnostics,
            options: options,
            pos: 0,
            marker: 0,
            error_count: 0,
            on_new_line: true,
        };
        // Detect a UTF-8 byte order mark so we can give a nice error for an
        // invalid encoding.
        if lexer.content.as_bytes().starts_with(&[0xEF, 0xBB, 0xBF]) {
            lexer.add_error(DiagCode::UnicodeBOM, 0);
            lexer.pos = 3;
        }
        lexer
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Lex the next token from the source text. At the end of the buffer an
    /// infinite stream of `Eof` tokens is produced.
    pub fn lex(&mut self, mode: LexerMode, keyword_version: KeywordVersion) -> Token {
        if mode == LexerMode::IncludeFileName {
            return self.lex_include_file_name();
        }

        let directive_mode = mode == LexerMode::Directive;
        let mut trivia = Vec::new();

        // Lex any leading trivia; in directive mode this might require us to
        // return an EndOfDirective token right away.
        if self.lex_trivia(&mut trivia, directive_mode) {
            let mut token = Token::new(
                TokenKind::EndOfDirective,
                Location::new(self.source, self.pos),
                RcStr::new(""),
            );
            token.trivia = trivia;
            return token;
        }

        // Lex the next token.
        self.mark();
        let loc = Location::new(self.source, self.pos);
        let (mut kind, value) = self.lex_token(directive_mode, keyword_version);
        self.on_new_line = false;
        let raw = self.lexeme_rcstr();

        if kind != TokenKind::Eof && self.error_count > self.options.max_errors {
            // Stop any further lexing by claiming to be at the end of the
            // buffer; the text seen so far becomes disabled trivia.
            self.add_error(DiagCode::TooManyLexerErrors, self.pos);
            let skipped = Token::new(TokenKind::Unknown, loc, self.rest_rcstr());
            self.pos = self.content.len();
            trivia.push(Trivia::DisabledText(Rc::from(vec![skipped])));
            kind = TokenKind::Eof;
            let mut token = Token::new(kind, loc, RcStr::new(""));
            token.trivia = trivia;
            return token;
        }

        let mut token = Token::new(kind, loc, raw);
        token.trivia = trivia;
        token.value = value;
        token
    }

    fn lex_token(
        &mut self,
        directive_mode: bool,
        keyword_version: KeywordVersion,
    ) -> (TokenKind, TokenValue) {
        use crate::token::TokenKind as TK;
        let offset = self.pos;
        let c = self.peek(0);
        if c == 0 && self.at_end() {
            if directive_mode {
                return (TK::EndOfDirective, TokenValue::None);
            }
            return (TK::Eof, TokenValue::None);
        }
        self.advance(1);
        let kind = match c {
            0 => {
                // An embedded NUL; report it and move on.
                self.add_error(DiagCode::EmbeddedNull, offset);
                return (TK::Unknown, TokenValue::None);
            }
            b'!' => {
                if self.consume(b'=') {
                    match self.peek(0) {
                        b'=' => {
                            self.advance(1);
                            TK::Operator(Op::CaseNeq)
                        }
                        b'?' => {
                            self.advance(1);
                            TK::Operator(Op::WildcardNeq)
                        }
                        _ => TK::Operator(Op::LogicNeq),
                    }
                } else {
                    TK::Operator(Op::LogicNot)
                }
            }
            b'"' => return (TK::StringLiteral, self.lex_string_literal()),
            b'#' => match self.peek(0) {
                b'#' => {
                    self.advance(1);
                    TK::DoubleHashtag
                }
                b'-' if self.peek(1) == b'#' => {
                    self.advance(2);
                    TK::Operator(Op::SeqFollowOl)
                }
                b'=' if self.peek(1) == b'#' => {
                    self.advance(2);
                    TK::Operator(Op::SeqFollowNol)
                }
                _ => TK::Hashtag,
            },
            b'$' => return self.lex_dollar_sign(),
            b'%' => {
                if self.consume(b'=') {
                    TK::Operator(Op::AssignMod)
                } else {
                    TK::Operator(Op::Mod)
                }
            }
            b'&' => match self.peek(0) {
                b'&' => {
                    self.advance(1);
                    if self.consume(b'&') {
                        TK::Operator(Op::TripleAnd)
                    } else {
                        TK::Operator(Op::LogicAnd)
                    }
                }
                b'=' => {
                    self.advance(1);
                    TK::Operator(Op::AssignBitAnd)
                }
                _ => TK::Operator(Op::BitAnd),
            },
            b'\'' => {
                if self.consume(b'{') {
                    TK::ApostropheOpenBrace
                } else {
                    return self.lex_apostrophe();
                }
            }
            b'(' => {
                if !self.consume(b'*') {
                    TK::OpenDelim(DelimKind::Paren)
                } else if self.consume(b')') {
                    TK::OpenCloseAttr
                } else {
                    TK::OpenAttr
                }
            }
            b')' => TK::CloseDelim(DelimKind::Paren),
            b'*' => match self.peek(0) {
                b'*' => {
                    self.advance(1);
                    TK::Operator(Op::Pow)
                }
                b'=' => {
                    self.advance(1);
                    TK::Operator(Op::AssignMul)
                }
                b'>' => {
                    self.advance(1);
                    TK::Operator(Op::StarArrow)
                }
                b')' => {
                    self.advance(1);
                    TK::CloseAttr
                }
                b':' if self.peek(1) == b':' && self.peek(2) == b'*' => {
                    self.advance(3);
                    TK::StarNamespaceStar
                }
                _ => TK::Operator(Op::Mul),
            },
            b'+' => match self.peek(0) {
                b'+' => {
                    self.advance(1);
                    TK::Operator(Op::Inc)
                }
                b'=' => {
                    self.advance(1);
                    TK::Operator(Op::AssignAdd)
                }
                b':' => {
                    self.advance(1);
                    TK::AddColon
                }
                _ => TK::Operator(Op::Add),
            },
            b',' => TK::Comma,
            b'-' => match self.peek(0) {
                b'-' => {
                    self.advance(1);
                    TK::Operator(Op::Dec)
                }
                b'=' => {
                    self.advance(1);
                    TK::Operator(Op::AssignSub)
                }
                b':' => {
                    self.advance(1);
                    TK::SubColon
                }
                b'>' => {
                    self.advance(1);
                    if self.consume(b'>') {
                        TK::Operator(Op::MinusDoubleArrow)
                    } else {
                        TK::Operator(Op::LogicImpl)
                    }
                }
                _ => TK::Operator(Op::Sub),
            },
            b'.' => {
                if self.consume(b'*') {
                    TK::PeriodStar
                } else {
                    TK::Period
                }
            }
            b'/' => {
                if self.consume(b'=') {
                    TK::Operator(Op::AssignDiv)
                } else {
                    TK::Operator(Op::Div)
                }
            }
            b'0'..=b'9' => {
                // Back up so that the numeric scanner can look at this digit
                // again.
                self.pos -= 1;
                return self.lex_numeric_literal();
            }
            b':' => match self.peek(0) {
                b'=' => {
                    self.advance(1);
                    TK::ColonEquals
                }
                b'/' => {
                    self.advance(1);
                    TK::ColonSlash
                }
                b':' => {
                    self.advance(1);
                    TK::Namespace
                }
                _ => TK::Colon,
            },
            b';' => TK::Semicolon,
            b'<' => match self.peek(0) {
                b'=' => {
                    self.advance(1);
                    TK::Operator(Op::Leq)
                }
                b'-' if self.peek(1) == b'>' => {
                    self.advance(2);
                    TK::Operator(Op::LogicEquiv)
                }
                b'<' => {
                    self.advance(1);
                    match self.peek(0) {
                        b'<' => {
                            if self.peek(1) == b'=' {
                                self.advance(2);
                                TK::Operator(Op::AssignArithShL)
                            } else {
                                self.advance(1);
                                TK::Operator(Op::ArithShL)
                            }
                        }
                        b'=' => {
                            self.advance(1);
                            TK::Operator(Op::AssignLogicShL)
                        }
                        _ => TK::Operator(Op::LogicShL),
                    }
                }
                _ => TK::Operator(Op::Lt),
            },
            b'=' => match self.peek(0) {
                b'=' => {
                    self.advance(1);
                    match self.peek(0) {
                        b'=' => {
                            self.advance(1);
                            TK::Operator(Op::CaseEq)
                        }
                        b'?' => {
                            self.advance(1);
                            TK::Operator(Op::WildcardEq)
                        }
                        _ => TK::Operator(Op::LogicEq),
                    }
                }
                b'>' => {
                    self.advance(1);
                    TK::Operator(Op::EqArrow)
                }
                _ => TK::Operator(Op::Assign),
            },
            b'>' => match self.peek(0) {
                b'=' => {
                    self.advance(1);
                    TK::Operator(Op::Geq)
                }
                b'>' => {
                    self.advance(1);
                    match self.peek(0) {
                        b'>' => {
                            if self.peek(1) == b'=' {
                                self.advance(2);
                                TK::Operator(Op::AssignArithShR)
                            } else {
                                self.advance(1);
                                TK::Operator(Op::ArithShR)
                            }
                        }
                        b'=' => {
                            self.advance(1);
                            TK::Operator(Op::AssignLogicShR)
                        }
                        _ => TK::Operator(Op::LogicShR),
                    }
                }
                _ => TK::Operator(Op::Gt),
            },
            b'?' => TK::Ternary,
            b'@' => match self.peek(0) {
                b'@' => {
                    self.advance(1);
                    TK::DoubleAt
                }
                b'*' => {
                    self.advance(1);
                    TK::AtStar
                }
                _ => TK::At,
            },
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                self.scan_identifier();
                let text = self.lexeme().to_string();
                return match find_keyword(&text, keyword_version) {
                    Some(kw) => (TK::Keyword(kw), TokenValue::None),
                    None => (
                        TK::Ident,
                        TokenValue::Name(get_name_table().intern(&text)),
                    ),
                };
            }
            b'[' => TK::OpenDelim(DelimKind::Brack),
            b'\\' => return self.lex_escape_sequence(),
            b']' => TK::CloseDelim(DelimKind::Brack),
            b'^' => match self.peek(0) {
                b'~' => {
                    self.advance(1);
                    TK::Operator(Op::BitXnor)
                }
                b'=' => {
                    self.advance(1);
                    TK::Operator(Op::AssignBitXor)
                }
                _ => TK::Operator(Op::BitXor),
            },
            b'`' => match self.peek(0) {
                b'"' => {
                    self.advance(1);
                    TK::MacroQuote
                }
                b'`' => {
                    self.advance(1);
                    TK::MacroPaste
                }
                b'\\' if self.peek(1) == b'`' && self.peek(2) == b'"' => {
                    self.advance(3);
                    TK::MacroEscapedQuote
                }
                _ => return self.lex_directive(),
            },
            b'{' => TK::OpenDelim(DelimKind::Brace),
            b'|' => match self.peek(0) {
                b'|' => {
                    self.advance(1);
                    TK::Operator(Op::LogicOr)
                }
                b'-' if self.peek(1) == b'>' => {
                    self.advance(2);
                    TK::Operator(Op::SeqImplOl)
                }
                b'=' => {
                    if self.peek(1) == b'>' {
                        self.advance(2);
                        TK::Operator(Op::SeqImplNol)
                    } else {
                        self.advance(1);
                        TK::Operator(Op::AssignBitOr)
                    }
                }
                _ => TK::Operator(Op::BitOr),
            },
            b'}' => TK::CloseDelim(DelimKind::Brace),
            b'~' => match self.peek(0) {
                b'&' => {
                    self.advance(1);
                    TK::Operator(Op::BitNand)
                }
                b'|' => {
                    self.advance(1);
                    TK::Operator(Op::BitNor)
                }
                b'^' => {
                    self.advance(1);
                    TK::Operator(Op::BitNxor)
                }
                _ => TK::Operator(Op::BitNot),
            },
            _ => {
                if c < 0x80 {
                    self.add_error(DiagCode::NonPrintableChar, offset);
                } else {
                    // Skip over the remainder of the UTF-8 sequence.
                    self.advance(utf8_seq_bytes(c) - 1);
                    self.add_error(DiagCode::UTF8Char, offset);
                }
                TK::Unknown
            }
        };
        (kind, TokenValue::None)
    }

    fn lex_string_literal(&mut self) -> TokenValue {
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let offset = self.pos;
            let c = self.peek(0);
            if c == b'\\' {
                self.advance(1);
                let c = self.peek(0);
                self.advance(1);
                match c {
                    b'n' => buffer.push(b'\n'),
                    b't' => buffer.push(b'\t'),
                    b'\\' => buffer.push(b'\\'),
                    b'"' => buffer.push(b'"'),
                    b'v' => buffer.push(0x0B),
                    b'f' => buffer.push(0x0C),
                    b'a' => buffer.push(0x07),
                    b'\n' => (),
                    b'\r' => {
                        self.consume(b'\n');
                    }
                    b'0'..=b'7' => {
                        // Octal character code, up to three digits.
                        let mut code = (c - b'0') as u32;
                        let mut ok = true;
                        if is_octal_digit(self.peek(0)) {
                            code = code * 8 + (self.peek(0) - b'0') as u32;
                            self.advance(1);
                            if is_octal_digit(self.peek(0)) {
                                code = code * 8 + (self.peek(0) - b'0') as u32;
                                self.advance(1);
                                if code > 255 {
                                    self.add_error(DiagCode::OctalEscapeCodeTooBig, offset);
                                    ok = false;
                                }
                            }
                        }
                        if ok {
                            buffer.push(code as u8);
                        }
                    }
                    b'x' => {
                        let c = self.peek(0);
                        self.advance(1);
                        if !c.is_ascii_hexdigit() {
                            self.add_error(DiagCode::InvalidHexEscapeCode, offset);
                            buffer.push(c);
                        } else {
                            let mut code = hex_digit_value(c);
                            if self.peek(0).is_ascii_hexdigit() {
                                code = code * 16 + hex_digit_value(self.peek(0));
                                self.advance(1);
                            }
                            buffer.push(code as u8);
                        }
                    }
                    _ => {
                        self.add_error(DiagCode::UnknownEscapeCode, offset);
                        buffer.push(c);
                    }
                }
            } else if c == b'"' {
                self.advance(1);
                break;
            } else if is_newline(c) {
                self.add_error(DiagCode::ExpectedClosingQuote, offset);
                break;
            } else if c == 0 {
                if self.at_end() {
                    self.add_error(DiagCode::ExpectedClosingQuote, offset);
                    break;
                }
                self.add_error(DiagCode::EmbeddedNull, offset);
                self.advance(1);
            } else {
                self.advance(1);
                buffer.push(c);
            }
        }
        TokenValue::Str(RcStr::from(String::from_utf8_lossy(&buffer).into_owned()))
    }

    fn lex_escape_sequence(&mut self) -> (TokenKind, TokenValue) {
        let mut c = self.peek(0);
        if is_whitespace(c) || is_newline(c) || c == 0 {
            self.add_error(DiagCode::EscapedWhitespace, self.pos);
            return (TokenKind::Unknown, TokenValue::None);
        }
        while c > 0x20 && c < 0x7F {
            self.advance(1);
            c = self.peek(0);
        }
        // The value text strips the leading backslash.
        let name = get_name_table().intern(&self.lexeme()[1..]);
        (TokenKind::EscIdent, TokenValue::Name(name))
    }

    fn lex_dollar_sign(&mut self) -> (TokenKind, TokenValue) {
        self.scan_identifier();
        // A length of one means we just have a dollar sign operator.
        if self.pos - self.marker == 1 {
            return (TokenKind::Dollar, TokenValue::None);
        }
        let name = get_name_table().intern(&self.lexeme()[1..]);
        (TokenKind::SysIdent, TokenValue::Name(name))
    }

    fn lex_directive(&mut self) -> (TokenKind, TokenValue) {
        let starting_offset = self.pos - 1;
        self.scan_identifier();

        // A length of one means we have a grave character on its own, which
        // is an error.
        if self.pos - self.marker == 1 {
            self.add_error(DiagCode::MisplacedDirectiveChar, starting_offset);
            return (TokenKind::Directive(DirectiveKind::Unknown), TokenValue::None);
        }

        let kind = DirectiveKind::from_str(&self.lexeme()[1..]);
        if !self.on_new_line && kind == DirectiveKind::Include {
            self.add_error(DiagCode::IncludeNotFirstOnLine, starting_offset);
        }
        (TokenKind::Directive(kind), TokenValue::None)
    }

    fn lex_include_file_name(&mut self) -> Token {
        // Leading whitespace lexes into trivia.
        let mut trivia = Vec::new();
        if is_whitespace(self.peek(0)) {
            self.mark();
            self.scan_whitespace(&mut trivia);
        }

        let offset = self.pos;
        let loc = Location::new(self.source, offset);
        self.mark();

        let delim = self.peek(0);
        if delim == b'`' {
            self.advance(1);
            // A macro that expands to a file name.
            let (kind, value) = self.lex_directive();
            let mut token = Token::new(kind, loc, self.lexeme_rcstr());
            token.trivia = trivia;
            token.value = value;
            return token;
        }
        let delim = match delim {
            b'"' => b'"',
            b'<' => b'>',
            _ => {
                self.add_error(DiagCode::ExpectedIncludeFileName, offset);
                let mut token = Token::missing(TokenKind::IncludeFileName, loc);
                token.trivia = trivia;
                return token;
            }
        };

        self.advance(1);
        loop {
            let c = self.peek(0);
            if c == 0 || is_newline(c) {
                self.add_error(DiagCode::ExpectedIncludeFileName, offset);
                break;
            }
            self.advance(1);
            if c == delim {
                break;
            }
        }

        let raw = self.lexeme_rcstr();
        let mut token = Token::new(TokenKind::IncludeFileName, loc, raw.clone());
        token.trivia = trivia;
        token.value = TokenValue::Str(raw);
        token
    }

    fn lex_numeric_literal(&mut self) -> (TokenKind, TokenValue) {
        // Check for the "1step" magic keyword.
        if self.content[self.pos..].starts_with("1step") {
            self.advance(5);
            return (TokenKind::OneStep, TokenValue::None);
        }

        // Scan past leading zeros.
        while self.peek(0) == b'0' {
            self.advance(1);
        }

        // Scan past decimal digits; we know we have at least one if we got
        // here.
        let mut value = 0u64;
        let mut digits = 0i32;
        self.scan_unsigned_number(&mut value, &mut digits);

        // Check if we have a fractional number here.
        match self.peek(0) {
            b'.' => {
                let dec_point = digits;
                self.advance(1);
                if !self.peek(0).is_ascii_digit() {
                    self.add_error(DiagCode::MissingFractionalDigits, self.pos);
                }
                self.scan_unsigned_number(&mut value, &mut digits);

                let mut kind = TokenKind::RealLiteral;
                let mut exp = 0u64;
                let mut neg = false;
                let mut unit = None;

                let c = self.peek(0);
                if c == b'e' || c == b'E' {
                    let start_of_exponent = self.pos + 1;
                    match self.scan_exponent() {
                        Some((e, n)) => {
                            exp = e;
                            neg = n;
                        }
                        None => self.add_error(DiagCode::MissingExponentDigits, start_of_exponent),
                    }
                } else if let Some(u) = self.lex_time_unit() {
                    kind = TokenKind::TimeLiteral;
                    unit = Some(u);
                }

                let real = compute_real_value(value, dec_point, digits, exp, neg);
                let value = match unit {
                    Some(unit) => TokenValue::Time { value: real, unit: unit },
                    None => TokenValue::Real(real),
                };
                return (kind, value);
            }
            b'e' | b'E' => {
                // This is either an exponent or something like a hex digit.
                // We disambiguate by always choosing a real if possible; the
                // parser fixes things up from the raw text when it assembles
                // a vector literal.
                if let Some((exp, neg)) = self.scan_exponent() {
                    let real = compute_real_value(value, digits, digits, exp, neg);
                    return (TokenKind::RealLiteral, TokenValue::Real(real));
                }
            }
            _ => (),
        }

        if let Some(unit) = self.lex_time_unit() {
            return (
                TokenKind::TimeLiteral,
                TokenValue::Time {
                    value: value as f64,
                    unit: unit,
                },
            );
        }

        // A normal signed numeric literal; decoded into a 32-bit signed
        // value, saturating on overflow.
        let int = if value > i32::max_value() as u64 {
            self.add_error(DiagCode::SignedIntegerOverflow, self.marker);
            i32::max_value()
        } else {
            value as i32
        };
        (TokenKind::IntegerLiteral, TokenValue::Int(int))
    }

    fn scan_exponent(&mut self) -> Option<(u64, bool)> {
        // Skip over a leading sign.
        let mut index = 1;
        let mut c = self.peek(index);
        let mut negative = false;
        if c == b'+' || c == b'-' {
            negative = c == b'-';
            index += 1;
            c = self.peek(index);
        }

        // Need at least one decimal digit.
        if !c.is_ascii_digit() {
            return None;
        }

        let mut value = 0u64;
        let mut unused = 0i32;
        self.advance(index);
        self.scan_unsigned_number(&mut value, &mut unused);
        Some((value, negative))
    }

    fn lex_apostrophe(&mut self) -> (TokenKind, TokenValue) {
        let c = self.peek(0);
        match c {
            b'0' | b'1' => {
                self.advance(1);
                let bit = if c == b'0' { Bit::Zero } else { Bit::One };
                (TokenKind::UnbasedUnsizedLiteral, TokenValue::Bit(bit))
            }
            b'x' | b'X' => {
                self.advance(1);
                (TokenKind::UnbasedUnsizedLiteral, TokenValue::Bit(Bit::X))
            }
            b'z' | b'Z' | b'?' => {
                self.advance(1);
                (TokenKind::UnbasedUnsizedLiteral, TokenValue::Bit(Bit::Z))
            }
            b's' | b'S' => {
                self.advance(1);
                match self.lex_integer_base(true) {
                    Some(value) => (TokenKind::IntegerBase, value),
                    None => {
                        self.add_error(DiagCode::ExpectedIntegerBaseAfterSigned, self.pos);
                        (
                            TokenKind::IntegerBase,
                            TokenValue::NumBase {
                                base: LiteralBase::Decimal,
                                signed: true,
                            },
                        )
                    }
                }
            }
            _ => match self.lex_integer_base(false) {
                Some(value) => (TokenKind::IntegerBase, value),
                None => (TokenKind::Apostrophe, TokenValue::None),
            },
        }
    }

    fn lex_integer_base(&mut self, signed: bool) -> Option<TokenValue> {
        let base = LiteralBase::from_char(self.peek(0) as char)?;
        self.advance(1);
        Some(TokenValue::NumBase {
            base: base,
            signed: signed,
        })
    }

    fn lex_time_unit(&mut self) -> Option<TimeUnit> {
        match self.peek(0) {
            b's' => {
                self.advance(1);
                Some(TimeUnit::Seconds)
            }
            c @ b'm' | c @ b'u' | c @ b'n' | c @ b'p' | c @ b'f' if self.peek(1) == b's' => {
                self.advance(2);
                Some(match c {
                    b'm' => TimeUnit::Milliseconds,
                    b'u' => TimeUnit::Microseconds,
                    b'n' => TimeUnit::Nanoseconds,
                    b'p' => TimeUnit::Picoseconds,
                    _ => TimeUnit::Femtoseconds,
                })
            }
            _ => None,
        }
    }

    /// Lex trivia up to the next token. Returns `true` if directive mode
    /// requires an `EndOfDirective` token to be emitted.
    fn lex_trivia(&mut self, buffer: &mut Vec<Trivia>, directive_mode: bool) -> bool {
        loop {
            self.mark();
            match self.peek(0) {
                b' ' | b'\t' | 0x0B | 0x0C => {
                    self.advance(1);
                    self.scan_whitespace(buffer);
                }
                b'/' => match self.peek(1) {
                    b'/' => {
                        self.advance(2);
                        self.scan_line_comment(buffer, directive_mode);
                    }
                    b'*' => {
                        self.advance(2);
                        if self.scan_block_comment(buffer, directive_mode) {
                            return true;
                        }
                    }
                    _ => return false,
                },
                b'\r' => {
                    self.advance(1);
                    self.consume(b'\n');
                    self.on_new_line = true;
                    buffer.push(Trivia::EndOfLine(self.lexeme_rcstr()));
                    if directive_mode {
                        return true;
                    }
                }
                b'\n' => {
                    self.advance(1);
                    self.on_new_line = true;
                    buffer.push(Trivia::EndOfLine(self.lexeme_rcstr()));
                    if directive_mode {
                        return true;
                    }
                }
                b'\\' => {
                    // In a directive this might escape a newline.
                    let n = self.peek(1);
                    if !directive_mode || !is_newline(n) {
                        return false;
                    }
                    self.advance(2);
                    if n == b'\r' {
                        self.consume(b'\n');
                    }
                    self.on_new_line = true;
                    buffer.push(Trivia::LineContinuation(self.lexeme_rcstr()));
                }
                0 => {
                    // In directive mode, return an EOD first to wrap up any
                    // directive processing.
                    return directive_mode;
                }
                _ => return false,
            }
        }
    }

    fn scan_identifier(&mut self) {
        loop {
            let c = self.peek(0);
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' {
                self.advance(1);
            } else {
                return;
            }
        }
    }

    fn scan_unsigned_number(&mut self, value: &mut u64, digits: &mut i32) {
        loop {
            let c = self.peek(0);
            if c == b'_' {
                self.advance(1);
            } else if !c.is_ascii_digit() {
                return;
            } else {
                // After 18 digits stop accumulating; for integers we report
                // the overflow anyway and for reals the later digits have no
                // effect on the result.
                if *digits < MAX_MANTISSA_DIGITS {
                    *value = *value * 10 + (c - b'0') as u64;
                }
                *digits += 1;
                self.advance(1);
            }
        }
    }

    fn scan_whitespace(&mut self, buffer: &mut Vec<Trivia>) {
        loop {
            match self.peek(0) {
                b' ' | b'\t' | 0x0B | 0x0C => self.advance(1),
                _ => break,
            }
        }
        buffer.push(Trivia::Whitespace(self.lexeme_rcstr()));
    }

    fn scan_line_comment(&mut self, buffer: &mut Vec<Trivia>, directive_mode: bool) {
        loop {
            let c = self.peek(0);
            if is_newline(c) {
                break;
            }
            // In a directive the continuation character continues the
            // directive on the next line, so it is not part of the comment.
            if c == b'\\' && directive_mode && is_newline(self.peek(1)) {
                break;
            }
            if c == 0 {
                if self.at_end() {
                    break;
                }
                self.add_error(DiagCode::EmbeddedNull, self.pos);
            }
            self.advance(1);
        }
        buffer.push(Trivia::LineComment(self.lexeme_rcstr()));
    }

    fn scan_block_comment(&mut self, buffer: &mut Vec<Trivia>, directive_mode: bool) -> bool {
        let mut eod = false;
        loop {
            let c = self.peek(0);
            if c == 0 {
                if self.at_end() {
                    self.add_error(DiagCode::UnterminatedBlockComment, self.pos);
                    break;
                }
                self.add_error(DiagCode::EmbeddedNull, self.pos);
                self.advance(1);
            } else if c == b'*' && self.peek(1) == b'/' {
                self.advance(2);
                break;
            } else if c == b'/' && self.peek(1) == b'*' {
                // Nested block comments are disallowed by the standard;
                // report and continue.
                self.add_error(DiagCode::NestedBlockComment, self.pos);
                self.advance(2);
            } else {
                if directive_mode && is_newline(c) {
                    // A newline in a block comment inside a directive still
                    // closes the directive after the comment.
                    self.add_error(DiagCode::SplitBlockCommentInDirective, self.pos);
                    eod = true;
                }
                self.advance(1);
            }
        }
        buffer.push(Trivia::BlockComment(self.lexeme_rcstr()));
        eod
    }

    // Source pointer manipulation.

    fn mark(&mut self) {
        self.marker = self.pos;
    }

    fn peek(&self, offset: usize) -> u8 {
        *self.content.as_bytes().get(self.pos + offset).unwrap_or(&0)
    }

    fn advance(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.content.len());
    }

    fn consume(&mut self, c: u8) -> bool {
        if self.peek(0) == c {
            self.advance(1);
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.content.len()
    }

    fn lexeme(&self) -> &str {
        &self.content[self.marker..self.pos.min(self.content.len())]
    }

    fn lexeme_rcstr(&self) -> RcStr {
        RcStr::new(self.lexeme())
    }

    fn rest_rcstr(&self) -> RcStr {
        RcStr::new(&self.content[self.marker..])
    }

    fn add_error(&mut self, code: DiagCode, offset: usize) {
        self.diagnostics
            .add(Diagnostic::error(code, Location::new(self.source, offset)));
        self.error_count += 1;
    }
}

/// Concatenate two tokens together; used for macro pasting. The result is
/// valid only if the combined raw text lexes into exactly one token followed
/// by end of input.
pub fn concatenate_tokens(left: &Token, right: &Token) -> Option<Token> {
    if left.raw.is_empty() || right.raw.is_empty() {
        return None;
    }
    let combined = format!("{}{}", &*left.raw, &*right.raw);
    let diagnostics = Rc::new(Diagnostics::new());
    let mut lexer = Lexer::from_text(
        left.loc.source,
        Rc::new(combined.clone()),
        diagnostics.clone(),
        LexerOptions::default(),
    );

    let token = lexer.lex(LexerMode::Normal, KeywordVersion::default());
    if token.kind == TokenKind::Unknown || token.raw.is_empty() {
        return None;
    }

    // Make sure the next token is an Eof, otherwise the tokens were unable
    // to be combined and should be left alone.
    if lexer.lex(LexerMode::Normal, KeywordVersion::default()).kind != TokenKind::Eof {
        return None;
    }

    let mut result = token;
    result.loc = left.loc;
    result.raw = RcStr::from(combined);
    result.trivia = left.trivia.clone();
    result.flags |= TokenFlags::FROM_MACRO;
    Some(result)
}

/// Convert a range of tokens into a string literal; used for macro
/// stringification. Whitespace trivia between tokens is preserved unless
/// `no_whitespace` is set. `EmptyMacroArgument` placeholders are skipped and
/// escaped macro quotes encode as `\"`.
pub fn stringify_tokens(
    loc: Location,
    trivia: Vec<Trivia>,
    tokens: &[Token],
    no_whitespace: bool,
) -> Token {
    let mut text = String::new();
    text.push('"');
    for token in tokens {
        if !no_whitespace {
            for t in &token.trivia {
                if let Trivia::Whitespace(s) = t {
                    text.push_str(s);
                }
            }
        }
        match token.kind {
            TokenKind::MacroEscapedQuote => text.push_str("\\\""),
            TokenKind::EmptyMacroArgument => (),
            _ => text.push_str(&token.raw),
        }
    }
    text.push('"');

    let diagnostics = Rc::new(Diagnostics::new());
    let mut lexer = Lexer::from_text(
        loc.source,
        Rc::new(text.clone()),
        diagnostics.clone(),
        LexerOptions::default(),
    );
    let lexed = lexer.lex(LexerMode::Normal, KeywordVersion::default());

    let mut token = if lexed.kind == TokenKind::StringLiteral
        && lexer.lex(LexerMode::Normal, KeywordVersion::default()).kind == TokenKind::Eof
    {
        lexed
    } else {
        // The pieces did not re-lex into a single string; fall back to the
        // uncooked contents.
        let mut token = Token::new(TokenKind::StringLiteral, loc, RcStr::new(""));
        token.value = TokenValue::Str(RcStr::new(&text[1..text.len() - 1]));
        token
    };
    token.loc = loc;
    token.trivia = trivia;
    token.raw = RcStr::from(text);
    token.flags |= TokenFlags::FROM_MACRO;
    token
}

fn is_whitespace(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == 0x0B || c == 0x0C
}

fn is_newline(c: u8) -> bool {
    c == b'\n' || c == b'\r'
}

fn is_octal_digit(c: u8) -> bool {
    c >= b'0' && c <= b'7'
}

fn hex_digit_value(c: u8) -> u32 {
    (c as char).to_digit(16).unwrap()
}

fn utf8_seq_bytes(lead: u8) -> usize {
    if lead >= 0xF0 {
        4
    } else if lead >= 0xE0 {
        3
    } else if lead >= 0xC0 {
        2
    } else {
        1
    }
}

fn compute_real_value(value: u64, dec_point: i32, digits: i32, exp_value: u64, negative: bool) -> f64 {
    let frac_exp = dec_point - digits.min(MAX_MANTISSA_DIGITS);
    let exp_value = exp_value.min(i32::max_value() as u64) as i32;
    let exp = if negative {
        frac_exp.saturating_sub(exp_value)
    } else {
        frac_exp.saturating_add(exp_value)
    };
    // Clamping keeps powi well-defined; the result saturates to infinity or
    // zero past the clamp anyway.
    (value as f64) * 10f64.powi(exp.max(-511).min(511))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mead_common::source::SourceManager;

    fn lex_all(text: &str) -> (Vec<Token>, Vec<Diagnostic>) {
        let sm = SourceManager::new();
        let source = sm.add_anonymous(text);
        let diagnostics = Rc::new(Diagnostics::new());
        let mut lexer = Lexer::new(source, &sm, diagnostics.clone(), LexerOptions::default());
        let mut tokens = Vec::new();
        loop {
            let token = lexer.lex(LexerMode::Normal, KeywordVersion::default());
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, diagnostics.collect())
    }

    fn lex_token(text: &str) -> (Token, Vec<Diagnostic>) {
        let (tokens, diags) = lex_all(text);
        (tokens.into_iter().next().unwrap(), diags)
    }

    #[test]
    fn simple_identifiers() {
        let (token, diags) = lex_token("abc");
        assert_eq!(token.kind, TokenKind::Ident);
        assert_eq!(&*token.value_text(), "abc");
        assert!(diags.is_empty());
    }

    #[test]
    fn escaped_identifier() {
        let (token, diags) = lex_token("\\98\\#$%)(*# ");
        assert_eq!(token.kind, TokenKind::EscIdent);
        assert_eq!(&*token.value_text(), "98\\#$%)(*#");
        assert_eq!(&*token.raw, "\\98\\#$%)(*#");
        assert!(diags.is_empty());
    }

    #[test]
    fn system_identifier() {
        let (token, diags) = lex_token("$display");
        assert_eq!(token.kind, TokenKind::SysIdent);
        assert_eq!(&*token.value_text(), "display");
        assert!(diags.is_empty());
    }

    #[test]
    fn keywords_and_delims() {
        let (tokens, diags) = lex_all("module foo; endmodule");
        assert_eq!(tokens[0].kind, TokenKind::Keyword(crate::keywords::Kw::Module));
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[2].kind, TokenKind::Semicolon);
        assert_eq!(
            tokens[3].kind,
            TokenKind::Keyword(crate::keywords::Kw::Endmodule)
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn string_escapes() {
        let (token, diags) = lex_token(r#""literal \r\n with \x43 escapes \101 omg""#);
        assert_eq!(token.kind, TokenKind::StringLiteral);
        assert_eq!(
            &*token.value_text(),
            "literal r\n with C escapes A omg"
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagCode::UnknownEscapeCode);
    }

    #[test]
    fn string_unterminated() {
        let (token, diags) = lex_token("\"asdf\n");
        assert_eq!(token.kind, TokenKind::StringLiteral);
        assert_eq!(&*token.value_text(), "asdf");
        assert_eq!(diags[0].code, DiagCode::ExpectedClosingQuote);
    }

    #[test]
    fn integer_literal() {
        let (token, diags) = lex_token("19248");
        assert_eq!(token.kind, TokenKind::IntegerLiteral);
        assert_eq!(token.value, TokenValue::Int(19248));
        assert!(diags.is_empty());
    }

    #[test]
    fn integer_with_underscores() {
        let (token, diags) = lex_token("19_248");
        assert_eq!(token.value, TokenValue::Int(19248));
        assert!(diags.is_empty());
    }

    #[test]
    fn integer_overflow_saturates() {
        let (token, diags) = lex_token("9999999999");
        assert_eq!(token.value, TokenValue::Int(i32::max_value()));
        assert_eq!(diags[0].code, DiagCode::SignedIntegerOverflow);
    }

    #[test]
    fn real_literals() {
        let (token, diags) = lex_token("32.57");
        assert_eq!(token.kind, TokenKind::RealLiteral);
        assert_eq!(token.value, TokenValue::Real(32.57));
        assert!(diags.is_empty());

        let (token, _) = lex_token("32e4");
        assert_eq!(token.value, TokenValue::Real(320000.0));

        let (token, _) = lex_token("32.57e-2");
        assert_eq!(token.kind, TokenKind::RealLiteral);
        match token.value {
            TokenValue::Real(v) => assert!((v - 0.3257).abs() < 1e-12),
            _ => panic!("expected real"),
        }
    }

    #[test]
    fn real_missing_exponent_digits() {
        let (token, diags) = lex_token("32.57e");
        assert_eq!(token.kind, TokenKind::RealLiteral);
        assert_eq!(diags[0].code, DiagCode::MissingExponentDigits);
    }

    #[test]
    fn not_an_exponent() {
        // "32e" followed by a non-digit stays an integer literal.
        let (tokens, _) = lex_all("32ef");
        assert_eq!(tokens[0].kind, TokenKind::IntegerLiteral);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
    }

    #[test]
    fn time_literal() {
        let (token, diags) = lex_token("42fs");
        assert_eq!(token.kind, TokenKind::TimeLiteral);
        assert_eq!(
            token.value,
            TokenValue::Time {
                value: 42.0,
                unit: TimeUnit::Femtoseconds
            }
        );
        assert!(diags.is_empty());

        let (token, _) = lex_token("3.4s");
        assert_eq!(
            token.value,
            TokenValue::Time {
                value: 3.4,
                unit: TimeUnit::Seconds
            }
        );
    }

    #[test]
    fn one_step() {
        let (token, diags) = lex_token("1step");
        assert_eq!(token.kind, TokenKind::OneStep);
        assert!(diags.is_empty());
    }

    #[test]
    fn unbased_unsized() {
        let (token, _) = lex_token("'1");
        assert_eq!(token.kind, TokenKind::UnbasedUnsizedLiteral);
        assert_eq!(token.value, TokenValue::Bit(Bit::One));
        let (token, _) = lex_token("'?");
        assert_eq!(token.value, TokenValue::Bit(Bit::Z));
        let (token, _) = lex_token("'x");
        assert_eq!(token.value, TokenValue::Bit(Bit::X));
    }

    #[test]
    fn vector_bases() {
        let (token, diags) = lex_token("'d");
        assert_eq!(token.kind, TokenKind::IntegerBase);
        assert_eq!(
            token.value,
            TokenValue::NumBase {
                base: LiteralBase::Decimal,
                signed: false
            }
        );
        assert!(diags.is_empty());

        let (token, _) = lex_token("'sH");
        assert_eq!(
            token.value,
            TokenValue::NumBase {
                base: LiteralBase::Hex,
                signed: true
            }
        );
    }

    #[test]
    fn bad_vector_base() {
        let (token, diags) = lex_token("'s");
        assert_eq!(token.kind, TokenKind::IntegerBase);
        assert_eq!(diags[0].code, DiagCode::ExpectedIntegerBaseAfterSigned);
    }

    #[test]
    fn misplaced_directive_char() {
        let (token, diags) = lex_token("`");
        assert_eq!(token.kind, TokenKind::Directive(DirectiveKind::Unknown));
        assert_eq!(diags[0].code, DiagCode::MisplacedDirectiveChar);
    }

    #[test]
    fn nested_block_comment() {
        let (tokens, diags) = lex_all("/* foo /* bar */ baz");
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(&*tokens[0].value_text(), "baz");
        assert_eq!(diags[0].code, DiagCode::NestedBlockComment);
    }

    #[test]
    fn unterminated_block_comment() {
        let (tokens, diags) = lex_all("/* foo");
        assert_eq!(tokens[0].kind, TokenKind::Eof);
        assert_eq!(diags[0].code, DiagCode::UnterminatedBlockComment);
    }

    #[test]
    fn directive_mode_eod() {
        let sm = SourceManager::new();
        let source = sm.add_anonymous("foo\nbar");
        let diagnostics = Rc::new(Diagnostics::new());
        let mut lexer = Lexer::new(source, &sm, diagnostics.clone(), LexerOptions::default());
        let t1 = lexer.lex(LexerMode::Directive, KeywordVersion::default());
        assert_eq!(t1.kind, TokenKind::Ident);
        let t2 = lexer.lex(LexerMode::Directive, KeywordVersion::default());
        assert_eq!(t2.kind, TokenKind::EndOfDirective);
        let t3 = lexer.lex(LexerMode::Normal, KeywordVersion::default());
        assert_eq!(t3.kind, TokenKind::Ident);
        assert_eq!(&*t3.value_text(), "bar");
    }

    #[test]
    fn too_many_errors() {
        // A pile of invalid characters forces the lexer to give up.
        let text: String = std::iter::repeat('\x01').take(20).collect();
        let (tokens, diags) = lex_all(&text);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        assert!(diags.iter().any(|d| d.code == DiagCode::TooManyLexerErrors));
    }

    #[test]
    fn round_trip() {
        let text = "module foo; // comment\n  int x = 8'hff * 2; /* block */\nendmodule\n";
        let (tokens, diags) = lex_all(text);
        assert!(diags.is_empty());
        let mut rebuilt = String::new();
        for token in &tokens {
            token.write_to(&mut rebuilt);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn concatenation() {
        let (left, _) = lex_token("foo");
        let (right, _) = lex_token("bar");
        let combined = concatenate_tokens(&left, &right).unwrap();
        assert_eq!(combined.kind, TokenKind::Ident);
        assert_eq!(&*combined.raw, "foobar");

        let (plus, _) = lex_token("+");
        let merged = concatenate_tokens(&plus, &plus).unwrap();
        assert_eq!(merged.kind, TokenKind::Operator(Op::Inc));

        let (semi, _) = lex_token(";");
        assert!(concatenate_tokens(&semi, &right).is_none());
    }

    #[test]
    fn stringification() {
        let (tokens, _) = lex_all("foo bar");
        let loc = tokens[0].loc;
        let result = stringify_tokens(loc, Vec::new(), &tokens[..2], false);
        assert_eq!(result.kind, TokenKind::StringLiteral);
        assert_eq!(&*result.value_text(), "foo bar");
    }
}
