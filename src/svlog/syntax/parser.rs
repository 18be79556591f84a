//! A recursive descent parser for SystemVerilog, covering the member and
//! expression surface that the semantic stages consume. The parser pulls
//! tokens from the preprocessor one at a time and never rewinds beyond its
//! small peek buffer.

use crate::ast::*;
use crate::keywords::Kw;
use crate::preproc::Preprocessor;
use crate::token::*;
use mead_common::errors::{DiagCode, Diagnostic, Diagnostics};
use mead_common::name::{Name, RcStr};
use mead_common::source::{Span, Spanned};
use std::collections::VecDeque;
use std::rc::Rc;

/// Return type of parse functions that report their own diagnostics and only
/// need to communicate success to the caller.
type ReportedResult<T> = Result<T, ()>;

/// The maximum bit width of any integral type or literal.
pub const MAX_BITS: u32 = (1 << 24) - 1;

const MAX_DEPTH: u32 = 256;

pub struct Parser<'a> {
    pp: &'a mut Preprocessor,
    peeked: VecDeque<Token>,
    diagnostics: Rc<Diagnostics>,
    last_span: Span,
    depth: u32,
}

impl<'a> Parser<'a> {
    pub fn new(pp: &'a mut Preprocessor) -> Parser<'a> {
        let diagnostics = pp.diagnostics().clone();
        Parser {
            pp: pp,
            peeked: VecDeque::new(),
            diagnostics: diagnostics,
            last_span: mead_common::source::INVALID_SPAN,
            depth: 0,
        }
    }

    fn peek(&mut self, offset: usize) -> &Token {
        while self.peeked.len() <= offset {
            let token = self.pp.next();
            self.peeked.push_back(token);
        }
        &self.peeked[offset]
    }

    fn kind(&mut self, offset: usize) -> TokenKind {
        self.peek(offset).kind
    }

    fn bump(&mut self) -> Token {
        self.peek(0);
        let token = self.peeked.pop_front().unwrap();
        self.last_span = token.span();
        token
    }

    fn span(&mut self) -> Span {
        self.peek(0).span()
    }

    fn last_span(&self) -> Span {
        self.last_span
    }

    fn add_diag(&self, diag: Diagnostic) {
        self.diagnostics.add(diag);
    }

    fn expect(&mut self, kind: TokenKind) -> ReportedResult<Token> {
        if self.kind(0) == kind {
            Ok(self.bump())
        } else {
            let sp = self.span();
            self.add_diag(
                Diagnostic::error(DiagCode::ExpectedToken, sp)
                    .with_message(format!("expected `{}`", kind)),
            );
            Err(())
        }
    }

    fn try_eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.kind(0) == kind {
            Some(self.bump())
        } else {
            None
        }
    }

    fn eat_ident(&mut self, msg: &str) -> ReportedResult<Spanned<Name>> {
        match self.kind(0) {
            TokenKind::Ident | TokenKind::EscIdent => {
                let token = self.bump();
                Ok(Spanned::new(token.name().unwrap(), token.span()))
            }
            _ => {
                let sp = self.span();
                self.add_diag(
                    Diagnostic::error(DiagCode::ExpectedIdentifier, sp)
                        .with_message(format!("expected {}", msg)),
                );
                Err(())
            }
        }
    }

    fn is_ident(&mut self) -> bool {
        match self.kind(0) {
            TokenKind::Ident | TokenKind::EscIdent => true,
            _ => false,
        }
    }

    /// Skip tokens up to and including the next semicolon, as a crude error
    /// recovery strategy.
    fn recover_semicolon(&mut self) {
        loop {
            match self.kind(0) {
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                TokenKind::Eof => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn guard(&mut self) -> ReportedResult<()> {
        if self.depth >= MAX_DEPTH {
            let sp = self.span();
            self.add_diag(
                Diagnostic::error(DiagCode::ExpectedExpression, sp)
                    .with_message("expression nesting is too deep"),
            );
            return Err(());
        }
        self.depth += 1;
        Ok(())
    }

    fn unguard(&mut self) {
        self.depth -= 1;
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    /// Parse an entire compilation unit.
    pub fn parse_source_unit(&mut self) -> SourceUnit {
        let start = self.span();
        let mut members = Vec::new();
        while self.kind(0) != TokenKind::Eof {
            let before = self.span();
            match self.parse_member() {
                Ok(Some(member)) => members.push(Rc::new(member)),
                Ok(None) => (),
                Err(()) => {
                    // Ensure forward progress.
                    if self.span() == before && self.kind(0) != TokenKind::Eof {
                        self.bump();
                    }
                }
            }
        }
        let span = Span::union(start, self.last_span());
        SourceUnit {
            members: members,
            span: span,
        }
    }

    fn parse_member(&mut self) -> ReportedResult<Option<Member>> {
        let start = self.span();
        let kind = match self.kind(0) {
            TokenKind::Semicolon => {
                self.bump();
                return Ok(Some(Member {
                    kind: MemberKind::Empty,
                    span: start,
                }));
            }
            TokenKind::Keyword(kw) => match kw {
                Kw::Module | Kw::Macromodule => MemberKind::Module(Rc::new(
                    self.parse_module_decl(ModuleKind::Module, Kw::Endmodule)?,
                )),
                Kw::Interface => MemberKind::Module(Rc::new(
                    self.parse_module_decl(ModuleKind::Interface, Kw::Endinterface)?,
                )),
                Kw::Program => MemberKind::Module(Rc::new(
                    self.parse_module_decl(ModuleKind::Program, Kw::Endprogram)?,
                )),
                Kw::Package => MemberKind::Package(Rc::new(self.parse_package_decl()?)),
                Kw::Import => MemberKind::Import(self.parse_import_decl()?),
                Kw::Parameter | Kw::Localparam => {
                    let decl = self.parse_param_decl()?;
                    self.expect(TokenKind::Semicolon)?;
                    MemberKind::Param(Rc::new(decl))
                }
                Kw::Typedef => MemberKind::Typedef(self.parse_typedef_decl()?),
                Kw::Function | Kw::Task => {
                    MemberKind::Subroutine(Rc::new(self.parse_subroutine_decl()?))
                }
                Kw::Assign => MemberKind::ContAssign(self.parse_cont_assign()?),
                Kw::Initial => MemberKind::ProceduralBlock(
                    self.parse_procedural_block(ProceduralBlockKind::Initial)?,
                ),
                Kw::Final => MemberKind::ProceduralBlock(
                    self.parse_procedural_block(ProceduralBlockKind::Final)?,
                ),
                Kw::Always => MemberKind::ProceduralBlock(
                    self.parse_procedural_block(ProceduralBlockKind::Always)?,
                ),
                Kw::AlwaysComb => MemberKind::ProceduralBlock(
                    self.parse_procedural_block(ProceduralBlockKind::AlwaysComb)?,
                ),
                Kw::AlwaysFf => MemberKind::ProceduralBlock(
                    self.parse_procedural_block(ProceduralBlockKind::AlwaysFf)?,
                ),
                Kw::AlwaysLatch => MemberKind::ProceduralBlock(
                    self.parse_procedural_block(ProceduralBlockKind::AlwaysLatch)?,
                ),
                Kw::Generate => {
                    self.bump();
                    let mut members = Vec::new();
                    while self.kind(0) != TokenKind::Keyword(Kw::Endgenerate)
                        && self.kind(0) != TokenKind::Eof
                    {
                        if let Ok(Some(member)) = self.parse_member() {
                            members.push(Rc::new(member));
                        }
                    }
                    self.try_eat(TokenKind::Keyword(Kw::Endgenerate));
                    MemberKind::GenerateRegion(members)
                }
                Kw::Wire
                | Kw::Uwire
                | Kw::Wand
                | Kw::Wor
                | Kw::Tri
                | Kw::Tri0
                | Kw::Tri1
                | Kw::Triand
                | Kw::Trior
                | Kw::Trireg
                | Kw::Supply0
                | Kw::Supply1 => MemberKind::Net(self.parse_net_decl()?),
                Kw::Const | Kw::Var => MemberKind::Data(self.parse_data_decl()?),
                _ if is_data_type_start(kw) => MemberKind::Data(self.parse_data_decl()?),
                _ => {
                    let sp = self.span();
                    self.add_diag(
                        Diagnostic::error(DiagCode::ExpectedMember, sp)
                            .with_message(format!("expected member, found keyword `{}`", kw)),
                    );
                    self.bump();
                    return Err(());
                }
            },
            TokenKind::Ident | TokenKind::EscIdent => {
                // Either a hierarchy instantiation or a data declaration with
                // a named type. An instantiation has the shape
                // `type [#(...)] name (...)`.
                if self.kind(1) == TokenKind::Hashtag
                    || (is_ident_kind(self.kind(1))
                        && self.kind(2) == TokenKind::OpenDelim(DelimKind::Paren))
                {
                    MemberKind::Instantiation(self.parse_instantiation()?)
                } else {
                    MemberKind::Data(self.parse_data_decl()?)
                }
            }
            TokenKind::Eof => return Ok(None),
            _ => {
                let sp = self.span();
                self.add_diag(Diagnostic::error(DiagCode::ExpectedMember, sp));
                self.bump();
                return Err(());
            }
        };
        let span = Span::union(start, self.last_span());
        Ok(Some(Member {
            kind: kind,
            span: span,
        }))
    }

    fn parse_module_decl(&mut self, kind: ModuleKind, end_kw: Kw) -> ReportedResult<ModuleDecl> {
        self.bump(); // module/interface/program keyword
        let lifetime = self.parse_lifetime();
        let name = self.eat_ident("module name")?;

        let mut param_ports = Vec::new();
        if self.try_eat(TokenKind::Hashtag).is_some() {
            self.expect(TokenKind::OpenDelim(DelimKind::Paren))?;
            param_ports = self.parse_param_port_list()?;
        }

        let mut ports = Vec::new();
        if self.try_eat(TokenKind::OpenDelim(DelimKind::Paren)).is_some() {
            ports = self.parse_port_list()?;
        }
        self.expect(TokenKind::Semicolon)?;

        let mut members = Vec::new();
        while self.kind(0) != TokenKind::Keyword(end_kw) && self.kind(0) != TokenKind::Eof {
            let before = self.span();
            match self.parse_member() {
                Ok(Some(member)) => members.push(Rc::new(member)),
                Ok(None) => break,
                Err(()) => {
                    if self.span() == before && self.kind(0) != TokenKind::Eof {
                        self.bump();
                    }
                }
            }
        }
        self.expect(TokenKind::Keyword(end_kw))?;
        // Optional end label.
        if self.try_eat(TokenKind::Colon).is_some() {
            let _ = self.eat_ident("end label");
        }

        Ok(ModuleDecl {
            kind: kind,
            lifetime: lifetime,
            name: name,
            param_ports: param_ports,
            ports: ports,
            members: members,
        })
    }

    fn parse_lifetime(&mut self) -> Option<Kw> {
        match self.kind(0) {
            TokenKind::Keyword(kw @ Kw::Static) | TokenKind::Keyword(kw @ Kw::Automatic) => {
                self.bump();
                Some(kw)
            }
            _ => None,
        }
    }

    /// Parse the contents of a `#(...)` parameter port list. Declarations
    /// without a keyword inherit the keyword of the preceding one; resolving
    /// that inheritance is left to the semantic stage.
    fn parse_param_port_list(&mut self) -> ReportedResult<Vec<Rc<ParamDecl>>> {
        let mut decls = Vec::new();
        if self.try_eat(TokenKind::CloseDelim(DelimKind::Paren)).is_some() {
            return Ok(decls);
        }
        loop {
            let start = self.span();
            let keyword = match self.kind(0) {
                TokenKind::Keyword(kw @ Kw::Parameter) | TokenKind::Keyword(kw @ Kw::Localparam) => {
                    self.bump();
                    Some(kw)
                }
                _ => None,
            };
            let ty = self.parse_optional_data_type()?;
            let declarator = self.parse_declarator()?;
            let span = Span::union(start, self.last_span());
            decls.push(Rc::new(ParamDecl {
                keyword: keyword,
                ty: ty,
                declarators: vec![declarator],
                span: span,
            }));
            if self.try_eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::CloseDelim(DelimKind::Paren))?;
        Ok(decls)
    }

    fn parse_port_list(&mut self) -> ReportedResult<Vec<PortDecl>> {
        let mut ports = Vec::new();
        if self.try_eat(TokenKind::CloseDelim(DelimKind::Paren)).is_some() {
            return Ok(ports);
        }
        loop {
            let start = self.span();
            let dir = match self.kind(0) {
                TokenKind::Keyword(kw @ Kw::Input)
                | TokenKind::Keyword(kw @ Kw::Output)
                | TokenKind::Keyword(kw @ Kw::Inout)
                | TokenKind::Keyword(kw @ Kw::Ref) => {
                    self.bump();
                    Some(kw)
                }
                _ => None,
            };
            let ty = self.parse_optional_data_type()?;
            let name = self.eat_ident("port name")?;
            let mut dims = Vec::new();
            while self.kind(0) == TokenKind::OpenDelim(DelimKind::Brack) {
                dims.push(Rc::new(self.parse_dimension()?));
            }
            // Default value, ignored beyond its shape.
            if self.try_eat(TokenKind::Operator(Op::Assign)).is_some() {
                let _ = self.parse_expression()?;
            }
            let span = Span::union(start, self.last_span());
            ports.push(PortDecl {
                dir: dir,
                ty: Some(ty),
                name: name,
                dims: dims,
                span: span,
            });
            if self.try_eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::CloseDelim(DelimKind::Paren))?;
        Ok(ports)
    }

    fn parse_package_decl(&mut self) -> ReportedResult<PackageDecl> {
        self.bump(); // package keyword
        let _lifetime = self.parse_lifetime();
        let name = self.eat_ident("package name")?;
        self.expect(TokenKind::Semicolon)?;
        let mut members = Vec::new();
        while self.kind(0) != TokenKind::Keyword(Kw::Endpackage) && self.kind(0) != TokenKind::Eof {
            let before = self.span();
            match self.parse_member() {
                Ok(Some(member)) => members.push(Rc::new(member)),
                Ok(None) => break,
                Err(()) => {
                    if self.span() == before && self.kind(0) != TokenKind::Eof {
                        self.bump();
                    }
                }
            }
        }
        self.expect(TokenKind::Keyword(Kw::Endpackage))?;
        if self.try_eat(TokenKind::Colon).is_some() {
            let _ = self.eat_ident("end label");
        }
        Ok(PackageDecl {
            name: name,
            members: members,
        })
    }

    fn parse_import_decl(&mut self) -> ReportedResult<ImportDecl> {
        self.bump(); // import keyword
        let mut items = Vec::new();
        loop {
            let start = self.span();
            let package = self.eat_ident("package name")?;
            self.expect(TokenKind::Namespace)?;
            let item = match self.kind(0) {
                TokenKind::Operator(Op::Mul) => {
                    self.bump();
                    None
                }
                _ => Some(self.eat_ident("import item")?),
            };
            let span = Span::union(start, self.last_span());
            items.push(ImportItem {
                package: package,
                item: item,
                span: span,
            });
            if self.try_eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(ImportDecl { items: items })
    }

    fn parse_param_decl(&mut self) -> ReportedResult<ParamDecl> {
        let start = self.span();
        let keyword = match self.kind(0) {
            TokenKind::Keyword(kw @ Kw::Parameter) | TokenKind::Keyword(kw @ Kw::Localparam) => {
                self.bump();
                Some(kw)
            }
            _ => None,
        };
        let ty = self.parse_optional_data_type()?;
        let mut declarators = vec![self.parse_declarator()?];
        while self.try_eat(TokenKind::Comma).is_some() {
            declarators.push(self.parse_declarator()?);
        }
        let span = Span::union(start, self.last_span());
        Ok(ParamDecl {
            keyword: keyword,
            ty: ty,
            declarators: declarators,
            span: span,
        })
    }

    fn parse_typedef_decl(&mut self) -> ReportedResult<TypedefDecl> {
        self.bump(); // typedef keyword
        let ty = self.parse_data_type()?;
        let name = self.eat_ident("typedef name")?;
        let mut dims = Vec::new();
        while self.kind(0) == TokenKind::OpenDelim(DelimKind::Brack) {
            dims.push(Rc::new(self.parse_dimension()?));
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(TypedefDecl {
            ty: ty,
            name: name,
            dims: dims,
        })
    }

    fn parse_subroutine_decl(&mut self) -> ReportedResult<SubroutineDecl> {
        let start = self.span();
        let is_task = self.kind(0) == TokenKind::Keyword(Kw::Task);
        self.bump();
        let lifetime = self.parse_lifetime();

        // Functions have a return type; `void` and implicit types are both
        // acceptable. A named return type is present when two identifiers
        // follow each other; otherwise the single identifier is the name.
        let mut return_ty = None;
        if !is_task {
            return_ty = match self.kind(0) {
                TokenKind::Keyword(kw) if is_data_type_start(kw) || kw == Kw::Void => {
                    Some(self.parse_data_type()?)
                }
                TokenKind::Ident if self.kind(1) == TokenKind::Ident => {
                    Some(self.parse_data_type()?)
                }
                _ => None,
            };
        }
        let name = self.eat_ident("subroutine name")?;

        let mut args = Vec::new();
        if self.try_eat(TokenKind::OpenDelim(DelimKind::Paren)).is_some() {
            if self.try_eat(TokenKind::CloseDelim(DelimKind::Paren)).is_none() {
                loop {
                    args.push(self.parse_formal_arg()?);
                    if self.try_eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
                self.expect(TokenKind::CloseDelim(DelimKind::Paren))?;
            }
        }
        self.expect(TokenKind::Semicolon)?;

        // Skip the body; it is not modeled.
        let end_kw = if is_task { Kw::Endtask } else { Kw::Endfunction };
        while self.kind(0) != TokenKind::Keyword(end_kw) && self.kind(0) != TokenKind::Eof {
            self.bump();
        }
        self.expect(TokenKind::Keyword(end_kw))?;
        if self.try_eat(TokenKind::Colon).is_some() {
            let _ = self.eat_ident("end label");
        }

        let span = Span::union(start, self.last_span());
        Ok(SubroutineDecl {
            is_task: is_task,
            lifetime: lifetime,
            return_ty: return_ty,
            name: name,
            args: args,
            span: span,
        })
    }

    fn parse_formal_arg(&mut self) -> ReportedResult<FormalArg> {
        let start = self.span();
        let dir = match self.kind(0) {
            TokenKind::Keyword(kw @ Kw::Input)
            | TokenKind::Keyword(kw @ Kw::Output)
            | TokenKind::Keyword(kw @ Kw::Inout)
            | TokenKind::Keyword(kw @ Kw::Ref) => {
                self.bump();
                Some(kw)
            }
            _ => None,
        };
        let ty = self.parse_optional_data_type()?;
        let name = self.eat_ident("argument name")?;
        let default = if self.try_eat(TokenKind::Operator(Op::Assign)).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let span = Span::union(start, self.last_span());
        Ok(FormalArg {
            dir: dir,
            ty: ty,
            name: name,
            default: default,
            span: span,
        })
    }

    fn parse_net_decl(&mut self) -> ReportedResult<NetDecl> {
        let net_type = match self.bump().kind {
            TokenKind::Keyword(kw) => kw,
            _ => unreachable!("caller checked for a net type keyword"),
        };
        let ty = self.parse_optional_data_type()?;
        let mut declarators = vec![self.parse_declarator()?];
        while self.try_eat(TokenKind::Comma).is_some() {
            declarators.push(self.parse_declarator()?);
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(NetDecl {
            net_type: net_type,
            ty: ty,
            declarators: declarators,
        })
    }

    fn parse_data_decl(&mut self) -> ReportedResult<DataDecl> {
        let konst = self.try_eat(TokenKind::Keyword(Kw::Const)).is_some();
        self.try_eat(TokenKind::Keyword(Kw::Var));
        let ty = self.parse_data_type()?;
        let mut declarators = vec![self.parse_declarator()?];
        while self.try_eat(TokenKind::Comma).is_some() {
            declarators.push(self.parse_declarator()?);
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(DataDecl {
            konst: konst,
            ty: ty,
            declarators: declarators,
        })
    }

    fn parse_declarator(&mut self) -> ReportedResult<Declarator> {
        let start = self.span();
        let name = self.eat_ident("declaration name")?;
        let mut dims = Vec::new();
        while self.kind(0) == TokenKind::OpenDelim(DelimKind::Brack) {
            dims.push(Rc::new(self.parse_dimension()?));
        }
        let init = if self.try_eat(TokenKind::Operator(Op::Assign)).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let span = Span::union(start, self.last_span());
        Ok(Declarator {
            name: name,
            dims: dims,
            init: init,
            span: span,
        })
    }

    fn parse_instantiation(&mut self) -> ReportedResult<Instantiation> {
        let target = self.eat_ident("module name")?;

        let mut params = Vec::new();
        if self.try_eat(TokenKind::Hashtag).is_some() {
            self.expect(TokenKind::OpenDelim(DelimKind::Paren))?;
            params = self.parse_connection_list()?;
        }

        let mut instances = Vec::new();
        loop {
            let start = self.span();
            let name = self.eat_ident("instance name")?;
            self.expect(TokenKind::OpenDelim(DelimKind::Paren))?;
            let conns = self.parse_connection_list()?;
            let span = Span::union(start, self.last_span());
            instances.push(InstanceDecl {
                name: name,
                conns: conns,
                span: span,
            });
            if self.try_eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(Instantiation {
            target: target,
            params: params,
            instances: instances,
        })
    }

    /// Parse a parenthesized connection list; the open paren has already
    /// been consumed.
    fn parse_connection_list(
        &mut self,
    ) -> ReportedResult<Vec<(Option<Spanned<Name>>, Option<Rc<Expr>>)>> {
        let mut conns = Vec::new();
        if self.try_eat(TokenKind::CloseDelim(DelimKind::Paren)).is_some() {
            return Ok(conns);
        }
        loop {
            match self.kind(0) {
                TokenKind::PeriodStar => {
                    self.bump();
                    conns.push((None, None));
                }
                TokenKind::Period => {
                    self.bump();
                    let name = self.eat_ident("connection name")?;
                    let mut expr = None;
                    if self.try_eat(TokenKind::OpenDelim(DelimKind::Paren)).is_some() {
                        if self.kind(0) != TokenKind::CloseDelim(DelimKind::Paren) {
                            expr = Some(self.parse_expression()?);
                        }
                        self.expect(TokenKind::CloseDelim(DelimKind::Paren))?;
                    }
                    conns.push((Some(name), expr));
                }
                TokenKind::Comma | TokenKind::CloseDelim(DelimKind::Paren) => {
                    conns.push((None, None));
                }
                _ => {
                    let expr = self.parse_expression()?;
                    conns.push((None, Some(expr)));
                }
            }
            if self.try_eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::CloseDelim(DelimKind::Paren))?;
        Ok(conns)
    }

    fn parse_cont_assign(&mut self) -> ReportedResult<ContAssign> {
        self.bump(); // assign keyword
        let mut assignments = Vec::new();
        loop {
            assignments.push(self.parse_expression()?);
            if self.try_eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(ContAssign {
            assignments: assignments,
        })
    }

    fn parse_procedural_block(
        &mut self,
        kind: ProceduralBlockKind,
    ) -> ReportedResult<ProceduralBlock> {
        self.bump(); // block keyword
        // Optional event control.
        if self.try_eat(TokenKind::At).is_some() {
            if self.try_eat(TokenKind::OpenDelim(DelimKind::Paren)).is_some() {
                let mut depth = 1;
                while depth > 0 && self.kind(0) != TokenKind::Eof {
                    match self.bump().kind {
                        TokenKind::OpenDelim(DelimKind::Paren) => depth += 1,
                        TokenKind::CloseDelim(DelimKind::Paren) => depth -= 1,
                        _ => (),
                    }
                }
            } else {
                self.bump();
            }
        } else {
            self.try_eat(TokenKind::AtStar);
        }

        let mut stmts = Vec::new();
        if self.try_eat(TokenKind::Keyword(Kw::Begin)).is_some() {
            while self.kind(0) != TokenKind::Keyword(Kw::End) && self.kind(0) != TokenKind::Eof {
                self.parse_simple_stmt(&mut stmts);
            }
            self.expect(TokenKind::Keyword(Kw::End))?;
        } else {
            self.parse_simple_stmt(&mut stmts);
        }
        Ok(ProceduralBlock {
            kind: kind,
            stmts: stmts,
        })
    }

    /// Parse a single statement of a procedural block. Only expression
    /// statements (assignments, calls) are retained; anything else is
    /// skipped up to the next semicolon.
    fn parse_simple_stmt(&mut self, stmts: &mut Vec<Rc<Expr>>) {
        match self.kind(0) {
            TokenKind::Ident
            | TokenKind::EscIdent
            | TokenKind::SysIdent
            | TokenKind::OpenDelim(DelimKind::Brace) => match self.parse_expression() {
                Ok(expr) => {
                    stmts.push(expr);
                    if self.try_eat(TokenKind::Semicolon).is_none() {
                        self.recover_semicolon();
                    }
                }
                Err(()) => self.recover_semicolon(),
            },
            _ => self.recover_semicolon(),
        }
    }

    // ------------------------------------------------------------------
    // Data types
    // ------------------------------------------------------------------

    /// Parse a data type where one may be omitted (implicit types).
    fn parse_optional_data_type(&mut self) -> ReportedResult<Rc<DataType>> {
        let start = self.span();
        match self.kind(0) {
            TokenKind::Keyword(kw) if is_data_type_start(kw) => self.parse_data_type(),
            // A named type only if another identifier follows; otherwise the
            // identifier is the declared name itself.
            TokenKind::Ident | TokenKind::EscIdent
                if is_ident_kind(self.kind(1)) || self.kind(1) == TokenKind::Namespace =>
            {
                self.parse_data_type()
            }
            TokenKind::Keyword(Kw::Signed) | TokenKind::Keyword(Kw::Unsigned) => {
                let signing = self.parse_signing();
                let dims = self.parse_packed_dims()?;
                let span = Span::union(start, self.last_span());
                Ok(Rc::new(DataType {
                    kind: DataTypeKind::Implicit {
                        signing: signing,
                        dims: dims,
                    },
                    span: span,
                }))
            }
            TokenKind::OpenDelim(DelimKind::Brack) => {
                let dims = self.parse_packed_dims()?;
                let span = Span::union(start, self.last_span());
                Ok(Rc::new(DataType {
                    kind: DataTypeKind::Implicit {
                        signing: None,
                        dims: dims,
                    },
                    span: span,
                }))
            }
            _ => Ok(Rc::new(DataType {
                kind: DataTypeKind::Implicit {
                    signing: None,
                    dims: Vec::new(),
                },
                span: start,
            })),
        }
    }

    pub fn parse_data_type(&mut self) -> ReportedResult<Rc<DataType>> {
        let start = self.span();
        let kind = match self.kind(0) {
            TokenKind::Keyword(kw @ Kw::Bit)
            | TokenKind::Keyword(kw @ Kw::Logic)
            | TokenKind::Keyword(kw @ Kw::Reg) => {
                self.bump();
                let signing = self.parse_signing();
                let dims = self.parse_packed_dims()?;
                DataTypeKind::IntVec {
                    kw: kw,
                    signing: signing,
                    dims: dims,
                }
            }
            TokenKind::Keyword(kw @ Kw::Byte)
            | TokenKind::Keyword(kw @ Kw::Shortint)
            | TokenKind::Keyword(kw @ Kw::Int)
            | TokenKind::Keyword(kw @ Kw::Longint)
            | TokenKind::Keyword(kw @ Kw::Integer)
            | TokenKind::Keyword(kw @ Kw::Time) => {
                self.bump();
                let signing = self.parse_signing();
                DataTypeKind::IntAtom {
                    kw: kw,
                    signing: signing,
                }
            }
            TokenKind::Keyword(kw @ Kw::Shortreal)
            | TokenKind::Keyword(kw @ Kw::Real)
            | TokenKind::Keyword(kw @ Kw::Realtime) => {
                self.bump();
                DataTypeKind::Real { kw: kw }
            }
            TokenKind::Keyword(Kw::String) => {
                self.bump();
                DataTypeKind::String
            }
            TokenKind::Keyword(Kw::Chandle) => {
                self.bump();
                DataTypeKind::Chandle
            }
            TokenKind::Keyword(Kw::Event) => {
                self.bump();
                DataTypeKind::Event
            }
            TokenKind::Keyword(Kw::Void) => {
                self.bump();
                DataTypeKind::Void
            }
            TokenKind::Keyword(Kw::Struct) | TokenKind::Keyword(Kw::Union) => {
                self.parse_struct_union()?
            }
            TokenKind::Keyword(Kw::Enum) => self.parse_enum()?,
            TokenKind::Ident | TokenKind::EscIdent => {
                let first = self.eat_ident("type name")?;
                let name = if self.try_eat(TokenKind::Namespace).is_some() {
                    let item = self.eat_ident("type name")?;
                    NameRef::Scoped {
                        scope: first,
                        item: item,
                    }
                } else {
                    NameRef::Ident(first)
                };
                let dims = self.parse_packed_dims()?;
                DataTypeKind::Named {
                    name: name,
                    dims: dims,
                }
            }
            _ => {
                let sp = self.span();
                self.add_diag(
                    Diagnostic::error(DiagCode::ExpectedToken, sp)
                        .with_message("expected a data type"),
                );
                return Err(());
            }
        };
        let span = Span::union(start, self.last_span());
        Ok(Rc::new(DataType {
            kind: kind,
            span: span,
        }))
    }

    fn parse_signing(&mut self) -> Option<Kw> {
        match self.kind(0) {
            TokenKind::Keyword(kw @ Kw::Signed) | TokenKind::Keyword(kw @ Kw::Unsigned) => {
                self.bump();
                Some(kw)
            }
            _ => None,
        }
    }

    fn parse_packed_dims(&mut self) -> ReportedResult<Vec<Rc<Dimension>>> {
        let mut dims = Vec::new();
        while self.kind(0) == TokenKind::OpenDelim(DelimKind::Brack) {
            dims.push(Rc::new(self.parse_dimension()?));
        }
        Ok(dims)
    }

    fn parse_dimension(&mut self) -> ReportedResult<Dimension> {
        let start = self.span();
        self.expect(TokenKind::OpenDelim(DelimKind::Brack))?;
        let kind = if self.kind(0) == TokenKind::CloseDelim(DelimKind::Brack) {
            DimKind::Unsized
        } else {
            let left = self.parse_expression()?;
            if self.try_eat(TokenKind::Colon).is_some() {
                let right = self.parse_expression()?;
                DimKind::Range(left, right)
            } else {
                DimKind::Size(left)
            }
        };
        self.expect(TokenKind::CloseDelim(DelimKind::Brack))?;
        let span = Span::union(start, self.last_span());
        Ok(Dimension {
            kind: kind,
            span: span,
        })
    }

    fn parse_struct_union(&mut self) -> ReportedResult<DataTypeKind> {
        let is_union = self.kind(0) == TokenKind::Keyword(Kw::Union);
        self.bump();
        self.try_eat(TokenKind::Keyword(Kw::Tagged));
        let packed = self.try_eat(TokenKind::Keyword(Kw::Packed)).is_some();
        let signing = self.parse_signing();
        self.expect(TokenKind::OpenDelim(DelimKind::Brace))?;

        let mut members = Vec::new();
        while self.kind(0) != TokenKind::CloseDelim(DelimKind::Brace)
            && self.kind(0) != TokenKind::Eof
        {
            let start = self.span();
            let ty = self.parse_data_type()?;
            let mut declarators = vec![self.parse_declarator()?];
            while self.try_eat(TokenKind::Comma).is_some() {
                declarators.push(self.parse_declarator()?);
            }
            self.expect(TokenKind::Semicolon)?;
            let span = Span::union(start, self.last_span());
            members.push(StructMemberDecl {
                ty: ty,
                declarators: declarators,
                span: span,
            });
        }
        self.expect(TokenKind::CloseDelim(DelimKind::Brace))?;
        let dims = self.parse_packed_dims()?;
        Ok(DataTypeKind::StructUnion {
            is_union: is_union,
            packed: packed,
            signing: signing,
            members: members,
            dims: dims,
        })
    }

    fn parse_enum(&mut self) -> ReportedResult<DataTypeKind> {
        self.bump(); // enum keyword
        let base = match self.kind(0) {
            TokenKind::OpenDelim(DelimKind::Brace) => None,
            _ => Some(self.parse_data_type()?),
        };
        self.expect(TokenKind::OpenDelim(DelimKind::Brace))?;
        let mut variants = Vec::new();
        loop {
            let name = self.eat_ident("enum variant name")?;
            let init = if self.try_eat(TokenKind::Operator(Op::Assign)).is_some() {
                Some(self.parse_expression()?)
            } else {
                None
            };
            variants.push(EnumVariant {
                name: name,
                init: init,
            });
            if self.try_eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::CloseDelim(DelimKind::Brace))?;
        let dims = self.parse_packed_dims()?;
        Ok(DataTypeKind::Enum {
            base: base,
            variants: variants,
            dims: dims,
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Parse an expression, including assignments.
    pub fn parse_expression(&mut self) -> ReportedResult<Rc<Expr>> {
        self.guard()?;
        let result = self.parse_assignment_expr();
        self.unguard();
        result
    }

    fn parse_assignment_expr(&mut self) -> ReportedResult<Rc<Expr>> {
        let start = self.span();
        let lhs = self.parse_ternary_expr()?;
        let op = match self.kind(0) {
            TokenKind::Operator(Op::Assign) => Some(None),
            TokenKind::Operator(op) if assignment_operand_op(op).is_some() => {
                Some(assignment_operand_op(op))
            }
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let rhs = self.parse_assignment_expr()?;
            let span = Span::union(start, self.last_span());
            return Ok(Rc::new(Expr {
                kind: ExprKind::Assign {
                    op: op,
                    lhs: lhs,
                    rhs: rhs,
                },
                span: span,
            }));
        }
        Ok(lhs)
    }

    fn parse_ternary_expr(&mut self) -> ReportedResult<Rc<Expr>> {
        let start = self.span();
        let cond = self.parse_binary_expr(0)?;
        if self.try_eat(TokenKind::Ternary).is_some() {
            self.guard()?;
            let true_expr = self.parse_ternary_expr();
            let result = true_expr.and_then(|true_expr| {
                self.expect(TokenKind::Colon)?;
                let false_expr = self.parse_ternary_expr()?;
                let span = Span::union(start, self.last_span());
                Ok(Rc::new(Expr {
                    kind: ExprKind::Ternary {
                        cond: cond,
                        true_expr: true_expr,
                        false_expr: false_expr,
                    },
                    span: span,
                }))
            });
            self.unguard();
            return result;
        }
        Ok(cond)
    }

    fn parse_binary_expr(&mut self, min_prec: u8) -> ReportedResult<Rc<Expr>> {
        let start = self.span();
        let mut lhs = self.parse_unary_expr()?;
        loop {
            let op = match self.kind(0) {
                TokenKind::Operator(op) => op,
                _ => break,
            };
            let prec = match binary_precedence(op) {
                Some(prec) if prec >= min_prec => prec,
                _ => break,
            };
            self.guard()?;
            self.bump();
            let rhs = self.parse_binary_expr(prec + 1);
            self.unguard();
            let rhs = rhs?;
            let span = Span::union(start, self.last_span());
            lhs = Rc::new(Expr {
                kind: ExprKind::Binary {
                    op: op,
                    lhs: lhs,
                    rhs: rhs,
                },
                span: span,
            });
        }
        Ok(lhs)
    }

    fn parse_unary_expr(&mut self) -> ReportedResult<Rc<Expr>> {
        let start = self.span();
        let op = match self.kind(0) {
            TokenKind::Operator(Op::Add) => Some(UnaryOp::Plus),
            TokenKind::Operator(Op::Sub) => Some(UnaryOp::Minus),
            TokenKind::Operator(Op::LogicNot) => Some(UnaryOp::LogicNot),
            TokenKind::Operator(Op::BitNot) => Some(UnaryOp::BitNot),
            TokenKind::Operator(Op::BitAnd) => Some(UnaryOp::RedAnd),
            TokenKind::Operator(Op::BitOr) => Some(UnaryOp::RedOr),
            TokenKind::Operator(Op::BitXor) => Some(UnaryOp::RedXor),
            TokenKind::Operator(Op::BitNand) => Some(UnaryOp::RedNand),
            TokenKind::Operator(Op::BitNor) => Some(UnaryOp::RedNor),
            TokenKind::Operator(Op::BitNxor) | TokenKind::Operator(Op::BitXnor) => {
                Some(UnaryOp::RedXnor)
            }
            TokenKind::Operator(Op::Inc) => Some(UnaryOp::PreInc),
            TokenKind::Operator(Op::Dec) => Some(UnaryOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            self.guard()?;
            let expr = self.parse_unary_expr();
            self.unguard();
            let expr = expr?;
            let span = Span::union(start, self.last_span());
            return Ok(Rc::new(Expr {
                kind: ExprKind::Unary { op: op, expr: expr },
                span: span,
            }));
        }

        let mut expr = self.parse_primary_expr()?;
        expr = self.parse_postfix(expr)?;

        // Postfix increment and decrement.
        let post = match self.kind(0) {
            TokenKind::Operator(Op::Inc) => Some(UnaryOp::PostInc),
            TokenKind::Operator(Op::Dec) => Some(UnaryOp::PostDec),
            _ => None,
        };
        if let Some(op) = post {
            self.bump();
            let span = Span::union(start, self.last_span());
            expr = Rc::new(Expr {
                kind: ExprKind::Unary { op: op, expr: expr },
                span: span,
            });
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self, mut expr: Rc<Expr>) -> ReportedResult<Rc<Expr>> {
        loop {
            match self.kind(0) {
                TokenKind::Period => {
                    self.bump();
                    let member = self.eat_ident("member name")?;
                    let span = Span::union(expr.span, member.span);
                    expr = Rc::new(Expr {
                        kind: ExprKind::MemberAccess {
                            value: expr,
                            member: member,
                        },
                        span: span,
                    });
                }
                TokenKind::OpenDelim(DelimKind::Brack) => {
                    let value_span = expr.span;
                    self.bump();
                    let first = self.parse_expression()?;
                    let kind = match self.kind(0) {
                        TokenKind::Colon => {
                            self.bump();
                            Some(RangeSelectKind::Simple)
                        }
                        TokenKind::AddColon => {
                            self.bump();
                            Some(RangeSelectKind::IndexedUp)
                        }
                        TokenKind::SubColon => {
                            self.bump();
                            Some(RangeSelectKind::IndexedDown)
                        }
                        _ => None,
                    };
                    let node = match kind {
                        Some(kind) => {
                            let right = self.parse_expression()?;
                            self.expect(TokenKind::CloseDelim(DelimKind::Brack))?;
                            ExprKind::RangeSelect {
                                value: expr,
                                kind: kind,
                                left: first,
                                right: right,
                            }
                        }
                        None => {
                            self.expect(TokenKind::CloseDelim(DelimKind::Brack))?;
                            ExprKind::ElementSelect {
                                value: expr,
                                index: first,
                            }
                        }
                    };
                    expr = Rc::new(Expr {
                        kind: node,
                        span: Span::union(value_span, self.last_span()),
                    });
                }
                TokenKind::OpenDelim(DelimKind::Paren) => {
                    self.bump();
                    let mut args = Vec::new();
                    if self.kind(0) != TokenKind::CloseDelim(DelimKind::Paren) {
                        loop {
                            args.push(self.parse_expression()?);
                            if self.try_eat(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::CloseDelim(DelimKind::Paren))?;
                    let span = Span::union(expr.span, self.last_span());
                    expr = Rc::new(Expr {
                        kind: ExprKind::Invocation {
                            callee: expr,
                            args: args,
                        },
                        span: span,
                    });
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary_expr(&mut self) -> ReportedResult<Rc<Expr>> {
        let start = self.span();
        let kind = match self.kind(0) {
            TokenKind::IntegerLiteral => {
                let token = self.bump();
                let int = match token.value {
                    TokenValue::Int(v) => v,
                    _ => 0,
                };
                if self.kind(0) == TokenKind::IntegerBase {
                    self.parse_vector_literal(Some(int))?
                } else {
                    ExprKind::Literal(Lit::Int(int))
                }
            }
            TokenKind::IntegerBase => self.parse_vector_literal(None)?,
            TokenKind::RealLiteral => {
                let token = self.bump();
                let value = match token.value {
                    TokenValue::Real(v) => v,
                    _ => 0.0,
                };
                if value.is_infinite() {
                    self.add_diag(Diagnostic::error(DiagCode::RealExponentOverflow, token.span()));
                }
                ExprKind::Literal(Lit::Real(value))
            }
            TokenKind::TimeLiteral => {
                let token = self.bump();
                match token.value {
                    TokenValue::Time { value, unit } => ExprKind::Literal(Lit::Time {
                        value: value,
                        unit: unit,
                    }),
                    _ => ExprKind::Literal(Lit::Real(0.0)),
                }
            }
            TokenKind::UnbasedUnsizedLiteral => {
                let token = self.bump();
                match token.value {
                    TokenValue::Bit(bit) => ExprKind::Literal(Lit::UnbasedUnsized(bit)),
                    _ => unreachable!(),
                }
            }
            TokenKind::StringLiteral => {
                let token = self.bump();
                match token.value {
                    TokenValue::Str(s) => ExprKind::Literal(Lit::Str(s)),
                    _ => ExprKind::Literal(Lit::Str(RcStr::new(""))),
                }
            }
            TokenKind::Keyword(Kw::Null) => {
                self.bump();
                ExprKind::Literal(Lit::Null)
            }
            TokenKind::OpenDelim(DelimKind::Paren) => {
                self.bump();
                self.guard()?;
                let inner = self.parse_expression();
                self.unguard();
                let inner = inner?;
                self.expect(TokenKind::CloseDelim(DelimKind::Paren))?;
                ExprKind::Paren(inner)
            }
            TokenKind::OpenDelim(DelimKind::Brace) => self.parse_concatenation()?,
            TokenKind::ApostropheOpenBrace => {
                self.bump();
                let mut exprs = Vec::new();
                if self.kind(0) != TokenKind::CloseDelim(DelimKind::Brace) {
                    loop {
                        exprs.push(self.parse_expression()?);
                        if self.try_eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::CloseDelim(DelimKind::Brace))?;
                ExprKind::AssignmentPattern { exprs: exprs }
            }
            TokenKind::Ident | TokenKind::EscIdent => {
                let first = self.eat_ident("expression")?;
                match self.kind(0) {
                    TokenKind::Namespace => {
                        self.bump();
                        let item = self.eat_ident("name after '::'")?;
                        ExprKind::Name(NameRef::Scoped {
                            scope: first,
                            item: item,
                        })
                    }
                    // `pkg:name` is a common mistake for `pkg::name`.
                    TokenKind::Colon if self.is_colon_name_mistake() => {
                        let sp = self.span();
                        self.add_diag(Diagnostic::error(DiagCode::ColonShouldBeDot, sp));
                        self.bump();
                        let item = self.eat_ident("name after ':'")?;
                        ExprKind::Name(NameRef::Scoped {
                            scope: first,
                            item: item,
                        })
                    }
                    _ => ExprKind::Name(NameRef::Ident(first)),
                }
            }
            TokenKind::SysIdent => {
                let token = self.bump();
                ExprKind::Name(NameRef::System(Spanned::new(
                    token.name().unwrap(),
                    token.span(),
                )))
            }
            TokenKind::Keyword(kw) if is_data_type_start(kw) || kw == Kw::Void => {
                let ty = self.parse_data_type()?;
                ExprKind::DataType(ty)
            }
            _ => {
                let sp = self.span();
                self.add_diag(Diagnostic::error(DiagCode::ExpectedExpression, sp));
                return Err(());
            }
        };
        let span = Span::union(start, self.last_span());
        Ok(Rc::new(Expr {
            kind: kind,
            span: span,
        }))
    }

    fn is_colon_name_mistake(&mut self) -> bool {
        // Heuristic only used in expression position after a name: `a:b`
        // followed by something that cannot continue a ternary.
        self.kind(0) == TokenKind::Colon
            && is_ident_kind(self.kind(1))
            && self.kind(2) == TokenKind::Namespace
    }

    /// Parse `{...}`: either a concatenation or a replication.
    fn parse_concatenation(&mut self) -> ReportedResult<ExprKind> {
        self.bump(); // open brace
        if self.kind(0) == TokenKind::CloseDelim(DelimKind::Brace) {
            // An empty concatenation is not valid; report and continue.
            let sp = self.span();
            self.add_diag(Diagnostic::error(DiagCode::ExpectedExpression, sp));
            self.bump();
            return Err(());
        }
        let first = self.parse_expression()?;
        if self.kind(0) == TokenKind::OpenDelim(DelimKind::Brace) {
            // A replication `{N{x}}`.
            let concat_start = self.span();
            let inner = self.parse_concatenation()?;
            let inner_span = Span::union(concat_start, self.last_span());
            self.expect(TokenKind::CloseDelim(DelimKind::Brace))?;
            return Ok(ExprKind::Replication {
                count: first,
                concat: Rc::new(Expr {
                    kind: inner,
                    span: inner_span,
                }),
            });
        }
        let mut exprs = vec![first];
        while self.try_eat(TokenKind::Comma).is_some() {
            exprs.push(self.parse_expression()?);
        }
        self.expect(TokenKind::CloseDelim(DelimKind::Brace))?;
        Ok(ExprKind::Concat { exprs: exprs })
    }

    /// Assemble a sized vector literal. The optional size has already been
    /// consumed; the next token is the base specifier, and the parser drives
    /// the digit scanning from the raw text of the token that follows it.
    fn parse_vector_literal(&mut self, size: Option<i32>) -> ReportedResult<ExprKind> {
        let base_token = self.bump();
        let (base, signed) = match base_token.value {
            TokenValue::NumBase { base, signed } => (base, signed),
            _ => (LiteralBase::Decimal, false),
        };

        let size = match size {
            Some(s) if s <= 0 => {
                self.add_diag(Diagnostic::error(DiagCode::LiteralSizeIsZero, base_token.span()));
                None
            }
            Some(s) if s as u32 > MAX_BITS => {
                self.add_diag(Diagnostic::error(
                    DiagCode::LiteralSizeTooLarge,
                    base_token.span(),
                ));
                None
            }
            Some(s) => Some(s as u32),
            None => None,
        };

        // The lexer only classifies the tokens holding the digits; their raw
        // text is decoded here. A digit run may span several tokens when it
        // mixes decimal digits with x/z letters, so keep consuming as long
        // as the tokens abut.
        let is_digit_token = |kind: TokenKind| match kind {
            TokenKind::IntegerLiteral
            | TokenKind::RealLiteral
            | TokenKind::TimeLiteral
            | TokenKind::Ident => true,
            _ => false,
        };
        let digits = if is_digit_token(self.kind(0)) {
            let mut text = self.bump().raw.to_string();
            while is_digit_token(self.kind(0)) && self.peek(0).trivia.is_empty() {
                text.push_str(&self.bump().raw);
            }
            RcStr::from(text)
        } else {
            let sp = self.span();
            self.add_diag(Diagnostic::error(DiagCode::ExpectedVectorDigits, sp));
            RcStr::new("0")
        };

        let has_digit = digits
            .chars()
            .any(|c| is_vector_digit(c, base));
        if !has_digit {
            self.add_diag(Diagnostic::error(
                DiagCode::ExpectedVectorDigits,
                base_token.span(),
            ));
        }

        Ok(ExprKind::Literal(Lit::Vector {
            size: size,
            signed: signed,
            base: base,
            digits: digits,
        }))
    }
}

fn is_ident_kind(kind: TokenKind) -> bool {
    match kind {
        TokenKind::Ident | TokenKind::EscIdent => true,
        _ => false,
    }
}

fn is_data_type_start(kw: Kw) -> bool {
    match kw {
        Kw::Bit
        | Kw::Logic
        | Kw::Reg
        | Kw::Byte
        | Kw::Shortint
        | Kw::Int
        | Kw::Longint
        | Kw::Integer
        | Kw::Time
        | Kw::Shortreal
        | Kw::Real
        | Kw::Realtime
        | Kw::String
        | Kw::Chandle
        | Kw::Event
        | Kw::Struct
        | Kw::Union
        | Kw::Enum => true,
        _ => false,
    }
}

fn is_vector_digit(c: char, base: LiteralBase) -> bool {
    match c {
        'x' | 'X' | 'z' | 'Z' | '?' => true,
        '_' => false,
        _ => c.to_digit(16).map(|d| d < base.radix()).unwrap_or(false),
    }
}

/// Map a compound assignment operator to the binary operation it applies.
fn assignment_operand_op(op: Op) -> Option<Op> {
    Some(match op {
        Op::AssignAdd => Op::Add,
        Op::AssignSub => Op::Sub,
        Op::AssignMul => Op::Mul,
        Op::AssignDiv => Op::Div,
        Op::AssignMod => Op::Mod,
        Op::AssignBitAnd => Op::BitAnd,
        Op::AssignBitOr => Op::BitOr,
        Op::AssignBitXor => Op::BitXor,
        Op::AssignLogicShL => Op::LogicShL,
        Op::AssignLogicShR => Op::LogicShR,
        Op::AssignArithShL => Op::ArithShL,
        Op::AssignArithShR => Op::ArithShR,
        _ => return None,
    })
}

/// Binding power of the binary operators, higher binds tighter. Based on
/// IEEE 1800-2017 table 11-2.
fn binary_precedence(op: Op) -> Option<u8> {
    Some(match op {
        Op::LogicImpl | Op::LogicEquiv => 1,
        Op::LogicOr => 2,
        Op::LogicAnd => 3,
        Op::BitOr => 4,
        Op::BitXor | Op::BitXnor | Op::BitNxor => 5,
        Op::BitAnd => 6,
        Op::LogicEq | Op::LogicNeq | Op::CaseEq | Op::CaseNeq | Op::WildcardEq
        | Op::WildcardNeq => 7,
        Op::Lt | Op::Leq | Op::Gt | Op::Geq => 8,
        Op::LogicShL | Op::LogicShR | Op::ArithShL | Op::ArithShR => 9,
        Op::Add | Op::Sub => 10,
        Op::Mul | Op::Div | Op::Mod => 11,
        Op::Pow => 12,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mead_common::errors::Diagnostics;
    use mead_common::source::SourceManager;

    fn parse(text: &str) -> (SourceUnit, Vec<Diagnostic>) {
        let sm = Rc::new(SourceManager::new());
        let source = sm.add_anonymous(text);
        let diagnostics = Rc::new(Diagnostics::new());
        let mut pp = Preprocessor::new(sm, diagnostics.clone(), Default::default());
        pp.push_source(source);
        let mut parser = Parser::new(&mut pp);
        let unit = parser.parse_source_unit();
        (unit, diagnostics.collect())
    }

    fn parse_expr(text: &str) -> (Rc<Expr>, Vec<Diagnostic>) {
        let sm = Rc::new(SourceManager::new());
        let source = sm.add_anonymous(text);
        let diagnostics = Rc::new(Diagnostics::new());
        let mut pp = Preprocessor::new(sm, diagnostics.clone(), Default::default());
        pp.push_source(source);
        let mut parser = Parser::new(&mut pp);
        let expr = parser.parse_expression().expect("expression should parse");
        (expr, diagnostics.collect())
    }

    #[test]
    fn simple_module() {
        let (unit, diags) = parse("module foo; endmodule");
        assert!(diags.is_empty());
        assert_eq!(unit.members.len(), 1);
        match &unit.members[0].kind {
            MemberKind::Module(m) => {
                assert_eq!(m.kind, ModuleKind::Module);
                assert_eq!(&*m.name.value.as_str(), "foo");
                assert!(m.members.is_empty());
            }
            _ => panic!("expected module"),
        }
    }

    #[test]
    fn module_with_params_and_ports() {
        let (unit, diags) = parse(
            "module m #(parameter int N = 4, localparam W = N, X = 8) (input logic [7:0] a, output b); endmodule",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        match &unit.members[0].kind {
            MemberKind::Module(m) => {
                assert_eq!(m.param_ports.len(), 3);
                assert_eq!(m.param_ports[0].keyword, Some(Kw::Parameter));
                assert_eq!(m.param_ports[1].keyword, Some(Kw::Localparam));
                assert_eq!(m.param_ports[2].keyword, None);
                assert_eq!(m.ports.len(), 2);
            }
            _ => panic!("expected module"),
        }
    }

    #[test]
    fn nested_module_and_instantiation() {
        let (unit, diags) = parse(
            "module outer; inner i1(), i2(.a(x), .b()); endmodule\nmodule inner; endmodule",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        match &unit.members[0].kind {
            MemberKind::Module(m) => match &m.members[0].kind {
                MemberKind::Instantiation(inst) => {
                    assert_eq!(&*inst.target.value.as_str(), "inner");
                    assert_eq!(inst.instances.len(), 2);
                    assert_eq!(inst.instances[1].conns.len(), 2);
                }
                _ => panic!("expected instantiation"),
            },
            _ => panic!("expected module"),
        }
    }

    #[test]
    fn data_declarations() {
        let (unit, diags) = parse("int x = 5;\nlogic [7:0] y;\nwire w;\nmytype z;");
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(unit.members.len(), 4);
        match &unit.members[3].kind {
            MemberKind::Data(d) => match &d.ty.kind {
                DataTypeKind::Named { .. } => (),
                k => panic!("expected named type, got {:?}", k),
            },
            _ => panic!("expected data declaration"),
        }
    }

    #[test]
    fn struct_and_enum_types() {
        let (unit, diags) = parse(
            "typedef struct packed { logic [3:0] a; bit b; } mystruct_t;\n\
             typedef enum logic [1:0] { A, B = 2, C } myenum_t;",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(unit.members.len(), 2);
    }

    #[test]
    fn expression_precedence() {
        // a + b * c parses as a + (b * c)
        let (expr, diags) = parse_expr("a + b * c");
        assert!(diags.is_empty());
        match &expr.kind {
            ExprKind::Binary { op: Op::Add, rhs, .. } => match &rhs.kind {
                ExprKind::Binary { op: Op::Mul, .. } => (),
                _ => panic!("expected multiplication on the right"),
            },
            _ => panic!("expected addition at the top"),
        }
    }

    #[test]
    fn power_is_left_associative() {
        let (expr, diags) = parse_expr("a ** b ** c");
        assert!(diags.is_empty());
        match &expr.kind {
            ExprKind::Binary { op: Op::Pow, lhs, .. } => match &lhs.kind {
                ExprKind::Binary { op: Op::Pow, .. } => (),
                _ => panic!("expected nested power on the left"),
            },
            _ => panic!("expected power at the top"),
        }
    }

    #[test]
    fn ternary_and_logical() {
        let (expr, diags) = parse_expr("a && b ? c : d");
        assert!(diags.is_empty());
        match &expr.kind {
            ExprKind::Ternary { cond, .. } => match &cond.kind {
                ExprKind::Binary {
                    op: Op::LogicAnd, ..
                } => (),
                _ => panic!("expected && in the condition"),
            },
            _ => panic!("expected ternary"),
        }
    }

    #[test]
    fn concat_and_replication() {
        let (expr, diags) = parse_expr("{a, b, {4{c}}}");
        assert!(diags.is_empty());
        match &expr.kind {
            ExprKind::Concat { exprs } => {
                assert_eq!(exprs.len(), 3);
                match &exprs[2].kind {
                    ExprKind::Replication { .. } => (),
                    _ => panic!("expected replication as the last element"),
                }
            }
            _ => panic!("expected concatenation"),
        }
    }

    #[test]
    fn selects_and_member_access() {
        let (expr, diags) = parse_expr("foo.bar[3][7:0]");
        assert!(diags.is_empty());
        match &expr.kind {
            ExprKind::RangeSelect { value, kind, .. } => {
                assert_eq!(*kind, RangeSelectKind::Simple);
                match &value.kind {
                    ExprKind::ElementSelect { value, .. } => match &value.kind {
                        ExprKind::MemberAccess { .. } => (),
                        _ => panic!("expected member access"),
                    },
                    _ => panic!("expected element select"),
                }
            }
            _ => panic!("expected range select"),
        }
    }

    #[test]
    fn vector_literals() {
        let (expr, diags) = parse_expr("8'hff");
        assert!(diags.is_empty());
        match &expr.kind {
            ExprKind::Literal(Lit::Vector {
                size: Some(8),
                signed: false,
                base: LiteralBase::Hex,
                digits,
            }) => assert_eq!(&**digits, "ff"),
            k => panic!("expected vector literal, got {:?}", k),
        }

        let (_, diags) = parse_expr("0'd1");
        assert!(diags.iter().any(|d| d.code == DiagCode::LiteralSizeIsZero));

        let (_, diags) = parse_expr("8'h");
        assert!(diags.iter().any(|d| d.code == DiagCode::ExpectedVectorDigits));
    }

    #[test]
    fn call_expression() {
        let (expr, diags) = parse_expr("$clog2(16)");
        assert!(diags.is_empty());
        match &expr.kind {
            ExprKind::Invocation { callee, args } => {
                assert_eq!(args.len(), 1);
                match &callee.kind {
                    ExprKind::Name(NameRef::System(n)) => {
                        assert_eq!(&*n.value.as_str(), "clog2")
                    }
                    _ => panic!("expected system name"),
                }
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn package_and_import() {
        let (unit, diags) = parse("package p; parameter int X = 1; endpackage\nimport p::*;");
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(unit.members.len(), 2);
        match &unit.members[1].kind {
            MemberKind::Import(imp) => assert!(imp.items[0].item.is_none()),
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn subroutine_decl() {
        let (unit, diags) = parse(
            "function int add(int a, int b);\n  return a + b;\nendfunction",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        match &unit.members[0].kind {
            MemberKind::Subroutine(f) => {
                assert!(!f.is_task);
                assert_eq!(f.args.len(), 2);
                assert!(f.return_ty.is_some());
            }
            _ => panic!("expected subroutine"),
        }
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let text = format!("{}x{}", "(".repeat(400), ")".repeat(400));
        let sm = Rc::new(SourceManager::new());
        let source = sm.add_anonymous(&text[..]);
        let diagnostics = Rc::new(Diagnostics::new());
        let mut pp = Preprocessor::new(sm, diagnostics.clone(), Default::default());
        pp.push_source(source);
        let mut parser = Parser::new(&mut pp);
        let _ = parser.parse_expression();
        assert!(!diagnostics.collect().is_empty());
    }
}
