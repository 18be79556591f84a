//! The central manager for a compilation.
//!
//! A `Compilation` unifies type interning, the scope and definition tables,
//! and deferred diagnostic realization across any number of syntax trees. It
//! borrows its arenas from the caller; everything allocated during semantic
//! analysis has a stable address for the lifetime of those arenas.
//!
//! Control is pull-based: adding a syntax tree only registers definitions and
//! scans for instantiations. The root symbol is finalized when it is first
//! observed, and lazy member slots are only drained when semantic diagnostics
//! are requested.

use crate::binder::{BindContext, BindFlags, Expression};
use crate::builtins::{self, SystemSubroutine};
use crate::eval::EvalContext;
use crate::symbols::*;
use crate::ty::*;
use crate::value::{ConstantValue, IntegerValue, MAX_BITS};
use mead_common::arenas::TypedArena;
use mead_common::errors::{DiagCode, DiagEmitter, Diagnostic, Diagnostics};
use mead_common::name::{get_name_table, Name};
use mead_common::source::{Location, SourceManager, Span, INVALID_LOCATION};
use mead_svlog_syntax::ast;
use mead_svlog_syntax::{Kw, SyntaxTree};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// The arenas that own everything allocated during semantic analysis.
pub struct GlobalArenas<'gcx> {
    pub types: TypedArena<TypeKind<'gcx>>,
    pub symbols: TypedArena<Symbol<'gcx>>,
    pub exprs: TypedArena<Expression<'gcx>>,
}

impl Default for GlobalArenas<'_> {
    fn default() -> Self {
        GlobalArenas {
            types: TypedArena::new(),
            symbols: TypedArena::new(),
            exprs: TypedArena::new(),
        }
    }
}

/// Contract violations raised to the caller rather than reported as
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationError {
    /// `add_syntax_tree` was called after the root had been finalized.
    AlreadyFinalized,
    /// The added tree uses a different source manager than its predecessors.
    MismatchedSourceManager,
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilationError::AlreadyFinalized => {
                write!(f, "the compilation has already been finalized")
            }
            CompilationError::MismatchedSourceManager => write!(
                f,
                "all syntax trees added to a compilation must share one source manager"
            ),
        }
    }
}

impl std::error::Error for CompilationError {}

/// The result of a name lookup.
pub struct LookupResult<'gcx> {
    pub found: Option<&'gcx Symbol<'gcx>>,
    pub system_subroutine: Option<Rc<dyn SystemSubroutine>>,
    pub was_imported: bool,
}

/// The central data structure of the compiler front end.
pub struct Compilation<'gcx> {
    pub arena: &'gcx GlobalArenas<'gcx>,
    sm: RefCell<Option<Rc<SourceManager>>>,
    diagnostics: Diagnostics,

    interned_types: RefCell<HashSet<Type<'gcx>>>,
    vector_types: RefCell<HashMap<u64, Type<'gcx>>>,

    definitions: RefCell<HashMap<(Name, SymbolRef<'gcx>), Rc<Definition>>>,
    packages: RefCell<HashMap<Name, &'gcx Symbol<'gcx>>>,
    subroutines: RefCell<HashMap<Name, Rc<dyn SystemSubroutine>>>,

    trees: RefCell<Vec<Rc<SyntaxTree>>>,
    root: Cell<Option<&'gcx Symbol<'gcx>>>,
    compilation_units: RefCell<Vec<&'gcx Symbol<'gcx>>>,
    instantiated_names: RefCell<HashSet<Name>>,
    top_instances: RefCell<Vec<&'gcx Symbol<'gcx>>>,
    finalized: Cell<bool>,
    forced_diagnostics: Cell<bool>,
    instantiation_depth: Cell<u32>,
}

impl<'gcx> Compilation<'gcx> {
    pub fn new(arena: &'gcx GlobalArenas<'gcx>) -> Compilation<'gcx> {
        let cx = Compilation {
            arena: arena,
            sm: RefCell::new(None),
            diagnostics: Diagnostics::new(),
            interned_types: RefCell::new(HashSet::new()),
            vector_types: RefCell::new(HashMap::new()),
            definitions: RefCell::new(HashMap::new()),
            packages: RefCell::new(HashMap::new()),
            subroutines: RefCell::new(HashMap::new()),
            trees: RefCell::new(Vec::new()),
            root: Cell::new(None),
            compilation_units: RefCell::new(Vec::new()),
            instantiated_names: RefCell::new(HashSet::new()),
            top_instances: RefCell::new(Vec::new()),
            finalized: Cell::new(false),
            forced_diagnostics: Cell::new(false),
            instantiation_depth: Cell::new(0),
        };
        for subroutine in builtins::all() {
            cx.add_system_subroutine(subroutine);
        }
        cx
    }

    fn root_symbol(&self) -> &'gcx Symbol<'gcx> {
        if let Some(root) = self.root.get() {
            return root;
        }
        let root = self.alloc_symbol(Symbol::new(
            get_name_table().intern("$root"),
            INVALID_LOCATION,
            SymbolKind::Root(Scope::new()),
        ));
        self.root.set(Some(root));
        root
    }

    pub fn alloc_symbol(&self, symbol: Symbol<'gcx>) -> &'gcx Symbol<'gcx> {
        self.arena.symbols.alloc(symbol)
    }

    pub fn alloc_expr(&self, expr: Expression<'gcx>) -> &'gcx Expression<'gcx> {
        self.arena.exprs.alloc(expr)
    }

    pub fn source_manager(&self) -> Option<Rc<SourceManager>> {
        self.sm.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Type interning
    // ------------------------------------------------------------------

    /// Intern a type, returning a pointer that is stable and unique for the
    /// lifetime of the compilation.
    pub fn intern_type(&self, ty: TypeKind<'gcx>) -> Type<'gcx> {
        if let Some(&x) = self.interned_types.borrow().get(&ty) {
            return x;
        }
        let ty = self.arena.types.alloc(ty);
        self.interned_types.borrow_mut().insert(ty);
        ty
    }

    pub fn error_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::Error)
    }

    pub fn bit_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::Scalar(IntegralFlags::empty()))
    }

    pub fn logic_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::Scalar(IntegralFlags::FOUR_STATE))
    }

    pub fn int_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::PredefInt(PredefInt::Int))
    }

    pub fn real_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::Float(FloatKind::Real))
    }

    pub fn shortreal_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::Float(FloatKind::ShortReal))
    }

    pub fn void_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::Void)
    }

    pub fn null_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::Null)
    }

    pub fn string_type(&self) -> Type<'gcx> {
        self.intern_type(TypeKind::String)
    }

    /// The scalar type for a set of flag bits. A reg is always four-state.
    pub fn scalar_type(&self, flags: IntegralFlags) -> Type<'gcx> {
        let mut flags =
            flags & (IntegralFlags::SIGNED | IntegralFlags::FOUR_STATE | IntegralFlags::REG);
        if flags.contains(IntegralFlags::REG) {
            flags |= IntegralFlags::FOUR_STATE;
        }
        self.intern_type(TypeKind::Scalar(flags))
    }

    /// The packed array type `scalar [width-1:0]`, cached by width and
    /// flags.
    pub fn get_type(&self, width: u32, flags: IntegralFlags) -> Type<'gcx> {
        if width == 0 || width > MAX_BITS {
            return self.error_type();
        }
        let key = width as u64 | (flags.bits() as u64) << 32;
        if let Some(&ty) = self.vector_types.borrow().get(&key) {
            return ty;
        }
        let ty = self.intern_type(TypeKind::PackedArray {
            elem: self.scalar_type(flags),
            range: ConstantRange::new(width as i32 - 1, 0),
        });
        self.vector_types.borrow_mut().insert(key, ty);
        ty
    }

    /// A packed array of an arbitrary element type over a range.
    pub fn get_packed_array(&self, elem: Type<'gcx>, range: ConstantRange) -> Type<'gcx> {
        self.intern_type(TypeKind::PackedArray {
            elem: elem,
            range: range,
        })
    }

    // ------------------------------------------------------------------
    // Operator type rules
    // ------------------------------------------------------------------

    /// The result type of an arithmetic binary operator: real if either
    /// operand is real, otherwise integral with the maximum width and the
    /// merged flags of the operands.
    pub fn binary_operator_type(
        &self,
        lt: Type<'gcx>,
        rt: Type<'gcx>,
        force_four_state: bool,
    ) -> Type<'gcx> {
        if !lt.is_numeric() || !rt.is_numeric() {
            return self.error_type();
        }

        let result;
        if lt.is_floating() || rt.is_floating() {
            if (lt.is_floating() && lt.bit_width() == 64)
                || (rt.is_floating() && rt.bit_width() == 64)
            {
                result = self.real_type();
            } else {
                result = self.shortreal_type();
            }
        } else {
            let width = lt.bit_width().max(rt.bit_width());
            let lf = lt.integral_flags();
            let rf = rt.integral_flags();

            let mut flags = IntegralFlags::empty();
            if lf.contains(IntegralFlags::SIGNED) && rf.contains(IntegralFlags::SIGNED) {
                flags |= IntegralFlags::SIGNED;
            }
            if force_four_state
                || lf.contains(IntegralFlags::FOUR_STATE)
                || rf.contains(IntegralFlags::FOUR_STATE)
            {
                flags |= IntegralFlags::FOUR_STATE;
            }
            if lf.contains(IntegralFlags::REG) && rf.contains(IntegralFlags::REG) {
                flags |= IntegralFlags::REG;
            }

            // A one-bit result stays scalar if either operand was a plain
            // scalar rather than a one-wide packed array.
            if width == 1 && (lt.is_scalar() || rt.is_scalar()) {
                result = self.scalar_type(flags);
            } else {
                result = self.get_type(width, flags);
            }
        }

        // Attempt to preserve any type aliases passed in when selecting the
        // result.
        if lt.is_matching(result) {
            return lt;
        }
        if rt.is_matching(result) {
            return rt;
        }
        result
    }

    /// The same shape with the four-state bit forced on; reals pass through.
    pub fn force_four_state(&self, ty: Type<'gcx>) -> Type<'gcx> {
        if ty.is_floating() || ty.is_four_state() {
            return ty;
        }
        self.binary_operator_type(ty, ty, true)
    }

    /// `logic` if either operand is four-state, else `bit`.
    pub fn single_bit_type(&self, lt: Type<'gcx>, rt: Type<'gcx>) -> Type<'gcx> {
        if lt.is_four_state() || rt.is_four_state() {
            self.logic_type()
        } else {
            self.bit_type()
        }
    }

    // ------------------------------------------------------------------
    // Types from syntax
    // ------------------------------------------------------------------

    /// Build the type described by a data type syntax node, evaluating any
    /// packed dimensions as constants in the given scope. Never fails;
    /// invalid input maps to the error type.
    pub fn get_type_from_syntax(
        &self,
        syntax: &ast::DataType,
        scope: &'gcx Symbol<'gcx>,
        location: LookupLocation,
    ) -> Type<'gcx> {
        match &syntax.kind {
            ast::DataTypeKind::Implicit { signing, dims } => {
                let mut flags = IntegralFlags::FOUR_STATE;
                if signing == &Some(Kw::Signed) {
                    flags |= IntegralFlags::SIGNED;
                }
                self.build_packed(self.scalar_type(flags), dims, scope, location)
            }
            ast::DataTypeKind::IntVec { kw, signing, dims } => {
                let mut flags = match kw {
                    Kw::Bit => IntegralFlags::empty(),
                    Kw::Logic => IntegralFlags::FOUR_STATE,
                    Kw::Reg => IntegralFlags::FOUR_STATE | IntegralFlags::REG,
                    _ => unreachable!("parser only produces integer vector keywords"),
                };
                match signing {
                    Some(Kw::Signed) => flags |= IntegralFlags::SIGNED,
                    _ => (),
                }
                self.build_packed(self.scalar_type(flags), dims, scope, location)
            }
            ast::DataTypeKind::IntAtom { kw, signing } => {
                let predef = match kw {
                    Kw::Byte => PredefInt::Byte,
                    Kw::Shortint => PredefInt::ShortInt,
                    Kw::Int => PredefInt::Int,
                    Kw::Longint => PredefInt::LongInt,
                    Kw::Integer => PredefInt::Integer,
                    Kw::Time => PredefInt::Time,
                    _ => unreachable!("parser only produces integer atom keywords"),
                };
                match signing {
                    None => self.intern_type(TypeKind::PredefInt(predef)),
                    Some(kw) => {
                        // An explicit signing that overrides the default
                        // produces an equivalent vector type.
                        let mut flags = predef.flags();
                        if *kw == Kw::Signed {
                            flags |= IntegralFlags::SIGNED;
                        } else {
                            flags &= !IntegralFlags::SIGNED;
                        }
                        if flags == predef.flags() {
                            self.intern_type(TypeKind::PredefInt(predef))
                        } else {
                            self.get_type(predef.width(), flags)
                        }
                    }
                }
            }
            ast::DataTypeKind::Real { kw } => self.intern_type(TypeKind::Float(match kw {
                Kw::Shortreal => FloatKind::ShortReal,
                Kw::Realtime => FloatKind::RealTime,
                _ => FloatKind::Real,
            })),
            ast::DataTypeKind::String => self.intern_type(TypeKind::String),
            ast::DataTypeKind::Chandle => self.intern_type(TypeKind::CHandle),
            ast::DataTypeKind::Event => self.intern_type(TypeKind::Event),
            ast::DataTypeKind::Void => self.intern_type(TypeKind::Void),
            ast::DataTypeKind::StructUnion {
                is_union,
                packed,
                signing: _,
                members,
                dims,
            } => {
                let body = self.alloc_symbol(Symbol::new(
                    get_name_table().intern(""),
                    syntax.span.begin(),
                    SymbolKind::StructBody(Scope::new()),
                ));
                let body_scope = body.scope().unwrap();

                let mut width = 0u32;
                let mut four_state = false;
                for member in members {
                    let field_ty = self.get_type_from_syntax(&member.ty, scope, location);
                    for decl in &member.declarators {
                        let data = ValueData::new(
                            Some(member.ty.clone()),
                            decl.dims.clone(),
                            decl.init.clone(),
                        );
                        data.ty.set(Some(field_ty));
                        let field = self.alloc_symbol(Symbol::new(
                            decl.name.value,
                            decl.name.span.begin(),
                            SymbolKind::Field(data),
                        ));
                        body_scope.add_member(self, body, field);

                        let w = field_ty.bit_width();
                        if *is_union {
                            width = width.max(w);
                        } else {
                            width = width.saturating_add(w);
                        }
                        four_state |= field_ty.is_four_state();
                    }
                }

                let ty = self.intern_type(TypeKind::Struct {
                    symbol: body,
                    is_union: *is_union,
                    packed: *packed,
                    width: width,
                    four_state: four_state,
                });
                self.build_packed(ty, dims, scope, location)
            }
            ast::DataTypeKind::Enum {
                base,
                variants,
                dims,
            } => {
                let base_ty = match base {
                    Some(base) => self.get_type_from_syntax(base, scope, location),
                    None => self.int_type(),
                };
                if !base_ty.is_integral() {
                    return self.error_type();
                }
                let body = self.alloc_symbol(Symbol::new(
                    get_name_table().intern(""),
                    syntax.span.begin(),
                    SymbolKind::EnumBody(Scope::new()),
                ));
                let body_scope = body.scope().unwrap();
                let mut created = Vec::new();
                for (i, variant) in variants.iter().enumerate() {
                    let value = self.alloc_symbol(Symbol::new(
                        variant.name.value,
                        variant.name.span.begin(),
                        SymbolKind::EnumValue(EnumValueData {
                            init_syntax: variant.init.clone(),
                            position: i as u32,
                            ty: Cell::new(None),
                            value: RefCell::new(None),
                        }),
                    ));
                    body_scope.add_member(self, body, value);
                    created.push(value);
                    // Enum variants are also visible in the enclosing scope.
                    if let Some(outer) = scope.scope() {
                        let alias = self.alloc_symbol(Symbol::new(
                            variant.name.value,
                            variant.name.span.begin(),
                            SymbolKind::EnumValue(EnumValueData {
                                init_syntax: variant.init.clone(),
                                position: i as u32,
                                ty: Cell::new(None),
                                value: RefCell::new(None),
                            }),
                        ));
                        outer.add_member(self, scope, alias);
                        // The variant counts as declared where the enum is.
                        alias.set_index(location.0.min(u32::max_value() - 1));
                        created.push(alias);
                    }
                }
                let ty = self.intern_type(TypeKind::Enum {
                    symbol: body,
                    base: base_ty,
                });
                // Fix up the variant types now that the enum type exists.
                for member in created {
                    if let SymbolKind::EnumValue(data) = &member.kind {
                        data.ty.set(Some(ty));
                    }
                }
                self.build_packed(ty, dims, scope, location)
            }
            ast::DataTypeKind::Named { name, dims } => {
                let result = self.lookup_name(
                    scope,
                    name,
                    location,
                    LookupNameKind::Type,
                    BindFlags::empty(),
                );
                let target = match result.found {
                    Some(symbol) => match &symbol.kind {
                        SymbolKind::TypeAlias { .. } => self.alias_target(symbol),
                        _ => {
                            self.emit(
                                Diagnostic::error(DiagCode::UndeclaredIdentifier, name.span())
                                    .with_message(format!("`{}` is not a type", symbol.name)),
                            );
                            self.error_type()
                        }
                    },
                    None => self.error_type(),
                };
                if target.is_error() {
                    return self.error_type();
                }
                let name_tag = match name {
                    ast::NameRef::Ident(n) | ast::NameRef::System(n) => n.value,
                    ast::NameRef::Scoped { item, .. } => item.value,
                };
                let alias = self.intern_type(TypeKind::Named {
                    name: name_tag,
                    target: target,
                });
                self.build_packed(alias, dims, scope, location)
            }
        }
    }

    /// Wrap an element type into packed array layers, outermost dimension
    /// first.
    fn build_packed(
        &self,
        elem: Type<'gcx>,
        dims: &[Rc<ast::Dimension>],
        scope: &'gcx Symbol<'gcx>,
        location: LookupLocation,
    ) -> Type<'gcx> {
        let mut ty = elem;
        for dim in dims.iter().rev() {
            let range = match self.eval_dimension(dim, scope, location) {
                Some(range) => range,
                None => return self.error_type(),
            };
            let width = (range.width() as u64) * (ty.bit_width() as u64);
            if width > MAX_BITS as u64 {
                self.emit(
                    Diagnostic::error(DiagCode::ValueExceedsMaxBitWidth, dim.span)
                        .with_message(format!("type width exceeds the maximum of {} bits", MAX_BITS)),
                );
                return self.error_type();
            }
            ty = self.get_packed_array(ty, range);
        }
        ty
    }

    /// Evaluate the bounds of a dimension as constant integers.
    fn eval_dimension(
        &self,
        dim: &ast::Dimension,
        scope: &'gcx Symbol<'gcx>,
        location: LookupLocation,
    ) -> Option<ConstantRange> {
        let ctx = BindContext {
            scope: scope,
            lookup_location: location,
            lookup_kind: LookupNameKind::Variable,
            flags: BindFlags::CONSTANT,
        };
        match &dim.kind {
            ast::DimKind::Range(left, right) => {
                let left = self.eval_constant_i32(left, &ctx)?;
                let right = self.eval_constant_i32(right, &ctx)?;
                Some(ConstantRange::new(left, right))
            }
            ast::DimKind::Size(size) => {
                let size = self.eval_constant_i32(size, &ctx)?;
                if size <= 0 {
                    self.emit(Diagnostic::error(DiagCode::ValueMustBePositive, dim.span));
                    return None;
                }
                Some(ConstantRange::new(size - 1, 0))
            }
            ast::DimKind::Unsized => {
                self.emit(Diagnostic::error(DiagCode::ExpectedExpression, dim.span));
                None
            }
        }
    }

    /// Bind and evaluate an expression, returning its value as an i32 with
    /// unknown bits rejected.
    pub fn eval_constant_i32(&self, expr: &ast::Expr, ctx: &BindContext<'gcx>) -> Option<i32> {
        let bound = self.bind_expression(expr, ctx);
        if bound.ty.is_error() {
            return None;
        }
        let mut eval = EvalContext::new();
        let value = bound.eval(self, &mut eval);
        let value = match value.integer() {
            Some(v) => v,
            None => {
                self.emit(Diagnostic::error(DiagCode::ExpressionNotConstant, expr.span));
                return None;
            }
        };
        if !self.check_no_unknowns(value, expr.span) {
            return None;
        }
        value.as_i64().and_then(|v| {
            if v < i32::min_value() as i64 || v > i32::max_value() as i64 {
                self.emit(Diagnostic::error(DiagCode::ValueExceedsMaxBitWidth, expr.span));
                None
            } else {
                Some(v as i32)
            }
        })
    }

    // ------------------------------------------------------------------
    // Syntax trees and definitions
    // ------------------------------------------------------------------

    /// Add a parsed syntax tree to the compilation. Creates a compilation
    /// unit symbol, registers definitions, and scans for instantiations.
    pub fn add_syntax_tree(&self, tree: Rc<SyntaxTree>) -> Result<(), CompilationError> {
        if self.finalized.get() {
            return Err(CompilationError::AlreadyFinalized);
        }
        {
            let mut sm = self.sm.borrow_mut();
            match &*sm {
                None => *sm = Some(tree.source_manager().clone()),
                Some(existing) => {
                    if !Rc::ptr_eq(existing, tree.source_manager()) {
                        return Err(CompilationError::MismatchedSourceManager);
                    }
                }
            }
        }

        let root = self.root_symbol();
        let unit = self.alloc_symbol(Symbol::new(
            get_name_table().intern(""),
            tree.root().span.begin(),
            SymbolKind::CompilationUnit(Scope::new()),
        ));

        let mut instances = HashSet::new();
        for member in &tree.root().members {
            self.add_member_to_scope(unit, member);
            if let ast::MemberKind::Module(decl) = &member.kind {
                let mut scope_stack = Vec::new();
                find_instantiations(decl, &mut scope_stack, &mut instances);
            }
        }
        self.instantiated_names.borrow_mut().extend(instances);

        root.scope().unwrap().add_member(self, root, unit);
        self.compilation_units.borrow_mut().push(unit);
        self.trees.borrow_mut().push(tree);
        self.forced_diagnostics.set(false);
        Ok(())
    }

    pub fn syntax_trees(&self) -> Vec<Rc<SyntaxTree>> {
        self.trees.borrow().clone()
    }

    /// Populate a scope with the symbols for one syntax member.
    pub fn add_member_to_scope(&self, owner: &'gcx Symbol<'gcx>, member: &Rc<ast::Member>) {
        let scope = owner
            .scope()
            .expect("members can only be added to scope symbols");
        match &member.kind {
            ast::MemberKind::Module(decl) => {
                self.add_definition(decl.clone(), owner);
            }
            ast::MemberKind::Package(decl) => {
                let package = self.alloc_symbol(Symbol::new(
                    decl.name.value,
                    decl.name.span.begin(),
                    SymbolKind::Package {
                        syntax: decl.clone(),
                        scope: Scope::new(),
                    },
                ));
                for member in &decl.members {
                    self.add_member_to_scope(package, member);
                }
                self.add_package(package);
            }
            ast::MemberKind::Import(decl) => {
                for item in &decl.items {
                    let symbol = match &item.item {
                        None => self.alloc_symbol(Symbol::new(
                            get_name_table().intern(""),
                            item.span.begin(),
                            SymbolKind::WildcardImport {
                                package: item.package.value,
                            },
                        )),
                        Some(name) => self.alloc_symbol(Symbol::new(
                            name.value,
                            name.span.begin(),
                            SymbolKind::ExplicitImport {
                                package: item.package.value,
                                item: name.value,
                                resolved: Cell::new(None),
                            },
                        )),
                    };
                    scope.add_member(self, owner, symbol);
                }
            }
            ast::MemberKind::Param(decl) => {
                let is_local = decl.keyword == Some(Kw::Localparam);
                for declarator in &decl.declarators {
                    if declarator.init.is_none() {
                        self.emit(Diagnostic::error(
                            DiagCode::BodyParamNoInitializer,
                            declarator.name.span,
                        ));
                    }
                    let symbol = self.alloc_symbol(Symbol::new(
                        declarator.name.value,
                        declarator.name.span.begin(),
                        SymbolKind::Parameter(ParameterData {
                            is_port: false,
                            is_local: is_local,
                            ty_syntax: Some(decl.ty.clone()),
                            init_syntax: declarator.init.clone(),
                            ty: Cell::new(None),
                            value: RefCell::new(None),
                            evaluating: Cell::new(false),
                        }),
                    ));
                    scope.add_member(self, owner, symbol);
                }
            }
            ast::MemberKind::Data(decl) => {
                for declarator in &decl.declarators {
                    let symbol = self.alloc_symbol(Symbol::new(
                        declarator.name.value,
                        declarator.name.span.begin(),
                        SymbolKind::Variable(ValueData::new(
                            Some(decl.ty.clone()),
                            declarator.dims.clone(),
                            declarator.init.clone(),
                        )),
                    ));
                    scope.add_member(self, owner, symbol);
                }
                // Enum variants leak into the surrounding scope, so the
                // type must be realized before the first lookup in here.
                if type_introduces_members(&decl.ty) {
                    scope.add_deferred(member.clone());
                }
            }
            ast::MemberKind::Net(decl) => {
                for declarator in &decl.declarators {
                    let symbol = self.alloc_symbol(Symbol::new(
                        declarator.name.value,
                        declarator.name.span.begin(),
                        SymbolKind::Net {
                            net_type: decl.net_type,
                            data: ValueData::new(
                                Some(decl.ty.clone()),
                                declarator.dims.clone(),
                                declarator.init.clone(),
                            ),
                        },
                    ));
                    scope.add_member(self, owner, symbol);
                }
            }
            ast::MemberKind::Typedef(decl) => {
                let symbol = self.alloc_symbol(Symbol::new(
                    decl.name.value,
                    decl.name.span.begin(),
                    SymbolKind::TypeAlias {
                        syntax: Rc::new(ast::TypedefDecl {
                            ty: decl.ty.clone(),
                            name: decl.name,
                            dims: decl.dims.clone(),
                        }),
                        ty: Cell::new(None),
                    },
                ));
                scope.add_member(self, owner, symbol);
                if type_introduces_members(&decl.ty) {
                    scope.add_deferred(member.clone());
                }
            }
            ast::MemberKind::Subroutine(decl) => {
                let symbol = self.alloc_symbol(Symbol::new(
                    decl.name.value,
                    decl.name.span.begin(),
                    SymbolKind::Subroutine(SubroutineData {
                        syntax: decl.clone(),
                        is_task: decl.is_task,
                        return_ty: Cell::new(None),
                        args: RefCell::new(Vec::new()),
                        args_built: Cell::new(false),
                    }),
                ));
                scope.add_member(self, owner, symbol);
            }
            ast::MemberKind::Instantiation(_)
            | ast::MemberKind::ContAssign(_)
            | ast::MemberKind::ProceduralBlock(_) => {
                scope.add_deferred(member.clone());
            }
            ast::MemberKind::GenerateRegion(members) => {
                for member in members {
                    self.add_member_to_scope(owner, member);
                }
            }
            ast::MemberKind::Empty => (),
        }
    }

    /// Materialize a deferred member: instantiations become instance
    /// symbols, and assignments are bound so their diagnostics surface.
    pub fn elaborate_deferred_member(&self, owner: &'gcx Symbol<'gcx>, member: &Rc<ast::Member>) {
        match &member.kind {
            ast::MemberKind::Instantiation(inst) => {
                let definition = self.get_definition(inst.target.value, owner);
                let definition = match definition {
                    Some(definition) => definition,
                    None => {
                        self.emit(
                            Diagnostic::error(DiagCode::UndeclaredIdentifier, inst.target.span)
                                .with_message(format!(
                                    "unknown module `{}`",
                                    inst.target.value
                                )),
                        );
                        return;
                    }
                };
                for instance in &inst.instances {
                    let symbol = self.instantiate(
                        definition.clone(),
                        instance.name.value,
                        instance.name.span.begin(),
                    );
                    owner.scope().unwrap().add_member(self, owner, symbol);
                }
            }
            ast::MemberKind::ContAssign(assign) => {
                let ctx = BindContext {
                    scope: owner,
                    lookup_location: LookupLocation::max(),
                    lookup_kind: LookupNameKind::Variable,
                    flags: BindFlags::empty(),
                };
                for expr in &assign.assignments {
                    let _ = self.bind_expression(expr, &ctx);
                }
            }
            ast::MemberKind::ProceduralBlock(block) => {
                let ctx = BindContext {
                    scope: owner,
                    lookup_location: LookupLocation::max(),
                    lookup_kind: LookupNameKind::Variable,
                    flags: BindFlags::PROCEDURAL_ASSIGNMENT,
                };
                for stmt in &block.stmts {
                    let _ = self.bind_expression(stmt, &ctx);
                }
            }
            // Declarations deferred only to realize the members their type
            // introduces, e.g. enum variants.
            ast::MemberKind::Typedef(decl) => {
                if let Some(symbol) = owner.scope().unwrap().find_immediate(decl.name.value) {
                    self.alias_target(symbol);
                }
            }
            ast::MemberKind::Data(decl) => {
                for declarator in &decl.declarators {
                    let scope = owner.scope().unwrap();
                    if let Some(symbol) = scope.find_immediate(declarator.name.value) {
                        self.value_type(symbol);
                    }
                }
            }
            _ => unreachable!("unexpected deferred member kind"),
        }
    }

    /// Create an instance of a definition, populating its body scope.
    pub fn instantiate(
        &self,
        definition: Rc<Definition>,
        name: Name,
        loc: Location,
    ) -> &'gcx Symbol<'gcx> {
        debug!("instantiating {} as {}", definition.name, name);
        let symbol = self.alloc_symbol(Symbol::new(
            name,
            loc,
            SymbolKind::ModuleInstance {
                definition: definition.clone(),
                body: Scope::new(),
            },
        ));

        // Guard against unbounded recursive instantiation.
        let depth = self.instantiation_depth.get();
        if depth > 64 {
            self.emit(
                Diagnostic::error(DiagCode::MaxInstanceDepthExceeded, loc)
                    .with_message(format!("instantiation of `{}` is too deeply nested", definition.name)),
            );
            return symbol;
        }
        self.instantiation_depth.set(depth + 1);
        let scope = symbol.scope().unwrap();

        // Parameters from the header and immediate body carry the
        // inheritance-resolved local/port flags.
        for param in &definition.parameters {
            let param_symbol = self.alloc_symbol(Symbol::new(
                param.name,
                param.loc,
                SymbolKind::Parameter(ParameterData {
                    is_port: param.is_port,
                    is_local: param.is_local,
                    ty_syntax: Some(param.ty.clone()),
                    init_syntax: param.init.clone(),
                    ty: Cell::new(None),
                    value: RefCell::new(None),
                    evaluating: Cell::new(false),
                }),
            ));
            scope.add_member(self, symbol, param_symbol);
        }

        // ANSI ports appear as variables in the body.
        for port in &definition.syntax.ports {
            let port_symbol = self.alloc_symbol(Symbol::new(
                port.name.value,
                port.name.span.begin(),
                SymbolKind::Variable(ValueData::new(port.ty.clone(), port.dims.clone(), None)),
            ));
            scope.add_member(self, symbol, port_symbol);
        }

        for member in &definition.syntax.members {
            // Body parameters were already covered above.
            if let ast::MemberKind::Param(_) = member.kind {
                continue;
            }
            self.add_member_to_scope(symbol, member);
        }
        self.instantiation_depth.set(depth);
        symbol
    }

    /// Record a module/interface/program definition, keyed by name and the
    /// scope containing it. Definitions in a compilation unit are keyed to
    /// the root so that cross-unit lookup works.
    pub fn add_definition(&self, syntax: Rc<ast::ModuleDecl>, scope: &'gcx Symbol<'gcx>) {
        let mut parameters = Vec::new();
        let has_port_params = !syntax.param_ports.is_empty();

        // It's legal to leave off the keyword in a parameter port list; the
        // keyword of the preceding declaration is inherited.
        let mut last_local = false;
        for decl in &syntax.param_ports {
            if let Some(kw) = decl.keyword {
                last_local = kw == Kw::Localparam;
            }
            self.collect_param_decls(decl, true, last_local, &mut parameters);
        }

        // Parameters in the immediate body of the definition may be
        // overridable at instantiation time unless a port list exists.
        for member in &syntax.members {
            if let ast::MemberKind::Param(decl) = &member.kind {
                let is_local = has_port_params || decl.keyword == Some(Kw::Localparam);
                self.collect_param_decls(decl, false, is_local, &mut parameters);
            }
        }

        let definition = Rc::new(Definition {
            name: syntax.name.value,
            kind: syntax.kind,
            loc: syntax.name.span.begin(),
            syntax: syntax,
            parameters: parameters,
        });

        let key_scope = match scope.kind {
            SymbolKind::CompilationUnit(..) => self.root_symbol(),
            _ => scope,
        };
        self.definitions
            .borrow_mut()
            .insert((definition.name, SymbolRef(key_scope)), definition);
    }

    fn collect_param_decls(
        &self,
        syntax: &Rc<ast::ParamDecl>,
        is_port: bool,
        is_local: bool,
        parameters: &mut Vec<ParameterDecl>,
    ) {
        for decl in &syntax.declarators {
            if decl.init.is_none() {
                if !is_port {
                    self.emit(Diagnostic::error(
                        DiagCode::BodyParamNoInitializer,
                        decl.name.span,
                    ));
                } else if is_local {
                    self.emit(Diagnostic::error(
                        DiagCode::LocalParamNoInitializer,
                        decl.name.span,
                    ));
                }
            }
            parameters.push(ParameterDecl {
                name: decl.name.value,
                loc: decl.name.span.begin(),
                ty: syntax.ty.clone(),
                init: decl.init.clone(),
                is_local: is_local,
                is_port: is_port,
            });
        }
    }

    /// Find a definition visible from a scope, searching the scope chain
    /// upward to the root.
    pub fn get_definition(
        &self,
        name: Name,
        scope: &'gcx Symbol<'gcx>,
    ) -> Option<Rc<Definition>> {
        let definitions = self.definitions.borrow();
        let mut search = scope;
        loop {
            if let Some(def) = definitions.get(&(name, SymbolRef(search))) {
                return Some(def.clone());
            }
            match search.kind {
                SymbolKind::Root(..) => return None,
                _ => match search.parent() {
                    Some(parent) => search = parent,
                    None => {
                        search = self.root_symbol();
                        if let Some(def) = definitions.get(&(name, SymbolRef(search))) {
                            return Some(def.clone());
                        }
                        return None;
                    }
                },
            }
        }
    }

    // ------------------------------------------------------------------
    // Root finalization
    // ------------------------------------------------------------------

    /// Finalize and return the root symbol. The first call instantiates
    /// every module definition that was never referenced as an
    /// instantiation; afterwards the structure is frozen.
    pub fn get_root(&self) -> &'gcx Symbol<'gcx> {
        let root = self.root_symbol();
        if !self.finalized.get() {
            self.finalized.set(true);
            let mut definitions: Vec<Rc<Definition>> = self
                .definitions
                .borrow()
                .values()
                .cloned()
                .collect();
            // Sort for deterministic ordering; the map iteration order is
            // not stable across runs.
            definitions.sort_by_key(|d| d.name.as_str());

            let instantiated = self.instantiated_names.borrow();
            let mut top = Vec::new();
            for definition in definitions {
                if definition.kind != ast::ModuleKind::Module {
                    continue;
                }
                if instantiated.contains(&definition.name) {
                    continue;
                }
                let name = definition.name;
                let loc = definition.loc;
                let instance = self.instantiate(definition, name, loc);
                root.scope().unwrap().add_member(self, root, instance);
                top.push(instance);
            }
            top.sort_by_key(|i| i.name.as_str());
            *self.top_instances.borrow_mut() = top;
            debug!(
                "finalized root with {} top-level instances",
                self.top_instances.borrow().len()
            );
        }
        root
    }

    /// The top-level instances attached to the root, in name order.
    pub fn top_instances(&self) -> Vec<&'gcx Symbol<'gcx>> {
        self.top_instances.borrow().clone()
    }

    pub fn compilation_units(&self) -> Vec<&'gcx Symbol<'gcx>> {
        self.compilation_units.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Packages and system subroutines
    // ------------------------------------------------------------------

    pub fn add_package(&self, package: &'gcx Symbol<'gcx>) {
        self.packages.borrow_mut().insert(package.name, package);
    }

    pub fn get_package(&self, name: Name) -> Option<&'gcx Symbol<'gcx>> {
        self.packages.borrow().get(&name).copied()
    }

    pub fn add_system_subroutine(&self, subroutine: Rc<dyn SystemSubroutine>) {
        self.subroutines
            .borrow_mut()
            .insert(get_name_table().intern(subroutine.name()), subroutine);
    }

    pub fn get_system_subroutine(&self, name: Name) -> Option<Rc<dyn SystemSubroutine>> {
        self.subroutines.borrow().get(&name).cloned()
    }

    // ------------------------------------------------------------------
    // Name lookup
    // ------------------------------------------------------------------

    /// Look up a name from a scope, honoring the lookup location and
    /// wildcard imports, and walking the scope chain upward.
    pub fn lookup_name(
        &self,
        scope: &'gcx Symbol<'gcx>,
        name: &ast::NameRef,
        location: LookupLocation,
        kind: LookupNameKind,
        _flags: BindFlags,
    ) -> LookupResult<'gcx> {
        let mut result = LookupResult {
            found: None,
            system_subroutine: None,
            was_imported: false,
        };
        match name {
            ast::NameRef::System(n) => {
                result.system_subroutine = self.get_system_subroutine(n.value);
                if result.system_subroutine.is_none() {
                    self.emit(
                        Diagnostic::error(DiagCode::UndeclaredIdentifier, n.span)
                            .with_message(format!("unknown system name `${}`", n.value)),
                    );
                }
                result
            }
            ast::NameRef::Scoped { scope: pkg, item } => {
                match self.get_package(pkg.value) {
                    Some(package) => {
                        let found =
                            package
                                .scope()
                                .unwrap()
                                .find(self, package, item.value);
                        match found {
                            Some(symbol) => result.found = Some(self.unwrap_import(symbol)),
                            None => self.emit(
                                Diagnostic::error(DiagCode::UndeclaredIdentifier, item.span)
                                    .with_message(format!(
                                        "no member `{}` in package `{}`",
                                        item.value, pkg.value
                                    )),
                            ),
                        }
                    }
                    None => {
                        self.emit(Diagnostic::error(DiagCode::ExpectedClassScope, pkg.span));
                    }
                }
                result
            }
            ast::NameRef::Ident(n) => {
                self.lookup_unqualified(scope, n.value, n.span, location, kind, &mut result);
                result
            }
        }
    }

    fn lookup_unqualified(
        &self,
        scope: &'gcx Symbol<'gcx>,
        name: Name,
        span: Span,
        location: LookupLocation,
        kind: LookupNameKind,
        result: &mut LookupResult<'gcx>,
    ) {
        let mut current = scope;
        let mut first = true;
        loop {
            if let Some(scope_data) = current.scope() {
                if let Some(symbol) = scope_data.find(self, current, name) {
                    // The lookup location only constrains the scope the
                    // lookup starts in.
                    let visible = !first
                        || !kind.respects_location()
                        || LookupLocation::before(symbol) < location;
                    if visible {
                        result.found = Some(self.unwrap_import(symbol));
                        return;
                    }
                }
                // Wildcard imports come next.
                for import in scope_data.wildcard_imports() {
                    if let SymbolKind::WildcardImport { package } = import.kind {
                        if let Some(pkg) = self.get_package(package) {
                            if let Some(symbol) = pkg.scope().unwrap().find(self, pkg, name) {
                                result.found = Some(self.unwrap_import(symbol));
                                result.was_imported = true;
                                return;
                            }
                        }
                    }
                }
            }
            match current.parent() {
                Some(parent) => {
                    current = parent;
                    first = false;
                }
                None => break,
            }
        }

        // Nothing found; try to give a more helpful error when the symbol
        // exists but is declared after the lookup location.
        let late = scope
            .scope()
            .and_then(|s| s.find(self, scope, name))
            .filter(|s| match kind {
                LookupNameKind::Variable => s.is_value(),
                LookupNameKind::Type => s.is_type(),
                LookupNameKind::Callable => false,
            });
        match late {
            Some(symbol) => self.emit(
                Diagnostic::error(DiagCode::UsedBeforeDeclared, span)
                    .with_message(format!("`{}` is used before its declaration", name))
                    .add_note_span(DiagCode::NoteDeclarationHere.message(), symbol.loc),
            ),
            None => self.emit(
                Diagnostic::error(DiagCode::UndeclaredIdentifier, span)
                    .with_message(format!("use of undeclared identifier `{}`", name)),
            ),
        }
    }

    /// Resolve explicit import symbols to the imported symbol.
    fn unwrap_import(&self, symbol: &'gcx Symbol<'gcx>) -> &'gcx Symbol<'gcx> {
        if let SymbolKind::ExplicitImport {
            package,
            item,
            resolved,
        } = &symbol.kind
        {
            if let Some(cached) = resolved.get() {
                return cached.unwrap_or(symbol);
            }
            let target = self
                .get_package(*package)
                .and_then(|pkg| pkg.scope().unwrap().find(self, pkg, *item));
            if target.is_none() {
                self.emit(
                    Diagnostic::error(DiagCode::UndeclaredIdentifier, symbol.loc)
                        .with_message(format!(
                            "no member `{}` in package `{}`",
                            item, package
                        )),
                );
            }
            resolved.set(Some(target));
            return target.unwrap_or(symbol);
        }
        symbol
    }

    // ------------------------------------------------------------------
    // Lazy symbol realization
    // ------------------------------------------------------------------

    /// The type of a value symbol, computed on first demand.
    pub fn value_type(&self, symbol: &'gcx Symbol<'gcx>) -> Type<'gcx> {
        let data = match &symbol.kind {
            SymbolKind::Variable(data)
            | SymbolKind::Net { data, .. }
            | SymbolKind::Field(data)
            | SymbolKind::FormalArg(data) => data,
            SymbolKind::Parameter(..) => return self.parameter_type(symbol),
            SymbolKind::EnumValue(data) => {
                return data.ty.get().unwrap_or_else(|| self.error_type());
            }
            _ => return self.error_type(),
        };
        if let Some(ty) = data.ty.get() {
            return ty;
        }
        let scope = symbol.parent().unwrap_or_else(|| self.root_symbol());
        let ty = match &data.ty_syntax {
            Some(syntax) => {
                self.get_type_from_syntax(syntax, scope, LookupLocation::before(symbol))
            }
            None => self.logic_type(),
        };
        data.ty.set(Some(ty));
        ty
    }

    /// The initializer expression of a value symbol, bound against its type.
    pub fn value_initializer(&self, symbol: &'gcx Symbol<'gcx>) -> Option<&'gcx Expression<'gcx>> {
        let data = match &symbol.kind {
            SymbolKind::Variable(data)
            | SymbolKind::Net { data, .. }
            | SymbolKind::Field(data)
            | SymbolKind::FormalArg(data) => data,
            _ => return None,
        };
        if let Some(expr) = data.init.get() {
            return Some(expr);
        }
        let init_syntax = data.init_syntax.as_ref()?;
        let ty = self.value_type(symbol);
        let scope = symbol.parent().unwrap_or_else(|| self.root_symbol());
        let ctx = BindContext {
            scope: scope,
            lookup_location: LookupLocation::before(symbol),
            lookup_kind: LookupNameKind::Variable,
            flags: BindFlags::empty(),
        };
        let expr = self.bind_assignment(ty, init_syntax, symbol.loc, &ctx);
        data.init.set(Some(expr));
        Some(expr)
    }

    /// The type of a parameter. Implicitly typed parameters take the type of
    /// their initializer.
    pub fn parameter_type(&self, symbol: &'gcx Symbol<'gcx>) -> Type<'gcx> {
        let data = match &symbol.kind {
            SymbolKind::Parameter(data) => data,
            _ => return self.error_type(),
        };
        if let Some(ty) = data.ty.get() {
            return ty;
        }
        let scope = symbol.parent().unwrap_or_else(|| self.root_symbol());
        let implicit = match &data.ty_syntax {
            None => true,
            Some(syntax) => match &syntax.kind {
                ast::DataTypeKind::Implicit { signing, dims } => {
                    signing.is_none() && dims.is_empty()
                }
                _ => false,
            },
        };
        let ty = if implicit {
            match &data.init_syntax {
                Some(init) => {
                    let ctx = BindContext {
                        scope: scope,
                        lookup_location: LookupLocation::before(symbol),
                        lookup_kind: LookupNameKind::Variable,
                        flags: BindFlags::CONSTANT,
                    };
                    let bound = self.bind_expression(init, &ctx);
                    bound.ty
                }
                None => self.error_type(),
            }
        } else {
            self.get_type_from_syntax(
                data.ty_syntax.as_ref().unwrap(),
                scope,
                LookupLocation::before(symbol),
            )
        };
        data.ty.set(Some(ty));
        ty
    }

    /// The constant value of a parameter, computed on first demand.
    pub fn parameter_value(&self, symbol: &'gcx Symbol<'gcx>) -> ConstantValue {
        let data = match &symbol.kind {
            SymbolKind::Parameter(data) => data,
            _ => return ConstantValue::Undefined,
        };
        if let Some(value) = &*data.value.borrow() {
            return value.clone();
        }
        if data.evaluating.get() {
            // A parameter that depends on itself has no value.
            return ConstantValue::Undefined;
        }
        data.evaluating.set(true);

        let value = match &data.init_syntax {
            Some(init) => {
                let ty = self.parameter_type(symbol);
                let scope = symbol.parent().unwrap_or_else(|| self.root_symbol());
                let ctx = BindContext {
                    scope: scope,
                    lookup_location: LookupLocation::before(symbol),
                    lookup_kind: LookupNameKind::Variable,
                    flags: BindFlags::CONSTANT,
                };
                let bound = self.bind_assignment(ty, init, symbol.loc, &ctx);
                let mut eval = EvalContext::new();
                bound.eval(self, &mut eval)
            }
            None => ConstantValue::Undefined,
        };

        data.evaluating.set(false);
        *data.value.borrow_mut() = Some(value.clone());
        value
    }

    /// The constant value of an enum variant: its initializer if present,
    /// else one more than its predecessor.
    pub fn enum_value(&self, symbol: &'gcx Symbol<'gcx>) -> ConstantValue {
        let data = match &symbol.kind {
            SymbolKind::EnumValue(data) => data,
            _ => return ConstantValue::Undefined,
        };
        if let Some(value) = &*data.value.borrow() {
            return value.clone();
        }
        let ty = data.ty.get().unwrap_or_else(|| self.error_type());
        let base_width = ty.bit_width().max(1);

        let value = match &data.init_syntax {
            Some(init) => {
                let scope = symbol.parent().unwrap_or_else(|| self.root_symbol());
                let ctx = BindContext {
                    scope: scope,
                    lookup_location: LookupLocation::max(),
                    lookup_kind: LookupNameKind::Variable,
                    flags: BindFlags::CONSTANT,
                };
                let bound = self.bind_expression(init, &ctx);
                let mut eval = EvalContext::new();
                bound.eval(self, &mut eval)
            }
            None => {
                // Auto-increment from the previous variant.
                let mut base = None;
                if data.position > 0 {
                    if let Some(parent) = symbol.parent() {
                        if let Some(scope) = parent.scope() {
                            let members = scope.members();
                            let prev = members
                                .iter()
                                .find(|m| match &m.kind {
                                    SymbolKind::EnumValue(d) => {
                                        d.position + 1 == data.position
                                            && d.ty.get().map(|t| std::ptr::eq(t, ty))
                                                == Some(true)
                                    }
                                    _ => false,
                                })
                                .copied();
                            if let Some(prev) = prev {
                                if let ConstantValue::Int(v) = self.enum_value(prev) {
                                    base = v.as_i64();
                                }
                            }
                        }
                    }
                }
                let next = base.map(|b| b + 1).unwrap_or(data.position as i64);
                ConstantValue::Int(IntegerValue::from_i64(base_width, ty.is_signed(), next))
            }
        };
        *data.value.borrow_mut() = Some(value.clone());
        value
    }

    /// The resolved target type of a typedef.
    pub fn alias_target(&self, symbol: &'gcx Symbol<'gcx>) -> Type<'gcx> {
        let (syntax, cache) = match &symbol.kind {
            SymbolKind::TypeAlias { syntax, ty } => (syntax, ty),
            _ => return self.error_type(),
        };
        if let Some(ty) = cache.get() {
            return ty;
        }
        // Break cycles through the alias by seeding the cache.
        cache.set(Some(self.error_type()));
        let scope = symbol.parent().unwrap_or_else(|| self.root_symbol());
        let ty =
            self.get_type_from_syntax(&syntax.ty, scope, LookupLocation::before(symbol));
        cache.set(Some(ty));
        ty
    }

    /// The return type of a subroutine.
    pub fn subroutine_return_type(&self, symbol: &'gcx Symbol<'gcx>) -> Type<'gcx> {
        let data = match &symbol.kind {
            SymbolKind::Subroutine(data) => data,
            _ => return self.error_type(),
        };
        if let Some(ty) = data.return_ty.get() {
            return ty;
        }
        let scope = symbol.parent().unwrap_or_else(|| self.root_symbol());
        let ty = if data.is_task {
            self.void_type()
        } else {
            match &data.syntax.return_ty {
                Some(syntax) => {
                    self.get_type_from_syntax(syntax, scope, LookupLocation::before(symbol))
                }
                None => self.logic_type(),
            }
        };
        data.return_ty.set(Some(ty));
        ty
    }

    /// The ordered formal arguments of a subroutine.
    pub fn subroutine_args(&self, symbol: &'gcx Symbol<'gcx>) -> Vec<&'gcx Symbol<'gcx>> {
        let data = match &symbol.kind {
            SymbolKind::Subroutine(data) => data,
            _ => return Vec::new(),
        };
        if !data.args_built.get() {
            data.args_built.set(true);
            let mut args = Vec::new();
            for arg in &data.syntax.args {
                let arg_symbol = self.alloc_symbol(Symbol::new(
                    arg.name.value,
                    arg.name.span.begin(),
                    SymbolKind::FormalArg(ValueData::new(
                        Some(arg.ty.clone()),
                        Vec::new(),
                        arg.default.clone(),
                    )),
                ));
                if let Some(parent) = symbol.parent() {
                    arg_symbol.link_parent(parent);
                }
                args.push(arg_symbol);
            }
            *data.args.borrow_mut() = args;
        }
        data.args.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn emit(&self, diag: Diagnostic) {
        self.diagnostics.add(diag);
    }

    /// The lexer, preprocessor, and parser diagnostics of every added tree.
    pub fn get_parse_diagnostics(&self) -> Vec<Diagnostic> {
        let mut results = Vec::new();
        for tree in self.trees.borrow().iter() {
            results.extend(tree.diagnostics());
        }
        if self.sm.borrow().is_some() {
            results.sort_by_key(|d| (d.span.source, d.span.begin));
        }
        results
    }

    /// Force every lazily evaluated member and collect the resulting
    /// diagnostics.
    pub fn get_semantic_diagnostics(&self) -> Vec<Diagnostic> {
        if !self.forced_diagnostics.get() {
            self.forced_diagnostics.set(true);
            let root = self.get_root();
            self.force_symbol(root);
        }
        let mut results = self.diagnostics.collect();
        if self.sm.borrow().is_some() {
            results.sort_by_key(|d| (d.span.source, d.span.begin));
        }
        results
    }

    pub fn get_all_diagnostics(&self) -> Vec<Diagnostic> {
        let mut results = self.get_parse_diagnostics();
        results.extend(self.get_semantic_diagnostics());
        if self.sm.borrow().is_some() {
            results.sort_by_key(|d| (d.span.source, d.span.begin));
        }
        results
    }

    /// Touch every lazy slot reachable from a symbol.
    fn force_symbol(&self, symbol: &'gcx Symbol<'gcx>) {
        match &symbol.kind {
            SymbolKind::Variable(..) | SymbolKind::Net { .. } | SymbolKind::Field(..) => {
                self.value_type(symbol);
                self.value_initializer(symbol);
            }
            SymbolKind::FormalArg(..) => {
                self.value_type(symbol);
            }
            SymbolKind::Parameter(..) => {
                self.parameter_value(symbol);
            }
            SymbolKind::EnumValue(..) => {
                self.enum_value(symbol);
            }
            SymbolKind::TypeAlias { .. } => {
                self.alias_target(symbol);
            }
            SymbolKind::ExplicitImport { .. } => {
                self.unwrap_import(symbol);
            }
            SymbolKind::Subroutine(..) => {
                self.subroutine_return_type(symbol);
                for arg in self.subroutine_args(symbol) {
                    self.force_symbol(arg);
                }
            }
            _ => (),
        }
        if let Some(scope) = symbol.scope() {
            scope.ensure_elaborated(self, symbol);
            for member in scope.members() {
                self.force_symbol(member);
            }
        }
    }

    // ------------------------------------------------------------------
    // Constant validity helpers
    // ------------------------------------------------------------------

    pub fn check_no_unknowns(&self, value: &IntegerValue, span: Span) -> bool {
        if value.has_unknown() {
            self.emit(Diagnostic::error(DiagCode::ValueMustNotBeUnknown, span));
            false
        } else {
            true
        }
    }

    pub fn check_positive(&self, value: &IntegerValue, span: Span) -> bool {
        if value.is_negative() {
            self.emit(Diagnostic::error(DiagCode::ValueMustBePositive, span));
            false
        } else {
            true
        }
    }

    pub fn check_valid_bit_width(&self, value: &IntegerValue, span: Span) -> Option<u32> {
        let width = value.as_u32().filter(|&w| w <= MAX_BITS);
        if width.is_none() {
            self.emit(
                Diagnostic::error(DiagCode::ValueExceedsMaxBitWidth, span)
                    .with_message(format!("value exceeds maximum bit width of {}", MAX_BITS)),
            );
        }
        width
    }
}

impl DiagEmitter for Compilation<'_> {
    fn emit(&self, diag: Diagnostic) {
        Compilation::emit(self, diag)
    }
}

/// Check whether a data type declaration introduces members into the
/// surrounding scope when it is realized.
fn type_introduces_members(ty: &ast::DataType) -> bool {
    match &ty.kind {
        ast::DataTypeKind::Enum { .. } => true,
        _ => false,
    }
}

/// Scan a module declaration for the names it instantiates, ignoring names
/// shadowed by nested module declarations.
fn find_instantiations(
    module: &ast::ModuleDecl,
    scope_stack: &mut Vec<HashSet<Name>>,
    found: &mut HashSet<Name>,
) {
    // Collect nested definitions that shadow global names.
    let mut local_defs = HashSet::new();
    for member in &module.members {
        if let ast::MemberKind::Module(decl) = &member.kind {
            local_defs.insert(decl.name.value);
        }
    }
    let pushed = !local_defs.is_empty();
    if pushed {
        scope_stack.push(local_defs);
    }

    for member in &module.members {
        find_instantiations_in_member(member, scope_stack, found);
    }

    if pushed {
        scope_stack.pop();
    }
}

fn find_instantiations_in_member(
    member: &ast::Member,
    scope_stack: &mut Vec<HashSet<Name>>,
    found: &mut HashSet<Name>,
) {
    match &member.kind {
        ast::MemberKind::Instantiation(inst) => {
            let name = inst.target.value;
            if !scope_stack.iter().any(|set| set.contains(&name)) {
                found.insert(name);
            }
        }
        ast::MemberKind::Module(decl) => find_instantiations(decl, scope_stack, found),
        ast::MemberKind::GenerateRegion(members) => {
            for member in members {
                find_instantiations_in_member(member, scope_stack, found);
            }
        }
        _ => (),
    }
}
