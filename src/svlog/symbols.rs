//! Symbols and scopes.
//!
//! All symbols live in the compilation's arena and refer to each other by
//! plain references that never own anything; the whole graph drops with the
//! arena. Scopes support lazy member insertion: syntax recorded via
//! `add_deferred` is only turned into symbols when the scope is first
//! searched.

use crate::binder::Expression;
use crate::compilation::Compilation;
use crate::ty::Type;
use crate::value::ConstantValue;
use mead_common::errors::{DiagCode, Diagnostic};
use mead_common::name::Name;
use mead_common::source::Location;
use mead_svlog_syntax::ast;
use mead_svlog_syntax::Kw;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A named entity in the compilation's symbol graph.
pub struct Symbol<'gcx> {
    pub name: Name,
    pub loc: Location,
    pub kind: SymbolKind<'gcx>,
    parent: Cell<Option<&'gcx Symbol<'gcx>>>,
    index: Cell<u32>,
}

impl<'gcx> Symbol<'gcx> {
    pub fn new(name: Name, loc: Location, kind: SymbolKind<'gcx>) -> Symbol<'gcx> {
        Symbol {
            name: name,
            loc: loc,
            kind: kind,
            parent: Cell::new(None),
            index: Cell::new(0),
        }
    }

    /// The scope this symbol defines, if it is a scope-like symbol.
    pub fn scope(&self) -> Option<&Scope<'gcx>> {
        match &self.kind {
            SymbolKind::Root(scope)
            | SymbolKind::CompilationUnit(scope)
            | SymbolKind::StructBody(scope)
            | SymbolKind::EnumBody(scope) => Some(scope),
            SymbolKind::Package { scope, .. } => Some(scope),
            SymbolKind::ModuleInstance { body, .. } => Some(body),
            _ => None,
        }
    }

    /// The enclosing scope symbol.
    pub fn parent(&self) -> Option<&'gcx Symbol<'gcx>> {
        self.parent.get()
    }

    /// The position of this symbol within its parent scope, used for
    /// use-before-declaration checks.
    pub fn index(&self) -> u32 {
        self.index.get()
    }

    /// Attach this symbol to an enclosing scope symbol without inserting it
    /// into the scope's member list; used for subroutine formal arguments.
    pub fn link_parent(&self, parent: &'gcx Symbol<'gcx>) {
        self.parent.set(Some(parent));
    }

    /// Override the declaration position, for members that are injected on
    /// behalf of a declaration elsewhere in the scope.
    pub fn set_index(&self, index: u32) {
        self.index.set(index);
    }

    /// Whether this symbol denotes a value with a type.
    pub fn is_value(&self) -> bool {
        match self.kind {
            SymbolKind::Variable(..)
            | SymbolKind::Net { .. }
            | SymbolKind::Parameter(..)
            | SymbolKind::Field(..)
            | SymbolKind::EnumValue(..)
            | SymbolKind::FormalArg(..) => true,
            _ => false,
        }
    }

    /// Whether this symbol denotes a type.
    pub fn is_type(&self) -> bool {
        match self.kind {
            SymbolKind::TypeAlias { .. } => true,
            _ => false,
        }
    }
}

impl<'gcx> std::fmt::Debug for Symbol<'gcx> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Symbol({})", self.name)
    }
}

pub enum SymbolKind<'gcx> {
    /// The root of the symbol graph; owns one compilation unit per added
    /// syntax tree plus the top-level module instances.
    Root(Scope<'gcx>),
    CompilationUnit(Scope<'gcx>),
    Package {
        syntax: Rc<ast::PackageDecl>,
        scope: Scope<'gcx>,
    },
    /// An instantiated module, interface, or program.
    ModuleInstance {
        definition: Rc<Definition>,
        body: Scope<'gcx>,
    },
    /// The body of a struct or union type, holding the fields.
    StructBody(Scope<'gcx>),
    /// The body of an enum type, holding the variants.
    EnumBody(Scope<'gcx>),
    Variable(ValueData<'gcx>),
    Net {
        net_type: Kw,
        data: ValueData<'gcx>,
    },
    Parameter(ParameterData<'gcx>),
    Field(ValueData<'gcx>),
    EnumValue(EnumValueData<'gcx>),
    Subroutine(SubroutineData<'gcx>),
    FormalArg(ValueData<'gcx>),
    TypeAlias {
        syntax: Rc<ast::TypedefDecl>,
        ty: Cell<Option<Type<'gcx>>>,
    },
    ExplicitImport {
        package: Name,
        item: Name,
        /// `None` while unresolved; `Some(None)` after a failed resolution.
        resolved: Cell<Option<Option<&'gcx Symbol<'gcx>>>>,
    },
    WildcardImport {
        package: Name,
    },
}

/// The lazily computed type and initializer of a value symbol.
pub struct ValueData<'gcx> {
    pub ty_syntax: Option<Rc<ast::DataType>>,
    pub dims: Vec<Rc<ast::Dimension>>,
    pub init_syntax: Option<Rc<ast::Expr>>,
    pub ty: Cell<Option<Type<'gcx>>>,
    pub init: Cell<Option<&'gcx Expression<'gcx>>>,
}

impl<'gcx> ValueData<'gcx> {
    pub fn new(
        ty_syntax: Option<Rc<ast::DataType>>,
        dims: Vec<Rc<ast::Dimension>>,
        init_syntax: Option<Rc<ast::Expr>>,
    ) -> ValueData<'gcx> {
        ValueData {
            ty_syntax: ty_syntax,
            dims: dims,
            init_syntax: init_syntax,
            ty: Cell::new(None),
            init: Cell::new(None),
        }
    }
}

pub struct ParameterData<'gcx> {
    pub is_port: bool,
    pub is_local: bool,
    pub ty_syntax: Option<Rc<ast::DataType>>,
    pub init_syntax: Option<Rc<ast::Expr>>,
    pub ty: Cell<Option<Type<'gcx>>>,
    pub value: RefCell<Option<ConstantValue>>,
    pub evaluating: Cell<bool>,
}

pub struct EnumValueData<'gcx> {
    pub init_syntax: Option<Rc<ast::Expr>>,
    /// The position of this variant within the enum.
    pub position: u32,
    pub ty: Cell<Option<Type<'gcx>>>,
    pub value: RefCell<Option<ConstantValue>>,
}

pub struct SubroutineData<'gcx> {
    pub syntax: Rc<ast::SubroutineDecl>,
    pub is_task: bool,
    pub return_ty: Cell<Option<Type<'gcx>>>,
    pub args: RefCell<Vec<&'gcx Symbol<'gcx>>>,
    pub args_built: Cell<bool>,
}

/// A module, interface, or program definition, recorded per (name, scope).
pub struct Definition {
    pub name: Name,
    pub kind: ast::ModuleKind,
    pub loc: Location,
    pub syntax: Rc<ast::ModuleDecl>,
    pub parameters: Vec<ParameterDecl>,
}

/// A parameter declared in a definition's header or immediate body.
pub struct ParameterDecl {
    pub name: Name,
    pub loc: Location,
    pub ty: Rc<ast::DataType>,
    pub init: Option<Rc<ast::Expr>>,
    pub is_local: bool,
    pub is_port: bool,
}

/// A wrapper that hashes and compares a symbol by its address, for use as a
/// table key.
#[derive(Clone, Copy, Debug)]
pub struct SymbolRef<'gcx>(pub &'gcx Symbol<'gcx>);

impl<'gcx> PartialEq for SymbolRef<'gcx> {
    fn eq(&self, other: &SymbolRef<'gcx>) -> bool {
        self.0 as *const Symbol == other.0 as *const Symbol
    }
}

impl<'gcx> Eq for SymbolRef<'gcx> {}

impl<'gcx> Hash for SymbolRef<'gcx> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.0 as *const Symbol as usize).hash(state);
    }
}

/// An ordered list of members plus a name index. Members recorded as
/// deferred syntax are materialized on first search.
pub struct Scope<'gcx> {
    members: RefCell<Vec<&'gcx Symbol<'gcx>>>,
    name_map: RefCell<HashMap<Name, &'gcx Symbol<'gcx>>>,
    deferred: RefCell<Vec<Rc<ast::Member>>>,
    wildcard_imports: RefCell<Vec<&'gcx Symbol<'gcx>>>,
    elaborating: Cell<bool>,
}

impl<'gcx> Scope<'gcx> {
    pub fn new() -> Scope<'gcx> {
        Scope {
            members: RefCell::new(Vec::new()),
            name_map: RefCell::new(HashMap::new()),
            deferred: RefCell::new(Vec::new()),
            wildcard_imports: RefCell::new(Vec::new()),
            elaborating: Cell::new(false),
        }
    }

    /// Insert a member, linking it to the owner symbol of this scope and
    /// diagnosing name collisions.
    pub fn add_member(
        &self,
        cx: &Compilation<'gcx>,
        owner: &'gcx Symbol<'gcx>,
        member: &'gcx Symbol<'gcx>,
    ) {
        debug_assert!(member.parent.get().is_none());
        let mut members = self.members.borrow_mut();
        member.parent.set(Some(owner));
        member.index.set(members.len() as u32);
        members.push(member);

        if let SymbolKind::WildcardImport { .. } = member.kind {
            self.wildcard_imports.borrow_mut().push(member);
            return;
        }

        if member.name.as_str().is_empty() {
            return;
        }
        let mut name_map = self.name_map.borrow_mut();
        if let Some(existing) = name_map.get(&member.name) {
            // Duplicate explicit imports of the same item are allowed.
            let tolerated = match (&existing.kind, &member.kind) {
                (
                    SymbolKind::ExplicitImport { package: p1, item: i1, .. },
                    SymbolKind::ExplicitImport { package: p2, item: i2, .. },
                ) => p1 == p2 && i1 == i2,
                _ => false,
            };
            if !tolerated {
                cx.emit(
                    Diagnostic::error(DiagCode::Redefinition, member.loc)
                        .with_message(format!("redefinition of `{}`", member.name))
                        .add_note_span(
                            DiagCode::NotePreviousDefinition.message(),
                            existing.loc,
                        ),
                );
            }
            return;
        }
        name_map.insert(member.name, member);
    }

    /// Record syntax whose members are only materialized on first lookup.
    pub fn add_deferred(&self, member: Rc<ast::Member>) {
        self.deferred.borrow_mut().push(member);
    }

    /// Materialize any deferred members.
    pub fn ensure_elaborated(&self, cx: &Compilation<'gcx>, owner: &'gcx Symbol<'gcx>) {
        if self.deferred.borrow().is_empty() || self.elaborating.get() {
            return;
        }
        self.elaborating.set(true);
        let deferred = std::mem::replace(&mut *self.deferred.borrow_mut(), Vec::new());
        for member in deferred {
            cx.elaborate_deferred_member(owner, &member);
        }
        self.elaborating.set(false);
    }

    /// Direct member lookup by name.
    pub fn find(
        &self,
        cx: &Compilation<'gcx>,
        owner: &'gcx Symbol<'gcx>,
        name: Name,
    ) -> Option<&'gcx Symbol<'gcx>> {
        self.ensure_elaborated(cx, owner);
        self.name_map.borrow().get(&name).copied()
    }

    /// Lookup without triggering elaboration; used from within the
    /// elaboration process itself.
    pub fn find_immediate(&self, name: Name) -> Option<&'gcx Symbol<'gcx>> {
        self.name_map.borrow().get(&name).copied()
    }

    /// A snapshot of the current member list.
    pub fn members(&self) -> Vec<&'gcx Symbol<'gcx>> {
        self.members.borrow().clone()
    }

    pub fn wildcard_imports(&self) -> Vec<&'gcx Symbol<'gcx>> {
        self.wildcard_imports.borrow().clone()
    }
}

/// A position within a scope that a lookup is performed from. Lookups for
/// variables and types only see symbols declared before this position.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct LookupLocation(pub u32);

impl LookupLocation {
    /// A location after everything in the scope.
    pub fn max() -> LookupLocation {
        LookupLocation(u32::max_value())
    }

    pub fn before(symbol: &Symbol) -> LookupLocation {
        LookupLocation(symbol.index())
    }

    pub fn after(symbol: &Symbol) -> LookupLocation {
        LookupLocation(symbol.index() + 1)
    }
}

/// What kind of symbol a name lookup expects to find.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LookupNameKind {
    Variable,
    Type,
    Callable,
}

impl LookupNameKind {
    /// Callables may be referenced before their declaration.
    pub fn respects_location(self) -> bool {
        match self {
            LookupNameKind::Variable | LookupNameKind::Type => true,
            LookupNameKind::Callable => false,
        }
    }
}
