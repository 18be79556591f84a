//! The SystemVerilog type system.
//!
//! Types are interned by the compilation: every distinct type is allocated
//! exactly once into the arena and referred to by `&TypeKind` thereafter, so
//! pointer equality is definitional for structural type identity (modulo
//! alias names). Struct and enum types are identified by the symbol carrying
//! their members, never by structure.

use crate::symbols::Symbol;
use mead_common::name::Name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;

/// A type, interned within a compilation.
pub type Type<'t> = &'t TypeKind<'t>;

bitflags! {
    /// The three flag bits that classify an integer scalar.
    pub struct IntegralFlags: u8 {
        const SIGNED = 1 << 0;
        const FOUR_STATE = 1 << 1;
        const REG = 1 << 2;
    }
}

/// The predefined multi-bit integer types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PredefInt {
    Byte,
    ShortInt,
    Int,
    LongInt,
    Integer,
    Time,
}

impl PredefInt {
    pub fn width(self) -> u32 {
        match self {
            PredefInt::Byte => 8,
            PredefInt::ShortInt => 16,
            PredefInt::Int => 32,
            PredefInt::LongInt => 64,
            PredefInt::Integer => 32,
            PredefInt::Time => 64,
        }
    }

    pub fn flags(self) -> IntegralFlags {
        match self {
            PredefInt::Byte | PredefInt::ShortInt | PredefInt::Int | PredefInt::LongInt => {
                IntegralFlags::SIGNED
            }
            PredefInt::Integer => IntegralFlags::SIGNED | IntegralFlags::FOUR_STATE,
            PredefInt::Time => IntegralFlags::FOUR_STATE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PredefInt::Byte => "byte",
            PredefInt::ShortInt => "shortint",
            PredefInt::Int => "int",
            PredefInt::LongInt => "longint",
            PredefInt::Integer => "integer",
            PredefInt::Time => "time",
        }
    }
}

/// The floating point types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FloatKind {
    ShortReal,
    Real,
    RealTime,
}

impl FloatKind {
    pub fn width(self) -> u32 {
        match self {
            FloatKind::ShortReal => 32,
            FloatKind::Real | FloatKind::RealTime => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FloatKind::ShortReal => "shortreal",
            FloatKind::Real => "real",
            FloatKind::RealTime => "realtime",
        }
    }
}

/// The `[left:right]` bounds of a packed dimension.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ConstantRange {
    pub left: i32,
    pub right: i32,
}

impl ConstantRange {
    pub fn new(left: i32, right: i32) -> ConstantRange {
        ConstantRange {
            left: left,
            right: right,
        }
    }

    pub fn width(&self) -> u32 {
        (self.left as i64 - self.right as i64).abs() as u32 + 1
    }

    pub fn lower(&self) -> i32 {
        self.left.min(self.right)
    }

    pub fn upper(&self) -> i32 {
        self.left.max(self.right)
    }

    pub fn contains(&self, index: i64) -> bool {
        index >= self.lower() as i64 && index <= self.upper() as i64
    }

    /// Translate a source-level index into a zero-based bit offset.
    pub fn translate_index(&self, index: i64) -> i64 {
        if self.left >= self.right {
            index - self.right as i64
        } else {
            self.right as i64 - index
        }
    }
}

impl fmt::Display for ConstantRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}:{}]", self.left, self.right)
    }
}

/// Type data. Everything the expression binder ever sees is one of these.
#[derive(Debug)]
pub enum TypeKind<'t> {
    /// An error occurred during type computation.
    Error,
    Void,
    Null,
    CHandle,
    String,
    Event,
    /// A single-bit integer type: bit, logic, or reg, possibly signed.
    Scalar(IntegralFlags),
    /// A predefined multi-bit integer type.
    PredefInt(PredefInt),
    /// A floating point type.
    Float(FloatKind),
    /// A packed array of an integral element type over a closed range.
    PackedArray { elem: Type<'t>, range: ConstantRange },
    /// A packed or unpacked struct or union; the symbol's scope carries the
    /// fields. The width and four-state-ness are computed at creation.
    Struct {
        symbol: &'t Symbol<'t>,
        is_union: bool,
        packed: bool,
        width: u32,
        four_state: bool,
    },
    /// An enum over an integral base type; the symbol carries the variants.
    Enum {
        symbol: &'t Symbol<'t>,
        base: Type<'t>,
    },
    /// A named alias wrapping another type.
    Named { name: Name, target: Type<'t> },
}

impl<'t> PartialEq for TypeKind<'t> {
    fn eq(&self, other: &TypeKind<'t>) -> bool {
        use self::TypeKind::*;
        match (self, other) {
            (Error, Error)
            | (Void, Void)
            | (Null, Null)
            | (CHandle, CHandle)
            | (String, String)
            | (Event, Event) => true,
            (Scalar(a), Scalar(b)) => a == b,
            (PredefInt(a), PredefInt(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            // Element and target types are interned before they are wrapped,
            // so address equality is the ground truth here; it also keeps
            // equality consistent with the pointer-based hash.
            (
                PackedArray { elem: ea, range: ra },
                PackedArray { elem: eb, range: rb },
            ) => ra == rb && std::ptr::eq(*ea, *eb),
            (Struct { symbol: a, .. }, Struct { symbol: b, .. }) => std::ptr::eq(*a, *b),
            (Enum { symbol: a, .. }, Enum { symbol: b, .. }) => std::ptr::eq(*a, *b),
            (
                Named { name: na, target: ta },
                Named { name: nb, target: tb },
            ) => na == nb && std::ptr::eq(*ta, *tb),
            _ => false,
        }
    }
}

impl<'t> Eq for TypeKind<'t> {}

impl<'t> Hash for TypeKind<'t> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use self::TypeKind::*;
        mem::discriminant(self).hash(state);
        match self {
            Scalar(f) => f.hash(state),
            PredefInt(p) => p.hash(state),
            Float(f) => f.hash(state),
            PackedArray { elem, range } => {
                (*elem as *const TypeKind as usize).hash(state);
                range.hash(state);
            }
            Struct { symbol, .. } => (*symbol as *const Symbol as usize).hash(state),
            Enum { symbol, .. } => (*symbol as *const Symbol as usize).hash(state),
            Named { name, target } => {
                name.hash(state);
                (*target as *const TypeKind as usize).hash(state);
            }
            _ => (),
        }
    }
}

impl<'t> TypeKind<'t> {
    /// Strip alias names and reveal the underlying type.
    pub fn resolve(&self) -> &Self {
        match self {
            TypeKind::Named { target, .. } => target.resolve(),
            _ => self,
        }
    }

    pub fn is_error(&self) -> bool {
        match self.resolve() {
            TypeKind::Error => true,
            _ => false,
        }
    }

    pub fn is_void(&self) -> bool {
        match self.resolve() {
            TypeKind::Void => true,
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        match self.resolve() {
            TypeKind::Null => true,
            _ => false,
        }
    }

    pub fn is_chandle(&self) -> bool {
        match self.resolve() {
            TypeKind::CHandle => true,
            _ => false,
        }
    }

    pub fn is_string(&self) -> bool {
        match self.resolve() {
            TypeKind::String => true,
            _ => false,
        }
    }

    /// Any integer scalar or packed derivative thereof.
    pub fn is_integral(&self) -> bool {
        match self.resolve() {
            TypeKind::Scalar(..) | TypeKind::PredefInt(..) | TypeKind::PackedArray { .. } => true,
            TypeKind::Enum { .. } => true,
            TypeKind::Struct { packed, .. } => *packed,
            _ => false,
        }
    }

    pub fn is_floating(&self) -> bool {
        match self.resolve() {
            TypeKind::Float(..) => true,
            _ => false,
        }
    }

    /// Integral or floating.
    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_floating()
    }

    /// A single-bit integer scalar, not a one-wide packed array.
    pub fn is_scalar(&self) -> bool {
        match self.resolve() {
            TypeKind::Scalar(..) => true,
            _ => false,
        }
    }

    pub fn is_four_state(&self) -> bool {
        match self.resolve() {
            TypeKind::Scalar(flags) => flags.contains(IntegralFlags::FOUR_STATE),
            TypeKind::PredefInt(p) => p.flags().contains(IntegralFlags::FOUR_STATE),
            TypeKind::PackedArray { elem, .. } => elem.is_four_state(),
            TypeKind::Struct { four_state, .. } => *four_state,
            TypeKind::Enum { base, .. } => base.is_four_state(),
            _ => false,
        }
    }

    pub fn is_signed(&self) -> bool {
        match self.resolve() {
            TypeKind::Scalar(flags) => flags.contains(IntegralFlags::SIGNED),
            TypeKind::PredefInt(p) => p.flags().contains(IntegralFlags::SIGNED),
            TypeKind::PackedArray { elem, .. } => elem.is_signed(),
            TypeKind::Enum { base, .. } => base.is_signed(),
            _ => false,
        }
    }

    /// An unpacked struct or union.
    pub fn is_aggregate(&self) -> bool {
        match self.resolve() {
            TypeKind::Struct { packed, .. } => !*packed,
            _ => false,
        }
    }

    pub fn is_struct_union(&self) -> bool {
        match self.resolve() {
            TypeKind::Struct { .. } => true,
            _ => false,
        }
    }

    /// The bit width of an integral or floating type; zero for the rest.
    pub fn bit_width(&self) -> u32 {
        match self.resolve() {
            TypeKind::Scalar(..) => 1,
            TypeKind::PredefInt(p) => p.width(),
            TypeKind::Float(f) => f.width(),
            TypeKind::PackedArray { elem, range } => elem.bit_width() * range.width(),
            TypeKind::Struct { width, .. } => *width,
            TypeKind::Enum { base, .. } => base.bit_width(),
            _ => 0,
        }
    }

    /// The flag bits of an integral type, for use in operator type rules.
    pub fn integral_flags(&self) -> IntegralFlags {
        match self.resolve() {
            TypeKind::Scalar(flags) => *flags,
            TypeKind::PredefInt(p) => p.flags(),
            TypeKind::PackedArray { elem, .. } => elem.integral_flags(),
            TypeKind::Enum { base, .. } => base.integral_flags(),
            TypeKind::Struct { four_state, .. } => {
                if *four_state {
                    IntegralFlags::FOUR_STATE
                } else {
                    IntegralFlags::empty()
                }
            }
            _ => IntegralFlags::empty(),
        }
    }

    /// The element type of a packed array, if this is one.
    pub fn element_type(&self) -> Option<Type<'t>> {
        match self.resolve() {
            TypeKind::PackedArray { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// The range of a packed array, if this is one.
    pub fn packed_range(&self) -> Option<ConstantRange> {
        match self.resolve() {
            TypeKind::PackedArray { range, .. } => Some(*range),
            _ => None,
        }
    }

    /// The scope symbol of a struct or union.
    pub fn struct_scope(&self) -> Option<&'t Symbol<'t>> {
        match self.resolve() {
            TypeKind::Struct { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    /// Structural identity, including widths and flags.
    pub fn is_matching(&self, other: &TypeKind<'t>) -> bool {
        self.resolve() == other.resolve()
    }

    /// Matching modulo alias names.
    pub fn is_equivalent(&self, other: &TypeKind<'t>) -> bool {
        self.is_matching(other)
    }

    /// Whether a value of type `rhs` can be assigned to this type without an
    /// explicit cast.
    pub fn is_assignment_compatible(&self, rhs: &TypeKind<'t>) -> bool {
        let lt = self.resolve();
        let rt = rhs.resolve();
        if lt.is_error() || rt.is_error() {
            return false;
        }
        if lt.is_numeric() && rt.is_numeric() {
            return true;
        }
        // null is assignable to anything handle-like.
        if rt.is_null() && (lt.is_chandle() || lt.is_string() || lt.is_null()) {
            return true;
        }
        if lt.is_aggregate() && lt.is_equivalent(rt) {
            return true;
        }
        lt == rt
    }

    /// A superset of assignment compatibility: adds the conversions that
    /// require an explicit cast, such as narrowing and int/real mixing.
    pub fn is_cast_compatible(&self, rhs: &TypeKind<'t>) -> bool {
        if self.is_assignment_compatible(rhs) {
            return true;
        }
        let lt = self.resolve();
        let rt = rhs.resolve();
        if lt.is_error() || rt.is_error() {
            return false;
        }
        if lt.is_string() && rt.is_integral() {
            return true;
        }
        if lt.is_integral() && rt.is_string() {
            return true;
        }
        false
    }
}

impl fmt::Display for TypeKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeKind::Error => write!(f, "<error>"),
            TypeKind::Void => write!(f, "void"),
            TypeKind::Null => write!(f, "null"),
            TypeKind::CHandle => write!(f, "chandle"),
            TypeKind::String => write!(f, "string"),
            TypeKind::Event => write!(f, "event"),
            TypeKind::Scalar(flags) => {
                let base = if flags.contains(IntegralFlags::REG) {
                    "reg"
                } else if flags.contains(IntegralFlags::FOUR_STATE) {
                    "logic"
                } else {
                    "bit"
                };
                write!(f, "{}", base)?;
                if flags.contains(IntegralFlags::SIGNED) {
                    write!(f, " signed")?;
                }
                Ok(())
            }
            TypeKind::PredefInt(p) => write!(f, "{}", p.name()),
            TypeKind::Float(k) => write!(f, "{}", k.name()),
            TypeKind::PackedArray { elem, range } => write!(f, "{} {}", elem, range),
            TypeKind::Struct { is_union, .. } => {
                write!(f, "{}", if *is_union { "union" } else { "struct" })
            }
            TypeKind::Enum { .. } => write!(f, "enum"),
            TypeKind::Named { name, .. } => write!(f, "{}", name),
        }
    }
}

/// The `<error>` type.
pub const ERROR_TYPE: TypeKind<'static> = TypeKind::Error;

/// The `void` type.
pub const VOID_TYPE: TypeKind<'static> = TypeKind::Void;

/// The `null` type.
pub const NULL_TYPE: TypeKind<'static> = TypeKind::Null;

/// The `chandle` type.
pub const CHANDLE_TYPE: TypeKind<'static> = TypeKind::CHandle;

/// The `string` type.
pub const STRING_TYPE: TypeKind<'static> = TypeKind::String;

/// The `event` type.
pub const EVENT_TYPE: TypeKind<'static> = TypeKind::Event;

/// The `bit` type.
pub const BIT_TYPE: TypeKind<'static> = TypeKind::Scalar(IntegralFlags::empty());

/// The `logic` type.
pub const LOGIC_TYPE: TypeKind<'static> = TypeKind::Scalar(IntegralFlags::FOUR_STATE);

/// The `reg` type.
pub const REG_TYPE: TypeKind<'static> =
    TypeKind::Scalar(IntegralFlags::from_bits_truncate(0b110));

/// The `bit signed` type.
pub const SIGNED_BIT_TYPE: TypeKind<'static> = TypeKind::Scalar(IntegralFlags::SIGNED);

/// The `logic signed` type.
pub const SIGNED_LOGIC_TYPE: TypeKind<'static> =
    TypeKind::Scalar(IntegralFlags::from_bits_truncate(0b011));

/// The `reg signed` type.
pub const SIGNED_REG_TYPE: TypeKind<'static> =
    TypeKind::Scalar(IntegralFlags::from_bits_truncate(0b111));

pub const BYTE_TYPE: TypeKind<'static> = TypeKind::PredefInt(PredefInt::Byte);
pub const SHORTINT_TYPE: TypeKind<'static> = TypeKind::PredefInt(PredefInt::ShortInt);
pub const INT_TYPE: TypeKind<'static> = TypeKind::PredefInt(PredefInt::Int);
pub const LONGINT_TYPE: TypeKind<'static> = TypeKind::PredefInt(PredefInt::LongInt);
pub const INTEGER_TYPE: TypeKind<'static> = TypeKind::PredefInt(PredefInt::Integer);
pub const TIME_TYPE: TypeKind<'static> = TypeKind::PredefInt(PredefInt::Time);

pub const SHORTREAL_TYPE: TypeKind<'static> = TypeKind::Float(FloatKind::ShortReal);
pub const REAL_TYPE: TypeKind<'static> = TypeKind::Float(FloatKind::Real);
pub const REALTIME_TYPE: TypeKind<'static> = TypeKind::Float(FloatKind::RealTime);

/// Table of the scalar types indexed by their flag bits.
pub fn scalar_type(flags: IntegralFlags) -> Type<'static> {
    let flags = flags & (IntegralFlags::SIGNED | IntegralFlags::FOUR_STATE | IntegralFlags::REG);
    match flags.bits() {
        0b000 => &BIT_TYPE,
        0b001 => &SIGNED_BIT_TYPE,
        0b010 => &LOGIC_TYPE,
        0b011 => &SIGNED_LOGIC_TYPE,
        // A reg is always four-state.
        0b100 | 0b110 => &REG_TYPE,
        0b101 | 0b111 => &SIGNED_REG_TYPE,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        assert!(BIT_TYPE.is_integral());
        assert!(BIT_TYPE.is_scalar());
        assert!(!BIT_TYPE.is_four_state());
        assert!(LOGIC_TYPE.is_four_state());
        assert!(INTEGER_TYPE.is_four_state());
        assert!(INT_TYPE.is_signed());
        assert!(!TIME_TYPE.is_signed());
        assert!(REAL_TYPE.is_numeric());
        assert!(!REAL_TYPE.is_integral());
        assert!(!STRING_TYPE.is_numeric());
    }

    #[test]
    fn widths() {
        assert_eq!(BIT_TYPE.bit_width(), 1);
        assert_eq!(BYTE_TYPE.bit_width(), 8);
        assert_eq!(INT_TYPE.bit_width(), 32);
        assert_eq!(LONGINT_TYPE.bit_width(), 64);
        assert_eq!(REAL_TYPE.bit_width(), 64);
        assert_eq!(SHORTREAL_TYPE.bit_width(), 32);
        let arr = TypeKind::PackedArray {
            elem: &LOGIC_TYPE,
            range: ConstantRange::new(7, 0),
        };
        assert_eq!(arr.bit_width(), 8);
        assert!(arr.is_four_state());
        assert!(!arr.is_scalar());
    }

    #[test]
    fn range_translation() {
        let down = ConstantRange::new(7, 0);
        assert_eq!(down.width(), 8);
        assert_eq!(down.translate_index(0), 0);
        assert_eq!(down.translate_index(7), 7);
        let up = ConstantRange::new(0, 7);
        assert_eq!(up.translate_index(7), 0);
        assert_eq!(up.translate_index(0), 7);
        let offset = ConstantRange::new(11, 4);
        assert_eq!(offset.translate_index(4), 0);
        assert!(offset.contains(11));
        assert!(!offset.contains(3));
    }

    #[test]
    fn aliases_resolve() {
        let alias = TypeKind::Named {
            name: mead_common::get_name_table().intern("word_t"),
            target: &INT_TYPE,
        };
        assert!(alias.is_integral());
        assert_eq!(alias.bit_width(), 32);
        assert!(alias.is_matching(&INT_TYPE));
    }

    #[test]
    fn assignment_compatibility() {
        assert!(INT_TYPE.is_assignment_compatible(&REAL_TYPE));
        assert!(REAL_TYPE.is_assignment_compatible(&BIT_TYPE));
        assert!(CHANDLE_TYPE.is_assignment_compatible(&NULL_TYPE));
        assert!(!STRING_TYPE.is_assignment_compatible(&INT_TYPE));
        assert!(STRING_TYPE.is_cast_compatible(&INT_TYPE));
        assert!(!EVENT_TYPE.is_assignment_compatible(&INT_TYPE));
    }
}
