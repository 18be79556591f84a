//! Representation of constant values and their operations.
//!
//! Integer constants are arbitrary-width four-state numbers: a two-state
//! value plus two bit planes marking which bits are special (x or z) and
//! which of those are x. Arithmetic on values with any special bits yields an
//! all-x result of the appropriate width; bitwise operations work per bit.

use bit_vec::BitVec;
use mead_common::name::RcStr;
use num::bigint::BigInt;
use num::traits::{Signed, ToPrimitive, Zero};
use std::fmt;

/// The maximum bit width of any integral value.
pub const MAX_BITS: u32 = (1 << 24) - 1;

/// A constant value as produced by the evaluator.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    /// Evaluation failed; no value is available.
    Undefined,
    Int(IntegerValue),
    Real(f64),
    Str(RcStr),
    Null,
}

impl ConstantValue {
    pub fn integer(&self) -> Option<&IntegerValue> {
        match self {
            ConstantValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        match self {
            ConstantValue::Undefined => true,
            _ => false,
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            ConstantValue::Int(v) => !v.is_zero() && !v.has_unknown(),
            ConstantValue::Real(v) => *v != 0.0,
            ConstantValue::Str(s) => !s.is_empty(),
            _ => false,
        }
    }

    /// Convert to a real number where possible.
    pub fn to_real(&self) -> Option<f64> {
        match self {
            ConstantValue::Real(v) => Some(*v),
            ConstantValue::Int(v) => v.signed_value().to_f64(),
            _ => None,
        }
    }
}

/// An arbitrary-width four-state integer, carrying its width, signedness,
/// and per-bit unknown/high-impedance flags.
#[derive(Clone, Debug)]
pub struct IntegerValue {
    width: u32,
    signed: bool,
    /// The two-state value, stored as a non-negative number modulo 2^width.
    /// Special bits are zero here.
    value: BigInt,
    /// Bits that are x or z.
    special: BitVec,
    /// Of the special bits, those that are x rather than z.
    x_bits: BitVec,
}

impl IntegerValue {
    /// Create a value from a big integer, truncating or wrapping it into the
    /// given width.
    pub fn new(width: u32, signed: bool, value: BigInt) -> IntegerValue {
        let masked = mask_to_width(value, width);
        IntegerValue {
            width: width,
            signed: signed,
            value: masked,
            special: BitVec::from_elem(width as usize, false),
            x_bits: BitVec::from_elem(width as usize, false),
        }
    }

    pub fn from_u64(width: u32, signed: bool, value: u64) -> IntegerValue {
        IntegerValue::new(width, signed, BigInt::from(value))
    }

    pub fn from_i64(width: u32, signed: bool, value: i64) -> IntegerValue {
        IntegerValue::new(width, signed, BigInt::from(value))
    }

    /// Create a value with explicit special bit planes.
    pub fn with_special(
        width: u32,
        signed: bool,
        value: BigInt,
        mut special: BitVec,
        mut x_bits: BitVec,
    ) -> IntegerValue {
        special.truncate(width as usize);
        x_bits.truncate(width as usize);
        grow_to(&mut special, width);
        grow_to(&mut x_bits, width);
        let mut value = mask_to_width(value, width);
        // Special bit positions hold zero in the two-state plane.
        for i in 0..width as usize {
            if special.get(i).unwrap_or(false) && bit_of(&value, i) {
                value -= BigInt::from(1) << i;
            }
        }
        IntegerValue {
            width: width,
            signed: signed,
            value: value,
            special: special,
            x_bits: x_bits,
        }
    }

    /// An all-x value of the given width.
    pub fn all_x(width: u32, signed: bool) -> IntegerValue {
        IntegerValue {
            width: width,
            signed: signed,
            value: BigInt::zero(),
            special: BitVec::from_elem(width as usize, true),
            x_bits: BitVec::from_elem(width as usize, true),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Check whether any bit is x or z.
    pub fn has_unknown(&self) -> bool {
        self.special.iter().any(|b| b)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero() && !self.has_unknown()
    }

    pub fn is_negative(&self) -> bool {
        self.signed && self.msb()
    }

    fn msb(&self) -> bool {
        self.width > 0 && bit_of(&self.value, self.width as usize - 1)
    }

    /// The value interpreted according to the signedness, as a big integer.
    pub fn signed_value(&self) -> BigInt {
        if self.signed && self.msb() {
            self.value.clone() - (BigInt::from(1) << self.width as usize)
        } else {
            self.value.clone()
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        if self.has_unknown() {
            return None;
        }
        self.signed_value().to_i64()
    }

    pub fn as_u32(&self) -> Option<u32> {
        if self.has_unknown() {
            return None;
        }
        self.signed_value().to_u32()
    }

    /// The state of a single bit.
    pub fn bit(&self, index: usize) -> LogicBit {
        if index >= self.width as usize {
            return LogicBit::Zero;
        }
        if self.special.get(index).unwrap_or(false) {
            if self.x_bits.get(index).unwrap_or(false) {
                LogicBit::X
            } else {
                LogicBit::Z
            }
        } else if bit_of(&self.value, index) {
            LogicBit::One
        } else {
            LogicBit::Zero
        }
    }

    /// Resize to a new width. Widening sign-extends when the value is signed
    /// (x-extends when the sign bit is unknown); narrowing truncates.
    pub fn resize(&self, width: u32, signed: bool) -> IntegerValue {
        if width == self.width {
            let mut v = self.clone();
            v.signed = signed;
            return v;
        }
        if width < self.width {
            let mut special = self.special.clone();
            let mut x_bits = self.x_bits.clone();
            special.truncate(width as usize);
            x_bits.truncate(width as usize);
            return IntegerValue {
                width: width,
                signed: signed,
                value: mask_to_width(self.value.clone(), width),
                special: special,
                x_bits: x_bits,
            };
        }
        // Widening; determine the extension bit.
        let ext = if self.signed {
            self.bit(self.width as usize - 1)
        } else {
            LogicBit::Zero
        };
        let ext = match ext {
            LogicBit::X | LogicBit::Z => LogicBit::X,
            other => other,
        };
        let mut value = self.value.clone();
        let mut special = self.special.clone();
        let mut x_bits = self.x_bits.clone();
        grow_to(&mut special, width);
        grow_to(&mut x_bits, width);
        for i in self.width as usize..width as usize {
            match ext {
                LogicBit::One => value += BigInt::from(1) << i,
                LogicBit::X => {
                    special.set(i, true);
                    x_bits.set(i, true);
                }
                _ => (),
            }
        }
        IntegerValue {
            width: width,
            signed: signed,
            value: value,
            special: special,
            x_bits: x_bits,
        }
    }

    // --------------------------------------------------------------
    // Arithmetic; any unknown operand bit makes the result all-x.
    // --------------------------------------------------------------

    fn arith(
        &self,
        other: &IntegerValue,
        width: u32,
        signed: bool,
        f: impl FnOnce(BigInt, BigInt) -> Option<BigInt>,
    ) -> IntegerValue {
        if self.has_unknown() || other.has_unknown() {
            return IntegerValue::all_x(width, signed);
        }
        match f(self.signed_value(), other.signed_value()) {
            Some(v) => IntegerValue::new(width, signed, v),
            None => IntegerValue::all_x(width, signed),
        }
    }

    pub fn add(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.arith(other, width, signed, |a, b| Some(a + b))
    }

    pub fn sub(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.arith(other, width, signed, |a, b| Some(a - b))
    }

    pub fn mul(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.arith(other, width, signed, |a, b| Some(a * b))
    }

    pub fn div(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.arith(other, width, signed, |a, b| {
            if b.is_zero() {
                None
            } else {
                Some(a / b)
            }
        })
    }

    pub fn rem(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.arith(other, width, signed, |a, b| {
            if b.is_zero() {
                None
            } else {
                Some(a % b)
            }
        })
    }

    pub fn pow(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.arith(other, width, signed, |a, b| {
            if b.is_negative() {
                // Negative exponents follow the table in IEEE 1800 11.4.3.
                let minus_one = BigInt::from(-1);
                if a == BigInt::from(1) {
                    Some(BigInt::from(1))
                } else if a == minus_one {
                    Some(if (b.clone() % BigInt::from(2)).is_zero() {
                        BigInt::from(1)
                    } else {
                        minus_one
                    })
                } else if a.is_zero() {
                    None
                } else {
                    Some(BigInt::zero())
                }
            } else {
                let exp = b.to_u32()?;
                Some(num::pow::pow(a, exp as usize))
            }
        })
    }

    pub fn negate(&self, width: u32, signed: bool) -> IntegerValue {
        if self.has_unknown() {
            return IntegerValue::all_x(width, signed);
        }
        IntegerValue::new(width, signed, -self.signed_value())
    }

    // --------------------------------------------------------------
    // Shifts
    // --------------------------------------------------------------

    pub fn shl(&self, amount: &IntegerValue) -> IntegerValue {
        if self.has_unknown() || amount.has_unknown() {
            return IntegerValue::all_x(self.width, self.signed);
        }
        let amount = amount.signed_value().to_u64().unwrap_or(u64::max_value());
        if amount >= self.width as u64 {
            return IntegerValue::new(self.width, self.signed, BigInt::zero());
        }
        IntegerValue::new(self.width, self.signed, self.value.clone() << amount as usize)
    }

    pub fn shr(&self, amount: &IntegerValue, arithmetic: bool) -> IntegerValue {
        if self.has_unknown() || amount.has_unknown() {
            return IntegerValue::all_x(self.width, self.signed);
        }
        let amount = amount.signed_value().to_u64().unwrap_or(u64::max_value());
        let fill = arithmetic && self.signed && self.msb();
        if amount >= self.width as u64 {
            let v = if fill {
                (BigInt::from(1) << self.width as usize) - 1
            } else {
                BigInt::zero()
            };
            return IntegerValue::new(self.width, self.signed, v);
        }
        let mut v = self.value.clone() >> amount as usize;
        if fill {
            // Fill the vacated top bits with ones.
            for i in (self.width as u64 - amount)..self.width as u64 {
                v += BigInt::from(1) << i as usize;
            }
        }
        IntegerValue::new(self.width, self.signed, v)
    }

    // --------------------------------------------------------------
    // Bitwise operations, per bit with four-state semantics.
    // --------------------------------------------------------------

    fn bitwise(
        &self,
        other: &IntegerValue,
        width: u32,
        signed: bool,
        f: impl Fn(LogicBit, LogicBit) -> LogicBit,
    ) -> IntegerValue {
        let a = self.resize(width, self.signed);
        let b = other.resize(width, other.signed);
        let mut bits = Vec::with_capacity(width as usize);
        for i in 0..width as usize {
            bits.push(f(a.bit(i), b.bit(i)));
        }
        IntegerValue::from_bits(&bits, signed)
    }

    pub fn and(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.bitwise(other, width, signed, LogicBit::and)
    }

    pub fn or(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.bitwise(other, width, signed, LogicBit::or)
    }

    pub fn xor(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.bitwise(other, width, signed, LogicBit::xor)
    }

    pub fn xnor(&self, other: &IntegerValue, width: u32, signed: bool) -> IntegerValue {
        self.bitwise(other, width, signed, |a, b| LogicBit::xor(a, b).not())
    }

    pub fn not(&self) -> IntegerValue {
        let mut bits = Vec::with_capacity(self.width as usize);
        for i in 0..self.width as usize {
            bits.push(self.bit(i).not());
        }
        IntegerValue::from_bits(&bits, self.signed)
    }

    /// Reduce all bits with the given operation.
    pub fn reduce(&self, f: impl Fn(LogicBit, LogicBit) -> LogicBit) -> LogicBit {
        let mut acc = self.bit(0);
        for i in 1..self.width as usize {
            acc = f(acc, self.bit(i));
        }
        acc
    }

    /// Build a value from individual bits, LSB first.
    pub fn from_bits(bits: &[LogicBit], signed: bool) -> IntegerValue {
        let width = bits.len() as u32;
        let mut value = BigInt::zero();
        let mut special = BitVec::from_elem(bits.len(), false);
        let mut x_bits = BitVec::from_elem(bits.len(), false);
        for (i, bit) in bits.iter().enumerate() {
            match bit {
                LogicBit::One => value += BigInt::from(1) << i,
                LogicBit::X => {
                    special.set(i, true);
                    x_bits.set(i, true);
                }
                LogicBit::Z => special.set(i, true),
                LogicBit::Zero => (),
            }
        }
        IntegerValue {
            width: width,
            signed: signed,
            value: value,
            special: special,
            x_bits: x_bits,
        }
    }

    /// Concatenate `other` below this value (this value becomes the most
    /// significant part).
    pub fn concat(&self, other: &IntegerValue) -> IntegerValue {
        let width = self.width + other.width;
        let mut bits = Vec::with_capacity(width as usize);
        for i in 0..other.width as usize {
            bits.push(other.bit(i));
        }
        for i in 0..self.width as usize {
            bits.push(self.bit(i));
        }
        IntegerValue::from_bits(&bits, false)
    }

    pub fn replicate(&self, count: u32) -> IntegerValue {
        let mut bits = Vec::with_capacity((self.width * count) as usize);
        for _ in 0..count {
            for i in 0..self.width as usize {
                bits.push(self.bit(i));
            }
        }
        IntegerValue::from_bits(&bits, false)
    }

    /// Extract the bit range `[lsb, lsb+width)`; out of range bits are x.
    pub fn extract(&self, lsb: i64, width: u32) -> IntegerValue {
        let mut bits = Vec::with_capacity(width as usize);
        for i in 0..width as i64 {
            let index = lsb + i;
            if index < 0 || index >= self.width as i64 {
                bits.push(LogicBit::X);
            } else {
                bits.push(self.bit(index as usize));
            }
        }
        IntegerValue::from_bits(&bits, false)
    }

    // --------------------------------------------------------------
    // Comparisons
    // --------------------------------------------------------------

    /// Relational comparison; x if either side has unknown bits.
    pub fn compare_lt(&self, other: &IntegerValue) -> LogicBit {
        if self.has_unknown() || other.has_unknown() {
            return LogicBit::X;
        }
        LogicBit::from_bool(self.cmp_value(other) < other.cmp_value(self))
    }

    fn cmp_value(&self, other: &IntegerValue) -> BigInt {
        // Comparison is signed only if both operands are signed.
        if self.signed && other.signed {
            self.signed_value()
        } else {
            self.value.clone()
        }
    }

    /// Logical equality; x if either side has unknown bits.
    pub fn logic_eq(&self, other: &IntegerValue) -> LogicBit {
        if self.has_unknown() || other.has_unknown() {
            return LogicBit::X;
        }
        LogicBit::from_bool(self.cmp_value(other) == other.cmp_value(self))
    }

    /// Case equality: an exact match including x and z bits.
    pub fn case_eq(&self, other: &IntegerValue) -> bool {
        let width = self.width.max(other.width);
        let a = self.resize(width, self.signed);
        let b = other.resize(width, other.signed);
        (0..width as usize).all(|i| a.bit(i) == b.bit(i))
    }

    /// Wildcard equality: x/z bits in `other` match anything.
    pub fn wildcard_eq(&self, other: &IntegerValue) -> LogicBit {
        let width = self.width.max(other.width);
        let a = self.resize(width, self.signed);
        let b = other.resize(width, other.signed);
        let mut result = LogicBit::One;
        for i in 0..width as usize {
            match (a.bit(i), b.bit(i)) {
                (_, LogicBit::X) | (_, LogicBit::Z) => (),
                (LogicBit::X, _) | (LogicBit::Z, _) => result = LogicBit::X,
                (x, y) if x != y => return LogicBit::Zero,
                _ => (),
            }
        }
        result
    }
}

impl PartialEq for IntegerValue {
    fn eq(&self, other: &IntegerValue) -> bool {
        self.width == other.width && self.signed == other.signed && self.case_eq(other)
    }
}

impl fmt::Display for IntegerValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.has_unknown() {
            write!(f, "{}'b", self.width)?;
            for i in (0..self.width as usize).rev() {
                let c = match self.bit(i) {
                    LogicBit::Zero => '0',
                    LogicBit::One => '1',
                    LogicBit::X => 'x',
                    LogicBit::Z => 'z',
                };
                write!(f, "{}", c)?;
            }
            Ok(())
        } else {
            write!(f, "{}", self.signed_value())
        }
    }
}

/// A single four-state bit.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LogicBit {
    Zero,
    One,
    X,
    Z,
}

impl LogicBit {
    pub fn from_bool(b: bool) -> LogicBit {
        if b {
            LogicBit::One
        } else {
            LogicBit::Zero
        }
    }

    pub fn is_unknown(self) -> bool {
        match self {
            LogicBit::X | LogicBit::Z => true,
            _ => false,
        }
    }

    pub fn not(self) -> LogicBit {
        match self {
            LogicBit::Zero => LogicBit::One,
            LogicBit::One => LogicBit::Zero,
            _ => LogicBit::X,
        }
    }

    pub fn and(a: LogicBit, b: LogicBit) -> LogicBit {
        match (a, b) {
            (LogicBit::Zero, _) | (_, LogicBit::Zero) => LogicBit::Zero,
            (LogicBit::One, LogicBit::One) => LogicBit::One,
            _ => LogicBit::X,
        }
    }

    pub fn or(a: LogicBit, b: LogicBit) -> LogicBit {
        match (a, b) {
            (LogicBit::One, _) | (_, LogicBit::One) => LogicBit::One,
            (LogicBit::Zero, LogicBit::Zero) => LogicBit::Zero,
            _ => LogicBit::X,
        }
    }

    pub fn xor(a: LogicBit, b: LogicBit) -> LogicBit {
        if a.is_unknown() || b.is_unknown() {
            LogicBit::X
        } else {
            LogicBit::from_bool(a != b)
        }
    }
}

fn mask_to_width(value: BigInt, width: u32) -> BigInt {
    let modulus = BigInt::from(1) << width as usize;
    let mut v = value % &modulus;
    if v.is_negative() {
        v += &modulus;
    }
    v
}

fn bit_of(value: &BigInt, index: usize) -> bool {
    !((value >> index) & BigInt::from(1)).is_zero()
}

fn grow_to(bits: &mut BitVec, width: u32) {
    while bits.len() < width as usize {
        bits.push(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping() {
        let v = IntegerValue::new(8, false, BigInt::from(300));
        assert_eq!(v.as_i64(), Some(44));
        let v = IntegerValue::new(8, true, BigInt::from(-1));
        assert_eq!(v.as_i64(), Some(-1));
        let v = IntegerValue::new(8, false, BigInt::from(-1));
        assert_eq!(v.as_i64(), Some(255));
    }

    #[test]
    fn arithmetic() {
        let a = IntegerValue::from_i64(32, true, 7);
        let b = IntegerValue::from_i64(32, true, -3);
        assert_eq!(a.add(&b, 32, true).as_i64(), Some(4));
        assert_eq!(a.mul(&b, 32, true).as_i64(), Some(-21));
        assert_eq!(a.div(&b, 32, true).as_i64(), Some(-2));
        assert_eq!(a.rem(&b, 32, true).as_i64(), Some(1));
    }

    #[test]
    fn division_by_zero_is_x() {
        let a = IntegerValue::from_i64(32, true, 7);
        let z = IntegerValue::from_i64(32, true, 0);
        assert!(a.div(&z, 32, true).has_unknown());
    }

    #[test]
    fn unknown_propagation() {
        let a = IntegerValue::all_x(8, false);
        let b = IntegerValue::from_i64(8, false, 1);
        assert!(a.add(&b, 8, false).has_unknown());
        assert_eq!(a.logic_eq(&b), LogicBit::X);
    }

    #[test]
    fn bitwise_four_state() {
        // 4'bzx10 & 4'b0111 == 4'bxx10
        let a = IntegerValue::from_bits(
            &[LogicBit::Zero, LogicBit::One, LogicBit::X, LogicBit::Z],
            false,
        );
        let b = IntegerValue::from_bits(
            &[LogicBit::One, LogicBit::One, LogicBit::One, LogicBit::Zero],
            false,
        );
        let r = a.and(&b, 4, false);
        assert_eq!(r.bit(0), LogicBit::Zero);
        assert_eq!(r.bit(1), LogicBit::One);
        assert_eq!(r.bit(2), LogicBit::X);
        assert_eq!(r.bit(3), LogicBit::Zero);
    }

    #[test]
    fn shifts() {
        let a = IntegerValue::from_i64(8, true, -64);
        assert_eq!(
            a.shr(&IntegerValue::from_i64(8, false, 2), true).as_i64(),
            Some(-16)
        );
        assert_eq!(
            a.shr(&IntegerValue::from_i64(8, false, 2), false).as_i64(),
            Some(48)
        );
        let b = IntegerValue::from_i64(8, false, 3);
        assert_eq!(
            b.shl(&IntegerValue::from_i64(8, false, 6)).as_i64(),
            Some(192)
        );
    }

    #[test]
    fn concat_and_replicate() {
        let a = IntegerValue::from_i64(4, false, 0b1010);
        let b = IntegerValue::from_i64(4, false, 0b0101);
        let c = a.concat(&b);
        assert_eq!(c.width(), 8);
        assert_eq!(c.as_i64(), Some(0b1010_0101));
        let r = b.replicate(2);
        assert_eq!(r.as_i64(), Some(0b0101_0101));
    }

    #[test]
    fn resize_sign_extension() {
        let a = IntegerValue::from_i64(4, true, -2);
        assert_eq!(a.resize(8, true).as_i64(), Some(-2));
        let b = IntegerValue::from_i64(4, false, 0b1110);
        assert_eq!(b.resize(8, false).as_i64(), Some(0b1110));
    }

    #[test]
    fn case_and_wildcard_equality() {
        let x = IntegerValue::all_x(4, false);
        assert!(x.case_eq(&IntegerValue::all_x(4, false)));
        assert!(!x.case_eq(&IntegerValue::from_i64(4, false, 0)));

        let a = IntegerValue::from_i64(4, false, 0b1010);
        let mask = IntegerValue::from_bits(
            &[LogicBit::X, LogicBit::One, LogicBit::Z, LogicBit::One],
            false,
        );
        assert_eq!(a.wildcard_eq(&mask), LogicBit::One);
    }
}
