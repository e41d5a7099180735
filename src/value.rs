//! IR values: a tagged integer value with full C/C++ integer semantics
//! (promotion, usual arithmetic conversions, wrap/overflow detection,
//! division-by-zero, shift bounds). See spec §3, §4.A.

use crate::types::{arith_conv, integral_prom, needs_bool_conversion, IntTypeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A sign/magnitude representation of an integer value. `magnitude` is always
/// non-negative; `is_negative` distinguishes `-magnitude` from `+magnitude`
/// (so `0` always has `is_negative == false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsValue {
    pub is_negative: bool,
    pub magnitude: u64,
}

impl AbsValue {
    pub fn from_i128(v: i128) -> Self {
        if v < 0 {
            AbsValue {
                is_negative: true,
                magnitude: (-v) as u64,
            }
        } else {
            AbsValue {
                is_negative: false,
                magnitude: v as u64,
            }
        }
    }

    pub fn to_i128(self) -> i128 {
        if self.is_negative {
            -(self.magnitude as i128)
        } else {
            self.magnitude as i128
        }
    }
}

/// Undefined-behavior tags an [`IrValue`] can carry. `NoUB` means the value is
/// well-defined. Every other variant marks a specific C/C++ UB condition; once
/// set, a tag propagates through further operations (see spec §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UbKind {
    NoUB,
    SignOverflow,
    /// `INT_MIN * -1` specifically — distinct from `SignOverflow` because its
    /// repair is different (operator swap to `-`, not `/`).
    SignOverflowMin,
    ZeroDiv,
    ShiftRhsNeg,
    ShiftRhsLarge,
    NegShift,
    OutOfBounds,
    Uninit,
}

impl UbKind {
    pub fn is_ub(self) -> bool {
        !matches!(self, UbKind::NoUB)
    }
}

impl fmt::Display for UbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UbKind::NoUB => "no UB",
            UbKind::SignOverflow => "signed overflow",
            UbKind::SignOverflowMin => "INT_MIN * -1 overflow",
            UbKind::ZeroDiv => "division by zero",
            UbKind::ShiftRhsNeg => "negative shift count",
            UbKind::ShiftRhsLarge => "shift count >= width",
            UbKind::NegShift => "negative value shifted",
            UbKind::OutOfBounds => "out-of-bounds index",
            UbKind::Uninit => "uninitialized read",
        };
        f.write_str(s)
    }
}

/// An abstractly-interpreted integer value: its type, its sign/magnitude
/// payload, and any UB tag accrued while producing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrValue {
    pub ty: IntTypeId,
    pub abs: AbsValue,
    pub ub: UbKind,
}

/// Reduce an arbitrary-precision value into `ty`'s representable range by
/// two's-complement truncation, returning the reduced value and whether the
/// original value did not fit (a signed overflow condition; for unsigned
/// types this is simply the wraparound the standard mandates, never UB).
fn wrap_to_type(math: i128, ty: IntTypeId) -> (AbsValue, bool) {
    let bits = ty.storage_bits();
    let modulus: i128 = 1i128 << bits;
    let mut reduced = math.rem_euclid(modulus);
    let overflowed = math < ty.min_value() || math > ty.max_value();
    if ty.is_signed() && ty != IntTypeId::Bool {
        let half = modulus >> 1;
        if reduced >= half {
            reduced -= modulus;
        }
    } else if ty == IntTypeId::Bool {
        reduced = if reduced != 0 { 1 } else { 0 };
    }
    (AbsValue::from_i128(reduced), overflowed)
}

pub(crate) fn combine_ub(a: UbKind, b: UbKind) -> UbKind {
    if a.is_ub() {
        a
    } else {
        b
    }
}

impl IrValue {
    /// Construct a well-defined value, wrapping into `ty`'s range if needed
    /// (used for constants, which are always drawn in-range so this never
    /// actually wraps in practice).
    pub fn new(ty: IntTypeId, value: i128) -> Self {
        let (abs, _) = wrap_to_type(value, ty);
        IrValue {
            ty,
            abs,
            ub: UbKind::NoUB,
        }
    }

    pub fn uninit(ty: IntTypeId) -> Self {
        IrValue {
            ty,
            abs: AbsValue::from_i128(0),
            ub: UbKind::Uninit,
        }
    }

    pub fn zero(ty: IntTypeId) -> Self {
        IrValue::new(ty, 0)
    }

    pub fn min_of(ty: IntTypeId) -> Self {
        IrValue::new(ty, ty.min_value())
    }

    pub fn max_of(ty: IntTypeId) -> Self {
        IrValue::new(ty, ty.max_value())
    }

    pub fn value(self) -> i128 {
        self.abs.to_i128()
    }

    pub fn is_true(self) -> bool {
        self.value() != 0
    }

    /// Cast to another type id, following spec §4.A cast semantics: widening
    /// preserves value; narrowing unsigned truncates silently; narrowing
    /// signed truncates and tags `SignOverflow` only if the source value did
    /// not fit the destination.
    pub fn cast(self, dest: IntTypeId) -> IrValue {
        let math = self.value();
        let (abs, overflowed) = wrap_to_type(math, dest);
        let ub = if self.ub.is_ub() {
            self.ub
        } else if overflowed && dest.is_signed() && dest != IntTypeId::Bool {
            UbKind::SignOverflow
        } else {
            UbKind::NoUB
        };
        IrValue { ty: dest, abs, ub }
    }

    fn promoted(self) -> IrValue {
        self.cast(integral_prom(self.ty))
    }

    fn to_bool(self) -> IrValue {
        if needs_bool_conversion(self.ty) {
            self.cast(IntTypeId::Bool)
        } else {
            self
        }
    }

    fn arith_pair(self, rhs: IrValue) -> (IrValue, IrValue, IntTypeId) {
        let ty = arith_conv(self.ty, rhs.ty);
        (self.cast(ty), rhs.cast(ty), ty)
    }

    pub fn add(self, rhs: IrValue) -> IrValue {
        let (a, b, ty) = self.arith_pair(rhs);
        let ub_in = combine_ub(a.ub, b.ub);
        let (abs, overflowed) = wrap_to_type(a.value() + b.value(), ty);
        let ub = signed_overflow_ub(ub_in, ty, overflowed, false);
        IrValue { ty, abs, ub }
    }

    pub fn sub(self, rhs: IrValue) -> IrValue {
        let (a, b, ty) = self.arith_pair(rhs);
        let ub_in = combine_ub(a.ub, b.ub);
        let (abs, overflowed) = wrap_to_type(a.value() - b.value(), ty);
        let ub = signed_overflow_ub(ub_in, ty, overflowed, false);
        IrValue { ty, abs, ub }
    }

    pub fn mul(self, rhs: IrValue) -> IrValue {
        let (a, b, ty) = self.arith_pair(rhs);
        let ub_in = combine_ub(a.ub, b.ub);
        let a_val = a.value();
        let b_val = b.value();
        let (abs, overflowed) = wrap_to_type(a_val * b_val, ty);
        let is_min_times_neg_one = ty.is_signed()
            && ((a_val == ty.min_value() && b_val == -1) || (b_val == ty.min_value() && a_val == -1));
        let ub = signed_overflow_ub(ub_in, ty, overflowed, is_min_times_neg_one);
        IrValue { ty, abs, ub }
    }

    pub fn div(self, rhs: IrValue) -> IrValue {
        let (a, b, ty) = self.arith_pair(rhs);
        let ub_in = combine_ub(a.ub, b.ub);
        if b.value() == 0 {
            return IrValue {
                ty,
                abs: AbsValue::from_i128(0),
                ub: if ub_in.is_ub() { ub_in } else { UbKind::ZeroDiv },
            };
        }
        let a_val = a.value();
        let b_val = b.value();
        let overflow_min_div_neg_one = ty.is_signed() && a_val == ty.min_value() && b_val == -1;
        let (abs, overflowed) = wrap_to_type(a_val / b_val, ty);
        let ub = if ub_in.is_ub() {
            ub_in
        } else if overflow_min_div_neg_one || overflowed {
            UbKind::SignOverflow
        } else {
            UbKind::NoUB
        };
        IrValue { ty, abs, ub }
    }

    pub fn rem(self, rhs: IrValue) -> IrValue {
        let (a, b, ty) = self.arith_pair(rhs);
        let ub_in = combine_ub(a.ub, b.ub);
        if b.value() == 0 {
            return IrValue {
                ty,
                abs: AbsValue::from_i128(0),
                ub: if ub_in.is_ub() { ub_in } else { UbKind::ZeroDiv },
            };
        }
        let a_val = a.value();
        let b_val = b.value();
        if ty.is_signed() && a_val == ty.min_value() && b_val == -1 {
            // INT_MIN % -1 is well-defined to be 0 (it is INT_MIN / -1 that overflows).
            return IrValue {
                ty,
                abs: AbsValue::from_i128(0),
                ub: ub_in,
            };
        }
        let (abs, _) = wrap_to_type(a_val % b_val, ty);
        IrValue { ty, abs, ub: ub_in }
    }

    pub fn neg(self) -> IrValue {
        let a = self.promoted();
        let ub_in = a.ub;
        let (abs, overflowed) = wrap_to_type(-a.value(), a.ty);
        let ub = signed_overflow_ub(ub_in, a.ty, overflowed, false);
        IrValue { ty: a.ty, abs, ub }
    }

    pub fn bit_not(self) -> IrValue {
        let a = self.promoted();
        let (abs, _) = wrap_to_type(!(a.value()), a.ty);
        IrValue {
            ty: a.ty,
            abs,
            ub: a.ub,
        }
    }

    pub fn logical_not(self) -> IrValue {
        let a = self.to_bool();
        IrValue {
            ty: IntTypeId::Bool,
            abs: AbsValue::from_i128(if a.is_true() { 0 } else { 1 }),
            ub: a.ub,
        }
    }

    pub fn logical_and(self, rhs: IrValue) -> IrValue {
        let a = self.to_bool();
        let b = rhs.to_bool();
        IrValue {
            ty: IntTypeId::Bool,
            abs: AbsValue::from_i128((a.is_true() && b.is_true()) as i128),
            ub: combine_ub(a.ub, b.ub),
        }
    }

    pub fn logical_or(self, rhs: IrValue) -> IrValue {
        let a = self.to_bool();
        let b = rhs.to_bool();
        IrValue {
            ty: IntTypeId::Bool,
            abs: AbsValue::from_i128((a.is_true() || b.is_true()) as i128),
            ub: combine_ub(a.ub, b.ub),
        }
    }

    fn bitwise(self, rhs: IrValue, f: impl Fn(i128, i128) -> i128) -> IrValue {
        let (a, b, ty) = self.arith_pair(rhs);
        let ub_in = combine_ub(a.ub, b.ub);
        let (abs, _) = wrap_to_type(f(a.value(), b.value()), ty);
        IrValue { ty, abs, ub: ub_in }
    }

    pub fn bit_and(self, rhs: IrValue) -> IrValue {
        self.bitwise(rhs, |a, b| ((a as i64) & (b as i64)) as i128)
    }

    pub fn bit_or(self, rhs: IrValue) -> IrValue {
        self.bitwise(rhs, |a, b| ((a as i64) & (b as i64) | ((a as i64) | (b as i64))) as i128)
    }

    pub fn bit_xor(self, rhs: IrValue) -> IrValue {
        self.bitwise(rhs, |a, b| ((a as i64) ^ (b as i64)) as i128)
    }

    fn shift(self, rhs: IrValue, is_left: bool) -> IrValue {
        let a = self.promoted();
        let ty = a.ty;
        let width = ty.storage_bits() as i128;
        let rhs_val = rhs.value();
        let mut ub = combine_ub(a.ub, rhs.ub);
        if !ub.is_ub() {
            if rhs_val < 0 {
                ub = UbKind::ShiftRhsNeg;
            } else if rhs_val >= width {
                ub = UbKind::ShiftRhsLarge;
            } else if ty.is_signed() && a.abs.is_negative {
                ub = UbKind::NegShift;
            }
        }
        let amt = (((rhs_val % width) + width) % width) as u32;
        let a_val = a.value();
        let base_bits: u128 = if a_val >= 0 {
            a_val as u128
        } else {
            (a_val + (1i128 << width)) as u128
        };
        let result_bits: u128 = if is_left {
            if !ub.is_ub() && ty.is_signed() {
                // MSB-past-sign-bit check, folded into ShiftRhsLarge per spec.
                let exact = base_bits << amt;
                if exact > ty.max_value() as u128 {
                    ub = UbKind::ShiftRhsLarge;
                }
            }
            let mask: u128 = if width >= 64 {
                u128::MAX >> (128 - width)
            } else {
                (1u128 << width) - 1
            };
            (base_bits << amt) & mask
        } else if ty.is_signed() && a.abs.is_negative {
            // Arithmetic right shift: sign-extend.
            let signed = a_val >> amt; // Rust's >> on i128 is arithmetic.
            return IrValue {
                ty,
                abs: AbsValue::from_i128(signed),
                ub,
            };
        } else {
            base_bits >> amt
        };
        let (abs, _) = wrap_to_type(result_bits as i128, ty);
        IrValue { ty, abs, ub }
    }

    pub fn shl(self, rhs: IrValue) -> IrValue {
        self.shift(rhs, true)
    }

    pub fn shr(self, rhs: IrValue) -> IrValue {
        self.shift(rhs, false)
    }

    fn compare(self, rhs: IrValue, f: impl Fn(i128, i128) -> bool) -> IrValue {
        let (a, b, _ty) = self.arith_pair(rhs);
        let ub = combine_ub(a.ub, b.ub);
        IrValue {
            ty: IntTypeId::Bool,
            abs: AbsValue::from_i128(f(a.value(), b.value()) as i128),
            ub,
        }
    }

    pub fn eq(self, rhs: IrValue) -> IrValue {
        self.compare(rhs, |a, b| a == b)
    }
    pub fn ne(self, rhs: IrValue) -> IrValue {
        self.compare(rhs, |a, b| a != b)
    }
    pub fn lt(self, rhs: IrValue) -> IrValue {
        self.compare(rhs, |a, b| a < b)
    }
    pub fn le(self, rhs: IrValue) -> IrValue {
        self.compare(rhs, |a, b| a <= b)
    }
    pub fn gt(self, rhs: IrValue) -> IrValue {
        self.compare(rhs, |a, b| a > b)
    }
    pub fn ge(self, rhs: IrValue) -> IrValue {
        self.compare(rhs, |a, b| a >= b)
    }
}

fn signed_overflow_ub(ub_in: UbKind, ty: IntTypeId, overflowed: bool, is_min_times_neg_one: bool) -> UbKind {
    if ub_in.is_ub() {
        ub_in
    } else if ty.is_signed() && ty != IntTypeId::Bool && overflowed {
        if is_min_times_neg_one {
            UbKind::SignOverflowMin
        } else {
            UbKind::SignOverflow
        }
    } else {
        UbKind::NoUB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_wraps_without_ub() {
        let a = IrValue::max_of(IntTypeId::UInt);
        let one = IrValue::new(IntTypeId::UInt, 1);
        let sum = a.add(one);
        assert_eq!(sum.ub, UbKind::NoUB);
        assert_eq!(sum.value(), 0);
    }

    #[test]
    fn signed_add_overflow_is_tagged() {
        let a = IrValue::max_of(IntTypeId::Int);
        let one = IrValue::new(IntTypeId::Int, 1);
        let sum = a.add(one);
        assert_eq!(sum.ub, UbKind::SignOverflow);
    }

    #[test]
    fn int_min_times_neg_one_is_sign_overflow_min() {
        let min = IrValue::min_of(IntTypeId::Int);
        let neg_one = IrValue::new(IntTypeId::Int, -1);
        let prod = min.mul(neg_one);
        assert_eq!(prod.ub, UbKind::SignOverflowMin);
    }

    #[test]
    fn int_min_div_neg_one_is_sign_overflow_not_min_variant() {
        let min = IrValue::min_of(IntTypeId::Int);
        let neg_one = IrValue::new(IntTypeId::Int, -1);
        let quot = min.div(neg_one);
        assert_eq!(quot.ub, UbKind::SignOverflow);
    }

    #[test]
    fn division_by_zero_is_tagged() {
        let a = IrValue::new(IntTypeId::Int, 10);
        let zero = IrValue::zero(IntTypeId::Int);
        assert_eq!(a.div(zero).ub, UbKind::ZeroDiv);
        assert_eq!(a.rem(zero).ub, UbKind::ZeroDiv);
    }

    #[test]
    fn shift_rhs_large_is_tagged() {
        let max = IrValue::max_of(IntTypeId::Int);
        let forty = IrValue::new(IntTypeId::Int, 40);
        assert_eq!(max.shl(forty).ub, UbKind::ShiftRhsLarge);
    }

    #[test]
    fn shift_rhs_negative_is_tagged() {
        let a = IrValue::new(IntTypeId::Int, 1);
        let neg = IrValue::new(IntTypeId::Int, -1);
        assert_eq!(a.shl(neg).ub, UbKind::ShiftRhsNeg);
    }

    #[test]
    fn negative_lhs_shift_is_tagged() {
        let a = IrValue::new(IntTypeId::Int, -2);
        let one = IrValue::new(IntTypeId::Int, 1);
        assert_eq!(a.shl(one).ub, UbKind::NegShift);
    }

    #[test]
    fn cast_narrowing_unsigned_truncates_without_ub() {
        let big = IrValue::new(IntTypeId::Int, 300);
        let narrowed = big.cast(IntTypeId::UChar);
        assert_eq!(narrowed.ub, UbKind::NoUB);
        assert_eq!(narrowed.value(), 300 % 256);
    }

    #[test]
    fn cast_widening_preserves_value() {
        let small = IrValue::new(IntTypeId::Short, -5);
        let widened = small.cast(IntTypeId::Long);
        assert_eq!(widened.ub, UbKind::NoUB);
        assert_eq!(widened.value(), -5);
    }

    #[test]
    fn comparisons_yield_bool() {
        let a = IrValue::new(IntTypeId::Int, 3);
        let b = IrValue::new(IntTypeId::Int, 5);
        let r = a.lt(b);
        assert_eq!(r.ty, IntTypeId::Bool);
        assert_eq!(r.value(), 1);
    }
}
