//! UB repair table (spec §4.F "Repairs", §4.I): one function per
//! `(node kind, UbKind)` pair, invoked from [`crate::expr::Expr::rebuild`].
//!
//! Grounded on `src/interp/dispatch.rs`'s per-trap-kind handling (one match
//! arm per result kind), transposed here from "handle a VM trap" to "repair
//! an abstractly-evaluated node". The monotone-lattice termination argument
//! (each repair strictly narrows the UB codes the node can still produce)
//! follows the Design Notes directly: every repair below either removes the
//! operator that could overflow/trap, or moves a value into a range where
//! the same UB kind cannot recur.

use crate::policy::{BinaryOp, UnaryOp};
use crate::types::IntTypeId;
use crate::value::IrValue;

/// Repair for unary `-x` carrying `SignOverflow`: replace the operator with
/// a no-op `+x` (spec repair table row 1).
pub fn repair_unary_neg(_operand: IrValue) -> UnaryOp {
    UnaryOp::Plus
}

/// Repair for binary `a + b` / `a - b` carrying `SignOverflow`: swap the
/// operator (rows 2-3).
pub fn repair_additive(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Add => BinaryOp::Sub,
        BinaryOp::Sub => BinaryOp::Add,
        other => other,
    }
}

/// Repair for `a * b`: `SignOverflowMin` swaps to `-`, plain `SignOverflow`
/// swaps to `/` (rows 4-5).
pub fn repair_mul(ub_is_min_variant: bool) -> BinaryOp {
    if ub_is_min_variant {
        BinaryOp::Sub
    } else {
        BinaryOp::Div
    }
}

/// Repair for `a / b` or `a % b`: `ZeroDiv` swaps to `*`, `SignOverflow`
/// (only possible for `/` via `INT_MIN / -1`) swaps to `-` (rows 6-7).
pub fn repair_div_or_rem(is_zero_div: bool) -> BinaryOp {
    if is_zero_div {
        BinaryOp::Mul
    } else {
        BinaryOp::Sub
    }
}

/// Amount to subtract from a too-large shift count so it lands in
/// `[0, width-1]`, additionally respecting the C-mode "MSB past sign bit"
/// constraint for signed `<<` (spec repair table row 8, boundary example
/// "`a << width` is repaired to `a << (width - 1)`" — one less, not zero).
pub fn clamp_shift_rhs_large(rhs_val: i64, ty: IntTypeId, is_left: bool, lhs_nonneg_msb: u32) -> i64 {
    let width = ty.storage_bits() as i64;
    let mut max_legal = width - 1;
    if is_left && ty.is_signed() {
        max_legal = max_legal.min(width - lhs_nonneg_msb as i64 - 1).max(0);
    }
    let target = max_legal.max(0);
    rhs_val - target
}

/// Amount to add to a negative shift count so it lands at `0` (spec repair
/// table row 9).
pub fn raise_shift_rhs_neg(rhs_val: i64) -> i64 {
    -rhs_val
}

/// For `NegShift`: the amount to add to a negative LHS to coerce it
/// non-negative while staying representable — `typemax(a)` per the spec
/// repair table row 10.
pub fn neg_shift_addend(ty: IntTypeId) -> i128 {
    ty.max_value()
}

/// Position (0-based, from the LSB) of the highest set bit of a
/// non-negative value, used by [`clamp_shift_rhs_large`]'s C-mode check.
/// Returns 0 for a value of 0.
pub fn highest_set_bit(value: i128) -> u32 {
    if value <= 0 {
        0
    } else {
        127 - (value as u128).leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_swap_is_involutive() {
        assert_eq!(repair_additive(repair_additive(BinaryOp::Add)), BinaryOp::Add);
    }

    #[test]
    fn shift_rhs_large_clamps_below_width() {
        let amount = clamp_shift_rhs_large(40, IntTypeId::Int, true, 31);
        let new_rhs = 40 - amount;
        assert!(new_rhs >= 0 && new_rhs < 32);
    }

    #[test]
    fn shift_rhs_large_repairs_width_to_width_minus_one() {
        // Boundary example: `a << width` repaired to `a << (width - 1)`.
        let amount = clamp_shift_rhs_large(32, IntTypeId::Int, false, 0);
        assert_eq!(32 - amount, 31);
    }

    #[test]
    fn highest_set_bit_of_zero_is_zero() {
        assert_eq!(highest_set_bit(0), 0);
    }

    #[test]
    fn highest_set_bit_of_one_is_zero() {
        assert_eq!(highest_set_bit(1), 0);
    }
}
