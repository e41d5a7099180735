//! Type system (spec §8): conversions must be idempotent and casts must
//! saturate into the destination type's range rather than panic. Exercised
//! from outside the crate, distinct from the inline unit tests next to the
//! rules themselves.

use cprogen_core::expr::{Expr, ExprKind};
use cprogen_core::types::{arith_conv, IntTypeId};
use cprogen_core::value::IrValue;

#[test]
fn arith_conv_is_idempotent_for_every_type_pair() {
    for &a in IntTypeId::ALL.iter() {
        for &b in IntTypeId::ALL.iter() {
            let once = arith_conv(a, b);
            let twice = arith_conv(once, once);
            assert_eq!(once, twice, "arith_conv({a:?}, {b:?}) did not settle");
        }
    }
}

#[test]
fn cast_into_every_type_never_escapes_its_range() {
    for &from in IntTypeId::ALL.iter() {
        for &to in IntTypeId::ALL.iter() {
            let value = IrValue::new(from, from.max_value()).cast(to);
            assert!(value.value() >= to.min_value());
            assert!(value.value() <= to.max_value());
        }
    }
}

#[test]
fn propagate_type_through_a_binary_tree_is_idempotent() {
    let lhs = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Int, 7)));
    let rhs = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Long, 3)));
    let tree = Expr::new(ExprKind::Binary {
        op: cprogen_core::policy::BinaryOp::Add,
        lhs,
        rhs,
    });
    let once = tree.propagate_type();
    let twice = once.propagate_type();
    assert_eq!(once.ty(), twice.ty());
    assert_eq!(once.ty(), IntTypeId::Long);
}
