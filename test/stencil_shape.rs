//! Stencil/subscript shape (spec §8): a stencil-planned subscript must chain
//! exactly as many `Subscript` nodes as the target array has dimensions, and
//! leaving the stencil must clear the installed params so later subscripts
//! are not accidentally offset.

use cprogen_core::context::{GenCtx, PopulateCtx};
use cprogen_core::data::{Array, ArrayType, MultiValue};
use cprogen_core::expr::ExprKind;
use cprogen_core::policy::GenPolicy;
use cprogen_core::rng::GenRng;
use cprogen_core::symtab::SymbolTable;
use cprogen_core::types::{IntTypeId, Type};
use cprogen_core::value::IrValue;
use std::cell::RefCell;
use std::rc::Rc;

fn make_array(name: &str, dims: Vec<u32>) -> Rc<RefCell<Array>> {
    let array_ty = ArrayType {
        base: Type::plain(IntTypeId::Int),
        dims,
    };
    let init = MultiValue::single(IrValue::zero(IntTypeId::Int));
    Rc::new(RefCell::new(Array::new(name.into(), array_ty, init, false)))
}

fn make_ctx(seed: u64) -> (GenCtx, PopulateCtx, GenRng) {
    let policy = Rc::new(GenPolicy::default());
    let gen_ctx = GenCtx::new(policy);
    let input = Rc::new(RefCell::new(SymbolTable::new()));
    let output = Rc::new(RefCell::new(SymbolTable::new()));
    let mut pop_ctx = PopulateCtx::new(gen_ctx.clone(), input, output);
    pop_ctx.local_table.add_array(make_array("a", vec![8, 8]));
    pop_ctx.local_table.add_array(make_array("b", vec![8, 8]));
    pop_ctx.local_table.add_array(make_array("c", vec![8, 8]));
    let pop_ctx = pop_ctx.enter_loop(8).enter_loop(8);
    (gen_ctx, pop_ctx, GenRng::new(seed))
}

fn subscript_depth(expr: &Rc<cprogen_core::expr::Expr>) -> usize {
    match &expr.kind {
        ExprKind::Subscript { array, .. } => 1 + subscript_depth(array),
        ExprKind::ArrayUse(_) => 0,
        other => panic!("expected a subscript chain, found {:?}", other.kind_name()),
    }
}

#[test]
fn stencil_subscript_depth_matches_array_rank() {
    for seed in 0..20u64 {
        let (gen_ctx, mut pop_ctx, mut rng) = make_ctx(seed);
        if let Some(node) = cprogen_core::stencil::create_stencil(&gen_ctx, &mut pop_ctx, &mut rng) {
            assert_eq!(subscript_depth(&node), 2, "seed {seed} produced wrong chain depth");
            assert!(
                pop_ctx.local_table.stencil_params.is_empty(),
                "seed {seed} left stencil params installed after create_stencil returned"
            );
        }
    }
}

#[test]
fn stencil_needs_at_least_two_fitting_arrays() {
    let policy = Rc::new(GenPolicy::default());
    let gen_ctx = GenCtx::new(policy);
    let input = Rc::new(RefCell::new(SymbolTable::new()));
    let output = Rc::new(RefCell::new(SymbolTable::new()));
    let mut pop_ctx = PopulateCtx::new(gen_ctx.clone(), input, output);
    pop_ctx.local_table.add_array(make_array("lonely", vec![8]));
    let mut pop_ctx = pop_ctx.enter_loop(8);
    let mut rng = GenRng::new(1);
    assert!(cprogen_core::stencil::create_stencil(&gen_ctx, &mut pop_ctx, &mut rng).is_none());
}
