//! Generation contexts: the mutable state threaded through recursive
//! structure/populate/evaluate passes (spec §4.D).
//!
//! Grounded on `src/interp/dispatch.rs`'s `Interpreter` struct — a bag of
//! mutable execution state (registers, pc, call stack) threaded through
//! dispatch — generalized here to the populator's notion of "mutable state
//! threaded through recursion".

use crate::data::Data;
use crate::expr::{ConstBuffer, Expr};
use crate::policy::GenPolicy;
use crate::symtab::SymbolTable;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Base context shared by structure generation and population (spec §4.D).
/// Carries the two pieces of generator-wide shared state from spec §5: the
/// constant-reuse buffer and the use-interning table (`VarUse`/`ArrayUse`/
/// `IterUse` are interned by underlying `Data` identity, spec §3).
#[derive(Clone)]
pub struct GenCtx {
    pub policy: Rc<GenPolicy>,
    pub loop_depth: u32,
    pub if_else_depth: u32,
    pub const_buffer: Rc<RefCell<ConstBuffer>>,
    pub use_interner: Rc<RefCell<HashMap<usize, Rc<Expr>>>>,
}

impl GenCtx {
    pub fn new(policy: Rc<GenPolicy>) -> Self {
        let const_buf_size = policy.const_buf_size;
        GenCtx {
            policy,
            loop_depth: 0,
            if_else_depth: 0,
            const_buffer: Rc::new(RefCell::new(ConstBuffer::new(const_buf_size))),
            use_interner: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn enter_loop(&self) -> GenCtx {
        GenCtx {
            policy: self.policy.clone(),
            loop_depth: self.loop_depth + 1,
            if_else_depth: self.if_else_depth,
            const_buffer: self.const_buffer.clone(),
            use_interner: self.use_interner.clone(),
        }
    }

    pub fn enter_if_else(&self) -> GenCtx {
        GenCtx {
            policy: self.policy.clone(),
            loop_depth: self.loop_depth,
            if_else_depth: self.if_else_depth + 1,
            const_buffer: self.const_buffer.clone(),
            use_interner: self.use_interner.clone(),
        }
    }

    /// Returns the interned use expression for a [`Data`] identity, or
    /// inserts and returns `make()`'s result if this is the first use.
    pub fn intern_use(&self, identity: usize, make: impl FnOnce() -> Rc<Expr>) -> Rc<Expr> {
        if let Some(existing) = self.use_interner.borrow().get(&identity) {
            return existing.clone();
        }
        let created = make();
        self.use_interner.borrow_mut().insert(identity, created.clone());
        created
    }
}

/// Context threaded through `populate` (spec §4.D). Carries the symbol
/// tables in scope, structural depth counters, the active dimension stack,
/// and the flags that change how newly-grown expressions behave.
#[derive(Clone)]
pub struct PopulateCtx {
    pub base: GenCtx,
    pub input_table: Rc<std::cell::RefCell<SymbolTable>>,
    pub output_table: Rc<std::cell::RefCell<SymbolTable>>,
    pub local_table: SymbolTable,

    pub arith_depth: u32,
    /// Size of each active surrounding loop, outermost first.
    pub dims: Vec<u32>,

    pub taken: bool,
    pub inside_mutation: bool,
    pub inside_omp_simd: bool,
    pub in_stencil: bool,
    pub allow_mul_vals: bool,
    /// The multi-value cluster index currently selected, if any (spec §4.C).
    pub selected_mv_index: Option<usize>,
}

impl PopulateCtx {
    pub fn new(
        base: GenCtx,
        input_table: Rc<std::cell::RefCell<SymbolTable>>,
        output_table: Rc<std::cell::RefCell<SymbolTable>>,
    ) -> Self {
        PopulateCtx {
            base,
            input_table,
            output_table,
            local_table: SymbolTable::new(),
            arith_depth: 0,
            dims: Vec::new(),
            taken: true,
            inside_mutation: false,
            inside_omp_simd: false,
            in_stencil: false,
            allow_mul_vals: true,
            selected_mv_index: None,
        }
    }

    pub fn policy(&self) -> &GenPolicy {
        &self.base.policy
    }

    /// A child context for entering a loop: inherits `self`, pushes a new
    /// dimension (spec §4.D "Sub-contexts").
    pub fn enter_loop(&self, dim_size: u32) -> PopulateCtx {
        let mut dims = self.dims.clone();
        dims.push(dim_size);
        PopulateCtx {
            base: self.base.enter_loop(),
            input_table: self.input_table.clone(),
            output_table: self.output_table.clone(),
            local_table: self.local_table.clone(),
            arith_depth: self.arith_depth,
            dims,
            taken: self.taken,
            inside_mutation: self.inside_mutation,
            inside_omp_simd: self.inside_omp_simd,
            in_stencil: self.in_stencil,
            allow_mul_vals: self.allow_mul_vals,
            selected_mv_index: self.selected_mv_index,
        }
    }

    pub fn enter_if_else(&self, taken: bool) -> PopulateCtx {
        PopulateCtx {
            base: self.base.enter_if_else(),
            taken: self.taken && taken,
            ..self.clone_shallow()
        }
    }

    pub fn enter_arith(&self) -> PopulateCtx {
        PopulateCtx {
            arith_depth: self.arith_depth + 1,
            ..self.clone_shallow()
        }
    }

    pub fn enter_stencil(&self) -> PopulateCtx {
        PopulateCtx {
            in_stencil: true,
            ..self.clone_shallow()
        }
    }

    /// Enters a mutation region: the policy says random draws inside this
    /// region are meant to come from the shadow PRNG stream (spec §4.D,
    /// §5) — callers that build an `Expr` while `inside_mutation` is set are
    /// expected to route their RNG draws through `GenRng::with_mutation_stream`.
    pub fn enter_mutation(&self) -> PopulateCtx {
        PopulateCtx {
            inside_mutation: true,
            ..self.clone_shallow()
        }
    }

    fn clone_shallow(&self) -> PopulateCtx {
        PopulateCtx {
            base: self.base.clone(),
            input_table: self.input_table.clone(),
            output_table: self.output_table.clone(),
            local_table: self.local_table.clone(),
            arith_depth: self.arith_depth,
            dims: self.dims.clone(),
            taken: self.taken,
            inside_mutation: self.inside_mutation,
            inside_omp_simd: self.inside_omp_simd,
            in_stencil: self.in_stencil,
            allow_mul_vals: self.allow_mul_vals,
            selected_mv_index: self.selected_mv_index,
        }
    }

    pub fn current_dims(&self) -> &[u32] {
        &self.dims
    }
}

/// Context threaded through `evaluate` (spec §4.F): where to read named
/// input values from, if a `PopulateCtx` is not otherwise in scope (used by
/// the "empty `EvalCtx`" checks in the testable properties).
#[derive(Debug, Clone, Default)]
pub struct EvalCtx {
    pub input: std::collections::HashMap<String, Data>,
}

impl EvalCtx {
    pub fn empty() -> Self {
        EvalCtx::default()
    }

    pub fn with_input(mut self, name: impl Into<String>, data: Data) -> Self {
        self.input.insert(name.into(), data);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Data> {
        self.input.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_loop_pushes_dimension_and_increments_depth() {
        let policy = Rc::new(GenPolicy::default());
        let base = GenCtx::new(policy);
        let input = Rc::new(std::cell::RefCell::new(SymbolTable::new()));
        let output = Rc::new(std::cell::RefCell::new(SymbolTable::new()));
        let ctx = PopulateCtx::new(base, input, output);
        let inner = ctx.enter_loop(16);
        assert_eq!(inner.dims, vec![16]);
        assert_eq!(inner.base.loop_depth, 1);
        assert_eq!(ctx.dims, Vec::<u32>::new());
    }

    #[test]
    fn enter_if_else_propagates_taken_flag_conjunctively() {
        let policy = Rc::new(GenPolicy::default());
        let base = GenCtx::new(policy);
        let input = Rc::new(std::cell::RefCell::new(SymbolTable::new()));
        let output = Rc::new(std::cell::RefCell::new(SymbolTable::new()));
        let ctx = PopulateCtx::new(base, input, output);
        let dead_branch = ctx.enter_if_else(false);
        assert!(!dead_branch.taken);
        let live_branch = dead_branch.enter_if_else(true);
        assert!(!live_branch.taken);
    }

    #[test]
    fn eval_ctx_lookup() {
        let ctx = EvalCtx::empty();
        assert!(ctx.lookup("x").is_none());
    }
}
