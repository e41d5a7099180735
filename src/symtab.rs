//! Symbol tables: the per-scope bookkeeping of declared vars/arrays/iterators
//! and the stencil parameters installed while inside a stencil (spec §4.D).
//!
//! Grounded on `src/ir/assembler.rs`'s `labels: HashMap<String, LabelType>`
//! pattern — a name table built up incrementally during a generation pass and
//! consulted by later `create` calls — generalized here to the several
//! vectors/maps a [`SymbolTable`] needs to track.

use crate::data::{Array, Iterator, ScalarVar};
use crate::expr::Expr;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Per-dimension stencil parameters for one array (Open Question 2: the
/// struct-of-per-dimension-structs form, not the separate
/// `setActiveDims`/`setOffsets` pair).
#[derive(Debug, Clone, Copy)]
pub struct ArrayStencilDimParams {
    pub active: bool,
    pub offset: i64,
    pub iterator_identity: Option<usize>,
}

impl ArrayStencilDimParams {
    pub fn inactive() -> Self {
        ArrayStencilDimParams {
            active: false,
            offset: 0,
            iterator_identity: None,
        }
    }
}

/// Stencil parameters installed for one array while `in_stencil` is active
/// (spec §4.J step 4): one [`ArrayStencilDimParams`] per array dimension.
#[derive(Debug, Clone)]
pub struct ArrayStencilParams {
    pub array: Rc<RefCell<Array>>,
    pub dims: Vec<ArrayStencilDimParams>,
    pub offsets_defined: bool,
}

/// `SymbolTable` (spec §4.D): vectors of vars, arrays indexed by rank,
/// iterators, a list of legal-to-read expressions ("available variable
/// uses"), and the stencil params installed for the current stencil, if any.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub vars: Vec<Rc<RefCell<ScalarVar>>>,
    pub arrays_by_rank: HashMap<usize, Vec<Rc<RefCell<Array>>>>,
    pub iterators: Vec<Rc<RefCell<Iterator>>>,
    pub available_uses: Vec<Rc<Expr>>,
    pub stencil_params: Vec<ArrayStencilParams>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn add_var(&mut self, var: Rc<RefCell<ScalarVar>>) {
        self.vars.push(var);
    }

    pub fn add_array(&mut self, array: Rc<RefCell<Array>>) {
        let rank = array.borrow().array_ty.rank();
        self.arrays_by_rank.entry(rank).or_default().push(array);
    }

    pub fn add_iterator(&mut self, it: Rc<RefCell<Iterator>>) {
        self.iterators.push(it);
    }

    pub fn register_use(&mut self, use_expr: Rc<Expr>) {
        self.available_uses.push(use_expr);
    }

    pub fn arrays_of_rank(&self, rank: usize) -> &[Rc<RefCell<Array>>] {
        self.arrays_by_rank
            .get(&rank)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All arrays whose dimensions are each ≥ the corresponding entry of
    /// `dims` (spec §4.F: `SubscriptExpr::create` array-selection rule).
    pub fn arrays_fitting(&self, dims: &[u32]) -> Vec<Rc<RefCell<Array>>> {
        self.arrays_by_rank
            .values()
            .flatten()
            .filter(|a| {
                let a = a.borrow();
                a.array_ty.dims.len() >= dims.len()
                    && a.array_ty
                        .dims
                        .iter()
                        .zip(dims.iter())
                        .all(|(have, need)| have >= need)
            })
            .cloned()
            .collect()
    }

    pub fn all_arrays(&self) -> Vec<Rc<RefCell<Array>>> {
        self.arrays_by_rank.values().flatten().cloned().collect()
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn find_var(&self, name: &str) -> Option<Rc<RefCell<ScalarVar>>> {
        self.vars.iter().find(|v| v.borrow().name == name).cloned()
    }

    pub fn find_array(&self, name: &str) -> Option<Rc<RefCell<Array>>> {
        self.all_arrays().into_iter().find(|a| a.borrow().name == name)
    }

    /// Installs stencil params per array (spec §4.J step 4), replacing
    /// whatever was previously installed (stencils do not nest).
    pub fn install_stencil_params(&mut self, params: Vec<ArrayStencilParams>) {
        self.stencil_params = params;
    }

    pub fn clear_stencil_params(&mut self) {
        self.stencil_params.clear();
    }

    pub fn stencil_params_for(&self, array_identity: usize) -> Option<&ArrayStencilParams> {
        self.stencil_params
            .iter()
            .find(|p| Rc::as_ptr(&p.array) as usize == array_identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ArrayType;
    use crate::data::MultiValue;
    use crate::types::{IntTypeId, Type};
    use crate::value::IrValue;

    fn make_array(name: &str, dims: Vec<u32>) -> Rc<RefCell<Array>> {
        let array_ty = ArrayType {
            base: Type::plain(IntTypeId::Int),
            dims,
        };
        let init = MultiValue::single(IrValue::zero(IntTypeId::Int));
        Rc::new(RefCell::new(Array::new(name.into(), array_ty, init, true)))
    }

    #[test]
    fn arrays_fitting_filters_by_dimension() {
        let mut table = SymbolTable::new();
        table.add_array(make_array("small", vec![4]));
        table.add_array(make_array("big", vec![16]));
        let fits = table.arrays_fitting(&[8]);
        assert_eq!(fits.len(), 1);
        assert_eq!(fits[0].borrow().name, "big");
    }

    #[test]
    fn arrays_by_rank_groups_correctly() {
        let mut table = SymbolTable::new();
        table.add_array(make_array("vec1", vec![4]));
        table.add_array(make_array("mat1", vec![4, 4]));
        assert_eq!(table.arrays_of_rank(1).len(), 1);
        assert_eq!(table.arrays_of_rank(2).len(), 1);
        assert_eq!(table.arrays_of_rank(3).len(), 0);
    }

    #[test]
    fn find_var_and_array_by_name() {
        let mut table = SymbolTable::new();
        table.add_array(make_array("a", vec![2]));
        assert!(table.find_array("a").is_some());
        assert!(table.find_array("b").is_none());
    }
}
