//! Data objects: scalar variables, arrays, and iterators (spec §3, §4.C).
//!
//! Translated from `original_source/src/data.h`'s `Data`/`ScalarVar`/`Array`/
//! `Iterator` class hierarchy (virtual dispatch over `isScalarVar`/`isArray`/
//! `isIterator`) into a single tagged enum, per the crate's "tagged variants
//! over dynamic dispatch" convention.

use crate::types::{IntTypeId, Type};
use crate::value::{IrValue, UbKind};
use std::rc::Rc;

/// The base (element) type and dimension sizes of an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayType {
    pub base: Type,
    pub dims: Vec<u32>,
}

impl ArrayType {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> u64 {
        self.dims.iter().map(|&d| d as u64).product()
    }
}

/// Up to `K` alternative values copied as a repeating cluster over an array,
/// so masked/select/reduce operations have something interesting to choose
/// between (spec §4.C "multi-value cluster"). A cluster of size 1 behaves
/// exactly like a single uniform fill value.
#[derive(Debug, Clone)]
pub struct MultiValue {
    pub values: Vec<IrValue>,
}

impl MultiValue {
    pub fn single(v: IrValue) -> Self {
        MultiValue { values: vec![v] }
    }

    pub fn cluster_size(&self) -> usize {
        self.values.len()
    }

    /// The value at cluster-relative index `i`, wrapping around the cluster.
    pub fn at(&self, i: usize) -> IrValue {
        self.values[i % self.values.len()]
    }

    pub fn ub_code(&self) -> UbKind {
        self.values
            .iter()
            .map(|v| v.ub)
            .find(|ub| ub.is_ub())
            .unwrap_or(UbKind::NoUB)
    }
}

/// A scalar variable: current C, a changed flag (spec §4.C).
#[derive(Debug, Clone)]
pub struct ScalarVar {
    pub name: String,
    pub ty: Type,
    pub init_val: IrValue,
    pub cur_val: IrValue,
    pub changed: bool,
    pub is_dead: bool,
}

impl ScalarVar {
    pub fn new(name: String, ty: Type, init_val: IrValue, is_dead: bool) -> Self {
        ScalarVar {
            name,
            ty,
            init_val,
            cur_val: init_val,
            changed: false,
            is_dead,
        }
    }

    pub fn ub_code(&self) -> UbKind {
        self.cur_val.ub
    }

    /// `setCurrentValue`: replaces `cur_val`, adopts its UB code, marks changed.
    pub fn set_current_value(&mut self, v: IrValue) {
        self.cur_val = v;
        self.changed = true;
    }
}

/// One recorded write to a sub-region of an array (spec §4.C `setValue`).
#[derive(Debug, Clone)]
pub struct ArrayWrite {
    pub span: Vec<(u32, u32)>,
    pub steps: Vec<u32>,
    pub value: MultiValue,
}

/// An array: base type, dims, and a layered value payload (spec §4.C).
#[derive(Debug, Clone)]
pub struct Array {
    pub name: String,
    pub array_ty: ArrayType,
    pub init_vals: MultiValue,
    pub cur_vals: MultiValue,
    pub writes: Vec<ArrayWrite>,
    pub was_changed: bool,
    pub is_dead: bool,
}

impl Array {
    pub fn new(name: String, array_ty: ArrayType, init_vals: MultiValue, is_dead: bool) -> Self {
        let cur_vals = init_vals.clone();
        Array {
            name,
            array_ty,
            init_vals,
            cur_vals,
            writes: Vec::new(),
            was_changed: false,
            is_dead,
        }
    }

    pub fn ub_code(&self) -> UbKind {
        self.cur_vals.ub_code()
    }

    /// `setValue`: records that `span` (per-dimension `(start, end)` pairs,
    /// stepped by `steps`) now holds `value`, and updates the current cluster.
    pub fn set_value(&mut self, span: Vec<(u32, u32)>, steps: Vec<u32>, value: MultiValue) {
        self.cur_vals = value.clone();
        self.writes.push(ArrayWrite { span, steps, value });
        self.was_changed = true;
    }
}

/// A loop iterator: owns its start/end/step expressions (spec §4.C).
///
/// The expression type lives in [`crate::expr`]; to avoid a cyclic module
/// dependency the field type is generic-erased behind `Rc<dyn IterExprHost>`
/// is avoided in favor of a concrete `Rc<crate::expr::Expr>` — imported here
/// because `expr` depends on `data`, not the reverse, for the scalar/array
/// cases, but `Iterator` needs `Expr` for its bounds. See `crate::expr` for
/// why this is safe (no actual cycle: `Iterator` holds `Expr`s, it does not
/// get held by one in a way that would need `Data` to know about `Expr`'s
/// internals beyond `Rc` pointers).
#[derive(Debug, Clone)]
pub struct Iterator {
    pub name: String,
    pub ty: Type,
    pub start: Rc<crate::expr::Expr>,
    pub end: Rc<crate::expr::Expr>,
    pub step: Rc<crate::expr::Expr>,
    pub is_dead: bool,
}

impl Iterator {
    pub fn set_parameters(
        &mut self,
        start: Rc<crate::expr::Expr>,
        end: Rc<crate::expr::Expr>,
        step: Rc<crate::expr::Expr>,
    ) {
        self.start = start;
        self.end = end;
        self.step = step;
    }
}

/// The three kinds of data object a symbol table can hold (spec §3 "Data").
#[derive(Debug, Clone)]
pub enum Data {
    ScalarVar(Rc<std::cell::RefCell<ScalarVar>>),
    Array(Rc<std::cell::RefCell<Array>>),
    Iterator(Rc<std::cell::RefCell<Iterator>>),
}

impl Data {
    pub fn name(&self) -> String {
        match self {
            Data::ScalarVar(v) => v.borrow().name.clone(),
            Data::Array(a) => a.borrow().name.clone(),
            Data::Iterator(i) => i.borrow().name.clone(),
        }
    }

    pub fn is_dead(&self) -> bool {
        match self {
            Data::ScalarVar(v) => v.borrow().is_dead,
            Data::Array(a) => a.borrow().is_dead,
            Data::Iterator(i) => i.borrow().is_dead,
        }
    }

    pub fn set_dead(&self, dead: bool) {
        match self {
            Data::ScalarVar(v) => v.borrow_mut().is_dead = dead,
            Data::Array(a) => a.borrow_mut().is_dead = dead,
            Data::Iterator(i) => i.borrow_mut().is_dead = dead,
        }
    }

    pub fn ub_code(&self) -> UbKind {
        match self {
            Data::ScalarVar(v) => v.borrow().ub_code(),
            Data::Array(a) => a.borrow().ub_code(),
            Data::Iterator(_) => UbKind::NoUB,
        }
    }

    pub fn is_scalar_var(&self) -> bool {
        matches!(self, Data::ScalarVar(_))
    }
    pub fn is_array(&self) -> bool {
        matches!(self, Data::Array(_))
    }
    pub fn is_iterator(&self) -> bool {
        matches!(self, Data::Iterator(_))
    }

    /// Identity key for use-interning (spec §3 "interned by underlying Data
    /// identity"): the address of the shared inner cell.
    pub fn identity(&self) -> usize {
        match self {
            Data::ScalarVar(v) => Rc::as_ptr(v) as usize,
            Data::Array(a) => Rc::as_ptr(a) as usize,
            Data::Iterator(i) => Rc::as_ptr(i) as usize,
        }
    }

    pub fn int_type(&self) -> IntTypeId {
        match self {
            Data::ScalarVar(v) => v.borrow().ty.int_type,
            Data::Array(a) => a.borrow().array_ty.base.int_type,
            Data::Iterator(i) => i.borrow().ty.int_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn scalar_var_set_current_value_marks_changed_and_adopts_ub() {
        let ty = Type::plain(IntTypeId::Int);
        let init = IrValue::new(IntTypeId::Int, 5);
        let mut v = ScalarVar::new("x".into(), ty, init, true);
        assert!(!v.changed);
        let overflowed = IrValue::max_of(IntTypeId::Int).add(IrValue::new(IntTypeId::Int, 1));
        v.set_current_value(overflowed);
        assert!(v.changed);
        assert_eq!(v.ub_code(), UbKind::SignOverflow);
    }

    #[test]
    fn multi_value_wraps_around_cluster() {
        let mv = MultiValue {
            values: vec![
                IrValue::new(IntTypeId::Int, 1),
                IrValue::new(IntTypeId::Int, 2),
                IrValue::new(IntTypeId::Int, 3),
            ],
        };
        assert_eq!(mv.at(0).value(), 1);
        assert_eq!(mv.at(3).value(), 1);
        assert_eq!(mv.at(4).value(), 2);
    }

    #[test]
    fn array_set_value_records_write_and_updates_current() {
        let array_ty = ArrayType {
            base: Type::plain(IntTypeId::Int),
            dims: vec![8],
        };
        let init = MultiValue::single(IrValue::zero(IntTypeId::Int));
        let mut arr = Array::new("a".into(), array_ty, init, true);
        let written = MultiValue::single(IrValue::new(IntTypeId::Int, 7));
        arr.set_value(vec![(0, 4)], vec![1], written);
        assert!(arr.was_changed);
        assert_eq!(arr.writes.len(), 1);
        assert_eq!(arr.cur_vals.at(0).value(), 7);
    }
}
