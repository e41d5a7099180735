//! Expression IR (spec §3, §4.F): the typed, abstractly-interpreted
//! expression tree every statement grows. Each variant implements the same
//! three-operation contract — `propagate_type`, `evaluate`, `rebuild` — as an
//! exhaustive `match` rather than virtual dispatch, per the Design Notes'
//! "tagged variants over dynamic dispatch" guidance.
//!
//! Grounded on `original_source/src/expr.h`/`expr.cpp` for the operation
//! contract, transliterated out of a class hierarchy into this enum; on
//! `src/ir/format.rs`'s closed `Opcode`/operand enums for how the teacher
//! represents node kinds as small total enums (mirrored by
//! [`crate::policy::ArithNodeKind`] and friends).

use crate::context::{EvalCtx, GenCtx, PopulateCtx};
use crate::data::{Array, Data, Iterator as DataIterator, MultiValue, ScalarVar};
use crate::policy::{ArithNodeKind, BinaryOp, LibCallKind, SpecialConst, UnaryOp};
use crate::rebuild;
use crate::rng::GenRng;
use crate::types::{arith_conv, integral_prom, needs_bool_conversion, IntTypeId};
use crate::value::{combine_ub, IrValue, UbKind};
use rand::Rng;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, trace};

/// A slot in the constant-reuse buffer shared across the whole program under
/// construction (spec §5 "shared state" #2).
#[derive(Debug, Clone)]
struct ConstSlot {
    value: IrValue,
}

/// The constant-reuse buffer (spec §4.F `ConstantExpr::create`). Open
/// Question 1 resolution: reuse (`reuse_const_prob`) only *reads* a slot;
/// replacement (`replace_in_buf_distr`) only *writes* one. The two draws are
/// independent, so drawing a replacement candidate that is never used cannot
/// silently corrupt a slot the way the original's pointer re-binding could.
pub struct ConstBuffer {
    slots: Vec<ConstSlot>,
    capacity: usize,
    next_write: usize,
}

impl ConstBuffer {
    pub fn new(capacity: usize) -> Self {
        ConstBuffer {
            slots: Vec::new(),
            capacity: capacity.max(1),
            next_write: 0,
        }
    }

    pub fn reuse(&self, rng: &mut GenRng) -> Option<IrValue> {
        if self.slots.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.slots.len() as i64) as usize;
        Some(self.slots[idx].value)
    }

    /// Writes `value` into the buffer, replacing the oldest slot once full
    /// (round-robin), per `replace_in_buf_distr`'s "configurable fraction of
    /// new constants replaces a slot" rule.
    pub fn maybe_replace(&mut self, value: IrValue) {
        if self.slots.len() < self.capacity {
            self.slots.push(ConstSlot { value });
        } else {
            self.slots[self.next_write] = ConstSlot { value };
            self.next_write = (self.next_write + 1) % self.capacity;
        }
    }
}

/// The expression tree (spec §3 "Expression IR").
pub enum ExprKind {
    Const(IrValue),
    ScalarVarUse(Rc<RefCell<ScalarVar>>),
    ArrayUse(Rc<RefCell<Array>>),
    IterUse(Rc<RefCell<DataIterator>>),
    TypeCast {
        child: Rc<Expr>,
        to: IntTypeId,
        explicit: bool,
    },
    Unary {
        op: UnaryOp,
        child: Rc<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    },
    Ternary {
        cond: Rc<Expr>,
        then_branch: Rc<Expr>,
        else_branch: Rc<Expr>,
    },
    /// `active_dim` is this node's axis, counted out from the `ArrayUse` leaf
    /// (0 = the axis adjacent to the array); `stencil_offset` is the
    /// constant displacement a stencil subscript adds to the evaluated
    /// index before bounds-checking (spec §4.J).
    Subscript {
        array: Rc<Expr>,
        index: Rc<Expr>,
        active_dim: usize,
        stencil_offset: i64,
    },
    Assignment {
        to: Rc<Expr>,
        from: Rc<Expr>,
        taken: bool,
    },
    LibCall {
        kind: LibCallKind,
        args: Vec<Rc<Expr>>,
    },
}

/// One expression node. Caches its propagated type and its last evaluated
/// value, per spec §3 "Each expression caches its last evaluated value."
pub struct Expr {
    pub kind: ExprKind,
    ty: Cell<Option<IntTypeId>>,
    cached_value: RefCell<Option<IrValue>>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Rc<Expr> {
        Rc::new(Expr {
            kind,
            ty: Cell::new(None),
            cached_value: RefCell::new(None),
        })
    }

    pub fn ty(&self) -> IntTypeId {
        self.ty
            .get()
            .expect("Expr::ty() called before propagate_type")
    }

    pub fn cached_value(&self) -> Option<IrValue> {
        *self.cached_value.borrow()
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Const(_) => "Const",
            ExprKind::ScalarVarUse(_) => "ScalarVarUse",
            ExprKind::ArrayUse(_) => "ArrayUse",
            ExprKind::IterUse(_) => "IterUse",
            ExprKind::TypeCast { .. } => "TypeCast",
            ExprKind::Unary { .. } => "Unary",
            ExprKind::Binary { .. } => "Binary",
            ExprKind::Ternary { .. } => "Ternary",
            ExprKind::Subscript { .. } => "Subscript",
            ExprKind::Assignment { .. } => "Assignment",
            ExprKind::LibCall { .. } => "LibCall",
        }
    }

    fn wrap_cast_if_needed(child: Rc<Expr>, target: IntTypeId) -> Rc<Expr> {
        if child.ty() == target {
            child
        } else {
            let cast = Expr::new(ExprKind::TypeCast {
                child,
                to: target,
                explicit: false,
            });
            cast.ty.set(Some(target));
            cast
        }
    }

    /// Inserts missing implicit casts per §4.B, bottom-up, idempotently.
    /// Must be called before [`Expr::evaluate`].
    pub fn propagate_type(self: &Rc<Expr>) -> Rc<Expr> {
        match &self.kind {
            ExprKind::Const(v) => {
                self.ty.set(Some(v.ty));
                self.clone()
            }
            ExprKind::ScalarVarUse(var) => {
                self.ty.set(Some(var.borrow().ty.int_type));
                self.clone()
            }
            ExprKind::ArrayUse(arr) => {
                self.ty.set(Some(arr.borrow().array_ty.base.int_type));
                self.clone()
            }
            ExprKind::IterUse(it) => {
                self.ty.set(Some(it.borrow().ty.int_type));
                self.clone()
            }
            ExprKind::TypeCast { child, to, explicit } => {
                let child = child.propagate_type();
                self.ty.set(Some(*to));
                if matches!(child.ty.get(), Some(t) if t == *to) {
                    // Child already produces the target type; keep this cast
                    // (it may be an explicit user-visible cast) but its child
                    // pointer is now the re-propagated one.
                }
                let node = Expr::new(ExprKind::TypeCast {
                    child,
                    to: *to,
                    explicit: *explicit,
                });
                node.ty.set(Some(*to));
                node
            }
            ExprKind::Unary { op, child } => {
                let child = child.propagate_type();
                let target = if *op == UnaryOp::LogicalNot {
                    IntTypeId::Bool
                } else {
                    integral_prom(child.ty())
                };
                let child = Expr::wrap_cast_if_needed(child, target);
                let result_ty = if *op == UnaryOp::LogicalNot {
                    IntTypeId::Bool
                } else {
                    target
                };
                let node = Expr::new(ExprKind::Unary { op: *op, child });
                node.ty.set(Some(result_ty));
                node
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = lhs.propagate_type();
                let rhs = rhs.propagate_type();
                let (lhs, rhs, result_ty) = match op {
                    BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                        let l = if needs_bool_conversion(lhs.ty()) {
                            Expr::wrap_cast_if_needed(lhs, IntTypeId::Bool)
                        } else {
                            lhs
                        };
                        let r = if needs_bool_conversion(rhs.ty()) {
                            Expr::wrap_cast_if_needed(rhs, IntTypeId::Bool)
                        } else {
                            rhs
                        };
                        (l, r, IntTypeId::Bool)
                    }
                    BinaryOp::Shl | BinaryOp::Shr => {
                        let l_target = integral_prom(lhs.ty());
                        let r_target = integral_prom(rhs.ty());
                        let l = Expr::wrap_cast_if_needed(lhs, l_target);
                        let r = Expr::wrap_cast_if_needed(rhs, r_target);
                        (l, r, l_target)
                    }
                    BinaryOp::Eq
                    | BinaryOp::Ne
                    | BinaryOp::Lt
                    | BinaryOp::Le
                    | BinaryOp::Gt
                    | BinaryOp::Ge => {
                        let common = arith_conv(lhs.ty(), rhs.ty());
                        let l = Expr::wrap_cast_if_needed(lhs, common);
                        let r = Expr::wrap_cast_if_needed(rhs, common);
                        (l, r, IntTypeId::Bool)
                    }
                    _ => {
                        let common = arith_conv(lhs.ty(), rhs.ty());
                        let l = Expr::wrap_cast_if_needed(lhs, common);
                        let r = Expr::wrap_cast_if_needed(rhs, common);
                        (l, r, common)
                    }
                };
                let node = Expr::new(ExprKind::Binary { op: *op, lhs, rhs });
                node.ty.set(Some(result_ty));
                node
            }
            ExprKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = cond.propagate_type();
                let cond = if needs_bool_conversion(cond.ty()) {
                    Expr::wrap_cast_if_needed(cond, IntTypeId::Bool)
                } else {
                    cond
                };
                let then_branch = then_branch.propagate_type();
                let else_branch = else_branch.propagate_type();
                let common = arith_conv(then_branch.ty(), else_branch.ty());
                let then_branch = Expr::wrap_cast_if_needed(then_branch, common);
                let else_branch = Expr::wrap_cast_if_needed(else_branch, common);
                let node = Expr::new(ExprKind::Ternary {
                    cond,
                    then_branch,
                    else_branch,
                });
                node.ty.set(Some(common));
                node
            }
            ExprKind::Subscript {
                array,
                index,
                active_dim,
                stencil_offset,
            } => {
                let array = array.propagate_type();
                let index = index.propagate_type();
                let index = Expr::wrap_cast_if_needed(index, integral_prom(index.ty()));
                let element_ty = array.ty();
                let node = Expr::new(ExprKind::Subscript {
                    array,
                    index,
                    active_dim: *active_dim,
                    stencil_offset: *stencil_offset,
                });
                node.ty.set(Some(element_ty));
                node
            }
            ExprKind::Assignment { to, from, taken } => {
                let to = to.propagate_type();
                let from = from.propagate_type();
                let target_ty = to.ty();
                let from = Expr::wrap_cast_if_needed(from, target_ty);
                let node = Expr::new(ExprKind::Assignment {
                    to,
                    from,
                    taken: *taken,
                });
                node.ty.set(Some(target_ty));
                node
            }
            ExprKind::LibCall { kind, args } => {
                let args: Vec<Rc<Expr>> = args.iter().map(|a| a.propagate_type()).collect();
                let result_ty = match kind {
                    LibCallKind::AnyCall | LibCallKind::AllCall | LibCallKind::NoneCall => {
                        IntTypeId::Bool
                    }
                    _ => args
                        .iter()
                        .map(|a| a.ty())
                        .reduce(arith_conv)
                        .unwrap_or(IntTypeId::Int),
                };
                let args = if matches!(
                    kind,
                    LibCallKind::AnyCall | LibCallKind::AllCall | LibCallKind::NoneCall
                ) {
                    args
                } else {
                    args.into_iter()
                        .map(|a| Expr::wrap_cast_if_needed(a, result_ty))
                        .collect()
                };
                let node = Expr::new(ExprKind::LibCall {
                    kind: *kind,
                    args,
                });
                node.ty.set(Some(result_ty));
                node
            }
        }
    }

    /// Abstractly interprets the node (spec §4.F #2). Reads named values from
    /// `ctx.input` when present, otherwise from the underlying `Data`'s
    /// current value. Caches and returns the result.
    pub fn evaluate(self: &Rc<Expr>, ctx: &EvalCtx) -> IrValue {
        let result = self.evaluate_uncached(ctx);
        *self.cached_value.borrow_mut() = Some(result);
        result
    }

    fn evaluate_uncached(self: &Rc<Expr>, ctx: &EvalCtx) -> IrValue {
        match &self.kind {
            ExprKind::Const(v) => *v,
            ExprKind::ScalarVarUse(var) => {
                let name = var.borrow().name.clone();
                if let Some(Data::ScalarVar(v)) = ctx.lookup(&name) {
                    v.borrow().cur_val
                } else {
                    var.borrow().cur_val
                }
            }
            ExprKind::ArrayUse(_) => {
                unreachable!("ArrayUse must only be evaluated as the base of a Subscript chain")
            }
            ExprKind::IterUse(it) => {
                let name = it.borrow().name.clone();
                if let Some(Data::ScalarVar(v)) = ctx.lookup(&name) {
                    v.borrow().cur_val
                } else {
                    // At generation time an iterator has no single "current"
                    // runtime value; its start bound stands in as the
                    // abstractly-interpreted representative value.
                    let start = it.borrow().start.clone();
                    start.evaluate(ctx)
                }
            }
            ExprKind::TypeCast { child, to, .. } => child.evaluate(ctx).cast(*to),
            ExprKind::Unary { op, child } => {
                let v = child.evaluate(ctx);
                match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Neg => v.neg(),
                    UnaryOp::BitNot => v.bit_not(),
                    UnaryOp::LogicalNot => v.logical_not(),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = lhs.evaluate(ctx);
                let r = rhs.evaluate(ctx);
                match op {
                    BinaryOp::Add => l.add(r),
                    BinaryOp::Sub => l.sub(r),
                    BinaryOp::Mul => l.mul(r),
                    BinaryOp::Div => l.div(r),
                    BinaryOp::Rem => l.rem(r),
                    BinaryOp::Shl => l.shl(r),
                    BinaryOp::Shr => l.shr(r),
                    BinaryOp::BitAnd => l.bit_and(r),
                    BinaryOp::BitOr => l.bit_or(r),
                    BinaryOp::BitXor => l.bit_xor(r),
                    BinaryOp::LogicalAnd => l.logical_and(r),
                    BinaryOp::LogicalOr => l.logical_or(r),
                    BinaryOp::Eq => l.eq(r),
                    BinaryOp::Ne => l.ne(r),
                    BinaryOp::Lt => l.lt(r),
                    BinaryOp::Le => l.le(r),
                    BinaryOp::Gt => l.gt(r),
                    BinaryOp::Ge => l.ge(r),
                }
            }
            ExprKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = cond.evaluate(ctx);
                let chosen = if c.is_true() {
                    then_branch.evaluate(ctx)
                } else {
                    else_branch.evaluate(ctx)
                };
                IrValue {
                    ub: combine_ub(c.ub, chosen.ub),
                    ..chosen
                }
            }
            ExprKind::Subscript { .. } => {
                let (array, offset, consumed, ub) = eval_subscript_chain(self, ctx);
                debug_assert_eq!(
                    consumed,
                    array.borrow().array_ty.rank(),
                    "Subscript chain did not cover every array dimension"
                );
                let scalar = array.borrow().cur_vals.at(offset as usize);
                IrValue {
                    ub: combine_ub(ub, scalar.ub),
                    ..scalar
                }
            }
            ExprKind::Assignment { to, from, taken } => {
                let value = from.evaluate(ctx);
                if *taken {
                    assign_to(to, value, ctx);
                }
                value
            }
            ExprKind::LibCall { kind, args } => evaluate_lib_call(*kind, args, ctx),
        }
    }

    /// Recurses into children, evaluates, and if the result carries UB,
    /// applies a node-specific repair and re-evaluates — repeating until the
    /// UB clears (spec §4.F #3, §4.I). Termination holds because every
    /// repair either removes the operator that could overflow/trap or moves
    /// an operand into a range where the same UB kind cannot recur.
    pub fn rebuild(self: &Rc<Expr>, ctx: &EvalCtx) -> Rc<Expr> {
        let rebuilt = self.rebuild_children(ctx);
        repair_loop(rebuilt, ctx)
    }

    fn rebuild_children(self: &Rc<Expr>, ctx: &EvalCtx) -> Rc<Expr> {
        match &self.kind {
            ExprKind::Const(_)
            | ExprKind::ScalarVarUse(_)
            | ExprKind::ArrayUse(_)
            | ExprKind::IterUse(_) => self.clone(),
            ExprKind::TypeCast { child, to, explicit } => {
                // TypeCast repair: "re-roll children" — rebuild the child
                // regardless of whether this node itself carries UB.
                let child = child.rebuild(ctx);
                let node = Expr::new(ExprKind::TypeCast {
                    child,
                    to: *to,
                    explicit: *explicit,
                });
                node.ty.set(Some(*to));
                node
            }
            ExprKind::Unary { op, child } => {
                let child = child.rebuild(ctx);
                let node = Expr::new(ExprKind::Unary { op: *op, child });
                node.ty.set(self.ty.get());
                node
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = lhs.rebuild(ctx);
                let rhs = rhs.rebuild(ctx);
                let node = Expr::new(ExprKind::Binary { op: *op, lhs, rhs });
                node.ty.set(self.ty.get());
                node
            }
            ExprKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = cond.rebuild(ctx);
                let then_branch = then_branch.rebuild(ctx);
                let else_branch = else_branch.rebuild(ctx);
                let node = Expr::new(ExprKind::Ternary {
                    cond,
                    then_branch,
                    else_branch,
                });
                node.ty.set(self.ty.get());
                node
            }
            ExprKind::Subscript {
                array,
                index,
                active_dim,
                stencil_offset,
            } => {
                let array = array.rebuild(ctx);
                let index = index.rebuild(ctx);
                let node = Expr::new(ExprKind::Subscript {
                    array,
                    index,
                    active_dim: *active_dim,
                    stencil_offset: *stencil_offset,
                });
                node.ty.set(self.ty.get());
                node
            }
            ExprKind::Assignment { to, from, taken } => {
                let from = from.rebuild(ctx);
                let node = Expr::new(ExprKind::Assignment {
                    to: to.clone(),
                    from,
                    taken: *taken,
                });
                node.ty.set(self.ty.get());
                node
            }
            ExprKind::LibCall { kind, args } => {
                let args = args.iter().map(|a| a.rebuild(ctx)).collect();
                let node = Expr::new(ExprKind::LibCall { kind: *kind, args });
                node.ty.set(self.ty.get());
                node
            }
        }
    }
}

/// Applies repairs to `node` (whose children are already UB-free) until its
/// own evaluated value is UB-free or no repair applies to its kind.
fn repair_loop(mut node: Rc<Expr>, ctx: &EvalCtx) -> Rc<Expr> {
    loop {
        let value = node.evaluate(ctx);
        if !value.ub.is_ub() {
            return node;
        }
        match repair_once(&node, value.ub, ctx) {
            Some(repaired) => {
                trace!(kind = node.kind_name(), ub = %value.ub, "applying UB repair");
                node = repaired;
            }
            None => {
                debug!(kind = node.kind_name(), ub = %value.ub, "no repair available, leaving UB in place");
                return node;
            }
        }
    }
}

fn repair_once(node: &Rc<Expr>, ub: UbKind, ctx: &EvalCtx) -> Option<Rc<Expr>> {
    match &node.kind {
        ExprKind::Unary { op, child } if *op == UnaryOp::Neg && ub == UbKind::SignOverflow => {
            let new_op = rebuild::repair_unary_neg(child.evaluate(ctx));
            let n = Expr::new(ExprKind::Unary {
                op: new_op,
                child: child.clone(),
            });
            n.ty.set(node.ty.get());
            Some(n)
        }
        ExprKind::Binary { op, lhs, rhs } => repair_binary(*op, lhs, rhs, ub, node.ty.get()),
        ExprKind::Subscript {
            array,
            index,
            active_dim,
            stencil_offset,
        } if ub == UbKind::OutOfBounds => {
            let dim_size = match subscript_root_array(array) {
                Some(a) => a.borrow().array_ty.dims[*active_dim] as i64,
                None => return None,
            };
            // The out-of-bounds index is `index + stencil_offset` (spec
            // §4.J), not the bare `index` — fold the offset into the
            // quantity being modded and zero it on the rebuilt node, or the
            // repair is a no-op and `repair_loop` never terminates.
            let n_const = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Long, dim_size as i128)));
            let offset_const = Expr::new(ExprKind::Const(IrValue::new(
                IntTypeId::Long,
                *stencil_offset as i128,
            )));
            let shifted = Expr::new(ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: index.clone(),
                rhs: offset_const,
            });
            let modded = Expr::new(ExprKind::Binary {
                op: BinaryOp::Rem,
                lhs: shifted,
                rhs: n_const.clone(),
            });
            let raised = Expr::new(ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: modded,
                rhs: n_const.clone(),
            });
            let wrapped = Expr::new(ExprKind::Binary {
                op: BinaryOp::Rem,
                lhs: raised,
                rhs: n_const,
            });
            wrapped.ty.set(Some(index.ty()));
            let n = Expr::new(ExprKind::Subscript {
                array: array.clone(),
                index: wrapped,
                active_dim: *active_dim,
                stencil_offset: 0,
            });
            n.ty.set(node.ty.get());
            Some(n)
        }
        _ => None,
    }
}

fn repair_binary(
    op: BinaryOp,
    lhs: &Rc<Expr>,
    rhs: &Rc<Expr>,
    ub: UbKind,
    ty: Option<IntTypeId>,
) -> Option<Rc<Expr>> {
    let new_op = match (op, ub) {
        (BinaryOp::Add, UbKind::SignOverflow) | (BinaryOp::Sub, UbKind::SignOverflow) => {
            rebuild::repair_additive(op)
        }
        (BinaryOp::Mul, UbKind::SignOverflowMin) => rebuild::repair_mul(true),
        (BinaryOp::Mul, UbKind::SignOverflow) => rebuild::repair_mul(false),
        (BinaryOp::Div, UbKind::ZeroDiv) | (BinaryOp::Rem, UbKind::ZeroDiv) => {
            rebuild::repair_div_or_rem(true)
        }
        (BinaryOp::Div, UbKind::SignOverflow) | (BinaryOp::Rem, UbKind::SignOverflow) => {
            rebuild::repair_div_or_rem(false)
        }
        (BinaryOp::Shl, UbKind::ShiftRhsLarge) | (BinaryOp::Shr, UbKind::ShiftRhsLarge) => {
            return Some(repair_shift_rhs_large(op, lhs, rhs, ty));
        }
        (BinaryOp::Shl, UbKind::ShiftRhsNeg) | (BinaryOp::Shr, UbKind::ShiftRhsNeg) => {
            return Some(repair_shift_rhs_neg(op, lhs, rhs, ty));
        }
        (BinaryOp::Shl, UbKind::NegShift) | (BinaryOp::Shr, UbKind::NegShift) => {
            return Some(repair_neg_shift(op, lhs, rhs, ty));
        }
        _ => return None,
    };
    let n = Expr::new(ExprKind::Binary {
        op: new_op,
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    });
    n.ty.set(ty);
    Some(n)
}

fn repair_shift_rhs_large(op: BinaryOp, lhs: &Rc<Expr>, rhs: &Rc<Expr>, ty: Option<IntTypeId>) -> Rc<Expr> {
    let lhs_ty = ty.unwrap_or(IntTypeId::Int);
    let empty = EvalCtx::empty();
    let lhs_val = lhs.evaluate(&empty);
    let rhs_val = rhs.evaluate(&empty);
    let msb = rebuild::highest_set_bit(lhs_val.value().max(0));
    let amount = rebuild::clamp_shift_rhs_large(
        rhs_val.value() as i64,
        lhs_ty,
        op == BinaryOp::Shl,
        msb,
    );
    let c = Expr::new(ExprKind::Const(IrValue::new(lhs_ty, amount as i128)));
    let new_rhs = Expr::new(ExprKind::Binary {
        op: BinaryOp::Sub,
        lhs: rhs.clone(),
        rhs: c,
    });
    new_rhs.ty.set(Some(rhs.ty()));
    let n = Expr::new(ExprKind::Binary {
        op,
        lhs: lhs.clone(),
        rhs: new_rhs,
    });
    n.ty.set(ty);
    n
}

fn repair_shift_rhs_neg(op: BinaryOp, lhs: &Rc<Expr>, rhs: &Rc<Expr>, ty: Option<IntTypeId>) -> Rc<Expr> {
    let rhs_ty = rhs.ty();
    let empty = EvalCtx::empty();
    let rhs_val = rhs.evaluate(&empty);
    let amount = rebuild::raise_shift_rhs_neg(rhs_val.value() as i64);
    let c = Expr::new(ExprKind::Const(IrValue::new(rhs_ty, amount as i128)));
    let new_rhs = Expr::new(ExprKind::Binary {
        op: BinaryOp::Add,
        lhs: rhs.clone(),
        rhs: c,
    });
    new_rhs.ty.set(Some(rhs_ty));
    let n = Expr::new(ExprKind::Binary {
        op,
        lhs: lhs.clone(),
        rhs: new_rhs,
    });
    n.ty.set(ty);
    n
}

fn repair_neg_shift(op: BinaryOp, lhs: &Rc<Expr>, rhs: &Rc<Expr>, ty: Option<IntTypeId>) -> Rc<Expr> {
    let lhs_ty = lhs.ty();
    let addend = rebuild::neg_shift_addend(lhs_ty);
    let c = Expr::new(ExprKind::Const(IrValue::new(lhs_ty, addend)));
    let new_lhs = Expr::new(ExprKind::Binary {
        op: BinaryOp::Add,
        lhs: lhs.clone(),
        rhs: c,
    });
    new_lhs.ty.set(Some(lhs_ty));
    let n = Expr::new(ExprKind::Binary {
        op,
        lhs: new_lhs,
        rhs: rhs.clone(),
    });
    n.ty.set(ty);
    n
}

/// Walks a `Subscript` chain down to its `ArrayUse` leaf without evaluating
/// anything, for repairs that only need a dimension's size (spec §4.F). Any
/// depth of nesting is legal since `create_subscript` builds one `Subscript`
/// node per array dimension.
fn subscript_root_array(expr: &Rc<Expr>) -> Option<Rc<RefCell<Array>>> {
    match &expr.kind {
        ExprKind::ArrayUse(array) => Some(array.clone()),
        ExprKind::Subscript { array, .. } => subscript_root_array(array),
        _ => None,
    }
}

/// Walks a `Subscript` chain down to its `ArrayUse` leaf, accumulating a
/// row-major flat offset. Returns `(array, flat_offset, dims_consumed, ub)`.
fn eval_subscript_chain(
    expr: &Rc<Expr>,
    ctx: &EvalCtx,
) -> (Rc<RefCell<Array>>, i64, usize, UbKind) {
    match &expr.kind {
        ExprKind::ArrayUse(array) => (array.clone(), 0, 0, UbKind::NoUB),
        ExprKind::Subscript {
            array,
            index,
            active_dim,
            stencil_offset,
        } => {
            let (arr, offset_so_far, consumed, ub_in) = eval_subscript_chain(array, ctx);
            let dim_size = arr.borrow().array_ty.dims[*active_dim] as i64;
            let idx_val = index.evaluate(ctx);
            let raw_idx = idx_val.value() as i64 + stencil_offset;
            let in_bounds = raw_idx >= 0 && raw_idx < dim_size;
            let mut ub = combine_ub(ub_in, idx_val.ub);
            if !ub.is_ub() && !in_bounds {
                ub = UbKind::OutOfBounds;
            }
            let wrapped_idx = ((raw_idx % dim_size) + dim_size) % dim_size;
            let new_offset = offset_so_far * dim_size + wrapped_idx;
            (arr, new_offset, consumed + 1, ub)
        }
        _ => unreachable!("Subscript chain must bottom out in an ArrayUse"),
    }
}

fn assign_to(target: &Rc<Expr>, value: IrValue, ctx: &EvalCtx) {
    match &target.kind {
        ExprKind::ScalarVarUse(var) => {
            var.borrow_mut().set_current_value(value);
        }
        ExprKind::IterUse(_) => {
            // Iterators are not reassigned through ordinary AssignmentExpr;
            // their state advances via LoopHead::populate instead.
        }
        ExprKind::Subscript { .. } => {
            let (array, offset, consumed, _ub) = eval_subscript_chain(target, ctx);
            debug_assert_eq!(consumed, array.borrow().array_ty.rank());
            let idx = offset as u32;
            array.borrow_mut().set_value(
                vec![(idx, idx + 1)],
                vec![1],
                MultiValue::single(value),
            );
        }
        other => unreachable!(
            "Assignment target must be ScalarVarUse, IterUse, or Subscript, got {}",
            other.kind_name()
        ),
    }
}

fn evaluate_lib_call(kind: LibCallKind, args: &[Rc<Expr>], ctx: &EvalCtx) -> IrValue {
    match kind {
        LibCallKind::MinCall | LibCallKind::MaxCall => {
            let vals: Vec<IrValue> = args.iter().map(|a| a.evaluate(ctx)).collect();
            let mut best = vals[0];
            for v in &vals[1..] {
                let pick = if kind == LibCallKind::MinCall {
                    v.value() < best.value()
                } else {
                    v.value() > best.value()
                };
                if pick {
                    best = *v;
                }
                best = IrValue {
                    ub: combine_ub(best.ub, v.ub),
                    ..best
                };
            }
            best
        }
        LibCallKind::SelectCall => {
            let cond = args[0].evaluate(ctx);
            let chosen = if cond.is_true() {
                args[1].evaluate(ctx)
            } else {
                args[2].evaluate(ctx)
            };
            IrValue {
                ub: combine_ub(cond.ub, chosen.ub),
                ..chosen
            }
        }
        LibCallKind::AnyCall | LibCallKind::AllCall | LibCallKind::NoneCall => {
            let cluster = arg_multivalue(&args[0], ctx);
            let truths: Vec<bool> = cluster.values.iter().map(|v| v.value() != 0).collect();
            let result = match kind {
                LibCallKind::AnyCall => truths.iter().any(|&t| t),
                LibCallKind::AllCall => truths.iter().all(|&t| t),
                LibCallKind::NoneCall => !truths.iter().any(|&t| t),
                _ => unreachable!(),
            };
            IrValue {
                ty: IntTypeId::Bool,
                abs: crate::value::AbsValue::from_i128(result as i128),
                ub: cluster.ub_code(),
            }
        }
        LibCallKind::ReduceMinCall | LibCallKind::ReduceMaxCall => {
            let cluster = arg_multivalue(&args[0], ctx);
            let mut best = cluster.values[0];
            for v in &cluster.values[1..] {
                let pick = if kind == LibCallKind::ReduceMinCall {
                    v.value() < best.value()
                } else {
                    v.value() > best.value()
                };
                if pick {
                    best = *v;
                }
            }
            IrValue {
                ub: combine_ub(best.ub, cluster.ub_code()),
                ..best
            }
        }
        LibCallKind::ReduceEqCall => {
            let cluster = arg_multivalue(&args[0], ctx);
            let first = cluster.values[0];
            let all_eq = cluster.values.iter().all(|v| v.value() == first.value());
            IrValue {
                ty: IntTypeId::Bool,
                abs: crate::value::AbsValue::from_i128(all_eq as i128),
                ub: cluster.ub_code(),
            }
        }
        LibCallKind::ExtractCall => {
            let cluster = arg_multivalue(&args[0], ctx);
            let idx_val = args[1].evaluate(ctx);
            let idx = (idx_val.value().rem_euclid(cluster.values.len() as i128)) as usize;
            let v = cluster.at(idx);
            IrValue {
                ub: combine_ub(v.ub, idx_val.ub),
                ..v
            }
        }
    }
}

/// Reads the full multi-value cluster an `ArrayUse`/`Subscript`-rooted
/// argument refers to (used by masked reduce/select library calls).
fn arg_multivalue(expr: &Rc<Expr>, ctx: &EvalCtx) -> MultiValue {
    match &expr.kind {
        ExprKind::ArrayUse(array) => array.borrow().cur_vals.clone(),
        ExprKind::Subscript { .. } => {
            let (array, _offset, _consumed, _ub) = eval_subscript_chain(expr, ctx);
            array.borrow().cur_vals.clone()
        }
        _ => MultiValue::single(expr.evaluate(ctx)),
    }
}

/// Picks a node kind from `ctx.policy().arith_node_distr` (or the leaf-only
/// distribution at `arith_depth == max_arith_depth`), per spec §4.F
/// `ArithmeticExpr::create`. Exhausted choice (every weight zero even after
/// the leaf bump) falls back to `Const`, never an error (spec §7.3).
pub fn choose_arith_node_kind(pop_ctx: &PopulateCtx, rng: &mut GenRng) -> ArithNodeKind {
    let policy = pop_ctx.policy();
    let distr = if pop_ctx.arith_depth >= policy.max_arith_depth {
        policy.leaf_arith_node_distr()
    } else {
        policy.arith_node_distr.clone()
    };
    distr.sample(rng).unwrap_or(ArithNodeKind::Const)
}

/// `ConstantExpr::create` (spec §4.F): consults the constant-reuse buffer,
/// otherwise draws a type and either a special or uniform-random value, then
/// optionally applies a small offset and/or replaces a buffer slot.
pub fn create_const(gen_ctx: &GenCtx, policy_ctx: &PopulateCtx, rng: &mut GenRng) -> Rc<Expr> {
    let policy = policy_ctx.policy();
    if rng.gen_bool(policy.reuse_const_prob) {
        if let Some(v) = gen_ctx.const_buffer.borrow().reuse(rng) {
            return Expr::new(ExprKind::Const(v));
        }
    }

    let int_type = policy.int_type_distr.sample(rng).unwrap_or(IntTypeId::Int);
    let special_distr = policy.narrowed_to_const_use(rng);
    let mut value = if rng.gen_bool(policy.use_special_const_distr) {
        match special_distr.sample(rng).unwrap_or(SpecialConst::Zero) {
            SpecialConst::Zero => IrValue::zero(int_type),
            SpecialConst::Min => IrValue::min_of(int_type),
            SpecialConst::Max => IrValue::max_of(int_type),
            SpecialConst::BitBlock => IrValue::new(int_type, 0x0F0F_0F0F_i128 & int_type.max_value()),
            SpecialConst::EndBits => IrValue::new(int_type, 1i128 | (1i128 << (int_type.storage_bits() - 1))),
        }
    } else {
        let magnitude = rng.gen_range(0..=int_type.max_value().min(i64::MAX as i128) as i64);
        IrValue::new(int_type, magnitude as i128)
    };

    if rng.gen_bool(policy.use_const_offset_distr) {
        if let Some(offset_mag) = policy.const_offset_distr.sample(rng) {
            let signed_offset = if rng.gen_bool(policy.pos_const_offset_distr) {
                offset_mag
            } else {
                -offset_mag
            };
            value = value.add(IrValue::new(int_type, signed_offset as i128));
        }
    }

    if !policy_ctx.inside_mutation && rng.gen_bool(policy.replace_in_buf_distr) {
        gen_ctx.const_buffer.borrow_mut().maybe_replace(value);
    }

    Expr::new(ExprKind::Const(value))
}

/// Interned scalar variable use (spec §3 "interned by underlying Data
/// identity").
pub fn create_scalar_var_use(gen_ctx: &GenCtx, var: Rc<RefCell<ScalarVar>>) -> Rc<Expr> {
    let identity = Rc::as_ptr(&var) as usize;
    gen_ctx.intern_use(identity, || Expr::new(ExprKind::ScalarVarUse(var.clone())))
}

pub fn create_array_use(gen_ctx: &GenCtx, array: Rc<RefCell<Array>>) -> Rc<Expr> {
    let identity = Rc::as_ptr(&array) as usize;
    gen_ctx.intern_use(identity, || Expr::new(ExprKind::ArrayUse(array.clone())))
}

pub fn create_iter_use(gen_ctx: &GenCtx, iter: Rc<RefCell<DataIterator>>) -> Rc<Expr> {
    let identity = Rc::as_ptr(&iter) as usize;
    gen_ctx.intern_use(identity, || Expr::new(ExprKind::IterUse(iter.clone())))
}

/// `SubscriptExpr::create` (spec §4.F): picks an array whose every dimension
/// is ≥ the current `dims` vector, builds one `Subscript` per dimension.
/// Inside a stencil, consults the installed `ArrayStencilParams` for each
/// axis. Falls back to `ScalarVarUse`-shaped behavior (a plain `Const`) if no
/// array fits (spec §7.3 exhausted choice).
pub fn create_subscript(
    gen_ctx: &GenCtx,
    pop_ctx: &PopulateCtx,
    array: Rc<RefCell<Array>>,
    iterators: &[Rc<RefCell<DataIterator>>],
    rng: &mut GenRng,
) -> Rc<Expr> {
    let rank = array.borrow().array_ty.rank();
    let array_identity = Rc::as_ptr(&array) as usize;
    let stencil_dims = pop_ctx
        .local_table
        .stencil_params_for(array_identity)
        .map(|p| p.dims.clone());

    let mut node = create_array_use(gen_ctx, array.clone());
    for dim in 0..rank {
        let (offset, index_expr) = if let Some(dims) = &stencil_dims {
            let dim_params = dims[dim];
            if dim_params.active {
                let iter_expr = iterators
                    .get(dim)
                    .cloned()
                    .map(|it| create_iter_use(gen_ctx, it));
                let index_expr =
                    iter_expr.unwrap_or_else(|| Expr::new(ExprKind::Const(IrValue::zero(IntTypeId::Int))));
                (dim_params.offset, index_expr)
            } else {
                (0, create_const(gen_ctx, pop_ctx, rng))
            }
        } else {
            let index_expr = iterators
                .get(dim)
                .cloned()
                .map(|it| create_iter_use(gen_ctx, it))
                .unwrap_or_else(|| create_const(gen_ctx, pop_ctx, rng));
            (0, index_expr)
        };
        node = Expr::new(ExprKind::Subscript {
            array: node,
            index: index_expr,
            active_dim: dim,
            stencil_offset: offset,
        });
    }
    node
}

pub fn create_unary(op: UnaryOp, child: Rc<Expr>) -> Rc<Expr> {
    Expr::new(ExprKind::Unary { op, child })
}

pub fn create_binary(op: BinaryOp, lhs: Rc<Expr>, rhs: Rc<Expr>) -> Rc<Expr> {
    Expr::new(ExprKind::Binary { op, lhs, rhs })
}

pub fn create_ternary(cond: Rc<Expr>, then_branch: Rc<Expr>, else_branch: Rc<Expr>) -> Rc<Expr> {
    Expr::new(ExprKind::Ternary {
        cond,
        then_branch,
        else_branch,
    })
}

pub fn create_assignment(to: Rc<Expr>, from: Rc<Expr>, taken: bool) -> Rc<Expr> {
    Expr::new(ExprKind::Assignment { to, from, taken })
}

pub fn create_lib_call(kind: LibCallKind, args: Vec<Rc<Expr>>) -> Rc<Expr> {
    Expr::new(ExprKind::LibCall { kind, args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn make_ctx() -> (GenCtx, PopulateCtx, GenRng) {
        use crate::symtab::SymbolTable;
        let policy = Rc::new(crate::policy::GenPolicy::default());
        let gen_ctx = GenCtx::new(policy);
        let input = Rc::new(RefCell::new(SymbolTable::new()));
        let output = Rc::new(RefCell::new(SymbolTable::new()));
        let pop_ctx = PopulateCtx::new(gen_ctx.clone(), input, output);
        (gen_ctx, pop_ctx, GenRng::new(1))
    }

    #[test]
    fn propagate_type_is_idempotent() {
        let (_gen_ctx, _pop_ctx, _rng) = make_ctx();
        let a = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Char, 3)));
        let b = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Int, 4)));
        let add = create_binary(BinaryOp::Add, a, b);
        let once = add.propagate_type();
        let twice = once.propagate_type();
        assert_eq!(once.ty(), twice.ty());
        assert_eq!(once.ty(), IntTypeId::Int);
    }

    #[test]
    fn sub_int_operands_are_promoted() {
        let a = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Char, 1)));
        let b = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Char, 2)));
        let add = create_binary(BinaryOp::Add, a, b).propagate_type();
        assert_eq!(add.ty(), IntTypeId::Int);
        let empty = EvalCtx::empty();
        assert_eq!(add.evaluate(&empty).value(), 3);
    }

    #[test]
    fn int_min_times_neg_one_rebuilds_to_subtraction() {
        let min = Expr::new(ExprKind::Const(IrValue::min_of(IntTypeId::Int)));
        let neg_one = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Int, -1)));
        let mul = create_binary(BinaryOp::Mul, min, neg_one).propagate_type();
        let empty = EvalCtx::empty();
        assert_eq!(mul.evaluate(&empty).ub, UbKind::SignOverflowMin);
        let repaired = mul.rebuild(&empty);
        assert_eq!(repaired.evaluate(&empty).ub, UbKind::NoUB);
        match &repaired.kind {
            ExprKind::Binary { op, .. } => assert_eq!(*op, BinaryOp::Sub),
            _ => panic!("expected a Binary node"),
        }
    }

    #[test]
    fn shift_by_width_rebuilds_to_width_minus_one() {
        let max = Expr::new(ExprKind::Const(IrValue::max_of(IntTypeId::Int)));
        let forty = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Int, 40)));
        let shl = create_binary(BinaryOp::Shl, max, forty).propagate_type();
        let empty = EvalCtx::empty();
        assert_eq!(shl.evaluate(&empty).ub, UbKind::ShiftRhsLarge);
        let repaired = shl.rebuild(&empty);
        assert_eq!(repaired.evaluate(&empty).ub, UbKind::NoUB);
    }

    #[test]
    fn scalar_var_use_is_interned_by_identity() {
        let (gen_ctx, _pop_ctx, _rng) = make_ctx();
        let var = Rc::new(RefCell::new(ScalarVar::new(
            "x".into(),
            Type::plain(IntTypeId::Int),
            IrValue::zero(IntTypeId::Int),
            true,
        )));
        let a = create_scalar_var_use(&gen_ctx, var.clone());
        let b = create_scalar_var_use(&gen_ctx, var);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn out_of_bounds_subscript_rebuilds_in_range() {
        use crate::data::ArrayType;
        let array_ty = ArrayType {
            base: Type::plain(IntTypeId::Int),
            dims: vec![4],
        };
        let init = MultiValue::single(IrValue::new(IntTypeId::Int, 9));
        let array = Rc::new(RefCell::new(Array::new("a".into(), array_ty, init, true)));
        let array_use = Expr::new(ExprKind::ArrayUse(array));
        let bad_index = Expr::new(ExprKind::Const(IrValue::new(IntTypeId::Int, -1)));
        let sub = Expr::new(ExprKind::Subscript {
            array: array_use,
            index: bad_index,
            active_dim: 0,
            stencil_offset: 0,
        });
        sub.ty.set(Some(IntTypeId::Int));
        let empty = EvalCtx::empty();
        assert_eq!(sub.evaluate(&empty).ub, UbKind::OutOfBounds);
        let repaired = sub.rebuild(&empty);
        assert_eq!(repaired.evaluate(&empty).ub, UbKind::NoUB);
        assert_eq!(repaired.evaluate(&empty).value(), 9);
    }
}
