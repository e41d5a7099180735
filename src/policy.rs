//! Generation policy: the bag of probability distributions and hard limits
//! that drive every random choice the populator makes (spec §4.E, §6).
//!
//! Structurally this is the teacher's `NeurlangConfig` (`src/config.rs`)
//! re-themed: the same `#[serde(default)]`-per-field shape, just carrying
//! generation knobs instead of project-manifest settings. File I/O lives in
//! `crate::config` so this module stays focused on the policy data itself.

use crate::types::IntTypeId;
use rand::distributions::WeightedIndex;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A weighted categorical distribution over values of `T`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distr<T> {
    pub options: Vec<(T, u32)>,
}

impl<T: Clone + PartialEq> Distr<T> {
    pub fn new(options: Vec<(T, u32)>) -> Self {
        Distr { options }
    }

    pub fn total_weight(&self) -> u32 {
        self.options.iter().map(|(_, w)| *w).sum()
    }

    /// Samples one option, weighted. Returns `None` if every weight is zero
    /// (an exhausted-choice condition per spec §7.3 — callers fall back to a
    /// simpler node rather than treating this as an error).
    pub fn sample(&self, rng: &mut impl Rng) -> Option<T> {
        if self.options.is_empty() || self.total_weight() == 0 {
            return None;
        }
        let weights: Vec<u32> = self.options.iter().map(|(_, w)| *w).collect();
        let idx = WeightedIndex::new(&weights).ok()?.sample(rng);
        Some(self.options[idx].0.clone())
    }

    /// Bumps every zero-weight option by `bump` (spec §4.F `leaves_prob_bump`
    /// "guarantee progress" rule).
    pub fn bump_zero_weights(&self, bump: u32) -> Distr<T> {
        let options = self
            .options
            .iter()
            .map(|(v, w)| (v.clone(), if *w == 0 { bump } else { *w }))
            .collect();
        Distr { options }
    }

    /// Keeps only the options matching `keep`, zero-weighting the rest
    /// (spec §4.F "at `arith_depth == max_arith_depth`, only leaf kinds
    /// remain").
    pub fn restrict(&self, keep: impl Fn(&T) -> bool) -> Distr<T> {
        let options = self
            .options
            .iter()
            .map(|(v, w)| (v.clone(), if keep(v) { *w } else { 0 }))
            .collect();
        Distr { options }
    }

    /// `chooseAndApplySimilarOp`/`chooseAndApplyConstUse` (spec §4.E): picks
    /// one option, then returns a clone of this distribution with that
    /// option's weight multiplied by `factor`, producing "clustered" usage.
    pub fn narrow_to_one(&self, rng: &mut impl Rng, factor: u32) -> Option<(T, Distr<T>)> {
        let chosen = self.sample(rng)?;
        let options = self
            .options
            .iter()
            .map(|(v, w)| {
                if *v == chosen {
                    (v.clone(), w.saturating_mul(factor.max(1)))
                } else {
                    (v.clone(), *w)
                }
            })
            .collect();
        Some((chosen, Distr { options }))
    }
}

/// Kinds of node `ArithmeticExpr::create` may choose among (spec §4.F, §4.E
/// `arith_node_distr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithNodeKind {
    Const,
    ScalarVarUse,
    Subscript,
    IterUse,
    Unary,
    Binary,
    Ternary,
    LibCall,
    Stencil,
}

impl ArithNodeKind {
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            ArithNodeKind::Const | ArithNodeKind::ScalarVarUse | ArithNodeKind::Subscript
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Neg,
    BitNot,
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LibCallKind {
    MinCall,
    MaxCall,
    SelectCall,
    AnyCall,
    AllCall,
    NoneCall,
    ReduceMinCall,
    ReduceMaxCall,
    ReduceEqCall,
    ExtractCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialConst {
    Zero,
    Min,
    Max,
    BitBlock,
    EndBits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstTransformKind {
    Identity,
    AddSmallOffset,
    Negate,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutKind {
    Scalar,
    Array,
}

/// Target language, affecting which library-call family is legal and
/// whether varying types appear (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageMode {
    C,
    Cxx,
    Ispc,
    Sycl,
}

/// Whether UB may survive in provably dead code (spec §6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowUbInDeadCode {
    None,
    Some,
    All,
}

impl AllowUbInDeadCode {
    /// Whether a dead region currently being populated is allowed to keep UB,
    /// given the policy's `ub_in_dc_prob` roll.
    pub fn permits(self, rolled_below_prob: bool) -> bool {
        match self {
            AllowUbInDeadCode::None => false,
            AllowUbInDeadCode::All => true,
            AllowUbInDeadCode::Some => rolled_below_prob,
        }
    }
}

/// The full bag of generation knobs (spec §4.E plus the §6 additions).
/// Every field has a default via [`GenPolicy::default`], so a `GenPolicy`
/// loaded from a partial TOML/JSON document fills in the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenPolicy {
    #[serde(default = "default_arith_node_distr")]
    pub arith_node_distr: Distr<ArithNodeKind>,
    #[serde(default = "default_int_type_distr")]
    pub int_type_distr: Distr<IntTypeId>,
    #[serde(default = "default_unary_op_distr")]
    pub unary_op_distr: Distr<UnaryOp>,
    #[serde(default = "default_binary_op_distr")]
    pub binary_op_distr: Distr<BinaryOp>,
    #[serde(default = "default_lib_call_distr")]
    pub c_lib_call_distr: Distr<LibCallKind>,
    #[serde(default = "default_lib_call_distr")]
    pub cxx_lib_call_distr: Distr<LibCallKind>,
    #[serde(default = "default_lib_call_distr")]
    pub ispc_lib_call_distr: Distr<LibCallKind>,

    #[serde(default = "default_reuse_const_prob")]
    pub reuse_const_prob: f64,
    #[serde(default = "default_small_prob")]
    pub use_const_transform_distr: f64,
    #[serde(default = "default_const_transform_distr")]
    pub const_transform_distr: Distr<ConstTransformKind>,
    #[serde(default = "default_small_prob")]
    pub use_special_const_distr: f64,
    #[serde(default = "default_special_const_distr")]
    pub special_const_distr: Distr<SpecialConst>,
    #[serde(default = "default_small_prob")]
    pub use_const_offset_distr: f64,
    #[serde(default = "default_const_offset_distr")]
    pub const_offset_distr: Distr<i64>,
    #[serde(default = "default_half_prob")]
    pub pos_const_offset_distr: f64,
    #[serde(default = "default_small_prob")]
    pub replace_in_buf_distr: f64,
    #[serde(default = "default_const_buf_size")]
    pub const_buf_size: usize,

    #[serde(default = "default_half_prob")]
    pub stencil_prob_weight_alternation: f64,
    #[serde(default = "default_arrs_in_stencil_distr")]
    pub arrs_in_stencil_distr: Distr<usize>,
    #[serde(default = "default_half_prob")]
    pub stencil_same_dims_one_arr_distr: f64,
    #[serde(default = "default_half_prob")]
    pub stencil_same_dims_all_distr: f64,
    #[serde(default = "default_half_prob")]
    pub stencil_reuse_offset_distr: f64,
    #[serde(default = "default_half_prob")]
    pub stencil_in_dim_prob: f64,

    #[serde(default = "default_small_prob")]
    pub apply_similar_op_distr: f64,
    #[serde(default = "default_small_prob")]
    pub apply_const_use_distr: f64,

    #[serde(default = "default_mutation_probability")]
    pub mutation_probability: f64,

    #[serde(default = "default_max_arith_depth")]
    pub max_arith_depth: u32,
    #[serde(default = "default_min_inp_vars_num")]
    pub min_inp_vars_num: u32,
    #[serde(default = "default_max_inp_vars_num")]
    pub max_inp_vars_num: u32,
    #[serde(default = "default_leaves_prob_bump")]
    pub leaves_prob_bump: u32,

    #[serde(default = "default_out_kind_distr")]
    pub out_kind_distr: Distr<OutKind>,

    #[serde(default = "default_small_prob")]
    pub ub_in_dc_prob: f64,

    #[serde(default = "default_language_mode")]
    pub language_mode: LanguageMode,
    #[serde(default = "default_allow_ub_in_dead_code")]
    pub allow_ub_in_dead_code: AllowUbInDeadCode,

    #[serde(default = "default_max_loop_depth")]
    pub max_loop_depth: u32,
    #[serde(default = "default_max_if_else_depth")]
    pub max_if_else_depth: u32,

    #[serde(default = "default_min_array_size")]
    pub min_array_size: u32,
    #[serde(default = "default_max_array_size")]
    pub max_array_size: u32,

    #[serde(default = "default_multi_value_cluster_size")]
    pub multi_value_cluster_size: usize,
}

fn default_arith_node_distr() -> Distr<ArithNodeKind> {
    Distr::new(vec![
        (ArithNodeKind::Const, 10),
        (ArithNodeKind::ScalarVarUse, 15),
        (ArithNodeKind::Subscript, 15),
        (ArithNodeKind::IterUse, 5),
        (ArithNodeKind::Unary, 10),
        (ArithNodeKind::Binary, 35),
        (ArithNodeKind::Ternary, 5),
        (ArithNodeKind::LibCall, 4),
        (ArithNodeKind::Stencil, 1),
    ])
}

fn default_int_type_distr() -> Distr<IntTypeId> {
    Distr::new(IntTypeId::ALL.iter().map(|&t| (t, 1)).collect())
}

fn default_unary_op_distr() -> Distr<UnaryOp> {
    Distr::new(vec![
        (UnaryOp::Plus, 1),
        (UnaryOp::Neg, 3),
        (UnaryOp::BitNot, 2),
        (UnaryOp::LogicalNot, 1),
    ])
}

fn default_binary_op_distr() -> Distr<BinaryOp> {
    Distr::new(vec![
        (BinaryOp::Add, 10),
        (BinaryOp::Sub, 10),
        (BinaryOp::Mul, 8),
        (BinaryOp::Div, 5),
        (BinaryOp::Rem, 5),
        (BinaryOp::Shl, 4),
        (BinaryOp::Shr, 4),
        (BinaryOp::BitAnd, 6),
        (BinaryOp::BitOr, 6),
        (BinaryOp::BitXor, 6),
        (BinaryOp::LogicalAnd, 4),
        (BinaryOp::LogicalOr, 4),
        (BinaryOp::Eq, 3),
        (BinaryOp::Ne, 3),
        (BinaryOp::Lt, 3),
        (BinaryOp::Le, 3),
        (BinaryOp::Gt, 3),
        (BinaryOp::Ge, 3),
    ])
}

fn default_lib_call_distr() -> Distr<LibCallKind> {
    Distr::new(vec![
        (LibCallKind::MinCall, 2),
        (LibCallKind::MaxCall, 2),
        (LibCallKind::SelectCall, 2),
        (LibCallKind::AnyCall, 1),
        (LibCallKind::AllCall, 1),
        (LibCallKind::NoneCall, 1),
        (LibCallKind::ReduceMinCall, 1),
        (LibCallKind::ReduceMaxCall, 1),
        (LibCallKind::ReduceEqCall, 1),
        (LibCallKind::ExtractCall, 1),
    ])
}

fn default_const_transform_distr() -> Distr<ConstTransformKind> {
    Distr::new(vec![
        (ConstTransformKind::Identity, 4),
        (ConstTransformKind::AddSmallOffset, 3),
        (ConstTransformKind::Negate, 2),
        (ConstTransformKind::BitNot, 1),
    ])
}

fn default_special_const_distr() -> Distr<SpecialConst> {
    Distr::new(vec![
        (SpecialConst::Zero, 4),
        (SpecialConst::Min, 2),
        (SpecialConst::Max, 2),
        (SpecialConst::BitBlock, 1),
        (SpecialConst::EndBits, 1),
    ])
}

fn default_const_offset_distr() -> Distr<i64> {
    Distr::new(vec![(1, 5), (2, 3), (3, 2), (4, 1), (8, 1)])
}

fn default_arrs_in_stencil_distr() -> Distr<usize> {
    Distr::new(vec![(1, 2), (2, 3), (3, 2), (4, 1)])
}

fn default_out_kind_distr() -> Distr<OutKind> {
    Distr::new(vec![(OutKind::Scalar, 2), (OutKind::Array, 1)])
}

fn default_reuse_const_prob() -> f64 {
    0.3
}
fn default_small_prob() -> f64 {
    0.15
}
fn default_half_prob() -> f64 {
    0.5
}
fn default_const_buf_size() -> usize {
    16
}
fn default_mutation_probability() -> f64 {
    0.1
}
fn default_max_arith_depth() -> u32 {
    6
}
fn default_min_inp_vars_num() -> u32 {
    2
}
fn default_max_inp_vars_num() -> u32 {
    6
}
fn default_leaves_prob_bump() -> u32 {
    10
}
fn default_language_mode() -> LanguageMode {
    LanguageMode::Cxx
}
fn default_allow_ub_in_dead_code() -> AllowUbInDeadCode {
    AllowUbInDeadCode::None
}
fn default_max_loop_depth() -> u32 {
    3
}
fn default_max_if_else_depth() -> u32 {
    3
}
fn default_min_array_size() -> u32 {
    4
}
fn default_max_array_size() -> u32 {
    32
}
fn default_multi_value_cluster_size() -> usize {
    4
}

impl Default for GenPolicy {
    fn default() -> Self {
        GenPolicy {
            arith_node_distr: default_arith_node_distr(),
            int_type_distr: default_int_type_distr(),
            unary_op_distr: default_unary_op_distr(),
            binary_op_distr: default_binary_op_distr(),
            c_lib_call_distr: default_lib_call_distr(),
            cxx_lib_call_distr: default_lib_call_distr(),
            ispc_lib_call_distr: default_lib_call_distr(),
            reuse_const_prob: default_reuse_const_prob(),
            use_const_transform_distr: default_small_prob(),
            const_transform_distr: default_const_transform_distr(),
            use_special_const_distr: default_small_prob(),
            special_const_distr: default_special_const_distr(),
            use_const_offset_distr: default_small_prob(),
            const_offset_distr: default_const_offset_distr(),
            pos_const_offset_distr: default_half_prob(),
            replace_in_buf_distr: default_small_prob(),
            const_buf_size: default_const_buf_size(),
            stencil_prob_weight_alternation: default_half_prob(),
            arrs_in_stencil_distr: default_arrs_in_stencil_distr(),
            stencil_same_dims_one_arr_distr: default_half_prob(),
            stencil_same_dims_all_distr: default_half_prob(),
            stencil_reuse_offset_distr: default_half_prob(),
            stencil_in_dim_prob: default_half_prob(),
            apply_similar_op_distr: default_small_prob(),
            apply_const_use_distr: default_small_prob(),
            mutation_probability: default_mutation_probability(),
            max_arith_depth: default_max_arith_depth(),
            min_inp_vars_num: default_min_inp_vars_num(),
            max_inp_vars_num: default_max_inp_vars_num(),
            leaves_prob_bump: default_leaves_prob_bump(),
            out_kind_distr: default_out_kind_distr(),
            ub_in_dc_prob: default_small_prob(),
            language_mode: default_language_mode(),
            allow_ub_in_dead_code: default_allow_ub_in_dead_code(),
            max_loop_depth: default_max_loop_depth(),
            max_if_else_depth: default_max_if_else_depth(),
            min_array_size: default_min_array_size(),
            max_array_size: default_max_array_size(),
            multi_value_cluster_size: default_multi_value_cluster_size(),
        }
    }
}

impl GenPolicy {
    /// The `arith_node_distr` restricted to leaf kinds, with zero weights
    /// bumped so a selection is always possible (spec §4.F, `arith_depth ==
    /// max_arith_depth`).
    pub fn leaf_arith_node_distr(&self) -> Distr<ArithNodeKind> {
        self.arith_node_distr
            .restrict(|k| k.is_leaf())
            .bump_zero_weights(self.leaves_prob_bump)
    }

    /// The library-call distribution legal for the current `language_mode`.
    pub fn lib_call_distr(&self) -> &Distr<LibCallKind> {
        match self.language_mode {
            LanguageMode::C => &self.c_lib_call_distr,
            LanguageMode::Cxx => &self.cxx_lib_call_distr,
            LanguageMode::Ispc | LanguageMode::Sycl => &self.ispc_lib_call_distr,
        }
    }

    /// `chooseAndApplySimilarOp` (spec §4.E): with probability
    /// `apply_similar_op_distr`, narrows `binary_op_distr` to favor one op.
    pub fn narrowed_to_similar_op(&self, rng: &mut impl Rng) -> Distr<BinaryOp> {
        if rng.gen_bool(self.apply_similar_op_distr.clamp(0.0, 1.0)) {
            if let Some((_, narrowed)) = self.binary_op_distr.narrow_to_one(rng, 4) {
                return narrowed;
            }
        }
        self.binary_op_distr.clone()
    }

    /// `chooseAndApplyConstUse` (spec §4.E): with probability
    /// `apply_const_use_distr`, narrows `special_const_distr` to favor one
    /// constant.
    pub fn narrowed_to_const_use(&self, rng: &mut impl Rng) -> Distr<SpecialConst> {
        if rng.gen_bool(self.apply_const_use_distr.clamp(0.0, 1.0)) {
            if let Some((_, narrowed)) = self.special_const_distr.narrow_to_one(rng, 4) {
                return narrowed;
            }
        }
        self.special_const_distr.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn default_policy_round_trips_through_toml() {
        let policy = GenPolicy::default();
        let toml_str = toml::to_string(&policy).expect("serialize");
        let parsed: GenPolicy = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.max_arith_depth, policy.max_arith_depth);
    }

    #[test]
    fn partial_toml_document_fills_in_defaults() {
        let parsed: GenPolicy = toml::from_str("max_arith_depth = 9\n").unwrap();
        assert_eq!(parsed.max_arith_depth, 9);
        assert_eq!(parsed.max_loop_depth, default_max_loop_depth());
    }

    #[test]
    fn leaf_arith_node_distr_only_has_leaf_kinds() {
        let policy = GenPolicy::default();
        let leaves = policy.leaf_arith_node_distr();
        for (kind, weight) in &leaves.options {
            if !kind.is_leaf() {
                assert_eq!(*weight, 0);
            } else {
                assert!(*weight > 0);
            }
        }
    }

    #[test]
    fn distr_sample_is_deterministic_given_seed() {
        let distr = default_binary_op_distr();
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        assert_eq!(distr.sample(&mut a), distr.sample(&mut b));
    }

    #[test]
    fn all_zero_weight_distribution_returns_none() {
        let distr: Distr<ArithNodeKind> = Distr::new(vec![(ArithNodeKind::Const, 0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(distr.sample(&mut rng).is_none());
    }

    #[test]
    fn allow_ub_in_dead_code_modes() {
        assert!(!AllowUbInDeadCode::None.permits(true));
        assert!(AllowUbInDeadCode::All.permits(false));
        assert!(AllowUbInDeadCode::Some.permits(true));
        assert!(!AllowUbInDeadCode::Some.permits(false));
    }
}
