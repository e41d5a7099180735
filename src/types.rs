//! Integer type system: the closed set of C/C++ integer types, their
//! signedness/width/rank, CV-qualification, and the promotion / usual
//! arithmetic conversion rules that feed [`crate::expr::Expr::propagate_type`].

use serde::{Deserialize, Serialize};

/// The closed set of integer type ids this generator knows about.
///
/// Bit sizes follow the common LP64 model: `int` is 32 bits, `long` and
/// `long long` are both 64 bits (they differ only in literal suffix and, on
/// some ABIs, rank — which this generator does not need to distinguish
/// further since no two same-width, same-signedness types coexist here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntTypeId {
    Bool,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LLong,
    ULLong,
}

impl IntTypeId {
    /// All type ids, in ascending rank order.
    pub const ALL: [IntTypeId; 11] = [
        IntTypeId::Bool,
        IntTypeId::Char,
        IntTypeId::UChar,
        IntTypeId::Short,
        IntTypeId::UShort,
        IntTypeId::Int,
        IntTypeId::UInt,
        IntTypeId::Long,
        IntTypeId::ULong,
        IntTypeId::LLong,
        IntTypeId::ULLong,
    ];

    /// The C identifier for this type, as it would be spelled in emitted source.
    pub fn name(self) -> &'static str {
        match self {
            IntTypeId::Bool => "bool",
            IntTypeId::Char => "signed char",
            IntTypeId::UChar => "unsigned char",
            IntTypeId::Short => "short",
            IntTypeId::UShort => "unsigned short",
            IntTypeId::Int => "int",
            IntTypeId::UInt => "unsigned int",
            IntTypeId::Long => "long",
            IntTypeId::ULong => "unsigned long",
            IntTypeId::LLong => "long long",
            IntTypeId::ULLong => "unsigned long long",
        }
    }

    /// The C literal suffix used for constants of this type (`""` when none).
    pub fn literal_suffix(self) -> &'static str {
        match self {
            IntTypeId::Bool
            | IntTypeId::Char
            | IntTypeId::UChar
            | IntTypeId::Short
            | IntTypeId::UShort
            | IntTypeId::Int => "",
            IntTypeId::UInt => "U",
            IntTypeId::Long => "L",
            IntTypeId::ULong => "UL",
            IntTypeId::LLong => "LL",
            IntTypeId::ULLong => "ULL",
        }
    }

    /// Bit width of the type.
    pub fn bit_size(self) -> u32 {
        match self {
            IntTypeId::Bool => 1,
            IntTypeId::Char | IntTypeId::UChar => 8,
            IntTypeId::Short | IntTypeId::UShort => 16,
            IntTypeId::Int | IntTypeId::UInt => 32,
            IntTypeId::Long
            | IntTypeId::ULong
            | IntTypeId::LLong
            | IntTypeId::ULLong => 64,
        }
    }

    /// Storage width used by arithmetic (bool still occupies a byte).
    pub fn storage_bits(self) -> u32 {
        self.bit_size().max(8)
    }

    /// Whether this type is signed.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntTypeId::Char
                | IntTypeId::Short
                | IntTypeId::Int
                | IntTypeId::Long
                | IntTypeId::LLong
        )
    }

    /// Smallest representable value, as a signed 128-bit integer (wide enough
    /// for every type id's range including `ULLong`'s upper bound).
    pub fn min_value(self) -> i128 {
        if self == IntTypeId::Bool {
            0
        } else if self.is_signed() {
            -(1i128 << (self.bit_size() - 1))
        } else {
            0
        }
    }

    /// Largest representable value.
    pub fn max_value(self) -> i128 {
        if self == IntTypeId::Bool {
            1
        } else if self.is_signed() {
            (1i128 << (self.bit_size() - 1)) - 1
        } else {
            (1i128 << self.bit_size()) - 1
        }
    }

    /// Integer promotion / usual-arithmetic-conversion rank. Equal rank is
    /// possible only for types of identical width (signed vs. unsigned of the
    /// same width), which [`arith_conv`] disambiguates separately.
    pub fn rank(self) -> u32 {
        match self {
            IntTypeId::Bool => 0,
            IntTypeId::Char | IntTypeId::UChar => 1,
            IntTypeId::Short | IntTypeId::UShort => 2,
            IntTypeId::Int | IntTypeId::UInt => 3,
            IntTypeId::Long | IntTypeId::ULong => 4,
            IntTypeId::LLong | IntTypeId::ULLong => 5,
        }
    }

    /// Whether `self` can represent every value representable by `other`.
    pub fn can_represent(self, other: IntTypeId) -> bool {
        self.min_value() <= other.min_value() && self.max_value() >= other.max_value()
    }

    /// The unsigned counterpart of a signed type (identity if already unsigned).
    pub fn to_unsigned(self) -> IntTypeId {
        match self {
            IntTypeId::Char => IntTypeId::UChar,
            IntTypeId::Short => IntTypeId::UShort,
            IntTypeId::Int => IntTypeId::UInt,
            IntTypeId::Long => IntTypeId::ULong,
            IntTypeId::LLong => IntTypeId::ULLong,
            other => other,
        }
    }

    /// Whether `self` has rank < `int` (i.e. is subject to integer promotion).
    pub fn is_sub_int_rank(self) -> bool {
        self.rank() < IntTypeId::Int.rank()
    }
}

/// CV-qualification of a type, as tracked for declarations (this generator
/// does not currently emit `const`/`volatile` reads that would change
/// evaluation, but the flag is threaded through per the data model so an
/// emitter can render qualifiers faithfully).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CvQual {
    #[default]
    None,
    Const,
    Volatile,
    ConstVolatile,
}

/// A fully-qualified type: integer type id, CV-qualification, storage class,
/// and ISPC-style uniform/varying tag (always `true` outside ISPC mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Type {
    pub int_type: IntTypeId,
    pub cv: CvQual,
    pub is_static: bool,
    pub is_uniform: bool,
}

impl Type {
    /// A plain, unqualified, non-static, uniform type.
    pub fn plain(int_type: IntTypeId) -> Self {
        Type {
            int_type,
            cv: CvQual::None,
            is_static: false,
            is_uniform: true,
        }
    }

    pub fn with_uniform(mut self, is_uniform: bool) -> Self {
        self.is_uniform = is_uniform;
        self
    }

    pub fn with_cv(mut self, cv: CvQual) -> Self {
        self.cv = cv;
        self
    }
}

/// Integer promotion (`integralProm`, spec §4.B): types with rank below `int`
/// are promoted to `int`, or to `unsigned int` only if `int` cannot represent
/// every value of the source type (this only matters for exotic width
/// models; with this generator's fixed widths it never fires, but the rule is
/// implemented in full for fidelity).
pub fn integral_prom(t: IntTypeId) -> IntTypeId {
    if t.is_sub_int_rank() {
        if IntTypeId::Int.can_represent(t) {
            IntTypeId::Int
        } else {
            IntTypeId::UInt
        }
    } else {
        t
    }
}

/// Whether a cast to `BOOL` is needed (`convToBool`, spec §4.B).
pub fn needs_bool_conversion(t: IntTypeId) -> bool {
    t != IntTypeId::Bool
}

/// Usual arithmetic conversions (`arithConv`, spec §4.B): returns the common
/// type two operands of types `a` and `b` are converted to before a binary
/// arithmetic/comparison operator is applied.
pub fn arith_conv(a: IntTypeId, b: IntTypeId) -> IntTypeId {
    let a = integral_prom(a);
    let b = integral_prom(b);

    if a == b {
        return a;
    }

    let a_signed = a.is_signed();
    let b_signed = b.is_signed();

    if a_signed == b_signed {
        return if a.rank() >= b.rank() { a } else { b };
    }

    let (signed, unsigned) = if a_signed { (a, b) } else { (b, a) };

    if unsigned.rank() >= signed.rank() {
        return unsigned;
    }
    if signed.can_represent(unsigned) {
        return signed;
    }
    signed.to_unsigned()
}

/// ISPC-style varying promotion: if exactly one of `a_uniform`/`b_uniform` is
/// `true`, the uniform operand is conceptually widened to varying. Outside
/// ISPC mode every type is uniform, so this is a no-op.
pub fn varying_prom(a_uniform: bool, b_uniform: bool) -> bool {
    a_uniform && b_uniform
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_orders_widths() {
        assert!(IntTypeId::Char.rank() < IntTypeId::Short.rank());
        assert!(IntTypeId::Short.rank() < IntTypeId::Int.rank());
        assert!(IntTypeId::Int.rank() < IntTypeId::Long.rank());
        assert!(IntTypeId::Long.rank() < IntTypeId::LLong.rank());
    }

    #[test]
    fn can_represent_is_range_containment() {
        assert!(IntTypeId::Int.can_represent(IntTypeId::Short));
        assert!(!IntTypeId::Short.can_represent(IntTypeId::Int));
        assert!(IntTypeId::UInt.can_represent(IntTypeId::UShort));
        assert!(!IntTypeId::Int.can_represent(IntTypeId::UInt));
    }

    #[test]
    fn integral_promotion_widens_sub_int_types() {
        assert_eq!(integral_prom(IntTypeId::Char), IntTypeId::Int);
        assert_eq!(integral_prom(IntTypeId::UShort), IntTypeId::Int);
        assert_eq!(integral_prom(IntTypeId::Int), IntTypeId::Int);
        assert_eq!(integral_prom(IntTypeId::ULLong), IntTypeId::ULLong);
    }

    #[test]
    fn arith_conv_same_signedness_picks_larger() {
        assert_eq!(arith_conv(IntTypeId::Int, IntTypeId::Long), IntTypeId::Long);
        assert_eq!(
            arith_conv(IntTypeId::UInt, IntTypeId::ULLong),
            IntTypeId::ULLong
        );
    }

    #[test]
    fn arith_conv_equal_rank_opposite_sign_is_unsigned() {
        assert_eq!(arith_conv(IntTypeId::Int, IntTypeId::UInt), IntTypeId::UInt);
    }

    #[test]
    fn arith_conv_signed_can_represent_unsigned() {
        // long (64-bit signed) can represent every unsigned int (32-bit) value.
        assert_eq!(
            arith_conv(IntTypeId::Long, IntTypeId::UInt),
            IntTypeId::Long
        );
    }

    #[test]
    fn arith_conv_falls_back_to_unsigned_counterpart() {
        // long long and unsigned long long are same rank -> unsigned wins
        // directly via the equal-rank rule, never reaching the fallback.
        assert_eq!(
            arith_conv(IntTypeId::LLong, IntTypeId::ULLong),
            IntTypeId::ULLong
        );
    }

    #[test]
    fn bool_and_char_min_max() {
        assert_eq!(IntTypeId::Bool.min_value(), 0);
        assert_eq!(IntTypeId::Bool.max_value(), 1);
        assert_eq!(IntTypeId::Char.min_value(), -128);
        assert_eq!(IntTypeId::Char.max_value(), 127);
        assert_eq!(IntTypeId::UChar.max_value(), 255);
    }
}
