//! PRNG with two independent streams, per spec §5: a *primary* stream that
//! drives the deterministic main generation path, and a *mutation* stream
//! probed from inside mutation regions without perturbing the primary
//! stream's sequence of draws.
//!
//! Grounded on the teacher's already-declared `rand`/`rand_chacha`
//! dependencies (previously used only for a stray `rand::random()` call) and
//! on the pack's general `ChaChaXRng::seed_from_u64` seeding idiom
//! (`examples/navicore-cem3`'s runtime crates construct their RNGs the same
//! way for deterministic nonces).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Derives the mutation stream's seed from the primary seed so that the
/// whole generator still only needs one `u64` input, while keeping the two
/// streams independent (distinct fixed-point multiplier, not a shared
/// counter).
fn mutation_seed(primary_seed: u64) -> u64 {
    primary_seed ^ 0x9E37_79B9_7F4A_7C15
}

/// The generator-wide PRNG. `primary` drives every ordinary draw; `mutation`
/// is only ever touched from inside [`GenRng::with_mutation_stream`].
pub struct GenRng {
    primary: ChaCha8Rng,
    mutation: ChaCha8Rng,
}

impl GenRng {
    pub fn new(seed: u64) -> Self {
        GenRng {
            primary: ChaCha8Rng::seed_from_u64(seed),
            mutation: ChaCha8Rng::seed_from_u64(mutation_seed(seed)),
        }
    }

    /// Runs `f` against the mutation stream without disturbing the primary
    /// stream (`switchMutationStates`, spec §5: save/switch/draw/switch
    /// back/restore). Since the two streams are fully independent
    /// `ChaCha8Rng` instances rather than a single swapped cursor, "switching
    /// back" is implicit: the primary stream was never touched.
    pub fn with_mutation_stream<T>(&mut self, f: impl FnOnce(&mut ChaCha8Rng) -> T) -> T {
        f(&mut self.mutation)
    }

    /// Swaps the primary and mutation streams for the duration of `f`, so
    /// code that only knows how to draw through the ordinary `GenRng` API
    /// (e.g. regrowing an expression subtree) pulls from the mutation stream
    /// instead, then swaps back (`switchMutationStates`, spec §5's
    /// save/switch/draw/switch-back contract) — the primary stream's future
    /// draws are unaffected.
    pub fn with_mutation_stream_as_primary<T>(&mut self, f: impl FnOnce(&mut GenRng) -> T) -> T {
        std::mem::swap(&mut self.primary, &mut self.mutation);
        let result = f(self);
        std::mem::swap(&mut self.primary, &mut self.mutation);
        result
    }

    pub fn gen_range(&mut self, range: std::ops::Range<i64>) -> i64 {
        self.primary.gen_range(range)
    }

    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.primary.gen_bool(p.clamp(0.0, 1.0))
    }
}

impl rand::RngCore for GenRng {
    fn next_u32(&mut self) -> u32 {
        self.primary.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.primary.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.primary.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.primary.try_fill_bytes(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_yields_identical_primary_draws() {
        let mut a = GenRng::new(7);
        let mut b = GenRng::new(7);
        for _ in 0..32 {
            assert_eq!(a.gen_range(0..1000), b.gen_range(0..1000));
        }
    }

    #[test]
    fn mutation_stream_does_not_perturb_primary_sequence() {
        let mut baseline = GenRng::new(99);
        let baseline_draws: Vec<i64> = (0..16).map(|_| baseline.gen_range(0..1_000_000)).collect();

        let mut probed = GenRng::new(99);
        let mut draws = Vec::new();
        for i in 0..16 {
            if i % 3 == 0 {
                probed.with_mutation_stream(|m| m.gen_range(0..1_000_000));
            }
            draws.push(probed.gen_range(0..1_000_000));
        }
        assert_eq!(baseline_draws, draws);
    }

    #[test]
    fn different_seeds_usually_diverge() {
        let mut a = GenRng::new(1);
        let mut b = GenRng::new(2);
        let seq_a: Vec<i64> = (0..8).map(|_| a.gen_range(0..1_000_000)).collect();
        let seq_b: Vec<i64> = (0..8).map(|_| b.gen_range(0..1_000_000)).collect();
        assert_ne!(seq_a, seq_b);
    }
}
