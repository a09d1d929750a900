// Seeded pseudo-random source for the voxel simulation.
//
// xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 state expansion.
// Terrain seeding, wander destination picks, and actor ID generation all draw
// from one `GameRng` owned by `SimState`, so a run is a pure function of its
// seed and command stream.
//
// See also: `types.rs` (`SimUuid::new_v4`), `surface.rs`
// (`SurfaceMap::random_traversable`).
//
// **Critical constraint: determinism.** The generator core is integer-only.
// Float helpers derive from the integer stream with a fixed bit budget.

use serde::{Deserialize, Serialize};

/// The simulation's random number generator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRng {
    s: [u64; 4],
}

impl GameRng {
    /// Seed a generator. Equal seeds give equal streams.
    pub fn new(seed: u64) -> Self {
        let mut state = seed;
        let mut s = [0u64; 4];
        for word in &mut s {
            *word = splitmix64(&mut state);
        }
        Self { s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let out = self.s[0]
            .wrapping_add(self.s[3])
            .rotate_left(23)
            .wrapping_add(self.s[0]);
        let shifted = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= shifted;
        self.s[3] = self.s[3].rotate_left(45);

        out
    }

    /// Upper half of the next `u64`.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in [0, 1) with 24 bits of mantissa.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// 16 random bytes, for UUID generation.
    pub fn next_128_bits(&mut self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.next_u64().to_le_bytes());
        out[8..].copy_from_slice(&self.next_u64().to_le_bytes());
        out
    }

    /// Uniform integer in `[0, bound)` without modulo bias. `bound` must be
    /// non-zero.
    pub fn below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0, "below: bound must be positive");
        if bound.is_power_of_two() {
            return self.next_u64() & (bound - 1);
        }
        let reject_under = bound.wrapping_neg() % bound;
        loop {
            let r = self.next_u64();
            if r >= reject_under {
                return r % bound;
            }
        }
    }

    /// Uniform index into a collection of `len` items. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.below(len as u64) as usize
    }

    /// A 32-bit seed for noise generators, derived from the stream.
    pub fn noise_seed(&mut self) -> u32 {
        self.next_u32()
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
