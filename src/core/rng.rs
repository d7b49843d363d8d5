//! Seeded randomness for simulations.
//!
//! Every random choice a simulation makes must come from a generator seeded
//! by the session, never from the OS, so that a session's world can be
//! rebuilt from its seed and its action log.

use sha2::{Digest, Sha256};

/// Domain separator mixed into every session seed.
const SEED_DOMAIN: &[u8] = b"STACKLINE_SEED_V1";

/// Xorshift128+ generator.
///
/// ```
/// use stackline::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(42);
/// let mut b = DeterministicRng::new(42);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterministicRng {
    lo: u64,
    hi: u64,
}

impl DeterministicRng {
    /// Expand a 64-bit seed into generator state.
    pub fn new(seed: u64) -> Self {
        let mut cursor = seed;
        let lo = splitmix64(&mut cursor);
        let hi = splitmix64(&mut cursor);

        // All-zero state is a fixed point
        if (lo | hi) == 0 {
            return Self { lo: 1, hi: 1 };
        }
        Self { lo, hi }
    }

    /// Next raw 64-bit output.
    pub fn next_u64(&mut self) -> u64 {
        let (a, mut b) = (self.lo, self.hi);
        let out = a.wrapping_add(b);

        b ^= a;
        self.lo = a.rotate_left(24) ^ b ^ (b << 16);
        self.hi = b.rotate_left(37);
        out
    }

    /// Uniform-ish index in `0..bound`. Returns 0 for an empty range.
    pub fn below(&mut self, bound: usize) -> usize {
        match bound {
            0 | 1 => 0,
            n => (self.next_u64() % n as u64) as usize,
        }
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}

fn splitmix64(cursor: &mut u64) -> u64 {
    *cursor = cursor.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *cursor;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed for a session's simulation: SHA-256 over the session id and the
/// player ids in seat order, first 8 bytes little-endian.
pub fn derive_session_seed(session_id: &[u8; 16], player_ids: &[[u8; 16]]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(SEED_DOMAIN);
    hasher.update(session_id);
    player_ids.iter().for_each(|id| hasher.update(id));

    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}
