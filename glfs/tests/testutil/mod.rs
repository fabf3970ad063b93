//! Deterministic byte generation shared by the scenario and property
//! suites (SPEC_FULL.md §8.3: "a seeded-PRNG byte generator").

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `len` bytes from a `ChaCha8Rng` seeded with `seed`. Same `(seed, len)`
/// always produces the same bytes, so scenario tests can assert against a
/// fixed blob without checking it in.
pub fn prng_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}
