//! [`Root`]: a ref plus enough metadata to randomly access a large blob
//! (§3, §4.3–§4.4).

use serde::{Deserialize, Serialize};

use crate::ref_::{Ref, REF_SIZE};

/// Default fan-out block size: 2 MiB (§6.2).
pub const DEFAULT_BLOCK_SIZE: u64 = 1 << 21;

/// A ref plus the plaintext `size` and fan-out `block_size` needed to
/// randomly address into it. JSON shape per §6.2:
/// `{"cid":"…","dek":"…","size":<u64>,"blockSize":<u64>}`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Root {
    #[serde(flatten)]
    pub r#ref: Ref,
    pub size: u64,
    #[serde(rename = "blockSize")]
    pub block_size: u64,
}

impl Root {
    pub fn new(r#ref: Ref, size: u64, block_size: u64) -> Self {
        Self {
            r#ref,
            size,
            block_size,
        }
    }

    /// `blockSize / RefSize` — fan-out of the index tree.
    pub fn branching_factor(&self) -> u64 {
        branching_factor(self.block_size)
    }

    /// `⌈log_bf(⌈size/blockSize⌉)⌉`, 0 when `size <= blockSize` (including
    /// `size == 0`).
    pub fn depth(&self) -> u32 {
        depth(self.size, self.block_size)
    }
}

pub fn branching_factor(block_size: u64) -> u64 {
    block_size / REF_SIZE as u64
}

pub fn depth(size: u64, block_size: u64) -> u32 {
    if size <= block_size {
        return 0;
    }
    let bf = branching_factor(block_size);
    let blocks = size.div_ceil(block_size);
    let mut capacity: u64 = 1;
    let mut d = 0u32;
    while capacity < blocks {
        capacity = capacity.saturating_mul(bf);
        d += 1;
    }
    d
}
