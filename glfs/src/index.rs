//! Fixed-slot packed array of refs inside a block (§4.2).

use bytes::{Bytes, BytesMut};

use crate::ref_::{Ref, REF_SIZE};
use crate::root::branching_factor;

/// A `block_size`-byte buffer partitioned into `branching_factor`
/// fixed-width 64-byte ref slots. A slot with an all-zero CID half
/// terminates iteration (sparse tail) — invariant 2: every index block is
/// exactly `block_size` bytes; unused slots are zero.
#[derive(Clone, Debug)]
pub struct IndexBlock {
    buf: BytesMut,
    branching_factor: usize,
}

impl IndexBlock {
    pub fn new(block_size: u64) -> Self {
        Self {
            buf: BytesMut::zeroed(block_size as usize),
            branching_factor: branching_factor(block_size) as usize,
        }
    }

    pub fn from_bytes(block_size: u64, bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), block_size as usize);
        let mut buf = BytesMut::zeroed(block_size as usize);
        buf.copy_from_slice(bytes);
        Self {
            buf,
            branching_factor: branching_factor(block_size) as usize,
        }
    }

    pub fn branching_factor(&self) -> usize {
        self.branching_factor
    }

    pub fn set(&mut self, slot: usize, r#ref: &Ref) {
        assert!(slot < self.branching_factor, "index slot out of range");
        let offset = slot * REF_SIZE;
        self.buf[offset..offset + REF_SIZE].copy_from_slice(&r#ref.to_bytes());
    }

    pub fn get(&self, slot: usize) -> Option<Ref> {
        if slot >= self.branching_factor {
            return None;
        }
        let offset = slot * REF_SIZE;
        let slice = &self.buf[offset..offset + REF_SIZE];
        if slice[..32].iter().all(|b| *b == 0) {
            return None;
        }
        Ref::from_bytes(slice)
    }

    pub fn clear(&mut self) {
        self.buf.fill(0);
    }

    /// Iterate occupied slots in order, stopping at the first all-zero-CID
    /// slot (the sparse tail never has a real entry follow a gap, because
    /// slots are always filled in ascending order).
    pub fn iter(&self) -> impl Iterator<Item = Ref> + '_ {
        (0..self.branching_factor).map_while(move |i| self.get(i))
    }

    pub fn as_bytes(&self) -> Bytes {
        self.buf.clone().freeze()
    }
}
