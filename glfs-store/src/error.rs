use crate::Cid;

/// Errors a [`crate::Store`] implementation may return. GLFS itself only
/// ever produces [`StoreError::NotFound`] and [`StoreError::HashMismatch`]
/// from the store boundary (§7 of the spec); the remaining variants exist
/// for store implementations to report their own backend failures.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(Cid),
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: Cid, actual: Cid },
    #[error("blob too large: {len} bytes exceeds max_size {max_size}")]
    TooLarge { len: u64, max_size: u64 },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
