use glfs_store::{Cid, StoreError};

use crate::typed::ObjectType;

pub type Result<T> = std::result::Result<T, GlfsError>;

/// Semantic error kinds the GLFS layer can produce. Mirrors the store's own
/// [`StoreError`] one level up so callers can match on "what went wrong"
/// without caring which store backend they used.
#[derive(thiserror::Error, Debug)]
pub enum GlfsError {
    #[error("not found: {0}")]
    NotFound(Cid),

    #[error("hash mismatch for {0}")]
    HashMismatch(Cid),

    #[error("wrong type: have {have:?}, want {want:?}")]
    WrongType { have: ObjectType, want: ObjectType },

    #[error("no entry: {0}")]
    NoEntry(String),

    #[error("invalid tree: {0}")]
    InvalidTree(String),

    #[error("referential integrity: {0} missing from destination store")]
    ReferentialIntegrity(Cid),

    #[error("type mismatch in {op}: {left:?} vs {right:?}")]
    TypeMismatch {
        op: &'static str,
        left: ObjectType,
        right: ObjectType,
    },

    #[error("bad configuration: {0}")]
    BadConfiguration(String),

    /// A traversal's cancellation handle fired before the operation
    /// completed (§5 "Cancellation and timeouts"). Any store mutations
    /// made before cancellation are harmless leaks: content addressing
    /// makes partial writes idempotent-safe, cleaned up by a later GC.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GlfsError {
    /// Convert a store's own `NotFound` into the GLFS-level variant,
    /// preserving the `Cid` it complained about.
    pub fn from_store(cid: Cid, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => GlfsError::NotFound(cid),
            other => GlfsError::Store(other),
        }
    }
}
