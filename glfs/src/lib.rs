//! GLFS: a content-addressed filesystem format and library.
//!
//! Arbitrary directory trees are represented as an immutable object graph
//! backed by a pluggable content-addressed store (see [`glfs_store`]). Each
//! node is convergently encrypted, chunked into fixed-size blocks, and
//! indexed by a fan-out tree so arbitrarily large files can be stored,
//! randomly read, and synchronised between stores without rewriting them.
//!
//! [`Glfs`] is the facade most callers want: construct an [`Engine`], wrap
//! it in a `Glfs`, and call its methods against whatever store implements
//! the capability traits a given method needs. Lower-level pieces
//! ([`bigblob`], [`tree`]) are exposed for callers who want the primitives
//! directly.

mod api;
pub mod bigblob;
mod concat;
mod concurrency;
mod diff;
mod engine;
mod error;
mod gc;
mod index;
mod merge;
mod ref_;
mod root;
mod transform;
pub mod tree;
mod typed;

pub use api::Glfs;
pub use concurrency::default_semaphore;
pub use diff::Diff;
pub use engine::{Engine, EngineBuilder, DEFAULT_CACHE_CAPACITY, MIN_BLOCK_SIZE};
pub use error::{GlfsError, Result};
pub use gc::GcResult;
pub use index::IndexBlock;
pub use ref_::{derive_key, Dek, Ref, DEK_SIZE, REF_SIZE};
pub use root::{branching_factor, depth, Root, DEFAULT_BLOCK_SIZE};
pub use typed::{FileMode, ObjectType, TypedRef};
