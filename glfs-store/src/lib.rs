//! The content-addressed store contract GLFS is built on top of.
//!
//! This crate defines only the boundary: a 32-byte [`Cid`] and a set of
//! capability traits ([`Getter`], [`Poster`], [`Exister`], [`Deleter`],
//! [`Lister`]) a store implementation provides. Operations in `glfs` are
//! written against the narrowest capability bound they need, so a caller
//! holding only a read-only store can still run read-only traversals.

mod error;
mod hash;
mod traits;

pub use error::StoreError;
pub use hash::Cid;
pub use traits::{
    CidStream, Deleter, Exister, GetExister, GetPoster, GetPosterExister, Getter, Lister, Poster,
    Store, StoreResult,
};
