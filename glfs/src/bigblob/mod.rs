//! Chunked, convergently-encrypted, randomly-addressable blobs (§4.3–§4.5).

mod reader;
mod sync;
mod traverse;
mod writer;

pub use reader::Reader;
pub use sync::sync as sync_blob;
pub use traverse::{traverse as traverse_blob, TraverseCallbacks};
pub use writer::Writer;
