//! The tree layer: entries, JSON-lines codec, and path/walk operations
//! (§4.6–§4.7).

mod codec;
mod entry;
mod ops;

pub use codec::{TreeReader, TreeWriter};
pub use entry::{clean_path, is_valid_name, TreeEntry};
pub use ops::{get_at_path, get_tree_slice, post_tree, post_tree_map, walk_refs, walk_tree};
