//! [`TreeEntry`]: `(name, mode, ref)`, plus the path-cleaning helpers the
//! rest of the tree layer validates names against (§3, §4.6).

use serde::{Deserialize, Serialize};

use crate::error::{GlfsError, Result};
use crate::typed::{FileMode, TypedRef};

/// A single entry in a [`super::Tree`], uniquely identified by `name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub mode: FileMode,
    #[serde(rename = "ref")]
    pub r#ref: TypedRef,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, mode: FileMode, r#ref: TypedRef) -> Self {
        Self {
            name: name.into(),
            mode,
            r#ref,
        }
    }

    /// A mode matching the entry's own dynamic type: `FileMode::dir()` for
    /// a tree, default POSIX permissions otherwise (§4.7 `getFileMode`).
    pub fn default_mode_for(r#ref: &TypedRef) -> FileMode {
        if r#ref.is_tree() {
            FileMode::dir()
        } else {
            FileMode::default()
        }
    }

    /// Non-empty, no `/`, and stable under [`clean_path`] (§3, Invariant 3
    /// applies transitively: only clean single-component names may sit in
    /// a tree's serialisation).
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GlfsError::InvalidTree("tree entry name cannot be empty".into()));
        }
        if self.name.contains('/') {
            return Err(GlfsError::InvalidTree(format!(
                "tree entry name {:?} must be a single path component",
                self.name
            )));
        }
        if clean_path(&self.name) != self.name {
            return Err(GlfsError::InvalidTree(format!(
                "tree entry name {:?} is not path.Clean-stable",
                self.name
            )));
        }
        Ok(())
    }
}

/// `true` iff `name` is non-empty and contains no `/` (§7 "a path lookup
/// failed at a tree level" relies on this to split path components).
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

/// The direct Rust equivalent of Go's `path.Clean` followed by
/// `strings.Trim(x, "/")`, with `"."` collapsing to `""`: resolves `.`/`..`
/// segments, collapses repeated `/`, and strips any leading/trailing `/`.
/// Idempotent — `clean_path(clean_path(x)) == clean_path(x)` — which is
/// what "path.Clean-stable" means for a [`TreeEntry::validate`] name.
pub fn clean_path(input: &str) -> String {
    let is_absolute = input.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for part in input.split('/') {
        match part {
            "" | "." => continue,
            ".." => match stack.last() {
                Some(&last) if last != ".." => {
                    stack.pop();
                }
                _ => {
                    if !is_absolute {
                        stack.push("..");
                    }
                }
            },
            p => stack.push(p),
        }
    }
    stack.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::Root;

    fn dummy_typed() -> TypedRef {
        use crate::ref_::{Dek, Ref};
        TypedRef::blob(Root::new(
            Ref {
                cid: glfs_store::Cid::new(b"x"),
                dek: Dek::from_bytes([0u8; 32]),
            },
            0,
            1024,
        ))
    }

    #[test]
    fn clean_path_collapses_dots_and_slashes() {
        assert_eq!(clean_path("a/./b//c/"), "a/b/c");
        assert_eq!(clean_path("."), "");
        assert_eq!(clean_path(""), "");
        assert_eq!(clean_path("/a/b"), "a/b");
        assert_eq!(clean_path("a/../b"), "b");
    }

    #[test]
    fn clean_path_is_idempotent() {
        for input in ["a/b/c", "./a/../b/", "//x//y/", ""] {
            let once = clean_path(input);
            assert_eq!(clean_path(&once), once, "input={input:?}");
        }
    }

    #[test]
    fn validate_rejects_multi_component_and_empty_names() {
        let ent = TreeEntry::new("a/b", FileMode::default(), dummy_typed());
        assert!(ent.validate().is_err());
        let ent = TreeEntry::new("", FileMode::default(), dummy_typed());
        assert!(ent.validate().is_err());
        let ent = TreeEntry::new("fine.txt", FileMode::default(), dummy_typed());
        assert!(ent.validate().is_ok());
    }
}
