//! Typed refs: the closed blob/tree tag plus an open extension point for
//! application-defined leaf types (§3, Design Notes §9).

use serde::{Deserialize, Serialize};

use crate::root::Root;

/// The dynamic "type" of an object reachable in the graph. Closed over
/// `Blob`/`Tree`; `Custom` is the spec's "user-defined short ASCII tag"
/// extension point. Diff/merge treat unknown custom types conservatively:
/// equality by ref, otherwise a full split/replace (§4.8).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Custom(String),
}

impl ObjectType {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ObjectType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ObjectType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ObjectType::from(s))
    }
}

impl From<&str> for ObjectType {
    fn from(s: &str) -> Self {
        match s {
            "blob" => ObjectType::Blob,
            "tree" => ObjectType::Tree,
            other => ObjectType::Custom(other.to_string()),
        }
    }
}

impl From<String> for ObjectType {
    fn from(s: String) -> Self {
        ObjectType::from(s.as_str())
    }
}

/// A ref plus its dynamic type: `(type, Root)`. Equality is type-and-root
/// equality (§3) — explicitly not the original source's richer
/// fingerprint-based equality, which `spec.md`'s Non-goals exclude
/// (see DESIGN.md, Open Question 3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedRef {
    #[serde(rename = "type")]
    pub ty: ObjectType,
    #[serde(flatten)]
    pub root: Root,
}

impl TypedRef {
    pub fn new(ty: ObjectType, root: Root) -> Self {
        Self { ty, root }
    }

    pub fn blob(root: Root) -> Self {
        Self::new(ObjectType::Blob, root)
    }

    pub fn tree(root: Root) -> Self {
        Self::new(ObjectType::Tree, root)
    }

    pub fn is_tree(&self) -> bool {
        matches!(self.ty, ObjectType::Tree)
    }
}

bitflags::bitflags! {
    /// POSIX permission bits plus directory/symlink markers (§3). The
    /// directory/symlink markers live in the high bits, out of the way of
    /// the POSIX `rwx` triplets conventionally encoded in the low 9 bits,
    /// matching the original source's reuse of Go's `os.FileMode` layout.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FileMode: u32 {
        const OWNER_READ  = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC  = 0o100;
        const GROUP_READ  = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC  = 0o010;
        const OTHER_READ  = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC  = 0o001;
        /// Marks the entry's ref as a tree rather than a leaf object.
        const DIR     = 1 << 31;
        /// Marks the entry as a symbolic link; the referenced blob holds
        /// the link target as plaintext bytes.
        const SYMLINK = 1 << 30;
    }
}

impl Default for FileMode {
    fn default() -> Self {
        FileMode::OWNER_READ | FileMode::OWNER_WRITE | FileMode::GROUP_READ | FileMode::OTHER_READ
    }
}

impl FileMode {
    pub fn is_dir(&self) -> bool {
        self.contains(FileMode::DIR)
    }

    pub fn is_symlink(&self) -> bool {
        self.contains(FileMode::SYMLINK)
    }

    pub fn dir() -> Self {
        Self::default() | FileMode::DIR | FileMode::OWNER_EXEC | FileMode::GROUP_EXEC | FileMode::OTHER_EXEC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_round_trips_through_str() {
        assert_eq!(ObjectType::from("blob"), ObjectType::Blob);
        assert_eq!(ObjectType::from("tree"), ObjectType::Tree);
        assert_eq!(ObjectType::from("widget").as_str(), "widget");
    }

    #[test]
    fn file_mode_dir_is_distinguishable_from_posix_bits() {
        let d = FileMode::dir();
        assert!(d.is_dir());
        assert!(!d.is_symlink());
        assert!(d.contains(FileMode::OWNER_EXEC));
    }
}
