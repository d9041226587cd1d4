//! Types exchanged with the filesystem transport.
//!
//! Path-based, no inodes. The transport maps these onto whatever its native
//! attribute and directory-entry structures are.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file (an attribute).
    File,
    /// Directory (a collection, an instance, a channel).
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes (metadata).
///
/// Synthetic: every lookup builds a fresh value, so `mtime` is the time of
/// the lookup, not of the last backend change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes of the content at lookup time.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permissions (e.g., 0o644).
    pub perm: u32,
    /// Lookup time.
    pub mtime: SystemTime,
    /// Number of hard links.
    pub nlink: u32,
}

impl FileAttr {
    /// Attributes for an attribute file.
    pub fn file(size: u64, perm: u32) -> Self {
        Self {
            size,
            kind: FileType::File,
            perm,
            mtime: SystemTime::now(),
            nlink: 1,
        }
    }

    /// Attributes for a directory.
    pub fn directory(perm: u32) -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            perm,
            mtime: SystemTime::now(),
            nlink: 2, // . and ..
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// Result of listing a synthetic directory.
///
/// `warnings` carries partial failures that did not prevent the listing
/// (e.g. extension keys of one instance could not be fetched).
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub entries: Vec<DirEntry>,
    pub warnings: Vec<String>,
}

impl Listing {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        Self {
            entries,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Entry names in listing order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_attr_constructors() {
        let file = FileAttr::file(7, 0o444);
        assert!(file.is_file());
        assert_eq!(file.size, 7);
        assert_eq!(file.perm, 0o444);

        let dir = FileAttr::directory(0o755);
        assert!(dir.is_dir());
        assert_eq!(dir.nlink, 2);
    }

    #[test]
    fn test_listing_names() {
        let listing = Listing::new(vec![DirEntry::directory("fw1"), DirEntry::file("status")])
            .with_warning("partial");
        assert_eq!(listing.names(), vec!["fw1", "status"]);
        assert_eq!(listing.warnings.len(), 1);
    }
}
