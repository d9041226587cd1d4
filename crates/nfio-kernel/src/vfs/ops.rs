//! Filesystem call surface.
//!
//! This is the abstract "filesystem call" interface the transport drives.
//! Every method maps to exactly one engine entry point. Paths are relative to
//! the mount point; a leading `/` is tolerated.

use async_trait::async_trait;
use std::path::Path;

use super::types::{DirEntry, FileAttr};
use crate::error::NfResult;

/// Filesystem operations consumed from the transport.
///
/// Implementations must be safe to call from many transport worker threads
/// at once. Dropping a returned future cancels the call.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Resolve a path and return its attributes.
    async fn getattr(&self, path: &Path) -> NfResult<FileAttr>;

    /// Read directory entries.
    async fn readdir(&self, path: &Path) -> NfResult<Vec<DirEntry>>;

    /// Read up to `size` bytes of a file starting at `offset`.
    async fn read(&self, path: &Path, offset: u64, size: u32) -> NfResult<Vec<u8>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write `data` at `offset`. Returns the number of bytes accepted.
    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> NfResult<u32>;

    /// Create a regular file.
    async fn create(&self, path: &Path, mode: u32) -> NfResult<FileAttr>;

    /// Create a directory.
    async fn mkdir(&self, path: &Path, mode: u32) -> NfResult<FileAttr>;

    /// Remove a file.
    async fn unlink(&self, path: &Path) -> NfResult<()>;

    /// Remove a directory.
    async fn rmdir(&self, path: &Path) -> NfResult<()>;

    /// Rename a file or directory.
    async fn rename(&self, from: &Path, to: &Path) -> NfResult<()>;

    /// Truncate a file to the specified size.
    async fn truncate(&self, path: &Path, size: u64) -> NfResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.getattr(path).await.is_ok()
    }

    /// Read entire file contents.
    async fn read_all(&self, path: &Path) -> NfResult<Vec<u8>> {
        let attr = self.getattr(path).await?;
        self.read(path, 0, attr.size.min(u32::MAX as u64) as u32).await
    }

    /// Replace entire file contents, the way a shell redirect does.
    async fn write_all(&self, path: &Path, data: &[u8]) -> NfResult<()> {
        self.truncate(path, 0).await?;
        self.write(path, 0, data).await?;
        Ok(())
    }
}
