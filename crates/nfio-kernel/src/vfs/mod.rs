//! Filesystem call surface consumed from the transport.
//!
//! - [`VfsOps`] - the call kinds a transport delivers
//! - [`FileAttr`], [`DirEntry`], [`Listing`] - payloads handed back
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: the transport owns inode ↔ path mapping.
//! - **Explicit offset/size**: reads and writes carry their offset so no
//!   per-handle state is needed on this side.

mod ops;
mod types;

pub use ops::VfsOps;
pub use types::{DirEntry, FileAttr, FileType, Listing};
