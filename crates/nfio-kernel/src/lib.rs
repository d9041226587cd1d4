//! # nfio-kernel
//!
//! Translation engine that presents NFV orchestration state as a
//! filesystem.
//!
//! Directories are NF types, instances and channels; files are instance
//! attributes. `mkdir` instantiates, `rmdir` destroys, writing a file sets
//! an attribute. Every answer is pulled from the orchestration backend at
//! call time:
//! - Owns no persistent state
//! - Locks per address, never globally
//! - Treats backend create/remove calls as idempotent and retries them once
//!   on timeout
//!
//! The entry point is [`NfEngine`], which implements [`VfsOps`].

pub mod address;
pub mod backend;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod content;
pub mod directory;
pub mod engine;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod registry;
pub mod vfs;

pub use address::{ResourceAddress, resolve};
pub use backend::{
    BackendClient, BackendError, BackendListing, BackendResult, ChannelInfo, ClientSettings,
    InstanceInfo, MemoryOrchestrator, Op, OrchestrationBackend, Outcome, Removal,
};
pub use catalog::{Access, AttrKind, AttrSpec, NfTypeSpec, TypeCatalog};
pub use channels::{ChannelManager, ChannelSnapshot, ChannelView};
pub use config::{ConfigError, NfioConfig};
pub use engine::NfEngine;
pub use error::{NfError, NfResult};
pub use guard::{LockTable, ResourceGuard};
pub use registry::{InstanceRecord, InstanceRegistry};
pub use vfs::{DirEntry, FileAttr, FileType, Listing, VfsOps};
