//! Orchestration backend contract.
//!
//! The kernel never talks to an orchestrator directly; it goes through
//! [`BackendClient`], which wraps any [`OrchestrationBackend`] with a
//! per-call deadline and the retry policy.
//!
//! Mutations report whether they changed anything: `instantiate` and
//! `connect` return an [`Outcome`], `destroy` and `disconnect` a
//! [`Removal`]. "Already in the target state" is success, which is what
//! makes them safe to retry.

mod client;
mod memory;

pub use client::{BackendClient, ClientSettings};
pub use memory::{MemoryOrchestrator, Op};

use async_trait::async_trait;
use thiserror::Error;

use nfio_types::{AttrValue, ChannelName, InstanceId, InstanceStatus};

/// Failure reported by an orchestration backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("timed out")]
    Timeout,

    #[error("conflict: {0}")]
    Conflict(String),
}

impl BackendError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Result of an idempotent create-style call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The call brought the resource into existence.
    Created(T),
    /// The resource already existed; nothing changed.
    AlreadyPresent(T),
}

impl<T> Outcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            Outcome::Created(v) | Outcome::AlreadyPresent(v) => v,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            Outcome::Created(v) | Outcome::AlreadyPresent(v) => v,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Outcome::Created(_))
    }
}

/// Result of an idempotent remove-style call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

/// One instance as the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub nf_type: String,
    pub name: String,
    pub status: InstanceStatus,
    /// Attribute keys this instance carries beyond its type schema.
    pub extension_keys: Vec<String>,
}

/// One channel as the backend sees it. Endpoints are backend ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: ChannelName,
    pub source: InstanceId,
    pub destination: InstanceId,
}

/// A listing plus whether the backend vouches for its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendListing<T> {
    pub items: Vec<T>,
    /// False when the backend makes no ordering promise; callers sort.
    pub ordered: bool,
}

impl<T> BackendListing<T> {
    pub fn ordered(items: Vec<T>) -> Self {
        Self {
            items,
            ordered: true,
        }
    }

    pub fn unordered(items: Vec<T>) -> Self {
        Self {
            items,
            ordered: false,
        }
    }
}

/// The eight calls the kernel needs from an orchestrator.
#[async_trait]
pub trait OrchestrationBackend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Create an instance. Keyed by (type, name): a second call for the same
    /// key returns the existing instance as `AlreadyPresent`.
    async fn instantiate(&self, nf_type: &str, name: &str) -> BackendResult<Outcome<InstanceInfo>>;

    async fn destroy(&self, id: &InstanceId) -> BackendResult<Removal>;

    async fn get_attr(&self, id: &InstanceId, key: &str) -> BackendResult<AttrValue>;

    /// Not idempotent. Never retried by the client.
    async fn set_attr(&self, id: &InstanceId, key: &str, value: AttrValue) -> BackendResult<()>;

    /// Link two instances. Keyed by the unordered pair.
    async fn connect(&self, a: &InstanceId, b: &InstanceId) -> BackendResult<Outcome<ChannelInfo>>;

    async fn disconnect(&self, name: &ChannelName) -> BackendResult<Removal>;

    async fn list_instances(&self, nf_type: &str) -> BackendResult<BackendListing<InstanceInfo>>;

    async fn list_channels(&self) -> BackendResult<BackendListing<ChannelInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let created = Outcome::Created(3);
        assert!(created.was_created());
        assert_eq!(*created.get(), 3);
        let present = Outcome::AlreadyPresent(4);
        assert!(!present.was_created());
        assert_eq!(present.into_inner(), 4);
    }
}
