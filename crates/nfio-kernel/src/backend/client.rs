//! Deadline and retry wrapper around an orchestration backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use nfio_types::{AttrValue, ChannelName, InstanceId};

use super::{
    BackendError, BackendListing, BackendResult, ChannelInfo, InstanceInfo, OrchestrationBackend,
    Outcome, Removal,
};

/// Per-call deadline and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    pub timeout: Duration,
    /// Retry idempotent calls and reads once after a timeout.
    pub retry_on_timeout: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS),
            retry_on_timeout: true,
        }
    }
}

/// Shared handle to the backend. Cheap to clone.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<dyn OrchestrationBackend>,
    settings: ClientSettings,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("backend", &self.inner.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl BackendClient {
    pub fn new(inner: Arc<dyn OrchestrationBackend>, settings: ClientSettings) -> Self {
        Self { inner, settings }
    }

    pub fn settings(&self) -> ClientSettings {
        self.settings
    }

    pub fn backend_name(&self) -> &str {
        self.inner.name()
    }

    async fn deadline<T, Fut>(&self, fut: Fut) -> BackendResult<T>
    where
        Fut: Future<Output = BackendResult<T>>,
    {
        match tokio::time::timeout(self.settings.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout),
        }
    }

    /// Run `call` under the deadline, retrying once on timeout if allowed.
    async fn retrying<T, F, Fut>(&self, op: &'static str, call: F) -> BackendResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        match self.deadline(call()).await {
            Err(BackendError::Timeout) if self.settings.retry_on_timeout => {
                warn!(op, backend = self.inner.name(), "backend call timed out, retrying once");
                self.deadline(call()).await
            }
            other => other,
        }
    }

    pub async fn instantiate(&self, nf_type: &str, name: &str) -> BackendResult<Outcome<InstanceInfo>> {
        debug!(nf_type, name, "backend instantiate");
        self.retrying("instantiate", || self.inner.instantiate(nf_type, name))
            .await
    }

    pub async fn destroy(&self, id: &InstanceId) -> BackendResult<Removal> {
        debug!(id = %id, "backend destroy");
        self.retrying("destroy", || self.inner.destroy(id)).await
    }

    pub async fn get_attr(&self, id: &InstanceId, key: &str) -> BackendResult<AttrValue> {
        self.retrying("get_attr", || self.inner.get_attr(id, key)).await
    }

    /// Single attempt; a timed-out write may or may not have landed.
    pub async fn set_attr(&self, id: &InstanceId, key: &str, value: AttrValue) -> BackendResult<()> {
        debug!(id = %id, key, "backend set_attr");
        self.deadline(self.inner.set_attr(id, key, value)).await
    }

    pub async fn connect(&self, a: &InstanceId, b: &InstanceId) -> BackendResult<Outcome<ChannelInfo>> {
        debug!(a = %a, b = %b, "backend connect");
        self.retrying("connect", || self.inner.connect(a, b)).await
    }

    pub async fn disconnect(&self, name: &ChannelName) -> BackendResult<Removal> {
        debug!(channel = %name, "backend disconnect");
        self.retrying("disconnect", || self.inner.disconnect(name))
            .await
    }

    pub async fn list_instances(&self, nf_type: &str) -> BackendResult<BackendListing<InstanceInfo>> {
        self.retrying("list_instances", || self.inner.list_instances(nf_type))
            .await
    }

    pub async fn list_channels(&self) -> BackendResult<BackendListing<ChannelInfo>> {
        self.retrying("list_channels", || self.inner.list_channels())
            .await
    }
}
