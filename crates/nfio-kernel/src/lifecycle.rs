//! Instance lifecycle: create and destroy.
//!
//! ```text
//! Absent ──mkdir──▶ Pending ──ok──▶ Running ──rmdir──▶ Destroying ──ok──▶ Absent
//!                      │  rejected                         │ rejected
//!                      └──────────▶ Absent                 └──▶ previous state
//! ```
//!
//! A backend timeout leaves the record in `Pending` or `Destroying`; the
//! next listing of the type reconciles it against what the backend reports.
//!
//! Callers hold the exclusive lock on the instance address for the whole
//! call. Nothing here takes instance locks.

use std::sync::Arc;

use tracing::{info, warn};

use nfio_types::{InstanceId, InstanceKey, InstanceState};

use crate::backend::{BackendClient, BackendError, Removal};
use crate::channels::ChannelManager;
use crate::error::NfResult;
use crate::registry::{InstanceRecord, InstanceRegistry};

pub struct LifecycleController {
    backend: BackendClient,
    registry: Arc<InstanceRegistry>,
    channels: Arc<ChannelManager>,
}

impl LifecycleController {
    pub fn new(
        backend: BackendClient,
        registry: Arc<InstanceRegistry>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            backend,
            registry,
            channels,
        }
    }

    /// Bring `key` into existence. An instance that already exists is success.
    #[tracing::instrument(skip(self), name = "lifecycle.create")]
    pub async fn create(&self, key: &InstanceKey) -> NfResult<()> {
        let state = self.registry.state(key);
        if matches!(state, InstanceState::Running | InstanceState::Degraded) {
            return Ok(());
        }

        // Absent, or a Pending/Destroying left behind by a timeout.
        // `instantiate` is idempotent, so asking again settles either.
        let _flight = self.registry.begin(key, InstanceState::Pending);
        match self.backend.instantiate(&key.nf_type, &key.name).await {
            Ok(outcome) => {
                let created = outcome.was_created();
                let instance = outcome.into_inner();
                let state = InstanceState::from_status(instance.status);
                self.registry.settle(key, instance.id, state);
                if created {
                    info!(instance = %key, state = %state, "instance created");
                }
                Ok(())
            }
            Err(BackendError::Timeout) => {
                warn!(instance = %key, "instantiate timed out, left Pending");
                Err(BackendError::Timeout.into())
            }
            Err(e) => {
                self.registry.remove(key);
                warn!(instance = %key, error = %e, "instantiate failed");
                Err(e.into())
            }
        }
    }

    /// Remove `key`, tearing its channels down first. An absent instance is success.
    #[tracing::instrument(skip(self), name = "lifecycle.destroy")]
    pub async fn destroy(&self, key: &InstanceKey) -> NfResult<Removal> {
        let Some((id, previous)) = self.target(key).await? else {
            return Ok(Removal::AlreadyAbsent);
        };

        let _flight = self.registry.begin(key, InstanceState::Destroying);

        if let Err(e) = self.channels.teardown_for(key, &id).await {
            self.registry.set_state(key, previous);
            warn!(instance = %key, error = %e, "channel teardown failed, destroy aborted");
            return Err(e);
        }

        match self.backend.destroy(&id).await {
            Ok(removal) => {
                self.registry.remove(key);
                info!(instance = %key, "instance destroyed");
                Ok(removal)
            }
            Err(BackendError::Timeout) => {
                warn!(instance = %key, "destroy timed out, left Destroying");
                Err(BackendError::Timeout.into())
            }
            Err(e) => {
                self.registry.set_state(key, previous);
                warn!(instance = %key, error = %e, "destroy failed");
                Err(e.into())
            }
        }
    }

    /// Backend id and current state of an instance about to be destroyed.
    async fn target(&self, key: &InstanceKey) -> NfResult<Option<(InstanceId, InstanceState)>> {
        if let Some(InstanceRecord {
            id: Some(id),
            state,
            ..
        }) = self.registry.get(key)
        {
            if state.can_destroy() {
                return Ok(Some((id, state)));
            }
        }

        // Unknown to the registry, never confirmed, or a timed-out destroy:
        // ask the backend. The lookup reconciles the record in passing.
        match self.registry.lookup(&self.backend, key).await? {
            Some(instance) => {
                let state = match self.registry.state(key) {
                    InstanceState::Absent => InstanceState::from_status(instance.status),
                    state => state,
                };
                Ok(Some((instance.id, state)))
            }
            None => {
                self.registry.remove(key);
                Ok(None)
            }
        }
    }
}
