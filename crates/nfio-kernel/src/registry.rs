//! Kernel-side record of instance lifecycle state.
//!
//! The backend is the source of truth for what exists; the registry only
//! remembers what the kernel is doing to it (`Pending`, `Destroying`) and
//! the backend id it was handed. Listings reconcile it against observed
//! backend state.

use dashmap::DashMap;
use tracing::{debug, warn};

use nfio_types::{InstanceId, InstanceKey, InstanceState};

use crate::backend::{BackendClient, BackendListing, InstanceInfo};
use crate::error::NfResult;

/// What the kernel knows about one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: Option<InstanceId>,
    pub state: InstanceState,
    /// A lifecycle operation is between its backend call and its commit.
    pub in_flight: bool,
}

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    records: DashMap<InstanceKey, InstanceRecord>,
}

/// Marks a record in flight; clears the mark on drop, including on cancellation.
pub struct InFlight<'a> {
    registry: &'a InstanceRegistry,
    key: InstanceKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(mut record) = self.registry.records.get_mut(&self.key) {
            record.in_flight = false;
        }
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &InstanceKey) -> Option<InstanceRecord> {
        self.records.get(key).map(|r| r.clone())
    }

    pub fn state(&self, key: &InstanceKey) -> InstanceState {
        self.records
            .get(key)
            .map(|r| r.state)
            .unwrap_or(InstanceState::Absent)
    }

    pub fn id(&self, key: &InstanceKey) -> Option<InstanceId> {
        self.records.get(key).and_then(|r| r.id.clone())
    }

    /// Reverse lookup from a backend id.
    pub fn key_for_id(&self, id: &InstanceId) -> Option<InstanceKey> {
        self.records
            .iter()
            .find(|entry| entry.id.as_ref() == Some(id))
            .map(|entry| entry.key().clone())
    }

    /// Enter `state` and mark the record in flight until the returned token drops.
    pub fn begin(&self, key: &InstanceKey, state: InstanceState) -> InFlight<'_> {
        let mut record = self.records.entry(key.clone()).or_insert(InstanceRecord {
            id: None,
            state,
            in_flight: true,
        });
        record.state = state;
        record.in_flight = true;
        InFlight {
            registry: self,
            key: key.clone(),
        }
    }

    /// Record the backend id and the settled state.
    pub fn settle(&self, key: &InstanceKey, id: InstanceId, state: InstanceState) {
        let mut record = self.records.entry(key.clone()).or_insert(InstanceRecord {
            id: None,
            state,
            in_flight: false,
        });
        record.id = Some(id);
        record.state = state;
    }

    pub fn set_state(&self, key: &InstanceKey, state: InstanceState) {
        if state == InstanceState::Absent {
            self.records.remove(key);
        } else if let Some(mut record) = self.records.get_mut(key) {
            record.state = state;
        }
    }

    pub fn remove(&self, key: &InstanceKey) {
        self.records.remove(key);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Align records of `nf_type` with what the backend reported.
    ///
    /// Records in flight are left alone. Observed instances are adopted or
    /// updated from their status; unobserved records are dropped, which
    /// settles a timed-out create or destroy.
    pub fn reconcile(&self, nf_type: &str, observed: &[InstanceInfo]) {
        for info in observed {
            let key = InstanceKey::new(&info.nf_type, &info.name);
            let observed_state = InstanceState::from_status(info.status);
            let mut record = self.records.entry(key.clone()).or_insert_with(|| {
                debug!(instance = %key, state = %observed_state, "adopting instance");
                InstanceRecord {
                    id: Some(info.id.clone()),
                    state: observed_state,
                    in_flight: false,
                }
            });
            if record.in_flight {
                continue;
            }
            if record.state != observed_state {
                debug!(instance = %key, from = %record.state, to = %observed_state, "reconciled");
            }
            record.id = Some(info.id.clone());
            record.state = observed_state;
        }

        self.records.retain(|key, record| {
            if key.nf_type != nf_type || record.in_flight {
                return true;
            }
            let seen = observed.iter().any(|i| i.name == key.name);
            if !seen {
                warn!(instance = %key, state = %record.state, "instance gone from backend, dropping record");
            }
            seen
        });
    }

    /// List instances of `nf_type` from the backend and reconcile against them.
    pub async fn refresh(
        &self,
        backend: &BackendClient,
        nf_type: &str,
    ) -> NfResult<BackendListing<InstanceInfo>> {
        let listing = backend.list_instances(nf_type).await?;
        self.reconcile(nf_type, &listing.items);
        Ok(listing)
    }

    /// Backend view of one instance, refreshing the registry in passing.
    pub async fn lookup(
        &self,
        backend: &BackendClient,
        key: &InstanceKey,
    ) -> NfResult<Option<InstanceInfo>> {
        let listing = self.refresh(backend, &key.nf_type).await?;
        Ok(listing.items.into_iter().find(|i| i.name == key.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfio_types::InstanceStatus;

    fn info(name: &str, status: InstanceStatus) -> InstanceInfo {
        InstanceInfo {
            id: InstanceId::new(format!("id-{name}")),
            nf_type: "firewall".into(),
            name: name.into(),
            status,
            extension_keys: vec![],
        }
    }

    fn key(name: &str) -> InstanceKey {
        InstanceKey::new("firewall", name)
    }

    #[test]
    fn test_in_flight_cleared_on_drop() {
        let registry = InstanceRegistry::new();
        {
            let _flight = registry.begin(&key("fw1"), InstanceState::Pending);
            assert!(registry.get(&key("fw1")).unwrap().in_flight);
        }
        let record = registry.get(&key("fw1")).unwrap();
        assert!(!record.in_flight);
        assert_eq!(record.state, InstanceState::Pending);
    }

    #[test]
    fn test_reconcile_promotes_and_drops() {
        let registry = InstanceRegistry::new();
        drop(registry.begin(&key("landed"), InstanceState::Pending));
        drop(registry.begin(&key("lost"), InstanceState::Pending));
        drop(registry.begin(&key("gone"), InstanceState::Destroying));

        registry.reconcile("firewall", &[info("landed", InstanceStatus::Running)]);

        assert_eq!(registry.state(&key("landed")), InstanceState::Running);
        assert_eq!(registry.id(&key("landed")).unwrap().as_str(), "id-landed");
        assert_eq!(registry.state(&key("lost")), InstanceState::Absent);
        assert_eq!(registry.state(&key("gone")), InstanceState::Absent);
    }

    #[test]
    fn test_reconcile_skips_in_flight_and_other_types() {
        let registry = InstanceRegistry::new();
        let _flight = registry.begin(&key("busy"), InstanceState::Pending);
        registry.settle(
            &InstanceKey::new("proxy", "p1"),
            InstanceId::new("id-p1"),
            InstanceState::Running,
        );

        registry.reconcile("firewall", &[]);

        assert_eq!(registry.state(&key("busy")), InstanceState::Pending);
        assert_eq!(
            registry.state(&InstanceKey::new("proxy", "p1")),
            InstanceState::Running
        );
    }

    #[test]
    fn test_status_changes_map_to_degraded() {
        let registry = InstanceRegistry::new();
        registry.reconcile("firewall", &[info("fw1", InstanceStatus::Paused)]);
        assert_eq!(registry.state(&key("fw1")), InstanceState::Degraded);

        registry.reconcile("firewall", &[info("fw1", InstanceStatus::Running)]);
        assert_eq!(registry.state(&key("fw1")), InstanceState::Running);
        assert_eq!(
            registry.key_for_id(&InstanceId::new("id-fw1")),
            Some(key("fw1"))
        );
    }
}
