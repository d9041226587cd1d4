//! Per-address reader/writer locks.
//!
//! There is no process-wide lock. Each [`ResourceAddress`] gets its own
//! `tokio::sync::RwLock`, created on first use and dropped again once no
//! guard holds or waits on it. tokio's lock is fair: waiters are served in
//! arrival order, and a queued writer holds back later readers.
//!
//! Lock order across addresses is instance before channel or attribute.
//! Callers that need several addresses of the same class take them through
//! [`LockTable::read_many`], which sorts them first.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

use crate::address::ResourceAddress;

type Slots = DashMap<ResourceAddress, Arc<RwLock<()>>>;

/// Table of address locks. Cheap to clone; clones share the table.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    slots: Arc<Slots>,
}

enum Held {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Removes the table slot once nobody else references it.
struct SlotRef {
    slots: Arc<Slots>,
    address: ResourceAddress,
}

impl Drop for SlotRef {
    fn drop(&mut self) {
        self.slots
            .remove_if(&self.address, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// A pending acquire.
///
/// Fields drop in declaration order, so a cancelled wait lets go of the
/// lock before its slot reference checks whether the slot is still in use.
struct Acquire<G> {
    waiting: Pin<Box<dyn Future<Output = G> + Send>>,
    _slot: SlotRef,
}

impl<G> Future for Acquire<G> {
    type Output = G;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<G> {
        self.waiting.as_mut().poll(cx)
    }
}

/// A held address lock. Released on drop.
pub struct ResourceGuard {
    // Field order matters: the lock guard must be released before the slot
    // reference checks whether the slot is still in use.
    held: Held,
    slot: SlotRef,
}

impl ResourceGuard {
    pub fn address(&self) -> &ResourceAddress {
        &self.slot.address
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.held, Held::Exclusive(_))
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("address", &self.slot.address)
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_ref(&self, address: &ResourceAddress) -> SlotRef {
        SlotRef {
            slots: self.slots.clone(),
            address: address.clone(),
        }
    }

    fn acquire<G, F>(
        &self,
        address: &ResourceAddress,
        lock: impl FnOnce(Arc<RwLock<()>>) -> F,
    ) -> Acquire<G>
    where
        F: Future<Output = G> + Send + 'static,
    {
        let slot = self.slots.entry(address.clone()).or_default().clone();
        Acquire {
            waiting: Box::pin(lock(slot)),
            _slot: self.slot_ref(address),
        }
    }

    /// Acquire a shared lock on `address`.
    pub async fn read(&self, address: &ResourceAddress) -> ResourceGuard {
        let guard = self.acquire(address, |lock| lock.read_owned()).await;
        trace!(address = %address, "shared lock acquired");
        ResourceGuard {
            held: Held::Shared(guard),
            slot: self.slot_ref(address),
        }
    }

    /// Acquire an exclusive lock on `address`.
    pub async fn write(&self, address: &ResourceAddress) -> ResourceGuard {
        let guard = self.acquire(address, |lock| lock.write_owned()).await;
        trace!(address = %address, "exclusive lock acquired");
        ResourceGuard {
            held: Held::Exclusive(guard),
            slot: self.slot_ref(address),
        }
    }

    /// Shared locks on several addresses, acquired in sorted order.
    pub async fn read_many(&self, addresses: &[ResourceAddress]) -> Vec<ResourceGuard> {
        let mut sorted = addresses.to_vec();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for address in &sorted {
            guards.push(self.read(address).await);
        }
        guards
    }

    /// Number of addresses currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
