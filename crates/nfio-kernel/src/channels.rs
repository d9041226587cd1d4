//! Channel manager: links between running instances.
//!
//! A channel is requested by endpoint pair and known afterwards by the
//! name the backend assigns. At most one channel exists per unordered pair.
//!
//! Locking, always instance before channel:
//!
//! ```text
//! connect     read(Instance a), read(Instance b)   sorted
//!             write(Channel "<lo>+<hi>")
//! disconnect  write(Channel "<lo>+<hi>")           or Channel(name) when the
//!                                                  endpoints cannot be resolved
//! teardown    (caller holds write(Instance x))
//!             write(Channel "<lo>+<hi>") per channel touching x
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use nfio_types::{
    ChannelName, ChannelRequest, ChannelState, InstanceId, InstanceKey, InstanceState, PairKey,
};

use crate::address::ResourceAddress;
use crate::backend::{BackendClient, ChannelInfo, Removal};
use crate::catalog::TypeCatalog;
use crate::error::{NfError, NfResult};
use crate::guard::LockTable;
use crate::registry::InstanceRegistry;

/// Read-only files inside a channel directory.
pub const CHANNEL_ATTRIBUTES: &[&str] = &["src", "dst", "state"];

/// A channel with its endpoints resolved to instance keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelView {
    pub name: ChannelName,
    pub source: InstanceKey,
    pub destination: InstanceKey,
    pub state: ChannelState,
}

impl ChannelView {
    pub fn pair(&self) -> PairKey {
        PairKey::new(self.source.clone(), self.destination.clone())
    }

    /// Content of one of the channel's attribute files.
    pub fn attribute(&self, key: &str) -> Option<String> {
        match key {
            "src" => Some(self.source.endpoint()),
            "dst" => Some(self.destination.endpoint()),
            "state" => Some(self.state.as_str().to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ChannelRecord {
    name: Option<ChannelName>,
    state: ChannelState,
}

#[derive(Debug, Default)]
struct ChannelTable {
    by_pair: HashMap<PairKey, ChannelRecord>,
    names: HashMap<ChannelName, PairKey>,
}

impl ChannelTable {
    fn activate(&mut self, pair: PairKey, view: &ChannelView) {
        self.names.insert(view.name.clone(), pair.clone());
        self.by_pair.insert(
            pair,
            ChannelRecord {
                name: Some(view.name.clone()),
                state: ChannelState::Active,
            },
        );
    }

    fn forget(&mut self, pair: &PairKey) {
        if let Some(ChannelRecord { name: Some(name), .. }) = self.by_pair.remove(pair) {
            self.names.remove(&name);
        }
    }

    fn set_state(&mut self, pair: &PairKey, state: ChannelState) {
        if let Some(record) = self.by_pair.get_mut(pair) {
            record.state = state;
        }
    }

    fn state_of(&self, name: &ChannelName) -> ChannelState {
        self.names
            .get(name)
            .and_then(|pair| self.by_pair.get(pair))
            .map(|r| r.state)
            .unwrap_or(ChannelState::Active)
    }
}

/// Channels as resolved by one listing.
#[derive(Debug, Clone, Default)]
pub struct ChannelSnapshot {
    pub views: Vec<ChannelView>,
    /// Channels left out because an endpoint type could not be listed.
    pub unresolved: Vec<ChannelName>,
}

/// Outcome of resolving one backend channel to instance keys.
enum Resolved {
    Known(ChannelView),
    Dangling(ChannelInfo),
}

pub struct ChannelManager {
    backend: BackendClient,
    registry: Arc<InstanceRegistry>,
    catalog: Arc<TypeCatalog>,
    locks: LockTable,
    table: Mutex<ChannelTable>,
}

impl ChannelManager {
    pub fn new(
        backend: BackendClient,
        registry: Arc<InstanceRegistry>,
        catalog: Arc<TypeCatalog>,
        locks: LockTable,
    ) -> Self {
        Self {
            backend,
            registry,
            catalog,
            locks,
            table: Mutex::new(ChannelTable::default()),
        }
    }

    fn pair_address(pair: &PairKey) -> ResourceAddress {
        ResourceAddress::Channel(pair.canonical())
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Link the two endpoints of `request`. Returns the channel's name.
    ///
    /// Idempotent per unordered pair: a second request, in either
    /// direction, returns the existing channel.
    #[tracing::instrument(skip(self), fields(request = %request), name = "channels.connect")]
    pub async fn connect(&self, request: &ChannelRequest) -> NfResult<ChannelName> {
        if request.is_loop() {
            return Err(NfError::invalid_endpoint(format!(
                "{} cannot be linked to itself",
                request.source
            )));
        }

        for endpoint in [&request.source, &request.destination] {
            if !self.catalog.contains(&endpoint.nf_type) {
                return Err(NfError::invalid_endpoint(format!(
                    "unknown NF type {}",
                    endpoint.nf_type
                )));
            }
        }

        let pair = request.pair();
        let _instances = self
            .locks
            .read_many(&[
                ResourceAddress::Instance(request.source.clone()),
                ResourceAddress::Instance(request.destination.clone()),
            ])
            .await;
        let _channel = self.locks.write(&Self::pair_address(&pair)).await;

        self.registry
            .refresh(&self.backend, &request.source.nf_type)
            .await?;
        if request.destination.nf_type != request.source.nf_type {
            self.registry
                .refresh(&self.backend, &request.destination.nf_type)
                .await?;
        }
        let source_id = self.running_endpoint(&request.source)?;
        let destination_id = self.running_endpoint(&request.destination)?;

        // Always ask the backend. Its connect is idempotent per pair and
        // re-establishes a channel that was dropped out of band.
        {
            let mut table = self.table.lock();
            table.forget(&pair);
            table.by_pair.insert(
                pair.clone(),
                ChannelRecord {
                    name: None,
                    state: ChannelState::Establishing,
                },
            );
        }

        match self.backend.connect(&source_id, &destination_id).await {
            Ok(outcome) => {
                let created = outcome.was_created();
                let info = outcome.into_inner();
                let view = ChannelView {
                    name: info.name,
                    source: request.source.clone(),
                    destination: request.destination.clone(),
                    state: ChannelState::Active,
                };
                self.table.lock().activate(pair, &view);
                if created {
                    info!(channel = %view.name, "channel established");
                } else {
                    debug!(channel = %view.name, "channel already active");
                }
                Ok(view.name)
            }
            Err(e) => {
                self.table.lock().forget(&pair);
                warn!(error = %e, "connect failed");
                Err(e.into())
            }
        }
    }

    /// Backend id of `key` if it is a running instance, else `InvalidEndpoint`.
    fn running_endpoint(&self, key: &InstanceKey) -> NfResult<InstanceId> {
        match self.registry.get(key) {
            Some(record) if record.state == InstanceState::Running => record
                .id
                .ok_or_else(|| NfError::invalid_endpoint(format!("{key} has no backend id"))),
            Some(record) => Err(NfError::invalid_endpoint(format!(
                "{key} is {}, not Running",
                record.state
            ))),
            None => Err(NfError::invalid_endpoint(format!("{key} does not exist"))),
        }
    }

    // ========================================================================
    // Disconnect
    // ========================================================================

    /// Remove the channel `name`. Unknown names succeed without effect.
    ///
    /// `name` may also be the request form of an existing pair.
    #[tracing::instrument(skip(self), name = "channels.disconnect")]
    pub async fn disconnect(&self, name: &str) -> NfResult<Removal> {
        let Some(view) = self.find(name).await? else {
            debug!("no such channel");
            return Ok(Removal::AlreadyAbsent);
        };
        let pair = view.pair();
        let _channel = self.locks.write(&Self::pair_address(&pair)).await;
        self.remove(Some(&pair), &view.name).await
    }

    /// Disconnect one channel. The caller holds its lock.
    async fn remove(&self, pair: Option<&PairKey>, name: &ChannelName) -> NfResult<Removal> {
        if let Some(pair) = pair {
            self.table.lock().set_state(pair, ChannelState::TearingDown);
        }
        match self.backend.disconnect(name).await {
            Ok(removal) => {
                if let Some(pair) = pair {
                    self.table.lock().forget(pair);
                }
                info!(channel = %name, "channel removed");
                Ok(removal)
            }
            Err(e) => {
                if let Some(pair) = pair {
                    self.table.lock().set_state(pair, ChannelState::Active);
                }
                Err(e.into())
            }
        }
    }

    /// Tear down every channel touching `key` before it is destroyed.
    ///
    /// The caller holds the instance's write lock.
    #[tracing::instrument(skip(self, id), name = "channels.teardown")]
    pub async fn teardown_for(&self, key: &InstanceKey, id: &InstanceId) -> NfResult<usize> {
        let listing = self.backend.list_channels().await?;
        let mut involved: Vec<ChannelInfo> = listing
            .items
            .into_iter()
            .filter(|c| &c.source == id || &c.destination == id)
            .collect();
        involved.sort_by(|a, b| a.name.cmp(&b.name));

        let other_end = |channel: &ChannelInfo| {
            if &channel.source == id {
                channel.destination.clone()
            } else {
                channel.source.clone()
            }
        };

        // Every endpoint that still exists must resolve to a key, so the
        // teardown locks the same pair address a concurrent connect would.
        if involved
            .iter()
            .any(|c| self.registry.key_for_id(&other_end(c)).is_none())
        {
            for nf_type in self.catalog.names() {
                self.registry.refresh(&self.backend, &nf_type).await?;
            }
        }

        for channel in &involved {
            let other = other_end(channel);
            let pair = self
                .registry
                .key_for_id(&other)
                .map(|other_key| PairKey::new(key.clone(), other_key));
            let lock_address = match &pair {
                Some(pair) => Self::pair_address(pair),
                None => ResourceAddress::Channel(channel.name.to_string()),
            };
            let _channel = self.locks.write(&lock_address).await;
            self.remove(pair.as_ref(), &channel.name).await?;
        }

        // Drop table records for this instance the backend no longer reports.
        let mut table = self.table.lock();
        let ChannelTable { by_pair, names } = &mut *table;
        by_pair.retain(|pair, _| !pair.contains(key));
        names.retain(|_, pair| by_pair.contains_key(pair));

        Ok(involved.len())
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// All channels the backend reports, with endpoints resolved.
    pub async fn list(&self) -> NfResult<Vec<ChannelView>> {
        Ok(self.snapshot().await?.views)
    }

    /// Resolve every backend channel to instance keys.
    ///
    /// A channel whose endpoint is confirmed gone, after every type has been
    /// re-listed, is torn down and left out. If any type could not be
    /// re-listed, unresolved channels are only left out and reported in
    /// [`ChannelSnapshot::unresolved`]; nothing is torn down on a guess.
    pub async fn snapshot(&self) -> NfResult<ChannelSnapshot> {
        let listing = self.backend.list_channels().await?;
        let mut items = listing.items;
        if !listing.ordered {
            items.sort_by(|a, b| a.name.cmp(&b.name));
        }

        let mut resolved = self.resolve_all(items);
        let mut complete = true;
        if resolved.iter().any(|r| matches!(r, Resolved::Dangling(_))) {
            for nf_type in self.catalog.names() {
                if let Err(e) = self.registry.refresh(&self.backend, &nf_type).await {
                    warn!(nf_type = %nf_type, error = %e, "registry refresh failed");
                    complete = false;
                }
            }
            resolved = resolved
                .into_iter()
                .map(|r| match r {
                    Resolved::Dangling(info) => self.resolve(info),
                    known => known,
                })
                .collect();
        }

        let mut views = Vec::new();
        let mut unresolved = Vec::new();
        for entry in resolved {
            match entry {
                Resolved::Known(view) => views.push(view),
                Resolved::Dangling(info) if complete => self.drop_dangling(&info).await,
                Resolved::Dangling(info) => {
                    warn!(channel = %info.name, "channel endpoints unresolved, left out");
                    unresolved.push(info.name);
                }
            }
        }

        let mut table = self.table.lock();
        for view in &views {
            if !table.names.contains_key(&view.name) {
                table.activate(view.pair(), view);
            }
        }
        let live: Vec<&ChannelName> = views
            .iter()
            .map(|v| &v.name)
            .chain(unresolved.iter())
            .collect();
        let stale: Vec<PairKey> = table
            .by_pair
            .iter()
            .filter(|(_, r)| r.state == ChannelState::Active)
            .filter(|(_, r)| r.name.as_ref().is_some_and(|n| !live.contains(&n)))
            .map(|(pair, _)| pair.clone())
            .collect();
        for pair in &stale {
            table.forget(pair);
        }

        Ok(ChannelSnapshot { views, unresolved })
    }

    /// Find one channel by backend name, or by request form.
    pub async fn find(&self, name: &str) -> NfResult<Option<ChannelView>> {
        let views = self.list().await?;
        if let Some(view) = views.iter().find(|v| v.name.as_str() == name) {
            return Ok(Some(view.clone()));
        }
        let Some(request) = ChannelRequest::parse(name) else {
            return Ok(None);
        };
        let pair = request.pair();
        Ok(views.into_iter().find(|v| v.pair() == pair))
    }

    fn resolve_all(&self, items: Vec<ChannelInfo>) -> Vec<Resolved> {
        items.into_iter().map(|info| self.resolve(info)).collect()
    }

    fn resolve(&self, info: ChannelInfo) -> Resolved {
        match (
            self.registry.key_for_id(&info.source),
            self.registry.key_for_id(&info.destination),
        ) {
            (Some(source), Some(destination)) => {
                let state = self.table.lock().state_of(&info.name);
                Resolved::Known(ChannelView {
                    name: info.name,
                    source,
                    destination,
                    state,
                })
            }
            _ => Resolved::Dangling(info),
        }
    }

    async fn drop_dangling(&self, info: &ChannelInfo) {
        warn!(channel = %info.name, "channel endpoint no longer exists, tearing down");
        let _channel = self
            .locks
            .write(&ResourceAddress::Channel(info.name.to_string()))
            .await;
        if let Err(e) = self.backend.disconnect(&info.name).await {
            warn!(channel = %info.name, error = %e, "failed to tear down dangling channel");
        }
    }

    /// Number of channels the kernel is tracking, in any state.
    pub fn tracked(&self) -> usize {
        self.table.lock().by_pair.len()
    }
}
