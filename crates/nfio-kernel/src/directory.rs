//! Synthetic directory listings.
//!
//! Every listing is computed from the catalog and the backend at call
//! time. There is no cached tree.

use std::sync::Arc;

use tracing::warn;

use nfio_types::InstanceKey;

use crate::address::{CHANNELS_ROOT, ResourceAddress, TYPES_ROOT};
use crate::backend::BackendClient;
use crate::catalog::TypeCatalog;
use crate::channels::{CHANNEL_ATTRIBUTES, ChannelManager};
use crate::error::{NfError, NfResult};
use crate::registry::InstanceRegistry;
use crate::vfs::{DirEntry, Listing};

pub struct DirectoryProvider {
    catalog: Arc<TypeCatalog>,
    backend: BackendClient,
    registry: Arc<InstanceRegistry>,
    channels: Arc<ChannelManager>,
}

impl DirectoryProvider {
    pub fn new(
        catalog: Arc<TypeCatalog>,
        backend: BackendClient,
        registry: Arc<InstanceRegistry>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            catalog,
            backend,
            registry,
            channels,
        }
    }

    /// Ordered children of a directory address.
    pub async fn list(&self, address: &ResourceAddress) -> NfResult<Listing> {
        match address {
            ResourceAddress::Root => Ok(Listing::new(vec![
                DirEntry::directory(TYPES_ROOT),
                DirEntry::directory(CHANNELS_ROOT),
            ])),
            ResourceAddress::TypeCatalog => Ok(Listing::new(
                self.catalog
                    .names()
                    .into_iter()
                    .map(DirEntry::directory)
                    .collect(),
            )),
            ResourceAddress::InstanceCollection(nf_type) => self.instances(nf_type).await,
            ResourceAddress::Instance(key) => self.attributes(key).await,
            ResourceAddress::ChannelCollection => {
                let snapshot = self.channels.snapshot().await?;
                let mut listing = Listing::new(
                    snapshot
                        .views
                        .into_iter()
                        .map(|v| DirEntry::directory(v.name.as_str()))
                        .collect(),
                );
                for name in &snapshot.unresolved {
                    listing = listing.with_warning(format!(
                        "channel {name}: endpoints could not be resolved"
                    ));
                }
                Ok(listing)
            }
            ResourceAddress::Channel(name) => match self.channels.find(name).await? {
                Some(_) => Ok(Listing::new(
                    CHANNEL_ATTRIBUTES.iter().map(|a| DirEntry::file(*a)).collect(),
                )),
                None => Err(NfError::not_found(address.path())),
            },
            ResourceAddress::NfType(_)
            | ResourceAddress::InstanceAttribute(..)
            | ResourceAddress::ChannelAttribute(..) => Err(NfError::not_a_directory(address.path())),
        }
    }

    /// Instance names in backend order, or sorted when the backend gives none.
    ///
    /// A failing backend listing fails the whole directory.
    async fn instances(&self, nf_type: &str) -> NfResult<Listing> {
        if !self.catalog.contains(nf_type) {
            return Err(NfError::not_found(format!("{TYPES_ROOT}/{nf_type}")));
        }
        let listing = self.registry.refresh(&self.backend, nf_type).await?;
        let mut names: Vec<String> = listing.items.into_iter().map(|i| i.name).collect();
        if !listing.ordered {
            names.sort();
        }
        Ok(Listing::new(names.into_iter().map(DirEntry::directory).collect()))
    }

    /// Schema attributes, then any extension keys the backend reports.
    ///
    /// If the backend cannot be asked, the schema alone is listed with a warning.
    async fn attributes(&self, key: &InstanceKey) -> NfResult<Listing> {
        let type_spec = self
            .catalog
            .get(&key.nf_type)
            .ok_or_else(|| NfError::not_found(format!("{TYPES_ROOT}/{}", key.nf_type)))?;
        let mut names: Vec<String> = type_spec.schema().into_iter().map(|a| a.name).collect();

        match self.registry.lookup(&self.backend, key).await {
            Ok(Some(instance)) => {
                for extra in instance.extension_keys {
                    if !names.contains(&extra) {
                        names.push(extra);
                    }
                }
                Ok(Listing::new(names.into_iter().map(DirEntry::file).collect()))
            }
            Ok(None) => Err(NfError::not_found(key.to_string())),
            Err(e) => {
                warn!(instance = %key, error = %e, "listing schema attributes only");
                Ok(
                    Listing::new(names.into_iter().map(DirEntry::file).collect()).with_warning(
                        format!("extension attributes of {key} unavailable: {e}"),
                    ),
                )
            }
        }
    }
}
