//! The translation engine: filesystem calls in, orchestration calls out.
//!
//! ```text
//!   transport ──▶ NfEngine (VfsOps)
//!                    │ resolve(path) ─▶ ResourceAddress
//!                    │ LockTable       per-address guards
//!                    ├─▶ DirectoryProvider   readdir
//!                    ├─▶ ContentEngine       read / write / truncate
//!                    ├─▶ LifecycleController mkdir / rmdir under nf-types
//!                    └─▶ ChannelManager      mkdir / rmdir under chns
//!                                  │
//!                            BackendClient ─▶ OrchestrationBackend
//! ```
//!
//! Attribute calls lock the instance (shared) before the attribute, so an
//! rmdir of the instance waits for in-flight attribute writes and excludes
//! new ones.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use nfio_types::{ChannelRequest, InstanceKey};

use crate::address::{self, ResourceAddress, is_valid_instance_name, is_valid_type_name};
use crate::backend::{BackendClient, ClientSettings, OrchestrationBackend};
use crate::catalog::TypeCatalog;
use crate::channels::{ChannelManager, ChannelView};
use crate::config::{ConfigError, NfioConfig};
use crate::content::{self, BoundAttribute, ContentEngine};
use crate::directory::DirectoryProvider;
use crate::error::{NfError, NfResult};
use crate::guard::{LockTable, ResourceGuard};
use crate::lifecycle::LifecycleController;
use crate::registry::InstanceRegistry;
use crate::vfs::{DirEntry, FileAttr, Listing, VfsOps};

const DIR_PERM: u32 = 0o755;
const READ_ONLY_PERM: u32 = 0o444;

pub struct NfEngine {
    catalog: Arc<TypeCatalog>,
    backend: BackendClient,
    locks: LockTable,
    registry: Arc<InstanceRegistry>,
    channels: Arc<ChannelManager>,
    lifecycle: LifecycleController,
    content: ContentEngine,
    directory: DirectoryProvider,
}

impl NfEngine {
    pub fn new(catalog: TypeCatalog, backend: BackendClient) -> Self {
        let catalog = Arc::new(catalog);
        let locks = LockTable::new();
        let registry = Arc::new(InstanceRegistry::new());
        let channels = Arc::new(ChannelManager::new(
            backend.clone(),
            registry.clone(),
            catalog.clone(),
            locks.clone(),
        ));
        let lifecycle =
            LifecycleController::new(backend.clone(), registry.clone(), channels.clone());
        let content = ContentEngine::new(catalog.clone(), backend.clone(), registry.clone());
        let directory = DirectoryProvider::new(
            catalog.clone(),
            backend.clone(),
            registry.clone(),
            channels.clone(),
        );
        Self {
            catalog,
            backend,
            locks,
            registry,
            channels,
            lifecycle,
            content,
            directory,
        }
    }

    /// Build an engine from a configuration and a backend.
    pub fn from_config(
        config: &NfioConfig,
        backend: Arc<dyn OrchestrationBackend>,
    ) -> Result<Self, ConfigError> {
        let catalog = config.catalog()?;
        Ok(Self::new(
            catalog,
            BackendClient::new(backend, config.client_settings()),
        ))
    }

    /// Engine over `backend` with default client settings.
    pub fn with_backend(catalog: TypeCatalog, backend: Arc<dyn OrchestrationBackend>) -> Self {
        Self::new(catalog, BackendClient::new(backend, ClientSettings::default()))
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    fn resolve(path: &Path) -> NfResult<ResourceAddress> {
        address::resolve(&path.to_string_lossy())
    }

    /// List a directory, keeping partial-failure warnings.
    pub async fn list_directory(&self, path: &Path) -> NfResult<Listing> {
        let address = Self::resolve(path)?;
        debug!(address = %address, "readdir");
        let _guard = self.lock_directory(&address).await;
        self.directory.list(&address).await
    }

    /// Shared lock for a directory read. Channel directories take none:
    /// resolving them may tear down a dangling channel under its own name.
    async fn lock_directory(&self, address: &ResourceAddress) -> Option<ResourceGuard> {
        match address {
            ResourceAddress::Channel(_) => None,
            a => Some(self.locks.read(a).await),
        }
    }

    fn require_type(&self, nf_type: &str) -> NfResult<()> {
        if self.catalog.contains(nf_type) {
            Ok(())
        } else {
            Err(NfError::not_found(format!("{}/{nf_type}", address::TYPES_ROOT)))
        }
    }

    /// Attributes of a directory address, after checking it exists.
    async fn directory_attr(&self, address: &ResourceAddress) -> NfResult<FileAttr> {
        match address {
            ResourceAddress::Root
            | ResourceAddress::TypeCatalog
            | ResourceAddress::ChannelCollection => {}
            ResourceAddress::InstanceCollection(nf_type) => self.require_type(nf_type)?,
            ResourceAddress::Instance(key) => {
                self.require_type(&key.nf_type)?;
                if self.registry.lookup(&self.backend, key).await?.is_none() {
                    return Err(NfError::not_found(address.path()));
                }
            }
            ResourceAddress::Channel(name) => {
                self.channel(name).await?;
            }
            _ => return Err(NfError::not_a_directory(address.path())),
        }
        Ok(FileAttr::directory(DIR_PERM))
    }

    async fn channel(&self, name: &str) -> NfResult<ChannelView> {
        self.channels
            .find(name)
            .await?
            .ok_or_else(|| NfError::not_found(format!("{}/{name}", address::CHANNELS_ROOT)))
    }

    async fn channel_attribute(&self, name: &str, attr: &str) -> NfResult<Vec<u8>> {
        let view = self.channel(name).await?;
        view.attribute(attr)
            .map(String::into_bytes)
            .ok_or_else(|| NfError::not_found(format!("{}/{name}/{attr}", address::CHANNELS_ROOT)))
    }

    /// Shared instance lock, then the attribute lock, then bind.
    async fn lock_attribute(
        &self,
        key: &InstanceKey,
        attr: &str,
        exclusive: bool,
    ) -> NfResult<(BoundAttribute, [ResourceGuard; 2])> {
        let instance = self
            .locks
            .read(&ResourceAddress::Instance(key.clone()))
            .await;
        let attr_address = ResourceAddress::InstanceAttribute(key.clone(), attr.to_string());
        let attribute = if exclusive {
            self.locks.write(&attr_address).await
        } else {
            self.locks.read(&attr_address).await
        };
        let bound = self.content.bind(key, attr).await?;
        Ok((bound, [instance, attribute]))
    }

    fn parse_channel_request(name: &str) -> NfResult<ChannelRequest> {
        let request = ChannelRequest::parse(name).ok_or_else(|| {
            NfError::validation(format!(
                "{name:?}: channels are requested as <type>:<name>+<type>:<name>"
            ))
        })?;
        for endpoint in [&request.source, &request.destination] {
            if !is_valid_type_name(&endpoint.nf_type) || !is_valid_instance_name(&endpoint.name) {
                return Err(NfError::validation(format!(
                    "{} is not a valid endpoint",
                    endpoint.endpoint()
                )));
            }
        }
        Ok(request)
    }
}

#[async_trait]
impl VfsOps for NfEngine {
    async fn getattr(&self, path: &Path) -> NfResult<FileAttr> {
        let address = Self::resolve(path)?;
        debug!(address = %address, "getattr");
        match &address {
            a if a.is_directory() => {
                let _guard = self.lock_directory(a).await;
                self.directory_attr(a).await
            }
            ResourceAddress::NfType(nf_type) => {
                let schema = self.content.schema(nf_type)?;
                Ok(FileAttr::file(schema.len() as u64, READ_ONLY_PERM))
            }
            ResourceAddress::InstanceAttribute(key, attr) => {
                let (bound, _guards) = self.lock_attribute(key, attr, false).await?;
                let size = self.content.size(&bound).await?;
                Ok(FileAttr::file(size, bound.spec.perm()))
            }
            ResourceAddress::ChannelAttribute(name, attr) => {
                let data = self.channel_attribute(name, attr).await?;
                Ok(FileAttr::file(data.len() as u64, READ_ONLY_PERM))
            }
            _ => Err(NfError::not_found(address.path())),
        }
    }

    async fn readdir(&self, path: &Path) -> NfResult<Vec<DirEntry>> {
        Ok(self.list_directory(path).await?.entries)
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> NfResult<Vec<u8>> {
        let address = Self::resolve(path)?;
        debug!(address = %address, offset, size, "read");
        let data = match &address {
            a if a.is_directory() => return Err(NfError::is_a_directory(a.path())),
            ResourceAddress::NfType(nf_type) => self.content.schema(nf_type)?,
            ResourceAddress::InstanceAttribute(key, attr) => {
                let (bound, _guards) = self.lock_attribute(key, attr, false).await?;
                self.content.read(&bound).await?
            }
            ResourceAddress::ChannelAttribute(name, attr) => {
                self.channel_attribute(name, attr).await?
            }
            _ => return Err(NfError::not_found(address.path())),
        };
        Ok(content::window(&data, offset, size))
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> NfResult<u32> {
        let address = Self::resolve(path)?;
        debug!(address = %address, offset, len = data.len(), "write");
        match &address {
            a if a.is_directory() => Err(NfError::is_a_directory(a.path())),
            ResourceAddress::InstanceAttribute(key, attr) => {
                let (bound, _guards) = self.lock_attribute(key, attr, true).await?;
                self.content.write(&bound, offset, data).await
            }
            _ => Err(NfError::not_permitted(format!("{address} is read-only"))),
        }
    }

    async fn create(&self, path: &Path, _mode: u32) -> NfResult<FileAttr> {
        let address = Self::resolve(path)?;
        Err(NfError::not_permitted(format!(
            "{address}: files cannot be created"
        )))
    }

    async fn mkdir(&self, path: &Path, _mode: u32) -> NfResult<FileAttr> {
        let address = Self::resolve(path)?;
        debug!(address = %address, "mkdir");
        match &address {
            ResourceAddress::Instance(key) => {
                self.require_type(&key.nf_type)?;
                let _guard = self.locks.write(&address).await;
                self.lifecycle.create(key).await?;
                Ok(FileAttr::directory(DIR_PERM))
            }
            ResourceAddress::Channel(name) => {
                let request = Self::parse_channel_request(name)?;
                self.channels.connect(&request).await?;
                Ok(FileAttr::directory(DIR_PERM))
            }
            _ => Err(NfError::not_permitted(format!(
                "{address}: directories here are fixed by configuration"
            ))),
        }
    }

    async fn unlink(&self, path: &Path) -> NfResult<()> {
        let address = Self::resolve(path)?;
        Err(NfError::not_permitted(format!(
            "{address}: files cannot be removed"
        )))
    }

    async fn rmdir(&self, path: &Path) -> NfResult<()> {
        let address = Self::resolve(path)?;
        debug!(address = %address, "rmdir");
        match &address {
            ResourceAddress::Instance(key) => {
                self.require_type(&key.nf_type)?;
                let _guard = self.locks.write(&address).await;
                self.lifecycle.destroy(key).await?;
                Ok(())
            }
            ResourceAddress::Channel(name) => {
                self.channels.disconnect(name).await?;
                Ok(())
            }
            a if !a.is_directory() => Err(NfError::not_a_directory(a.path())),
            _ => Err(NfError::not_permitted(format!(
                "{address}: directories here are fixed by configuration"
            ))),
        }
    }

    async fn rename(&self, from: &Path, _to: &Path) -> NfResult<()> {
        let address = Self::resolve(from)?;
        Err(NfError::not_permitted(format!("{address}: rename is not supported")))
    }

    async fn truncate(&self, path: &Path, size: u64) -> NfResult<()> {
        let address = Self::resolve(path)?;
        debug!(address = %address, size, "truncate");
        match &address {
            a if a.is_directory() => Err(NfError::is_a_directory(a.path())),
            ResourceAddress::InstanceAttribute(key, attr) => {
                let (bound, _guards) = self.lock_attribute(key, attr, true).await?;
                self.content.truncate(&bound, size)
            }
            _ => Err(NfError::not_permitted(format!("{address} is read-only"))),
        }
    }
}
