//! Object storage.
//!
//! [`BlobStore`] is the async trait over a storage account. [`StorageConnector`]
//! builds one from the account name and the access key fetched from the
//! secret store. [`Container`] pairs a store with a validated container name
//! and is what the job writes through.

mod azure;
mod memory;
mod name;

pub use azure::{AZURE_STORAGE_API_VERSION, AzureBlobStore, AzureConnector};
pub use memory::{MemoryBlobStore, MemoryConnector};
pub use name::ContainerName;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Outcome of [`BlobStore::create_container_if_not_exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    AlreadyExists,
}

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Creates the container unless it is already there. Calling it again for
    /// the same name is not an error.
    async fn create_container_if_not_exists(&self, container: &ContainerName) -> Result<ContainerStatus>;

    /// Creates or replaces `blob` with `body`.
    async fn upload(
        &self,
        container: &ContainerName,
        blob: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    /// Returns the full content of `blob`.
    async fn download(&self, container: &ContainerName, blob: &str) -> Result<Vec<u8>>;
}

#[async_trait::async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn create_container_if_not_exists(&self, container: &ContainerName) -> Result<ContainerStatus> {
        (**self).create_container_if_not_exists(container).await
    }

    async fn upload(
        &self,
        container: &ContainerName,
        blob: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        (**self).upload(container, blob, body, content_type).await
    }

    async fn download(&self, container: &ContainerName, blob: &str) -> Result<Vec<u8>> {
        (**self).download(container, blob).await
    }
}

/// Builds a [`BlobStore`] for one storage account, authenticated with the
/// access key retrieved from the secret store.
#[async_trait::async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(&self, account_name: &str, access_key: String) -> Result<Box<dyn BlobStore>>;
}

/// A store bound to one existing container.
pub struct Container<'a> {
    store: &'a dyn BlobStore,
    name: ContainerName,
    status: ContainerStatus,
}

impl Container<'_> {
    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Whether [`ensure_container`] had to create the container.
    pub fn status(&self) -> ContainerStatus {
        self.status
    }

    pub async fn upload(&self, blob: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.store.upload(&self.name, blob, body, content_type).await
    }

    pub async fn download(&self, blob: &str) -> Result<Vec<u8>> {
        self.store.download(&self.name, blob).await
    }
}

/// Validates `name` and makes sure the container exists.
pub async fn ensure_container<'a>(store: &'a dyn BlobStore, name: &str) -> Result<Container<'a>> {
    let name = ContainerName::parse(name)?;
    let status = store.create_container_if_not_exists(&name).await?;
    match status {
        ContainerStatus::Created => info!(container = %name, "Container created"),
        ContainerStatus::AlreadyExists => info!(container = %name, "Container already exists"),
    }
    Ok(Container {
        store,
        name,
        status,
    })
}
