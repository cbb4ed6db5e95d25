use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BlobStore, ContainerName, ContainerStatus, StorageConnector};

#[derive(Debug, Clone)]
struct StoredBlob {
    body: Vec<u8>,
    content_type: String,
}

type Containers = HashMap<String, BTreeMap<String, StoredBlob>>;

/// A storage account held in process memory. Behaves like the real services
/// where the job can observe it: uploads to a missing container and downloads
/// of a missing blob fail.
#[derive(Default)]
pub struct MemoryBlobStore {
    containers: Mutex<Containers>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Containers> {
        // a panicking writer cannot leave a half-written map behind
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn container_count(&self) -> usize {
        self.lock().len()
    }

    pub fn blob_names(&self, container: &str) -> Vec<String> {
        self.lock()
            .get(container)
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn blob(&self, container: &str, blob: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(container)
            .and_then(|blobs| blobs.get(blob))
            .map(|b| b.body.clone())
    }

    pub fn content_type(&self, container: &str, blob: &str) -> Option<String> {
        self.lock()
            .get(container)
            .and_then(|blobs| blobs.get(blob))
            .map(|b| b.content_type.clone())
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create_container_if_not_exists(&self, container: &ContainerName) -> Result<ContainerStatus> {
        let mut containers = self.lock();
        if containers.contains_key(container.as_str()) {
            return Ok(ContainerStatus::AlreadyExists);
        }
        containers.insert(container.to_string(), BTreeMap::new());
        Ok(ContainerStatus::Created)
    }

    async fn upload(
        &self,
        container: &ContainerName,
        blob: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let mut containers = self.lock();
        let blobs = containers
            .get_mut(container.as_str())
            .ok_or_else(|| anyhow::anyhow!("container '{container}' does not exist"))?;
        blobs.insert(
            blob.to_string(),
            StoredBlob {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download(&self, container: &ContainerName, blob: &str) -> Result<Vec<u8>> {
        self.blob(container.as_str(), blob)
            .ok_or_else(|| anyhow::anyhow!("blob '{container}/{blob}' does not exist"))
    }
}

/// Hands out a shared [`MemoryBlobStore`], accepting only the expected
/// account and access key so a run proves it passed the right credentials.
pub struct MemoryConnector {
    pub store: Arc<MemoryBlobStore>,
    pub account_name: String,
    pub access_key: String,
}

#[async_trait::async_trait]
impl StorageConnector for MemoryConnector {
    async fn connect(&self, account_name: &str, access_key: String) -> Result<Box<dyn BlobStore>> {
        if account_name != self.account_name {
            anyhow::bail!("storage account '{account_name}' not found");
        }
        if access_key != self.access_key {
            anyhow::bail!("authentication failed for storage account '{account_name}'");
        }
        Ok(Box::new(self.store.clone()))
    }
}
