//! Secret retrieval.
//!
//! [`SecretStore`] is the async trait for resolving a secret name into its plaintext value.
//! [`KeyVaultSecretStore`] implements it against an Azure Key Vault.
//! [`MemorySecretStore`] keeps secrets in process for tests and local runs.

mod key_vault;
mod memory;

pub use key_vault::{KEY_VAULT_API_VERSION, KEY_VAULT_SCOPE, KeyVaultSecretStore};
pub use memory::MemorySecretStore;

use anyhow::Result;

/// Resolves a secret name into its plaintext value.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String>;
}
