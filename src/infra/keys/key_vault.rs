use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::SecretStore;
use crate::fetch::{self, BasicClient, HttpClient, Retrying, auth::ApiKey};
use crate::infra::credential::TokenCredential;

pub const KEY_VAULT_API_VERSION: &str = "7.4";
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

#[derive(Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

/// Resolves secrets from an Azure Key Vault over its REST API.
///
/// Every lookup asks the credential for a fresh token; a run performs a
/// single lookup, so nothing is cached.
pub struct KeyVaultSecretStore<C = Retrying<BasicClient>> {
    http: C,
    vault_uri: Url,
    credential: Arc<dyn TokenCredential>,
}

impl KeyVaultSecretStore {
    pub fn new(vault_uri: &str, credential: Arc<dyn TokenCredential>) -> Result<Self> {
        Self::with_client(fetch::default_client()?, vault_uri, credential)
    }
}

impl<C: HttpClient> KeyVaultSecretStore<C> {
    pub fn with_client(
        http: C,
        vault_uri: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self> {
        let vault_uri =
            Url::parse(vault_uri).with_context(|| format!("invalid KeyVaultUri '{vault_uri}'"))?;
        if vault_uri.cannot_be_a_base() {
            anyhow::bail!("invalid KeyVaultUri '{vault_uri}'");
        }
        Ok(Self {
            http,
            vault_uri,
            credential,
        })
    }

    fn secret_url(&self, name: &str) -> Url {
        let mut url = self.vault_uri.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("secrets").push(name);
        }
        url.query_pairs_mut()
            .append_pair("api-version", KEY_VAULT_API_VERSION);
        url
    }
}

#[async_trait::async_trait]
impl<C: HttpClient> SecretStore for KeyVaultSecretStore<C> {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let token = self
            .credential
            .get_token(KEY_VAULT_SCOPE)
            .await
            .context("Failed to authenticate to Key Vault")?;

        let url = self.secret_url(name);
        debug!(vault = %self.vault_uri, secret = name, "Fetching secret");

        let resp = ApiKey::bearer(&self.http, &token.secret)?
            .execute(fetch::get(url))
            .await
            .with_context(|| format!("Key Vault GetSecret failed for '{name}'"))?;
        let resp = fetch::error_for_status(resp, &format!("Key Vault GetSecret for '{name}'")).await?;

        let bundle: SecretBundle = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Key Vault response for '{name}'"))?;

        bundle
            .value
            .ok_or_else(|| anyhow::anyhow!("Key Vault secret '{name}' exists but has no value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::credential::StaticTokenCredential;

    fn store(uri: &str) -> Result<KeyVaultSecretStore<BasicClient>> {
        KeyVaultSecretStore::with_client(
            BasicClient::new().unwrap(),
            uri,
            Arc::new(StaticTokenCredential::new("t")),
        )
    }

    #[test]
    fn test_secret_url_with_and_without_trailing_slash() {
        for uri in ["https://myvault.vault.azure.net/", "https://myvault.vault.azure.net"] {
            let url = store(uri).unwrap().secret_url("storage-sas");
            assert_eq!(
                url.as_str(),
                "https://myvault.vault.azure.net/secrets/storage-sas?api-version=7.4"
            );
        }
    }

    #[test]
    fn test_secret_name_is_escaped() {
        let url = store("https://v.vault.azure.net").unwrap().secret_url("a/b");
        assert_eq!(url.path(), "/secrets/a%2Fb");
    }

    #[test]
    fn test_invalid_vault_uri() {
        assert!(store("not a url").is_err());
        assert!(store("mailto:someone@example.com").is_err());
    }
}
