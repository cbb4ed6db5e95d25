use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;

use super::{AccessToken, EnvLookup, TokenCredential};
use crate::fetch::{self, BasicClient, HttpClient, Retrying};

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Service principal authentication with the OAuth2 client-credentials grant.
pub struct ClientSecretCredential<C = Retrying<BasicClient>> {
    http: C,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    /// Returns `None` unless `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET` are all set.
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Option<Self>> {
        let (Some(tenant_id), Some(client_id), Some(client_secret)) = (
            env("AZURE_TENANT_ID"),
            env("AZURE_CLIENT_ID"),
            env("AZURE_CLIENT_SECRET"),
        ) else {
            return Ok(None);
        };
        let authority_host =
            env("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        Ok(Some(Self::with_client(
            fetch::default_client()?,
            &authority_host,
            &tenant_id,
            &client_id,
            &client_secret,
        )))
    }
}

impl<C: HttpClient> ClientSecretCredential<C> {
    pub fn with_client(
        http: C,
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            http,
            authority_host: authority_host.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    fn token_url(&self) -> Result<Url> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id);
        Url::parse(&url).with_context(|| format!("invalid token endpoint '{url}'"))
    }
}

#[async_trait::async_trait]
impl<C: HttpClient> TokenCredential for ClientSecretCredential<C> {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let req = fetch::form_post(
            self.token_url()?,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("scope", scope),
            ],
        )?;

        let resp = self
            .http
            .execute(req)
            .await
            .context("Failed to send token request")?;
        let resp = fetch::error_for_status(resp, "Token request").await?;
        let token: TokenResponse = resp
            .json()
            .await
            .context("Failed to parse token response")?;

        Ok(AccessToken {
            secret: token.access_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }
}
