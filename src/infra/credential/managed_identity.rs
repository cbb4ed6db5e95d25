use anyhow::{Context, Result};
use chrono::DateTime;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

use super::{AccessToken, EnvLookup, TokenCredential, scope_to_resource};
use crate::fetch::{self, BasicClient, HttpClient, Retrying, auth::ApiKey};

/// Instance metadata service token endpoint, used when the host does not
/// advertise its own identity endpoint.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Off Azure nothing answers on the link-local address, so the IMDS call is
/// sent once with tight timeouts and the chain moves on.
pub const IMDS_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const IMDS_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix seconds; hosts disagree on whether this is a string or a number.
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
}

enum Endpoint {
    /// App Service / Functions: `IDENTITY_ENDPOINT` guarded by `IDENTITY_HEADER`.
    AppService { url: String, secret: String },
    Imds { url: String },
}

/// Token from the hosting platform's managed identity.
pub struct ManagedIdentityCredential<C = Retrying<BasicClient>> {
    http: C,
    endpoint: Endpoint,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self> {
        let client_id = env("AZURE_CLIENT_ID");
        Ok(
            match (env("IDENTITY_ENDPOINT"), env("IDENTITY_HEADER")) {
                (Some(url), Some(secret)) => {
                    Self::app_service(fetch::default_client()?, &url, &secret, client_id)
                }
                _ => {
                    let http = BasicClient::with_timeouts(IMDS_REQUEST_TIMEOUT, IMDS_CONNECT_TIMEOUT)?;
                    Self::imds(Retrying::once(http), IMDS_ENDPOINT, client_id)
                }
            },
        )
    }
}

impl<C: HttpClient> ManagedIdentityCredential<C> {
    pub fn app_service(http: C, url: &str, secret: &str, client_id: Option<String>) -> Self {
        Self {
            http,
            endpoint: Endpoint::AppService {
                url: url.to_string(),
                secret: secret.to_string(),
            },
            client_id,
        }
    }

    pub fn imds(http: C, url: &str, client_id: Option<String>) -> Self {
        Self {
            http,
            endpoint: Endpoint::Imds {
                url: url.to_string(),
            },
            client_id,
        }
    }
}

fn parse_expiry(value: &serde_json::Value) -> Option<DateTime<chrono::Utc>> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

#[async_trait::async_trait]
impl<C: HttpClient> TokenCredential for ManagedIdentityCredential<C> {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let resource = scope_to_resource(scope);
        let (base, api_version) = match &self.endpoint {
            Endpoint::AppService { url, .. } => (url, "2019-08-01"),
            Endpoint::Imds { url } => (url, "2018-02-01"),
        };

        let mut url = Url::parse(base).with_context(|| format!("invalid identity endpoint '{base}'"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            query.append_pair("resource", resource);
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }

        let resp = match &self.endpoint {
            Endpoint::AppService { secret, .. } => {
                ApiKey::new(&self.http, "X-IDENTITY-HEADER", secret)?
                    .execute(fetch::get(url))
                    .await
            }
            Endpoint::Imds { .. } => {
                ApiKey::new(&self.http, "Metadata", "true")?
                    .execute(fetch::get(url))
                    .await
            }
        }
        .context("Failed to reach managed identity endpoint")?;

        let resp = fetch::error_for_status(resp, "Managed identity token request").await?;
        let token: TokenResponse = resp
            .json()
            .await
            .context("Failed to parse managed identity token response")?;

        Ok(AccessToken {
            secret: token.access_token,
            expires_at: token.expires_on.as_ref().and_then(parse_expiry),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_imds_is_tried_once() {
        let env = lookup(&[]);
        let credential = ManagedIdentityCredential::from_lookup(&env).unwrap();
        assert!(matches!(&credential.endpoint, Endpoint::Imds { url } if url == IMDS_ENDPOINT));
        assert_eq!(credential.http.max_attempts, 1);
    }

    #[test]
    fn test_app_service_endpoint_keeps_retries() {
        let env = lookup(&[
            ("IDENTITY_ENDPOINT", "http://localhost:4141/msi/token"),
            ("IDENTITY_HEADER", "hdr"),
        ]);
        let credential = ManagedIdentityCredential::from_lookup(&env).unwrap();
        assert!(matches!(credential.endpoint, Endpoint::AppService { .. }));
        assert_eq!(credential.http.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_unreachable_imds_fails_fast() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/metadata/identity/oauth2/token", listener.local_addr().unwrap());
        drop(listener);

        let http = BasicClient::with_timeouts(IMDS_REQUEST_TIMEOUT, IMDS_CONNECT_TIMEOUT).unwrap();
        let credential = ManagedIdentityCredential::imds(Retrying::once(http), &url, None);

        let started = std::time::Instant::now();
        let err = credential.get_token("https://vault.azure.net/.default").await.unwrap_err();
        assert!(format!("{err:#}").contains("managed identity endpoint"));
        assert!(started.elapsed() < IMDS_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_parse_expiry_accepts_string_and_number() {
        let from_str = parse_expiry(&serde_json::json!("1700000000")).unwrap();
        let from_num = parse_expiry(&serde_json::json!(1700000000)).unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(from_num.timestamp(), 1_700_000_000);
        assert!(parse_expiry(&serde_json::json!(null)).is_none());
    }
}
