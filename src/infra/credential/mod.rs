//! Ambient credential discovery.
//!
//! [`TokenCredential`] is the one-method seam the secret store authenticates
//! through. [`DefaultCredential`] walks the sources configured in the
//! environment in order: a fixed token, a service principal secret, then the
//! platform managed identity.

mod client_secret;
mod managed_identity;

pub use client_secret::ClientSecretCredential;
pub use managed_identity::ManagedIdentityCredential;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{debug, warn};

/// Looks up an environment variable. Injected so tests never touch the real
/// process environment.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Reads from the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// A bearer token and, when the issuer reported one, its expiry.
#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Resolves a bearer token for an OAuth scope such as
/// `https://vault.azure.net/.default`.
#[async_trait::async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

/// A fixed token, taken from `AZURE_ACCESS_TOKEN` or supplied directly.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
        Ok(AccessToken::new(self.token.clone()))
    }
}

/// Tries each configured source in order and returns the first token.
pub struct DefaultCredential {
    sources: Vec<(&'static str, Box<dyn TokenCredential>)>,
}

impl DefaultCredential {
    /// Builds the chain from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self> {
        let mut sources: Vec<(&'static str, Box<dyn TokenCredential>)> = Vec::new();

        if let Some(token) = env("AZURE_ACCESS_TOKEN") {
            sources.push(("static token", Box::new(StaticTokenCredential::new(token))));
        }
        if let Some(credential) = ClientSecretCredential::from_lookup(env)? {
            sources.push(("client secret", Box::new(credential)));
        }
        sources.push((
            "managed identity",
            Box::new(ManagedIdentityCredential::from_lookup(env)?),
        ));

        Ok(Self { sources })
    }

    pub fn with_sources(sources: Vec<(&'static str, Box<dyn TokenCredential>)>) -> Self {
        Self { sources }
    }

    /// Names of the sources in the order they are tried.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|(name, _)| *name).collect()
    }
}

#[async_trait::async_trait]
impl TokenCredential for DefaultCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let mut failures = Vec::new();
        for (name, source) in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    debug!(source = name, scope, "Acquired access token");
                    return Ok(token);
                }
                Err(e) => {
                    warn!(source = name, error = %e, "Credential source failed");
                    failures.push(format!("{name}: {e:#}"));
                }
            }
        }
        Err(anyhow::anyhow!(
            "no credential source produced a token for '{scope}' ({})",
            failures.join("; ")
        ))
    }
}

/// Azure AD v1 resource identifiers are the scope without `/.default`.
pub(crate) fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Failing;

    #[async_trait::async_trait]
    impl TokenCredential for Failing {
        async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
            anyhow::bail!("not available here")
        }
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_chain_order_from_env() {
        let env = lookup(&[
            ("AZURE_ACCESS_TOKEN", "t"),
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "secret"),
        ]);
        let chain = DefaultCredential::from_lookup(&env).unwrap();
        assert_eq!(
            chain.source_names(),
            vec!["static token", "client secret", "managed identity"]
        );
    }

    #[test]
    fn test_managed_identity_is_always_last_resort() {
        let env = lookup(&[]);
        let chain = DefaultCredential::from_lookup(&env).unwrap();
        assert_eq!(chain.source_names(), vec!["managed identity"]);
    }

    #[tokio::test]
    async fn test_first_successful_source_wins() {
        let chain = DefaultCredential::with_sources(vec![
            ("failing", Box::new(Failing)),
            ("static", Box::new(StaticTokenCredential::new("abc"))),
        ]);
        let token = chain.get_token("https://vault.azure.net/.default").await.unwrap();
        assert_eq!(token.secret, "abc");
    }

    #[tokio::test]
    async fn test_all_failures_are_reported() {
        let chain = DefaultCredential::with_sources(vec![
            ("first", Box::new(Failing)),
            ("second", Box::new(Failing)),
        ]);
        let err = chain.get_token("scope").await.unwrap_err().to_string();
        assert!(err.contains("first: not available here"));
        assert!(err.contains("second: not available here"));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[test]
    fn test_scope_to_resource() {
        assert_eq!(scope_to_resource("https://vault.azure.net/.default"), "https://vault.azure.net");
        assert_eq!(scope_to_resource("https://vault.azure.net"), "https://vault.azure.net");
    }
}
