use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends a shared access signature to the
/// query string of every request.
///
/// The token is appended verbatim (it is already percent-encoded by whoever
/// issued it); any query the request already has is kept in front of it.
pub struct SasToken<C> {
    pub inner: C,
    token: String,
}

impl<C> SasToken<C> {
    pub fn new(inner: C, token: &str) -> Self {
        Self {
            inner,
            token: token.trim().trim_start_matches('?').to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for SasToken<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        if !self.token.is_empty() {
            let query = match req.url().query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{}", self.token),
                _ => self.token.clone(),
            };
            req.url_mut().set_query(Some(&query));
        }
        self.inner.execute(req).await
    }
}
