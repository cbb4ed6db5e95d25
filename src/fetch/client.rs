use async_trait::async_trait;
use reqwest::{Request, Response};

/// The single seam every outbound HTTP call goes through, so auth and retry
/// can be layered as decorators.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for &T {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
