//! Outbound HTTP plumbing shared by the credential, secret and blob clients.

mod basic;
mod client;
mod retry;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use retry::Retrying;

use anyhow::Result;
use reqwest::{Method, Request, Response, Url};

/// The client every production call uses: timeouts plus retry.
pub fn default_client() -> Result<Retrying<BasicClient>> {
    Ok(Retrying::new(BasicClient::new()?))
}

/// Builds a `GET` request for `url`.
pub fn get(url: Url) -> Request {
    Request::new(Method::GET, url)
}

/// Builds an `application/x-www-form-urlencoded` `POST`.
pub fn form_post(url: Url, params: &[(&str, &str)]) -> Result<Request> {
    let mut encoder = Url::parse("http://form.invalid/")?;
    encoder.query_pairs_mut().extend_pairs(params);
    let body = encoder.query().unwrap_or_default().to_string();

    let mut req = Request::new(Method::POST, url);
    req.headers_mut().insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    *req.body_mut() = Some(body.into());
    Ok(req)
}

/// Passes successful responses through and turns anything else into an error
/// carrying the status and response body.
pub async fn error_for_status(resp: Response, what: &str) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(anyhow::anyhow!("{what} failed with status {status}: {body}"))
}
