use anyhow::{Context, Result};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};
use tracing::debug;

use super::{BlobStore, ContainerName, ContainerStatus, StorageConnector};
use crate::fetch::{self, BasicClient, HttpClient, Retrying, auth::SasToken};

/// Blob service REST version sent with every request.
pub const AZURE_STORAGE_API_VERSION: &str = "2023-11-03";

const CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";

/// Azure Blob Storage over its REST API, authenticated with a shared access
/// signature appended to every request.
pub struct AzureBlobStore<C = Retrying<BasicClient>> {
    http: SasToken<C>,
    endpoint: Url,
}

impl AzureBlobStore {
    /// Store for `https://<account>.blob.core.windows.net`.
    pub fn new(account_name: &str, sas_token: &str) -> Result<Self> {
        let endpoint = format!("https://{account_name}.blob.core.windows.net");
        Self::with_endpoint(fetch::default_client()?, &endpoint, sas_token)
    }
}

impl<C: HttpClient> AzureBlobStore<C> {
    /// Store for an explicit service endpoint, e.g. a local emulator at
    /// `http://127.0.0.1:10000/devstoreaccount1`.
    pub fn with_endpoint(http: C, endpoint: &str, sas_token: &str) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid blob endpoint '{endpoint}'"))?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("invalid blob endpoint '{endpoint}'");
        }
        Ok(Self {
            http: SasToken::new(http, sas_token),
            endpoint,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> Request {
        let mut req = Request::new(method, url);
        req.headers_mut().insert(
            "x-ms-version",
            HeaderValue::from_static(AZURE_STORAGE_API_VERSION),
        );
        req
    }
}

#[async_trait::async_trait]
impl<C: HttpClient> BlobStore for AzureBlobStore<C> {
    async fn create_container_if_not_exists(&self, container: &ContainerName) -> Result<ContainerStatus> {
        let mut url = self.url(&[container.as_str()]);
        url.query_pairs_mut().append_pair("restype", "container");

        let mut req = self.request(Method::PUT, url);
        // Create Container requires an explicit zero Content-Length
        *req.body_mut() = Some(Vec::new().into());

        let resp = self
            .http
            .execute(req)
            .await
            .with_context(|| format!("Create Container request failed for '{container}'"))?;

        if resp.status() == StatusCode::CONFLICT {
            let code = resp
                .headers()
                .get("x-ms-error-code")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if code == CONTAINER_ALREADY_EXISTS {
                return Ok(ContainerStatus::AlreadyExists);
            }
        }

        fetch::error_for_status(resp, &format!("Create Container '{container}'")).await?;
        Ok(ContainerStatus::Created)
    }

    async fn upload(
        &self,
        container: &ContainerName,
        blob: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = self.url(&[container.as_str(), blob]);
        let bytes = body.len();

        let mut req = self.request(Method::PUT, url);
        req.headers_mut()
            .insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        req.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type).context("invalid content type")?,
        );
        *req.body_mut() = Some(body.into());

        let resp = self
            .http
            .execute(req)
            .await
            .with_context(|| format!("Put Blob request failed for '{container}/{blob}'"))?;
        fetch::error_for_status(resp, &format!("Put Blob '{container}/{blob}'")).await?;

        debug!(container = %container, blob, bytes, "Blob uploaded");
        Ok(())
    }

    async fn download(&self, container: &ContainerName, blob: &str) -> Result<Vec<u8>> {
        let url = self.url(&[container.as_str(), blob]);
        let req = self.request(Method::GET, url);

        let resp = self
            .http
            .execute(req)
            .await
            .with_context(|| format!("Get Blob request failed for '{container}/{blob}'"))?;
        let resp = fetch::error_for_status(resp, &format!("Get Blob '{container}/{blob}'")).await?;

        let body = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of '{container}/{blob}'"))?;
        debug!(container = %container, blob, bytes = body.len(), "Blob downloaded");
        Ok(body.to_vec())
    }
}

/// Connects to `https://<account>.blob.core.windows.net`, or to `endpoint`
/// when one is configured, using the secret as a SAS token.
#[derive(Default)]
pub struct AzureConnector {
    pub endpoint: Option<String>,
}

#[async_trait::async_trait]
impl StorageConnector for AzureConnector {
    async fn connect(&self, account_name: &str, access_key: String) -> Result<Box<dyn BlobStore>> {
        let store = match &self.endpoint {
            Some(endpoint) => {
                AzureBlobStore::with_endpoint(fetch::default_client()?, endpoint, &access_key)?
            }
            None => AzureBlobStore::new(account_name, &access_key)?,
        };
        Ok(Box::new(store))
    }
}
