//! Credential-injecting [`HttpClient`](super::HttpClient) decorators.

mod api_key;
mod sas_token;

pub use api_key::ApiKey;
pub use sas_token::SasToken;
