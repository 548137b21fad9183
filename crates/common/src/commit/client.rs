use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use url::Url;

use super::token::BearerToken;
use crate::linked_data::Cid;

/// API version segment used when none is configured.
pub const DEFAULT_API_VERSION: &str = "v2";

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("unexpected response for data root lookup of {0}: {1}")]
    UnexpectedResponse(String, serde_json::Value),
}

/// Client for the account service's data-root endpoints.
#[derive(Debug, Clone)]
pub struct AccountClient {
    remote: Url,
    api_version: String,
    client: Client,
}

impl AccountClient {
    pub fn new(remote: &Url, api_version: &str) -> Result<Self, AccountError> {
        let mut remote = remote.clone();
        if !remote.path().ends_with('/') {
            let path = format!("{}/", remote.path());
            remote.set_path(&path);
        }
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote,
            api_version: api_version.trim_matches('/').to_string(),
            client,
        })
    }

    pub fn remote(&self) -> &Url {
        &self.remote
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn data_endpoint(&self, tail: &str) -> Result<Url, AccountError> {
        Ok(self
            .remote
            .join(&format!("{}/api/user/data/{}", self.api_version, tail))?)
    }

    /// Look up the data root published for `username`.
    ///
    /// `None` means the account has no filesystem attached: the service
    ///  answered with an error status, or with a string that is not a CID.
    pub async fn data_root(&self, username: &str) -> Result<Option<Cid>, AccountError> {
        let url = self.data_endpoint(username)?;
        tracing::debug!("AccountClient::data_root: GET {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            tracing::debug!(
                "data root lookup for {} answered {}",
                username,
                response.status()
            );
            return Ok(None);
        }

        match response.json::<serde_json::Value>().await? {
            serde_json::Value::String(cid) => Ok(Cid::try_from(cid.as_str()).ok()),
            other => Err(AccountError::UnexpectedResponse(username.to_string(), other)),
        }
    }

    /// Point the account's data root at `root`.
    pub async fn set_data_root(&self, root: &Cid, bearer: &BearerToken) -> Result<(), AccountError> {
        let url = self.data_endpoint(&root.to_string())?;
        tracing::debug!("AccountClient::set_data_root: PUT {}", url);
        let response = self
            .client
            .put(url)
            .header(AUTHORIZATION, bearer.header_value())
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AccountError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }
}
