//! Raw-file GitHub source.
//!
//! Layout per dataset:
//!
//! ```text
//! {base}/{username}/{repository}/{branch}/index.json
//! {base}/{username}/{repository}/{branch}/data/{index}.json
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::ContentSource;
use crate::dataset::{DatasetId, DatasetMeta, QuizItem};
use crate::error::FetchError;
use crate::storage::ContentConfig;

const USER_AGENT: &str = concat!("magicblock/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct GitHubRawSource {
    client: Client,
    base_url: String,
}

impl GitHubRawSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &ContentConfig) -> Result<Self, FetchError> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Root URL of a dataset's files.
    pub fn dataset_url(&self, id: &DatasetId) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            id.username(),
            id.repository(),
            id.branch()
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        tracing::debug!(%url, "fetching");
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::Missing(url));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        // raw.githubusercontent.com serves JSON as text/plain, so decode by hand.
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ContentSource for GitHubRawSource {
    async fn fetch_meta(&self, id: &DatasetId) -> Result<DatasetMeta, FetchError> {
        let url = format!("{}/index.json", self.dataset_url(id));
        self.get_json(url).await
    }

    async fn fetch_item(&self, id: &DatasetId, index: usize) -> Result<QuizItem, FetchError> {
        let url = format!("{}/data/{}.json", self.dataset_url(id), index);
        self.get_json(url).await
    }
}
