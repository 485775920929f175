//! HTTP client for the knowledge base server (§4.4, §6.2).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LambError;
use crate::org::KnowledgeBaseConfig;

/// Metadata fields the pipeline interprets from a KB document (§6.2). Every field is
/// optional: KB collections built from different ingestion paths populate different
/// subsets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KbMetadata {
    pub source_url: Option<String>,
    pub original_file_url: Option<String>,
    pub markdown_file_url: Option<String>,
    pub images_folder_url: Option<String>,
    pub file_url: Option<String>,
    pub filename: Option<String>,
    pub original_filename: Option<String>,
    pub chunk_index: Option<i64>,
    pub page: Option<i64>,
    pub parent_chunk_id: Option<String>,
    pub parent_text: Option<String>,
}

/// One document returned by a KB query.
#[derive(Debug, Clone, Deserialize)]
pub struct KbDocument {
    pub data: String,
    #[serde(default)]
    pub metadata: KbMetadata,
    #[serde(default)]
    pub similarity: f32,
}

/// A citation derived from a [`KbDocument`], built by [`Source::from_metadata`]'s
/// priority chain: `source_url` > `original_file_url` > `file_url` (§4.4).
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub url: Option<String>,
    pub filename: Option<String>,
    pub chunk_index: Option<i64>,
    pub page: Option<i64>,
}

impl Source {
    pub fn from_metadata(metadata: &KbMetadata) -> Self {
        let url = metadata
            .source_url
            .clone()
            .or_else(|| metadata.original_file_url.clone())
            .or_else(|| metadata.file_url.clone());
        let filename = metadata
            .filename
            .clone()
            .or_else(|| metadata.original_filename.clone());
        Self {
            url,
            filename,
            chunk_index: metadata.chunk_index,
            page: metadata.page,
        }
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_text: &'a str,
    top_k: u32,
    threshold: f32,
    plugin_params: serde_json::Value,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<KbDocument>,
}

/// Queries a knowledge base collection, abstracted so tools can be tested against a
/// fake without a network round trip.
#[async_trait]
pub trait KbClient: Send + Sync {
    async fn query(
        &self,
        config: &KnowledgeBaseConfig,
        collection_id: &str,
        query_text: &str,
        top_k: u32,
    ) -> Result<Vec<KbDocument>, LambError>;
}

/// [`KbClient`] backed by `reqwest`, talking to `POST /collections/{id}/query` with a
/// bounded timeout (§5: "the KB query uses a bounded timeout, ≤10s suggested, never
/// retries").
pub struct HttpKbClient {
    http: reqwest::Client,
    timeout: std::time::Duration,
}

impl HttpKbClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: std::time::Duration::from_secs(10),
        }
    }
}

impl Default for HttpKbClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl KbClient for HttpKbClient {
    async fn query(
        &self,
        config: &KnowledgeBaseConfig,
        collection_id: &str,
        query_text: &str,
        top_k: u32,
    ) -> Result<Vec<KbDocument>, LambError> {
        let url = format!(
            "{}/collections/{}/query",
            config.server_url.trim_end_matches('/'),
            collection_id
        );
        let request = self
            .http
            .post(&url)
            .bearer_auth(&config.api_token)
            .timeout(self.timeout)
            .json(&QueryRequest {
                query_text,
                top_k,
                threshold: 0.0,
                plugin_params: serde_json::json!({}),
            })
            .send();

        let resp = request.await?;
        if !resp.status().is_success() {
            return Err(LambError::UpstreamUnavailable(format!(
                "knowledge base server returned {}",
                resp.status()
            )));
        }
        let body: QueryResponse = resp.json().await?;
        Ok(body.documents)
    }
}
