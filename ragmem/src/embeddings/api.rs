use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingsConfig;
use crate::error::{RagError, Result};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl From<&EmbeddingsConfig> for ApiConfig {
    fn from(config: &EmbeddingsConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

/// One multimodal input: an ordered list of content pieces. Only text pieces
/// are produced here; page images are embedded at ingestion time.
#[derive(Debug, Serialize)]
struct MultimodalInput<'a> {
    content: Vec<ContentPiece<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentPiece<'a> {
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    inputs: Vec<MultimodalInput<'a>>,
    model: &'a str,
    input_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for Voyage AI's `multimodalembeddings` endpoint.
#[derive(Clone)]
pub struct VoyageApiClient {
    client: Client,
    config: ApiConfig,
}

impl VoyageApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Embedding(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Embed each text as a standalone query input.
    pub async fn embed_queries(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            inputs: texts
                .iter()
                .map(|text| MultimodalInput {
                    content: vec![ContentPiece::Text { text }],
                })
                .collect(),
            model: &self.config.model,
            input_type: "query",
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {api_key}"))
                    .map_err(|e| RagError::Embedding(format!("Invalid API key header: {e}")))?,
            );
        }

        let url = format!("{}/multimodalembeddings", self.config.base_url);

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .headers(headers.clone())
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        let body: EmbeddingResponse = resp.json().await.map_err(|e| {
                            RagError::Embedding(format!("Failed to parse response: {e}"))
                        })?;
                        if body.data.len() != texts.len() {
                            return Err(RagError::Embedding(format!(
                                "Expected {} embeddings, got {}",
                                texts.len(),
                                body.data.len()
                            )));
                        }
                        return Ok(body.data.into_iter().map(|d| d.embedding).collect());
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse().ok());
                        tracing::debug!(attempt, ?retry_after, "Voyage rate limited");
                        last_error = Some(RagError::ApiRateLimit { retry_after });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(RagError::ApiAuth(body));
                    }

                    if status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_error = Some(RagError::Embedding(format!(
                            "Server error {status}: {body}"
                        )));
                        continue;
                    }

                    let body = resp.text().await.unwrap_or_default();
                    return Err(RagError::Embedding(format!("API error {status}: {body}")));
                }
                Err(e) => {
                    last_error = Some(RagError::Embedding(format!("Request failed: {e}")));
                    continue;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RagError::Embedding("Unknown error".to_string())))
    }
}
