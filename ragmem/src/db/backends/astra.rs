//! Astra DB Data API client for the chunk collection.
//!
//! Every call is a JSON command POSTed to the collection (or keyspace)
//! endpoint. The API answers command-level failures with HTTP 200 and an
//! `errors` array, so both layers are checked.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde_json::{json, Map, Value};
use url::Url;

use crate::config::VectorStoreConfig;
use crate::db::traits::VectorStore;
use crate::error::{RagError, Result};
use crate::models::{DocumentDescriptor, VectorMatch};

const API_PATH: &str = "api/json/v1";

pub struct AstraVectorStore {
    client: Client,
    headers: HeaderMap,
    keyspace_url: String,
    collection_url: String,
    collection: String,
    max_retries: u32,
    page_size: usize,
}

impl AstraVectorStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.api_endpoint)?;
        let base = endpoint.as_str().trim_end_matches('/');
        let keyspace_url = format!("{base}/{API_PATH}/{}", config.keyspace);
        let collection_url = format!("{keyspace_url}/{}", config.collection);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "token",
            HeaderValue::from_str(&config.token)
                .map_err(|e| RagError::Config(format!("Invalid Astra DB token header: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            headers,
            keyspace_url,
            collection_url,
            collection: config.collection.clone(),
            max_retries: config.max_retries,
            page_size: config.page_size.max(1),
        })
    }

    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    async fn command(&self, url: &str, body: &Value) -> Result<Value> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(url)
                .headers(self.headers.clone())
                .json(body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        let payload: Value = resp.json().await.map_err(|e| {
                            RagError::RetrievalUnavailable(format!(
                                "Failed to parse Astra DB response: {e}"
                            ))
                        })?;
                        return check_command_errors(payload);
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(RagError::ApiAuth(format!("Astra DB rejected token: {body}")));
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
                    {
                        let body = resp.text().await.unwrap_or_default();
                        last_error = Some(RagError::RetrievalUnavailable(format!(
                            "Astra DB error {status}: {body}"
                        )));
                        continue;
                    }

                    let body = resp.text().await.unwrap_or_default();
                    return Err(RagError::RetrievalUnavailable(format!(
                        "Astra DB error {status}: {body}"
                    )));
                }
                Err(e) => {
                    last_error = Some(RagError::RetrievalUnavailable(format!(
                        "Astra DB request failed: {e}"
                    )));
                    continue;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RagError::RetrievalUnavailable("Astra DB request failed".to_string())
        }))
    }
}

fn check_command_errors(payload: Value) -> Result<Value> {
    let Some(errors) = payload.get("errors").and_then(Value::as_array) else {
        return Ok(payload);
    };
    if errors.is_empty() {
        return Ok(payload);
    }

    let message = errors
        .iter()
        .map(|error| {
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string())
        })
        .collect::<Vec<_>>()
        .join("; ");
    Err(RagError::RetrievalUnavailable(format!(
        "Astra DB command failed: {message}"
    )))
}

fn documents(payload: &Value) -> &[Value] {
    payload
        .pointer("/data/documents")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn document_to_match(document: &Value) -> Option<VectorMatch> {
    let object = document.as_object()?;
    let id = match object.get("_id")? {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    };
    let score = object
        .get("$similarity")
        .and_then(Value::as_f64)
        .unwrap_or(0.0) as f32;

    let payload: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "_id" | "$similarity" | "$vector"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(VectorMatch::new(id, score, Value::Object(payload)))
}

#[async_trait]
impl VectorStore for AstraVectorStore {
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        let body = json!({
            "find": {
                "sort": { "$vector": vector },
                "projection": { "$vector": 0 },
                "options": { "limit": limit, "includeSimilarity": true }
            }
        });

        let payload = self.command(&self.collection_url, &body).await?;
        let matches: Vec<VectorMatch> = documents(&payload)
            .iter()
            .filter_map(document_to_match)
            .collect();

        tracing::debug!(count = matches.len(), limit, "Astra DB vector query returned");
        Ok(matches)
    }

    async fn list_all(&self) -> Result<Vec<DocumentDescriptor>> {
        let mut seen = BTreeSet::new();
        let mut page_state: Option<String> = None;

        loop {
            let mut options = json!({ "limit": self.page_size });
            if let Some(state) = &page_state {
                options["pageState"] = json!(state);
            }
            let body = json!({
                "find": {
                    "filter": {},
                    "projection": { "document_name": 1, "page_number": 1 },
                    "options": options
                }
            });

            let payload = self.command(&self.collection_url, &body).await?;
            for document in documents(&payload) {
                if let Some(found) = document_to_match(document) {
                    let chunk = found.into_chunk();
                    seen.insert((chunk.document_name, chunk.page_number));
                }
            }

            page_state = payload
                .pointer("/data/nextPageState")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_state.is_none() {
                break;
            }
        }

        Ok(seen
            .into_iter()
            .map(|(document_name, page_number)| DocumentDescriptor {
                document_name,
                page_number,
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        let body = json!({ "findCollections": {} });
        match self.command(&self.keyspace_url, &body).await {
            Ok(payload) => {
                let present = payload
                    .pointer("/status/collections")
                    .and_then(Value::as_array)
                    .is_some_and(|collections| {
                        collections.iter().any(|c| c.as_str() == Some(&self.collection))
                    });
                if !present {
                    tracing::warn!(collection = %self.collection, "Astra DB reachable but collection missing");
                }
                Ok(present)
            }
            Err(RagError::ApiAuth(message)) => Err(RagError::ApiAuth(message)),
            Err(e) => {
                tracing::warn!(error = %e, "Astra DB health check failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_to_match_strips_reserved_fields() {
        let document = json!({
            "_id": "menu_p1",
            "$similarity": 0.91,
            "$vector": [0.1, 0.2],
            "document_name": "menu.pdf",
            "page_number": 1
        });

        let found = document_to_match(&document).unwrap();
        assert_eq!(found.id, "menu_p1");
        assert!((found.score - 0.91).abs() < 1e-6);
        assert!(found.payload.get("$vector").is_none());
        assert_eq!(found.payload["document_name"], "menu.pdf");
    }

    #[test]
    fn test_command_errors_surface_as_unavailable() {
        let payload = json!({"errors": [{"message": "Collection does not exist"}]});
        let err = check_command_errors(payload).unwrap_err();
        assert!(matches!(err, RagError::RetrievalUnavailable(msg) if msg.contains("does not exist")));
    }

    #[test]
    fn test_collection_url_layout() {
        let store = AstraVectorStore::new(&VectorStoreConfig {
            api_endpoint: "https://db-id.apps.astra.datastax.com/".to_string(),
            token: "AstraCS:abc".to_string(),
            keyspace: "default_keyspace".to_string(),
            collection: "agenciawow".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            page_size: 20,
        })
        .unwrap();
        assert_eq!(
            store.collection_url(),
            "https://db-id.apps.astra.datastax.com/api/json/v1/default_keyspace/agenciawow"
        );
    }
}
