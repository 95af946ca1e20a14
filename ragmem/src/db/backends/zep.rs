//! Zep (v2 REST) memory store client.
//!
//! Lookups map 404 to `None` / [`MessageLookup::NotFound`]. Creation calls
//! that collide with an existing record fetch and return that record, so
//! user and session creation stay idempotent at this boundary. Appends are
//! sent exactly once.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::config::MemoryStoreConfig;
use crate::db::traits::MemoryStore;
use crate::error::{RagError, Result};
use crate::models::{Message, MessageLookup, Role, SessionRecord, Summary, User};

#[derive(Debug, Deserialize)]
struct ZepUser {
    user_id: String,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZepSession {
    session_id: String,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZepMessage {
    role_type: Option<String>,
    role: Option<String>,
    #[serde(default)]
    content: String,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZepMessageList {
    #[serde(default)]
    messages: Vec<ZepMessage>,
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    role_type: &'a str,
    role: &'a str,
    content: &'a str,
}

/// Result of a create call: either the store accepted it or the record
/// already existed.
enum Created {
    New(Value),
    Exists,
}

pub struct ZepMemoryStore {
    client: Client,
    headers: HeaderMap,
    base_url: Url,
}

impl ZepMemoryStore {
    pub fn new(config: &MemoryStoreConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(RagError::Config(format!(
                "Zep base URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Api-Key {}", config.api_key))
                .map_err(|e| RagError::Config(format!("Invalid Zep API key header: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            headers,
            base_url,
        })
    }

    /// Endpoint under the base URL. Each segment is percent-encoded, so an id
    /// containing `/`, `?` or `#` stays a single path segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json(&self, url: Url) -> Result<Option<Value>> {
        let resp = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| RagError::MemoryUnavailable(format!("Zep request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            let body = resp.json().await.map_err(|e| {
                RagError::MemoryUnavailable(format!("Failed to parse Zep response: {e}"))
            })?;
            return Ok(Some(body));
        }

        Err(Self::status_error(status, resp.text().await.unwrap_or_default()))
    }

    async fn post_create(&self, url: Url, body: &Value) -> Result<Created> {
        let resp = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::MemoryUnavailable(format!("Zep request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            let body = resp.json().await.unwrap_or(Value::Null);
            return Ok(Created::New(body));
        }

        let text = resp.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT
            || (status == StatusCode::BAD_REQUEST && text.to_lowercase().contains("already exists"))
        {
            return Ok(Created::Exists);
        }

        Err(Self::status_error(status, text))
    }

    fn status_error(status: StatusCode, body: String) -> RagError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            RagError::ApiAuth(format!("Zep rejected API key: {body}"))
        } else {
            RagError::MemoryUnavailable(format!("Zep error {status}: {body}"))
        }
    }
}

/// Decode a Zep record. A body of the wrong shape is treated like any other
/// store outage.
fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| RagError::MemoryUnavailable(format!("Malformed Zep {what}: {e}")))
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn convert_message(message: ZepMessage) -> Option<Message> {
    let role = message
        .role_type
        .as_deref()
        .or(message.role.as_deref())
        .and_then(|raw| raw.parse::<Role>().ok());

    let Some(role) = role else {
        tracing::debug!(role_type = ?message.role_type, "Skipping Zep message with unsupported role");
        return None;
    };

    Some(Message {
        created_at: parse_timestamp(message.created_at.as_deref()),
        content: message.content,
        role,
    })
}

/// Normalize the memory payload. Zep returns the summary under
/// `summary.content`, facts either as plain strings (`facts`) or as objects
/// (`relevant_facts[].fact`), and a pre-rendered `context` string.
fn summary_from_memory(memory: &Value) -> Summary {
    let summary = memory
        .pointer("/summary/content")
        .and_then(Value::as_str)
        .or_else(|| memory.get("context").and_then(Value::as_str))
        .map(str::to_string);

    let mut facts: Vec<String> = memory
        .get("facts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if facts.is_empty() {
        facts = memory
            .get("relevant_facts")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("fact").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
    }

    Summary::from_parts(summary, facts)
}

#[async_trait]
impl MemoryStore for ZepMemoryStore {
    async fn create_user(&self, user_id: &str) -> Result<User> {
        let body = json!({ "user_id": user_id });
        match self.post_create(self.url(&["users"]), &body).await? {
            Created::New(value) => match serde_json::from_value::<ZepUser>(value) {
                Ok(user) => Ok(User {
                    created_at: parse_timestamp(user.created_at.as_deref()),
                    user_id: user.user_id,
                }),
                Err(_) => Ok(User {
                    user_id: user_id.to_string(),
                    created_at: Utc::now(),
                }),
            },
            Created::Exists => self.get_user(user_id).await?.ok_or_else(|| {
                RagError::MemoryUnavailable(format!(
                    "Zep reported user '{user_id}' as existing but lookup found nothing"
                ))
            }),
        }
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let Some(value) = self.get_json(self.url(&["users", user_id])).await? else {
            return Ok(None);
        };
        let user: ZepUser = decode(value, "user")?;
        Ok(Some(User {
            created_at: parse_timestamp(user.created_at.as_deref()),
            user_id: user.user_id,
        }))
    }

    async fn create_session(&self, session_id: &str, user_id: &str) -> Result<SessionRecord> {
        let body = json!({ "session_id": session_id, "user_id": user_id });
        match self.post_create(self.url(&["sessions"]), &body).await? {
            Created::New(_) => Ok(SessionRecord {
                session_id: session_id.to_string(),
                user_id: Some(user_id.to_string()),
            }),
            Created::Exists => self.get_session(session_id).await?.ok_or_else(|| {
                RagError::MemoryUnavailable(format!(
                    "Zep reported session '{session_id}' as existing but lookup found nothing"
                ))
            }),
        }
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let Some(value) = self.get_json(self.url(&["sessions", session_id])).await? else {
            return Ok(None);
        };
        let session: ZepSession = decode(value, "session")?;
        Ok(Some(SessionRecord {
            session_id: session.session_id,
            user_id: session.user_id.filter(|id| !id.is_empty()),
        }))
    }

    async fn list_messages(&self, session_id: &str, limit: usize) -> Result<MessageLookup> {
        let mut url = self.url(&["sessions", session_id, "messages"]);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let Some(value) = self.get_json(url).await? else {
            return Ok(MessageLookup::NotFound);
        };

        let list: ZepMessageList = decode(value, "message list")?;
        let mut messages: Vec<Message> = list
            .messages
            .into_iter()
            .filter_map(convert_message)
            .collect();
        messages.sort_by_key(|message| message.created_at);
        let skip = messages.len().saturating_sub(limit);
        messages.drain(..skip);

        Ok(MessageLookup::Found(messages))
    }

    async fn append_messages(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let roles: Vec<String> = messages.iter().map(|m| m.role.to_string()).collect();
        let outgoing: Vec<OutgoingMessage<'_>> = messages
            .iter()
            .zip(roles.iter())
            .map(|(message, role)| OutgoingMessage {
                role_type: role,
                role,
                content: &message.content,
            })
            .collect();

        let append_error = |reason: String| RagError::MemoryAppend {
            session_id: session_id.to_string(),
            reason,
        };

        let resp = self
            .client
            .post(self.url(&["sessions", session_id, "memory"]))
            .headers(self.headers.clone())
            .json(&json!({ "messages": outgoing }))
            .send()
            .await
            .map_err(|e| append_error(format!("request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(append_error(format!("Zep error {status}: {body}")))
    }

    async fn get_summary(&self, session_id: &str) -> Result<Summary> {
        match self.get_json(self.url(&["sessions", session_id, "memory"])).await? {
            Some(memory) => Ok(summary_from_memory(&memory)),
            None => Ok(Summary::Absent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prefers_summary_content() {
        let memory = json!({
            "context": "rendered context",
            "summary": {"content": "Ana asked about burgers"},
            "relevant_facts": [{"fact": "Ana is vegetarian"}]
        });
        assert_eq!(
            summary_from_memory(&memory),
            Summary::Structured {
                summary: "Ana asked about burgers".to_string(),
                facts: vec!["Ana is vegetarian".to_string()],
            }
        );
    }

    #[test]
    fn test_summary_falls_back_to_context_text() {
        let memory = json!({"context": "User name is Ana", "messages": []});
        assert_eq!(
            summary_from_memory(&memory),
            Summary::Text {
                text: "User name is Ana".to_string()
            }
        );
    }

    #[test]
    fn test_empty_memory_is_absent() {
        assert_eq!(summary_from_memory(&json!({"context": ""})), Summary::Absent);
    }

    #[test]
    fn test_convert_message_skips_unknown_roles() {
        let system = ZepMessage {
            role_type: Some("system".to_string()),
            role: None,
            content: "setup".to_string(),
            created_at: None,
        };
        assert!(convert_message(system).is_none());

        let user = ZepMessage {
            role_type: None,
            role: Some("user".to_string()),
            content: "hello".to_string(),
            created_at: Some("2025-01-01T10:00:00Z".to_string()),
        };
        let converted = convert_message(user).unwrap();
        assert_eq!(converted.role, Role::User);
        assert_eq!(converted.created_at.to_rfc3339(), "2025-01-01T10:00:00+00:00");
    }

    #[test]
    fn test_ids_stay_inside_one_path_segment() {
        let store = ZepMemoryStore::new(&MemoryStoreConfig {
            base_url: "https://api.getzep.com/api/v2/".to_string(),
            api_key: "key".to_string(),
            timeout_secs: 5,
        })
        .unwrap();

        let url = store.url(&["sessions", "a/b?c#d", "memory"]);
        assert_eq!(
            url.as_str(),
            "https://api.getzep.com/api/v2/sessions/a%2Fb%3Fc%23d/memory"
        );
    }

    #[test]
    fn test_malformed_record_is_memory_unavailable() {
        let err = decode::<ZepSession>(json!({"user_id": 7}), "session").unwrap_err();
        assert!(err.is_degradable_memory());
    }
}
