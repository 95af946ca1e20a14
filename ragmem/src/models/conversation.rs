use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a conversation message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "human" => Ok(Self::User),
            "assistant" | "ai" => Ok(Self::Assistant),
            _ => Err(format!("Unknown message role: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A conversation thread as the memory store sees it. `user_id` is `None`
/// only for sessions the store created implicitly, without an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: Option<String>,
}

/// Condensed view of a session, computed by the memory store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Summary {
    #[default]
    Absent,
    Text {
        text: String,
    },
    Structured {
        summary: String,
        facts: Vec<String>,
    },
}

impl Summary {
    /// Build from whatever the store returned, collapsing blank values to
    /// [`Summary::Absent`].
    pub fn from_parts(summary: Option<String>, facts: Vec<String>) -> Self {
        let summary = summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let facts: Vec<String> = facts
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        match (summary, facts.is_empty()) {
            (None, true) => Self::Absent,
            (Some(text), true) => Self::Text { text },
            (summary, false) => Self::Structured {
                summary: summary.unwrap_or_default(),
                facts,
            },
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Render for inclusion in a prompt. Empty for [`Summary::Absent`].
    pub fn render(&self) -> String {
        match self {
            Self::Absent => String::new(),
            Self::Text { text } => text.clone(),
            Self::Structured { summary, facts } => {
                let mut out = summary.clone();
                for fact in facts {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str("- ");
                    out.push_str(fact);
                }
                out
            }
        }
    }
}

/// Result of listing a session's messages: the session either exists (and
/// may have zero messages) or the store has never heard of it.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageLookup {
    Found(Vec<Message>),
    NotFound,
}

/// Everything the session layer contributes to a turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionContext {
    pub summary: Summary,
    /// Most recent messages, oldest first.
    pub messages: Vec<Message>,
    pub is_new_session: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert_eq!("AI".parse::<Role>(), Ok(Role::Assistant));
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_summary_from_parts() {
        assert_eq!(Summary::from_parts(None, vec![]), Summary::Absent);
        assert_eq!(
            Summary::from_parts(Some("   ".to_string()), vec![" ".to_string()]),
            Summary::Absent
        );
        assert_eq!(
            Summary::from_parts(Some("User is Ana".to_string()), vec![]),
            Summary::Text {
                text: "User is Ana".to_string()
            }
        );
        assert_eq!(
            Summary::from_parts(None, vec!["Ana likes burgers".to_string()]),
            Summary::Structured {
                summary: String::new(),
                facts: vec!["Ana likes burgers".to_string()]
            }
        );
    }

    #[test]
    fn test_summary_render() {
        let summary = Summary::Structured {
            summary: "Ordering lunch".to_string(),
            facts: vec!["Name is Ana".to_string(), "Vegetarian".to_string()],
        };
        assert_eq!(summary.render(), "Ordering lunch\n- Name is Ana\n- Vegetarian");
        assert_eq!(Summary::Absent.render(), "");
    }
}
