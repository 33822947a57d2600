//! Core type definitions for the session engine

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Local identifier for a session object, used to correlate log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a session ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-assigned discussion identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscussionId(pub i64);

impl fmt::Display for DiscussionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-assigned persona identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(pub i64);

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a session.
///
/// ```text
/// Idle → Streaming → Paused | Stopped | Completed
/// Paused → Streaming | Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No stream has been opened for the current topic
    Idle,
    /// A stream is open and events are being consumed
    Streaming,
    /// The user interrupted the stream and may resume it
    Paused,
    /// The user interrupted the stream, or it failed
    Stopped,
    /// The last stream ran to its natural end
    Completed,
}

impl SessionStatus {
    /// Whether a stream is currently open
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Streaming => write!(f, "streaming"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A configured debate participant, as read from the backend.
///
/// The engine only reads `id`, `name` and `role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Persona identifier
    pub id: PersonaId,
    /// Display name
    pub name: String,
    /// Role label shown under the name
    pub role: String,
    /// System prompt
    #[serde(default)]
    pub system_prompt: String,
    /// Model identifier
    #[serde(default)]
    pub model: Option<String>,
}

impl Persona {
    /// Create a persona with the fields the engine reads
    pub fn new(id: i64, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: PersonaId(id),
            name: name.into(),
            role: role.into(),
            system_prompt: String::new(),
            model: None,
        }
    }

    /// First space-delimited token of the display name
    pub fn first_name(&self) -> &str {
        self.name.split(' ').next().unwrap_or("")
    }
}

/// Model a persona can be configured with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider model identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Hosting provider
    pub provider: String,
}

/// Discussion resource returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    /// Discussion identifier
    pub id: DiscussionId,
    /// Topic the panel debates
    pub topic: String,
    /// Backend-side status label (e.g. "in_progress", "paused")
    #[serde(default)]
    pub status: String,
    /// Stored summary, if one was generated
    #[serde(default)]
    pub summary: Option<String>,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Kind of a persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredMessageKind {
    /// Written by the human
    User,
    /// Written by a persona
    Agent,
    /// Generated summary
    Summary,
}

/// Persisted message returned with a discussion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message identifier
    pub id: i64,
    /// Owning discussion
    pub discussion_id: DiscussionId,
    /// Authoring persona, for agent messages
    #[serde(default)]
    pub agent_id: Option<PersonaId>,
    /// Authoring persona name, for agent messages
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Raw message text (Markdown)
    pub content: String,
    /// Message kind
    pub message_type: StoredMessageKind,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Discussion together with its stored messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionDetail {
    /// The discussion
    pub discussion: Discussion,
    /// Messages in creation order
    pub messages: Vec<StoredMessage>,
}
