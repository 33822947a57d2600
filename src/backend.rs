//! Debate backend client: the REST and streaming collaborator of a session

use crate::config::BackendConfig;
use crate::decoder::EventStream;
use crate::error::{Error, Result};
use crate::types::{Discussion, DiscussionDetail, DiscussionId, ModelInfo, Persona, PersonaId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

/// Streaming operations the backend offers on a discussion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAction {
    /// First pass of the whole panel over the topic
    Start,
    /// Follow-up message to the whole panel; empty content resumes
    Continue {
        /// User message
        content: String,
    },
    /// Question for one persona
    AskAgent {
        /// Target persona
        agent_id: PersonaId,
        /// Question text
        content: String,
    },
    /// Re-run the panel with live market data for these symbols
    Enhance {
        /// Symbols to load
        symbols: Vec<String>,
    },
    /// Stream a summary of the discussion
    Summarize,
    /// Explicit multi-round debate
    Debate {
        /// Number of rounds
        rounds: u32,
    },
}

impl StreamAction {
    /// Short name for logs and spans
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Continue { .. } => "continue",
            Self::AskAgent { .. } => "ask_agent",
            Self::Enhance { .. } => "enhance",
            Self::Summarize => "summarize",
            Self::Debate { .. } => "debate",
        }
    }

    /// API path of the stream for a discussion
    pub fn path(&self, id: DiscussionId) -> String {
        let suffix = match self {
            Self::Start => "start",
            Self::Continue { .. } => "continue",
            Self::AskAgent { .. } => "ask-agent",
            Self::Enhance { .. } => "enhance-with-data",
            Self::Summarize => "summarize",
            Self::Debate { .. } => "debate",
        };
        format!("discussions/{}/{}", id, suffix)
    }

    /// JSON request body, if the endpoint takes one
    pub fn body(&self) -> Option<serde_json::Value> {
        match self {
            Self::Start => Some(json!({})),
            Self::Continue { content } => Some(json!({ "content": content })),
            Self::AskAgent { agent_id, content } => {
                Some(json!({ "agent_id": agent_id, "content": content }))
            }
            Self::Enhance { symbols } => Some(json!({ "symbols": symbols })),
            Self::Summarize => None,
            Self::Debate { rounds } => Some(json!({ "rounds": rounds })),
        }
    }
}

/// Operations a session needs from the debate backend
#[async_trait]
pub trait DiscussionBackend: Send + Sync {
    /// Create a discussion for a topic
    async fn create_discussion(&self, topic: &str) -> Result<Discussion>;

    /// Read a discussion with its stored messages
    async fn get_discussion(&self, id: DiscussionId) -> Result<DiscussionDetail>;

    /// List discussions, newest first
    async fn list_discussions(&self) -> Result<Vec<Discussion>>;

    /// List the configured personas
    async fn list_personas(&self) -> Result<Vec<Persona>>;

    /// List the models personas can run on
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Open an event stream
    async fn open_stream(&self, id: DiscussionId, action: &StreamAction) -> Result<EventStream>;

    /// Tell the backend the discussion is paused
    async fn pause(&self, id: DiscussionId) -> Result<()>;

    /// Tell the backend the discussion is running again
    async fn resume(&self, id: DiscussionId) -> Result<()>;

    /// Backend type for debugging/logging
    fn backend_type(&self) -> &str;
}

/// `reqwest` implementation of [`DiscussionBackend`]
pub struct HttpBackend {
    /// HTTP client
    client: Client,
    /// Configuration
    config: BackendConfig,
}

impl HttpBackend {
    /// Create a backend client with the given configuration
    pub fn new(config: BackendConfig) -> Result<Self> {
        // No overall timeout on the client: it would cut long-running streams.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// One-shot request builder with the request timeout applied
    fn one_shot(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, self.config.endpoint(path))
            .timeout(self.config.request_timeout);
        self.authorize(request)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::backend(status.as_u16(), error_text));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.one_shot(reqwest::Method::GET, path)).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DiscussionBackend for HttpBackend {
    async fn create_discussion(&self, topic: &str) -> Result<Discussion> {
        let request = self
            .one_shot(reqwest::Method::POST, "discussions")
            .json(&json!({ "topic": topic }));
        let discussion: Discussion = self.send(request).await?.json().await?;
        tracing::info!(discussion = %discussion.id, "created discussion");
        Ok(discussion)
    }

    async fn get_discussion(&self, id: DiscussionId) -> Result<DiscussionDetail> {
        self.get_json(&format!("discussions/{}", id)).await
    }

    async fn list_discussions(&self) -> Result<Vec<Discussion>> {
        self.get_json("discussions").await
    }

    async fn list_personas(&self) -> Result<Vec<Persona>> {
        self.get_json("agents").await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.get_json("agents/models/available").await
    }

    async fn open_stream(&self, id: DiscussionId, action: &StreamAction) -> Result<EventStream> {
        let mut request = self.authorize(
            self.client
                .post(self.config.endpoint(&action.path(id)))
                .header(reqwest::header::ACCEPT, "text/event-stream"),
        );
        if let Some(body) = action.body() {
            request = request.json(&body);
        }

        let response = self.send(request).await?;
        tracing::debug!(discussion = %id, action = action.name(), "stream opened");
        Ok(EventStream::from_response(response))
    }

    async fn pause(&self, id: DiscussionId) -> Result<()> {
        let path = format!("discussions/{}/pause", id);
        self.send(self.one_shot(reqwest::Method::POST, &path)).await?;
        Ok(())
    }

    async fn resume(&self, id: DiscussionId) -> Result<()> {
        let path = format!("discussions/{}/resume", id);
        self.send(self.one_shot(reqwest::Method::POST, &path)).await?;
        Ok(())
    }

    fn backend_type(&self) -> &str {
        "http"
    }
}
