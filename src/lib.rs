//! # Opinion Room
//!
//! Streaming session engine for AI persona debates.
//!
//! A panel of investor personas debates a topic on a remote backend. This
//! crate drives one conversation with that backend: it opens the event
//! streams, decodes them, tracks who is speaking, and reports everything to
//! a UI through the [`RenderSink`] trait.
//!
//! ## Features
//!
//! - **Streaming decode**: byte chunks to typed [`ProtocolEvent`]s, malformed
//!   frames skipped
//! - **Lifecycle**: start, follow-up, targeted questions, debates, summaries,
//!   pause/resume/stop with prompt cancellation
//! - **`@persona` routing** and autocomplete
//! - **Symbol extraction** from transcripts for live-data enhancement
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opinion_room::{DiscussionBackend, EngineConfig, HttpBackend, RecordingSink, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::from_env()?;
//!     let backend = Arc::new(HttpBackend::new(config.backend)?);
//!     let personas = backend.list_personas().await?;
//!
//!     let session = Session::new(backend, Arc::new(RecordingSink::new()));
//!     let report = session.submit("Is NVDA overvalued?", &personas).await?;
//!     println!("{} events", report.events);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulator;
pub mod backend;
pub mod config;
pub mod decoder;
pub mod error;
pub mod mention;
pub mod protocol;
pub mod render;
pub mod session;
pub mod symbols;
pub mod telemetry;
pub mod types;

// Re-exports for convenience
pub use accumulator::{LabelStyle, Speaker, SpeakerAccumulator};
pub use backend::{DiscussionBackend, HttpBackend, StreamAction};
pub use config::{BackendConfig, EngineConfig, LogConfig};
pub use decoder::{EventStream, FrameDecoder};
pub use error::{Error, Result};
pub use mention::{Mention, Route};
pub use protocol::ProtocolEvent;
pub use render::{
    EscapingRenderer, MarkdownRenderer, MessageBody, MessageHandle, MessageKind, Notice,
    RawRenderer, RecordingSink, RenderSink, SinkCall, SpeakerLabel,
};
pub use session::{Session, StreamOutcome, StreamReport, DEFAULT_DEBATE_ROUNDS};
pub use symbols::extract_symbols;
pub use types::{
    Discussion, DiscussionDetail, DiscussionId, ModelInfo, Persona, PersonaId, SessionId,
    SessionStatus, StoredMessage, StoredMessageKind,
};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::backend::{DiscussionBackend, HttpBackend};
    pub use crate::config::EngineConfig;
    pub use crate::error::{Error, Result};
    pub use crate::render::{MarkdownRenderer, RenderSink};
    pub use crate::session::{Session, StreamReport};
    pub use crate::types::*;
}
