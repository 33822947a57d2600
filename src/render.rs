//! Render sink: the callback contract between the engine and the UI
//!
//! The engine never touches presentation state. It reports what happened
//! through [`RenderSink`] in exactly the order events were decoded, and the
//! UI decides how to draw it.

use crate::types::SessionStatus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to a message created by [`RenderSink::on_message_start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle(pub u64);

/// Who a rendered message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// The human's own message
    User,
    /// A persona's utterance
    Agent,
    /// Generated discussion summary
    Summary,
}

/// Header shown above a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerLabel {
    /// Display name
    pub name: String,
    /// Secondary line (role, round, phase)
    pub detail: String,
}

impl SpeakerLabel {
    /// Create a label
    pub fn new(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Label used for the human's messages
    pub fn user() -> Self {
        Self::new("You", "")
    }

    /// Label used for summary messages
    pub fn summary() -> Self {
        Self::new("Summary", "")
    }
}

/// Body of a message after an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum MessageBody {
    /// Markdown rendered by the configured [`MarkdownRenderer`]
    Rendered(String),
    /// Plain-text error annotation, shown flagged
    Error(String),
}

/// Banner-style notices between messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A multi-round debate begins
    DebateStarting,
    /// A debate round begins
    RoundStarted {
        /// 1-based round number
        round: u32,
    },
    /// The debate finished; enhancement is now possible
    DebateDone,
    /// Live market data was loaded
    DataLoaded {
        /// Loaded symbols
        symbols: Vec<String>,
    },
    /// The enhancement pass finished
    EnhanceDone,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DebateStarting => write!(f, "Debate starting"),
            Self::RoundStarted { round } => write!(f, "Round {}", round),
            Self::DebateDone => write!(
                f,
                "Debate finished. Run data enhancement to check the analysis against live market data."
            ),
            Self::DataLoaded { symbols } => write!(f, "Loaded live data: {}", symbols.join(", ")),
            Self::EnhanceDone => write!(f, "Data enhancement finished"),
        }
    }
}

/// Callbacks the UI implements to draw a session
pub trait RenderSink: Send + Sync {
    /// The session status changed
    fn on_status_change(&self, status: SessionStatus);

    /// A new message begins; the UI shows a typing placeholder until the
    /// first content update
    fn on_message_start(&self, kind: MessageKind, speaker: &SpeakerLabel) -> MessageHandle;

    /// Replace the whole body of a message
    fn on_message_content_update(&self, handle: MessageHandle, body: &MessageBody);

    /// The message is complete
    fn on_message_end(&self, handle: MessageHandle);

    /// Show a banner between messages
    fn on_transient_notice(&self, notice: &Notice);

    /// Show a dismissible notice for a failed operation
    fn on_error_notice(&self, message: &str);
}

/// Markdown-to-markup collaborator
pub trait MarkdownRenderer: Send + Sync {
    /// Render the full raw text of a message
    fn render(&self, raw: &str) -> String;
}

/// Fallback renderer: escapes HTML and keeps the text as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapingRenderer;

impl MarkdownRenderer for EscapingRenderer {
    fn render(&self, raw: &str) -> String {
        escape_html(raw)
    }
}

/// Renderer that passes raw text through, for terminals and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRenderer;

impl MarkdownRenderer for RawRenderer {
    fn render(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Escape the five HTML-significant characters
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// One recorded sink callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum SinkCall {
    /// `on_status_change`
    Status {
        /// New status
        status: SessionStatus,
    },
    /// `on_message_start`
    MessageStart {
        /// Handle returned to the engine
        handle: MessageHandle,
        /// Message kind
        kind: MessageKind,
        /// Header
        speaker: SpeakerLabel,
    },
    /// `on_message_content_update`
    ContentUpdate {
        /// Target message
        handle: MessageHandle,
        /// New body
        body: MessageBody,
    },
    /// `on_message_end`
    MessageEnd {
        /// Finished message
        handle: MessageHandle,
    },
    /// `on_transient_notice`
    Notice {
        /// Banner
        notice: Notice,
    },
    /// `on_error_notice`
    ErrorNotice {
        /// Notice text
        message: String,
    },
}

/// Headless sink that records every callback in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    next_handle: AtomicU64,
}

impl RecordingSink {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calls so far
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// Drain the calls recorded so far
    pub fn take(&self) -> Vec<SinkCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Latest body shown for a message
    pub fn body_of(&self, handle: MessageHandle) -> Option<MessageBody> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            SinkCall::ContentUpdate { handle: h, body } if *h == handle => Some(body.clone()),
            _ => None,
        })
    }

    /// Every status reported, in order
    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Status { status } => Some(*status),
                _ => None,
            })
            .collect()
    }

    /// Every error notice shown, in order
    pub fn error_notices(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::ErrorNotice { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().push(call);
    }
}

impl RenderSink for RecordingSink {
    fn on_status_change(&self, status: SessionStatus) {
        self.record(SinkCall::Status { status });
    }

    fn on_message_start(&self, kind: MessageKind, speaker: &SpeakerLabel) -> MessageHandle {
        let handle = MessageHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.record(SinkCall::MessageStart {
            handle,
            kind,
            speaker: speaker.clone(),
        });
        handle
    }

    fn on_message_content_update(&self, handle: MessageHandle, body: &MessageBody) {
        self.record(SinkCall::ContentUpdate {
            handle,
            body: body.clone(),
        });
    }

    fn on_message_end(&self, handle: MessageHandle) {
        self.record(SinkCall::MessageEnd { handle });
    }

    fn on_transient_notice(&self, notice: &Notice) {
        self.record(SinkCall::Notice {
            notice: notice.clone(),
        });
    }

    fn on_error_notice(&self, message: &str) {
        self.record(SinkCall::ErrorNotice {
            message: message.to_string(),
        });
    }
}
