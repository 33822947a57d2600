//! Per-stream speaker tracking and utterance buffering
//!
//! The accumulator owns the raw text of the utterance being streamed and
//! re-renders the whole buffer on every chunk, since Markdown structure can
//! change retroactively (a closing code fence, a table row).

use crate::protocol::ProtocolEvent;
use crate::render::{
    MarkdownRenderer, MessageBody, MessageHandle, MessageKind, RenderSink, SpeakerLabel,
};
use crate::types::PersonaId;
use serde::{Deserialize, Serialize};

/// The persona currently emitting content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    /// Persona identifier
    pub id: PersonaId,
    /// Display name
    pub name: String,
    /// Role label
    pub role: String,
    /// Debate round, during multi-round phases
    pub round: Option<u32>,
}

/// How speaker headers are decorated for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelStyle {
    /// Role, plus the round during debates
    #[default]
    Discussion,
    /// Role marked as a data-check pass
    Enhancement,
}

impl LabelStyle {
    fn label(self, speaker: &Speaker) -> SpeakerLabel {
        let mut detail = speaker.role.clone();
        if let Some(round) = speaker.round {
            detail.push_str(&format!(" (round {})", round));
        }
        if self == Self::Enhancement {
            detail.push_str(" (data check)");
        }
        SpeakerLabel::new(speaker.name.clone(), detail)
    }
}

/// Tracks the active speaker and its buffer within one stream
#[derive(Debug, Default)]
pub struct SpeakerAccumulator {
    style: LabelStyle,
    active: Option<Speaker>,
    buffer: String,
    open: Option<MessageHandle>,
    errored: bool,
    utterances: usize,
}

impl SpeakerAccumulator {
    /// Create an accumulator decorating headers with `style`
    pub fn new(style: LabelStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// Persona mid-utterance, if any
    pub fn active_speaker(&self) -> Option<&Speaker> {
        self.active.as_ref()
    }

    /// Raw text of the current utterance
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Message currently receiving content
    pub fn open_handle(&self) -> Option<MessageHandle> {
        self.open
    }

    /// Number of messages opened so far
    pub fn utterances(&self) -> usize {
        self.utterances
    }

    /// Apply one speaker-related event. Returns `false` for events this
    /// accumulator does not handle.
    pub fn apply(
        &mut self,
        event: &ProtocolEvent,
        sink: &dyn RenderSink,
        renderer: &dyn MarkdownRenderer,
    ) -> bool {
        match event {
            ProtocolEvent::AgentStart {
                agent_id,
                agent_name,
                agent_role,
                round,
            } => {
                self.agent_start(
                    Speaker {
                        id: *agent_id,
                        name: agent_name.clone(),
                        role: agent_role.clone(),
                        round: *round,
                    },
                    sink,
                );
            }
            ProtocolEvent::Content { text } => self.content(text, sink, renderer),
            ProtocolEvent::AgentEnd { .. } | ProtocolEvent::Done => self.close(sink),
            ProtocolEvent::Error { message } => self.error(message, sink),
            _ => return false,
        }
        true
    }

    /// Begin a new utterance, discarding any unterminated one
    pub fn agent_start(&mut self, speaker: Speaker, sink: &dyn RenderSink) {
        if let Some(previous) = &self.active {
            tracing::debug!(
                previous = %previous.name,
                next = %speaker.name,
                "agent_start without agent_end; discarding buffer"
            );
        }
        let label = self.style.label(&speaker);
        self.reset();
        self.open = Some(sink.on_message_start(MessageKind::Agent, &label));
        self.active = Some(speaker);
        self.utterances += 1;
    }

    /// Open a summary message; summary streams carry no `agent_start`
    pub fn open_summary(&mut self, sink: &dyn RenderSink) {
        self.reset();
        self.open = Some(sink.on_message_start(MessageKind::Summary, &SpeakerLabel::summary()));
        self.utterances += 1;
    }

    /// Append a chunk and re-render the full buffer
    pub fn content(
        &mut self,
        text: &str,
        sink: &dyn RenderSink,
        renderer: &dyn MarkdownRenderer,
    ) {
        let Some(handle) = self.open else {
            tracing::debug!("content outside an utterance; ignoring");
            return;
        };
        if self.errored {
            return;
        }
        self.buffer.push_str(text);
        let body = MessageBody::Rendered(renderer.render(&self.buffer));
        sink.on_message_content_update(handle, &body);
    }

    /// Replace the open message with an error annotation
    pub fn error(&mut self, message: &str, sink: &dyn RenderSink) {
        tracing::warn!(%message, "backend reported an error");
        if let Some(handle) = self.open {
            let body = MessageBody::Error(format!("Error: {}", message));
            sink.on_message_content_update(handle, &body);
            self.errored = true;
        }
    }

    /// Finish the open message
    pub fn close(&mut self, sink: &dyn RenderSink) {
        if let Some(handle) = self.open {
            sink.on_message_end(handle);
        }
        self.reset();
    }

    /// Drop speaker state without closing the message, leaving its body as
    /// last rendered
    pub fn abandon(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.active = None;
        self.buffer.clear();
        self.open = None;
        self.errored = false;
    }
}
