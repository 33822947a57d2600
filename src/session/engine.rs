//! Session lifecycle and stream driving

use super::state::{can_attach, is_legal_transition};
use crate::accumulator::{LabelStyle, Speaker, SpeakerAccumulator};
use crate::backend::{DiscussionBackend, StreamAction};
use crate::error::{Error, Result};
use crate::mention::{self, Route};
use crate::protocol::ProtocolEvent;
use crate::render::{
    EscapingRenderer, MarkdownRenderer, MessageBody, MessageKind, Notice, RenderSink, SpeakerLabel,
};
use crate::symbols::{extract_symbols, transcript_text};
use crate::telemetry::stream_span;
use crate::types::{
    DiscussionDetail, DiscussionId, Persona, SessionId, SessionStatus, StoredMessage,
    StoredMessageKind,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Rounds used by [`Session::debate`] callers that have no preference
pub const DEFAULT_DEBATE_ROUNDS: u32 = 2;

/// How a stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    /// The backend closed the stream
    Completed,
    /// The stream was aborted by pause or stop
    Cancelled,
}

/// Summary of one stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    /// Discussion the stream belonged to
    pub discussion_id: DiscussionId,
    /// Stream action name
    pub action: &'static str,
    /// How the stream ended
    pub outcome: StreamOutcome,
    /// Decoded events applied
    pub events: usize,
    /// Messages opened for personas or the summary
    pub utterances: usize,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Time from opening to the end of the stream
    pub elapsed: Duration,
}

impl StreamReport {
    /// Whether the stream was aborted
    pub fn is_cancelled(&self) -> bool {
        self.outcome == StreamOutcome::Cancelled
    }
}

#[derive(Debug)]
struct Inner {
    discussion: Option<DiscussionId>,
    topic: Option<String>,
    status: SessionStatus,
    active_speaker: Option<Speaker>,
    round: Option<u32>,
    cancel: Option<CancellationToken>,
    /// Bumped whenever a stream is opened; stale loops compare against it
    generation: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            discussion: None,
            topic: None,
            status: SessionStatus::Idle,
            active_speaker: None,
            round: None,
            cancel: None,
            generation: 0,
        }
    }

    /// Move to `to`, returning it when the status actually changed
    fn transition(&mut self, to: SessionStatus) -> Option<SessionStatus> {
        let from = self.status;
        if from == to {
            return None;
        }
        if !is_legal_transition(from, to) {
            tracing::warn!(%from, %to, "refusing illegal status transition");
            return None;
        }
        self.status = to;
        if !to.is_streaming() {
            self.active_speaker = None;
            self.round = None;
        }
        Some(to)
    }

    /// Take the stream slot with a fresh token and move to `Streaming`
    fn claim(&mut self) -> (Ticket, Option<SessionStatus>) {
        let token = CancellationToken::new();
        self.generation += 1;
        self.cancel = Some(token.clone());
        let changed = self.transition(SessionStatus::Streaming);
        let ticket = Ticket {
            token,
            generation: self.generation,
        };
        (ticket, changed)
    }
}

/// Claim on the stream slot
struct Ticket {
    token: CancellationToken,
    generation: u64,
}

/// Which status a follow-up stream may be opened from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opening {
    /// Any settled status with a discussion
    FollowUp,
    /// Only `Paused`
    Resume,
}

/// One conversation with the debate backend.
///
/// Share it as `Arc<Session>`: one task drives a stream while another may
/// [`pause`](Session::pause) or [`stop`](Session::stop) it. Sink callbacks
/// run on the driving task, never under the session lock. The status change
/// raised by `pause` or `stop` arrives on the caller's task, after any event
/// the driving task is already dispatching; no further output from that
/// stream follows it.
pub struct Session {
    id: SessionId,
    backend: Arc<dyn DiscussionBackend>,
    sink: Arc<dyn RenderSink>,
    renderer: Arc<dyn MarkdownRenderer>,
    inner: Mutex<Inner>,
    /// Serializes stream output against interruption; held only across sink
    /// callbacks
    emit: Mutex<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("backend", &self.backend.backend_type())
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

impl Session {
    /// Create an idle session rendering through [`EscapingRenderer`]
    pub fn new(backend: Arc<dyn DiscussionBackend>, sink: Arc<dyn RenderSink>) -> Self {
        Self {
            id: SessionId::new(),
            backend,
            sink,
            renderer: Arc::new(EscapingRenderer),
            inner: Mutex::new(Inner::new()),
            emit: Mutex::new(()),
        }
    }

    /// Use a different Markdown renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn MarkdownRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Local identifier for log correlation
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The backend this session talks to
    pub fn backend(&self) -> &Arc<dyn DiscussionBackend> {
        &self.backend
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status
    }

    /// Current discussion, if one was created or attached
    pub fn discussion_id(&self) -> Option<DiscussionId> {
        self.inner.lock().discussion
    }

    /// Current topic, if known
    pub fn topic(&self) -> Option<String> {
        self.inner.lock().topic.clone()
    }

    /// Persona mid-utterance
    pub fn active_speaker(&self) -> Option<Speaker> {
        self.inner.lock().active_speaker.clone()
    }

    /// Debate round in progress
    pub fn round(&self) -> Option<u32> {
        self.inner.lock().round
    }

    /// Create a discussion for `topic` and stream the panel's first pass
    pub async fn start(&self, topic: &str) -> Result<StreamReport> {
        self.open_discussion("start", topic, StreamAction::Start, None).await
    }

    /// Send a follow-up to the whole panel.
    ///
    /// Non-empty content is shown as the user's message before the request
    /// goes out.
    pub async fn continue_discussion(&self, content: &str) -> Result<StreamReport> {
        let (discussion, ticket) = self.begin_follow_up("continue", Opening::FollowUp)?;
        if !content.is_empty() {
            self.echo(content);
        }
        let action = StreamAction::Continue {
            content: content.to_string(),
        };
        self.run(discussion, ticket, action).await
    }

    /// Ask one persona; shown as `@name content`
    pub async fn ask_agent(&self, persona: &Persona, content: &str) -> Result<StreamReport> {
        if content.trim().is_empty() {
            return Err(Error::invalid_input("question is empty"));
        }
        let (discussion, ticket) = self.begin_follow_up("ask_agent", Opening::FollowUp)?;
        self.echo(&format!("@{} {}", persona.name, content));
        let action = StreamAction::AskAgent {
            agent_id: persona.id,
            content: content.to_string(),
        };
        self.run(discussion, ticket, action).await
    }

    /// Re-run the panel with live data for `symbols`
    pub async fn enhance(&self, symbols: Vec<String>) -> Result<StreamReport> {
        if symbols.is_empty() {
            return Err(Error::NoSymbols);
        }
        let (discussion, ticket) = self.begin_follow_up("enhance", Opening::FollowUp)?;
        self.run(discussion, ticket, StreamAction::Enhance { symbols })
            .await
    }

    /// Extract symbols from the stored transcript and enhance with them
    pub async fn enhance_from_transcript(&self) -> Result<StreamReport> {
        let discussion = {
            let inner = self.inner.lock();
            if inner.status.is_streaming() {
                return Err(Error::SessionBusy);
            }
            inner.discussion.ok_or(Error::NoDiscussion)?
        };

        let detail = self.backend.get_discussion(discussion).await?;
        let symbols = extract_symbols(&transcript_text(&detail.messages));
        if symbols.is_empty() {
            return Err(Error::NoSymbols);
        }
        tracing::info!(
            discussion = %discussion,
            symbols = ?symbols,
            "extracted symbols from transcript"
        );
        self.enhance(symbols).await
    }

    /// Stream a summary of the discussion
    pub async fn summarize(&self) -> Result<StreamReport> {
        let (discussion, ticket) = self.begin_follow_up("summarize", Opening::FollowUp)?;
        self.run(discussion, ticket, StreamAction::Summarize).await
    }

    /// Run an explicit multi-round debate
    pub async fn debate(&self, rounds: u32) -> Result<StreamReport> {
        if rounds == 0 {
            return Err(Error::invalid_input("a debate needs at least one round"));
        }
        let (discussion, ticket) = self.begin_follow_up("debate", Opening::FollowUp)?;
        self.run(discussion, ticket, StreamAction::Debate { rounds })
            .await
    }

    /// Abort the open stream and tell the backend to pause.
    ///
    /// Output rendered so far stays as it is.
    pub async fn pause(&self) -> Result<()> {
        self.interrupt("pause", SessionStatus::Paused).await
    }

    /// Like [`pause`](Self::pause) but lands in `Stopped`; also valid while
    /// paused
    pub async fn stop(&self) -> Result<()> {
        self.interrupt("stop", SessionStatus::Stopped).await
    }

    /// Tell the backend to resume, then continue with empty content.
    ///
    /// A `stop` that lands while the backend is acknowledging wins: the
    /// session stays `Stopped` and no stream opens.
    pub async fn resume(&self) -> Result<StreamReport> {
        let discussion = {
            let inner = self.inner.lock();
            if inner.status != SessionStatus::Paused {
                return Err(Error::invalid_state("resume", inner.status));
            }
            inner.discussion.ok_or(Error::NoDiscussion)?
        };

        if let Err(err) = self.backend.resume(discussion).await {
            tracing::warn!(
                discussion = %discussion,
                error = %err,
                "backend did not acknowledge resume"
            );
            return Err(err);
        }

        let (discussion, ticket) = self.begin_follow_up("resume", Opening::Resume)?;
        let action = StreamAction::Continue {
            content: String::new(),
        };
        self.run(discussion, ticket, action).await
    }

    /// Load a stored discussion and replay its messages as finished ones
    pub async fn attach(&self, id: DiscussionId) -> Result<DiscussionDetail> {
        let detail = self.backend.get_discussion(id).await?;

        let changed = {
            let mut inner = self.inner.lock();
            if inner.status.is_streaming() {
                return Err(Error::SessionBusy);
            }
            if !can_attach(inner.status) {
                return Err(Error::invalid_state("attach", inner.status));
            }
            inner.discussion = Some(detail.discussion.id);
            inner.topic = Some(detail.discussion.topic.clone());
            inner.transition(SessionStatus::Completed)
        };
        self.notify(changed);

        for message in &detail.messages {
            self.replay(message);
        }
        tracing::info!(
            session = %self.id,
            discussion = %id,
            messages = detail.messages.len(),
            "attached stored discussion"
        );
        Ok(detail)
    }

    /// Forget the current discussion and return to `Idle`
    pub fn new_topic(&self) -> Result<()> {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.status.is_streaming() {
                return Err(Error::SessionBusy);
            }
            inner.discussion = None;
            inner.topic = None;
            inner.transition(SessionStatus::Idle)
        };
        self.notify(changed);
        Ok(())
    }

    /// Send-box entry point: route `@persona question` to that persona,
    /// anything else to the whole panel.
    ///
    /// Without a discussion, one is created first; a targeted question
    /// becomes the topic `@{persona} {question}`.
    pub async fn submit(&self, input: &str, personas: &[Persona]) -> Result<StreamReport> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::invalid_input("message is empty"));
        }
        if personas.is_empty() {
            return Err(Error::NoPersonas);
        }

        let has_discussion = self.discussion_id().is_some();
        match mention::route(input, personas)? {
            Route::Targeted { persona, question } if has_discussion => {
                self.ask_agent(persona, question).await
            }
            Route::Targeted { persona, question } => {
                let shown = format!("@{} {}", persona.name, question);
                let action = StreamAction::AskAgent {
                    agent_id: persona.id,
                    content: question.to_string(),
                };
                self.open_discussion("ask_agent", &shown, action, Some(&shown))
                    .await
            }
            Route::Broadcast { content } if has_discussion => {
                self.continue_discussion(content).await
            }
            Route::Broadcast { content } => self.start(content).await,
        }
    }

    /// Claim the stream slot for a new discussion; only from `Idle`
    fn begin_fresh(&self, operation: &'static str) -> Result<Ticket> {
        let (ticket, changed) = {
            let mut inner = self.inner.lock();
            if inner.status.is_streaming() {
                return Err(Error::SessionBusy);
            }
            if inner.status != SessionStatus::Idle {
                return Err(Error::invalid_state(operation, inner.status));
            }
            inner.claim()
        };
        self.claimed(operation, &ticket, changed);
        Ok(ticket)
    }

    /// Claim the stream slot for another pass over the current discussion
    fn begin_follow_up(
        &self,
        operation: &'static str,
        opening: Opening,
    ) -> Result<(DiscussionId, Ticket)> {
        let (discussion, ticket, changed) = {
            let mut inner = self.inner.lock();
            if inner.status.is_streaming() {
                return Err(Error::SessionBusy);
            }
            if opening == Opening::Resume && inner.status != SessionStatus::Paused {
                return Err(Error::invalid_state(operation, inner.status));
            }
            let discussion = inner.discussion.ok_or(Error::NoDiscussion)?;
            let (ticket, changed) = inner.claim();
            (discussion, ticket, changed)
        };
        self.claimed(operation, &ticket, changed);
        Ok((discussion, ticket))
    }

    fn claimed(&self, operation: &'static str, ticket: &Ticket, changed: Option<SessionStatus>) {
        tracing::debug!(
            session = %self.id,
            operation,
            generation = ticket.generation,
            "stream slot claimed"
        );
        self.notify(changed);
    }

    /// Create the discussion, then stream `action` on it
    async fn open_discussion(
        &self,
        operation: &'static str,
        topic: &str,
        action: StreamAction,
        echo: Option<&str>,
    ) -> Result<StreamReport> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(Error::invalid_input("topic is empty"));
        }

        let ticket = self.begin_fresh(operation)?;
        if let Some(text) = echo {
            self.echo(text);
        }

        let discussion = match self.backend.create_discussion(topic).await {
            Ok(discussion) => discussion,
            Err(err) => return Err(self.fail(&ticket, SessionStatus::Idle, err)),
        };
        {
            let mut inner = self.inner.lock();
            if inner.generation == ticket.generation {
                inner.discussion = Some(discussion.id);
                inner.topic = Some(discussion.topic.clone());
            }
        }
        tracing::info!(
            session = %self.id,
            discussion = %discussion.id,
            topic = %discussion.topic,
            "discussion created"
        );

        self.run(discussion.id, ticket, action).await
    }

    async fn run(
        &self,
        discussion: DiscussionId,
        ticket: Ticket,
        action: StreamAction,
    ) -> Result<StreamReport> {
        let span = stream_span(self.id, discussion, action.name());
        self.drive(discussion, ticket, action).instrument(span).await
    }

    async fn drive(
        &self,
        discussion: DiscussionId,
        ticket: Ticket,
        action: StreamAction,
    ) -> Result<StreamReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let style = match action {
            StreamAction::Enhance { .. } => LabelStyle::Enhancement,
            _ => LabelStyle::Discussion,
        };
        let mut acc = SpeakerAccumulator::new(style);
        let mut round = None;
        let mut events = 0;

        tracing::info!("opening stream");
        let opened = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => None,
            opened = self.backend.open_stream(discussion, &action) => Some(opened),
        };
        let outcome = match opened {
            None => StreamOutcome::Cancelled,
            Some(Err(err)) => return Err(self.fail(&ticket, SessionStatus::Stopped, err)),
            Some(Ok(mut stream)) => {
                if action == StreamAction::Summarize {
                    let _emitting = self.emit.lock();
                    if !ticket.token.is_cancelled() {
                        acc.open_summary(self.sink.as_ref());
                    }
                }

                loop {
                    let next = tokio::select! {
                        biased;
                        _ = ticket.token.cancelled() => None,
                        next = stream.next() => Some(next),
                    };
                    let Some(next) = next else {
                        break StreamOutcome::Cancelled;
                    };
                    match next {
                        Some(Ok(event)) => {
                            let _emitting = self.emit.lock();
                            if ticket.token.is_cancelled() {
                                break StreamOutcome::Cancelled;
                            }
                            events += 1;
                            self.dispatch(&event, &mut acc, &mut round);
                            self.mirror(ticket.generation, &acc, round);
                        }
                        Some(Err(err)) => {
                            acc.abandon();
                            return Err(self.fail(&ticket, SessionStatus::Stopped, err));
                        }
                        None => {
                            if stream.skipped() > 0 {
                                tracing::warn!(
                                    skipped = stream.skipped(),
                                    "stream ended with skipped frames"
                                );
                            }
                            break StreamOutcome::Completed;
                        }
                    }
                }
            }
        };

        let outcome = {
            let _emitting = self.emit.lock();
            if outcome == StreamOutcome::Completed && !ticket.token.is_cancelled() {
                acc.close(self.sink.as_ref());
                self.settle(ticket.generation, SessionStatus::Completed);
                StreamOutcome::Completed
            } else {
                acc.abandon();
                StreamOutcome::Cancelled
            }
        };

        let report = StreamReport {
            discussion_id: discussion,
            action: action.name(),
            outcome,
            events,
            utterances: acc.utterances(),
            started_at,
            elapsed: clock.elapsed(),
        };
        tracing::info!(
            outcome = ?report.outcome,
            events = report.events,
            utterances = report.utterances,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "stream finished"
        );
        Ok(report)
    }

    /// Forward one event to the accumulator or the sink
    fn dispatch(
        &self,
        event: &ProtocolEvent,
        acc: &mut SpeakerAccumulator,
        round: &mut Option<u32>,
    ) {
        tracing::trace!(kind = event.kind(), "event");
        let sink = self.sink.as_ref();
        match event {
            ProtocolEvent::DebateStarting => sink.on_transient_notice(&Notice::DebateStarting),
            ProtocolEvent::RoundStart { round: current } => {
                *round = Some(*current);
                sink.on_transient_notice(&Notice::RoundStarted { round: *current });
            }
            ProtocolEvent::RoundEnd { .. } => *round = None,
            ProtocolEvent::DebateDone => {
                *round = None;
                sink.on_transient_notice(&Notice::DebateDone);
            }
            ProtocolEvent::EnhanceDone => sink.on_transient_notice(&Notice::EnhanceDone),
            ProtocolEvent::DataLoaded { symbols } => sink.on_transient_notice(&Notice::DataLoaded {
                symbols: symbols.clone(),
            }),
            ProtocolEvent::AllDone => tracing::debug!("panel finished"),
            ProtocolEvent::AgentStart { round: current, .. } => {
                if current.is_some() {
                    *round = *current;
                }
                acc.apply(event, sink, self.renderer.as_ref());
            }
            ProtocolEvent::Content { .. }
            | ProtocolEvent::AgentEnd { .. }
            | ProtocolEvent::Done
            | ProtocolEvent::Error { .. } => {
                acc.apply(event, sink, self.renderer.as_ref());
            }
        }
    }

    /// Copy the loop's speaker and round into the shared state
    fn mirror(&self, generation: u64, acc: &SpeakerAccumulator, round: Option<u32>) {
        let mut inner = self.inner.lock();
        if inner.generation == generation && inner.status.is_streaming() {
            inner.active_speaker = acc.active_speaker().cloned();
            inner.round = round;
        }
    }

    /// End the stream identified by `generation` in `to`. Returns `false`
    /// when that stream was already interrupted or replaced.
    fn settle(&self, generation: u64, to: SessionStatus) -> bool {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || !inner.status.is_streaming() {
                return false;
            }
            inner.cancel = None;
            inner.transition(to)
        };
        self.notify(changed);
        true
    }

    /// Settle a failed stream and surface the failure
    fn fail(&self, ticket: &Ticket, to: SessionStatus, err: Error) -> Error {
        if self.settle(ticket.generation, to) {
            tracing::error!(session = %self.id, error = %err, "stream failed");
            self.sink.on_error_notice(&err.to_string());
        }
        err
    }

    async fn interrupt(&self, operation: &'static str, to: SessionStatus) -> Result<()> {
        let (discussion, was_streaming) = {
            // waits out an event the driving task is dispatching
            let _emitting = self.emit.lock();
            let (discussion, was_streaming, changed) = {
                let mut inner = self.inner.lock();
                let from = inner.status;
                if !is_legal_transition(from, to) {
                    return Err(Error::invalid_state(operation, from));
                }
                if let Some(token) = inner.cancel.take() {
                    token.cancel();
                }
                (inner.discussion, from.is_streaming(), inner.transition(to))
            };
            self.notify(changed);
            (discussion, was_streaming)
        };

        // a paused discussion is already idle on the backend
        if let (Some(discussion), true) = (discussion, was_streaming) {
            if let Err(err) = self.backend.pause(discussion).await {
                tracing::warn!(
                    discussion = %discussion,
                    operation,
                    error = %err,
                    "backend did not acknowledge pause"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    fn notify(&self, changed: Option<SessionStatus>) {
        if let Some(status) = changed {
            tracing::info!(session = %self.id, %status, "status changed");
            self.sink.on_status_change(status);
        }
    }

    /// Show the user's own message as a finished message
    fn echo(&self, text: &str) {
        self.finished_message(MessageKind::User, &SpeakerLabel::user(), text);
    }

    fn replay(&self, message: &StoredMessage) {
        let (kind, label) = match message.message_type {
            StoredMessageKind::User => (MessageKind::User, SpeakerLabel::user()),
            StoredMessageKind::Agent => (
                MessageKind::Agent,
                SpeakerLabel::new(message.agent_name.as_deref().unwrap_or("Agent"), ""),
            ),
            StoredMessageKind::Summary => (MessageKind::Summary, SpeakerLabel::summary()),
        };
        self.finished_message(kind, &label, &message.content);
    }

    fn finished_message(&self, kind: MessageKind, label: &SpeakerLabel, raw: &str) {
        let handle = self.sink.on_message_start(kind, label);
        self.sink
            .on_message_content_update(handle, &MessageBody::Rendered(self.renderer.render(raw)));
        self.sink.on_message_end(handle);
    }
}
