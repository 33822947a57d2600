//! Scripted backend shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use opinion_room::decoder::encode_frame;
use opinion_room::{
    Discussion, DiscussionBackend, DiscussionDetail, DiscussionId, Error, EventStream, ModelInfo,
    Persona, PersonaId, ProtocolEvent, RawRenderer, RecordingSink, RenderSink, Result, Session,
    SinkCall, StoredMessage, StoredMessageKind, StreamAction,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// What the next opened stream does
pub enum Script {
    /// Emit the events, then close
    Events(Vec<ProtocolEvent>),
    /// Emit the events, then never produce anything again
    Hang(Vec<ProtocolEvent>),
    /// Emit the events, then fail the transport
    Broken(Vec<ProtocolEvent>),
    /// Refuse to open with this status
    Rejected(u16, &'static str),
}

/// In-memory backend that replays scripts and records every call
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Option<serde_json::Value>>>,
    stored: Mutex<HashMap<DiscussionId, DiscussionDetail>>,
    next_id: Mutex<i64>,
    resume_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            next_id: Mutex::new(1),
            ..Self::default()
        }
    }

    pub fn store(&self, detail: DiscussionDetail) {
        self.stored.lock().insert(detail.discussion.id, detail);
    }

    pub fn stored(&self, id: DiscussionId) -> Option<DiscussionDetail> {
        self.stored.lock().get(&id).cloned()
    }

    /// Hold every later `resume` acknowledgement until the gate is notified
    pub fn gate_resume(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.resume_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Request bodies of opened streams, in order
    pub fn bodies(&self) -> Vec<Option<serde_json::Value>> {
        self.bodies.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

fn frames(events: &[ProtocolEvent]) -> Vec<Result<Bytes>> {
    events
        .iter()
        .map(|event| encode_frame(event).map(Bytes::from))
        .collect()
}

#[async_trait]
impl DiscussionBackend for ScriptedBackend {
    async fn create_discussion(&self, topic: &str) -> Result<Discussion> {
        self.record(format!("create {}", topic));
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            DiscussionId(id)
        };
        let discussion = Discussion {
            id,
            topic: topic.to_string(),
            status: "in_progress".to_string(),
            summary: None,
            created_at: None,
        };
        self.store(DiscussionDetail {
            discussion: discussion.clone(),
            messages: Vec::new(),
        });
        Ok(discussion)
    }

    async fn get_discussion(&self, id: DiscussionId) -> Result<DiscussionDetail> {
        self.record(format!("get {}", id));
        self.stored
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::backend(404, "Discussion not found"))
    }

    async fn list_discussions(&self) -> Result<Vec<Discussion>> {
        Ok(self
            .stored
            .lock()
            .values()
            .map(|d| d.discussion.clone())
            .collect())
    }

    async fn list_personas(&self) -> Result<Vec<Persona>> {
        Ok(panel())
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }

    async fn open_stream(&self, id: DiscussionId, action: &StreamAction) -> Result<EventStream> {
        self.record(format!("{} {}", action.name(), id));
        self.bodies.lock().push(action.body());

        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or(Script::Events(Vec::new()));
        Ok(match script {
            Script::Events(events) => EventStream::new(futures::stream::iter(frames(&events))),
            Script::Hang(events) => EventStream::new(
                futures::stream::iter(frames(&events)).chain(futures::stream::pending()),
            ),
            Script::Broken(events) => {
                let reset = std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                );
                let mut chunks = frames(&events);
                chunks.push(Err(Error::Io(reset)));
                EventStream::new(futures::stream::iter(chunks))
            }
            Script::Rejected(status, body) => return Err(Error::backend(status, body)),
        })
    }

    async fn pause(&self, id: DiscussionId) -> Result<()> {
        self.record(format!("pause {}", id));
        Ok(())
    }

    async fn resume(&self, id: DiscussionId) -> Result<()> {
        self.record(format!("resume {}", id));
        let gate = self.resume_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(())
    }

    fn backend_type(&self) -> &str {
        "scripted"
    }
}

pub fn panel() -> Vec<Persona> {
    vec![
        Persona::new(1, "Marcus Growth", "Growth investor"),
        Persona::new(2, "Elena Value", "Value investor"),
    ]
}

pub fn agent_start(id: i64, name: &str) -> ProtocolEvent {
    ProtocolEvent::AgentStart {
        agent_id: PersonaId(id),
        agent_name: name.to_string(),
        agent_role: "Investor".to_string(),
        round: None,
    }
}

pub fn content(text: &str) -> ProtocolEvent {
    ProtocolEvent::Content {
        text: text.to_string(),
    }
}

pub fn agent_end(id: i64) -> ProtocolEvent {
    ProtocolEvent::AgentEnd {
        agent_id: Some(PersonaId(id)),
        round: None,
    }
}

pub fn stored_agent_message(id: i64, discussion: DiscussionId, text: &str) -> StoredMessage {
    StoredMessage {
        id,
        discussion_id: discussion,
        agent_id: Some(PersonaId(1)),
        agent_name: Some("Marcus Growth".to_string()),
        content: text.to_string(),
        message_type: StoredMessageKind::Agent,
        created_at: None,
    }
}

pub struct Harness {
    pub session: Arc<Session>,
    pub backend: Arc<ScriptedBackend>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(scripts: Vec<Script>) -> Harness {
    let sink = Arc::new(RecordingSink::new());
    harness_with_sink(scripts, sink.clone(), sink)
}

/// Like [`harness`], with `sink` in front of the recording sink
pub fn harness_with_sink(
    scripts: Vec<Script>,
    sink: Arc<dyn RenderSink>,
    recording: Arc<RecordingSink>,
) -> Harness {
    let backend = Arc::new(ScriptedBackend::new(scripts));
    let session = Session::new(backend.clone(), sink).with_renderer(Arc::new(RawRenderer));
    Harness {
        session: Arc::new(session),
        backend,
        sink: recording,
    }
}

/// Poll the backend until it has recorded `call`
pub async fn wait_for_call(backend: &ScriptedBackend, call: &str) {
    for _ in 0..400 {
        if backend.calls().iter().any(|c| c == call) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("backend never saw {:?}: {:?}", call, backend.calls());
}

/// Poll the sink until `done` holds for its calls
pub async fn wait_for(sink: &RecordingSink, done: impl Fn(&[SinkCall]) -> bool) {
    for _ in 0..400 {
        if done(&sink.calls()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("sink never reached the expected state: {:?}", sink.calls());
}
