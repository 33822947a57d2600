//! Typed events of the debate backend's streaming protocol
//!
//! Each frame on the wire carries one JSON object tagged by `"type"`:
//!
//! ```text
//! data: {"type": "agent_start", "agent_id": 3, "agent_name": "Elena Value", "agent_role": "Value investor"}
//! data: {"type": "content", "content": "Margins are "}
//! data: {"type": "agent_end", "agent_id": 3}
//! ```

use crate::types::PersonaId;
use serde::{Deserialize, Serialize};

/// One event of a discussion stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// A multi-round debate phase is about to begin
    DebateStarting,
    /// A debate round begins
    RoundStart {
        /// 1-based round number
        round: u32,
    },
    /// A debate round ended
    RoundEnd {
        /// Round that ended, when the backend reports it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
    },
    /// The debate phase finished
    DebateDone,
    /// The data enhancement pass finished
    EnhanceDone,
    /// Market data for these symbols was loaded before enhancement
    DataLoaded {
        /// Symbols the backend actually loaded
        symbols: Vec<String>,
    },
    /// A persona starts speaking
    AgentStart {
        /// Speaking persona
        agent_id: PersonaId,
        /// Display name
        agent_name: String,
        /// Role label
        agent_role: String,
        /// Debate round, during multi-round phases
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
    },
    /// A chunk of the current utterance
    Content {
        /// Raw text chunk
        #[serde(rename = "content")]
        text: String,
    },
    /// The current persona finished speaking
    AgentEnd {
        /// Persona that finished, when reported
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<PersonaId>,
        /// Debate round, when reported
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
    },
    /// Every persona of a broadcast stream has spoken
    AllDone,
    /// A summary stream finished
    Done,
    /// The backend reported a failure for the current utterance
    Error {
        /// Human-readable message
        message: String,
    },
}

impl ProtocolEvent {
    /// Wire tag of this event, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DebateStarting => "debate_starting",
            Self::RoundStart { .. } => "round_start",
            Self::RoundEnd { .. } => "round_end",
            Self::DebateDone => "debate_done",
            Self::EnhanceDone => "enhance_done",
            Self::DataLoaded { .. } => "data_loaded",
            Self::AgentStart { .. } => "agent_start",
            Self::Content { .. } => "content",
            Self::AgentEnd { .. } => "agent_end",
            Self::AllDone => "all_done",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Parse one JSON payload
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent_start_with_round() {
        let event = ProtocolEvent::from_json(
            r#"{"type":"agent_start","agent_id":4,"agent_name":"Marcus Growth","agent_role":"Growth","round":2}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ProtocolEvent::AgentStart {
                agent_id: PersonaId(4),
                agent_name: "Marcus Growth".to_string(),
                agent_role: "Growth".to_string(),
                round: Some(2),
            }
        );
    }

    #[test]
    fn test_unit_events_ignore_extra_fields() {
        let event = ProtocolEvent::from_json(r#"{"type":"debate_done","extra":1}"#).unwrap();
        assert_eq!(event, ProtocolEvent::DebateDone);

        let event =
            ProtocolEvent::from_json(r#"{"type":"agent_end","agent_id":4,"round":1}"#).unwrap();
        assert_eq!(
            event,
            ProtocolEvent::AgentEnd {
                agent_id: Some(PersonaId(4)),
                round: Some(1)
            }
        );
    }

    #[test]
    fn test_content_uses_wire_field_name() {
        let event = ProtocolEvent::Content {
            text: "hi".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"content","content":"hi"}"#);
        assert_eq!(event.kind(), "content");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(ProtocolEvent::from_json(r#"{"type":"heartbeat"}"#).is_err());
        assert!(ProtocolEvent::from_json(r#"{"content":"no tag"}"#).is_err());
    }
}
