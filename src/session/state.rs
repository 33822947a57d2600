//! Legal status transitions of a session
//!
//! ```text
//! Idle      -> Streaming | Completed
//! Streaming -> Paused | Stopped | Completed | Idle
//! Paused    -> Streaming | Stopped | Idle
//! Stopped   -> Streaming | Completed | Idle
//! Completed -> Streaming | Completed | Idle
//! ```
//!
//! `Streaming -> Idle` only happens when the discussion could not be
//! created. `Completed -> Completed` is attaching another stored discussion.

use crate::types::SessionStatus;

/// Whether `from -> to` is an edge of the session graph
pub fn is_legal_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;

    matches!(
        (from, to),
        (Idle, Streaming)
            | (Idle, Completed)
            | (Streaming, Paused)
            | (Streaming, Stopped)
            | (Streaming, Completed)
            | (Streaming, Idle)
            | (Paused, Streaming)
            | (Paused, Stopped)
            | (Paused, Idle)
            // follow-up operations reopen a finished discussion
            | (Stopped, Streaming)
            | (Stopped, Completed)
            | (Stopped, Idle)
            | (Completed, Streaming)
            | (Completed, Completed)
            | (Completed, Idle)
    )
}

/// Whether a discussion in this status can be replaced by a stored one
pub fn can_attach(status: SessionStatus) -> bool {
    matches!(
        status,
        SessionStatus::Idle | SessionStatus::Stopped | SessionStatus::Completed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    const ALL: [SessionStatus; 5] = [Idle, Streaming, Paused, Stopped, Completed];

    #[test]
    fn test_streaming_is_only_entered_from_rest_states() {
        for from in ALL {
            let expected = from != Streaming;
            assert_eq!(is_legal_transition(from, Streaming), expected, "{} -> streaming", from);
        }
    }

    #[test]
    fn test_pause_only_from_streaming() {
        for from in ALL {
            assert_eq!(is_legal_transition(from, Paused), from == Streaming);
        }
    }

    #[test]
    fn test_stop_from_streaming_or_paused() {
        assert!(is_legal_transition(Streaming, Stopped));
        assert!(is_legal_transition(Paused, Stopped));
        assert!(!is_legal_transition(Idle, Stopped));
        assert!(!is_legal_transition(Completed, Stopped));
    }

    #[test]
    fn test_attach_states() {
        assert!(can_attach(Idle));
        assert!(can_attach(Completed));
        assert!(!can_attach(Streaming));
        assert!(!can_attach(Paused));
        for from in ALL.into_iter().filter(|s| can_attach(*s)) {
            assert!(is_legal_transition(from, Completed));
        }
    }
}
