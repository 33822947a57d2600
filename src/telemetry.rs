//! Tracing and observability setup

use crate::config::LogConfig;
use crate::error::{Error, Result};
use crate::types::{DiscussionId, SessionId};
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::config(format!("invalid log filter `{}`: {}", config.level, e)))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    result.map_err(|e| Error::Tracing(e.to_string()))
}

/// Span wrapping one stream of a session
pub fn stream_span(session: SessionId, discussion: DiscussionId, action: &'static str) -> Span {
    tracing::info_span!("stream", session = %session, discussion = %discussion, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_config_error() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LogConfig {
            level: "opinion_room=loud".to_string(),
            json: false,
        };
        assert!(matches!(init_tracing(&config), Err(Error::Config(_))));
    }
}
