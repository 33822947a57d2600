//! Terminal debate
//!
//! Type a topic to start a panel discussion, then follow up or `@name` a
//! persona. Ctrl-C pauses the stream in flight.
//!
//! ```text
//! OPINION_ROOM_BASE_URL=http://localhost:8000 cargo run --example terminal_debate
//! ```

use opinion_room::mention::suggest;
use opinion_room::prelude::*;
use opinion_room::{
    telemetry, MessageBody, MessageHandle, MessageKind, Notice, RawRenderer, SpeakerLabel,
    DEFAULT_DEBATE_ROUNDS,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints streamed text incrementally; bodies are full re-renders, so only
/// the unseen suffix is written
#[derive(Default)]
struct TerminalSink {
    printed: Mutex<HashMap<MessageHandle, usize>>,
    next_handle: AtomicU64,
}

impl RenderSink for TerminalSink {
    fn on_status_change(&self, status: SessionStatus) {
        eprintln!("[{}]", status);
    }

    fn on_message_start(&self, kind: MessageKind, speaker: &SpeakerLabel) -> MessageHandle {
        let handle = MessageHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        match kind {
            MessageKind::User => println!("\n> {}:", speaker.name),
            MessageKind::Agent => println!("\n## {} ({})", speaker.name, speaker.detail),
            MessageKind::Summary => println!("\n## {}", speaker.name),
        }
        self.printed.lock().insert(handle, 0);
        handle
    }

    fn on_message_content_update(&self, handle: MessageHandle, body: &MessageBody) {
        let mut printed = self.printed.lock();
        let seen = printed.entry(handle).or_insert(0);
        match body {
            MessageBody::Rendered(text) => {
                if let Some(tail) = text.get(*seen..) {
                    print!("{}", tail);
                    *seen = text.len();
                }
            }
            MessageBody::Error(text) => println!("\n  !! {}", text),
        }
        let _ = std::io::stdout().flush();
    }

    fn on_message_end(&self, handle: MessageHandle) {
        self.printed.lock().remove(&handle);
        println!();
    }

    fn on_transient_notice(&self, notice: &Notice) {
        println!("\n-- {} --", notice);
    }

    fn on_error_notice(&self, message: &str) {
        eprintln!("\nerror: {}", message);
    }
}

/// Run one stream; Ctrl-C pauses it and waits for the loop to wind down
async fn drive(session: &Session, op: impl Future<Output = Result<StreamReport>>) {
    tokio::pin!(op);
    let result = tokio::select! {
        result = &mut op => result,
        _ = tokio::signal::ctrl_c() => {
            if let Err(err) = session.pause().await {
                eprintln!("pause failed: {}", err);
            }
            op.await
        }
    };

    match result {
        Ok(report) => eprintln!(
            "({} events, {} messages, {:.1}s{})",
            report.events,
            report.utterances,
            report.elapsed.as_secs_f64(),
            if report.is_cancelled() { ", paused: /resume to go on" } else { "" }
        ),
        Err(err) if err.is_rejection() => eprintln!("{}", err),
        Err(err) => tracing::debug!(error = %err, "stream failed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    telemetry::init_tracing(&config.logging)?;

    let backend: Arc<dyn DiscussionBackend> = Arc::new(HttpBackend::new(config.backend)?);
    let personas = backend.list_personas().await?;
    tracing::info!(personas = personas.len(), "panel loaded");

    let session = Session::new(backend, Arc::new(TerminalSink::default()))
        .with_renderer(Arc::new(RawRenderer));

    println!("Panel: {}", personas.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", "));
    println!("Commands: /summary /enhance /debate [rounds] /resume /stop /open <id> /new /who @<partial> /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "" => {}
            "/quit" => break,
            "/summary" => drive(&session, session.summarize()).await,
            "/enhance" => drive(&session, session.enhance_from_transcript()).await,
            "/debate" => {
                let rounds = arg.trim().parse().unwrap_or(DEFAULT_DEBATE_ROUNDS);
                drive(&session, session.debate(rounds)).await;
            }
            "/resume" => drive(&session, session.resume()).await,
            "/stop" => {
                if let Err(err) = session.stop().await {
                    eprintln!("{}", err);
                }
            }
            "/new" => match session.new_topic() {
                Ok(()) => println!("New topic: type a question to start."),
                Err(err) => eprintln!("{}", err),
            },
            "/open" => match arg.trim().parse::<i64>() {
                Ok(id) => {
                    if let Err(err) = session.attach(DiscussionId(id)).await {
                        eprintln!("{}", err);
                    }
                }
                Err(_) => {
                    for discussion in session.backend().list_discussions().await? {
                        println!("  {}  {}", discussion.id, discussion.topic);
                    }
                }
            },
            "/who" => {
                for persona in suggest(arg, &personas) {
                    println!("  @{}  {}", persona.name, persona.role);
                }
            }
            _ => drive(&session, session.submit(line, &personas)).await,
        }
    }

    Ok(())
}
