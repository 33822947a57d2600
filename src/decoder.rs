//! Event decoder: raw byte stream to typed protocol events
//!
//! The backend writes newline-delimited frames. Frames carrying an event
//! start with [`EVENT_MARKER`]; every other line (blank separators, comments)
//! is framing noise and is ignored. A frame whose payload does not parse is
//! logged and skipped, the stream keeps going. Only transport failures end
//! the stream with an error.

use crate::error::{Error, Result};
use crate::protocol::ProtocolEvent;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Prefix of every frame that carries an event
pub const EVENT_MARKER: &str = "data: ";

/// Incremental line splitter and frame parser.
///
/// Splits on raw bytes before decoding, so a multi-byte character or a frame
/// split across transport chunks is reassembled intact.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    skipped: usize,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk, returning every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line[..pos]) {
                events.push(event);
            }
        }
        events
    }

    /// Decode a trailing unterminated line once the transport has ended
    pub fn finish(&mut self) -> Option<ProtocolEvent> {
        let line = std::mem::take(&mut self.buffer);
        if line.is_empty() {
            return None;
        }
        self.decode_line(&line)
    }

    /// Number of malformed frames skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<ProtocolEvent> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let text = String::from_utf8_lossy(line);
        let payload = text.strip_prefix(EVENT_MARKER)?;

        match ProtocolEvent::from_json(payload) {
            Ok(event) => Some(event),
            Err(err) => {
                self.skipped += 1;
                tracing::warn!(error = %err, frame = %payload, "skipping malformed frame");
                None
            }
        }
    }
}

/// Serialize one event as a wire frame (marker, JSON, blank separator line)
pub fn encode_frame(event: &ProtocolEvent) -> Result<String> {
    Ok(format!("{}{}\n\n", EVENT_MARKER, serde_json::to_string(event)?))
}

/// Lazy, finite, non-restartable sequence of protocol events
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    decoder: FrameDecoder,
    pending: VecDeque<ProtocolEvent>,
    finished: bool,
}

impl EventStream {
    /// Wrap a byte stream
    pub fn new(stream: impl Stream<Item = Result<Bytes>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Wrap the body of a streaming HTTP response
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(response.bytes_stream().map(|chunk| chunk.map_err(Error::from)))
    }

    /// Build a stream over in-memory chunks
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::new(futures::stream::iter(chunks))
    }

    /// Build a stream that replays the given events as wire frames
    pub fn from_events(events: &[ProtocolEvent]) -> Result<Self> {
        let frames = events
            .iter()
            .map(encode_frame)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_chunks(frames))
    }

    /// Number of malformed frames skipped so far
    pub fn skipped(&self) -> usize {
        self.decoder.skipped()
    }
}

impl Stream for EventStream {
    type Item = Result<ProtocolEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.pending.extend(this.decoder.push(&chunk));
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    this.pending.extend(this.decoder.finish());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn content(text: &str) -> ProtocolEvent {
        ProtocolEvent::Content {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_frames_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"con").is_empty());
        let events =
            decoder.push(b"tent\",\"content\":\"Hi\"}\n\ndata: {\"type\":\"agent_end\"}\n");
        assert_eq!(
            events,
            vec![
                content("Hi"),
                ProtocolEvent::AgentEnd {
                    agent_id: None,
                    round: None
                }
            ]
        );
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let frame = "data: {\"type\":\"content\",\"content\":\"特斯拉\"}\n".as_bytes();
        let split = frame.len() - 8;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frame[..split]).is_empty());
        assert_eq!(decoder.push(&frame[split..]), vec![content("特斯拉")]);
    }

    #[test]
    fn test_malformed_and_unmarked_lines_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b": keepalive\r\nevent: ping\ndata: {not json}\ndata: {\"type\":\"debate_done\"}\r\n",
        );
        assert_eq!(events, vec![ProtocolEvent::DebateDone]);
        assert_eq!(decoder.skipped(), 1);
    }

    #[test]
    fn test_trailing_line_decoded_at_finish() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"all_done\"}").is_empty());
        assert_eq!(decoder.finish(), Some(ProtocolEvent::AllDone));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_event_stream_yields_in_order() {
        let events = vec![
            ProtocolEvent::RoundStart { round: 1 },
            content("a"),
            content("b"),
            ProtocolEvent::RoundEnd { round: Some(1) },
        ];
        let stream = EventStream::from_events(&events).unwrap();
        let decoded: Vec<_> = stream.map(|e| e.unwrap()).collect().await;
        assert_eq!(decoded, events);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",\"content\":\"x\"}\n")),
            Err(Error::other("connection reset")),
            Ok(Bytes::from_static(b"data: {\"type\":\"all_done\"}\n")),
        ];
        let mut stream = EventStream::new(futures::stream::iter(chunks));

        assert_eq!(stream.next().await.unwrap().unwrap(), content("x"));
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
