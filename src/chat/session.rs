// Conversation state and the cancellable stream-consumption loop
//
// ChatSession owns the transcript and drives one streaming exchange at a
// time: append a user turn, trim the outbound payload, open the stream,
// grow the in-progress assistant turn fragment by fragment. Stop, clear
// and regenerate mirror the UI actions.

use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::decoder::Utf8Decoder;
use super::transport::ChatTransport;
use super::{Role, Turn};

/// Most recent turns sent upstream. The displayed transcript is not
/// trimmed; only the outbound payload is.
const MAX_PAYLOAD_TURNS: usize = 10;

/// Explicit session state machine, replacing loading/streaming flag pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No stream open; send/regenerate are accepted
    Idle,
    /// Request issued, waiting for response headers
    Sending,
    /// Body open, fragments being applied
    Streaming,
    /// Cancellation observed, cleanup in progress
    Cancelling,
}

/// How one streaming exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Upstream closed the stream normally
    Completed,
    /// User stopped the stream; partial output kept as-is
    Cancelled,
    /// Failure before any content; surfaced as an error chat entry
    SetupFailed,
    /// Read failure mid-stream; error appended as a new chat entry
    Failed,
    /// Preconditions not met; no network call was made
    NotStarted,
}

/// A cloneable handle for poking the session from outside the read loop.
///
/// All fields are Arc-wrapped, so cloning is cheap. The cancellation token
/// is replaced at every stream setup and cancelled at most once per
/// stream; the byte counter exists for observability only.
#[derive(Clone)]
pub struct SessionHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    streaming: Arc<AtomicBool>,
    bytes_received: Arc<AtomicU64>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            streaming: Arc::new(AtomicBool::new(false)),
            bytes_received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Signal cancellation of the in-flight stream. Idempotent; calling
    /// with no stream open (or after it closed) does nothing.
    pub fn stop(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    /// Whether a stream is currently open.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Bytes received on the current/most recent stream.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Install a fresh token for a new stream and reset counters.
    fn begin_stream(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        *self.cancel.lock().unwrap() = fresh.clone();
        self.bytes_received.store(0, Ordering::Relaxed);
        self.streaming.store(true, Ordering::Release);
        fresh
    }

    fn add_bytes(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    fn end_stream(&self) {
        self.streaming.store(false, Ordering::Release);
    }
}

/// Client-side chat: owns the transcript for the session and produces one
/// new assistant turn per streaming exchange.
pub struct ChatSession<T: ChatTransport> {
    transport: T,
    turns: Vec<Turn>,
    phase: Phase,
    handle: SessionHandle,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            turns: Vec::new(),
            phase: Phase::Idle,
            handle: SessionHandle::new(),
        }
    }

    /// The full displayed transcript, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Cloneable handle for stopping the stream from another task.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Append a user turn and stream the reply. `on_fragment` runs after
    /// each applied fragment (the UI re-renders there). No-op while a
    /// stream is open or for blank input.
    pub async fn send(&mut self, text: &str, on_fragment: impl FnMut(&str)) -> StreamOutcome {
        if self.phase != Phase::Idle || text.trim().is_empty() {
            return StreamOutcome::NotStarted;
        }

        self.turns.push(Turn::user(text));
        self.stream_response(on_fragment).await
    }

    /// Drop the last assistant turn and stream a replacement. No-op (no
    /// network call) unless the conversation ends with an assistant turn.
    pub async fn regenerate(&mut self, on_fragment: impl FnMut(&str)) -> StreamOutcome {
        if self.phase != Phase::Idle {
            return StreamOutcome::NotStarted;
        }
        match self.turns.last() {
            Some(turn) if turn.role == Role::Assistant => {}
            _ => return StreamOutcome::NotStarted,
        }

        self.turns.pop();
        self.stream_response(on_fragment).await
    }

    /// Stop the in-flight stream, if any, and reset to Idle. Idempotent;
    /// the partially accumulated assistant turn is left exactly as-is.
    pub fn stop(&mut self) {
        self.handle.stop();
        self.handle.end_stream();
        self.phase = Phase::Idle;
    }

    /// Stop, then wipe the transcript and all transient state.
    pub fn clear(&mut self) {
        self.stop();
        self.turns.clear();
    }

    async fn stream_response(&mut self, mut on_fragment: impl FnMut(&str)) -> StreamOutcome {
        self.phase = Phase::Sending;
        let cancel = self.handle.begin_stream();

        let payload_start = self.turns.len().saturating_sub(MAX_PAYLOAD_TURNS);
        let mut stream = match self.transport.open(&self.turns[payload_start..]).await {
            Ok(stream) => stream,
            Err(e) => {
                // Setup failures become a visible chat entry, never a
                // silent drop; no empty assistant turn was created yet
                self.turns.push(Turn::assistant(format!("Error: {}", e)));
                self.finish_stream();
                return StreamOutcome::SetupFailed;
            }
        };

        self.turns.push(Turn::assistant(String::new()));
        self.phase = Phase::Streaming;

        let mut decoder = Utf8Decoder::new();
        let outcome = loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    self.phase = Phase::Cancelling;
                    break StreamOutcome::Cancelled;
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(bytes)) => {
                    self.handle.add_bytes(bytes.len() as u64);
                    let fragment = decoder.decode(&bytes);
                    if !fragment.is_empty() {
                        self.append_fragment(&fragment);
                        on_fragment(&fragment);
                    }
                }
                Some(Err(message)) => {
                    // Partial output stays; the error gets its own turn
                    self.turns.push(Turn::assistant(format!("Error: {}", message)));
                    break StreamOutcome::Failed;
                }
                None => {
                    let tail = decoder.finish();
                    if !tail.is_empty() {
                        self.append_fragment(&tail);
                        on_fragment(&tail);
                    }
                    break StreamOutcome::Completed;
                }
            }
        };

        self.finish_stream();
        outcome
    }

    /// Grow the in-progress assistant turn (always the last one).
    fn append_fragment(&mut self, fragment: &str) {
        if let Some(last) = self.turns.last_mut() {
            last.content.push_str(fragment);
        }
    }

    /// Idempotent cleanup shared by every exit path.
    fn finish_stream(&mut self) {
        self.handle.end_stream();
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::transport::{ByteStream, StreamSetupError};
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Transport that replays a script of chunks and records every payload
    /// it was opened with.
    struct ScriptTransport {
        script: Vec<Result<Vec<u8>, String>>,
        hang_after: bool,
        calls: Arc<Mutex<Vec<Vec<Turn>>>>,
    }

    impl ScriptTransport {
        fn new(script: Vec<Result<Vec<u8>, String>>) -> Self {
            Self {
                script,
                hang_after: false,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn fragments(fragments: &[&str]) -> Self {
            Self::new(fragments.iter().map(|f| Ok(f.as_bytes().to_vec())).collect())
        }

        fn hanging(fragments: &[&str]) -> Self {
            let mut t = Self::fragments(fragments);
            t.hang_after = true;
            t
        }

        fn calls(&self) -> Arc<Mutex<Vec<Vec<Turn>>>> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptTransport {
        async fn open(&self, turns: &[Turn]) -> Result<ByteStream, StreamSetupError> {
            self.calls.lock().unwrap().push(turns.to_vec());
            let items = self
                .script
                .clone()
                .into_iter()
                .map(|r| r.map(Bytes::from));
            let stream = futures::stream::iter(items);
            if self.hang_after {
                Ok(Box::pin(stream.chain(futures::stream::pending())))
            } else {
                Ok(Box::pin(stream))
            }
        }
    }

    /// Transport whose setup always fails.
    struct RefusingTransport;

    #[async_trait]
    impl ChatTransport for RefusingTransport {
        async fn open(&self, _turns: &[Turn]) -> Result<ByteStream, StreamSetupError> {
            Err(StreamSetupError("Failed to stream response.".to_string()))
        }
    }

    #[tokio::test]
    async fn test_send_assembles_fragments_in_order() {
        let mut session = ChatSession::new(ScriptTransport::fragments(&["He", "llo", "!"]));
        let mut seen = String::new();

        let outcome = session.send("Hi", |f| seen.push_str(f)).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(seen, "Hello!");
        assert_eq!(
            session.turns(),
            &[Turn::user("Hi"), Turn::assistant("Hello!")]
        );
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.handle().is_streaming());
    }

    #[tokio::test]
    async fn test_fragment_split_inside_multibyte_char() {
        // "🎶" = F0 9F 8E B6 split across chunk boundaries
        let transport = ScriptTransport::new(vec![
            Ok(b"la \xF0\x9F".to_vec()),
            Ok(b"\x8E\xB6".to_vec()),
            Ok(b" la".to_vec()),
        ]);
        let mut session = ChatSession::new(transport);

        session.send("sing", |_| {}).await;

        assert_eq!(session.turns().last().unwrap().content, "la 🎶 la");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_after_natural_close() {
        let mut session = ChatSession::new(ScriptTransport::fragments(&["done"]));
        session.send("Hi", |_| {}).await;

        let before = session.turns().to_vec();
        session.stop();
        session.stop();

        assert_eq!(session.turns(), before.as_slice());
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.handle().is_streaming());
    }

    #[tokio::test]
    async fn test_payload_capped_at_ten_turns() {
        let transport = ScriptTransport::fragments(&["ok"]);
        let calls = transport.calls();
        let mut session = ChatSession::new(transport);

        // 15 pre-existing turns
        for i in 0..15 {
            let turn = if i % 2 == 0 {
                Turn::user(format!("u{}", i))
            } else {
                Turn::assistant(format!("a{}", i))
            };
            session.turns.push(turn);
        }

        session.send("newest", |_| {}).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let payload = &calls[0];
        assert_eq!(payload.len(), 10);
        // Newest user turn is included; everything older than the window is not
        assert_eq!(payload.last().unwrap(), &Turn::user("newest"));
        assert_eq!(payload.first().unwrap(), &Turn::user("u6"));
        // Displayed transcript was not trimmed (16 + streamed reply)
        assert_eq!(session.turns().len(), 17);
    }

    #[tokio::test]
    async fn test_regenerate_preconditions_issue_no_call() {
        let transport = ScriptTransport::fragments(&["ok"]);
        let calls = transport.calls();
        let mut session = ChatSession::new(transport);

        // Empty conversation
        assert_eq!(session.regenerate(|_| {}).await, StreamOutcome::NotStarted);

        // Last turn is a user turn
        session.turns.push(Turn::user("Hi"));
        assert_eq!(session.regenerate(|_| {}).await, StreamOutcome::NotStarted);

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(session.turns(), &[Turn::user("Hi")]);
    }

    #[tokio::test]
    async fn test_regenerate_replaces_last_assistant_turn() {
        let transport = ScriptTransport::fragments(&["Hi there!"]);
        let calls = transport.calls();
        let mut session = ChatSession::new(transport);
        session.turns.push(Turn::user("Hi"));
        session.turns.push(Turn::assistant("Hello!"));

        let outcome = session.regenerate(|_| {}).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(calls.lock().unwrap()[0], vec![Turn::user("Hi")]);
        assert_eq!(
            session.turns(),
            &[Turn::user("Hi"), Turn::assistant("Hi there!")]
        );
    }

    #[tokio::test]
    async fn test_setup_failure_becomes_error_turn() {
        let mut session = ChatSession::new(RefusingTransport);

        let outcome = session.send("Hi", |_| {}).await;

        assert_eq!(outcome, StreamOutcome::SetupFailed);
        // One user turn plus one synthesized error turn; no empty turn
        assert_eq!(
            session.turns(),
            &[
                Turn::user("Hi"),
                Turn::assistant("Error: Failed to stream response.")
            ]
        );
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_midstream_error_preserves_partial_output() {
        let transport = ScriptTransport::new(vec![
            Ok(b"Hel".to_vec()),
            Ok(b"lo".to_vec()),
            Err("connection reset".to_string()),
        ]);
        let mut session = ChatSession::new(transport);

        let outcome = session.send("Hi", |_| {}).await;

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(
            session.turns(),
            &[
                Turn::user("Hi"),
                Turn::assistant("Hello"),
                Turn::assistant("Error: connection reset"),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_midstream_keeps_partial_turn() {
        let mut session = ChatSession::new(ScriptTransport::hanging(&["Par", "tial"]));
        let handle = session.handle();

        // Stop from the render callback once both fragments arrived,
        // which is the next cancellation checkpoint for the read loop
        let mut count = 0;
        let outcome = session
            .send("Hi", |_| {
                count += 1;
                if count == 2 {
                    handle.stop();
                }
            })
            .await;

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(session.turns().last().unwrap(), &Turn::assistant("Partial"));
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.handle().is_streaming());
    }

    #[tokio::test]
    async fn test_clear_stops_and_empties() {
        let mut session = ChatSession::new(ScriptTransport::fragments(&["Hello!"]));
        session.send("Hi", |_| {}).await;

        session.clear();

        assert!(session.turns().is_empty());
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_byte_counter_tracks_stream() {
        let mut session = ChatSession::new(ScriptTransport::fragments(&["Hello", "!"]));
        session.send("Hi", |_| {}).await;
        assert_eq!(session.handle().bytes_received(), 6);
    }
}
