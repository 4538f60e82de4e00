//! Streaming query client.
//!
//! Issues one query request and incrementally decodes the chunked NDJSON
//! response body: each line is an independently-parseable JSON object, zero
//! or more `{step}` progress events followed by exactly one terminal
//! `{result}` or `{error}`. Chunk boundaries can fall anywhere, including
//! inside a multi-byte UTF-8 codepoint, so the decoder carries partial bytes
//! and the trailing partial line across chunks.

use crate::client::BackendClient;
use crate::error::{Error, Result};
use crate::models::{QueryResult, StreamEvent};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decodes a byte-chunk stream into complete text lines.
///
/// Keeps two buffers: undecoded trailing bytes of a split UTF-8 codepoint,
/// and the text of the current incomplete line.
#[derive(Debug, Default)]
struct LineDecoder {
    carry: Vec<u8>,
    line_buf: String,
}

impl LineDecoder {
    /// Feed one chunk, returning every line completed by it (without the
    /// trailing newline).
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);
        self.decode_carry();

        let mut lines = Vec::new();
        while let Some(pos) = self.line_buf.find('\n') {
            let rest = self.line_buf.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.line_buf, rest);
            line.truncate(line.len() - 1); // drop the newline
            lines.push(line);
        }
        lines
    }

    /// Move the maximal valid UTF-8 prefix of `carry` into `line_buf`.
    ///
    /// A truncated codepoint at the end stays in `carry` for the next chunk;
    /// invalid bytes in the middle become U+FFFD so one bad byte cannot wedge
    /// the stream.
    fn decode_carry(&mut self) {
        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(text) => {
                    self.line_buf.push_str(text);
                    self.carry.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // Safe: from_utf8 just validated this prefix
                    self.line_buf
                        .push_str(std::str::from_utf8(&self.carry[..valid]).unwrap_or(""));
                    match err.error_len() {
                        None => {
                            // Incomplete codepoint at the end; wait for more bytes
                            self.carry.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.line_buf.push('\u{FFFD}');
                            self.carry.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    /// The trailing incomplete line at end of stream, if any.
    fn finish(mut self) -> Option<String> {
        // Whatever is left in carry is a truncated codepoint; represent it
        // rather than dropping the line silently
        if !self.carry.is_empty() {
            self.line_buf.push('\u{FFFD}');
        }
        if self.line_buf.is_empty() {
            None
        } else {
            Some(self.line_buf)
        }
    }
}

/// Outcome of applying one stream line.
enum LineOutcome {
    /// Keep reading
    Continue,
    /// Terminal result recorded
    Terminal(QueryResult),
}

/// Parse and apply one complete line.
///
/// Unparseable lines are tolerated: upstream proxy buffering can split a
/// structurally valid line in ways the line framing does not catch. A skipped
/// line that already looks like a complete object (contains a closing brace)
/// is logged as a parse warning; anything else is dropped silently.
fn apply_line(
    line: &str,
    terminal: &Option<QueryResult>,
    on_step: &mut dyn FnMut(&str),
) -> Result<LineOutcome> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(LineOutcome::Continue);
    }

    match serde_json::from_str::<StreamEvent>(trimmed) {
        Ok(StreamEvent::Step { step }) => {
            if terminal.is_some() {
                warn!("Step event after terminal result ignored: {}", step);
            } else {
                on_step(&step);
            }
            Ok(LineOutcome::Continue)
        }
        Ok(StreamEvent::Result { result }) => {
            if terminal.is_some() {
                warn!("Duplicate result event ignored");
                Ok(LineOutcome::Continue)
            } else {
                Ok(LineOutcome::Terminal(result))
            }
        }
        Ok(StreamEvent::Error { error }) => {
            if terminal.is_some() {
                warn!("Error event after terminal result ignored: {}", error);
                Ok(LineOutcome::Continue)
            } else {
                Err(Error::StreamReported(error))
            }
        }
        Err(parse_err) => {
            if trimmed.contains('}') {
                warn!(
                    "Unparseable stream line ({}): {:.120}",
                    parse_err, trimmed
                );
            }
            Ok(LineOutcome::Continue)
        }
    }
}

/// Client for streaming queries against a collection.
#[derive(Clone)]
pub struct StreamingQueryClient {
    client: BackendClient,
}

impl StreamingQueryClient {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Run one query, invoking `on_step` for each intermediate progress line
    /// in arrival order, and resolving with the terminal result.
    ///
    /// Fails with `StreamReported` on an explicit error event and with
    /// `StreamIncomplete` if the stream ends without a terminal event.
    pub async fn query(
        &self,
        collection_id: &str,
        question: &str,
        on_step: impl FnMut(&str),
    ) -> Result<QueryResult> {
        self.query_with_cancel(collection_id, question, on_step, CancellationToken::new())
            .await
    }

    /// Same as [`query`](Self::query), but aborts (releasing the response
    /// stream) as soon as `cancel` is triggered.
    pub async fn query_with_cancel(
        &self,
        collection_id: &str,
        question: &str,
        mut on_step: impl FnMut(&str),
        cancel: CancellationToken,
    ) -> Result<QueryResult> {
        let response = self.client.send_query(collection_id, question).await?;
        debug!("Query stream open for collection {}", collection_id);

        // The stream (and with it the connection) is dropped on every exit
        // path out of this scope
        let mut stream = response.bytes_stream();
        let mut decoder = LineDecoder::default();
        let mut terminal: Option<QueryResult> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::StreamAborted);
            }

            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::StreamAborted),
                chunk = stream.next() => chunk,
            };

            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;

            for line in decoder.push(&chunk) {
                match apply_line(&line, &terminal, &mut on_step)? {
                    LineOutcome::Continue => {}
                    LineOutcome::Terminal(result) => terminal = Some(result),
                }
            }
        }

        // A final line without a trailing newline still counts
        if let Some(line) = decoder.finish() {
            match apply_line(&line, &terminal, &mut on_step)? {
                LineOutcome::Continue => {}
                LineOutcome::Terminal(result) => terminal = Some(result),
            }
        }

        terminal.ok_or(Error::StreamIncomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CitationKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYLOAD: &str =
        "{\"step\":\"a\"}\n{\"step\":\"b\"}\n{\"result\":{\"answerText\":\"x\",\"citations\":[]}}\n";

    fn run_decoder(parts: &[&[u8]]) -> (Vec<String>, Option<String>) {
        let mut decoder = LineDecoder::default();
        let mut lines = Vec::new();
        for part in parts {
            lines.extend(decoder.push(part));
        }
        (lines, decoder.finish())
    }

    #[test]
    fn test_decoder_whole_payload() {
        let (lines, rest) = run_decoder(&[PAYLOAD.as_bytes()]);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"{"step":"a"}"#);
        assert!(rest.is_none());
    }

    #[test]
    fn test_decoder_every_split_point() {
        let bytes = PAYLOAD.as_bytes();
        for split in 1..bytes.len() {
            let (lines, rest) = run_decoder(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(lines.len(), 3, "split at {}", split);
            assert_eq!(lines[0], r#"{"step":"a"}"#, "split at {}", split);
            assert_eq!(lines[1], r#"{"step":"b"}"#, "split at {}", split);
            assert!(rest.is_none(), "split at {}", split);
        }
    }

    #[test]
    fn test_decoder_split_inside_codepoint() {
        // "é" is two bytes; "✓" is three. Split at every byte boundary.
        let payload = "{\"step\":\"résumé ✓\"}\n".as_bytes();
        for split in 1..payload.len() {
            let (lines, rest) = run_decoder(&[&payload[..split], &payload[split..]]);
            assert_eq!(lines, vec!["{\"step\":\"résumé ✓\"}"], "split at {}", split);
            assert!(rest.is_none());
        }
    }

    #[test]
    fn test_decoder_byte_at_a_time() {
        let bytes = "{\"step\":\"déjà\"}\n{\"result\":{\"answerText\":\"ok\"}}\n".as_bytes();
        let mut decoder = LineDecoder::default();
        let mut lines = Vec::new();
        for byte in bytes {
            lines.extend(decoder.push(std::slice::from_ref(byte)));
        }
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"step\":\"déjà\"}");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_invalid_byte_replaced() {
        let (lines, _) = run_decoder(&[b"ab\xFFcd\n"]);
        assert_eq!(lines, vec!["ab\u{FFFD}cd"]);
    }

    #[test]
    fn test_decoder_trailing_line_without_newline() {
        let (lines, rest) = run_decoder(&[b"{\"step\":\"a\"}\n{\"result\""]);
        assert_eq!(lines.len(), 1);
        assert_eq!(rest.as_deref(), Some("{\"result\""));
    }

    #[test]
    fn test_apply_line_tolerates_junk() {
        let mut steps = Vec::new();
        let terminal = None;
        let outcome = apply_line("not json at all", &terminal, &mut |s| {
            steps.push(s.to_string())
        })
        .unwrap();
        assert!(matches!(outcome, LineOutcome::Continue));

        // Looks complete but unknown shape: warned, still not fatal
        let outcome = apply_line(r#"{"unknown":"shape"}"#, &terminal, &mut |_| {}).unwrap();
        assert!(matches!(outcome, LineOutcome::Continue));
        assert!(steps.is_empty());
    }

    #[test]
    fn test_apply_line_ignores_events_after_terminal() {
        let terminal = Some(QueryResult {
            answer_text: "x".to_string(),
            citations: vec![],
        });
        let mut called = false;
        let outcome = apply_line(r#"{"step":"late"}"#, &terminal, &mut |_| called = true).unwrap();
        assert!(matches!(outcome, LineOutcome::Continue));
        assert!(!called);

        let outcome =
            apply_line(r#"{"result":{"answerText":"y"}}"#, &terminal, &mut |_| {}).unwrap();
        assert!(matches!(outcome, LineOutcome::Continue));

        let outcome = apply_line(r#"{"error":"late failure"}"#, &terminal, &mut |_| {}).unwrap();
        assert!(matches!(outcome, LineOutcome::Continue));
    }

    async fn mock_query_stream(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/x-ndjson"),
            )
            .mount(&server)
            .await;
        server
    }

    fn streaming_client(base: &str) -> StreamingQueryClient {
        let client =
            BackendClient::new(base, Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        StreamingQueryClient::new(client)
    }

    #[tokio::test]
    async fn test_query_steps_then_result() {
        let server = mock_query_stream(PAYLOAD).await;

        let mut steps = Vec::new();
        let result = streaming_client(&server.uri())
            .query("col-1", "what changed?", |s| steps.push(s.to_string()))
            .await
            .unwrap();

        assert_eq!(steps, vec!["a", "b"]);
        assert_eq!(result.answer_text, "x");
        assert!(result.citations.is_empty());
    }

    #[tokio::test]
    async fn test_query_result_with_citations() {
        let body = concat!(
            "{\"step\":\"Searching 3 documents\"}\n",
            "{\"result\":{\"answerText\":\"Revenue grew.\",\"citations\":[",
            "{\"kind\":\"text\",\"sourceRef\":\"q3.pdf\",\"page\":2,",
            "\"relevanceScore\":0.81,\"excerpt\":\"revenue grew 12%\"}]}}\n",
        );
        let server = mock_query_stream(body).await;

        let result = streaming_client(&server.uri())
            .query("col-1", "how was revenue?", |_| {})
            .await
            .unwrap();
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].kind, CitationKind::Text);
        assert_eq!(result.citations[0].page, Some(2));
    }

    #[tokio::test]
    async fn test_query_stream_incomplete() {
        let server = mock_query_stream("{\"step\":\"a\"}\n").await;

        let err = streaming_client(&server.uri())
            .query("col-1", "q", |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamIncomplete));
    }

    #[tokio::test]
    async fn test_query_stream_reported_error() {
        let server =
            mock_query_stream("{\"step\":\"a\"}\n{\"error\":\"no documents indexed\"}\n").await;

        let err = streaming_client(&server.uri())
            .query("col-1", "q", |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamReported(ref msg) if msg == "no documents indexed"));
    }

    #[tokio::test]
    async fn test_query_error_after_result_keeps_result() {
        let body = "{\"result\":{\"answerText\":\"x\"}}\n{\"error\":\"late failure\"}\n";
        let server = mock_query_stream(body).await;

        let result = streaming_client(&server.uri())
            .query("col-1", "q", |_| {})
            .await
            .unwrap();
        assert_eq!(result.answer_text, "x");
    }

    #[tokio::test]
    async fn test_query_terminal_without_trailing_newline() {
        let server = mock_query_stream("{\"result\":{\"answerText\":\"x\"}}").await;

        let result = streaming_client(&server.uri())
            .query("col-1", "q", |_| {})
            .await
            .unwrap();
        assert_eq!(result.answer_text, "x");
    }

    #[tokio::test]
    async fn test_query_cancelled_before_read() {
        let server = mock_query_stream(PAYLOAD).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = streaming_client(&server.uri())
            .query_with_cancel("col-1", "q", |_| {}, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamAborted));
    }

    #[tokio::test]
    async fn test_query_junk_lines_skipped() {
        let body = "garbage\n{\"step\":\"a\"}\n{\"half\":}\n{\"result\":{\"answerText\":\"x\"}}\n";
        let server = mock_query_stream(body).await;

        let mut steps = Vec::new();
        let result = streaming_client(&server.uri())
            .query("col-1", "q", |s| steps.push(s.to_string()))
            .await
            .unwrap();
        assert_eq!(steps, vec!["a"]);
        assert_eq!(result.answer_text, "x");
    }
}
