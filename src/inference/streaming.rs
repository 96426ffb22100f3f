//! NDJSON streaming response parser for Ollama `/api/generate`.
//!
//! Reads a `reqwest::Response` as a byte stream, splits on newline boundaries,
//! and parses each non-empty line as a `GenerateChunk`. Lines are buffered as
//! raw bytes so a multi-byte character split across network chunks is decoded
//! intact.

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::GenerateChunk;

// ─── NDJSON line parser ──────────────────────────────────────────────────────

/// Parse a streaming HTTP body into `GenerateChunk`s.
pub fn parse_ndjson_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<GenerateChunk, InferenceError>> {
    decode_ndjson(response.bytes_stream())
}

/// Decode any byte-chunk stream as newline-delimited JSON.
///
/// The first error (transport or decode) is yielded and ends the stream. A
/// malformed line is never skipped: it is reported as `StreamError` so the
/// caller can abort the round.
pub fn decode_ndjson<S, B, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<GenerateChunk, InferenceError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let byte_stream = Box::pin(byte_stream);

    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        |(mut byte_stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                // Complete line already buffered?
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match decode_line(&line) {
                        Ok(Some(chunk)) => return Some((Ok(chunk), (byte_stream, buffer, false))),
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), (byte_stream, buffer, true))),
                    }
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        return Some((
                            Err(InferenceError::StreamError {
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, buffer, true),
                        ));
                    }
                    None => {
                        // Body ended without a trailing newline
                        let rest = std::mem::take(&mut buffer);
                        return match decode_line(&rest) {
                            Ok(Some(chunk)) => Some((Ok(chunk), (byte_stream, buffer, true))),
                            Ok(None) => None,
                            Err(e) => Some((Err(e), (byte_stream, buffer, true))),
                        };
                    }
                }
            }
        },
    )
}

/// Decode a single NDJSON line. Blank lines yield `None`.
///
/// Invalid UTF-8 and `{"error": ...}` lines are stream errors.
fn decode_line(line: &[u8]) -> Result<Option<GenerateChunk>, InferenceError> {
    let text = std::str::from_utf8(line).map_err(|e| InferenceError::StreamError {
        reason: format!("stream line is not valid UTF-8: {e}"),
    })?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let chunk = serde_json::from_str::<GenerateChunk>(trimmed).map_err(|e| {
        InferenceError::StreamError {
            reason: format!("failed to parse stream line: {e} (line: {trimmed})"),
        }
    })?;
    match chunk.error {
        Some(reason) => Err(InferenceError::StreamError {
            reason: format!("endpoint reported an error mid-stream: {reason}"),
        }),
        None => Ok(Some(chunk)),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Parse a non-streaming `/api/generate` body.
pub fn parse_non_streaming_response(body: &str) -> Result<GenerateChunk, InferenceError> {
    let chunk: GenerateChunk =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse generate response: {e}"),
        })?;
    match chunk.error {
        Some(reason) => Err(InferenceError::MalformedResponse {
            reason: format!("endpoint reported an error: {reason}"),
        }),
        None => Ok(chunk),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    async fn collect(parts: Vec<&'static [u8]>) -> Vec<Result<GenerateChunk, InferenceError>> {
        let byte_stream = stream::iter(parts.into_iter().map(Ok::<_, Infallible>));
        decode_ndjson(byte_stream).collect().await
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let results = collect(vec![
            &b"{\"response\":\"Hel"[..],
            &b"lo\",\"done\":false}\n{\"respo"[..],
            &b"nse\":\" world\",\"done\":true}\n"[..],
        ])
        .await;

        let chunks: Vec<GenerateChunk> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].response, "Hello");
        assert!(!chunks[0].done);
        assert_eq!(chunks[1].response, " world");
        assert!(chunks[1].done);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        // "你" is E4 BD A0 in UTF-8
        let results = collect(vec![
            &b"{\"response\":\"\xE4\xBD"[..],
            &b"\xA0\",\"done\":false}\n"[..],
        ])
        .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().response, "你");
    }

    #[tokio::test]
    async fn test_blank_lines_skipped_and_trailing_line_without_newline() {
        let results = collect(vec![
            &b"\n\n{\"response\":\"a\",\"done\":false}\n\n"[..],
            &b"{\"response\":\"b\",\"done\":true}"[..],
        ])
        .await;
        let texts: Vec<String> = results.into_iter().map(|r| r.unwrap().response).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_malformed_line_is_terminal_error() {
        let results = collect(vec![
            &b"{\"response\":\"ok\",\"done\":false}\n"[..],
            &b"not json\n"[..],
            &b"{\"response\":\"never\",\"done\":true}\n"[..],
        ])
        .await;
        assert_eq!(results.len(), 2, "stream must end after the decode error");
        assert!(results[0].is_ok());
        match &results[1] {
            Err(InferenceError::StreamError { reason }) => assert!(reason.contains("not json")),
            other => panic!("expected StreamError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_terminal_error() {
        let results = collect(vec![
            &b"{\"response\":\"ok\xFF\xFE\",\"done\":false}\n"[..],
            &b"{\"response\":\"never\",\"done\":true}\n"[..],
        ])
        .await;
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(InferenceError::StreamError { reason }) => assert!(reason.contains("UTF-8")),
            other => panic!("expected StreamError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_line_is_terminal_error() {
        let results = collect(vec![
            &b"{\"response\":\"ok\",\"done\":false}\n"[..],
            &b"{\"error\":\"model runner crashed\"}\n"[..],
            &b"{\"response\":\"never\",\"done\":true}\n"[..],
        ])
        .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(InferenceError::StreamError { reason }) if reason.contains("model runner crashed")
        ));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<Result<&'static [u8], String>> = vec![
            Ok(&b"{\"response\":\"x\",\"done\":false}\n"[..]),
            Err("connection reset".to_string()),
            Ok(&b"{\"response\":\"y\",\"done\":false}\n"[..]),
        ];
        let results: Vec<_> = decode_ndjson(stream::iter(parts)).collect().await;
        assert_eq!(results.len(), 2);
        assert!(matches!(
            &results[1],
            Err(InferenceError::StreamError { reason }) if reason.contains("connection reset")
        ));
    }

    #[test]
    fn test_parse_non_streaming_response() {
        let chunk =
            parse_non_streaming_response(r#"{"model":"m","response":"  brief  ","done":true}"#)
                .unwrap();
        assert_eq!(chunk.response, "  brief  ");
        assert!(chunk.done);
    }

    #[test]
    fn test_parse_non_streaming_garbage() {
        let result = parse_non_streaming_response("<html>502</html>");
        assert!(matches!(result, Err(InferenceError::MalformedResponse { .. })));
    }

    #[test]
    fn test_parse_non_streaming_error_body() {
        let result = parse_non_streaming_response(r#"{"error":"model 'x' not found"}"#);
        assert!(matches!(
            result,
            Err(InferenceError::MalformedResponse { reason }) if reason.contains("not found")
        ));
    }
}
