//! Sentinel-line framing for the JPServe wire protocol.
//!
//! # Wire Format
//!
//! ```text
//! #!{\r\n
//! <payload line 1>\r\n
//! <payload line 2>\r\n
//! #!}\r\n
//! ```
//!
//! Requests carry the script verbatim. Responses carry a JSON result
//! document, possibly pretty-printed across several lines; the lines are
//! joined without a separator before decoding.
//!
//! A script containing a line that is exactly `#!}` terminates the frame
//! early on the server side. The marker scheme has no escape mechanism, so
//! callers must avoid such lines.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ClientError;
use crate::result::ScriptResult;

pub const MARK_BEGIN: &str = "#!{";
pub const MARK_END: &str = "#!}";
pub const CMD_EXIT: &str = "#!exit";
pub const LINE_BREAK: &str = "\r\n";

/// Maximum accumulated response payload (100MB) to prevent OOM from a
/// misbehaving server.
pub const MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024;

/// Wrap a script in begin/end marker lines.
pub fn encode_request(script: &str) -> String {
    let mut frame =
        String::with_capacity(MARK_BEGIN.len() + script.len() + MARK_END.len() + 3 * LINE_BREAK.len());
    frame.push_str(MARK_BEGIN);
    frame.push_str(LINE_BREAK);
    frame.push_str(script);
    frame.push_str(LINE_BREAK);
    frame.push_str(MARK_END);
    frame.push_str(LINE_BREAK);
    frame
}

/// Build a response frame the way the server does.
pub fn encode_response(result: &ScriptResult) -> Result<String, ClientError> {
    let body = serde_json::to_string_pretty(result)?;
    Ok(encode_request(&body))
}

/// Decode a response payload into a [`ScriptResult`].
pub fn decode_response(payload: &str) -> Result<ScriptResult, ClientError> {
    Ok(serde_json::from_str(payload)?)
}

/// Strip one trailing line terminator (`\n`, `\r\n` or `\r`).
fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .or_else(|| line.strip_suffix('\r'))
        .unwrap_or(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Discarding lines until the begin marker.
    Seeking,
    /// Accumulating payload lines until the end marker.
    Collecting,
}

/// Line-fed parser for one response frame.
///
/// Lines before the begin marker are dropped. Payload lines are joined with
/// no separator.
#[derive(Debug)]
pub struct FrameParser {
    state: ParseState,
    payload: String,
    limit: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_limit(MAX_RESPONSE_SIZE)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: ParseState::Seeking,
            payload: String::new(),
            limit,
        }
    }

    /// Whether the begin marker has been seen.
    pub fn in_frame(&self) -> bool {
        self.state == ParseState::Collecting
    }

    /// Payload bytes still accepted before the limit is hit.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.payload.len())
    }

    /// Feed one line (with or without its terminator).
    ///
    /// Returns the payload once the end marker is pushed, after which the
    /// parser is ready for the next frame.
    pub fn push_line(&mut self, line: &str) -> Result<Option<String>, ClientError> {
        let line = strip_line_ending(line);

        match self.state {
            ParseState::Seeking => {
                if line == MARK_BEGIN {
                    self.state = ParseState::Collecting;
                } else {
                    tracing::trace!("Skipping line outside frame: {:?}", line);
                }
                Ok(None)
            }
            ParseState::Collecting => {
                if line == MARK_END {
                    self.state = ParseState::Seeking;
                    return Ok(Some(std::mem::take(&mut self.payload)));
                }

                if self.payload.len() + line.len() > self.limit {
                    return Err(ClientError::ResponseTooLarge { limit: self.limit });
                }
                self.payload.push_str(line);
                Ok(None)
            }
        }
    }
}

/// Read one response frame and return its joined payload.
///
/// # Errors
///
/// - `ConnectionClosed` if the stream ends before the end marker
/// - `ResponseTooLarge` if the payload exceeds `MAX_RESPONSE_SIZE`
/// - `Io` on read failure or non-UTF-8 input
pub async fn read_frame<R>(reader: &mut R) -> Result<String, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    read_frame_with_limit(reader, MAX_RESPONSE_SIZE).await
}

/// [`read_frame`] with a custom payload cap.
///
/// Each line read is capped by the remaining budget, so a peer that never
/// sends a line terminator is cut off after `limit` bytes too.
pub async fn read_frame_with_limit<R>(reader: &mut R, limit: usize) -> Result<String, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    let mut parser = FrameParser::with_limit(limit);
    let mut line = Vec::new();

    loop {
        line.clear();
        // Longest acceptable line: the rest of the payload or a marker, plus terminator
        let budget = parser.remaining().max(MARK_BEGIN.len()) + LINE_BREAK.len();
        let bytes_read = (&mut *reader)
            .take(budget as u64 + 1)
            .read_until(b'\n', &mut line)
            .await
            .map_err(ClientError::Io)?;

        // EOF - connection closed
        if bytes_read == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        if bytes_read > budget {
            return Err(ClientError::ResponseTooLarge { limit });
        }

        let text = std::str::from_utf8(&line)
            .map_err(|e| ClientError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        if let Some(payload) = parser.push_line(text)? {
            return Ok(payload);
        }
    }
}

/// Write a request frame for `script` and flush.
pub async fn write_frame<W>(writer: &mut W, script: &str) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_request(script);
    writer
        .write_all(frame.as_bytes())
        .await
        .map_err(ClientError::Io)?;
    writer.flush().await.map_err(ClientError::Io)?;
    Ok(())
}

/// Write the exit notice and flush.
pub async fn write_exit<W>(writer: &mut W) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{CMD_EXIT}{LINE_BREAK}").as_bytes())
        .await
        .map_err(ClientError::Io)?;
    writer.flush().await.map_err(ClientError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::{duplex, BufReader};
    use tokio::time::timeout;

    /// Test timeout to prevent hanging tests.
    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_encode_request() {
        assert_eq!(
            encode_request("a = 2\nb = 3\n_result_ = a * b"),
            "#!{\r\na = 2\nb = 3\n_result_ = a * b\r\n#!}\r\n"
        );
    }

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending("#!{\r\n"), "#!{");
        assert_eq!(strip_line_ending("#!{\n"), "#!{");
        assert_eq!(strip_line_ending("#!{\r"), "#!{");
        assert_eq!(strip_line_ending("#!{"), "#!{");
        assert_eq!(strip_line_ending("a\r\n\r\n"), "a\r\n");
    }

    #[test]
    fn test_parser_skips_garbage_before_begin() {
        let mut parser = FrameParser::new();
        assert_eq!(parser.push_line("noise\r\n").unwrap(), None);
        assert_eq!(parser.push_line("#!}\r\n").unwrap(), None);
        assert!(!parser.in_frame());
        assert_eq!(parser.push_line("#!{\r\n").unwrap(), None);
        assert!(parser.in_frame());
        assert_eq!(parser.push_line("{\"success\":\r\n").unwrap(), None);
        assert_eq!(parser.push_line("    true}\r\n").unwrap(), None);
        assert_eq!(
            parser.push_line("#!}\r\n").unwrap(),
            Some("{\"success\":    true}".to_string())
        );
        assert!(!parser.in_frame());
    }

    #[test]
    fn test_marker_must_match_whole_line() {
        let mut parser = FrameParser::new();
        parser.push_line(" #!{\r\n").unwrap();
        assert!(!parser.in_frame());
        parser.push_line("#!{\r\n").unwrap();
        assert_eq!(parser.push_line("#!} \r\n").unwrap(), None);
        assert_eq!(parser.push_line("#!}").unwrap(), Some("#!} ".to_string()));
    }

    #[test]
    fn test_parser_rejects_oversized_payload() {
        let mut parser = FrameParser::with_limit(8);
        parser.push_line("#!{").unwrap();
        parser.push_line("12345").unwrap();
        let err = parser.push_line("67890").unwrap_err();
        assert!(matches!(err, ClientError::ResponseTooLarge { limit: 8 }));
    }

    #[test]
    fn test_response_frame_roundtrip() {
        for original in [
            ScriptResult::success("Hello World!"),
            ScriptResult::success(r#"[2, {"a": 2, "b": 3}, 3]"#),
            ScriptResult::failure("Execute script failed: name 'x' is not defined"),
        ] {
            let frame = encode_response(&original).unwrap();
            let mut parser = FrameParser::new();
            let mut payload = None;
            for line in frame.split_inclusive('\n') {
                if let Some(p) = parser.push_line(line).unwrap() {
                    payload = Some(p);
                }
            }
            let decoded = decode_response(&payload.expect("frame should complete")).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_decode_malformed_payload() {
        let err = decode_response("this is not json").unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
        assert!(err.to_string().starts_with("Failed to decode response"));
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (mut client, server) = duplex(4096);
        let script = "a = 2\n_result_ = a";

        write_frame(&mut client, script).await.expect("Write failed");
        drop(client);

        let mut reader = BufReader::new(server);
        let received = timeout(TEST_TIMEOUT, read_frame(&mut reader))
            .await
            .expect("Test timed out")
            .expect("Read failed");

        // Payload lines are joined without separators
        assert_eq!(received, "a = 2_result_ = a");
    }

    #[tokio::test]
    async fn test_read_handles_lf_only() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(b"#!{\n{\"success\": true}\n#!}\n")
            .await
            .expect("Write failed");

        let mut reader = BufReader::new(server);
        let received = timeout(TEST_TIMEOUT, read_frame(&mut reader))
            .await
            .expect("Test timed out")
            .expect("Read failed");

        assert_eq!(received, "{\"success\": true}");
    }

    #[tokio::test]
    async fn test_connection_closed_mid_response() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(b"#!{\r\n{\"success\": tr")
            .await
            .expect("Write failed");
        drop(client);

        let mut reader = BufReader::new(server);
        let result = timeout(TEST_TIMEOUT, read_frame(&mut reader))
            .await
            .expect("Test timed out");

        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_unterminated_payload_line_is_cut_off() {
        // Peer opens a frame and then streams bytes without ever ending the line
        let (mut client, server) = duplex(4096);
        tokio::spawn(async move {
            if client.write_all(b"#!{\r\n").await.is_err() {
                return;
            }
            let chunk = [b'x'; 1024];
            while client.write_all(&chunk).await.is_ok() {}
        });

        let mut reader = BufReader::new(server);
        let result = timeout(TEST_TIMEOUT, read_frame_with_limit(&mut reader, 8 * 1024))
            .await
            .expect("Test timed out");

        assert!(matches!(
            result,
            Err(ClientError::ResponseTooLarge { limit: 8192 })
        ));
    }

    #[tokio::test]
    async fn test_unterminated_line_before_frame_is_cut_off() {
        let (mut client, server) = duplex(4096);
        tokio::spawn(async move {
            let chunk = [b'-'; 1024];
            while client.write_all(&chunk).await.is_ok() {}
        });

        let mut reader = BufReader::new(server);
        let result = timeout(TEST_TIMEOUT, read_frame_with_limit(&mut reader, 4 * 1024))
            .await
            .expect("Test timed out");

        assert!(matches!(
            result,
            Err(ClientError::ResponseTooLarge { limit: 4096 })
        ));
    }

    #[tokio::test]
    async fn test_payload_at_limit_is_accepted() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(b"#!{\r\n12345678\r\n#!}\r\n")
            .await
            .expect("Write failed");

        let mut reader = BufReader::new(server);
        let received = timeout(TEST_TIMEOUT, read_frame_with_limit(&mut reader, 8))
            .await
            .expect("Test timed out")
            .expect("Read failed");
        assert_eq!(received, "12345678");
    }

    #[tokio::test]
    async fn test_connection_closed_before_frame() {
        let (client, server) = duplex(64);
        drop(client);

        let mut reader = BufReader::new(server);
        let result = timeout(TEST_TIMEOUT, read_frame(&mut reader))
            .await
            .expect("Test timed out");

        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_write_exit() {
        let (mut client, mut server) = duplex(64);
        write_exit(&mut client).await.expect("Write failed");
        drop(client);

        let mut received = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut received)
            .await
            .expect("Read failed");
        assert_eq!(received, "#!exit\r\n");
    }
}
