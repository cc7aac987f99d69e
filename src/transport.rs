//! Framed-message codec.
//!
//! One message is `Content-Length: <N>\r\n`, a blank separator line, then
//! exactly `N` bytes of single-line JSON body. One trait-free struct over
//! generic `Read`/`Write`, indifferent to payload shape - the body is our
//! own `JsonValue` rather than `serde_json::Value`, and reads are generic
//! instead of duplicated per transport kind.

use std::io::{BufRead, Write};

use crate::error::AdapterError;
use crate::json::{self, JsonValue};

/// Reads and writes DAP frames over a generic buffered reader / writer.
pub struct FramedTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> FramedTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        FramedTransport { reader, writer }
    }

    /// Reads one message, or `Ok(None)` on a clean end-of-stream before any
    /// header bytes were read (a DAP client disconnecting between
    /// messages, not mid-frame).
    pub fn read_message(&mut self) -> Result<Option<JsonValue>, AdapterError> {
        let mut content_length: Option<usize> = None;
        let mut saw_any_line = false;
        loop {
            let mut line = String::new();
            let read_n = self.reader.read_line(&mut line)?;
            if read_n == 0 {
                if saw_any_line {
                    return Err(AdapterError::PeerClosed);
                }
                return Ok(None);
            }
            saw_any_line = true;

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if let Some(value) = trimmed.strip_prefix("Content-Length:") {
                let value = value.trim();
                let len = value.parse::<usize>().map_err(|_| {
                    AdapterError::Protocol(format!("invalid Content-Length: '{value}'"))
                })?;
                content_length = Some(len);
            }
            // Unrecognized headers are ignored, per DAP's base protocol.
        }

        let len = content_length
            .ok_or_else(|| AdapterError::Protocol("missing Content-Length header".into()))?;

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                AdapterError::PeerClosed
            } else {
                AdapterError::Io(e)
            }
        })?;

        let body = std::str::from_utf8(&buf)
            .map_err(|_| AdapterError::Protocol("body is not valid utf-8".into()))?;
        let value = json::decode(body)?;
        Ok(Some(value))
    }

    /// Writes one message. The body must contain no raw newline
    /// characters - `json::encode` always produces a single line, so this
    /// only fails if the underlying write fails.
    pub fn write_message(&mut self, value: &JsonValue) -> Result<(), AdapterError> {
        let body = json::encode(value);
        debug_assert!(
            !body.contains('\n'),
            "encoded body must not contain raw newlines"
        );
        write!(self.writer, "Content-Length: {}\r\n\r\n", body.len())?;
        self.writer.write_all(body.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn frame(body: &str) -> String {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body)
    }

    #[test]
    fn reads_single_message() {
        let input = frame(r#"{"seq":1,"type":"request","command":"initialize"}"#);
        let mut out = Vec::new();
        let mut transport = FramedTransport::new(BufReader::new(input.as_bytes()), &mut out);
        let msg = transport.read_message().unwrap().unwrap();
        assert_eq!(msg.get("command").unwrap().as_str(), Some("initialize"));
    }

    #[test]
    fn reads_sequential_messages() {
        let input = format!(
            "{}{}",
            frame(r#"{"seq":1}"#),
            frame(r#"{"seq":2}"#)
        );
        let mut out = Vec::new();
        let mut transport = FramedTransport::new(BufReader::new(input.as_bytes()), &mut out);
        assert_eq!(
            transport.read_message().unwrap().unwrap().get("seq").unwrap().as_i64(),
            Some(1)
        );
        assert_eq!(
            transport.read_message().unwrap().unwrap().get("seq").unwrap().as_i64(),
            Some(2)
        );
    }

    #[test]
    fn clean_eof_between_messages_is_none() {
        let mut out = Vec::new();
        let mut transport = FramedTransport::new(BufReader::new(&b""[..]), &mut out);
        assert!(transport.read_message().unwrap().is_none());
    }

    #[test]
    fn eof_mid_frame_is_peer_closed() {
        let input = "Content-Length: 50\r\n\r\n{\"seq\":1"; // body too short
        let mut out = Vec::new();
        let mut transport = FramedTransport::new(BufReader::new(input.as_bytes()), &mut out);
        assert!(matches!(
            transport.read_message(),
            Err(AdapterError::PeerClosed)
        ));
    }

    #[test]
    fn missing_content_length_is_protocol_error() {
        let input = "Foo: bar\r\n\r\n";
        let mut out = Vec::new();
        let mut transport = FramedTransport::new(BufReader::new(input.as_bytes()), &mut out);
        assert!(matches!(
            transport.read_message(),
            Err(AdapterError::Protocol(_))
        ));
    }

    #[test]
    fn writes_well_formed_frame() {
        let mut out = Vec::new();
        let mut transport = FramedTransport::new(BufReader::new(&b""[..]), &mut out);
        let mut body = JsonValue::object();
        body.insert("seq", JsonValue::Number(1.0));
        transport.write_message(&body).unwrap();
        let written = String::from_utf8(out).unwrap();
        assert!(written.starts_with("Content-Length: "));
        assert!(written.ends_with(r#"{"seq":1}"#));
    }
}
