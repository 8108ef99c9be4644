//! JSON-RPC 2.0 message construction and Content-Length framing
//!
//! Implements the LSP wire format: `Content-Length: <n>\r\n\r\n<body>` where
//! `<n>` is the exact byte length of the UTF-8 encoded body. Encoding uses
//! compact serialization so the declared length is computed once from the
//! final body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::probe::error::ProbeError;

/// JSON-RPC protocol version sent with every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Maximum frame size accepted by the decoder to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

// ============================================================================
// Message Types
// ============================================================================

/// JSON-RPC 2.0 request message (expects a reply)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier
    pub id: Value,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 notification message (no reply expected, no id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

// ============================================================================
// Frame Encoding
// ============================================================================

/// Encode a request as a complete wire frame
pub fn encode_request(method: &str, params: Option<Value>, id: u64) -> Result<Vec<u8>, ProbeError> {
    let request = JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Value::Number(serde_json::Number::from(id)),
        method: method.to_string(),
        params,
    };

    let body = serde_json::to_string(&request)?;
    Ok(frame(&body))
}

/// Encode a notification as a complete wire frame
pub fn encode_notification(method: &str, params: Option<Value>) -> Result<Vec<u8>, ProbeError> {
    let notification = JsonRpcNotification {
        jsonrpc: JSONRPC_VERSION.to_string(),
        method: method.to_string(),
        params,
    };

    let body = serde_json::to_string(&notification)?;
    Ok(frame(&body))
}

/// Prepend the Content-Length header to a serialized body
fn frame(body: &str) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

// ============================================================================
// Frame Decoding
// ============================================================================

/// Incremental decoder for Content-Length framed message streams
///
/// Accumulates raw bytes from the server's stdout and yields complete message
/// bodies as they become available. Partial frames stay buffered until the
/// remaining bytes arrive.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes received from the stream
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Try to extract the next complete message body
    ///
    /// Returns `Ok(None)` if more data is needed.
    pub fn next_frame(&mut self) -> Result<Option<String>, ProbeError> {
        let Some(header_end) = find_subsequence(&self.buffer, b"\r\n\r\n") else {
            return Ok(None);
        };

        let header = String::from_utf8_lossy(&self.buffer[..header_end]).into_owned();
        let content_length = parse_content_length(&header)?;
        let content_start = header_end + 4;

        if self.buffer.len() - content_start < content_length {
            return Ok(None);
        }

        let body_bytes = self.buffer[content_start..content_start + content_length].to_vec();
        self.buffer.drain(..content_start + content_length);

        let body = String::from_utf8(body_bytes)
            .map_err(|e| ProbeError::InvalidFrame(format!("body is not valid UTF-8: {e}")))?;
        Ok(Some(body))
    }
}

/// Parse the Content-Length value out of a frame header block
fn parse_content_length(header: &str) -> Result<usize, ProbeError> {
    for line in header.lines() {
        if let Some(length_str) = line.strip_prefix("Content-Length:") {
            let length_str = length_str.trim();
            let length = length_str
                .parse::<usize>()
                .map_err(|_| ProbeError::InvalidContentLength(length_str.to_string()))?;

            if length > MAX_FRAME_SIZE {
                return Err(ProbeError::MessageTooLarge {
                    size: length,
                    max: MAX_FRAME_SIZE,
                });
            }

            return Ok(length);
        }
    }

    Err(ProbeError::MissingContentLength)
}

/// Find the first occurrence of `needle` in `haystack`
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(bytes: &[u8]) -> Vec<String> {
        let mut decoder = FrameDecoder::new();
        decoder.push(bytes);
        let mut bodies = Vec::new();
        while let Some(body) = decoder.next_frame().unwrap() {
            bodies.push(body);
        }
        bodies
    }

    #[test]
    fn test_request_round_trip() {
        let params = json!({"rootUri": "file:///workspace", "capabilities": {}});
        let frame = encode_request("initialize", Some(params.clone()), 1).unwrap();

        let bodies = decode_all(&frame);
        assert_eq!(bodies.len(), 1);

        let decoded: JsonRpcRequest = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(decoded.jsonrpc, JSONRPC_VERSION);
        assert_eq!(decoded.method, "initialize");
        assert_eq!(decoded.id, json!(1));
        assert_eq!(decoded.params, Some(params));
    }

    #[test]
    fn test_content_length_counts_bytes_not_chars() {
        // Multi-byte text: byte length must exceed char count
        let params = json!({"text": "日本語のソースコード"});
        let frame = encode_request("textDocument/didOpen", Some(params), 7).unwrap();
        let frame_str = String::from_utf8(frame.clone()).unwrap();

        let header_end = frame_str.find("\r\n\r\n").unwrap();
        let declared: usize = frame_str[..header_end]
            .strip_prefix("Content-Length: ")
            .unwrap()
            .parse()
            .unwrap();

        let body = &frame_str[header_end + 4..];
        assert_eq!(declared, body.len());
        assert!(body.len() > body.chars().count());

        // Decoder must consume exactly the declared byte count
        let bodies = decode_all(&frame);
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0], body);
    }

    #[test]
    fn test_notification_omits_id() {
        let frame = encode_notification("initialized", Some(json!({}))).unwrap();
        let bodies = decode_all(&frame);

        let value: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["method"], "initialized");
    }

    #[test]
    fn test_decoder_handles_split_frame() {
        let frame = encode_request("initialize", Some(json!({"a": 1})), 1).unwrap();
        let (first, rest) = frame.split_at(frame.len() / 2);

        let mut decoder = FrameDecoder::new();
        decoder.push(first);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.push(rest);
        let body = decoder.next_frame().unwrap().unwrap();
        let decoded: JsonRpcRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(decoded.method, "initialize");
    }

    #[test]
    fn test_decoder_handles_back_to_back_frames() {
        let mut stream = encode_request("initialize", None, 1).unwrap();
        stream.extend(encode_notification("initialized", None).unwrap());

        let bodies = decode_all(&stream);
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].contains("initialize"));
        assert!(bodies[1].contains("initialized"));
    }

    #[test]
    fn test_decoder_rejects_invalid_content_length() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Content-Length: banana\r\n\r\n{}");

        match decoder.next_frame() {
            Err(ProbeError::InvalidContentLength(s)) => assert_eq!(s, "banana"),
            other => panic!("expected InvalidContentLength, got: {other:?}"),
        }
    }

    #[test]
    fn test_decoder_rejects_missing_content_length() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"X-Other-Header: 12\r\n\r\n{}");

        assert!(matches!(
            decoder.next_frame(),
            Err(ProbeError::MissingContentLength)
        ));
    }

    #[test]
    fn test_decoder_rejects_oversized_frame() {
        let declared = MAX_FRAME_SIZE + 1;
        let mut decoder = FrameDecoder::new();
        decoder.push(format!("Content-Length: {declared}\r\n\r\n").as_bytes());

        match decoder.next_frame() {
            Err(ProbeError::MessageTooLarge { size, max }) => {
                assert_eq!(size, declared);
                assert_eq!(max, MAX_FRAME_SIZE);
            }
            other => panic!("expected FrameTooLarge, got: {other:?}"),
        }
    }
}
