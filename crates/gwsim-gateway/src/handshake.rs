//! HTTP upgrade handshake
//!
//! Parses the client's upgrade request, derives `Sec-WebSocket-Accept` and
//! renders the server's response.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest request head accepted before the blank line
pub const MAX_REQUEST_SIZE: usize = 8 * 1024;

/// Response sent to requests that are not WebSocket upgrades
pub const BAD_REQUEST: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// Handshake errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("request head exceeds {MAX_REQUEST_SIZE} bytes")]
    HeaderTooLarge,

    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error("not a WebSocket upgrade request")]
    NotUpgrade,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

/// A parsed upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub path: String,
    query: Vec<(String, String)>,
    pub key: String,
}

impl HandshakeRequest {
    /// Parse the request head (everything before the blank line)
    pub fn parse(head: &[u8]) -> Result<Self, HandshakeError> {
        let head = std::str::from_utf8(head).map_err(|_| HandshakeError::Malformed("not UTF-8"))?;
        let mut lines = head.split("\r\n");

        let request_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or(HandshakeError::Malformed("empty request"))?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next().ok_or(HandshakeError::Malformed("no method"))?;
        let target = parts.next().ok_or(HandshakeError::Malformed("no target"))?;
        if !parts.next().is_some_and(|v| v.starts_with("HTTP/1.")) {
            return Err(HandshakeError::Malformed("not HTTP/1.x"));
        }
        if method != "GET" {
            return Err(HandshakeError::NotUpgrade);
        }

        let mut upgrade = false;
        let mut key = None;
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or(HandshakeError::Malformed("header without colon"))?;
            let value = value.trim();
            if name.trim().eq_ignore_ascii_case("upgrade") {
                upgrade = value.eq_ignore_ascii_case("websocket");
            } else if name.trim().eq_ignore_ascii_case("sec-websocket-key") {
                key = Some(value.to_string());
            }
        }

        if !upgrade {
            return Err(HandshakeError::NotUpgrade);
        }
        let key = key.filter(|k| !k.is_empty()).ok_or(HandshakeError::MissingKey)?;

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (k.to_string(), v.to_string())
            })
            .collect();

        Ok(Self {
            path: path.to_string(),
            query,
            key,
        })
    }

    /// First value of a query parameter
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `Sec-WebSocket-Accept` for this request's key
    #[must_use]
    pub fn accept_key(&self) -> String {
        accept_key(&self.key)
    }
}

/// Locate the end of the request head
///
/// Returns the length of the head including the terminating `\r\n\r\n`.
pub fn find_request_end(buf: &[u8]) -> Result<Option<usize>, HandshakeError> {
    match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) if pos + 4 <= MAX_REQUEST_SIZE => Ok(Some(pos + 4)),
        Some(_) => Err(HandshakeError::HeaderTooLarge),
        None if buf.len() >= MAX_REQUEST_SIZE => Err(HandshakeError::HeaderTooLarge),
        None => Ok(None),
    }
}

/// Derive `Sec-WebSocket-Accept` from a client key
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Render the 101 response
#[must_use]
pub fn switching_protocols(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = "GET /?v=10&encoding=etf HTTP/1.1\r\n\
        Host: gateway.local\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn test_accept_key_rfc_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_parse_upgrade_request() {
        let end = find_request_end(REQUEST.as_bytes()).unwrap().unwrap();
        assert_eq!(end, REQUEST.len());

        let request = HandshakeRequest::parse(&REQUEST.as_bytes()[..end]).unwrap();
        assert_eq!(request.path, "/");
        assert_eq!(request.query_param("v"), Some("10"));
        assert_eq!(request.query_param("encoding"), Some("etf"));
        assert_eq!(request.query_param("compress"), None);
        assert_eq!(request.accept_key(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let raw = "GET /gateway HTTP/1.1\r\nupgrade: WebSocket\r\nsec-websocket-key: abc\r\n\r\n";
        let request = HandshakeRequest::parse(raw.as_bytes()).unwrap();
        assert_eq!(request.key, "abc");
        assert_eq!(request.query_param("v"), None);
    }

    #[test]
    fn test_incomplete_request() {
        assert_eq!(find_request_end(b"GET / HTTP/1.1\r\nHost: x\r\n"), Ok(None));
    }

    #[test]
    fn test_oversized_request() {
        let raw = vec![b'a'; MAX_REQUEST_SIZE];
        assert_eq!(find_request_end(&raw), Err(HandshakeError::HeaderTooLarge));
    }

    #[test]
    fn test_plain_http_is_not_upgrade() {
        let raw = "GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(
            HandshakeRequest::parse(raw.as_bytes()),
            Err(HandshakeError::NotUpgrade)
        );

        let raw = "POST / HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Key: a\r\n\r\n";
        assert_eq!(
            HandshakeRequest::parse(raw.as_bytes()),
            Err(HandshakeError::NotUpgrade)
        );
    }

    #[test]
    fn test_missing_key() {
        let raw = "GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n";
        assert_eq!(
            HandshakeRequest::parse(raw.as_bytes()),
            Err(HandshakeError::MissingKey)
        );
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(
            HandshakeRequest::parse(b"\x16\x03\x01\x00"),
            Err(HandshakeError::Malformed(_))
        ));
    }

    #[test]
    fn test_switching_protocols_response() {
        let response = switching_protocols("abc=");
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: abc=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
