//! Server transport: one request primitive over HTTP.
//!
//! The server is a byte-in/byte-out courier. [`ServerTransport`] is the only
//! seam the device core touches, so tests swap the HTTP client for an
//! in-memory server. Implementations map HTTP status onto the error taxonomy
//! and hand back the raw response body; whether an empty body is acceptable
//! is the caller's decision.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rendezvous_core::{RendezvousError, Result};
use url::Url;

/// Header names used by the protocol.
pub mod headers {
    /// Base64 auth token (device or admin).
    pub const AUTH: &str = "auth";
    /// User name (admin allow, registration).
    pub const USERNAME: &str = "username";
    /// Registration pin.
    pub const PIN: &str = "pin";
    /// Requested item count.
    pub const COUNT: &str = "count";
    /// Base64 user signing public key.
    pub const USER: &str = "user";
    /// Base64 device signing public key.
    pub const DEVICE: &str = "device";
    /// Base64 signing public key of a topic-key receiver.
    pub const RECEIVER: &str = "receiver";
    /// Application identifier (at most 10 bytes).
    pub const APP: &str = "app";
}

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET, no body.
    Get,
    /// POST with a binary body.
    Post,
}

/// One framed server request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Method.
    pub method: Method,
    /// Path relative to the server base URL.
    pub path: String,
    /// Header bag.
    pub headers: Vec<(&'static str, String)>,
    /// Binary body (empty for GET).
    pub body: Vec<u8>,
}

impl Request {
    /// Build a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::Get, path: path.into(), headers: Vec::new(), body: Vec::new() }
    }

    /// Build a POST request with a binary body.
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self { method: Method::Post, path: path.into(), headers: Vec::new(), body }
    }

    /// Append one header.
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Append a batch of headers.
    pub fn headers(mut self, headers: Vec<(&'static str, String)>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// The single request primitive the device core is written against.
#[allow(async_fn_in_trait)]
pub trait ServerTransport {
    /// Issue one request and return the response body.
    ///
    /// # Errors
    ///
    /// - `NoResponse` on transport failure or cancellation
    /// - The taxonomy kind matching a non-200 status
    async fn request(&self, request: Request) -> Result<Vec<u8>>;
}

/// Encode key or token bytes for a header value.
pub fn encode_header(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 header value.
pub fn decode_header(value: &str) -> Option<Vec<u8>> {
    STANDARD.decode(value).ok()
}

/// Encode id bytes for a URL path segment.
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a URL path segment produced by [`encode_segment`].
pub fn decode_segment(value: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(value).ok()
}

/// [`ServerTransport`] over HTTPS using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the server at `base`.
    pub fn new(base: Url) -> Self {
        Self { base, client: reqwest::Client::new() }
    }

    /// The server base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl ServerTransport for HttpTransport {
    async fn request(&self, request: Request) -> Result<Vec<u8>> {
        let url = self
            .base
            .join(&request.path)
            .map_err(|e| RendezvousError::InvalidRequest { reason: format!("bad path: {e}") })?;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url).body(request.body),
        };
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        tracing::debug!(path = %request.path, "server request");

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(path = %request.path, error = %e, "transport failure");
            RendezvousError::NoResponse
        })?;

        let status = response.status().as_u16();
        if status != 200 {
            tracing::debug!(path = %request.path, status, "server rejected request");
            return Err(RendezvousError::from_status(status));
        }

        let body = response.bytes().await.map_err(|_| RendezvousError::NoResponse)?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders_accumulate_headers() {
        let request = Request::get("ping")
            .header(headers::COUNT, "5")
            .headers(vec![(headers::APP, "rdv".to_string())]);

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.headers.len(), 2);
        assert!(request.body.is_empty());
    }

    #[test]
    fn segment_encoding_roundtrips() {
        let id = [0xFBu8; 12];
        let encoded = encode_segment(&id);
        assert!(!encoded.contains('='));
        assert_eq!(decode_segment(&encoded).unwrap(), id);
    }

    #[test]
    fn header_encoding_roundtrips() {
        let token = [0x01u8; 16];
        assert_eq!(decode_header(&encode_header(&token)).unwrap(), token);
    }
}
