//! Request and response types.

use std::fmt;
use std::time::SystemTime;

pub const AGE: &str = "Age";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const HOST: &str = "Host";
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Request methods the proxy routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Connect,
    Options,
    Unsupported,
}

impl Method {
    /// Recognised method tokens. New routable methods are added here.
    const KNOWN: [(&'static [u8], Method); 3] = [
        (b"GET", Method::Get),
        (b"CONNECT", Method::Connect),
        (b"OPTIONS", Method::Options),
    ];

    pub fn from_token(token: &[u8]) -> Self {
        Self::KNOWN
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, method)| *method)
            .unwrap_or(Method::Unsupported)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Headers in wire order. Duplicate names are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<Header>);

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// First value whose name matches exactly (case-sensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Request target exactly as sent (absolute URI for proxied GETs).
    pub target: String,
    pub version: String,
    /// Upstream host, from the `Host` header or the target when absent.
    pub host: String,
    pub port: u16,
    pub headers: HeaderList,
    /// Bytes that followed the head in the same buffer.
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// An HTTP response, either parsed from an upstream or built by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: String,
    pub status: u16,
    pub reason: String,
    /// Headers without `Age`, which is computed when serializing.
    pub headers: HeaderList,
    /// Body bytes kept for the cache. Empty when the body is only relayed.
    pub body: Vec<u8>,
    /// Body bytes received so far, kept or not.
    pub received: usize,
    /// Value of `Content-Length`, when the upstream sent one.
    pub declared_length: Option<usize>,
    /// When the response was received from upstream. Responses built by the
    /// proxy itself carry `None` and are serialized without an `Age` header.
    pub fetched_at: Option<SystemTime>,
}

impl Response {
    pub fn new(version: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            status,
            reason: reason.into(),
            headers: HeaderList::new(),
            body: Vec::new(),
            received: 0,
            declared_length: None,
            fetched_at: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Sets the body along with a matching `Content-Length` header.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.headers.push(CONTENT_LENGTH, body.len().to_string());
        self.declared_length = Some(body.len());
        self.received = body.len();
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Body bytes still expected, if the length is known.
    pub fn remaining(&self) -> Option<usize> {
        self.declared_length
            .map(|declared| declared.saturating_sub(self.received))
    }

    pub fn is_complete(&self) -> bool {
        self.declared_length == Some(self.received)
    }

    /// Accounts for body bytes without exceeding the declared length, keeping
    /// them when `retain` is set. Returns the number of bytes accepted; the
    /// rest of `chunk` is not part of this response.
    pub fn accept_body(&mut self, chunk: &[u8], retain: bool) -> usize {
        let accepted = self
            .remaining()
            .map_or(chunk.len(), |remaining| remaining.min(chunk.len()));
        if retain {
            self.body.extend_from_slice(&chunk[..accepted]);
        }
        self.received += accepted;
        accepted
    }

    /// Whole seconds since the response was fetched.
    pub fn age(&self, now: SystemTime) -> Option<u64> {
        self.fetched_at.map(|fetched| {
            now.duration_since(fetched)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn method_table_lookup() {
        assert_eq!(Method::from_token(b"GET"), Method::Get);
        assert_eq!(Method::from_token(b"CONNECT"), Method::Connect);
        assert_eq!(Method::from_token(b"OPTIONS"), Method::Options);
        assert_eq!(Method::from_token(b"POST"), Method::Unsupported);
        assert_eq!(Method::from_token(b"get"), Method::Unsupported);
    }

    #[test]
    fn header_lookup_is_case_sensitive() {
        let mut headers = HeaderList::new();
        headers.push("Content-Length", "10");
        headers.push("X-Dup", "first");
        headers.push("X-Dup", "second");
        assert_eq!(headers.get("Content-Length"), Some("10"));
        assert_eq!(headers.get("content-length"), None);
        assert_eq!(headers.get("X-Dup"), Some("first"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn body_never_exceeds_declared_length() {
        let mut response = Response::new("HTTP/1.1", 200, "OK");
        response.declared_length = Some(5);
        assert_eq!(response.accept_body(b"abc", true), 3);
        assert!(!response.is_complete());
        assert_eq!(response.accept_body(b"defgh", true), 2);
        assert_eq!(response.body, b"abcde");
        assert!(response.is_complete());
        assert_eq!(response.accept_body(b"x", true), 0);
    }

    #[test]
    fn relayed_body_is_counted_but_not_kept() {
        let mut response = Response::new("HTTP/1.1", 200, "OK");
        response.declared_length = Some(4);
        assert_eq!(response.accept_body(b"abcdef", false), 4);
        assert!(response.body.is_empty());
        assert_eq!(response.received, 4);
        assert!(response.is_complete());
    }

    #[test]
    fn unframed_body_is_never_complete() {
        let mut response = Response::new("HTTP/1.0", 200, "OK");
        assert_eq!(response.accept_body(b"stream", false), 6);
        assert_eq!(response.remaining(), None);
        assert!(!response.is_complete());
    }

    #[test]
    fn age_counts_whole_seconds() {
        let now = SystemTime::now();
        let mut response = Response::new("HTTP/1.1", 200, "OK");
        assert_eq!(response.age(now), None);
        response.fetched_at = Some(now - Duration::from_millis(7_400));
        assert_eq!(response.age(now), Some(7));
    }
}
