//! Parsing and serialization of HTTP messages held in byte buffers.

use std::borrow::Cow;
use std::time::SystemTime;

use thiserror::Error;

use crate::http::message::{
    HeaderList, Method, Request, Response, AGE, CONTENT_LENGTH, DEFAULT_HTTP_PORT, HOST,
};
use crate::net::wire::{terminator_len, CR, CRLF, LF};

/// Reasons an upstream response head cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message has no start line")]
    MissingStartLine,

    #[error("malformed status line {0:?}")]
    MalformedStatusLine(String),

    #[error("status code {0:?} is not three digits")]
    InvalidStatus(String),

    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),
}

/// Line reader tolerant of CRLF, bare CR and bare LF terminators, using the
/// same terminator rule as [`crate::net::wire::HeadScanner`].
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn line(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        let Some(end) = memchr::memchr2(CR, LF, rest) else {
            self.pos = self.buf.len();
            return Some(rest);
        };

        self.pos += end;
        self.pos += terminator_len(self.buf, self.pos);
        Some(&rest[..end])
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Reads `name: value` lines up to the empty line ending the head.
fn parse_headers(cursor: &mut Cursor<'_>) -> HeaderList {
    let mut headers = HeaderList::new();
    while let Some(line) = cursor.line() {
        if line.is_empty() {
            break;
        }
        let Some(colon) = memchr::memchr(b':', line) else {
            continue;
        };
        let name = String::from_utf8_lossy(&line[..colon]);
        if name == AGE {
            continue;
        }
        let value = String::from_utf8_lossy(&line[colon + 1..]);
        let value = value.trim_start_matches([' ', '\t']);
        headers.push(name.into_owned(), value.to_owned());
    }
    headers
}

/// Splits a `Host` value on its last colon. A missing or unparsable port
/// falls back to 80 with the whole value as host.
pub fn split_authority(value: &str) -> (String, u16) {
    if let Some(colon) = value.rfind(':') {
        // A colon inside an IPv6 literal is not a port separator.
        if !value[colon..].contains(']') {
            if let Ok(port) = value[colon + 1..].trim().parse::<u16>() {
                return (value[..colon].to_string(), port);
            }
        }
    }
    (value.to_string(), DEFAULT_HTTP_PORT)
}

/// Parses a request head plus whatever body bytes follow it in `buf`.
///
/// Never fails: an unrecognised or garbled request line yields
/// `Method::Unsupported` so the caller can still answer the client.
pub fn parse_request(buf: &[u8]) -> Request {
    let mut cursor = Cursor::new(buf);
    let line = cursor.line().unwrap_or_default();

    let mut parts = line.splitn(3, |b| *b == b' ');
    let method = Method::from_token(parts.next().unwrap_or_default());
    let target = text(parts.next().unwrap_or_default());
    let version = text(parts.next().unwrap_or_default());

    let headers = parse_headers(&mut cursor);
    let (host, port) = match headers.get(HOST) {
        Some(value) => split_authority(value),
        None => (target.clone(), DEFAULT_HTTP_PORT),
    };

    Request {
        method,
        target,
        version,
        host,
        port,
        headers,
        body: cursor.rest().to_vec(),
    }
}

/// Parses a response head plus the body bytes that arrived with it.
///
/// Body bytes beyond the declared `Content-Length` are not retained.
pub fn parse_response(buf: &[u8]) -> Result<Response, ParseError> {
    let mut cursor = Cursor::new(buf);
    let line = cursor
        .line()
        .filter(|line| !line.is_empty())
        .ok_or(ParseError::MissingStartLine)?;

    let mut parts = line.splitn(3, |b| *b == b' ');
    let version = text(parts.next().unwrap_or_default());
    let status_raw = parts
        .next()
        .ok_or_else(|| ParseError::MalformedStatusLine(text(line)))?;
    let reason = text(parts.next().unwrap_or_default());

    if status_raw.len() != 3 || !status_raw.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidStatus(text(status_raw)));
    }
    let status = status_raw
        .iter()
        .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'));

    let headers = parse_headers(&mut cursor);
    let declared_length = match headers.get(CONTENT_LENGTH) {
        Some(value) => Some(
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength(value.to_string()))?,
        ),
        None => None,
    };

    let rest = cursor.rest();
    let keep = declared_length.map_or(rest.len(), |declared| declared.min(rest.len()));

    Ok(Response {
        version,
        status,
        reason,
        headers,
        body: rest[..keep].to_vec(),
        received: keep,
        declared_length,
        fetched_at: Some(SystemTime::now()),
    })
}

/// Serializes a response: status line, headers in order, computed `Age`,
/// blank line, body.
pub fn serialize_response(response: &Response) -> Vec<u8> {
    serialize_response_at(response, SystemTime::now())
}

pub fn serialize_response_at(response: &Response, now: SystemTime) -> Vec<u8> {
    let head_len = response
        .headers
        .iter()
        .map(|h| h.name.len() + h.value.len() + 4)
        .sum::<usize>()
        + 64;
    let mut out = Vec::with_capacity(head_len + response.body.len());

    out.extend_from_slice(
        format!(
            "{} {:03} {}",
            response.version, response.status, response.reason
        )
        .as_bytes(),
    );
    out.extend_from_slice(CRLF);

    for header in response.headers.iter() {
        out.extend_from_slice(header.name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(header.value.as_bytes());
        out.extend_from_slice(CRLF);
    }
    if let Some(age) = response.age(now) {
        out.extend_from_slice(format!("{AGE}: {age}").as_bytes());
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(CRLF);
    out.extend_from_slice(&response.body);
    out
}

/// Lossy view of a head for log output.
pub fn head_preview(buf: &[u8]) -> Cow<'_, str> {
    let end = memchr::memchr2(CR, LF, buf).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end])
}
