//! Responses the proxy produces itself.

use crate::http::message::Response;
use crate::http::parser::serialize_response;

const FALLBACK_VERSION: &str = "HTTP/1.1";

const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";

/// Separator between URLs in a search answer.
pub const RESULT_SEPARATOR: u8 = b'\0';

fn version_or_default(version: &str) -> &str {
    if version.is_empty() {
        FALLBACK_VERSION
    } else {
        version
    }
}

/// Canonical reason phrase for statuses the proxy emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        431 => "Request Header Fields Too Large",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}

/// Reply to a successful CONNECT. The tunnel starts right after it.
pub fn connection_established(version: &str) -> Vec<u8> {
    format!(
        "{} 200 Connection established\r\n\r\n",
        version_or_default(version)
    )
    .into_bytes()
}

/// CORS preflight reply.
pub fn preflight(version: &str) -> Vec<u8> {
    let response = Response::new(version_or_default(version), 204, reason_phrase(204))
        .with_header(ALLOW_ORIGIN, "*")
        .with_header("Access-Control-Allow-Methods", "GET, CONNECT, OPTIONS")
        .with_header("Access-Control-Allow-Headers", "*")
        .with_header("Access-Control-Max-Age", "86400");
    serialize_response(&response)
}

/// Search answer: the matching URLs separated by NUL bytes.
pub fn search_results<'a>(version: &str, urls: impl IntoIterator<Item = &'a str>) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, url) in urls.into_iter().enumerate() {
        if i > 0 {
            body.push(RESULT_SEPARATOR);
        }
        body.extend_from_slice(url.as_bytes());
    }

    let response = Response::new(version_or_default(version), 200, reason_phrase(200))
        .with_header(ALLOW_ORIGIN, "*")
        .with_header("Content-Type", "text/plain")
        .with_body(body);
    serialize_response(&response)
}

/// Short plain-text error reply. The connection is closed after it.
pub fn error(version: &str, status: u16) -> Vec<u8> {
    let reason = reason_phrase(status);
    let response = Response::new(version_or_default(version), status, reason)
        .with_header("Content-Type", "text/plain")
        .with_header("Connection", "close")
        .with_body(format!("{status} {reason}\n"));
    serialize_response(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parser::parse_response;

    #[test]
    fn connect_reply_is_bare_status_line() {
        assert_eq!(
            connection_established("HTTP/1.0"),
            b"HTTP/1.0 200 Connection established\r\n\r\n"
        );
        assert!(connection_established("").starts_with(b"HTTP/1.1 200"));
    }

    #[test]
    fn preflight_allows_any_origin() {
        let response = parse_response(&preflight("HTTP/1.1")).unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some("GET, CONNECT, OPTIONS")
        );
        assert!(response.body.is_empty());
    }

    #[test]
    fn search_results_are_nul_separated() {
        let bytes = search_results("HTTP/1.1", ["http://a/", "http://b/"]);
        let response = parse_response(&bytes).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"http://a/\0http://b/");
        assert_eq!(response.declared_length, Some(19));
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[test]
    fn empty_search_has_empty_body() {
        let response = parse_response(&search_results("HTTP/1.1", [])).unwrap();
        assert_eq!(response.declared_length, Some(0));
    }

    #[test]
    fn error_replies_carry_status_and_length() {
        for status in [400, 404, 431, 501, 502] {
            let response = parse_response(&error("", status)).unwrap();
            assert_eq!(response.status, status);
            assert_eq!(response.version, "HTTP/1.1");
            assert_eq!(response.reason, reason_phrase(status));
            assert_eq!(response.header("Connection"), Some("close"));
            assert!(response.is_complete());
        }
    }
}
