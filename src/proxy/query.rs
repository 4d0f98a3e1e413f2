//! Requests addressed to the proxy itself.
//!
//! A GET whose `Host` is the proxy's advertised authority is never
//! forwarded. `?query=<words>` runs a keyword search over cached pages and
//! `?get_cache=<url>` returns a cached response as stored.

use url::form_urlencoded;

use crate::http::message::HOST;
use crate::http::{answers, serialize_response, Method, Request};
use crate::store::ContentStore;

const QUERY_PARAM: &str = "query";
const GET_CACHE_PARAM: &str = "get_cache";

pub fn is_addressed_to_proxy(request: &Request, authority: &str) -> bool {
    request.method == Method::Get && request.header(HOST) == Some(authority)
}

/// Builds the full reply for a proxy-addressed request.
pub fn respond(request: &Request, store: &mut ContentStore) -> Vec<u8> {
    let query = request
        .target
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default();

    let param = form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == QUERY_PARAM || key == GET_CACHE_PARAM);

    match param {
        Some((key, words)) if key == QUERY_PARAM => {
            let results = store.find_relevant(&words);
            tracing::info!(
                query = %words,
                hits = results.len(),
                "Search query answered"
            );
            answers::search_results(&request.version, results.urls())
        }
        Some((_, url)) => match store.lookup(&url) {
            Some(response) => serialize_response(response),
            None => {
                tracing::debug!(url = %url, "get_cache miss");
                answers::error(&request.version, 404)
            }
        },
        None => {
            tracing::debug!(
                request_target = %request.target,
                "Proxy-addressed request without a known parameter"
            );
            answers::error(&request.version, 400)
        }
    }
}
