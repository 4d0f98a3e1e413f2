//! Event handlers for the connection state machine.
//!
//! Every handler works on one connection, identified by its token, through
//! the shared [`Context`]. Handlers may queue bytes on a peer but never
//! remove a connection; they report [`SessionResult::Close`] instead.

use std::mem;

use mio::Token;

use crate::http::parser::head_preview;
use crate::http::{answers, parse_request, parse_response, serialize_response, Method, Request};
use crate::net::wire::{self, ReadOutcome};
use crate::observability::metrics;
use crate::proxy::connection::{Connection, Phase, Role, SessionResult};
use crate::proxy::{query, Context};

/// Handles one readiness notification for `token`.
pub(crate) fn ready(
    ctx: &mut Context<'_>,
    token: Token,
    readable: bool,
    writable: bool,
) -> SessionResult {
    let was_connecting = is_connecting(ctx, token);
    if writable && on_writable(ctx, token) == SessionResult::Close {
        return SessionResult::Close;
    }
    // Bytes that arrived during the handshake produced no edge of their own.
    let just_connected = was_connecting && !is_connecting(ctx, token);
    if (readable || just_connected) && on_readable(ctx, token) == SessionResult::Close {
        return SessionResult::Close;
    }
    settle(ctx, token)
}

fn is_connecting(ctx: &Context<'_>, token: Token) -> bool {
    ctx.connections
        .get(token.0)
        .is_some_and(|conn| conn.connecting)
}

fn settle(ctx: &mut Context<'_>, token: Token) -> SessionResult {
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };
    if conn.wants_close() {
        return SessionResult::Close;
    }
    if let Err(e) = conn.sync_interest(ctx.registry) {
        tracing::warn!(token = token.0, error = %e, "Failed to update interest");
        return SessionResult::Close;
    }
    SessionResult::Continue
}

fn on_writable(ctx: &mut Context<'_>, token: Token) -> SessionResult {
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };

    if conn.connecting {
        match conn.finish_connect() {
            Ok(false) => return SessionResult::Continue,
            Ok(true) => {
                metrics::record_upstream_connect("connected");
                tracing::debug!(
                    token = token.0,
                    request_id = %conn.request_id,
                    "Upstream connected"
                );
                if conn.phase == Phase::TunnelEstablished {
                    if let Some(client) = conn.peer {
                        if establish_tunnel(ctx, client) == SessionResult::Close {
                            return SessionResult::Close;
                        }
                    }
                }
            }
            Err(e) => {
                metrics::record_upstream_connect("failed");
                tracing::warn!(
                    token = token.0,
                    request_id = %conn.request_id,
                    error = %e,
                    "Upstream connect failed"
                );
                return SessionResult::Close;
            }
        }
    }

    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };
    if let Err(e) = conn.flush() {
        tracing::debug!(token = token.0, error = %e, "Write failed");
        return SessionResult::Close;
    }
    SessionResult::Continue
}

/// The CONNECT target is reachable: confirm to the client and start
/// relaying both ways.
fn establish_tunnel(ctx: &mut Context<'_>, client: Token) -> SessionResult {
    let Some(conn) = ctx.connections.get_mut(client.0) else {
        return SessionResult::Close;
    };
    let version = conn
        .request
        .as_ref()
        .map(|request| request.version.as_str())
        .unwrap_or_default();
    let reply = answers::connection_established(version);

    conn.phase = Phase::TunnelEstablished;
    tracing::info!(request_id = %conn.request_id, "Tunnel established");
    match conn.queue(&reply, ctx.registry) {
        Ok(()) => SessionResult::Continue,
        Err(e) => {
            tracing::debug!(token = client.0, error = %e, "Failed to confirm tunnel");
            SessionResult::Close
        }
    }
}

fn on_readable(ctx: &mut Context<'_>, token: Token) -> SessionResult {
    let mut scratch = mem::take(ctx.scratch);
    if scratch.len() < ctx.settings.read_chunk {
        scratch.resize(ctx.settings.read_chunk, 0);
    }
    let result = drain(ctx, token, &mut scratch);
    *ctx.scratch = scratch;
    result
}

/// Reads until the socket would block, feeding each chunk to the state
/// machine as it arrives.
fn drain(ctx: &mut Context<'_>, token: Token, buf: &mut [u8]) -> SessionResult {
    loop {
        let Some(conn) = ctx.connections.get_mut(token.0) else {
            return SessionResult::Close;
        };
        if conn.connecting {
            return SessionResult::Continue;
        }

        match wire::read_chunk(&mut conn.socket, buf) {
            Ok(ReadOutcome::Data(n)) => {
                conn.touch();
                if feed(ctx, token, &buf[..n]) == SessionResult::Close {
                    return SessionResult::Close;
                }
            }
            Ok(ReadOutcome::WouldBlock) => return SessionResult::Continue,
            Ok(ReadOutcome::Closed) => return on_eof(ctx, token),
            Err(e) => {
                tracing::debug!(token = token.0, error = %e, "Read failed");
                return SessionResult::Close;
            }
        }
    }
}

fn feed(ctx: &mut Context<'_>, token: Token, chunk: &[u8]) -> SessionResult {
    let Some(conn) = ctx.connections.get(token.0) else {
        return SessionResult::Close;
    };
    match (conn.role, conn.phase) {
        (Role::Client, Phase::AwaitingRequestHeaders) => accumulate_request(ctx, token, chunk),
        (Role::Upstream, Phase::AwaitingResponseHeaders) => {
            accumulate_response(ctx, token, chunk)
        }
        (Role::Upstream, Phase::StreamingBody) => relay_response_body(ctx, token, chunk),
        (_, Phase::TunnelEstablished)
        | (Role::Client, Phase::RequestRouted)
        | (Role::Client, Phase::StreamingBody) => forward_to_peer(ctx, token, chunk),
        // Answered or detached: nothing more is expected.
        _ => SessionResult::Continue,
    }
}

fn on_eof(ctx: &mut Context<'_>, token: Token) -> SessionResult {
    if let Some(conn) = ctx.connections.get_mut(token.0) {
        let unframed = conn
            .response
            .as_ref()
            .filter(|response| response.declared_length.is_none())
            .map(|response| response.received);
        let streaming = conn.role == Role::Upstream && conn.phase == Phase::StreamingBody;
        if let Some(bytes) = unframed.filter(|_| streaming) {
            conn.phase = Phase::Complete;
            tracing::debug!(
                request_id = %conn.request_id,
                bytes,
                "Upstream closed unframed body"
            );
        } else {
            tracing::debug!(token = token.0, role = ?conn.role, phase = ?conn.phase, "Peer closed");
        }
    }
    SessionResult::Close
}

/// Queues `bytes` for the peer of `from`. Without a peer the bytes are
/// dropped.
fn forward_to_peer(ctx: &mut Context<'_>, from: Token, bytes: &[u8]) -> SessionResult {
    let Some(peer) = ctx.connections.get(from.0).and_then(|conn| conn.peer) else {
        return SessionResult::Continue;
    };
    let Some(target) = ctx.connections.get_mut(peer.0) else {
        return SessionResult::Continue;
    };
    if let Err(e) = target.queue(bytes, ctx.registry) {
        tracing::debug!(from = from.0, to = peer.0, error = %e, "Relay write failed");
        return SessionResult::Close;
    }
    SessionResult::Continue
}

/// Sends a locally produced reply and closes once it is flushed.
fn answer(ctx: &mut Context<'_>, token: Token, reply: Vec<u8>) -> SessionResult {
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };
    conn.phase = Phase::Complete;
    conn.close_after_flush = true;
    if let Err(e) = conn.queue(&reply, ctx.registry) {
        tracing::debug!(token = token.0, error = %e, "Failed to send reply");
        return SessionResult::Close;
    }
    if conn.wants_close() {
        SessionResult::Close
    } else {
        SessionResult::Continue
    }
}

fn accumulate_request(ctx: &mut Context<'_>, token: Token, chunk: &[u8]) -> SessionResult {
    let max_header_bytes = ctx.settings.max_header_bytes;
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };
    conn.inbound.extend_from_slice(chunk);

    let head_end = conn.head_scanner.scan(&conn.inbound);
    let oversized = match head_end {
        Some(end) => end > max_header_bytes,
        None => conn.inbound.len() > max_header_bytes,
    };
    if oversized {
        tracing::warn!(
            request_id = %conn.request_id,
            buffered = conn.inbound.len(),
            "Request head too large"
        );
        return answer(ctx, token, answers::error("", 431));
    }
    let Some(end) = head_end else {
        return SessionResult::Continue;
    };

    let raw = mem::take(&mut conn.inbound);
    conn.head_scanner.reset();
    route_request(ctx, token, raw, end)
}

fn route_request(
    ctx: &mut Context<'_>,
    token: Token,
    raw: Vec<u8>,
    head_end: usize,
) -> SessionResult {
    let request = parse_request(&raw);
    let request_id = match ctx.connections.get(token.0) {
        Some(conn) => conn.request_id,
        None => return SessionResult::Close,
    };
    tracing::info!(
        request_id = %request_id,
        method = %request.method,
        url = %request.target,
        host = %request.host,
        port = request.port,
        "Request received"
    );

    match request.method {
        Method::Options => answer(ctx, token, answers::preflight(&request.version)),
        Method::Get if query::is_addressed_to_proxy(&request, &ctx.settings.authority) => {
            let reply = query::respond(&request, ctx.store);
            answer(ctx, token, reply)
        }
        Method::Get => serve_get(ctx, token, request, raw),
        Method::Connect => open_tunnel(ctx, token, request, &raw[head_end..]),
        Method::Unsupported => {
            tracing::info!(
                request_id = %request_id,
                head = %head_preview(&raw),
                "Unsupported method"
            );
            answer(ctx, token, answers::error(&request.version, 501))
        }
    }
}

/// Answers from the cache, or forwards the raw request upstream.
fn serve_get(ctx: &mut Context<'_>, token: Token, request: Request, raw: Vec<u8>) -> SessionResult {
    if let Some(cached) = ctx.store.lookup(&request.target) {
        let reply = serialize_response(cached);
        tracing::info!(url = %request.target, bytes = reply.len(), "Served from cache");
        return answer(ctx, token, reply);
    }

    let Some(upstream) = connect_upstream(ctx, token, &request, Phase::AwaitingResponseHeaders)
    else {
        return answer(ctx, token, answers::error(&request.version, 502));
    };
    let Some(conn) = ctx.connections.get_mut(upstream.0) else {
        return SessionResult::Close;
    };
    conn.cache_key = Some(request.target.clone());
    if let Err(e) = conn.queue(&raw, ctx.registry) {
        tracing::debug!(token = upstream.0, error = %e, "Failed to forward request");
        return SessionResult::Close;
    }
    route_client(ctx, token, request)
}

/// Starts a CONNECT tunnel. The client is confirmed once the upstream
/// handshake completes; bytes sent before that are held for the upstream.
fn open_tunnel(
    ctx: &mut Context<'_>,
    token: Token,
    request: Request,
    early: &[u8],
) -> SessionResult {
    let Some(upstream) = connect_upstream(ctx, token, &request, Phase::TunnelEstablished) else {
        return answer(ctx, token, answers::error(&request.version, 502));
    };
    if !early.is_empty() {
        let Some(conn) = ctx.connections.get_mut(upstream.0) else {
            return SessionResult::Close;
        };
        if let Err(e) = conn.queue(early, ctx.registry) {
            tracing::debug!(token = upstream.0, error = %e, "Failed to forward tunnel bytes");
            return SessionResult::Close;
        }
    }
    route_client(ctx, token, request)
}

fn route_client(ctx: &mut Context<'_>, token: Token, request: Request) -> SessionResult {
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };
    conn.phase = Phase::RequestRouted;
    conn.request = Some(request);
    SessionResult::Continue
}

/// Opens and registers the upstream for `client`, pairing the two.
fn connect_upstream(
    ctx: &mut Context<'_>,
    client: Token,
    request: &Request,
    phase: Phase,
) -> Option<Token> {
    let request_id = ctx.connections.get(client.0)?.request_id;

    if ctx.connections.len() >= ctx.settings.max_connections {
        metrics::record_upstream_connect("failed");
        tracing::warn!(
            request_id = %request_id,
            limit = ctx.settings.max_connections,
            "Connection limit reached; not connecting upstream"
        );
        return None;
    }

    let socket = match ctx.connector.connect(&request.host, request.port) {
        Ok(socket) => socket,
        Err(e) => {
            metrics::record_upstream_connect("failed");
            tracing::warn!(
                request_id = %request_id,
                host = %request.host,
                port = request.port,
                error = %e,
                "Upstream connect failed"
            );
            return None;
        }
    };

    let entry = ctx.connections.vacant_entry();
    let token = Token(entry.key());
    let mut conn = Connection::upstream(token, socket, client, request_id, phase);
    let interest = conn.initial_interest();
    if let Err(e) = ctx.registry.register(&mut conn.socket, token, interest) {
        metrics::record_upstream_connect("failed");
        tracing::warn!(request_id = %request_id, error = %e, "Failed to register upstream");
        return None;
    }
    entry.insert(conn);

    if let Some(client_conn) = ctx.connections.get_mut(client.0) {
        client_conn.peer = Some(token);
    }
    tracing::debug!(
        request_id = %request_id,
        client = client.0,
        upstream = token.0,
        host = %request.host,
        port = request.port,
        "Upstream paired"
    );
    Some(token)
}

fn accumulate_response(ctx: &mut Context<'_>, token: Token, chunk: &[u8]) -> SessionResult {
    let max_header_bytes = ctx.settings.max_header_bytes;
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };
    conn.inbound.extend_from_slice(chunk);

    let Some(end) = conn.head_scanner.scan(&conn.inbound) else {
        if conn.inbound.len() > max_header_bytes {
            tracing::warn!(request_id = %conn.request_id, "Response head too large");
            return SessionResult::Close;
        }
        return SessionResult::Continue;
    };

    let raw = mem::take(&mut conn.inbound);
    conn.head_scanner.reset();
    on_response_head(ctx, token, raw, end)
}

fn on_response_head(
    ctx: &mut Context<'_>,
    token: Token,
    raw: Vec<u8>,
    head_end: usize,
) -> SessionResult {
    let max_object_bytes = ctx.settings.max_object_bytes;
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };

    let mut response = match parse_response(&raw) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                request_id = %conn.request_id,
                error = %e,
                head = %head_preview(&raw),
                "Unusable upstream response"
            );
            return SessionResult::Close;
        }
    };

    let in_head = response.received;
    let cacheable = conn.cache_key.is_some()
        && response.status == 200
        && response
            .declared_length
            .is_some_and(|declared| declared <= max_object_bytes);
    if !cacheable {
        response.body.clear();
    }
    let complete = response.is_complete();

    tracing::info!(
        request_id = %conn.request_id,
        status = response.status,
        declared_length = ?response.declared_length,
        cacheable,
        "Upstream response"
    );

    conn.retain_body = cacheable;
    conn.response = Some(response);
    conn.phase = Phase::StreamingBody;
    let client = conn.peer;

    if let Some(client) = client.and_then(|client| ctx.connections.get_mut(client.0)) {
        client.phase = Phase::StreamingBody;
    }
    let relayed = (head_end + in_head).min(raw.len());
    if forward_to_peer(ctx, token, &raw[..relayed]) == SessionResult::Close {
        return SessionResult::Close;
    }
    if complete {
        return complete_exchange(ctx, token);
    }
    SessionResult::Continue
}

fn relay_response_body(ctx: &mut Context<'_>, token: Token, chunk: &[u8]) -> SessionResult {
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };
    let Some(response) = conn.response.as_mut() else {
        return SessionResult::Close;
    };

    let accepted = response.accept_body(chunk, conn.retain_body);
    let complete = response.is_complete();

    if forward_to_peer(ctx, token, &chunk[..accepted]) == SessionResult::Close {
        return SessionResult::Close;
    }
    if complete {
        return complete_exchange(ctx, token);
    }
    SessionResult::Continue
}

/// The declared body has been relayed: cache it if eligible and end the
/// exchange.
fn complete_exchange(ctx: &mut Context<'_>, token: Token) -> SessionResult {
    let Some(conn) = ctx.connections.get_mut(token.0) else {
        return SessionResult::Close;
    };
    conn.phase = Phase::Complete;
    let request_id = conn.request_id;
    let url = conn.cache_key.take();
    let response = conn.response.take();
    let received = response.as_ref().map_or(0, |response| response.received);

    if conn.retain_body {
        if let (Some(url), Some(response)) = (url, response) {
            let admission = ctx.store.admit(&url, response);
            tracing::info!(request_id = %request_id, url = %url, ?admission, "Response cached");
        }
    }
    tracing::debug!(request_id = %request_id, bytes = received, "Exchange complete");
    SessionResult::Close
}
