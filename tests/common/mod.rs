//! Shared utilities for integration testing.
//!
//! Mock origins run on plain std threads with blocking sockets. The proxy is
//! driven on the test thread through `Proxy::turn`, interleaved with
//! non-blocking reads and writes on the client socket.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use search_proxy::config::ProxyConfig;
use search_proxy::http::{parse_response, Response};
use search_proxy::{ContentStore, Proxy};

pub const TURN: Duration = Duration::from_millis(10);
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Reply the mock origin sends for targets it does not serve.
pub const NOT_FOUND: &str =
    "HTTP/1.1 404 Not Found\r\nContent-Length: 7\r\nConnection: close\r\n\r\nmissing";

/// Proxy settings for tests: loopback, ephemeral port, no audit file.
pub fn proxy_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.cache.audit_log = String::new();
    config
}

pub fn start_proxy(config: &ProxyConfig) -> Proxy {
    let store = ContentStore::from_config(&config.cache).unwrap();
    Proxy::bind(config, store).unwrap()
}

/// Origin serving fixed pages keyed by the request target as sent.
pub struct MockUpstream {
    pub addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    /// Unknown targets get a `404 Not Found`.
    pub fn start(pages: &[(&str, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let pages: HashMap<String, String> = pages
            .iter()
            .map(|(target, body)| (target.to_string(), body.to_string()))
            .collect();
        let accepts = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (accepts_c, requests_c) = (accepts.clone(), requests.clone());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut socket) = stream else { break };
                accepts_c.fetch_add(1, Ordering::SeqCst);
                let head = read_head(&mut socket);
                let target = head.split(' ').nth(1).unwrap_or_default().to_string();
                requests_c.lock().unwrap().push(head);

                let response = match pages.get(&target) {
                    Some(body) => format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    ),
                    None => NOT_FOUND.to_string(),
                };
                let _ = socket.write_all(response.as_bytes());
                let _ = socket.shutdown(std::net::Shutdown::Write);
            }
        });

        Self {
            addr,
            accepts,
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Origin that writes `raw` verbatim to every connection, then closes.
pub fn start_raw_upstream(raw: &'static [u8]) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let accepts_c = accepts.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut socket) = stream else { break };
            accepts_c.fetch_add(1, Ordering::SeqCst);
            read_head(&mut socket);
            let _ = socket.write_all(raw);
        }
    });
    (addr, accepts)
}

/// Origin that accepts one connection and keeps it open without answering
/// until the other side closes.
pub fn start_silent_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut socket, _)) = listener.accept() {
            let mut buf = [0u8; 1024];
            while matches!(socket.read(&mut buf), Ok(n) if n > 0) {}
        }
    });
    addr
}

/// Tunnel endpoint: echoes every byte back until the client closes.
pub fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut socket, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            loop {
                match socket.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if socket.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    addr
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") && !head.ends_with(b"\n\n") {
        match socket.read(&mut byte) {
            Ok(1) => head.push(byte[0]),
            _ => break,
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Opens a non-blocking client connection to the proxy.
pub fn client(proxy: &Proxy) -> TcpStream {
    let stream = TcpStream::connect(proxy.local_addr()).unwrap();
    stream.set_nonblocking(true).unwrap();
    stream
}

/// Writes all of `bytes`, turning the proxy whenever the socket is full.
pub fn send_all(proxy: &mut Proxy, stream: &mut TcpStream, mut bytes: &[u8]) {
    let deadline = Instant::now() + DEADLINE;
    while !bytes.is_empty() {
        match stream.write(bytes) {
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                proxy.turn(Some(TURN)).unwrap();
            }
            Err(e) => panic!("client write failed: {e}"),
        }
        assert!(Instant::now() < deadline, "timed out sending");
    }
}

/// Reads until `n` bytes have arrived.
pub fn read_exact(proxy: &mut Proxy, stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let deadline = Instant::now() + DEADLINE;
    let mut out = Vec::with_capacity(n);
    let mut buf = [0u8; 8192];
    while out.len() < n {
        proxy.turn(Some(TURN)).unwrap();
        match stream.read(&mut buf) {
            Ok(0) => panic!("connection closed after {} of {n} bytes", out.len()),
            Ok(read) => out.extend_from_slice(&buf[..read]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => panic!("client read failed: {e}"),
        }
        assert!(Instant::now() < deadline, "timed out reading");
    }
    out
}

/// Reads until the proxy closes the connection.
pub fn read_to_close(proxy: &mut Proxy, stream: &mut TcpStream) -> Vec<u8> {
    let deadline = Instant::now() + DEADLINE;
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        proxy.turn(Some(TURN)).unwrap();
        match stream.read(&mut buf) {
            Ok(0) => return out,
            Ok(read) => out.extend_from_slice(&buf[..read]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == ErrorKind::ConnectionReset => return out,
            Err(e) => panic!("client read failed: {e}"),
        }
        assert!(Instant::now() < deadline, "timed out waiting for close");
    }
}

/// Sends one request on a fresh connection and returns the raw reply.
pub fn exchange(proxy: &mut Proxy, request: &str) -> Vec<u8> {
    let mut stream = client(proxy);
    send_all(proxy, &mut stream, request.as_bytes());
    read_to_close(proxy, &mut stream)
}

pub fn exchange_parsed(proxy: &mut Proxy, request: &str) -> Response {
    let raw = exchange(proxy, request);
    parse_response(&raw).unwrap_or_else(|e| {
        panic!("unparsable reply {:?}: {e}", String::from_utf8_lossy(&raw))
    })
}

pub fn get(url: &str, host: &str) -> String {
    format!("GET {url} HTTP/1.1\r\nHost: {host}\r\nAccept: */*\r\n\r\n")
}

/// Turns the proxy until `done` holds.
pub fn turn_until(proxy: &mut Proxy, mut done: impl FnMut(&Proxy) -> bool) {
    let deadline = Instant::now() + DEADLINE;
    while !done(proxy) {
        proxy.turn(Some(TURN)).unwrap();
        assert!(Instant::now() < deadline, "condition not reached in time");
    }
}
