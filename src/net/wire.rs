//! Byte-level socket helpers and HTTP delimiters.

use std::io::{self, ErrorKind, Read, Write};

pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';
pub const CRLF: &[u8] = b"\r\n";

/// Length of the line terminator at `at`: 2 for CRLF, 1 for a bare CR or
/// LF, 0 when `buf[at]` ends no line.
pub fn terminator_len(buf: &[u8], at: usize) -> usize {
    match (buf.get(at), buf.get(at + 1)) {
        (Some(&CR), Some(&LF)) => 2,
        (Some(&CR), _) | (Some(&LF), _) => 1,
        _ => 0,
    }
}

/// Incremental detector for the end of an HTTP message head.
///
/// Lines end at CRLF, a bare CR or a bare LF, and the head ends at the
/// first empty line after the start line. These are the same rules the
/// message parser reads lines by, so both agree on where the body starts.
/// A CR in the last buffered byte is held back until the next byte shows
/// whether it opens a CRLF.
#[derive(Debug, Default, Clone)]
pub struct HeadScanner {
    /// First byte not yet classified.
    scanned: usize,
    /// Bytes in the current line so far.
    line_len: usize,
    /// Completed lines, the start line included.
    lines: usize,
}

impl HeadScanner {
    /// Returns the offset just past the head terminator once one is present.
    pub fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        if buf.len() < self.scanned {
            self.reset();
        }
        while self.scanned < buf.len() {
            let rest = &buf[self.scanned..];
            let Some(found) = memchr::memchr2(CR, LF, rest) else {
                self.line_len += rest.len();
                self.scanned = buf.len();
                return None;
            };
            let at = self.scanned + found;
            self.line_len += found;
            self.scanned = at;

            if buf[at] == CR && at + 1 == buf.len() {
                return None;
            }
            let len = terminator_len(buf, at);
            if self.line_len == 0 && self.lines > 0 {
                return Some(at + len);
            }
            self.lines += 1;
            self.line_len = 0;
            self.scanned = at + len;
        }
        None
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One-shot variant of [`HeadScanner::scan`].
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    HeadScanner::default().scan(buf)
}

/// Result of a single non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were placed at the start of the buffer.
    Data(usize),
    /// Nothing to read until the next readiness notification.
    WouldBlock,
    /// The peer performed an orderly shutdown.
    Closed,
}

/// Issues exactly one read (retrying only on `EINTR`).
pub fn read_chunk<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    loop {
        return match src.read(buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
    }
}

/// Result of a single non-blocking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(usize),
    WouldBlock,
}

/// Issues exactly one write (retrying only on `EINTR`).
///
/// A zero-length write of a non-empty buffer is reported as
/// [`ErrorKind::WriteZero`]: the peer can no longer accept bytes.
pub fn write_some<W: Write + ?Sized>(dst: &mut W, buf: &[u8]) -> io::Result<WriteOutcome> {
    if buf.is_empty() {
        return Ok(WriteOutcome::Written(0));
    }
    loop {
        return match dst.write(buf) {
            Ok(0) => Err(io::Error::new(ErrorKind::WriteZero, "peer accepted no bytes")),
            Ok(n) => Ok(WriteOutcome::Written(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(WriteOutcome::WouldBlock),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
    }
}
