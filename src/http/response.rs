//! Response assembly and the scatter/gather write loop.
//!
//! Grounded on the teacher's `HttpResponse` (status line/headers/body
//! assembly, `to_bytes`) but GET-only and fixed to a closed set of status
//! codes, since this server serves static files and nothing else. Instead
//! of storing raw `IoSlice` descriptors across poll iterations (which would
//! borrow from `self` and fight the borrow checker), the writer keeps owned
//! progress counters and builds fresh `IoSlice`s from them on every call to
//! `write_ready`, per the safe-port decision in the design notes.

use std::io::{self, ErrorKind, IoSlice, Write};

use memmap2::Mmap;

pub const WRITE_BUF_SIZE: usize = 1024;

const BAD_REQUEST_BODY: &str = "Your request has bad syntax or is inherently impossible to satisfy.\n";
const FORBIDDEN_BODY: &str = "You don't have permission to get file from this server.\n";
const NOT_FOUND_BODY: &str = "The request file was not found on this server.\n";
const INTERNAL_ERROR_BODY: &str = "There was an unusual problem serving the requested file.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    InternalError,
}

impl Status {
    fn code_and_title(self) -> (u16, &'static str) {
        match self {
            Status::Ok => (200, "OK"),
            Status::BadRequest => (400, "Bad Request"),
            Status::Forbidden => (403, "Forbidden"),
            Status::NotFound => (404, "Not Found"),
            Status::InternalError => (500, "Internal Server Error"),
        }
    }

    fn canned_body(self) -> &'static str {
        match self {
            Status::Ok => "",
            Status::BadRequest => BAD_REQUEST_BODY,
            Status::Forbidden => FORBIDDEN_BODY,
            Status::NotFound => NOT_FOUND_BODY,
            Status::InternalError => INTERNAL_ERROR_BODY,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// `WouldBlock`; keep writable interest and call again later.
    Again,
    /// Fully drained and the connection stays open for another request.
    Next,
    /// Fully drained and the connection should close.
    Finish,
    Error,
}

/// Holds everything needed to drive the scatter/gather write loop for one
/// response. Built once per request via `ok` or `error`.
pub struct ResponseWriter {
    header_buf: Vec<u8>,
    header_sent: usize,
    file: Option<Mmap>,
    file_sent: usize,
    residual: usize,
    pub keep_alive: bool,
}

impl ResponseWriter {
    /// Builds a 200 response. `file` is mapped read-only for its whole
    /// length; `len == 0` skips the mmap call entirely since mapping an
    /// empty file is platform-dependent and unnecessary.
    pub fn ok(version: &str, keep_alive: bool, file: std::fs::File, len: u64) -> io::Result<Self> {
        let mmap = if len > 0 {
            // Safety: the mapping is read-only and the file is not modified
            // for the lifetime of this response; the mmap crate itself
            // requires this call be `unsafe` because concurrent external
            // truncation of the file is UB, a risk inherent to memory-mapped
            // I/O rather than something this call introduces.
            Some(unsafe { Mmap::map(&file)? })
        } else {
            None
        };

        let mut header_buf = Vec::with_capacity(WRITE_BUF_SIZE);
        write_status_and_headers(&mut header_buf, version, Status::Ok, len, keep_alive);

        let file_len = mmap.as_ref().map_or(0, |m| m.len());
        let residual = header_buf.len() + file_len;
        Ok(ResponseWriter {
            header_buf,
            header_sent: 0,
            residual,
            file: mmap,
            file_sent: 0,
            keep_alive,
        })
    }

    /// Builds an error response; the canned body is appended directly into
    /// the header buffer, so it travels as a single descriptor.
    pub fn error(version: &str, keep_alive: bool, status: Status) -> Self {
        let body = status.canned_body();
        let mut header_buf = Vec::with_capacity(WRITE_BUF_SIZE);
        write_status_and_headers(&mut header_buf, version, status, body.len() as u64, keep_alive);
        header_buf.extend_from_slice(body.as_bytes());

        let residual = header_buf.len();
        ResponseWriter {
            header_buf,
            header_sent: 0,
            file: None,
            file_sent: 0,
            residual,
            keep_alive,
        }
    }

    /// Attempts to drain the response onto `sink` without blocking.
    pub fn write_ready<W: Write>(&mut self, sink: &mut W) -> ResponseOutcome {
        while self.residual > 0 {
            let header_remaining = &self.header_buf[self.header_sent..];
            let file_remaining: &[u8] = match &self.file {
                Some(mmap) => &mmap[self.file_sent..],
                None => &[],
            };

            let mut slices = Vec::with_capacity(2);
            if !header_remaining.is_empty() {
                slices.push(IoSlice::new(header_remaining));
            }
            if !file_remaining.is_empty() {
                slices.push(IoSlice::new(file_remaining));
            }
            if slices.is_empty() {
                break;
            }

            match sink.write_vectored(&slices) {
                Ok(0) => return ResponseOutcome::Error,
                Ok(mut n) => {
                    // Each descriptor advances its own base rather than the
                    // next one's, so a partial write never corrupts the
                    // offset of the descriptor that hasn't started yet.
                    let header_remaining_len = self.header_buf.len() - self.header_sent;
                    if n >= header_remaining_len {
                        n -= header_remaining_len;
                        self.header_sent = self.header_buf.len();
                        self.file_sent += n;
                    } else {
                        self.header_sent += n;
                    }
                    self.residual = (self.header_buf.len() - self.header_sent)
                        + self.file.as_ref().map_or(0, |m| m.len() - self.file_sent);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return ResponseOutcome::Again,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.file = None;
                    return ResponseOutcome::Error;
                }
            }
        }

        self.file = None;
        if self.keep_alive {
            ResponseOutcome::Next
        } else {
            ResponseOutcome::Finish
        }
    }
}

fn write_status_and_headers(buf: &mut Vec<u8>, version: &str, status: Status, content_length: u64, keep_alive: bool) {
    let (code, title) = status.code_and_title();
    buf.extend_from_slice(format!("{version} {code} {title}\r\n").as_bytes());
    buf.extend_from_slice(format!("Content-Length: {content_length}\r\n").as_bytes());
    let connection = if keep_alive { "keep-alive" } else { "close" };
    buf.extend_from_slice(format!("Connection: {connection}\r\n").as_bytes());
    buf.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn error_response_is_bit_exact() {
        let mut writer = ResponseWriter::error("HTTP/1.1", false, Status::NotFound);
        let mut sink = Vec::new();
        let outcome = writer.write_ready(&mut Cursor::new(&mut sink));
        assert_eq!(outcome, ResponseOutcome::Finish);
        let text = String::from_utf8(sink).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.ends_with("The request file was not found on this server.\n"));
        assert!(text.contains("Content-Length: 47\r\n"));
    }

    #[test]
    fn ok_response_carries_keep_alive() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"hi").unwrap();
        let file = std::fs::File::open(tmp.path()).unwrap();
        let mut writer = ResponseWriter::ok("HTTP/1.1", true, file, 2).unwrap();
        let mut sink = Vec::new();
        let outcome = writer.write_ready(&mut Cursor::new(&mut sink));
        assert_eq!(outcome, ResponseOutcome::Next);
        let text = String::from_utf8(sink).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("hi"));
    }

    #[test]
    fn zero_length_file_skips_mmap() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let file = std::fs::File::open(tmp.path()).unwrap();
        let mut writer = ResponseWriter::ok("HTTP/1.1", false, file, 0).unwrap();
        let mut sink = Vec::new();
        let outcome = writer.write_ready(&mut Cursor::new(&mut sink));
        assert_eq!(outcome, ResponseOutcome::Finish);
        assert!(sink.ends_with(b"\r\n\r\n"));
    }
}
