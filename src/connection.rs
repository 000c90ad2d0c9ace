//! Per-connection read/write phase handlers.
//!
//! Grounded on the teacher's `http_connection.rs` calling convention
//! (`handle_read_phase(conn, poll, token, ...)`, `handle_write_phase(...)`,
//! `handle_post_write_update(...)`): free functions that take the
//! connection plus whatever shared context they need, rather than methods
//! buried behind a God object. The `Server`/reactor struct those functions
//! were written against was never present in the retrieved teacher
//! snapshot, so only this calling convention is carried forward; the
//! connection table itself lives in `reactor.rs`.

use std::io::{self, ErrorKind};

use mio::net::TcpStream;

use crate::heap::ConnectionId;
use crate::http::request::{ParseOutcome, Processor};
use crate::http::response::{ResponseOutcome, ResponseWriter, Status};
use crate::provider::{Provider, ResolveError};

pub struct Connection {
    pub stream: TcpStream,
    pub client_id: ConnectionId,
    processor: Processor,
    response: Option<ResponseWriter>,
}

impl Connection {
    pub fn new(stream: TcpStream, client_id: ConnectionId) -> Self {
        Connection {
            stream,
            client_id,
            processor: Processor::new(),
            response: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// No complete request yet; stay registered for readable events.
    Again,
    /// A response is ready; the reactor should flip interest to writable.
    ResponseReady,
    /// Unrecoverable; the reactor should tear the connection down.
    Error,
}

/// Drains the socket and advances the parser. On a complete request (or a
/// parse error, which still produces a response body) builds the response
/// and returns `ResponseReady`.
pub fn handle_read_phase(conn: &mut Connection, provider: &Provider) -> ReadOutcome {
    loop {
        match conn.processor.fill_from(&mut conn.stream) {
            Ok(0) => return ReadOutcome::Error,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return ReadOutcome::Error,
        }
    }

    match conn.processor.advance() {
        ParseOutcome::WaitForRead => ReadOutcome::Again,
        ParseOutcome::Error(_) => {
            let version = if conn.processor.version.is_empty() {
                "HTTP/1.1".to_string()
            } else {
                conn.processor.version.clone()
            };
            conn.response = Some(ResponseWriter::error(&version, conn.processor.keep_alive, Status::BadRequest));
            ReadOutcome::ResponseReady
        }
        ParseOutcome::Finish => {
            let version = conn.processor.version.clone();
            let keep_alive = conn.processor.keep_alive;
            conn.response = Some(build_response(provider, &conn.processor.url, &version, keep_alive));
            ReadOutcome::ResponseReady
        }
    }
}

fn build_response(provider: &Provider, url: &str, version: &str, keep_alive: bool) -> ResponseWriter {
    match provider.resolve(url) {
        Ok(resolved) => match ResponseWriter::ok(version, keep_alive, resolved.file, resolved.len) {
            Ok(writer) => writer,
            Err(_) => ResponseWriter::error(version, keep_alive, Status::InternalError),
        },
        Err(ResolveError::BadRequest) => ResponseWriter::error(version, keep_alive, Status::BadRequest),
        Err(ResolveError::NotFound) => ResponseWriter::error(version, keep_alive, Status::NotFound),
        Err(ResolveError::Forbidden) => ResponseWriter::error(version, keep_alive, Status::Forbidden),
        Err(ResolveError::Internal) => ResponseWriter::error(version, keep_alive, Status::InternalError),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// `WouldBlock`; stay registered for writable events.
    Again,
    /// Response fully drained and the connection should serve another
    /// request; the reactor flips interest back to readable.
    Next,
    /// Response fully drained and the connection should close.
    Finish,
    Error,
}

pub fn handle_write_phase(conn: &mut Connection) -> WriteOutcome {
    let Some(response) = conn.response.as_mut() else {
        return WriteOutcome::Error;
    };

    match response.write_ready(&mut conn.stream) {
        ResponseOutcome::Again => WriteOutcome::Again,
        ResponseOutcome::Next => {
            conn.response = None;
            conn.processor.reset();
            WriteOutcome::Next
        }
        ResponseOutcome::Finish => WriteOutcome::Finish,
        ResponseOutcome::Error => WriteOutcome::Error,
    }
}

pub fn close(conn: Connection) -> io::Result<()> {
    drop(conn.stream);
    Ok(())
}
