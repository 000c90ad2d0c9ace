//! Incremental GET-only HTTP/1.x request parser.
//!
//! Grounded on the teacher's `src/http/request.rs` cursor-based state
//! machine (`ParsingState`, `parse_request_line`, `extract_and_parse_header`)
//! but pared down to the one method this server accepts and rebuilt around
//! borrowed line slices instead of null-byte line termination, per the
//! safe-port decision: a request line or header line is read out of the
//! buffer as a `&str` slice and copied into an owned `String` before the
//! cursor advances, rather than mutating `\r` into `\0` in place.

use std::io::{self, ErrorKind, Read};

/// Matches the original's fixed read buffer; requests that don't fit are
/// rejected with `BadRequest` rather than growing unboundedly.
pub const READ_BUF_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParsingState {
    RequestLine,
    Headers,
    Body,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    IncompleteRequestLine,
    MalformedRequestLine,
    InvalidMethod,
    HeaderTooLong,
    MalformedHeader,
    InvalidContentLength,
    BodyTooLarge,
}

/// What the caller should do after one call to `Processor::advance`.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A complete request is available; fields are readable via the accessors.
    Finish,
    /// Buffer exhausted without a complete request; read more and call again.
    WaitForRead,
    Error(ParseError),
}

enum LineResult<'a> {
    Line(&'a str),
    NeedMore,
    Malformed,
}

/// Scans `buf[start..len]` for a CRLF-terminated line. Returns the line body
/// (excluding the terminator) without mutating the buffer.
fn next_line(buf: &[u8], start: usize, len: usize) -> LineResult<'_> {
    let mut i = start;
    while i < len {
        if buf[i] == b'\r' {
            if i + 1 >= len {
                return LineResult::NeedMore;
            }
            if buf[i + 1] != b'\n' {
                return LineResult::Malformed;
            }
            return match std::str::from_utf8(&buf[start..i]) {
                Ok(s) => LineResult::Line(s),
                Err(_) => LineResult::Malformed,
            };
        }
        if buf[i] == b'\n' {
            return LineResult::Malformed;
        }
        i += 1;
    }
    LineResult::NeedMore
}

pub struct Processor {
    read_buf: [u8; READ_BUF_SIZE],
    recv_len: usize,
    cursor: usize,
    state: ParsingState,

    pub method_is_get: bool,
    pub url: String,
    pub version: String,
    content_length: usize,
    body_start: usize,
    pub keep_alive: bool,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor {
    pub fn new() -> Self {
        Processor {
            read_buf: [0u8; READ_BUF_SIZE],
            recv_len: 0,
            cursor: 0,
            state: ParsingState::RequestLine,
            method_is_get: false,
            url: String::new(),
            version: String::new(),
            content_length: 0,
            body_start: 0,
            keep_alive: false,
        }
    }

    /// Resets all parse state so the Processor is ready for the next
    /// request on a keep-alive connection.
    pub fn reset(&mut self) {
        self.recv_len = 0;
        self.cursor = 0;
        self.state = ParsingState::RequestLine;
        self.method_is_get = false;
        self.url.clear();
        self.version.clear();
        self.content_length = 0;
        self.body_start = 0;
        self.keep_alive = false;
    }

    /// Reads as much as is available from `source` into the remaining
    /// buffer space without blocking. Returns `Ok(0)` on EOF, `Ok(n)` for
    /// bytes read, or propagates a `WouldBlock` `io::Error`.
    pub fn fill_from<R: Read>(&mut self, source: &mut R) -> io::Result<usize> {
        if self.recv_len >= READ_BUF_SIZE {
            return Err(io::Error::new(ErrorKind::InvalidData, "read buffer full"));
        }
        let n = source.read(&mut self.read_buf[self.recv_len..])?;
        self.recv_len += n;
        Ok(n)
    }

    /// Runs the parse state machine as far as the buffered bytes allow.
    pub fn advance(&mut self) -> ParseOutcome {
        loop {
            match self.state {
                ParsingState::RequestLine => match self.parse_request_line() {
                    Ok(true) => continue,
                    Ok(false) => return ParseOutcome::WaitForRead,
                    Err(e) => return ParseOutcome::Error(e),
                },
                ParsingState::Headers => match self.parse_header_line() {
                    Ok(true) => continue,
                    Ok(false) => return ParseOutcome::WaitForRead,
                    Err(e) => return ParseOutcome::Error(e),
                },
                ParsingState::Body => {
                    if self.recv_len - self.body_start >= self.content_length {
                        self.state = ParsingState::Done;
                        continue;
                    }
                    return ParseOutcome::WaitForRead;
                }
                ParsingState::Done => return ParseOutcome::Finish,
            }
        }
    }

    /// Returns `Ok(true)` if the request line was consumed and parsing
    /// should continue, `Ok(false)` if more bytes are needed.
    fn parse_request_line(&mut self) -> Result<bool, ParseError> {
        match next_line(&self.read_buf, self.cursor, self.recv_len) {
            LineResult::NeedMore => {
                if self.recv_len >= READ_BUF_SIZE {
                    return Err(ParseError::IncompleteRequestLine);
                }
                Ok(false)
            }
            LineResult::Malformed => Err(ParseError::MalformedRequestLine),
            LineResult::Line(line) => {
                let line_end = self.cursor + line.len();
                let mut parts = line.split_whitespace();
                let method = parts.next().ok_or(ParseError::MalformedRequestLine)?;
                let raw_url = parts.next().ok_or(ParseError::MalformedRequestLine)?;
                let version = parts.next().ok_or(ParseError::MalformedRequestLine)?;
                if parts.next().is_some() {
                    return Err(ParseError::MalformedRequestLine);
                }

                if !method.eq_ignore_ascii_case("GET") {
                    return Err(ParseError::InvalidMethod);
                }
                self.method_is_get = true;
                self.url = fold_absolute_uri(raw_url)?;
                self.version = version.to_string();

                self.cursor = line_end + 2;
                self.state = ParsingState::Headers;
                Ok(true)
            }
        }
    }

    fn parse_header_line(&mut self) -> Result<bool, ParseError> {
        match next_line(&self.read_buf, self.cursor, self.recv_len) {
            LineResult::NeedMore => {
                if self.recv_len >= READ_BUF_SIZE {
                    return Err(ParseError::HeaderTooLong);
                }
                Ok(false)
            }
            LineResult::Malformed => Err(ParseError::MalformedHeader),
            LineResult::Line(line) => {
                let line_end = self.cursor + line.len();
                self.cursor = line_end + 2;

                if line.is_empty() {
                    self.body_start = self.cursor;
                    self.state = if self.content_length == 0 {
                        ParsingState::Done
                    } else {
                        match self.body_start.checked_add(self.content_length) {
                            Some(total) if total <= READ_BUF_SIZE => ParsingState::Body,
                            _ => return Err(ParseError::BodyTooLarge),
                        }
                    };
                    return Ok(true);
                }

                let sep = line.find(':').ok_or(ParseError::MalformedHeader)?;
                let key = line[..sep].trim();
                let value = line[sep + 1..].trim();

                if key.eq_ignore_ascii_case("content-length") {
                    self.content_length = value.parse().map_err(|_| ParseError::InvalidContentLength)?;
                } else if key.eq_ignore_ascii_case("connection") {
                    self.keep_alive = value.eq_ignore_ascii_case("keep-alive");
                }
                Ok(true)
            }
        }
    }
}

/// Strips an absolute-URI's scheme and authority, folding `http://host/path`
/// down to origin-form `/path`. Case-insensitive on the scheme, per §6.
fn fold_absolute_uri(raw: &str) -> Result<String, ParseError> {
    if raw.len() >= 7 && raw[..7].eq_ignore_ascii_case("http://") {
        let rest = &raw[7..];
        match rest.find('/') {
            Some(idx) => Ok(rest[idx..].to_string()),
            None => Err(ParseError::MalformedRequestLine),
        }
    } else {
        if !raw.starts_with('/') {
            return Err(ParseError::MalformedRequestLine);
        }
        Ok(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse_all(raw: &[u8]) -> (ParseOutcome, Processor) {
        let mut proc = Processor::new();
        let mut cursor = Cursor::new(raw.to_vec());
        loop {
            let n = proc.fill_from(&mut cursor).unwrap();
            match proc.advance() {
                ParseOutcome::WaitForRead if n == 0 => return (ParseOutcome::WaitForRead, proc),
                ParseOutcome::WaitForRead => continue,
                other => return (other, proc),
            }
        }
    }

    #[test]
    fn simple_get_request() {
        let raw = b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n";
        let (outcome, proc) = parse_all(raw);
        assert_eq!(outcome, ParseOutcome::Finish);
        assert_eq!(proc.url, "/index.html");
        assert_eq!(proc.version, "HTTP/1.1");
        assert!(proc.keep_alive);
    }

    #[test]
    fn byte_at_a_time_feeding_reaches_finish() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let mut proc = Processor::new();
        for &byte in raw {
            let mut one = Cursor::new([byte]);
            proc.fill_from(&mut one).unwrap();
            let outcome = proc.advance();
            if let ParseOutcome::Finish = outcome {
                break;
            }
        }
        assert_eq!(proc.url, "/");
    }

    #[test]
    fn fragmented_headers_across_reads() {
        let mut proc = Processor::new();
        let mut first = Cursor::new(b"GET /a HTTP/1.1\r\nConn".to_vec());
        proc.fill_from(&mut first).unwrap();
        assert_eq!(proc.advance(), ParseOutcome::WaitForRead);

        let mut second = Cursor::new(b"ection: keep-alive\r\n\r\n".to_vec());
        proc.fill_from(&mut second).unwrap();
        assert_eq!(proc.advance(), ParseOutcome::Finish);
        assert!(proc.keep_alive);
    }

    #[test]
    fn absolute_uri_folds_to_origin_form() {
        let raw = b"GET http://example.com/a/b HTTP/1.1\r\n\r\n";
        let (outcome, proc) = parse_all(raw);
        assert_eq!(outcome, ParseOutcome::Finish);
        assert_eq!(proc.url, "/a/b");
    }

    #[test]
    fn non_get_method_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\n\r\n";
        let (outcome, _) = parse_all(raw);
        assert_eq!(outcome, ParseOutcome::Error(ParseError::InvalidMethod));
    }

    #[test]
    fn bare_lf_is_malformed() {
        let raw = b"GET / HTTP/1.1\n\n";
        let (outcome, _) = parse_all(raw);
        assert_eq!(outcome, ParseOutcome::Error(ParseError::MalformedRequestLine));
    }

    #[test]
    fn oversized_request_line_is_rejected() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat(b'a').take(READ_BUF_SIZE));
        let (outcome, _) = parse_all(&raw);
        assert_eq!(outcome, ParseOutcome::Error(ParseError::IncompleteRequestLine));
    }

    #[test]
    fn request_with_body_waits_for_full_body() {
        let raw = b"GET / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel";
        let (outcome, _) = parse_all(raw);
        assert_eq!(outcome, ParseOutcome::WaitForRead);

        let raw_full = b"GET / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (outcome, _) = parse_all(raw_full);
        assert_eq!(outcome, ParseOutcome::Finish);
    }
}
