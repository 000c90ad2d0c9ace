use std::fmt::{self, Display, Formatter};
use std::io;

/// Crate-wide error for everything outside the per-request HTTP layer:
/// startup failures, heap capacity overflow, and anything else that makes
/// the reactor itself unusable. HTTP-layer failures stay as `ParseError`
/// (see `http::request`) since those map to status codes, not aborted
/// processes.
#[derive(Debug)]
pub enum ServerError {
    Io(io::Error),
    AddrParse(std::net::AddrParseError),
    InvalidRoot(String),
    HeapCapacityExceeded,
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "i/o error: {e}"),
            ServerError::AddrParse(e) => write!(f, "invalid address: {e}"),
            ServerError::InvalidRoot(msg) => write!(f, "invalid document root: {msg}"),
            ServerError::HeapCapacityExceeded => write!(f, "expiry heap capacity exceeded"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(e: std::net::AddrParseError) -> Self {
        ServerError::AddrParse(e)
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
