//! Bridges `SIGALRM` into the mio event loop.
//!
//! `signal_hook::low_level::pipe::register` installs an async-signal-safe
//! handler that writes a single wakeup byte into the given `Write` end
//! whenever the signal fires; the matching read end is registered with
//! `Poll` like any other socket. Only `SIGALRM` is ever registered on this
//! pipe, so any byte read back from it unambiguously means "the interval
//! timer fired" — we never need to decode which signal arrived.

use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;

use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use signal_hook::consts::SIGALRM;

pub struct SignalBridge {
    read_end: UnixStream,
    _write_end_registration_id: signal_hook::SigId,
}

impl SignalBridge {
    /// Installs the `SIGALRM` handler and returns the bridge holding the
    /// read half of the pipe. The caller registers it with `Poll` via
    /// `mio::event::Source` just like a `TcpStream`.
    pub fn install() -> io::Result<Self> {
        let (read_end, write_end) = UnixStream::pair()?;
        read_end.set_nonblocking(true)?;
        write_end.set_nonblocking(true)?;
        let id = signal_hook::low_level::pipe::register(SIGALRM, write_end)?;
        Ok(SignalBridge {
            read_end,
            _write_end_registration_id: id,
        })
    }

    /// Drains every wakeup byte currently buffered in the pipe. Must be
    /// called after each readiness notification since edge-triggered
    /// polling only re-fires once new data arrives.
    pub fn drain(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; 64];
        let mut total = 0;
        loop {
            match self.read_end.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        SourceFd(&self.read_end.as_raw_fd()).register(registry, token, Interest::READABLE)
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self._write_end_registration_id);
    }
}
