//! The event loop: owns the listening socket, the connection table, the
//! expiry heap, and the signal bridge.
//!
//! `bind_listener` is grounded on the raw-socket setup in
//! `maithanhduyan-rust-code/hp-proxy/src/main.rs` (`libc::socket` +
//! `SO_REUSEADDR` + `libc::listen(fd, backlog)`), which is the only way to
//! control the listen backlog explicitly — `mio::net::TcpListener::bind`
//! goes through `std::net::TcpListener` and hard-codes its own. The event
//! dispatch shape (readable/writable branches per descriptor, an end-of-batch
//! expiry sweep) is grounded on the teacher's `Reactor`/`HttpServer`
//! description in `http_connection.rs` and `timeouts.rs`, though the actual
//! connection-table struct is authored fresh — no such struct survived in
//! the teacher snapshot.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddrV4;
use std::os::fd::FromRawFd;
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use proxy_log::{errors, info, warn};

use crate::config::Config;
use crate::connection::{self, Connection, ReadOutcome, WriteOutcome};
use crate::error::{Result, ServerError};
use crate::heap::{ConnectionId, ExpiryHeap};
use crate::provider::Provider;
use crate::signal::SignalBridge;

const LISTENER_TOKEN: Token = Token(0);
const SIGNAL_TOKEN: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

/// Fixed initial capacity for the expiry heap per the startup sequence
/// (§4.4); unrelated to the multiplexer's event-buffer capacity hint.
const DEFAULT_HEAP_CAPACITY: usize = 10;

pub struct Reactor {
    listener: TcpListener,
    poll: Poll,
    signal: SignalBridge,
    connections: HashMap<Token, Connection>,
    heap: ExpiryHeap,
    provider: Provider,
    next_token: usize,
    deadline: Duration,
    timer_interval: Duration,
    event_capacity: usize,
}

impl Reactor {
    pub fn new(config: &Config) -> Result<Self> {
        let addr = SocketAddrV4::new(config.bind, config.port);
        let std_listener = bind_listener(addr, config.backlog)?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let mut signal = SignalBridge::install()?;
        signal.register(poll.registry(), SIGNAL_TOKEN)?;

        let provider = Provider::new(&config.root)?;

        info!("evhttpd listening on {} (backlog={})", addr, config.backlog);

        let reactor = Reactor {
            listener,
            poll,
            signal,
            connections: HashMap::new(),
            heap: ExpiryHeap::init(DEFAULT_HEAP_CAPACITY),
            provider,
            next_token: FIRST_CLIENT_TOKEN,
            deadline: config.deadline(),
            timer_interval: config.timer_interval,
            event_capacity: config.capacity,
        };
        reactor.arm_timer();
        Ok(reactor)
    }

    /// The bound local address; useful when the caller binds to port 0 and
    /// needs to discover which ephemeral port the kernel assigned.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token = self.next_token.wrapping_add(1).max(FIRST_CLIENT_TOKEN);
        token
    }

    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(self.event_capacity);
        loop {
            match self.poll.poll(&mut events, None) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ServerError::Io(e)),
            }

            let mut check_expiry = false;

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_loop(),
                    SIGNAL_TOKEN => {
                        if let Ok(n) = self.signal.drain() {
                            if n > 0 {
                                check_expiry = true;
                            }
                        }
                    }
                    token if event.is_readable() => self.on_client_readable(token),
                    token if event.is_writable() => self.on_client_writable(token),
                    _ => {}
                }
            }

            if check_expiry {
                self.sweep_expired();
            }
        }
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = self.alloc_token();
                    let client_id = ConnectionId(token.0);

                    if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
                        warn!("failed to register connection from {peer}: {e}");
                        continue;
                    }
                    if let Err(e) = self.heap.push(client_id, Instant::now() + self.deadline) {
                        warn!("expiry heap rejected new connection from {peer}: {e}");
                        let _ = self.poll.registry().deregister(&mut stream);
                        continue;
                    }

                    info!("accepted connection from {peer}");
                    self.connections.insert(token, Connection::new(stream, client_id));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    errors!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn on_client_readable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match connection::handle_read_phase(conn, &self.provider) {
            ReadOutcome::Again => {
                if let Some(conn) = self.connections.get(&token) {
                    let _ = self.heap.modify(conn.client_id, Instant::now() + self.deadline);
                }
            }
            ReadOutcome::ResponseReady => {
                if let Some(conn) = self.connections.get_mut(&token) {
                    let client_id = conn.client_id;
                    if let Err(e) = self.poll.registry().reregister(&mut conn.stream, token, Interest::WRITABLE) {
                        errors!("failed to flip connection to writable: {e}");
                        self.teardown(token);
                        return;
                    }
                    let _ = self.heap.modify(client_id, Instant::now() + self.deadline);
                }
            }
            ReadOutcome::Error => self.teardown(token),
        }
    }

    fn on_client_writable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match connection::handle_write_phase(conn) {
            WriteOutcome::Again => {}
            WriteOutcome::Next => {
                if let Some(conn) = self.connections.get_mut(&token) {
                    let client_id = conn.client_id;
                    if let Err(e) = self.poll.registry().reregister(&mut conn.stream, token, Interest::READABLE) {
                        errors!("failed to flip connection back to readable: {e}");
                        self.teardown(token);
                        return;
                    }
                    let _ = self.heap.modify(client_id, Instant::now() + self.deadline);
                }
            }
            WriteOutcome::Finish | WriteOutcome::Error => self.teardown(token),
        }
    }

    fn sweep_expired(&mut self) {
        let now = Instant::now();
        let mut swept = 0;
        loop {
            let expired_token = match self.heap.peek() {
                Ok(entry) if entry.deadline <= now => Token(entry.client_id.0),
                _ => break,
            };
            self.teardown(expired_token);
            swept += 1;
        }
        if swept > 0 {
            info!("expiry sweep closed {swept} idle connection(s)");
        }
        self.arm_timer();
    }

    fn arm_timer(&self) {
        unsafe {
            let interval = libc::itimerval {
                it_interval: to_timeval(self.timer_interval),
                it_value: to_timeval(self.timer_interval),
            };
            libc::setitimer(libc::ITIMER_REAL, &interval, std::ptr::null_mut());
        }
    }

    /// Deregisters, closes, removes from the connection table, and deletes
    /// the expiry-heap entry. All four must happen together or the heap and
    /// connection table fall out of sync with reality.
    fn teardown(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            let _ = self.heap.delete(conn.client_id);
            let _ = connection::close(conn);
        }
    }
}

fn to_timeval(d: Duration) -> libc::timeval {
    libc::timeval {
        tv_sec: d.as_secs() as libc::time_t,
        tv_usec: d.subsec_micros() as libc::suseconds_t,
    }
}

fn bind_listener(addr: SocketAddrV4, backlog: u32) -> io::Result<std::net::TcpListener> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let one: libc::c_int = 1;
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );

        let mut sockaddr: libc::sockaddr_in = std::mem::zeroed();
        sockaddr.sin_family = libc::AF_INET as libc::sa_family_t;
        sockaddr.sin_port = addr.port().to_be();
        sockaddr.sin_addr.s_addr = u32::from(*addr.ip()).to_be();

        if libc::bind(fd, &sockaddr as *const _ as *const libc::sockaddr, std::mem::size_of_val(&sockaddr) as libc::socklen_t) < 0 {
            let e = io::Error::last_os_error();
            libc::close(fd);
            return Err(e);
        }

        if libc::listen(fd, backlog as libc::c_int) < 0 {
            let e = io::Error::last_os_error();
            libc::close(fd);
            return Err(e);
        }

        Ok(std::net::TcpListener::from_raw_fd(fd))
    }
}
