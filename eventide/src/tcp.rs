//! TCP socket leaves: each socket operation is a composable that posts its
//! work onto the event loop.

use std::io;
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::{Interest, Token};
use socket2::{Domain, Socket as RawSocket, Type};
use thiserror::Error;

use eventide_core::{Callback, Eventual, Interrupt};

use crate::event_loop::EventLoop;
use crate::resolver::{eventual_interruptible, Resolver};

/// The address family a socket speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

/// Which direction of a connected socket to shut down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownType {
    /// Shut down the send side.
    Send,
    /// Shut down the receive side.
    Receive,
    /// Shut down both sides.
    Both,
}

/// A socket operation failure carrying the underlying OS message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SocketError(String);

impl SocketError {
    fn new(message: impl Into<String>) -> Self {
        SocketError(message.into())
    }
}

impl From<io::Error> for SocketError {
    fn from(error: io::Error) -> Self {
        SocketError(error.to_string())
    }
}

struct SocketState {
    raw: Option<RawSocket>,
    connected: bool,
}

struct SocketInner {
    loop_: EventLoop,
    protocol: Protocol,
    is_open: AtomicBool,
    // Touched only from the loop thread.
    state: Mutex<SocketState>,
}

/// An asynchronous TCP socket on an event loop.
///
/// Every operation returns a composable; nothing touches the OS socket
/// until the composable is started, and all socket access happens on the
/// loop thread.
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    /// Creates a socket on the default event loop.
    pub fn new(protocol: Protocol) -> Socket {
        Socket::with_loop(protocol, EventLoop::default_loop())
    }

    /// Creates a socket on `loop_`.
    pub fn with_loop(protocol: Protocol, loop_: EventLoop) -> Socket {
        Socket {
            inner: Arc::new(SocketInner {
                loop_,
                protocol,
                is_open: AtomicBool::new(false),
                state: Mutex::new(SocketState { raw: None, connected: false }),
            }),
        }
    }

    /// True once `open` has succeeded and before `close`.
    pub fn is_open(&self) -> bool {
        self.inner.is_open.load(Ordering::SeqCst)
    }

    /// Opens the OS socket. Fails when the socket is already open.
    pub fn open(&self) -> Eventual<(), ()> {
        self.submit_op("tcp open", move |inner: &SocketInner| {
            if inner.is_open.load(Ordering::SeqCst) {
                return Err(SocketError::new("socket is already open"));
            }
            let domain = match inner.protocol {
                Protocol::V4 => Domain::IPV4,
                Protocol::V6 => Domain::IPV6,
            };
            let raw = RawSocket::new(domain, Type::STREAM, Some(socket2::Protocol::TCP))
                .map_err(SocketError::from)?;
            raw.set_nonblocking(true).map_err(SocketError::from)?;
            inner.state.lock().unwrap().raw = Some(raw);
            inner.is_open.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Binds the open socket to a local address. Fails when the socket is
    /// closed or already connected.
    pub fn bind(&self, ip: IpAddr, port: u16) -> Eventual<(), ()> {
        self.submit_op("tcp bind", move |inner: &SocketInner| {
            let state = inner.state.lock().unwrap();
            let raw = state.raw.as_ref().ok_or_else(|| SocketError::new("socket is closed"))?;
            if state.connected {
                return Err(SocketError::new("bind is forbidden while the socket is connected"));
            }
            let address = SocketAddr::new(ip, port);
            raw.bind(&address.into()).map_err(SocketError::from)
        })
    }

    /// Connects the open socket to a remote address. Fails when the socket
    /// is closed or already connected; honors interrupts by cancelling the
    /// outstanding connect.
    pub fn connect(&self, ip: IpAddr, port: u16) -> Eventual<(), ()> {
        let inner = self.inner.clone();
        let loop_ = inner.loop_.clone();
        eventual_interruptible(move |resolver: Resolver<()>, interrupt: Interrupt| {
            let attempt = Arc::new(Mutex::new(Attempt {
                completed: false,
                registration: None,
            }));

            {
                let attempt = attempt.clone();
                let loop_ = loop_.clone();
                let resolver = resolver.clone();
                interrupt.install(move || {
                    let context = loop_.context("tcp connect (interrupt)");
                    let inner_loop = loop_.clone();
                    loop_.submit(
                        Callback::new(move || {
                            let mut attempt = attempt.lock().unwrap();
                            if attempt.completed {
                                return;
                            }
                            attempt.completed = true;
                            if let Some((token, fd)) = attempt.registration.take() {
                                inner_loop.deregister_fd(token, fd);
                            }
                            drop(attempt);
                            resolver.stop();
                        }),
                        &context,
                    );
                });
            }

            let context = loop_.context("tcp connect");
            let submit_loop = loop_.clone();
            loop_.submit(
                Callback::new(move || {
                    connect_on_loop(submit_loop, inner, attempt, resolver, interrupt, ip, port);
                }),
                &context,
            );
        })
    }

    /// Shuts down a direction of the connected socket. Fails when the
    /// socket is closed.
    pub fn shutdown(&self, kind: ShutdownType) -> Eventual<(), ()> {
        self.submit_op("tcp shutdown", move |inner: &SocketInner| {
            if !inner.is_open.load(Ordering::SeqCst) {
                return Err(SocketError::new("socket is closed"));
            }
            let state = inner.state.lock().unwrap();
            let raw = state.raw.as_ref().ok_or_else(|| SocketError::new("socket is closed"))?;
            let how = match kind {
                ShutdownType::Send => Shutdown::Write,
                ShutdownType::Receive => Shutdown::Read,
                ShutdownType::Both => Shutdown::Both,
            };
            raw.shutdown(how).map_err(SocketError::from)
        })
    }

    /// Closes the socket, releasing the OS handle. Fails when the socket is
    /// closed.
    pub fn close(&self) -> Eventual<(), ()> {
        self.submit_op("tcp close", move |inner: &SocketInner| {
            let mut state = inner.state.lock().unwrap();
            if state.raw.take().is_none() {
                return Err(SocketError::new("socket is closed"));
            }
            state.connected = false;
            inner.is_open.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    // The shape every synchronous operation shares: hop onto the loop,
    // honor a pre-start interrupt, then run `op` against the socket.
    fn submit_op(
        &self,
        name: &'static str,
        op: impl FnOnce(&SocketInner) -> Result<(), SocketError> + Send + 'static,
    ) -> Eventual<(), ()> {
        let inner = self.inner.clone();
        let loop_ = inner.loop_.clone();
        eventual_interruptible(move |resolver: Resolver<()>, interrupt: Interrupt| {
            let context = loop_.context(name);
            loop_.submit(
                Callback::new(move || {
                    if interrupt.triggered() {
                        resolver.stop();
                        return;
                    }
                    match op(&inner) {
                        Ok(()) => resolver.resolve(()),
                        Err(error) => resolver.fail(error),
                    }
                }),
                &context,
            );
        })
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.is_open() && Arc::strong_count(&self.inner) == 1 {
            tracing::warn!("socket dropped while still open");
        }
    }
}

struct Attempt {
    completed: bool,
    registration: Option<(Token, std::os::fd::RawFd)>,
}

fn connect_on_loop(
    loop_: EventLoop,
    inner: Arc<SocketInner>,
    attempt: Arc<Mutex<Attempt>>,
    resolver: Resolver<()>,
    interrupt: Interrupt,
    ip: IpAddr,
    port: u16,
) {
    let mut guard = attempt.lock().unwrap();
    if guard.completed {
        return;
    }
    if interrupt.triggered() {
        guard.completed = true;
        drop(guard);
        resolver.stop();
        return;
    }

    let address = SocketAddr::new(ip, port);
    let connect_result = {
        let state = inner.state.lock().unwrap();
        let Some(raw) = state.raw.as_ref() else {
            guard.completed = true;
            drop(guard);
            resolver.fail(SocketError::new("socket is closed"));
            return;
        };
        if state.connected {
            guard.completed = true;
            drop(guard);
            resolver.fail(SocketError::new("socket is already connected"));
            return;
        }
        raw.connect(&address.into()).map(|()| raw.as_raw_fd()).map_err(|error| {
            (error, state.raw.as_ref().map(|raw| raw.as_raw_fd()))
        })
    };

    match connect_result {
        Ok(_fd) => {
            inner.state.lock().unwrap().connected = true;
            guard.completed = true;
            drop(guard);
            resolver.resolve(());
        }
        Err((error, Some(fd))) if in_progress(&error) => {
            // Wait for writability, then read the connect outcome.
            let ready_attempt = attempt.clone();
            let ready_loop = loop_.clone();
            let token = loop_.register_fd(
                fd,
                Interest::WRITABLE,
                Box::new(move |_readiness| {
                    let mut attempt = ready_attempt.lock().unwrap();
                    if attempt.completed {
                        return;
                    }
                    attempt.completed = true;
                    if let Some((token, fd)) = attempt.registration.take() {
                        ready_loop.deregister_fd(token, fd);
                    }
                    drop(attempt);
                    let outcome = {
                        let mut state = inner.state.lock().unwrap();
                        match state.raw.as_ref().map(|raw| raw.take_error()) {
                            Some(Ok(None)) => {
                                state.connected = true;
                                Ok(())
                            }
                            Some(Ok(Some(error))) => Err(SocketError::from(error)),
                            Some(Err(error)) => Err(SocketError::from(error)),
                            None => Err(SocketError::new("socket is closed")),
                        }
                    };
                    match outcome {
                        Ok(()) => resolver.resolve(()),
                        Err(error) => resolver.fail(error),
                    }
                }),
            );
            guard.registration = Some((token, fd));
        }
        Err((error, _)) => {
            guard.completed = true;
            drop(guard);
            resolver.fail(SocketError::from(error));
        }
    }
}

fn in_progress(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == Some(libc::EINPROGRESS)
}
