//! TCP socket leaves: state rules, connect, shutdown, and interrupts.

use std::net::{IpAddr, Ipv4Addr, TcpListener};

use eventide::tcp::{Protocol, Socket, SocketError};
use eventide::{terminate, EventLoop, Eventual, Interrupt};

fn run_op(loop_: &EventLoop, op: Eventual<(), ()>) -> Result<(), String> {
    let (future, chain) = terminate(op);
    chain.start();
    loop_.run_until(&future);
    future.get().map_err(|aborted| {
        aborted
            .fault()
            .map(|fault| fault.to_string())
            .unwrap_or_else(|| String::from("stopped"))
    })
}

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[test]
fn open_twice_fails() {
    let loop_ = EventLoop::new();
    let socket = Socket::with_loop(Protocol::V4, loop_.clone());

    run_op(&loop_, socket.open()).unwrap();
    assert!(socket.is_open());

    let error = run_op(&loop_, socket.open()).unwrap_err();
    assert!(error.contains("already open"), "unexpected error: {error}");

    run_op(&loop_, socket.close()).unwrap();
    assert!(!socket.is_open());
}

#[test]
fn bind_requires_an_open_socket() {
    let loop_ = EventLoop::new();
    let socket = Socket::with_loop(Protocol::V4, loop_.clone());

    let error = run_op(&loop_, socket.bind(LOCALHOST, 0)).unwrap_err();
    assert!(error.contains("closed"), "unexpected error: {error}");
}

#[test]
fn shutdown_requires_an_open_socket() {
    let loop_ = EventLoop::new();
    let socket = Socket::with_loop(Protocol::V4, loop_.clone());

    let error = run_op(&loop_, socket.shutdown(eventide::tcp::ShutdownType::Both)).unwrap_err();
    assert!(error.contains("closed"), "unexpected error: {error}");
}

#[test]
fn close_requires_an_open_socket() {
    let loop_ = EventLoop::new();
    let socket = Socket::with_loop(Protocol::V4, loop_.clone());

    assert!(run_op(&loop_, socket.close()).is_err());
}

#[test]
fn connect_reaches_a_local_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let loop_ = EventLoop::new();
    let socket = Socket::with_loop(Protocol::V4, loop_.clone());

    run_op(&loop_, socket.open()).unwrap();
    run_op(&loop_, socket.connect(LOCALHOST, port)).unwrap();

    let error = run_op(&loop_, socket.connect(LOCALHOST, port)).unwrap_err();
    assert!(error.contains("already connected"), "unexpected error: {error}");

    run_op(&loop_, socket.shutdown(eventide::tcp::ShutdownType::Both)).unwrap();
    run_op(&loop_, socket.close()).unwrap();
}

#[test]
fn bind_then_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let loop_ = EventLoop::new();
    let socket = Socket::with_loop(Protocol::V4, loop_.clone());

    run_op(&loop_, socket.open()).unwrap();
    run_op(&loop_, socket.bind(LOCALHOST, 0)).unwrap();
    run_op(&loop_, socket.connect(LOCALHOST, port)).unwrap();
    run_op(&loop_, socket.close()).unwrap();
}

#[test]
fn connect_on_a_closed_socket_fails() {
    let loop_ = EventLoop::new();
    let socket = Socket::with_loop(Protocol::V4, loop_.clone());

    let error = run_op(&loop_, socket.connect(LOCALHOST, 1)).unwrap_err();
    assert!(error.contains("closed"), "unexpected error: {error}");
}

#[test]
fn interrupt_before_start_stops_the_operation() {
    let loop_ = EventLoop::new();
    let socket = Socket::with_loop(Protocol::V4, loop_.clone());
    run_op(&loop_, socket.open()).unwrap();

    let (future, mut chain) = terminate(socket.connect(LOCALHOST, 9));
    let interrupt = Interrupt::new();
    chain.register(&interrupt);
    interrupt.trigger();
    chain.start();
    loop_.run_until(&future);
    assert!(future.get().unwrap_err().is_stopped());

    run_op(&loop_, socket.close()).unwrap();
}

#[test]
fn socket_errors_render_their_message() {
    let error = SocketError::from(std::io::Error::other("boom"));
    assert_eq!(error.to_string(), "boom");
}
