//! URL transfers: builders, a local mock server, timeouts, and interrupts.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use eventide::http::{self, Certificate, Client, Method, Request};
use eventide::{terminate, EventLoop, Interrupt};

#[test]
fn request_builder_records_every_field() {
    let request = Request::builder()
        .uri("http://example.com/")
        .method(Method::Post)
        .timeout(Duration::from_secs(2))
        .header("x-test", "yes")
        .fields(vec![(String::from("title"), String::from("test"))])
        .verify_peer(false)
        .certificate(Certificate::from_pem("-----BEGIN CERTIFICATE-----"))
        .build();

    assert_eq!(request.uri(), "http://example.com/");
    assert_eq!(request.method(), Method::Post);
    assert_eq!(request.timeout(), Duration::from_secs(2));
    assert_eq!(request.headers(), &[(String::from("x-test"), String::from("yes"))]);
    assert_eq!(request.fields().len(), 1);
    assert!(!request.verify_peer());
    assert!(request.certificate().is_some());
}

// One test drives every scenario that needs the process-wide default loop,
// since tests in this binary run concurrently.
#[test]
fn transfers_against_a_local_server() {
    EventLoop::construct_default();
    let loop_ = EventLoop::default_loop();

    // A GET served by a minimal local HTTP server.
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_headers(&mut stream);
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      Content-Length: 25\r\n\
                      Connection: close\r\n\
                      \r\n\
                      <html>Hello World!</html>",
                )
                .unwrap();
        });

        let e = http::get(format!("http://127.0.0.1:{port}/"), Duration::ZERO);
        let (future, chain) = terminate(e);
        chain.start();
        loop_.run_until(&future);

        let response = future.get().unwrap();
        assert_eq!(response.code, 200);
        assert_eq!(response.body, b"<html>Hello World!</html>");
        server.join().unwrap();
    }

    // A transfer against a server that never answers times out.
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let e = http::get(format!("http://127.0.0.1:{port}/"), Duration::from_millis(100));
        let (future, chain) = terminate(e);
        chain.start();
        loop_.run_until(&future);

        let aborted = future.get().unwrap_err();
        let message = aborted.fault().expect("expected a failure").to_string();
        assert!(message.to_lowercase().contains("timeout"), "unexpected error: {message}");
        drop(listener);
    }

    // An interrupt triggered after starting stops the transfer.
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let e = http::get(format!("http://127.0.0.1:{port}/"), Duration::ZERO);
        let (future, mut chain) = terminate(e);
        let interrupt = Interrupt::new();
        chain.register(&interrupt);
        chain.start();
        interrupt.trigger();
        loop_.run_until(&future);
        assert!(future.get().unwrap_err().is_stopped());
        drop(listener);
    }

    // A POST with URL-encoded fields.
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_headers(&mut stream);
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      Content-Length: 2\r\n\
                      Connection: close\r\n\
                      \r\n\
                      ok",
                )
                .unwrap();
            request
        });

        let client = Client::builder().verify_peer(false).build();
        let e = client.post(
            format!("http://127.0.0.1:{port}/submit"),
            vec![
                (String::from("title"), String::from("a b")),
                (String::from("body"), String::from("message")),
            ],
            Duration::ZERO,
        );
        let (future, chain) = terminate(e);
        chain.start();
        loop_.run_until(&future);

        let response = future.get().unwrap();
        assert_eq!(response.code, 200);

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /submit"), "unexpected request: {request}");
        assert!(request.contains("title=a%20b&body=message"), "unexpected request: {request}");
    }

    EventLoop::destruct_default();
}

// Reads until the body has arrived (headers plus any content-length bytes).
fn read_headers(stream: &mut std::net::TcpStream) -> String {
    let mut data = Vec::new();
    let mut buffer = [0u8; 1024];
    loop {
        let n = stream.read(&mut buffer).unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);
        if let Some(end) = find_blank_line(&data) {
            let headers = String::from_utf8_lossy(&data[..end]).to_string();
            let expected = content_length(&headers);
            if data.len() >= end + 4 + expected {
                return String::from_utf8_lossy(&data).to_string();
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

fn find_blank_line(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|window| window == b"\r\n\r\n")
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0)
}
