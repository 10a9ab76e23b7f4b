//! End-to-end wire tests: spawn the engine in a background thread on a
//! loopback port, then drive it with a raw `std::net::TcpStream` the way
//! `tests/server_chunked.rs` drove the teacher's `Server`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

use http_engine::config::EngineConfig;
use http_engine::engine::Engine;
use http_engine::handle::RequestHandle;
use http_engine::route::HandlerFuture;
use http_engine::schema::{Schema, SlotDescriptor, SlotKind};

fn hello(handle: RequestHandle) -> HandlerFuture {
    Box::pin(async move {
        let name = handle.string(0);
        handle.write_fmt(format_args!("Hello, {name}!"));
        200
    })
}

fn upload(handle: RequestHandle) -> HandlerFuture {
    Box::pin(async move {
        match handle.read().await {
            Some(bytes) => {
                handle.write(&bytes);
                200
            }
            None => 0,
        }
    })
}

fn general_error(handle: RequestHandle) -> HandlerFuture {
    Box::pin(async move {
        if let Some(msg) = handle.arg_error_message() {
            handle.write_fmt(format_args!("bad arguments: {msg}"));
        }
        500
    })
}

/// Picks a fresh loopback port per test so parallel `cargo test` runs don't
/// collide on a fixed port the way the teacher's chunked tests did.
fn next_port() -> u16 {
    static NEXT: AtomicU16 = AtomicU16::new(18100);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Spawns an engine with `/hello`, `/upload`, and a general error handler
/// bound to a loopback port, and returns that port once the listener is up.
fn spawn_test_engine() -> u16 {
    let port = next_port();
    let config = EngineConfig { ports: vec![port], worker_threads: 1, ..EngineConfig::default() };
    let mut engine = Engine::new(config);

    engine
        .add_route("/hello", Schema::compile(vec![SlotDescriptor::new("name", SlotKind::String, false)]).unwrap(), hello)
        .unwrap();
    engine.add_route("/upload", Schema::compile(vec![]).unwrap(), upload).unwrap();
    engine.set_general_error_handler(general_error);

    thread::spawn(move || engine.listen_and_serve().unwrap());
    thread::sleep(Duration::from_millis(200));
    port
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to test engine");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

#[test]
fn simple_get_resolves_the_query_argument() {
    let port = spawn_test_engine();
    let mut stream = connect(port);
    stream.write_all(b"GET /hello?name=ada HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();

    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf).unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);

    assert!(response.starts_with("HTTP/1.1 200"), "unexpected status line: {response}");
    assert!(response.contains("Content-Length: 11"), "unexpected headers: {response}");
    assert!(response.ends_with("Hello, ada!"), "unexpected body: {response}");
}

#[test]
fn missing_route_falls_back_to_the_general_error_handler() {
    let port = spawn_test_engine();
    let mut stream = connect(port);
    stream.write_all(b"GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();

    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf).unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);

    assert!(response.starts_with("HTTP/1.1 500"), "unexpected status line: {response}");
    assert!(response.contains("Content-Length: 0"), "unexpected headers: {response}");
}

#[test]
fn pipelined_requests_get_two_in_order_responses() {
    let port = spawn_test_engine();
    let mut stream = connect(port);
    let pipeline = b"GET /hello?name=a HTTP/1.1\r\nHost: localhost\r\n\r\n\
                     GET /hello?name=b HTTP/1.1\r\nHost: localhost\r\n\r\n";
    stream.write_all(pipeline).unwrap();

    // Both responses may land in one read or across two; accumulate until
    // we've seen two status lines.
    let mut collected = String::new();
    let mut buf = [0u8; 4096];
    while collected.matches("HTTP/1.1").count() < 2 {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed before both pipelined responses arrived");
        collected.push_str(&String::from_utf8_lossy(&buf[..n]));
    }

    assert_eq!(collected.matches("Content-Length: 9").count(), 2, "responses: {collected}");
    assert!(collected.ends_with("Hello, b!"), "responses out of order: {collected}");
}

#[test]
fn body_is_readable_up_to_content_length() {
    let port = spawn_test_engine();
    let mut stream = connect(port);
    stream
        .write_all(b"POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello")
        .unwrap();

    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf).unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);

    assert!(response.starts_with("HTTP/1.1 200"), "unexpected status line: {response}");
    assert!(response.contains("Content-Length: 5"), "unexpected headers: {response}");
    assert!(response.ends_with("hello"), "unexpected body: {response}");
}

#[test]
fn connection_dropped_mid_body_closes_without_a_response() {
    let port = spawn_test_engine();
    let mut stream = connect(port);
    stream
        .write_all(b"POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Length: 100\r\n\r\nhell")
        .unwrap();
    drop(stream); // FIN after only 4 of the promised 100 body bytes

    // The engine must keep serving other connections after this one aborts.
    let port2 = port;
    let mut next = connect(port2);
    next.write_all(b"GET /hello?name=still-alive HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    let mut buf = [0u8; 4096];
    let n = next.read(&mut buf).unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);
    assert!(response.starts_with("HTTP/1.1 200"), "engine stopped serving after a dropped connection: {response}");
}

#[test]
fn oversize_query_closes_the_connection_without_a_response() {
    let port = spawn_test_engine();
    let mut stream = connect(port);
    let oversized_query = "a".repeat(9000);
    let request = format!("GET /hello?{oversized_query} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    stream.write_all(request.as_bytes()).unwrap();

    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "expected connection close, got bytes: {:?}", &buf[..n]);

    // The engine keeps serving other connections after the hard protocol error.
    let mut next = connect(port);
    next.write_all(b"GET /hello?name=ok HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    let n2 = next.read(&mut buf).unwrap();
    let response = String::from_utf8_lossy(&buf[..n2]);
    assert!(response.starts_with("HTTP/1.1 200"), "engine stopped serving after an oversized query: {response}");
}
