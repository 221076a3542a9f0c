use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rampart::auth::DenyAll;
use rampart::http::connection::{ConnContext, Connection};

fn temp_root(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("rampart-conn-{}-{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    root
}

/// Loopback pair: a blocking client stream and a nonblocking server-side
/// connection, the way the scheduler would hand it to a worker.
fn setup(root: PathBuf, edge_triggered: bool) -> (TcpStream, Connection, Arc<ConnContext>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (stream, addr) = listener.accept().unwrap();
    stream.set_nonblocking(true).unwrap();

    let ctx = Arc::new(ConnContext::new(root, edge_triggered, Arc::new(DenyAll)));
    let conn = Connection::new(stream, addr, Arc::clone(&ctx));
    (client, conn, ctx)
}

/// Retry until the racing client write becomes visible to the server.
fn drain_read(conn: &mut Connection) -> usize {
    for _ in 0..100 {
        match conn.read() {
            Ok(0) => return 0,
            Ok(n) => return n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("read failed: {e}"),
        }
    }
    panic!("no data arrived");
}

fn drain_write(conn: &mut Connection) {
    while conn.to_write_bytes() > 0 {
        match conn.write() {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("write failed: {e}"),
        }
    }
}

/// Read one complete response off the blocking client socket.
fn read_response(client: &mut TcpStream) -> (String, Vec<u8>) {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 4096];
    let split = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = client.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before headers finished");
        raw.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    let content_length: usize = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .unwrap()
        .parse()
        .unwrap();

    let mut body = raw[split + 4..].to_vec();
    while body.len() < content_length {
        let n = client.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before body finished");
        body.extend_from_slice(&chunk[..n]);
    }
    (head, body)
}

#[test]
fn test_full_exchange_serves_mapped_file() {
    let root = temp_root("exchange");
    let content = vec![b'x'; 5000];
    fs::write(root.join("index.html"), &content).unwrap();

    let (mut client, mut conn, _ctx) = setup(root, true);
    client
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: t\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();

    assert!(drain_read(&mut conn) > 0);
    assert!(conn.process());
    // header bytes plus the whole mapped file are pending
    assert!(conn.to_write_bytes() > content.len());
    drain_write(&mut conn);

    let (head, body) = read_response(&mut client);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("Content-Type: text/html"));
    assert_eq!(body, content);
    assert!(conn.is_keep_alive());
}

#[test]
fn test_keep_alive_connection_serves_second_request() {
    let root = temp_root("keepalive");
    fs::write(root.join("index.html"), b"front page").unwrap();
    fs::write(root.join("welcome.html"), b"welcome!").unwrap();

    let (mut client, mut conn, _ctx) = setup(root, true);

    client
        .write_all(b"GET / HTTP/1.1\r\nHost: t\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    drain_read(&mut conn);
    assert!(conn.process());
    drain_write(&mut conn);
    let (head, body) = read_response(&mut client);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"front page");

    assert!(conn.is_keep_alive());
    conn.finish_request();

    client
        .write_all(b"GET /welcome HTTP/1.1\r\nHost: t\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    drain_read(&mut conn);
    assert!(conn.process());
    drain_write(&mut conn);
    let (head, body) = read_response(&mut client);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"welcome!");
}

#[test]
fn test_bad_request_answers_400_and_closes() {
    let root = temp_root("badreq");

    let (mut client, mut conn, _ctx) = setup(root, true);
    client.write_all(b"garbage\r\n\r\n").unwrap();

    drain_read(&mut conn);
    assert!(conn.process());
    drain_write(&mut conn);

    let (head, _body) = read_response(&mut client);
    assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
    assert!(head.contains("Connection: close"));
    assert!(!conn.is_keep_alive());
}

#[test]
fn test_process_reports_not_ready_until_request_completes() {
    let root = temp_root("partial");
    fs::write(root.join("index.html"), b"page").unwrap();

    let (mut client, mut conn, _ctx) = setup(root, true);

    assert!(!conn.process(), "empty inbound buffer is not ready");

    client.write_all(b"GET / HTTP/1.1\r\nHo").unwrap();
    drain_read(&mut conn);
    assert!(!conn.process(), "half a request is not ready");

    client.write_all(b"st: t\r\n\r\n").unwrap();
    drain_read(&mut conn);
    assert!(conn.process());
    drain_write(&mut conn);

    let (head, body) = read_response(&mut client);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"page");
}

#[test]
fn test_read_reports_end_of_stream() {
    let root = temp_root("eof");
    let (client, mut conn, _ctx) = setup(root, true);
    drop(client);

    // retry until the FIN lands
    for _ in 0..100 {
        match conn.read() {
            Ok(0) => return,
            Ok(_) => panic!("unexpected data"),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("read failed: {e}"),
        }
    }
    panic!("end-of-stream never observed");
}

#[test]
fn test_connection_counter_tracks_open_and_close() {
    let root = temp_root("counter");
    let (_client, mut conn, ctx) = setup(root, true);
    assert_eq!(ctx.active(), 1);

    conn.close();
    assert_eq!(ctx.active(), 0);
    assert!(!conn.is_open());

    // closing twice must not decrement again
    conn.close();
    assert_eq!(ctx.active(), 0);
}

#[test]
fn test_drop_closes_exactly_once() {
    let root = temp_root("drop");
    let (_client, mut conn, ctx) = setup(root, true);
    conn.close();
    drop(conn);
    assert_eq!(ctx.active(), 0);
}
