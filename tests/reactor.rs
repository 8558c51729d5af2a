//! End-to-end tests: a real event loop on a loopback socket, driven by
//! blocking clients.

use framekv::protocol::{request, Response, Status, HEADER_SIZE};
use framekv::{server, EventLoop, LoopOptions, Store};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

/// Start an event loop on an ephemeral port in a background thread.
fn start_server(options: LoopOptions) -> SocketAddr {
    let listener = server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let mut event_loop = EventLoop::new(listener, Store::new(), options).unwrap();
    let addr = event_loop.local_addr().unwrap();
    thread::spawn(move || {
        let _ = event_loop.run();
    });
    addr
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

fn read_response(stream: &mut TcpStream) -> Response {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).unwrap();
    let len = u32::from_le_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).unwrap();
    Response::parse(&payload).unwrap()
}

fn call(stream: &mut TcpStream, args: &[&str]) -> Response {
    stream.write_all(&request::encode(args)).unwrap();
    read_response(stream)
}

/// True once the peer has closed the connection.
fn is_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 1];
    match stream.read(&mut buf) {
        Ok(0) => true,
        Err(e) if e.kind() == ErrorKind::ConnectionReset => true,
        _ => false,
    }
}

#[test]
fn test_set_get_del_scenario() {
    let addr = start_server(LoopOptions::default());
    let mut client = connect(addr);

    let resp = call(&mut client, &["set", "a", "1"]);
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(&resp.data[..], b"1");

    let resp = call(&mut client, &["get", "a"]);
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(&resp.data[..], b"1");

    let resp = call(&mut client, &["del", "a"]);
    assert_eq!(resp.status, Status::Ok);
    assert!(resp.data.is_empty());

    let resp = call(&mut client, &["get", "a"]);
    assert_eq!(resp.status, Status::NotFound);
    assert!(resp.data.is_empty());
}

#[test]
fn test_pipelined_requests_in_one_write() {
    let addr = start_server(LoopOptions::default());
    let mut client = connect(addr);

    let mut batch = Vec::new();
    batch.extend_from_slice(&request::encode(&["set", "k", "v1"]));
    batch.extend_from_slice(&request::encode(&["set", "k", "v2"]));
    batch.extend_from_slice(&request::encode(&["get", "k"]));
    client.write_all(&batch).unwrap();

    assert_eq!(&read_response(&mut client).data[..], b"v1");
    assert_eq!(&read_response(&mut client).data[..], b"v2");
    let resp = read_response(&mut client);
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(&resp.data[..], b"v2");
}

#[test]
fn test_request_sent_one_byte_at_a_time() {
    let addr = start_server(LoopOptions::default());
    let mut client = connect(addr);

    let frame = request::encode(&["set", "slow", "value"]);
    for byte in &frame {
        client.write_all(&[*byte]).unwrap();
        client.flush().unwrap();
    }

    let resp = read_response(&mut client);
    assert_eq!(resp, Response::ok(bytes_of("value")));
}

#[test]
fn test_unknown_command_keeps_connection() {
    let addr = start_server(LoopOptions::default());
    let mut client = connect(addr);

    assert_eq!(call(&mut client, &["ping"]).status, Status::Err);
    assert_eq!(call(&mut client, &["GET", "x"]).status, Status::Err);
    assert_eq!(call(&mut client, &["get", "x"]).status, Status::NotFound);
}

#[test]
fn test_store_shared_between_connections() {
    let addr = start_server(LoopOptions::default());
    let mut writer = connect(addr);
    let mut reader = connect(addr);

    call(&mut writer, &["set", "shared", "yes"]);
    let resp = call(&mut reader, &["get", "shared"]);
    assert_eq!(&resp.data[..], b"yes");
}

#[test]
fn test_oversized_frame_closes_only_that_connection() {
    let addr = start_server(LoopOptions::default());
    let mut good = connect(addr);
    let mut bad = connect(addr);

    call(&mut good, &["set", "k", "v"]);

    // Declares far more than the 4096 byte limit and sends nothing else.
    bad.write_all(&(1u32 << 30).to_le_bytes()).unwrap();
    assert!(is_closed(&mut bad));

    let resp = call(&mut good, &["get", "k"]);
    assert_eq!(&resp.data[..], b"v");
}

#[test]
fn test_too_many_arguments_closes_connection() {
    let options = LoopOptions {
        limits: framekv::protocol::Limits {
            max_message: 4096,
            max_args: 2,
        },
        ..LoopOptions::default()
    };
    let addr = start_server(options);
    let mut client = connect(addr);

    assert_eq!(call(&mut client, &["get", "k"]).status, Status::NotFound);
    client
        .write_all(&request::encode(&["set", "k", "v"]))
        .unwrap();
    assert!(is_closed(&mut client));
}

#[test]
fn test_largest_value_round_trips() {
    let addr = start_server(LoopOptions::default());
    let mut client = connect(addr);

    // Payload: argc + 3 length fields + "set" + "k" + value = 4096
    let value = "x".repeat(4096 - 4 - 12 - 3 - 1);
    let resp = call(&mut client, &["set", "k", value.as_str()]);
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(resp.data.len(), value.len());

    let resp = call(&mut client, &["get", "k"]);
    assert_eq!(&resp.data[..], value.as_bytes());
}

#[test]
fn test_slow_reader_gets_every_response_in_order() {
    let addr = start_server(LoopOptions::default());
    let mut client = connect(addr);

    let value = "v".repeat(3000);
    call(&mut client, &["set", "big", value.as_str()]);

    // Enough output to fill the socket buffers while nobody reads.
    const COUNT: usize = 2000;
    let mut writer = client.try_clone().unwrap();
    let sender = thread::spawn(move || {
        for i in 0..COUNT {
            let key = if i % 2 == 0 { "big" } else { "missing" };
            writer.write_all(&request::encode(&["get", key])).unwrap();
        }
    });

    thread::sleep(Duration::from_millis(50));
    for i in 0..COUNT {
        let resp = read_response(&mut client);
        if i % 2 == 0 {
            assert_eq!(resp.status, Status::Ok);
            assert_eq!(resp.data.len(), 3000);
        } else {
            assert_eq!(resp.status, Status::NotFound);
        }
    }
    sender.join().unwrap();
}

#[test]
fn test_peer_close_mid_message() {
    let addr = start_server(LoopOptions::default());
    let mut client = connect(addr);
    let frame = request::encode(&["set", "half", "written"]);
    client.write_all(&frame[..frame.len() / 2]).unwrap();
    drop(client);

    // The server keeps serving others and never applied the partial request.
    let mut other = connect(addr);
    assert_eq!(call(&mut other, &["get", "half"]).status, Status::NotFound);
}

fn bytes_of(s: &'static str) -> bytes::Bytes {
    bytes::Bytes::from_static(s.as_bytes())
}
