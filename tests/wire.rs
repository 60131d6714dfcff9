//! Raw socket tests against a running server.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use common::*;
use fastbin_rpc::{Dispatcher, Error, Fault, Frame, FrameCodec, MsgPackSerialization, SerializationStrategy};

fn connect(pair: &Pair) -> TcpStream {
    // ---
    let addr = pair.server.local_addr().unwrap();
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    stream
}

fn send(stream: &mut TcpStream, correlation: u64, body: BytesMut) {
    // ---
    let mut buf = BytesMut::new();
    FrameCodec::default()
        .encode(Frame::new(correlation, body.freeze()), &mut buf)
        .unwrap();
    stream.write_all(&buf).unwrap();
}

fn receive(stream: &mut TcpStream) -> Frame {
    // ---
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();
    loop {
        if let Some(frame) = codec.decode(&mut buf).unwrap() {
            return frame;
        }
        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "server closed the connection");
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn hello_request(version: u16, name: &str) -> BytesMut {
    // ---
    let mut body = BytesMut::new();
    body.put_u16(version);
    MsgPackSerialization::default()
        .encode_request("svc", "hello", &(name,), &mut body)
        .unwrap();
    body
}

fn decode(body: Bytes) -> fastbin_rpc::Result<Result<String, TestError>> {
    // ---
    let mut body = body;
    let mut outcome = None;
    MsgPackSerialization::default().decode_response::<String, TestError, _>(&mut body, |r| outcome = Some(r));
    outcome.unwrap()
}

#[test]
fn test_version_is_rejected_before_payload_is_read() {
    // ---
    init_logging();
    let pair = Pair::msgpack(Dispatcher::new(2).unwrap());
    let mut stream = connect(&pair);

    // 0xc1 is never valid MessagePack
    let mut body = BytesMut::new();
    body.put_u16(300);
    body.put_slice(&[0xc1, 0xc1, 0xc1]);
    send(&mut stream, 41, body);

    let response = receive(&mut stream);
    assert_eq!(response.correlation, 41);
    let err = decode(response.body).unwrap_err();
    assert!(matches!(
        err,
        Error::Fault(Fault::UnsupportedVersion { received: 300, supported: 1 })
    ));
    assert_eq!(pair.service.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_pipelined_requests_answer_in_order() {
    // ---
    init_logging();
    let pair = Pair::msgpack(Dispatcher::new(4).unwrap());
    let mut stream = connect(&pair);

    for (correlation, name) in [(7u64, "a"), (3, "b"), (900, "c")] {
        send(&mut stream, correlation, hello_request(1, name));
    }

    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();
    while frames.len() < 3 {
        match codec.decode(&mut buf).unwrap() {
            Some(frame) => frames.push(frame),
            None => {
                let mut chunk = [0u8; 1024];
                let n = stream.read(&mut chunk).unwrap();
                assert!(n > 0, "server closed the connection");
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }

    let answers: Vec<_> = frames
        .into_iter()
        .map(|f| (f.correlation, decode(f.body).unwrap().unwrap()))
        .collect();
    assert_eq!(
        answers,
        vec![
            (7, "Hello a!".to_string()),
            (3, "Hello b!".to_string()),
            (900, "Hello c!".to_string()),
        ]
    );
}

#[test]
fn test_malformed_bodies_get_faults_and_connection_survives() {
    // ---
    init_logging();
    let pair = Pair::msgpack(Dispatcher::new(2).unwrap());
    let mut stream = connect(&pair);

    // Too short for the version header
    let mut body = BytesMut::new();
    body.put_u8(1);
    send(&mut stream, 1, body);
    assert!(matches!(
        decode(receive(&mut stream).body),
        Err(Error::Fault(Fault::Remote(_)))
    ));

    // Valid version, garbage header
    let mut body = BytesMut::new();
    body.put_u16(1);
    body.put_slice(&[0xc1]);
    send(&mut stream, 2, body);
    assert!(matches!(
        decode(receive(&mut stream).body),
        Err(Error::Fault(Fault::Remote(_)))
    ));

    send(&mut stream, 3, hello_request(1, "ok"));
    let response = receive(&mut stream);
    assert_eq!(response.correlation, 3);
    assert_eq!(decode(response.body).unwrap(), Ok("Hello ok!".to_string()));
}
