//! Scripted camera → Unix socket → consumer, checked byte for byte
//!
//! Run: `cargo test --test socket_roundtrip`

mod common;

use std::io::Read;
use std::os::unix::net::UnixListener;
use std::thread;

use boson_relay::pipeline::launch;
use boson_relay::transport::SocketTransport;
use boson_relay::Error;

use common::{config, new_log, script, MockCamera};

/// Accept one connection and read until the relay hangs up.
fn consumer(listener: UnixListener) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    })
}

fn split_header(stream: &[u8]) -> (String, &[u8]) {
    let end = stream
        .windows(2)
        .position(|w| w == b"\n\n")
        .expect("header terminator")
        + 2;
    let header = String::from_utf8(stream[..end].to_vec()).unwrap();
    (header, &stream[end..])
}

fn header_field(header: &str, key: &str) -> usize {
    header
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{key}: ")))
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| panic!("no numeric {key} in {header:?}"))
}

#[test]
fn consumer_reconstructs_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.sock");
    let reader = consumer(UnixListener::bind(&path).unwrap());

    let (width, height) = (16, 8);
    let frames = script(12, width, height);
    let camera = MockCamera::new(frames.clone(), new_log());

    let mut relay = launch(camera, &config(width, height, 2), || {
        SocketTransport::connect(&path)
    })
    .unwrap();
    for _ in 0..frames.len() {
        relay.step().unwrap();
    }
    let (_camera, transport) = relay.into_parts();
    let sent = transport.bytes_sent();
    drop(transport);

    let received = reader.join().unwrap();
    assert_eq!(received.len() as u64, sent);

    let (header, body) = split_header(&received);
    let frame_size = header_field(&header, "FrameSize");
    assert_eq!(frame_size, (width * height * 2) as usize);
    assert_eq!(header_field(&header, "ResX"), width as usize);
    assert_eq!(header_field(&header, "ResY"), height as usize);
    assert_eq!(header_field(&header, "PixelBits"), 16);
    assert!(header.starts_with("Brand: flir\nModel: boson\n"));

    assert_eq!(received.len(), header.len() + frames.len() * frame_size);
    let chunks: Vec<Vec<u8>> = body.chunks(frame_size).map(<[u8]>::to_vec).collect();
    assert_eq!(chunks, frames);
}

#[test]
fn boson_640_stream_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("boson.sock");
    let reader = consumer(UnixListener::bind(&path).unwrap());

    let frames = script(3, 640, 512);
    let camera = MockCamera::new(frames.clone(), new_log());

    let mut relay = launch(camera, &config(640, 512, 2), || SocketTransport::connect(&path)).unwrap();
    for _ in 0..frames.len() {
        relay.step().unwrap();
    }
    drop(relay);

    let received = reader.join().unwrap();
    let expected_header: &[u8] =
        b"Brand: flir\nModel: boson\nResX: 640\nResY: 512\nFPS: 60\nFrameSize: 655360\nPixelBits: 16\n\n";
    assert!(received.starts_with(expected_header));
    assert_eq!(received.len(), expected_header.len() + 3 * 655_360);
    assert_eq!(&received[expected_header.len() + 655_360..][..655_360], &frames[1][..]);
}

#[test]
fn missing_consumer_is_transport_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = SocketTransport::connect(dir.path().join("nobody.sock")).err().unwrap();
    assert!(matches!(err, Error::TransportUnavailable { .. }));
}

#[test]
fn consumer_hangup_is_send_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hangup.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let closer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut header = [0u8; 16];
        stream.read_exact(&mut header).unwrap();
    });

    let camera = MockCamera::new(script(64, 128, 128), new_log());
    let mut relay = launch(camera, &config(128, 128, 2), || SocketTransport::connect(&path)).unwrap();
    closer.join().unwrap();

    let err = loop {
        if let Err(e) = relay.step() {
            break e;
        }
    };
    assert!(matches!(err, Error::SendFailed { .. }), "got {err}");
}
