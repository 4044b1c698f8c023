//! End-to-end tests for the control, datagram, and fan-out surfaces
//!
//! Drives a real server on localhost with plain blocking sockets, the way
//! a native client would.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use audioshare::{
    AudioFormat, AudioServer, AudioSource, Broadcaster, Error, Result, SampleEncoding,
    ServerConfig,
};

const OP_GET_FORMAT: u32 = 1;
const OP_START_PLAY: u32 = 2;
const OP_HEARTBEAT: u32 = 3;

/// Capture stand-in: fixed format, no frames of its own
struct StaticSource {
    format: AudioFormat,
}

impl StaticSource {
    fn new() -> Self {
        Self {
            format: AudioFormat {
                encoding: SampleEncoding::S16,
                channels: 2,
                sample_rate: 48000,
            },
        }
    }
}

impl AudioSource for StaticSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&self, _broadcaster: Arc<Broadcaster>) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}
}

/// Start a server on an ephemeral localhost port
///
/// The UDP and WebSocket ports are derived from the TCP port, so a
/// neighbor collision is possible; retry with a fresh ephemeral port.
fn start_server(configure: impl Fn(ServerConfig) -> ServerConfig) -> AudioServer {
    for _ in 0..4 {
        let config = configure(ServerConfig::with_addr("127.0.0.1:0".parse().unwrap()));
        let server = AudioServer::new(config, Arc::new(StaticSource::new()));
        match server.start() {
            Ok(()) => return server,
            Err(Error::Io(_)) => continue,
            Err(e) => panic!("unexpected start error: {e}"),
        }
    }
    panic!("could not start test server");
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect to control server");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

fn send_opcode(stream: &mut TcpStream, opcode: u32) {
    stream.write_all(&opcode.to_le_bytes()).unwrap();
}

fn read_u32(stream: &mut TcpStream) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read the next reply opcode, skipping server heartbeat probes
fn read_reply_opcode(stream: &mut TcpStream) -> std::io::Result<u32> {
    loop {
        let opcode = read_u32(stream)?;
        if opcode != OP_HEARTBEAT {
            return Ok(opcode);
        }
    }
}

fn start_play(stream: &mut TcpStream) -> u32 {
    send_opcode(stream, OP_START_PLAY);
    assert_eq!(read_reply_opcode(stream).unwrap(), OP_START_PLAY);
    let id = read_u32(stream).unwrap();
    assert!(id > 0);
    id
}

#[test]
fn get_format_round_trip() {
    let server = start_server(|c| c);
    let mut stream = connect(server.control_addr().unwrap());

    send_opcode(&mut stream, OP_GET_FORMAT);

    assert_eq!(read_reply_opcode(&mut stream).unwrap(), OP_GET_FORMAT);
    let len = read_u32(&mut stream).unwrap() as usize;

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).unwrap();

    let format = AudioFormat::decode(&payload).expect("descriptor parses");
    assert_eq!(format.encoding, SampleEncoding::S16);
    assert_eq!(format.channels, 2);
    assert_eq!(format.sample_rate, 48000);

    server.stop();
}

#[test]
fn play_ids_are_monotonic_across_peers() {
    let server = start_server(|c| c);
    let addr = server.control_addr().unwrap();

    let mut first = connect(addr);
    let mut second = connect(addr);

    let id_a = start_play(&mut first);
    let id_b = start_play(&mut second);
    assert!(id_b > id_a);

    // A second START_PLAY on the same connection is a duplicate
    // registration: the server closes it.
    send_opcode(&mut first, OP_START_PLAY);
    let mut buf = [0u8; 4];
    loop {
        match first.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue, // drain heartbeat probes until close
            Err(e) => panic!("expected clean close, got {e}"),
        }
    }

    server.stop();
}

#[test]
fn unknown_opcode_closes_only_that_peer() {
    let server = start_server(|c| c);
    let addr = server.control_addr().unwrap();

    let mut innocent = connect(addr);
    let mut offender = connect(addr);

    send_opcode(&mut offender, 99);
    let mut buf = [0u8; 16];
    assert_eq!(offender.read(&mut buf).unwrap(), 0, "offender must see EOF");

    // The other session keeps working.
    send_opcode(&mut innocent, OP_GET_FORMAT);
    assert_eq!(read_reply_opcode(&mut innocent).unwrap(), OP_GET_FORMAT);

    server.stop();
}

#[test]
fn datagram_delivery_preserves_alignment_and_order() {
    let server = start_server(|c| c);
    let addr = server.control_addr().unwrap();
    let broadcaster = server.broadcaster().unwrap();

    let mut stream = connect(addr);
    let id = start_play(&mut stream);

    let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
    udp.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
    udp.send_to(&id.to_le_bytes(), addr).unwrap();

    // Registration is asynchronous: probe with tiny broadcasts until the
    // first datagram comes back.
    let mut buf = [0u8; 2048];
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        broadcaster.broadcast(&[0u8; 4], 4);
        match udp.recv_from(&mut buf) {
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                assert!(Instant::now() < deadline, "no datagrams within deadline");
            }
            Err(e) => panic!("udp recv failed: {e}"),
        }
    }

    // Drain in-flight probe datagrams.
    while udp.recv_from(&mut buf).is_ok() {}

    // 4097 bytes at block align 4: the partial-sample tail byte is
    // dropped, leaving three aligned segments in order.
    let payload: Vec<u8> = (0..4097).map(|i| (i % 251) as u8 | 1).collect();
    broadcaster.broadcast(&payload, 4);

    let mut received = Vec::new();
    let mut sizes = Vec::new();
    while sizes.len() < 3 {
        let (len, _) = udp.recv_from(&mut buf).expect("audio datagram");
        assert_eq!(len % 4, 0, "datagram length must be block aligned");
        sizes.push(len);
        received.extend_from_slice(&buf[..len]);
    }

    assert_eq!(sizes, vec![1444, 1444, 1208]);
    assert_eq!(received, &payload[..4096]);

    server.stop();
}

#[test]
fn silent_peer_is_torn_down_and_dropped_from_fanout() {
    let server = start_server(|c| {
        c.heartbeat(Duration::from_millis(100), Duration::from_millis(250))
    });
    let addr = server.control_addr().unwrap();
    let broadcaster = server.broadcaster().unwrap();

    let mut stream = connect(addr);
    let id = start_play(&mut stream);

    let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
    udp.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
    udp.send_to(&id.to_le_bytes(), addr).unwrap();

    // Send no heartbeats: the supervisor must close the connection within
    // timeout + interval plus scheduling slack.
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue, // server heartbeat probes before the close
            Err(e) => panic!("expected clean close, got {e}"),
        }
    }
    assert!(Instant::now() < deadline, "teardown exceeded deadline");

    // After removal a broadcast sends us nothing.
    broadcaster.broadcast(&[0u8; 64], 4);
    assert!(udp.recv_from(&mut buf).is_err());

    server.stop();
}

#[test]
fn heartbeats_keep_peer_alive() {
    let server = start_server(|c| {
        c.heartbeat(Duration::from_millis(100), Duration::from_millis(250))
    });
    let mut stream = connect(server.control_addr().unwrap());
    start_play(&mut stream);

    // Outlive several timeout windows by heartbeating.
    for _ in 0..12 {
        send_opcode(&mut stream, OP_HEARTBEAT);
        std::thread::sleep(Duration::from_millis(50));
    }

    // Still connected: a format request gets its reply.
    send_opcode(&mut stream, OP_GET_FORMAT);
    assert_eq!(read_reply_opcode(&mut stream).unwrap(), OP_GET_FORMAT);

    server.stop();
}

#[test]
fn format_descriptor_limit_enforced() {
    struct HugeSource(StaticSource);

    impl AudioSource for HugeSource {
        fn format(&self) -> AudioFormat {
            self.0.format
        }

        fn format_descriptor(&self) -> Bytes {
            Bytes::from(vec![0u8; audioshare::protocol::MAX_AUDIO_FORMAT_SIZE + 1])
        }

        fn start(&self, _broadcaster: Arc<Broadcaster>) -> Result<()> {
            Ok(())
        }

        fn stop(&self) {}
    }

    let server = AudioServer::new(
        ServerConfig::with_addr("127.0.0.1:0".parse().unwrap()),
        Arc::new(HugeSource(StaticSource::new())),
    );
    assert!(matches!(server.start(), Err(Error::FormatTooLarge { .. })));
}
