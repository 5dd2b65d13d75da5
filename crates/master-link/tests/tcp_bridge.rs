//! End-to-end requests over a TCP bridge that forwards to a simulated master.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use master_link::{
    Channel, CommunicationError, FaultPlan, Link, LinkError, LinkWorker, Request, SimHandle, SimulatedMaster,
    TcpChannel, Transport, TransportConfig,
};
use master_protocol::{ClassicCommand, ClassicResponse, CoreCommand, CoreResponse, HardwareFamily, MemoryType};

/// Accept one connection and shuttle bytes between it and a simulator.
fn spawn_bridge(family: HardwareFamily) -> (std::net::SocketAddr, SimHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (mut sim, handle) = SimulatedMaster::new(family);

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream
            .set_read_timeout(Some(Duration::from_millis(5)))
            .expect("timeout");
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return,
                Ok(n) => sim.write_all(&buf[..n]).expect("sim write"),
                Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
                Err(_) => return,
            }
            loop {
                let n = sim.read(&mut buf, Duration::ZERO).expect("sim read");
                if n == 0 {
                    break;
                }
                if stream.write_all(&buf[..n]).is_err() {
                    return;
                }
            }
        }
    });

    (addr, handle)
}

fn connect(addr: std::net::SocketAddr, family: HardwareFamily, retries: u32) -> Transport<TcpChannel> {
    let channel = TcpChannel::connect(addr, Duration::from_secs(1)).expect("connect");
    let config = TransportConfig::for_family(family)
        .with_timeout(Duration::from_millis(300))
        .with_retries(retries);
    Transport::new(channel, config)
}

#[test]
fn test_core_memory_over_tcp() {
    let (addr, sim) = spawn_bridge(HardwareFamily::Core);
    sim.set_memory(MemoryType::Eeprom, 1, 7, &[0x12, 0x34]);
    let mut transport = connect(addr, HardwareFamily::Core, 2);

    let read = CoreCommand::MemoryRead {
        memory: MemoryType::Eeprom,
        page: 1,
        start: 0,
        length: 32,
    };
    let payload = transport.send(&Request::core(&read)).expect("read");
    match CoreResponse::decode(read.code(), &payload).expect("decode") {
        CoreResponse::MemoryRead { page, data, .. } => {
            assert_eq!(page, 1);
            assert_eq!(&data[7..9], &[0x12, 0x34]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_classic_retry_over_tcp() {
    let (addr, sim) = spawn_bridge(HardwareFamily::Classic);
    sim.set_faults(FaultPlan {
        corrupt_replies: 1,
        drop_replies: 1,
        ..FaultPlan::default()
    });
    let mut transport = connect(addr, HardwareFamily::Classic, 2);

    let payload = transport
        .send(&Request::classic(&ClassicCommand::FirmwareVersion).expect("frame"))
        .expect("version");
    assert_eq!(
        ClassicResponse::decode(*b"FV", &payload).expect("decode"),
        ClassicResponse::FirmwareVersion {
            major: 3,
            minor: 143,
            patch: 103
        }
    );
    assert_eq!(transport.stats().retries, 2);
}

#[test]
fn test_worker_over_tcp_reports_exhaustion() {
    let (addr, sim) = spawn_bridge(HardwareFamily::Core);
    sim.set_faults(FaultPlan {
        drop_replies: 10,
        ..FaultPlan::default()
    });
    let worker = LinkWorker::spawn(connect(addr, HardwareFamily::Core, 1)).expect("spawn");
    let link = worker.handle();

    let err = link.send(Request::core(&CoreCommand::FirmwareVersion)).unwrap_err();
    assert!(matches!(
        err,
        LinkError::Communication(CommunicationError::RetriesExhausted { attempts: 2, .. })
    ));
    worker.shutdown();
}

#[test]
fn test_closed_bridge_fails_fast() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        drop(stream);
    });
    let stream = TcpStream::connect(addr).expect("connect");
    server.join().expect("server");

    let channel = TcpChannel::from_stream(stream).expect("channel");
    let mut transport = Transport::new(channel, TransportConfig::for_family(HardwareFamily::Core));
    let err = transport
        .send(&Request::core(&CoreCommand::FirmwareVersion))
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::Communication(CommunicationError::ChannelClosed | CommunicationError::Io(_))
    ));
}

