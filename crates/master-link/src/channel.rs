//! Byte channels to the master.
//!
//! The transport only needs something it can write bytes to and read bytes
//! from with a deadline. TCP-to-serial bridges are the common case; an already
//! configured serial device file works through [`StreamChannel`].

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

/// A bidirectional byte stream with timed reads.
pub trait Channel: Send {
    /// Write all bytes.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is available, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time. A zero timeout polls.
    /// End of stream is reported as [`io::ErrorKind::UnexpectedEof`].
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read(buf, timeout)
    }
}

// ============================================================================
// TCP
// ============================================================================

/// Channel over a TCP connection, typically to a serial bridge.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpChannel {
    /// Connect to the first address that accepts within `timeout`.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> io::Result<Self> {
        let mut last = io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing");
        for peer in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&peer, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!(%peer, "connected to master bridge");
                    return Ok(TcpChannel { stream, peer });
                }
                Err(e) => {
                    debug!(%peer, error = %e, "connect failed");
                    last = e;
                }
            }
        }
        Err(last)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(TcpChannel { stream, peer })
    }

    /// Address of the remote end.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Channel for TcpChannel {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let result = if timeout.is_zero() {
            self.stream.set_nonblocking(true)?;
            let result = self.stream.read(buf);
            self.stream.set_nonblocking(false)?;
            result
        } else {
            self.stream.set_read_timeout(Some(timeout))?;
            self.stream.read(buf)
        };
        match result {
            Ok(0) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "bridge closed the connection")),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Generic stream
// ============================================================================

/// Channel over any blocking stream, such as a serial device file whose line
/// settings and read timeout were configured beforehand.
///
/// The stream's own read timeout applies. A read returning no bytes counts as
/// a timeout, which is what a tty with a read timeout does. Polls with a zero
/// timeout return immediately without touching the stream.
#[derive(Debug)]
pub struct StreamChannel<S> {
    stream: S,
}

impl<S: Read + Write + Send> StreamChannel<S> {
    /// Wrap a stream.
    pub fn new(stream: S) -> Self {
        StreamChannel { stream }
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write + Send> Channel for StreamChannel<S> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if timeout.is_zero() {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(0),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;

    #[test]
    fn test_stream_channel_reads_and_writes() {
        let mut channel = StreamChannel::new(Cursor::new(b"RTR".to_vec()));
        let mut buf = [0u8; 8];
        assert_eq!(channel.read(&mut buf, Duration::ZERO).expect("poll"), 0);
        assert_eq!(channel.read(&mut buf, Duration::from_millis(10)).expect("read"), 3);
        assert_eq!(&buf[..3], b"RTR");
        // Cursor is exhausted, which looks like a tty timeout.
        assert_eq!(channel.read(&mut buf, Duration::from_millis(10)).expect("read"), 0);
    }

    #[test]
    fn test_tcp_channel_timeout_and_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).expect("read");
            stream.write_all(&buf).expect("echo");
        });

        let mut channel = TcpChannel::connect(addr, Duration::from_secs(1)).expect("connect");
        assert_eq!(channel.peer(), addr);
        let mut buf = [0u8; 16];
        assert_eq!(channel.read(&mut buf, Duration::ZERO).expect("poll"), 0);

        channel.write_all(b"ping").expect("write");
        let n = channel.read(&mut buf, Duration::from_secs(2)).expect("read");
        assert_eq!(&buf[..n], b"ping");

        server.join().expect("server thread");
        let err = loop {
            match channel.read(&mut buf, Duration::from_millis(200)) {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
