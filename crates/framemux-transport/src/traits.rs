use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Shuts down both directions of a connection.
///
/// After `shutdown` returns, a read blocked on the connection's read half
/// must return (EOF or an error) and further writes must fail.
pub trait Shutdown: Send + Sync {
    fn shutdown(&self) -> std::io::Result<()>;
}

/// Owned shutdown handle for a split connection.
pub type ShutdownHandle = Box<dyn Shutdown>;

/// A connection split into independently owned halves.
pub struct Halves<R, W> {
    /// Read side. Owned by exactly one reader.
    pub reader: R,
    /// Write side. Owned by exactly one writer at a time.
    pub writer: W,
    /// Closes both sides.
    pub shutdown: ShutdownHandle,
}

/// A reliable, ordered duplex byte connection.
pub trait Connection: Send + 'static {
    type Reader: Read + Send + 'static;
    type Writer: Write + Send + 'static;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;

    /// Split into an owned read half, write half and shutdown handle.
    fn into_halves(self) -> Result<Halves<Self::Reader, Self::Writer>>;
}

/// Shutdown handle for connections that cannot be closed from the outside.
///
/// The reader only stops once the peer closes its side.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoShutdown;

impl Shutdown for NoShutdown {
    fn shutdown(&self) -> std::io::Result<()> {
        Ok(())
    }
}

struct TcpShutdown(TcpStream);

impl Shutdown for TcpShutdown {
    fn shutdown(&self) -> std::io::Result<()> {
        ignore_not_connected(self.0.shutdown(std::net::Shutdown::Both))
    }
}

impl Connection for TcpStream {
    type Reader = TcpStream;
    type Writer = TcpStream;

    fn transport_name(&self) -> &'static str {
        "tcp"
    }

    fn into_halves(self) -> Result<Halves<TcpStream, TcpStream>> {
        let split_err = |source| TransportError::Split {
            transport: "tcp",
            source,
        };
        let reader = self.try_clone().map_err(split_err)?;
        let shutdown = self.try_clone().map_err(split_err)?;
        debug!(peer = ?self.peer_addr().ok(), "split tcp connection");
        Ok(Halves {
            reader,
            writer: self,
            shutdown: Box::new(TcpShutdown(shutdown)),
        })
    }
}

#[cfg(unix)]
struct UnixShutdown(std::os::unix::net::UnixStream);

#[cfg(unix)]
impl Shutdown for UnixShutdown {
    fn shutdown(&self) -> std::io::Result<()> {
        ignore_not_connected(self.0.shutdown(std::net::Shutdown::Both))
    }
}

#[cfg(unix)]
impl Connection for std::os::unix::net::UnixStream {
    type Reader = std::os::unix::net::UnixStream;
    type Writer = std::os::unix::net::UnixStream;

    fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }

    fn into_halves(self) -> Result<Halves<Self::Reader, Self::Writer>> {
        let split_err = |source| TransportError::Split {
            transport: "unix-domain-socket",
            source,
        };
        let reader = self.try_clone().map_err(split_err)?;
        let shutdown = self.try_clone().map_err(split_err)?;
        debug!("split unix domain socket connection");
        Ok(Halves {
            reader,
            writer: self,
            shutdown: Box::new(UnixShutdown(shutdown)),
        })
    }
}

// Shutting down a socket the peer already closed is not a failure.
fn ignore_not_connected(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use super::*;

    #[test]
    fn tcp_halves_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let client = TcpStream::connect(addr).unwrap();
        assert_eq!(client.transport_name(), "tcp");
        let mut halves = client.into_halves().unwrap();

        halves.writer.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        halves.reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        server.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn unix_shutdown_unblocks_reader() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let halves = left.into_halves().unwrap();
        let mut reader = halves.reader;

        let blocked = thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf)
        });

        halves.shutdown.shutdown().unwrap();
        let result = blocked.join().unwrap();
        assert!(matches!(result, Ok(0)) || result.is_err());
    }

    #[test]
    #[cfg(unix)]
    fn shutdown_twice_is_ok() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        drop(right);
        let halves = left.into_halves().unwrap();
        halves.shutdown.shutdown().unwrap();
        halves.shutdown.shutdown().unwrap();
    }

    #[test]
    fn no_shutdown_is_noop() {
        assert!(NoShutdown.shutdown().is_ok());
    }
}
