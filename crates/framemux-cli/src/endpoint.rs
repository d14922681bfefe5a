//! Where a mux connection comes from: `tcp:HOST:PORT` or `unix:PATH`.

use std::fmt;
use std::io;
use std::net::{TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::str::FromStr;

use framemux::{Mux, MuxConfig};
use tracing::{debug, info};

use crate::exit::{io_error, mux_error, CliResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp:") {
            if addr.is_empty() {
                return Err("tcp address must not be empty".to_string());
            }
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err("socket path must not be empty".to_string());
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        // Bare forms: anything path-like is a socket, `host:port` is TCP.
        if s.contains('/') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }
        if s.contains(':') {
            return Ok(Endpoint::Tcp(s.to_string()));
        }
        Err(format!(
            "unrecognized address '{s}': expected tcp:HOST:PORT or unix:PATH"
        ))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp:{addr}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl Endpoint {
    /// Dial the endpoint and start a mux over the connection.
    pub fn connect(&self, config: MuxConfig) -> CliResult<Mux> {
        let mux = match self {
            Endpoint::Tcp(addr) => {
                let conn = TcpStream::connect(addr.as_str())
                    .map_err(|err| io_error(&format!("connect to {self} failed"), err))?;
                Mux::with_config(conn, config)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let conn = UnixStream::connect(path)
                    .map_err(|err| io_error(&format!("connect to {self} failed"), err))?;
                Mux::with_config(conn, config)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => return Err(unix_unsupported()),
        };
        let mux = mux.map_err(|err| mux_error("mux start failed", err))?;
        info!(endpoint = %self, "connected");
        Ok(mux)
    }
}

/// A bound, non-blocking listener. Unix socket files are removed on drop.
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

impl Listener {
    pub fn bind(endpoint: &Endpoint) -> CliResult<Self> {
        let context = format!("bind {endpoint} failed");
        let listener = match endpoint {
            Endpoint::Tcp(addr) => {
                let listener =
                    TcpListener::bind(addr.as_str()).map_err(|err| io_error(&context, err))?;
                listener
                    .set_nonblocking(true)
                    .map_err(|err| io_error(&context, err))?;
                Listener::Tcp(listener)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                // A stale socket file from an earlier run blocks the bind.
                match std::fs::remove_file(path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale socket"),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(io_error(&context, err)),
                }
                let listener = UnixListener::bind(path).map_err(|err| io_error(&context, err))?;
                listener
                    .set_nonblocking(true)
                    .map_err(|err| io_error(&context, err))?;
                Listener::Unix(listener, path.clone())
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => return Err(unix_unsupported()),
        };
        info!(endpoint = %endpoint, "listening");
        Ok(listener)
    }

    /// Accept one pending connection as a mux; `None` if nothing is waiting.
    pub fn accept(&self, config: MuxConfig) -> CliResult<Option<Mux>> {
        let mux = match self {
            Listener::Tcp(listener) => match listener.accept() {
                Ok((conn, peer)) => {
                    info!(%peer, "connection accepted");
                    conn.set_nonblocking(false)
                        .map_err(|err| io_error("accept failed", err))?;
                    Mux::with_config(conn, config)
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(io_error("accept failed", err)),
            },
            #[cfg(unix)]
            Listener::Unix(listener, _) => match listener.accept() {
                Ok((conn, _)) => {
                    info!("connection accepted");
                    conn.set_nonblocking(false)
                        .map_err(|err| io_error("accept failed", err))?;
                    Mux::with_config(conn, config)
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(io_error("accept failed", err)),
            },
        };
        mux.map(Some)
            .map_err(|err| mux_error("mux start failed", err))
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Listener::Unix(_, path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(not(unix))]
fn unix_unsupported() -> crate::exit::CliError {
    crate::exit::CliError::new(
        crate::exit::USAGE,
        "unix sockets are not supported on this platform",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_forms() {
        assert_eq!(
            "tcp:127.0.0.1:7000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:7000".to_string())
        );
        assert_eq!(
            "unix:/tmp/mux.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/mux.sock"))
        );
    }

    #[test]
    fn parses_bare_forms() {
        assert_eq!(
            "localhost:9000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("localhost:9000".to_string())
        );
        assert_eq!(
            "./mux.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("./mux.sock"))
        );
    }

    #[test]
    fn rejects_unrecognized_addresses() {
        assert!("mux".parse::<Endpoint>().is_err());
        assert!("tcp:".parse::<Endpoint>().is_err());
        assert!("unix:".parse::<Endpoint>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let endpoint: Endpoint = "unix:/tmp/a.sock".parse().unwrap();
        assert_eq!(endpoint.to_string(), "unix:/tmp/a.sock");
        assert_eq!(endpoint.to_string().parse::<Endpoint>().unwrap(), endpoint);
    }

    #[test]
    fn tcp_listener_accepts_into_mux() {
        let endpoint = Endpoint::Tcp("127.0.0.1:0".to_string());
        let listener = Listener::bind(&endpoint).unwrap();
        assert!(listener.accept(MuxConfig::default()).unwrap().is_none());

        let Listener::Tcp(inner) = &listener else {
            panic!("expected tcp listener");
        };
        let addr = inner.local_addr().unwrap();
        let client = Endpoint::Tcp(addr.to_string())
            .connect(MuxConfig::default())
            .unwrap();

        let mut server = None;
        for _ in 0..200 {
            server = listener.accept(MuxConfig::default()).unwrap();
            if server.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(server.is_some());
        client.close();
    }
}
