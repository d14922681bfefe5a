use std::io::{Read, Write};

use crate::error::Result;
use crate::traits::{Connection, Halves, NoShutdown, Shutdown, ShutdownHandle};

/// A connection assembled from two independent halves.
///
/// Covers byte pipes that do not come as one duplex object, such as a child
/// process's stdout/stdin pair.
pub struct Duplex<R, W> {
    reader: R,
    writer: W,
    shutdown: ShutdownHandle,
}

impl<R, W> Duplex<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    /// Pair two halves. The connection cannot be shut down from this side;
    /// reading stops when the peer closes.
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_shutdown(reader, writer, NoShutdown)
    }

    /// Pair two halves with an explicit shutdown handle.
    pub fn with_shutdown(reader: R, writer: W, shutdown: impl Shutdown + 'static) -> Self {
        Self {
            reader,
            writer,
            shutdown: Box::new(shutdown),
        }
    }
}

impl<R, W> Connection for Duplex<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    type Reader = R;
    type Writer = W;

    fn transport_name(&self) -> &'static str {
        "duplex"
    }

    fn into_halves(self) -> Result<Halves<R, W>> {
        Ok(Halves {
            reader: self.reader,
            writer: self.writer,
            shutdown: self.shutdown,
        })
    }
}

impl<R, W> std::fmt::Debug for Duplex<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Duplex").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    struct FlagShutdown(Arc<AtomicBool>);

    impl Shutdown for FlagShutdown {
        fn shutdown(&self) -> std::io::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn halves_pass_through() {
        let duplex = Duplex::new(Cursor::new(b"inbound".to_vec()), Vec::<u8>::new());
        assert_eq!(duplex.transport_name(), "duplex");

        let mut halves = duplex.into_halves().unwrap();
        let mut inbound = String::new();
        halves.reader.read_to_string(&mut inbound).unwrap();
        halves.writer.write_all(b"outbound").unwrap();

        assert_eq!(inbound, "inbound");
        assert_eq!(halves.writer, b"outbound");
        assert!(halves.shutdown.shutdown().is_ok());
    }

    #[test]
    fn custom_shutdown_is_invoked() {
        let flag = Arc::new(AtomicBool::new(false));
        let duplex = Duplex::with_shutdown(
            Cursor::new(Vec::new()),
            Vec::<u8>::new(),
            FlagShutdown(Arc::clone(&flag)),
        );

        let halves = duplex.into_halves().unwrap();
        halves.shutdown.shutdown().unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }
}
