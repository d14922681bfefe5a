use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use framemux_frame::StreamId;

use crate::error::{MuxError, Result, Termination};
use crate::mux::Shared;
use crate::sync::{deadline, expired, lock, wait_until};

/// Read side of one stream: the buffer the read pump fills and the
/// condition its readers wait on.
pub(crate) struct StreamCore {
    id: StreamId,
    state: Mutex<ReadState>,
    readable: Condvar,
}

struct ReadState {
    buf: BytesMut,
    // Readers currently parked on `readable`. The pump only signals when
    // this is non-zero, and both sides touch it under the state lock.
    waiters: usize,
}

impl StreamCore {
    pub(crate) fn new(id: StreamId) -> Self {
        Self {
            id,
            state: Mutex::new(ReadState {
                buf: BytesMut::new(),
                waiters: 0,
            }),
            readable: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    pub(crate) fn buffered(&self) -> usize {
        lock(&self.state).buf.len()
    }

    /// Append one complete payload and wake a parked reader.
    ///
    /// The payload is fully read before this is called, so the stream lock
    /// is never held across connection I/O.
    pub(crate) fn deliver(&self, payload: &[u8]) -> usize {
        if payload.is_empty() {
            return 0;
        }
        let mut state = lock(&self.state);
        state.buf.extend_from_slice(payload);
        if state.waiters > 0 {
            self.readable.notify_one();
        }
        payload.len()
    }

    /// Copy buffered bytes into `dst`, blocking while the buffer is empty.
    ///
    /// Buffered bytes are returned even after the mux terminated; the
    /// termination is reported once the buffer is drained.
    pub(crate) fn read(
        &self,
        dst: &mut [u8],
        timeout: Option<Duration>,
        termination: impl Fn() -> Option<Termination>,
    ) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        let deadline = deadline(timeout);
        let mut state = lock(&self.state);
        loop {
            if !state.buf.is_empty() {
                let n = dst.len().min(state.buf.len());
                state.buf.copy_to_slice(&mut dst[..n]);
                if !state.buf.is_empty() && state.waiters > 0 {
                    self.readable.notify_one();
                }
                return Ok(n);
            }

            if let Some(termination) = termination() {
                return Err(termination.to_error());
            }
            if expired(deadline) {
                return Err(MuxError::Timeout(timeout.unwrap_or_default()));
            }

            state.waiters += 1;
            state = wait_until(&self.readable, state, deadline);
            state.waiters -= 1;
        }
    }

    /// Release every parked reader so it re-checks the mux state.
    pub(crate) fn wake_all(&self) {
        let _state = lock(&self.state);
        self.readable.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn waiters(&self) -> usize {
        lock(&self.state).waiters
    }
}

/// One logical byte stream multiplexed over the shared connection.
///
/// Reads block until the peer has sent bytes for this stream; writes block
/// only while another stream holds the writer token. Clones share the same
/// stream; timeouts are per handle.
#[derive(Clone)]
pub struct Stream {
    core: Arc<StreamCore>,
    mux: Arc<Shared>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl Stream {
    pub(crate) fn new(core: Arc<StreamCore>, mux: Arc<Shared>) -> Self {
        let read_timeout = mux.config().read_timeout;
        let write_timeout = mux.config().write_timeout;
        Self {
            core,
            mux,
            read_timeout,
            write_timeout,
        }
    }

    /// The stream identifier.
    pub fn id(&self) -> StreamId {
        self.core.id()
    }

    /// Read up to `buf.len()` bytes (blocking while none are buffered).
    ///
    /// May return fewer bytes than requested and fewer than one frame's
    /// payload. Returns `Ok(0)` only for an empty `buf`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.core
            .read(buf, self.read_timeout, || self.mux.termination())
    }

    /// Write `payload` as one or more frames.
    ///
    /// Payloads larger than the frame limit are split; each frame takes and
    /// returns the writer token on its own. If the token wait times out
    /// after at least one frame went out, the short count is returned.
    pub fn write(&self, payload: &[u8]) -> Result<usize> {
        if let Some(termination) = self.mux.termination() {
            return Err(termination.to_error());
        }

        let mut written = 0;
        for chunk in payload.chunks(self.mux.config().max_frame_payload) {
            match self.mux.send_frame(self.id(), chunk, self.write_timeout) {
                Ok(()) => written += chunk.len(),
                Err(MuxError::Timeout(_)) if written > 0 => break,
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }

    /// Bytes received and not yet read.
    pub fn buffered(&self) -> usize {
        self.core.buffered()
    }

    /// Limit how long a read on this handle waits for data.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Limit how long a write on this handle waits for the writer token.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    fn io_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match Stream::read(self, buf) {
            Ok(n) => Ok(n),
            Err(err) if err.is_clean_close() => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn io_write(&self, buf: &[u8]) -> io::Result<usize> {
        Stream::write(self, buf).map_err(Into::into)
    }
}

impl io::Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io_read(buf)
    }
}

impl io::Read for &Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io_read(buf)
    }
}

impl io::Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io_write(buf)
    }

    // Every frame is flushed by the writer before the token is returned.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id())
            .field("buffered", &self.buffered())
            .finish()
    }
}
