use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::codec::{decode_header, Frame, FrameConfig, FrameHeader};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;
const PAYLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Reads frames from any `Read` stream, one header and one payload at a time.
///
/// Headers are decoded from an internal read-ahead buffer. Payloads are
/// copied out with exact lengths: a payload read never consumes bytes that
/// belong to the next frame.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next frame header (blocking).
    ///
    /// Returns `Ok(None)` on EOF at a frame boundary and
    /// `Err(FrameError::ConnectionClosed)` on EOF inside a header.
    pub fn read_header(&mut self) -> Result<Option<FrameHeader>> {
        loop {
            if let Some((header, size)) = decode_header(&self.buf, self.config.max_payload_size)? {
                self.buf.advance(size);
                trace!(
                    stream_id = header.stream_id,
                    length = header.length,
                    "decoded frame header"
                );
                return Ok(Some(header));
            }

            if self.fill()? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Append exactly `len` payload bytes to `dst` (blocking).
    ///
    /// On error `dst` is restored to its previous length, so a partial
    /// payload is never left behind.
    pub fn read_payload(&mut self, len: usize, dst: &mut BytesMut) -> Result<()> {
        let original = dst.len();
        let result = self.copy_payload(len, dst);
        if result.is_err() {
            dst.truncate(original);
        }
        result
    }

    /// Consume and drop exactly `len` payload bytes (blocking).
    pub fn discard(&mut self, len: usize) -> Result<()> {
        let buffered = len.min(self.buf.len());
        self.buf.advance(buffered);

        let mut remaining = len - buffered;
        let mut scratch = [0u8; READ_CHUNK_SIZE];
        while remaining > 0 {
            let want = remaining.min(scratch.len());
            match self.inner.read(&mut scratch[..want]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => remaining -= n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        trace!(len, "discarded payload");
        Ok(())
    }

    /// Read the next complete frame, zero-length frames included (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let header = self.read_header()?.ok_or(FrameError::ConnectionClosed)?;
        let mut payload = BytesMut::with_capacity(header.length);
        self.read_payload(header.length, &mut payload)?;
        Ok(Frame {
            stream_id: header.stream_id,
            payload: payload.freeze(),
        })
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn copy_payload(&mut self, len: usize, dst: &mut BytesMut) -> Result<()> {
        let buffered = len.min(self.buf.len());
        dst.extend_from_slice(&self.buf[..buffered]);
        self.buf.advance(buffered);

        let mut remaining = len - buffered;
        dst.reserve(remaining);
        while remaining > 0 {
            let start = dst.len();
            let want = remaining.min(PAYLOAD_CHUNK_SIZE);
            dst.resize(start + want, 0);
            match self.inner.read(&mut dst[start..]) {
                Ok(0) => {
                    dst.truncate(start);
                    return Err(FrameError::ConnectionClosed);
                }
                Ok(n) => {
                    dst.truncate(start + n);
                    remaining -= n;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => dst.truncate(start),
                Err(err) => {
                    dst.truncate(start);
                    return Err(FrameError::Io(err));
                }
            }
        }
        Ok(())
    }
}
