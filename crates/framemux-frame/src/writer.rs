use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_header, Frame, FrameConfig, StreamId, MAX_HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` stream.
///
/// Each call emits header then payload and flushes, so a buffered sink
/// never holds a frame back.
pub struct FrameWriter<T> {
    inner: T,
    header: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            header: BytesMut::with_capacity(MAX_HEADER_SIZE),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.stream_id, frame.payload.as_ref())
    }

    /// Encode and send a payload on a stream.
    pub fn send(&mut self, stream_id: StreamId, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len() as u64,
                max: self.config.max_payload_size,
            });
        }

        self.header.clear();
        encode_header(stream_id, payload.len(), &mut self.header)?;

        write_fully(&mut self.inner, &self.header)?;
        write_fully(&mut self.inner, payload)?;
        self.flush()?;

        trace!(stream_id, length = payload.len(), "wrote frame");
        Ok(())
    }

    /// Send a zero-length frame.
    pub fn probe(&mut self, stream_id: StreamId) -> Result<()> {
        self.send(stream_id, &[])
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn write_fully<T: Write>(inner: &mut T, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        match inner.write(bytes) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => bytes = &bytes[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}
