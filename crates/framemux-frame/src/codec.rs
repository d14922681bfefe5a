use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Identifier of a logical stream on one connection.
pub type StreamId = u8;

/// Longest encoding of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Largest possible header: stream id (1) + length varint (up to 10).
pub const MAX_HEADER_SIZE: usize = 1 + MAX_VARINT_LEN;

/// Default maximum payload size of a single frame: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Stream the payload belongs to.
    pub stream_id: StreamId,
    /// Number of payload bytes following the header.
    pub length: usize,
}

impl FrameHeader {
    /// A zero-length frame carries nothing and must be skipped.
    pub fn is_probe(&self) -> bool {
        self.length == 0
    }
}

/// A complete frame with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The stream this payload belongs to.
    pub stream_id: StreamId,
    /// The payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(stream_id: StreamId, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            payload: payload.into(),
        }
    }

    /// A zero-length liveness probe.
    pub fn probe(stream_id: StreamId) -> Self {
        Self::new(stream_id, Bytes::new())
    }
}

/// Encode a frame header.
///
/// Wire format:
/// ```text
/// ┌─────────────┬──────────────────────┬─────────────────┐
/// │ Stream (1B) │ Length               │ Payload         │
/// │             │ (zigzag varint 1-10B)│ (Length bytes)  │
/// └─────────────┴──────────────────────┴─────────────────┘
/// ```
pub fn encode_header(stream_id: StreamId, length: usize, dst: &mut BytesMut) -> Result<()> {
    let length = i64::try_from(length).map_err(|_| FrameError::PayloadTooLarge {
        size: length as u64,
        max: i64::MAX as usize,
    })?;
    dst.reserve(1 + varint_len(length));
    dst.put_u8(stream_id);
    put_varint(dst, length);
    Ok(())
}

/// Decode a frame header from the front of `src` without consuming it.
///
/// Returns the header and its encoded size, or `Ok(None)` if `src` does not
/// yet hold a complete header.
pub fn decode_header(src: &[u8], max_payload: usize) -> Result<Option<(FrameHeader, usize)>> {
    let Some((&stream_id, rest)) = src.split_first() else {
        return Ok(None);
    };

    let Some((length, varint_size)) = get_varint(rest)? else {
        return Ok(None);
    };

    if length < 0 {
        return Err(FrameError::InvalidLength("negative length"));
    }
    if length as u64 > max_payload as u64 {
        return Err(FrameError::PayloadTooLarge {
            size: length as u64,
            max: max_payload,
        });
    }

    let header = FrameHeader {
        stream_id,
        length: length as usize,
    };
    Ok(Some((header, 1 + varint_size)))
}

/// Encode a complete frame into the wire format.
pub fn encode_frame(stream_id: StreamId, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    encode_header(stream_id, payload.len(), dst)?;
    dst.put_slice(payload);
    Ok(())
}

/// Decode a complete frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some((header, header_size)) = decode_header(src, max_payload)? else {
        return Ok(None);
    };

    let total = header_size + header.length;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(header_size);
    let payload = src.split_to(header.length).freeze();

    Ok(Some(Frame {
        stream_id: header.stream_id,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size of one frame in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

// Signed varints are zigzag encoded so small magnitudes stay short.
fn put_varint(dst: &mut BytesMut, value: i64) {
    let mut ux = (value as u64) << 1;
    if value < 0 {
        ux = !ux;
    }
    while ux >= 0x80 {
        dst.put_u8(ux as u8 | 0x80);
        ux >>= 7;
    }
    dst.put_u8(ux as u8);
}

fn varint_len(value: i64) -> usize {
    let mut ux = (value as u64) << 1;
    if value < 0 {
        ux = !ux;
    }
    let mut len = 1;
    while ux >= 0x80 {
        ux >>= 7;
        len += 1;
    }
    len
}

fn get_varint(src: &[u8]) -> Result<Option<(i64, usize)>> {
    let mut ux = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in src.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(FrameError::InvalidLength("varint longer than 10 bytes"));
        }
        if byte < 0x80 {
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(FrameError::InvalidLength("varint overflows 64 bits"));
            }
            ux |= u64::from(byte) << shift;
            let mut value = (ux >> 1) as i64;
            if ux & 1 != 0 {
                value = !value;
            }
            return Ok(Some((value, i + 1)));
        }
        ux |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    Ok(None)
}
