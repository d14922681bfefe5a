//! Wire framing for the framemux stream multiplexer.
//!
//! Every frame on the shared connection is:
//! - a 1-byte stream identifier
//! - the payload length as a signed zigzag varint (1 to 10 bytes)
//! - exactly that many payload bytes
//!
//! A zero length is a valid frame with no payload. Receivers skip it; it is
//! used as a liveness probe.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::MuxCodec;
pub use codec::{
    decode_frame, decode_header, encode_frame, encode_header, Frame, FrameConfig, FrameHeader,
    StreamId, DEFAULT_MAX_PAYLOAD, MAX_HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
