//! `tokio_util` codec for the framemux wire format.
//!
//! Lets async code speak to a framemux peer with `Framed`, without going
//! through the blocking multiplexer.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, FrameConfig};
use crate::error::FrameError;

/// Frame codec for `tokio_util::codec::Framed`.
///
/// Zero-length frames are yielded like any other frame; callers decide
/// whether to skip them.
#[derive(Debug, Clone, Default)]
pub struct MuxCodec {
    config: FrameConfig,
}

impl MuxCodec {
    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for MuxCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        decode_frame(src, self.config.max_payload_size)
    }
}

impl Encoder<Frame> for MuxCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len() as u64,
                max: self.config.max_payload_size,
            });
        }
        encode_frame(frame.stream_id, &frame.payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;

    use super::*;
    use crate::reader::FrameReader;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (left, right) = tokio::io::duplex(1024);
        let mut tx = Framed::new(left, MuxCodec::default());
        let mut rx = Framed::new(right, MuxCodec::default());

        tx.send(Frame::new(5, "hello")).await.unwrap();
        tx.send(Frame::probe(5)).await.unwrap();
        tx.send(Frame::new(6, vec![0x42; 4096])).await.unwrap();

        let first = rx.next().await.unwrap().unwrap();
        let probe = rx.next().await.unwrap().unwrap();
        let third = rx.next().await.unwrap().unwrap();

        assert_eq!(first, Frame::new(5, "hello"));
        assert!(probe.payload.is_empty());
        assert_eq!(third.stream_id, 6);
        assert_eq!(third.payload.len(), 4096);
    }

    #[test]
    fn encoded_bytes_match_blocking_reader() {
        let mut codec = MuxCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(Frame::new(1, "sync"), &mut wire).unwrap();

        let mut reader = FrameReader::new(std::io::Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame, Frame::new(1, "sync"));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut codec = MuxCodec::with_config(FrameConfig {
            max_payload_size: 2,
        });
        let mut wire = BytesMut::new();
        let err = codec.encode(Frame::new(1, "big"), &mut wire).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }
}
