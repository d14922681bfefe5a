//! Read pump: the single owner of the connection's read half.

use std::io::Read;
use std::sync::Arc;
use std::thread;

use bytes::BytesMut;
use framemux_frame::FrameReader;
use tracing::{debug, trace};

use crate::config::UnknownStreamPolicy;
use crate::error::Termination;
use crate::mux::Shared;

pub(crate) fn spawn<R>(frames: FrameReader<R>, shared: Arc<Shared>) -> std::io::Result<()>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("framemux-read".to_string())
        .spawn(move || run(frames, &shared))?;
    Ok(())
}

fn run<R: Read>(mut frames: FrameReader<R>, shared: &Shared) {
    let termination = match demux(&mut frames, shared) {
        Ok(()) => Termination::PeerClosed,
        Err(err) => Termination::Broken(format!("read failed: {err}")),
    };
    // A local close gets here through the shutdown it triggers; the first
    // recorded termination wins.
    shared.terminate(termination);
}

/// Route frames to streams until EOF on a frame boundary or an error.
fn demux<R: Read>(frames: &mut FrameReader<R>, shared: &Shared) -> framemux_frame::Result<()> {
    // Payloads land here first; a stream's lock is only taken once the whole
    // payload is in hand.
    let mut scratch = BytesMut::new();
    while let Some(header) = frames.read_header()? {
        if shared.is_terminated() {
            return Ok(());
        }
        if header.is_probe() {
            trace!(stream_id = header.stream_id, "skipping zero-length frame");
            continue;
        }

        let core = match shared.config().unknown_stream_policy {
            UnknownStreamPolicy::Discard => shared.lookup(header.stream_id),
            UnknownStreamPolicy::Lazy => Some(shared.open_lazy(header.stream_id)),
        };

        let Some(core) = core else {
            debug!(
                stream_id = header.stream_id,
                length = header.length,
                "discarding frame for unknown stream"
            );
            frames.discard(header.length)?;
            continue;
        };

        scratch.clear();
        frames.read_payload(header.length, &mut scratch)?;
        let added = core.deliver(&scratch);
        trace!(stream_id = header.stream_id, added, "delivered payload");
    }
    Ok(())
}
