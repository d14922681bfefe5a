//! Periodic zero-length probes so a dead connection surfaces as a write
//! error even when no stream has traffic.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::MuxError;
use crate::mux::Shared;

pub(crate) fn spawn(shared: Arc<Shared>, interval: Duration) -> std::io::Result<()> {
    thread::Builder::new()
        .name("framemux-keepalive".to_string())
        .spawn(move || run(&shared, interval))?;
    Ok(())
}

fn run(shared: &Shared, interval: Duration) {
    let stream_id = shared.config().keepalive_stream;
    while !shared.wait_for_termination(interval) {
        match shared.send_frame(stream_id, &[], Some(interval)) {
            Ok(()) => {}
            // Token busy for a whole interval means frames are flowing.
            Err(MuxError::Timeout(_)) => {}
            Err(err) => {
                debug!(error = %err, "keepalive stopped");
                return;
            }
        }
    }
}
