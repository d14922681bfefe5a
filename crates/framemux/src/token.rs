//! Writer token: exclusive, transferable permission to write one frame.
//!
//! The connection's write half lives inside the token. Acquiring the token
//! moves the writer out to the caller; dropping the guard moves it back and
//! hands it to the next waiter. Whoever holds the guard is the only code
//! that can touch the write half, so a frame's header and payload are never
//! interleaved with another frame. Wake order among waiters is whatever the
//! condition variable gives; there is no fairness guarantee.

use std::io::Write;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use framemux_frame::{FrameWriter, StreamId};

use crate::error::{MuxError, Result, Termination};
use crate::sync::{deadline, expired, lock, wait_until};

pub(crate) type ConnectionWriter = FrameWriter<Box<dyn Write + Send>>;

pub(crate) struct WriterToken {
    slot: Mutex<Option<ConnectionWriter>>,
    released: Condvar,
}

impl WriterToken {
    pub(crate) fn new(writer: ConnectionWriter) -> Self {
        Self {
            slot: Mutex::new(Some(writer)),
            released: Condvar::new(),
        }
    }

    /// Take the token, waiting at most `timeout`.
    ///
    /// Fails as soon as `termination` reports an end state, including while
    /// waiting.
    pub(crate) fn acquire(
        &self,
        timeout: Option<Duration>,
        termination: impl Fn() -> Option<Termination>,
    ) -> Result<TokenGuard<'_>> {
        let deadline = deadline(timeout);
        let mut slot = lock(&self.slot);
        loop {
            if let Some(termination) = termination() {
                return Err(termination.to_error());
            }
            if let Some(writer) = slot.take() {
                return Ok(TokenGuard {
                    token: self,
                    writer: Some(writer),
                });
            }
            if expired(deadline) {
                return Err(MuxError::Timeout(timeout.unwrap_or_default()));
            }
            slot = wait_until(&self.released, slot, deadline);
        }
    }

    /// Release every waiter so it re-checks the mux state.
    pub(crate) fn wake_all(&self) {
        let _slot = lock(&self.slot);
        self.released.notify_all();
    }
}

/// Held writer token. Returned to the token on drop.
pub(crate) struct TokenGuard<'a> {
    token: &'a WriterToken,
    writer: Option<ConnectionWriter>,
}

impl TokenGuard<'_> {
    /// Write one complete frame and flush it.
    pub(crate) fn send(
        &mut self,
        stream_id: StreamId,
        payload: &[u8],
    ) -> framemux_frame::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.send(stream_id, payload),
            None => Err(framemux_frame::FrameError::ConnectionClosed),
        }
    }

    /// Drop the write half instead of returning it. Used after a write
    /// error, when the connection can no longer carry frames.
    pub(crate) fn discard(mut self) {
        self.writer = None;
    }
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(&self.token.slot);
        if let Some(writer) = self.writer.take() {
            *slot = Some(writer);
            self.token.released.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn token_over(sink: SharedSink) -> WriterToken {
        WriterToken::new(FrameWriter::new(Box::new(sink)))
    }

    fn open() -> Option<Termination> {
        None
    }

    #[test]
    fn guard_writes_and_returns_token() {
        let sink = SharedSink::default();
        let token = token_over(sink.clone());

        {
            let mut guard = token.acquire(None, open).unwrap();
            guard.send(3, b"abc").unwrap();
        }
        {
            let mut guard = token.acquire(None, open).unwrap();
            guard.send(4, b"").unwrap();
        }

        assert_eq!(sink.0.lock().unwrap().as_slice(), &[3, 6, b'a', b'b', b'c', 4, 0]);
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let token = token_over(SharedSink::default());
        let _held = token.acquire(None, open).unwrap();

        let start = Instant::now();
        let err = token
            .acquire(Some(Duration::from_millis(30)), open)
            .err()
            .unwrap();
        assert!(matches!(err, MuxError::Timeout(_)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn waiter_gets_token_on_release() {
        let token = Arc::new(token_over(SharedSink::default()));
        let held = token.acquire(None, open).unwrap();

        let waiter = {
            let token = Arc::clone(&token);
            thread::spawn(move || token.acquire(Some(Duration::from_secs(5)), open).is_ok())
        };

        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn termination_fails_waiters() {
        let token = Arc::new(token_over(SharedSink::default()));
        let stopped = Arc::new(Mutex::new(None::<Termination>));
        let held = token.acquire(None, open).unwrap();

        let waiter = {
            let token = Arc::clone(&token);
            let stopped = Arc::clone(&stopped);
            thread::spawn(move || {
                token
                    .acquire(None, || stopped.lock().unwrap().clone())
                    .err()
            })
        };

        thread::sleep(Duration::from_millis(20));
        *stopped.lock().unwrap() = Some(Termination::Broken("write failed".to_string()));
        held.discard();
        token.wake_all();

        let err = waiter.join().unwrap().unwrap();
        assert!(matches!(err, MuxError::Broken(_)));
    }

    #[test]
    fn discarded_writer_is_not_returned() {
        let token = token_over(SharedSink::default());
        token.acquire(None, open).unwrap().discard();

        let err = token
            .acquire(Some(Duration::from_millis(10)), open)
            .err()
            .unwrap();
        assert!(matches!(err, MuxError::Timeout(_)));
    }

    #[test]
    fn cursor_writer_is_accepted() {
        let token = WriterToken::new(FrameWriter::new(Box::new(Cursor::new(Vec::new()))));
        let mut guard = token.acquire(None, open).unwrap();
        guard.send(1, b"x").unwrap();
    }
}
