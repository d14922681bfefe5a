use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use framemux_frame::{FrameConfig, FrameReader, FrameWriter, StreamId};
use framemux_transport::{Connection, Halves, ShutdownHandle};
use tracing::{debug, warn};

use crate::config::{MuxConfig, UnknownStreamPolicy};
use crate::error::{MuxError, Result, Termination};
use crate::registry::Registry;
use crate::stream::{Stream, StreamCore};
use crate::sync::{deadline, expired, lock, wait_until};
use crate::token::WriterToken;
use crate::{keepalive, pump};

/// State shared by the mux handle, its streams and its worker threads.
pub(crate) struct Shared {
    config: MuxConfig,
    registry: Registry,
    token: WriterToken,
    terminal: Mutex<Option<Termination>>,
    terminal_changed: Condvar,
    accept_queue: Mutex<VecDeque<Arc<StreamCore>>>,
    accept_ready: Condvar,
    shutdown: ShutdownHandle,
}

impl Shared {
    pub(crate) fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub(crate) fn termination(&self) -> Option<Termination> {
        lock(&self.terminal).clone()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        lock(&self.terminal).is_some()
    }

    /// Block up to `timeout` for the mux to terminate. True if it has.
    pub(crate) fn wait_for_termination(&self, timeout: Duration) -> bool {
        let deadline = deadline(Some(timeout));
        let mut terminal = lock(&self.terminal);
        while terminal.is_none() && !expired(deadline) {
            terminal = wait_until(&self.terminal_changed, terminal, deadline);
        }
        terminal.is_some()
    }

    /// Record the terminal state and release everything blocked on the mux.
    ///
    /// Only the first call has an effect; returns whether this was it.
    pub(crate) fn terminate(&self, termination: Termination) -> bool {
        {
            let mut terminal = lock(&self.terminal);
            if terminal.is_some() {
                return false;
            }
            *terminal = Some(termination.clone());
            self.terminal_changed.notify_all();
        }

        match &termination {
            Termination::Broken(reason) => warn!(%reason, "mux broken"),
            other => debug!(termination = ?other, "mux terminated"),
        }

        if let Err(err) = self.shutdown.shutdown() {
            debug!(error = %err, "connection shutdown failed");
        }

        // The terminal state is already visible, so every waiter woken below
        // observes it when it re-checks under its own lock.
        self.token.wake_all();
        for core in self.registry.snapshot() {
            core.wake_all();
        }
        let _queue = lock(&self.accept_queue);
        self.accept_ready.notify_all();
        true
    }

    pub(crate) fn lookup(&self, id: StreamId) -> Option<Arc<StreamCore>> {
        self.registry.lookup(id)
    }

    /// Get or create a stream on behalf of the local user.
    pub(crate) fn open(&self, id: StreamId) -> Arc<StreamCore> {
        let (core, created) = self.registry.get_or_create(id);
        if created {
            debug!(stream_id = id, "stream opened");
        }
        core
    }

    /// Get or create a stream for an incoming frame; new ones are queued for
    /// `accept`.
    pub(crate) fn open_lazy(&self, id: StreamId) -> Arc<StreamCore> {
        let (core, created) = self.registry.get_or_create(id);
        if created {
            debug!(stream_id = id, "stream created by peer");
            lock(&self.accept_queue).push_back(Arc::clone(&core));
            self.accept_ready.notify_one();
        }
        core
    }

    /// Write one frame under the writer token.
    ///
    /// A write error breaks the mux; the writer is not handed on.
    pub(crate) fn send_frame(
        &self,
        stream_id: StreamId,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut guard = self.token.acquire(timeout, || self.termination())?;
        if let Err(err) = guard.send(stream_id, payload) {
            guard.discard();
            self.terminate(Termination::Broken(format!("write failed: {err}")));
            return Err(MuxError::Frame(err));
        }
        Ok(())
    }
}

/// Multiplexes independent byte streams over one connection.
///
/// Creating a mux starts a reader thread that owns the connection's read
/// half for the mux's lifetime. The write half is shared through the writer
/// token. Dropping the mux closes it; stream handles that outlive it fail
/// with [`MuxError::Closed`].
pub struct Mux {
    shared: Arc<Shared>,
}

impl Mux {
    /// Start multiplexing `connection` with default configuration.
    pub fn new<C: Connection>(connection: C) -> Result<Self> {
        Self::with_config(connection, MuxConfig::default())
    }

    /// Start multiplexing `connection` with explicit configuration.
    pub fn with_config<C: Connection>(connection: C, config: MuxConfig) -> Result<Self> {
        config.validate()?;

        let transport = connection.transport_name();
        let Halves {
            reader,
            writer,
            shutdown,
        } = connection.into_halves()?;

        let frame_config = FrameConfig {
            max_payload_size: config.max_frame_payload,
        };
        let writer: Box<dyn Write + Send> = Box::new(writer);
        let keepalive_interval = config.keepalive_interval;

        let shared = Arc::new(Shared {
            config,
            registry: Registry::default(),
            token: WriterToken::new(FrameWriter::with_config(writer, frame_config.clone())),
            terminal: Mutex::new(None),
            terminal_changed: Condvar::new(),
            accept_queue: Mutex::new(VecDeque::new()),
            accept_ready: Condvar::new(),
            shutdown,
        });

        let started = pump::spawn(
            FrameReader::with_config(reader, frame_config),
            Arc::clone(&shared),
        )
        .and_then(|()| match keepalive_interval {
            Some(interval) => keepalive::spawn(Arc::clone(&shared), interval),
            None => Ok(()),
        });
        if let Err(err) = started {
            shared.terminate(Termination::Closed);
            return Err(MuxError::Io(err));
        }

        debug!(transport, "mux started");
        Ok(Self { shared })
    }

    /// The stream for `id`, created if this mux has not seen it yet.
    ///
    /// Repeated calls return handles to the same stream.
    pub fn stream(&self, id: StreamId) -> Stream {
        Stream::new(self.shared.open(id), Arc::clone(&self.shared))
    }

    /// The stream for `id` if it exists.
    pub fn get(&self, id: StreamId) -> Option<Stream> {
        self.shared
            .lookup(id)
            .map(|core| Stream::new(core, Arc::clone(&self.shared)))
    }

    /// Wait for the next stream the peer opened by writing to an unseen id.
    ///
    /// Requires [`UnknownStreamPolicy::Lazy`].
    pub fn accept(&self) -> Result<Stream> {
        self.accept_until(None)
    }

    /// [`accept`](Self::accept) with a time limit.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Stream> {
        self.accept_until(Some(timeout))
    }

    /// Send a zero-length frame. The peer ignores it; a failure means the
    /// connection is gone.
    pub fn probe(&self, id: StreamId) -> Result<()> {
        self.shared
            .send_frame(id, &[], self.shared.config().write_timeout)
    }

    /// Close the mux and shut the connection down. Idempotent.
    pub fn close(&self) {
        self.shared.terminate(Termination::Closed);
    }

    /// Why the mux stopped, if it has.
    pub fn termination(&self) -> Option<Termination> {
        self.shared.termination()
    }

    /// True once the mux was closed or its connection ended.
    pub fn is_terminated(&self) -> bool {
        self.shared.is_terminated()
    }

    /// Number of streams created so far.
    pub fn stream_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn config(&self) -> &MuxConfig {
        self.shared.config()
    }

    fn accept_until(&self, timeout: Option<Duration>) -> Result<Stream> {
        if self.shared.config().unknown_stream_policy != UnknownStreamPolicy::Lazy {
            return Err(MuxError::LazyCreationDisabled);
        }

        let deadline = deadline(timeout);
        let mut queue = lock(&self.shared.accept_queue);
        loop {
            if let Some(core) = queue.pop_front() {
                return Ok(Stream::new(core, Arc::clone(&self.shared)));
            }
            if let Some(termination) = self.shared.termination() {
                return Err(termination.to_error());
            }
            if expired(deadline) {
                return Err(MuxError::Timeout(timeout.unwrap_or_default()));
            }
            queue = wait_until(&self.shared.accept_ready, queue, deadline);
        }
    }
}

impl Drop for Mux {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Mux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mux")
            .field("streams", &self.stream_count())
            .field("termination", &self.termination())
            .finish()
    }
}
