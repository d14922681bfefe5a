use std::io::ErrorKind;
use std::time::Duration;

/// Errors returned by mux and stream operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Transport-level error while taking the connection apart.
    #[error("transport error: {0}")]
    Transport(#[from] framemux_transport::TransportError),

    /// Frame-level error on this caller's own write.
    #[error("frame error: {0}")]
    Frame(#[from] framemux_frame::FrameError),

    /// I/O error outside the frame path (e.g. spawning a worker thread).
    #[error("mux I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The mux was closed locally.
    #[error("mux closed")]
    Closed,

    /// The peer closed the connection on a frame boundary.
    #[error("connection closed by peer")]
    PeerClosed,

    /// The shared connection failed; every stream is unusable.
    #[error("connection broken: {0}")]
    Broken(String),

    /// A read or writer-token wait ran past its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// `accept` needs lazy stream creation.
    #[error("accept requires the lazy unknown-stream policy")]
    LazyCreationDisabled,

    /// The mux configuration is unusable.
    #[error("invalid mux config: {0}")]
    InvalidConfig(&'static str),
}

impl MuxError {
    /// True for the orderly end states (`Closed`, `PeerClosed`).
    pub fn is_clean_close(&self) -> bool {
        matches!(self, MuxError::Closed | MuxError::PeerClosed)
    }
}

impl From<MuxError> for std::io::Error {
    fn from(err: MuxError) -> Self {
        let kind = match &err {
            MuxError::Timeout(_) => ErrorKind::TimedOut,
            MuxError::Closed | MuxError::PeerClosed => ErrorKind::NotConnected,
            MuxError::Broken(_) => ErrorKind::BrokenPipe,
            MuxError::Frame(framemux_frame::FrameError::Io(io)) | MuxError::Io(io) => io.kind(),
            MuxError::Frame(framemux_frame::FrameError::ConnectionClosed) => {
                ErrorKind::UnexpectedEof
            }
            MuxError::Frame(_) => ErrorKind::InvalidData,
            MuxError::LazyCreationDisabled => ErrorKind::Unsupported,
            MuxError::InvalidConfig(_) => ErrorKind::InvalidInput,
            MuxError::Transport(_) => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

/// Why a mux stopped. Recorded once; every later operation observes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// `Mux::close` was called or the mux was dropped.
    Closed,
    /// The peer closed the connection between frames.
    PeerClosed,
    /// Framing or connection failure.
    Broken(String),
}

impl Termination {
    /// The error handed to operations on a terminated mux.
    pub fn to_error(&self) -> MuxError {
        match self {
            Termination::Closed => MuxError::Closed,
            Termination::PeerClosed => MuxError::PeerClosed,
            Termination::Broken(reason) => MuxError::Broken(reason.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
