/// Errors that can occur while preparing a connection for multiplexing.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be split into independent halves.
    #[error("failed to split {transport} connection: {source}")]
    Split {
        transport: &'static str,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
