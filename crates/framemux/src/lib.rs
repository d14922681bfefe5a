//! Many independent, ordered, blocking byte streams over one connection.
//!
//! A [`Mux`] takes any reliable duplex byte connection and hands out
//! [`Stream`]s keyed by a one-byte identifier. Each stream reads and writes
//! like its own socket; on the wire the connection carries frames of
//! `stream id | varint length | payload`.
//!
//! - One reader thread per mux decodes frames and appends each payload to
//!   its stream's buffer, waking a blocked reader.
//! - Writers serialize through a writer token so every frame reaches the
//!   connection whole.
//! - A framing or connection failure terminates the mux; every blocked and
//!   future stream operation observes it instead of hanging.
//!
//! # Crate Structure
//!
//! - [`transport`]: The [`Connection`](transport::Connection) seam (TCP, UDS, paired halves)
//! - [`frame`]: Wire codec, frame reader and writer

mod keepalive;
mod pump;
mod registry;
mod sync;
mod token;

pub mod config;
pub mod error;
pub mod mux;
pub mod stream;

pub use config::{MuxConfig, UnknownStreamPolicy};
pub use error::{MuxError, Result, Termination};
pub use framemux_frame::StreamId;
pub use mux::Mux;
pub use stream::Stream;

/// Re-export transport types.
pub mod transport {
    pub use framemux_transport::*;
}

/// Re-export frame types.
///
/// With the `async` feature this also carries `MuxCodec`, a
/// `tokio_util::codec` implementation of the same wire format for peers
/// that speak to a mux from async code.
pub mod frame {
    pub use framemux_frame::*;
}
