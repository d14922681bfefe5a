//! Duplex connection abstraction.
//!
//! The multiplexer never dials, listens or negotiates. It is handed an
//! already-established, reliable, ordered byte connection and needs exactly
//! three things from it:
//! - an owned read half, driven by a single background reader
//! - an owned write half, driven by whoever holds the writer token
//! - a way to shut both down so a blocked reader returns
//!
//! [`Connection`] is that seam. It is implemented here for TCP, Unix domain
//! sockets and arbitrary independent halves via [`Duplex`].

pub mod duplex;
pub mod error;
pub mod traits;

pub use duplex::Duplex;
pub use error::{Result, TransportError};
pub use traits::{Connection, Halves, NoShutdown, Shutdown, ShutdownHandle};
