//! Unreliable byte-pipe abstraction underneath the safety layer.
//!
//! The safety layer never assumes delivery, ordering or integrity from the
//! transport; it only needs a way to hand off one encoded SPDU per call.
//! This crate provides:
//! - the [`SpduSink`] trait the connection manager sends through
//! - Unix datagram sockets (Linux/macOS)
//! - an in-process [`MemoryLink`] for tests and simulations

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::{MemoryEndpoint, MemoryLink};
pub use traits::SpduSink;

#[cfg(unix)]
pub use uds::DatagramSocket;
