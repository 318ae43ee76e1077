//! Safety and retransmission layer for point-to-point links over unreliable
//! datagram transports, following the RaSTA protocol family.
//!
//! # Crate Structure
//!
//! - [`transport`]: the `SpduSink` seam, Unix datagram sockets and an in-memory link
//! - [`pdu`]: SPDU types, wire codec and integrity code
//! - [`core`]: per-channel state machine, timers and the `SafeCom` connection manager

/// Re-export transport types.
pub mod transport {
    pub use safecom_transport::*;
}

/// Re-export PDU types.
pub mod pdu {
    pub use safecom_pdu::*;
}

/// Re-export state machine and connection manager types.
pub mod core {
    pub use safecom_core::*;
}
