/// Errors that can occur while encoding or decoding a PDU.
#[derive(Debug, thiserror::Error)]
pub enum PduError {
    /// The buffer ends before the frame does.
    #[error("truncated PDU ({len} bytes, need {needed})")]
    Truncated { len: usize, needed: usize },

    /// The declared message length is smaller than the fixed fields.
    #[error("invalid message length {declared}")]
    InvalidLength { declared: usize },

    /// The message type is not part of the protocol.
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// The payload length does not match what the message type requires.
    #[error("invalid {kind} payload length ({len} bytes, expected {expected})")]
    InvalidPayloadLength {
        kind: &'static str,
        len: usize,
        expected: usize,
    },

    /// The payload does not fit into the 16-bit message length.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The destination buffer cannot hold the encoded PDU.
    #[error("buffer too small ({available} bytes, need {needed})")]
    BufferTooSmall { needed: usize, available: usize },

    /// A disconnection request carries a reason code outside the protocol.
    #[error("unknown disconnect reason {0}")]
    UnknownDiscReason(u16),

    /// The trailing integrity code does not match the frame contents.
    #[error("safety code mismatch")]
    SafetyCodeMismatch,
}

pub type Result<T> = std::result::Result<T, PduError>;
