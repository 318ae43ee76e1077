/// Errors reported by the connection manager.
///
/// Protocol violations are not errors; they end in a disconnect with a coded
/// reason. These variants cover malformed input and misuse of the manager.
#[derive(Debug, thiserror::Error)]
pub enum SafeComError {
    /// Malformed or corrupted PDU.
    #[error("pdu error: {0}")]
    Pdu(#[from] safecom_pdu::PduError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] safecom_transport::TransportError),

    /// An operation was called before `initialize`.
    #[error("safecom is not initialized")]
    NotInitialized,

    /// `initialize` was called twice without `shutdown` in between.
    #[error("safecom is already initialized")]
    AlreadyInitialized,

    /// The channel id is not below the configured channel count.
    #[error("channel {channel} out of range (channel count {count})")]
    ChannelOutOfRange { channel: u32, count: u32 },

    /// The channel's event queue cannot take another event.
    #[error("event queue of channel {channel} full (capacity {capacity})")]
    QueueFull { channel: u32, capacity: usize },

    /// No channel is configured for the addressed receiver/sender pair.
    #[error("no channel for receiver {receiver_id} / sender {sender_id}")]
    UnknownAddress { receiver_id: u32, sender_id: u32 },

    /// A PDU delivered on a channel names another channel's address.
    #[error("pdu for receiver {receiver_id} / sender {sender_id} arrived on channel {channel}")]
    AddressMismatch {
        channel: u32,
        receiver_id: u32,
        sender_id: u32,
    },

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON configuration could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SafeComError>;
