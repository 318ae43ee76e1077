use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PduError, Result};

/// Protocol version carried by connection requests and responses: "0301".
pub const PROTOCOL_VERSION: [u8; 4] = *b"0301";

/// Connection request/response payload length.
pub const CONNECTION_PAYLOAD_LEN: usize = 14;

/// Disconnection request payload length.
pub const DISCONNECT_PAYLOAD_LEN: usize = 4;

/// Default advertised receive buffer size, in messages.
pub const DEFAULT_N_SEND_MAX: u16 = 0xFFFF;

const RESERVED_LEN: usize = 8;

/// Payload of CONNECTION_REQUEST and CONNECTION_RESPONSE.
///
/// Four ASCII version digits, the sender's receive buffer size (N_sendmax) and
/// eight reserved zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionPayload {
    pub version: [u8; 4],
    pub n_send_max: u16,
}

impl ConnectionPayload {
    pub fn new(n_send_max: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            n_send_max,
        }
    }

    /// Whether the peer speaks our protocol version.
    pub fn version_matches(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CONNECTION_PAYLOAD_LEN);
        buf.put_slice(&self.version);
        buf.put_u16(self.n_send_max);
        buf.put_bytes(0, RESERVED_LEN);
        buf.freeze()
    }

    /// Decode from a payload. Reserved bytes are not checked.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() != CONNECTION_PAYLOAD_LEN {
            return Err(PduError::InvalidPayloadLength {
                kind: "connection",
                len: src.len(),
                expected: CONNECTION_PAYLOAD_LEN,
            });
        }
        let mut buf = src;
        let mut version = [0u8; 4];
        buf.copy_to_slice(&mut version);
        let n_send_max = buf.get_u16();
        Ok(Self {
            version,
            n_send_max,
        })
    }
}

impl Default for ConnectionPayload {
    fn default() -> Self {
        Self::new(DEFAULT_N_SEND_MAX)
    }
}

/// Coded reason carried by a DISCONNECTION_REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DiscReason {
    UserRequest = 0,
    UndefinedMsgTypeRecv = 1,
    NotExpectedRecvMsgType = 2,
    SeqNbrErrForConnection = 3,
    TimeoutIncomingMsg = 4,
    StateServiceNotAllowed = 5,
    ProtocolVersionError = 6,
    FailRetransmission = 7,
    SeqErr = 8,
}

impl DiscReason {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::UserRequest => "USER_REQUEST",
            Self::UndefinedMsgTypeRecv => "UNDEFINED_MSG_TYPE_RECV",
            Self::NotExpectedRecvMsgType => "NOT_EXPECTED_RECV_MSG_TYPE",
            Self::SeqNbrErrForConnection => "SEQ_NBR_ERR_FOR_CONNECTION",
            Self::TimeoutIncomingMsg => "TIMEOUT_INCOMING_MSG",
            Self::StateServiceNotAllowed => "STATE_SERVICE_NOT_ALLOWED",
            Self::ProtocolVersionError => "PROTOCOL_VERSION_ERROR",
            Self::FailRetransmission => "FAIL_RETRANSMISSION",
            Self::SeqErr => "SEQ_ERR",
        }
    }
}

impl TryFrom<u16> for DiscReason {
    type Error = PduError;

    fn try_from(code: u16) -> Result<Self> {
        Ok(match code {
            0 => Self::UserRequest,
            1 => Self::UndefinedMsgTypeRecv,
            2 => Self::NotExpectedRecvMsgType,
            3 => Self::SeqNbrErrForConnection,
            4 => Self::TimeoutIncomingMsg,
            5 => Self::StateServiceNotAllowed,
            6 => Self::ProtocolVersionError,
            7 => Self::FailRetransmission,
            8 => Self::SeqErr,
            other => return Err(PduError::UnknownDiscReason(other)),
        })
    }
}

impl std::fmt::Display for DiscReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of DISCONNECTION_REQUEST: detail code, then reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectPayload {
    pub detail: u16,
    pub reason: DiscReason,
}

impl DisconnectPayload {
    pub fn new(reason: DiscReason) -> Self {
        Self { detail: 0, reason }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DISCONNECT_PAYLOAD_LEN);
        buf.put_u16(self.detail);
        buf.put_u16(self.reason.code());
        buf.freeze()
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() != DISCONNECT_PAYLOAD_LEN {
            return Err(PduError::InvalidPayloadLength {
                kind: "disconnection",
                len: src.len(),
                expected: DISCONNECT_PAYLOAD_LEN,
            });
        }
        let mut buf = src;
        let detail = buf.get_u16();
        let reason = DiscReason::try_from(buf.get_u16())?;
        Ok(Self { detail, reason })
    }
}
