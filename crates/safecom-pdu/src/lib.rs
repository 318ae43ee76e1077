//! Protocol data units of the safety layer.
//!
//! Every PDU is a fixed big-endian header followed by a type-dependent payload
//! and an 8-byte integrity code:
//! - length, type, receiver, sender
//! - sequence and confirmed sequence numbers
//! - timestamp and confirmed timestamp
//!
//! The integrity code is a truncated MD4 digest. It detects corruption on the
//! lower transport; it does not authenticate anything.

pub mod codec;
pub mod error;
pub mod payload;

pub use codec::{
    compute_safety_code, decode_pdu, encode_pdu, encode_pdu_to_slice, MessageType, Pdu,
    FIXED_FIELDS_LEN, HEADER_LEN, MAX_PAYLOAD, SAFETY_CODE_LEN,
};
pub use error::{PduError, Result};
pub use payload::{
    ConnectionPayload, DiscReason, DisconnectPayload, CONNECTION_PAYLOAD_LEN,
    DEFAULT_N_SEND_MAX, DISCONNECT_PAYLOAD_LEN, PROTOCOL_VERSION,
};
