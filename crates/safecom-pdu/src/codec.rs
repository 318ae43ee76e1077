use bytes::{Buf, BufMut, Bytes, BytesMut};
use md4::{Digest, Md4};
use tracing::trace;

use crate::error::{PduError, Result};

/// Header: length (2) + type (2) + receiver (4) + sender (4) + seq (4)
/// + confirmed seq (4) + timestamp (4) + confirmed timestamp (4) = 28 bytes.
pub const HEADER_LEN: usize = 28;

/// Trailing integrity code length.
pub const SAFETY_CODE_LEN: usize = 8;

/// Header plus integrity code: the smallest valid PDU and the part of
/// `message_length` that is not payload.
pub const FIXED_FIELDS_LEN: usize = HEADER_LEN + SAFETY_CODE_LEN;

/// Largest payload representable in the 16-bit message length.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - FIXED_FIELDS_LEN;

/// PDU message types and their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    ConnectionRequest = 6200,
    ConnectionResponse = 6201,
    RetransmissionRequest = 6212,
    RetransmissionResponse = 6213,
    DisconnectionRequest = 6216,
    Heartbeat = 6220,
    Data = 6240,
    RetransmittedData = 6241,
}

impl MessageType {
    /// The wire code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Payload length required by this type, or `None` for variable payloads.
    pub fn fixed_payload_len(self) -> Option<usize> {
        match self {
            Self::ConnectionRequest | Self::ConnectionResponse => {
                Some(crate::payload::CONNECTION_PAYLOAD_LEN)
            }
            Self::DisconnectionRequest => Some(crate::payload::DISCONNECT_PAYLOAD_LEN),
            Self::RetransmissionRequest | Self::RetransmissionResponse | Self::Heartbeat => Some(0),
            Self::Data | Self::RetransmittedData => None,
        }
    }

    /// Protocol name of the message type.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConnectionRequest => "CONNECTION_REQUEST",
            Self::ConnectionResponse => "CONNECTION_RESPONSE",
            Self::RetransmissionRequest => "RETRANSMISSION_REQUEST",
            Self::RetransmissionResponse => "RETRANSMISSION_RESPONSE",
            Self::DisconnectionRequest => "DISCONNECTION_REQUEST",
            Self::Heartbeat => "HEARTBEAT",
            Self::Data => "DATA",
            Self::RetransmittedData => "RETRANSMITTED_DATA",
        }
    }
}

impl TryFrom<u16> for MessageType {
    type Error = PduError;

    fn try_from(code: u16) -> Result<Self> {
        Ok(match code {
            6200 => Self::ConnectionRequest,
            6201 => Self::ConnectionResponse,
            6212 => Self::RetransmissionRequest,
            6213 => Self::RetransmissionResponse,
            6216 => Self::DisconnectionRequest,
            6220 => Self::Heartbeat,
            6240 => Self::Data,
            6241 => Self::RetransmittedData,
            other => return Err(PduError::UnknownMessageType(other)),
        })
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A protocol data unit.
///
/// `message_length` is not stored; it always follows from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub message_type: MessageType,
    pub receiver_id: u32,
    pub sender_id: u32,
    pub sequence_number: u32,
    pub confirmed_sequence_number: u32,
    pub timestamp: u32,
    pub confirmed_timestamp: u32,
    pub payload: Bytes,
    pub safety_code: [u8; SAFETY_CODE_LEN],
}

impl Pdu {
    /// Create a PDU with zeroed header fields and no safety code yet.
    pub fn new(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            receiver_id: 0,
            sender_id: 0,
            sequence_number: 0,
            confirmed_sequence_number: 0,
            timestamp: 0,
            confirmed_timestamp: 0,
            payload: payload.into(),
            safety_code: [0; SAFETY_CODE_LEN],
        }
    }

    /// Value of the on-wire `message_length` field.
    pub fn message_length(&self) -> usize {
        FIXED_FIELDS_LEN + self.payload.len()
    }

    /// Compute the integrity code and store it in the PDU.
    pub fn seal(&mut self) -> Result<()> {
        self.safety_code = compute_safety_code(self)?;
        Ok(())
    }

    /// Check the stored integrity code against the PDU contents.
    pub fn verify(&self) -> Result<()> {
        let expected = compute_safety_code(self)?;
        if expected != self.safety_code {
            trace!(
                message_type = %self.message_type,
                seq = self.sequence_number,
                "safety code mismatch"
            );
            return Err(PduError::SafetyCodeMismatch);
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.message_length());
        encode_pdu(self, &mut buf)?;
        Ok(buf.freeze())
    }

    fn check_payload(&self) -> Result<()> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD {
            return Err(PduError::PayloadTooLarge {
                size: len,
                max: MAX_PAYLOAD,
            });
        }
        match self.message_type.fixed_payload_len() {
            Some(expected) if expected != len => Err(PduError::InvalidPayloadLength {
                kind: self.message_type.name(),
                len,
                expected,
            }),
            _ => Ok(()),
        }
    }

    fn put_unsealed(&self, dst: &mut BytesMut) {
        // check_payload bounds message_length to u16
        dst.put_u16(self.message_length() as u16);
        dst.put_u16(self.message_type.code());
        dst.put_u32(self.receiver_id);
        dst.put_u32(self.sender_id);
        dst.put_u32(self.sequence_number);
        dst.put_u32(self.confirmed_sequence_number);
        dst.put_u32(self.timestamp);
        dst.put_u32(self.confirmed_timestamp);
        dst.put_slice(&self.payload);
    }
}

/// Compute the integrity code of a PDU.
///
/// MD4 over every byte preceding the trailer, truncated to the first
/// [`SAFETY_CODE_LEN`] bytes of the digest.
pub fn compute_safety_code(pdu: &Pdu) -> Result<[u8; SAFETY_CODE_LEN]> {
    pdu.check_payload()?;
    let mut unsealed = BytesMut::with_capacity(pdu.message_length() - SAFETY_CODE_LEN);
    pdu.put_unsealed(&mut unsealed);

    let digest = Md4::digest(&unsealed);
    let mut code = [0u8; SAFETY_CODE_LEN];
    code.copy_from_slice(&digest[..SAFETY_CODE_LEN]);
    Ok(code)
}

/// Encode a PDU into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌────────┬──────┬──────────┬────────┬─────┬──────────┬────┬───────────┬─────────┬─────────────┐
/// │ Length │ Type │ Receiver │ Sender │ Seq │ Conf seq │ TS │ Conf TS   │ Payload │ Safety code │
/// │ (2B)   │ (2B) │ (4B)     │ (4B)   │(4B) │ (4B)     │(4B)│ (4B)      │ (0..n)  │ (8B)        │
/// └────────┴──────┴──────────┴────────┴─────┴──────────┴────┴───────────┴─────────┴─────────────┘
/// ```
///
/// The stored safety code is written as is; call [`Pdu::seal`] first.
pub fn encode_pdu(pdu: &Pdu, dst: &mut BytesMut) -> Result<()> {
    pdu.check_payload()?;
    dst.reserve(pdu.message_length());
    pdu.put_unsealed(dst);
    dst.put_slice(&pdu.safety_code);
    Ok(())
}

/// Encode a PDU into a caller-provided buffer, returning the bytes written.
pub fn encode_pdu_to_slice(pdu: &Pdu, dst: &mut [u8]) -> Result<usize> {
    let needed = pdu.message_length();
    if dst.len() < needed {
        return Err(PduError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }
    let mut buf = BytesMut::with_capacity(needed);
    encode_pdu(pdu, &mut buf)?;
    dst[..needed].copy_from_slice(&buf);
    Ok(needed)
}

/// Decode one PDU from the front of `src`.
///
/// Bytes beyond the declared message length are ignored. The safety code is
/// returned as received; use [`Pdu::verify`] to check it.
pub fn decode_pdu(src: &[u8]) -> Result<Pdu> {
    if src.len() < FIXED_FIELDS_LEN {
        return Err(PduError::Truncated {
            len: src.len(),
            needed: FIXED_FIELDS_LEN,
        });
    }

    let mut buf = src;
    let declared = buf.get_u16() as usize;
    if declared < FIXED_FIELDS_LEN {
        return Err(PduError::InvalidLength { declared });
    }
    if src.len() < declared {
        return Err(PduError::Truncated {
            len: src.len(),
            needed: declared,
        });
    }

    let message_type = MessageType::try_from(buf.get_u16())?;
    let payload_len = declared - FIXED_FIELDS_LEN;
    if let Some(expected) = message_type.fixed_payload_len() {
        if expected != payload_len {
            return Err(PduError::InvalidPayloadLength {
                kind: message_type.name(),
                len: payload_len,
                expected,
            });
        }
    }

    let receiver_id = buf.get_u32();
    let sender_id = buf.get_u32();
    let sequence_number = buf.get_u32();
    let confirmed_sequence_number = buf.get_u32();
    let timestamp = buf.get_u32();
    let confirmed_timestamp = buf.get_u32();
    let payload = Bytes::copy_from_slice(&buf[..payload_len]);
    buf.advance(payload_len);
    let mut safety_code = [0u8; SAFETY_CODE_LEN];
    buf.copy_to_slice(&mut safety_code);

    Ok(Pdu {
        message_type,
        receiver_id,
        sender_id,
        sequence_number,
        confirmed_sequence_number,
        timestamp,
        confirmed_timestamp,
        payload,
        safety_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ConnectionPayload;

    fn heartbeat() -> Pdu {
        let mut pdu = Pdu::new(MessageType::Heartbeat, Bytes::new());
        pdu.receiver_id = 7;
        pdu.sender_id = 9;
        pdu.sequence_number = 0xDEAD_BEEF;
        pdu.confirmed_sequence_number = 41;
        pdu.timestamp = 1_000;
        pdu.confirmed_timestamp = 990;
        pdu.seal().unwrap();
        pdu
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut pdu = Pdu::new(MessageType::Data, &b"hello, interlocking"[..]);
        pdu.sequence_number = u32::MAX;
        pdu.seal().unwrap();

        let mut buf = BytesMut::new();
        encode_pdu(&pdu, &mut buf).unwrap();
        assert_eq!(buf.len(), FIXED_FIELDS_LEN + 19);

        let decoded = decode_pdu(&buf).unwrap();
        assert_eq!(decoded, pdu);
        decoded.verify().unwrap();
    }

    #[test]
    fn test_header_is_big_endian_in_field_order() {
        let wire = heartbeat().to_bytes().unwrap();

        assert_eq!(&wire[0..2], &[0x00, 0x24]); // 36
        assert_eq!(&wire[2..4], &6220u16.to_be_bytes());
        assert_eq!(&wire[4..8], &7u32.to_be_bytes());
        assert_eq!(&wire[8..12], &9u32.to_be_bytes());
        assert_eq!(&wire[12..16], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&wire[16..20], &41u32.to_be_bytes());
        assert_eq!(&wire[20..24], &1_000u32.to_be_bytes());
        assert_eq!(&wire[24..28], &990u32.to_be_bytes());
        assert_eq!(wire.len(), FIXED_FIELDS_LEN);
    }

    #[test]
    fn test_safety_code_is_truncated_md4_of_preceding_bytes() {
        let pdu = heartbeat();
        let wire = pdu.to_bytes().unwrap();

        let digest = Md4::digest(&wire[..wire.len() - SAFETY_CODE_LEN]);
        assert_eq!(&wire[wire.len() - SAFETY_CODE_LEN..], &digest[..SAFETY_CODE_LEN]);
        assert_eq!(pdu.safety_code[..], digest[..SAFETY_CODE_LEN]);
    }

    #[test]
    fn test_corrupted_byte_fails_verification() {
        let wire = heartbeat().to_bytes().unwrap();
        let mut corrupted = wire.to_vec();
        corrupted[13] ^= 0x01;

        let decoded = decode_pdu(&corrupted).unwrap();
        assert!(matches!(decoded.verify(), Err(PduError::SafetyCodeMismatch)));
    }

    #[test]
    fn test_decode_shorter_than_fixed_fields() {
        let result = decode_pdu(&[0u8; FIXED_FIELDS_LEN - 1]);
        assert!(matches!(
            result,
            Err(PduError::Truncated { len: 35, needed: 36 })
        ));
    }

    #[test]
    fn test_decode_shorter_than_declared_length() {
        let mut pdu = Pdu::new(MessageType::Data, &b"0123456789"[..]);
        pdu.seal().unwrap();
        let wire = pdu.to_bytes().unwrap();

        let result = decode_pdu(&wire[..wire.len() - 1]);
        assert!(matches!(result, Err(PduError::Truncated { .. })));
    }

    #[test]
    fn test_decode_declared_length_below_minimum() {
        let mut wire = heartbeat().to_bytes().unwrap().to_vec();
        wire[0..2].copy_from_slice(&20u16.to_be_bytes());

        let result = decode_pdu(&wire);
        assert!(matches!(result, Err(PduError::InvalidLength { declared: 20 })));
    }

    #[test]
    fn test_decode_unknown_message_type() {
        let mut wire = heartbeat().to_bytes().unwrap().to_vec();
        wire[2..4].copy_from_slice(&6230u16.to_be_bytes());

        let result = decode_pdu(&wire);
        assert!(matches!(result, Err(PduError::UnknownMessageType(6230))));
    }

    #[test]
    fn test_decode_rejects_payload_on_heartbeat() {
        let mut data = Pdu::new(MessageType::Data, &b"abcd"[..]);
        data.seal().unwrap();
        let mut wire = data.to_bytes().unwrap().to_vec();
        wire[2..4].copy_from_slice(&MessageType::Heartbeat.code().to_be_bytes());

        let result = decode_pdu(&wire);
        assert!(matches!(
            result,
            Err(PduError::InvalidPayloadLength {
                kind: "HEARTBEAT",
                len: 4,
                expected: 0
            })
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let pdu = heartbeat();
        let mut wire = pdu.to_bytes().unwrap().to_vec();
        wire.extend_from_slice(b"garbage");

        assert_eq!(decode_pdu(&wire).unwrap(), pdu);
    }

    #[test]
    fn test_encode_rejects_wrong_fixed_payload() {
        let pdu = Pdu::new(MessageType::ConnectionRequest, &b"0301"[..]);
        let mut buf = BytesMut::new();
        let result = encode_pdu(&pdu, &mut buf);
        assert!(matches!(
            result,
            Err(PduError::InvalidPayloadLength { expected: 14, .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_payload_too_large() {
        let pdu = Pdu::new(MessageType::Data, vec![0u8; MAX_PAYLOAD + 1]);
        let result = pdu.to_bytes();
        assert!(matches!(result, Err(PduError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_encode_to_slice_buffer_too_small() {
        let pdu = heartbeat();
        let mut small = [0u8; FIXED_FIELDS_LEN - 1];
        let result = encode_pdu_to_slice(&pdu, &mut small);
        assert!(matches!(
            result,
            Err(PduError::BufferTooSmall {
                needed: 36,
                available: 35
            })
        ));

        let mut exact = [0u8; FIXED_FIELDS_LEN + 4];
        let written = encode_pdu_to_slice(&pdu, &mut exact).unwrap();
        assert_eq!(written, FIXED_FIELDS_LEN);
        assert_eq!(decode_pdu(&exact).unwrap(), pdu);
    }

    #[test]
    fn test_connection_request_carries_fixed_payload() {
        let mut pdu = Pdu::new(
            MessageType::ConnectionRequest,
            ConnectionPayload::default().encode(),
        );
        pdu.seal().unwrap();
        let wire = pdu.to_bytes().unwrap();

        assert_eq!(wire.len(), 50);
        assert_eq!(&wire[HEADER_LEN..HEADER_LEN + 4], b"0301");
    }

    #[test]
    fn test_message_type_codes() {
        for code in [6200, 6201, 6212, 6213, 6216, 6220, 6240, 6241] {
            assert_eq!(MessageType::try_from(code).unwrap().code(), code);
        }
        assert!(MessageType::try_from(0).is_err());
        assert_eq!(MessageType::RetransmittedData.to_string(), "RETRANSMITTED_DATA");
    }
}
