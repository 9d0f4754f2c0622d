//! Binary codecs for the legacy APNS protocol: the enhanced-format push
//! frame, the 6-byte error response, and the 38-byte feedback record.
//! All multi-byte integers are network byte order.

use bytes::{Buf, BufMut, BytesMut};

use crate::token::DEVICE_TOKEN_LEN;

/// Command byte of an enhanced-format push frame.
pub const COMMAND_PUSH_ENHANCED: u8 = 1;

/// Command byte APNS uses for its error response.
pub const ERROR_RESPONSE_COMMAND: u8 = 8;

/// Size of the APNS error response packet.
pub const ERROR_RESPONSE_SIZE: usize = 6;

/// Size of one feedback service record.
pub const FEEDBACK_RECORD_SIZE: usize = 38;

/// Fixed bytes before the payload in an enhanced-format frame.
pub const FRAME_HEADER_SIZE: usize = 45;

/// Builds an enhanced-format push frame:
///
/// | offset | size | field       |
/// |--------|------|-------------|
/// | 0      | 1    | command (1) |
/// | 1      | 4    | identifier  |
/// | 5      | 4    | expiry      |
/// | 9      | 2    | token len   |
/// | 11     | 32   | token       |
/// | 43     | 2    | payload len |
/// | 45     | N    | payload     |
pub fn encode_push_frame(
    identifier: u32,
    expiry: u32,
    device_token: &[u8; DEVICE_TOKEN_LEN],
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.put_u8(COMMAND_PUSH_ENHANCED);
    frame.put_u32(identifier);
    frame.put_u32(expiry);
    frame.put_u16(DEVICE_TOKEN_LEN as u16);
    frame.put_slice(device_token);
    frame.put_u16(payload.len() as u16);
    frame.put_slice(payload);
    frame.to_vec()
}

/// APNS error response: `{ command, status, identifier }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub command: u8,
    pub status: u8,
    pub identifier: u32,
}

/// Decodes an error response. Returns `None` for a truncated buffer.
pub fn decode_error_response(mut buf: &[u8]) -> Option<ErrorResponse> {
    if buf.len() < ERROR_RESPONSE_SIZE {
        return None;
    }
    Some(ErrorResponse {
        command: buf.get_u8(),
        status: buf.get_u8(),
        identifier: buf.get_u32(),
    })
}

/// One feedback service record: `{ timestamp, token_len, token }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackRecordRaw {
    pub timestamp: u32,
    pub token_len: u16,
    pub device_token: [u8; DEVICE_TOKEN_LEN],
}

/// Decodes a feedback record. Returns `None` for a truncated buffer.
pub fn decode_feedback_record(mut buf: &[u8]) -> Option<FeedbackRecordRaw> {
    if buf.len() < FEEDBACK_RECORD_SIZE {
        return None;
    }
    let timestamp = buf.get_u32();
    let token_len = buf.get_u16();
    let mut device_token = [0u8; DEVICE_TOKEN_LEN];
    buf.copy_to_slice(&mut device_token);
    Some(FeedbackRecordRaw {
        timestamp,
        token_len,
        device_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout_is_bit_exact() {
        let token: [u8; 32] = core::array::from_fn(|i| (i + 1) as u8);
        let payload = br#"{"aps":{"alert":"hi","badge":3}}"#;
        let frame = encode_push_frame(7, 1_700_000_300, &token, payload);

        assert_eq!(frame.len(), FRAME_HEADER_SIZE + payload.len());
        assert_eq!(frame[0], COMMAND_PUSH_ENHANCED);
        assert_eq!(&frame[1..5], &7u32.to_be_bytes());
        assert_eq!(&frame[5..9], &1_700_000_300u32.to_be_bytes());
        assert_eq!(&frame[9..11], &32u16.to_be_bytes());
        assert_eq!(&frame[11..43], &token);
        assert_eq!(&frame[43..45], &(payload.len() as u16).to_be_bytes());
        assert_eq!(&frame[45..], payload.as_slice());
    }

    #[test]
    fn test_frame_identifier_round_trips() {
        let token = [0u8; 32];
        let frame = encode_push_frame(0xdead_beef, 0, &token, b"{}");
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&frame[1..5]);
        assert_eq!(u32::from_be_bytes(id_bytes), 0xdead_beef);
    }

    #[test]
    fn test_decode_error_response() {
        let buf = [8u8, 5, 0, 0, 0, 42];
        let resp = decode_error_response(&buf).unwrap();
        assert_eq!(resp.command, ERROR_RESPONSE_COMMAND);
        assert_eq!(resp.status, 5);
        assert_eq!(resp.identifier, 42);
    }

    #[test]
    fn test_decode_error_response_truncated() {
        assert!(decode_error_response(&[8, 5, 0]).is_none());
    }

    #[test]
    fn test_decode_feedback_record() {
        let token: [u8; 32] = core::array::from_fn(|i| i as u8);
        let mut buf = Vec::new();
        buf.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        buf.extend_from_slice(&32u16.to_be_bytes());
        buf.extend_from_slice(&token);

        let record = decode_feedback_record(&buf).unwrap();
        assert_eq!(record.timestamp, 1_600_000_000);
        assert_eq!(record.token_len, 32);
        assert_eq!(record.device_token, token);
    }

    #[test]
    fn test_decode_feedback_record_truncated() {
        assert!(decode_feedback_record(&[0u8; 37]).is_none());
    }
}
