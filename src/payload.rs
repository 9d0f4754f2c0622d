use serde::Serialize;

use crate::error::ApnsError;
use crate::message::Message;

/// Hard APNS limit on the serialized payload.
pub const PAYLOAD_MAXIMUM_SIZE: usize = 256;

/// The JSON payload APNS expects.
///
/// Field order matters to nobody but the test suite, but serde keeps the
/// declaration order, which matches the documented shape:
///
/// ```json
/// {"aps":{"alert":{"body":"...","action-loc-key":"..."},
///         "sound":"...","badge":N},
///  "id":"..."}
/// ```
#[derive(Debug, Serialize)]
pub struct Payload<'a> {
    aps: Aps<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Aps<'a> {
    alert: Alert<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<i32>,
}

/// `alert` is a bare string unless a localized action caption asks for
/// the nested object form.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Alert<'a> {
    Body(&'a str),
    Localized {
        body: &'a str,
        #[serde(rename = "action-loc-key")]
        action_loc_key: &'a str,
    },
}

impl<'a> Payload<'a> {
    pub fn for_message(message: &'a Message) -> Self {
        let alert = if message.action_key_caption.is_empty() {
            Alert::Body(&message.text)
        } else {
            Alert::Localized {
                body: &message.text,
                action_loc_key: &message.action_key_caption,
            }
        };

        Self {
            aps: Aps {
                alert,
                sound: (!message.sound_name.is_empty()).then_some(message.sound_name.as_str()),
                badge: (message.badge_number >= 0).then_some(message.badge_number),
            },
            id: (!message.custom_identifier.is_empty())
                .then_some(message.custom_identifier.as_str()),
        }
    }

    /// Serializes the payload, enforcing the 256-byte cap.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ApnsError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > PAYLOAD_MAXIMUM_SIZE {
            return Err(ApnsError::PayloadTooLarge {
                size: bytes.len(),
                limit: PAYLOAD_MAXIMUM_SIZE,
            });
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(message: &Message) -> String {
        let bytes = Payload::for_message(message).to_bytes().unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_minimal_payload_is_bare_alert() {
        let mut msg = Message::new("ab", "hi");
        msg.badge_number = 3;
        assert_eq!(build(&msg), r#"{"aps":{"alert":"hi","badge":3}}"#);
    }

    #[test]
    fn test_minimal_payload_size_matches_wire_expectation() {
        let mut msg = Message::new("ab", "hi");
        msg.badge_number = 3;
        assert_eq!(build(&msg).len(), 32);
    }

    #[test]
    fn test_full_payload_shape() {
        let mut msg = Message::new("ab", "hello");
        msg.action_key_caption = "View".to_string();
        msg.sound_name = "chime".to_string();
        msg.badge_number = 0;
        msg.custom_identifier = "order-17".to_string();
        assert_eq!(
            build(&msg),
            r#"{"aps":{"alert":{"body":"hello","action-loc-key":"View"},"sound":"chime","badge":0},"id":"order-17"}"#
        );
    }

    #[test]
    fn test_negative_badge_is_omitted() {
        let msg = Message::new("ab", "hi");
        assert_eq!(build(&msg), r#"{"aps":{"alert":"hi"}}"#);
    }

    #[test]
    fn test_text_is_json_escaped() {
        let msg = Message::new("ab", "a\"b\\c\nd\te\u{1}");
        assert_eq!(
            build(&msg),
            "{\"aps\":{\"alert\":\"a\\\"b\\\\c\\nd\\te\\u0001\"}}"
        );
    }

    #[test]
    fn test_payload_over_256_bytes_is_rejected() {
        let mut msg = Message::new("ab", "A".repeat(300));
        msg.badge_number = 0;
        let err = Payload::for_message(&msg).to_bytes().unwrap_err();
        assert!(matches!(
            err,
            ApnsError::PayloadTooLarge { size: _, limit: PAYLOAD_MAXIMUM_SIZE }
        ));
    }

    #[test]
    fn test_payload_at_exactly_256_bytes_is_accepted() {
        // {"aps":{"alert":"..."}} wraps the body in 20 bytes of structure.
        let mut msg = Message::new("ab", "A".repeat(PAYLOAD_MAXIMUM_SIZE - 20));
        msg.badge_number = -1;
        let bytes = Payload::for_message(&msg).to_bytes().unwrap();
        assert_eq!(bytes.len(), PAYLOAD_MAXIMUM_SIZE);
    }
}
