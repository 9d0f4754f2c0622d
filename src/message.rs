// ============================================================================
// Message Model
// ============================================================================

use crate::config::Environment;

/// Default bound on transmission attempts per message.
pub const DEFAULT_MAXIMUM_RETRIES: u32 = 2;

/// Default seconds a queued message stays deliverable before the engine
/// discards it.
pub const DEFAULT_EXPIRY: i64 = 3600;

/// Status byte from an APNS error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    /// Never actually sent by APNS; kept for parity with the wire table.
    NoErrors,
    ProcessingError,
    MissingDeviceToken,
    MissingTopic,
    MissingPayload,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidPayloadSize,
    InvalidToken,
    Unknown,
}

impl ErrorStatus {
    pub fn from_byte(status: u8) -> Self {
        match status {
            0 => ErrorStatus::NoErrors,
            1 => ErrorStatus::ProcessingError,
            2 => ErrorStatus::MissingDeviceToken,
            3 => ErrorStatus::MissingTopic,
            4 => ErrorStatus::MissingPayload,
            5 => ErrorStatus::InvalidTokenSize,
            6 => ErrorStatus::InvalidTopicSize,
            7 => ErrorStatus::InvalidPayloadSize,
            8 => ErrorStatus::InvalidToken,
            _ => ErrorStatus::Unknown,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ErrorStatus::NoErrors => 0,
            ErrorStatus::ProcessingError => 1,
            ErrorStatus::MissingDeviceToken => 2,
            ErrorStatus::MissingTopic => 3,
            ErrorStatus::MissingPayload => 4,
            ErrorStatus::InvalidTokenSize => 5,
            ErrorStatus::InvalidTopicSize => 6,
            ErrorStatus::InvalidPayloadSize => 7,
            ErrorStatus::InvalidToken => 8,
            ErrorStatus::Unknown => 255,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::NoErrors => "NO ERRORS",
            ErrorStatus::ProcessingError => "PROCESSING ERROR",
            ErrorStatus::MissingDeviceToken => "MISSING DEVICE TOKEN",
            ErrorStatus::MissingTopic => "MISSING TOPIC",
            ErrorStatus::MissingPayload => "MISSING PAYLOAD",
            ErrorStatus::InvalidTokenSize => "INVALID TOKEN SIZE",
            ErrorStatus::InvalidTopicSize => "INVALID TOPIC SIZE",
            ErrorStatus::InvalidPayloadSize => "INVALID PAYLOAD SIZE",
            ErrorStatus::InvalidToken => "INVALID TOKEN",
            ErrorStatus::Unknown => "UNKNOWN",
        }
    }
}

/// One pending push notification.
///
/// The caller fills in the delivery options; `id`, `retries` and `error`
/// are managed by the engine that owns the message.
#[derive(Debug, Clone)]
pub struct Message {
    pub environment: Environment,
    /// 64 hex characters, case-insensitive, interior spaces allowed.
    pub device_token: String,
    /// User-visible alert body.
    pub text: String,
    /// Sound file key; empty means no sound.
    pub sound_name: String,
    /// Localized action-button caption; empty selects the bare alert form.
    pub action_key_caption: String,
    /// Badge count; negative leaves the badge untouched.
    pub badge_number: i32,
    /// Opaque caller identifier carried in the payload; empty omits it.
    pub custom_identifier: String,
    /// Bound on transmission attempts.
    pub max_retries: u32,
    /// Unix time after which the engine discards the message unsent.
    pub expiry: i64,
    id: u32,
    retries: u32,
    error: ErrorStatus,
}

impl Message {
    pub fn new(device_token: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            environment: Environment::Production,
            device_token: device_token.into(),
            text: text.into(),
            sound_name: String::new(),
            action_key_caption: String::new(),
            badge_number: -1,
            custom_identifier: String::new(),
            max_retries: DEFAULT_MAXIMUM_RETRIES,
            expiry: chrono::Utc::now().timestamp() + DEFAULT_EXPIRY,
            id: 0,
            retries: 0,
            error: ErrorStatus::NoErrors,
        }
    }

    /// Identifier assigned at enqueue; 0 until the message is added.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Transmission attempts so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// APNS status from the last error response, `NoErrors` otherwise.
    pub fn error(&self) -> ErrorStatus {
        self.error
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expiry
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub(crate) fn set_error(&mut self, error: ErrorStatus) {
        self.error = error;
    }

    /// Counts a transmission attempt. Returns false once the attempt
    /// budget is spent; the engine then discards the message.
    pub(crate) fn try_retry(&mut self) -> bool {
        self.retries += 1;
        self.retries <= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_round_trip() {
        for byte in [0u8, 1, 2, 3, 4, 5, 6, 7, 8, 255] {
            assert_eq!(ErrorStatus::from_byte(byte).as_byte(), byte);
        }
        // Unrecognized codes collapse to Unknown.
        assert_eq!(ErrorStatus::from_byte(42), ErrorStatus::Unknown);
    }

    #[test]
    fn test_retry_budget() {
        let mut msg = Message::new("ab", "hi");
        msg.max_retries = 2;

        assert!(msg.try_retry());
        assert_eq!(msg.retries(), 1);
        assert!(msg.try_retry());
        assert_eq!(msg.retries(), 2);
        assert!(!msg.try_retry());
    }

    #[test]
    fn test_expiry() {
        let mut msg = Message::new("ab", "hi");
        let now = chrono::Utc::now().timestamp();

        assert!(!msg.is_expired(now));
        msg.expiry = now - 1;
        assert!(msg.is_expired(now));
    }

    #[test]
    fn test_defaults() {
        let msg = Message::new("ab", "hi");
        assert_eq!(msg.badge_number, -1);
        assert_eq!(msg.max_retries, DEFAULT_MAXIMUM_RETRIES);
        assert_eq!(msg.error(), ErrorStatus::NoErrors);
        assert_eq!(msg.id(), 0);
    }
}
