// ============================================================================
// Feedback Service Engine
// ============================================================================
//
// Periodically drains APNS's feedback channel. Each 38-byte record names
// a device token that has become unreachable; the caller is expected to
// stop pushing to it. The connection is short-lived by protocol: one
// poll cycle, then disconnect.
//
// ============================================================================

use tracing::{info, warn};

use crate::config::FeedbackConfig;
use crate::metrics;
use crate::token;
use crate::transport::{ReadStatus, TlsTransport, Transport};
use crate::wire::{self, FEEDBACK_RECORD_SIZE};

/// One unreachable-token report from the feedback service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    /// Seconds since the epoch (UTC) at which APNS decided the token
    /// was unreachable.
    pub timestamp: u32,
    pub token_len: u16,
    /// Lowercase hex form of the reported device token.
    pub device_token: String,
}

/// Poller for the APNS feedback service.
pub struct FeedbackEngine<T: Transport = TlsTransport> {
    transport: T,
    config: FeedbackConfig,
    next_check_ts: i64,
    records: Vec<FeedbackRecord>,
}

impl FeedbackEngine<TlsTransport> {
    /// Engine over a real TLS connection to the configured feedback host.
    pub fn new(config: FeedbackConfig) -> Self {
        let transport = TlsTransport::new(
            config.host.clone(),
            config.port,
            config.cert_file.clone(),
            config.key_file.clone(),
            config.ca_path.clone(),
        );
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> FeedbackEngine<T> {
    /// Engine over a caller-supplied transport. The first poll happens
    /// one interval after construction.
    pub fn with_transport(config: FeedbackConfig, transport: T) -> Self {
        Self {
            transport,
            next_check_ts: chrono::Utc::now().timestamp() + config.poll_interval,
            config,
            records: Vec::new(),
        }
    }

    /// One tick of the cooperative loop. Returns true when a poll cycle
    /// actually ran.
    pub fn run(&mut self) -> bool {
        self.tick(chrono::Utc::now().timestamp())
    }

    fn tick(&mut self, now: i64) -> bool {
        if now < self.next_check_ts {
            return false;
        }
        self.next_check_ts = now + self.config.poll_interval;

        if !self.transport.is_connected() {
            if let Err(e) = self.transport.connect() {
                warn!(error = %e, "Could not connect to feedback service, will try again later");
                return false;
            }
        }

        info!(
            interval = self.config.poll_interval,
            "Checking APNS feedback service"
        );
        self.drain_records();
        self.transport.disconnect();

        true
    }

    /// Unreachable-token records collected so far, oldest first. The
    /// internal queue is emptied.
    pub fn take_records(&mut self) -> Vec<FeedbackRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn pending_records(&self) -> usize {
        self.records.len()
    }

    fn drain_records(&mut self) {
        let mut buf = [0u8; FEEDBACK_RECORD_SIZE];
        loop {
            match self.transport.read(&mut buf) {
                ReadStatus::Data(n) => {
                    let Some(raw) = wire::decode_feedback_record(&buf[..n]) else {
                        warn!(bytes = n, "Truncated feedback record, ignoring");
                        return;
                    };
                    let device_token = token::binary_to_hex(&raw.device_token);
                    info!(
                        timestamp = raw.timestamp,
                        token_len = raw.token_len,
                        token = %device_token,
                        "Device token reported unreachable"
                    );
                    metrics::FEEDBACK_RECORDS_TOTAL.inc();
                    self.records.push(FeedbackRecord {
                        timestamp: raw.timestamp,
                        token_len: raw.token_len,
                        device_token,
                    });
                }
                ReadStatus::NotReady | ReadStatus::Closed => return,
            }
        }
    }
}
