// ============================================================================
// Push Delivery Engine
// ============================================================================
//
// Owns the three-queue message lifecycle (send -> stage -> error), frames
// enhanced-format packets, and re-maps APNS's out-of-band error responses
// back onto in-flight messages by identifier.
//
// Single-threaded and cooperative: the host drives everything by calling
// run() from its main loop. No internal threads or timers.
//
// ============================================================================

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::error::ApnsError;
use crate::message::{ErrorStatus, Message};
use crate::metrics;
use crate::payload::Payload;
use crate::token;
use crate::transport::{ReadStatus, TlsTransport, Transport, WriteStatus};
use crate::wire::{self, ERROR_RESPONSE_SIZE};

/// Seconds of delivery grace APNS is granted for each framed packet,
/// independent of the message's own queue expiry.
const WIRE_EXPIRY_GRACE: i64 = 300;

/// Delivery counters accumulated between statistics log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    pub sent: u64,
    pub errors: u64,
    pub disconnected: u64,
}

/// Which queue a tracked message currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    /// Enqueued, not yet written.
    Send,
    /// Written to the transport, fate pending.
    Stage,
    /// Rejected by APNS; held for the caller to inspect until expiry.
    Error,
}

struct Entry {
    message: Message,
    state: QueueState,
    /// Monotonic write order within the engine's lifetime; used to tell
    /// which staged messages were written after an offender.
    staged_seq: u64,
}

/// Delivery engine for the legacy binary push gateway.
///
/// Messages live in a single table keyed by identifier; the queues are
/// state tags plus a deque preserving send order, so a message is in
/// exactly one queue at any time and the error-response lookup is O(1).
pub struct PushEngine<T: Transport = TlsTransport> {
    transport: T,
    config: PushConfig,
    messages: HashMap<u32, Entry>,
    send_order: VecDeque<u32>,
    last_id: u32,
    next_seq: u64,
    last_activity_ts: i64,
    connect_retry_ts: i64,
    log_stats_ts: i64,
    stats: PushStats,
}

impl PushEngine<TlsTransport> {
    /// Engine over a real TLS connection to the configured gateway.
    pub fn new(config: PushConfig) -> Self {
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

impl<T: Transport> PushEngine<T> {
    /// Engine over a caller-supplied transport.
    pub fn with_transport(config: PushConfig, transport: T) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            transport,
            log_stats_ts: now + config.log_stats_interval,
            config,
            messages: HashMap::new(),
            send_order: VecDeque::new(),
            last_id: 0,
            next_seq: 1,
            last_activity_ts: now,
            connect_retry_ts: 0,
            stats: PushStats::default(),
        }
    }

    /// Enqueues a message for delivery and returns its assigned
    /// identifier. Rejects messages whose device token does not decode
    /// to 32 bytes, so everything in the queue is frameable.
    pub fn add(&mut self, mut message: Message) -> Result<u32, ApnsError> {
        token::hex_to_binary(&message.device_token)?;

        let id = self.allocate_id();
        message.set_id(id);
        self.last_activity_ts = chrono::Utc::now().timestamp();
        self.send_order.push_back(id);
        self.messages.insert(
            id,
            Entry {
                message,
                state: QueueState::Send,
                staged_seq: 0,
            },
        );

        debug!(id, queued = self.send_order.len(), "Message queued");
        Ok(id)
    }

    /// Removes a not-yet-written message from the send queue.
    pub fn remove(&mut self, id: u32) -> bool {
        match self.messages.get(&id) {
            Some(entry) if entry.state == QueueState::Send => {
                self.messages.remove(&id);
                self.send_order.retain(|&queued| queued != id);
                true
            }
            _ => false,
        }
    }

    /// One tick of the cooperative loop. Returns false while the engine
    /// is backing off after a failed connect.
    pub fn run(&mut self) -> bool {
        self.tick(chrono::Utc::now().timestamp())
    }

    fn tick(&mut self, now: i64) -> bool {
        if now < self.connect_retry_ts {
            return false;
        }

        if now > self.log_stats_ts {
            self.log_stats(now);
        }

        self.process_send_queue(now);
        self.expire_idle_connection(now);

        let expired = self.expire_messages(QueueState::Stage, now);
        if expired > 0 {
            info!(count = expired, "Expired messages from stage queue");
        }
        let expired = self.expire_messages(QueueState::Error, now);
        if expired > 0 {
            info!(count = expired, "Expired messages from error queue");
        }

        true
    }

    pub fn send_queue_size(&self) -> usize {
        self.send_order.len()
    }

    /// Messages written to the transport whose fate is still pending.
    pub fn staged_count(&self) -> usize {
        self.count_state(QueueState::Stage)
    }

    pub fn failed_count(&self) -> usize {
        self.count_state(QueueState::Error)
    }

    /// Messages APNS rejected, with their error status set. Held until
    /// their expiry passes.
    pub fn failed(&self) -> Vec<&Message> {
        let mut failed: Vec<&Entry> = self
            .messages
            .values()
            .filter(|entry| entry.state == QueueState::Error)
            .collect();
        failed.sort_by_key(|entry| entry.staged_seq);
        failed.into_iter().map(|entry| &entry.message).collect()
    }

    /// Counters since the last statistics log line.
    pub fn stats(&self) -> PushStats {
        self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Seconds of connection inactivity before disconnecting; 0 never
    /// disconnects.
    pub fn set_timeout(&mut self, timeout: i64) {
        self.config.timeout = timeout;
    }

    pub fn set_connect_retry_timeout(&mut self, timeout: i64) {
        self.config.connect_retry_timeout = timeout;
    }

    /// Sets the statistics interval and re-arms the timer from now.
    pub fn set_log_stats_interval(&mut self, interval: i64) {
        self.config.log_stats_interval = interval;
        self.log_stats_ts = chrono::Utc::now().timestamp() + interval;
    }

    fn count_state(&self, state: QueueState) -> usize {
        self.messages
            .values()
            .filter(|entry| entry.state == state)
            .count()
    }

    /// Next free identifier. Wraps at u32 and skips ids still tracked,
    /// so an error response can never name two live messages.
    fn allocate_id(&mut self) -> u32 {
        loop {
            self.last_id = self.last_id.wrapping_add(1);
            if self.last_id != 0 && !self.messages.contains_key(&self.last_id) {
                return self.last_id;
            }
        }
    }

    fn process_send_queue(&mut self, now: i64) {
        if self.send_order.is_empty() {
            return;
        }

        if !self.transport.is_connected() {
            if let Err(e) = self.transport.connect() {
                warn!(
                    queued = self.send_order.len(),
                    retry_in = self.config.connect_retry_timeout,
                    error = %e,
                    "Messages ready to send but unable to connect"
                );
                self.connect_retry_ts = now + self.config.connect_retry_timeout;
                return;
            }
        }

        info!(queued = self.send_order.len(), "Sending message queue");

        // Snapshot so pushed-back messages wait for the next tick.
        let batch: Vec<u32> = self.send_order.iter().copied().collect();
        for id in batch {
            if !self.transport.is_connected() {
                break;
            }

            self.send_order.retain(|&queued| queued != id);
            let Some(entry) = self.messages.get_mut(&id) else {
                continue;
            };
            entry.state = QueueState::Stage;
            entry.staged_seq = self.next_seq;
            self.next_seq += 1;

            if !self.send_payload(id, now) {
                continue;
            }

            // APNS never acks success; any response here is an error
            // report that also ends the stream.
            let mut response = [0u8; ERROR_RESPONSE_SIZE];
            if let ReadStatus::Data(n) = self.transport.read(&mut response) {
                info!(bytes = n, "Received response from APNS, deferring queue for reconnect");
                let offender_seq = self.handle_error_response(&response[..n]);
                self.transport.disconnect();
                if let Some(seq) = offender_seq {
                    self.resend_staged(seq);
                }
                self.stats.disconnected += 1;
                self.stats.errors += 1;
                metrics::DISCONNECTS_TOTAL.inc();
                metrics::PUSH_ERRORS_TOTAL.inc();
                break;
            }
        }
    }

    /// Frames and writes one staged message. Returns true when the
    /// packet went out; false when the message was discarded, failed, or
    /// pushed back to the send queue.
    fn send_payload(&mut self, id: u32, now: i64) -> bool {
        let Some(entry) = self.messages.get_mut(&id) else {
            return false;
        };

        if entry.message.is_expired(now) {
            debug!(id, "Discarding expired message without sending");
            self.messages.remove(&id);
            return false;
        }

        if !entry.message.try_retry() {
            warn!(
                id,
                retries = entry.message.retries(),
                "Giving up on message, retry count exhausted"
            );
            self.messages.remove(&id);
            return false;
        }

        let payload = match Payload::for_message(&entry.message).to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(id, error = %e, "Message moved to error queue");
                entry.message.set_error(ErrorStatus::InvalidPayloadSize);
                entry.state = QueueState::Error;
                return false;
            }
        };

        let device_token = match token::hex_to_binary(&entry.message.device_token) {
            Ok(token) => token,
            Err(e) => {
                // add() validates tokens, so only a caller mutating
                // device_token after enqueue can land here.
                warn!(id, error = %e, "Message moved to error queue");
                entry.message.set_error(ErrorStatus::InvalidToken);
                entry.state = QueueState::Error;
                return false;
            }
        };

        let frame = wire::encode_push_frame(
            id,
            (now + WIRE_EXPIRY_GRACE) as u32,
            &device_token,
            &payload,
        );

        debug!(
            id,
            token = %entry.message.device_token,
            payload = %String::from_utf8_lossy(&payload),
            "Framing payload"
        );

        match self.transport.write(&frame) {
            WriteStatus::Written(bytes) => {
                debug!(tx = %token::safe_print(&frame), bytes, "TX");
                info!(
                    id,
                    bytes,
                    attempt = entry.message.retries(),
                    "Sending message"
                );
                self.stats.sent += 1;
                metrics::PUSHES_SENT_TOTAL.inc();
                true
            }
            WriteStatus::Busy => {
                warn!(id, "Short write, pushing message back to send queue");
                entry.state = QueueState::Send;
                self.send_order.push_back(id);
                false
            }
            WriteStatus::Failed => {
                warn!(id, "Write failed, pushing message back to send queue");
                entry.state = QueueState::Send;
                self.send_order.push_back(id);
                false
            }
        }
    }

    /// Maps a 6-byte error response back onto the staged message it
    /// names. Returns the offender's write sequence so later-staged
    /// messages can be replayed.
    fn handle_error_response(&mut self, response: &[u8]) -> Option<u64> {
        debug!(rx = %token::safe_print(response), bytes = response.len(), "RX");

        let Some(resp) = wire::decode_error_response(response) else {
            warn!(bytes = response.len(), "Truncated APNS response, ignoring");
            return None;
        };

        if resp.command != wire::ERROR_RESPONSE_COMMAND {
            warn!(
                command = resp.command,
                id = resp.identifier,
                "Unknown response command, ignoring"
            );
            return None;
        }

        let status = ErrorStatus::from_byte(resp.status);
        let entry = match self.messages.get_mut(&resp.identifier) {
            Some(entry) if entry.state == QueueState::Stage => entry,
            _ => {
                warn!(
                    id = resp.identifier,
                    status = resp.status,
                    reason = status.as_str(),
                    "Error response names no staged message"
                );
                return None;
            }
        };

        entry.message.set_error(status);
        entry.state = QueueState::Error;
        warn!(
            id = resp.identifier,
            status = resp.status,
            reason = status.as_str(),
            "Message rejected by APNS"
        );
        Some(entry.staged_seq)
    }

    /// APNS drops everything written after the offender before closing
    /// the stream, so those staged messages go back to the send queue.
    fn resend_staged(&mut self, offender_seq: u64) {
        let mut resend: Vec<(u64, u32)> = self
            .messages
            .iter()
            .filter(|(_, entry)| {
                entry.state == QueueState::Stage && entry.staged_seq > offender_seq
            })
            .map(|(&id, entry)| (entry.staged_seq, id))
            .collect();
        if resend.is_empty() {
            return;
        }
        resend.sort_unstable();

        for &(_, id) in &resend {
            if let Some(entry) = self.messages.get_mut(&id) {
                entry.state = QueueState::Send;
                self.send_order.push_back(id);
            }
        }
        info!(count = resend.len(), "Returned staged messages to the send queue");
    }

    fn expire_idle_connection(&mut self, now: i64) {
        // A timeout of 0 keeps the connection open.
        if self.config.timeout == 0 || !self.transport.is_connected() {
            return;
        }
        if now < self.last_activity_ts + self.config.timeout {
            return;
        }
        info!(timeout = self.config.timeout, "Connection expired");
        self.transport.disconnect();
    }

    fn expire_messages(&mut self, state: QueueState, now: i64) -> usize {
        let expired: Vec<u32> = self
            .messages
            .iter()
            .filter(|(_, entry)| entry.state == state && entry.message.is_expired(now))
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            self.messages.remove(id);
        }
        expired.len()
    }

    fn log_stats(&mut self, now: i64) {
        self.log_stats_ts = now + self.config.log_stats_interval;
        info!(
            sent = self.stats.sent,
            errors = self.stats.errors,
            disconnects = self.stats.disconnected,
            next_in = self.config.log_stats_interval,
            "Delivery statistics"
        );
        self.stats = PushStats::default();
    }
}
