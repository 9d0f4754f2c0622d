// Feedback service drain, driven through the public API.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use apns_push::{
    FeedbackConfig, FeedbackEngine, ReadStatus, Transport, TransportError, WriteStatus,
};

#[derive(Default)]
struct FakeState {
    connected: bool,
    disconnects: u32,
    reads: VecDeque<Vec<u8>>,
}

#[derive(Clone)]
struct FakeTransport {
    state: Rc<RefCell<FakeState>>,
}

impl Transport for FakeTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.state.borrow_mut().connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.connected {
            state.disconnects += 1;
        }
        state.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn write(&mut self, _buf: &[u8]) -> WriteStatus {
        WriteStatus::Failed
    }

    fn read(&mut self, buf: &mut [u8]) -> ReadStatus {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return ReadStatus::Closed;
        }
        match state.reads.pop_front() {
            Some(bytes) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                ReadStatus::Data(bytes.len())
            }
            None => ReadStatus::NotReady,
        }
    }
}

fn record_bytes(timestamp: u32, token: &[u8; 32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(38);
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(&32u16.to_be_bytes());
    buf.extend_from_slice(token);
    buf
}

#[test]
fn test_two_records_drain_then_disconnect() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let token_a: [u8; 32] = core::array::from_fn(|i| i as u8);
    let token_b: [u8; 32] = [0xab; 32];

    let state = Rc::new(RefCell::new(FakeState {
        reads: [
            record_bytes(1_600_000_000, &token_a),
            record_bytes(1_600_000_100, &token_b),
        ]
        .into_iter()
        .collect(),
        ..FakeState::default()
    }));
    let transport = FakeTransport {
        state: state.clone(),
    };

    // A zero interval makes the first poll due immediately.
    let config = FeedbackConfig::new("feedback.test", 2196, "cert.pem", "key.pem", "/tmp", 0);
    let mut engine = FeedbackEngine::with_transport(config, transport);

    assert!(engine.run());

    let records = engine.take_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].timestamp, 1_600_000_000);
    assert_eq!(
        records[0].device_token,
        "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
    );
    assert_eq!(records[1].timestamp, 1_600_000_100);
    assert_eq!(records[1].device_token, "ab".repeat(32));

    // Short-lived by protocol: the poll cycle closed the connection.
    let state = state.borrow();
    assert!(!state.connected);
    assert_eq!(state.disconnects, 1);
}
