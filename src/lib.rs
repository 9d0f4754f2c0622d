//! Client library for Apple's legacy binary push notification service.
//!
//! Two engines, both driven cooperatively by the host's main loop:
//!
//! - [`PushEngine`] delivers enhanced-format push packets over a
//!   persistent TLS connection, tracking every message through a
//!   send / stage / error queue lifecycle with retry, expiry, and
//!   out-of-band error-response handling.
//! - [`FeedbackEngine`] periodically drains the feedback service and
//!   surfaces device tokens that have become unreachable.
//!
//! Neither engine spawns threads or timers; call `run()` from your own
//! loop at whatever cadence suits you. All logging goes through the
//! [`tracing`] facade, so the host picks the subscriber.
//!
//! ```no_run
//! use apns_push::{Environment, Message, PushConfig, PushEngine};
//!
//! let config = PushConfig::for_environment(
//!     Environment::Production,
//!     "client-cert.pem",
//!     "client-key.pem",
//!     "/etc/ssl/certs",
//!     600,
//! );
//! let mut engine = PushEngine::new(config);
//!
//! let mut message = Message::new(
//!     "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20",
//!     "You have a new message",
//! );
//! message.badge_number = 1;
//! message.sound_name = "default".to_string();
//! let id = engine.add(message)?;
//!
//! loop {
//!     engine.run();
//!     # break;
//!     // ... the rest of the host's main loop
//! }
//! # let _ = id;
//! # Ok::<(), apns_push::ApnsError>(())
//! ```

pub mod config;
pub mod error;
pub mod feedback;
pub mod message;
pub mod metrics;
pub mod payload;
pub mod push;
pub mod token;
pub mod transport;
pub mod wire;

pub use config::{Environment, FeedbackConfig, PushConfig};
pub use error::{ApnsError, ApnsResult, TransportError};
pub use feedback::{FeedbackEngine, FeedbackRecord};
pub use message::{ErrorStatus, Message};
pub use push::{PushEngine, PushStats};
pub use transport::{ReadStatus, TlsTransport, Transport, WriteStatus};
