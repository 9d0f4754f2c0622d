use thiserror::Error;

pub type ApnsResult<T> = Result<T, ApnsError>;

/// Errors surfaced by the push and feedback engines.
///
/// Internal delivery failures (connect refused, APNS rejections, retry
/// exhaustion) never show up here; they are reflected in log events,
/// counters and per-message error statuses instead.
#[derive(Error, Debug)]
pub enum ApnsError {
    // ===== Message Validation =====
    #[error("invalid device token: {0}")]
    InvalidToken(String),

    #[error("payload of {size} bytes exceeds the {limit} byte maximum")]
    PayloadTooLarge { size: usize, limit: usize },

    // ===== Serialization =====
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Transport =====
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// TLS transport failure taxonomy.
///
/// Everything here leaves the transport in a clean not-connected state;
/// the engine's next tick decides whether to retry.
#[derive(Error, Debug)]
pub enum TransportError {
    // ===== Context Initialization =====
    #[error("failed to read CA path ({path}): {source}")]
    CaPath {
        path: String,
        source: std::io::Error,
    },

    #[error("no usable CA certificates under {0}")]
    EmptyCaStore(String),

    #[error("cannot use certificate file ({path}): {source}")]
    Certificate {
        path: String,
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyCertificate(String),

    #[error("cannot use private key ({path}): {source}")]
    PrivateKey {
        path: String,
        source: std::io::Error,
    },

    #[error("no private key found in {0}")]
    MissingPrivateKey(String),

    #[error("private key does not match the certificate public key: {0}")]
    KeyMismatch(rustls::Error),

    // ===== Connection Establishment =====
    #[error("could not resolve {0} to an IPv4 address")]
    Dns(String),

    #[error("invalid server name: {0}")]
    ServerName(String),

    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("TLS handshake with {host}:{port} failed: {source}")]
    Handshake {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    // ===== Established Connection =====
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
