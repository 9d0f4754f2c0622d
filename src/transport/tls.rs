use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{ReadStatus, Transport, WriteStatus};

/// Bounded wait for inbound data on an established connection.
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Socket timeouts while connecting and shaking hands.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for outbound socket space.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// TLS 1.2 client channel to an APNS endpoint.
///
/// Authenticates with a PEM client certificate and key; the server chain
/// and hostname are verified against the CA directory during the
/// handshake. After the handshake the socket carries a 100 ms read
/// timeout, so a read poll never blocks the tick loop for longer.
pub struct TlsTransport {
    host: String,
    port: u16,
    cert_file: String,
    key_file: String,
    ca_path: String,
    session: Option<Session>,
}

struct Session {
    conn: ClientConnection,
    sock: TcpStream,
}

impl TlsTransport {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        cert_file: impl Into<String>,
        key_file: impl Into<String>,
        ca_path: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            ca_path: ca_path.into(),
            session: None,
        }
    }

    /// Builds the rustls client context: trusted roots from the CA
    /// directory, client certificate chain and matching private key.
    fn client_config(&self) -> Result<Arc<ClientConfig>, TransportError> {
        let mut roots = RootCertStore::empty();
        let entries = std::fs::read_dir(&self.ca_path).map_err(|source| {
            TransportError::CaPath {
                path: self.ca_path.clone(),
                source,
            }
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file) = File::open(&path) else {
                continue;
            };
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                match cert {
                    Ok(cert) => {
                        if let Err(e) = roots.add(cert) {
                            debug!(path = %path.display(), error = %e, "Skipping unusable CA certificate");
                        }
                    }
                    // Not a PEM certificate file; skip the rest of it.
                    Err(_) => break,
                }
            }
        }
        if roots.is_empty() {
            return Err(TransportError::EmptyCaStore(self.ca_path.clone()));
        }

        let cert_file = File::open(&self.cert_file).map_err(|source| {
            TransportError::Certificate {
                path: self.cert_file.clone(),
                source,
            }
        })?;
        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut BufReader::new(cert_file))
                .collect::<Result<_, _>>()
                .map_err(|source| TransportError::Certificate {
                    path: self.cert_file.clone(),
                    source,
                })?;
        if certs.is_empty() {
            return Err(TransportError::EmptyCertificate(self.cert_file.clone()));
        }

        let key_file = File::open(&self.key_file).map_err(|source| {
            TransportError::PrivateKey {
                path: self.key_file.clone(),
                source,
            }
        })?;
        let key: PrivateKeyDer<'static> =
            rustls_pemfile::private_key(&mut BufReader::new(key_file))
                .map_err(|source| TransportError::PrivateKey {
                    path: self.key_file.clone(),
                    source,
                })?
                .ok_or_else(|| TransportError::MissingPrivateKey(self.key_file.clone()))?;

        let config = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(TransportError::KeyMismatch)?;

        Ok(Arc::new(config))
    }

    /// Resolves the endpoint to its first IPv4 address.
    fn resolve(&self) -> Result<SocketAddr, TransportError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| TransportError::Dns(self.host.clone()))?;
        addrs
            .into_iter()
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| TransportError::Dns(self.host.clone()))
    }
}

impl Transport for TlsTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Ok(());
        }

        let config = self.client_config()?;

        info!(host = %self.host, port = self.port, "Connecting");

        let addr = self.resolve()?;
        let mut sock =
            TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|source| {
                TransportError::Connect {
                    host: self.host.clone(),
                    port: self.port,
                    source,
                }
            })?;
        sock.set_read_timeout(Some(CONNECT_TIMEOUT))?;
        sock.set_write_timeout(Some(WRITE_TIMEOUT))?;
        sock.set_nodelay(true)?;

        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|_| TransportError::ServerName(self.host.clone()))?;
        let mut conn = ClientConnection::new(config, server_name)?;

        while conn.is_handshaking() {
            conn.complete_io(&mut sock).map_err(|source| {
                TransportError::Handshake {
                    host: self.host.clone(),
                    port: self.port,
                    source,
                }
            })?;
        }

        // Established; reads from here on are bounded polls.
        sock.set_read_timeout(Some(READ_POLL_TIMEOUT))?;

        info!(host = %self.host, port = self.port, "Connected");
        self.session = Some(Session { conn, sock });

        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            info!(host = %self.host, port = self.port, "Disconnecting");
            session.conn.send_close_notify();
            let _ = session.flush();
            let _ = session.sock.shutdown(Shutdown::Both);
        }
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn write(&mut self, buf: &[u8]) -> WriteStatus {
        let Some(session) = self.session.as_mut() else {
            return WriteStatus::Failed;
        };
        match session.write_packet(buf) {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "TLS write failed");
                self.disconnect();
                WriteStatus::Failed
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> ReadStatus {
        let Some(session) = self.session.as_mut() else {
            return ReadStatus::Closed;
        };
        match session.read_poll(buf) {
            Ok(ReadStatus::Closed) => {
                debug!("Peer closed the TLS stream");
                self.disconnect();
                ReadStatus::Closed
            }
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "TLS read failed");
                self.disconnect();
                ReadStatus::Closed
            }
        }
    }
}

impl Drop for TlsTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Session {
    /// Pushes buffered TLS bytes to the socket. `Ok(false)` means the
    /// socket would block; leftovers stay queued for the next call.
    fn flush(&mut self) -> io::Result<bool> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.sock) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(_) => {}
                Err(e) if is_transient(&e) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Accepts a whole packet into the session, or none of it. Leftover
    /// TLS bytes from a previous call must drain first so a deferred
    /// packet is never buffered twice.
    fn write_packet(&mut self, buf: &[u8]) -> io::Result<WriteStatus> {
        if !self.flush()? {
            debug!("TLS session still draining, packet deferred");
            return Ok(WriteStatus::Busy);
        }
        self.conn.writer().write_all(buf)?;
        // Best effort; bytes left queued here go out with the next call.
        self.flush()?;
        Ok(WriteStatus::Written(buf.len()))
    }

    /// One bounded read: drains decrypted plaintext if any is waiting,
    /// otherwise performs a single TLS read inside the socket's 100 ms
    /// timeout.
    fn read_poll(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        self.flush()?;

        match self.conn.reader().read(buf) {
            Ok(0) => return Ok(ReadStatus::Closed),
            Ok(n) => return Ok(ReadStatus::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        match self.conn.read_tls(&mut self.sock) {
            Ok(0) => return Ok(ReadStatus::Closed),
            Ok(_) => {}
            Err(e) if is_transient(&e) => return Ok(ReadStatus::NotReady),
            Err(e) => return Err(e),
        }

        self.conn
            .process_new_packets()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        match self.conn.reader().read(buf) {
            Ok(0) => Ok(ReadStatus::Closed),
            Ok(n) => Ok(ReadStatus::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadStatus::NotReady),
            Err(e) => Err(e),
        }
    }
}

/// A blocking socket with a timeout reports an exhausted window as
/// `WouldBlock` or `TimedOut` depending on the platform.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_fails_cleanly_without_ca_path() {
        let mut transport = TlsTransport::new(
            "localhost",
            2195,
            "/nonexistent/cert.pem",
            "/nonexistent/key.pem",
            "/nonexistent/ca",
        );
        let err = transport.connect().unwrap_err();
        assert!(matches!(err, TransportError::CaPath { .. }));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_io_on_disconnected_transport() {
        let mut transport =
            TlsTransport::new("localhost", 2195, "cert.pem", "key.pem", "/tmp");
        assert_eq!(transport.write(b"x"), WriteStatus::Failed);
        let mut buf = [0u8; 6];
        assert_eq!(transport.read(&mut buf), ReadStatus::Closed);
        // Idempotent on a never-connected transport.
        transport.disconnect();
        transport.disconnect();
    }
}
