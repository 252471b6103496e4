//! A single non-blocking client socket
//!
//! Owns the TCP stream and, when TLS is enabled, the rustls session that wraps
//! it. Both are released together by [`Connection::disconnect`].

use mio::net::TcpStream;
use mio::Interest;
use rustls::{ServerConfig, ServerConnection};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

/// Largest chunk queued as one unit of output (16 KiB)
pub const WRITE_CHUNK_SIZE: usize = 16 * 1024;

/// Scratch buffer size for plaintext socket reads
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Transport errors; any of these ends the connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("connection closed")]
    Closed,
}

/// A client socket with its input accumulator and output queue
pub struct Connection {
    socket: TcpStream,
    tls: Option<ServerConnection>,
    peer: SocketAddr,

    /// Bytes received and not yet consumed by the session
    input: Vec<u8>,

    /// Pending writes, FIFO, each at most [`WRITE_CHUNK_SIZE`]
    output: VecDeque<Vec<u8>>,

    bytes_read: u64,
    bytes_written: u64,
    connected: bool,
    peer_closed: bool,

    /// Interest currently registered with the multiplexer
    pub(crate) interest: Option<Interest>,
}

impl Connection {
    /// Wrap an accepted socket without TLS
    pub fn plain(stream: std::net::TcpStream, peer: SocketAddr) -> Result<Self, ConnectionError> {
        Self::build(stream, peer, None)
    }

    /// Wrap an accepted socket and start a server-side TLS session on it
    pub fn tls(
        stream: std::net::TcpStream,
        peer: SocketAddr,
        config: Arc<ServerConfig>,
    ) -> Result<Self, ConnectionError> {
        let tls = ServerConnection::new(config)?;
        Self::build(stream, peer, Some(tls))
    }

    fn build(
        stream: std::net::TcpStream,
        peer: SocketAddr,
        tls: Option<ServerConnection>,
    ) -> Result<Self, ConnectionError> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            socket: TcpStream::from_std(stream),
            tls,
            peer,
            input: Vec::new(),
            output: VecDeque::new(),
            bytes_read: 0,
            bytes_written: 0,
            connected: true,
            peer_closed: false,
            interest: None,
        })
    }

    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the peer has closed its side (EOF or TLS close_notify)
    #[must_use]
    pub fn is_peer_closed(&self) -> bool {
        self.peer_closed
    }

    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Accumulated input not yet consumed
    #[must_use]
    pub fn input(&self) -> &[u8] {
        &self.input
    }

    /// Drop `n` bytes from the front of the input accumulator
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.input.len());
        self.input.drain(..n);
    }

    /// Bytes still queued for writing
    #[must_use]
    pub fn queued_bytes(&self) -> usize {
        self.output.iter().map(Vec::len).sum()
    }

    /// Whether anything remains to be written, including TLS records
    #[must_use]
    pub fn has_pending_output(&self) -> bool {
        !self.output.is_empty() || self.tls.as_ref().is_some_and(|tls| tls.wants_write())
    }

    /// Queue `bytes` for writing
    ///
    /// A priority payload that fits in one chunk is written immediately when
    /// nothing else is queued; everything else is split into chunks and
    /// appended behind what is already pending.
    pub fn write(&mut self, bytes: &[u8], priority: bool) -> Result<(), ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::Closed);
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let immediate = priority && self.output.is_empty() && bytes.len() <= WRITE_CHUNK_SIZE;
        self.output
            .extend(bytes.chunks(WRITE_CHUNK_SIZE).map(<[u8]>::to_vec));

        if immediate {
            self.pump_write()?;
        }
        Ok(())
    }

    /// Write as much queued output as the socket accepts
    ///
    /// Stops quietly when the socket would block.
    pub fn pump_write(&mut self) -> Result<(), ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::Closed);
        }

        match self.tls.as_mut() {
            Some(tls) => {
                while let Some(chunk) = self.output.front_mut() {
                    let accepted = tls.writer().write(chunk)?;
                    if accepted == chunk.len() {
                        self.output.pop_front();
                    } else {
                        chunk.drain(..accepted);
                        break;
                    }
                }

                while tls.wants_write() {
                    match tls.write_tls(&mut self.socket) {
                        Ok(0) => return Err(ConnectionError::Closed),
                        Ok(n) => self.bytes_written += n as u64,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            None => {
                while let Some(chunk) = self.output.front_mut() {
                    match self.socket.write(chunk) {
                        Ok(0) => return Err(ConnectionError::Closed),
                        Ok(n) => {
                            self.bytes_written += n as u64;
                            if n == chunk.len() {
                                self.output.pop_front();
                            } else {
                                chunk.drain(..n);
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Ok(())
    }

    /// Read everything currently available into the input accumulator
    ///
    /// Returns the number of plaintext bytes appended. Keeps reading until the
    /// socket would block so that every buffered TLS record is decrypted.
    pub fn pump_read(&mut self) -> Result<usize, ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::Closed);
        }

        let mut appended = 0;
        match self.tls.as_mut() {
            Some(tls) => loop {
                let read = match tls.read_tls(&mut self.socket) {
                    Ok(0) => {
                        self.peer_closed = true;
                        0
                    }
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                self.bytes_read += read as u64;

                let state = match tls.process_new_packets() {
                    Ok(state) => state,
                    Err(err) => {
                        // Best effort: let the peer see the alert
                        let _ = tls.write_tls(&mut self.socket);
                        return Err(err.into());
                    }
                };

                let pending = state.plaintext_bytes_to_read();
                if pending > 0 {
                    let start = self.input.len();
                    self.input.resize(start + pending, 0);
                    tls.reader().read_exact(&mut self.input[start..])?;
                    appended += pending;
                }
                if state.peer_has_closed() {
                    self.peer_closed = true;
                }
                if read == 0 || self.peer_closed {
                    break;
                }
            },
            None => {
                let mut scratch = [0u8; READ_CHUNK_SIZE];
                loop {
                    match self.socket.read(&mut scratch) {
                        Ok(0) => {
                            self.peer_closed = true;
                            break;
                        }
                        Ok(n) => {
                            self.bytes_read += n as u64;
                            self.input.extend_from_slice(&scratch[..n]);
                            appended += n;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Ok(appended)
    }

    /// Shut the socket down and drop both buffers; safe to call repeatedly
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;

        if let Some(tls) = self.tls.as_mut() {
            tls.send_close_notify();
            let _ = tls.write_tls(&mut self.socket);
        }
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            tracing::trace!(peer = %self.peer, error = %e, "Socket shutdown failed");
        }

        self.input.clear();
        self.output.clear();
    }

    pub(crate) fn socket_mut(&mut self) -> &mut TcpStream {
        &mut self.socket
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("tls", &self.tls.is_some())
            .field("connected", &self.connected)
            .field("input", &self.input.len())
            .field("queued", &self.queued_bytes())
            .field("bytes_read", &self.bytes_read)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn pair() -> (Connection, std::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        (Connection::plain(server, peer).unwrap(), client)
    }

    fn read_until(conn: &mut Connection, len: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while conn.input().len() < len && Instant::now() < deadline {
            conn.pump_read().unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_priority_write_goes_out_immediately() {
        let (mut conn, mut client) = pair();
        conn.write(b"hello", true).unwrap();
        assert!(!conn.has_pending_output());
        assert_eq!(conn.bytes_written(), 5);

        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_large_write_is_chunked_and_queued() {
        let (mut conn, mut client) = pair();
        let payload = vec![7u8; WRITE_CHUNK_SIZE * 2 + 10];
        conn.write(&payload, true).unwrap();

        assert_eq!(conn.output.len(), 3);
        assert_eq!(conn.queued_bytes(), payload.len());

        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = std::thread::spawn(move || {
            let mut buf = vec![0u8; WRITE_CHUNK_SIZE * 2 + 10];
            client.read_exact(&mut buf).unwrap();
            buf
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while conn.has_pending_output() && Instant::now() < deadline {
            conn.pump_write().unwrap();
        }
        assert_eq!(reader.join().unwrap(), payload);
    }

    #[test]
    fn test_non_priority_write_waits_for_pump() {
        let (mut conn, _client) = pair();
        conn.write(b"queued", false).unwrap();
        assert!(conn.has_pending_output());

        conn.pump_write().unwrap();
        assert!(!conn.has_pending_output());
    }

    #[test]
    fn test_pump_read_and_consume() {
        let (mut conn, mut client) = pair();
        client.write_all(b"GET / HTTP/1.1\r\n").unwrap();
        read_until(&mut conn, 16);

        assert_eq!(conn.input(), b"GET / HTTP/1.1\r\n");
        conn.consume(4);
        assert_eq!(conn.input(), b"/ HTTP/1.1\r\n");
        conn.consume(100);
        assert!(conn.input().is_empty());
    }

    #[test]
    fn test_peer_close_detected() {
        let (mut conn, client) = pair();
        drop(client);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !conn.is_peer_closed() && Instant::now() < deadline {
            let _ = conn.pump_read();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(conn.is_peer_closed());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (mut conn, _client) = pair();
        conn.write(b"never sent", false).unwrap();

        conn.disconnect();
        conn.disconnect();

        assert!(!conn.is_connected());
        assert!(!conn.has_pending_output());
        assert!(matches!(conn.write(b"x", false), Err(ConnectionError::Closed)));
        assert!(matches!(conn.pump_read(), Err(ConnectionError::Closed)));
    }

    #[test]
    fn test_tls_handshake_records_count_as_pending_output() {
        let certificate = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key =
            rustls::pki_types::PrivatePkcs8KeyDer::from(certificate.key_pair.serialize_der()).into();
        let config =
            crate::server::server_config(vec![certificate.cert.der().clone()], key).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        let mut conn = Connection::tls(server, peer, config).unwrap();

        let mut roots = rustls::RootCertStore::empty();
        roots.add(certificate.cert.der().clone()).unwrap();
        let client_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        let mut tls_client = rustls::ClientConnection::new(
            Arc::new(client_config),
            "localhost".try_into().unwrap(),
        )
        .unwrap();
        while tls_client.wants_write() {
            tls_client.write_tls(&mut client).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while !conn.has_pending_output() && Instant::now() < deadline {
            conn.pump_read().unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }

        // ServerHello is pending inside the TLS session, not the chunk queue
        assert_eq!(conn.queued_bytes(), 0);
        assert!(conn.has_pending_output());

        conn.pump_write().unwrap();
        assert!(!conn.has_pending_output());
    }
}
