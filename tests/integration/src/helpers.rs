//! Test helpers for integration tests
//!
//! Provides a self-contained test server (ephemeral port, optional
//! self-signed TLS) and a minimal blocking WebSocket client.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use gwsim_common::{
    AgentConfig, AppSettings, GatewayConfig, GeneratorConfig, ProtocolConfig, ServerConfig, TlsConfig,
};
use gwsim_gateway::frame::{self, apply_mask, FrameOpcode};
use gwsim_gateway::Server;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Sample key from RFC 6455 section 1.3
pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Default wait for any single server response
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket read timeout while waiting on the server
const POLL_INTERVAL: Duration = Duration::from_millis(50);

static FILE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Gateway configuration for tests: ephemeral port, two agents, small guilds
pub fn test_config(guild_count: u32) -> GatewayConfig {
    GatewayConfig {
        app: AppSettings::default(),
        gateway: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        tls: None,
        protocol: ProtocolConfig::default(),
        agents: AgentConfig {
            count: 2,
            shard_count: 1,
        },
        generator: GeneratorConfig {
            guild_count,
            min_members: 1,
            max_members: 4,
            roles_per_guild: 2,
            channels_per_guild: 3,
            worker_id: 1,
        },
    }
}

/// Self-signed certificate for `localhost`, written to temp files
pub struct TestCertificate {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub der: CertificateDer<'static>,
}

impl TestCertificate {
    pub fn generate() -> Result<Self> {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
        let n = FILE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir();
        let cert_path = dir.join(format!("gwsim-it-{}-{n}-cert.pem", std::process::id()));
        let key_path = dir.join(format!("gwsim-it-{}-{n}-key.pem", std::process::id()));

        std::fs::write(&cert_path, certified.cert.pem())?;
        std::fs::write(&key_path, certified.key_pair.serialize_pem())?;

        Ok(Self {
            cert_path,
            key_path,
            der: certified.cert.der().clone(),
        })
    }

    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig {
            cert_path: self.cert_path.clone(),
            key_path: self.key_path.clone(),
        }
    }
}

impl Drop for TestCertificate {
    fn drop(&mut self) {
        std::fs::remove_file(&self.cert_path).ok();
        std::fs::remove_file(&self.key_path).ok();
    }
}

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    server: Option<Server>,
    cancel: CancellationToken,
    certificate: Option<TestCertificate>,
}

impl TestServer {
    /// Start a TLS server with `config` (its `tls` section is replaced)
    pub fn start_tls(mut config: GatewayConfig) -> Result<Self> {
        let certificate = TestCertificate::generate()?;
        config.tls = Some(certificate.tls_config());
        Self::start_inner(config, Some(certificate))
    }

    /// Start a plaintext server with `config`
    pub fn start_plain(mut config: GatewayConfig) -> Result<Self> {
        config.tls = None;
        Self::start_inner(config, None)
    }

    fn start_inner(config: GatewayConfig, certificate: Option<TestCertificate>) -> Result<Self> {
        let cancel = CancellationToken::new();
        let server = Server::start(config, cancel.clone())?;
        Ok(Self {
            addr: server.local_addr(),
            server: Some(server),
            cancel,
            certificate,
        })
    }

    /// Open a client and complete the upgrade with `query` (e.g. `v=10&encoding=json`)
    pub fn connect(&self, query: &str) -> Result<GatewayClient> {
        let mut client = self.open()?;
        let response = client.upgrade(query)?;
        if !response.starts_with("HTTP/1.1 101") {
            bail!("upgrade refused: {response}");
        }
        Ok(client)
    }

    /// Open a transport-level client without sending anything
    pub fn open(&self) -> Result<GatewayClient> {
        let mut tcp = TcpStream::connect(self.addr)?;
        tcp.set_nodelay(true)?;
        tcp.set_read_timeout(Some(RESPONSE_TIMEOUT))?;

        let stream = match &self.certificate {
            Some(certificate) => {
                let mut roots = RootCertStore::empty();
                roots.add(certificate.der.clone())?;
                let config = ClientConfig::builder_with_provider(Arc::new(
                    rustls::crypto::ring::default_provider(),
                ))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(roots)
                .with_no_client_auth();
                let name = ServerName::try_from("localhost")?;
                let mut conn = ClientConnection::new(Arc::new(config), name)?;
                while conn.is_handshaking() {
                    conn.complete_io(&mut tcp).context("TLS handshake failed")?;
                }
                tcp.set_read_timeout(Some(POLL_INTERVAL))?;
                ClientStream::Tls(Box::new(StreamOwned::new(conn, tcp)))
            }
            None => {
                tcp.set_read_timeout(Some(POLL_INTERVAL))?;
                ClientStream::Plain(tcp)
            }
        };

        Ok(GatewayClient {
            stream,
            buffer: Vec::new(),
        })
    }

    /// Cancel the server and wait for its threads
    pub fn shutdown(&mut self) -> Result<()> {
        match self.server.take() {
            Some(server) => server.shutdown().map_err(|e| anyhow!(e)),
            None => Ok(()),
        }
    }

    /// Ask the server to stop without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown().ok();
    }
}

/// Client transport
pub enum ClientStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for ClientStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

/// What the server sent next
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Frame(FrameOpcode, Vec<u8>),
    /// The server closed the transport
    Eof,
}

/// Minimal blocking WebSocket client
pub struct GatewayClient {
    stream: ClientStream,
    buffer: Vec<u8>,
}

impl GatewayClient {
    /// Send the upgrade request and return the response head
    pub fn upgrade(&mut self, query: &str) -> Result<String> {
        let request = format!(
            "GET /?{query} HTTP/1.1\r\n\
             Host: localhost\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {SAMPLE_KEY}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );
        self.send_raw(request.as_bytes())?;
        self.read_http_response()
    }

    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Send one masked frame
    pub fn send_frame(&mut self, opcode: FrameOpcode, payload: &[u8]) -> Result<()> {
        self.send_raw(&masked_frame(opcode, payload, true))
    }

    pub fn send_json(&mut self, value: &Value) -> Result<()> {
        self.send_frame(FrameOpcode::Text, &serde_json::to_vec(value)?)
    }

    pub fn send_etf(&mut self, value: &Value) -> Result<()> {
        self.send_frame(FrameOpcode::Binary, &gwsim_etf::encode_from_json(value)?)
    }

    pub fn read_http_response(&mut self) -> Result<String> {
        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        loop {
            if let Some(end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                let head: Vec<u8> = self.buffer.drain(..end + 4).collect();
                return Ok(String::from_utf8(head)?);
            }
            if Instant::now() >= deadline {
                bail!("timed out waiting for HTTP response");
            }
            if !self.fill(deadline)? {
                bail!("connection closed before HTTP response");
            }
        }
    }

    /// Next frame or EOF within `timeout`; `None` when nothing arrived
    pub fn poll_event(&mut self, timeout: Duration) -> Result<Option<ServerEvent>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some((frame, used)) = frame::try_decode(&self.buffer)? {
                self.buffer.drain(..used);
                return Ok(Some(ServerEvent::Frame(frame.opcode, frame.payload)));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if !self.fill(deadline)? {
                return Ok(Some(ServerEvent::Eof));
            }
        }
    }

    pub fn next_frame(&mut self) -> Result<(FrameOpcode, Vec<u8>)> {
        match self.poll_event(RESPONSE_TIMEOUT)? {
            Some(ServerEvent::Frame(opcode, payload)) => Ok((opcode, payload)),
            Some(ServerEvent::Eof) => bail!("server closed the connection"),
            None => bail!("timed out waiting for a frame"),
        }
    }

    /// Next data frame decoded as JSON (text) or ETF (binary)
    pub fn next_message(&mut self) -> Result<Value> {
        let (opcode, payload) = self.next_frame()?;
        match opcode {
            FrameOpcode::Text => Ok(serde_json::from_slice(&payload)?),
            FrameOpcode::Binary => Ok(gwsim_etf::decode_to_value(&payload)?),
            FrameOpcode::Close => bail!("server closed with {:?}", close_code(&payload)),
            other => bail!("unexpected {other:?} frame"),
        }
    }

    /// Wait for the Close frame and return its code
    pub fn expect_close(&mut self) -> Result<u16> {
        loop {
            let (opcode, payload) = self.next_frame()?;
            if opcode == FrameOpcode::Close {
                return close_code(&payload).context("close frame without a code");
            }
        }
    }

    /// Read until the server closes the transport
    pub fn expect_eof(&mut self) -> Result<()> {
        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        loop {
            self.buffer.clear();
            if Instant::now() >= deadline {
                bail!("server kept the connection open");
            }
            if !self.fill(deadline)? {
                return Ok(());
            }
        }
    }

    /// Read once more into the buffer; `false` on EOF
    fn fill(&mut self, deadline: Instant) -> Result<bool> {
        let mut chunk = [0u8; 16 * 1024];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    if Instant::now() >= deadline {
                        return Ok(true);
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof) => {
                    return Ok(false)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Status code carried by a Close payload
pub fn close_code(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Build a client frame; clients must mask
pub fn masked_frame(opcode: FrameOpcode, payload: &[u8], fin: bool) -> Vec<u8> {
    let key = [0xA1, 0x5E, 0x07, 0xC3];
    let mut out = vec![(if fin { 0x80 } else { 0x00 }) | opcode as u8];

    let len = payload.len();
    if len <= 125 {
        out.push(0x80 | len as u8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(0x80 | 126);
        out.extend_from_slice(&len16.to_be_bytes());
    } else {
        out.push(0x80 | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(&key);
    let mut masked = payload.to_vec();
    apply_mask(&mut masked, key);
    out.extend_from_slice(&masked);
    out
}
