//! SSH server: configuration, listener, and the server side of the handshake.
//!
//! # Example
//!
//! ```rust,no_run
//! use rkvm_proto::ssh::server::{SshServer, SshServerConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SshServerConfig {
//!     host_key_path: "/etc/rkvm/host_rsa.pem".into(),
//!     ..Default::default()
//! };
//! let server = SshServer::bind("0.0.0.0:2222", config).await?;
//!
//! loop {
//!     let mut session = server.accept().await?;
//!     tokio::spawn(async move {
//!         if session.perform_handshake().await.is_ok() {
//!             // Hand the session to the authentication layer
//!             let _ = session.read_packet().await;
//!         }
//!     });
//! }
//! # }
//! ```

use crate::ssh::hostkey::{HostKey, RsaSha2_256HostKey};
use crate::ssh::kex::{KexInit, NewKeys};
use crate::ssh::kex_dh::{DhGroup14Exchange, ExchangeContext, KexdhInit, KexdhReply};
use crate::ssh::keys::KeyMaterial;
use crate::ssh::logging;
use crate::ssh::message::MessageType;
use crate::ssh::packet::MAX_PACKET_SIZE;
use crate::ssh::secure_channel::{PacketReader, PacketWriter, SecureChannel};
use crate::ssh::transport::{State, TransportState};
use crate::ssh::version::{read_identification, Version};
use rkvm_platform::{PacketTransport, SshError, SshResult, REASON_BY_APPLICATION};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Longest accepted software version text.
const MAX_SOFTWARE_VERSION_LEN: usize = 200;

/// SSH server configuration.
#[derive(Debug, Clone)]
pub struct SshServerConfig {
    /// Software version sent in the identification line.
    pub server_version: String,
    /// PEM file holding the PKCS#1 RSA host key.
    pub host_key_path: PathBuf,
    /// Upper bound on the whole handshake. `None` waits indefinitely.
    pub handshake_timeout: Option<Duration>,
    /// Largest accepted `packet_length`.
    pub max_packet_size: usize,
}

impl Default for SshServerConfig {
    fn default() -> Self {
        Self {
            server_version: "RemoteKVM_1.0".to_string(),
            host_key_path: PathBuf::from("host_rsa.pem"),
            handshake_timeout: None,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

impl SshServerConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Config`] unless the version text is 1 to 200
    /// visible ASCII characters without `-`, and `max_packet_size` is in
    /// `1..=35000`.
    pub fn validate(&self) -> SshResult<()> {
        if self.server_version.is_empty() {
            return Err(SshError::Config("server_version is empty".to_string()));
        }
        if self.server_version.len() > MAX_SOFTWARE_VERSION_LEN {
            return Err(SshError::Config(format!(
                "server_version is {} characters (maximum {})",
                self.server_version.len(),
                MAX_SOFTWARE_VERSION_LEN
            )));
        }
        if let Some(c) = self
            .server_version
            .chars()
            .find(|c| !c.is_ascii_graphic() || *c == '-')
        {
            return Err(SshError::Config(format!(
                "server_version contains invalid character {:?}",
                c
            )));
        }
        if self.max_packet_size == 0 || self.max_packet_size > MAX_PACKET_SIZE {
            return Err(SshError::Config(format!(
                "max_packet_size must be in 1..={}, got {}",
                MAX_PACKET_SIZE, self.max_packet_size
            )));
        }
        Ok(())
    }
}

/// SSH server.
///
/// Owns the listener and the host key. The key is loaded once and shared
/// read-only by every session.
pub struct SshServer {
    listener: TcpListener,
    config: SshServerConfig,
    host_key: Arc<dyn HostKey>,
}

impl SshServer {
    /// Validates `config`, loads the host key from `config.host_key_path`
    /// and binds to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Config`] for an invalid configuration,
    /// [`SshError::Resource`] if the host key is missing or unusable, and
    /// [`SshError::Io`] if binding fails.
    pub async fn bind(addr: &str, config: SshServerConfig) -> SshResult<Self> {
        config.validate()?;
        let host_key = Arc::new(RsaSha2_256HostKey::from_pem_file(&config.host_key_path)?);
        Self::bind_with_host_key(addr, config, host_key).await
    }

    /// Binds with an already loaded host key.
    pub async fn bind_with_host_key(
        addr: &str,
        config: SshServerConfig,
        host_key: Arc<dyn HostKey>,
    ) -> SshResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(addr).await.map_err(SshError::Io)?;

        Ok(Self {
            listener,
            config,
            host_key,
        })
    }

    /// Accepts a connection. The returned session has not run the
    /// handshake yet.
    pub async fn accept(&self) -> SshResult<SshSession<TcpStream>> {
        let (stream, peer_addr) = self.listener.accept().await.map_err(SshError::Io)?;
        // Identification line and KEXINIT go out immediately
        stream.set_nodelay(true).map_err(SshError::Io)?;

        Ok(SshSession::new(
            stream,
            peer_addr.to_string(),
            Arc::clone(&self.host_key),
            &self.config,
        ))
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &SshServerConfig {
        &self.config
    }
}

/// One client connection.
pub struct SshSession<S> {
    channel: SecureChannel<S>,
    transport: TransportState,
    host_key: Arc<dyn HostKey>,
    server_version: Version,
    handshake_timeout: Option<Duration>,
    peer_addr: String,
}

impl<S> SshSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an accepted stream.
    pub fn new(
        stream: S,
        peer_addr: impl Into<String>,
        host_key: Arc<dyn HostKey>,
        config: &SshServerConfig,
    ) -> Self {
        let mut channel = SecureChannel::new(stream);
        channel.set_max_packet_size(config.max_packet_size);

        Self {
            channel,
            transport: TransportState::new(),
            host_key,
            server_version: Version::new(&config.server_version, None),
            handshake_timeout: config.handshake_timeout,
            peer_addr: peer_addr.into(),
        }
    }

    /// Runs the transport handshake through NEWKEYS.
    ///
    /// On failure a DISCONNECT carrying the mapped reason code is sent
    /// best-effort, the session moves to [`State::Closed`] and the error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] for unexpected or malformed messages,
    /// [`SshError::AlgorithmMismatch`] if the client does not offer the
    /// server's algorithms, [`SshError::Integrity`] on a MAC failure and
    /// [`SshError::ConnectionClosed`] if the client goes away.
    pub async fn perform_handshake(&mut self) -> SshResult<()> {
        let start = Instant::now();
        logging::log_handshake_start(&self.peer_addr);

        let result = match self.handshake_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.handshake()).await {
                Ok(result) => result,
                Err(_) => Err(SshError::ConnectionClosed(format!(
                    "handshake did not complete within {:?}",
                    limit
                ))),
            },
            None => self.handshake().await,
        };

        match result {
            Ok(()) => {
                logging::log_handshake_complete(
                    &self.peer_addr,
                    self.transport.session_id().unwrap_or_default(),
                    start.elapsed().as_millis() as u64,
                );
                Ok(())
            }
            Err(err) => {
                logging::log_handshake_failed(
                    &self.peer_addr,
                    self.transport.current(),
                    &err.to_string(),
                );
                if !matches!(err, SshError::ConnectionClosed(_)) {
                    let description = if matches!(err, SshError::Integrity) {
                        err.to_string()
                    } else {
                        format!("handshake failed: {}", err)
                    };
                    let _ = self
                        .channel
                        .send_disconnect(err.disconnect_reason(), &description)
                        .await;
                }
                let _ = self.transport.transition(State::Closed);
                Err(err)
            }
        }
    }

    async fn handshake(&mut self) -> SshResult<()> {
        self.transport.expect(State::VersionExchange)?;
        let mut context = ExchangeContext::new();

        // Server speaks first
        self.channel
            .write_raw(&self.server_version.to_wire_format())
            .await?;
        let client_version = read_identification(self.channel.get_mut()).await?;
        logging::log_peer_version(&self.peer_addr, client_version.as_str());

        context.set_client_version(client_version.as_str())?;
        context.set_server_version(self.server_version.as_str())?;
        self.transport.set_peer_version(client_version);
        self.advance(State::AlgorithmNegotiation)?;

        let server_kexinit = KexInit::server_default().to_bytes();
        self.channel.send_packet(&server_kexinit).await?;

        let client_kexinit = self.expect_message(MessageType::KexInit).await?;
        let offer = KexInit::from_bytes(&client_kexinit)?;
        let negotiated = offer.check_supported()?;
        logging::log_algorithms_negotiated(&self.peer_addr, &negotiated);

        context.set_client_kexinit(&client_kexinit)?;
        context.set_server_kexinit(&server_kexinit)?;
        self.transport.set_negotiated(negotiated);

        if offer.guess_was_wrong() {
            let discarded = self.channel.read_packet().await?;
            debug!(
                peer = %self.peer_addr,
                msg_type = discarded[0],
                "Discarded wrongly guessed key exchange packet"
            );
        }
        self.advance(State::DiffieHellman)?;

        let init = KexdhInit::from_bytes(&self.expect_message(MessageType::KexdhInit).await?)?;
        let dh = DhGroup14Exchange::new();
        let shared_secret = dh.compute_shared_secret(&init.e)?;
        let host_key_blob = self.host_key.public_key_bytes();

        context.set_host_key(&host_key_blob)?;
        context.set_e(&init.e)?;
        context.set_f(dh.public_value())?;
        context.set_shared_secret(shared_secret.clone())?;
        let exchange_hash = context.exchange_hash()?;
        self.transport.set_session_id(&exchange_hash)?;

        let reply = KexdhReply {
            host_key: host_key_blob,
            f: dh.public_value().clone(),
            signature: self.host_key.sign(&exchange_hash)?,
        };
        self.channel.send_packet(&reply.to_bytes()).await?;

        let keys = KeyMaterial::derive(
            &shared_secret,
            &exchange_hash,
            &exchange_hash,
            &negotiated,
        );
        drop(shared_secret);
        self.advance(State::NewKeys)?;

        self.channel.send_packet(&NewKeys::new().to_bytes()).await?;
        self.channel
            .enable_outbound_encryption(keys.server_to_client())?;

        NewKeys::from_bytes(&self.expect_message(MessageType::NewKeys).await?)?;
        self.channel
            .enable_inbound_encryption(keys.client_to_server())?;
        self.advance(State::Encrypted)
    }

    async fn expect_message(&mut self, expected: MessageType) -> SshResult<Vec<u8>> {
        let payload = self.channel.read_packet().await?;
        if payload[0] != expected as u8 {
            return Err(SshError::Protocol(format!(
                "Expected {}, got message type {}",
                expected, payload[0]
            )));
        }
        Ok(payload)
    }

    fn advance(&mut self, next: State) -> SshResult<()> {
        let previous = self.transport.current();
        self.transport.transition(next)?;
        logging::log_state_transition(&self.peer_addr, previous, next);
        Ok(())
    }

    fn require_encrypted(&self) -> SshResult<()> {
        self.transport.expect(State::Encrypted)
    }

    /// Reads the next payload after the handshake.
    ///
    /// Cancellation safe, see [`SecureChannel::read_packet`]. Errors close
    /// the session.
    pub async fn read_packet(&mut self) -> SshResult<Vec<u8>> {
        self.require_encrypted()?;
        match self.channel.read_packet().await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                let _ = self.transport.transition(State::Closed);
                Err(err)
            }
        }
    }

    /// Sends one payload after the handshake. Errors close the session.
    pub async fn send_packet(&mut self, payload: &[u8]) -> SshResult<()> {
        self.require_encrypted()?;
        match self.channel.send_packet(payload).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.transport.transition(State::Closed);
                Err(err)
            }
        }
    }

    /// Splits an established session into receive and send halves, for
    /// callers that read and write from separate tasks.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] unless the handshake has completed.
    pub fn into_split(self) -> SshResult<(PacketReader<ReadHalf<S>>, PacketWriter<WriteHalf<S>>)> {
        self.require_encrypted()?;
        debug!(peer = %self.peer_addr, "Splitting session into reader and writer");
        Ok(self.channel.into_split())
    }

    /// Sends SSH_MSG_DISCONNECT and marks the session closed.
    pub async fn send_disconnect(&mut self, reason: u32, description: &str) -> SshResult<()> {
        if self.transport.is_closed() {
            return Err(SshError::ConnectionClosed(
                "session already closed".to_string(),
            ));
        }
        let result = self.channel.send_disconnect(reason, description).await;
        let _ = self.transport.transition(State::Closed);
        result
    }

    /// Session identifier, available once the exchange hash is computed.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.transport.session_id()
    }

    /// Client identification, available after the version exchange.
    pub fn peer_version(&self) -> Option<&Version> {
        self.transport.peer_version()
    }

    /// Peer address as given at construction.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Current transport state.
    pub fn state(&self) -> State {
        self.transport.current()
    }

    /// Sends DISCONNECT (by application) and shuts the stream down. Errors
    /// are ignored.
    pub async fn close(mut self) {
        if !self.transport.is_closed() {
            let _ = self
                .channel
                .send_disconnect(REASON_BY_APPLICATION, "closed by server")
                .await;
            let _ = self.transport.transition(State::Closed);
        }
        let _ = self.channel.shutdown().await;
    }
}

#[async_trait::async_trait]
impl<S> PacketTransport for SshSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_packet(&mut self) -> SshResult<Vec<u8>> {
        SshSession::read_packet(self).await
    }

    async fn send_packet(&mut self, payload: &[u8]) -> SshResult<()> {
        SshSession::send_packet(self, payload).await
    }

    async fn send_disconnect(&mut self, reason: u32, message: &str) -> SshResult<()> {
        SshSession::send_disconnect(self, reason, message).await
    }
}

impl<S> std::fmt::Debug for SshSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.transport.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    const HOST_KEY_PEM: &str = include_str!("../../tests/fixtures/host_rsa_2048.pem");

    fn host_key() -> Arc<dyn HostKey> {
        Arc::new(RsaSha2_256HostKey::from_pem(HOST_KEY_PEM).unwrap())
    }

    #[test]
    fn test_config_default_is_valid() {
        let config = SshServerConfig::default();
        assert_eq!(config.server_version, "RemoteKVM_1.0");
        assert_eq!(config.host_key_path, PathBuf::from("host_rsa.pem"));
        assert!(config.handshake_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let bad_versions = ["", "Remote KVM", "RemoteKVM-1.0", "caf\u{e9}"];
        for version in bad_versions {
            let config = SshServerConfig {
                server_version: version.to_string(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(SshError::Config(_))),
                "{:?}",
                version
            );
        }

        let too_long = SshServerConfig {
            server_version: "x".repeat(201),
            ..Default::default()
        };
        assert!(too_long.validate().is_err());

        for size in [0, MAX_PACKET_SIZE + 1] {
            let config = SshServerConfig {
                max_packet_size: size,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(SshError::Config(_))));
        }
    }

    #[tokio::test]
    async fn test_bind_missing_host_key() {
        let config = SshServerConfig {
            host_key_path: PathBuf::from("/nonexistent/host_rsa.pem"),
            ..Default::default()
        };
        let result = SshServer::bind("127.0.0.1:0", config).await;
        assert!(matches!(result, Err(SshError::Resource(_))));
    }

    #[tokio::test]
    async fn test_bind_with_host_key() {
        let server =
            SshServer::bind_with_host_key("127.0.0.1:0", SshServerConfig::default(), host_key())
                .await
                .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_packets_refused_before_handshake() {
        let (stream, _peer) = duplex(4096);
        let mut session =
            SshSession::new(stream, "test", host_key(), &SshServerConfig::default());

        assert_eq!(session.state(), State::VersionExchange);
        assert!(matches!(
            session.send_packet(b"\x5e").await,
            Err(SshError::Protocol(_))
        ));
        assert!(session.session_id().is_none());
    }

    #[tokio::test]
    async fn test_split_refused_before_handshake() {
        let (stream, _peer) = duplex(4096);
        let session = SshSession::new(stream, "test", host_key(), &SshServerConfig::default());
        assert!(matches!(session.into_split(), Err(SshError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_ssh1_client_gets_disconnect() {
        let (stream, mut peer) = duplex(1 << 16);
        let mut session =
            SshSession::new(stream, "test", host_key(), &SshServerConfig::default());

        peer.write_all(b"SSH-1.5-Legacy\r\n").await.unwrap();
        let result = session.perform_handshake().await;
        assert!(matches!(result, Err(SshError::Protocol(_))));
        assert_eq!(session.state(), State::Closed);

        // Server identification, then a plaintext DISCONNECT
        let mut line = Vec::new();
        loop {
            let byte = peer.read_u8().await.unwrap();
            line.push(byte);
            if byte == b'\n' {
                break;
            }
        }
        assert_eq!(line, b"SSH-2.0-RemoteKVM_1.0\r\n");

        let mut channel = SecureChannel::new(peer);
        match channel.read_packet().await {
            Err(SshError::ConnectionClosed(msg)) => assert!(msg.contains("reason 2")),
            other => panic!("Expected DISCONNECT, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (stream, _peer) = duplex(1 << 16);
        let config = SshServerConfig {
            handshake_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let mut session = SshSession::new(stream, "test", host_key(), &config);

        let result = session.perform_handshake().await;
        assert!(matches!(result, Err(SshError::ConnectionClosed(_))));
        assert_eq!(session.state(), State::Closed);
    }

    #[tokio::test]
    async fn test_unexpected_message_during_negotiation() {
        let (stream, peer) = duplex(1 << 16);
        let mut session =
            SshSession::new(stream, "test", host_key(), &SshServerConfig::default());

        let client = tokio::spawn(async move {
            let mut peer = peer;
            peer.write_all(b"SSH-2.0-Test\r\n").await.unwrap();
            read_identification(&mut peer).await.unwrap();

            let mut channel = SecureChannel::new(peer);
            let kexinit = channel.read_packet().await.unwrap();
            assert_eq!(kexinit[0], MessageType::KexInit as u8);

            // NEWKEYS where KEXINIT belongs
            channel.send_packet(&[21]).await.unwrap();
            channel.read_packet().await
        });

        let result = session.perform_handshake().await;
        assert!(matches!(result, Err(SshError::Protocol(_))));

        match client.await.unwrap() {
            Err(SshError::ConnectionClosed(msg)) => assert!(msg.contains("reason 2")),
            other => panic!("Expected DISCONNECT, got {:?}", other),
        }
    }
}
