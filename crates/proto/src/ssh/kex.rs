//! SSH algorithm negotiation (RFC 4253 Section 7).
//!
//! This module implements:
//! - SSH_MSG_KEXINIT message
//! - SSH_MSG_NEWKEYS message
//! - Algorithm negotiation against the server's fixed suite
//!
//! # Key Exchange Flow
//!
//! 1. Both sides send SSH_MSG_KEXINIT
//! 2. The peer's lists must contain the server's single choice per category
//! 3. Diffie-Hellman group14 exchange (see [`kex_dh`](super::kex_dh))
//! 4. Both sides send SSH_MSG_NEWKEYS
//! 5. Switch to encrypted communication
//!
//! The server offers exactly one algorithm per category, so "negotiation"
//! reduces to checking that the client supports it.
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::kex::{KexInit, NewKeys};
//!
//! let kexinit = KexInit::server_default();
//! assert_eq!(kexinit.kex_algorithms(), ["diffie-hellman-group14-sha256"]);
//!
//! let newkeys = NewKeys::new();
//! assert_eq!(newkeys.to_bytes(), vec![21]);
//! ```

use crate::ssh::crypto::{CipherAlgorithm, MacAlgorithm};
use crate::ssh::hostkey::HostKeyAlgorithm;
use crate::ssh::message::MessageType;
use crate::ssh::wire::{SshReader, SshWriter};
use rand::RngCore;
use rkvm_platform::{SshError, SshResult};

/// Compression algorithm name; compression is never enabled.
pub const COMPRESSION_NONE: &str = "none";

/// Key exchange algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KexAlgorithm {
    /// diffie-hellman-group14-sha256 (RFC 8268)
    DiffieHellmanGroup14Sha256,
}

impl KexAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            KexAlgorithm::DiffieHellmanGroup14Sha256 => "diffie-hellman-group14-sha256",
        }
    }

    /// Returns the exchange hash output size in bytes.
    pub fn hash_len(&self) -> usize {
        match self {
            KexAlgorithm::DiffieHellmanGroup14Sha256 => 32,
        }
    }

    /// Parses an algorithm name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "diffie-hellman-group14-sha256" => Some(KexAlgorithm::DiffieHellmanGroup14Sha256),
            _ => None,
        }
    }
}

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
///
/// Each algorithm list is ordered by preference (most preferred first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    cookie: [u8; 16],
    kex_algorithms: Vec<String>,
    server_host_key_algorithms: Vec<String>,
    encryption_algorithms_client_to_server: Vec<String>,
    encryption_algorithms_server_to_client: Vec<String>,
    mac_algorithms_client_to_server: Vec<String>,
    mac_algorithms_server_to_client: Vec<String>,
    compression_algorithms_client_to_server: Vec<String>,
    compression_algorithms_server_to_client: Vec<String>,
    languages_client_to_server: Vec<String>,
    languages_server_to_client: Vec<String>,
    first_kex_packet_follows: bool,
}

impl KexInit {
    /// Creates the server's KEXINIT with a fresh random cookie and one name
    /// per category.
    pub fn server_default() -> Self {
        let single = |name: &str| vec![name.to_string()];
        Self::with_algorithms(
            single(KexAlgorithm::DiffieHellmanGroup14Sha256.name()),
            single(HostKeyAlgorithm::RsaSha2_256.name()),
            single(CipherAlgorithm::Aes256Ctr.name()),
            single(MacAlgorithm::HmacSha256.name()),
        )
    }

    /// Creates a KEXINIT offering the given lists in both directions, with
    /// compression `none` and no languages.
    pub fn with_algorithms(
        kex: Vec<String>,
        host_key: Vec<String>,
        ciphers: Vec<String>,
        macs: Vec<String>,
    ) -> Self {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        Self {
            cookie,
            kex_algorithms: kex,
            server_host_key_algorithms: host_key,
            encryption_algorithms_client_to_server: ciphers.clone(),
            encryption_algorithms_server_to_client: ciphers,
            mac_algorithms_client_to_server: macs.clone(),
            mac_algorithms_server_to_client: macs,
            compression_algorithms_client_to_server: vec![COMPRESSION_NONE.to_string()],
            compression_algorithms_server_to_client: vec![COMPRESSION_NONE.to_string()],
            languages_client_to_server: vec![],
            languages_server_to_client: vec![],
            first_kex_packet_follows: false,
        }
    }

    /// Sets the first_kex_packet_follows flag.
    pub fn set_first_kex_packet_follows(&mut self, follows: bool) {
        self.first_kex_packet_follows = follows;
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; 16] {
        &self.cookie
    }

    /// Returns the key exchange algorithms.
    pub fn kex_algorithms(&self) -> &[String] {
        &self.kex_algorithms
    }

    /// Returns the server host key algorithms.
    pub fn server_host_key_algorithms(&self) -> &[String] {
        &self.server_host_key_algorithms
    }

    /// Returns the encryption algorithms (client to server).
    pub fn encryption_algorithms_client_to_server(&self) -> &[String] {
        &self.encryption_algorithms_client_to_server
    }

    /// Returns the encryption algorithms (server to client).
    pub fn encryption_algorithms_server_to_client(&self) -> &[String] {
        &self.encryption_algorithms_server_to_client
    }

    /// Returns the MAC algorithms (client to server).
    pub fn mac_algorithms_client_to_server(&self) -> &[String] {
        &self.mac_algorithms_client_to_server
    }

    /// Returns the MAC algorithms (server to client).
    pub fn mac_algorithms_server_to_client(&self) -> &[String] {
        &self.mac_algorithms_server_to_client
    }

    /// Returns the compression algorithms (client to server).
    pub fn compression_algorithms_client_to_server(&self) -> &[String] {
        &self.compression_algorithms_client_to_server
    }

    /// Returns the compression algorithms (server to client).
    pub fn compression_algorithms_server_to_client(&self) -> &[String] {
        &self.compression_algorithms_server_to_client
    }

    /// Returns whether first KEX packet follows.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Serializes the KEXINIT message to bytes (without packet framing).
    ///
    /// Format (RFC 4253 Section 7.1):
    /// ```text
    /// byte         SSH_MSG_KEXINIT (20)
    /// byte[16]     cookie (random bytes)
    /// name-list    kex_algorithms
    /// name-list    server_host_key_algorithms
    /// name-list    encryption_algorithms_client_to_server
    /// name-list    encryption_algorithms_server_to_client
    /// name-list    mac_algorithms_client_to_server
    /// name-list    mac_algorithms_server_to_client
    /// name-list    compression_algorithms_client_to_server
    /// name-list    compression_algorithms_server_to_client
    /// name-list    languages_client_to_server
    /// name-list    languages_server_to_client
    /// boolean      first_kex_packet_follows
    /// uint32       0 (reserved for future extension)
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = SshWriter::message(MessageType::KexInit as u8);
        buf.put_raw(&self.cookie)
            .put_name_list(&self.kex_algorithms)
            .put_name_list(&self.server_host_key_algorithms)
            .put_name_list(&self.encryption_algorithms_client_to_server)
            .put_name_list(&self.encryption_algorithms_server_to_client)
            .put_name_list(&self.mac_algorithms_client_to_server)
            .put_name_list(&self.mac_algorithms_server_to_client)
            .put_name_list(&self.compression_algorithms_client_to_server)
            .put_name_list(&self.compression_algorithms_server_to_client)
            .put_name_list(&self.languages_client_to_server)
            .put_name_list(&self.languages_server_to_client)
            .put_bool(self.first_kex_packet_follows)
            .put_u32(0);
        buf.into_vec()
    }

    /// Parses a KEXINIT message from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] if:
    /// - Message type is not SSH_MSG_KEXINIT (20)
    /// - A field is truncated or a name-list is malformed
    /// - The reserved field is nonzero
    /// - Bytes remain after the reserved field
    pub fn from_bytes(data: &[u8]) -> SshResult<Self> {
        let mut reader = SshReader::new(data);

        let msg = reader.read_u8()?;
        if msg != MessageType::KexInit as u8 {
            return Err(SshError::Protocol(format!(
                "Invalid message type: expected 20 (SSH_MSG_KEXINIT), got {}",
                msg
            )));
        }

        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(reader.read_raw(16)?);

        let kex_algorithms = reader.read_name_list()?;
        let server_host_key_algorithms = reader.read_name_list()?;
        let encryption_algorithms_client_to_server = reader.read_name_list()?;
        let encryption_algorithms_server_to_client = reader.read_name_list()?;
        let mac_algorithms_client_to_server = reader.read_name_list()?;
        let mac_algorithms_server_to_client = reader.read_name_list()?;
        let compression_algorithms_client_to_server = reader.read_name_list()?;
        let compression_algorithms_server_to_client = reader.read_name_list()?;
        let languages_client_to_server = reader.read_name_list()?;
        let languages_server_to_client = reader.read_name_list()?;
        let first_kex_packet_follows = reader.read_bool()?;

        let reserved = reader.read_u32()?;
        if reserved != 0 {
            return Err(SshError::Protocol(format!(
                "KEXINIT reserved field is {} (must be 0)",
                reserved
            )));
        }
        reader.finish()?;

        Ok(Self {
            cookie,
            kex_algorithms,
            server_host_key_algorithms,
            encryption_algorithms_client_to_server,
            encryption_algorithms_server_to_client,
            mac_algorithms_client_to_server,
            mac_algorithms_server_to_client,
            compression_algorithms_client_to_server,
            compression_algorithms_server_to_client,
            languages_client_to_server,
            languages_server_to_client,
            first_kex_packet_follows,
        })
    }

    /// Checks a peer's KEXINIT against the server suite.
    ///
    /// Every category of the peer's offer must contain the server's name.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::AlgorithmMismatch`] naming the first category
    /// the peer does not support.
    pub fn check_supported(&self) -> SshResult<NegotiatedAlgorithms> {
        let negotiated = NegotiatedAlgorithms::default();

        require(
            "kex",
            &self.kex_algorithms,
            negotiated.kex.name(),
        )?;
        require(
            "host key",
            &self.server_host_key_algorithms,
            negotiated.host_key.name(),
        )?;
        require(
            "encryption client->server",
            &self.encryption_algorithms_client_to_server,
            negotiated.cipher_client_to_server.name(),
        )?;
        require(
            "encryption server->client",
            &self.encryption_algorithms_server_to_client,
            negotiated.cipher_server_to_client.name(),
        )?;
        require(
            "mac client->server",
            &self.mac_algorithms_client_to_server,
            negotiated.mac_client_to_server.name(),
        )?;
        require(
            "mac server->client",
            &self.mac_algorithms_server_to_client,
            negotiated.mac_server_to_client.name(),
        )?;
        require(
            "compression client->server",
            &self.compression_algorithms_client_to_server,
            COMPRESSION_NONE,
        )?;
        require(
            "compression server->client",
            &self.compression_algorithms_server_to_client,
            COMPRESSION_NONE,
        )?;

        Ok(negotiated)
    }

    /// Returns true when the peer announced a guessed first KEX packet that
    /// was computed for a different algorithm, so it must be discarded
    /// (RFC 4253 Section 7).
    pub fn guess_was_wrong(&self) -> bool {
        if !self.first_kex_packet_follows {
            return false;
        }
        let negotiated = NegotiatedAlgorithms::default();
        self.kex_algorithms.first().map(String::as_str) != Some(negotiated.kex.name())
            || self.server_host_key_algorithms.first().map(String::as_str)
                != Some(negotiated.host_key.name())
    }
}

fn require(category: &str, offered: &[String], ours: &str) -> SshResult<()> {
    if offered.iter().any(|name| name == ours) {
        Ok(())
    } else {
        Err(SshError::AlgorithmMismatch(format!(
            "no common {} algorithm: server supports '{}', client offered {:?}",
            category, ours, offered
        )))
    }
}

/// Algorithms in effect after a successful negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedAlgorithms {
    /// Key exchange method
    pub kex: KexAlgorithm,
    /// Host key signature algorithm
    pub host_key: HostKeyAlgorithm,
    /// Cipher client to server
    pub cipher_client_to_server: CipherAlgorithm,
    /// Cipher server to client
    pub cipher_server_to_client: CipherAlgorithm,
    /// MAC client to server
    pub mac_client_to_server: MacAlgorithm,
    /// MAC server to client
    pub mac_server_to_client: MacAlgorithm,
}

impl Default for NegotiatedAlgorithms {
    fn default() -> Self {
        Self {
            kex: KexAlgorithm::DiffieHellmanGroup14Sha256,
            host_key: HostKeyAlgorithm::RsaSha2_256,
            cipher_client_to_server: CipherAlgorithm::Aes256Ctr,
            cipher_server_to_client: CipherAlgorithm::Aes256Ctr,
            mac_client_to_server: MacAlgorithm::HmacSha256,
            mac_server_to_client: MacAlgorithm::HmacSha256,
        }
    }
}

impl std::fmt::Display for NegotiatedAlgorithms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "kex={} hostkey={} cipher={}/{} mac={}/{}",
            self.kex.name(),
            self.host_key.name(),
            self.cipher_client_to_server.name(),
            self.cipher_server_to_client.name(),
            self.mac_client_to_server.name(),
            self.mac_server_to_client.name()
        )
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// After both sides send and receive SSH_MSG_NEWKEYS all subsequent
/// packets are encrypted and authenticated. Sequence numbers are NOT reset.
///
/// ```text
/// byte    SSH_MSG_NEWKEYS (21)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NewKeys;

impl NewKeys {
    /// Creates a new SSH_MSG_NEWKEYS message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes the NEWKEYS message to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::NewKeys as u8]
    }

    /// Parses a NEWKEYS message from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] if the message is not exactly the
    /// single byte 21.
    pub fn from_bytes(data: &[u8]) -> SshResult<Self> {
        match data {
            [] => Err(SshError::Protocol("NEWKEYS message is empty".to_string())),
            [21] => Ok(Self),
            [21, ..] => Err(SshError::Protocol(format!(
                "NEWKEYS message carries {} unexpected bytes",
                data.len() - 1
            ))),
            [other, ..] => Err(SshError::Protocol(format!(
                "Invalid message type: expected 21 (SSH_MSG_NEWKEYS), got {}",
                other
            ))),
        }
    }
}
