//! SSH2 transport layer, server side (RFC 4253).
//!
//! # Architecture
//!
//! The implementation is layered:
//!
//! 1. **Primitives** ([`crypto`]) - SHA-256, HMAC-SHA256, AES-256-CTR, RSA signing
//! 2. **Encoding** ([`wire`], [`packet`]) - SSH data types and the binary packet protocol
//! 3. **Key exchange** ([`version`], [`kex`], [`kex_dh`], [`keys`]) - identification lines,
//!    KEXINIT, diffie-hellman-group14-sha256, key derivation
//! 4. **Channel** ([`secure_channel`]) - framing plus aes256-ctr / hmac-sha2-256 protection
//! 5. **Server** ([`server`]) - configuration, listener, handshake driver
//!
//! The algorithm suite is fixed: `diffie-hellman-group14-sha256`, `rsa-sha2-256`,
//! `aes256-ctr`, `hmac-sha2-256`, compression `none`. Rekeying is not supported.
//!
//! # Security Considerations
//!
//! - **Input Validation**: lengths are checked before allocation (max 35000 bytes)
//! - **Constant-Time Operations**: MAC tags are compared with [`subtle`]
//! - **Memory Safety**: key material is zeroized on drop using [`zeroize`]
//! - **No Unsafe Code**: the crate forbids `unsafe`
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::Packet;
//!
//! let packet = Packet::new(b"\x14KEXINIT payload".to_vec()).unwrap();
//! let bytes = packet.to_bytes();
//! assert_eq!(bytes.len() % 16, 0);
//!
//! let parsed = Packet::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.payload(), b"\x14KEXINIT payload");
//! ```
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 8268](https://datatracker.ietf.org/doc/html/rfc8268) - group14-sha256
//! - [RFC 8332](https://datatracker.ietf.org/doc/html/rfc8332) - rsa-sha2-256

pub mod crypto;
pub mod hostkey;
pub mod kex;
pub mod kex_dh;
pub mod keys;
pub mod logging;
pub mod message;
pub mod packet;
pub mod secure_channel;
pub mod server;
pub mod transport;
pub mod version;
pub mod wire;

// Re-export main types
pub use crypto::{CipherAlgorithm, MacAlgorithm};
pub use hostkey::{HostKey, HostKeyAlgorithm, RsaSha2_256HostKey};
pub use kex::{KexAlgorithm, KexInit, NegotiatedAlgorithms, NewKeys};
pub use kex_dh::{DhGroup14Exchange, ExchangeContext, KexdhInit, KexdhReply, SharedSecret};
pub use keys::{derive_key, DirectionKeys, KeyMaterial};
pub use message::{Disconnect, DisconnectReason, MessageType};
pub use packet::{Packet, MAX_PACKET_SIZE};
pub use secure_channel::{PacketReader, PacketWriter, SecureChannel};
pub use server::{SshServer, SshServerConfig, SshSession};
pub use transport::{State, TransportState};
pub use version::Version;
pub use wire::{SshReader, SshWriter};
