//! SSH2 transport engine for the RemoteKVM server.
//!
//! This crate brings a TCP connection from the identification line to an
//! encrypted, integrity-protected packet channel:
//!
//! - **SSH** - RFC 4253 transport layer, server role, with a fixed suite
//!   (`diffie-hellman-group14-sha256`, `rsa-sha2-256`, `aes256-ctr`,
//!   `hmac-sha2-256`)
//!
//! The hash, MAC, block cipher and RSA signature code is implemented in
//! this crate; big-integer arithmetic comes from `num-bigint`.
//!
//! # Features
//!
//! - `ssh` (default) - SSH transport support
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::Packet;
//!
//! // Create and serialize an SSH packet
//! let packet = Packet::new(b"SSH message payload".to_vec()).unwrap();
//! let wire_format = packet.to_bytes();
//!
//! // Parse from wire format
//! let parsed = Packet::from_bytes(&wire_format).unwrap();
//! assert_eq!(parsed.payload(), b"SSH message payload");
//! ```
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;
