//! SSH binary packet protocol (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! byte[m]   mac (appended by the secure channel once keys are active)
//! ```
//!
//! # Constraints
//!
//! - `packet_length`: Does NOT include `mac` or `packet_length` field itself
//! - `padding_length`: Length of padding (minimum 4, maximum 255 bytes)
//! - `packet_length` + 4 is a multiple of the block size (16 for aes256-ctr)
//! - Maximum packet size: 35000 bytes (RFC 4253 Section 6.1)
//!
//! Packets are always padded for a 16-byte block, also before NEWKEYS, so
//! the framing never changes when encryption switches on.
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::Packet;
//!
//! let payload = b"SSH-MSG-KEXINIT payload";
//! let packet = Packet::new(payload.to_vec()).unwrap();
//!
//! let bytes = packet.to_bytes();
//! assert_eq!(bytes.len() % 16, 0);
//!
//! let parsed = Packet::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.payload(), payload);
//! ```

use bytes::{Buf, BufMut, BytesMut};
use rand::RngCore;
use rkvm_platform::{SshError, SshResult};

/// Maximum packet size in bytes (RFC 4253 Section 6.1).
pub const MAX_PACKET_SIZE: usize = 35000;

/// Block size packets are padded to.
pub const BLOCK_SIZE: usize = 16;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: u8 = 4;

/// Maximum padding length in bytes (fits in u8).
pub const MAX_PADDING_LEN: u8 = 255;

/// Length field plus padding_length byte.
pub const HEADER_LEN: usize = 5;

/// SSH binary packet.
///
/// # Invariants
///
/// - Padding length is between 4 and 255 bytes
/// - `4 + packet_length` is a multiple of [`BLOCK_SIZE`] for packets built
///   with [`Packet::new`]
/// - `packet_length` ≤ 35000
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
    padding: Vec<u8>,
}

impl Packet {
    /// Creates a new SSH packet with the given payload.
    ///
    /// Padding is random and sized with the usual formula: the distance to
    /// the next block boundary, plus one block when that is under 4 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] if the framed packet would exceed
    /// [`MAX_PACKET_SIZE`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use rkvm_proto::ssh::Packet;
    ///
    /// let packet = Packet::new(b"Hello, SSH!".to_vec()).unwrap();
    /// assert_eq!(packet.payload(), b"Hello, SSH!");
    /// ```
    pub fn new(payload: Vec<u8>) -> SshResult<Self> {
        let padding_len = padding_for(payload.len());

        let packet_length = 1 + payload.len() + padding_len;
        if packet_length > MAX_PACKET_SIZE {
            return Err(SshError::Protocol(format!(
                "Packet size {} exceeds maximum {}",
                packet_length, MAX_PACKET_SIZE
            )));
        }

        let mut padding = vec![0u8; padding_len];
        rand::thread_rng().fill_bytes(&mut padding);

        Ok(Self { payload, padding })
    }

    /// Returns the payload of this packet.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns the padding of this packet.
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Returns the `packet_length` field value.
    pub fn packet_length(&self) -> usize {
        1 + self.payload.len() + self.padding.len()
    }

    /// Serializes this packet to wire format, without MAC.
    ///
    /// ```text
    /// uint32    packet_length (big-endian)
    /// byte      padding_length
    /// byte[n1]  payload
    /// byte[n2]  random padding
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let packet_length = self.packet_length();
        let mut buf = BytesMut::with_capacity(4 + packet_length);

        buf.put_u32(packet_length as u32);
        buf.put_u8(self.padding.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.padding);

        buf.to_vec()
    }

    /// Parses exactly one framed packet (no MAC).
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] if:
    /// - Data is too short (< 5 bytes for header)
    /// - Packet size exceeds maximum (35000 bytes)
    /// - Padding length is invalid (< 4 or larger than the packet)
    /// - Data length doesn't match declared packet_length
    pub fn from_bytes(data: &[u8]) -> SshResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(SshError::Protocol(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                HEADER_LEN
            )));
        }

        let mut buf = data;
        let packet_length = buf.get_u32() as usize;
        check_packet_length(packet_length)?;

        if buf.len() != packet_length {
            return Err(SshError::Protocol(format!(
                "Packet length mismatch: declared {} bytes, got {} bytes",
                packet_length,
                buf.len()
            )));
        }

        Self::from_body(buf)
    }

    /// Parses the bytes following the length field:
    /// `padding_length || payload || padding`.
    pub fn from_body(body: &[u8]) -> SshResult<Self> {
        let mut buf = body;
        if buf.is_empty() {
            return Err(SshError::Protocol("Packet body is empty".to_string()));
        }
        let padding_length = buf.get_u8() as usize;

        if padding_length < MIN_PADDING_LEN as usize {
            return Err(SshError::Protocol(format!(
                "Padding too short: {} bytes (minimum {})",
                padding_length, MIN_PADDING_LEN
            )));
        }

        if padding_length > buf.len() {
            return Err(SshError::Protocol(format!(
                "Invalid packet: padding length {} exceeds packet body of {} bytes",
                padding_length,
                buf.len()
            )));
        }

        let payload_length = buf.len() - padding_length;
        let payload = buf[..payload_length].to_vec();
        buf.advance(payload_length);
        let padding = buf.to_vec();

        Ok(Self { payload, padding })
    }
}

/// Returns the padding length for a payload of `payload_len` bytes.
pub fn padding_for(payload_len: usize) -> usize {
    let mut padding = BLOCK_SIZE - (payload_len + HEADER_LEN) % BLOCK_SIZE;
    if padding < MIN_PADDING_LEN as usize {
        padding += BLOCK_SIZE;
    }
    padding
}

/// Validates a received `packet_length` before anything is allocated.
///
/// The minimum is padding_length byte plus minimum padding.
pub fn check_packet_length(packet_length: usize) -> SshResult<()> {
    if packet_length > MAX_PACKET_SIZE {
        return Err(SshError::Protocol(format!(
            "Packet too large: {} bytes (maximum {})",
            packet_length, MAX_PACKET_SIZE
        )));
    }
    if packet_length < 1 + MIN_PADDING_LEN as usize {
        return Err(SshError::Protocol(format!(
            "Packet too small: {} bytes",
            packet_length
        )));
    }
    Ok(())
}

/// Validates a `packet_length` received under encryption, which must also
/// be block-aligned.
pub fn check_encrypted_packet_length(packet_length: usize) -> SshResult<()> {
    check_packet_length(packet_length)?;
    if (4 + packet_length) % BLOCK_SIZE != 0 {
        return Err(SshError::Protocol(format!(
            "Packet length {} is not aligned to the {}-byte block size",
            packet_length, BLOCK_SIZE
        )));
    }
    Ok(())
}
