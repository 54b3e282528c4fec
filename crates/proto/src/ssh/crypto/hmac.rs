//! HMAC-SHA256 (RFC 2104) and the SSH packet MAC (RFC 4253 Section 6.4).
//!
//! ```text
//! mac = HMAC(key, uint32 sequence_number || unencrypted_packet)
//! ```

use super::sha256::{sha256, Sha256, BLOCK_LEN, DIGEST_LEN};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5c;

/// HMAC-SHA256 keyed with one direction's integrity key.
///
/// The inner and outer padded keys are precomputed once per key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HmacSha256 {
    ipad_key: [u8; BLOCK_LEN],
    opad_key: [u8; BLOCK_LEN],
}

impl HmacSha256 {
    /// Tag length in bytes.
    pub const TAG_LEN: usize = DIGEST_LEN;

    /// Creates a MAC from key bytes of any length.
    ///
    /// Keys longer than the SHA-256 block are hashed first; shorter keys are
    /// zero-padded to the block length.
    pub fn new(key: &[u8]) -> Self {
        let mut block = [0u8; BLOCK_LEN];
        if key.len() > BLOCK_LEN {
            let mut digest = sha256(key);
            block[..DIGEST_LEN].copy_from_slice(&digest);
            digest.zeroize();
        } else {
            block[..key.len()].copy_from_slice(key);
        }

        let mut ipad_key = [0u8; BLOCK_LEN];
        let mut opad_key = [0u8; BLOCK_LEN];
        for i in 0..BLOCK_LEN {
            ipad_key[i] = block[i] ^ IPAD;
            opad_key[i] = block[i] ^ OPAD;
        }
        block.zeroize();

        Self { ipad_key, opad_key }
    }

    /// Computes the tag over the concatenation of `parts`.
    pub fn compute_parts(&self, parts: &[&[u8]]) -> [u8; DIGEST_LEN] {
        let mut inner = Sha256::new();
        inner.update(&self.ipad_key);
        for part in parts {
            inner.update(part);
        }
        let inner_digest = inner.finalize();

        let mut outer = Sha256::new();
        outer.update(&self.opad_key);
        outer.update(&inner_digest);
        outer.finalize()
    }

    /// Computes the tag over `data`.
    pub fn compute(&self, data: &[u8]) -> [u8; DIGEST_LEN] {
        self.compute_parts(&[data])
    }

    /// Computes the SSH packet MAC for `packet` sent with `sequence`.
    ///
    /// `packet` is the plaintext framed packet (length field included).
    pub fn packet_tag(&self, sequence: u32, packet: &[u8]) -> [u8; DIGEST_LEN] {
        self.compute_parts(&[&sequence.to_be_bytes(), packet])
    }

    /// Verifies a packet MAC in constant time over all tag bytes.
    ///
    /// A tag of the wrong length never verifies.
    pub fn verify_packet(&self, sequence: u32, packet: &[u8], tag: &[u8]) -> bool {
        let expected = self.packet_tag(sequence, packet);
        if tag.len() != expected.len() {
            return false;
        }
        expected[..].ct_eq(tag).into()
    }
}

impl std::fmt::Debug for HmacSha256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha256")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// One-shot HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; DIGEST_LEN] {
    HmacSha256::new(key).compute(data)
}
