//! Cryptographic primitives for the SSH transport.
//!
//! Everything here is implemented from the published standards; only
//! big-integer arithmetic comes from `num-bigint`.
//!
//! - [`sha256`] - SHA-256 (FIPS 180-4)
//! - [`hmac`] - HMAC-SHA256 (RFC 2104) and the SSH packet MAC
//! - [`aes`] - AES-256 forward cipher (FIPS 197)
//! - [`ctr`] - AES-256-CTR keystream with checkpoint/restore
//! - [`asn1`] - DER reader for PKCS#1 keys
//! - [`rsa`] - RSA PKCS#1 v1.5 SHA-256 signing
//!
//! The algorithm identifiers negotiated in KEXINIT are modelled by
//! [`CipherAlgorithm`] and [`MacAlgorithm`]; this implementation supports
//! exactly one of each.

pub mod aes;
pub mod asn1;
pub mod ctr;
pub mod hmac;
pub mod rsa;
pub mod sha256;

/// Cipher algorithm for SSH encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    /// AES-256 in counter mode (RFC 4344)
    Aes256Ctr,
}

impl CipherAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Ctr => "aes256-ctr",
        }
    }

    /// Returns the key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            CipherAlgorithm::Aes256Ctr => aes::KEY_SIZE,
        }
    }

    /// Returns the IV size in bytes.
    pub fn iv_size(&self) -> usize {
        match self {
            CipherAlgorithm::Aes256Ctr => ctr::IV_SIZE,
        }
    }

    /// Returns the cipher block size, which packets are padded to.
    pub fn block_size(&self) -> usize {
        match self {
            CipherAlgorithm::Aes256Ctr => aes::BLOCK_SIZE,
        }
    }

    /// Parses an algorithm name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "aes256-ctr" => Some(CipherAlgorithm::Aes256Ctr),
            _ => None,
        }
    }
}

/// MAC algorithm for SSH integrity protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgorithm {
    /// HMAC-SHA256 (RFC 6668)
    HmacSha256,
}

impl MacAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            MacAlgorithm::HmacSha256 => "hmac-sha2-256",
        }
    }

    /// Returns the key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha256 => 32,
        }
    }

    /// Returns the MAC (tag) size in bytes.
    pub fn mac_size(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha256 => hmac::HmacSha256::TAG_LEN,
        }
    }

    /// Parses an algorithm name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hmac-sha2-256" => Some(MacAlgorithm::HmacSha256),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_algorithm_properties() {
        let cipher = CipherAlgorithm::Aes256Ctr;
        assert_eq!(cipher.name(), "aes256-ctr");
        assert_eq!(cipher.key_size(), 32);
        assert_eq!(cipher.iv_size(), 16);
        assert_eq!(cipher.block_size(), 16);
    }

    #[test]
    fn test_cipher_from_name() {
        assert_eq!(
            CipherAlgorithm::from_name("aes256-ctr"),
            Some(CipherAlgorithm::Aes256Ctr)
        );
        assert!(CipherAlgorithm::from_name("aes128-ctr").is_none());
        assert!(CipherAlgorithm::from_name("chacha20-poly1305@openssh.com").is_none());
    }

    #[test]
    fn test_mac_algorithm_properties() {
        let mac = MacAlgorithm::HmacSha256;
        assert_eq!(mac.name(), "hmac-sha2-256");
        assert_eq!(mac.key_size(), 32);
        assert_eq!(mac.mac_size(), 32);
        assert_eq!(MacAlgorithm::from_name("hmac-sha2-256"), Some(mac));
        assert!(MacAlgorithm::from_name("hmac-sha1").is_none());
    }
}
