//! SSH Host Key Algorithms
//!
//! The server proves its identity by signing the exchange hash with its
//! host key (RFC 4253 Section 8). One algorithm is supported:
//!
//! - `rsa-sha2-256` - RSA PKCS#1 v1.5 signature with SHA-256 (RFC 8332)
//!
//! The public key blob uses the `ssh-rsa` key format (RFC 4253 Section 6.6):
//!
//! ```text
//! string    "ssh-rsa"
//! mpint     e
//! mpint     n
//! ```
//!
//! and signatures are wrapped as:
//!
//! ```text
//! string    "rsa-sha2-256"
//! string    rsa_signature_blob
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use rkvm_proto::ssh::hostkey::{HostKey, RsaSha2_256HostKey};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hostkey = RsaSha2_256HostKey::from_pem_file("host_rsa.pem")?;
//! let blob = hostkey.public_key_bytes();
//! let signature = hostkey.sign(b"exchange hash")?;
//! # Ok(())
//! # }
//! ```

use crate::ssh::crypto::rsa::RsaPrivateKey;
use crate::ssh::wire::SshWriter;
use rkvm_platform::{SshError, SshResult};
use std::path::Path;

/// Host key algorithm identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKeyAlgorithm {
    /// rsa-sha2-256 - RSA signature with SHA-256
    RsaSha2_256,
}

impl HostKeyAlgorithm {
    /// Get the algorithm name as negotiated in KEXINIT
    pub fn name(&self) -> &'static str {
        match self {
            HostKeyAlgorithm::RsaSha2_256 => "rsa-sha2-256",
        }
    }

    /// Get the key format name carried in the public key blob
    pub fn key_format(&self) -> &'static str {
        match self {
            HostKeyAlgorithm::RsaSha2_256 => "ssh-rsa",
        }
    }

    /// Parse algorithm from name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rsa-sha2-256" => Some(HostKeyAlgorithm::RsaSha2_256),
            _ => None,
        }
    }
}

/// Trait for host key operations
///
/// Implementations are immutable after loading and shared read-only
/// between connections.
pub trait HostKey: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> HostKeyAlgorithm;

    /// Get the public key blob (K_S) in SSH wire format
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Sign data and return the signature in SSH wire format
    fn sign(&self, data: &[u8]) -> SshResult<Vec<u8>>;

    /// Get the algorithm name
    fn algorithm_name(&self) -> &'static str {
        self.algorithm().name()
    }
}

/// RSA host key with SHA-256 (rsa-sha2-256)
pub struct RsaSha2_256HostKey {
    key: RsaPrivateKey,
    public_key_blob: Vec<u8>,
}

impl RsaSha2_256HostKey {
    /// Smallest accepted modulus.
    pub const MIN_KEY_BITS: u64 = 1024;

    /// Wraps a parsed private key.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Resource`] if the modulus is shorter than
    /// [`Self::MIN_KEY_BITS`].
    pub fn new(key: RsaPrivateKey) -> SshResult<Self> {
        let bits = key.modulus().bits();
        if bits < Self::MIN_KEY_BITS {
            return Err(SshError::Resource(format!(
                "RSA host key of {} bits is too small (minimum {})",
                bits,
                Self::MIN_KEY_BITS
            )));
        }

        let mut blob = SshWriter::new();
        blob.put_string(HostKeyAlgorithm::RsaSha2_256.key_format().as_bytes())
            .put_mpint_unsigned(key.public_exponent())
            .put_mpint_unsigned(key.modulus());

        Ok(Self {
            key,
            public_key_blob: blob.into_vec(),
        })
    }

    /// Loads a key from PEM text (`BEGIN RSA PRIVATE KEY`).
    pub fn from_pem(pem: &str) -> SshResult<Self> {
        Self::new(RsaPrivateKey::from_pem(pem)?)
    }

    /// Loads a key from a PEM file.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Resource`] if the file cannot be read or parsed.
    pub fn from_pem_file<P: AsRef<Path>>(path: P) -> SshResult<Self> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            SshError::Resource(format!(
                "Cannot read host key '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_pem(&pem)
    }

    /// Returns the underlying private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.key
    }
}

impl HostKey for RsaSha2_256HostKey {
    fn algorithm(&self) -> HostKeyAlgorithm {
        HostKeyAlgorithm::RsaSha2_256
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key_blob.clone()
    }

    fn sign(&self, data: &[u8]) -> SshResult<Vec<u8>> {
        let signature = self.key.sign_pkcs1v15_sha256(data)?;

        let mut bytes = SshWriter::new();
        bytes
            .put_string(self.algorithm_name().as_bytes())
            .put_string(&signature);
        Ok(bytes.into_vec())
    }
}

impl std::fmt::Debug for RsaSha2_256HostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSha2_256HostKey")
            .field("algorithm", &"rsa-sha2-256")
            .field("key_size_bits", &self.key.modulus().bits())
            .finish_non_exhaustive()
    }
}
