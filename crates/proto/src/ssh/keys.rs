//! Session key derivation (RFC 4253 Section 7.2).
//!
//! ```text
//! Initial IV client to server:     HASH(K || H || "A" || session_id)
//! Initial IV server to client:     HASH(K || H || "B" || session_id)
//! Encryption key client to server: HASH(K || H || "C" || session_id)
//! Encryption key server to client: HASH(K || H || "D" || session_id)
//! Integrity key client to server:  HASH(K || H || "E" || session_id)
//! Integrity key server to client:  HASH(K || H || "F" || session_id)
//! ```
//!
//! K is mpint-encoded. When more bytes are needed than one digest gives,
//! the key is extended with `K_n = HASH(K || H || K_1 || ... || K_{n-1})`.

use crate::ssh::crypto::sha256::{Sha256, DIGEST_LEN};
use crate::ssh::kex::NegotiatedAlgorithms;
use crate::ssh::kex_dh::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Derives one key of `key_length` bytes for `letter` (`b'A'`..=`b'F'`).
///
/// # Example
///
/// ```rust
/// use num_bigint::BigUint;
/// use rkvm_proto::ssh::kex_dh::SharedSecret;
/// use rkvm_proto::ssh::keys::derive_key;
///
/// let k = SharedSecret::from_biguint(&BigUint::from(42u32));
/// let h = [0x01; 32];
/// let key = derive_key(&k, &h, &h, b'C', 32);
/// assert_eq!(key.len(), 32);
/// ```
pub fn derive_key(
    shared_secret: &SharedSecret,
    exchange_hash: &[u8],
    session_id: &[u8],
    letter: u8,
    key_length: usize,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_length + DIGEST_LEN);

    let mut hasher = Sha256::new();
    hasher.update(shared_secret.as_mpint());
    hasher.update(exchange_hash);
    hasher.update(&[letter]);
    hasher.update(session_id);
    key.extend_from_slice(&hasher.finalize());

    while key.len() < key_length {
        let mut hasher = Sha256::new();
        hasher.update(shared_secret.as_mpint());
        hasher.update(exchange_hash);
        hasher.update(&key);
        key.extend_from_slice(&hasher.finalize());
    }

    key.truncate(key_length);
    key
}

/// Key material for one direction.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DirectionKeys {
    /// Initial counter block
    pub iv: Vec<u8>,
    /// Cipher key
    pub enc_key: Vec<u8>,
    /// MAC key
    pub mac_key: Vec<u8>,
}

impl std::fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionKeys")
            .field("iv_len", &self.iv.len())
            .field("enc_key_len", &self.enc_key.len())
            .field("mac_key_len", &self.mac_key.len())
            .finish()
    }
}

/// The six derived values, fixed once the handshake completes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    client_to_server: DirectionKeys,
    server_to_client: DirectionKeys,
}

impl KeyMaterial {
    /// Derives all six keys sized for the negotiated algorithms.
    pub fn derive(
        shared_secret: &SharedSecret,
        exchange_hash: &[u8],
        session_id: &[u8],
        algorithms: &NegotiatedAlgorithms,
    ) -> Self {
        let expand = |letter: u8, len: usize| {
            derive_key(shared_secret, exchange_hash, session_id, letter, len)
        };

        let c2s_cipher = algorithms.cipher_client_to_server;
        let s2c_cipher = algorithms.cipher_server_to_client;

        Self {
            client_to_server: DirectionKeys {
                iv: expand(b'A', c2s_cipher.iv_size()),
                enc_key: expand(b'C', c2s_cipher.key_size()),
                mac_key: expand(b'E', algorithms.mac_client_to_server.key_size()),
            },
            server_to_client: DirectionKeys {
                iv: expand(b'B', s2c_cipher.iv_size()),
                enc_key: expand(b'D', s2c_cipher.key_size()),
                mac_key: expand(b'F', algorithms.mac_server_to_client.key_size()),
            },
        }
    }

    /// Keys protecting client-to-server traffic (server inbound).
    pub fn client_to_server(&self) -> &DirectionKeys {
        &self.client_to_server
    }

    /// Keys protecting server-to-client traffic (server outbound).
    pub fn server_to_client(&self) -> &DirectionKeys {
        &self.server_to_client
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("client_to_server", &self.client_to_server)
            .field("server_to_client", &self.server_to_client)
            .finish()
    }
}
