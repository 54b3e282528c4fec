//! Diffie-Hellman key exchange, server side (RFC 4253 Section 8, RFC 8268).
//!
//! This module implements:
//! - diffie-hellman-group14-sha256 over the 2048-bit MODP group (RFC 3526)
//! - SSH_MSG_KEXDH_INIT / SSH_MSG_KEXDH_REPLY
//! - The exchange hash `H` over [`ExchangeContext`]
//!
//! ```text
//! H = SHA256(string V_C || string V_S || string I_C || string I_S ||
//!            string K_S || mpint e || mpint f || mpint K)
//! ```
//!
//! # Security
//!
//! - Private exponent drawn uniformly from [2, p-2] with the thread RNG
//! - Peer value checked: 1 < e < p-1
//! - Private exponent and shared secret are zeroized on drop
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::kex_dh::DhGroup14Exchange;
//!
//! let client = DhGroup14Exchange::new();
//! let server = DhGroup14Exchange::new();
//!
//! let k_client = client.compute_shared_secret(server.public_value()).unwrap();
//! let k_server = server.compute_shared_secret(client.public_value()).unwrap();
//! assert_eq!(k_client, k_server);
//! ```

use crate::ssh::crypto::sha256::{Sha256, DIGEST_LEN};
use crate::ssh::message::MessageType;
use crate::ssh::wire::{SshReader, SshWriter};
use num_bigint::{BigUint, RandBigInt};
use once_cell::sync::Lazy;
use rkvm_platform::{SshError, SshResult};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Diffie-Hellman Group 14 parameters (RFC 3526 Section 3).
pub mod dh_group14 {
    use super::*;

    /// Group 14 prime, big-endian.
    pub const PRIME_BYTES: [u8; 256] = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2,
        0x21, 0x68, 0xc2, 0x34, 0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1,
        0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67, 0xcc, 0x74, 0x02, 0x0b, 0xbe, 0xa6,
        0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e, 0x34, 0x04, 0xdd,
        0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d,
        0xf2, 0x5f, 0x14, 0x37, 0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45,
        0xe4, 0x85, 0xb5, 0x76, 0x62, 0x5e, 0x7e, 0xc6, 0xf4, 0x4c, 0x42, 0xe9,
        0xa6, 0x37, 0xed, 0x6b, 0x0b, 0xff, 0x5c, 0xb6, 0xf4, 0x06, 0xb7, 0xed,
        0xee, 0x38, 0x6b, 0xfb, 0x5a, 0x89, 0x9f, 0xa5, 0xae, 0x9f, 0x24, 0x11,
        0x7c, 0x4b, 0x1f, 0xe6, 0x49, 0x28, 0x66, 0x51, 0xec, 0xe4, 0x5b, 0x3d,
        0xc2, 0x00, 0x7c, 0xb8, 0xa1, 0x63, 0xbf, 0x05, 0x98, 0xda, 0x48, 0x36,
        0x1c, 0x55, 0xd3, 0x9a, 0x69, 0x16, 0x3f, 0xa8, 0xfd, 0x24, 0xcf, 0x5f,
        0x83, 0x65, 0x5d, 0x23, 0xdc, 0xa3, 0xad, 0x96, 0x1c, 0x62, 0xf3, 0x56,
        0x20, 0x85, 0x52, 0xbb, 0x9e, 0xd5, 0x29, 0x07, 0x70, 0x96, 0x96, 0x6d,
        0x67, 0x0c, 0x35, 0x4e, 0x4a, 0xbc, 0x98, 0x04, 0xf1, 0x74, 0x6c, 0x08,
        0xca, 0x18, 0x21, 0x7c, 0x32, 0x90, 0x5e, 0x46, 0x2e, 0x36, 0xce, 0x3b,
        0xe3, 0x9e, 0x77, 0x2c, 0x18, 0x0e, 0x86, 0x03, 0x9b, 0x27, 0x83, 0xa2,
        0xec, 0x07, 0xa2, 0x8f, 0xb5, 0xc5, 0x5d, 0xf0, 0x6f, 0x4c, 0x52, 0xc9,
        0xde, 0x2b, 0xcb, 0xf6, 0x95, 0x58, 0x17, 0x18, 0x39, 0x95, 0x49, 0x7c,
        0xea, 0x95, 0x6a, 0xe5, 0x15, 0xd2, 0x26, 0x18, 0x98, 0xfa, 0x05, 0x10,
        0x15, 0x72, 0x8e, 0x5a, 0x8a, 0xac, 0xaa, 0x68, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff,
    ];

    /// DH Group 14 prime (2048-bit)
    pub static P: Lazy<BigUint> = Lazy::new(|| BigUint::from_bytes_be(&PRIME_BYTES));

    /// DH Group 14 generator
    pub static G: Lazy<BigUint> = Lazy::new(|| BigUint::from(2u32));

    /// p - 1, the exclusive upper bound for valid public values.
    pub static P_MINUS_ONE: Lazy<BigUint> = Lazy::new(|| &*P - 1u32);
}

/// Shared secret `K`, held in its mpint encoding.
///
/// Both the exchange hash and key derivation consume `K` as an mpint, so
/// the integer form is never kept.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    mpint: Vec<u8>,
}

impl SharedSecret {
    /// Encodes `k` as an mpint string (length prefix included).
    pub fn from_biguint(k: &BigUint) -> Self {
        let mut writer = SshWriter::new();
        writer.put_mpint_unsigned(k);
        Self {
            mpint: writer.into_vec(),
        }
    }

    /// Returns the wire encoding `uint32 len || bytes`.
    pub fn as_mpint(&self) -> &[u8] {
        &self.mpint
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// Diffie-Hellman Group 14 key exchange.
///
/// Holds one ephemeral key pair. The same type serves the peer role in
/// tests since the math is symmetric.
pub struct DhGroup14Exchange {
    /// Private exponent, big-endian
    private_key: Vec<u8>,
    /// Public value g^x mod p
    public_value: BigUint,
}

impl DhGroup14Exchange {
    /// Generates a fresh key pair with x uniform in [2, p-2].
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let x = rng.gen_biguint_range(&BigUint::from(2u32), &dh_group14::P_MINUS_ONE);
        let public_value = dh_group14::G.modpow(&x, &dh_group14::P);

        Self {
            private_key: x.to_bytes_be(),
            public_value,
        }
    }

    /// Returns the public value (`f` for the server, `e` for a client).
    pub fn public_value(&self) -> &BigUint {
        &self.public_value
    }

    /// Computes `K = peer^x mod p`.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] unless `1 < peer < p-1`.
    pub fn compute_shared_secret(&self, peer_public: &BigUint) -> SshResult<SharedSecret> {
        validate_public_value(peer_public)?;

        let mut x_bytes = self.private_key.clone();
        let x = BigUint::from_bytes_be(&x_bytes);
        x_bytes.zeroize();

        let k = peer_public.modpow(&x, &dh_group14::P);
        Ok(SharedSecret::from_biguint(&k))
    }
}

impl Default for DhGroup14Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DhGroup14Exchange {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// Checks `1 < value < p-1` (RFC 4253 Section 8).
pub fn validate_public_value(value: &BigUint) -> SshResult<()> {
    if *value <= BigUint::from(1u32) || *value >= *dh_group14::P_MINUS_ONE {
        return Err(SshError::Protocol(
            "Invalid DH public value: out of range".to_string(),
        ));
    }
    Ok(())
}

/// SSH_MSG_KEXDH_INIT.
///
/// ```text
/// byte      SSH_MSG_KEXDH_INIT (30)
/// mpint     e
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexdhInit {
    /// Client public value
    pub e: BigUint,
}

impl KexdhInit {
    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = SshWriter::message(MessageType::KexdhInit as u8);
        writer.put_mpint_unsigned(&self.e);
        writer.into_vec()
    }

    /// Parses the message; `e` must not be negative.
    pub fn from_bytes(data: &[u8]) -> SshResult<Self> {
        let mut reader = SshReader::new(data);
        expect_message(&mut reader, MessageType::KexdhInit)?;
        let e = reader.read_mpint_unsigned()?;
        reader.finish()?;
        Ok(Self { e })
    }
}

/// SSH_MSG_KEXDH_REPLY.
///
/// ```text
/// byte      SSH_MSG_KEXDH_REPLY (31)
/// string    server public host key (K_S)
/// mpint     f
/// string    signature of H
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexdhReply {
    /// Host key blob
    pub host_key: Vec<u8>,
    /// Server public value
    pub f: BigUint,
    /// Wrapped signature over H
    pub signature: Vec<u8>,
}

impl KexdhReply {
    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = SshWriter::message(MessageType::KexdhReply as u8);
        writer
            .put_string(&self.host_key)
            .put_mpint_unsigned(&self.f)
            .put_string(&self.signature);
        writer.into_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> SshResult<Self> {
        let mut reader = SshReader::new(data);
        expect_message(&mut reader, MessageType::KexdhReply)?;
        let host_key = reader.read_string()?.to_vec();
        let f = reader.read_mpint_unsigned()?;
        let signature = reader.read_string()?.to_vec();
        reader.finish()?;
        Ok(Self {
            host_key,
            f,
            signature,
        })
    }
}

fn expect_message(reader: &mut SshReader<'_>, expected: MessageType) -> SshResult<()> {
    let msg = reader.read_u8()?;
    if msg != expected as u8 {
        return Err(SshError::Protocol(format!(
            "Invalid message type: expected {}, got {}",
            expected, msg
        )));
    }
    Ok(())
}

/// Inputs to the exchange hash, each settable exactly once.
#[derive(Default)]
pub struct ExchangeContext {
    client_version: Option<String>,
    server_version: Option<String>,
    client_kexinit: Option<Vec<u8>>,
    server_kexinit: Option<Vec<u8>>,
    host_key: Option<Vec<u8>>,
    e: Option<BigUint>,
    f: Option<BigUint>,
    k: Option<SharedSecret>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &str) -> SshResult<()> {
    if slot.is_some() {
        return Err(SshError::Protocol(format!(
            "Exchange hash field {} set twice",
            field
        )));
    }
    *slot = Some(value);
    Ok(())
}

fn require<'a, T>(slot: &'a Option<T>, field: &str) -> SshResult<&'a T> {
    slot.as_ref().ok_or_else(|| {
        SshError::Protocol(format!("Exchange hash field {} is not set", field))
    })
}

impl ExchangeContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets V_C, the client identification line without CR LF.
    pub fn set_client_version(&mut self, v: &str) -> SshResult<()> {
        set_once(&mut self.client_version, v.to_string(), "V_C")
    }

    /// Sets V_S, the server identification line without CR LF.
    pub fn set_server_version(&mut self, v: &str) -> SshResult<()> {
        set_once(&mut self.server_version, v.to_string(), "V_S")
    }

    /// Sets I_C, the client's raw KEXINIT payload.
    pub fn set_client_kexinit(&mut self, payload: &[u8]) -> SshResult<()> {
        set_once(&mut self.client_kexinit, payload.to_vec(), "I_C")
    }

    /// Sets I_S, the server's raw KEXINIT payload.
    pub fn set_server_kexinit(&mut self, payload: &[u8]) -> SshResult<()> {
        set_once(&mut self.server_kexinit, payload.to_vec(), "I_S")
    }

    /// Sets K_S, the host key blob.
    pub fn set_host_key(&mut self, blob: &[u8]) -> SshResult<()> {
        set_once(&mut self.host_key, blob.to_vec(), "K_S")
    }

    /// Sets the client public value.
    pub fn set_e(&mut self, e: &BigUint) -> SshResult<()> {
        set_once(&mut self.e, e.clone(), "e")
    }

    /// Sets the server public value.
    pub fn set_f(&mut self, f: &BigUint) -> SshResult<()> {
        set_once(&mut self.f, f.clone(), "f")
    }

    /// Sets the shared secret.
    pub fn set_shared_secret(&mut self, k: SharedSecret) -> SshResult<()> {
        set_once(&mut self.k, k, "K")
    }

    /// Returns true once all eight fields are present.
    pub fn is_complete(&self) -> bool {
        self.client_version.is_some()
            && self.server_version.is_some()
            && self.client_kexinit.is_some()
            && self.server_kexinit.is_some()
            && self.host_key.is_some()
            && self.e.is_some()
            && self.f.is_some()
            && self.k.is_some()
    }

    /// Computes H.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] naming the first missing field.
    pub fn exchange_hash(&self) -> SshResult<[u8; DIGEST_LEN]> {
        let mut data = SshWriter::new();
        data.put_string(require(&self.client_version, "V_C")?.as_bytes())
            .put_string(require(&self.server_version, "V_S")?.as_bytes())
            .put_string(require(&self.client_kexinit, "I_C")?)
            .put_string(require(&self.server_kexinit, "I_S")?)
            .put_string(require(&self.host_key, "K_S")?)
            .put_mpint_unsigned(require(&self.e, "e")?)
            .put_mpint_unsigned(require(&self.f, "f")?)
            .put_raw(require(&self.k, "K")?.as_mpint());

        let mut hasher = Sha256::new();
        hasher.update(data.as_slice());
        Ok(hasher.finalize())
    }
}

impl std::fmt::Debug for ExchangeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeContext")
            .field("client_version", &self.client_version)
            .field("server_version", &self.server_version)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::crypto::sha256::sha256;

    #[test]
    fn test_group14_prime() {
        let expected = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
             29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
             EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
             E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
             C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
             83655D23DCA3AD961C62F356208552BB9ED529077096966D\
             670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
             E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9\
             DE2BCBF6955817183995497CEA956AE515D2261898FA0510\
             15728E5A8AACAA68FFFFFFFFFFFFFFFF";
        assert_eq!(hex::encode_upper(dh_group14::PRIME_BYTES), expected);
        assert_eq!(dh_group14::P.bits(), 2048);
    }

    #[test]
    fn test_dh_group14_key_exchange() {
        let client = DhGroup14Exchange::new();
        let server = DhGroup14Exchange::new();

        let client_secret = client.compute_shared_secret(server.public_value()).unwrap();
        let server_secret = server.compute_shared_secret(client.public_value()).unwrap();

        assert_eq!(client_secret, server_secret);
        assert!(client_secret.as_mpint().len() > 4);
    }

    #[test]
    fn test_public_value_in_range() {
        for _ in 0..4 {
            let exchange = DhGroup14Exchange::new();
            assert!(validate_public_value(exchange.public_value()).is_ok());
        }
    }

    #[test]
    fn test_dh_group14_invalid_peer_values() {
        let exchange = DhGroup14Exchange::new();
        let p = dh_group14::P.clone();
        for bad in [
            BigUint::from(0u32),
            BigUint::from(1u32),
            &p - 1u32,
            p.clone(),
            &p + 5u32,
        ] {
            assert!(matches!(
                exchange.compute_shared_secret(&bad),
                Err(SshError::Protocol(_))
            ));
        }
        assert!(exchange.compute_shared_secret(&BigUint::from(2u32)).is_ok());
    }

    #[test]
    fn test_shared_secret_mpint_encoding() {
        let k = SharedSecret::from_biguint(&BigUint::from(0x80u32));
        assert_eq!(k.as_mpint(), &[0, 0, 0, 2, 0x00, 0x80]);
        assert_eq!(format!("{:?}", k), "SharedSecret([REDACTED])");
    }

    #[test]
    fn test_kexdh_messages() {
        let init = KexdhInit {
            e: BigUint::from(0xabcdu32),
        };
        let bytes = init.to_bytes();
        assert_eq!(bytes, [30, 0, 0, 0, 3, 0, 0xab, 0xcd]);
        assert_eq!(KexdhInit::from_bytes(&bytes).unwrap(), init);

        let reply = KexdhReply {
            host_key: b"blob".to_vec(),
            f: BigUint::from(5u32),
            signature: b"sig".to_vec(),
        };
        assert_eq!(KexdhReply::from_bytes(&reply.to_bytes()).unwrap(), reply);
    }

    #[test]
    fn test_kexdh_init_rejects_wrong_type_and_negative() {
        assert!(KexdhInit::from_bytes(&[31, 0, 0, 0, 1, 5]).is_err());
        // mpint 0xff is -1
        assert!(KexdhInit::from_bytes(&[30, 0, 0, 0, 1, 0xff]).is_err());
        assert!(KexdhInit::from_bytes(&[30, 0, 0, 0, 1, 5, 0]).is_err());
    }

    fn filled_context() -> ExchangeContext {
        let mut ctx = ExchangeContext::new();
        ctx.set_client_version("SSH-2.0-client").unwrap();
        ctx.set_server_version("SSH-2.0-server").unwrap();
        ctx.set_client_kexinit(&[20, 1]).unwrap();
        ctx.set_server_kexinit(&[20, 2]).unwrap();
        ctx.set_host_key(b"K_S").unwrap();
        ctx.set_e(&BigUint::from(2u32)).unwrap();
        ctx.set_f(&BigUint::from(0x80u32)).unwrap();
        ctx.set_shared_secret(SharedSecret::from_biguint(&BigUint::from(7u32)))
            .unwrap();
        ctx
    }

    #[test]
    fn test_exchange_hash_layout() {
        let ctx = filled_context();
        assert!(ctx.is_complete());

        let mut expected = Vec::new();
        expected.extend_from_slice(b"\x00\x00\x00\x0eSSH-2.0-client");
        expected.extend_from_slice(b"\x00\x00\x00\x0eSSH-2.0-server");
        expected.extend_from_slice(&[0, 0, 0, 2, 20, 1]);
        expected.extend_from_slice(&[0, 0, 0, 2, 20, 2]);
        expected.extend_from_slice(b"\x00\x00\x00\x03K_S");
        expected.extend_from_slice(&[0, 0, 0, 1, 2]);
        expected.extend_from_slice(&[0, 0, 0, 2, 0, 0x80]);
        expected.extend_from_slice(&[0, 0, 0, 1, 7]);

        assert_eq!(ctx.exchange_hash().unwrap(), sha256(&expected));
    }

    #[test]
    fn test_exchange_hash_requires_all_fields() {
        let mut ctx = ExchangeContext::new();
        ctx.set_client_version("SSH-2.0-client").unwrap();
        assert!(!ctx.is_complete());
        match ctx.exchange_hash() {
            Err(SshError::Protocol(msg)) => assert!(msg.contains("V_S")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_exchange_context_write_once() {
        let mut ctx = filled_context();
        assert!(ctx.set_e(&BigUint::from(3u32)).is_err());
        assert!(ctx.set_client_version("SSH-2.0-other").is_err());
    }
}
