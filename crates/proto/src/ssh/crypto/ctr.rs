//! AES-256 in counter mode (`aes256-ctr`, RFC 4344).
//!
//! The 128-bit counter is seeded from the derived IV and treated as one
//! big-endian integer. Each keystream block is `AES(counter)`, after which
//! the counter is incremented with carry from the last byte, wrapping to
//! zero after all-ones.
//!
//! The stream position can be captured with [`Aes256Ctr::checkpoint`] and
//! rewound with [`Aes256Ctr::restore`]. The secure channel uses this to
//! decrypt a packet length speculatively before decrypting the full frame.
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::crypto::ctr::Aes256Ctr;
//!
//! let key = [0x11u8; 32];
//! let iv = [0x22u8; 16];
//!
//! let mut data = b"attack at dawn".to_vec();
//! Aes256Ctr::new(&key, &iv).apply_keystream(&mut data);
//! Aes256Ctr::new(&key, &iv).apply_keystream(&mut data);
//! assert_eq!(data, b"attack at dawn");
//! ```

use super::aes::{Aes256, BLOCK_SIZE, KEY_SIZE};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// IV (initial counter) size in bytes.
pub const IV_SIZE: usize = BLOCK_SIZE;

/// Saved position of a CTR stream.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CtrCheckpoint {
    counter: [u8; BLOCK_SIZE],
    keystream: [u8; BLOCK_SIZE],
    used: usize,
}

/// AES-256-CTR keystream generator.
///
/// Encryption and decryption are the same operation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Aes256Ctr {
    cipher: Aes256,
    counter: [u8; BLOCK_SIZE],
    keystream: [u8; BLOCK_SIZE],
    /// Bytes of `keystream` already consumed.
    used: usize,
}

impl Aes256Ctr {
    /// Creates a stream positioned at counter value `iv`.
    pub fn new(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE]) -> Self {
        Self {
            cipher: Aes256::new(key),
            counter: *iv,
            keystream: [0u8; BLOCK_SIZE],
            used: BLOCK_SIZE,
        }
    }

    /// XORs the next `data.len()` keystream bytes into `data`.
    ///
    /// Partial blocks are allowed; the unused tail of a keystream block is
    /// kept for the next call.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        let mut rest = data;

        while !rest.is_empty() {
            if self.used == BLOCK_SIZE {
                self.refill();
            }
            let take = (BLOCK_SIZE - self.used).min(rest.len());
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(take);
            for (byte, ks) in head.iter_mut().zip(&self.keystream[self.used..]) {
                *byte ^= ks;
            }
            self.used += take;
            rest = tail;
        }
    }

    /// Captures the current stream position.
    pub fn checkpoint(&self) -> CtrCheckpoint {
        CtrCheckpoint {
            counter: self.counter,
            keystream: self.keystream,
            used: self.used,
        }
    }

    /// Rewinds the stream to a previously captured position.
    pub fn restore(&mut self, checkpoint: &CtrCheckpoint) {
        self.counter = checkpoint.counter;
        self.keystream = checkpoint.keystream;
        self.used = checkpoint.used;
    }

    /// Decrypts `data` without advancing the stream.
    pub fn peek(&mut self, data: &mut [u8]) {
        let checkpoint = self.checkpoint();
        self.apply_keystream(data);
        self.restore(&checkpoint);
    }

    /// Returns the counter value for the next keystream block.
    pub fn counter(&self) -> &[u8; BLOCK_SIZE] {
        &self.counter
    }

    fn refill(&mut self) {
        self.keystream = self.counter;
        self.cipher.encrypt_block(&mut self.keystream);
        increment_counter(&mut self.counter);
        self.used = 0;
    }
}

impl std::fmt::Debug for Aes256Ctr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes256Ctr")
            .field("cipher", &self.cipher)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

fn increment_counter(counter: &mut [u8; BLOCK_SIZE]) {
    for byte in counter.iter_mut().rev() {
        let (next, overflow) = byte.overflowing_add(1);
        *byte = next;
        if !overflow {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, RngCore};

    fn nist_key() -> [u8; KEY_SIZE] {
        hex::decode("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
            .unwrap()
            .try_into()
            .unwrap()
    }

    fn nist_iv() -> [u8; IV_SIZE] {
        hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff")
            .unwrap()
            .try_into()
            .unwrap()
    }

    #[test]
    fn test_ctr_sp800_38a_vector() {
        let mut data = hex::decode(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51\
             30c81c46a35ce411e5fbc1191a0a52eff69f2445df4f9b17ad2b417be66c3710",
        )
        .unwrap();

        Aes256Ctr::new(&nist_key(), &nist_iv()).apply_keystream(&mut data);

        assert_eq!(
            hex::encode(&data),
            "601ec313775789a5b7a7f504bbf3d228f443e3ca4d62b59aca84e990cacaf5c5\
             2b0930daa23de94ce87017ba2d84988ddfc9c58db67aada613c2dd08457941a6"
        );
    }

    #[test]
    fn test_ctr_round_trip_random_lengths() {
        let mut rng = rand::thread_rng();
        let mut key = [0u8; KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];

        for _ in 0..50 {
            rng.fill_bytes(&mut key);
            rng.fill_bytes(&mut iv);
            let len = rng.gen_range(0..1000);
            let mut original = vec![0u8; len];
            rng.fill_bytes(&mut original);

            let mut data = original.clone();
            Aes256Ctr::new(&key, &iv).apply_keystream(&mut data);
            if len > 16 {
                assert_ne!(data, original);
            }
            Aes256Ctr::new(&key, &iv).apply_keystream(&mut data);
            assert_eq!(data, original);
        }
    }

    #[test]
    fn test_ctr_chunked_matches_single_call() {
        let key = [0x5au8; KEY_SIZE];
        let iv = [0xa5u8; IV_SIZE];
        let original: Vec<u8> = (0..300u32).map(|i| i as u8).collect();

        let mut whole = original.clone();
        Aes256Ctr::new(&key, &iv).apply_keystream(&mut whole);

        let mut pieces = original.clone();
        let mut ctr = Aes256Ctr::new(&key, &iv);
        let mut offset = 0;
        for size in [1usize, 3, 4, 12, 16, 17, 31, 100] {
            ctr.apply_keystream(&mut pieces[offset..offset + size]);
            offset += size;
        }
        ctr.apply_keystream(&mut pieces[offset..]);

        assert_eq!(pieces, whole);
    }

    #[test]
    fn test_checkpoint_restore_reproduces_keystream() {
        let mut uninterrupted = vec![0u8; 64];
        Aes256Ctr::new(&nist_key(), &nist_iv()).apply_keystream(&mut uninterrupted);

        let mut ctr = Aes256Ctr::new(&nist_key(), &nist_iv());
        let checkpoint = ctr.checkpoint();
        let mut first = vec![0u8; 4];
        ctr.apply_keystream(&mut first);
        ctr.restore(&checkpoint);

        let mut replay = vec![0u8; 64];
        ctr.apply_keystream(&mut replay);

        assert_eq!(&first[..], &uninterrupted[..4]);
        assert_eq!(replay, uninterrupted);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut ctr = Aes256Ctr::new(&nist_key(), &nist_iv());
        let mut skip = [0u8; 7];
        ctr.apply_keystream(&mut skip);

        let mut peeked = [0u8; 4];
        ctr.peek(&mut peeked);
        let mut real = [0u8; 4];
        ctr.apply_keystream(&mut real);

        assert_eq!(peeked, real);
    }

    #[test]
    fn test_counter_wraps_to_zero() {
        let key = nist_key();
        let mut ctr = Aes256Ctr::new(&key, &[0xff; IV_SIZE]);
        let mut keystream = [0u8; 32];
        ctr.apply_keystream(&mut keystream);

        let mut zero_block = [0u8; BLOCK_SIZE];
        Aes256::new(&key).encrypt_block(&mut zero_block);

        assert_eq!(&keystream[16..], &zero_block[..]);
        assert_eq!(ctr.counter(), &{
            let mut c = [0u8; BLOCK_SIZE];
            c[15] = 1;
            c
        });
    }

    #[test]
    fn test_increment_counter_carry() {
        let mut counter = [0u8; BLOCK_SIZE];
        counter[14] = 0x01;
        counter[15] = 0xff;
        increment_counter(&mut counter);
        assert_eq!(counter[14], 0x02);
        assert_eq!(counter[15], 0x00);
    }
}
