//! AES-256 block cipher (FIPS 197), forward direction only.
//!
//! CTR mode only ever encrypts counter blocks, so the inverse cipher is not
//! implemented.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Key size in bytes.
pub const KEY_SIZE: usize = 32;

const ROUNDS: usize = 14;
const KEY_WORDS: usize = 8;
const SCHEDULE_WORDS: usize = 4 * (ROUNDS + 1);

const RCON: [u8; 7] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40];

const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

/// AES-256 with an expanded key schedule.
///
/// Round keys are wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Aes256 {
    round_keys: [[u8; BLOCK_SIZE]; ROUNDS + 1],
}

impl Aes256 {
    /// Expands a 32-byte key into 15 round keys (60 words).
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        let mut w = [0u32; SCHEDULE_WORDS];
        for (i, chunk) in key.chunks_exact(4).enumerate() {
            w[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        for i in KEY_WORDS..SCHEDULE_WORDS {
            let mut temp = w[i - 1];
            if i % KEY_WORDS == 0 {
                temp = sub_word(temp.rotate_left(8)) ^ ((RCON[i / KEY_WORDS - 1] as u32) << 24);
            } else if i % KEY_WORDS == 4 {
                temp = sub_word(temp);
            }
            w[i] = w[i - KEY_WORDS] ^ temp;
        }

        let mut round_keys = [[0u8; BLOCK_SIZE]; ROUNDS + 1];
        for (round, key) in round_keys.iter_mut().enumerate() {
            for col in 0..4 {
                key[4 * col..4 * col + 4].copy_from_slice(&w[4 * round + col].to_be_bytes());
            }
        }
        w.zeroize();

        Self { round_keys }
    }

    /// Encrypts one block in place.
    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        add_round_key(block, &self.round_keys[0]);

        for round in 1..=ROUNDS {
            sub_bytes(block);
            shift_rows(block);
            if round != ROUNDS {
                mix_columns(block);
            }
            add_round_key(block, &self.round_keys[round]);
        }
    }
}

impl std::fmt::Debug for Aes256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes256")
            .field("round_keys", &"<redacted>")
            .finish()
    }
}

fn sub_word(word: u32) -> u32 {
    let b = word.to_be_bytes();
    u32::from_be_bytes([
        SBOX[b[0] as usize],
        SBOX[b[1] as usize],
        SBOX[b[2] as usize],
        SBOX[b[3] as usize],
    ])
}

fn add_round_key(state: &mut [u8; BLOCK_SIZE], key: &[u8; BLOCK_SIZE]) {
    for (s, k) in state.iter_mut().zip(key.iter()) {
        *s ^= k;
    }
}

fn sub_bytes(state: &mut [u8; BLOCK_SIZE]) {
    for b in state.iter_mut() {
        *b = SBOX[*b as usize];
    }
}

// State is column-major: byte (row r, column c) lives at index r + 4c.
fn shift_rows(state: &mut [u8; BLOCK_SIZE]) {
    let old = *state;
    for row in 1..4 {
        for col in 0..4 {
            state[row + 4 * col] = old[row + 4 * ((col + row) % 4)];
        }
    }
}

#[inline]
fn xtime(x: u8) -> u8 {
    (x << 1) ^ if x & 0x80 != 0 { 0x1b } else { 0x00 }
}

fn mix_columns(state: &mut [u8; BLOCK_SIZE]) {
    for col in state.chunks_exact_mut(4) {
        let [a0, a1, a2, a3] = [col[0], col[1], col[2], col[3]];
        let all = a0 ^ a1 ^ a2 ^ a3;
        // 2a ^ 3b ^ c ^ d == a ^ all ^ xtime(a ^ b)
        col[0] = a0 ^ all ^ xtime(a0 ^ a1);
        col[1] = a1 ^ all ^ xtime(a1 ^ a2);
        col[2] = a2 ^ all ^ xtime(a2 ^ a3);
        col[3] = a3 ^ all ^ xtime(a3 ^ a0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(hex_str: &str) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&hex::decode(hex_str).unwrap());
        out
    }

    #[test]
    fn test_aes256_fips197_vector() {
        let key: [u8; KEY_SIZE] = core::array::from_fn(|i| i as u8);
        let cipher = Aes256::new(&key);

        let mut data = block("00112233445566778899aabbccddeeff");
        cipher.encrypt_block(&mut data);
        assert_eq!(hex::encode(data), "8ea2b7ca516745bfeafc49904b496089");
    }

    #[test]
    fn test_key_schedule_last_round_key() {
        // FIPS 197 Appendix A.3: w[56..60]
        let key: [u8; KEY_SIZE] = hex::decode(
            "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4",
        )
        .unwrap()
        .try_into()
        .unwrap();
        let cipher = Aes256::new(&key);
        assert_eq!(
            hex::encode(cipher.round_keys[ROUNDS]),
            "fe4890d1e6188d0b046df344706c631e"
        );
    }

    #[test]
    fn test_mix_columns_known_column() {
        // db 13 53 45 -> 8e 4d a1 bc
        let mut state = [0u8; BLOCK_SIZE];
        state[..4].copy_from_slice(&[0xdb, 0x13, 0x53, 0x45]);
        mix_columns(&mut state);
        assert_eq!(&state[..4], &[0x8e, 0x4d, 0xa1, 0xbc]);
    }

    #[test]
    fn test_aes256_matches_reference_crate() {
        use aes::cipher::{BlockEncrypt, KeyInit};

        let key: [u8; KEY_SIZE] = core::array::from_fn(|i| (i * 7 + 3) as u8);
        let ours = Aes256::new(&key);
        let reference = aes::Aes256::new_from_slice(&key).unwrap();

        let mut input = [0u8; BLOCK_SIZE];
        for round in 0..64u8 {
            for (i, b) in input.iter_mut().enumerate() {
                *b = b.wrapping_mul(31).wrapping_add(round ^ i as u8);
            }

            let mut a = input;
            ours.encrypt_block(&mut a);

            let mut b = aes::Block::clone_from_slice(&input);
            reference.encrypt_block(&mut b);

            assert_eq!(&a[..], b.as_slice());
        }
    }
}
