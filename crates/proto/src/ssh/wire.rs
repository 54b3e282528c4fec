//! SSH data type representations (RFC 4251 Section 5).
//!
//! [`SshWriter`] appends wire-encoded values to a growable buffer and
//! [`SshReader`] decodes them from a borrowed slice. Every read checks the
//! declared length against the bytes actually available before slicing.
//!
//! # Encodings
//!
//! ```text
//! uint32     4 bytes, big-endian
//! string     uint32 length || bytes
//! name-list  string of comma-separated ASCII names
//! mpint      string holding a minimal two's-complement big-endian integer;
//!            zero is the empty string
//! ```
//!
//! # Example
//!
//! ```rust
//! use num_bigint::BigInt;
//! use rkvm_proto::ssh::wire::{SshReader, SshWriter};
//!
//! let mut writer = SshWriter::new();
//! writer.put_string(b"ssh-rsa");
//! writer.put_mpint(&BigInt::from(0x80));
//! let bytes = writer.into_vec();
//!
//! let mut reader = SshReader::new(&bytes);
//! assert_eq!(reader.read_string().unwrap(), b"ssh-rsa");
//! assert_eq!(reader.read_mpint().unwrap(), BigInt::from(0x80));
//! assert!(reader.is_empty());
//! ```

use bytes::{BufMut, BytesMut};
use num_bigint::{BigInt, BigUint, Sign};
use rkvm_platform::{SshError, SshResult};

/// Append-only encoder for SSH wire types.
#[derive(Debug, Default, Clone)]
pub struct SshWriter {
    buf: BytesMut,
}

impl SshWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Creates a writer whose first byte is the message number `msg`.
    pub fn message(msg: u8) -> Self {
        let mut writer = Self::new();
        writer.put_u8(msg);
        writer
    }

    /// Appends one byte.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Appends a boolean (0 or 1).
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    /// Appends a big-endian uint32.
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    /// Appends bytes with no length prefix.
    pub fn put_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    /// Appends a length-prefixed string.
    pub fn put_string(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_u32(data.len() as u32);
        self.buf.put_slice(data);
        self
    }

    /// Appends a name-list.
    pub fn put_name_list<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        let joined = names
            .iter()
            .map(|n| n.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        self.put_string(joined.as_bytes())
    }

    /// Appends a signed mpint.
    pub fn put_mpint(&mut self, value: &BigInt) -> &mut Self {
        let bytes = mpint_bytes(value);
        self.put_string(&bytes)
    }

    /// Appends a non-negative mpint.
    pub fn put_mpint_unsigned(&mut self, value: &BigUint) -> &mut Self {
        self.put_mpint(&BigInt::from_biguint(Sign::Plus, value.clone()))
    }

    /// Returns the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Returns the mpint body (without length prefix) for `value`.
///
/// Zero encodes as no bytes. A non-negative value whose top bit would read
/// as a sign bit gets a leading 0x00.
pub fn mpint_bytes(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        return Vec::new();
    }
    value.to_signed_bytes_be()
}

/// Bounds-checked decoder for SSH wire types.
#[derive(Debug, Clone)]
pub struct SshReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SshReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads exactly `len` bytes.
    pub fn read_raw(&mut self, len: usize) -> SshResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(SshError::Protocol(format!(
                "Truncated field: need {} bytes at offset {}, {} available",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> SshResult<u8> {
        Ok(self.read_raw(1)?[0])
    }

    /// Reads a boolean; any nonzero byte is true.
    pub fn read_bool(&mut self) -> SshResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a big-endian uint32.
    pub fn read_u32(&mut self) -> SshResult<u32> {
        let b = self.read_raw(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a length-prefixed string.
    pub fn read_string(&mut self) -> SshResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_raw(len)
    }

    /// Reads a name-list.
    ///
    /// An empty string yields an empty list. Names must be non-empty
    /// printable ASCII.
    pub fn read_name_list(&mut self) -> SshResult<Vec<String>> {
        let bytes = self.read_string()?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        if !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(SshError::Protocol(
                "Name-list contains non-printable or non-ASCII bytes".to_string(),
            ));
        }

        let list = std::str::from_utf8(bytes)
            .map_err(|_| SshError::Protocol("Name-list contains invalid UTF-8".to_string()))?;
        let names: Vec<String> = list.split(',').map(String::from).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(SshError::Protocol(format!(
                "Name-list contains an empty name: '{}'",
                list
            )));
        }
        Ok(names)
    }

    /// Reads a signed mpint.
    pub fn read_mpint(&mut self) -> SshResult<BigInt> {
        let bytes = self.read_string()?;
        if bytes.is_empty() {
            return Ok(BigInt::from(0));
        }
        Ok(BigInt::from_signed_bytes_be(bytes))
    }

    /// Reads an mpint that must not be negative.
    pub fn read_mpint_unsigned(&mut self) -> SshResult<BigUint> {
        self.read_mpint()?
            .to_biguint()
            .ok_or_else(|| SshError::Protocol("Negative mpint where unsigned expected".to_string()))
    }

    /// Fails if unread bytes remain.
    pub fn finish(&self) -> SshResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SshError::Protocol(format!(
                "{} unexpected trailing bytes",
                self.remaining()
            )))
        }
    }
}
