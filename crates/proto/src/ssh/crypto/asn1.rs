//! Minimal DER reader (ITU-T X.690) for PKCS#1 private keys.
//!
//! Only what an `RSAPrivateKey` needs: definite lengths (short and long
//! form), SEQUENCE and non-negative INTEGER. Every read is bounds-checked
//! against the enclosing element.

use num_bigint::BigUint;
use rkvm_platform::{SshError, SshResult};

/// Universal tag for INTEGER.
pub const TAG_INTEGER: u8 = 0x02;

/// Universal tag for SEQUENCE (constructed).
pub const TAG_SEQUENCE: u8 = 0x30;

/// One tag-length-value element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerElement<'a> {
    /// Identifier octet.
    pub tag: u8,
    /// Content octets.
    pub value: &'a [u8],
}

/// Sequential reader over DER-encoded bytes.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns true when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads the next element, whatever its tag.
    pub fn read_element(&mut self) -> SshResult<DerElement<'a>> {
        let tag = self.next_byte("tag")?;
        if tag & 0x1f == 0x1f {
            return Err(SshError::Resource(
                "ASN.1 high-tag-number form is not supported".to_string(),
            ));
        }

        let len = self.read_length()?;
        let remaining = self.data.len() - self.pos;
        if len > remaining {
            return Err(SshError::Resource(format!(
                "ASN.1 element length {} exceeds remaining {} bytes",
                len, remaining
            )));
        }

        let value = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(DerElement { tag, value })
    }

    /// Reads the next element and checks its tag.
    pub fn read_expected(&mut self, tag: u8) -> SshResult<&'a [u8]> {
        let element = self.read_element()?;
        if element.tag != tag {
            return Err(SshError::Resource(format!(
                "ASN.1 tag mismatch: expected 0x{:02x}, got 0x{:02x}",
                tag, element.tag
            )));
        }
        Ok(element.value)
    }

    /// Reads a SEQUENCE and returns a reader over its contents.
    pub fn read_sequence(&mut self) -> SshResult<DerReader<'a>> {
        self.read_expected(TAG_SEQUENCE).map(DerReader::new)
    }

    /// Reads a non-negative INTEGER.
    pub fn read_unsigned_integer(&mut self) -> SshResult<BigUint> {
        let value = self.read_expected(TAG_INTEGER)?;
        if value.is_empty() {
            return Err(SshError::Resource("ASN.1 INTEGER is empty".to_string()));
        }
        if value[0] & 0x80 != 0 {
            return Err(SshError::Resource(
                "ASN.1 INTEGER is negative".to_string(),
            ));
        }
        Ok(BigUint::from_bytes_be(value))
    }

    /// Fails if unread bytes remain.
    pub fn finish(&self) -> SshResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SshError::Resource(format!(
                "{} trailing bytes after ASN.1 structure",
                self.data.len() - self.pos
            )))
        }
    }

    fn next_byte(&mut self, what: &str) -> SshResult<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(|| {
            SshError::Resource(format!("ASN.1 data truncated reading {}", what))
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_length(&mut self) -> SshResult<usize> {
        let first = self.next_byte("length")?;
        if first < 0x80 {
            return Ok(first as usize);
        }

        let count = (first & 0x7f) as usize;
        if count == 0 {
            return Err(SshError::Resource(
                "ASN.1 indefinite length is not allowed in DER".to_string(),
            ));
        }
        if count > 4 {
            return Err(SshError::Resource(format!(
                "ASN.1 length uses {} octets (maximum 4)",
                count
            )));
        }

        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.next_byte("long-form length")? as usize;
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form_integer() {
        let mut reader = DerReader::new(&[0x02, 0x01, 0x05]);
        assert_eq!(reader.read_unsigned_integer().unwrap(), BigUint::from(5u32));
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_long_form_length() {
        let mut data = vec![0x02, 0x82, 0x01, 0x01, 0x00];
        data.extend_from_slice(&[0xff; 256]);

        let mut reader = DerReader::new(&data);
        let value = reader.read_unsigned_integer().unwrap();
        assert_eq!(value.bits(), 2048);
    }

    #[test]
    fn test_sequence_of_integers() {
        let data = [0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x7f];
        let mut outer = DerReader::new(&data);
        let mut seq = outer.read_sequence().unwrap();
        assert_eq!(seq.read_unsigned_integer().unwrap(), BigUint::from(0u32));
        assert_eq!(seq.read_unsigned_integer().unwrap(), BigUint::from(127u32));
        assert!(seq.is_empty());
        assert!(outer.finish().is_ok());
    }

    #[test]
    fn test_length_past_end_rejected() {
        let mut reader = DerReader::new(&[0x02, 0x05, 0x01]);
        assert!(matches!(
            reader.read_unsigned_integer(),
            Err(SshError::Resource(_))
        ));
    }

    #[test]
    fn test_indefinite_length_rejected() {
        let mut reader = DerReader::new(&[0x30, 0x80, 0x00, 0x00]);
        assert!(reader.read_sequence().is_err());
    }

    #[test]
    fn test_tag_mismatch() {
        let mut reader = DerReader::new(&[0x04, 0x01, 0x00]);
        let err = reader.read_sequence().unwrap_err();
        assert!(err.to_string().contains("tag mismatch"));
    }

    #[test]
    fn test_negative_integer_rejected() {
        let mut reader = DerReader::new(&[0x02, 0x01, 0x80]);
        assert!(reader.read_unsigned_integer().is_err());
    }

    #[test]
    fn test_truncated_length_octets() {
        let mut reader = DerReader::new(&[0x02, 0x82, 0x01]);
        assert!(reader.read_element().is_err());
    }
}
