//! SSH protocol version exchange (RFC 4253 Section 4.2).
//!
//! The SSH protocol begins with a version exchange where both client and server
//! send an identification string:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! Example: `SSH-2.0-RemoteKVM_1.0`
//!
//! # Security
//!
//! - Maximum line length: 255 characters including CR LF
//! - Must start with "SSH-2.0-"
//! - No null bytes allowed in version string
//! - At most [`MAX_PREAMBLE_LINES`] non-identification lines are skipped
//!
//! The line is kept exactly as received (minus CR LF) because it is an
//! input to the exchange hash.
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::version::Version;
//!
//! let version = Version::new("RemoteKVM_1.0", None);
//! assert_eq!(version.as_str(), "SSH-2.0-RemoteKVM_1.0");
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_8.9").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_8.9");
//! ```

use rkvm_platform::{SshError, SshResult};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum length of SSH version string (RFC 4253 Section 4.2).
pub const MAX_VERSION_LENGTH: usize = 255;

/// Maximum number of lines the peer may send before its identification.
pub const MAX_PREAMBLE_LINES: usize = 32;

/// SSH protocol version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Full identification line without CR LF
    raw: String,
    /// Software version (e.g., "OpenSSH_8.9")
    software_version: String,
    /// Optional comments
    comments: Option<String>,
}

impl Version {
    /// Creates a protocol 2.0 identification.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rkvm_proto::ssh::version::Version;
    ///
    /// let version = Version::new("RemoteKVM_1.0", Some("kvm"));
    /// assert_eq!(version.to_string(), "SSH-2.0-RemoteKVM_1.0 kvm");
    /// ```
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        let mut raw = format!("SSH-2.0-{}", software);
        if let Some(comments) = comments {
            raw.push(' ');
            raw.push_str(comments);
        }
        Self {
            raw,
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// Parses an SSH version string.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] if:
    /// - Line is too long (> 255 characters)
    /// - Line contains null bytes
    /// - Line doesn't start with "SSH-2.0-"
    /// - The software version is empty
    ///
    /// # Example
    ///
    /// ```rust
    /// use rkvm_proto::ssh::version::Version;
    ///
    /// let version = Version::parse("SSH-2.0-OpenSSH_8.9\r\n").unwrap();
    /// assert_eq!(version.software(), "OpenSSH_8.9");
    /// assert!(Version::parse("SSH-1.99-Legacy").is_err());
    /// ```
    pub fn parse(line: &str) -> SshResult<Self> {
        let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

        if line.len() + 2 > MAX_VERSION_LENGTH {
            return Err(SshError::Protocol(format!(
                "Version string too long: {} bytes (max {})",
                line.len() + 2,
                MAX_VERSION_LENGTH
            )));
        }

        if line.contains('\0') {
            return Err(SshError::Protocol(
                "Version string contains null byte".to_string(),
            ));
        }

        let rest = line.strip_prefix("SSH-2.0-").ok_or_else(|| {
            SshError::Protocol(format!(
                "Unsupported identification '{}' (expected 'SSH-2.0-')",
                line
            ))
        })?;

        // Split software version and comments (space-separated)
        let (software_version, comments) = match rest.split_once(' ') {
            Some((software, comments)) => (software.to_string(), Some(comments.to_string())),
            None => (rest.to_string(), None),
        };

        if software_version.is_empty() {
            return Err(SshError::Protocol(format!(
                "Identification '{}' has an empty software version",
                line
            )));
        }

        Ok(Self {
            raw: line.to_string(),
            software_version,
            comments,
        })
    }

    /// Returns the protocol version, always "2.0".
    pub fn proto_version(&self) -> &str {
        "2.0"
    }

    /// Returns the software version (e.g., "RemoteKVM_1.0").
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Returns the identification line as exchanged, without CR LF.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Converts to wire format (with CR LF).
    ///
    /// # Example
    ///
    /// ```rust
    /// use rkvm_proto::ssh::version::Version;
    ///
    /// let version = Version::new("RemoteKVM_1.0", None);
    /// assert_eq!(version.to_wire_format(), b"SSH-2.0-RemoteKVM_1.0\r\n");
    /// ```
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\r\n", self.raw).into_bytes()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Reads the peer's identification line.
///
/// Bytes are consumed one at a time so nothing past the line's LF is read
/// from the stream. Lines not starting with `SSH-` are skipped.
pub async fn read_identification<R>(reader: &mut R) -> SshResult<Version>
where
    R: AsyncRead + Unpin,
{
    for _ in 0..=MAX_PREAMBLE_LINES {
        let line = read_line(reader).await?;
        if line.starts_with(b"SSH-") {
            let text = std::str::from_utf8(&line).map_err(|_| {
                SshError::Protocol("Identification line is not valid UTF-8".to_string())
            })?;
            return Version::parse(text);
        }
    }

    Err(SshError::Protocol(format!(
        "No identification line within {} lines",
        MAX_PREAMBLE_LINES + 1
    )))
}

/// Reads one LF-terminated line, returning it without CR LF.
async fn read_line<R>(reader: &mut R) -> SshResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(64);
    loop {
        let byte = reader.read_u8().await.map_err(SshError::from_io_read)?;
        if byte == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(line);
        }
        if byte == 0 {
            return Err(SshError::Protocol(
                "Version string contains null byte".to_string(),
            ));
        }
        line.push(byte);
        if line.len() + 1 > MAX_VERSION_LENGTH {
            return Err(SshError::Protocol(format!(
                "Identification line exceeds {} bytes",
                MAX_VERSION_LENGTH
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_new() {
        let version = Version::new("RemoteKVM_1.0", None);
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.software(), "RemoteKVM_1.0");
        assert_eq!(version.comments(), None);
        assert_eq!(version.as_str(), "SSH-2.0-RemoteKVM_1.0");
    }

    #[test]
    fn test_version_parse_with_comments() {
        let version = Version::parse("SSH-2.0-OpenSSH_8.9 Ubuntu-3ubuntu0.1").unwrap();
        assert_eq!(version.software(), "OpenSSH_8.9");
        assert_eq!(version.comments(), Some("Ubuntu-3ubuntu0.1"));
    }

    #[test]
    fn test_version_keeps_raw_line() {
        let line = "SSH-2.0-PuTTY_Release_0.78  two  spaces";
        let version = Version::parse(&format!("{}\r\n", line)).unwrap();
        assert_eq!(version.as_str(), line);
        assert_eq!(version.to_string(), line);
    }

    #[test]
    fn test_version_parse_invalid_prefix() {
        let result = Version::parse("INVALID-2.0-Test");
        assert!(matches!(result, Err(SshError::Protocol(_))));
    }

    #[test]
    fn test_version_parse_unsupported_protocol() {
        assert!(Version::parse("SSH-1.0-OldClient").is_err());
        assert!(Version::parse("SSH-1.99-Compat").is_err());
        assert!(Version::parse("SSH-2.0-").is_err());
    }

    #[test]
    fn test_version_parse_too_long() {
        let long_string = format!("SSH-2.0-{}", "A".repeat(300));
        assert!(Version::parse(&long_string).is_err());
    }

    #[test]
    fn test_version_parse_null_byte() {
        assert!(Version::parse("SSH-2.0-Test\0Bad").is_err());
    }

    #[test]
    fn test_version_round_trip() {
        let original = Version::new("RemoteKVM_1.0", Some("test"));
        let parsed = Version::parse(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[tokio::test]
    async fn test_read_identification_skips_banner() {
        let input = b"Welcome\r\nsecond line\nSSH-2.0-OpenSSH_9.6\r\n\x00\x00\x00\x0c";
        let mut reader = &input[..];
        let version = read_identification(&mut reader).await.unwrap();
        assert_eq!(version.as_str(), "SSH-2.0-OpenSSH_9.6");
        // Binary packet bytes after the line are untouched
        assert_eq!(reader, &b"\x00\x00\x00\x0c"[..]);
    }

    #[tokio::test]
    async fn test_read_identification_wrong_protocol() {
        let mut reader = &b"SSH-1.5-Ancient\r\n"[..];
        let result = read_identification(&mut reader).await;
        assert!(matches!(result, Err(SshError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_read_identification_eof() {
        let mut reader = &b"SSH-2.0-Trunc"[..];
        let result = read_identification(&mut reader).await;
        assert!(matches!(result, Err(SshError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_read_identification_too_many_lines() {
        let input = "junk\r\n".repeat(MAX_PREAMBLE_LINES + 1) + "SSH-2.0-Late\r\n";
        let mut reader = input.as_bytes();
        assert!(read_identification(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_read_identification_overlong_line() {
        let input = format!("SSH-2.0-{}\r\n", "x".repeat(400));
        let mut reader = input.as_bytes();
        assert!(read_identification(&mut reader).await.is_err());
    }
}
