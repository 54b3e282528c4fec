//! SSH transport-layer message numbers and generic messages (RFC 4253).
//!
//! # Message Categories
//!
//! - **Transport Layer Generic** (1-19): Disconnect, ignore, debug
//! - **Algorithm Negotiation** (20-29): Key exchange initialization
//! - **Key Exchange Method** (30-49): Method-specific messages
//!
//! Numbers above 49 belong to upper layers and pass through the secure
//! channel untouched.
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::message::MessageType;
//!
//! let msg_type = MessageType::KexInit;
//! assert_eq!(msg_type as u8, 20);
//! ```

use crate::ssh::wire::{SshReader, SshWriter};
use rkvm_platform::{SshError, SshResult};

/// SSH transport message types as defined in RFC 4253 Section 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    // Transport layer generic (1-19)
    /// Disconnect message - terminates the connection.
    Disconnect = 1,
    /// Ignore message - can be used for padding or keep-alive.
    Ignore = 2,
    /// Unimplemented message - response to unknown message type.
    Unimplemented = 3,
    /// Debug message - debugging information.
    Debug = 4,
    /// Service request - request a service (e.g., "ssh-userauth").
    ServiceRequest = 5,
    /// Service accept - service request accepted.
    ServiceAccept = 6,

    // Algorithm negotiation (20-29)
    /// Key exchange init - algorithm negotiation.
    KexInit = 20,
    /// New keys - signals transition to new keys.
    NewKeys = 21,

    // Key exchange method specific (30-49)
    /// Diffie-Hellman key exchange init, carries the client value `e`.
    KexdhInit = 30,
    /// Diffie-Hellman key exchange reply: host key, `f`, signature.
    KexdhReply = 31,
}

impl MessageType {
    /// Converts a byte to a message type.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rkvm_proto::ssh::message::MessageType;
    ///
    /// assert_eq!(MessageType::from_u8(20), Some(MessageType::KexInit));
    /// assert_eq!(MessageType::from_u8(94), None);
    /// ```
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageType::Disconnect),
            2 => Some(MessageType::Ignore),
            3 => Some(MessageType::Unimplemented),
            4 => Some(MessageType::Debug),
            5 => Some(MessageType::ServiceRequest),
            6 => Some(MessageType::ServiceAccept),
            20 => Some(MessageType::KexInit),
            21 => Some(MessageType::NewKeys),
            30 => Some(MessageType::KexdhInit),
            31 => Some(MessageType::KexdhReply),
            _ => None,
        }
    }

    /// Returns the message type name.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Disconnect => "SSH_MSG_DISCONNECT",
            MessageType::Ignore => "SSH_MSG_IGNORE",
            MessageType::Unimplemented => "SSH_MSG_UNIMPLEMENTED",
            MessageType::Debug => "SSH_MSG_DEBUG",
            MessageType::ServiceRequest => "SSH_MSG_SERVICE_REQUEST",
            MessageType::ServiceAccept => "SSH_MSG_SERVICE_ACCEPT",
            MessageType::KexInit => "SSH_MSG_KEXINIT",
            MessageType::NewKeys => "SSH_MSG_NEWKEYS",
            MessageType::KexdhInit => "SSH_MSG_KEXDH_INIT",
            MessageType::KexdhReply => "SSH_MSG_KEXDH_REPLY",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

/// Disconnect reason codes (RFC 4253 Section 11.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum DisconnectReason {
    HostNotAllowedToConnect = 1,
    ProtocolError = 2,
    KeyExchangeFailed = 3,
    Reserved = 4,
    MacError = 5,
    CompressionError = 6,
    ServiceNotAvailable = 7,
    ProtocolVersionNotSupported = 8,
    HostKeyNotVerifiable = 9,
    ConnectionLost = 10,
    ByApplication = 11,
    TooManyConnections = 12,
    AuthCancelledByUser = 13,
    NoMoreAuthMethodsAvailable = 14,
    IllegalUserName = 15,
}

impl DisconnectReason {
    /// Converts a wire code to a reason, if known.
    pub fn from_code(code: u32) -> Option<Self> {
        use DisconnectReason::*;
        let reason = match code {
            1 => HostNotAllowedToConnect,
            2 => ProtocolError,
            3 => KeyExchangeFailed,
            4 => Reserved,
            5 => MacError,
            6 => CompressionError,
            7 => ServiceNotAvailable,
            8 => ProtocolVersionNotSupported,
            9 => HostKeyNotVerifiable,
            10 => ConnectionLost,
            11 => ByApplication,
            12 => TooManyConnections,
            13 => AuthCancelledByUser,
            14 => NoMoreAuthMethodsAvailable,
            15 => IllegalUserName,
            _ => return None,
        };
        Some(reason)
    }

    /// Returns the wire code.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// SSH_MSG_DISCONNECT.
///
/// ```text
/// byte      SSH_MSG_DISCONNECT
/// uint32    reason code
/// string    description in ISO-10646 UTF-8 encoding
/// string    language tag
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Reason code.
    pub reason: u32,
    /// Human-readable description.
    pub description: String,
    /// Language tag, usually empty.
    pub language: String,
}

impl Disconnect {
    /// Creates a disconnect message with an empty language tag.
    pub fn new(reason: u32, description: &str) -> Self {
        Self {
            reason,
            description: description.to_string(),
            language: String::new(),
        }
    }

    /// Serializes the message payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = SshWriter::message(MessageType::Disconnect as u8);
        writer
            .put_u32(self.reason)
            .put_string(self.description.as_bytes())
            .put_string(self.language.as_bytes());
        writer.into_vec()
    }

    /// Parses a message payload.
    ///
    /// Description bytes that are not valid UTF-8 are replaced rather than
    /// rejected: the connection is closing either way.
    pub fn from_bytes(data: &[u8]) -> SshResult<Self> {
        let mut reader = SshReader::new(data);
        let msg = reader.read_u8()?;
        if msg != MessageType::Disconnect as u8 {
            return Err(SshError::Protocol(format!(
                "Invalid message type: expected 1 (SSH_MSG_DISCONNECT), got {}",
                msg
            )));
        }
        let reason = reader.read_u32()?;
        let description = String::from_utf8_lossy(reader.read_string()?).into_owned();
        // Some peers omit the language tag
        let language = if reader.is_empty() {
            String::new()
        } else {
            String::from_utf8_lossy(reader.read_string()?).into_owned()
        };

        Ok(Self {
            reason,
            description,
            language,
        })
    }
}
