//! SSH Transport Layer State Machine (RFC 4253).
//!
//! # Transport States
//!
//! The transport layer progresses through these states, strictly forward:
//!
//! 1. **VersionExchange** - Exchange SSH-2.0 version strings
//! 2. **AlgorithmNegotiation** - Send/receive SSH_MSG_KEXINIT messages
//! 3. **DiffieHellman** - KEXDH_INIT / KEXDH_REPLY
//! 4. **NewKeys** - Send/receive SSH_MSG_NEWKEYS, install new keys
//! 5. **Encrypted** - All communication encrypted and authenticated
//!
//! Any state may move to **Closed**. Nothing leaves Closed, and there is
//! no way back from Encrypted since rekeying is not supported.
//!
//! # Example
//!
//! ```rust
//! use rkvm_proto::ssh::transport::{State, TransportState};
//!
//! let mut state = TransportState::new();
//! assert_eq!(state.current(), State::VersionExchange);
//! state.transition(State::AlgorithmNegotiation).unwrap();
//! assert!(state.transition(State::VersionExchange).is_err());
//! ```

use crate::ssh::kex::NegotiatedAlgorithms;
use crate::ssh::version::Version;
use rkvm_platform::{SshError, SshResult};

/// SSH transport layer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Both sides exchange "SSH-2.0-..." identification lines.
    VersionExchange,

    /// Both sides send SSH_MSG_KEXINIT.
    AlgorithmNegotiation,

    /// Diffie-Hellman group14 exchange in progress.
    DiffieHellman,

    /// Both sides send SSH_MSG_NEWKEYS and activate encryption.
    NewKeys,

    /// All packets encrypted and authenticated.
    Encrypted,

    /// Connection torn down.
    Closed,
}

impl State {
    /// Returns the state that follows this one in a successful handshake.
    pub fn successor(self) -> Option<State> {
        match self {
            State::VersionExchange => Some(State::AlgorithmNegotiation),
            State::AlgorithmNegotiation => Some(State::DiffieHellman),
            State::DiffieHellman => Some(State::NewKeys),
            State::NewKeys => Some(State::Encrypted),
            State::Encrypted | State::Closed => None,
        }
    }

    /// Returns a short lowercase name for logs.
    pub fn name(self) -> &'static str {
        match self {
            State::VersionExchange => "version_exchange",
            State::AlgorithmNegotiation => "algorithm_negotiation",
            State::DiffieHellman => "diffie_hellman",
            State::NewKeys => "new_keys",
            State::Encrypted => "encrypted",
            State::Closed => "closed",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-connection handshake state.
#[derive(Debug)]
pub struct TransportState {
    state: State,
    peer_version: Option<Version>,
    negotiated: Option<NegotiatedAlgorithms>,
    session_id: Option<Vec<u8>>,
}

impl TransportState {
    /// Creates the state for a new connection.
    pub fn new() -> Self {
        Self {
            state: State::VersionExchange,
            peer_version: None,
            negotiated: None,
            session_id: None,
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> State {
        self.state
    }

    /// Returns true once NEWKEYS has been exchanged.
    pub fn is_encrypted(&self) -> bool {
        self.state == State::Encrypted
    }

    /// Returns true after the connection was torn down.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Moves to `next_state`.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] unless `next_state` is the direct
    /// successor of the current state or [`State::Closed`].
    pub fn transition(&mut self, next_state: State) -> SshResult<()> {
        let valid = match (self.state, next_state) {
            (State::Closed, _) => false,
            (_, State::Closed) => true,
            (current, next) => current.successor() == Some(next),
        };

        if !valid {
            return Err(SshError::Protocol(format!(
                "Invalid state transition: {:?} -> {:?}",
                self.state, next_state
            )));
        }

        self.state = next_state;
        Ok(())
    }

    /// Checks that the connection is in `expected`.
    pub fn expect(&self, expected: State) -> SshResult<()> {
        if self.state != expected {
            return Err(SshError::Protocol(format!(
                "Operation requires state {:?}, connection is in {:?}",
                expected, self.state
            )));
        }
        Ok(())
    }

    /// Returns the peer's identification.
    pub fn peer_version(&self) -> Option<&Version> {
        self.peer_version.as_ref()
    }

    /// Records the peer's identification.
    pub fn set_peer_version(&mut self, version: Version) {
        self.peer_version = Some(version);
    }

    /// Returns the negotiated algorithms.
    pub fn negotiated(&self) -> Option<&NegotiatedAlgorithms> {
        self.negotiated.as_ref()
    }

    /// Records the negotiated algorithms.
    pub fn set_negotiated(&mut self, algorithms: NegotiatedAlgorithms) {
        self.negotiated = Some(algorithms);
    }

    /// Returns the session identifier (H of the first exchange).
    pub fn session_id(&self) -> Option<&[u8]> {
        self.session_id.as_deref()
    }

    /// Fixes the session identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Protocol`] if it was already set.
    pub fn set_session_id(&mut self, session_id: &[u8]) -> SshResult<()> {
        if self.session_id.is_some() {
            return Err(SshError::Protocol(
                "Session identifier is already fixed".to_string(),
            ));
        }
        self.session_id = Some(session_id.to_vec());
        Ok(())
    }
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_to_encrypted(state: &mut TransportState) {
        state.transition(State::AlgorithmNegotiation).unwrap();
        state.transition(State::DiffieHellman).unwrap();
        state.transition(State::NewKeys).unwrap();
        state.transition(State::Encrypted).unwrap();
    }

    #[test]
    fn test_transport_state_new() {
        let state = TransportState::new();
        assert_eq!(state.current(), State::VersionExchange);
        assert!(!state.is_encrypted());
        assert!(state.session_id().is_none());
        assert!(state.peer_version().is_none());
    }

    #[test]
    fn test_state_transition_valid() {
        let mut state = TransportState::new();
        advance_to_encrypted(&mut state);
        assert!(state.is_encrypted());
        assert!(state.transition(State::Closed).is_ok());
        assert!(state.is_closed());
    }

    #[test]
    fn test_state_transition_invalid() {
        let mut state = TransportState::new();

        match state.transition(State::Encrypted) {
            Err(SshError::Protocol(msg)) => assert!(msg.contains("Invalid state transition")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }

        state.transition(State::AlgorithmNegotiation).unwrap();
        // No staying in place and no going back
        assert!(state.transition(State::AlgorithmNegotiation).is_err());
        assert!(state.transition(State::VersionExchange).is_err());
    }

    #[test]
    fn test_no_rekey_from_encrypted() {
        let mut state = TransportState::new();
        advance_to_encrypted(&mut state);
        assert!(state.transition(State::AlgorithmNegotiation).is_err());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = TransportState::new();
        state.transition(State::Closed).unwrap();
        assert!(state.transition(State::AlgorithmNegotiation).is_err());
        assert!(state.transition(State::Closed).is_err());
    }

    #[test]
    fn test_expect() {
        let state = TransportState::new();
        assert!(state.expect(State::VersionExchange).is_ok());
        assert!(state.expect(State::Encrypted).is_err());
    }

    #[test]
    fn test_session_id_write_once() {
        let mut state = TransportState::new();
        state.set_session_id(&[1, 2, 3]).unwrap();
        assert_eq!(state.session_id(), Some(&[1u8, 2, 3][..]));
        assert!(state.set_session_id(&[4]).is_err());
    }

    #[test]
    fn test_peer_version() {
        let mut state = TransportState::new();
        let version = Version::new("OpenSSH_8.0", None);
        state.set_peer_version(version.clone());
        assert_eq!(state.peer_version(), Some(&version));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(State::DiffieHellman.to_string(), "diffie_hellman");
        assert_eq!(State::Encrypted.successor(), None);
        assert_eq!(State::NewKeys.successor(), Some(State::Encrypted));
    }
}
