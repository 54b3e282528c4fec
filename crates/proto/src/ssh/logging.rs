//! Structured logging for SSH transport operations
//!
//! Provides structured, contextual logging using the `tracing` framework.
//! Secret material (keys, the shared secret, private exponents) is never
//! passed to these helpers; the session id is logged hex-encoded.
//!
//! # Log Levels
//!
//! - **TRACE**: Individual packets sent and received
//! - **DEBUG**: Negotiated algorithms, skipped IGNORE/DEBUG messages
//! - **INFO**: Handshake start/completion, state transitions, disconnects
//! - **WARN**: MAC verification failures
//! - **ERROR**: Failed handshakes
//!
//! # Example
//!
//! ```no_run
//! use rkvm_proto::ssh::logging;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter("rkvm_proto::ssh=debug")
//!     .init();
//!
//! logging::log_handshake_start("10.0.0.1:50022");
//! ```

use crate::ssh::kex::NegotiatedAlgorithms;
use crate::ssh::transport::State;
use tracing::{debug, error, info, trace, warn};

/// Log handshake start
pub fn log_handshake_start(peer_addr: &str) {
    info!(peer = peer_addr, "SSH handshake started");
}

/// Log transport state transition
pub fn log_state_transition(peer_addr: &str, old_state: State, new_state: State) {
    info!(
        peer = peer_addr,
        state_from = old_state.name(),
        state_to = new_state.name(),
        "SSH transport state transition"
    );
}

/// Log the peer's identification line
pub fn log_peer_version(peer_addr: &str, version: &str) {
    debug!(peer = peer_addr, peer_version = version, "Peer identification received");
}

/// Log algorithm negotiation result
pub fn log_algorithms_negotiated(peer_addr: &str, algorithms: &NegotiatedAlgorithms) {
    debug!(
        peer = peer_addr,
        kex = algorithms.kex.name(),
        host_key = algorithms.host_key.name(),
        cipher = algorithms.cipher_server_to_client.name(),
        mac = algorithms.mac_server_to_client.name(),
        "Algorithm negotiation successful"
    );
}

/// Log handshake completion
///
/// # Arguments
///
/// * `peer_addr` - Peer address
/// * `session_id` - Exchange hash of the first key exchange
/// * `duration_ms` - Handshake duration in milliseconds
pub fn log_handshake_complete(peer_addr: &str, session_id: &[u8], duration_ms: u64) {
    info!(
        peer = peer_addr,
        session_id = %hex::encode(session_id),
        duration_ms = duration_ms,
        "SSH handshake completed successfully"
    );
}

/// Log handshake failure
pub fn log_handshake_failed(peer_addr: &str, state: State, error: &str) {
    error!(
        peer = peer_addr,
        state = state.name(),
        error = error,
        "SSH handshake failed"
    );
}

/// Log packet send
pub fn log_packet_sent(seq: u32, msg_type: u8, payload_len: usize, encrypted: bool) {
    trace!(
        seq = seq,
        msg_type = msg_type,
        payload_len = payload_len,
        encrypted = encrypted,
        "Sent SSH packet"
    );
}

/// Log packet receive
pub fn log_packet_received(seq: u32, msg_type: u8, payload_len: usize, encrypted: bool) {
    trace!(
        seq = seq,
        msg_type = msg_type,
        payload_len = payload_len,
        encrypted = encrypted,
        "Received SSH packet"
    );
}

/// Log a transport message skipped by the channel (IGNORE, DEBUG)
pub fn log_message_skipped(seq: u32, msg_type: u8) {
    debug!(seq = seq, msg_type = msg_type, "Skipped transport message");
}

/// Log MAC verification failure
pub fn log_integrity_failure(seq: u32) {
    warn!(seq = seq, "MAC verification failed - packet rejected");
}

/// Log disconnect sent
pub fn log_disconnect_sent(reason: u32, description: &str) {
    info!(
        reason = reason,
        description = description,
        "Sent SSH_MSG_DISCONNECT"
    );
}

/// Log disconnect received
pub fn log_disconnect_received(reason: u32, description: &str) {
    info!(
        reason = reason,
        description = description,
        "Peer sent SSH_MSG_DISCONNECT"
    );
}
