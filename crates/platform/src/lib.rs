//! # RemoteKVM Platform
//!
//! Shared types for the RemoteKVM SSH transport engine and the services
//! built on top of it.
//!
//! This crate provides:
//! - Unified error types (`SshError`, `SshResult`)
//! - The `PacketTransport` trait consumed by upper-layer collaborators
//!
//! # Examples
//!
//! ```
//! use rkvm_platform::{SshError, SshResult};
//!
//! fn example_function() -> SshResult<String> {
//!     Ok("Hello, RemoteKVM!".to_string())
//! }
//!
//! # fn main() -> SshResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, RemoteKVM!");
//! assert_eq!(SshError::Integrity.to_string(), "authentication failed");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod traits;

pub use error::{
    SshError, SshResult, REASON_BY_APPLICATION, REASON_KEY_EXCHANGE_FAILED, REASON_MAC_ERROR,
    REASON_PROTOCOL_ERROR,
};
pub use traits::PacketTransport;

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
