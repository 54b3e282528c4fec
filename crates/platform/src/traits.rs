//! Core traits shared between the transport engine and its collaborators

use crate::SshResult;

/// Packet-level interface of an established secure channel.
///
/// Upper layers (user authentication, channel framing, VM console relay)
/// only ever see payloads: framing, encryption and integrity protection
/// happen below this trait.
#[async_trait::async_trait]
pub trait PacketTransport: Send {
    /// Reads the next payload from the peer.
    ///
    /// SSH_MSG_IGNORE and SSH_MSG_DEBUG are skipped transparently.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, integrity failure, a malformed
    /// packet, or when the peer disconnects.
    async fn read_packet(&mut self) -> SshResult<Vec<u8>>;

    /// Sends one payload to the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be framed or written.
    async fn send_packet(&mut self, payload: &[u8]) -> SshResult<()>;

    /// Sends SSH_MSG_DISCONNECT with the given reason code and description.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    async fn send_disconnect(&mut self, reason: u32, message: &str) -> SshResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SshError;

    struct LoopbackTransport {
        queue: Vec<Vec<u8>>,
        disconnected: Option<u32>,
    }

    #[async_trait::async_trait]
    impl PacketTransport for LoopbackTransport {
        async fn read_packet(&mut self) -> SshResult<Vec<u8>> {
            if self.queue.is_empty() {
                return Err(SshError::ConnectionClosed("empty".to_string()));
            }
            Ok(self.queue.remove(0))
        }

        async fn send_packet(&mut self, payload: &[u8]) -> SshResult<()> {
            self.queue.push(payload.to_vec());
            Ok(())
        }

        async fn send_disconnect(&mut self, reason: u32, _message: &str) -> SshResult<()> {
            self.disconnected = Some(reason);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transport_object_safety() {
        let mut transport: Box<dyn PacketTransport> = Box::new(LoopbackTransport {
            queue: Vec::new(),
            disconnected: None,
        });

        transport.send_packet(b"payload").await.unwrap();
        assert_eq!(transport.read_packet().await.unwrap(), b"payload");
        assert!(matches!(
            transport.read_packet().await,
            Err(SshError::ConnectionClosed(_))
        ));
        transport.send_disconnect(11, "bye").await.unwrap();
    }
}
