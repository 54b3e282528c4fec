//! Packet-level channel over a byte stream (RFC 4253 Section 6).
//!
//! [`SecureChannel`] owns the stream and both directions' cryptographic
//! state. Before NEWKEYS a direction sends framed packets in the clear;
//! afterwards it uses aes256-ctr over the whole frame (length included)
//! followed by an hmac-sha2-256 tag over `uint32 seq || plaintext frame`.
//!
//! # Encrypted receive
//!
//! ```text
//! 1. buffer 4 bytes, decrypt them at a checkpoint, rewind  -> packet_length
//! 2. validate packet_length
//! 3. buffer the rest of the frame and the 32-byte tag
//! 4. decrypt all 4 + packet_length bytes in one pass
//! 5. verify the tag against seq || frame (constant time)
//! 6. parse padding_length / payload, increment seq
//! ```
//!
//! Incoming bytes are collected in a receive buffer and the cipher and
//! sequence number are only touched once a whole packet is buffered, so
//! a dropped `read_packet` future (e.g. under `tokio::time::timeout` or
//! `select!`) loses nothing. Sends are not cancellation safe: a send
//! dropped mid-write leaves the peer's view of the stream out of sync and
//! every later send on that direction fails.
//!
//! [`SecureChannel::into_split`] hands each direction to its own half so
//! a receive can wait while the other half sends.
//!
//! Each direction counts every packet it carries, plaintext or not, and
//! the counter wraps at 2^32. The MAC uses the value before the increment.

use crate::ssh::crypto::aes::KEY_SIZE;
use crate::ssh::crypto::ctr::{Aes256Ctr, IV_SIZE};
use crate::ssh::crypto::hmac::HmacSha256;
use crate::ssh::keys::DirectionKeys;
use crate::ssh::logging;
use crate::ssh::message::{Disconnect, MessageType};
use crate::ssh::packet::{self, Packet, MAX_PACKET_SIZE};
use bytes::BytesMut;
use rkvm_platform::{SshError, SshResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

/// Protection state for one direction.
#[derive(Debug, Default)]
struct Direction {
    cipher: Option<Aes256Ctr>,
    mac: Option<HmacSha256>,
    sequence: u32,
}

impl Direction {
    fn install(&mut self, keys: &DirectionKeys) -> SshResult<()> {
        let key: &[u8; KEY_SIZE] = keys.enc_key.as_slice().try_into().map_err(|_| {
            SshError::Protocol(format!(
                "Derived cipher key is {} bytes (need {})",
                keys.enc_key.len(),
                KEY_SIZE
            ))
        })?;
        let iv: &[u8; IV_SIZE] = keys.iv.as_slice().try_into().map_err(|_| {
            SshError::Protocol(format!(
                "Derived IV is {} bytes (need {})",
                keys.iv.len(),
                IV_SIZE
            ))
        })?;

        self.cipher = Some(Aes256Ctr::new(key, iv));
        self.mac = Some(HmacSha256::new(&keys.mac_key));
        Ok(())
    }

    fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn advance(&mut self) {
        self.sequence = self.sequence.wrapping_add(1);
    }
}

/// Receive side: direction state plus bytes read but not yet consumed.
#[derive(Debug)]
struct Inbound {
    direction: Direction,
    max_packet_size: usize,
    buffer: BytesMut,
}

impl Inbound {
    fn new() -> Self {
        Self {
            direction: Direction::default(),
            max_packet_size: MAX_PACKET_SIZE,
            buffer: BytesMut::new(),
        }
    }

    async fn read_packet<R>(&mut self, stream: &mut R) -> SshResult<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let seq = self.direction.sequence;
            let payload = self.read_frame(stream).await?;

            let msg_type = *payload.first().ok_or_else(|| {
                SshError::Protocol("Packet carries an empty payload".to_string())
            })?;

            match MessageType::from_u8(msg_type) {
                Some(MessageType::Ignore) | Some(MessageType::Debug) => {
                    logging::log_message_skipped(seq, msg_type);
                    continue;
                }
                Some(MessageType::Disconnect) => {
                    let msg = Disconnect::from_bytes(&payload)?;
                    logging::log_disconnect_received(msg.reason, &msg.description);
                    return Err(SshError::ConnectionClosed(format!(
                        "peer disconnected (reason {}): {}",
                        msg.reason, msg.description
                    )));
                }
                _ => return Ok(payload),
            }
        }
    }

    /// Buffers one whole packet, then unprotects it.
    async fn read_frame<R>(&mut self, stream: &mut R) -> SshResult<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        self.fill(stream, 4).await?;
        let packet_length = self.packet_length()?;
        let tag_len = if self.direction.is_encrypted() {
            HmacSha256::TAG_LEN
        } else {
            0
        };
        let total = 4 + packet_length + tag_len;
        self.fill(stream, total).await?;

        let wire = self.buffer.split_to(total);
        self.open(wire, packet_length)
    }

    /// Reads until at least `needed` bytes are buffered.
    ///
    /// `read_buf` either completes with data appended or reads nothing,
    /// so dropping this future never loses bytes.
    async fn fill<R>(&mut self, stream: &mut R, needed: usize) -> SshResult<()>
    where
        R: AsyncRead + Unpin,
    {
        while self.buffer.len() < needed {
            self.buffer.reserve(needed - self.buffer.len());
            let n = stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(SshError::from_io_read)?;
            if n == 0 {
                return Err(SshError::ConnectionClosed(if self.buffer.is_empty() {
                    "peer closed connection".to_string()
                } else {
                    format!(
                        "peer closed connection mid-packet ({} of {} bytes)",
                        self.buffer.len(),
                        needed
                    )
                }));
            }
        }
        Ok(())
    }

    /// Decodes and validates `packet_length` from the buffered prefix.
    fn packet_length(&mut self) -> SshResult<usize> {
        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&self.buffer[..4]);
        if let Some(cipher) = self.direction.cipher.as_mut() {
            cipher.peek(&mut length_bytes);
        }
        let packet_length = u32::from_be_bytes(length_bytes) as usize;

        if self.direction.is_encrypted() {
            packet::check_encrypted_packet_length(packet_length)?;
        } else {
            packet::check_packet_length(packet_length)?;
        }
        if packet_length > self.max_packet_size {
            return Err(SshError::Protocol(format!(
                "Packet too large: {} bytes (limit {})",
                packet_length, self.max_packet_size
            )));
        }
        Ok(packet_length)
    }

    fn open(&mut self, mut wire: BytesMut, packet_length: usize) -> SshResult<Vec<u8>> {
        let seq = self.direction.sequence;
        let encrypted = self.direction.is_encrypted();
        let (frame, tag) = wire.split_at_mut(4 + packet_length);

        if let (Some(cipher), Some(mac)) = (
            self.direction.cipher.as_mut(),
            self.direction.mac.as_ref(),
        ) {
            cipher.apply_keystream(frame);
            if !mac.verify_packet(seq, frame, tag) {
                logging::log_integrity_failure(seq);
                return Err(SshError::Integrity);
            }
        }

        let payload = Packet::from_body(&frame[4..])?.into_payload();
        logging::log_packet_received(
            seq,
            payload.first().copied().unwrap_or(0),
            payload.len(),
            encrypted,
        );
        self.direction.advance();
        Ok(payload)
    }
}

/// Send side: direction state plus a marker for an interrupted write.
#[derive(Debug, Default)]
struct Outbound {
    direction: Direction,
    write_in_progress: bool,
}

impl Outbound {
    async fn send_packet<W>(&mut self, stream: &mut W, payload: &[u8]) -> SshResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        if self.write_in_progress {
            return Err(SshError::Protocol(
                "Previous packet write was interrupted; stream is out of sync".to_string(),
            ));
        }

        let packet = Packet::new(payload.to_vec())?;
        let mut frame = packet.to_bytes();
        let seq = self.direction.sequence;

        if let (Some(cipher), Some(mac)) = (
            self.direction.cipher.as_mut(),
            self.direction.mac.as_ref(),
        ) {
            let tag = mac.packet_tag(seq, &frame);
            cipher.apply_keystream(&mut frame);
            frame.extend_from_slice(&tag);
        }

        // Stays set if the write fails or the future is dropped
        self.write_in_progress = true;
        stream
            .write_all(&frame)
            .await
            .map_err(SshError::from_io_read)?;
        stream.flush().await.map_err(SshError::from_io_read)?;
        self.write_in_progress = false;

        logging::log_packet_sent(
            seq,
            payload.first().copied().unwrap_or(0),
            payload.len(),
            self.direction.is_encrypted(),
        );
        self.direction.advance();
        Ok(())
    }

    async fn send_disconnect<W>(
        &mut self,
        stream: &mut W,
        reason: u32,
        description: &str,
    ) -> SshResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let payload = Disconnect::new(reason, description).to_bytes();
        self.send_packet(stream, &payload).await?;
        logging::log_disconnect_sent(reason, description);
        Ok(())
    }
}

/// Framed, optionally encrypted packet transport over `S`.
///
/// The combined channel runs one operation at a time. Use
/// [`into_split`](Self::into_split) to receive and send concurrently.
#[derive(Debug)]
pub struct SecureChannel<S> {
    stream: S,
    inbound: Inbound,
    outbound: Outbound,
}

impl<S> SecureChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream` in plaintext mode with both sequence numbers at 0.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            inbound: Inbound::new(),
            outbound: Outbound::default(),
        }
    }

    /// Limits the accepted `packet_length` (at most [`MAX_PACKET_SIZE`]).
    pub fn set_max_packet_size(&mut self, max_packet_size: usize) {
        self.inbound.max_packet_size = max_packet_size.min(MAX_PACKET_SIZE);
    }

    /// Returns the underlying stream mutably, for the version exchange.
    ///
    /// Reads made here bypass the receive buffer, so this is only sound
    /// before the first packet is read.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Next sequence number expected from the peer.
    pub fn inbound_sequence(&self) -> u32 {
        self.inbound.direction.sequence
    }

    /// Next sequence number for an outgoing packet.
    pub fn outbound_sequence(&self) -> u32 {
        self.outbound.direction.sequence
    }

    /// Returns true when both directions are keyed.
    pub fn is_encrypted(&self) -> bool {
        self.inbound.direction.is_encrypted() && self.outbound.direction.is_encrypted()
    }

    /// Keys the outgoing direction. Called right after sending NEWKEYS.
    pub fn enable_outbound_encryption(&mut self, keys: &DirectionKeys) -> SshResult<()> {
        self.outbound.direction.install(keys)
    }

    /// Keys the incoming direction. Called right after receiving NEWKEYS.
    pub fn enable_inbound_encryption(&mut self, keys: &DirectionKeys) -> SshResult<()> {
        self.inbound.direction.install(keys)
    }

    /// Writes raw bytes, used for the identification line.
    pub async fn write_raw(&mut self, data: &[u8]) -> SshResult<()> {
        self.stream
            .write_all(data)
            .await
            .map_err(SshError::from_io_read)?;
        self.stream.flush().await.map_err(SshError::from_io_read)
    }

    /// Frames, protects and writes one payload.
    pub async fn send_packet(&mut self, payload: &[u8]) -> SshResult<()> {
        self.outbound.send_packet(&mut self.stream, payload).await
    }

    /// Sends SSH_MSG_DISCONNECT.
    pub async fn send_disconnect(&mut self, reason: u32, description: &str) -> SshResult<()> {
        self.outbound
            .send_disconnect(&mut self.stream, reason, description)
            .await
    }

    /// Reads the next payload for the caller.
    ///
    /// IGNORE and DEBUG messages are consumed and skipped. A DISCONNECT
    /// from the peer ends the connection with
    /// [`SshError::ConnectionClosed`].
    ///
    /// # Cancel safety
    ///
    /// Cancellation safe: if the future is dropped before completing, the
    /// bytes already received stay buffered and the next call resumes the
    /// same packet.
    pub async fn read_packet(&mut self) -> SshResult<Vec<u8>> {
        self.inbound.read_packet(&mut self.stream).await
    }

    /// Shuts down the write half of the stream.
    pub async fn shutdown(&mut self) -> SshResult<()> {
        self.stream.shutdown().await.map_err(SshError::from_io_read)
    }

    /// Consumes the channel, returning the stream. Buffered bytes that do
    /// not yet form a packet are discarded.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Splits the channel into independently owned receive and send halves.
    ///
    /// Each half carries its direction's keys, sequence number and (for
    /// the reader) any buffered bytes.
    pub fn into_split(self) -> (PacketReader<ReadHalf<S>>, PacketWriter<WriteHalf<S>>) {
        let (read_half, write_half) = tokio::io::split(self.stream);
        (
            PacketReader {
                stream: read_half,
                inbound: self.inbound,
            },
            PacketWriter {
                stream: write_half,
                outbound: self.outbound,
            },
        )
    }
}

/// Receive half of a split [`SecureChannel`].
#[derive(Debug)]
pub struct PacketReader<R> {
    stream: R,
    inbound: Inbound,
}

impl<R> PacketReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Reads the next payload; same rules as [`SecureChannel::read_packet`],
    /// including cancellation safety.
    pub async fn read_packet(&mut self) -> SshResult<Vec<u8>> {
        self.inbound.read_packet(&mut self.stream).await
    }

    /// Next sequence number expected from the peer.
    pub fn sequence(&self) -> u32 {
        self.inbound.direction.sequence
    }
}

/// Send half of a split [`SecureChannel`].
#[derive(Debug)]
pub struct PacketWriter<W> {
    stream: W,
    outbound: Outbound,
}

impl<W> PacketWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Frames, protects and writes one payload.
    pub async fn send_packet(&mut self, payload: &[u8]) -> SshResult<()> {
        self.outbound.send_packet(&mut self.stream, payload).await
    }

    /// Sends SSH_MSG_DISCONNECT.
    pub async fn send_disconnect(&mut self, reason: u32, description: &str) -> SshResult<()> {
        self.outbound
            .send_disconnect(&mut self.stream, reason, description)
            .await
    }

    /// Next sequence number for an outgoing packet.
    pub fn sequence(&self) -> u32 {
        self.outbound.direction.sequence
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> SshResult<()> {
        self.stream.shutdown().await.map_err(SshError::from_io_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};
    use tokio::time::timeout;

    fn keys(seed: u8) -> DirectionKeys {
        DirectionKeys {
            iv: vec![seed; 16],
            enc_key: vec![seed.wrapping_add(1); 32],
            mac_key: vec![seed.wrapping_add(2); 32],
        }
    }

    fn pair() -> (SecureChannel<DuplexStream>, SecureChannel<DuplexStream>) {
        let (a, b) = duplex(1 << 16);
        (SecureChannel::new(a), SecureChannel::new(b))
    }

    fn encrypt_pair(
        server: &mut SecureChannel<DuplexStream>,
        client: &mut SecureChannel<DuplexStream>,
    ) {
        let c2s = keys(0x10);
        let s2c = keys(0x20);
        server.enable_outbound_encryption(&s2c).unwrap();
        server.enable_inbound_encryption(&c2s).unwrap();
        client.enable_outbound_encryption(&c2s).unwrap();
        client.enable_inbound_encryption(&s2c).unwrap();
    }

    #[tokio::test]
    async fn test_plaintext_round_trip() {
        let (mut server, mut client) = pair();
        client.send_packet(b"\x14hello").await.unwrap();
        assert_eq!(server.read_packet().await.unwrap(), b"\x14hello");
        assert_eq!(client.outbound_sequence(), 1);
        assert_eq!(server.inbound_sequence(), 1);
    }

    #[tokio::test]
    async fn test_plaintext_wire_format() {
        let (mut server, client) = pair();
        server.send_packet(&[21]).await.unwrap();

        let mut raw = client.into_inner();
        let mut frame = [0u8; 16];
        raw.read_exact(&mut frame).await.unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 12]);
        assert_eq!(frame[4], 10);
        assert_eq!(frame[5], 21);
    }

    #[tokio::test]
    async fn test_encrypted_round_trip() {
        let (mut server, mut client) = pair();
        // Sequence numbers carry over from the plaintext phase
        client.send_packet(&[20, 1]).await.unwrap();
        server.read_packet().await.unwrap();
        encrypt_pair(&mut server, &mut client);
        assert!(server.is_encrypted());

        for len in [1usize, 15, 16, 17, 255, 1000, 32000] {
            let mut payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8 + 1).collect();
            payload[0] = 94;
            client.send_packet(&payload).await.unwrap();
            assert_eq!(server.read_packet().await.unwrap(), payload);

            server.send_packet(&payload).await.unwrap();
            assert_eq!(client.read_packet().await.unwrap(), payload);
        }
        assert_eq!(server.inbound_sequence(), 8);
        assert_eq!(server.outbound_sequence(), 7);
    }

    #[tokio::test]
    async fn test_encrypted_wire_format() {
        let (mut server, client) = pair();
        server.enable_outbound_encryption(&keys(0x20)).unwrap();
        server.send_packet(b"\x5eabc").await.unwrap();

        let mut raw = client.into_inner();
        let mut wire = vec![0u8; 16 + 32];
        raw.read_exact(&mut wire).await.unwrap();

        let mut cipher = Aes256Ctr::new(&[0x21; 32], &[0x20; 16]);
        let mut frame = wire[..16].to_vec();
        cipher.apply_keystream(&mut frame);
        assert_eq!(&frame[..4], &[0, 0, 0, 12]);
        assert_eq!(&frame[5..9], b"\x5eabc");

        let mac = HmacSha256::new(&[0x22; 32]);
        assert_eq!(&wire[16..], &mac.packet_tag(0, &frame)[..]);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_is_integrity_failure() {
        let c2s = keys(0x30);
        for position in [0usize, 3, 4, 10, 20, 40] {
            // Capture one encrypted packet
            let (tx, mut rx) = duplex(4096);
            let mut sender = SecureChannel::new(tx);
            sender.enable_outbound_encryption(&c2s).unwrap();
            sender.send_packet(&[94; 20]).await.unwrap();
            let mut wire = vec![0u8; 32 + 32];
            rx.read_exact(&mut wire).await.unwrap();
            wire[position] ^= 0x01;

            let (mut server, client) = pair();
            server.enable_inbound_encryption(&c2s).unwrap();
            let mut raw = client.into_inner();
            raw.write_all(&wire).await.unwrap();

            let result = server.read_packet().await;
            if position < 4 {
                // A corrupted length fails the framing checks
                assert!(
                    matches!(result, Err(SshError::Protocol(_))),
                    "position {}: {:?}",
                    position,
                    result
                );
            } else {
                assert!(
                    matches!(result, Err(SshError::Integrity)),
                    "position {}: {:?}",
                    position,
                    result
                );
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_mac_key_fails() {
        let (mut server, mut client) = pair();
        client.enable_outbound_encryption(&keys(0x40)).unwrap();
        let mut wrong = keys(0x40);
        wrong.mac_key = vec![0; 32];
        server.enable_inbound_encryption(&wrong).unwrap();

        client.send_packet(&[94, 1, 2, 3]).await.unwrap();
        assert!(matches!(
            server.read_packet().await,
            Err(SshError::Integrity)
        ));
    }

    #[tokio::test]
    async fn test_ignore_and_debug_skipped() {
        let (mut server, mut client) = pair();
        client.send_packet(&[2, 0, 0, 0, 0]).await.unwrap();
        client
            .send_packet(b"\x04\x00\x00\x00\x00\x02hi\x00\x00\x00\x00")
            .await
            .unwrap();
        client.send_packet(&[94, 7]).await.unwrap();

        assert_eq!(server.read_packet().await.unwrap(), vec![94, 7]);
        assert_eq!(server.inbound_sequence(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_is_connection_closed() {
        let (mut server, mut client) = pair();
        client.send_disconnect(11, "bye").await.unwrap();
        match server.read_packet().await {
            Err(SshError::ConnectionClosed(msg)) => assert!(msg.contains("bye")),
            other => panic!("Expected ConnectionClosed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let (mut server, client) = pair();
        drop(client);
        assert!(matches!(
            server.read_packet().await,
            Err(SshError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut server, client) = pair();
        let mut raw = client.into_inner();
        raw.write_all(&[0x00, 0x01, 0x00, 0x00, 0x04]).await.unwrap();
        assert!(matches!(
            server.read_packet().await,
            Err(SshError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_configured_limit() {
        let (mut server, mut client) = pair();
        server.set_max_packet_size(64);
        client.send_packet(&[94; 100]).await.unwrap();
        assert!(server.read_packet().await.is_err());
    }

    #[tokio::test]
    async fn test_sequence_wraps() {
        let (mut server, mut client) = pair();
        client.outbound.direction.sequence = u32::MAX;
        server.inbound.direction.sequence = u32::MAX;
        encrypt_pair(&mut server, &mut client);

        client.send_packet(&[94, 1]).await.unwrap();
        client.send_packet(&[94, 2]).await.unwrap();
        assert_eq!(server.read_packet().await.unwrap(), vec![94, 1]);
        assert_eq!(server.read_packet().await.unwrap(), vec![94, 2]);
        assert_eq!(server.inbound_sequence(), 1);
    }

    #[tokio::test]
    async fn test_bad_key_lengths() {
        let (mut server, _client) = pair();
        let mut short = keys(1);
        short.enc_key.truncate(16);
        assert!(server.enable_outbound_encryption(&short).is_err());

        let mut short_iv = keys(1);
        short_iv.iv.truncate(8);
        assert!(server.enable_inbound_encryption(&short_iv).is_err());
    }

    async fn capture(keys: &DirectionKeys, payloads: &[&[u8]]) -> Vec<u8> {
        let (tx, mut rx) = duplex(4096);
        let mut sender = SecureChannel::new(tx);
        sender.enable_outbound_encryption(keys).unwrap();
        for payload in payloads {
            sender.send_packet(payload).await.unwrap();
        }
        drop(sender);
        let mut wire = Vec::new();
        rx.read_to_end(&mut wire).await.unwrap();
        wire
    }

    #[tokio::test]
    async fn test_cancelled_read_resumes_same_packet() {
        let c2s = keys(0x50);
        let wire = capture(&c2s, &[b"\x5efirst".as_slice(), b"\x5esecond".as_slice()]).await;
        assert_eq!(wire.len(), 2 * (16 + 32));

        let (mut server, client) = pair();
        server.enable_inbound_encryption(&c2s).unwrap();
        let mut raw = client.into_inner();

        // Length not yet complete
        raw.write_all(&wire[..3]).await.unwrap();
        let stalled = timeout(Duration::from_millis(50), server.read_packet()).await;
        assert!(stalled.is_err());

        // Length known, frame and tag still partial
        raw.write_all(&wire[3..10]).await.unwrap();
        let stalled = timeout(Duration::from_millis(50), server.read_packet()).await;
        assert!(stalled.is_err());
        assert_eq!(server.inbound_sequence(), 0);

        raw.write_all(&wire[10..]).await.unwrap();
        assert_eq!(server.read_packet().await.unwrap(), b"\x5efirst");
        assert_eq!(server.read_packet().await.unwrap(), b"\x5esecond");
        assert_eq!(server.inbound_sequence(), 2);
    }

    #[tokio::test]
    async fn test_split_halves_run_concurrently() {
        let (mut server, mut client) = pair();
        encrypt_pair(&mut server, &mut client);
        let (mut reader, mut writer) = server.into_split();

        let receive = tokio::spawn(async move {
            let payload = reader.read_packet().await;
            (payload, reader.sequence())
        });

        // The reader is parked on an empty stream while the writer sends
        writer.send_packet(b"\x5eping").await.unwrap();
        assert_eq!(client.read_packet().await.unwrap(), b"\x5eping");

        client.send_packet(b"\x5epong").await.unwrap();
        let (payload, sequence) = receive.await.unwrap();
        assert_eq!(payload.unwrap(), b"\x5epong");
        assert_eq!(sequence, 1);
        assert_eq!(writer.sequence(), 1);
    }

    #[tokio::test]
    async fn test_split_keeps_buffered_bytes() {
        let c2s = keys(0x60);
        let wire = capture(&c2s, &[b"\x5eone".as_slice()]).await;

        let (mut server, client) = pair();
        server.enable_inbound_encryption(&c2s).unwrap();
        let mut raw = client.into_inner();
        raw.write_all(&wire[..20]).await.unwrap();
        let stalled = timeout(Duration::from_millis(50), server.read_packet()).await;
        assert!(stalled.is_err());

        let (mut reader, _writer) = server.into_split();
        raw.write_all(&wire[20..]).await.unwrap();
        assert_eq!(reader.read_packet().await.unwrap(), b"\x5eone");
        assert_eq!(reader.sequence(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_send_fails_later_sends() {
        let (stream, _peer) = duplex(8);
        let mut channel = SecureChannel::new(stream);

        let stalled = timeout(Duration::from_millis(50), channel.send_packet(&[94; 100])).await;
        assert!(stalled.is_err());
        assert!(matches!(
            channel.send_packet(&[94]).await,
            Err(SshError::Protocol(_))
        ));
        assert_eq!(channel.outbound_sequence(), 0);
    }
}
