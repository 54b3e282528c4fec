//! Handshake Server Example
//!
//! This example demonstrates how to:
//! - Load an RSA host key and bind the server
//! - Accept client connections, one tokio task each
//! - Run the transport handshake and relay payloads on the encrypted channel
//!
//! Usage:
//!   cargo run --example handshake_server [bind_address] [host_key.pem]
//!
//! Example:
//!   openssl genrsa -traditional -out host_rsa.pem 2048
//!   RUST_LOG=rkvm_proto=debug cargo run --example handshake_server 0.0.0.0:7777 host_rsa.pem
//!
//! Then connect with OpenSSH to watch the key exchange:
//!   ssh -vvv -p 7777 -o KexAlgorithms=diffie-hellman-group14-sha256 \
//!       -o HostKeyAlgorithms=rsa-sha2-256 -o Ciphers=aes256-ctr \
//!       -o MACs=hmac-sha2-256 user@127.0.0.1

use rkvm_platform::REASON_BY_APPLICATION;
use rkvm_proto::ssh::message::MessageType;
use rkvm_proto::ssh::server::{SshServer, SshServerConfig};
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let bind_addr = args.get(1).cloned().unwrap_or_else(|| "0.0.0.0:7777".to_string());
    let host_key_path = args.get(2).cloned().unwrap_or_else(|| "host_rsa.pem".to_string());

    let config = SshServerConfig {
        host_key_path: host_key_path.into(),
        handshake_timeout: Some(Duration::from_secs(30)),
        ..Default::default()
    };

    let server = SshServer::bind(&bind_addr, config).await?;
    println!("=== RemoteKVM SSH transport ===");
    println!("Listening on {}", server.local_addr()?);

    loop {
        let mut session = match server.accept().await {
            Ok(session) => session,
            Err(e) => {
                eprintln!("accept failed: {}", e);
                continue;
            }
        };

        tokio::spawn(async move {
            if let Err(e) = session.perform_handshake().await {
                eprintln!("[{}] handshake failed: {}", session.peer_addr(), e);
                return;
            }
            println!(
                "[{}] encrypted, session id {}",
                session.peer_addr(),
                hex::encode(session.session_id().unwrap_or_default())
            );

            // No upper layers here: refuse service requests, echo anything else
            loop {
                let payload = match session.read_packet().await {
                    Ok(payload) => payload,
                    Err(e) => {
                        println!("[{}] closed: {}", session.peer_addr(), e);
                        return;
                    }
                };

                if payload[0] == MessageType::ServiceRequest as u8 {
                    let _ = session
                        .send_disconnect(REASON_BY_APPLICATION, "no services available")
                        .await;
                    return;
                }
                if session.send_packet(&payload).await.is_err() {
                    return;
                }
            }
        });
    }
}
