//! Fuzz target for SSH packet and message parsing.
//!
//! Looks for panics in the binary packet parser and the transport
//! message decoders.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run ssh_packet -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use rkvm_proto::ssh::kex::KexInit;
use rkvm_proto::ssh::kex_dh::{KexdhInit, KexdhReply};
use rkvm_proto::ssh::message::Disconnect;
use rkvm_proto::ssh::Packet;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = Packet::from_bytes(data) {
        let serialized = packet.to_bytes();
        let reparsed = Packet::from_bytes(&serialized).expect("Round-trip parsing should never fail");
        assert_eq!(packet.payload(), reparsed.payload());
    }

    let _ = Packet::from_body(data);
    let _ = KexInit::from_bytes(data);
    let _ = KexdhInit::from_bytes(data);
    let _ = KexdhReply::from_bytes(data);
    let _ = Disconnect::from_bytes(data);
});
