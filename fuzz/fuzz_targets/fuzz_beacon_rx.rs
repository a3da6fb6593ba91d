//! Fuzz target: receive path up to the protocol handlers
//!
//! Splits the input into advertisements and runs each through envelope
//! extraction, duplicate suppression and frame decoding.  Decoded upload
//! fragments are fed into a live session.  Nothing may panic, and every
//! decoded frame must survive a re-encode.
//!
//! cargo fuzz run fuzz_beacon_rx

#![no_main]

use beacon_otap::link::beacon::extract_frame;
use beacon_otap::link::dedup::{Admission, Deduplicator};
use beacon_otap::link::frame::{Frame, Message};
use beacon_otap::link::upload::UploadSession;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut dedup = Deduplicator::new();
    let mut session = UploadSession::new();
    let _ = session.begin(4096, 1, 24);

    // First byte of each chunk is its length.
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let n = usize::from(len).min(tail.len());
        let (packet, next) = tail.split_at(n);
        rest = next;

        let Some(bytes) = extract_frame(packet) else { continue };
        if !matches!(dedup.admit(&bytes), Admission::Accepted { .. }) {
            continue;
        }
        let Ok(frame) = Frame::decode(&bytes) else { continue };

        let encoded = frame.encode().expect("decoded frame must re-encode");
        assert_eq!(Frame::decode(&encoded).as_ref(), Ok(&frame));

        if let Message::UploadRequest { .. } = frame.message {
            if let Some(index) = session.fragment_index(frame.message_id) {
                session.mark_received(index);
                assert!(session.percentage(index) <= 100);
            }
        }
    }
});
