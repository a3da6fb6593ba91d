//! Advertising envelope around protocol frames.
//!
//! Receive side: the radio hands over `[advertiser address (6)][AD data]`.
//! Two phone encodings are recognised, everything else is ignored before
//! any parsing happens.
//!
//! ```text
//!  Android (manufacturer data)
//!   0      6   7    8      10
//!   ┌──────┬───┬────┬──────┬────────────────┐
//!   │ addr │ L │ FF │ EF 09│ frame ...      │
//!   └──────┴───┴────┴──────┴────────────────┘
//!
//!  iOS (128-bit service UUID list, 30 bytes total)
//!   0      6        13   14                 30
//!   ┌──────┬────────┬────┬──────────────────┐
//!   │ addr │ flags  │ 07 │ uuid (reversed)  │ ─▶ 16 frame bytes
//!   └──────┴────────┴────┴──────────────────┘
//! ```
//!
//! Transmit side: every frame is wrapped in an 11-byte header carrying the
//! node's static address and the company identifier.

use heapless::Vec;

use super::frame::MAX_FRAME_LEN;
use crate::config::COMPANY_ID;

const AD_TYPE_MANUFACTURER: u8 = 0xFF;
const AD_TYPE_UUID128_COMPLETE: u8 = 0x07;
/// Non-connectable undirected advertising PDU.
const PDU_TYPE: u8 = 0x42;

const ANDROID_PREFIX_LEN: usize = 10;
const IOS_PACKET_LEN: usize = 30;
const IOS_UUID_TYPE_OFFSET: usize = 13;
const IOS_FRAME_LEN: usize = IOS_PACKET_LEN - 14;

pub const TX_HEADER_LEN: usize = 11;
pub const MAX_BEACON_LEN: usize = TX_HEADER_LEN + MAX_FRAME_LEN;

/// Largest frame candidate handed to the codec.  Oversized candidates are
/// kept so the codec can reject them.
pub const MAX_RX_FRAME_LEN: usize = 40;

pub type RxFrame = Vec<u8, MAX_RX_FRAME_LEN>;
pub type BeaconBuf = Vec<u8, MAX_BEACON_LEN>;

/// Extract the protocol frame from a received advertisement.
pub fn extract_frame(packet: &[u8]) -> Option<RxFrame> {
    let company = COMPANY_ID.to_le_bytes();

    if packet.len() > ANDROID_PREFIX_LEN
        && packet[7] == AD_TYPE_MANUFACTURER
        && packet[8..10] == company
    {
        return Vec::from_slice(&packet[ANDROID_PREFIX_LEN..]).ok();
    }

    if packet.len() == IOS_PACKET_LEN && packet[IOS_UUID_TYPE_OFFSET] == AD_TYPE_UUID128_COMPLETE {
        return Some(packet.iter().rev().take(IOS_FRAME_LEN).copied().collect());
    }

    None
}

/// Wrap an encoded frame into the advertising payload.
pub fn wrap_frame(address: &[u8; 6], frame: &[u8]) -> Option<BeaconBuf> {
    if frame.len() > MAX_FRAME_LEN {
        return None;
    }
    let mut out = BeaconBuf::new();
    out.push(PDU_TYPE).ok()?;
    out.extend_from_slice(address).ok()?;
    // AD length counts the type byte and the company id.
    out.push(frame.len() as u8 + 3).ok()?;
    out.push(AD_TYPE_MANUFACTURER).ok()?;
    out.extend_from_slice(&COMPANY_ID.to_le_bytes()).ok()?;
    out.extend_from_slice(frame).ok()?;
    Some(out)
}

/// Static random address derived from the chip's unique id.
pub fn static_address(unique_id: u32) -> [u8; 6] {
    let id = unique_id.to_le_bytes();
    [0x13, id[0], id[1], id[2], id[3], 0x14]
}

/// Connection token handed to the phone in a scan response.
pub fn connection_token(unique_id: u32) -> u16 {
    (unique_id & 0xFFFF) as u16
}
