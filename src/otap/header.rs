//! Image header record stored at offset 0 of the image area.
//!
//! ```text
//!   0        4        8     9            header_size
//!   ┌────────┬────────┬─────┬────────────┐
//!   │ magic  │ length │ seq │ zero pad   │  payload ...
//!   │ u32 LE │ u32 LE │ u8  │            │
//!   └────────┴────────┴─────┴────────────┘
//! ```
//!
//! The header is written after the payload, so an interrupted upload
//! leaves an erased (invalid) magic behind.

use super::PersistError;

pub const IMAGE_MAGIC: u32 = 0x2021;
/// Smallest image the update pipeline accepts.
pub const MIN_IMAGE_LEN: u32 = 96;
/// Three 32-bit fields; the on-media header is at least this long.
pub const HEADER_FIELDS_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub length: u32,
    pub sequence: u8,
}

impl ImageHeader {
    /// Serialize into `out`, zero-filling everything after the fields.
    pub fn write_to(&self, out: &mut [u8]) {
        out.fill(0);
        if out.len() < HEADER_FIELDS_LEN {
            return;
        }
        out[0..4].copy_from_slice(&IMAGE_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out[8] = self.sequence;
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, PersistError> {
        let Some(fields) = bytes.first_chunk::<HEADER_FIELDS_LEN>() else {
            return Err(PersistError::InvalidMagic);
        };
        let magic = u32::from_le_bytes([fields[0], fields[1], fields[2], fields[3]]);
        if magic != IMAGE_MAGIC {
            return Err(PersistError::InvalidMagic);
        }
        let header = Self {
            length: u32::from_le_bytes([fields[4], fields[5], fields[6], fields[7]]),
            sequence: fields[8],
        };
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<(), PersistError> {
        if self.length == 0 || self.length % 4 != 0 || self.length < MIN_IMAGE_LEN {
            return Err(PersistError::InvalidLength(self.length));
        }
        Ok(())
    }
}
