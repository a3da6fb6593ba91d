//! Settings record store.
//!
//! Implements [`SettingsPort`] over a single fixed-size record slot.  The
//! record is postcard-encoded into a `RECORD_LEN` buffer, the way it would
//! sit in a dedicated flash page.

use log::info;

use crate::app::ports::{SettingsError, SettingsPort};
use crate::settings::Settings;

/// Size of the on-media record slot.
pub const RECORD_LEN: usize = 32;

pub struct RecordStore {
    slot: Option<[u8; RECORD_LEN]>,
    writes: u32,
    fail_writes: bool,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            slot: None,
            writes: 0,
            fail_writes: false,
        }
    }

    pub fn write_count(&self) -> u32 {
        self.writes
    }

    /// Make every following write fail with an I/O error.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Overwrite the slot with raw bytes.
    pub fn corrupt(&mut self, fill: u8) {
        self.slot = Some([fill; RECORD_LEN]);
    }
}

impl SettingsPort for RecordStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let slot = self.slot.as_ref().ok_or(SettingsError::NotFound)?;
        postcard::from_bytes(slot).map_err(|_| SettingsError::Corrupt)
    }

    fn store(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        if self.fail_writes {
            return Err(SettingsError::IoError);
        }
        let mut buf = [0u8; RECORD_LEN];
        postcard::to_slice(settings, &mut buf).map_err(|_| SettingsError::IoError)?;
        self.slot = Some(buf);
        self.writes += 1;
        info!(
            "Settings: stored (sink={}, update_pending={})",
            settings.is_sink, settings.update_pending
        );
        Ok(())
    }
}
