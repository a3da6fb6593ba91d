//! Persistent node settings.
//!
//! The record is read once at boot and written back only when a field
//! actually changed (role toggle, pending update flag).  A record with a
//! foreign magic is treated as absent.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{NodeRole, SettingsError, SettingsPort};
use crate::config::LinkConfig;

pub const SETTINGS_MAGIC: u16 = 0x2020;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub magic: u16,
    /// Mesh node address.
    pub address: u32,
    pub network_address: u32,
    pub network_channel: u8,
    /// An uploaded image waits to be handed to the update pipeline.
    pub update_pending: bool,
    /// Aggregator role: accepts uploads from the companion app.
    pub is_sink: bool,
}

impl Settings {
    pub fn defaults(unique_id: u32, config: &LinkConfig) -> Self {
        Self {
            magic: SETTINGS_MAGIC,
            address: unique_id,
            network_address: config.default_network_address,
            network_channel: config.default_network_channel,
            update_pending: false,
            is_sink: false,
        }
    }

    /// Stored settings, or defaults when none are usable.
    pub fn load(port: &impl SettingsPort, unique_id: u32, config: &LinkConfig) -> Self {
        match port.load() {
            Ok(s) if s.magic == SETTINGS_MAGIC => s,
            Ok(s) => {
                warn!("Settings: foreign magic 0x{:04X}, using defaults", s.magic);
                Self::defaults(unique_id, config)
            }
            Err(SettingsError::NotFound) => {
                info!("Settings: none stored, using defaults");
                Self::defaults(unique_id, config)
            }
            Err(e) => {
                warn!("Settings: {}, using defaults", e);
                Self::defaults(unique_id, config)
            }
        }
    }

    /// Write the record if it differs from what is stored.
    /// Returns whether a write happened.
    pub fn persist(&self, port: &mut impl SettingsPort) -> Result<bool, SettingsError> {
        if port.load().is_ok_and(|stored| stored == *self) {
            return Ok(false);
        }
        port.store(self)?;
        Ok(true)
    }

    pub fn role(&self) -> NodeRole {
        if self.is_sink {
            NodeRole::Sink
        } else {
            NodeRole::Router
        }
    }
}
