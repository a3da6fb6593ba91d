//! System configuration parameters
//!
//! Timing and radio parameters for the pairing and transfer link, plus the
//! compile-time capacities that size every static buffer in the crate.

use core::fmt;

use serde::{Deserialize, Serialize};

// --- Capacities (fixed at compile time, no heap) ---

/// Pending events per state machine.
pub const EVENT_QUEUE_LEN: usize = 10;
/// Outbound frames waiting for the transmitter.
pub const TX_BACKLOG_LEN: usize = 64;
/// Largest image an upload session can track, in fragments.
pub const MAX_UPLOAD_FRAGMENTS: usize = 4096;
/// First message id of the upload-fragment band.
pub const UPLOAD_START_MESSAGE_ID: u16 = 0x8000;
/// Bluetooth SIG company identifier carried in every beacon.
pub const COMPANY_ID: u16 = 0x09EF;

/// Link timing and radio configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    // --- Event dispatch ---
    /// Delay applied when one module fires an event into another (ms)
    pub event_delay_ms: u32,

    // --- Send task ---
    /// Interval between consecutive beacon payloads (ms)
    pub send_interval_ms: u32,
    /// Hold time after the transmitter is first enabled (ms)
    pub first_send_delay_ms: u32,
    /// Retry interval while a resend request waits for its answer (ms)
    pub qos_retry_ms: u32,
    /// Retry interval after the transmitter refused to start (ms)
    pub tx_enable_retry_ms: u32,
    /// Retry interval after the transmitter refused to stop (ms)
    pub tx_disable_retry_ms: u32,

    // --- Radio ---
    /// Advertising interval while transmitting (ms)
    pub beacon_interval_ms: u32,
    /// Transmit power (dBm)
    pub beacon_power_dbm: i8,

    // --- Upload ---
    /// Progress response every N-th fragment message id
    pub progress_every: u16,

    // --- Node ---
    /// Delay before the reboot task resets the node (ms)
    pub reboot_delay_ms: u32,
    /// Heartbeat task period (ms)
    pub heartbeat_interval_ms: u32,
    /// Firmware version advertised in scan responses
    pub firmware_major: u8,
    pub firmware_minor: u8,
    /// Network parameters used when no settings record exists
    pub default_network_address: u32,
    pub default_network_channel: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            event_delay_ms: 500,

            send_interval_ms: 250,
            first_send_delay_ms: 2000,
            qos_retry_ms: 500,
            tx_enable_retry_ms: 250,
            tx_disable_retry_ms: 500,

            beacon_interval_ms: 100,
            beacon_power_dbm: 8,

            progress_every: 10,

            reboot_delay_ms: 5000,
            heartbeat_interval_ms: 5000,
            firmware_major: 1,
            firmware_minor: 0,
            default_network_address: 0x00AB_CDEF,
            default_network_channel: 2,
        }
    }
}

/// Reasons a serialized configuration blob is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The blob is not valid JSON for [`LinkConfig`].
    Malformed,
    /// A field is outside its usable range.
    OutOfRange(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed configuration"),
            Self::OutOfRange(field) => write!(f, "{field} out of range"),
        }
    }
}

impl LinkConfig {
    /// Parse and validate a JSON configuration blob.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the send task or divide by zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress_every == 0 {
            return Err(ConfigError::OutOfRange("progress_every"));
        }
        if self.send_interval_ms == 0 {
            return Err(ConfigError::OutOfRange("send_interval_ms"));
        }
        if self.qos_retry_ms == 0 {
            return Err(ConfigError::OutOfRange("qos_retry_ms"));
        }
        if self.beacon_interval_ms < 20 {
            return Err(ConfigError::OutOfRange("beacon_interval_ms"));
        }
        Ok(())
    }
}
