//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Node / BeaconLink / OtapStore (domain)
//! ```
//!
//! The radio driver, the raw storage area, the firmware-update pipeline,
//! the mesh stack, the settings store and the cooperative scheduler are all
//! external collaborators.  The domain reaches them only through these
//! traits, injected at call sites, so every module runs on the host against
//! simulated adapters.
//!
//! All port errors are typed and `Copy`.

use core::fmt;

use crate::scheduler::TaskId;
use crate::settings::Settings;

// ───────────────────────────────────────────────────────────────
// Scheduler port (domain → cooperative task scheduler)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// No free task slot.
    NoSlot,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSlot => write!(f, "no free task slot"),
        }
    }
}

/// Runs a task once after a delay.  The task's return value decides
/// whether it is re-armed or dropped (see
/// [`NextRun`](crate::scheduler::NextRun)).
///
/// Scheduling a task that is already pending replaces its due time.
pub trait SchedulerPort {
    fn schedule(&mut self, task: TaskId, delay_ms: u32) -> Result<(), SchedulerError>;
}

// ───────────────────────────────────────────────────────────────
// Radio port (domain ↔ advertising driver)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The transmitter refused to start or stop.
    EnableFailed,
    /// The advertising payload was refused (too long, radio busy).
    ContentRejected,
    /// The scanner could not be started.
    ScannerFailed,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnableFailed => write!(f, "transmitter enable/disable failed"),
            Self::ContentRejected => write!(f, "advertising content rejected"),
            Self::ScannerFailed => write!(f, "scanner start failed"),
        }
    }
}

/// Transmitter parameters applied before each enable.  Beacons always go
/// out on all advertising channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSettings {
    pub interval_ms: u32,
    pub power_dbm: i8,
}

/// Raw advertising driver.  Received packets are delivered by the platform
/// to [`Node::on_beacon_received`](super::service::Node::on_beacon_received)
/// once the receiver has been registered.
pub trait RadioPort {
    /// Route received advertisements to the node from now on.
    fn register_receiver(&mut self, static_address: [u8; 6]);

    fn start_scanner(&mut self) -> Result<(), RadioError>;

    fn stop_scanner(&mut self);

    fn configure_transmit(&mut self, settings: TxSettings);

    fn enable_transmit(&mut self, enable: bool) -> Result<(), RadioError>;

    /// Replace the advertised payload.
    fn set_content(&mut self, payload: &[u8]) -> Result<(), RadioError>;
}

// ───────────────────────────────────────────────────────────────
// Memory area port (domain ↔ raw flash driver)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAreaError {
    /// The dedicated image area does not exist.
    NoArea,
    /// The driver refused the request (bad range, already busy).
    Rejected,
}

impl fmt::Display for MemoryAreaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoArea => write!(f, "image area not present"),
            Self::Rejected => write!(f, "request rejected by driver"),
        }
    }
}

/// Geometry and timing of the dedicated image area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaInfo {
    pub area_size: u32,
    pub write_alignment: u32,
    pub erase_sector_size: u32,
    /// Worst-case erase time per sector (µs).
    pub sector_erase_time_us: u32,
    /// Worst-case programming time per byte (µs).
    pub byte_write_time_us: u32,
    /// Per-byte call overhead of the write primitive (µs).
    pub byte_write_call_time_us: u32,
    /// The area lives on external (SPI) flash.
    pub external: bool,
}

/// Asynchronous flash primitives.  Every `start_*` call only kicks off the
/// operation; completion is observed by polling [`is_busy`](Self::is_busy).
pub trait MemoryAreaPort {
    fn area_info(&self) -> Result<AreaInfo, MemoryAreaError>;

    fn start_erase(&mut self, sector_base: u32, sector_count: u32) -> Result<(), MemoryAreaError>;

    fn start_write(&mut self, offset: u32, data: &[u8]) -> Result<(), MemoryAreaError>;

    fn start_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), MemoryAreaError>;

    fn is_busy(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock port (hardware timestamp for bounded busy-waits)
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Monotonic microseconds since boot.
    fn now_us(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Update pipeline port (domain → stack firmware-update subsystem)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    /// The pipeline refused to open a new image.
    BeginRefused,
    /// A block write was refused.
    WriteRefused,
    /// The image did not pass the pipeline's own checks.
    Invalid,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginRefused => write!(f, "pipeline refused begin"),
            Self::WriteRefused => write!(f, "pipeline refused block"),
            Self::Invalid => write!(f, "image rejected by pipeline"),
        }
    }
}

/// Outcome of a single block written into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockWrite {
    Accepted,
    /// The pipeline has received the whole image.
    Completed,
}

pub trait UpdatePipelinePort {
    fn begin(&mut self, length: u32, sequence: u8) -> Result<(), PipelineError>;

    /// Largest block accepted by [`write`](Self::write).
    fn max_block_size(&self) -> usize;

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<BlockWrite, PipelineError>;

    /// Mark the written image as the update target, to be propagated to
    /// neighbours and applied locally.
    fn set_target_propagate_and_process(&mut self) -> Result<(), PipelineError>;

    fn set_to_be_processed(&mut self) -> Result<(), PipelineError>;
}

// ───────────────────────────────────────────────────────────────
// Mesh stack port
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    ConfigRejected,
    StartFailed,
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigRejected => write!(f, "stack configuration rejected"),
            Self::StartFailed => write!(f, "stack failed to start"),
        }
    }
}

/// Role the node takes in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Aggregator: accepts uploads from the companion app.
    Sink,
    Router,
}

pub trait StackPort {
    fn configure(
        &mut self,
        role: NodeRole,
        node_address: u32,
        network_address: u32,
        network_channel: u8,
    ) -> Result<(), StackError>;

    fn start(&mut self) -> Result<(), StackError>;

    fn is_running(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// System port (identity and reset)
// ───────────────────────────────────────────────────────────────

pub trait SystemPort {
    /// Factory-programmed unique id of this chip.
    fn unique_id(&self) -> u32;

    /// Reset the node.  Returns on simulated platforms only.
    fn reset(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Settings port (domain ↔ persistent settings record)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    /// No record has ever been written.
    NotFound,
    /// Storage returned an error.
    IoError,
    /// The stored bytes do not decode to a record.
    Corrupt,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "settings record not found"),
            Self::IoError => write!(f, "settings storage I/O error"),
            Self::Corrupt => write!(f, "settings record corrupt"),
        }
    }
}

/// Reads and writes the fixed-size settings record.
pub trait SettingsPort {
    fn load(&self) -> Result<Settings, SettingsError>;

    fn store(&mut self, settings: &Settings) -> Result<(), SettingsError>;
}

// ───────────────────────────────────────────────────────────────
// Aggregate
// ───────────────────────────────────────────────────────────────

/// Everything the node service needs from its platform.
pub trait NodePorts:
    SchedulerPort
    + RadioPort
    + MemoryAreaPort
    + ClockPort
    + UpdatePipelinePort
    + StackPort
    + SystemPort
    + SettingsPort
{
}

impl<T> NodePorts for T where
    T: SchedulerPort
        + RadioPort
        + MemoryAreaPort
        + ClockPort
        + UpdatePipelinePort
        + StackPort
        + SystemPort
        + SettingsPort
{
}
