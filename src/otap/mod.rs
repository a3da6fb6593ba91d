//! Flash persistence for uploaded images.
//!
//! Flow: init → begin_buffer (erase) → N × write → end_buffer (header)
//! → reboot → process (stream into the update pipeline)
//!
//! Every flash primitive is asynchronous at the driver level; this layer
//! turns it into a bounded blocking call by polling the driver's busy flag
//! against a deadline computed from the area's worst-case timings.

pub mod header;

use core::fmt;

use log::{error, info, warn};

use crate::app::ports::{
    AreaInfo, BlockWrite, ClockPort, MemoryAreaError, MemoryAreaPort, PipelineError, StackPort,
    UpdatePipelinePort,
};
use crate::precondition;
pub use header::{HEADER_FIELDS_LEN, IMAGE_MAGIC, ImageHeader, MIN_IMAGE_LEN};

/// Streaming block size towards the update pipeline.
pub const BLOCK_SIZE: usize = 512;

/// Reads on external flash may wait this long; internal reads poll once.
const EXTERNAL_READ_TIMEOUT_US: u64 = 100_000;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistError {
    /// No usable image area.
    NoArea,
    /// `init` has not succeeded yet.
    Uninitialized,
    /// The driver rejected a request or a write did not finish in time.
    FlashError,
    /// An erase or read did not finish in time.
    AccessTimeout,
    /// Data would not fit the usable area.
    TooBig,
    InvalidMagic,
    InvalidLength(u32),
    /// Applying an image requires the mesh stack to be stopped.
    StackRunning,
    Pipeline(PipelineError),
}

impl PersistError {
    /// Result code sent to the phone in upload responses.
    pub fn code(&self) -> u8 {
        match self {
            Self::NoArea => 0x10,
            Self::Uninitialized => 0x11,
            Self::FlashError => 0x12,
            Self::AccessTimeout => 0x13,
            Self::TooBig => 0x14,
            Self::InvalidMagic => 0x15,
            Self::InvalidLength(_) => 0x16,
            Self::StackRunning => 0x17,
            Self::Pipeline(_) => 0x18,
        }
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoArea => write!(f, "image area unavailable"),
            Self::Uninitialized => write!(f, "persistence not initialized"),
            Self::FlashError => write!(f, "flash operation failed"),
            Self::AccessTimeout => write!(f, "storage access timed out"),
            Self::TooBig => write!(f, "data exceeds usable area"),
            Self::InvalidMagic => write!(f, "image header magic mismatch"),
            Self::InvalidLength(len) => write!(f, "invalid image length {len}"),
            Self::StackRunning => write!(f, "stack still running"),
            Self::Pipeline(e) => write!(f, "update pipeline: {e}"),
        }
    }
}

impl From<PipelineError> for PersistError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<MemoryAreaError> for PersistError {
    fn from(e: MemoryAreaError) -> Self {
        match e {
            MemoryAreaError::NoArea => Self::NoArea,
            MemoryAreaError::Rejected => Self::FlashError,
        }
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Geometry {
    info: AreaInfo,
    header_size: u32,
    /// Whole erase sectors inside the area.
    sectors: u32,
    usable: u32,
}

/// Image buffer on the dedicated storage area.
pub struct OtapStore {
    geometry: Option<Geometry>,
    block: [u8; BLOCK_SIZE],
}

impl Default for OtapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OtapStore {
    pub fn new() -> Self {
        Self {
            geometry: None,
            block: [0; BLOCK_SIZE],
        }
    }

    /// Query the area geometry.  Later calls are no-ops.
    pub fn init(&mut self, area: &impl MemoryAreaPort) -> Result<(), PersistError> {
        if self.geometry.is_some() {
            return Ok(());
        }
        let info = area.area_info()?;
        let header_size = info.write_alignment.max(HEADER_FIELDS_LEN as u32);
        // A trailing partial sector cannot be erased, so it is never used.
        let sector_size = info.erase_sector_size.max(1);
        let sectors = info.area_size / sector_size;
        let erasable = sectors * sector_size;
        if header_size as usize > BLOCK_SIZE || erasable <= header_size {
            error!(
                "OTAP: unusable area (size {}, sector {}, alignment {})",
                info.area_size, info.erase_sector_size, info.write_alignment
            );
            return Err(PersistError::NoArea);
        }
        let usable = erasable - header_size;
        info!("OTAP: header {} B, usable {} B", header_size, usable);
        self.geometry = Some(Geometry {
            info,
            header_size,
            sectors,
            usable,
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn header_size(&self) -> Option<u32> {
        self.geometry.map(|g| g.header_size)
    }

    pub fn usable_size(&self) -> Option<u32> {
        self.geometry.map(|g| g.usable)
    }

    /// Check that an image of `length` bytes fits the usable area.
    pub fn reserve(&self, length: u32) -> Result<(), PersistError> {
        let g = self.geometry()?;
        if length > g.usable {
            warn!("OTAP: image of {} B exceeds {} B", length, g.usable);
            return Err(PersistError::TooBig);
        }
        Ok(())
    }

    /// Erase the whole sectors holding the header and usable area.
    pub fn begin_buffer(
        &mut self,
        hw: &mut (impl MemoryAreaPort + ClockPort),
    ) -> Result<(), PersistError> {
        let g = self.geometry()?;
        let sectors = g.sectors;
        hw.start_erase(0, sectors)?;

        let timeout_us = u64::from(g.info.sector_erase_time_us) * u64::from(sectors) * 2;
        if !wait_idle(&*hw, timeout_us) {
            error!("OTAP: erase of {} sectors timed out", sectors);
            return Err(PersistError::AccessTimeout);
        }
        Ok(())
    }

    /// Write image bytes at `offset` (relative to the payload start).
    pub fn write(
        &mut self,
        hw: &mut (impl MemoryAreaPort + ClockPort),
        offset: u32,
        data: &[u8],
    ) -> Result<(), PersistError> {
        let g = self.geometry()?;
        let len = data.len() as u32;
        if len > g.usable || offset > g.usable - len {
            return Err(PersistError::TooBig);
        }
        hw.start_write(g.header_size + offset, data)?;

        let per_byte = u64::from(g.info.byte_write_time_us + g.info.byte_write_call_time_us);
        if !wait_idle(&*hw, per_byte * u64::from(len) * 2) {
            error!("OTAP: write of {} B at {} timed out", len, offset);
            return Err(PersistError::FlashError);
        }
        Ok(())
    }

    /// Seal the image by writing its header.
    pub fn end_buffer(
        &mut self,
        hw: &mut (impl MemoryAreaPort + ClockPort),
        length: u32,
        sequence: u8,
    ) -> Result<(), PersistError> {
        let g = self.geometry()?;
        let header = &mut self.block[..g.header_size as usize];
        ImageHeader { length, sequence }.write_to(header);
        hw.start_write(0, header)?;

        let per_byte = u64::from(g.info.byte_write_time_us + g.info.byte_write_call_time_us);
        if !wait_idle(&*hw, per_byte * u64::from(g.header_size) * 2) {
            error!("OTAP: header write timed out");
            return Err(PersistError::FlashError);
        }
        info!("OTAP: image sealed ({} B, seq {})", length, sequence);
        Ok(())
    }

    /// Read and validate the stored header.
    pub fn read_header(
        &mut self,
        hw: &mut (impl MemoryAreaPort + ClockPort),
    ) -> Result<ImageHeader, PersistError> {
        let g = self.geometry()?;
        let n = g.header_size as usize;
        read_raw(hw, &g, 0, &mut self.block[..n])?;
        let header = ImageHeader::parse(&self.block[..n])?;
        if header.length > g.usable {
            return Err(PersistError::InvalidLength(header.length));
        }
        Ok(header)
    }

    /// Read image bytes at `offset` (relative to the payload start).
    pub fn read(
        &mut self,
        hw: &mut (impl MemoryAreaPort + ClockPort),
        offset: u32,
        buf: &mut [u8],
    ) -> Result<(), PersistError> {
        let g = self.geometry()?;
        let len = buf.len() as u32;
        if len > g.usable || offset > g.usable - len {
            return Err(PersistError::TooBig);
        }
        read_raw(hw, &g, g.header_size + offset, buf)
    }

    /// Hand the stored image to the update pipeline.
    ///
    /// Requires the mesh stack to be stopped.
    pub fn process(
        &mut self,
        hw: &mut (impl MemoryAreaPort + ClockPort + StackPort + UpdatePipelinePort),
    ) -> Result<(), PersistError> {
        let g = self.geometry()?;
        let header = self.read_header(hw)?;
        if !precondition!(!hw.is_running(), "image apply while stack running") {
            return Err(PersistError::StackRunning);
        }

        hw.begin(header.length, header.sequence)?;
        let block = BLOCK_SIZE.min(hw.max_block_size());
        if block == 0 {
            return Err(PersistError::Pipeline(PipelineError::WriteRefused));
        }
        info!(
            "OTAP: processing {} B (seq {}) in {} B blocks",
            header.length, header.sequence, block
        );

        let mut offset = 0u32;
        while offset < header.length {
            let n = block.min((header.length - offset) as usize);
            read_raw(hw, &g, g.header_size + offset, &mut self.block[..n])?;
            let last = offset + n as u32 == header.length;
            match hw.write(offset, &self.block[..n])? {
                BlockWrite::Completed if !last => {
                    warn!("OTAP: pipeline complete early at {}", offset);
                }
                BlockWrite::Accepted if last => {
                    warn!("OTAP: pipeline did not report completion");
                }
                _ => {}
            }
            offset += n as u32;
        }

        hw.set_target_propagate_and_process()?;
        hw.set_to_be_processed()?;
        info!("OTAP: image handed to update pipeline");
        Ok(())
    }

    fn geometry(&self) -> Result<Geometry, PersistError> {
        self.geometry.ok_or(PersistError::Uninitialized)
    }
}

fn read_raw(
    hw: &mut (impl MemoryAreaPort + ClockPort),
    g: &Geometry,
    area_offset: u32,
    buf: &mut [u8],
) -> Result<(), PersistError> {
    hw.start_read(area_offset, buf)?;
    let timeout_us = if g.info.external {
        EXTERNAL_READ_TIMEOUT_US
    } else {
        0
    };
    if !wait_idle(&*hw, timeout_us) {
        return Err(PersistError::AccessTimeout);
    }
    Ok(())
}

/// Poll the busy flag until it clears or `timeout_us` elapses.
fn wait_idle(hw: &(impl MemoryAreaPort + ClockPort), timeout_us: u64) -> bool {
    let deadline = hw.now_us().saturating_add(timeout_us);
    loop {
        if !hw.is_busy() {
            return true;
        }
        if hw.now_us() >= deadline {
            return false;
        }
        core::hint::spin_loop();
    }
}
