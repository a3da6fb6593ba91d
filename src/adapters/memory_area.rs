//! Simulated image area and clock.
//!
//! - [`RamArea`] implements [`MemoryAreaPort`] over a RAM buffer with NOR
//!   semantics: erase sets bytes to `0xFF`, programming can only clear
//!   bits.  Erases, writes and external-flash reads stay busy for a
//!   configurable number of polls, or forever after [`RamArea::stick_busy`].
//! - [`SimClock`] implements [`ClockPort`]; every query advances time by a
//!   fixed step so busy-wait loops always terminate.

use core::cell::Cell;

use crate::app::ports::{AreaInfo, ClockPort, MemoryAreaError, MemoryAreaPort};

pub struct RamArea {
    info: AreaInfo,
    data: Vec<u8>,
    /// Polls an operation reports busy before completing.
    latency_polls: u32,
    pending_polls: Cell<u32>,
    stuck: bool,
    present: bool,
    erases: u32,
    writes: u32,
}

impl RamArea {
    pub fn new(info: AreaInfo) -> Self {
        Self {
            info,
            data: vec![0xFF; info.area_size as usize],
            latency_polls: 2,
            pending_polls: Cell::new(0),
            stuck: false,
            present: true,
            erases: 0,
            writes: 0,
        }
    }

    /// Internal-flash geometry with 1 KiB sectors.
    pub fn default_info(area_size: u32) -> AreaInfo {
        AreaInfo {
            area_size,
            write_alignment: 4,
            erase_sector_size: 1024,
            sector_erase_time_us: 90_000,
            byte_write_time_us: 41,
            byte_write_call_time_us: 5,
            external: false,
        }
    }

    /// A missing area fails every request with [`MemoryAreaError::NoArea`].
    pub fn absent() -> Self {
        let mut area = Self::new(Self::default_info(0));
        area.present = false;
        area
    }

    pub fn stick_busy(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    pub fn set_latency(&mut self, polls: u32) {
        self.latency_polls = polls;
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn erase_count(&self) -> u32 {
        self.erases
    }

    pub fn write_count(&self) -> u32 {
        self.writes
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, MemoryAreaError> {
        if !self.present {
            return Err(MemoryAreaError::NoArea);
        }
        if self.pending_polls.get() > 0 {
            return Err(MemoryAreaError::Rejected);
        }
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(MemoryAreaError::Rejected)?;
        if end > self.data.len() {
            return Err(MemoryAreaError::Rejected);
        }
        Ok(start..end)
    }

    fn kick(&self) {
        self.pending_polls.set(self.latency_polls);
    }
}

impl MemoryAreaPort for RamArea {
    fn area_info(&self) -> Result<AreaInfo, MemoryAreaError> {
        if self.present {
            Ok(self.info)
        } else {
            Err(MemoryAreaError::NoArea)
        }
    }

    fn start_erase(&mut self, sector_base: u32, sector_count: u32) -> Result<(), MemoryAreaError> {
        let sector = self.info.erase_sector_size;
        let len = sector_count.saturating_mul(sector) as usize;
        let range = self.range(sector_base.saturating_mul(sector), len)?;
        self.data[range].fill(0xFF);
        self.erases += 1;
        self.kick();
        Ok(())
    }

    fn start_write(&mut self, offset: u32, data: &[u8]) -> Result<(), MemoryAreaError> {
        let range = self.range(offset, data.len())?;
        for (dst, src) in self.data[range].iter_mut().zip(data) {
            *dst &= *src;
        }
        self.writes += 1;
        self.kick();
        Ok(())
    }

    fn start_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), MemoryAreaError> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        // Internal flash is memory mapped; reads complete immediately.
        if self.info.external {
            self.kick();
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        if self.stuck {
            return true;
        }
        let left = self.pending_polls.get();
        if left == 0 {
            return false;
        }
        self.pending_polls.set(left - 1);
        true
    }
}

/// Manually driven microsecond clock.
pub struct SimClock {
    now: Cell<u64>,
    step_us: u64,
}

impl SimClock {
    pub fn new(step_us: u64) -> Self {
        Self {
            now: Cell::new(0),
            step_us,
        }
    }

    pub fn advance(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }
}

impl ClockPort for SimClock {
    fn now_us(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + self.step_us);
        t
    }
}
