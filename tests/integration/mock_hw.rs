//! Mock platform for integration tests.
//!
//! Implements every port the node needs.  Flash, clock, settings and the
//! scheduler use the crate's host adapters; radio, mesh stack, update
//! pipeline and system reset are recorders so tests can assert on the
//! full call history.

use beacon_otap::adapters::memory_area::{RamArea, SimClock};
use beacon_otap::adapters::settings_store::RecordStore;
use beacon_otap::app::ports::{
    AreaInfo, BlockWrite, ClockPort, MemoryAreaError, MemoryAreaPort, NodeRole, PipelineError,
    RadioError, RadioPort, SchedulerError, SchedulerPort, SettingsError, SettingsPort, StackError,
    StackPort, SystemPort, TxSettings, UpdatePipelinePort,
};
use beacon_otap::app::service::Node;
use beacon_otap::config::{COMPANY_ID, LinkConfig};
use beacon_otap::link::beacon::TX_HEADER_LEN;
use beacon_otap::link::frame::{Frame, Message};
use beacon_otap::scheduler::{CooperativeScheduler, TaskId};
use beacon_otap::settings::Settings;

pub const UNIQUE_ID: u32 = 0x1234_5678;
pub const AREA_SIZE: u32 = 8192;

// ── Radio recorder ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RadioCall {
    RegisterReceiver([u8; 6]),
    StartScanner,
    StopScanner,
    Configure(TxSettings),
    Enable(bool),
    Content(Vec<u8>),
}

// ── Update pipeline recorder ──────────────────────────────────

#[derive(Debug, Default)]
pub struct Pipeline {
    pub begun: Option<(u32, u8)>,
    pub image: Vec<u8>,
    pub blocks: usize,
    pub max_block: usize,
    pub targeted: bool,
    pub to_be_processed: bool,
}

// ── MockPlatform ──────────────────────────────────────────────

pub struct MockPlatform {
    pub sched: CooperativeScheduler,
    pub area: RamArea,
    pub clock: SimClock,
    pub settings: RecordStore,
    pub radio: Vec<RadioCall>,
    pub refuse_enable: bool,
    pub pipeline: Pipeline,
    pub stack_running: bool,
    pub stack_config: Option<(NodeRole, u32, u32, u8)>,
    pub resets: u32,
}

#[allow(dead_code)]
impl MockPlatform {
    pub fn new() -> Self {
        let mut area = RamArea::new(RamArea::default_info(AREA_SIZE));
        area.set_latency(1);
        Self {
            sched: CooperativeScheduler::new(),
            area,
            clock: SimClock::new(1),
            settings: RecordStore::new(),
            radio: Vec::new(),
            refuse_enable: false,
            pipeline: Pipeline {
                max_block: 256,
                ..Pipeline::default()
            },
            stack_running: false,
            stack_config: None,
            resets: 0,
        }
    }

    /// Platform whose settings record makes the node a sink.
    pub fn sink() -> Self {
        let mut hw = Self::new();
        let settings = Settings {
            is_sink: true,
            ..Settings::defaults(UNIQUE_ID, &LinkConfig::default())
        };
        hw.settings.store(&settings).unwrap();
        hw
    }

    /// Simulate a reset: volatile state is lost, flash and settings survive.
    pub fn power_cycle(&mut self) {
        self.sched = CooperativeScheduler::new();
        self.radio.clear();
        self.stack_running = false;
        self.stack_config = None;
    }

    /// Run every task that comes due within the next `ms` milliseconds.
    pub fn run_for(&mut self, node: &mut Node, ms: u64) {
        let deadline = self.sched.now_ms() + ms;
        while let Some(task) = self.sched.take_due_until(deadline) {
            let next = node.run_task(task, self);
            self.sched.complete(task, next);
        }
    }

    /// Run until `task` has executed once more (bounded by `max_ms`).
    pub fn run_until(&mut self, node: &mut Node, task: TaskId, max_ms: u64) -> bool {
        let deadline = self.sched.now_ms() + max_ms;
        while let Some(t) = self.sched.take_due_until(deadline) {
            let next = node.run_task(t, self);
            self.sched.complete(t, next);
            if t == task {
                return true;
            }
        }
        false
    }

    /// Frames put on air so far, decoded.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.radio
            .iter()
            .filter_map(|c| match c {
                RadioCall::Content(bytes) => Frame::decode(&bytes[TX_HEADER_LEN..]).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent_frames().into_iter().map(|f| f.message).collect()
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.radio.iter().filter(|c| *c == call).count()
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// Android-style advertisement carrying `frame`.
pub fn android_packet(frame: &Frame) -> Vec<u8> {
    let bytes = frame.encode().unwrap();
    let mut p = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, bytes.len() as u8 + 3, 0xFF];
    p.extend_from_slice(&COMPANY_ID.to_le_bytes());
    p.extend_from_slice(&bytes);
    p
}

// ── Port impls ────────────────────────────────────────────────

impl SchedulerPort for MockPlatform {
    fn schedule(&mut self, task: TaskId, delay_ms: u32) -> Result<(), SchedulerError> {
        self.sched.schedule(task, delay_ms)
    }
}

impl RadioPort for MockPlatform {
    fn register_receiver(&mut self, static_address: [u8; 6]) {
        self.radio.push(RadioCall::RegisterReceiver(static_address));
    }

    fn start_scanner(&mut self) -> Result<(), RadioError> {
        self.radio.push(RadioCall::StartScanner);
        Ok(())
    }

    fn stop_scanner(&mut self) {
        self.radio.push(RadioCall::StopScanner);
    }

    fn configure_transmit(&mut self, settings: TxSettings) {
        self.radio.push(RadioCall::Configure(settings));
    }

    fn enable_transmit(&mut self, enable: bool) -> Result<(), RadioError> {
        if self.refuse_enable {
            return Err(RadioError::EnableFailed);
        }
        self.radio.push(RadioCall::Enable(enable));
        Ok(())
    }

    fn set_content(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        self.radio.push(RadioCall::Content(payload.to_vec()));
        Ok(())
    }
}

impl MemoryAreaPort for MockPlatform {
    fn area_info(&self) -> Result<AreaInfo, MemoryAreaError> {
        self.area.area_info()
    }

    fn start_erase(&mut self, sector_base: u32, sector_count: u32) -> Result<(), MemoryAreaError> {
        self.area.start_erase(sector_base, sector_count)
    }

    fn start_write(&mut self, offset: u32, data: &[u8]) -> Result<(), MemoryAreaError> {
        self.area.start_write(offset, data)
    }

    fn start_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), MemoryAreaError> {
        self.area.start_read(offset, buf)
    }

    fn is_busy(&self) -> bool {
        self.area.is_busy()
    }
}

impl ClockPort for MockPlatform {
    fn now_us(&self) -> u64 {
        self.clock.now_us()
    }
}

impl UpdatePipelinePort for MockPlatform {
    fn begin(&mut self, length: u32, sequence: u8) -> Result<(), PipelineError> {
        self.pipeline.begun = Some((length, sequence));
        self.pipeline.image.clear();
        Ok(())
    }

    fn max_block_size(&self) -> usize {
        self.pipeline.max_block
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<BlockWrite, PipelineError> {
        let (length, _) = self.pipeline.begun.ok_or(PipelineError::WriteRefused)?;
        if offset as usize != self.pipeline.image.len() {
            return Err(PipelineError::WriteRefused);
        }
        self.pipeline.image.extend_from_slice(bytes);
        self.pipeline.blocks += 1;
        if self.pipeline.image.len() == length as usize {
            Ok(BlockWrite::Completed)
        } else {
            Ok(BlockWrite::Accepted)
        }
    }

    fn set_target_propagate_and_process(&mut self) -> Result<(), PipelineError> {
        self.pipeline.targeted = true;
        Ok(())
    }

    fn set_to_be_processed(&mut self) -> Result<(), PipelineError> {
        self.pipeline.to_be_processed = true;
        Ok(())
    }
}

impl StackPort for MockPlatform {
    fn configure(
        &mut self,
        role: NodeRole,
        node_address: u32,
        network_address: u32,
        network_channel: u8,
    ) -> Result<(), StackError> {
        self.stack_config = Some((role, node_address, network_address, network_channel));
        Ok(())
    }

    fn start(&mut self) -> Result<(), StackError> {
        self.stack_running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stack_running
    }
}

impl SystemPort for MockPlatform {
    fn unique_id(&self) -> u32 {
        UNIQUE_ID
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

impl SettingsPort for MockPlatform {
    fn load(&self) -> Result<Settings, SettingsError> {
        self.settings.load()
    }

    fn store(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        self.settings.store(settings)
    }
}
