//! Link (pairing & transfer) state machine.
//!
//! ```text
//!   Boot ──Init──▶ Idle ──ScanningStart [sink]──▶ Scanning
//!
//!   Scanning ──ConnectingStart──▶ Connecting ──Connected──▶ Connected
//!   Connected ──ConnectingStart──▶ Connecting
//! ```
//!
//! Entering `Scanning` arms a scanner stop as exit action.  The protocol is
//! connectionless, so the scanner stays on through `Connecting` and
//! `Connected`: each of those rows cancels the stop and re-arms it.
//! Protocol commands are handled in the receive path, not as machine
//! events.  Actions post [`RadioCommands`]; the link controller applies
//! them after dispatch.

use crate::config::EVENT_QUEUE_LEN;
use crate::fsm::{NextState, StateFilter, StateMachine, Transition};
use crate::precondition;
use crate::scheduler::TaskId;

use super::beacon::static_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Boot,
    Idle,
    Scanning,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Init,
    ScanningStart,
    /// A scan request was answered.
    ConnectingStart,
    /// The paired phone opened an upload.
    Connected,
}

/// Radio side effects requested by link actions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RadioCommands {
    pub register_receiver: bool,
    /// `Some(true)` start scanning, `Some(false)` stop.
    pub scanner: Option<bool>,
}

#[derive(Debug)]
pub struct LinkContext {
    initialized: bool,
    is_sink: bool,
    unique_id: u32,
    address: [u8; 6],
    pub commands: RadioCommands,
}

impl LinkContext {
    pub fn new(unique_id: u32, is_sink: bool) -> Self {
        Self {
            initialized: false,
            is_sink,
            unique_id,
            address: [0; 6],
            commands: RadioCommands::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_sink(&self) -> bool {
        self.is_sink
    }

    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    /// Static advertising address, valid once initialized.
    pub fn address(&self) -> [u8; 6] {
        self.address
    }

    pub fn take_commands(&mut self) -> RadioCommands {
        core::mem::take(&mut self.commands)
    }
}

fn initialize(ctx: &mut LinkContext) {
    if !precondition!(!ctx.initialized, "link initialized twice") {
        return;
    }
    ctx.address = static_address(ctx.unique_id);
    ctx.commands.register_receiver = true;
    ctx.initialized = true;
}

fn is_sink(ctx: &LinkContext) -> bool {
    ctx.is_sink
}

fn scanning_start(ctx: &mut LinkContext) {
    ctx.commands.scanner = Some(true);
}

fn scanning_stop(ctx: &mut LinkContext) {
    ctx.commands.scanner = Some(false);
}

/// Runs after the armed `scanning_stop`; the receiver must stay up.
fn keep_scanning(ctx: &mut LinkContext) {
    ctx.commands.scanner = None;
}

pub static LINK_TABLE: [Transition<LinkState, LinkEvent, LinkContext>; 5] = [
    Transition {
        state: StateFilter::Is(LinkState::Boot),
        event: LinkEvent::Init,
        guard: None,
        next: NextState::To(LinkState::Idle),
        on_entry: Some(initialize),
        on_exit: None,
    },
    Transition {
        state: StateFilter::Is(LinkState::Idle),
        event: LinkEvent::ScanningStart,
        guard: Some(is_sink),
        next: NextState::To(LinkState::Scanning),
        on_entry: Some(scanning_start),
        on_exit: Some(scanning_stop),
    },
    Transition {
        state: StateFilter::Is(LinkState::Scanning),
        event: LinkEvent::ConnectingStart,
        guard: None,
        next: NextState::To(LinkState::Connecting),
        on_entry: Some(keep_scanning),
        on_exit: Some(scanning_stop),
    },
    Transition {
        state: StateFilter::Is(LinkState::Connecting),
        event: LinkEvent::Connected,
        guard: None,
        next: NextState::To(LinkState::Connected),
        on_entry: Some(keep_scanning),
        on_exit: Some(scanning_stop),
    },
    Transition {
        state: StateFilter::Is(LinkState::Connected),
        event: LinkEvent::ConnectingStart,
        guard: None,
        next: NextState::To(LinkState::Connecting),
        on_entry: Some(keep_scanning),
        on_exit: Some(scanning_stop),
    },
];

pub type LinkMachine = StateMachine<LinkState, LinkEvent, LinkContext, EVENT_QUEUE_LEN>;

pub fn link_machine() -> LinkMachine {
    StateMachine::new("link", LinkState::Boot, &LINK_TABLE, TaskId::LinkDispatch)
}
