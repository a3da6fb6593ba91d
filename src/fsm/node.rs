//! Node (top-level) state machine.
//!
//! ```text
//!   Boot ──Init──▶ Idle
//!   (any) ──Reboot──▶ (same)      schedules the reboot task
//! ```
//!
//! Actions do not touch hardware.  They post [`NodeRequests`] on the
//! context; the node service applies them through its ports right after
//! the dispatch returns.

use super::{NextState, StateFilter, StateMachine, Transition};
use crate::config::EVENT_QUEUE_LEN;
use crate::precondition;
use crate::scheduler::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Boot,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    Init,
    Reboot,
}

/// Side effects requested by node actions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeRequests {
    /// Configure the mesh role from settings and start the stack.
    pub start_stack: bool,
    /// Fire `Init` and `ScanningStart` into the link machine.
    pub start_link: bool,
    pub start_heartbeat: bool,
    pub schedule_reboot: bool,
}

#[derive(Debug, Default)]
pub struct NodeContext {
    initialized: bool,
    pub requests: NodeRequests,
}

impl NodeContext {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Hand over pending requests and clear them.
    pub fn take_requests(&mut self) -> NodeRequests {
        core::mem::take(&mut self.requests)
    }
}

fn initialize(ctx: &mut NodeContext) {
    if !precondition!(!ctx.initialized, "node initialized twice") {
        return;
    }
    ctx.initialized = true;
    ctx.requests.start_stack = true;
    ctx.requests.start_link = true;
    ctx.requests.start_heartbeat = true;
}

fn reboot(ctx: &mut NodeContext) {
    ctx.requests.schedule_reboot = true;
}

pub static NODE_TABLE: [Transition<NodeState, NodeEvent, NodeContext>; 2] = [
    Transition {
        state: StateFilter::Is(NodeState::Boot),
        event: NodeEvent::Init,
        guard: None,
        next: NextState::To(NodeState::Idle),
        on_entry: Some(initialize),
        on_exit: None,
    },
    Transition {
        state: StateFilter::Any,
        event: NodeEvent::Reboot,
        guard: None,
        next: NextState::Keep,
        on_entry: Some(reboot),
        on_exit: None,
    },
];

pub type NodeMachine = StateMachine<NodeState, NodeEvent, NodeContext, EVENT_QUEUE_LEN>;

pub fn node_machine() -> NodeMachine {
    StateMachine::new("node", NodeState::Boot, &NODE_TABLE, TaskId::NodeDispatch)
}
