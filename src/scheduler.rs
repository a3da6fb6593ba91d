//! Cooperative task scheduling.
//!
//! All recurring work is expressed as self-rescheduling tasks: a task runs
//! once after a requested delay and its [`NextRun`] return value either
//! stops it or re-arms it.  Interrupt-context code never runs tasks; it
//! only queues work and asks for a task to be scheduled.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Radio ISR ─┐                                                │
//! │  FSM fire ──┼──▶ SchedulerPort::schedule(task, delay)        │
//! │  Backlog  ──┘                │                               │
//! │                              ▼                               │
//! │                  ┌──────────────────────┐                    │
//! │                  │  task slots (due_ms) │                    │
//! │                  └──────────┬───────────┘                    │
//! │                             ▼                                │
//! │             Node::run_task(task) -> NextRun                  │
//! │                  Stop ─▶ slot freed                          │
//! │                  After(ms) ─▶ slot re-armed                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`CooperativeScheduler`] is the host implementation of
//! [`SchedulerPort`]; on hardware the platform scheduler takes its place.

use crate::app::ports::{SchedulerError, SchedulerPort};
use log::debug;

// ═══════════════════════════════════════════════════════════════
//  Task identity and return contract
// ═══════════════════════════════════════════════════════════════

/// Every task the firmware ever schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    /// Dispatch one event of the node state machine.
    NodeDispatch,
    /// Dispatch one event of the link state machine.
    LinkDispatch,
    /// Push the next backlog item to the transmitter.
    LinkSend,
    Heartbeat,
    Reboot,
}

/// What a task wants after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    Stop,
    After(u32),
}

impl NextRun {
    /// Run again as soon as the scheduler gets to it.
    pub const ASAP: Self = Self::After(0);
}

// ═══════════════════════════════════════════════════════════════
//  Host scheduler
// ═══════════════════════════════════════════════════════════════

/// Maximum number of concurrently pending tasks.
const MAX_TASKS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Slot {
    task: TaskId,
    due_ms: u64,
    /// Handed out by [`CooperativeScheduler::take_due_until`] and not yet
    /// completed.
    running: bool,
}

/// Slot-based scheduler driven by simulated time.
///
/// The owner pulls due tasks with [`take_due_until`](Self::take_due_until),
/// runs them, and hands the result back with [`complete`](Self::complete).
/// A task re-scheduled while it runs keeps the new due time and ignores
/// its own return value.
pub struct CooperativeScheduler {
    slots: [Option<Slot>; MAX_TASKS],
    now_ms: u64,
}

impl Default for CooperativeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CooperativeScheduler {
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_TASKS],
            now_ms: 0,
        }
    }

    /// Simulated time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_scheduled(&self, task: TaskId) -> bool {
        self.find(task).is_some()
    }

    /// Milliseconds until `task` is due, if it is pending.
    pub fn due_in(&self, task: TaskId) -> Option<u64> {
        self.find(task)
            .and_then(|i| self.slots[i])
            .map(|s| s.due_ms.saturating_sub(self.now_ms))
    }

    /// Pop the earliest task due at or before `deadline_ms`, advancing the
    /// clock to its due time.  When nothing is due the clock moves to
    /// `deadline_ms` and `None` is returned.
    pub fn take_due_until(&mut self, deadline_ms: u64) -> Option<TaskId> {
        let mut best: Option<usize> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(s) = slot else { continue };
            if s.running || s.due_ms > deadline_ms {
                continue;
            }
            match best.and_then(|b| self.slots[b]) {
                Some(b) if b.due_ms <= s.due_ms => {}
                _ => best = Some(i),
            }
        }

        let Some(i) = best else {
            self.now_ms = self.now_ms.max(deadline_ms);
            return None;
        };
        let slot = self.slots[i].as_mut()?;
        self.now_ms = self.now_ms.max(slot.due_ms);
        slot.running = true;
        Some(slot.task)
    }

    /// Apply a finished task's return value.
    pub fn complete(&mut self, task: TaskId, next: NextRun) {
        let Some(i) = self.find(task) else { return };
        let now = self.now_ms;
        let Some(slot) = self.slots[i].as_mut() else { return };
        if !slot.running {
            return;
        }
        match next {
            NextRun::Stop => {
                debug!("Scheduler: {:?} stopped", task);
                self.slots[i] = None;
            }
            NextRun::After(ms) => {
                slot.due_ms = now + u64::from(ms);
                slot.running = false;
            }
        }
    }

    fn find(&self, task: TaskId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|s| s.task == task))
    }
}

impl SchedulerPort for CooperativeScheduler {
    fn schedule(&mut self, task: TaskId, delay_ms: u32) -> Result<(), SchedulerError> {
        let entry = Slot {
            task,
            due_ms: self.now_ms + u64::from(delay_ms),
            running: false,
        };
        if let Some(i) = self.find(task) {
            self.slots[i] = Some(entry);
            return Ok(());
        }
        let free = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SchedulerError::NoSlot)?;
        debug!("Scheduler: {:?} in {} ms (slot {})", task, delay_ms, free);
        self.slots[free] = Some(entry);
        Ok(())
    }
}
