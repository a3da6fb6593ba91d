//! Table-driven, event-queue finite state machine engine.
//!
//! Every module of the firmware is a [`StateMachine`] over its own state
//! and event enums plus a context type that the actions mutate:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Transition table (scanned top to bottom, first match wins)      │
//! │  ┌─────────┬────────┬────────┬───────────┬──────────┬─────────┐  │
//! │  │ state   │ event  │ guard  │ next      │ on_entry │ on_exit │  │
//! │  ├─────────┼────────┼────────┼───────────┼──────────┼─────────┤  │
//! │  │ Is(A)   │ Go     │ -      │ To(B)     │ fn(ctx)  │ fn(ctx) │  │
//! │  │ Any     │ Reset  │ fn(..) │ Keep      │ fn(ctx)  │ -       │  │
//! │  └─────────┴────────┴────────┴───────────┴──────────┴─────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//!
//!   fire(event, delay) ──▶ EventQueue ──▶ dispatch task (scheduler)
//! ```
//!
//! On a match the engine runs the exit action armed by the *previous*
//! transition, then the row's entry action, moves to the row's next state
//! (unless it is [`NextState::Keep`]) and arms the row's exit action in
//! place of the old one, even when the row has none.  An event that matches
//! no row is dropped without side effects.

pub mod node;
pub mod queue;

use core::fmt::Debug;

use log::{debug, error, info, warn};

use crate::app::ports::SchedulerPort;
use crate::scheduler::{NextRun, TaskId};
use queue::EventQueue;

// ---------------------------------------------------------------------------
// Table rows
// ---------------------------------------------------------------------------

/// Signature for entry and exit actions.
pub type ActionFn<C> = fn(&mut C);

/// Signature for transition guards.
pub type GuardFn<C> = fn(&C) -> bool;

/// Which current states a row applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter<S> {
    /// Wildcard: matches whatever state the machine is in.
    Any,
    Is(S),
}

/// Where a matched row leaves the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState<S> {
    /// Run the actions, stay in the current state.
    Keep,
    To(S),
}

/// One row of a transition table.
pub struct Transition<S, E, C> {
    pub state: StateFilter<S>,
    pub event: E,
    pub guard: Option<GuardFn<C>>,
    pub next: NextState<S>,
    pub on_entry: Option<ActionFn<C>>,
    pub on_exit: Option<ActionFn<C>>,
}

impl<S: PartialEq, E: PartialEq, C> Transition<S, E, C> {
    fn matches(&self, state: &S, event: &E, ctx: &C) -> bool {
        let state_ok = match &self.state {
            StateFilter::Any => true,
            StateFilter::Is(s) => s == state,
        };
        state_ok && self.event == *event && self.guard.is_none_or(|g| g(ctx))
    }
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The state machine engine.
///
/// Owns its event queue (capacity `Q`) and refers to a caller-owned static
/// table.  The context is not owned; it is passed to
/// [`dispatch`](Self::dispatch) so that the same table can drive several
/// independent instances.
pub struct StateMachine<S: 'static, E: 'static, C: 'static, const Q: usize> {
    /// Module name for diagnostics.
    name: &'static str,
    state: S,
    table: &'static [Transition<S, E, C>],
    armed_exit: Option<ActionFn<C>>,
    queue: EventQueue<E, Q>,
    /// Scheduler task that runs [`dispatch`](Self::dispatch).
    task: TaskId,
}

impl<S, E, C, const Q: usize> StateMachine<S, E, C, Q>
where
    S: Copy + PartialEq + Debug,
    E: Copy + PartialEq + Debug,
{
    pub fn new(
        name: &'static str,
        initial: S,
        table: &'static [Transition<S, E, C>],
        task: TaskId,
    ) -> Self {
        Self {
            name,
            state: initial,
            table,
            armed_exit: None,
            queue: EventQueue::new(),
            task,
        }
    }

    pub fn state(&self) -> S {
        self.state
    }

    /// Events waiting for dispatch.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue `event` and schedule the dispatch task after `delay_ms`.
    ///
    /// Safe to call from interrupt context.  A full queue drops the event
    /// and returns `false`.
    pub fn fire(&self, event: E, delay_ms: u32, scheduler: &mut impl SchedulerPort) -> bool {
        let queued = self.queue.push(event).is_ok();
        if !queued {
            warn!("{}: event queue full, dropped {:?}", self.name, event);
        }
        if let Err(e) = scheduler.schedule(self.task, delay_ms) {
            error!("{}: cannot schedule dispatch: {}", self.name, e);
        }
        queued
    }

    /// Dispatch task body: handle the oldest queued event.
    ///
    /// Returns [`NextRun::ASAP`] while more events are pending.
    pub fn dispatch(&mut self, ctx: &mut C) -> NextRun {
        let Some(event) = self.queue.pop() else {
            return NextRun::Stop;
        };

        let row = self
            .table
            .iter()
            .find(|row| row.matches(&self.state, &event, ctx));

        match row {
            Some(row) => {
                if let Some(exit) = self.armed_exit {
                    exit(ctx);
                }
                if let Some(entry) = row.on_entry {
                    entry(ctx);
                }
                if let NextState::To(next) = row.next {
                    info!("{}: {:?} -> {:?} ({:?})", self.name, self.state, next, event);
                    self.state = next;
                } else {
                    debug!("{}: {:?} handled in {:?}", self.name, event, self.state);
                }
                self.armed_exit = row.on_exit;
            }
            None => debug!("{}: no transition for {:?} in {:?}", self.name, event, self.state),
        }

        if self.queue.is_empty() {
            NextRun::Stop
        } else {
            NextRun::ASAP
        }
    }
}
