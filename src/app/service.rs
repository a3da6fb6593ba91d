//! Node service: the hexagonal core.
//!
//! [`Node`] owns the node state machine, the beacon link and the image
//! store.  The platform feeds it two kinds of input: scheduler tasks that
//! came due ([`Node::run_task`]) and received advertisements
//! ([`Node::on_beacon_received`]).  Every side effect leaves through the
//! port traits injected at the call site.
//!
//! ```text
//!  SchedulerPort ──▶ ┌─────────────────────────────┐ ──▶ RadioPort
//!   radio rx ──────▶ │            Node             │ ──▶ MemoryAreaPort
//!                    │  node FSM · BeaconLink ·    │ ──▶ UpdatePipelinePort
//!                    │  OtapStore · Settings       │ ──▶ StackPort / SystemPort
//!                    └─────────────────────────────┘ ──▶ SettingsPort
//! ```

use log::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::fsm::node::{NodeContext, NodeEvent, NodeMachine, NodeState, node_machine};
use crate::link::states::LinkEvent;
use crate::link::{BeaconLink, LinkOutcome};
use crate::otap::OtapStore;
use crate::scheduler::{NextRun, TaskId};
use crate::settings::Settings;

use super::ports::{NodePorts, SchedulerPort, SettingsPort, StackPort, SystemPort};

/// What [`Node::boot`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Normal start: the node machine will receive `Init`.
    Started,
    /// A pending image was handed to the update pipeline (or failed to)
    /// and the node has been reset.
    ImageApplied { ok: bool },
}

// ───────────────────────────────────────────────────────────────
// Node
// ───────────────────────────────────────────────────────────────

pub struct Node {
    config: LinkConfig,
    settings: Settings,
    machine: NodeMachine,
    ctx: NodeContext,
    link: BeaconLink,
    store: OtapStore,
    heartbeats: u32,
}

impl Node {
    /// Build the node from the stored settings (or defaults).
    ///
    /// A configuration that fails [`LinkConfig::validate`] is refused.
    pub fn new(config: LinkConfig, hw: &(impl SettingsPort + SystemPort)) -> Result<Self> {
        config.validate()?;
        let unique_id = hw.unique_id();
        let settings = Settings::load(hw, unique_id, &config);
        info!(
            "Node: id 0x{:08X}, role {:?}, update pending {}",
            unique_id,
            settings.role(),
            settings.update_pending
        );
        Ok(Self {
            config,
            settings,
            machine: node_machine(),
            ctx: NodeContext::default(),
            link: BeaconLink::new(config, unique_id, settings.is_sink),
            store: OtapStore::new(),
            heartbeats: 0,
        })
    }

    /// Build the node from a JSON configuration blob.
    pub fn from_json(json: &[u8], hw: &(impl SettingsPort + SystemPort)) -> Result<Self> {
        let config = LinkConfig::from_json(json)?;
        Self::new(config, hw)
    }

    pub fn state(&self) -> NodeState {
        self.machine.state()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn link(&self) -> &BeaconLink {
        &self.link
    }

    pub fn heartbeats(&self) -> u32 {
        self.heartbeats
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Apply a pending image, or start the node machine.
    pub fn boot(&mut self, hw: &mut impl NodePorts) -> Result<BootOutcome> {
        if !self.settings.update_pending {
            self.machine
                .fire(NodeEvent::Init, self.config.event_delay_ms, hw);
            return Ok(BootOutcome::Started);
        }

        info!("Node: update pending, applying stored image");
        let applied = self
            .store
            .init(&*hw)
            .and_then(|()| self.store.process(hw));
        if let Err(e) = applied {
            error!("Node: image not applied: {}", e);
        }

        self.settings.update_pending = false;
        self.settings.persist(hw)?;
        hw.reset();
        Ok(BootOutcome::ImageApplied {
            ok: applied.is_ok(),
        })
    }

    /// Flip the aggregator role, persist it and reset.
    pub fn toggle_sink_role(&mut self, hw: &mut (impl SettingsPort + SystemPort)) -> Result<()> {
        self.settings.is_sink = !self.settings.is_sink;
        info!("Node: role now {:?}", self.settings.role());
        self.settings.persist(hw)?;
        hw.reset();
        Ok(())
    }

    // ── Scheduler entry ───────────────────────────────────────

    /// Body of every scheduler task.
    pub fn run_task(&mut self, task: TaskId, hw: &mut impl NodePorts) -> NextRun {
        match task {
            TaskId::NodeDispatch => {
                let next = self.machine.dispatch(&mut self.ctx);
                self.apply_requests(hw);
                next
            }
            TaskId::LinkDispatch => self.link.run_dispatch(hw),
            TaskId::LinkSend => self.link.run_send_task(hw),
            TaskId::Heartbeat => {
                self.heartbeats = self.heartbeats.wrapping_add(1);
                debug!("Node: heartbeat {}", self.heartbeats);
                NextRun::After(self.config.heartbeat_interval_ms)
            }
            TaskId::Reboot => {
                info!("Node: rebooting");
                hw.reset();
                NextRun::Stop
            }
        }
    }

    fn apply_requests(&mut self, hw: &mut impl NodePorts) {
        let req = self.ctx.take_requests();

        if req.start_stack {
            self.start_stack(hw);
        }
        if req.start_link {
            let delay = self.config.event_delay_ms;
            self.link.fire(LinkEvent::Init, delay, hw);
            self.link.fire(LinkEvent::ScanningStart, delay, hw);
        }
        if req.start_heartbeat {
            schedule(hw, TaskId::Heartbeat, self.config.heartbeat_interval_ms);
        }
        if req.schedule_reboot {
            info!("Node: reboot in {} ms", self.config.reboot_delay_ms);
            schedule(hw, TaskId::Reboot, self.config.reboot_delay_ms);
        }
    }

    fn start_stack(&self, hw: &mut impl StackPort) {
        let s = &self.settings;
        let started = hw
            .configure(s.role(), s.address, s.network_address, s.network_channel)
            .and_then(|()| hw.start());
        match started {
            Ok(()) => info!(
                "Node: stack up as {:?} on 0x{:06X}/{}",
                s.role(),
                s.network_address,
                s.network_channel
            ),
            Err(e) => error!("Node: {}", e),
        }
    }

    // ── Radio entry ───────────────────────────────────────────

    /// Feed one received advertisement through the link.
    pub fn on_beacon_received(&mut self, packet: &[u8], hw: &mut impl NodePorts) {
        let Some(outcome) = self.link.on_packet(packet, &mut self.store, hw) else {
            return;
        };
        match outcome {
            LinkOutcome::Paired { token } => debug!("Node: paired, token 0x{:04X}", token),
            LinkOutcome::UploadStarted { fragments } => {
                debug!("Node: upload started, {} fragments", fragments);
            }
            LinkOutcome::UploadComplete => {
                self.settings.update_pending = true;
                if let Err(e) = self.settings.persist(hw) {
                    error!("Node: cannot flag pending update, staying up: {}", e);
                    self.settings.update_pending = false;
                    return;
                }
                if !self
                    .machine
                    .fire(NodeEvent::Reboot, self.config.event_delay_ms, hw)
                {
                    warn!("Node: reboot request dropped");
                }
            }
        }
    }
}

fn schedule(hw: &mut impl SchedulerPort, task: TaskId, delay_ms: u32) {
    if let Err(e) = hw.schedule(task, delay_ms) {
        error!("Node: cannot schedule {:?}: {}", task, e);
    }
}
