//! Pairing and image transfer over advertising packets.
//!
//! ```text
//!  radio rx ─▶ extract_frame ─▶ Deduplicator ─▶ Frame::decode
//!                                                  │
//!            ┌─────────────────────────────────────┤
//!            ▼                 ▼                   ▼
//!        scan request     begin upload       upload fragment
//!            │                 │                   │ OtapStore::write
//!            └────────┬────────┴───────────────────┘
//!                     ▼
//!              TxBacklog (FIFO) ─▶ send task ─▶ radio tx
//! ```
//!
//! The radio offers no acknowledgement.  Ordering comes from message ids,
//! duplicates are dropped by the deduplicator, and lost fragments are
//! recovered with resend requests.  A resend request is QoS-tracked: the
//! send task holds it on air until the requested fragment (or an explicit
//! resend response) arrives.

pub mod backlog;
pub mod beacon;
pub mod dedup;
pub mod frame;
pub mod states;
pub mod upload;

use log::{debug, error, info, warn};

use crate::app::ports::{ClockPort, MemoryAreaPort, RadioPort, SchedulerPort, TxSettings};
use crate::config::{LinkConfig, TX_BACKLOG_LEN};
use crate::otap::OtapStore;
use crate::scheduler::{NextRun, TaskId};

use backlog::{SlotStatus, TxBacklog};
use beacon::{connection_token, extract_frame, wrap_frame};
use dedup::{Admission, Deduplicator};
use frame::{
    BeginUploadRequest, BeginUploadResponse, Frame, Message, ScanRequest, ScanResponse,
    UploadResponse, UploadStatus,
};
use states::{LinkContext, LinkEvent, LinkMachine, LinkState, link_machine};
use upload::{UploadSession, UploadState};

/// Protocol results the node service acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Paired { token: u16 },
    UploadStarted { fragments: u16 },
    /// The image is sealed in storage; a reboot applies it.
    UploadComplete,
}

/// Outstanding QoS-tracked resend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingResend {
    /// Message id of our resend request.
    request_id: u16,
    /// Fragment index it asks for.
    fragment: u16,
}

pub struct BeaconLink {
    config: LinkConfig,
    machine: LinkMachine,
    ctx: LinkContext,
    ids: frame::MessageIds,
    dedup: Deduplicator,
    backlog: TxBacklog<TX_BACKLOG_LEN>,
    session: UploadSession,
    token: u16,
    pending_resend: Option<PendingResend>,
    /// Backlog slot currently on air.
    in_flight: Option<usize>,
    transmitting: bool,
}

impl BeaconLink {
    pub fn new(config: LinkConfig, unique_id: u32, is_sink: bool) -> Self {
        Self {
            config,
            machine: link_machine(),
            ctx: LinkContext::new(unique_id, is_sink),
            ids: frame::MessageIds::new(),
            dedup: Deduplicator::new(),
            backlog: TxBacklog::new(),
            session: UploadSession::new(),
            token: 0,
            pending_resend: None,
            in_flight: None,
            transmitting: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.machine.state()
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    /// Frames waiting for the transmitter.
    pub fn queued_frames(&self) -> usize {
        self.backlog.queued()
    }

    /// Message id of the resend request the send task is holding on.
    pub fn awaiting_reply(&self) -> Option<u16> {
        self.pending_resend.map(|p| p.request_id)
    }

    pub fn fire(&self, event: LinkEvent, delay_ms: u32, scheduler: &mut impl SchedulerPort) {
        self.machine.fire(event, delay_ms, scheduler);
    }

    /// Dispatch task body.
    pub fn run_dispatch(&mut self, radio: &mut impl RadioPort) -> NextRun {
        let next = self.machine.dispatch(&mut self.ctx);

        let cmds = self.ctx.take_commands();
        if cmds.register_receiver {
            radio.register_receiver(self.ctx.address());
        }
        match cmds.scanner {
            Some(true) => {
                if let Err(e) = radio.start_scanner() {
                    error!("Link: {}", e);
                }
            }
            Some(false) => radio.stop_scanner(),
            None => {}
        }
        next
    }

    // ── Receive path ──────────────────────────────────────────

    /// Handle one received advertisement.
    pub fn on_packet(
        &mut self,
        packet: &[u8],
        store: &mut OtapStore,
        hw: &mut (impl SchedulerPort + MemoryAreaPort + ClockPort),
    ) -> Option<LinkOutcome> {
        if !self.ctx.is_initialized() {
            return None;
        }
        let bytes = extract_frame(packet)?;

        match self.dedup.admit(&bytes) {
            Admission::Accepted { .. } => {}
            Admission::Malformed(e) => {
                debug!("Link: dropped frame: {}", e);
                return None;
            }
            Admission::SameBytes | Admission::SameMessageId(_) => return None,
        }

        let frame = match Frame::decode(&bytes) {
            Ok(f) => f,
            Err(e) => {
                debug!("Link: dropped frame: {}", e);
                return None;
            }
        };

        match frame.message {
            Message::ScanRequest(req) => Some(self.on_scan(frame.message_id, req, hw)),
            Message::BeginUploadRequest(req) => self.on_begin_upload(frame.message_id, req, store, hw),
            Message::UploadRequest { data } => self.on_fragment(frame.message_id, &data, store, hw),
            Message::ResendResponse { message_id } => {
                if self.pending_resend.is_some_and(|p| p.request_id == message_id) {
                    self.confirm_resend();
                }
                None
            }
            other => {
                debug!("Link: ignoring command 0x{:02X}", other.command());
                None
            }
        }
    }

    fn on_scan(
        &mut self,
        request_id: u16,
        req: ScanRequest,
        hw: &mut impl SchedulerPort,
    ) -> LinkOutcome {
        let token = connection_token(self.ctx.unique_id());
        self.token = token;
        info!(
            "Link: scan from app v{} ({:?}), token 0x{:04X}",
            req.app_version, req.platform, token
        );

        self.send(
            Message::ScanResponse(ScanResponse {
                request_id,
                token,
                firmware_major: self.config.firmware_major,
                firmware_minor: self.config.firmware_minor,
                is_sink: self.ctx.is_sink(),
            }),
            false,
            hw,
        );
        self.machine
            .fire(LinkEvent::ConnectingStart, self.config.event_delay_ms, hw);
        LinkOutcome::Paired { token }
    }

    fn on_begin_upload(
        &mut self,
        request_id: u16,
        req: BeginUploadRequest,
        store: &mut OtapStore,
        hw: &mut (impl SchedulerPort + MemoryAreaPort + ClockPort),
    ) -> Option<LinkOutcome> {
        let paired = req.token == self.token;
        if !paired {
            warn!(
                "Link: begin upload with token 0x{:04X}, expected 0x{:04X}",
                req.token, self.token
            );
        }
        // A new session releases any hold on the previous one.
        self.confirm_resend();

        let status = match self
            .session
            .begin(req.image_length, req.sequence, req.fragment_length)
        {
            Err(e) => {
                warn!("Link: begin upload refused: {}", e);
                UploadStatus::Overload as u8
            }
            Ok(()) => match store
                .init(&*hw)
                .and_then(|()| store.reserve(req.image_length))
                .and_then(|()| store.begin_buffer(hw))
            {
                Ok(()) => UploadStatus::Ok as u8,
                Err(e) => {
                    error!("Link: cannot prepare image area: {}", e);
                    self.session.set_state(UploadState::Failed);
                    e.code()
                }
            },
        };

        self.send(
            Message::BeginUploadResponse(BeginUploadResponse {
                request_id,
                start_message_id: self.session.start_id(),
                status,
            }),
            false,
            hw,
        );

        if self.session.state() != UploadState::Receiving {
            return None;
        }
        if paired {
            self.machine
                .fire(LinkEvent::Connected, self.config.event_delay_ms, hw);
        }
        info!(
            "Link: upload of {} B (seq {}) in {} fragments",
            req.image_length,
            req.sequence,
            self.session.total()
        );
        Some(LinkOutcome::UploadStarted {
            fragments: self.session.total(),
        })
    }

    fn on_fragment(
        &mut self,
        message_id: u16,
        data: &[u8],
        store: &mut OtapStore,
        hw: &mut (impl SchedulerPort + MemoryAreaPort + ClockPort),
    ) -> Option<LinkOutcome> {
        let Some(index) = self.session.fragment_index(message_id) else {
            debug!("Link: fragment 0x{:04X} outside session", message_id);
            return None;
        };

        let len = data.len().min(usize::from(self.session.fragment_length()));
        match store.write(hw, self.session.offset(index), &data[..len]) {
            Ok(()) => self.session.mark_received(index),
            Err(e) => error!("Link: fragment {} not stored: {}", index, e),
        }
        if self
            .pending_resend
            .is_some_and(|p| self.session.is_received(p.fragment))
        {
            self.confirm_resend();
        }

        let last = self.session.last_received();
        if message_id % self.config.progress_every == 0 || last {
            self.send(
                Message::UploadResponse(UploadResponse {
                    request_id: message_id,
                    status: UploadStatus::Upload as u8,
                    percentage: self.session.percentage(index),
                }),
                false,
                hw,
            );
        }
        if !last {
            return None;
        }

        if let Some(missing) = self.session.first_missing() {
            self.request_resend(missing, hw);
            return None;
        }

        let sealed = store.end_buffer(hw, self.session.image_length(), self.session.sequence());
        let (status, percentage, outcome) = match sealed {
            Ok(()) => {
                self.session.set_state(UploadState::Complete);
                (UploadStatus::Ok as u8, 100, Some(LinkOutcome::UploadComplete))
            }
            Err(e) => {
                error!("Link: cannot seal image: {}", e);
                self.session.set_state(UploadState::Failed);
                (e.code(), self.session.percentage(index), None)
            }
        };
        self.send(
            Message::UploadResponse(UploadResponse {
                request_id: message_id,
                status,
                percentage,
            }),
            false,
            hw,
        );
        outcome
    }

    fn request_resend(&mut self, fragment: u16, hw: &mut impl SchedulerPort) {
        let fragment_id = self.session.message_id(fragment);
        info!("Link: requesting fragment {} (0x{:04X})", fragment, fragment_id);
        if let Some(request_id) = self.send(
            Message::ResendRequest {
                message_id: fragment_id,
            },
            true,
            hw,
        ) {
            self.pending_resend = Some(PendingResend {
                request_id,
                fragment,
            });
        }
    }

    /// The outstanding resend request was answered.
    fn confirm_resend(&mut self) {
        let Some(p) = self.pending_resend.take() else { return };
        if let Some(slot) = self.backlog.in_flight(p.request_id) {
            self.backlog.set_status(slot, SlotStatus::Confirmed);
        }
    }

    // ── Send path ─────────────────────────────────────────────

    /// Encode and queue a frame, then kick the send task.
    fn send(&mut self, message: Message, qos: bool, hw: &mut impl SchedulerPort) -> Option<u16> {
        let message_id = self.ids.next_id();
        let bytes = match Frame::new(message_id, message).encode() {
            Ok(b) => b,
            Err(e) => {
                error!("Link: cannot encode frame: {}", e);
                return None;
            }
        };
        self.backlog.enqueue(&bytes, message_id, qos)?;
        if let Err(e) = hw.schedule(TaskId::LinkSend, 0) {
            error!("Link: cannot schedule send task: {}", e);
        }
        Some(message_id)
    }

    /// Send task body: put the next backlog item on air.
    pub fn run_send_task(&mut self, radio: &mut impl RadioPort) -> NextRun {
        if let Some(idx) = self.in_flight {
            let held = self.backlog.item(idx).is_some_and(|item| {
                item.qos
                    && item.status == SlotStatus::InFlight
                    && self.awaiting_reply() == Some(item.message_id)
            });
            if held {
                return NextRun::After(self.config.qos_retry_ms);
            }
            self.backlog.release(idx);
            self.in_flight = None;
        }

        let Some(idx) = self.backlog.pop_next() else {
            if let Err(e) = radio.enable_transmit(false) {
                warn!("Link: {}", e);
                return NextRun::After(self.config.tx_disable_retry_ms);
            }
            self.transmitting = false;
            return NextRun::Stop;
        };

        let Some(beacon) = self
            .backlog
            .item(idx)
            .and_then(|item| wrap_frame(&self.ctx.address(), &item.frame))
        else {
            self.backlog.release(idx);
            return NextRun::ASAP;
        };

        let first = !self.transmitting;
        if first {
            radio.configure_transmit(TxSettings {
                interval_ms: self.config.beacon_interval_ms,
                power_dbm: self.config.beacon_power_dbm,
            });
            if let Err(e) = radio.enable_transmit(true) {
                warn!("Link: {}", e);
                self.backlog.push_front(idx);
                return NextRun::After(self.config.tx_enable_retry_ms);
            }
            self.transmitting = true;
        }

        if let Err(e) = radio.set_content(&beacon) {
            warn!("Link: {}", e);
        }
        self.backlog.set_status(idx, SlotStatus::InFlight);
        self.in_flight = Some(idx);

        NextRun::After(if first {
            self.config.first_send_delay_ms
        } else {
            self.config.send_interval_ms
        })
    }
}
