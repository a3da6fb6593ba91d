//! Transmit backlog.
//!
//! A fixed array of slots plus a FIFO of slot indices giving the send
//! order.  Slot allocation is a linear scan for the first empty slot, so
//! storage order and send order are independent.  A full backlog drops the
//! enqueue.
//!
//! The FIFO never holds more entries than there are non-empty slots.

use heapless::Deque;
use log::warn;

use crate::precondition;

use super::frame::FrameBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Queued,
    InFlight,
    /// The peer answered this item.
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct TxItem {
    pub frame: FrameBuf,
    pub status: SlotStatus,
    /// Sending must pause on this item until it is answered.
    pub qos: bool,
    pub message_id: u16,
}

impl TxItem {
    const EMPTY: Self = Self {
        frame: FrameBuf::new(),
        status: SlotStatus::Empty,
        qos: false,
        message_id: 0,
    };
}

pub struct TxBacklog<const N: usize> {
    slots: [TxItem; N],
    order: Deque<usize, N>,
}

impl<const N: usize> Default for TxBacklog<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TxBacklog<N> {
    pub fn new() -> Self {
        Self {
            slots: [const { TxItem::EMPTY }; N],
            order: Deque::new(),
        }
    }

    /// Copy `frame` into the first empty slot and queue it last.
    pub fn enqueue(&mut self, frame: &[u8], message_id: u16, qos: bool) -> Option<usize> {
        let Some(idx) = self.slots.iter().position(|s| s.status == SlotStatus::Empty) else {
            warn!("TX backlog full, dropping message {}", message_id);
            return None;
        };
        let frame = FrameBuf::from_slice(frame).ok()?;
        self.slots[idx] = TxItem {
            frame,
            status: SlotStatus::Queued,
            qos,
            message_id,
        };
        if !precondition!(self.order.push_back(idx).is_ok(), "backlog order full") {
            self.release(idx);
            return None;
        }
        Some(idx)
    }

    /// Next slot to send, in FIFO order.
    pub fn pop_next(&mut self) -> Option<usize> {
        self.order.pop_front()
    }

    /// Put a popped slot back at the head (transmitter refused to start).
    pub fn push_front(&mut self, idx: usize) {
        if !precondition!(self.order.push_front(idx).is_ok(), "backlog order full") {
            self.release(idx);
        }
    }

    pub fn item(&self, idx: usize) -> Option<&TxItem> {
        self.slots.get(idx)
    }

    pub fn set_status(&mut self, idx: usize, status: SlotStatus) {
        if let Some(slot) = self.slots.get_mut(idx) {
            slot.status = status;
        }
    }

    /// Free a slot for reuse.
    pub fn release(&mut self, idx: usize) {
        self.set_status(idx, SlotStatus::Empty);
    }

    /// Slot currently holding `message_id` on air.
    pub fn in_flight(&self, message_id: u16) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.status == SlotStatus::InFlight && s.message_id == message_id)
    }

    pub fn queued(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued() == 0
    }
}
