//! Duplicate suppression for received frames.
//!
//! Broadcast delivers the same advertisement many times, and the node may
//! hear reflections of its own beacons.  Two independent filters run
//! before any protocol logic:
//!
//! 1. a frame byte-identical to the last accepted frame is dropped;
//! 2. a frame reusing the last processed message id (when that id is
//!    above 1) is dropped.

use super::beacon::RxFrame;
use super::frame::{CodecError, peek_header};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted { message_id: u16 },
    Malformed(CodecError),
    SameBytes,
    SameMessageId(u16),
}

#[derive(Debug, Default)]
pub struct Deduplicator {
    last_frame: RxFrame,
    last_message_id: u16,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, frame: &[u8]) -> Admission {
        let message_id = match peek_header(frame) {
            Ok((id, _)) => id,
            Err(e) => return Admission::Malformed(e),
        };

        if self.last_frame.as_slice() == frame {
            return Admission::SameBytes;
        }
        self.last_frame.clear();
        if self.last_frame.extend_from_slice(frame).is_err() {
            return Admission::Malformed(CodecError::TooLong);
        }

        let repeated = message_id == self.last_message_id && message_id > 1;
        self.last_message_id = message_id;
        if repeated {
            return Admission::SameMessageId(message_id);
        }
        Admission::Accepted { message_id }
    }
}
