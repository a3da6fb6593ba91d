//! Upload session: fragment range, received bitmap and progress.
//!
//! Fragments carry message ids from a reserved band starting at
//! [`UPLOAD_START_MESSAGE_ID`]; fragment `i` has id `start + i` and lives
//! at byte offset `i * fragment_length` in the image.  Completion means
//! every bit of the bitmap is set, whatever the arrival order.

use core::fmt;

use crate::config::{MAX_UPLOAD_FRAGMENTS, UPLOAD_START_MESSAGE_ID};

const BITMAP_LEN: usize = MAX_UPLOAD_FRAGMENTS / 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    /// Zero length or zero fragment size.
    EmptyImage,
    /// More fragments than the bitmap can track.
    TooManyFragments(u32),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyImage => write!(f, "image or fragment size is zero"),
            Self::TooManyFragments(n) => {
                write!(f, "{n} fragments exceed the limit of {MAX_UPLOAD_FRAGMENTS}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Receiving,
    Complete,
    /// The storage could not be prepared; fragments are ignored.
    Failed,
}

pub struct UploadSession {
    state: UploadState,
    start_id: u16,
    end_id: u16,
    total: u16,
    image_length: u32,
    sequence: u8,
    fragment_length: u8,
    received: [u8; BITMAP_LEN],
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            state: UploadState::Idle,
            start_id: UPLOAD_START_MESSAGE_ID,
            end_id: UPLOAD_START_MESSAGE_ID,
            total: 0,
            image_length: 0,
            sequence: 0,
            fragment_length: 0,
            received: [0; BITMAP_LEN],
        }
    }

    /// Start a new session, superseding any previous one.
    pub fn begin(
        &mut self,
        image_length: u32,
        sequence: u8,
        fragment_length: u8,
    ) -> Result<(), UploadError> {
        self.state = UploadState::Idle;
        if image_length == 0 || fragment_length == 0 {
            return Err(UploadError::EmptyImage);
        }
        let total = image_length.div_ceil(u32::from(fragment_length));
        if total > MAX_UPLOAD_FRAGMENTS as u32 {
            return Err(UploadError::TooManyFragments(total));
        }

        self.total = total as u16;
        self.start_id = UPLOAD_START_MESSAGE_ID;
        self.end_id = self.start_id + self.total - 1;
        self.image_length = image_length;
        self.sequence = sequence;
        self.fragment_length = fragment_length;
        self.received.fill(0);
        self.state = UploadState::Receiving;
        Ok(())
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn set_state(&mut self, state: UploadState) {
        self.state = state;
    }

    pub fn start_id(&self) -> u16 {
        self.start_id
    }

    pub fn total(&self) -> u16 {
        self.total
    }

    pub fn image_length(&self) -> u32 {
        self.image_length
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn fragment_length(&self) -> u8 {
        self.fragment_length
    }

    /// Fragment index for a message id of the active session.
    pub fn fragment_index(&self, message_id: u16) -> Option<u16> {
        (self.state == UploadState::Receiving
            && (self.start_id..=self.end_id).contains(&message_id))
        .then(|| message_id - self.start_id)
    }

    pub fn message_id(&self, index: u16) -> u16 {
        self.start_id + index
    }

    /// Image byte offset of a fragment.
    pub fn offset(&self, index: u16) -> u32 {
        u32::from(index) * u32::from(self.fragment_length)
    }

    pub fn mark_received(&mut self, index: u16) {
        if index < self.total {
            self.received[usize::from(index / 8)] |= 1 << (index % 8);
        }
    }

    pub fn is_received(&self, index: u16) -> bool {
        index < self.total && self.received[usize::from(index / 8)] & (1 << (index % 8)) != 0
    }

    /// Whether the highest-indexed fragment has arrived.
    pub fn last_received(&self) -> bool {
        self.total > 0 && self.is_received(self.total - 1)
    }

    pub fn first_missing(&self) -> Option<u16> {
        (0..self.total).find(|&i| !self.is_received(i))
    }

    pub fn missing_count(&self) -> u16 {
        (0..self.total).filter(|&i| !self.is_received(i)).count() as u16
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.first_missing().is_none()
    }

    /// Progress reported after fragment `index` was stored.
    ///
    /// Linear up to 90 % while the last fragment is outstanding, then
    /// `90 + 10 / (missing + 1)`.
    pub fn percentage(&self, index: u16) -> u8 {
        if self.last_received() {
            90 + (10 / (u32::from(self.missing_count()) + 1)) as u8
        } else if self.total == 0 {
            0
        } else {
            (u32::from(index) * 90 / u32::from(self.total)) as u8
        }
    }
}
