//! Beacon frame codec.
//!
//! Wire format (little-endian, no padding), at most 27 bytes per frame:
//!
//! ```text
//!   ┌──────────────┬─────────┬──────────────────────────────┐
//!   │ message_id   │ command │ payload (command specific)   │
//!   │ u16 LE       │ u8      │ 1..=24 bytes                 │
//!   └──────────────┴─────────┴──────────────────────────────┘
//!   command bit 0x80 set = response
//! ```
//!
//! | command            | request payload                         | response payload                        |
//! |--------------------|-----------------------------------------|-----------------------------------------|
//! | 0x01 resend        | u16 message id to resend                | u16 message id being answered           |
//! | 0x02 scan          | u8 app version, u8 platform             | u16 request id, u16 token, u8 major, u8 minor, u8 sink |
//! | 0x0A begin upload  | u16 token, u8 sequence, u32 length, u8 fragment size | u16 request id, u16 start id, u8 status |
//! | 0x0B upload        | raw fragment bytes                      | u16 request id, u8 status, u8 percent   |

use core::fmt;

use heapless::Vec;

/// Largest frame that fits one advertisement.
pub const MAX_FRAME_LEN: usize = 27;
pub const HEADER_LEN: usize = 3;
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_LEN;

/// Command bit marking a response.
pub const RESPONSE_FLAG: u8 = 0x80;

pub const CMD_RESEND: u8 = 0x01;
pub const CMD_SCAN: u8 = 0x02;
pub const CMD_BEGIN_UPLOAD: u8 = 0x0A;
pub const CMD_UPLOAD: u8 = 0x0B;

pub type FrameBuf = Vec<u8, MAX_FRAME_LEN>;

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Not even a header plus one payload byte.
    TooShort,
    /// Longer than one advertisement can carry.
    TooLong,
    UnknownCommand(u8),
    /// The payload ends before the command's fixed fields.
    Truncated(u8),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "frame shorter than header"),
            Self::TooLong => write!(f, "frame exceeds {MAX_FRAME_LEN} bytes"),
            Self::UnknownCommand(c) => write!(f, "unknown command 0x{c:02X}"),
            Self::Truncated(c) => write!(f, "payload of command 0x{c:02X} truncated"),
        }
    }
}

// ── Payloads ──────────────────────────────────────────────────

/// Status byte carried in upload responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UploadStatus {
    Ok = 0,
    /// Transfer in progress.
    Upload = 1,
    /// The declared image does not fit the session.
    Overload = 2,
}

/// Companion app platform announced in a scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
    Other(u8),
}

impl From<u8> for Platform {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::Android,
            1 => Self::Ios,
            other => Self::Other(other),
        }
    }
}

impl From<Platform> for u8 {
    fn from(p: Platform) -> Self {
        match p {
            Platform::Android => 0,
            Platform::Ios => 1,
            Platform::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub app_version: u8,
    pub platform: Platform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResponse {
    pub request_id: u16,
    pub token: u16,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub is_sink: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginUploadRequest {
    pub token: u16,
    pub sequence: u8,
    pub image_length: u32,
    pub fragment_length: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginUploadResponse {
    pub request_id: u16,
    pub start_message_id: u16,
    pub status: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadResponse {
    pub request_id: u16,
    pub status: u8,
    pub percentage: u8,
}

/// One decoded message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ResendRequest { message_id: u16 },
    ResendResponse { message_id: u16 },
    ScanRequest(ScanRequest),
    ScanResponse(ScanResponse),
    BeginUploadRequest(BeginUploadRequest),
    BeginUploadResponse(BeginUploadResponse),
    UploadRequest { data: Vec<u8, MAX_PAYLOAD_LEN> },
    UploadResponse(UploadResponse),
}

impl Message {
    /// Command byte including the response flag.
    pub fn command(&self) -> u8 {
        match self {
            Self::ResendRequest { .. } => CMD_RESEND,
            Self::ResendResponse { .. } => CMD_RESEND | RESPONSE_FLAG,
            Self::ScanRequest(_) => CMD_SCAN,
            Self::ScanResponse(_) => CMD_SCAN | RESPONSE_FLAG,
            Self::BeginUploadRequest(_) => CMD_BEGIN_UPLOAD,
            Self::BeginUploadResponse(_) => CMD_BEGIN_UPLOAD | RESPONSE_FLAG,
            Self::UploadRequest { .. } => CMD_UPLOAD,
            Self::UploadResponse(_) => CMD_UPLOAD | RESPONSE_FLAG,
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_id: u16,
    pub message: Message,
}

impl Frame {
    pub fn new(message_id: u16, message: Message) -> Self {
        Self {
            message_id,
            message,
        }
    }

    pub fn encode(&self) -> Result<FrameBuf, CodecError> {
        let mut w = Writer::default();
        w.u16(self.message_id)?;
        w.u8(self.message.command())?;
        match &self.message {
            Message::ResendRequest { message_id } | Message::ResendResponse { message_id } => {
                w.u16(*message_id)?;
            }
            Message::ScanRequest(r) => {
                w.u8(r.app_version)?;
                w.u8(r.platform.into())?;
            }
            Message::ScanResponse(r) => {
                w.u16(r.request_id)?;
                w.u16(r.token)?;
                w.u8(r.firmware_major)?;
                w.u8(r.firmware_minor)?;
                w.u8(u8::from(r.is_sink))?;
            }
            Message::BeginUploadRequest(r) => {
                w.u16(r.token)?;
                w.u8(r.sequence)?;
                w.u32(r.image_length)?;
                w.u8(r.fragment_length)?;
            }
            Message::BeginUploadResponse(r) => {
                w.u16(r.request_id)?;
                w.u16(r.start_message_id)?;
                w.u8(r.status)?;
            }
            Message::UploadRequest { data } => w.bytes(data)?,
            Message::UploadResponse(r) => {
                w.u16(r.request_id)?;
                w.u8(r.status)?;
                w.u8(r.percentage)?;
            }
        }
        Ok(w.buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (message_id, command) = peek_header(bytes)?;
        let mut r = Reader {
            bytes: &bytes[HEADER_LEN..],
            command,
        };

        let message = match command {
            CMD_RESEND => Message::ResendRequest {
                message_id: r.u16()?,
            },
            c if c == CMD_RESEND | RESPONSE_FLAG => Message::ResendResponse {
                message_id: r.u16()?,
            },
            CMD_SCAN => Message::ScanRequest(ScanRequest {
                app_version: r.u8()?,
                platform: r.u8()?.into(),
            }),
            c if c == CMD_SCAN | RESPONSE_FLAG => Message::ScanResponse(ScanResponse {
                request_id: r.u16()?,
                token: r.u16()?,
                firmware_major: r.u8()?,
                firmware_minor: r.u8()?,
                is_sink: r.u8()? != 0,
            }),
            CMD_BEGIN_UPLOAD => Message::BeginUploadRequest(BeginUploadRequest {
                token: r.u16()?,
                sequence: r.u8()?,
                image_length: r.u32()?,
                fragment_length: r.u8()?,
            }),
            c if c == CMD_BEGIN_UPLOAD | RESPONSE_FLAG => {
                Message::BeginUploadResponse(BeginUploadResponse {
                    request_id: r.u16()?,
                    start_message_id: r.u16()?,
                    status: r.u8()?,
                })
            }
            CMD_UPLOAD => Message::UploadRequest {
                data: Vec::from_slice(r.bytes).map_err(|()| CodecError::TooLong)?,
            },
            c if c == CMD_UPLOAD | RESPONSE_FLAG => Message::UploadResponse(UploadResponse {
                request_id: r.u16()?,
                status: r.u8()?,
                percentage: r.u8()?,
            }),
            other => return Err(CodecError::UnknownCommand(other)),
        };

        Ok(Self {
            message_id,
            message,
        })
    }
}

/// Validate the frame size and read `(message_id, command)`.
pub fn peek_header(bytes: &[u8]) -> Result<(u16, u8), CodecError> {
    if bytes.len() > MAX_FRAME_LEN {
        return Err(CodecError::TooLong);
    }
    if bytes.len() <= HEADER_LEN {
        return Err(CodecError::TooShort);
    }
    Ok((u16::from_le_bytes([bytes[0], bytes[1]]), bytes[2]))
}

// ── Cursor helpers ────────────────────────────────────────────

#[derive(Default)]
struct Writer {
    buf: FrameBuf,
}

impl Writer {
    fn bytes(&mut self, data: &[u8]) -> Result<(), CodecError> {
        self.buf
            .extend_from_slice(data)
            .map_err(|()| CodecError::TooLong)
    }

    fn u8(&mut self, v: u8) -> Result<(), CodecError> {
        self.bytes(&[v])
    }

    fn u16(&mut self, v: u16) -> Result<(), CodecError> {
        self.bytes(&v.to_le_bytes())
    }

    fn u32(&mut self, v: u32) -> Result<(), CodecError> {
        self.bytes(&v.to_le_bytes())
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    command: u8,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let (head, rest) = self
            .bytes
            .split_first_chunk::<N>()
            .ok_or(CodecError::Truncated(self.command))?;
        self.bytes = rest;
        Ok(*head)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        self.take().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        self.take().map(u32::from_le_bytes)
    }
}

// ── Message ids ───────────────────────────────────────────────

/// Per-instance message id counter.  Starts at 1 and wraps from 0xFFFF
/// back to 1; 0 means "no message".
#[derive(Debug, Default, Clone)]
pub struct MessageIds {
    last: u16,
}

impl MessageIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u16 {
        self.last = if self.last == u16::MAX { 1 } else { self.last + 1 };
        self.last
    }
}
