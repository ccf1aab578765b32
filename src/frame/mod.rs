//! Streetlight controller command frames
//!
//! Frame structure (all action kinds):
//!   0x68 | UID(6) | Header(N, per action kind) | Payload(M) | Checksum(1) | 0x16
//!
//! The checksum is the low byte of the arithmetic sum of every byte from the
//! start byte through the last payload byte. Frames travel to the network
//! server base64-encoded inside a downlink queue item.

pub mod action;
pub mod encoder;

use std::fmt;

use base64::Engine;
use thiserror::Error;

use crate::error::{BridgeError, Result};
pub use action::{Action, ActionKind, ClockTimestamp, LightState, ScheduleSlot, SlotSpec};
pub use encoder::{encode, FrameBuilder};

pub const START_BYTE: u8 = 0x68;
pub const END_BYTE: u8 = 0x16;

/// UID field width in bytes / hex digits
pub const UID_LEN: usize = 6;
pub const UID_HEX_LEN: usize = UID_LEN * 2;

/// Separates the time and dim level inside a schedule slot
pub const SCHEDULE_MARKER: u8 = 0x23;

/// Shortest possible frame: TurnLight
pub const MIN_FRAME_LEN: usize = 1 + UID_LEN + 7 + 2 + 2;

/// Uppercase and left-pad a platform-reported UID to 12 hex digits
///
/// Longer values are returned unchanged (uppercased) and rejected later by
/// the encoder.
pub fn normalize_uid(raw: &str) -> String {
    format!("{:0>width$}", raw.trim().to_ascii_uppercase(), width = UID_HEX_LEN)
}

/// Low 8 bits of the byte sum
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

pub fn to_hex(frame: &[u8]) -> String {
    hex::encode_upper(frame)
}

pub fn from_hex(text: &str) -> Result<Vec<u8>> {
    hex::decode(text.trim())
        .map_err(|e| BridgeError::invalid(format!("invalid hex '{}': {}", text, e)))
}

/// Base64 rendering used in the downlink queue item's `data` field
pub fn to_transport_payload(frame: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(frame)
}

pub fn from_transport_payload(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| BridgeError::invalid(format!("Base64 decode error: {}", e)))
}

/// Errors raised when inspecting a received/stored frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes (minimum {MIN_FRAME_LEN})")]
    TooShort(usize),

    #[error("bad start byte 0x{0:02X}")]
    BadStartByte(u8),

    #[error("bad end byte 0x{0:02X}")]
    BadEndByte(u8),

    #[error("checksum mismatch: computed 0x{computed:02X}, frame carries 0x{carried:02X}")]
    ChecksumMismatch { computed: u8, carried: u8 },

    #[error("unrecognized command header")]
    UnknownHeader,

    #[error("{kind} payload must be {expected} bytes, got {found}")]
    PayloadLength {
        kind: ActionKind,
        expected: usize,
        found: usize,
    },

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: ActionKind, reason: String },
}

/// A validated, decoded command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub uid: [u8; UID_LEN],
    pub kind: ActionKind,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

impl Frame {
    /// Validate framing bytes and checksum, then split out UID and payload
    pub fn parse(data: &[u8]) -> std::result::Result<Self, FrameError> {
        if data.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort(data.len()));
        }
        if data[0] != START_BYTE {
            return Err(FrameError::BadStartByte(data[0]));
        }
        let end = data[data.len() - 1];
        if end != END_BYTE {
            return Err(FrameError::BadEndByte(end));
        }

        let checksum_at = data.len() - 2;
        let computed = checksum(&data[..checksum_at]);
        if computed != data[checksum_at] {
            return Err(FrameError::ChecksumMismatch {
                computed,
                carried: data[checksum_at],
            });
        }

        let mut uid = [0u8; UID_LEN];
        uid.copy_from_slice(&data[1..=UID_LEN]);

        let body = &data[1 + UID_LEN..checksum_at];
        let kind = ActionKind::ALL
            .into_iter()
            .find(|k| body.starts_with(k.header()))
            .ok_or(FrameError::UnknownHeader)?;

        let payload = &body[kind.header().len()..];
        if payload.len() != kind.payload_len() {
            return Err(FrameError::PayloadLength {
                kind,
                expected: kind.payload_len(),
                found: payload.len(),
            });
        }

        Ok(Frame {
            uid,
            kind,
            payload: payload.to_vec(),
            checksum: computed,
        })
    }

    pub fn uid_hex(&self) -> String {
        hex::encode_upper(self.uid)
    }

    /// Recover the semantic action carried by the payload
    pub fn action(&self) -> std::result::Result<Action, FrameError> {
        let p = &self.payload;
        let invalid = |reason: String| FrameError::InvalidPayload {
            kind: self.kind,
            reason,
        };
        if p.len() != self.kind.payload_len() {
            return Err(FrameError::PayloadLength {
                kind: self.kind,
                expected: self.kind.payload_len(),
                found: p.len(),
            });
        }

        match self.kind {
            ActionKind::TurnLight => {
                let state = LightState::from_action_code(p[0])
                    .ok_or_else(|| invalid(format!("unknown action code 0x{:02X}", p[0])))?;
                Ok(Action::TurnLight(state))
            }
            ActionKind::TimeSync => {
                let year = p[3] as i32 * 100 + p[4] as i32;
                let date = chrono::NaiveDate::from_ymd_opt(year, p[5] as u32, p[6] as u32)
                    .ok_or_else(|| invalid(format!("bad date {}-{}-{}", year, p[5], p[6])))?;
                let time = chrono::NaiveTime::from_hms_opt(p[0] as u32, p[1] as u32, p[2] as u32)
                    .ok_or_else(|| invalid(format!("bad time {}:{}:{}", p[0], p[1], p[2])))?;
                let weekday = ClockTimestamp::weekday_from_index(p[7])
                    .ok_or_else(|| invalid(format!("bad weekday index {}", p[7])))?;
                Ok(Action::TimeSync(ClockTimestamp {
                    weekday,
                    date,
                    time,
                }))
            }
            ActionKind::Schedule => {
                let slot = |s: &[u8]| -> std::result::Result<ScheduleSlot, FrameError> {
                    if s[2] != SCHEDULE_MARKER {
                        return Err(invalid(format!("bad slot marker 0x{:02X}", s[2])));
                    }
                    Ok(ScheduleSlot {
                        hour: s[0],
                        minute: s[1],
                        dim_level: s[3],
                    })
                };
                Ok(Action::Schedule {
                    slot1: slot(&p[0..4])?,
                    slot2: slot(&p[4..8])?,
                })
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} UID={} Payload={} Checksum=0x{:02X}",
            self.kind,
            self.uid_hex(),
            hex::encode_upper(&self.payload),
            self.checksum
        )
    }
}
