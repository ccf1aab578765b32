//! Frame encoder for downlink commands
//!
//! Builds the raw controller frame for one device. The output bytes are
//! base64-encoded by the caller and placed in the network server's queue
//! item.

use bytes::{BufMut, BytesMut};

use super::{checksum, normalize_uid, Action, END_BYTE, SCHEDULE_MARKER, START_BYTE, UID_HEX_LEN, UID_LEN};
use crate::error::{BridgeError, Result};

/// Parameters for building a single device frame
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    /// Device UID field (raw bytes, decoded from the 12-digit hex form)
    pub uid: [u8; UID_LEN],
    /// Command to encode
    pub action: Action,
}

impl FrameBuilder {
    /// Create a builder for `action` addressed to `data_uid`
    ///
    /// The UID is normalized (uppercased, zero-padded to 12 digits) before
    /// decoding; anything that is not 1-12 hex digits is rejected.
    pub fn new(data_uid: &str, action: Action) -> Result<Self> {
        Ok(Self {
            uid: parse_uid(data_uid)?,
            action,
        })
    }

    /// Action-specific bytes that follow the fixed header
    fn payload(&self) -> Vec<u8> {
        match &self.action {
            Action::TurnLight(state) => vec![state.action_code(), state.dim_level()],
            Action::TimeSync(ts) => ts.to_bytes().to_vec(),
            Action::Schedule { slot1, slot2 } => vec![
                slot1.hour,
                slot1.minute,
                SCHEDULE_MARKER,
                slot1.dim_level,
                slot2.hour,
                slot2.minute,
                SCHEDULE_MARKER,
                slot2.dim_level,
            ],
        }
    }

    /// Build the raw frame bytes
    ///
    /// The checksum is always computed here from the bytes written so far.
    pub fn build(&self) -> Vec<u8> {
        let header = self.action.kind().header();
        let payload = self.payload();

        let mut frame = BytesMut::with_capacity(1 + UID_LEN + header.len() + payload.len() + 2);
        frame.put_u8(START_BYTE);
        frame.put_slice(&self.uid);
        frame.put_slice(header);
        frame.put_slice(&payload);

        let sum = checksum(&frame);
        frame.put_u8(sum);
        frame.put_u8(END_BYTE);

        frame.to_vec()
    }
}

/// Encode `action` for the device whose rolling UID is `data_uid`
pub fn encode(action: &Action, data_uid: &str) -> Result<Vec<u8>> {
    Ok(FrameBuilder::new(data_uid, action.clone())?.build())
}

fn parse_uid(data_uid: &str) -> Result<[u8; UID_LEN]> {
    if data_uid.trim().is_empty() {
        return Err(BridgeError::invalid("empty data_UID"));
    }

    let normalized = normalize_uid(data_uid);
    if normalized.len() != UID_HEX_LEN {
        return Err(BridgeError::invalid(format!(
            "data_UID '{}' is longer than {} hex digits",
            data_uid, UID_HEX_LEN
        )));
    }

    let mut uid = [0u8; UID_LEN];
    hex::decode_to_slice(&normalized, &mut uid)
        .map_err(|e| BridgeError::invalid(format!("data_UID '{}' is not hex: {}", data_uid, e)))?;
    Ok(uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{from_transport_payload, to_hex, to_transport_payload, Frame, LightState, SlotSpec};

    #[test]
    fn test_light_on_frame() {
        let frame = encode(&Action::TurnLight(LightState::On), "D7AA1090").unwrap();

        // Start(1) + UID(6) + Header(7) + Payload(2) + Checksum(1) + End(1) = 18
        assert_eq!(frame.len(), 18);
        assert_eq!(to_hex(&frame), "680000D7AA1090680106F000200121648E16");

        let n = frame.len();
        assert_eq!(frame[n - 2], checksum(&frame[..n - 2]));
        assert_eq!(frame[n - 1], END_BYTE);
    }

    #[test]
    fn test_light_off_frame() {
        let frame = encode(&Action::TurnLight(LightState::Off), "0123456789ab").unwrap();
        assert_eq!(frame.len(), 18);
        assert_eq!(&frame[1..7], &[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]);
        assert_eq!(&frame[14..16], &[0x22, 0x00]);
        assert_eq!(frame[16], checksum(&frame[..16]));
    }

    #[test]
    fn test_short_uid_is_padded() {
        let frame = encode(&Action::TurnLight(LightState::On), "AB").unwrap();
        assert_eq!(&frame[1..7], &[0x00, 0x00, 0x00, 0x00, 0x00, 0xAB]);
    }

    #[test]
    fn test_time_sync_frame() {
        let action = Action::time_sync("Monday 2024-01-15 09:05:03").unwrap();
        let frame = encode(&action, "0000000000AB").unwrap();

        // Start(1) + UID(6) + Header(6) + Payload(8) + Checksum(1) + End(1) = 23
        assert_eq!(frame.len(), 23);
        assert_eq!(&frame[7..13], &[0x68, 0x01, 0x0B, 0xF0, 0x00, 0x2D]);
        assert_eq!(&frame[13..21], &[0x09, 0x05, 0x03, 20, 24, 0x01, 0x0F, 0x01]);
        assert_eq!(frame[21], checksum(&frame[..21]));
    }

    #[test]
    fn test_schedule_frame() {
        let action = Action::schedule(
            Some(&SlotSpec {
                time: Some("18:30".into()),
                dim_level: Some(100),
            }),
            Some(&SlotSpec {
                time: Some("23:45".into()),
                dim_level: Some(50),
            }),
        )
        .unwrap();
        let frame = encode(&action, "112233445566").unwrap();

        // Start(1) + UID(6) + Header(12) + Payload(8) + Checksum(1) + End(1) = 29
        assert_eq!(frame.len(), 29);
        assert_eq!(
            &frame[7..19],
            &[0x68, 0x01, 0x11, 0xF0, 0x00, 0x2C, 0x01, 0x01, 0x00, 0x00, 0x00, 0x02]
        );
        assert_eq!(&frame[19..27], &[18, 30, 0x23, 100, 23, 45, 0x23, 50]);
        assert_eq!(frame[27], checksum(&frame[..27]));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let action = Action::time_sync("Wed 2025-02-12 12:00:00").unwrap();
        let a = encode(&action, "c0ffee").unwrap();
        let b = encode(&action, "C0FFEE").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_transport_payload_roundtrip() {
        let frame = encode(&Action::TurnLight(LightState::Off), "D7AA1090").unwrap();
        let payload = to_transport_payload(&frame);
        assert_eq!(from_transport_payload(&payload).unwrap(), frame);

        let parsed = Frame::parse(&frame).unwrap();
        assert_eq!(parsed.action().unwrap(), Action::TurnLight(LightState::Off));
    }

    #[test]
    fn test_invalid_uid_rejected() {
        let action = Action::TurnLight(LightState::On);
        assert!(matches!(encode(&action, "XYZ"), Err(BridgeError::InvalidInput(_))));
        assert!(encode(&action, "").is_err());
        assert!(encode(&action, "0123456789ABC").is_err());
    }
}
