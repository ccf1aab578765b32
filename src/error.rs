//! Error taxonomy for a dispatch invocation
//!
//! `AuthFailure` and `ResolveFailure` abort the whole invocation. The other
//! variants are scoped to a single device: they are logged, recorded in the
//! dispatch report and never stop sibling devices.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("unable to authenticate with ThingsBoard: {0}")]
    AuthFailure(String),

    #[error("failed to resolve devices for asset {asset_id}: {reason}")]
    ResolveFailure { asset_id: String, reason: String },

    #[error("device {device_id}: {detail}")]
    MissingDeviceData { device_id: String, detail: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("queue submission failed for {dev_eui}: {reason}")]
    SubmissionFailure { dev_eui: String, reason: String },
}

impl BridgeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        BridgeError::InvalidInput(msg.into())
    }

    /// True for the variants that abort an invocation before any device is
    /// attempted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::AuthFailure(_) | BridgeError::ResolveFailure { .. }
        )
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::AuthFailure("401".into()).is_fatal());
        assert!(BridgeError::ResolveFailure {
            asset_id: "a".into(),
            reason: "timeout".into(),
        }
        .is_fatal());
        assert!(!BridgeError::invalid("bad time").is_fatal());
        assert!(!BridgeError::SubmissionFailure {
            dev_eui: "0102".into(),
            reason: "500".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_display_carries_device_identity() {
        let err = BridgeError::MissingDeviceData {
            device_id: "dev-1".into(),
            detail: "no data_UID telemetry".into(),
        };
        assert_eq!(err.to_string(), "device dev-1: no data_UID telemetry");
    }
}
