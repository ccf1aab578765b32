//! Asset → device fan-out pipeline
//!
//! `Idle → Resolving → Fetching → {Encoding → Submitting}* → Done`
//!
//! 1. Resolve the devices contained by an asset (one relation query)
//! 2. Fetch each device's rolling UID and EUI concurrently
//! 3. Encode and enqueue one frame per device, strictly one at a time with a
//!    pacing delay between devices
//!
//! Only authentication and resolution failures abort an invocation. Every
//! per-device problem is logged and recorded in the [`DispatchReport`].

pub mod dispatch;
pub mod fetcher;
pub mod resolver;
#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::Dispatcher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::BridgeError;
use crate::frame::ActionKind;
use crate::thingsboard::types::EntityId;

/// Source of the platform bearer token
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, BridgeError>;

    /// Forget the current token; the next `access_token` logs in again
    async fn invalidate(&self) {}
}

/// Returned by a [`DeviceDirectory`] when the platform answers 401 to the
/// bearer token it was given
#[derive(Debug, Error)]
#[error("platform rejected the access token: {0}")]
pub struct TokenRejected(pub String);

/// Read access to the platform's entity graph and latest values
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Targets of the asset's outgoing relations (unfiltered)
    async fn related_entities(&self, asset_id: &str, token: &str) -> anyhow::Result<Vec<EntityId>>;

    async fn latest_telemetry(
        &self,
        device_id: &str,
        key: &str,
        token: &str,
    ) -> anyhow::Result<Option<String>>;

    async fn attribute_value(
        &self,
        device_id: &str,
        key: &str,
        token: &str,
    ) -> anyhow::Result<Option<String>>;
}

/// Downstream radio queue
#[async_trait]
pub trait DownlinkQueue: Send + Sync {
    /// Enqueue a base64 payload for `dev_eui`, returning the response body
    async fn enqueue(&self, dev_eui: &str, payload_b64: &str) -> anyhow::Result<String>;
}

/// A device with everything needed to address a frame to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    /// Uppercase, zero-padded to 12 hex digits
    pub data_uid: String,
    pub dev_eui: String,
}

/// What happened to one device during an invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum DeviceOutcome {
    Submitted,
    MissingData(String),
    EncodeFailed(String),
    SubmitFailed(String),
}

impl DeviceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeviceOutcome::Submitted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReport {
    pub device_id: String,
    pub dev_eui: Option<String>,
    pub outcome: DeviceOutcome,
}

/// Per-device result of one dispatch invocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub invocation_id: Uuid,
    pub asset_id: String,
    pub action: ActionKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<DeviceReport>,
    /// Devices never attempted because the invocation was stopped
    pub pending: Vec<String>,
}

impl DispatchReport {
    pub fn new(asset_id: &str, action: ActionKind) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            asset_id: asset_id.to_string(),
            action,
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn submitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.submitted()
    }

    pub fn was_stopped(&self) -> bool {
        !self.pending.is_empty()
    }
}
