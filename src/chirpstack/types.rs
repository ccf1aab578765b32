//! Wire types for the ChirpStack REST device-queue API

use serde::{Deserialize, Serialize};

/// Body of `POST /api/devices/{devEui}/queue`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub queue_item: QueueItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub confirmed: bool,
    /// Base64 encoded frame
    pub data: String,
    pub f_port: u8,
}
