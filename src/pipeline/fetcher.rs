//! Device state fetch: device ids → (rolling UID, EUI)
//!
//! All devices are read concurrently and joined before dispatch starts. A
//! device whose UID or EUI is absent (or whose read fails) is dropped without
//! affecting the others.

use futures::future::join_all;
use tracing::{error, info};

use super::{Device, DeviceDirectory};
use crate::error::{BridgeError, Result};
use crate::frame::normalize_uid;
use crate::thingsboard::{EUI_ATTRIBUTE_KEY, UID_TELEMETRY_KEY};

/// Devices ready for dispatch plus the ones that had to be dropped
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub devices: Vec<Device>,
    pub dropped: Vec<(String, BridgeError)>,
}

/// Fetch UID and EUI for every device, preserving input order
pub async fn fetch_device_data(
    directory: &dyn DeviceDirectory,
    device_ids: &[String],
    token: &str,
) -> FetchOutcome {
    let results = join_all(
        device_ids
            .iter()
            .map(|device_id| fetch_one(directory, device_id, token)),
    )
    .await;

    let mut outcome = FetchOutcome::default();
    for (device_id, result) in device_ids.iter().zip(results) {
        match result {
            Ok(device) => outcome.devices.push(device),
            Err(e) => {
                error!("{}", e);
                outcome.dropped.push((device_id.clone(), e));
            }
        }
    }

    info!(
        "Fetched device data: {} ready, {} dropped",
        outcome.devices.len(),
        outcome.dropped.len()
    );
    outcome
}

async fn fetch_one(directory: &dyn DeviceDirectory, device_id: &str, token: &str) -> Result<Device> {
    let missing = |detail: String| BridgeError::MissingDeviceData {
        device_id: device_id.to_string(),
        detail,
    };

    let (uid, eui) = tokio::join!(
        directory.latest_telemetry(device_id, UID_TELEMETRY_KEY, token),
        directory.attribute_value(device_id, EUI_ATTRIBUTE_KEY, token),
    );

    let uid = uid
        .map_err(|e| missing(format!("{} telemetry read failed: {:#}", UID_TELEMETRY_KEY, e)))?
        .ok_or_else(|| missing(format!("no {} telemetry", UID_TELEMETRY_KEY)))?;
    let eui = eui
        .map_err(|e| missing(format!("{} attribute read failed: {:#}", EUI_ATTRIBUTE_KEY, e)))?
        .ok_or_else(|| missing(format!("no {} attribute", EUI_ATTRIBUTE_KEY)))?;

    Ok(Device {
        device_id: device_id.to_string(),
        data_uid: normalize_uid(&uid),
        dev_eui: eui,
    })
}
