//! Device resolution: asset id → contained device ids

use tracing::{debug, info};

use super::{DeviceDirectory, TokenRejected};
use crate::error::{BridgeError, Result};

/// Ids of the `DEVICE` entities related to `asset_id`, in the order the
/// platform returned them. An asset with no devices yields an empty list.
/// A rejected token surfaces as `AuthFailure`, any other failure as
/// `ResolveFailure`.
pub async fn resolve_devices(
    directory: &dyn DeviceDirectory,
    asset_id: &str,
    token: &str,
) -> Result<Vec<String>> {
    let related = directory
        .related_entities(asset_id, token)
        .await
        .map_err(|e| match e.downcast_ref::<TokenRejected>() {
            Some(rejected) => BridgeError::AuthFailure(rejected.to_string()),
            None => BridgeError::ResolveFailure {
                asset_id: asset_id.to_string(),
                reason: format!("{:#}", e),
            },
        })?;

    let total = related.len();
    let device_ids: Vec<String> = related
        .into_iter()
        .filter(|entity| {
            let keep = entity.is_device();
            if !keep {
                debug!("Skipping related {} {}", entity.entity_type, entity.id);
            }
            keep
        })
        .map(|entity| entity.id)
        .collect();

    info!(
        "Asset {} contains {} device(s) ({} relation(s))",
        asset_id,
        device_ids.len(),
        total
    );
    Ok(device_ids)
}
