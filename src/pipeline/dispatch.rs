//! Sequential, paced dispatch of one action to every device of an asset

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::fetcher::fetch_device_data;
use super::resolver::resolve_devices;
use super::{
    Device, DeviceDirectory, DeviceOutcome, DeviceReport, DispatchReport, DownlinkQueue,
    TokenProvider,
};
use crate::error::{BridgeError, Result};
use crate::frame::{encode, to_hex, to_transport_payload, Action};

/// Runs the resolve → fetch → encode → submit pipeline for one asset
pub struct Dispatcher {
    directory: Arc<dyn DeviceDirectory>,
    queue: Arc<dyn DownlinkQueue>,
    tokens: Arc<dyn TokenProvider>,
    pacing: Duration,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        queue: Arc<dyn DownlinkQueue>,
        tokens: Arc<dyn TokenProvider>,
        pacing: Duration,
    ) -> Self {
        Self {
            directory,
            queue,
            tokens,
            pacing,
        }
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Dispatch `action` to every device of `asset_id`
    pub async fn dispatch(&self, asset_id: &str, action: &Action) -> Result<DispatchReport> {
        self.run(asset_id, action, None).await
    }

    /// Like [`Dispatcher::dispatch`], but stops starting new devices once
    /// `stop` turns true. A submission already in flight completes; the ids
    /// of devices never attempted are returned in `pending`.
    pub async fn dispatch_until(
        &self,
        asset_id: &str,
        action: &Action,
        stop: watch::Receiver<bool>,
    ) -> Result<DispatchReport> {
        self.run(asset_id, action, Some(stop)).await
    }

    async fn run(
        &self,
        asset_id: &str,
        action: &Action,
        mut stop: Option<watch::Receiver<bool>>,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::new(asset_id, action.kind());
        info!(
            "Dispatch {} started: {} for asset {}",
            report.invocation_id, action, asset_id
        );

        let token = self.tokens.access_token().await?;
        let device_ids = match resolve_devices(self.directory.as_ref(), asset_id, &token).await {
            Ok(ids) => ids,
            Err(e @ BridgeError::AuthFailure(_)) => {
                warn!("Platform rejected the cached token, it will be renewed: {}", e);
                self.tokens.invalidate().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        if device_ids.is_empty() {
            info!("Asset {} has no devices, nothing to send", asset_id);
            report.finished_at = Some(Utc::now());
            return Ok(report);
        }

        let fetched = fetch_device_data(self.directory.as_ref(), &device_ids, &token).await;
        for (device_id, e) in fetched.dropped {
            report.outcomes.push(DeviceReport {
                device_id,
                dev_eui: None,
                outcome: DeviceOutcome::MissingData(e.to_string()),
            });
        }

        let mut devices = fetched.devices.into_iter().peekable();
        while let Some(device) = devices.next() {
            if stop_requested(&stop) {
                report.pending.push(device.device_id);
                report.pending.extend(devices.by_ref().map(|d| d.device_id));
                warn!(
                    "Dispatch {} stopped, {} device(s) not attempted",
                    report.invocation_id,
                    report.pending.len()
                );
                break;
            }

            let outcome = self.send_one(&device, action).await;
            report.outcomes.push(DeviceReport {
                device_id: device.device_id,
                dev_eui: Some(device.dev_eui),
                outcome,
            });

            if devices.peek().is_some() {
                self.pause(&mut stop).await;
            }
        }

        report.finished_at = Some(Utc::now());
        info!(
            "Dispatch {} finished for asset {}: {} submitted, {} failed, {} pending",
            report.invocation_id,
            asset_id,
            report.submitted(),
            report.failed(),
            report.pending.len()
        );
        Ok(report)
    }

    /// Encode and enqueue for a single device; never fails the invocation
    async fn send_one(&self, device: &Device, action: &Action) -> DeviceOutcome {
        let frame = match encode(action, &device.data_uid) {
            Ok(frame) => frame,
            Err(e) => {
                error!(
                    "Failed to encode frame for device {} ({}): {}",
                    device.device_id, device.dev_eui, e
                );
                return DeviceOutcome::EncodeFailed(e.to_string());
            }
        };

        let payload = to_transport_payload(&frame);
        debug!(
            "Device {} frame {} (base64 {})",
            device.device_id,
            to_hex(&frame),
            payload
        );

        match self.queue.enqueue(&device.dev_eui, &payload).await {
            Ok(body) => {
                info!(
                    "Queued {} for device {} ({})",
                    action.kind(),
                    device.device_id,
                    device.dev_eui
                );
                debug!("ChirpStack response for device {}: {}", device.dev_eui, body);
                DeviceOutcome::Submitted
            }
            Err(e) => {
                let err = BridgeError::SubmissionFailure {
                    dev_eui: device.dev_eui.clone(),
                    reason: format!("{:#}", e),
                };
                error!("Device {}: {}", device.device_id, err);
                DeviceOutcome::SubmitFailed(err.to_string())
            }
        }
    }

    /// Inter-device pacing; cut short if a stop is requested meanwhile
    async fn pause(&self, stop: &mut Option<watch::Receiver<bool>>) {
        if self.pacing.is_zero() {
            return;
        }
        match stop {
            Some(rx) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.pacing) => {}
                    _ = wait_for_stop(rx) => {}
                }
            }
            None => tokio::time::sleep(self.pacing).await,
        }
    }
}

fn stop_requested(stop: &Option<watch::Receiver<bool>>) -> bool {
    stop.as_ref().is_some_and(|rx| *rx.borrow())
}

async fn wait_for_stop(rx: &mut watch::Receiver<bool>) {
    let signalled = rx.wait_for(|stopped| *stopped).await.is_ok();
    // a dropped sender can no longer stop us
    if !signalled {
        std::future::pending::<()>().await;
    }
}
