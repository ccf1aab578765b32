//! ChirpStack downlink queue client
//!
//! Enqueues one base64 frame per device EUI. Submission is fire-and-forget:
//! the response body is only logged, and nothing is retried.
//!
//! Reference: <https://www.chirpstack.io/docs/chirpstack/api/>

pub mod types;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::ChirpStackConfig;
use crate::pipeline::DownlinkQueue;
use types::{EnqueueRequest, QueueItem};

pub struct ChirpStackClient {
    http: Client,
    base_url: String,
    api_token: String,
    f_port: u8,
    confirmed: bool,
}

impl ChirpStackClient {
    pub fn new(http: Client, config: &ChirpStackConfig) -> Self {
        info!(
            "ChirpStack queue client configured for {} (fPort {})",
            config.url, config.f_port
        );
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            f_port: config.f_port,
            confirmed: config.confirmed,
        }
    }

    pub fn queue_url(&self, dev_eui: &str) -> String {
        format!("{}/api/devices/{}/queue", self.base_url, dev_eui)
    }

    pub fn queue_item(&self, payload_b64: &str) -> EnqueueRequest {
        EnqueueRequest {
            queue_item: QueueItem {
                confirmed: self.confirmed,
                data: payload_b64.to_string(),
                f_port: self.f_port,
            },
        }
    }
}

#[async_trait]
impl DownlinkQueue for ChirpStackClient {
    async fn enqueue(&self, dev_eui: &str, payload_b64: &str) -> Result<String> {
        let url = self.queue_url(dev_eui);
        debug!("POST {} data={}", url, payload_b64);

        let resp = self
            .http
            .post(&url)
            .header("Grpc-Metadata-Authorization", format!("Bearer {}", self.api_token))
            .json(&self.queue_item(payload_b64))
            .send()
            .await
            .context("failed to send queue request")?;

        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("enqueue failed with status {}: {}", status, body_text);
        }

        Ok(body_text)
    }
}
