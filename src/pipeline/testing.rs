//! In-memory stand-ins for the platform, the queue and the session

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{DeviceDirectory, DownlinkQueue, TokenProvider, TokenRejected};
use crate::error::BridgeError;
use crate::thingsboard::types::EntityId;
use crate::thingsboard::{EUI_ATTRIBUTE_KEY, UID_TELEMETRY_KEY};

#[derive(Default)]
pub struct FakeDirectory {
    relations: Vec<EntityId>,
    fail_relations: bool,
    reject_token: bool,
    uids: HashMap<String, String>,
    euis: HashMap<String, String>,
    failing_reads: HashSet<String>,
}

impl FakeDirectory {
    pub fn with_relations(mut self, relations: Vec<EntityId>) -> Self {
        self.relations = relations;
        self
    }

    pub fn failing_relations(mut self) -> Self {
        self.fail_relations = true;
        self
    }

    /// Relation queries answer 401 as if the token had been revoked
    pub fn rejecting_token(mut self) -> Self {
        self.reject_token = true;
        self
    }

    /// Add a related device with optional UID telemetry and EUI attribute
    pub fn with_device(mut self, id: &str, uid: Option<&str>, eui: Option<&str>) -> Self {
        self.relations.push(EntityId {
            id: id.to_string(),
            entity_type: "DEVICE".to_string(),
        });
        if let Some(uid) = uid {
            self.uids.insert(id.to_string(), uid.to_string());
        }
        if let Some(eui) = eui {
            self.euis.insert(id.to_string(), eui.to_string());
        }
        self
    }

    /// Add a related device whose reads fail outright
    pub fn with_unreachable_device(mut self, id: &str) -> Self {
        self.relations.push(EntityId {
            id: id.to_string(),
            entity_type: "DEVICE".to_string(),
        });
        self.failing_reads.insert(id.to_string());
        self
    }
}

#[async_trait]
impl DeviceDirectory for FakeDirectory {
    async fn related_entities(&self, _asset_id: &str, _token: &str) -> anyhow::Result<Vec<EntityId>> {
        if self.reject_token {
            return Err(TokenRejected("401 Unauthorized: Token has expired".to_string()).into());
        }
        if self.fail_relations {
            anyhow::bail!("request failed with status 500 Internal Server Error");
        }
        Ok(self.relations.clone())
    }

    async fn latest_telemetry(
        &self,
        device_id: &str,
        key: &str,
        _token: &str,
    ) -> anyhow::Result<Option<String>> {
        assert_eq!(key, UID_TELEMETRY_KEY);
        if self.failing_reads.contains(device_id) {
            anyhow::bail!("operation timed out");
        }
        Ok(self.uids.get(device_id).cloned())
    }

    async fn attribute_value(
        &self,
        device_id: &str,
        key: &str,
        _token: &str,
    ) -> anyhow::Result<Option<String>> {
        assert_eq!(key, EUI_ATTRIBUTE_KEY);
        if self.failing_reads.contains(device_id) {
            anyhow::bail!("operation timed out");
        }
        Ok(self.euis.get(device_id).cloned())
    }
}

/// Records every enqueue; optionally fails some EUIs or raises a stop
/// signal after a number of calls
#[derive(Default)]
pub struct RecordingQueue {
    pub calls: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
    stop_after: Option<(usize, watch::Sender<bool>)>,
}

impl RecordingQueue {
    pub fn failing_for(mut self, dev_eui: &str) -> Self {
        self.failing.insert(dev_eui.to_string());
        self
    }

    pub fn stop_after(mut self, calls: usize, stop: watch::Sender<bool>) -> Self {
        self.stop_after = Some((calls, stop));
        self
    }

    pub fn attempted_euis(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(eui, _)| eui.clone())
            .collect()
    }
}

#[async_trait]
impl DownlinkQueue for RecordingQueue {
    async fn enqueue(&self, dev_eui: &str, payload_b64: &str) -> anyhow::Result<String> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((dev_eui.to_string(), payload_b64.to_string()));
            calls.len()
        };
        if let Some((after, stop)) = &self.stop_after {
            if count >= *after {
                let _ = stop.send(true);
            }
        }
        if self.failing.contains(dev_eui) {
            anyhow::bail!("enqueue failed with status 404 Not Found: object does not exist");
        }
        Ok("{}".to_string())
    }
}

pub struct StaticToken(pub Option<&'static str>);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, BridgeError> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| BridgeError::AuthFailure("login failed with status 401".to_string()))
    }
}

/// Always hands out the same token and counts invalidations
#[derive(Default)]
pub struct TrackingToken {
    invalidations: AtomicUsize,
}

impl TrackingToken {
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for TrackingToken {
    async fn access_token(&self) -> Result<String, BridgeError> {
        Ok("t".to_string())
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}
