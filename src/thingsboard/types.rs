//! Wire types for the ThingsBoard REST API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `POST /api/auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Only the access token is read; the refresh token is ignored and the
/// session logs in again on expiry
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Body of `POST /api/relations`
#[derive(Debug, Clone, Serialize)]
pub struct RelationsQuery {
    pub parameters: RelationSearchParameters,
    pub filters: Vec<RelationEntityTypeFilter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSearchParameters {
    pub root_id: String,
    pub root_type: String,
    pub direction: String,
    pub relation_type_group: String,
    pub max_level: u32,
    pub fetch_last_level_only: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationEntityTypeFilter {
    pub relation_type: String,
    pub entity_types: Vec<String>,
    pub negate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityId {
    pub id: String,
    pub entity_type: String,
}

impl EntityId {
    pub fn is_device(&self) -> bool {
        self.entity_type == "DEVICE"
    }
}

/// One element of the relation query response (only the target is read)
#[derive(Debug, Clone, Deserialize)]
pub struct EntityRelation {
    pub to: EntityId,
}

/// `{ ts, value }` entry of a timeseries response
#[derive(Debug, Clone, Deserialize)]
pub struct TsValue {
    pub value: serde_json::Value,
}

/// `GET .../values/timeseries?keys=...` → `{ "<key>": [TsValue, ...] }`
pub type TimeseriesResponse = HashMap<String, Vec<TsValue>>;

/// `GET .../values/attributes?keys=...` element
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeValue {
    pub key: String,
    pub value: serde_json::Value,
}

/// Render a telemetry/attribute value as text; null and empty strings count
/// as absent
pub fn value_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
