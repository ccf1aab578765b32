//! ThingsBoard REST client for the entity graph and latest values
//!
//! Every call presents the session token as `X-Authorization: Bearer ...`
//! and is bounded by the client-wide timeout set in [`crate::http_client`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{
    value_as_text, AttributeValue, EntityId, EntityRelation, RelationEntityTypeFilter,
    RelationSearchParameters, RelationsQuery, TimeseriesResponse,
};
use crate::config::{RelationQueryConfig, ThingsBoardConfig};
use crate::pipeline::{DeviceDirectory, TokenRejected};

pub struct ThingsBoardClient {
    http: Client,
    base_url: String,
    relations: RelationQueryConfig,
}

impl ThingsBoardClient {
    pub fn new(http: Client, config: &ThingsBoardConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            relations: config.relations.clone(),
        }
    }

    /// Relation query rooted at `root_id`, shaped by the configured filter
    pub fn relations_query(&self, root_id: &str) -> RelationsQuery {
        RelationsQuery {
            parameters: RelationSearchParameters {
                root_id: root_id.to_string(),
                root_type: self.relations.root_type.clone(),
                direction: "FROM".to_string(),
                relation_type_group: "COMMON".to_string(),
                max_level: self.relations.max_level,
                fetch_last_level_only: self.relations.fetch_last_level_only,
            },
            filters: vec![RelationEntityTypeFilter {
                relation_type: self.relations.relation_type.clone(),
                entity_types: vec!["DEVICE".to_string()],
                negate: self.relations.negate,
            }],
        }
    }

    pub async fn find_relations(&self, root_id: &str, token: &str) -> Result<Vec<EntityRelation>> {
        let url = format!("{}/api/relations", self.base_url);
        let query = self.relations_query(root_id);
        debug!("POST {} (root {})", url, root_id);

        let resp = self
            .http
            .post(&url)
            .header("X-Authorization", format!("Bearer {}", token))
            .json(&query)
            .send()
            .await
            .context("failed to send relation query")?;

        read_json(resp).await
    }

    /// Most recent value of a timeseries key, if any
    pub async fn latest_timeseries(
        &self,
        device_id: &str,
        key: &str,
        token: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/api/plugins/telemetry/DEVICE/{}/values/timeseries",
            self.base_url, device_id
        );
        let body: TimeseriesResponse = self.get_json(&url, key, token).await?;

        Ok(body
            .get(key)
            .and_then(|values| values.first())
            .and_then(|v| value_as_text(&v.value)))
    }

    /// Value of an attribute key, if set
    pub async fn attribute(&self, device_id: &str, key: &str, token: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/api/plugins/telemetry/DEVICE/{}/values/attributes",
            self.base_url, device_id
        );
        let body: Vec<AttributeValue> = self.get_json(&url, key, token).await?;

        Ok(body
            .iter()
            .find(|a| a.key == key)
            .or_else(|| body.first())
            .and_then(|a| value_as_text(&a.value)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, key: &str, token: &str) -> Result<T> {
        debug!("GET {}?keys={}", url, key);
        let resp = self
            .http
            .get(url)
            .query(&[("keys", key)])
            .header("X-Authorization", format!("Bearer {}", token))
            .header("accept", "application/json")
            .send()
            .await
            .with_context(|| format!("failed to read {}", key))?;

        read_json(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body_text = resp.text().await.unwrap_or_default();
        return Err(status_error(status, body_text));
    }
    resp.json().await.context("unexpected response body")
}

fn status_error(status: StatusCode, body_text: String) -> anyhow::Error {
    if status == StatusCode::UNAUTHORIZED {
        TokenRejected(format!("{}: {}", status, body_text)).into()
    } else {
        anyhow::anyhow!("request failed with status {}: {}", status, body_text)
    }
}

#[async_trait]
impl DeviceDirectory for ThingsBoardClient {
    async fn related_entities(&self, asset_id: &str, token: &str) -> Result<Vec<EntityId>> {
        let relations = self.find_relations(asset_id, token).await?;
        Ok(relations.into_iter().map(|r| r.to).collect())
    }

    async fn latest_telemetry(&self, device_id: &str, key: &str, token: &str) -> Result<Option<String>> {
        self.latest_timeseries(device_id, key, token).await
    }

    async fn attribute_value(&self, device_id: &str, key: &str, token: &str) -> Result<Option<String>> {
        self.attribute(device_id, key, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ThingsBoardConfig {
        ThingsBoardConfig {
            url: "https://tb.example.org/".to_string(),
            username: "ops".to_string(),
            password: "pw".to_string(),
            relations: RelationQueryConfig::default(),
        }
    }

    #[test]
    fn test_unauthorized_is_token_rejection() {
        let err = status_error(StatusCode::UNAUTHORIZED, "Token has expired".to_string());
        assert!(err.downcast_ref::<TokenRejected>().is_some());
        assert!(err.to_string().contains("Token has expired"));

        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, String::new());
        assert!(err.downcast_ref::<TokenRejected>().is_none());
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ThingsBoardClient::new(Client::new(), &config());
        assert_eq!(client.base_url, "https://tb.example.org");
    }

    #[test]
    fn test_relations_query_follows_config() {
        let mut cfg = config();
        cfg.relations.max_level = 4;
        cfg.relations.fetch_last_level_only = false;
        let client = ThingsBoardClient::new(Client::new(), &cfg);

        let query = client.relations_query("asset-9");
        assert_eq!(query.parameters.root_id, "asset-9");
        assert_eq!(query.parameters.root_type, "ASSET");
        assert_eq!(query.parameters.direction, "FROM");
        assert_eq!(query.parameters.max_level, 4);
        assert!(!query.parameters.fetch_last_level_only);
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].relation_type, "Contains");
        assert_eq!(query.filters[0].entity_types, vec!["DEVICE".to_string()]);
        assert!(query.filters[0].negate);
    }
}
