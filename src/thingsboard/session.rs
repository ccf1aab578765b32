//! ThingsBoard login session
//!
//! Holds the bearer token for the process lifetime and refreshes it once it
//! is close to expiry. The refresh runs with the cache lock held, so
//! concurrent invocations that find the token stale wait for the single
//! in-flight login and then reuse its result.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::types::{LoginRequest, LoginResponse};
use crate::config::ThingsBoardConfig;
use crate::error::BridgeError;
use crate::pipeline::TokenProvider;

/// Lifetime assumed for tokens without a readable `exp` claim
const FALLBACK_TOKEN_TTL_SECS: i64 = 300;

/// Refresh this long before the advertised expiry
const EXPIRY_SKEW_SECS: i64 = 30;

/// Something that can exchange credentials for a fresh JWT
#[async_trait]
pub trait Login: Send + Sync {
    async fn login(&self) -> Result<String>;
}

/// Username/password login against `POST /api/auth/login`
pub struct PasswordLogin {
    http: Client,
    login_url: String,
    username: String,
    password: String,
}

impl PasswordLogin {
    pub fn new(http: Client, config: &ThingsBoardConfig) -> Self {
        Self {
            http,
            login_url: format!("{}/api/auth/login", config.url.trim_end_matches('/')),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

#[async_trait]
impl Login for PasswordLogin {
    async fn login(&self) -> Result<String> {
        info!("Logging in to ThingsBoard as {}...", self.username);

        let resp = self
            .http
            .post(&self.login_url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .context("failed to send login request")?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("login failed with status {}: {}", status, body_text);
        }

        let body: LoginResponse = resp.json().await.context("invalid login response")?;
        Ok(body.token)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Cached bearer token with single-flight refresh
pub struct Session<L> {
    login: L,
    cached: Mutex<Option<CachedToken>>,
}

impl<L: Login> Session<L> {
    pub fn new(login: L) -> Self {
        Self {
            login,
            cached: Mutex::new(None),
        }
    }

    /// When the cached token (if any) expires
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.cached.lock().await.as_ref().map(|c| c.expires_at)
    }
}

#[async_trait]
impl<L: Login> TokenProvider for Session<L> {
    async fn access_token(&self) -> Result<String, BridgeError> {
        let mut cached = self.cached.lock().await;

        if let Some(current) = cached.as_ref() {
            if Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) < current.expires_at {
                return Ok(current.token.clone());
            }
            debug!("ThingsBoard token expired at {}", current.expires_at);
        }

        let token = self.login.login().await.map_err(|e| {
            error!("Error logging in to ThingsBoard: {:#}", e);
            BridgeError::AuthFailure(format!("{:#}", e))
        })?;

        let expires_at = token_expiry(&token)
            .unwrap_or_else(|| Utc::now() + Duration::seconds(FALLBACK_TOKEN_TTL_SECS));
        info!("Successfully logged in to ThingsBoard (token valid until {})", expires_at);

        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    async fn invalidate(&self) {
        debug!("Dropping cached ThingsBoard token");
        *self.cached.lock().await = None;
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT without verifying its signature
pub fn token_expiry(jwt: &str) -> Option<DateTime<Utc>> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}
