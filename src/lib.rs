//! ThingsBoard → ChirpStack downlink bridge for streetlight controllers
//!
//! Given an asset, resolve the devices it contains, build one command frame
//! per device from its rolling UID and enqueue it on the network server,
//! one device at a time.

#[cfg(feature = "server")]
pub mod api;
pub mod chirpstack;
pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod thingsboard;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

pub use error::{BridgeError, Result};
pub use frame::Action;
pub use pipeline::{DispatchReport, Dispatcher};

/// reqwest client with a bound on every request
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build reqwest client")
}

/// Wire the ThingsBoard session/client and the ChirpStack queue into a
/// dispatcher
pub fn build_dispatcher(config: &config::Config) -> anyhow::Result<Dispatcher> {
    let http = http_client(config.dispatch.request_timeout())?;

    let session = thingsboard::Session::new(thingsboard::PasswordLogin::new(
        http.clone(),
        &config.thingsboard,
    ));
    let directory = thingsboard::ThingsBoardClient::new(http.clone(), &config.thingsboard);
    let queue = chirpstack::ChirpStackClient::new(http, &config.chirpstack);

    Ok(Dispatcher::new(
        Arc::new(directory),
        Arc::new(queue),
        Arc::new(session),
        config.dispatch.pacing(),
    ))
}
