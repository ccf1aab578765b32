//! ThingsBoard platform access
//!
//! The platform owns the asset → device graph and the two per-device values
//! a frame needs:
//! - `data_UID` timeseries: the controller's rolling UID
//! - `dev_eui` attribute: the radio EUI used by the network server
//!
//! Reference: <https://thingsboard.io/docs/reference/rest-api/>

pub mod client;
pub mod session;
pub mod types;

pub use client::ThingsBoardClient;
pub use session::{Login, PasswordLogin, Session};

/// Timeseries key holding the rolling UID
pub const UID_TELEMETRY_KEY: &str = "data_UID";

/// Attribute key holding the device EUI
pub const EUI_ATTRIBUTE_KEY: &str = "dev_eui";
