use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

/// Authentication server and response verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RavenConfig {
    /// Authentication endpoint users are redirected to.
    /// The demo server lives at `https://demo.raven.cam.ac.uk/auth/authenticate.html`.
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: Url,

    /// Maximum age of a callback response, in seconds, measured from its
    /// `issue` timestamp.
    #[serde(default = "default_timestamp_tolerance")]
    pub response_timestamp_tolerance_secs: u64,

    /// Reject responses issued further in the future than the tolerance.
    /// When false only the age of the response is checked.
    #[serde(default = "default_true")]
    pub reject_future_timestamps: bool,

    /// Verify responses against `test_keys` instead of `live_keys`.
    #[serde(default)]
    pub test_mode: bool,

    /// Explicit key used for every response regardless of `kid`.
    /// Takes precedence over both key sets.
    #[serde(default)]
    pub signing_key: Option<KeySource>,

    /// Production public keys, indexed by `kid`.
    #[serde(default)]
    pub live_keys: BTreeMap<String, KeySource>,

    /// Test server public keys, indexed by `kid`.
    #[serde(default)]
    pub test_keys: BTreeMap<String, KeySource>,

    /// Description of the protected resource, shown on the login page (`desc`).
    #[serde(default)]
    pub description: Option<String>,

    /// Why authentication is being requested, shown on the login page (`msg`).
    #[serde(default)]
    pub message: Option<String>,

    /// Interaction policy sent as `iact`.
    #[serde(default)]
    pub interact: Option<Interact>,

    /// Ask the server to report failures itself rather than returning a
    /// non-200 response (`fail=yes`).
    #[serde(default)]
    pub server_handles_failures: bool,
}

impl Default for RavenConfig {
    fn default() -> Self {
        Self {
            auth_endpoint: default_auth_endpoint(),
            response_timestamp_tolerance_secs: default_timestamp_tolerance(),
            reject_future_timestamps: true,
            test_mode: false,
            signing_key: None,
            live_keys: BTreeMap::new(),
            test_keys: BTreeMap::new(),
            description: None,
            message: None,
            interact: None,
            server_handles_failures: false,
        }
    }
}

impl RavenConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.auth_endpoint.scheme(), "https" | "http") {
            return Err(ConfigError::Validation(format!(
                "raven.auth_endpoint must be an http(s) URL, got '{}'",
                self.auth_endpoint
            )));
        }
        if self.auth_endpoint.cannot_be_a_base() {
            return Err(ConfigError::Validation(
                "raven.auth_endpoint must be an absolute URL".into(),
            ));
        }
        if self.response_timestamp_tolerance_secs == 0 {
            return Err(ConfigError::Validation(
                "raven.response_timestamp_tolerance_secs cannot be zero".into(),
            ));
        }
        if self.signing_key.is_none() && !self.test_mode && self.live_keys.is_empty() {
            return Err(ConfigError::Validation(
                "No signing keys configured: set raven.live_keys or raven.signing_key".into(),
            ));
        }
        if self.signing_key.is_none() && self.test_mode && self.test_keys.is_empty() {
            return Err(ConfigError::Validation(
                "raven.test_mode is enabled but no raven.test_keys are configured".into(),
            ));
        }
        Ok(())
    }
}

/// Where to load a public key from.
///
/// The PEM may hold an X.509 certificate (as published by the authentication
/// server) or a bare `PUBLIC KEY` / `RSA PUBLIC KEY` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySource {
    /// Inline PEM text.
    Pem { pem: String },
    /// Path to a PEM file.
    Path { path: PathBuf },
}

/// Value of the `iact` request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interact {
    /// Force the user to re-authenticate even with a live SSO session.
    Yes,
    /// Fail rather than interact with the user.
    No,
}

impl Interact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interact::Yes => "yes",
            Interact::No => "no",
        }
    }
}

fn default_auth_endpoint() -> Url {
    Url::parse("https://raven.cam.ac.uk/auth/authenticate.html").expect("static URL is valid")
}

fn default_timestamp_tolerance() -> u64 {
    60
}

fn default_true() -> bool {
    true
}
