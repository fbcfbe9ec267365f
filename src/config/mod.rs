//! Configuration module for the Raven authentication gate.
//!
//! The gate is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5000
//! public_url = "https://intranet.example.ac.uk"
//!
//! [raven]
//! auth_endpoint = "https://raven.cam.ac.uk/auth/authenticate.html"
//! response_timestamp_tolerance_secs = 60
//!
//! [raven.live_keys]
//! "2" = { path = "/etc/raven/pubkey2.crt" }
//! ```

mod observability;
mod raven;
mod server;
mod session;

use std::path::Path;

use once_cell::sync::Lazy;
pub use observability::*;
pub use raven::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use session::*;

use crate::raven::KeyError;

/// Root configuration for the gate.
///
/// All sections are optional with sensible defaults, but a deployment must
/// provide at least one signing key (live, test or override) for
/// [`RavenGateConfig::validate`] to pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RavenGateConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication server and response verification settings.
    #[serde(default)]
    pub raven: RavenConfig,

    /// Session cookie and store configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl RavenGateConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let mut config: RavenGateConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.raven.validate()?;
        self.session.validate()?;
        Ok(())
    }

    /// Valid but risky settings, for logging once a subscriber is installed.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.public_url.is_none() && !self.server.host.is_loopback() {
            warnings.push(
                "server.public_url is not set and the server binds to a non-localhost \
                 address. Return URLs will be rebuilt from the client-supplied Host header. \
                 Set server.public_url for production deployments."
                    .to_string(),
            );
        }

        if self.raven.test_mode {
            warnings.push(
                "raven.test_mode is enabled: responses are verified against the test key set. \
                 Never enable test mode in production."
                    .to_string(),
            );
        }

        if matches!(self.session.same_site, SameSite::Strict) {
            warnings.push(
                "session.same_site = \"strict\" prevents the session cookie from being sent \
                 on the redirect back from the authentication server"
                    .to_string(),
            );
        }

        warnings
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Signing key configuration error: {0}")]
    Key(#[from] KeyError),
}

static ENV_VAR_PATTERN: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid"));

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR_PATTERN.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = RavenGateConfig::from_str(
            r#"
            [raven.live_keys]
            "2" = { pem = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----" }
        "#,
        )
        .unwrap();

        assert_eq!(
            config.raven.auth_endpoint.as_str(),
            "https://raven.cam.ac.uk/auth/authenticate.html"
        );
        assert_eq!(config.raven.response_timestamp_tolerance_secs, 60);
        assert!(!config.raven.test_mode);
        assert!(config.raven.live_keys.contains_key("2"));
    }

    #[test]
    fn test_full_config() {
        let config = RavenGateConfig::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 8000
            public_url = "https://intranet.example.ac.uk"

            [raven]
            auth_endpoint = "https://demo.raven.cam.ac.uk/auth/authenticate.html"
            response_timestamp_tolerance_secs = 30
            test_mode = true
            description = "Department intranet"
            interact = "yes"

            [raven.test_keys]
            "901" = { path = "/etc/raven/pubkey901.crt" }

            [session]
            cookie_name = "intranet_session"
            secure = false

            [observability.logging]
            level = "debug"
            format = "json"
        "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.raven.response_timestamp_tolerance_secs, 30);
        assert!(config.raven.test_mode);
        assert_eq!(config.raven.interact, Some(Interact::Yes));
        assert_eq!(config.session.cookie_name, "intranet_session");
        assert_eq!(config.observability.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = RavenGateConfig::from_str(
            r#"
            [raven]
            endpoint = "https://raven.cam.ac.uk/auth/authenticate.html"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_default_config_has_no_warnings() {
        let config = RavenGateConfig::from_str(
            r#"
            [raven.live_keys]
            "2" = { path = "/etc/raven/pubkey2.crt" }
        "#,
        )
        .unwrap();
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn test_risky_settings_are_reported() {
        let config = RavenGateConfig::from_str(
            r#"
            [server]
            host = "0.0.0.0"

            [raven]
            test_mode = true

            [raven.test_keys]
            "901" = { path = "/etc/raven/pubkey901.crt" }

            [session]
            same_site = "strict"
        "#,
        )
        .unwrap();

        let warnings = config.warnings();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("server.public_url"));
        assert!(warnings[1].contains("raven.test_mode"));
        assert!(warnings[2].contains("session.same_site"));
    }

    #[test]
    fn test_no_keys_rejected() {
        let result = RavenGateConfig::from_str("[raven]\ntest_mode = false\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("TEST_RAVEN_KEY_PATH", Some("/etc/raven/pubkey2.crt"), || {
            let result = expand_env_vars("path = \"${TEST_RAVEN_KEY_PATH}\"").unwrap();
            assert_eq!(result, "path = \"/etc/raven/pubkey2.crt\"");
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# path = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# path = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_env_var_after_comment_ignored() {
        let result = expand_env_vars("key = \"value\" # ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "key = \"value\" # ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_missing_env_var_is_error() {
        temp_env::with_var_unset("TEST_RAVEN_MISSING", || {
            let result = expand_env_vars("key = \"${TEST_RAVEN_MISSING}\"");
            assert!(matches!(result, Err(ConfigError::EnvVarNotFound(name)) if name == "TEST_RAVEN_MISSING"));
        });
    }
}
