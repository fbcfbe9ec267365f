use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Session cookie and store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Cookie carrying the session id.
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,

    /// Idle lifetime of a session in seconds. Also used as the cookie max-age.
    #[serde(default = "default_session_duration")]
    pub duration_secs: u64,

    /// Secure cookie (HTTPS only).
    #[serde(default = "default_true")]
    pub secure: bool,

    /// SameSite cookie attribute.
    ///
    /// `strict` drops the cookie on the top-level navigation back from the
    /// authentication server, so every callback would be rejected as
    /// forbidden. Keep `lax` unless the server shares the application's site.
    #[serde(default)]
    pub same_site: SameSite,

    /// How often expired sessions are purged from the in-memory store, in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_session_cookie(),
            duration_secs: default_session_duration(),
            secure: true,
            same_site: SameSite::default(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl SessionConfig {
    /// Validate the session configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_name.is_empty() {
            return Err(ConfigError::Validation(
                "Session cookie name cannot be empty".into(),
            ));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::Validation(
                "Session duration cannot be zero".into(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Session cleanup interval cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

fn default_session_cookie() -> String {
    "__raven_session".to_string()
}

fn default_session_duration() -> u64 {
    60 * 60 * 8 // 8 hours
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_cookie_name_rejected() {
        let config = SessionConfig {
            cookie_name: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let config = SessionConfig {
            duration_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
