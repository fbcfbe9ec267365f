//! Construction of the redirect to the authentication server.

use url::Url;

use crate::config::{ConfigError, Interact, RavenConfig};

/// Protocol version requested from the authentication server.
pub const PROTOCOL_VERSION: u32 = 3;

/// One outgoing authentication request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    pub version: u32,
    pub return_url: String,
}

impl AuthenticationRequest {
    pub fn new(return_url: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            return_url: return_url.into(),
        }
    }
}

/// Builds `<endpoint>?ver=<version>&url=<return url>` redirect targets.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    endpoint: Url,
    description: Option<String>,
    message: Option<String>,
    interact: Option<Interact>,
    server_handles_failures: bool,
}

impl RequestBuilder {
    /// Create a builder, rejecting an endpoint that cannot carry a query.
    pub fn from_config(config: &RavenConfig) -> Result<Self, ConfigError> {
        let endpoint = config.auth_endpoint.clone();
        if !matches!(endpoint.scheme(), "https" | "http") || endpoint.cannot_be_a_base() {
            return Err(ConfigError::Validation(format!(
                "Invalid authentication endpoint '{}'",
                endpoint
            )));
        }

        Ok(Self {
            endpoint,
            description: config.description.clone(),
            message: config.message.clone(),
            interact: config.interact,
            server_handles_failures: config.server_handles_failures,
        })
    }

    /// Redirect URL for `request`, query values form-urlencoded.
    pub fn build(&self, request: &AuthenticationRequest) -> String {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("ver", &request.version.to_string())
                .append_pair("url", &request.return_url);
            if let Some(description) = &self.description {
                query.append_pair("desc", description);
            }
            if let Some(message) = &self.message {
                query.append_pair("msg", message);
            }
            if let Some(interact) = self.interact {
                query.append_pair("iact", interact.as_str());
            }
            if self.server_handles_failures {
                query.append_pair("fail", "yes");
            }
        }
        url.into()
    }

    /// Redirect URL returning the user to `return_url` at the current protocol version.
    pub fn redirect_url(&self, return_url: &str) -> String {
        self.build(&AuthenticationRequest::new(return_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(config: RavenConfig) -> RequestBuilder {
        RequestBuilder::from_config(&config).unwrap()
    }

    #[test]
    fn test_default_redirect_url() {
        let url = builder(RavenConfig::default()).redirect_url("http://localhost:5000/");
        assert_eq!(
            url,
            "https://raven.cam.ac.uk/auth/authenticate.html?ver=3&url=http%3A%2F%2Flocalhost%3A5000%2F"
        );
    }

    #[test]
    fn test_return_url_query_is_encoded() {
        let url = builder(RavenConfig::default())
            .redirect_url("https://example.ac.uk/search?q=a b&page=2");
        assert!(url.ends_with("url=https%3A%2F%2Fexample.ac.uk%2Fsearch%3Fq%3Da+b%26page%3D2"));
    }

    #[test]
    fn test_explicit_version() {
        let request = AuthenticationRequest {
            version: 1,
            return_url: "https://example.ac.uk/".into(),
        };
        let url = builder(RavenConfig::default()).build(&request);
        assert!(url.contains("?ver=1&url="));
    }

    #[test]
    fn test_optional_parameters() {
        let config = RavenConfig {
            description: Some("Staff intranet".into()),
            message: Some("you asked for the staff list".into()),
            interact: Some(Interact::Yes),
            server_handles_failures: true,
            ..Default::default()
        };
        let url = builder(config).redirect_url("https://example.ac.uk/");
        assert!(url.contains("&desc=Staff+intranet"));
        assert!(url.contains("&msg=you+asked+for+the+staff+list"));
        assert!(url.contains("&iact=yes"));
        assert!(url.ends_with("&fail=yes"));
    }

    #[test]
    fn test_endpoint_with_existing_query() {
        let config = RavenConfig {
            auth_endpoint: Url::parse("https://sso.example.ac.uk/wls?realm=dept").unwrap(),
            ..Default::default()
        };
        let url = builder(config).redirect_url("https://example.ac.uk/");
        assert!(url.starts_with("https://sso.example.ac.uk/wls?realm=dept&ver=3&url="));
    }

    #[test]
    fn test_invalid_endpoint_rejected_at_construction() {
        let config = RavenConfig {
            auth_endpoint: Url::parse("mailto:raven@example.ac.uk").unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            RequestBuilder::from_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }
}
