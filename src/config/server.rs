use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible origin of the application (scheme, host and
    /// optional port), e.g. `https://intranet.example.ac.uk`.
    ///
    /// Used to rebuild the absolute URL of each request, which is sent to the
    /// authentication server as the return URL and compared against the `url`
    /// field of its response. When unset the origin is taken from the `Host`
    /// header.
    #[serde(default)]
    pub public_url: Option<Url>,

    /// Trust `X-Forwarded-Proto` when rebuilding request URLs without
    /// `public_url`. Only enable behind a reverse proxy that sets it.
    #[serde(default)]
    pub trust_forwarded_proto: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            trust_forwarded_proto: false,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(public_url) = &self.public_url {
            if !matches!(public_url.scheme(), "https" | "http") {
                return Err(ConfigError::Validation(format!(
                    "server.public_url must be an http(s) URL, got '{}'",
                    public_url
                )));
            }
            if public_url.host_str().is_none() {
                return Err(ConfigError::Validation(
                    "server.public_url must include a host".into(),
                ));
            }
            if public_url.path() != "/" || public_url.query().is_some() {
                return Err(ConfigError::Validation(
                    "server.public_url must be an origin without path or query".into(),
                ));
            }
        }
        Ok(())
    }

    /// Origin used to rebuild request URLs, without a trailing slash.
    pub fn public_origin(&self) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|url| url.origin().ascii_serialization())
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    5000
}
