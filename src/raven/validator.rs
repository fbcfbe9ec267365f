//! Validation of a parsed callback response.
//!
//! Checks run cheapest first: URL, timestamp, signature, then status. A
//! response is only interpreted once its signature has verified, and the
//! principal is only returned for a signed `200`.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthenticationResponse, KeyStore, RavenError, ResponseError, callback};
use crate::config::RavenConfig;

/// Status code for a successful authentication.
pub const STATUS_SUCCESS: u16 = 200;
/// Status code returned when the user cancels at the login page.
pub const STATUS_CANCELLED: u16 = 410;

/// Identity asserted by a verified response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub principal: String,
    pub ptags: Vec<String>,
    pub auth: Option<String>,
    pub sso: Vec<String>,
    pub life: Option<u64>,
    pub response_id: String,
}

/// Turns a parsed response into a [`VerifiedIdentity`] or a typed failure.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    keys: Arc<KeyStore>,
    tolerance_secs: u64,
    reject_future_timestamps: bool,
}

impl ResponseValidator {
    pub fn new(config: &RavenConfig, keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            tolerance_secs: config.response_timestamp_tolerance_secs,
            reject_future_timestamps: config.reject_future_timestamps,
        }
    }

    /// Validate `response` against the URL of the request that carried it.
    ///
    /// `request_url` is the full URL including the callback parameter; it is
    /// stripped before comparison.
    pub fn validate(
        &self,
        response: &AuthenticationResponse,
        request_url: &str,
    ) -> Result<VerifiedIdentity, RavenError> {
        self.validate_at(response, request_url, Utc::now())
    }

    pub fn validate_at(
        &self,
        response: &AuthenticationResponse,
        request_url: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedIdentity, RavenError> {
        self.check_url(response, request_url)?;
        self.check_timestamp(response, now)?;
        self.check_signature(response)?;
        interpret_status(response)
    }

    fn check_url(
        &self,
        response: &AuthenticationResponse,
        request_url: &str,
    ) -> Result<(), RavenError> {
        let expected = callback::strip_callback_param(request_url);
        if response.url != expected {
            return Err(RavenError::Url {
                expected,
                actual: response.url.clone(),
            });
        }
        Ok(())
    }

    fn check_timestamp(
        &self,
        response: &AuthenticationResponse,
        now: DateTime<Utc>,
    ) -> Result<(), RavenError> {
        let elapsed = now - response.issued_at;
        let tolerance = i64::try_from(self.tolerance_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);

        let too_old = elapsed > tolerance;
        let too_new = self.reject_future_timestamps && -elapsed > tolerance;
        if too_old || too_new {
            return Err(RavenError::Timestamp {
                issued_at: response.issued_at,
                now,
                tolerance_secs: self.tolerance_secs,
            });
        }
        Ok(())
    }

    fn check_signature(&self, response: &AuthenticationResponse) -> Result<(), RavenError> {
        let valid = self.keys.verify(
            response.signed_payload(),
            &response.signature,
            &response.kid,
        )?;
        if !valid {
            return Err(RavenError::Signature {
                kid: response.kid.clone(),
            });
        }
        Ok(())
    }
}

fn interpret_status(response: &AuthenticationResponse) -> Result<VerifiedIdentity, RavenError> {
    match response.status {
        STATUS_SUCCESS => {
            let principal = response
                .principal
                .clone()
                .filter(|p| !p.is_empty())
                .ok_or(ResponseError::MissingPrincipal)?;
            Ok(VerifiedIdentity {
                principal,
                ptags: response.ptags.clone(),
                auth: response.auth.clone(),
                sso: response.sso.clone(),
                life: response.life,
                response_id: response.id.clone(),
            })
        }
        STATUS_CANCELLED => Err(RavenError::UserCancelled),
        status => Err(RavenError::Authentication {
            status,
            message: response.message.clone(),
        }),
    }
}
