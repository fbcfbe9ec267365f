//! Per-request authentication state machine.
//!
//! [`RavenGate::handle`] wraps a protected operation. It either admits the
//! caller and runs the operation, redirects (to the authentication server or
//! back to the clean page after a callback), or rejects the request. The gate
//! knows nothing about HTTP framing; [`crate::middleware`] adapts it to axum.

use std::{future::Future, sync::Arc};

use http::{Method, StatusCode};

use crate::{
    config::{ConfigError, RavenConfig},
    raven::{
        AuthenticationResponse, KeyError, KeyStore, RavenError, RequestBuilder, ResponseValidator,
        callback_values, strip_callback_param,
    },
    session::{SessionError, SessionState, UserSession},
};

/// The parts of the current request the gate looks at.
#[derive(Debug, Clone)]
pub struct CurrentRequest {
    pub method: Method,
    /// Absolute URL as the visitor requested it, query included.
    pub url: String,
}

impl CurrentRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Callback arrived without a pending authentication.
    Forbidden,
    /// Callback arrived on a method other than GET.
    MethodNotAllowed,
    /// Callback was duplicated, malformed or failed validation.
    BadRequest,
    /// The user cancelled at the login page.
    Cancelled,
}

impl Rejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Rejection::Forbidden => StatusCode::FORBIDDEN,
            Rejection::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Rejection::BadRequest | Rejection::Cancelled => StatusCode::BAD_REQUEST,
        }
    }
}

/// What the gate decided for one request.
#[derive(Debug)]
pub enum GateOutcome<T> {
    /// The protected operation ran; its result is returned unchanged.
    Admitted(T),
    /// 303 See Other to this URL.
    Redirect(String),
    Rejected(Rejection),
}

/// Failures that mean the gate itself cannot work, as opposed to a bad request.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Signing key configuration error: {0}")]
    Config(#[from] KeyError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// The authenticated visitor, handed to the protected operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RavenPrincipal {
    pub principal: String,
    pub ptags: Vec<String>,
}

/// Authentication gate shared by all requests.
#[derive(Debug, Clone)]
pub struct RavenGate {
    builder: RequestBuilder,
    validator: ResponseValidator,
}

impl RavenGate {
    /// Build a gate, loading every configured signing key.
    pub fn new(config: &RavenConfig) -> Result<Self, ConfigError> {
        let keys = KeyStore::from_config(config)?;
        Self::with_key_store(config, keys)
    }

    /// Build a gate around an already loaded key store.
    pub fn with_key_store(config: &RavenConfig, keys: KeyStore) -> Result<Self, ConfigError> {
        Ok(Self {
            builder: RequestBuilder::from_config(config)?,
            validator: ResponseValidator::new(config, Arc::new(keys)),
        })
    }

    /// Run `operation` if the visitor is authenticated, otherwise drive the
    /// login flow.
    ///
    /// A successful callback moves the session to a new id; callers that
    /// carry the id to the client must re-read [`UserSession::id`].
    pub async fn handle<F, Fut, T>(
        &self,
        request: &CurrentRequest,
        session: &mut UserSession,
        operation: F,
    ) -> Result<GateOutcome<T>, GateError>
    where
        F: FnOnce(RavenPrincipal) -> Fut,
        Fut: Future<Output = T>,
    {
        let callbacks = request.query().map(callback_values).unwrap_or_default();
        if !callbacks.is_empty() {
            return self.handle_callback(request, session, callbacks).await;
        }

        match session.state().await? {
            SessionState::Authenticated { principal, ptags } if !principal.is_empty() => {
                let output = operation(RavenPrincipal { principal, ptags }).await;
                Ok(GateOutcome::Admitted(output))
            }
            _ => {
                session.set_state(&SessionState::PendingVerification).await?;
                let target = self.builder.redirect_url(&request.url);
                tracing::debug!(
                    session_id = %session.id(),
                    return_url = %request.url,
                    "Redirecting to authentication server"
                );
                Ok(GateOutcome::Redirect(target))
            }
        }
    }

    async fn handle_callback<T>(
        &self,
        request: &CurrentRequest,
        session: &mut UserSession,
        callbacks: Vec<String>,
    ) -> Result<GateOutcome<T>, GateError> {
        if session.state().await? != SessionState::PendingVerification {
            tracing::warn!(
                session_id = %session.id(),
                "Callback received without a pending authentication"
            );
            return Ok(GateOutcome::Rejected(Rejection::Forbidden));
        }
        if request.method != Method::GET {
            tracing::warn!(method = %request.method, "Callback received on non-GET request");
            return Ok(GateOutcome::Rejected(Rejection::MethodNotAllowed));
        }
        let [raw] = callbacks.as_slice() else {
            tracing::warn!(count = callbacks.len(), "Callback parameter repeated");
            return Ok(GateOutcome::Rejected(Rejection::BadRequest));
        };

        let result = AuthenticationResponse::parse(raw)
            .map_err(RavenError::from)
            .and_then(|response| self.validator.validate(&response, &request.url));

        match result {
            Ok(identity) => {
                let previous_id = session.id().to_string();
                session.regenerate().await?;
                tracing::info!(
                    previous_session_id = %previous_id,
                    session_id = %session.id(),
                    principal = %identity.principal,
                    auth = identity.auth.as_deref().unwrap_or(""),
                    response_id = %identity.response_id,
                    "Authentication succeeded"
                );
                session
                    .set_state(&SessionState::Authenticated {
                        principal: identity.principal,
                        ptags: identity.ptags,
                    })
                    .await?;
                Ok(GateOutcome::Redirect(strip_callback_param(&request.url)))
            }
            Err(RavenError::Config(e)) => {
                tracing::error!(error = %e, "Cannot verify authentication response");
                Err(GateError::Config(e))
            }
            Err(RavenError::UserCancelled) => {
                tracing::info!(session_id = %session.id(), "User cancelled authentication");
                session.set_state(&SessionState::NoSession).await?;
                Ok(GateOutcome::Rejected(Rejection::Cancelled))
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id(),
                    check = e.kind(),
                    error = %e,
                    "Authentication response rejected"
                );
                session.set_state(&SessionState::NoSession).await?;
                Ok(GateOutcome::Rejected(Rejection::BadRequest))
            }
        }
    }
}
