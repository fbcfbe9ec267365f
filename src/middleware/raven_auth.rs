//! axum binding for [`RavenGate`].
//!
//! Maps the session cookie to a [`UserSession`], rebuilds the absolute request
//! URL, runs the gate and turns its outcome into a response. On admission the
//! [`crate::gate::RavenPrincipal`] is inserted into request extensions for the handler.

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite as CookieSameSite, time::Duration as CookieDuration},
};
use uuid::Uuid;

use crate::{
    config::{SameSite, ServerConfig, SessionConfig},
    gate::{CurrentRequest, GateError, GateOutcome, RavenGate, Rejection},
    session::{SessionError, SessionStore, SharedSessionStore, UserSession, new_session_id},
};

/// State for [`raven_auth_middleware`].
#[derive(Clone)]
pub struct RavenAuthState {
    gate: Arc<RavenGate>,
    sessions: SharedSessionStore,
    session_config: Arc<SessionConfig>,
    server_config: Arc<ServerConfig>,
}

impl RavenAuthState {
    pub fn new(
        gate: Arc<RavenGate>,
        sessions: SharedSessionStore,
        session_config: SessionConfig,
        server_config: ServerConfig,
    ) -> Self {
        Self {
            gate,
            sessions,
            session_config: Arc::new(session_config),
            server_config: Arc::new(server_config),
        }
    }
}

/// Middleware that requires a Raven-authenticated session.
///
/// Requires `tower_cookies::CookieManagerLayer` further out in the stack.
pub async fn raven_auth_middleware(
    State(state): State<RavenAuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    // Get cookies from request extensions (set by CookieManagerLayer)
    let Some(cookies) = req.extensions().get::<Cookies>().cloned() else {
        tracing::error!("raven_auth_middleware requires CookieManagerLayer");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let Some(url) = request_url(&state.server_config, &req) else {
        tracing::warn!("Cannot determine request URL: no Host header");
        return Rejection::BadRequest.into_response();
    };
    let current = CurrentRequest::new(req.method().clone(), url);

    let store = state.sessions.as_ref();
    let cookie_id = match known_session_id(&cookies, &state.session_config, store).await {
        Ok(id) => id,
        Err(e) => return GateError::from(e).into_response(),
    };
    let mut session = UserSession::new(
        state.sessions.clone(),
        cookie_id.clone().unwrap_or_else(new_session_id),
    );

    let outcome = state
        .gate
        .handle(&current, &mut session, |principal| async move {
            req.extensions_mut().insert(principal);
            next.run(req).await
        })
        .await;

    // New visitors and freshly authenticated sessions get a new cookie.
    if cookie_id.as_deref() != Some(session.id()) {
        cookies.add(session_cookie(&state.session_config, session.id().to_string()));
        tracing::debug!(session_id = %session.id(), "Issued session cookie");
    }

    match outcome {
        Ok(GateOutcome::Admitted(response)) => response,
        Ok(GateOutcome::Redirect(target)) => Redirect::to(&target).into_response(),
        Ok(GateOutcome::Rejected(rejection)) => rejection.into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let message = match self {
            Rejection::Forbidden => "Forbidden",
            Rejection::MethodNotAllowed => "Method Not Allowed",
            Rejection::BadRequest => "Bad Request",
            Rejection::Cancelled => "Authentication cancelled",
        };
        let mut response = (self.status_code(), message).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Authentication gate failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// The session id from the cookie, if it names a session the store issued.
///
/// Ids the store does not know are discarded so a client cannot choose its
/// own session id.
async fn known_session_id(
    cookies: &Cookies,
    config: &SessionConfig,
    store: &dyn SessionStore,
) -> Result<Option<String>, SessionError> {
    let Some(cookie) = cookies.get(&config.cookie_name) else {
        return Ok(None);
    };
    let Ok(id) = Uuid::parse_str(cookie.value()) else {
        return Ok(None);
    };
    let id = id.to_string();
    if store.contains(&id).await? {
        Ok(Some(id))
    } else {
        tracing::debug!(session_id = %id, "Ignoring unknown session id");
        Ok(None)
    }
}

fn session_cookie(config: &SessionConfig, id: String) -> Cookie<'static> {
    let same_site = match config.same_site {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    };
    Cookie::build((config.cookie_name.clone(), id))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(same_site)
        .max_age(CookieDuration::seconds(config.duration_secs as i64))
        .build()
}

/// Absolute URL of `req` as the visitor sees it.
///
/// Uses `server.public_url` as the origin when set, otherwise the `Host`
/// header with `X-Forwarded-Proto` (if trusted) or `http`.
fn request_url(server: &ServerConfig, req: &Request) -> Option<String> {
    let uri = req
        .extensions()
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or_else(|| req.uri());
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());

    if let Some(origin) = server.public_origin() {
        return Some(format!("{}{}", origin, path));
    }

    let host = host(req.headers()).or_else(|| uri.authority().map(|a| a.as_str().to_string()))?;
    let scheme = if server.trust_forwarded_proto {
        forwarded_proto(req.headers()).unwrap_or("http")
    } else {
        "http"
    };
    Some(format!("{}://{}{}", scheme, host, path))
}

fn host(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(|h| h.to_string())
}

fn forwarded_proto(headers: &HeaderMap) -> Option<&'static str> {
    let value = headers.get("x-forwarded-proto")?.to_str().ok()?;
    // A proxy chain may append values; the first is the client-facing one.
    match value.split(',').next()?.trim() {
        p if p.eq_ignore_ascii_case("https") => Some("https"),
        p if p.eq_ignore_ascii_case("http") => Some("http"),
        _ => None,
    }
}
