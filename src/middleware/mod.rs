mod raven_auth;

pub use raven_auth::{RavenAuthState, raven_auth_middleware};
