use axum::Extension;

use crate::gate::RavenPrincipal;

/// The protected page.
pub async fn index(Extension(principal): Extension<RavenPrincipal>) -> String {
    format!("Logged in as {}", principal.principal)
}
