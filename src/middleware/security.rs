use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, state::AppState};

/// Rejects requests whose `Host` is not in `TRUSTED_HOSTS`. A `*` entry (the
/// default) disables the check.
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let trusted = &state.config.trusted_hosts;
    if trusted.is_empty() || trusted.iter().any(|host| host == "*") {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(strip_port)
        .unwrap_or_default()
        .to_ascii_lowercase();

    if trusted.iter().any(|allowed| host_matches(allowed, &host)) {
        return next.run(request).await;
    }

    tracing::warn!(host = %host, "Rejected request for untrusted host");
    AppError::Validation("Invalid host header.".to_string()).into_response()
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split(']').next().map_or(host, |inner| &host[..=inner.len()]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

/// `*.example.com` matches subdomains of example.com, anything else must match
/// exactly.
fn host_matches(allowed: &str, host: &str) -> bool {
    let allowed = allowed.trim().to_ascii_lowercase();
    match allowed.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .is_some_and(|prefix| prefix.ends_with('.')),
        None => allowed == host,
    }
}
