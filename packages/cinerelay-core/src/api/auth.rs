//! Shared-secret checks for the admin routes and the plugin socket.

use std::collections::HashMap;

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::AppState;
use crate::error::RelayError;
use crate::protocol_constants::{ADMIN_KEY_HEADER, PLUGIN_TOKEN_PARAMS};
use crate::state::Config;

/// Rejects admin requests whose `x-admin-key` header does not match the
/// configured key. Passes everything through when no key is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, RelayError> {
    if let Some(expected) = state.config.effective_admin_key() {
        let provided = request
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            log::warn!("[Auth] Rejected admin request to {}", request.uri().path());
            return Err(RelayError::Unauthorized("invalid admin key".into()));
        }
    }
    Ok(next.run(request).await)
}

/// Refuses a plugin socket upgrade with 401 when the query string does not
/// carry the configured plugin token.
pub async fn require_plugin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, RelayError> {
    let params = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .unwrap_or_default();
    if !plugin_token_valid(&state.config, &params) {
        log::warn!("[Auth] Rejected plugin socket: invalid plugin token");
        return Err(RelayError::Unauthorized("invalid plugin token".into()));
    }
    Ok(next.run(request).await)
}

/// Whether the plugin socket query carries the configured plugin token
/// under `token`, `key` or `auth` (first non-empty wins).
pub fn plugin_token_valid(config: &Config, params: &HashMap<String, String>) -> bool {
    let Some(expected) = config.effective_plugin_token() else {
        return true;
    };
    PLUGIN_TOKEN_PARAMS
        .iter()
        .find_map(|name| params.get(*name).filter(|value| !value.is_empty()))
        .is_some_and(|provided| provided == expected)
}
