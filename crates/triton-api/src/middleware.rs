use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::debug;

use triton_db::queries;
use triton_types::models::Identity;

use crate::error::{AuthError, AuthResult};
use crate::state::{AppState, AppStateInner};
use crate::token::{self, SCOPE_AUTHENTICATION};

/// Resolve the caller's [`Identity`] and store it in the request extensions.
///
/// A request with no `Authorization` header continues as
/// `Identity::Anonymous`. A header that is present but malformed, unknown or
/// expired ends the request with 401; it is never downgraded to anonymous.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let mut response = match resolve_identity(&state, req.headers()).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

pub async fn resolve_identity(state: &AppStateInner, headers: &HeaderMap) -> AuthResult<Identity> {
    let value = match headers.get(header::AUTHORIZATION) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(Identity::Anonymous),
    };

    let token = value
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or_else(AuthError::invalid_token)?;

    token::validate_shape(token)?;

    let hash = token::digest(token);
    let now = Utc::now();
    let user = state
        .db
        .run(move |conn| queries::find_user_by_token(conn, &hash, SCOPE_AUTHENTICATION, now))
        .await?;

    match user {
        Some(user) => Ok(Identity::User(user)),
        None => {
            debug!("Rejected unknown or expired bearer token");
            Err(AuthError::invalid_token())
        }
    }
}

/// `Bearer <token>`: exactly two space-separated parts, scheme spelled as-is.
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}
