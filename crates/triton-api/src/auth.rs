use axum::{
    Extension, Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::Redirect,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use triton_types::api::{
    AnonymousIdRequest, AnonymousSession, BaseResponse, OAuthCallbackQuery, OAuthIdRequest,
    RegisteredUser,
};
use triton_types::models::{Identity, User};

use crate::error::{AuthError, AuthResult};
use crate::identity::{self, OAUTH_CONFLICT};
use crate::oauth;
use crate::session;
use crate::state::AppState;

// -- OAuth redirect flow --

pub async fn oauth_login(State(state): State<AppState>) -> AuthResult<Redirect> {
    let now = Utc::now();
    let login_state = state
        .db
        .transaction(move |tx| oauth::begin_login(tx, now))
        .await?;
    Ok(Redirect::temporary(&state.oauth.authorize_url(&login_state)))
}

/// Provider callback. The state is checked before the code so a forged
/// callback never reaches the provider.
pub async fn oauth_callback(
    State(state): State<AppState>,
    query: Result<Query<OAuthCallbackQuery>, QueryRejection>,
) -> AuthResult<Redirect> {
    let Query(query) = query?;

    let presented = query.state.unwrap_or_default();
    let now = Utc::now();
    let redeemed = !presented.is_empty()
        && state
            .db
            .transaction(move |tx| oauth::redeem_state(tx, &presented, now))
            .await?;
    if !redeemed {
        warn!("OAuth callback with unknown or stale state");
        return Err(AuthError::Validation("Invalid OAuth state".into()));
    }

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AuthError::Validation("Code not found".into()))?;

    let subject = state.oauth.exchange(&code).await?;

    let lookup = subject.clone();
    let known = state
        .db
        .run(move |conn| identity::find_oauth(conn, &lookup))
        .await?;

    let token = state
        .db
        .transaction(move |tx| {
            let user_id = identity::resolve_oauth(tx, &subject, known)?;
            session::issue_session(tx, user_id)
        })
        .await
        .map_err(|e| e.on_conflict(OAUTH_CONFLICT))?;

    info!(user_id = %token.user_id, "OAuth login complete");

    let mut target = state.frontend_callback.clone();
    target
        .query_pairs_mut()
        .append_pair("token", &token.plaintext);
    Ok(Redirect::temporary(target.as_str()))
}

// -- Registration --

pub async fn register_oauth(
    State(state): State<AppState>,
    body: Result<Json<OAuthIdRequest>, JsonRejection>,
) -> AuthResult<Json<BaseResponse<RegisteredUser>>> {
    let Json(req) = body?;
    let oauth_id = required_oauth_id(req.oauth_id)?;

    let user_id = state
        .db
        .transaction(move |tx| identity::register_oauth(tx, &oauth_id))
        .await?;

    Ok(Json(BaseResponse::ok(
        "OAuth user successfully registered",
        Some(RegisteredUser { user_id }),
    )))
}

/// Create an anonymous user and hand back its first session token.
pub async fn register_anonymous(
    State(state): State<AppState>,
) -> AuthResult<Json<BaseResponse<AnonymousSession>>> {
    let token = state
        .db
        .transaction(|tx| {
            let user_id = identity::resolve_anonymous(tx)?;
            session::issue_session(tx, user_id)
        })
        .await?;

    Ok(Json(BaseResponse::ok(
        "Anonymous user successfully registered",
        Some(AnonymousSession {
            user_id: token.user_id,
            token: token.plaintext,
            expiry: token.expiry,
        }),
    )))
}

// -- Lookups --

pub async fn get_oauth_user(
    State(state): State<AppState>,
    body: Result<Json<OAuthIdRequest>, JsonRejection>,
) -> AuthResult<Json<BaseResponse<Uuid>>> {
    let Json(req) = body?;
    let oauth_id = required_oauth_id(req.oauth_id)?;

    let user_id = state
        .db
        .run(move |conn| identity::lookup_oauth(conn, &oauth_id))
        .await?;

    Ok(Json(BaseResponse::ok(
        "OAuth user successfully retrieved",
        Some(user_id),
    )))
}

pub async fn get_anonymous_user(
    State(state): State<AppState>,
    body: Result<Json<AnonymousIdRequest>, JsonRejection>,
) -> AuthResult<Json<BaseResponse<Uuid>>> {
    let Json(req) = body?;
    let user_id = state
        .db
        .run(move |conn| identity::lookup_anonymous(conn, req.user_id))
        .await?;

    Ok(Json(BaseResponse::ok(
        "Anonymous user successfully retrieved",
        Some(user_id),
    )))
}

// -- Session --

pub async fn logout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> AuthResult<Json<BaseResponse<()>>> {
    let Identity::User(user) = identity else {
        return Err(AuthError::not_logged_in());
    };

    let user_id = user.id;
    state
        .db
        .transaction(move |tx| session::invalidate_sessions(tx, user_id))
        .await?;

    Ok(Json(BaseResponse::ok("Successfully logged out", None)))
}

pub async fn me(Extension(identity): Extension<Identity>) -> AuthResult<Json<BaseResponse<User>>> {
    match identity {
        Identity::User(user) => Ok(Json(BaseResponse::ok(
            "User successfully retrieved",
            Some(user),
        ))),
        Identity::Anonymous => Err(AuthError::not_logged_in()),
    }
}

fn required_oauth_id(oauth_id: String) -> AuthResult<String> {
    let oauth_id = oauth_id.trim();
    if oauth_id.is_empty() {
        return Err(AuthError::Validation("oauth_id must be provided".into()));
    }
    Ok(oauth_id.to_string())
}
