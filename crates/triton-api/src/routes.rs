use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth;
use crate::health::health;
use crate::middleware::authenticate;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login/oauth", get(auth::oauth_login))
        .route("/callback/oauth", get(auth::oauth_callback))
        .route("/register/oauth", post(auth::register_oauth))
        .route("/register/anonymous", post(auth::register_anonymous))
        .route("/get/oauth", post(auth::get_oauth_user))
        .route("/get/anonymous", post(auth::get_anonymous_user))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/health", get(health))
        .nest("/v1/auth", auth_routes)
        .with_state(state)
}
