use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use triton_db::DbError;
use triton_types::api::{ErrorDetail, ErrorResponse};

use crate::oauth::OAuthError;
use crate::token::{RandomSourceError, ShapeError};

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed input or bad request state.
    #[error("{0}")]
    Validation(String),

    /// Missing, malformed, unknown or expired credentials.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// A uniqueness violation on create. Reported to clients as a
    /// validation error.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    /// Store or transport failure. The message is passed through as-is.
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    pub fn not_logged_in() -> Self {
        AuthError::Unauthorized("You are not logged in".into())
    }

    pub fn invalid_token() -> Self {
        AuthError::Unauthorized("invalid or missing authentication token".into())
    }

    /// Replace the generic message of a `Conflict`.
    pub fn on_conflict(self, message: &str) -> Self {
        match self {
            AuthError::Conflict(_) => AuthError::Conflict(message.into()),
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::Conflict(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) | AuthError::Conflict(_) => "validation",
            AuthError::Unauthorized(_) => "unauthorized",
            AuthError::NotFound(_) => "not_found",
            AuthError::Upstream(_) => "bad_gateway",
            AuthError::Internal(_) => "internal_server",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} {}", status, self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: status.as_u16(),
                kind: self.kind().to_string(),
                message: self.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict => AuthError::Conflict("record already exists".into()),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<RandomSourceError> for AuthError {
    fn from(err: RandomSourceError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<ShapeError> for AuthError {
    fn from(err: ShapeError) -> Self {
        AuthError::Unauthorized(err.to_string())
    }
}

impl From<OAuthError> for AuthError {
    fn from(err: OAuthError) -> Self {
        AuthError::Upstream(err.to_string())
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AuthError {
    fn from(rejection: QueryRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}
