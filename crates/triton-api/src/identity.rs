//! Maps identity assertions onto user records.
//!
//! Every function runs on the caller's connection, so a handler can resolve a
//! user and issue its token in one transaction.

use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use triton_db::queries;
use triton_types::models::AuthType;

use crate::error::{AuthError, AuthResult};

pub const OAUTH_CONFLICT: &str = "User already exists with this OAuth ID!";
pub const ANONYMOUS_CONFLICT: &str = "user already exists with this ID!";

/// Read step of an OAuth login. Run it before the write transaction so a
/// concurrent first login for the same subject races on the unique index
/// instead of queueing behind the write lock.
pub fn find_oauth(conn: &Connection, subject: &str) -> AuthResult<Option<Uuid>> {
    Ok(queries::find_user_by_oauth_id(conn, subject)?.map(|user| user.id))
}

/// Write step of an OAuth login: reuse `known` from [`find_oauth`], or create
/// the user. If another login created it in between, the insert fails and
/// this reports `Conflict`; it is not retried.
pub fn resolve_oauth(conn: &Connection, subject: &str, known: Option<Uuid>) -> AuthResult<Uuid> {
    match known {
        Some(user_id) => Ok(user_id),
        None => register_oauth(conn, subject),
    }
}

/// Create a user for an OAuth subject. Fails with `Conflict` if one exists.
pub fn register_oauth(conn: &Connection, subject: &str) -> AuthResult<Uuid> {
    let id = queries::create_user(conn, Uuid::new_v4(), AuthType::OAuth, Some(subject))
        .map_err(|e| AuthError::from(e).on_conflict(OAUTH_CONFLICT))?;
    info!(user_id = %id, "Created oauth user");
    Ok(id)
}

pub fn resolve_anonymous(conn: &Connection) -> AuthResult<Uuid> {
    let id = queries::create_user(conn, Uuid::new_v4(), AuthType::Anonymous, None)
        .map_err(|e| AuthError::from(e).on_conflict(ANONYMOUS_CONFLICT))?;
    info!(user_id = %id, "Created anonymous user");
    Ok(id)
}

pub fn lookup_oauth(conn: &Connection, subject: &str) -> AuthResult<Uuid> {
    queries::find_user_by_oauth_id(conn, subject)?
        .map(|user| user.id)
        .ok_or_else(|| AuthError::NotFound("User not found!".into()))
}

pub fn lookup_anonymous(conn: &Connection, user_id: Uuid) -> AuthResult<Uuid> {
    queries::find_anonymous_user(conn, user_id)?
        .map(|user| user.id)
        .ok_or_else(|| AuthError::NotFound("user not found!".into()))
}
