use chrono::TimeDelta;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use triton_db::queries;

use crate::error::AuthResult;
use crate::token::{self, SCOPE_AUTHENTICATION, Token};

pub const SESSION_TTL_HOURS: i64 = 24;

/// Mint an authentication token for `user_id` and store its hash. Run this
/// in the same transaction that produced `user_id`.
pub fn issue_session(conn: &Connection, user_id: Uuid) -> AuthResult<Token> {
    let token = token::generate(
        user_id,
        TimeDelta::hours(SESSION_TTL_HOURS),
        SCOPE_AUTHENTICATION,
    )?;
    queries::insert_token(conn, &token.hash, token.user_id, token.expiry, &token.scope)?;
    info!(user_id = %user_id, expiry = %token.expiry, "Issued session token");
    Ok(token)
}

/// Revoke every token the user holds.
pub fn invalidate_sessions(conn: &Connection, user_id: Uuid) -> AuthResult<usize> {
    let deleted = queries::delete_tokens_for_user(conn, user_id)?;
    info!(user_id = %user_id, deleted, "Invalidated sessions");
    Ok(deleted)
}
