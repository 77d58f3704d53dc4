//! User Store, Token Store and OAuth state queries.
//!
//! Every function takes a plain `&Connection` so callers decide the
//! transaction boundary (a `Transaction` derefs to a `Connection`).

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use triton_types::models::{AuthType, User};

use crate::Result;
use crate::models::UserRow;

// -- Users --

/// Insert a user row. A duplicate id or oauth identity yields
/// [`DbError::Conflict`](crate::DbError::Conflict).
pub fn create_user(
    conn: &Connection,
    id: Uuid,
    auth_type: AuthType,
    oauth_id: Option<&str>,
) -> Result<Uuid> {
    conn.execute(
        "INSERT INTO users (id, auth_type, oauth_id) VALUES (?1, ?2, ?3)",
        params![id.to_string(), auth_type.as_str(), oauth_id],
    )?;
    Ok(id)
}

pub fn find_user_by_oauth_id(conn: &Connection, oauth_id: &str) -> Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, auth_type, oauth_id FROM users
             WHERE auth_type = 'oauth' AND oauth_id = ?1",
            [oauth_id],
            UserRow::from_row,
        )
        .optional()?;

    row.map(UserRow::into_user).transpose()
}

/// Anonymous users are keyed by their own id; OAuth users never match here.
pub fn find_anonymous_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, auth_type, oauth_id FROM users
             WHERE id = ?1 AND auth_type = 'anonymous'",
            [id.to_string()],
            UserRow::from_row,
        )
        .optional()?;

    row.map(UserRow::into_user).transpose()
}

pub fn count_users(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count as u64)
}

// -- Tokens --

pub fn insert_token(
    conn: &Connection,
    hash: &[u8],
    user_id: Uuid,
    expiry: DateTime<Utc>,
    scope: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO tokens (hash, user_id, expiry, scope) VALUES (?1, ?2, ?3, ?4)",
        params![hash, user_id.to_string(), expiry.timestamp(), scope],
    )?;
    Ok(())
}

/// Resolve a token hash to its owner. Only tokens with the given scope whose
/// expiry is strictly after `now` match.
pub fn find_user_by_token(
    conn: &Connection,
    hash: &[u8],
    scope: &str,
    now: DateTime<Utc>,
) -> Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT u.id, u.auth_type, u.oauth_id
             FROM tokens t
             JOIN users u ON u.id = t.user_id
             WHERE t.hash = ?1 AND t.scope = ?2 AND t.expiry > ?3",
            params![hash, scope, now.timestamp()],
            UserRow::from_row,
        )
        .optional()?;

    row.map(UserRow::into_user).transpose()
}

/// Delete every token the user owns, whatever its scope. Returns how many
/// were removed.
pub fn delete_tokens_for_user(conn: &Connection, user_id: Uuid) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM tokens WHERE user_id = ?1",
        [user_id.to_string()],
    )?;
    Ok(deleted)
}

// -- OAuth states --

/// Record a login attempt's anti-forgery state. Expired states are pruned
/// on the way in.
pub fn insert_oauth_state(
    conn: &Connection,
    state: &str,
    expiry: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "DELETE FROM oauth_states WHERE expiry <= ?1",
        [now.timestamp()],
    )?;
    conn.execute(
        "INSERT INTO oauth_states (state, expiry) VALUES (?1, ?2)",
        params![state, expiry.timestamp()],
    )?;
    Ok(())
}

/// Delete a live state. Returns false if it was unknown, already used, or
/// expired.
pub fn consume_oauth_state(conn: &Connection, state: &str, now: DateTime<Utc>) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM oauth_states WHERE state = ?1 AND expiry > ?2",
        params![state, now.timestamp()],
    )?;
    Ok(deleted == 1)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::DbError;
    use crate::tests::test_db;

    const SCOPE: &str = "authentication";

    #[test]
    fn create_and_find_oauth_user() {
        let (_tmp, db) = test_db(2);
        let id = Uuid::new_v4();

        db.with_conn(|conn| create_user(conn, id, AuthType::OAuth, Some("g-1")))
            .unwrap();

        let user = db
            .with_conn(|conn| find_user_by_oauth_id(conn, "g-1"))
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.auth_type, AuthType::OAuth);
        assert_eq!(user.oauth_id.as_deref(), Some("g-1"));

        let missing = db.with_conn(|conn| find_user_by_oauth_id(conn, "g-2")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn duplicate_oauth_id_is_conflict() {
        let (_tmp, db) = test_db(2);
        db.with_conn(|conn| create_user(conn, Uuid::new_v4(), AuthType::OAuth, Some("dup")))
            .unwrap();

        let err = db
            .with_conn(|conn| create_user(conn, Uuid::new_v4(), AuthType::OAuth, Some("dup")))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict));
    }

    #[test]
    fn duplicate_id_is_conflict() {
        let (_tmp, db) = test_db(2);
        let id = Uuid::new_v4();
        db.with_conn(|conn| create_user(conn, id, AuthType::Anonymous, None))
            .unwrap();

        let err = db
            .with_conn(|conn| create_user(conn, id, AuthType::Anonymous, None))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict));
    }

    #[test]
    fn oauth_id_present_iff_oauth() {
        let (_tmp, db) = test_db(2);

        let err = db
            .with_conn(|conn| create_user(conn, Uuid::new_v4(), AuthType::OAuth, None))
            .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));

        let err = db
            .with_conn(|conn| create_user(conn, Uuid::new_v4(), AuthType::Anonymous, Some("x")))
            .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
    }

    #[test]
    fn anonymous_lookup_ignores_oauth_users() {
        let (_tmp, db) = test_db(2);
        let oauth = Uuid::new_v4();
        let anon = Uuid::new_v4();
        db.with_conn(|conn| {
            create_user(conn, oauth, AuthType::OAuth, Some("g-7"))?;
            create_user(conn, anon, AuthType::Anonymous, None)
        })
        .unwrap();

        let found = db.with_conn(|conn| find_anonymous_user(conn, anon)).unwrap();
        assert_eq!(found.map(|u| u.auth_type), Some(AuthType::Anonymous));

        let not_anonymous = db.with_conn(|conn| find_anonymous_user(conn, oauth)).unwrap();
        assert!(not_anonymous.is_none());
    }

    #[test]
    fn token_valid_only_before_expiry_and_in_scope() {
        let (_tmp, db) = test_db(2);
        let user_id = Uuid::new_v4();
        let hash = [7u8; 32];
        let now = Utc::now();
        let expiry = now + Duration::hours(1);

        db.with_conn(|conn| {
            create_user(conn, user_id, AuthType::Anonymous, None)?;
            insert_token(conn, &hash, user_id, expiry, SCOPE)
        })
        .unwrap();

        let found = db
            .with_conn(|conn| find_user_by_token(conn, &hash, SCOPE, now))
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(user_id));

        let at_expiry = db
            .with_conn(|conn| find_user_by_token(conn, &hash, SCOPE, expiry))
            .unwrap();
        assert!(at_expiry.is_none());

        let wrong_scope = db
            .with_conn(|conn| find_user_by_token(conn, &hash, "activation", now))
            .unwrap();
        assert!(wrong_scope.is_none());

        let unknown = db
            .with_conn(|conn| find_user_by_token(conn, &[8u8; 32], SCOPE, now))
            .unwrap();
        assert!(unknown.is_none());
    }

    #[test]
    fn token_for_unknown_user_is_rejected() {
        let (_tmp, db) = test_db(2);
        let result = db.with_conn(|conn| {
            insert_token(conn, &[1u8; 32], Uuid::new_v4(), Utc::now(), SCOPE)
        });
        assert!(matches!(result, Err(DbError::Sqlite(_))));
    }

    #[test]
    fn delete_tokens_only_touches_owner() {
        let (_tmp, db) = test_db(2);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let now = Utc::now();
        let expiry = now + Duration::hours(24);

        db.with_conn(|conn| {
            create_user(conn, alice, AuthType::Anonymous, None)?;
            create_user(conn, bob, AuthType::Anonymous, None)?;
            insert_token(conn, &[1u8; 32], alice, expiry, SCOPE)?;
            insert_token(conn, &[2u8; 32], alice, expiry, SCOPE)?;
            insert_token(conn, &[3u8; 32], bob, expiry, SCOPE)
        })
        .unwrap();

        let deleted = db.with_conn(|conn| delete_tokens_for_user(conn, alice)).unwrap();
        assert_eq!(deleted, 2);

        db.with_conn(|conn| {
            assert!(find_user_by_token(conn, &[1u8; 32], SCOPE, now)?.is_none());
            assert!(find_user_by_token(conn, &[2u8; 32], SCOPE, now)?.is_none());
            assert!(find_user_by_token(conn, &[3u8; 32], SCOPE, now)?.is_some());
            // The user row itself survives.
            assert!(find_anonymous_user(conn, alice)?.is_some());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn oauth_state_is_single_use() {
        let (_tmp, db) = test_db(2);
        let now = Utc::now();

        db.with_conn(|conn| insert_oauth_state(conn, "s1", now + Duration::minutes(10), now))
            .unwrap();

        assert!(db.with_conn(|conn| consume_oauth_state(conn, "s1", now)).unwrap());
        assert!(!db.with_conn(|conn| consume_oauth_state(conn, "s1", now)).unwrap());
        assert!(!db.with_conn(|conn| consume_oauth_state(conn, "never", now)).unwrap());
    }

    #[test]
    fn expired_oauth_state_is_rejected_and_pruned() {
        let (_tmp, db) = test_db(2);
        let now = Utc::now();

        db.with_conn(|conn| insert_oauth_state(conn, "old", now + Duration::minutes(10), now))
            .unwrap();

        let later = now + Duration::minutes(11);
        assert!(!db.with_conn(|conn| consume_oauth_state(conn, "old", later)).unwrap());

        db.with_conn(|conn| {
            insert_oauth_state(conn, "new", later + Duration::minutes(10), later)
        })
        .unwrap();
        let remaining: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM oauth_states", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
