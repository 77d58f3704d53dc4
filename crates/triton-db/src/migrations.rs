use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, tokens, oauth states)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                auth_type   TEXT NOT NULL CHECK (auth_type IN ('oauth', 'anonymous')),
                oauth_id    TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK ((auth_type = 'oauth') = (oauth_id IS NOT NULL))
            );

            CREATE UNIQUE INDEX idx_users_oauth
                ON users(auth_type, oauth_id) WHERE auth_type = 'oauth';

            -- Only the SHA-256 of a token is stored, never the plaintext.
            CREATE TABLE tokens (
                hash        BLOB PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expiry      INTEGER NOT NULL,
                scope       TEXT NOT NULL
            );

            CREATE INDEX idx_tokens_user ON tokens(user_id);

            CREATE TABLE oauth_states (
                state       TEXT PRIMARY KEY,
                expiry      INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
