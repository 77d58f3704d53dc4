//! Database row types, mapped directly from SQLite rows.
//! Converted into triton-types models at the query boundary.

use triton_types::models::{AuthType, User};

use crate::DbError;

pub struct UserRow {
    pub id: String,
    pub auth_type: String,
    pub oauth_id: Option<String>,
}

impl UserRow {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            auth_type: row.get("auth_type")?,
            oauth_id: row.get("oauth_id")?,
        })
    }

    pub fn into_user(self) -> Result<User, DbError> {
        let id = self
            .id
            .parse()
            .map_err(|e| DbError::Corrupt(format!("user id {:?}: {}", self.id, e)))?;
        let auth_type: AuthType = self.auth_type.parse().map_err(DbError::Corrupt)?;
        Ok(User {
            id,
            auth_type,
            oauth_id: self.oauth_id,
        })
    }
}
