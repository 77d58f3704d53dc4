use rusqlite::{ErrorCode, ffi};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A uniqueness constraint rejected the write.
    #[error("record already exists")]
    Conflict,

    /// The caller went away and the work was interrupted or skipped.
    #[error("operation cancelled")]
    Cancelled,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            match failure.code {
                ErrorCode::ConstraintViolation
                    if matches!(
                        failure.extended_code,
                        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    ) =>
                {
                    return DbError::Conflict;
                }
                ErrorCode::OperationInterrupted => return DbError::Cancelled,
                _ => {}
            }
        }
        DbError::Sqlite(err)
    }
}
