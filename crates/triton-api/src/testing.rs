use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tempfile::TempDir;

use triton_db::Database;

use crate::oauth::{OAuthError, OAuthProvider};
use crate::state::{AppState, AppStateInner};

pub(crate) fn test_db() -> (TempDir, Database) {
    let tmp = TempDir::new().unwrap();
    let db = Database::open(&tmp.path().join("test.db"), 4).unwrap();
    (tmp, db)
}

/// Accepts every code except `"bad"` and maps it to a fixed subject.
pub(crate) struct StubProvider;

#[async_trait]
impl OAuthProvider for StubProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://provider.test/auth?state={state}")
    }

    async fn exchange(&self, code: &str) -> Result<String, OAuthError> {
        match code {
            "bad" => Err(OAuthError::Provider {
                status: 400,
                body: "invalid_grant".into(),
            }),
            code => Ok(format!("sub-{code}")),
        }
    }
}

pub(crate) fn test_state() -> (TempDir, AppState) {
    let (tmp, db) = test_db();
    let state = Arc::new(AppStateInner {
        db,
        oauth: Box::new(StubProvider),
        frontend_callback: Url::parse("https://app.test/callback").unwrap(),
    });
    (tmp, state)
}
