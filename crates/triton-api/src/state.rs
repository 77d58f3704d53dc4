use std::sync::Arc;

use reqwest::Url;

use triton_db::Database;

use crate::oauth::OAuthProvider;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub oauth: Box<dyn OAuthProvider>,
    /// Front-end page that receives `?token=` after a successful OAuth login.
    pub frontend_callback: Url,
}
