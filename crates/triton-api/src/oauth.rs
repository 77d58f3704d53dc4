//! OAuth authorization-code exchange.
//!
//! The provider turns an authorization code into a stable subject id. All
//! provider and transport failures come back as [`OAuthError`] and are not
//! retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, Url};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::warn;

use triton_db::queries;

use crate::error::AuthResult;
use crate::token;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// How long a login redirect's state stays redeemable.
pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("oauth transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oauth provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("oauth profile has no subject id")]
    MissingSubject,

    #[error("invalid oauth endpoint: {0}")]
    Endpoint(String),
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Where to send the browser to start a login carrying `state`.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the provider's subject id.
    async fn exchange(&self, code: &str) -> Result<String, OAuthError>;
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

pub struct GoogleProvider {
    http: Client,
    config: GoogleConfig,
    auth_url: Url,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    #[serde(default)]
    id: Option<String>,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, OAuthError> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            config,
            auth_url: Url::parse(GOOGLE_AUTH_URL)
                .map_err(|e| OAuthError::Endpoint(e.to_string()))?,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &GOOGLE_SCOPES.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline");
        url.into()
    }

    async fn exchange(&self, code: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        let tokens: TokenResponse = check_status(response).await?.json().await?;

        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;
        let profile: UserInfo = check_status(response).await?.json().await?;

        profile
            .id
            .filter(|id| !id.is_empty())
            .ok_or(OAuthError::MissingSubject)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OAuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("OAuth provider returned {}: {}", status, body);
    Err(OAuthError::Provider {
        status: status.as_u16(),
        body,
    })
}

// -- Anti-forgery state --

/// Mint a single-use state value and remember it server-side.
pub fn begin_login(conn: &Connection, now: DateTime<Utc>) -> AuthResult<String> {
    let state = token::random_text()?;
    let expiry = now + TimeDelta::minutes(STATE_TTL_MINUTES);
    queries::insert_oauth_state(conn, &state, expiry, now)?;
    Ok(state)
}

/// Redeem a state value. False if it was never issued, already used, or
/// has expired.
pub fn redeem_state(conn: &Connection, state: &str, now: DateTime<Utc>) -> AuthResult<bool> {
    Ok(queries::consume_oauth_state(conn, state, now)?)
}
