use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use reqwest::Url;

use triton_api::oauth::GoogleConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub db_pool_size: u32,
    pub google: GoogleConfig,
    pub frontend_callback: Url,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());
        let required = |key: &str| match lookup(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => bail!("{key} must be set"),
        };

        let host = optional("TRITON_HOST", "0.0.0.0");
        let host = host
            .parse()
            .with_context(|| format!("TRITON_HOST is not an IP address: {host}"))?;
        let port = optional("PORT", "8080")
            .parse()
            .context("PORT must be a port number")?;
        let db_pool_size = optional("TRITON_DB_POOL_SIZE", "8")
            .parse()
            .context("TRITON_DB_POOL_SIZE must be a positive integer")?;
        if db_pool_size == 0 {
            bail!("TRITON_DB_POOL_SIZE must be a positive integer");
        }

        let frontend_callback = required("FRONTEND_CALLBACK_URL")?;
        let frontend_callback = Url::parse(&frontend_callback)
            .with_context(|| format!("FRONTEND_CALLBACK_URL is not a URL: {frontend_callback}"))?;

        Ok(Self {
            host,
            port,
            db_path: PathBuf::from(optional("TRITON_DB_PATH", "triton.db")),
            db_pool_size,
            google: GoogleConfig {
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_CLIENT_SECRET")?,
                redirect_uri: required("GOOGLE_REDIRECT_URI")?,
            },
            frontend_callback,
        })
    }
}
