use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub pusher_key: String,
    pub pusher_secret: String,
    /// `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("FOLIO_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("FOLIO_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("FOLIO_PORT is not a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("FOLIO_HOST is not an IP address")?;

        let db_path = std::env::var("FOLIO_DB_PATH")
            .unwrap_or_else(|_| "folio.db".into())
            .into();

        let pusher_key = std::env::var("FOLIO_PUSHER_KEY").unwrap_or_default();
        if pusher_key.is_empty() {
            bail!("FOLIO_PUSHER_KEY is unset");
        }

        Ok(Self {
            addr,
            db_path,
            jwt_secret: secret("FOLIO_JWT_SECRET")?,
            webhook_secret: secret("FOLIO_WEBHOOK_SECRET")?,
            pusher_key,
            pusher_secret: secret("FOLIO_PUSHER_SECRET")?,
            cors_origin: std::env::var("FOLIO_CORS_ORIGIN")
                .ok()
                .filter(|o| !o.is_empty()),
        })
    }
}

fn secret(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name).unwrap_or_default();
    if !is_usable_secret(&value) {
        bail!("{} is unset or still a placeholder", name);
    }
    Ok(value)
}

fn is_usable_secret(value: &str) -> bool {
    !value.trim().is_empty() && !PLACEHOLDER_SECRETS.contains(&value)
}
