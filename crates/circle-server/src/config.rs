use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

const MIN_SECRET_LEN: usize = 32;

const PLACEHOLDER_SECRETS: &[&str] = &["changeme", "change-me", "secret", "dev-secret-change-me"];

#[derive(Debug)]
pub struct Config {
    pub token_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub ws_write_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing optional keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token_secret = lookup("CIRCLE_TOKEN_SECRET").context("CIRCLE_TOKEN_SECRET is not set")?;
        if token_secret.len() < MIN_SECRET_LEN {
            bail!("CIRCLE_TOKEN_SECRET must be at least {} bytes", MIN_SECRET_LEN);
        }
        if PLACEHOLDER_SECRETS
            .iter()
            .any(|p| token_secret.to_ascii_lowercase().contains(p))
        {
            bail!("CIRCLE_TOKEN_SECRET looks like a placeholder, set a real secret");
        }

        let db_path = PathBuf::from(lookup("CIRCLE_DB_PATH").unwrap_or_else(|| "circle.db".into()));
        let host = lookup("CIRCLE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("CIRCLE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("CIRCLE_PORT is not a valid port")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;
        let timeout_ms: u64 = lookup("CIRCLE_WS_WRITE_TIMEOUT_MS")
            .unwrap_or_else(|| "5000".into())
            .parse()
            .context("CIRCLE_WS_WRITE_TIMEOUT_MS is not a number")?;

        Ok(Self {
            token_secret,
            db_path,
            addr,
            ws_write_timeout: Duration::from_millis(timeout_ms),
        })
    }
}
