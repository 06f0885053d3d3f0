use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub spool_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("MEMOIR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!(
                "MEMOIR_JWT_SECRET is unset or still a placeholder; it must match the identity provider's signing secret"
            );
        }

        let port = env::var("MEMOIR_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("MEMOIR_PORT must be a port number")?;

        Ok(Self {
            jwt_secret,
            db_path: env::var("MEMOIR_DB_PATH")
                .unwrap_or_else(|_| "memoir.db".into())
                .into(),
            upload_dir: env::var("MEMOIR_UPLOAD_DIR")
                .unwrap_or_else(|_| "./uploads".into())
                .into(),
            spool_dir: env::var("MEMOIR_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("memoir-spool")),
            host: env::var("MEMOIR_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
        })
    }
}
