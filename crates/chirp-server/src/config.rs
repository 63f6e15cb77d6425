use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Runtime settings, read from `CHIRP_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_hours: i64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset keys take their defaults,
    /// malformed numbers are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let port = var("CHIRP_PORT", "3000");
        let port: u16 = port
            .parse()
            .with_context(|| format!("CHIRP_PORT is not a valid port: '{}'", port))?;

        let ttl = var("CHIRP_TOKEN_TTL_HOURS", "24");
        let token_ttl_hours: i64 = ttl
            .parse()
            .with_context(|| format!("CHIRP_TOKEN_TTL_HOURS is not a number: '{}'", ttl))?;
        if token_ttl_hours <= 0 {
            anyhow::bail!("CHIRP_TOKEN_TTL_HOURS must be positive, got {}", token_ttl_hours);
        }

        Ok(Self {
            jwt_secret: var("CHIRP_JWT_SECRET", "dev-secret-change-me"),
            db_path: PathBuf::from(var("CHIRP_DB_PATH", "chirp.db")),
            host: var("CHIRP_HOST", "0.0.0.0"),
            port,
            token_ttl_hours,
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
