//! Configuration management

use anyhow::{self, Context, Result};

use crate::services::intake::MAX_UPLOAD_BYTES;

pub const DEFAULT_EXCEL_HELPER_URL: &str = "/admin-api/b2b/orders/excel-helper";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// Optional NATS credentials
    pub nats_user: Option<String>,
    pub nats_password: Option<String>,

    /// PostgreSQL connection string (needed by the postgres store only)
    pub database_url: Option<String>,

    /// JWT secret key for token signing/validation
    pub jwt_secret: String,

    /// "postgres" or "memory"
    pub store_backend: String,

    /// Upload size limit in bytes. Its base64 form must fit the NATS
    /// server's max_payload.
    pub max_upload_bytes: u64,

    /// Where remediation hints point for valid category IDs
    pub excel_helper_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let nats_url = get("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());

        let nats_user = get("NATS_USER").filter(|u| !u.is_empty());
        let nats_password = get("NATS_PASSWORD");

        let store_backend = get("STORE_BACKEND")
            .map(|b| b.trim().to_lowercase())
            .unwrap_or_else(|| "postgres".to_string());
        if !matches!(store_backend.as_str(), "postgres" | "memory") {
            anyhow::bail!("STORE_BACKEND must be 'postgres' or 'memory' (got '{}')", store_backend);
        }

        let database_url = get("DATABASE_URL");

        let jwt_secret = get("JWT_SECRET")
            .context("JWT_SECRET must be set, generate one with: openssl rand -base64 48")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 bytes (current: {} bytes). Generate one with: openssl rand -base64 48",
                jwt_secret.len()
            );
        }

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("MAX_UPLOAD_BYTES must be a number of bytes (got '{}')", v))?,
            None => MAX_UPLOAD_BYTES,
        };

        let excel_helper_url = get("EXCEL_HELPER_URL").unwrap_or_else(|| DEFAULT_EXCEL_HELPER_URL.to_string());

        Ok(Self {
            nats_url,
            nats_user,
            nats_password,
            database_url,
            jwt_secret,
            store_backend,
            max_upload_bytes,
            excel_helper_url,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }
}
