use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::utils::Secret;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.paystack.co";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

/// Credentials and limits injected into the gateway client and the webhook
/// signature verifier.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// API key for outbound calls; also the HMAC key of inbound webhooks.
    pub secret_key: Secret<String>,
    pub callback_url: String,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: &str, secret_key: &str, callback_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: Secret::new(secret_key.to_string()),
            callback_url: callback_url.to_string(),
            timeout: Duration::from_secs(30),
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub gateway: GatewayConfig,
    pub receipt_service_url: Option<String>,
    /// Comma-separated browser origins allowed to call the payment endpoints.
    pub cors_allowed_origins: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };

        let gateway = GatewayConfig {
            base_url: lookup("PAYSTACK_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            secret_key: Secret::new(required("PAYSTACK_SECRET_KEY")?),
            callback_url: required("PAYMENT_CALLBACK_URL")?,
            timeout: Duration::from_secs(parse_or(&lookup, "GATEWAY_TIMEOUT_SECS", 30)?),
            failure_threshold: parse_or(&lookup, "GATEWAY_FAILURE_THRESHOLD", 3)?,
            reset_timeout: Duration::from_secs(parse_or(&lookup, "GATEWAY_RESET_TIMEOUT_SECS", 60)?),
        };

        Ok(Config {
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            gateway,
            receipt_service_url: lookup("RECEIPT_SERVICE_URL").filter(|v| !v.trim().is_empty()),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS").filter(|v| !v.trim().is_empty()),
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Pretty)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", key, e)),
        None => Ok(default),
    }
}
