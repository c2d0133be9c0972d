//! Configuration loading from environment.

use std::env;
use std::time::Duration;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub gateway_base_url: String,
    pub gateway_secret_key: String,
    pub gateway_webhook_secret: String,
    pub checkout_success_url: Option<String>,
    pub checkout_cancel_url: Option<String>,
    pub rcon_timeout: Duration,
    pub expiry_sweep_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let gateway_base_url = env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());

        let gateway_secret_key = env::var("GATEWAY_SECRET_KEY")
            .map_err(|_| anyhow::anyhow!("GATEWAY_SECRET_KEY environment variable is required"))?;

        let gateway_webhook_secret = env::var("GATEWAY_WEBHOOK_SECRET").map_err(|_| {
            anyhow::anyhow!("GATEWAY_WEBHOOK_SECRET environment variable is required")
        })?;

        let checkout_success_url = env::var("CHECKOUT_SUCCESS_URL").ok();
        let checkout_cancel_url = env::var("CHECKOUT_CANCEL_URL").ok();

        let rcon_timeout = Duration::from_secs(
            env::var("RCON_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
        );

        let expiry_sweep_interval = Duration::from_secs(
            env::var("EXPIRY_SWEEP_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
        );

        Ok(Self {
            port,
            database_url,
            gateway_base_url,
            gateway_secret_key,
            gateway_webhook_secret,
            checkout_success_url,
            checkout_cancel_url,
            rcon_timeout,
            expiry_sweep_interval,
        })
    }
}
