//! Configuration types.
//!
//! Provider credentials live in explicit per-tenant objects that are
//! constructed once and passed as parameters — never module-level
//! singletons or cached globals.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sweep reconciliation interval.
    pub sweep_interval: Duration,
    /// Default LinkedIn-connection wait timeout for steps that don't set one.
    pub default_linkedin_wait_hours: i64,
    /// Default follow-up horizon when a reply's suggestion can't be parsed.
    pub follow_up_default_days: i64,
    /// Webhook listener bind address.
    pub bind_addr: String,
    /// Local database path.
    pub db_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(15 * 60),
            default_linkedin_wait_hours: 72,
            follow_up_default_days: 90,
            bind_addr: "0.0.0.0:8080".to_string(),
            db_path: "./data/outreach.db".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from environment, falling back to defaults per field.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let sweep_interval = match std::env::var("OUTREACH_SWEEP_INTERVAL_SECS") {
            Ok(v) => Duration::from_secs(v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OUTREACH_SWEEP_INTERVAL_SECS".into(),
                message: format!("not a number: {v}"),
            })?),
            Err(_) => defaults.sweep_interval,
        };

        Ok(Self {
            sweep_interval,
            default_linkedin_wait_hours: env_i64(
                "OUTREACH_LINKEDIN_WAIT_HOURS",
                defaults.default_linkedin_wait_hours,
            )?,
            follow_up_default_days: env_i64(
                "OUTREACH_FOLLOW_UP_DAYS",
                defaults.follow_up_default_days,
            )?,
            bind_addr: std::env::var("OUTREACH_BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_path: std::env::var("OUTREACH_DB_PATH").unwrap_or(defaults.db_path),
        })
    }
}

fn env_i64(key: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("not a number: {v}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Credentials and endpoint for one channel provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: SecretString,
    pub base_url: String,
    /// Shared secret for webhook signature checks, when the provider signs.
    pub webhook_secret: Option<String>,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: base_url.into(),
            webhook_secret: None,
        }
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }
}

/// Per-tenant channel configuration, passed explicitly at call time.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub tenant_id: uuid::Uuid,
    pub smartlead: ProviderConfig,
    pub heyreach: ProviderConfig,
}

impl TenantConfig {
    /// Load a single-tenant configuration from environment variables.
    pub fn from_env(tenant_id: uuid::Uuid) -> Result<Self, ConfigError> {
        let smartlead_key = std::env::var("SMARTLEAD_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("SMARTLEAD_API_KEY".into()))?;
        let heyreach_key = std::env::var("HEYREACH_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("HEYREACH_API_KEY".into()))?;

        let mut smartlead = ProviderConfig::new(
            smartlead_key,
            std::env::var("SMARTLEAD_BASE_URL")
                .unwrap_or_else(|_| "https://server.smartlead.ai/api/v1".to_string()),
        );
        if let Ok(secret) = std::env::var("SMARTLEAD_WEBHOOK_SECRET") {
            smartlead = smartlead.with_webhook_secret(secret);
        }

        let mut heyreach = ProviderConfig::new(
            heyreach_key,
            std::env::var("HEYREACH_BASE_URL")
                .unwrap_or_else(|_| "https://api.heyreach.io/api/public".to_string()),
        );
        if let Ok(secret) = std::env::var("HEYREACH_WEBHOOK_SECRET") {
            heyreach = heyreach.with_webhook_secret(secret);
        }

        Ok(Self {
            tenant_id,
            smartlead,
            heyreach,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(900));
        assert_eq!(config.follow_up_default_days, 90);
    }

    #[test]
    fn provider_config_builder() {
        let p = ProviderConfig::new("key", "https://api.example.com").with_webhook_secret("s3cret");
        assert_eq!(p.base_url, "https://api.example.com");
        assert_eq!(p.webhook_secret.as_deref(), Some("s3cret"));
    }
}
