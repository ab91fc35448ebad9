//! Configuration module for environment variable parsing.
//!
//! Secrets and endpoints are read once at startup into [`Config`] and passed
//! to the handlers through `AppState`. Nothing else reads the environment.

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::crm::ForwardFailurePolicy;

/// Default Stripe REST API base URL.
pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Stripe secret API key (sk_live_... or sk_test_...)
    pub stripe_secret_key: String,

    /// Stripe webhook signing secret (whsec_...)
    pub stripe_webhook_secret: String,

    /// Base URL for the Stripe REST API
    pub stripe_api_base: String,

    /// Maximum allowed distance in seconds between a signature timestamp and now
    pub signature_tolerance_secs: u64,

    /// Timeout for Stripe API calls in milliseconds
    pub processor_timeout_ms: u64,

    /// GHL inbound webhook URL that receives lead payloads
    pub ghl_webhook_url: Url,

    /// Timeout for each GHL delivery attempt in milliseconds
    pub crm_timeout_ms: u64,

    /// What to do when a GHL delivery fails
    pub forward_failure_policy: ForwardFailurePolicy,

    /// Whether redelivered payment intents are suppressed
    pub dedup_enabled: bool,

    /// How long a forwarded payment intent id is remembered
    pub dedup_ttl_secs: u64,

    /// Maximum number of remembered payment intent ids
    pub dedup_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// `from_env` is this function over `std::env::var`; tests pass a map.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ghl_webhook_url = required(&lookup, "GHL_WEBHOOK_URL")?;
        let ghl_webhook_url = Url::parse(&ghl_webhook_url).map_err(|source| {
            ConfigError::InvalidUrl {
                name: "GHL_WEBHOOK_URL",
                source,
            }
        })?;

        let retry_attempts = parse_or(&lookup, "CRM_RETRY_ATTEMPTS", 2u32);
        let retry_backoff_ms = parse_or(&lookup, "CRM_RETRY_BACKOFF_MS", 500u64);
        let forward_failure_policy = match lookup("CRM_FORWARD_FAILURE_POLICY") {
            Some(raw) => ForwardFailurePolicy::parse(
                &raw,
                retry_attempts,
                Duration::from_millis(retry_backoff_ms),
            )
            .unwrap_or_else(|| {
                warn!(
                    env_var = "CRM_FORWARD_FAILURE_POLICY",
                    value = %raw,
                    "Invalid forward failure policy, using default"
                );
                ForwardFailurePolicy::Log
            }),
            None => ForwardFailurePolicy::Log,
        };

        Ok(Config {
            port: parse_or(&lookup, "PORT", 8080),

            stripe_secret_key: required(&lookup, "STRIPE_SECRET_KEY")?,

            stripe_webhook_secret: required(&lookup, "STRIPE_WEBHOOK_SECRET")?,

            stripe_api_base: lookup("STRIPE_API_BASE")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),

            signature_tolerance_secs: parse_or(&lookup, "STRIPE_SIGNATURE_TOLERANCE_SECS", 300),

            processor_timeout_ms: parse_or(&lookup, "PROCESSOR_TIMEOUT_MS", 10_000),

            ghl_webhook_url,

            crm_timeout_ms: parse_or(&lookup, "CRM_TIMEOUT_MS", 8000),

            forward_failure_policy,

            dedup_enabled: parse_bool_or(&lookup, "WEBHOOK_DEDUP_ENABLED", true),

            dedup_ttl_secs: parse_or(&lookup, "WEBHOOK_DEDUP_TTL_SECS", 86_400),

            dedup_capacity: parse_or(&lookup, "WEBHOOK_DEDUP_CAPACITY", 10_000),
        })
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_millis(self.processor_timeout_ms)
    }

    pub fn crm_timeout(&self) -> Duration {
        Duration::from_millis(self.crm_timeout_ms)
    }
}

/// Read a variable that must be present and non-blank.
fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Parse a variable, falling back to `default` when absent or invalid.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = match lookup(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Parse a boolean flag such as "true", "1", "no".
fn parse_bool_or<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let raw = match lookup(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid flag, using default");
            default
        }
    }
}
