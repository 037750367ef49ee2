//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested fields
//! use a double underscore, e.g. `TOKENS__ACCESS_SECRET`.
//!
//! See [`TokenConfig`](coursehub_platform_access::TokenConfig) for token
//! secrets and lifetimes.

use axum_extra::extract::cookie::SameSite;
use coursehub_catalog::{DEFAULT_COURSE_TTL, DEFAULT_QUEUE_CAPACITY, RetryPolicy};
use coursehub_platform_access::TokenConfig;

use crate::rate_limit::RateLimitConfig;
use serde::Deserialize;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Redis URL for sessions and the course cache. When absent the server
    /// uses an in-process cache, which is only correct for one instance.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Token secrets and lifetimes.
    pub tokens: TokenConfig,

    #[serde(default)]
    pub cookies: CookieConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    pub payment: PaymentConfig,

    pub mail: MailConfig,

    pub video: VideoConfig,

    #[serde(default)]
    pub side_effects: SideEffectConfig,

    /// Per-client request budget.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Origins allowed to make credentialed cross-origin requests.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// `SameSite` attribute for the token cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

impl From<SameSitePolicy> for SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        }
    }
}

/// Token cookie attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure: bool,

    #[serde(default = "default_same_site")]
    pub same_site: SameSitePolicy,
}

fn default_secure_cookies() -> bool {
    true
}

fn default_same_site() -> SameSitePolicy {
    SameSitePolicy::Lax
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: default_secure_cookies(),
            same_site: default_same_site(),
        }
    }
}

/// Course cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_course_ttl_seconds")]
    pub course_ttl_seconds: u64,
}

fn default_course_ttl_seconds() -> u64 {
    DEFAULT_COURSE_TTL.as_secs()
}

impl CacheConfig {
    #[must_use]
    pub fn course_ttl(&self) -> Duration {
        Duration::from_secs(self.course_ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            course_ttl_seconds: default_course_ttl_seconds(),
        }
    }
}

/// Stripe settings.
#[derive(Clone, Deserialize)]
pub struct PaymentConfig {
    pub secret_key: String,
    pub publishable_key: String,

    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,

    /// Currency for new payment intents.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Multiplier from the client-supplied amount to the processor's minor
    /// unit.
    #[serde(default = "default_minor_unit_factor")]
    pub minor_unit_factor: i64,

    /// Value of the `company` metadata field on new intents.
    #[serde(default = "default_company")]
    pub company: String,
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "vnd".to_string()
}

fn default_minor_unit_factor() -> i64 {
    100
}

fn default_company() -> String {
    "MindX".to_string()
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("secret_key", &"[REDACTED]")
            .field("publishable_key", &self.publishable_key)
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .field("minor_unit_factor", &self.minor_unit_factor)
            .field("company", &self.company)
            .finish()
    }
}

/// Resend settings.
#[derive(Clone, Deserialize)]
pub struct MailConfig {
    pub api_key: String,

    /// Sender address, e.g. `Coursehub <no-reply@example.com>`.
    pub from: String,

    #[serde(default = "default_resend_api_base")]
    pub api_base: String,
}

fn default_resend_api_base() -> String {
    "https://api.resend.com".to_string()
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("api_key", &"[REDACTED]")
            .field("from", &self.from)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// VdoCipher settings.
#[derive(Clone, Deserialize)]
pub struct VideoConfig {
    pub api_secret: String,

    #[serde(default = "default_vdocipher_api_base")]
    pub api_base: String,
}

fn default_vdocipher_api_base() -> String {
    "https://dev.vdocipher.com/api".to_string()
}

impl std::fmt::Debug for VideoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoConfig")
            .field("api_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Side-effect queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SideEffectConfig {
    /// NATS server URL. When absent, side effects run on an in-process
    /// queue and are lost on shutdown.
    #[serde(default)]
    pub nats_url: Option<String>,

    #[serde(default = "default_stream_name")]
    pub stream_name: String,

    /// Total delivery attempts per effect.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Effects the in-process queue holds before rejecting new ones.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_stream_name() -> String {
    "COURSEHUB_SIDE_EFFECTS".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl SideEffectConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Default for SideEffectConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            stream_name: default_stream_name(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that deserialize but cannot run.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the first problem.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        self.tokens
            .validate()
            .map_err(|e| config::ConfigError::Message(format!("tokens: {e}")))?;
        self.rate_limit
            .validate()
            .map_err(|e| config::ConfigError::Message(format!("rate_limit: {e}")))
    }
}
