//! Layered service configuration.
//!
//! Sources, later ones winning: built-in defaults, `config/default.toml`,
//! `config/<RUN_ENV>.toml`, then `APP__*` environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::{env, path::Path};
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

mod defaults {
    pub const ENVIRONMENT: &str = "development";
    pub const DATABASE_URL: &str = "sqlite://storefront.db?mode=rwc";
    pub const HOST: &str = "0.0.0.0";

    pub fn port() -> u16 {
        8080
    }
    pub fn log_level() -> String {
        "info".to_string()
    }
    pub fn db_max_connections() -> u32 {
        16
    }
    pub fn db_min_connections() -> u32 {
        2
    }
    pub fn db_connect_timeout_secs() -> u64 {
        30
    }
    pub fn db_idle_timeout_secs() -> u64 {
        600
    }
    pub fn db_acquire_timeout_secs() -> u64 {
        8
    }
    pub fn session_expiry_days() -> i64 {
        14
    }
    pub fn session_cleanup_interval_secs() -> u64 {
        3600
    }
    pub fn default_size_stock() -> i32 {
        100
    }
    pub fn currency() -> String {
        "AZN".to_string()
    }
    pub fn webhook_tolerance_secs() -> u64 {
        300
    }
    pub fn event_channel_capacity() -> usize {
        1024
    }
}

/// Where session records live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// The application database; survives restarts and is shared between instances
    #[default]
    Database,
    /// Process memory; for tests
    Memory,
}

/// Storefront settings, validated after loading.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    #[serde(default = "defaults::port")]
    #[validate(range(min = 1))]
    pub port: u16,
    /// `development`, `test`, `production`, ...
    pub environment: String,

    #[serde(default = "defaults::log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Apply pending migrations at startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated origins allowed to call the API from a browser
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default = "defaults::db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "defaults::db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "defaults::db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "defaults::db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "defaults::db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Days of inactivity before a session, and the cart bound to it, is forgotten
    #[serde(default = "defaults::session_expiry_days")]
    #[validate(range(min = 1, max = 365))]
    pub session_expiry_days: i64,
    #[serde(default)]
    pub session_cookie_secure: bool,
    #[serde(default)]
    pub session_backend: SessionBackend,
    /// Seconds between sweeps of expired database sessions
    #[serde(default = "defaults::session_cleanup_interval_secs")]
    #[validate(range(min = 1))]
    pub session_cleanup_interval_secs: u64,

    /// Stock given to the "One Size" variant created for products without sizes
    #[serde(default = "defaults::default_size_stock")]
    #[validate(range(min = 0))]
    pub default_size_stock: i32,
    /// Currency label shown next to prices in HTML fragments
    #[serde(default = "defaults::currency")]
    pub currency: String,

    /// Stripe signing secret; signatures are not checked when unset
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,
    /// Heleket signing secret; signatures are not checked when unset
    #[serde(default)]
    pub heleket_webhook_secret: Option<String>,
    /// Maximum clock skew accepted on signed webhook timestamps
    #[serde(default = "defaults::webhook_tolerance_secs")]
    #[validate(range(min = 1, max = 86400))]
    pub webhook_tolerance_secs: u64,

    #[serde(default = "defaults::event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

impl AppConfig {
    /// Settings for the given connection and listener, everything else defaulted.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: defaults::log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: defaults::db_max_connections(),
            db_min_connections: defaults::db_min_connections(),
            db_connect_timeout_secs: defaults::db_connect_timeout_secs(),
            db_idle_timeout_secs: defaults::db_idle_timeout_secs(),
            db_acquire_timeout_secs: defaults::db_acquire_timeout_secs(),
            session_expiry_days: defaults::session_expiry_days(),
            session_cookie_secure: false,
            session_backend: SessionBackend::default(),
            session_cleanup_interval_secs: defaults::session_cleanup_interval_secs(),
            default_size_stock: defaults::default_size_stock(),
            currency: defaults::currency(),
            stripe_webhook_secret: None,
            heleket_webhook_secret: None,
            webhook_tolerance_secs: defaults::webhook_tolerance_secs(),
            event_channel_capacity: defaults::event_channel_capacity(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(defaults::ENVIRONMENT)
    }

    /// Configured CORS origins, trimmed, blanks dropped.
    pub fn cors_origins(&self) -> Vec<&str> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Any origin may call the API (development, or an explicit opt-in).
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Rules that span several fields and depend on the environment.
    fn check_deployment(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && self.cors_origins().is_empty() {
            errors.add(
                "cors_allowed_origins",
                rule_error(
                    "cors_allowed_origins_required",
                    "Set APP__CORS_ALLOWED_ORIGINS outside development or opt in with APP__CORS_ALLOW_ANY_ORIGIN=true",
                ),
            );
        }
        if self.is_production() && !self.session_cookie_secure {
            errors.add(
                "session_cookie_secure",
                rule_error(
                    "session_cookie_secure_required",
                    "Session cookies must be Secure in production",
                ),
            );
        }

        if self.is_production() && self.session_backend == SessionBackend::Memory {
            errors.add(
                "session_backend",
                rule_error(
                    "session_backend_database_required",
                    "Sessions must be stored in the database in production",
                ),
            );
        }
        if self.is_production() {
            let secrets = [
                ("stripe_webhook_secret", &self.stripe_webhook_secret),
                ("heleket_webhook_secret", &self.heleket_webhook_secret),
            ];
            for (field, secret) in secrets {
                if secret.as_deref().map_or(true, |s| s.trim().is_empty()) {
                    errors.add(
                        field,
                        rule_error(
                            "webhook_secret_required",
                            "Payment webhooks must be signed in production",
                        ),
                    );
                }
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn rule_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(rule_error(
            "log_level",
            "Must be one of: trace, debug, info, warn, error",
        ))
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| {
            EnvFilter::new(format!("storefront_api={},tower_http=debug", level))
        });

    let builder = fmt().with_env_filter(filter);
    // A subscriber may already be installed (tests); keep it.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Reads and validates the configuration for `RUN_ENV` (or `APP_ENV`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| defaults::ENVIRONMENT.to_string());
    info!(environment = %run_env, "loading configuration");

    if !Path::new(CONFIG_DIR).is_dir() {
        info!(dir = CONFIG_DIR, "no config directory; using defaults and APP__* variables");
    }

    let app_config: AppConfig = Config::builder()
        .set_default("database_url", defaults::DATABASE_URL)?
        .set_default("host", defaults::HOST)?
        .set_default("port", i64::from(defaults::port()))?
        .set_default("environment", defaults::ENVIRONMENT)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    if let Err(e) = app_config
        .validate()
        .and_then(|_| app_config.check_deployment())
    {
        error!(errors = ?e, "invalid configuration");
        return Err(e.into());
    }

    info!(environment = %app_config.environment, "configuration loaded");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> AppConfig {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        );
        cfg.stripe_webhook_secret = Some("whsec_live".into());
        cfg.heleket_webhook_secret = Some("heleket_live".into());
        cfg
    }

    #[test]
    fn production_needs_cors_origins() {
        let mut cfg = production();
        cfg.session_cookie_secure = true;
        let errors = cfg.check_deployment().unwrap_err();
        assert!(errors.field_errors().contains_key("cors_allowed_origins"));

        cfg.cors_allowed_origins = Some(" https://shop.example.com , ".into());
        assert!(cfg.check_deployment().is_ok());
        assert_eq!(cfg.cors_origins(), vec!["https://shop.example.com"]);
    }

    #[test]
    fn production_needs_secure_cookies() {
        let mut cfg = production();
        cfg.cors_allow_any_origin = true;
        let errors = cfg.check_deployment().unwrap_err();
        assert!(errors.field_errors().contains_key("session_cookie_secure"));
    }

    #[test]
    fn production_needs_webhook_secrets() {
        let mut cfg = production();
        cfg.cors_allow_any_origin = true;
        cfg.session_cookie_secure = true;
        assert!(cfg.check_deployment().is_ok());

        cfg.stripe_webhook_secret = None;
        cfg.heleket_webhook_secret = Some("  ".into());
        let errors = cfg.check_deployment().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("stripe_webhook_secret"));
        assert!(fields.contains_key("heleket_webhook_secret"));
    }

    #[test]
    fn production_keeps_sessions_in_the_database() {
        let mut cfg = production();
        cfg.cors_allow_any_origin = true;
        cfg.session_cookie_secure = true;
        cfg.session_backend = SessionBackend::Memory;
        let errors = cfg.check_deployment().unwrap_err();
        assert!(errors.field_errors().contains_key("session_backend"));
    }

    #[test]
    fn development_is_permissive() {
        let mut cfg = production();
        cfg.environment = "development".into();
        assert!(cfg.check_deployment().is_ok());
        assert!(cfg.validate().is_ok());
        assert!(cfg.should_allow_permissive_cors());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut cfg = production();
        cfg.log_level = "verbose".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("log_level"));

        cfg.log_level = "WARN".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn storefront_defaults() {
        let cfg = production();
        assert_eq!(cfg.default_size_stock, 100);
        assert_eq!(cfg.webhook_tolerance_secs, 300);
        assert_eq!(cfg.session_expiry_days, 14);
        assert_eq!(cfg.session_backend, SessionBackend::Database);
        assert_eq!(cfg.currency, "AZN");
        assert_eq!(cfg.listen_addr(), "127.0.0.1:8080");
    }
}
