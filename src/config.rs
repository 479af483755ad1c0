use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "sms_development_signing_key_rotate_before_any_deployment_9f8e7d6c5b4a3z2y1x0w";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (postgres:// or sqlite://)
    pub database_url: String,

    /// JWT secret key (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    #[validate(range(min = 60, max = 86400))]
    pub jwt_expiration: usize,

    /// Refresh token lifetime in seconds
    #[validate(range(min = 3600, max = 2592000))]
    pub refresh_token_expiration: usize,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Whether the background jobs (stock check, overdue sweep, dispatcher, security monitor) run
    #[serde(default = "default_true_bool")]
    pub jobs_enabled: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default)]
    pub cors_allow_credentials: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    // ========== Procurement and billing ==========
    /// Margin applied on top of supplier cost for every purchase order
    #[serde(default = "default_markup_rate")]
    #[validate(custom = "validate_markup_rate")]
    pub markup_rate: Decimal,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Days between invoice issue and due date
    #[serde(default = "default_invoice_due_days")]
    #[validate(range(min = 1, max = 365))]
    pub invoice_due_days: i64,

    // ========== Notifications ==========
    /// Platform administrator mailbox, notified first on every low-stock alert
    #[serde(default = "default_sms_admin_email")]
    #[validate(email)]
    pub sms_admin_email: String,

    /// Delay between the admin and the vessel low-stock notification
    #[serde(default = "default_vessel_notification_delay_secs")]
    pub vessel_notification_delay_secs: u64,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// HTTP mail relay endpoint; log-only delivery when unset
    #[serde(default)]
    pub mail_relay_url: Option<String>,

    #[serde(default)]
    pub mail_relay_token: Option<String>,

    // ========== Background jobs ==========
    #[serde(default = "default_low_stock_check_interval_secs")]
    #[validate(range(min = 1))]
    pub low_stock_check_interval_secs: u64,
    #[serde(default = "default_overdue_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub overdue_sweep_interval_secs: u64,
    #[serde(default = "default_notification_dispatch_interval_secs")]
    #[validate(range(min = 1))]
    pub notification_dispatch_interval_secs: u64,
    #[serde(default = "default_security_monitor_interval_secs")]
    #[validate(range(min = 1))]
    pub security_monitor_interval_secs: u64,

    // ========== Security monitoring ==========
    /// Failed logins within the window that lock an account and raise an alert
    #[serde(default = "default_security_failed_login_threshold")]
    #[validate(range(min = 1))]
    pub security_failed_login_threshold: u64,
    #[serde(default = "default_security_window_minutes")]
    #[validate(range(min = 1))]
    pub security_window_minutes: i64,

    // ========== Storage ==========
    /// Root for generated invoice PDFs and uploaded files
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    // ========== Payment webhooks ==========
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,
    #[serde(default)]
    pub paypal_webhook_secret: Option<String>,
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the essentials
    pub fn new(
        database_url: String,
        jwt_secret: String,
        jwt_expiration: usize,
        refresh_token_expiration: usize,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            refresh_token_expiration,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            jobs_enabled: true,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            max_body_size: default_max_body_size(),
            markup_rate: default_markup_rate(),
            currency: default_currency(),
            invoice_due_days: default_invoice_due_days(),
            sms_admin_email: default_sms_admin_email(),
            vessel_notification_delay_secs: default_vessel_notification_delay_secs(),
            mail_from: default_mail_from(),
            mail_relay_url: None,
            mail_relay_token: None,
            low_stock_check_interval_secs: default_low_stock_check_interval_secs(),
            overdue_sweep_interval_secs: default_overdue_sweep_interval_secs(),
            notification_dispatch_interval_secs: default_notification_dispatch_interval_secs(),
            security_monitor_interval_secs: default_security_monitor_interval_secs(),
            security_failed_login_threshold: default_security_failed_login_threshold(),
            security_window_minutes: default_security_window_minutes(),
            storage_dir: default_storage_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            stripe_webhook_secret: None,
            paypal_webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn invoices_dir(&self) -> std::path::PathBuf {
        Path::new(&self.storage_dir).join("invoices")
    }

    pub fn uploads_dir(&self) -> std::path::PathBuf {
        Path::new(&self.storage_dir).join("uploads")
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.is_production()
            && (self.stripe_webhook_secret.is_none() || self.paypal_webhook_secret.is_none())
        {
            let mut err = ValidationError::new("webhook_secret_required");
            err.message = Some(
                "Payment webhooks are unauthenticated without APP__STRIPE_WEBHOOK_SECRET and APP__PAYPAL_WEBHOOK_SECRET".into(),
            );
            errors.add("stripe_webhook_secret", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_true_bool() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_auth_issuer() -> String {
    "sms-api".to_string()
}
fn default_auth_audience() -> String {
    "sms-clients".to_string()
}
fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}
fn default_markup_rate() -> Decimal {
    dec!(0.20)
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_invoice_due_days() -> i64 {
    30
}
fn default_sms_admin_email() -> String {
    "admin@sms.local".to_string()
}
fn default_vessel_notification_delay_secs() -> u64 {
    30 * 60
}
fn default_mail_from() -> String {
    "SMS Platform <no-reply@sms.local>".to_string()
}
fn default_low_stock_check_interval_secs() -> u64 {
    3600
}
fn default_overdue_sweep_interval_secs() -> u64 {
    86_400
}
fn default_notification_dispatch_interval_secs() -> u64 {
    30
}
fn default_security_monitor_interval_secs() -> u64 {
    300
}
fn default_security_failed_login_threshold() -> u64 {
    5
}
fn default_security_window_minutes() -> i64 {
    15
}
fn default_storage_dir() -> String {
    "storage".to_string()
}
fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}
fn default_webhook_tolerance_secs() -> u64 {
    300
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_markup_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE {
        let mut err = ValidationError::new("markup_rate");
        err.message = Some("markup_rate must be between 0 and 1".into());
        return Err(err);
    }
    Ok(())
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 64 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must be at least 64 characters for adequate security".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let lower = trimmed.to_ascii_lowercase();
    let weak_fragments = ["changeme", "password", "secret-key", "12345", "abcdef"];
    if weak_fragments.iter().any(|pattern| lower.contains(pattern)) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some(
            "JWT secret appears to be weak; use a cryptographically strong random string".into(),
        );
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("sms_api={},tower_http=debug,sqlx=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://sms.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("refresh_token_expiration", 604800)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET (minimum 64 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const GOOD_SECRET: &str =
        "Zq8vN3kLw5tRy7uPb2mXc4jHf6gDs9aQe1oIz0nWv3kLt5rYu7pBm2xCj4hFg6dS";

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            GOOD_SECRET.into(),
            3600,
            86_400,
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let mut cfg = base_config();
        cfg.stripe_webhook_secret = Some("whsec".into());
        cfg.paypal_webhook_secret = Some("ppsec".into());
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.cors_allowed_origins = Some("https://fleet.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn production_requires_webhook_secrets() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("stripe_webhook_secret"));
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn markup_rate_outside_unit_interval_is_rejected() {
        let mut cfg = base_config();
        assert!(cfg.validate().is_ok());
        cfg.markup_rate = dec!(1.5);
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("markup_rate"));
    }

    #[test]
    fn weak_jwt_secrets_are_rejected() {
        assert!(validate_jwt_secret("short").is_err());
        assert!(validate_jwt_secret(&"a".repeat(80)).is_err());
        assert!(validate_jwt_secret(&format!("password{}", GOOD_SECRET)).is_err());
        assert!(validate_jwt_secret(GOOD_SECRET).is_ok());
    }

    #[test]
    fn loads_layered_file_configuration() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            database_url = "sqlite://fleet.db?mode=rwc"
            jwt_secret = "{GOOD_SECRET}"
            vessel_notification_delay_secs = 60
            markup_rate = "0.25"
            "#
        )
        .unwrap();

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.database_url, "sqlite://fleet.db?mode=rwc");
        assert_eq!(cfg.vessel_notification_delay_secs, 60);
        assert_eq!(cfg.markup_rate, dec!(0.25));
        assert_eq!(cfg.invoice_due_days, 30);
    }
}
