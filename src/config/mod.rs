use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

/// Where outgoing mail ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        use_tls: bool,
    },
    /// Writes `.eml` files into a directory
    File { path: PathBuf },
    /// Logs the message and reports success, for local development
    Log,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expiration_secs: u64,
    pub jwt_refresh_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub app_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub admin_email: String,
    pub overdue_threshold_minutes: i64,
    pub overdue_sweep_interval_secs: u64,
    pub email_job_attempts: u32,
    pub email_job_backoff_ms: u64,
    pub email_queue_poll_ms: u64,
    pub email_from: String,
    pub email_from_name: String,
    pub email_transport: EmailTransportConfig,
}

impl Config {
    /// A configuration with every optional setting at its default.
    pub fn with_defaults(database_url: &str, redis_url: &str, jwt_secret: &str) -> Self {
        Config {
            database_url: database_url.to_string(),
            redis_url: redis_url.to_string(),
            jwt_secret: jwt_secret.to_string(),
            jwt_refresh_secret: format!("{jwt_secret}-refresh"),
            jwt_expiration_secs: 15 * 60,
            jwt_refresh_expiration_secs: 7 * 24 * 3600,
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            api_base_uri: "/api".to_string(),
            app_url: "http://localhost:3001".to_string(),
            cors_allowed_origins: vec!["http://localhost:3001".to_string()],
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            admin_email: "admin@example.com".to_string(),
            overdue_threshold_minutes: 24 * 60,
            overdue_sweep_interval_secs: 3600,
            email_job_attempts: 3,
            email_job_backoff_ms: 5000,
            email_queue_poll_ms: 1000,
            email_from: "noreply@example.com".to_string(),
            email_from_name: "Laptop Checkout System".to_string(),
            email_transport: EmailTransportConfig::Log,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = Config::with_defaults(&required("DATABASE_URL")?, &required("REDIS_URL")?, &required("JWT_SECRET")?);

        if let Some(secret) = optional("JWT_REFRESH_SECRET") {
            config.jwt_refresh_secret = secret;
        }
        if let Some(value) = optional("JWT_EXPIRATION") {
            config.jwt_expiration_secs = parse_duration_secs("JWT_EXPIRATION", &value)?;
        }
        if let Some(value) = optional("JWT_REFRESH_EXPIRATION") {
            config.jwt_refresh_expiration_secs = parse_duration_secs("JWT_REFRESH_EXPIRATION", &value)?;
        }
        if let Some(host) = optional("SERVER_HOST") {
            config.server_host = host;
        }
        config.server_port = parsed("SERVER_PORT", config.server_port)?;
        if let Some(uri) = optional("API_BASE_URI") {
            config.api_base_uri = uri;
        }
        if let Some(url) = optional("APP_URL") {
            config.app_url = url.trim_end_matches('/').to_string();
            config.cors_allowed_origins = vec![config.app_url.clone()];
        }
        if let Some(origins) = optional("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        config.rate_limit_window_secs = parsed("RATE_LIMIT_WINDOW", config.rate_limit_window_secs)?;
        config.rate_limit_requests = parsed("RATE_LIMIT_REQUESTS", config.rate_limit_requests)?;
        if let Some(email) = optional("ADMIN_EMAIL") {
            config.admin_email = email;
        }
        config.overdue_threshold_minutes = parsed("OVERDUE_THRESHOLD_MINUTES", config.overdue_threshold_minutes)?;
        config.overdue_sweep_interval_secs = parsed("OVERDUE_SWEEP_INTERVAL_SECS", config.overdue_sweep_interval_secs)?;
        config.email_job_attempts = parsed("EMAIL_JOB_ATTEMPTS", config.email_job_attempts)?;
        config.email_job_backoff_ms = parsed("EMAIL_JOB_BACKOFF_MS", config.email_job_backoff_ms)?;
        config.email_queue_poll_ms = parsed("EMAIL_QUEUE_POLL_MS", config.email_queue_poll_ms)?;
        if let Some(from) = optional("EMAIL_FROM") {
            config.email_from = from;
        }
        if let Some(name) = optional("EMAIL_FROM_NAME") {
            config.email_from_name = name;
        }
        config.email_transport = email_transport_from_env()?;

        Ok(config)
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn overdue_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.overdue_sweep_interval_secs)
    }

    pub fn email_queue_poll(&self) -> Duration {
        Duration::from_millis(self.email_queue_poll_ms)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn email_transport_from_env() -> Result<EmailTransportConfig, ConfigError> {
    let kind = optional("EMAIL_TRANSPORT").unwrap_or_else(|| "log".to_string());
    match kind.to_ascii_lowercase().as_str() {
        "log" => Ok(EmailTransportConfig::Log),
        "file" => Ok(EmailTransportConfig::File {
            path: PathBuf::from(optional("EMAIL_FILE_DIR").unwrap_or_else(|| "./emails".to_string())),
        }),
        "smtp" => Ok(EmailTransportConfig::Smtp {
            host: required("SMTP_HOST")?,
            port: parsed("SMTP_PORT", 587)?,
            username: optional("SMTP_USERNAME"),
            password: optional("SMTP_PASSWORD"),
            use_tls: parsed("SMTP_TLS", true)?,
        }),
        _ => Err(ConfigError::Invalid { name: "EMAIL_TRANSPORT", value: kind }),
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Parses `90`, `90s`, `15m`, `24h` or `7d` into seconds. A bare number is seconds.
pub fn parse_duration_secs(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::Invalid { name, value: value.to_string() };

    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 3600),
        Some((idx, 'd')) => (&value[..idx], 86_400),
        Some(_) => (value, 1),
        None => return Err(invalid()),
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_suffixes() {
        assert_eq!(parse_duration_secs("X", "15m").unwrap(), 900);
        assert_eq!(parse_duration_secs("X", "7d").unwrap(), 604_800);
        assert_eq!(parse_duration_secs("X", "24h").unwrap(), 86_400);
        assert_eq!(parse_duration_secs("X", "45s").unwrap(), 45);
        assert_eq!(parse_duration_secs("X", "120").unwrap(), 120);
    }

    #[test]
    fn bad_durations_name_the_variable() {
        for bad in ["", "m", "tenm", "-5m", "5w"] {
            match parse_duration_secs("JWT_EXPIRATION", bad) {
                Err(ConfigError::Invalid { name, .. }) => assert_eq!(name, "JWT_EXPIRATION"),
                other => panic!("{bad:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn defaults() {
        let config = Config::with_defaults("postgres://localhost/laptops", "redis://127.0.0.1/", "s3cret");
        assert_eq!(config.jwt_refresh_secret, "s3cret-refresh");
        assert_eq!(config.jwt_expiration(), Duration::from_secs(900));
        assert_eq!(config.overdue_threshold_minutes, 1440);
        assert_eq!(config.email_job_attempts, 3);
        assert_eq!(config.email_transport, EmailTransportConfig::Log);
        assert_eq!(config.server_addr(), "0.0.0.0:3000");
    }
}
