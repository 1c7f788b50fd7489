//! Environment-driven configuration.
//!
//! Everything the worker needs is read from the environment once at startup.
//! Missing required variables and unparseable values are fatal
//! ([`ConfigError`]); nothing here is re-read after the process is up.

use std::str::FromStr;
use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sqlx::postgres::PgSslMode;

/// Full worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs claimed per tick.
    pub batch_size: u32,
    /// One batch then exit, instead of the polling daemon.
    pub run_once: bool,
    /// Daemon-mode tick period.
    pub poll_interval: Duration,
    /// Daemon-mode janitor period.
    pub reclaim_interval: Duration,
    /// Claims older than this are considered abandoned.
    pub reclaim_after: Duration,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub log_level: String,
    pub environment: String,
}

/// Postgres connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: PgSslMode,
    pub max_connections: u32,
}

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    pub max_retries: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub pool_size: u32,
    pub min_idle_conns: u32,
    pub tls_enabled: bool,
    /// TTL applied to cached cluster payloads.
    pub ttl: Duration,
}

/// Bytes that cannot appear raw in the userinfo component of a URL.
const USERINFO_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

impl CacheConfig {
    /// Connection URL for the Redis client.
    pub fn url(&self) -> String {
        let scheme = if self.tls_enabled { "rediss" } else { "redis" };
        match &self.password {
            Some(password) => {
                let password = utf8_percent_encode(password, USERINFO_ENCODE_SET);
                format!(
                    "{scheme}://:{password}@{}:{}/{}",
                    self.host, self.port, self.database
                )
            }
            None => format!("{scheme}://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Configuration loading error; always fatal at startup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

impl WorkerConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Tests drive this with plain maps so they never touch process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DatabaseConfig {
            host: required(&lookup, "DB_HOST")?,
            port: parse_or(&lookup, "DB_PORT", 5432)?,
            user: required(&lookup, "DB_USER")?,
            password: required(&lookup, "DB_PASSWORD")?,
            name: required(&lookup, "DB_NAME")?,
            ssl_mode: parse_ssl_mode(&lookup)?,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
        };

        let cache = CacheConfig {
            host: required(&lookup, "CACHE_HOST")?,
            port: parse_or(&lookup, "CACHE_PORT", 6379)?,
            password: optional(&lookup, "CACHE_PASSWORD"),
            database: parse_or(&lookup, "CACHE_DATABASE", 0)?,
            max_retries: parse_or(&lookup, "CACHE_MAX_RETRIES", 3)?,
            connect_timeout: parse_secs(&lookup, "CACHE_CONNECT_TIMEOUT", 5)?,
            read_timeout: parse_secs(&lookup, "CACHE_READ_TIMEOUT", 5)?,
            write_timeout: parse_secs(&lookup, "CACHE_WRITE_TIMEOUT", 5)?,
            pool_size: parse_or(&lookup, "CACHE_POOL_SIZE", 10)?,
            min_idle_conns: parse_or(&lookup, "CACHE_MIN_IDLE_CONNS", 5)?,
            tls_enabled: parse_flag(&lookup, "CACHE_TLS_ENABLED", false)?,
            ttl: parse_secs(&lookup, "CACHE_TTL", 3600)?,
        };

        Ok(Self {
            batch_size: parse_or(&lookup, "BATCH_SIZE", 10)?,
            run_once: parse_flag(&lookup, "RUN_ONCE", false)?,
            poll_interval: parse_nonzero_secs(&lookup, "POLL_INTERVAL", 60)?,
            reclaim_interval: parse_nonzero_secs(&lookup, "RECLAIM_INTERVAL", 600)?,
            reclaim_after: parse_secs(&lookup, "RECLAIM_AFTER", 600)?,
            database,
            cache,
            log_level: parse_log_level(&lookup)?,
            environment: parse_environment(&lookup)?,
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_secs<F>(lookup: &F, name: &'static str, default_secs: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(Duration::from_secs(parse_or(lookup, name, default_secs)?))
}

// Tick periods feed `tokio::time::interval`, which panics on zero.
fn parse_nonzero_secs<F>(
    lookup: &F,
    name: &'static str,
    default_secs: u64,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let period = parse_secs(lookup, name, default_secs)?;
    if period.is_zero() {
        return Err(ConfigError::Invalid {
            name,
            message: "must be at least 1 second".to_string(),
        });
    }
    Ok(period)
}

fn parse_flag<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, name) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::Invalid {
                name,
                message: format!("expected a boolean, got {other:?}"),
            }),
        },
        None => Ok(default),
    }
}

fn parse_ssl_mode<F>(lookup: &F) -> Result<PgSslMode, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, "DB_SSL_MODE") {
        Some(raw) => PgSslMode::from_str(&raw).map_err(|e| ConfigError::Invalid {
            name: "DB_SSL_MODE",
            message: e.to_string(),
        }),
        None => Ok(PgSslMode::Disable),
    }
}

fn parse_log_level<F>(lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, "LOG_LEVEL") {
        Some(raw) => {
            let lower = raw.to_ascii_lowercase();
            match lower.as_str() {
                "debug" | "info" | "warn" | "error" => Ok(lower),
                other => Err(ConfigError::Invalid {
                    name: "LOG_LEVEL",
                    message: format!("unknown level {other:?}"),
                }),
            }
        }
        None => Ok("info".to_string()),
    }
}

fn parse_environment<F>(lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, "ENVIRONMENT") {
        Some(raw) => {
            let lower = raw.to_ascii_lowercase();
            match lower.as_str() {
                "development" | "production" => Ok(lower),
                other => Err(ConfigError::Invalid {
                    name: "ENVIRONMENT",
                    message: format!("unknown environment {other:?}"),
                }),
            }
        }
        None => Ok("development".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DB_HOST", "localhost"),
            ("DB_USER", "fieldscope"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "fieldscope"),
            ("CACHE_HOST", "localhost"),
        ]
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let pairs = minimal();
        let config = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.batch_size, 10);
        assert!(!config.run_once);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.reclaim_interval, Duration::from_secs(600));
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.max_connections, 10);
        assert!(matches!(config.database.ssl_mode, PgSslMode::Disable));
        assert_eq!(config.cache.port, 6379);
        assert!(config.cache.password.is_none());
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert!(!config.cache.tls_enabled);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.environment, "development");
    }

    #[test]
    fn missing_required_var_is_reported_by_name() {
        let mut pairs = minimal();
        pairs.retain(|(key, _)| *key != "DB_PASSWORD");

        let err = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DB_PASSWORD")));
    }

    #[test]
    fn unparseable_number_is_invalid() {
        let mut pairs = minimal();
        pairs.push(("BATCH_SIZE", "lots"));

        let err = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BATCH_SIZE", .. }));
    }

    #[test]
    fn overrides_are_honoured() {
        let mut pairs = minimal();
        pairs.extend([
            ("BATCH_SIZE", "25"),
            ("RUN_ONCE", "true"),
            ("POLL_INTERVAL", "5"),
            ("DB_SSL_MODE", "require"),
            ("CACHE_PASSWORD", "hunter2"),
            ("CACHE_TLS_ENABLED", "1"),
            ("CACHE_TTL", "120"),
            ("LOG_LEVEL", "DEBUG"),
            ("ENVIRONMENT", "production"),
        ]);

        let config = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.batch_size, 25);
        assert!(config.run_once);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(matches!(config.database.ssl_mode, PgSslMode::Require));
        assert_eq!(config.cache.password.as_deref(), Some("hunter2"));
        assert!(config.cache.tls_enabled);
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.environment, "production");
    }

    #[test]
    fn empty_optional_password_counts_as_unset() {
        let mut pairs = minimal();
        pairs.push(("CACHE_PASSWORD", ""));

        let config = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(config.cache.password.is_none());
    }

    #[test]
    fn bad_boolean_is_invalid() {
        let mut pairs = minimal();
        pairs.push(("RUN_ONCE", "sometimes"));

        let err = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RUN_ONCE", .. }));
    }

    #[test]
    fn zero_poll_interval_is_invalid() {
        let mut pairs = minimal();
        pairs.push(("POLL_INTERVAL", "0"));

        let err = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "POLL_INTERVAL", .. }));
    }

    #[test]
    fn zero_reclaim_interval_is_invalid() {
        let mut pairs = minimal();
        pairs.push(("RECLAIM_INTERVAL", "0"));

        let err = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "RECLAIM_INTERVAL", .. }
        ));
    }

    #[test]
    fn cache_url_includes_credentials_and_database() {
        let mut pairs = minimal();
        pairs.extend([("CACHE_PASSWORD", "hunter2"), ("CACHE_DATABASE", "2")]);

        let config = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.cache.url(), "redis://:hunter2@localhost:6379/2");
    }

    #[test]
    fn cache_url_percent_encodes_the_password() {
        let mut pairs = minimal();
        pairs.push(("CACHE_PASSWORD", "p@ss/word:1"));

        let config = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(
            config.cache.url(),
            "redis://:p%40ss%2Fword%3A1@localhost:6379/0"
        );
    }

    #[test]
    fn cache_url_uses_tls_scheme_when_enabled() {
        let mut pairs = minimal();
        pairs.push(("CACHE_TLS_ENABLED", "true"));

        let config = WorkerConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.cache.url(), "rediss://localhost:6379/0");
    }
}
