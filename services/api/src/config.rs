//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use crm_core::ReadFailurePolicy;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Minimum length of the shared HS256 verification secret.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where student records and timelines are persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("'{}' is not a store backend (postgres|memory)", other)),
        }
    }
}

/// Bearer-token verification settings.
#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: Option<String>,
}

/// Outbound email transport settings.
#[derive(Clone, Debug)]
pub struct EmailSettings {
    pub api_key: Option<String>,
    pub from: String,
    pub api_url: String,
    pub timeout: Duration,
    /// Sandbox mode: every email goes here instead of to its recipient.
    pub redirect_to: Option<String>,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub allowed_origins: Vec<String>,
    pub jwt: JwtSettings,
    /// Token subjects granted the admin role at startup.
    pub admin_subjects: Vec<String>,
    pub email: EmailSettings,
    pub openai_api_key: Option<String>,
    pub summary_model: String,
    pub summary_timeout: Duration,
    pub read_failure_policy: ReadFailurePolicy,
    pub fetch_limit: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Server and Store Settings ---
        let bind_address = parse_or(&var, "BIND_ADDRESS", "0.0.0.0:8000", |s| {
            s.parse::<SocketAddr>().map_err(|e| e.to_string())
        })?;
        let store_backend = parse_or(&var, "STORE_BACKEND", "postgres", StoreBackend::from_str)?;
        let database_url = match store_backend {
            StoreBackend::Postgres => Some(required("DATABASE_URL")?),
            StoreBackend::Memory => var("DATABASE_URL"),
        };

        let log_level = parse_or(&var, "RUST_LOG", "INFO", |s| {
            s.parse::<Level>()
                .map_err(|_| format!("'{}' is not a valid log level", s))
        })?;

        let allowed_origins = list(
            &var("ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000,http://127.0.0.1:3000".to_string()),
        );

        // --- Authentication ---
        let secret = required("AUTH_JWT_SECRET")?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "AUTH_JWT_SECRET".to_string(),
                format!("must be at least {} characters", MIN_JWT_SECRET_LEN),
            ));
        }
        let jwt = JwtSettings {
            secret,
            issuer: required("AUTH_JWT_ISSUER")?,
            audience: var("AUTH_JWT_AUDIENCE"),
        };
        let admin_subjects = list(&var("ADMIN_SUBJECTS").unwrap_or_default());

        // --- Email Transport ---
        let email = EmailSettings {
            api_key: var("RESEND_API_KEY"),
            from: var("EMAIL_FROM").unwrap_or_else(|| "onboarding@resend.dev".to_string()),
            api_url: var("EMAIL_API_URL")
                .unwrap_or_else(|| "https://api.resend.com/emails".to_string()),
            timeout: parse_or(&var, "EMAIL_TIMEOUT_SECS", "30", parse_secs)?,
            redirect_to: var("EMAIL_REDIRECT_TO"),
        };

        // --- Summary Generation ---
        let openai_api_key = var("OPENAI_API_KEY");
        let summary_model = var("SUMMARY_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let summary_timeout = parse_or(&var, "SUMMARY_TIMEOUT_SECS", "20", parse_secs)?;

        // --- Read Behaviour ---
        let read_failure_policy =
            parse_or(&var, "READ_FAILURE_POLICY", "fail", ReadFailurePolicy::from_str)?;
        let fetch_limit = parse_or(&var, "FETCH_LIMIT", "10000", |s| {
            match s.parse::<usize>() {
                Ok(0) => Err("must be greater than zero".to_string()),
                Ok(n) => Ok(n),
                Err(e) => Err(e.to_string()),
            }
        })?;

        Ok(Self {
            bind_address,
            store_backend,
            database_url,
            log_level,
            allowed_origins,
            jwt,
            admin_subjects,
            email,
            openai_api_key,
            summary_model,
            summary_timeout,
            read_failure_policy,
            fetch_limit,
        })
    }
}

fn parse_or<T, V, P>(var: V, key: &str, default: &str, parse: P) -> Result<T, ConfigError>
where
    V: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, String>,
{
    let raw = var(key).unwrap_or_else(|| default.to_string());
    parse(raw.trim()).map_err(|e| ConfigError::InvalidValue(key.to_string(), e))
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn parse_secs(s: &str) -> Result<Duration, String> {
    match s.parse::<u64>() {
        Ok(0) => Err("must be at least one second".to_string()),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("STORE_BACKEND", "memory"),
            ("AUTH_JWT_SECRET", SECRET),
            ("AUTH_JWT_ISSUER", "crm"),
        ]
    }

    #[test]
    fn defaults_apply() {
        let config = load(&minimal()).unwrap();
        assert_eq!(config.bind_address.port(), 8000);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.allowed_origins.len(), 2);
        assert_eq!(config.email.from, "onboarding@resend.dev");
        assert_eq!(config.email.timeout, Duration::from_secs(30));
        assert_eq!(config.summary_timeout, Duration::from_secs(20));
        assert_eq!(config.read_failure_policy, ReadFailurePolicy::Fail);
        assert_eq!(config.fetch_limit, 10_000);
        assert!(config.email.api_key.is_none());
        assert!(config.openai_api_key.is_none());
        assert!(config.admin_subjects.is_empty());
    }

    #[test]
    fn postgres_needs_a_database_url() {
        let err = load(&[("AUTH_JWT_SECRET", SECRET), ("AUTH_JWT_ISSUER", "crm")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "DATABASE_URL"));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = load(&[
            ("STORE_BACKEND", "memory"),
            ("AUTH_JWT_SECRET", "short"),
            ("AUTH_JWT_ISSUER", "crm"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "AUTH_JWT_SECRET"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = minimal();
        pairs.extend([
            ("READ_FAILURE_POLICY", "degrade"),
            ("FETCH_LIMIT", "50"),
            ("EMAIL_REDIRECT_TO", "sandbox@example.com"),
            ("ALLOWED_ORIGINS", "https://crm.example.com"),
            ("ADMIN_SUBJECTS", "uid-1, uid-2"),
        ]);
        let config = load(&pairs).unwrap();
        assert_eq!(config.read_failure_policy, ReadFailurePolicy::Degrade);
        assert_eq!(config.fetch_limit, 50);
        assert_eq!(config.email.redirect_to.as_deref(), Some("sandbox@example.com"));
        assert_eq!(config.allowed_origins, vec!["https://crm.example.com".to_string()]);
        assert_eq!(config.admin_subjects, vec!["uid-1".to_string(), "uid-2".to_string()]);
    }

    #[test]
    fn bad_values_name_their_variable() {
        let mut pairs = minimal();
        pairs.push(("SUMMARY_TIMEOUT_SECS", "soon"));
        let err = load(&pairs).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "SUMMARY_TIMEOUT_SECS"));
    }
}
