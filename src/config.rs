//! Process configuration read from the environment.
//!
//! `.env` is loaded by `main` through `dotenvy` before [`AppConfig::from_env`]
//! runs. Parsing goes through a lookup function so tests can feed variables
//! without touching the process environment.

use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::RateLimitConfig;
use crate::app::WorkerConfig;
use crate::domain::ConfigError;
use crate::infra::auth::jwt::MIN_SECRET_BYTES;
use crate::infra::observability::LogFormat;
use crate::infra::oauth::google::DEFAULT_TOKENINFO_URL;
use crate::infra::payments::stripe::DEFAULT_API_BASE;
use crate::infra::{GoogleConfig, JwtSettings, PostgresConfig, StripeConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: SecretString,
    pub database: PostgresConfig,
    pub bind_addr: String,
    pub jwt: JwtSettings,
    pub refresh_token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub cookie_secure: bool,
    /// `None` disables payments
    pub stripe: Option<StripeConfig>,
    pub google: GoogleConfig,
    pub upload_dir: PathBuf,
    pub public_upload_path: String,
    pub email_from: String,
    pub cors_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub worker: WorkerConfig,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let jwt_secret = env.required("JWT_SECRET")?;
        if jwt_secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                message: format!("must be at least {MIN_SECRET_BYTES} bytes"),
            });
        }

        let jwt = JwtSettings {
            secret: SecretString::from(jwt_secret),
            issuer: env.string_or("JWT_ISSUER", "storefront-api"),
            audience: env.string_or("JWT_AUDIENCE", "storefront-client"),
            access_ttl: Duration::from_secs(env.parse_or("ACCESS_TOKEN_TTL_SECS", 900u64)?),
        };

        let refresh_days: u64 = env.parse_or("REFRESH_TOKEN_TTL_DAYS", 14)?;
        if refresh_days == 0 {
            return Err(invalid("REFRESH_TOKEN_TTL_DAYS", "must be positive"));
        }

        let stripe = match (env.optional("STRIPE_SECRET_KEY"), env.optional("STRIPE_WEBHOOK_SECRET")) {
            (Some(key), Some(webhook)) => {
                let mut config =
                    StripeConfig::new(SecretString::from(key), SecretString::from(webhook));
                config.api_base = env.string_or("STRIPE_API_BASE", DEFAULT_API_BASE);
                Some(config)
            }
            (None, None) => None,
            _ => {
                return Err(invalid(
                    "STRIPE_WEBHOOK_SECRET",
                    "STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET must be set together",
                ));
            }
        };

        let google = GoogleConfig {
            client_id: env.optional("GOOGLE_CLIENT_ID"),
            tokeninfo_url: env.string_or("GOOGLE_TOKENINFO_URL", DEFAULT_TOKENINFO_URL),
            ..GoogleConfig::default()
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            general_rps: env.positive_or("RATE_LIMIT_RPS", defaults.general_rps)?,
            general_burst: env.positive_or("RATE_LIMIT_BURST", defaults.general_burst)?,
            auth_rps: env.positive_or("AUTH_RATE_LIMIT_RPS", defaults.auth_rps)?,
            auth_burst: env.positive_or("AUTH_RATE_LIMIT_BURST", defaults.auth_burst)?,
            ..defaults
        };

        let worker_defaults = WorkerConfig::default();
        let worker = WorkerConfig {
            enabled: env.parse_or("WORKER_ENABLED", true)?,
            poll_interval: Duration::from_secs(u64::from(
                env.positive_or("WORKER_POLL_SECS", 60)?,
            )),
            pending_order_ttl: Duration::from_secs(
                u64::from(env.positive_or("PENDING_ORDER_TTL_HOURS", 24)?) * 3600,
            ),
            ..worker_defaults
        };

        let pool_defaults = PostgresConfig::default();
        let database = PostgresConfig {
            max_connections: env.positive_or("DB_MAX_CONNECTIONS", pool_defaults.max_connections)?,
            min_connections: env.parse_or("DB_MIN_CONNECTIONS", pool_defaults.min_connections)?,
            acquire_timeout: Duration::from_secs(u64::from(env.positive_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                3,
            )?)),
            ..pool_defaults
        };

        Ok(Self {
            database_url: SecretString::from(env.required("DATABASE_URL")?),
            database,
            bind_addr: env.string_or("BIND_ADDR", "0.0.0.0:3000"),
            jwt,
            refresh_token_ttl: Duration::from_secs(refresh_days * 24 * 3600),
            bcrypt_cost: env.parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            cookie_secure: env.parse_or("COOKIE_SECURE", true)?,
            stripe,
            google,
            upload_dir: PathBuf::from(env.string_or("UPLOAD_DIR", "./uploads")),
            public_upload_path: env.string_or("PUBLIC_UPLOAD_PATH", "/uploads"),
            email_from: env.string_or("EMAIL_FROM", "no-reply@storefront.local"),
            cors_origins: env
                .optional("CORS_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            rate_limit,
            worker,
            log_format: env.parse_or("LOG_FORMAT", LogFormat::default())?,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank are treated the same.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, &e.to_string())),
            None => Ok(default),
        }
    }

    fn positive_or(&self, key: &str, default: u32) -> Result<u32, ConfigError> {
        let value = self.parse_or(key, default)?;
        if value == 0 {
            return Err(invalid(key, "must be greater than zero"));
        }
        Ok(value)
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATABASE_URL", "postgres://localhost/storefront"),
            ("JWT_SECRET", SECRET),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = load(&minimal()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.jwt.issuer, "storefront-api");
        assert_eq!(config.jwt.access_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(14 * 86400));
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(config.cookie_secure);
        assert!(config.stripe.is_none());
        assert!(config.google.client_id.is_none());
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.rate_limit.auth_rps, 2);
        assert_eq!(config.worker.poll_interval, Duration::from_secs(60));
        assert_eq!(config.public_upload_path, "/uploads");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.database, PostgresConfig::default());
    }

    #[test]
    fn test_pool_sizing() {
        let mut vars = minimal();
        vars.push(("DB_MAX_CONNECTIONS", "25"));
        vars.push(("DB_ACQUIRE_TIMEOUT_SECS", "10"));
        let config = load(&vars).unwrap();
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.database.min_connections, 2);
        assert_eq!(config.database.acquire_timeout, Duration::from_secs(10));

        let mut vars = minimal();
        vars.push(("DB_MAX_CONNECTIONS", "0"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_missing_database_url() {
        let err = load(&[("JWT_SECRET", SECRET)]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "DATABASE_URL"));
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "short")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "JWT_SECRET"));
    }

    #[test]
    fn test_invalid_number_reports_key() {
        let mut vars = minimal();
        vars.push(("RATE_LIMIT_RPS", "lots"));
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "RATE_LIMIT_RPS"));

        let mut vars = minimal();
        vars.push(("WORKER_POLL_SECS", "0"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_stripe_requires_both_secrets() {
        let mut vars = minimal();
        vars.push(("STRIPE_SECRET_KEY", "sk_test_123"));
        assert!(load(&vars).is_err());

        vars.push(("STRIPE_WEBHOOK_SECRET", "whsec_123"));
        vars.push(("STRIPE_API_BASE", "http://localhost:12111"));
        let stripe = load(&vars).unwrap().stripe.unwrap();
        assert_eq!(stripe.secret_key.expose_secret(), "sk_test_123");
        assert_eq!(stripe.api_base, "http://localhost:12111");
    }

    #[test]
    fn test_lists_and_flags() {
        let mut vars = minimal();
        vars.push(("CORS_ORIGINS", "http://a.test, ,http://b.test"));
        vars.push(("COOKIE_SECURE", "false"));
        vars.push(("LOG_FORMAT", "json"));
        vars.push(("GOOGLE_CLIENT_ID", "client.apps.googleusercontent.com"));
        vars.push(("PENDING_ORDER_TTL_HOURS", "2"));
        let config = load(&vars).unwrap();
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert!(!config.cookie_secure);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.google.client_id.as_deref(),
            Some("client.apps.googleusercontent.com")
        );
        assert_eq!(config.worker.pending_order_ttl, Duration::from_secs(7200));
    }
}
