//! Process configuration, read once at startup from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use agencyportal_auth::{MissingRolePolicy, RateLimitPolicy, SigningSecret};

/// Secrets shorter than this are accepted but logged as weak.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

const DEFAULT_PASSWORD_COST: u32 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required configuration {0} is missing")]
    Missing(&'static str),

    #[error("configuration {key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: SigningSecret,
    pub bind_addr: SocketAddr,
    pub token_ttl: Duration,
    pub csrf_ttl: Duration,
    pub sweep_interval: StdDuration,
    pub login_limit: RateLimitPolicy,
    pub api_limit: RateLimitPolicy,
    pub sensitive_limit: RateLimitPolicy,
    pub missing_role: MissingRolePolicy,
    pub seed_file: Option<PathBuf>,
    /// bcrypt cost for seeded passwords.
    pub password_cost: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_secret = lookup("JWT_SECRET").unwrap_or_default();
        let jwt_secret =
            SigningSecret::new(raw_secret).map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            tracing::warn!(
                length = jwt_secret.len(),
                minimum = MIN_JWT_SECRET_LENGTH,
                "JWT_SECRET is shorter than recommended"
            );
        }

        let bind_addr = match lookup("PORTAL_BIND_ADDR") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORTAL_BIND_ADDR",
                value: v,
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let secs = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            parse_positive(key, lookup(key), default)
        };
        let policy = |max_key: &'static str,
                      window_key: &'static str,
                      default: RateLimitPolicy|
         -> Result<RateLimitPolicy, ConfigError> {
            let max = parse_positive(max_key, lookup(max_key), u64::from(default.max_requests))?;
            let max = u32::try_from(max).map_err(|_| ConfigError::Invalid {
                key: max_key,
                value: max.to_string(),
            })?;
            let window = parse_positive(
                window_key,
                lookup(window_key),
                default.window.num_seconds().unsigned_abs(),
            )?;
            Ok(RateLimitPolicy::new(max, seconds(window_key, window)?))
        };

        let missing_role = match lookup("PORTAL_MISSING_ROLE").as_deref().map(str::trim) {
            None | Some("") => MissingRolePolicy::default(),
            Some(v) if v.eq_ignore_ascii_case("agent") => MissingRolePolicy::FallbackToAgent,
            Some(v) if v.eq_ignore_ascii_case("reject") => MissingRolePolicy::Reject,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    key: "PORTAL_MISSING_ROLE",
                    value: v.to_string(),
                });
            }
        };

        Ok(Self {
            jwt_secret,
            bind_addr,
            token_ttl: seconds("PORTAL_TOKEN_TTL_SECS", secs("PORTAL_TOKEN_TTL_SECS", 8 * 3600)?)?,
            csrf_ttl: seconds("PORTAL_CSRF_TTL_SECS", secs("PORTAL_CSRF_TTL_SECS", 3600)?)?,
            sweep_interval: StdDuration::from_secs(secs("PORTAL_SWEEP_INTERVAL_SECS", 60)?),
            login_limit: policy(
                "PORTAL_LOGIN_MAX_ATTEMPTS",
                "PORTAL_LOGIN_WINDOW_SECS",
                RateLimitPolicy::login(),
            )?,
            api_limit: policy(
                "PORTAL_API_MAX_REQUESTS",
                "PORTAL_API_WINDOW_SECS",
                RateLimitPolicy::api(),
            )?,
            sensitive_limit: policy(
                "PORTAL_SENSITIVE_MAX_REQUESTS",
                "PORTAL_SENSITIVE_WINDOW_SECS",
                RateLimitPolicy::sensitive(),
            )?,
            missing_role,
            seed_file: lookup("PORTAL_SEED_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            password_cost: DEFAULT_PASSWORD_COST,
        })
    }

    /// Deterministic config for tests; never reads the environment.
    pub fn for_tests(secret: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|key| match key {
            "JWT_SECRET" => Some(secret.to_string()),
            "PORTAL_BIND_ADDR" => Some("127.0.0.1:0".to_string()),
            _ => None,
        })?;
        config.password_cost = 4;
        Ok(config)
    }
}

fn parse_positive(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

fn seconds(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or(ConfigError::Invalid {
            key,
            value: secs.to_string(),
        })
}
