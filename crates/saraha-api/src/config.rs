use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{0} is still a placeholder value")]
    Placeholder(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} and {1} must be different secrets")]
    SharedSecret(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Signing secrets, one per token class.
#[derive(Clone)]
pub struct TokenSecrets {
    pub user_access: String,
    pub admin_access: String,
    pub refresh: String,
}

impl fmt::Debug for TokenSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSecrets { .. }")
    }
}

/// Process configuration. Built once at startup and shared read-only.
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub environment: Environment,
    pub secrets: TokenSecrets,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Lifetime of the access token embedded in verification links.
    pub verify_ttl: Duration,
    pub encryption_key: [u8; 32],
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub google_client_id: Option<String>,
    pub email_from: String,
    pub email_relay_url: Option<String>,
    pub email_relay_key: Option<String>,
    /// Base URL used for links placed in outgoing emails.
    pub public_url: String,
    pub storage_dir: PathBuf,
    pub revocation_grace: Duration,
    pub cleanup_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secrets = TokenSecrets {
            user_access: secret(&get, "SARAHA_ACCESS_TOKEN_SECRET")?,
            admin_access: secret(&get, "SARAHA_ADMIN_TOKEN_SECRET")?,
            refresh: secret(&get, "SARAHA_REFRESH_TOKEN_SECRET")?,
        };
        ensure_distinct(&secrets)?;

        let encryption_key = get("SARAHA_ENCRYPTION_KEY")
            .ok_or(ConfigError::Missing("SARAHA_ENCRYPTION_KEY"))
            .and_then(|raw| {
                saraha_crypto::keys::key_from_base64(&raw).map_err(|e| ConfigError::Invalid {
                    key: "SARAHA_ENCRYPTION_KEY",
                    reason: e.to_string(),
                })
            })?;

        let port = parsed(&get, "SARAHA_PORT", 3000u16)?;

        Ok(Self {
            host: get("SARAHA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("SARAHA_DB_PATH").unwrap_or_else(|| "saraha.db".into()).into(),
            environment: parsed(&get, "SARAHA_ENV", Environment::Development)?,
            secrets,
            access_ttl: positive_seconds(&get, "SARAHA_ACCESS_TOKEN_TTL_SECS", 3600)?,
            refresh_ttl: positive_seconds(&get, "SARAHA_REFRESH_TOKEN_TTL_SECS", 7 * 24 * 3600)?,
            verify_ttl: positive_seconds(&get, "SARAHA_VERIFY_TOKEN_TTL_SECS", 30 * 60)?,
            encryption_key,
            hash_memory_kib: parsed(&get, "SARAHA_HASH_MEMORY_KIB", 19_456)?,
            hash_iterations: parsed(&get, "SARAHA_HASH_ITERATIONS", 2)?,
            google_client_id: get("SARAHA_GOOGLE_CLIENT_ID"),
            email_from: get("SARAHA_EMAIL_FROM")
                .unwrap_or_else(|| "\"Saraha App\" <no-reply@saraha.local>".into()),
            email_relay_url: get("SARAHA_EMAIL_RELAY_URL"),
            email_relay_key: get("SARAHA_EMAIL_RELAY_KEY"),
            public_url: get("SARAHA_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_string(),
            storage_dir: get("SARAHA_STORAGE_DIR").unwrap_or_else(|| "./storage".into()).into(),
            revocation_grace: seconds(&get, "SARAHA_REVOCATION_GRACE_SECS", 300)?,
            cleanup_interval: positive_seconds(&get, "SARAHA_CLEANUP_INTERVAL_SECS", 3600)?,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn secret<G>(get: &G, key: &'static str) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = get(key).ok_or(ConfigError::Missing(key))?;
    if PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        return Err(ConfigError::Placeholder(key));
    }
    Ok(value)
}

fn ensure_distinct(secrets: &TokenSecrets) -> Result<(), ConfigError> {
    if secrets.user_access == secrets.admin_access {
        return Err(ConfigError::SharedSecret(
            "SARAHA_ACCESS_TOKEN_SECRET",
            "SARAHA_ADMIN_TOKEN_SECRET",
        ));
    }
    if secrets.user_access == secrets.refresh {
        return Err(ConfigError::SharedSecret(
            "SARAHA_ACCESS_TOKEN_SECRET",
            "SARAHA_REFRESH_TOKEN_SECRET",
        ));
    }
    if secrets.admin_access == secrets.refresh {
        return Err(ConfigError::SharedSecret(
            "SARAHA_ADMIN_TOKEN_SECRET",
            "SARAHA_REFRESH_TOKEN_SECRET",
        ));
    }
    Ok(())
}

fn parsed<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn seconds<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parsed(get, key, default).map(Duration::from_secs)
}

/// Like `seconds`, for lifetimes and intervals where zero is meaningless.
fn positive_seconds<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = seconds(get, key, default)?;
    if value.is_zero() {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
