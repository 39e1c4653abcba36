//! Process configuration read from the environment.
//!
//! A `.env` file in the working directory is loaded first (if present); real
//! environment variables win over it.

use std::net::SocketAddr;

use thiserror::Error;

pub const BIND_ADDR_VAR: &str = "STOCKROOM_BIND_ADDR";
pub const JWT_SECRET_VAR: &str = "JWT_SECRET";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS_VAR: &str = "STOCKROOM_DB_MAX_CONNECTIONS";
pub const CAS_RETRIES_VAR: &str = "STOCKROOM_CAS_RETRIES";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEV_JWT_SECRET: &str = "dev-insecure-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// How often a compare-and-set stock write is attempted before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Where records live.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

// Keeps credentials in the URL out of logs.
impl core::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreBackend::InMemory => f.write_str("InMemory"),
            StoreBackend::Postgres {
                max_connections, ..
            } => f
                .debug_struct("Postgres")
                .field("max_connections", max_connections)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone)]
pub struct StockroomConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// `true` when `JWT_SECRET` was missing and the dev default is in use.
    pub using_dev_secret: bool,
    pub store: StoreBackend,
    pub retry: RetryPolicy,
}

impl core::fmt::Debug for StockroomConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockroomConfig")
            .field("bind_addr", &self.bind_addr)
            .field("using_dev_secret", &self.using_dev_secret)
            .field("store", &self.store)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl StockroomConfig {
    /// Load `.env` (if any), then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (blank values count as unset).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get(BIND_ADDR_VAR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: BIND_ADDR_VAR,
                reason: e.to_string(),
            })?;

        let (jwt_secret, using_dev_secret) = match get(JWT_SECRET_VAR) {
            Some(secret) => (secret, false),
            None => {
                tracing::warn!("{JWT_SECRET_VAR} not set; using insecure dev default");
                (DEV_JWT_SECRET.to_string(), true)
            }
        };

        let store = match get(DATABASE_URL_VAR) {
            None => StoreBackend::InMemory,
            Some(database_url) => StoreBackend::Postgres {
                database_url,
                max_connections: parse_u32(&get, DB_MAX_CONNECTIONS_VAR)?
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            },
        };

        let retry = match parse_u32(&get, CAS_RETRIES_VAR)? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    var: CAS_RETRIES_VAR,
                    reason: "must be at least 1".to_string(),
                });
            }
            Some(n) => RetryPolicy::new(n),
            None => RetryPolicy::default(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            using_dev_secret,
            store,
            retry,
        })
    }
}

fn parse_u32<G>(get: &G, var: &'static str) -> Result<Option<u32>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|raw| {
            raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<StockroomConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StockroomConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_to_in_memory_dev_setup() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(cfg.using_dev_secret);
        assert_eq!(cfg.store, StoreBackend::InMemory);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.retry.max_attempts, 5);
    }

    #[test]
    fn database_url_selects_postgres() {
        let cfg = config(&[
            (DATABASE_URL_VAR, "postgres://u:p@localhost/stock"),
            (DB_MAX_CONNECTIONS_VAR, "3"),
            (JWT_SECRET_VAR, "s3cret"),
        ])
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreBackend::Postgres {
                database_url: "postgres://u:p@localhost/stock".into(),
                max_connections: 3,
            }
        );
        assert!(!cfg.using_dev_secret);
        assert!(!format!("{cfg:?}").contains("u:p@"));
    }

    #[test]
    fn retry_budget_is_configurable() {
        let cfg = config(&[(CAS_RETRIES_VAR, "12")]).unwrap();
        assert_eq!(cfg.retry.max_attempts, 12);

        let err = config(&[(CAS_RETRIES_VAR, "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: CAS_RETRIES_VAR, .. }));
        assert!(config(&[(CAS_RETRIES_VAR, "many")]).is_err());
    }

    #[test]
    fn invalid_bind_addr_is_reported() {
        let err = config(&[(BIND_ADDR_VAR, "not-an-addr")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: BIND_ADDR_VAR, .. }));
    }

    #[test]
    fn retry_policy_counts_first_attempt() {
        let policy = RetryPolicy::new(2);
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }
}
