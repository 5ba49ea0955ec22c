use std::str::FromStr;

use anyhow::Context;
use argon2::Params;
use serde::Deserialize;

use crate::users::repo_types::UserStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Business policy knobs for the user service.
#[derive(Debug, Clone, Deserialize)]
pub struct UserPolicy {
    /// Status given to newly created users.
    pub default_status: UserStatus,
    /// Report "no active user with that email" as invalid credentials.
    pub unify_login_failures: bool,
}

impl Default for UserPolicy {
    fn default() -> Self {
        Self {
            default_status: UserStatus::Active,
            unify_login_failures: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub policy: UserPolicy,
    pub hash: HashConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let default_status = match std::env::var("USER_DEFAULT_STATUS") {
            Ok(v) => v
                .trim()
                .parse::<UserStatus>()
                .context("USER_DEFAULT_STATUS must be `active` or `inactive`")?,
            Err(_) => UserStatus::Active,
        };

        let hash_defaults = HashConfig::default();
        Ok(Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            db_acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", 5),
            policy: UserPolicy {
                default_status,
                unify_login_failures: env_or("AUTH_UNIFY_FAILURES", false),
            },
            hash: HashConfig {
                memory_kib: env_or("PASSWORD_HASH_MEMORY_KIB", hash_defaults.memory_kib),
                iterations: env_or("PASSWORD_HASH_ITERATIONS", hash_defaults.iterations),
                parallelism: env_or("PASSWORD_HASH_PARALLELISM", hash_defaults.parallelism),
            },
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}
