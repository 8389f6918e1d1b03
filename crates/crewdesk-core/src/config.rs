use std::env::VarError;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Upper bound accepted for `CREWDESK_PAGE_SIZE`.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Load configuration from the process environment after reading `.env`.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Like [`load_app_config`] but without touching `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl Display) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

fn parsed<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| invalid(var, e))
}

/// Build configuration from an env lookup so tests can pass a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };
    let or_default =
        |var: &str, default: &str| -> String { lookup(var).unwrap_or_else(|_| default.to_string()) };

    let database_url = require("DATABASE_URL")?;
    let api_key_hash_salt = require("CREWDESK_API_KEY_HASH_SALT")?;
    if api_key_hash_salt.trim().is_empty() {
        return Err(invalid("CREWDESK_API_KEY_HASH_SALT", "must not be empty"));
    }

    let env = Environment::from_name(&or_default("CREWDESK_ENV", "development"));
    let bind_addr = parsed(
        "CREWDESK_BIND_ADDR",
        &or_default("CREWDESK_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("CREWDESK_LOG_LEVEL", "info");
    let seed_path = PathBuf::from(or_default("CREWDESK_SEED_PATH", "./config/seed.yaml"));

    let db_max_connections: u32 = parsed(
        "CREWDESK_DB_MAX_CONNECTIONS",
        &or_default("CREWDESK_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parsed(
        "CREWDESK_DB_MIN_CONNECTIONS",
        &or_default("CREWDESK_DB_MIN_CONNECTIONS", "1"),
    )?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "CREWDESK_DB_MIN_CONNECTIONS",
            format!("{db_min_connections} exceeds the maximum of {db_max_connections}"),
        ));
    }
    let db_acquire_timeout_secs = parsed(
        "CREWDESK_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("CREWDESK_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let page_size: u32 = parsed("CREWDESK_PAGE_SIZE", &or_default("CREWDESK_PAGE_SIZE", "10"))?;
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(invalid(
            "CREWDESK_PAGE_SIZE",
            format!("must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"),
        ));
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        seed_path,
        api_key_hash_salt,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        page_size,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
