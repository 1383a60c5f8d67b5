use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from the variables already in the process,
/// without reading `.env`.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Parsing and validation over an arbitrary variable lookup, so tests can
/// drive it with a map.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    use rust_decimal::Decimal;

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default =
        |var: &str, default: &str| -> String { optional(var).unwrap_or_else(|| default.to_string()) };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match optional(var) {
            None => Ok(default),
            Some(raw) => parse_flag(&raw).ok_or_else(|| invalid(var, format!("not a boolean: {raw}"))),
        }
    };

    let at_least_one = |var: &str, value: u64| -> Result<(), ConfigError> {
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(())
    };

    let database_url = optional("DATABASE_URL");

    let env_raw = or_default("DROPSHIP_ENV", "development");
    let env = parse_environment(&env_raw)
        .ok_or_else(|| invalid("DROPSHIP_ENV", format!("unknown environment: {env_raw}")))?;

    let bind_addr = parse_addr("DROPSHIP_BIND_ADDR", "0.0.0.0:8000")?;
    let log_level = or_default("DROPSHIP_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("DROPSHIP_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("DROPSHIP_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("DROPSHIP_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let simulation = parse_bool("DROPSHIP_SIMULATION", true)?;
    let source_base_url = or_default("DROPSHIP_SOURCE_BASE_URL", "https://api.aliexpress.com");
    let source_app_key = optional("DROPSHIP_SOURCE_APP_KEY");
    let source_user_agent = or_default(
        "DROPSHIP_SOURCE_USER_AGENT",
        "dropship/0.1 (import-pipeline)",
    );
    let fetch_timeout_secs = parse_u64("DROPSHIP_FETCH_TIMEOUT_SECS", "15")?;
    let publish_timeout_secs = parse_u64("DROPSHIP_PUBLISH_TIMEOUT_SECS", "15")?;

    let worker_count = parse_usize("DROPSHIP_WORKER_COUNT", "4")?;
    at_least_one("DROPSHIP_WORKER_COUNT", worker_count as u64)?;
    let poll_interval_ms = parse_u64("DROPSHIP_POLL_INTERVAL_MS", "500")?;
    let rate_limit_max_calls = parse_usize("DROPSHIP_RATE_LIMIT_MAX_CALLS", "5")?;
    at_least_one("DROPSHIP_RATE_LIMIT_MAX_CALLS", rate_limit_max_calls as u64)?;
    let rate_limit_window_secs = parse_u64("DROPSHIP_RATE_LIMIT_WINDOW_SECS", "1")?;
    let retry_max_attempts = parse_u32("DROPSHIP_RETRY_MAX_ATTEMPTS", "3")?;
    at_least_one("DROPSHIP_RETRY_MAX_ATTEMPTS", u64::from(retry_max_attempts))?;
    let retry_backoff_base_ms = parse_u64("DROPSHIP_RETRY_BACKOFF_BASE_MS", "2000")?;
    let retry_backoff_cap_ms = parse_u64("DROPSHIP_RETRY_BACKOFF_CAP_MS", "60000")?;

    let markup_raw = or_default("DROPSHIP_MARKUP_PERCENT", "30.0");
    let markup_percent = markup_raw
        .parse::<Decimal>()
        .map_err(|e| invalid("DROPSHIP_MARKUP_PERCENT", e.to_string()))?;
    if markup_percent.is_sign_negative() {
        return Err(invalid(
            "DROPSHIP_MARKUP_PERCENT",
            "must not be negative".to_string(),
        ));
    }
    let marketplace_id = or_default("DROPSHIP_MARKETPLACE_ID", "EBAY-AU");

    let affiliate_enabled = parse_bool("DROPSHIP_AFFILIATE_ENABLED", true)?;
    let affiliate_item_base_url = or_default(
        "DROPSHIP_AFFILIATE_ITEM_BASE_URL",
        "https://www.aliexpress.com/item",
    );
    let affiliate_deep_link_base = or_default(
        "DROPSHIP_AFFILIATE_DEEP_LINK_BASE",
        "https://s.click.aliexpress.com/deep_link",
    );
    let affiliate_tracking_id = optional("DROPSHIP_AFFILIATE_TRACKING_ID");
    let affiliate_sub_id = optional("DROPSHIP_AFFILIATE_SUB_ID");
    let affiliate_default_campaign = or_default("DROPSHIP_AFFILIATE_DEFAULT_CAMPAIGN", "default");
    crate::affiliate::CampaignTag::parse(&affiliate_default_campaign)
        .map_err(|e| invalid("DROPSHIP_AFFILIATE_DEFAULT_CAMPAIGN", e.to_string()))?;
    let affiliate_cache_ttl_secs = parse_u64("DROPSHIP_AFFILIATE_CACHE_TTL_SECS", "0")?;

    let refresh_cron = or_default("DROPSHIP_REFRESH_CRON", "0 0 */6 * * *");
    let refresh_max_age_hours = parse_u64("DROPSHIP_REFRESH_MAX_AGE_HOURS", "6")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        simulation,
        source_base_url,
        source_app_key,
        source_user_agent,
        fetch_timeout_secs,
        publish_timeout_secs,
        worker_count,
        poll_interval_ms,
        rate_limit_max_calls,
        rate_limit_window_secs,
        retry_max_attempts,
        retry_backoff_base_ms,
        retry_backoff_cap_ms,
        markup_percent,
        marketplace_id,
        affiliate_enabled,
        affiliate_item_base_url,
        affiliate_deep_link_base,
        affiliate_tracking_id,
        affiliate_sub_id,
        affiliate_default_campaign,
        affiliate_cache_ttl_secs,
        refresh_cron,
        refresh_max_age_hours,
    })
}

/// Parse a string into an `Environment` variant. Unknown values are rejected.
fn parse_environment(s: &str) -> Option<Environment> {
    match s.to_ascii_lowercase().as_str() {
        "development" | "dev" => Some(Environment::Development),
        "test" => Some(Environment::Test),
        "production" | "prod" => Some(Environment::Production),
        _ => None,
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
