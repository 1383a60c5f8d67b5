use std::net::SocketAddr;

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    /// `None` runs the server on in-memory stores.
    pub database_url: Option<String>,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub simulation: bool,
    pub source_base_url: String,
    pub source_app_key: Option<String>,
    pub source_user_agent: String,
    pub fetch_timeout_secs: u64,
    pub publish_timeout_secs: u64,

    pub worker_count: usize,
    pub poll_interval_ms: u64,
    pub rate_limit_max_calls: usize,
    pub rate_limit_window_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_cap_ms: u64,

    pub markup_percent: Decimal,
    pub marketplace_id: String,

    pub affiliate_enabled: bool,
    pub affiliate_item_base_url: String,
    pub affiliate_deep_link_base: String,
    pub affiliate_tracking_id: Option<String>,
    pub affiliate_sub_id: Option<String>,
    pub affiliate_default_campaign: String,
    /// `0` keeps cached links forever.
    pub affiliate_cache_ttl_secs: u64,

    pub refresh_cron: String,
    pub refresh_max_age_hours: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("simulation", &self.simulation)
            .field("source_base_url", &self.source_base_url)
            .field(
                "source_app_key",
                &self.source_app_key.as_ref().map(|_| "[redacted]"),
            )
            .field("source_user_agent", &self.source_user_agent)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("publish_timeout_secs", &self.publish_timeout_secs)
            .field("worker_count", &self.worker_count)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("rate_limit_max_calls", &self.rate_limit_max_calls)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("retry_backoff_cap_ms", &self.retry_backoff_cap_ms)
            .field("markup_percent", &self.markup_percent)
            .field("marketplace_id", &self.marketplace_id)
            .field("affiliate_enabled", &self.affiliate_enabled)
            .field("affiliate_item_base_url", &self.affiliate_item_base_url)
            .field("affiliate_deep_link_base", &self.affiliate_deep_link_base)
            .field(
                "affiliate_tracking_id",
                &self.affiliate_tracking_id.as_ref().map(|_| "[redacted]"),
            )
            .field("affiliate_sub_id", &self.affiliate_sub_id)
            .field(
                "affiliate_default_campaign",
                &self.affiliate_default_campaign,
            )
            .field("affiliate_cache_ttl_secs", &self.affiliate_cache_ttl_secs)
            .field("refresh_cron", &self.refresh_cron)
            .field("refresh_max_age_hours", &self.refresh_max_age_hours)
            .finish()
    }
}
