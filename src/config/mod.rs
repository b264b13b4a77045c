use std::env;
use std::path::PathBuf;

use crate::stealth::StealthConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Bridge / fleet
    pub bridge_root: PathBuf,
    pub template_dir: PathBuf,
    pub heartbeat_ttl_secs: u64,
    pub provision_timeout_secs: u64,
    pub ready_poll_ms: u64,

    // Watchdog
    pub watchdog_interval_secs: u64,
    pub watchdog_fail_threshold: u32,

    // Dispatch / monitoring
    pub dispatch_enabled: bool,
    pub dispatch_retry_max: u32,
    pub dispatch_retry_base_ms: u64,
    pub result_timeout_secs: u64,
    pub result_poll_ms: u64,
    pub signal_grace_secs: i64,

    // External collaborators (optional — absent in offline/test setups)
    pub signal_ws_url: Option<String>,
    pub user_registry_url: Option<String>,
    pub user_registry_token: Option<String>,
    pub overlay_refresh_secs: u64,

    pub stealth: StealthConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://fleetbot.db".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("PORT", 8080),

            bridge_root: env::var("BRIDGE_ROOT")
                .unwrap_or_else(|_| "./bridge".into())
                .into(),
            template_dir: env::var("TEMPLATE_DIR")
                .unwrap_or_else(|_| "./terminal-template".into())
                .into(),
            heartbeat_ttl_secs: env_parse("HEARTBEAT_TTL_SECS", 90),
            provision_timeout_secs: env_parse("PROVISION_TIMEOUT_SECS", 10),
            ready_poll_ms: env_parse("READY_POLL_MS", 250),

            watchdog_interval_secs: env_parse("WATCHDOG_INTERVAL_SECS", 60),
            watchdog_fail_threshold: env_parse("WATCHDOG_FAIL_THRESHOLD", 3),

            dispatch_enabled: env_parse("DISPATCH_ENABLED", false),
            dispatch_retry_max: env_parse("DISPATCH_RETRY_MAX", 3),
            dispatch_retry_base_ms: env_parse("DISPATCH_RETRY_BASE_MS", 250),
            result_timeout_secs: env_parse("RESULT_TIMEOUT_SECS", 120),
            result_poll_ms: env_parse("RESULT_POLL_MS", 1_000),
            signal_grace_secs: env_parse("SIGNAL_GRACE_SECS", 300),

            signal_ws_url: env::var("SIGNAL_WS_URL").ok(),
            user_registry_url: env::var("USER_REGISTRY_URL").ok(),
            user_registry_token: env::var("USER_REGISTRY_TOKEN").ok(),
            overlay_refresh_secs: env_parse("OVERLAY_REFRESH_SECS", 300),

            stealth: StealthConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;

    #[test]
    fn test_defaults_are_sane() {
        let config = AppConfig::from_env().expect("config should build from empty env");
        assert_eq!(config.provision_timeout_secs, 10);
        assert_eq!(config.result_timeout_secs, 120);
        assert_eq!(config.watchdog_fail_threshold, 3);
        assert!(!config.stealth.tiers.is_empty());
        // Commander variance backs the documented sizing scenario.
        let commander = config.stealth.bounds_for(Tier::Commander);
        assert_eq!(commander.lot_variance_pct, rust_decimal::Decimal::from(8));
    }
}
