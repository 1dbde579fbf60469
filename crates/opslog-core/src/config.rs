//! Process configuration, loaded once at boot.

use std::env;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(default)
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub enable_rate_limit: bool,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,

    pub enable_req_size_cap: bool,
    pub req_size_bytes: u64,

    pub enable_store_breaker: bool,
    pub breaker_threshold: u32,

    pub enable_canary: bool,
    pub canary_percent: u8,

    pub disable_new_mw: bool,

    pub enable_security_headers: bool,
    pub enable_hsts: bool,
    pub cors_allow_origins: Vec<String>,

    pub kv_ttl_seconds: u64,
    pub gpt_compat_mode: bool,

    pub bind_addr: String,
    pub database_url: String,
    pub kv_path: String,
    pub obj_root: String,

    pub reconcile_interval_hours: u64,
}

impl Config {
    /// Loads from environment. Panics on missing required bindings — the
    /// same `expect("... must be set")` idiom used to bootstrap the
    /// Postgres pool and JWT secret elsewhere in this codebase family.
    pub fn from_env() -> Self {
        Self {
            enable_rate_limit: env_bool("ENABLE_RATE_LIMIT", false),
            rate_limit_rps: env_num("RATE_LIMIT_RPS", 10.0),
            rate_limit_burst: env_num("RATE_LIMIT_BURST", 20),

            enable_req_size_cap: env_bool("ENABLE_REQ_SIZE_CAP", false),
            req_size_bytes: env_num("REQ_SIZE_BYTES", 2_000_000),

            enable_store_breaker: env_bool("ENABLE_STORE_BREAKER", true),
            breaker_threshold: env_num("BREAKER_THRESHOLD", 5),

            enable_canary: env_bool("ENABLE_CANARY", false),
            canary_percent: env_num("CANARY_PERCENT", 5),

            disable_new_mw: env_bool("DISABLE_NEW_MW", false),

            enable_security_headers: env_bool("ENABLE_SECURITY_HEADERS", true),
            enable_hsts: env_bool("ENABLE_HSTS", false),
            cors_allow_origins: env::var("CORS_ALLOW_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),

            kv_ttl_seconds: env_num("KV_TTL_SECONDS", 0),
            gpt_compat_mode: env_bool("GPT_COMPAT_MODE", true),

            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            kv_path: env::var("KV_PATH").expect("KV_PATH must be set"),
            obj_root: env::var("OBJ_ROOT").expect("OBJ_ROOT must be set"),

            reconcile_interval_hours: env_num("RECONCILE_INTERVAL_HOURS", 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_defaults_when_unset() {
        assert!(!env_bool("OPSLOG_TEST_UNSET_BOOL_XYZ", false));
        assert!(env_bool("OPSLOG_TEST_UNSET_BOOL_XYZ", true));
    }

    #[test]
    fn env_num_parses_and_falls_back() {
        assert_eq!(env_num::<u32>("OPSLOG_TEST_UNSET_NUM_XYZ", 7), 7);
    }
}
