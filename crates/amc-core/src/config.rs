use std::env;
use std::time::Duration;

/// Process-wide configuration, read once at startup from the environment.
/// Mirrors the recognized key set; every field has a documented default so
/// a deployment can override only what it needs to.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_dsn: String,
    pub max_candidate_pool: usize,
    pub default_max_tokens: u32,
    pub recency_half_life_seconds: u64,
    pub consolidation_interval_seconds: u64,
    pub consolidation_batch_size: usize,
    pub retention_audit_days: u32,
    pub capsule_ttl_min_days: u32,
    pub capsule_ttl_max_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_dsn: "amc.sqlite3".to_string(),
            max_candidate_pool: 500,
            default_max_tokens: 65_000,
            recency_half_life_seconds: 3 * 24 * 3600,
            consolidation_interval_seconds: 300,
            consolidation_batch_size: 50,
            retention_audit_days: 90,
            capsule_ttl_min_days: 1,
            capsule_ttl_max_days: 365,
        }
    }
}

impl Config {
    /// Builds a `Config` from environment variables, falling back to
    /// `Default` for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_dsn: env::var("AMC_DB_DSN").unwrap_or(defaults.db_dsn),
            max_candidate_pool: env_usize("AMC_MAX_CANDIDATE_POOL", defaults.max_candidate_pool),
            default_max_tokens: env_u32("AMC_DEFAULT_MAX_TOKENS", defaults.default_max_tokens),
            recency_half_life_seconds: env_u64(
                "AMC_RECENCY_HALF_LIFE_SECONDS",
                defaults.recency_half_life_seconds,
            ),
            consolidation_interval_seconds: env_u64(
                "AMC_CONSOLIDATION_INTERVAL_SECONDS",
                defaults.consolidation_interval_seconds,
            ),
            consolidation_batch_size: env_usize(
                "AMC_CONSOLIDATION_BATCH_SIZE",
                defaults.consolidation_batch_size,
            ),
            retention_audit_days: env_u32("AMC_RETENTION_AUDIT_DAYS", defaults.retention_audit_days),
            capsule_ttl_min_days: env_u32("AMC_CAPSULE_TTL_MIN_DAYS", defaults.capsule_ttl_min_days),
            capsule_ttl_max_days: env_u32("AMC_CAPSULE_TTL_MAX_DAYS", defaults.capsule_ttl_max_days),
        }
    }

    pub fn consolidation_interval(&self) -> Duration {
        Duration::from_secs(self.consolidation_interval_seconds)
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.max_candidate_pool, 500);
        assert_eq!(config.default_max_tokens, 65_000);
        assert_eq!(config.capsule_ttl_min_days, 1);
        assert_eq!(config.capsule_ttl_max_days, 365);
    }
}
