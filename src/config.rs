//! Recognized configuration surface (spec §6). Mirrors the teacher's
//! `Config::from_env` — plain `env::var(..).unwrap_or_else(...)` reads, no
//! config-file layering, since the engine is embedded by a host process that
//! owns its own configuration story.

use std::env;
use std::time::Duration;

use crate::models::job::JobType;

#[derive(Debug, Clone)]
pub struct RetryDelays {
    pub health: Duration,
    pub test: Duration,
    pub warmup: Duration,
    pub rotation: Duration,
}

impl RetryDelays {
    pub fn for_job_type(&self, job_type: JobType) -> Duration {
        match job_type {
            JobType::Health => self.health,
            JobType::Test => self.test,
            JobType::Warmup => self.warmup,
            JobType::Rotation => self.rotation,
        }
    }
}

impl Default for RetryDelays {
    fn default() -> Self {
        Self {
            health: Duration::from_secs(0),
            test: Duration::from_secs(15 * 60),
            warmup: Duration::from_secs(60 * 60),
            rotation: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub max_retries: u32,
    pub retry_delays: RetryDelays,

    pub min_score: u8,
    pub min_tests: usize,
    pub recovery_days: i64,
    pub max_consec_low: u32,
    pub graduation_days: i64,

    pub rate_per_domain: u32,
    pub rate_global: u32,

    pub health_critical: u8,
    pub health_warning: u8,
    pub pool_health_critical: u8,
}

impl Config {
    /// Reads every recognized key from the process environment, falling
    /// back to the spec's documented default for anything unset or
    /// unparsable.
    pub fn from_env() -> Self {
        Self {
            max_retries: env_parse("MAX_RETRIES", 3),
            retry_delays: parse_retry_delays(),
            min_score: env_parse("MIN_SCORE", 75),
            min_tests: env_parse("MIN_TESTS", 3),
            recovery_days: env_parse("RECOVERY_DAYS", 21),
            max_consec_low: env_parse("MAX_CONSEC_LOW", 2),
            graduation_days: env_parse("GRADUATION_DAYS", 21),
            rate_per_domain: env_parse("RATE_PER_DOMAIN", 30),
            rate_global: env_parse("RATE_GLOBAL", 100),
            health_critical: env_parse("HEALTH_CRITICAL", 60),
            health_warning: env_parse("HEALTH_WARNING", 75),
            pool_health_critical: env_parse("POOL_HEALTH_CRITICAL", 70),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delays: RetryDelays::default(),
            min_score: 75,
            min_tests: 3,
            recovery_days: 21,
            max_consec_low: 2,
            graduation_days: 21,
            rate_per_domain: 30,
            rate_global: 100,
            health_critical: 60,
            health_warning: 75,
            pool_health_critical: 70,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// `RETRY_DELAYS_MS` is four comma-separated millisecond values, in job-type
/// order health,test,warmup,rotation (e.g. `0,900000,3600000,300000`). Falls
/// back to `RetryDelays::default()` if unset or malformed.
fn parse_retry_delays() -> RetryDelays {
    let Ok(raw) = env::var("RETRY_DELAYS_MS") else {
        return RetryDelays::default();
    };
    let parsed: Vec<u64> = raw
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect();
    match parsed.as_slice() {
        [health, test, warmup, rotation] => RetryDelays {
            health: Duration::from_millis(*health),
            test: Duration::from_millis(*test),
            warmup: Duration::from_millis(*warmup),
            rotation: Duration::from_millis(*rotation),
        },
        _ => RetryDelays::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_retry_delays_env_falls_back_to_default() {
        assert_eq!(
            parse_retry_delays().health,
            RetryDelays::default().health
        );
        assert_eq!(parse_retry_delays().test, RetryDelays::default().test);
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.min_score, 75);
        assert_eq!(cfg.min_tests, 3);
        assert_eq!(cfg.recovery_days, 21);
        assert_eq!(cfg.max_consec_low, 2);
        assert_eq!(cfg.graduation_days, 21);
        assert_eq!(cfg.rate_per_domain, 30);
        assert_eq!(cfg.rate_global, 100);
        assert_eq!(cfg.health_critical, 60);
        assert_eq!(cfg.health_warning, 75);
        assert_eq!(cfg.pool_health_critical, 70);
    }
}
