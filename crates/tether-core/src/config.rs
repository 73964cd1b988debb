//! Runtime configuration
//!
//! Defaults suit interactive use. Every field can be overridden from the
//! environment with [`RuntimeConfig::from_env`], or loaded from JSON.
//!
//! # Environment Variables
//!
//! - `TETHER_FAST_PATH_THRESHOLD` - element count at which values use the fast path
//! - `TETHER_POOL_MAX_BYTES` - byte budget of idle pooled buffers
//! - `TETHER_POOL_MAX_IDLE_MS` - idle age after which pooled buffers are evicted
//! - `TETHER_LEAK_DETECTION` - `true`/`1` to check for live handles at session teardown

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tether_engine::ReprPolicy;

/// Buffer pool limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle buffers beyond this many bytes are dropped instead of pooled
    pub max_pooled_bytes: usize,
    /// Idle buffers older than this are evicted
    pub max_idle_age: Duration,
    /// Minimum time between opportunistic eviction sweeps
    pub eviction_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pooled_bytes: 64 * 1024 * 1024,
            max_idle_age: Duration::from_secs(30),
            eviction_interval: Duration::from_secs(5),
        }
    }
}

/// Configuration of a [`crate::Runtime`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Values with at least this many elements use the fast path
    pub fast_path_threshold: usize,
    pub pool: PoolConfig,
    /// Verify at session teardown that no tracked handle is still live
    pub leak_detection: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fast_path_threshold: ReprPolicy::DEFAULT_THRESHOLD,
            pool: PoolConfig::default(),
            leak_detection: cfg!(debug_assertions),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `TETHER_*` environment variables
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(threshold) = parse_var::<usize>("TETHER_FAST_PATH_THRESHOLD") {
            config.fast_path_threshold = threshold;
        }
        if let Some(bytes) = parse_var::<usize>("TETHER_POOL_MAX_BYTES") {
            config.pool.max_pooled_bytes = bytes;
        }
        if let Some(ms) = parse_var::<u64>("TETHER_POOL_MAX_IDLE_MS") {
            config.pool.max_idle_age = Duration::from_millis(ms);
        }
        if let Ok(flag) = env::var("TETHER_LEAK_DETECTION") {
            config.leak_detection = flag.eq_ignore_ascii_case("true") || flag == "1";
        }

        config
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|err| crate::Error::InvalidArgument(format!("runtime config: {err}")))
    }

    /// Representation policy derived from the threshold
    pub fn repr_policy(&self) -> ReprPolicy {
        ReprPolicy::new(self.fast_path_threshold)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "TETHER_FAST_PATH_THRESHOLD",
        "TETHER_POOL_MAX_BYTES",
        "TETHER_POOL_MAX_IDLE_MS",
        "TETHER_LEAK_DETECTION",
    ];

    fn reset_env() {
        for key in VARS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.fast_path_threshold, 8);
        assert_eq!(config.repr_policy(), ReprPolicy::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        reset_env();
        env::set_var("TETHER_FAST_PATH_THRESHOLD", "32");
        env::set_var("TETHER_POOL_MAX_BYTES", "4096");
        env::set_var("TETHER_POOL_MAX_IDLE_MS", "250");
        env::set_var("TETHER_LEAK_DETECTION", "1");

        let config = RuntimeConfig::from_env();
        assert_eq!(config.fast_path_threshold, 32);
        assert_eq!(config.pool.max_pooled_bytes, 4096);
        assert_eq!(config.pool.max_idle_age, Duration::from_millis(250));
        assert!(config.leak_detection);

        reset_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        reset_env();
        env::set_var("TETHER_FAST_PATH_THRESHOLD", "lots");
        assert_eq!(RuntimeConfig::from_env().fast_path_threshold, 8);
        reset_env();
    }

    #[test]
    fn test_partial_json() {
        let config = RuntimeConfig::from_json(r#"{"fast_path_threshold": 2, "leak_detection": false}"#).unwrap();
        assert_eq!(config.fast_path_threshold, 2);
        assert!(!config.leak_detection);
        assert_eq!(config.pool, PoolConfig::default());

        assert!(RuntimeConfig::from_json("{").is_err());
    }
}
