use std::path::PathBuf;
use std::str::FromStr;

/// Utilization buckets. A person is `overallocated` above `overallocated`,
/// `high` above `high`, `medium` above `medium`, otherwise `low`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtilizationThresholds {
    pub overallocated: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for UtilizationThresholds {
    fn default() -> Self {
        Self {
            overallocated: 100.0,
            high: 80.0,
            medium: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub thresholds: UtilizationThresholds,
    /// Role label given to engagements created without one.
    pub default_role_label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: UtilizationThresholds::default(),
            default_role_label: "Developer".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            thresholds: UtilizationThresholds {
                overallocated: env_or("LOADLINE_OVERALLOCATED_THRESHOLD", defaults.thresholds.overallocated),
                high: env_or("LOADLINE_HIGH_THRESHOLD", defaults.thresholds.high),
                medium: env_or("LOADLINE_MEDIUM_THRESHOLD", defaults.thresholds.medium),
            },
            default_role_label: std::env::var("LOADLINE_DEFAULT_ROLE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_role_label),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("LOADLINE_PORT", 5433),
            bind: std::env::var("LOADLINE_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
            data_dir: PathBuf::from(
                std::env::var("LOADLINE_DATA_DIR").unwrap_or_else(|_| "./data".into()),
            ),
            password: std::env::var("LOADLINE_PASSWORD").unwrap_or_else(|_| "loadline".into()),
            max_connections: env_or("LOADLINE_MAX_CONNECTIONS", 256),
            compact_threshold: env_or("LOADLINE_COMPACT_THRESHOLD", 1000),
            metrics_port: std::env::var("LOADLINE_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            tls_cert: std::env::var("LOADLINE_TLS_CERT").ok(),
            tls_key: std::env::var("LOADLINE_TLS_KEY").ok(),
            engine: EngineConfig::from_env(),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("ledger.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.thresholds.high, 80.0);
        assert_eq!(cfg.thresholds.medium, 50.0);
        assert_eq!(cfg.thresholds.overallocated, 100.0);
        assert_eq!(cfg.default_role_label, "Developer");
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        // SAFETY: test-local variable name, not read concurrently elsewhere.
        unsafe { std::env::set_var("LOADLINE_TEST_ENV_OR", "not-a-number") };
        assert_eq!(env_or("LOADLINE_TEST_ENV_OR", 7u16), 7);
        unsafe { std::env::set_var("LOADLINE_TEST_ENV_OR", "9") };
        assert_eq!(env_or("LOADLINE_TEST_ENV_OR", 7u16), 9);
        unsafe { std::env::remove_var("LOADLINE_TEST_ENV_OR") };
    }
}
