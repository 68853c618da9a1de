//! Configuration surface: environment-driven `Settings` plus the local
//! routes YAML loader.
//!
//! Grounded on `kairos-rs::config::settings::load_settings`'s validated,
//! fail-closed loading discipline, adapted from a single JSON file to the
//! environment-variable surface `spec.md` §6 specifies.

pub mod local_routes;

use crate::balancer::Strategy;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("{var} must be set when {dependent} is enabled")]
    MissingDependency {
        var: &'static str,
        dependent: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    pub registry_enabled: bool,
    pub registry_url: Option<String>,
    pub registry_poll_interval: Duration,

    pub proxy_timeout: Duration,
    pub proxy_max_retries: u32,
    pub load_balance_strategy: Strategy,

    pub rate_limit_enabled: bool,
    pub rate_limit_global_qps: f64,
    pub rate_limit_per_route_qps: f64,
    pub rate_limit_per_ip_qps: f64,
    pub rate_limit_ip_map_capacity: usize,

    pub circuit_breaker_enabled: bool,
    pub circuit_breaker_failure_threshold: u64,
    pub circuit_breaker_timeout: Duration,

    pub local_routes_file: String,
    pub local_routes_priority_boost: i32,
    pub fallback_to_local: bool,

    pub auth_plugin_enabled: bool,
    pub auth_degrade_allow: bool,
}

fn env_string(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var,
            value,
            reason: "could not parse value",
        }),
    }
}

fn env_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var,
                value,
                reason: "expected a boolean",
            }),
        },
    }
}

impl Settings {
    /// Loads settings from the environment (prefix `HERMES_`), applying the
    /// defaults `spec.md` §6 implies, then validates the result. A fatal
    /// configuration error here should abort startup (`spec.md` §6 exit
    /// codes: non-zero on fatal configuration error).
    pub fn from_env() -> Result<Self, ConfigError> {
        let strategy_raw = env_string("HERMES_LOAD_BALANCE_STRATEGY", "round_robin");
        let load_balance_strategy = match strategy_raw.as_str() {
            "round_robin" => Strategy::RoundRobin,
            "random" => Strategy::Random,
            "least_conn" => Strategy::LeastConn,
            _ => {
                return Err(ConfigError::InvalidValue {
                    var: "HERMES_LOAD_BALANCE_STRATEGY",
                    value: strategy_raw,
                    reason: "expected round_robin, random, or least_conn",
                })
            }
        };

        let settings = Settings {
            host: env_string("HERMES_HOST", "0.0.0.0"),
            port: env_parsed("HERMES_PORT", 8080u16)?,

            registry_enabled: env_bool("HERMES_REGISTRY_ENABLED", false)?,
            registry_url: std::env::var("HERMES_REGISTRY_URL").ok(),
            registry_poll_interval: Duration::from_secs(env_parsed("HERMES_REGISTRY_POLL_INTERVAL", 30u64)?),

            proxy_timeout: Duration::from_secs(env_parsed("HERMES_PROXY_TIMEOUT", 30u64)?),
            proxy_max_retries: env_parsed("HERMES_PROXY_MAX_RETRIES", 2u32)?,
            load_balance_strategy,

            rate_limit_enabled: env_bool("HERMES_RATE_LIMIT_ENABLED", true)?,
            rate_limit_global_qps: env_parsed("HERMES_RATE_LIMIT_GLOBAL_QPS", 1000.0)?,
            rate_limit_per_route_qps: env_parsed("HERMES_RATE_LIMIT_PER_ROUTE_QPS", 100.0)?,
            rate_limit_per_ip_qps: env_parsed("HERMES_RATE_LIMIT_PER_IP_QPS", 20.0)?,
            rate_limit_ip_map_capacity: env_parsed("HERMES_RATE_LIMIT_IP_MAP_CAPACITY", 10_000usize)?,

            circuit_breaker_enabled: env_bool("HERMES_CIRCUIT_BREAKER_ENABLED", true)?,
            circuit_breaker_failure_threshold: env_parsed("HERMES_CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5u64)?,
            circuit_breaker_timeout: Duration::from_secs(env_parsed("HERMES_CIRCUIT_BREAKER_TIMEOUT", 30u64)?),

            local_routes_file: env_string("HERMES_LOCAL_ROUTES_FILE", "./routes.yaml"),
            local_routes_priority_boost: env_parsed("HERMES_LOCAL_ROUTES_PRIORITY_BOOST", 1000i32)?,
            fallback_to_local: env_bool("HERMES_FALLBACK_TO_LOCAL", true)?,

            auth_plugin_enabled: env_bool("HERMES_AUTH_PLUGIN_ENABLED", false)?,
            auth_degrade_allow: env_bool("HERMES_AUTH_DEGRADE_ALLOW", false)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "HERMES_PORT",
                value: "0".to_string(),
                reason: "port must be nonzero",
            });
        }
        if self.registry_enabled && self.registry_url.is_none() {
            return Err(ConfigError::MissingDependency {
                var: "HERMES_REGISTRY_URL",
                dependent: "HERMES_REGISTRY_ENABLED",
            });
        }
        if self.rate_limit_enabled
            && (self.rate_limit_global_qps <= 0.0
                || self.rate_limit_per_route_qps <= 0.0
                || self.rate_limit_per_ip_qps <= 0.0)
        {
            return Err(ConfigError::InvalidValue {
                var: "HERMES_RATE_LIMIT_GLOBAL_QPS",
                value: self.rate_limit_global_qps.to_string(),
                reason: "qps values must be positive when rate limiting is enabled",
            });
        }
        if self.circuit_breaker_enabled && self.circuit_breaker_failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                var: "HERMES_CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                value: "0".to_string(),
                reason: "failure threshold must be at least 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "HERMES_PORT",
            "HERMES_REGISTRY_ENABLED",
            "HERMES_REGISTRY_URL",
            "HERMES_LOAD_BALANCE_STRATEGY",
            "HERMES_RATE_LIMIT_GLOBAL_QPS",
            "HERMES_CIRCUIT_BREAKER_FAILURE_THRESHOLD",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn defaults_are_valid() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.load_balance_strategy, Strategy::RoundRobin);
    }

    #[test]
    fn registry_enabled_without_url_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("HERMES_REGISTRY_ENABLED", "true");
        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingDependency { .. }));
        clear_env();
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("HERMES_LOAD_BALANCE_STRATEGY", "sticky");
        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "HERMES_LOAD_BALANCE_STRATEGY", .. }));
        clear_env();
    }
}
