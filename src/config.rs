use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::error::AuditError;
use crate::types::{Config, Severity};

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let resource_types = env.get_var("RESOURCE_TYPES").unwrap_or_default();
    let resource_types: Vec<String> = resource_types
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if resource_types.is_empty() {
        return Err(AuditError::Configuration(
            "RESOURCE_TYPES env var must be set (comma-separated)".to_string(),
        )
        .into());
    }

    let lookback_hours: i64 = env
        .get_var("LOOKBACK_HOURS")
        .unwrap_or_else(|| "168".to_string())
        .parse()
        .context("Invalid LOOKBACK_HOURS")?;

    let metric_period_seconds: i64 = env
        .get_var("METRIC_PERIOD_SECONDS")
        .unwrap_or_else(|| "3600".to_string())
        .parse()
        .context("Invalid METRIC_PERIOD_SECONDS")?;

    let cpu_high_threshold: f64 = env
        .get_var("CPU_HIGH_THRESHOLD")
        .unwrap_or_else(|| "80".to_string())
        .parse()
        .context("Invalid CPU_HIGH_THRESHOLD")?;

    let cpu_idle_threshold: f64 = env
        .get_var("CPU_IDLE_THRESHOLD")
        .unwrap_or_else(|| "2.0".to_string())
        .parse()
        .context("Invalid CPU_IDLE_THRESHOLD")?;

    let max_connections: f64 = env
        .get_var("MAX_CONNECTIONS")
        .unwrap_or_else(|| "3.0".to_string())
        .parse()
        .context("Invalid MAX_CONNECTIONS")?;

    let max_iops_sum: f64 = env
        .get_var("MAX_IOPS_SUM")
        .unwrap_or_else(|| "100".to_string())
        .parse()
        .context("Invalid MAX_IOPS_SUM")?;

    let min_retention_days: f64 = env
        .get_var("MIN_RETENTION_DAYS")
        .unwrap_or_else(|| "7".to_string())
        .parse()
        .context("Invalid MIN_RETENTION_DAYS")?;

    let min_alert_severity: Severity = env
        .get_var("MIN_ALERT_SEVERITY")
        .unwrap_or_else(|| "warning".to_string())
        .parse()
        .map_err(AuditError::Configuration)?;

    let report_path = env.get_var("REPORT_PATH").map(PathBuf::from);
    let webhook_url = env.get_var("WEBHOOK_URL");
    let inventory_path = env.get_var("INVENTORY_PATH").map(PathBuf::from);

    let api_timeout_seconds: u64 = env
        .get_var("API_TIMEOUT_SECONDS")
        .unwrap_or_else(|| "30".to_string())
        .parse()
        .unwrap_or(30);

    let retry_attempts: u32 = env
        .get_var("RETRY_ATTEMPTS")
        .unwrap_or_else(|| "3".to_string())
        .parse()
        .unwrap_or(3);

    let max_concurrent_fetches: usize = env
        .get_var("MAX_CONCURRENT_FETCHES")
        .unwrap_or_else(|| "8".to_string())
        .parse()
        .unwrap_or(8);

    Ok(Config {
        resource_types,
        lookback_hours,
        metric_period_seconds,
        cpu_high_threshold,
        cpu_idle_threshold,
        max_connections,
        max_iops_sum,
        min_retention_days,
        min_alert_severity,
        report_path,
        webhook_url,
        inventory_path,
        api_timeout_seconds,
        retry_attempts,
        max_concurrent_fetches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_loading_with_env() {
        let env = MockEnvironment::new()
            .with_var("RESOURCE_TYPES", "rds-instance,sqs-queue,s3-bucket")
            .with_var("LOOKBACK_HOURS", "24")
            .with_var("METRIC_PERIOD_SECONDS", "300")
            .with_var("CPU_HIGH_THRESHOLD", "90")
            .with_var("MIN_ALERT_SEVERITY", "critical")
            .with_var("REPORT_PATH", "/tmp/audit.txt")
            .with_var("WEBHOOK_URL", "https://hooks.example.com/test")
            .with_var("API_TIMEOUT_SECONDS", "10")
            .with_var("RETRY_ATTEMPTS", "2");

        let config = load_config_with_env(&env).unwrap();

        assert_eq!(
            config.resource_types,
            vec!["rds-instance", "sqs-queue", "s3-bucket"]
        );
        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.metric_period_seconds, 300);
        assert_eq!(config.cpu_high_threshold, 90.0);
        assert_eq!(config.min_alert_severity, Severity::Critical);
        assert_eq!(config.report_path, Some(PathBuf::from("/tmp/audit.txt")));
        assert_eq!(
            config.webhook_url,
            Some("https://hooks.example.com/test".to_string())
        );
        assert_eq!(config.api_timeout_seconds, 10);
        assert_eq!(config.retry_attempts, 2);
    }

    #[test]
    fn test_config_loading_defaults() {
        let env = MockEnvironment::new().with_var("RESOURCE_TYPES", "rds-instance");

        let config = load_config_with_env(&env).unwrap();

        assert_eq!(config.resource_types, vec!["rds-instance"]);
        assert_eq!(config.lookback_hours, 168); // 7 days
        assert_eq!(config.metric_period_seconds, 3600);
        assert_eq!(config.cpu_high_threshold, 80.0);
        assert_eq!(config.cpu_idle_threshold, 2.0);
        assert_eq!(config.max_connections, 3.0);
        assert_eq!(config.max_iops_sum, 100.0);
        assert_eq!(config.min_retention_days, 7.0);
        assert_eq!(config.min_alert_severity, Severity::Warning);
        assert_eq!(config.report_path, None); // stdout
        assert_eq!(config.webhook_url, None); // channel disabled
        assert_eq!(config.api_timeout_seconds, 30);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.max_concurrent_fetches, 8);
    }

    #[test]
    fn test_config_loading_missing_required() {
        let env = MockEnvironment::new();

        let result = load_config_with_env(&env);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("RESOURCE_TYPES"));
    }

    #[test]
    fn test_config_loading_invalid_threshold() {
        let env = MockEnvironment::new()
            .with_var("RESOURCE_TYPES", "rds-instance")
            .with_var("CPU_HIGH_THRESHOLD", "invalid");

        let result = load_config_with_env(&env);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("CPU_HIGH_THRESHOLD"));
    }

    #[test]
    fn test_config_loading_invalid_severity() {
        let env = MockEnvironment::new()
            .with_var("RESOURCE_TYPES", "rds-instance")
            .with_var("MIN_ALERT_SEVERITY", "urgent");

        let result = load_config_with_env(&env);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("urgent"));
    }

    #[test]
    fn test_resource_type_parsing() {
        // Whitespace and trailing separators are tolerated
        let env = MockEnvironment::new().with_var("RESOURCE_TYPES", " a , b ,  c  ,");

        let config = load_config_with_env(&env).unwrap();
        assert_eq!(config.resource_types, vec!["a", "b", "c"]);

        // All-blank list is an error after trimming
        let env = MockEnvironment::new().with_var("RESOURCE_TYPES", " , , ,");

        let result = load_config_with_env(&env);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("RESOURCE_TYPES"));
    }

    #[test]
    fn test_numeric_parsing_with_invalid_values() {
        // Invalid tuning knobs fall back to defaults rather than failing
        let env = MockEnvironment::new()
            .with_var("RESOURCE_TYPES", "rds-instance")
            .with_var("API_TIMEOUT_SECONDS", "invalid")
            .with_var("RETRY_ATTEMPTS", "also_invalid")
            .with_var("MAX_CONCURRENT_FETCHES", "nope");

        let config = load_config_with_env(&env).unwrap();
        assert_eq!(config.api_timeout_seconds, 30);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.max_concurrent_fetches, 8);
    }
}
