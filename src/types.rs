use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Config {
    pub resource_types: Vec<String>,
    pub lookback_hours: i64,
    pub metric_period_seconds: i64,
    pub cpu_high_threshold: f64,
    pub cpu_idle_threshold: f64,
    pub max_connections: f64,
    pub max_iops_sum: f64,
    pub min_retention_days: f64,
    pub min_alert_severity: Severity,
    pub report_path: Option<PathBuf>,
    pub webhook_url: Option<String>,
    pub inventory_path: Option<PathBuf>,
    pub api_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub max_concurrent_fetches: usize,
}

/// Loosely typed resource attribute, as returned by provider describe calls.
/// A missing key and an empty string are distinct states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One auditable cloud entity (a queue, a bucket, a DB instance).
/// Immutable for the duration of one evaluation pass.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub id: String,
    pub resource_type: String,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    Sum,
    Average,
    Maximum,
    /// Per-period percentile, e.g. Percentile(95) for p95.
    Percentile(u8),
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Sum => write!(f, "Sum"),
            Statistic::Average => write!(f, "Average"),
            Statistic::Maximum => write!(f, "Maximum"),
            Statistic::Percentile(n) => write!(f, "p{}", n),
        }
    }
}

/// Fully determines one metric fetch; doubles as the per-run cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricQuery {
    pub resource_id: String,
    pub metric_name: String,
    pub statistic: Statistic,
    pub lookback_seconds: i64,
    pub period_seconds: i64,
}

/// Aggregated metric value. `Unavailable` means the provider returned no
/// datapoints or the call failed; rules must treat it as unknown, not as 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Value(f64),
    Unavailable,
}

impl MetricValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(*v),
            MetricValue::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, MetricValue::Unavailable)
    }
}

#[derive(Debug, Clone)]
pub struct MetricResult {
    pub query: MetricQuery,
    pub value: MetricValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "critical" | "crit" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// One rule violation for one resource. Traces to exactly one rule and
/// one resource; created by the rule engine, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub resource_id: String,
    pub resource_type: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl Issue {
    /// Collapses equivalent alerts within one run.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.rule_id, self.resource_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertEnvelope {
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub dedup_key: String,
}

/// Final per-run tally. The process exit status is a deterministic
/// function of this summary, never of the raw issue count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExitSummary {
    pub total_issues: usize,
    pub info: usize,
    pub warnings: usize,
    pub criticals: usize,
}

impl ExitSummary {
    pub fn record(&mut self, severity: Severity) {
        self.total_issues += 1;
        match severity {
            Severity::Info => self.info += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Critical => self.criticals += 1,
        }
    }

    pub fn has_issues(&self) -> bool {
        self.total_issues > 0
    }

    /// 0 clean, 2 findings. Counts are reported in the summary only; an
    /// exit code carrying a count would truncate at the shell's 255 cap.
    pub fn exit_code(&self) -> i32 {
        if self.has_issues() {
            2
        } else {
            0
        }
    }
}
