//! Built-in rules shared by the audit fleet. Each constructor pins its
//! comparator and boundary behavior explicitly; the per-service scripts
//! historically disagreed on `>` vs `>=` for otherwise-identical checks.

use crate::compare::Comparator;
use crate::types::{Config, Severity, Statistic};

use super::{Check, MetricSpec, Rule, UnavailablePolicy};

/// Average CPUUtilization strictly above the threshold. A value exactly at
/// the threshold does not fire.
pub fn cpu_high(applies_to: &str, threshold: f64) -> Rule {
    Rule::new(
        "cpu-high",
        applies_to,
        Severity::Warning,
        "{resource}: average CPUUtilization {value} exceeds {threshold}",
        Check::Metric {
            spec: MetricSpec::new("CPUUtilization", Statistic::Average),
            cmp: Comparator::GreaterThan,
            threshold,
            on_unavailable: UnavailablePolicy::Skip,
        },
    )
}

/// Average CPUUtilization at or below the idle ceiling (`<=`, matching the
/// idle auditors' `cpu <= max_cpu_avg`).
pub fn cpu_idle(applies_to: &str, threshold: f64) -> Rule {
    Rule::new(
        "cpu-idle",
        applies_to,
        Severity::Info,
        "{resource}: average CPUUtilization {value} at or below {threshold}, idle candidate",
        Check::Metric {
            spec: MetricSpec::new("CPUUtilization", Statistic::Average),
            cmp: Comparator::LessOrEqual,
            threshold,
            on_unavailable: UnavailablePolicy::Skip,
        },
    )
}

/// Average DatabaseConnections at or below the ceiling (`<=`).
pub fn low_connections(applies_to: &str, threshold: f64) -> Rule {
    Rule::new(
        "low-connections",
        applies_to,
        Severity::Info,
        "{resource}: average DatabaseConnections {value} at or below {threshold}",
        Check::Metric {
            spec: MetricSpec::new("DatabaseConnections", Statistic::Average),
            cmp: Comparator::LessOrEqual,
            threshold,
            on_unavailable: UnavailablePolicy::Skip,
        },
    )
}

/// Summed IOPS over the window at or below the ceiling (`<=`).
pub fn iops_low(applies_to: &str, threshold: f64) -> Rule {
    Rule::new(
        "iops-low",
        applies_to,
        Severity::Info,
        "{resource}: total IOPS {value} at or below {threshold} over the window",
        Check::Metric {
            spec: MetricSpec::new("TotalIOPS", Statistic::Sum),
            cmp: Comparator::LessOrEqual,
            threshold,
            on_unavailable: UnavailablePolicy::Skip,
        },
    )
}

/// Storage encryption disabled. An absent flag counts as unencrypted:
/// providers omit the field on legacy unencrypted resources.
pub fn unencrypted(applies_to: &str) -> Rule {
    Rule::new(
        "unencrypted",
        applies_to,
        Severity::Critical,
        "{resource}: storage encryption is not enabled",
        Check::AttrFlag {
            key: "encrypted".to_string(),
            fires_when: false,
            missing_fires: true,
        },
    )
}

/// Resource reachable publicly. An absent flag does not fire; public
/// exposure is only reported when the provider states it.
pub fn public_access(applies_to: &str) -> Rule {
    Rule::new(
        "public-access",
        applies_to,
        Severity::Critical,
        "{resource}: publicly accessible",
        Check::AttrFlag {
            key: "public".to_string(),
            fires_when: true,
            missing_fires: false,
        },
    )
}

/// Backup retention strictly below the minimum (`<`; a retention exactly
/// at the minimum is compliant).
pub fn retention_short(applies_to: &str, min_days: f64) -> Rule {
    Rule::new(
        "retention-short",
        applies_to,
        Severity::Warning,
        "{resource}: backup retention {value} below required {threshold} days",
        Check::AttrNumber {
            key: "retention_days".to_string(),
            cmp: Comparator::LessThan,
            threshold: min_days,
        },
    )
}

/// No datapoints at all for the declared metric. Missing data is the
/// finding here (a trail that stopped logging), unlike every other rule.
pub fn no_metric_data(
    applies_to: &str,
    metric_name: &str,
    statistic: Statistic,
) -> Rule {
    Rule::new(
        "no-metric-data",
        applies_to,
        Severity::Warning,
        "{resource}: no datapoints reported, resource may have stopped emitting",
        Check::MissingData {
            spec: MetricSpec::new(metric_name, statistic),
        },
    )
}

/// The stock rule set applied to every configured resource type, with
/// thresholds taken from the run configuration.
pub fn default_catalog(cfg: &Config) -> Vec<Rule> {
    vec![
        cpu_high("*", cfg.cpu_high_threshold),
        cpu_idle("*", cfg.cpu_idle_threshold),
        low_connections("*", cfg.max_connections),
        iops_low("*", cfg.max_iops_sum),
        unencrypted("*"),
        public_access("*"),
        retention_short("*", cfg.min_retention_days),
    ]
}
