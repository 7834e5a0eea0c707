pub mod catalog;

use std::fmt;
use std::sync::Arc;

use crate::compare::Comparator;
use crate::types::{Issue, MetricQuery, MetricResult, MetricValue, Resource, Severity, Statistic};

pub use catalog::default_catalog;

/// A metric a rule depends on. Resource id and window are filled in at
/// query time, so one spec serves every resource of the rule's type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricSpec {
    pub metric_name: String,
    pub statistic: Statistic,
}

impl MetricSpec {
    pub fn new(metric_name: impl Into<String>, statistic: Statistic) -> Self {
        Self {
            metric_name: metric_name.into(),
            statistic,
        }
    }

    pub fn query_for(
        &self,
        resource_id: &str,
        lookback_seconds: i64,
        period_seconds: i64,
    ) -> MetricQuery {
        MetricQuery {
            resource_id: resource_id.to_string(),
            metric_name: self.metric_name.clone(),
            statistic: self.statistic,
            lookback_seconds,
            period_seconds,
        }
    }
}

/// What a threshold check does when its metric is `Unavailable`.
/// `Skip` treats unknown as neither healthy nor failing (no issue);
/// `Fire` maps missing data to a finding ("no data = not logging").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailablePolicy {
    Skip,
    Fire,
}

pub type PredicateFn = dyn Fn(&Resource, &[MetricResult]) -> bool + Send + Sync;

#[derive(Clone)]
pub enum Check {
    /// Compare an aggregated metric against a threshold.
    Metric {
        spec: MetricSpec,
        cmp: Comparator,
        threshold: f64,
        on_unavailable: UnavailablePolicy,
    },
    /// Fires when the declared metric has no data at all.
    MissingData { spec: MetricSpec },
    /// Fires when a boolean attribute equals `fires_when`; `missing_fires`
    /// pins the behavior for an absent (or non-boolean) attribute.
    AttrFlag {
        key: String,
        fires_when: bool,
        missing_fires: bool,
    },
    /// Compare a numeric attribute against a threshold. An absent
    /// attribute is unknown and never fires.
    AttrNumber {
        key: String,
        cmp: Comparator,
        threshold: f64,
    },
    /// Escape hatch for multi-metric heuristics. Must be pure and total:
    /// no panics on `Unavailable` inputs.
    Predicate(Arc<PredicateFn>),
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Metric {
                spec,
                cmp,
                threshold,
                ..
            } => write!(f, "Metric({} {} {})", spec.metric_name, cmp, threshold),
            Check::MissingData { spec } => write!(f, "MissingData({})", spec.metric_name),
            Check::AttrFlag { key, fires_when, .. } => {
                write!(f, "AttrFlag({} == {})", key, fires_when)
            }
            Check::AttrNumber {
                key,
                cmp,
                threshold,
            } => write!(f, "AttrNumber({} {} {})", key, cmp, threshold),
            Check::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// One declarative per-resource rule. Message templates may reference
/// `{resource}`, `{value}` and `{threshold}`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub applies_to: String,
    pub severity: Severity,
    pub message: String,
    pub check: Check,
    metrics: Vec<MetricSpec>,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        applies_to: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        check: Check,
    ) -> Self {
        let metrics = match &check {
            Check::Metric { spec, .. } | Check::MissingData { spec } => vec![spec.clone()],
            _ => Vec::new(),
        };
        Self {
            id: id.into(),
            applies_to: applies_to.into(),
            severity,
            message: message.into(),
            check,
            metrics,
        }
    }

    /// A predicate rule must declare the metrics it needs; only those
    /// results are handed to it at evaluation time.
    pub fn with_predicate<F>(
        id: impl Into<String>,
        applies_to: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        metrics: Vec<MetricSpec>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Resource, &[MetricResult]) -> bool + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            applies_to: applies_to.into(),
            severity,
            message: message.into(),
            check: Check::Predicate(Arc::new(predicate)),
            metrics,
        }
    }

    pub fn matches_type(&self, resource_type: &str) -> bool {
        self.applies_to == "*" || self.applies_to == resource_type
    }

    pub fn metric_specs(&self) -> &[MetricSpec] {
        &self.metrics
    }
}

/// Evaluate all matching rules against one resource. Every firing rule
/// produces an independent issue; there is no first-match-wins.
pub fn evaluate(resource: &Resource, results: &[MetricResult], rules: &[Rule]) -> Vec<Issue> {
    let mut issues = Vec::new();
    for rule in rules.iter().filter(|r| r.matches_type(&resource.resource_type)) {
        let declared: Vec<&MetricResult> = results
            .iter()
            .filter(|r| {
                r.query.resource_id == resource.id
                    && rule.metrics.iter().any(|s| {
                        s.metric_name == r.query.metric_name && s.statistic == r.query.statistic
                    })
            })
            .collect();

        let (fired, observed, threshold) = outcome(&rule.check, resource, &declared);
        if fired {
            issues.push(Issue {
                resource_id: resource.id.clone(),
                resource_type: resource.resource_type.clone(),
                rule_id: rule.id.clone(),
                severity: rule.severity,
                message: render_message(&rule.message, resource, observed, threshold),
                observed,
                threshold,
            });
        }
    }
    issues
}

fn outcome(
    check: &Check,
    resource: &Resource,
    declared: &[&MetricResult],
) -> (bool, Option<f64>, Option<f64>) {
    match check {
        Check::Metric {
            spec,
            cmp,
            threshold,
            on_unavailable,
        } => match declared_value(spec, declared) {
            Some(value) => (cmp.evaluate(value, *threshold), Some(value), Some(*threshold)),
            None => (
                matches!(on_unavailable, UnavailablePolicy::Fire),
                None,
                Some(*threshold),
            ),
        },
        Check::MissingData { spec } => match declared_value(spec, declared) {
            Some(value) => (false, Some(value), None),
            None => (true, None, None),
        },
        Check::AttrFlag {
            key,
            fires_when,
            missing_fires,
        } => match resource.attr(key).and_then(|v| v.as_bool()) {
            Some(flag) => (flag == *fires_when, None, None),
            None => (*missing_fires, None, None),
        },
        Check::AttrNumber {
            key,
            cmp,
            threshold,
        } => match resource.attr(key).and_then(|v| v.as_number()) {
            Some(value) => (cmp.evaluate(value, *threshold), Some(value), Some(*threshold)),
            None => (false, None, Some(*threshold)),
        },
        Check::Predicate(predicate) => {
            let owned: Vec<MetricResult> = declared.iter().map(|r| (*r).clone()).collect();
            (predicate(resource, &owned), None, None)
        }
    }
}

fn declared_value(spec: &MetricSpec, declared: &[&MetricResult]) -> Option<f64> {
    declared
        .iter()
        .find(|r| r.query.metric_name == spec.metric_name && r.query.statistic == spec.statistic)
        .and_then(|r| match r.value {
            MetricValue::Value(v) => Some(v),
            MetricValue::Unavailable => None,
        })
}

fn render_message(
    template: &str,
    resource: &Resource,
    observed: Option<f64>,
    threshold: Option<f64>,
) -> String {
    let observed = observed
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string());
    let threshold = threshold
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string());
    template
        .replace("{resource}", &resource.id)
        .replace("{value}", &observed)
        .replace("{threshold}", &threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttrValue, Statistic};

    fn resource(id: &str) -> Resource {
        Resource::new(id, "rds-instance")
    }

    fn cpu_result(resource_id: &str, value: MetricValue) -> MetricResult {
        MetricResult {
            query: MetricQuery {
                resource_id: resource_id.to_string(),
                metric_name: "CPUUtilization".to_string(),
                statistic: Statistic::Average,
                lookback_seconds: 3600,
                period_seconds: 300,
            },
            value,
        }
    }

    fn cpu_rule(threshold: f64) -> Rule {
        Rule::new(
            "cpu-high",
            "rds-instance",
            Severity::Warning,
            "average CPUUtilization {value} exceeds {threshold}",
            Check::Metric {
                spec: MetricSpec::new("CPUUtilization", Statistic::Average),
                cmp: Comparator::GreaterThan,
                threshold,
                on_unavailable: UnavailablePolicy::Skip,
            },
        )
    }

    #[test]
    fn test_metric_rule_fires_above_threshold() {
        let r = resource("db-1");
        let results = vec![cpu_result("db-1", MetricValue::Value(85.0))];
        let issues = evaluate(&r, &results, &[cpu_rule(80.0)]);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, "cpu-high");
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].observed, Some(85.0));
        assert_eq!(issues[0].threshold, Some(80.0));
        assert_eq!(
            issues[0].message,
            "average CPUUtilization 85.00 exceeds 80.00"
        );
    }

    #[test]
    fn test_metric_rule_boundary_is_strict() {
        let r = resource("db-1");
        // Exactly at the threshold must not fire for a '>' rule
        let at = vec![cpu_result("db-1", MetricValue::Value(80.0))];
        assert!(evaluate(&r, &at, &[cpu_rule(80.0)]).is_empty());

        let above = vec![cpu_result("db-1", MetricValue::Value(81.0))];
        assert_eq!(evaluate(&r, &above, &[cpu_rule(80.0)]).len(), 1);
    }

    #[test]
    fn test_unavailable_metric_skips_by_default() {
        let r = resource("db-1");
        let results = vec![cpu_result("db-1", MetricValue::Unavailable)];
        assert!(evaluate(&r, &results, &[cpu_rule(80.0)]).is_empty());
    }

    #[test]
    fn test_unavailable_metric_fires_when_policy_says_so() {
        let rule = Rule::new(
            "not-logging",
            "rds-instance",
            Severity::Warning,
            "{resource} produced no log volume data",
            Check::Metric {
                spec: MetricSpec::new("IncomingLogEvents", Statistic::Sum),
                cmp: Comparator::LessThan,
                threshold: 1.0,
                on_unavailable: UnavailablePolicy::Fire,
            },
        );
        let r = resource("db-1");
        let issues = evaluate(&r, &[], &[rule]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].observed, None);
    }

    #[test]
    fn test_missing_data_check() {
        let rule = Rule::new(
            "no-metric-data",
            "rds-instance",
            Severity::Warning,
            "{resource} reported no datapoints",
            Check::MissingData {
                spec: MetricSpec::new("CPUUtilization", Statistic::Average),
            },
        );
        let r = resource("db-1");

        assert_eq!(evaluate(&r, &[], &[rule.clone()]).len(), 1);

        let with_data = vec![cpu_result("db-1", MetricValue::Value(1.0))];
        assert!(evaluate(&r, &with_data, &[rule]).is_empty());
    }

    #[test]
    fn test_attr_flag_rule() {
        let rule = Rule::new(
            "unencrypted",
            "rds-instance",
            Severity::Critical,
            "{resource} has no storage encryption",
            Check::AttrFlag {
                key: "encrypted".to_string(),
                fires_when: false,
                missing_fires: true,
            },
        );

        let encrypted = resource("db-1").with_attr("encrypted", AttrValue::Bool(true));
        assert!(evaluate(&encrypted, &[], &[rule.clone()]).is_empty());

        let plaintext = resource("db-2").with_attr("encrypted", AttrValue::Bool(false));
        assert_eq!(evaluate(&plaintext, &[], &[rule.clone()]).len(), 1);

        // Attribute absent: fires because missing_fires pins it that way
        let unknown = resource("db-3");
        assert_eq!(evaluate(&unknown, &[], &[rule]).len(), 1);
    }

    #[test]
    fn test_attr_number_missing_is_unknown() {
        let rule = Rule::new(
            "retention-short",
            "rds-instance",
            Severity::Warning,
            "{resource} retention {value} below {threshold} days",
            Check::AttrNumber {
                key: "retention_days".to_string(),
                cmp: Comparator::LessThan,
                threshold: 7.0,
            },
        );

        let short = resource("db-1").with_attr("retention_days", AttrValue::Number(3.0));
        assert_eq!(evaluate(&short, &[], &[rule.clone()]).len(), 1);

        let ok = resource("db-2").with_attr("retention_days", AttrValue::Number(7.0));
        assert!(evaluate(&ok, &[], &[rule.clone()]).is_empty());

        let unknown = resource("db-3");
        assert!(evaluate(&unknown, &[], &[rule]).is_empty());
    }

    #[test]
    fn test_predicate_rule_handles_unavailable_without_panicking() {
        let rule = Rule::with_predicate(
            "idle",
            "rds-instance",
            Severity::Info,
            "{resource} looks idle",
            vec![
                MetricSpec::new("CPUUtilization", Statistic::Average),
                MetricSpec::new("DatabaseConnections", Statistic::Average),
            ],
            |_resource, results| {
                // All declared metrics must be present and low
                results.len() == 2
                    && results
                        .iter()
                        .all(|r| matches!(r.value, MetricValue::Value(v) if v <= 2.0))
            },
        );

        let r = resource("db-1");
        let partial = vec![cpu_result("db-1", MetricValue::Unavailable)];
        assert!(evaluate(&r, &partial, &[rule]).is_empty());
    }

    #[test]
    fn test_rules_fire_independently() {
        let flag = Rule::new(
            "public-access",
            "*",
            Severity::Critical,
            "{resource} is public",
            Check::AttrFlag {
                key: "public".to_string(),
                fires_when: true,
                missing_fires: false,
            },
        );
        let r = resource("db-1").with_attr("public", AttrValue::Bool(true));
        let results = vec![cpu_result("db-1", MetricValue::Value(90.0))];

        let issues = evaluate(&r, &results, &[cpu_rule(80.0), flag]);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].rule_id, "cpu-high");
        assert_eq!(issues[1].rule_id, "public-access");
    }

    #[test]
    fn test_rule_only_sees_declared_metrics() {
        let rule = Rule::with_predicate(
            "declared-only",
            "rds-instance",
            Severity::Info,
            "saw undeclared metric",
            vec![MetricSpec::new("CPUUtilization", Statistic::Average)],
            |_resource, results| results.iter().any(|r| r.query.metric_name != "CPUUtilization"),
        );

        let r = resource("db-1");
        let results = vec![
            cpu_result("db-1", MetricValue::Value(1.0)),
            MetricResult {
                query: MetricQuery {
                    resource_id: "db-1".to_string(),
                    metric_name: "DatabaseConnections".to_string(),
                    statistic: Statistic::Average,
                    lookback_seconds: 3600,
                    period_seconds: 300,
                },
                value: MetricValue::Value(50.0),
            },
        ];
        // The undeclared DatabaseConnections result is filtered out
        assert!(evaluate(&r, &results, &[rule]).is_empty());
    }

    #[test]
    fn test_applies_to_wildcard_and_mismatch() {
        let r = Resource::new("q-1", "sqs-queue");
        let mismatched = cpu_rule(80.0); // applies to rds-instance only
        let results = vec![MetricResult {
            query: MetricQuery {
                resource_id: "q-1".to_string(),
                metric_name: "CPUUtilization".to_string(),
                statistic: Statistic::Average,
                lookback_seconds: 3600,
                period_seconds: 300,
            },
            value: MetricValue::Value(99.0),
        }];
        assert!(evaluate(&r, &results, &[mismatched]).is_empty());

        let wildcard = Rule::new(
            "cpu-high",
            "*",
            Severity::Warning,
            "cpu {value} over {threshold}",
            Check::Metric {
                spec: MetricSpec::new("CPUUtilization", Statistic::Average),
                cmp: Comparator::GreaterThan,
                threshold: 80.0,
                on_unavailable: UnavailablePolicy::Skip,
            },
        );
        assert_eq!(evaluate(&r, &results, &[wildcard]).len(), 1);
    }
}
