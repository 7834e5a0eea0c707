use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::alert::{AlertDispatcher, Channel, DispatchStats};
use crate::lister::{ListFailure, PagedLister};
use crate::metrics::MetricAggregator;
use crate::provider::{CloudApi, RetryPolicy};
use crate::report::{Report, ReportBuilder};
use crate::rules::{default_catalog, evaluate, Rule};
use crate::types::{Config, ExitSummary, Issue, MetricQuery, Resource};

pub struct RunOutcome {
    pub report: Report,
    pub summary: ExitSummary,
    pub dispatch: DispatchStats,
}

/// Wires one audit run: per resource type, list resources, aggregate the
/// metrics the rules declare, evaluate, then merge everything into the
/// report and the alert dispatcher.
///
/// Resource types run as concurrent pipelines and per-resource metric
/// fetches share a bounded permit pool, but results land in pre-allocated
/// slots indexed by configuration order, so the report is deterministic
/// regardless of completion order.
pub struct Orchestrator {
    api: Arc<dyn CloudApi>,
    config: Config,
    rules: Arc<Vec<Rule>>,
}

struct TypeOutcome {
    resource_type: String,
    audited: usize,
    issues: Vec<Issue>,
    failure: Option<ListFailure>,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn CloudApi>, config: Config) -> Self {
        let rules = Arc::new(default_catalog(&config));
        Self { api, config, rules }
    }

    pub fn with_rules(api: Arc<dyn CloudApi>, config: Config, rules: Vec<Rule>) -> Self {
        Self {
            api,
            config,
            rules: Arc::new(rules),
        }
    }

    pub async fn run(&self, channels: &[Box<dyn Channel>]) -> Result<RunOutcome> {
        let retry = RetryPolicy::from_config(&self.config);
        let aggregator = Arc::new(MetricAggregator::new(Arc::clone(&self.api), retry));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let lookback_seconds = self.config.lookback_hours * 3600;
        let period_seconds = self.config.metric_period_seconds;

        let mut slots: Vec<Option<TypeOutcome>> =
            (0..self.config.resource_types.len()).map(|_| None).collect();
        let mut join = JoinSet::new();
        for (index, resource_type) in self.config.resource_types.iter().enumerate() {
            join.spawn(audit_resource_type(
                index,
                Arc::clone(&self.api),
                Arc::clone(&aggregator),
                Arc::clone(&self.rules),
                retry,
                lookback_seconds,
                period_seconds,
                Arc::clone(&semaphore),
                resource_type.clone(),
            ));
        }
        while let Some(joined) = join.join_next().await {
            let (index, outcome) = joined?;
            slots[index] = Some(outcome);
        }

        let mut builder = ReportBuilder::new(&self.config);
        let mut all_issues: Vec<Issue> = Vec::new();
        for slot in slots {
            let outcome = slot.expect("every type slot is filled");
            builder.begin_section(&outcome.resource_type);
            match &outcome.failure {
                Some(ListFailure::FirstPage(reason)) => {
                    builder.note_discovery_failure(reason);
                }
                Some(ListFailure::MidPagination(reason)) => {
                    builder.note_partial_listing(reason);
                    builder.add_line(format!("resources audited: {}", outcome.audited));
                }
                None => {
                    builder.add_line(format!("resources audited: {}", outcome.audited));
                }
            }
            for issue in &outcome.issues {
                builder.record_issue(issue);
            }
            all_issues.extend(outcome.issues);
        }

        let mut dispatcher = AlertDispatcher::new(self.config.min_alert_severity);
        let dispatch = dispatcher.dispatch(&all_issues, channels).await;

        let report = builder.finalize();
        let summary = report.exit_summary();
        report.write_to_sink(self.config.report_path.as_deref())?;

        info!(
            "audit complete: {} issues ({} critical, {} warning, {} info), {} alerts delivered",
            summary.total_issues,
            summary.criticals,
            summary.warnings,
            summary.info,
            dispatch.delivered
        );

        Ok(RunOutcome {
            report,
            summary,
            dispatch,
        })
    }
}

async fn audit_resource_type(
    index: usize,
    api: Arc<dyn CloudApi>,
    aggregator: Arc<MetricAggregator>,
    rules: Arc<Vec<Rule>>,
    retry: RetryPolicy,
    lookback_seconds: i64,
    period_seconds: i64,
    semaphore: Arc<Semaphore>,
    resource_type: String,
) -> (usize, TypeOutcome) {
    let mut lister = PagedLister::new(api, retry, &resource_type);
    let mut tasks = JoinSet::new();
    let mut audited = 0usize;

    // Evaluations start as soon as each resource is yielded; the listing
    // keeps streaming pages while earlier resources are being fetched.
    while let Some(resource) = lister.next().await {
        let aggregator = Arc::clone(&aggregator);
        let rules = Arc::clone(&rules);
        let semaphore = Arc::clone(&semaphore);
        let position = audited;
        audited += 1;
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("fetch semaphore closed");
            let issues = evaluate_resource(
                &aggregator,
                &rules,
                &resource,
                lookback_seconds,
                period_seconds,
            )
            .await;
            (position, issues)
        });
    }

    let mut ordered: Vec<(usize, Vec<Issue>)> = Vec::with_capacity(audited);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(pair) => ordered.push(pair),
            Err(err) => warn!("resource evaluation task failed: {}", err),
        }
    }
    // Listing order, not completion order
    ordered.sort_by_key(|(position, _)| *position);
    let issues = ordered.into_iter().flat_map(|(_, issues)| issues).collect();

    (
        index,
        TypeOutcome {
            resource_type,
            audited,
            issues,
            failure: lister.failure().cloned(),
        },
    )
}

async fn evaluate_resource(
    aggregator: &MetricAggregator,
    rules: &[Rule],
    resource: &Resource,
    lookback_seconds: i64,
    period_seconds: i64,
) -> Vec<Issue> {
    // Distinct queries across all matching rules, issued once each
    let mut seen: HashSet<MetricQuery> = HashSet::new();
    let mut queries: Vec<MetricQuery> = Vec::new();
    for rule in rules.iter().filter(|r| r.matches_type(&resource.resource_type)) {
        for spec in rule.metric_specs() {
            let query = spec.query_for(&resource.id, lookback_seconds, period_seconds);
            if seen.insert(query.clone()) {
                queries.push(query);
            }
        }
    }

    let mut results = Vec::with_capacity(queries.len());
    for query in &queries {
        results.push(aggregator.aggregate(query).await);
    }

    evaluate(resource, &results, rules)
}
