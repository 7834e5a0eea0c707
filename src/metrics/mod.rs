use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::provider::{CloudApi, Datapoint, RetryPolicy};
use crate::types::{MetricQuery, MetricResult, MetricValue, Statistic};

/// Fetches raw datapoints for a query's lookback window and reduces them
/// to a single scalar. Results are cached by query for the duration of one
/// run, so a query shared by several rules is issued once.
pub struct MetricAggregator {
    api: Arc<dyn CloudApi>,
    retry: RetryPolicy,
    cache: Mutex<HashMap<MetricQuery, MetricValue>>,
}

impl MetricAggregator {
    pub fn new(api: Arc<dyn CloudApi>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn aggregate(&self, query: &MetricQuery) -> MetricResult {
        if let Some(value) = self.cache.lock().await.get(query) {
            return MetricResult {
                query: query.clone(),
                value: *value,
            };
        }

        let value = self.fetch_and_reduce(query).await;
        self.cache.lock().await.insert(query.clone(), value);
        MetricResult {
            query: query.clone(),
            value,
        }
    }

    async fn fetch_and_reduce(&self, query: &MetricQuery) -> MetricValue {
        let end = Utc::now();
        let start = end - Duration::seconds(query.lookback_seconds);

        let api = Arc::clone(&self.api);
        let q = query.clone();
        let result = self
            .retry
            .run("get_metric_datapoints", || {
                let api = Arc::clone(&api);
                let q = q.clone();
                async move {
                    api.get_metric_datapoints(
                        &q.resource_id,
                        &q.metric_name,
                        q.statistic,
                        start,
                        end,
                        q.period_seconds,
                    )
                    .await
                }
            })
            .await;

        match result {
            Ok(points) => reduce(query.statistic, &points),
            Err(err) => {
                // A failed fetch is "unknown", never 0
                warn!(
                    "metric '{}' for '{}' unavailable: {}",
                    query.metric_name, query.resource_id, err
                );
                MetricValue::Unavailable
            }
        }
    }
}

/// Reduce per-period datapoints to one scalar.
///
/// `Average` is the unweighted mean of per-period averages and
/// `Percentile` the mean of per-period percentile values, matching how the
/// audit fleet has always computed them.
pub fn reduce(statistic: Statistic, points: &[Datapoint]) -> MetricValue {
    if points.is_empty() {
        return MetricValue::Unavailable;
    }
    let value = match statistic {
        Statistic::Sum => points.iter().map(|p| p.value).sum::<f64>(),
        Statistic::Average | Statistic::Percentile(_) => {
            points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64
        }
        Statistic::Maximum => points
            .iter()
            .map(|p| p.value)
            .fold(f64::NEG_INFINITY, f64::max),
    };
    MetricValue::Value(value)
}
