use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::types::{AttrValue, Config, Resource, Statistic};

/// One page of a resource listing. `next_token` is the provider's
/// continuation token; `None` signals the last page.
#[derive(Debug, Clone)]
pub struct ResourcePage {
    pub items: Vec<Resource>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// The two provider calls the pipeline depends on, regardless of which
/// underlying cloud API produces them.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn list_resources(
        &self,
        resource_type: &str,
        page_token: Option<&str>,
    ) -> Result<ResourcePage>;

    async fn get_metric_datapoints(
        &self,
        resource_id: &str,
        metric_name: &str,
        statistic: Statistic,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_seconds: i64,
    ) -> Result<Vec<Datapoint>>;
}

/// Bounded retry with exponential backoff, plus a per-attempt deadline.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            attempts: cfg.retry_attempts.max(1),
            initial_backoff: Duration::from_millis(200),
            call_timeout: Duration::from_secs(cfg.api_timeout_seconds),
        }
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    if attempt >= self.attempts {
                        return Err(err);
                    }
                    warn!("{} failed (attempt {}/{}): {}", what, attempt, self.attempts, err);
                }
                Err(_) => {
                    if attempt >= self.attempts {
                        return Err(anyhow!(
                            "{} timed out after {:?} ({} attempts)",
                            what,
                            self.call_timeout,
                            attempt
                        ));
                    }
                    warn!(
                        "{} timed out after {:?} (attempt {}/{})",
                        what, self.call_timeout, attempt, self.attempts
                    );
                }
            }
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
}

/// In-memory `CloudApi` over a captured inventory snapshot.
///
/// Serves two purposes: the backing store for offline audits of an
/// exported inventory document, and a controllable provider for tests
/// (injectable listing/metric failures, per-call counters).
///
/// Datapoints are returned as stored; a snapshot is assumed to already be
/// scoped to the capture window, so the requested start/end are not
/// re-filtered here.
#[derive(Default)]
pub struct StaticCloudApi {
    pages: HashMap<String, Vec<Vec<Resource>>>,
    datapoints: HashMap<(String, String), Vec<Datapoint>>,
    listing_failures: HashSet<String>,
    page_failures: HashMap<String, usize>,
    metric_failures: HashSet<(String, String)>,
    metric_calls: Mutex<HashMap<(String, String), usize>>,
}

#[derive(Debug, Deserialize)]
struct InventoryDoc {
    #[serde(default = "default_page_size")]
    page_size: usize,
    resources: BTreeMap<String, Vec<InventoryResource>>,
    #[serde(default)]
    metrics: BTreeMap<String, BTreeMap<String, Vec<Datapoint>>>,
}

#[derive(Debug, Deserialize)]
struct InventoryResource {
    id: String,
    #[serde(default)]
    attributes: BTreeMap<String, AttrValue>,
}

fn default_page_size() -> usize {
    100
}

impl StaticCloudApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an inventory document exported as JSON:
    /// `{"page_size": N, "resources": {type: [{id, attributes}]},
    ///   "metrics": {resource_id: {metric_name: [{timestamp, value}]}}}`
    pub fn from_inventory_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory file {}", path.display()))?;
        let doc: InventoryDoc = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed inventory file {}", path.display()))?;

        let mut api = Self::new();
        for (resource_type, items) in doc.resources {
            let resources: Vec<Resource> = items
                .into_iter()
                .map(|item| Resource {
                    id: item.id,
                    resource_type: resource_type.clone(),
                    attributes: item.attributes,
                })
                .collect();
            for chunk in resources.chunks(doc.page_size.max(1)) {
                api = api.with_page(&resource_type, chunk.to_vec());
            }
        }
        for (resource_id, metrics) in doc.metrics {
            for (metric_name, points) in metrics {
                api = api.with_datapoints(&resource_id, &metric_name, points);
            }
        }
        Ok(api)
    }

    /// Append one listing page for a resource type. Call order defines
    /// page order.
    pub fn with_page(mut self, resource_type: &str, items: Vec<Resource>) -> Self {
        self.pages
            .entry(resource_type.to_string())
            .or_default()
            .push(items);
        self
    }

    pub fn with_datapoints(
        mut self,
        resource_id: &str,
        metric_name: &str,
        points: Vec<Datapoint>,
    ) -> Self {
        self.datapoints
            .insert((resource_id.to_string(), metric_name.to_string()), points);
        self
    }

    pub fn with_values(self, resource_id: &str, metric_name: &str, values: &[f64]) -> Self {
        let base = Utc::now();
        let points = values
            .iter()
            .map(|v| Datapoint {
                timestamp: base,
                value: *v,
            })
            .collect();
        self.with_datapoints(resource_id, metric_name, points)
    }

    /// Make the first listing page for a resource type fail.
    pub fn with_listing_failure(mut self, resource_type: &str) -> Self {
        self.listing_failures.insert(resource_type.to_string());
        self
    }

    /// Make the listing fail when fetching the page at `page_index`.
    pub fn with_page_failure(mut self, resource_type: &str, page_index: usize) -> Self {
        self.page_failures
            .insert(resource_type.to_string(), page_index);
        self
    }

    pub fn with_metric_failure(mut self, resource_id: &str, metric_name: &str) -> Self {
        self.metric_failures
            .insert((resource_id.to_string(), metric_name.to_string()));
        self
    }

    /// Number of datapoint fetches issued for (resource, metric); lets
    /// tests assert that a distinct query is fetched exactly once per run.
    pub fn metric_call_count(&self, resource_id: &str, metric_name: &str) -> usize {
        self.metric_calls
            .lock()
            .expect("metric call counter poisoned")
            .get(&(resource_id.to_string(), metric_name.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CloudApi for StaticCloudApi {
    async fn list_resources(
        &self,
        resource_type: &str,
        page_token: Option<&str>,
    ) -> Result<ResourcePage> {
        let index: usize = match page_token {
            None => 0,
            Some(token) => token
                .parse()
                .map_err(|_| anyhow!("invalid page token '{}'", token))?,
        };

        if index == 0 && self.listing_failures.contains(resource_type) {
            return Err(anyhow!("listing '{}' failed", resource_type));
        }
        if self.page_failures.get(resource_type) == Some(&index) {
            return Err(anyhow!(
                "listing '{}' failed at page {}",
                resource_type,
                index
            ));
        }

        let pages = match self.pages.get(resource_type) {
            Some(pages) => pages,
            None => {
                return Ok(ResourcePage {
                    items: Vec::new(),
                    next_token: None,
                })
            }
        };

        let items = pages.get(index).cloned().unwrap_or_default();
        let next_token = if index + 1 < pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };
        Ok(ResourcePage { items, next_token })
    }

    async fn get_metric_datapoints(
        &self,
        resource_id: &str,
        metric_name: &str,
        _statistic: Statistic,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _period_seconds: i64,
    ) -> Result<Vec<Datapoint>> {
        let key = (resource_id.to_string(), metric_name.to_string());
        *self
            .metric_calls
            .lock()
            .expect("metric call counter poisoned")
            .entry(key.clone())
            .or_insert(0) += 1;

        if self.metric_failures.contains(&key) {
            return Err(anyhow!(
                "metric fetch '{}' for '{}' failed",
                metric_name,
                resource_id
            ));
        }
        Ok(self.datapoints.get(&key).cloned().unwrap_or_default())
    }
}
