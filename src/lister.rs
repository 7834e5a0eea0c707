use std::collections::VecDeque;
use std::sync::Arc;

use tracing::warn;

use crate::provider::{CloudApi, RetryPolicy};
use crate::types::Resource;

/// Where in the listing a failure occurred. A first-page failure means the
/// resource type could not be audited at all; a mid-pagination failure
/// leaves the already-yielded items valid (partial results).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFailure {
    FirstPage(String),
    MidPagination(String),
}

impl ListFailure {
    pub fn reason(&self) -> &str {
        match self {
            ListFailure::FirstPage(reason) | ListFailure::MidPagination(reason) => reason,
        }
    }
}

/// Streaming enumeration of one resource type, following continuation
/// tokens page by page. Each page's items are yielded before the next
/// page is fetched, so a large inventory never has to fit in memory.
pub struct PagedLister {
    api: Arc<dyn CloudApi>,
    retry: RetryPolicy,
    resource_type: String,
    buffer: VecDeque<Resource>,
    next_token: Option<String>,
    started: bool,
    done: bool,
    failure: Option<ListFailure>,
}

impl PagedLister {
    pub fn new(api: Arc<dyn CloudApi>, retry: RetryPolicy, resource_type: &str) -> Self {
        Self {
            api,
            retry,
            resource_type: resource_type.to_string(),
            buffer: VecDeque::new(),
            next_token: None,
            started: false,
            done: false,
            failure: None,
        }
    }

    /// Yield the next resource, fetching further pages as needed. Returns
    /// `None` once the provider signals no more pages or a page fetch
    /// fails; check `failure()` to distinguish the two.
    pub async fn next(&mut self) -> Option<Resource> {
        loop {
            if let Some(resource) = self.buffer.pop_front() {
                return Some(resource);
            }
            if self.done {
                return None;
            }
            self.fetch_page().await;
        }
    }

    /// Set once the lister stops early. First-page failures should surface
    /// as a "failed to audit" note; mid-pagination failures as a partial
    /// listing note.
    pub fn failure(&self) -> Option<&ListFailure> {
        self.failure.as_ref()
    }

    async fn fetch_page(&mut self) {
        let api = Arc::clone(&self.api);
        let resource_type = self.resource_type.clone();
        let token = self.next_token.clone();

        let result = self
            .retry
            .run("list_resources", || {
                let api = Arc::clone(&api);
                let resource_type = resource_type.clone();
                let token = token.clone();
                async move {
                    api.list_resources(&resource_type, token.as_deref()).await
                }
            })
            .await;

        let first_page = !self.started;
        self.started = true;

        match result {
            Ok(page) => {
                self.buffer.extend(page.items);
                self.next_token = page.next_token;
                if self.next_token.is_none() {
                    self.done = true;
                }
            }
            Err(err) => {
                warn!(
                    "listing '{}' failed{}: {}",
                    self.resource_type,
                    if first_page { "" } else { " mid-pagination" },
                    err
                );
                self.failure = Some(if first_page {
                    ListFailure::FirstPage(err.to_string())
                } else {
                    ListFailure::MidPagination(err.to_string())
                });
                self.done = true;
            }
        }
    }
}
