pub mod webhook;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::AuditError;
use crate::types::{AlertEnvelope, Issue, Severity};

pub use webhook::WebhookChannel;

/// One notification transport. Failures are per channel: a failing
/// webhook never blocks the report or any other channel.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, envelope: &AlertEnvelope) -> Result<(), AuditError>;
}

pub fn envelope_for(issue: &Issue) -> AlertEnvelope {
    let mut body = issue.message.clone();
    if let (Some(observed), Some(threshold)) = (issue.observed, issue.threshold) {
        body.push_str(&format!(
            "\nobserved: {:.2}, threshold: {:.2}",
            observed, threshold
        ));
    }
    AlertEnvelope {
        severity: issue.severity,
        title: format!(
            "{}: {} on {} ({})",
            issue.severity, issue.rule_id, issue.resource_id, issue.resource_type
        ),
        body,
        dedup_key: issue.dedup_key(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub deduplicated: usize,
    pub failed: usize,
}

/// Converts issues at or above the severity floor into deduplicated
/// envelopes and fans them out. The dedup set lives for one run only;
/// cross-run suppression belongs to the channel backends.
pub struct AlertDispatcher {
    min_severity: Severity,
    seen: HashSet<String>,
}

impl AlertDispatcher {
    pub fn new(min_severity: Severity) -> Self {
        Self {
            min_severity,
            seen: HashSet::new(),
        }
    }

    pub async fn dispatch(
        &mut self,
        issues: &[Issue],
        channels: &[Box<dyn Channel>],
    ) -> DispatchStats {
        let mut stats = DispatchStats::default();
        for issue in issues {
            if issue.severity < self.min_severity {
                continue;
            }
            let envelope = envelope_for(issue);
            if !self.seen.insert(envelope.dedup_key.clone()) {
                debug!("suppressing duplicate alert '{}'", envelope.dedup_key);
                stats.deduplicated += 1;
                continue;
            }
            for channel in channels {
                match channel.send(&envelope).await {
                    Ok(()) => stats.delivered += 1,
                    Err(err) => {
                        stats.failed += 1;
                        error!("{}", err);
                    }
                }
            }
        }
        stats
    }
}

/// In-process channel that buffers envelopes; used by tests and dry runs.
/// Clones share one buffer, so a handle kept outside the dispatcher sees
/// everything a boxed clone received.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    sent: Arc<Mutex<Vec<AlertEnvelope>>>,
    fail: bool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that rejects every send, for failure-isolation tests.
    pub fn failing() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<AlertEnvelope> {
        self.sent.lock().expect("sent buffer poisoned").clone()
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, envelope: &AlertEnvelope) -> Result<(), AuditError> {
        if self.fail {
            return Err(AuditError::Channel {
                channel: self.name().to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.sent
            .lock()
            .expect("sent buffer poisoned")
            .push(envelope.clone());
        Ok(())
    }
}
