use async_trait::async_trait;

use crate::error::AuditError;
use crate::types::{AlertEnvelope, Severity};

use super::Channel;

/// Posts alert envelopes as JSON to an incoming-webhook endpoint.
pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "good",
        Severity::Warning => "warning",
        Severity::Critical => "danger",
    }
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, envelope: &AlertEnvelope) -> Result<(), AuditError> {
        let payload = serde_json::json!({
            "title": envelope.title,
            "body": envelope.body,
            "severityColor": severity_color(envelope.severity),
        });
        let res = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AuditError::Channel {
                channel: self.name().to_string(),
                reason: format!("request failed: {}", e),
            })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AuditError::Channel {
                channel: self.name().to_string(),
                reason: format!("webhook returned {}: {}", status, body),
            });
        }
        Ok(())
    }
}
