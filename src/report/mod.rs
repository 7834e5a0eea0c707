use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::types::{Config, ExitSummary, Issue, Severity};

/// One titled block of the report; sections appear in the order resource
/// types were configured, never in map iteration order.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub title: String,
    pub lines: Vec<String>,
}

/// Running counters, incremented from the same `Issue` objects that feed
/// the rendered lines. Counts are never derived by re-parsing report text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub info: usize,
    pub warnings: usize,
    pub criticals: usize,
    pub by_rule: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub header: Vec<(String, String)>,
    pub sections: Vec<Section>,
    pub summary: Summary,
}

pub struct ReportBuilder {
    generated_at: DateTime<Utc>,
    header: Vec<(String, String)>,
    sections: Vec<Section>,
    summary: Summary,
}

impl ReportBuilder {
    pub fn new(cfg: &Config) -> Self {
        let header = vec![
            ("lookback_hours".to_string(), cfg.lookback_hours.to_string()),
            (
                "metric_period_seconds".to_string(),
                cfg.metric_period_seconds.to_string(),
            ),
            (
                "cpu_high_threshold".to_string(),
                cfg.cpu_high_threshold.to_string(),
            ),
            (
                "cpu_idle_threshold".to_string(),
                cfg.cpu_idle_threshold.to_string(),
            ),
            (
                "min_retention_days".to_string(),
                cfg.min_retention_days.to_string(),
            ),
            (
                "min_alert_severity".to_string(),
                cfg.min_alert_severity.to_string(),
            ),
        ];
        Self {
            generated_at: Utc::now(),
            header,
            sections: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn begin_section(&mut self, title: &str) {
        self.sections.push(Section {
            title: title.to_string(),
            lines: Vec::new(),
        });
    }

    pub fn add_section(&mut self, title: &str, lines: Vec<String>) {
        self.sections.push(Section {
            title: title.to_string(),
            lines,
        });
    }

    pub fn add_line(&mut self, line: impl Into<String>) {
        if self.sections.is_empty() {
            self.begin_section("general");
        }
        self.sections
            .last_mut()
            .expect("section exists")
            .lines
            .push(line.into());
    }

    /// Append the issue's line to the current section and bump the
    /// matching counters.
    pub fn record_issue(&mut self, issue: &Issue) {
        self.summary.total += 1;
        match issue.severity {
            Severity::Info => self.summary.info += 1,
            Severity::Warning => self.summary.warnings += 1,
            Severity::Critical => self.summary.criticals += 1,
        }
        *self.summary.by_rule.entry(issue.rule_id.clone()).or_insert(0) += 1;

        self.add_line(format!(
            "[{}] {} {}",
            issue.severity, issue.rule_id, issue.message
        ));
    }

    /// A resource type that could not be listed is called out, never
    /// silently omitted.
    pub fn note_discovery_failure(&mut self, reason: &str) {
        self.add_line(format!("failed to audit: {}", reason));
    }

    pub fn note_partial_listing(&mut self, reason: &str) {
        self.add_line(format!(
            "listing incomplete, results below are partial: {}",
            reason
        ));
    }

    pub fn finalize(self) -> Report {
        Report {
            generated_at: self.generated_at,
            header: self.header,
            sections: self.sections,
            summary: self.summary,
        }
    }
}

impl Report {
    pub fn exit_summary(&self) -> ExitSummary {
        ExitSummary {
            total_issues: self.summary.total,
            info: self.summary.info,
            warnings: self.summary.warnings,
            criticals: self.summary.criticals,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("==============================================\n");
        out.push_str(" Cloud Resource Audit Report\n");
        out.push_str("==============================================\n");
        out.push_str(&format!(
            "generated_at: {}\n",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        for (key, value) in &self.header {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        for section in &self.sections {
            out.push_str(&format!("\n--- {} ---\n", section.title));
            if section.lines.is_empty() {
                out.push_str("no issues detected\n");
            } else {
                for line in &section.lines {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out.push_str("\n--- summary ---\n");
        out.push_str(&format!("CRITICAL: {}\n", self.summary.criticals));
        out.push_str(&format!("WARNING: {}\n", self.summary.warnings));
        out.push_str(&format!("INFO: {}\n", self.summary.info));
        out.push_str(&format!("total issues: {}\n", self.summary.total));
        if !self.summary.by_rule.is_empty() {
            out.push_str("by rule:\n");
            for (rule_id, count) in &self.summary.by_rule {
                out.push_str(&format!("  {}: {}\n", rule_id, count));
            }
        }
        out
    }

    pub fn render_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    /// Flush the text rendering to the configured sink: a file path, or
    /// stdout when none is set.
    pub fn write_to_sink(&self, path: Option<&Path>) -> Result<()> {
        let text = self.render_text();
        match path {
            Some(path) => std::fs::write(path, text)
                .with_context(|| format!("Failed to write report to {}", path.display())),
            None => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(text.as_bytes())
                    .context("Failed to write report to stdout")
            }
        }
    }
}
