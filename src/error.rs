use thiserror::Error;

/// Failure taxonomy for one audit run.
///
/// Failures local to one resource type or one channel never abort the run;
/// only `Configuration` is fatal, and only at startup.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Resource listing failed or returned malformed data. The affected
    /// type gets a "failed to audit" note in the report and the run
    /// continues.
    #[error("discovery failed for resource type '{resource_type}': {reason}")]
    DiscoveryFailed {
        resource_type: String,
        reason: String,
    },

    /// Alert delivery failed for one channel. Logged per channel; other
    /// channels and the report are unaffected.
    #[error("alert channel '{channel}' failed: {reason}")]
    Channel { channel: String, reason: String },

    /// Missing or invalid required configuration. Fatal at startup only.
    #[error("configuration error: {0}")]
    Configuration(String),
}
