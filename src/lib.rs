// Public modules
pub mod types;
pub mod error;
pub mod compare;
pub mod config;
pub mod provider;
pub mod lister;
pub mod metrics;
pub mod rules;
pub mod report;
pub mod alert;
pub mod orchestrator;

// Re-export commonly used items
pub use types::*;
pub use error::AuditError;
pub use compare::{approx_eq, Comparator, EPSILON};
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use provider::{CloudApi, Datapoint, ResourcePage, RetryPolicy, StaticCloudApi};
pub use lister::{ListFailure, PagedLister};
pub use metrics::{reduce, MetricAggregator};
pub use rules::{default_catalog, evaluate, Check, MetricSpec, Rule, UnavailablePolicy};
pub use report::{Report, ReportBuilder, Section, Summary};
pub use alert::{envelope_for, AlertDispatcher, Channel, DispatchStats, MemoryChannel, WebhookChannel};
pub use orchestrator::{Orchestrator, RunOutcome};
