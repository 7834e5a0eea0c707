use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

mod types;
mod error;
mod compare;
mod config;
mod provider;
mod lister;
mod metrics;
mod rules;
mod report;
mod alert;
mod orchestrator;

use alert::{Channel, WebhookChannel};
use config::load_config;
use error::AuditError;
use orchestrator::Orchestrator;
use provider::{CloudApi, StaticCloudApi};

#[tokio::main]
async fn main() {
    init_tracing();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            error!("audit run failed: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cfg = load_config()?;
    info!("resource types = {:?}", cfg.resource_types);

    let inventory_path = cfg.inventory_path.clone().ok_or_else(|| {
        AuditError::Configuration(
            "INVENTORY_PATH must point at an inventory snapshot".to_string(),
        )
    })?;
    let api: Arc<dyn CloudApi> = Arc::new(StaticCloudApi::from_inventory_file(&inventory_path)?);

    let mut channels: Vec<Box<dyn Channel>> = Vec::new();
    if let Some(url) = &cfg.webhook_url {
        channels.push(Box::new(WebhookChannel::new(url.clone())));
    } else {
        info!("WEBHOOK_URL not set, alert delivery disabled");
    }

    let orchestrator = Orchestrator::new(api, cfg);
    let outcome = orchestrator.run(&channels).await?;

    Ok(outcome.summary.exit_code())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
