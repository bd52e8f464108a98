//! offshell worker entry point.
//!
//! This binary is the hosting runtime: it loads configuration, opens the
//! cache store, drives the worker through install and activate, then
//! serves fetch events over HTTP. Logging goes to stderr.

use std::sync::Arc;

use anyhow::Result;
use offshell_client::{FetchClient, FetchConfig};
use offshell_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod gateway;
mod lifecycle;
mod worker;

use lifecycle::LifecycleEvent;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(cache = %config.cache_name(), origin = %config.origin, "starting offshell worker");

    let store = CacheDb::open(&config.db_path).await?;

    let fetch_config = FetchConfig {
        user_agent: config.user_agent.clone(),
        max_bytes: config.max_bytes,
        timeout: config.timeout(),
        max_redirects: config.max_redirects,
    };
    let client = FetchClient::new(fetch_config)?;

    let worker = Arc::new(worker::Worker::new(config.clone(), store, Arc::new(client)));

    // The host delivers install and activate in order; fetch events follow
    // over HTTP. Install failure aborts the process; the supervisor owns
    // retries.
    worker.handle_event(LifecycleEvent::Install).await?;
    worker.handle_event(LifecycleEvent::Activate).await?;

    gateway::serve(&config.listen_addr, worker).await
}
