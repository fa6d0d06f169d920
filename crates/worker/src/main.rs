//! The Burrow worker: the single long-running process that consumes
//! provisioning tasks from the transport and drives the providers.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burrow_core::transport::{InProcTransport, Transport};
use burrow_providers::{
    HttpComputeProvider, HttpDnsProvider, HttpVolumeProvider, RpcGuestClient,
};
use burrow_store::PgInstanceStore;
use burrow_taskmanager::{InstanceTasks, TaskConfig, TaskManager, ROUTING_KEY};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "burrow_worker=debug,burrow_taskmanager=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TaskConfig::from_env();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = Arc::new(PgInstanceStore::new(pool));
    let compute = Arc::new(HttpComputeProvider::new(config.compute_url.clone()));
    let volumes = Arc::new(HttpVolumeProvider::new(config.volume_url.clone()));
    let dns = Arc::new(HttpDnsProvider::new(config.dns_url.clone()));

    // Broker adapters live outside this workspace; the in-process
    // transport serves embedded and single-process deployments.
    let transport = Arc::new(InProcTransport::with_call_timeout(config.call_timeout));
    let inbox = transport.bind(ROUTING_KEY);
    let guest = Arc::new(RpcGuestClient::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
    ));

    let tasks = InstanceTasks::new(store, compute, volumes, dns, guest, config.clone());
    let manager = Arc::new(TaskManager::new(tasks, config.heartbeat_interval));

    let cancel = CancellationToken::new();

    let heartbeat = tokio::spawn({
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        async move { manager.run_heartbeat(cancel).await }
    });
    let serve = tokio::spawn({
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        async move { manager.serve(inbox, cancel).await }
    });

    tracing::info!("worker started; waiting for tasks");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    cancel.cancel();

    let _ = serve.await;
    let _ = heartbeat.await;
    Ok(())
}
