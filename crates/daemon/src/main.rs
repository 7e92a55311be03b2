// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;

use config::Config;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use wfe_core::{InMemoryBus, SharedBus, SharedClock, SystemClock};
use wfe_engine::Engine;
use wfe_storage::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(db_path = %config.db_path.display(), scheduler_interval_ms = config.scheduler_interval_ms, "starting workflow engine");

    let store = Arc::new(Store::open(&config.db_path)?);
    let bus: SharedBus = Arc::new(InMemoryBus::new());
    let clock: SharedClock = Arc::new(SystemClock);

    let engine = Engine::new(store, bus, clock);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    };

    tokio::select! {
        _ = engine.run(config.scheduler_interval_ms, shutdown_rx) => {}
        _ = shutdown_signal => {}
    }

    Ok(())
}
