// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docforge — PDF batch-processing job server.
//
// Configuration comes from `config.json` in the data directory
// (`DOCFORGE_DATA_DIR`, default `docforge-data`) with `DOCFORGE_LISTEN_ADDR`,
// `DOCFORGE_WORKERS` and `DOCFORGE_OCR_MODELS` overrides. Log filtering
// follows `RUST_LOG` and defaults to `info`.

use docforge_api::{AppState, build_router, serve};
use docforge_core::EngineConfig;
use docforge_jobs::Engine;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "docforge exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;
    info!(
        data_dir = %config.data_dir.display(),
        workers = config.workers,
        retention_hours = config.retention_hours,
        "starting docforge"
    );
    let addr = config.listen_addr.clone();

    let engine = Engine::open(config)?;
    let tasks = engine.start();
    let router = build_router(AppState::new(engine));

    serve(&addr, router, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown requested");
    })
    .await?;

    tasks.shutdown().await;
    Ok(())
}
