//! Broker worker command: runs the discovery and extraction task handlers
//! against the durable queue until interrupted.

use std::sync::Arc;

use crate::broker::Scheduler;
use crate::cli::helpers::{print_ok, print_step};
use crate::config::Settings;
use crate::discovery::DiscoveryWorker;
use crate::extraction::ExtractionWorker;
use crate::llm::VisionClient;
use crate::raster::Rasterizer;
use crate::repository::migrations::run_migrations;
use crate::server::AppState;

pub async fn cmd_worker(mut settings: Settings, concurrency: Option<usize>) -> anyhow::Result<()> {
    if let Some(c) = concurrency {
        settings.broker.concurrency = c;
    }

    print_step("Running database migrations...");
    run_migrations(&settings.database_url).await?;
    print_ok("Database ready");

    let state = AppState::new(&settings)?;
    let worker_id = format!("{}-{}", hostname::get()?.to_string_lossy(), std::process::id());

    let rasterizer = Rasterizer::new(settings.rasterizer_dpi)?;
    let vision = VisionClient::new(settings.llm.clone());

    let extraction = Arc::new(ExtractionWorker::new(
        state.documents.clone(),
        state.jobs.clone(),
        state.fields.clone(),
        state.transcripts.clone(),
        state.review_queue.clone(),
        state.storage.clone(),
        rasterizer,
        vision,
        state.events.clone(),
        state.lifecycle.clone(),
        worker_id.clone(),
        settings.llm.clone(),
    ));
    let discovery = Arc::new(DiscoveryWorker::new(
        state.jobs.clone(),
        state.documents.clone(),
        state.storage.clone(),
        state.queue.clone(),
        state.lifecycle.clone(),
        settings.broker.document_max_retries,
    ));

    let mut scheduler = Scheduler::new(state.queue.clone(), settings.broker.clone(), worker_id.clone());
    scheduler.register("extract_document", extraction);
    scheduler.register("discover_job", discovery);

    print_step(&format!(
        "Starting worker {worker_id} (concurrency={})",
        settings.broker.concurrency
    ));
    println!("  Press Ctrl+C to stop");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::select! {
        _ = scheduler.run(shutdown_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            let _ = shutdown_tx.send(true);
        }
    }

    Ok(())
}
