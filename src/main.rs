mod config;
mod error;
mod logger;
mod models;
mod routes;
mod services;
mod utils;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::routes::{AppState, create_router};
use crate::services::library::Library;
use crate::services::llm::LLMClient;
use crate::services::preload::{BulkGenerator, PreloadQueue, PreloadWorker};
use crate::services::settings::SettingsStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();

    let config = Config::load()?;
    tracing::info!(
        root = %config.library.root.display(),
        model = %config.llm.model,
        inline = config.reader.inline_generation,
        "Starting light novel reader"
    );

    let library = Arc::new(Library::new(
        config.library.root.clone(),
        config.library.case_insensitive,
    ));
    let settings = Arc::new(SettingsStore::new(config.settings_file.0.clone()));
    let llm_client = Arc::new(LLMClient::new(&config.llm)?);

    // One worker drains every background generation job
    let (preload, jobs) = PreloadQueue::channel(config.preload.queue_capacity);
    let state = AppState::new(library, settings, llm_client, preload, &config);

    let generator = BulkGenerator::new(
        state.library.clone(),
        state.settings.clone(),
        state.cache.clone(),
    );
    PreloadWorker::new(generator, state.preload.clone()).spawn(jobs);

    let app = create_router(state);

    let listener = TcpListener::bind(config.server_addr()?).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
