//! Write API process.

use std::sync::Arc;

use anyhow::Context;
use film_api::AppState;
use film_store::{FilmTable, SqliteFilmStore};
use film_stream::RedisStreamWriter;
use film_sync_config::Config;
use film_sync_core::CatalogueService;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::{shutdown_signal, GRACE_PERIOD};

pub async fn run_api(config: Config) -> anyhow::Result<()> {
    let store = SqliteFilmStore::open(&config.store, FilmTable::Catalogue)
        .await
        .context("failed to open catalogue database")?;
    let writer = RedisStreamWriter::connect(&config.stream)
        .await
        .context("failed to connect event log writer")?;

    let service = CatalogueService::new(Arc::new(store.clone()), Arc::new(writer));
    let state = Arc::new(AppState::new(service, store.database().clone()));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(film_api::serve(config.app.port, state, async move {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        joined = &mut server => {
            // The server only returns on its own when it failed to start
            joined?.context("API server failed")?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown requested");
            let _ = stop_tx.send(());
            match tokio::time::timeout(GRACE_PERIOD, &mut server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!(error = %e, "API server error during shutdown"),
                Ok(Err(e)) => error!(error = %e, "API server task failed"),
                Err(_) => {
                    warn!(grace = ?GRACE_PERIOD, "Grace period elapsed, dropping open connections");
                    server.abort();
                }
            }
        }
    }

    store.close().await?;
    info!("API shutdown complete");
    Ok(())
}
