//! Synchronizer processes.

use std::sync::Arc;

use anyhow::Context;
use film_store::{FilmTable, SqliteFilmStore};
use film_stream::{EventReader, RedisStreamReader};
use film_sync_config::Config;
use film_sync_core::{ConsumerLoop, FilmEventHandler, IdentityPolicy, Reconciler};
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::{shutdown_signal, GRACE_PERIOD};

/// Which store a synchronizer keeps up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Catalogue `films` table, fed by the legacy change feed.
    Catalogue,
    /// Legacy `film` table, fed by the write API.
    Legacy,
}

impl Side {
    fn name(self) -> &'static str {
        match self {
            Self::Catalogue => "catalogue",
            Self::Legacy => "legacydb",
        }
    }

    /// Consumer group used unless the configuration names one.
    fn default_group(self) -> &'static str {
        match self {
            Self::Catalogue => "films",
            Self::Legacy => "catalogue",
        }
    }

    fn table(self) -> FilmTable {
        match self {
            Self::Catalogue => FilmTable::Catalogue,
            Self::Legacy => FilmTable::Legacy,
        }
    }

    fn policy(self) -> IdentityPolicy {
        match self {
            Self::Catalogue => IdentityPolicy::CarriedOrMinted,
            Self::Legacy => IdentityPolicy::Carried,
        }
    }
}

pub async fn run_sync(config: Config, side: Side) -> anyhow::Result<()> {
    let store = SqliteFilmStore::open(&config.store, side.table())
        .await
        .with_context(|| format!("failed to open {} database", side.name()))?;
    let reader = RedisStreamReader::connect(&config.stream, side.default_group())
        .await
        .context("failed to connect event log reader")?;

    let handler = FilmEventHandler::new(Reconciler::new(Arc::new(store.clone()), side.policy()));
    let consumer = ConsumerLoop::new(side.name(), reader, handler);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut task = tokio::spawn(consumer.run(stop_rx));
    info!(side = side.name(), "Consumer started");

    let reader = tokio::select! {
        joined = &mut task => Some(joined?),
        _ = shutdown_signal() => {
            info!("Shutdown requested");
            let _ = stop_tx.send(());
            match tokio::time::timeout(GRACE_PERIOD, &mut task).await {
                Ok(joined) => Some(joined?),
                Err(_) => {
                    warn!(grace = ?GRACE_PERIOD, "Grace period elapsed, abandoning consumer");
                    task.abort();
                    None
                }
            }
        }
    };

    if let Some(mut reader) = reader {
        reader.close().await?;
    }
    store.close().await?;
    info!(side = side.name(), "Consumer shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_side_has_its_own_group_and_table() {
        assert_eq!(Side::Catalogue.default_group(), "films");
        assert_eq!(Side::Catalogue.table(), FilmTable::Catalogue);
        assert_eq!(Side::Catalogue.policy(), IdentityPolicy::CarriedOrMinted);

        assert_eq!(Side::Legacy.default_group(), "catalogue");
        assert_eq!(Side::Legacy.table(), FilmTable::Legacy);
        assert_eq!(Side::Legacy.policy(), IdentityPolicy::Carried);
    }
}
