use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep, Duration};

use crate::cache::Store;
use crate::config::snapshot::INTERVAL_SECS;
use crate::sweeper::sweep_expired;
use crate::transport::ChatTransport;

/// Background sweep and snapshot writer.
pub struct Maintenance {
    store: Store,
    transport: Arc<dyn ChatTransport>,
    interval: Duration,
}

impl Maintenance {
    pub fn new(store: Store, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            store,
            transport,
            interval: Duration::from_secs(INTERVAL_SECS),
        }
    }

    pub async fn run(self) {
        loop {
            sleep(self.interval).await;
            self.tick().await;
        }
    }

    /// One cycle: expire due entries, then write the snapshot. A sweep that
    /// removed entries has already saved.
    pub async fn tick(&self) -> usize {
        let swept = sweep_expired(&self.store, self.transport.as_ref(), Utc::now()).await;
        if swept > 0 {
            log::info!("Maintenance swept {} entries", swept);
            return swept;
        }
        if let Err(e) = self.store.save().await {
            log::error!("Error saving cache to {}: {:#}", self.store.path().display(), e);
        }
        swept
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
