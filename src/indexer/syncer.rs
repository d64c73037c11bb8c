use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use super::{stopped, Batch, BatchApplier, Reducer, WorkerPool};
use crate::app::ports::{CheckpointStore, PageParser};
use crate::config::OrdConfig;
use crate::domain::Page;
use crate::error::{IndexerError, Result};

/// The crawl driver: pages through the inscriptions listing one batch at a time.
pub struct Syncer {
    config: OrdConfig,
    parser: Arc<dyn PageParser>,
    applier: Arc<dyn BatchApplier>,
    checkpoint: Arc<dyn CheckpointStore>,
}

/// Channels from the driver into the pipeline.
struct Feed {
    uids: mpsc::Sender<String>,
    batches: mpsc::Sender<Batch>,
}

impl Syncer {
    pub fn new(
        config: OrdConfig,
        parser: Arc<dyn PageParser>,
        applier: Arc<dyn BatchApplier>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            config,
            parser,
            applier,
            checkpoint,
        }
    }

    /// Run workers, reducer and the crawl loop until `stop` is raised.
    pub async fn run(self, stop: watch::Receiver<bool>) -> Result<()> {
        let concurrency = self.config.concurrency.max(1);
        let (uid_tx, uid_rx) = mpsc::channel(concurrency);
        let (result_tx, result_rx) = mpsc::channel(concurrency);
        let (batch_tx, batch_rx) = mpsc::channel(1);

        let pool = WorkerPool::spawn(
            concurrency,
            self.parser.clone(),
            self.config.fetch_attempts,
            self.config.retry_backoff(),
            uid_rx,
            result_tx,
            stop.clone(),
        );
        let reducer = tokio::spawn(Reducer::new(self.applier.clone()).run(
            batch_rx,
            result_rx,
            stop.clone(),
        ));
        info!("started {} workers against {}", pool.size(), self.config.server_addr);

        let feed = Feed {
            uids: uid_tx,
            batches: batch_tx,
        };
        let outcome = self.crawl(&feed, stop).await;

        drop(feed);
        pool.join().await;
        if let Err(e) = reducer.await {
            warn!("reducer task failed: {}", e);
        }
        outcome
    }

    async fn crawl(&self, feed: &Feed, mut stop: watch::Receiver<bool>) -> Result<()> {
        loop {
            let mut cursor = match self.checkpoint.load() {
                Ok(checkpoint) => checkpoint.or(self.config.inscription_id_start),
                Err(e) => {
                    error!("failed to read checkpoint: {}", e);
                    if self.pause(self.config.batch_retry_delay(), &mut stop).await {
                        return Ok(());
                    }
                    continue;
                }
            };
            info!(
                "start crawling from {}",
                Page::Inscriptions { cursor }.url()
            );
            loop {
                match self.sync_page(cursor, feed, &mut stop).await {
                    Ok(Some(next)) => cursor = Some(next),
                    Ok(None) => break,
                    Err(IndexerError::Stopped) => return Ok(()),
                    Err(e) => {
                        error!("failed to parse inscriptions: {}", e);
                        if self.pause(self.config.batch_retry_delay(), &mut stop).await {
                            return Ok(());
                        }
                    }
                }
            }
            if self.pause(self.config.idle_poll_interval(), &mut stop).await {
                return Ok(());
            }
        }
    }

    /// Dispatch one listing page and wait for it to be applied.
    ///
    /// Returns the cursor of the next (newer) page, `None` at the tip.
    async fn sync_page(
        &self,
        cursor: Option<i64>,
        feed: &Feed,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<i64>> {
        let listing = tokio::select! {
            biased;
            _ = stopped(stop) => return Err(IndexerError::Stopped),
            listing = self.parser.inscriptions(cursor) => listing?,
        };
        let uids = listing.ascending_uids();
        if uids.is_empty() {
            return Ok(listing.next_id);
        }

        // Without a checkpoint the configured start id is the floor.
        let checkpoint = self
            .checkpoint
            .load()?
            .or(self.config.inscription_id_start.map(|start| start - 1));
        let (done_tx, done_rx) = oneshot::channel();
        let batch = Batch {
            uids: uids.clone(),
            checkpoint,
            done: done_tx,
        };
        feed.batches
            .send(batch)
            .await
            .map_err(|_| IndexerError::Stopped)?;
        for uid in uids {
            tokio::select! {
                biased;
                _ = stopped(stop) => return Err(IndexerError::Stopped),
                sent = feed.uids.send(uid) => sent.map_err(|_| IndexerError::Stopped)?,
            }
        }
        let applied = tokio::select! {
            biased;
            _ = stopped(stop) => return Err(IndexerError::Stopped),
            done = done_rx => done.map_err(|_| IndexerError::Stopped)??,
        };
        info!("applied {} inscriptions from {}", applied, Page::Inscriptions { cursor }.url());
        Ok(listing.next_id)
    }

    /// Sleep unless stopped first; true when stopped.
    async fn pause(&self, delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;
            _ = stopped(stop) => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
