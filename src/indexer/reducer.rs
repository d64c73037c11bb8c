use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::{stopped, Batch, BatchApplier, WorkerResult};
use crate::error::{IndexerError, Result};
use crate::metrics;

/// Single task that turns unordered worker results into ordered batches.
///
/// It waits on the stop flag, a new batch and a new result at once, so it never
/// blocks past a stop. Only one batch is collected at a time.
pub struct Reducer {
    applier: Arc<dyn BatchApplier>,
    received: HashMap<String, WorkerResult>,
}

impl Reducer {
    pub fn new(applier: Arc<dyn BatchApplier>) -> Self {
        Self {
            applier,
            received: HashMap::new(),
        }
    }

    pub async fn run(
        mut self,
        mut batches: mpsc::Receiver<Batch>,
        mut results: mpsc::Receiver<WorkerResult>,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut current: Option<Batch> = None;
        loop {
            let complete = current
                .as_ref()
                .map_or(false, |batch| self.received.len() >= batch.uids.len());
            if complete {
                if let Some(batch) = current.take() {
                    self.finish(batch).await;
                }
                continue;
            }

            tokio::select! {
                biased;
                _ = stopped(&mut stop) => {
                    info!("stopping result reducer");
                    return;
                }
                batch = batches.recv(), if current.is_none() => match batch {
                    Some(batch) => {
                        debug!("receiving {} inscriptions", batch.uids.len());
                        current = Some(batch);
                    }
                    None => return,
                },
                result = results.recv() => match result {
                    Some(result) => {
                        debug!("received result for inscription {}", result.uid);
                        self.received.insert(result.uid.clone(), result);
                    }
                    None => return,
                },
            }
        }
    }

    async fn finish(&mut self, batch: Batch) {
        let size = batch.uids.len();
        let outcome = match order_results(&batch.uids, &mut self.received) {
            Ok(ordered) => self.applier.apply_batch(ordered, batch.checkpoint).await,
            Err(e) => Err(e),
        };
        if !self.received.is_empty() {
            warn!("dropping {} results outside the batch", self.received.len());
            self.received.clear();
        }
        match &outcome {
            Ok(applied) => info!("processed {} results", applied),
            Err(e) => error!("failed to process results: {}", e),
        }
        metrics::record_batch(size, outcome.is_ok());
        // The driver may have stopped waiting.
        let _ = batch.done.send(outcome);
    }
}

/// Take the batch's results out of `received` in dispatch order and check that
/// known inscription ids never decrease.
pub fn order_results(
    uids: &[String],
    received: &mut HashMap<String, WorkerResult>,
) -> Result<Vec<WorkerResult>> {
    let mut ordered = Vec::with_capacity(uids.len());
    for uid in uids {
        let result = received
            .remove(uid)
            .ok_or_else(|| IndexerError::MissingResult { uid: uid.clone() })?;
        ordered.push(result);
    }

    let mut last: Option<i64> = None;
    for current in ordered.iter().filter_map(|r| r.inscription_id) {
        if let Some(last) = last.filter(|last| current < *last) {
            return Err(IndexerError::OutOfOrder { last, current });
        }
        last = Some(current);
    }
    Ok(ordered)
}
