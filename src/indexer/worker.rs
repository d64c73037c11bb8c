use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{stopped, FetchedInscription, WorkerResult};
use crate::app::ports::PageParser;
use crate::error::Result;
use crate::metrics;

/// Fetches one inscription and its content per UID pulled from the shared queue.
pub struct Worker {
    id: usize,
    parser: Arc<dyn PageParser>,
    attempts: u32,
    backoff: Duration,
}

impl Worker {
    pub fn new(id: usize, parser: Arc<dyn PageParser>, attempts: u32, backoff: Duration) -> Self {
        Self {
            id,
            parser,
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Loop until the queue closes or the stop flag is raised.
    ///
    /// A fetch already under way is finished and reported before the stop is observed.
    pub async fn run(
        self,
        queue: Arc<Mutex<mpsc::Receiver<String>>>,
        results: mpsc::Sender<WorkerResult>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            let uid = tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                uid = async { queue.lock().await.recv().await } => match uid {
                    Some(uid) => uid,
                    None => break,
                },
            };
            debug!("[worker {}]: processing inscription {}", self.id, uid);
            let result = self.process(&uid).await;
            if results.send(result).await.is_err() {
                break;
            }
        }
        info!("[worker {}]: stopping", self.id);
    }

    /// Fetch the inscription page, then its content. Failures become error results.
    pub async fn process(&self, uid: &str) -> WorkerResult {
        let parser = self.parser.as_ref();
        let record = match self.retry(uid, move || parser.inscription(uid)).await {
            Ok(record) => record,
            Err(e) => {
                warn!("[worker {}] failed to fetch inscription {}: {}", self.id, uid, e);
                return WorkerResult::failed(uid, None, e);
            }
        };
        // The content page is addressed by the id the explorer reports, falling back to the listing uid.
        let content_uid = if record.uid.is_empty() {
            uid
        } else {
            record.uid.as_str()
        };
        let content = self.retry(uid, move || parser.content(content_uid)).await;
        match content {
            Ok(content) => {
                metrics::record_inscription_fetched();
                debug!(
                    "[worker {}] parsed inscription {} as {}",
                    self.id, record.id, content.decoder
                );
                WorkerResult::fetched(uid, FetchedInscription { record, content })
            }
            Err(e) => {
                warn!("[worker {}] failed to fetch content of {}: {}", self.id, uid, e);
                WorkerResult::failed(uid, Some(record.id), e)
            }
        }
    }

    async fn retry<T, F, Fut>(&self, uid: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts => {
                    debug!(
                        "[worker {}] attempt {}/{} for {} failed: {}",
                        self.id, attempt, self.attempts, uid, e
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Fixed-size set of workers sharing one UID queue and one results channel.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        size: usize,
        parser: Arc<dyn PageParser>,
        attempts: u32,
        backoff: Duration,
        queue: mpsc::Receiver<String>,
        results: mpsc::Sender<WorkerResult>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let queue = Arc::new(Mutex::new(queue));
        let handles = (0..size)
            .map(|id| {
                let worker = Worker::new(id, parser.clone(), attempts, backoff);
                tokio::spawn(worker.run(queue.clone(), results.clone(), stop.clone()))
            })
            .collect();
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("worker task failed: {}", e);
            }
        }
        info!("all workers have been stopped");
    }
}
