//! The crawl-and-reduce pipeline.
//!
//! The [`syncer::Syncer`] walks the explorer's listing pages. Each page becomes a
//! [`Batch`]: its UIDs go to the [`worker::WorkerPool`], which fetches them
//! concurrently, and the [`reducer::Reducer`] waits for every result, restores
//! ascending inscription order and hands the batch to a [`BatchApplier`].

pub mod applier;
pub mod reducer;
pub mod syncer;
pub mod worker;

pub use applier::{Applier, SkipReason, Transition};
pub use reducer::Reducer;
pub use syncer::Syncer;
pub use worker::{Worker, WorkerPool};

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use crate::domain::InscriptionRecord;
use crate::error::Result;
use crate::protocol::ContentEnvelope;

/// An inscription with its decoded content.
#[derive(Debug, Clone)]
pub struct FetchedInscription {
    pub record: InscriptionRecord,
    pub content: ContentEnvelope,
}

/// What a worker reports for one UID.
#[derive(Debug)]
pub struct WorkerResult {
    pub uid: String,
    /// Known whenever the inscription page itself was parsed, even if the content fetch failed.
    pub inscription_id: Option<i64>,
    pub outcome: Result<FetchedInscription>,
}

impl WorkerResult {
    pub fn fetched(uid: impl Into<String>, fetched: FetchedInscription) -> Self {
        Self {
            uid: uid.into(),
            inscription_id: Some(fetched.record.id),
            outcome: Ok(fetched),
        }
    }

    pub fn failed(
        uid: impl Into<String>,
        inscription_id: Option<i64>,
        error: crate::error::IndexerError,
    ) -> Self {
        Self {
            uid: uid.into(),
            inscription_id,
            outcome: Err(error),
        }
    }
}

/// One listing page in flight: UIDs in ascending order plus the channel the
/// driver waits on for the applied count.
#[derive(Debug)]
pub struct Batch {
    pub uids: Vec<String>,
    /// Highest inscription id applied before this batch.
    pub checkpoint: Option<i64>,
    pub done: oneshot::Sender<Result<usize>>,
}

/// Consumes ordered batches.
#[async_trait]
pub trait BatchApplier: Send + Sync {
    /// Apply `results` in order, returning how many records were applied.
    async fn apply_batch(&self, results: Vec<WorkerResult>, checkpoint: Option<i64>) -> Result<usize>;
}

/// Resolves once the stop flag is raised or its sender is gone.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}
