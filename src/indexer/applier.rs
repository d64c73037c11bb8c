use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{BatchApplier, WorkerResult};
use crate::app::ports::{CheckpointStore, CollectionRepo, TokenRepo};
use crate::domain::{Collection, InscriptionRecord, Token};
use crate::error::{IndexerError, Result};
use crate::metrics;
use crate::protocol::brc721::{DeployMessage, MintMessage, UpdateMessage};
use crate::protocol::signature::{self, MintContext};
use crate::protocol::{ContentEnvelope, ContentPayload};

/// Result of applying one inscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CollectionCreated,
    TokenMinted,
    CollectionUpdated,
    Skipped(SkipReason),
}

/// Why an inscription left the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotProtocol,
    CollectionExists,
    InvalidMax,
    InvalidSignaturePolicy,
    CollectionNotFound,
    NotAfterDeploy,
    SupplyExhausted,
    AlreadyMinted,
    SignatureRejected,
    UpdateDisabled,
    NothingToUpdate,
}

impl Transition {
    fn outcome(&self) -> &'static str {
        match self {
            Transition::Skipped(_) => "skipped",
            _ => "applied",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotProtocol => "not a protocol message",
            SkipReason::CollectionExists => "collection already exists",
            SkipReason::InvalidMax => "max is not an unsigned integer",
            SkipReason::InvalidSignaturePolicy => "invalid signature policy",
            SkipReason::CollectionNotFound => "collection not found",
            SkipReason::NotAfterDeploy => "inscription is not newer than the deploy",
            SkipReason::SupplyExhausted => "supply is full",
            SkipReason::AlreadyMinted => "token already minted",
            SkipReason::SignatureRejected => "signature rejected",
            SkipReason::UpdateDisabled => "update transitions are disabled",
            SkipReason::NothingToUpdate => "nothing to update",
        };
        f.write_str(text)
    }
}

/// Decimal digits only: no sign, no padding.
fn parse_max(max: &str) -> std::result::Result<u64, String> {
    if max.is_empty() || !max.bytes().all(|b| b.is_ascii_digit()) {
        return Err("not a decimal number".to_string());
    }
    max.parse::<u64>().map_err(|e| e.to_string())
}

/// The protocol state machine: deploy, mint and update against the repositories.
pub struct Applier {
    collections: Arc<dyn CollectionRepo>,
    tokens: Arc<dyn TokenRepo>,
    checkpoint: Arc<dyn CheckpointStore>,
    enable_update: bool,
}

impl Applier {
    pub fn new(
        collections: Arc<dyn CollectionRepo>,
        tokens: Arc<dyn TokenRepo>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            collections,
            tokens,
            checkpoint,
            enable_update: false,
        }
    }

    /// Route `update` messages to [`Applier::apply_update`] instead of ignoring them.
    pub fn with_update(mut self, enabled: bool) -> Self {
        self.enable_update = enabled;
        self
    }

    /// Apply one inscription's content.
    pub async fn apply(&self, record: &InscriptionRecord, content: &ContentEnvelope) -> Result<Transition> {
        let transition = match &content.payload {
            ContentPayload::Deploy(msg) => self.apply_deploy(record, msg).await?,
            ContentPayload::Mint(msg) => self.apply_mint(record, msg).await?,
            ContentPayload::Update(msg) if self.enable_update => self.apply_update(record, msg).await?,
            ContentPayload::Update(_) => Transition::Skipped(SkipReason::UpdateDisabled),
            ContentPayload::Raw(_) => Transition::Skipped(SkipReason::NotProtocol),
        };
        metrics::record_transition(content.kind(), transition.outcome());
        Ok(transition)
    }

    #[instrument(skip_all, fields(inscription = record.id, tick = %msg.tick))]
    pub async fn apply_deploy(&self, record: &InscriptionRecord, msg: &DeployMessage) -> Result<Transition> {
        if let Some(existing) = self.collections.find_by_tick(&msg.p, &msg.tick).await? {
            // First deploy wins, even over an older inscription seen later.
            if existing.inscription_id > record.id {
                warn!(
                    "collection {} already exists, but inscriptionId {} is greater than {}, ignore inscription {}",
                    msg.tick, existing.inscription_id, record.id, record.id
                );
            } else {
                info!("collection {} already exists, ignore inscription {}", msg.tick, record.id);
            }
            return Ok(Transition::Skipped(SkipReason::CollectionExists));
        }
        let max = match parse_max(&msg.max) {
            Ok(max) => max,
            Err(e) => {
                info!("invalid max {:?} for {}: {}, ignore inscription {}", msg.max, msg.tick, e, record.id);
                return Ok(Transition::Skipped(SkipReason::InvalidMax));
            }
        };
        let policy = match msg.sig.as_ref().map(signature::policy_from_deploy).transpose() {
            Ok(policy) => policy,
            Err(reason) => {
                info!("invalid signature policy for {}: {}, ignore inscription {}", msg.tick, reason, record.id);
                return Ok(Transition::Skipped(SkipReason::InvalidSignaturePolicy));
            }
        };
        let meta = msg.meta.as_ref();
        let now = Utc::now();
        let mut collection = Collection {
            id: None,
            p: msg.p.clone(),
            tick: msg.tick.clone(),
            max,
            supply: 0,
            base_uri: msg.base_uri.clone(),
            name: meta.map(|m| m.name.clone()),
            description: meta.map(|m| m.description.clone()),
            image: meta.map(|m| m.image.clone()),
            attributes: meta
                .filter(|m| !m.attributes.is_empty())
                .map(|m| serde_json::Value::Array(m.attributes.clone())),
            tx_hash: record.genesis_tx.clone(),
            block_height: record.genesis_height,
            block_time: record.timestamp,
            address: record.address.clone(),
            inscription_id: record.id,
            inscription_uid: record.uid.clone(),
            signature: policy,
            created_at: now,
            updated_at: now,
        };
        self.collections.create(&mut collection).await?;
        info!("created collection {} for inscription {}", msg.tick, record.id);
        Ok(Transition::CollectionCreated)
    }

    #[instrument(skip_all, fields(inscription = record.id, tick = %msg.tick))]
    pub async fn apply_mint(&self, record: &InscriptionRecord, msg: &MintMessage) -> Result<Transition> {
        let Some(mut collection) = self.collections.find_by_tick(&msg.p, &msg.tick).await? else {
            info!("collection {} not found, ignore inscription {}", msg.tick, record.id);
            return Ok(Transition::Skipped(SkipReason::CollectionNotFound));
        };
        if collection.inscription_id >= record.id {
            warn!(
                "collection {} inscriptionId {} is not less than {}, ignore inscription {}",
                msg.tick, collection.inscription_id, record.id, record.id
            );
            return Ok(Transition::Skipped(SkipReason::NotAfterDeploy));
        }
        if collection.is_exhausted() {
            info!("collection {} supply is full, ignore inscription {}", msg.tick, record.id);
            return Ok(Transition::Skipped(SkipReason::SupplyExhausted));
        }
        if self.tokens.find_by_inscription_id(record.id).await?.is_some() {
            info!("token with inscription {} already processed, ignore", record.id);
            return Ok(Transition::Skipped(SkipReason::AlreadyMinted));
        }

        let mut sig_record = None;
        if let Some(policy) = collection.signature.as_ref().filter(|p| p.is_enforced()) {
            let key = signature::parse_public_key(&policy.pub_key).map_err(|message| {
                IndexerError::CorruptPublicKey {
                    tick: collection.tick.clone(),
                    message,
                }
            })?;
            let Some(sig) = msg.sig.as_ref() else {
                info!("mint {} carries no signature, ignore", record.id);
                return Ok(Transition::Skipped(SkipReason::SignatureRejected));
            };
            let ctx = MintContext {
                receiver: &record.address,
                timestamp: record.timestamp,
                genesis_height: record.genesis_height,
            };
            let resolved = match signature::resolve_fields(policy, &msg.p, &msg.tick, sig, ctx) {
                Ok(resolved) => resolved,
                Err(reason) => {
                    info!("mint {} rejected: {}", record.id, reason);
                    return Ok(Transition::Skipped(SkipReason::SignatureRejected));
                }
            };
            if let Some(uid) = resolved.record.uid.as_deref() {
                if self.tokens.find_by_sig_uid(&msg.p, &msg.tick, uid).await?.is_some() {
                    info!("mint {} reuses signature uid {}, ignore", record.id, uid);
                    return Ok(Transition::Skipped(SkipReason::SignatureRejected));
                }
            }
            if !signature::verify(&key, &resolved.message, &sig.s) {
                info!("mint {} signature does not verify, ignore", record.id);
                return Ok(Transition::Skipped(SkipReason::SignatureRejected));
            }
            sig_record = Some(resolved.record);
        }

        let collection_id = collection
            .id
            .ok_or_else(|| IndexerError::MissingField("collection.id".into()))?;
        let now = Utc::now();
        let mut token = Token {
            id: None,
            p: msg.p.clone(),
            tick: msg.tick.clone(),
            token_id: collection.supply + 1,
            tx_hash: record.genesis_tx.clone(),
            block_height: record.genesis_height,
            block_time: record.timestamp,
            address: record.address.clone(),
            inscription_id: record.id,
            inscription_uid: record.uid.clone(),
            collection_id,
            signature: sig_record,
            created_at: now,
            updated_at: now,
        };
        self.tokens.create(&mut token).await?;
        info!("created token {} for inscription {}", token.token_id, record.id);

        // Not atomic with the token insert: a crash here leaves supply one short.
        collection.supply += 1;
        self.collections.update(&collection).await?;
        debug!("updated collection {} supply to {}", msg.tick, collection.supply);
        Ok(Transition::TokenMinted)
    }

    /// Overwrite the base URI of an existing collection.
    ///
    /// Not dispatched by [`Applier::apply`] unless enabled with [`Applier::with_update`].
    #[instrument(skip_all, fields(inscription = record.id, tick = %msg.tick))]
    pub async fn apply_update(&self, record: &InscriptionRecord, msg: &UpdateMessage) -> Result<Transition> {
        let Some(mut collection) = self.collections.find_by_tick(&msg.p, &msg.tick).await? else {
            info!("collection {} not found, ignore inscription {}", msg.tick, record.id);
            return Ok(Transition::Skipped(SkipReason::CollectionNotFound));
        };
        let Some(base_uri) = msg.base_uri.as_ref() else {
            return Ok(Transition::Skipped(SkipReason::NothingToUpdate));
        };
        collection.base_uri = Some(base_uri.clone());
        self.collections.update(&collection).await?;
        info!("updated collection {}", msg.tick);
        Ok(Transition::CollectionUpdated)
    }

    fn save_progress(&self, max_applied: Option<i64>, checkpoint: Option<i64>) -> Result<()> {
        if let Some(id) = max_applied.filter(|id| checkpoint.map_or(true, |k| *id > k)) {
            self.checkpoint.save(id)?;
            metrics::record_checkpoint(id);
        }
        Ok(())
    }

    /// Keep what was applied and report the failure that stopped the batch.
    ///
    /// A failed checkpoint write is logged; the batch error still wins.
    fn abort(
        &self,
        applied: usize,
        max_applied: Option<i64>,
        checkpoint: Option<i64>,
        cause: IndexerError,
    ) -> IndexerError {
        if let Err(e) = self.save_progress(max_applied, checkpoint) {
            error!("failed to save checkpoint {:?} after aborted batch: {}", max_applied, e);
        }
        IndexerError::BatchAborted {
            applied,
            source: Box::new(cause),
        }
    }
}

#[async_trait]
impl BatchApplier for Applier {
    /// Apply results in the given order.
    ///
    /// Records at or below `checkpoint` were applied by an earlier pass and are
    /// skipped. An error result aborts the rest of the batch unless it sits
    /// before such an already-applied record. The checkpoint advances to the
    /// highest id applied, including on abort.
    async fn apply_batch(&self, results: Vec<WorkerResult>, checkpoint: Option<i64>) -> Result<usize> {
        let applied_before = |id: i64| checkpoint.map_or(false, |k| id <= k);
        let stale_until = results.iter().rposition(|r| match &r.outcome {
            Ok(fetched) => applied_before(fetched.record.id),
            Err(_) => false,
        });

        let mut applied = 0;
        let mut max_applied = None;
        for (index, result) in results.into_iter().enumerate() {
            let fetched = match result.outcome {
                Ok(fetched) => fetched,
                Err(e) => {
                    let stale = result.inscription_id.map_or(false, applied_before)
                        || stale_until.map_or(false, |until| index < until);
                    if stale {
                        warn!("skipping failed inscription {} below checkpoint: {}", result.uid, e);
                        continue;
                    }
                    return Err(self.abort(applied, max_applied, checkpoint, e));
                }
            };
            let id = fetched.record.id;
            if applied_before(id) {
                debug!("inscription {} is not above checkpoint {:?}, ignore", id, checkpoint);
                continue;
            }
            match self.apply(&fetched.record, &fetched.content).await {
                Ok(transition) => debug!("processed inscription {}: {:?}", id, transition),
                Err(e) => return Err(self.abort(applied, max_applied, checkpoint, e)),
            }
            applied += 1;
            max_applied = Some(id);
        }
        self.save_progress(max_applied, checkpoint)?;
        Ok(applied)
    }
}
