mod common;

use chrono::Utc;
use k256::ecdsa::SigningKey;
use std::sync::Arc;

use common::{at, deploy_json, mint_json, record};
use ord_indexer::app::ports::{CheckpointStore, CollectionRepo, TokenRepo};
use ord_indexer::domain::{Collection, InscriptionRecord, SigField, SignaturePolicy};
use ord_indexer::error::IndexerError;
use ord_indexer::indexer::{Applier, BatchApplier, FetchedInscription, SkipReason, Transition, WorkerResult};
use ord_indexer::protocol::signature;
use ord_indexer::protocol::DecoderRegistry;
use ord_indexer::storage::InMemoryStore;

struct Harness {
    store: Arc<InMemoryStore>,
    applier: Applier,
    registry: DecoderRegistry,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let applier = Applier::new(store.clone(), store.clone(), store.clone());
    Harness {
        store,
        applier,
        registry: DecoderRegistry::with_brc721(),
    }
}

impl Harness {
    fn with_update(mut self) -> Self {
        self.applier = Applier::new(self.store.clone(), self.store.clone(), self.store.clone())
            .with_update(true);
        self
    }

    async fn apply(&self, record: &InscriptionRecord, content: &str) -> Transition {
        let envelope = self.registry.decode(content.as_bytes());
        self.applier.apply(record, &envelope).await.unwrap()
    }

    fn fetched(&self, record: InscriptionRecord, content: &str) -> WorkerResult {
        let content = self.registry.decode(content.as_bytes());
        let uid = record.uid.clone();
        WorkerResult::fetched(uid, FetchedInscription { record, content })
    }

    async fn collection(&self, tick: &str) -> Option<Collection> {
        self.store.find_by_tick("brc-721", tick).await.unwrap()
    }

    async fn token_ids(&self) -> Vec<u64> {
        let opts = ord_indexer::domain::ListOptions {
            order: Some("token_id".into()),
            ..Default::default()
        };
        TokenRepo::list(self.store.as_ref(), &opts)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.token_id)
            .collect()
    }
}

fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[7u8; 32]).unwrap()
}

fn signed_deploy(tick: &str, fields: &[&str]) -> String {
    let fields: Vec<String> = fields.iter().map(|f| format!("\"{f}\"")).collect();
    format!(
        r#"{{"p":"brc-721","op":"deploy","tick":"{tick}","max":"100","buri":"ipfs://{tick}/",
            "sig":{{"pk":"{pk}","fields":[{fields}]}}}}"#,
        pk = signature::public_key_hex(&signing_key()),
        fields = fields.join(","),
    )
}

fn signed_mint(tick: &str, receiver: &str, uid: &str) -> String {
    let message = signature::canonical_message(
        "brc-721",
        tick,
        &[
            (SigField::Receiver, receiver.to_string()),
            (SigField::Uid, uid.to_string()),
        ],
    );
    format!(
        r#"{{"p":"brc-721","op":"mint","tick":"{tick}","sig":{{"s":"{s}","uid":"{uid}"}}}}"#,
        s = signature::sign(&signing_key(), &message),
    )
}

#[tokio::test]
async fn test_deploy_then_mint_assigns_serials() {
    let h = harness();
    assert_eq!(h.apply(&record(100, "d"), &deploy_json("ape", 10)).await, Transition::CollectionCreated);
    assert_eq!(h.apply(&record(101, "m1"), &mint_json("ape")).await, Transition::TokenMinted);
    assert_eq!(h.apply(&record(105, "m2"), &mint_json("ape")).await, Transition::TokenMinted);

    let collection = h.collection("ape").await.unwrap();
    assert_eq!(collection.supply, 2);
    assert_eq!(collection.inscription_id, 100);
    assert_eq!(collection.base_uri.as_deref(), Some("ipfs://ape/"));
    assert_eq!(h.token_ids().await, vec![1, 2]);

    let token = TokenRepo::find_by_inscription_id(h.store.as_ref(), 105).await.unwrap().unwrap();
    assert_eq!(token.token_id, 2);
    assert_eq!(token.address, "bc1pm2");
}

#[tokio::test]
async fn test_mint_is_idempotent() {
    let h = harness();
    h.apply(&record(100, "d"), &deploy_json("ape", 10)).await;
    assert_eq!(h.apply(&record(101, "m"), &mint_json("ape")).await, Transition::TokenMinted);
    assert_eq!(
        h.apply(&record(101, "m"), &mint_json("ape")).await,
        Transition::Skipped(SkipReason::AlreadyMinted)
    );
    assert_eq!(h.collection("ape").await.unwrap().supply, 1);
    assert_eq!(h.token_ids().await, vec![1]);
}

#[tokio::test]
async fn test_first_deploy_wins() {
    let h = harness();
    h.apply(&record(200, "late"), &deploy_json("ape", 10)).await;
    assert_eq!(
        h.apply(&record(150, "early"), &deploy_json("ape", 99)).await,
        Transition::Skipped(SkipReason::CollectionExists)
    );
    let collection = h.collection("ape").await.unwrap();
    assert_eq!(collection.inscription_id, 200);
    assert_eq!(collection.max, 10);
}

#[tokio::test]
async fn test_supply_cap() {
    let h = harness();
    h.apply(&record(100, "d"), &deploy_json("ape", 2)).await;
    assert_eq!(h.apply(&record(101, "a"), &mint_json("ape")).await, Transition::TokenMinted);
    assert_eq!(h.apply(&record(102, "b"), &mint_json("ape")).await, Transition::TokenMinted);
    assert_eq!(
        h.apply(&record(103, "c"), &mint_json("ape")).await,
        Transition::Skipped(SkipReason::SupplyExhausted)
    );
    assert_eq!(h.collection("ape").await.unwrap().supply, 2);
    assert_eq!(h.token_ids().await, vec![1, 2]);
}

#[tokio::test]
async fn test_mint_requires_earlier_deploy() {
    let h = harness();
    assert_eq!(
        h.apply(&record(99, "m"), &mint_json("ape")).await,
        Transition::Skipped(SkipReason::CollectionNotFound)
    );
    h.apply(&record(100, "d"), &deploy_json("ape", 10)).await;
    assert_eq!(
        h.apply(&record(90, "old"), &mint_json("ape")).await,
        Transition::Skipped(SkipReason::NotAfterDeploy)
    );
    assert!(h.token_ids().await.is_empty());
}

#[tokio::test]
async fn test_invalid_deploys_are_ignored() {
    let h = harness();
    let bad_max = r#"{"p":"brc-721","op":"deploy","tick":"ape","max":"ten","buri":"b"}"#;
    assert_eq!(h.apply(&record(100, "d"), bad_max).await, Transition::Skipped(SkipReason::InvalidMax));

    let bad_field = signed_deploy("ape", &["rec", "nonce"]);
    assert_eq!(
        h.apply(&record(101, "d2"), &bad_field).await,
        Transition::Skipped(SkipReason::InvalidSignaturePolicy)
    );
    assert!(h.collection("ape").await.is_none());

    assert_eq!(h.apply(&record(102, "t"), "hello world").await, Transition::Skipped(SkipReason::NotProtocol));
}

#[tokio::test]
async fn test_max_must_be_plain_digits() {
    let h = harness();
    for (id, max) in [(100, "+10"), (101, " 10"), (102, "10 "), (103, "-1")] {
        let deploy = format!(r#"{{"p":"brc-721","op":"deploy","tick":"ape","max":"{max}","buri":"b"}}"#);
        assert_eq!(
            h.apply(&record(id, "d"), &deploy).await,
            Transition::Skipped(SkipReason::InvalidMax),
            "max {max:?}"
        );
    }
    assert!(h.collection("ape").await.is_none());

    let deploy = r#"{"p":"brc-721","op":"deploy","tick":"ape","max":"010","buri":"b"}"#;
    assert_eq!(h.apply(&record(105, "d"), deploy).await, Transition::CollectionCreated);
    assert_eq!(h.collection("ape").await.unwrap().max, 10);
}

#[tokio::test]
async fn test_signature_gate() {
    let h = harness();
    h.apply(&record(100, "d"), &signed_deploy("ape", &["rec", "uid"])).await;
    let policy = h.collection("ape").await.unwrap().signature.unwrap();
    assert_eq!(policy.fields, vec![SigField::Receiver, SigField::Uid]);

    let first = record(101, "m1");
    let mint = signed_mint("ape", &first.address, "n1");
    assert_eq!(h.apply(&first, &mint).await, Transition::TokenMinted);
    let token = TokenRepo::find_by_inscription_id(h.store.as_ref(), 101).await.unwrap().unwrap();
    let sig = token.signature.unwrap();
    assert_eq!(sig.uid.as_deref(), Some("n1"));
    assert_eq!(sig.receiver.as_deref(), Some(first.address.as_str()));

    // Same signed uid again, same receiver.
    let mut replay = record(102, "m2");
    replay.address = first.address.clone();
    assert_eq!(h.apply(&replay, &mint).await, Transition::Skipped(SkipReason::SignatureRejected));

    // Signed for someone else.
    let stolen = signed_mint("ape", "bc1pother", "n2");
    assert_eq!(
        h.apply(&record(103, "m3"), &stolen).await,
        Transition::Skipped(SkipReason::SignatureRejected)
    );

    assert_eq!(
        h.apply(&record(104, "m4"), &mint_json("ape")).await,
        Transition::Skipped(SkipReason::SignatureRejected)
    );

    let fresh = record(105, "m5");
    let mint = signed_mint("ape", &fresh.address, "n3");
    assert_eq!(h.apply(&fresh, &mint).await, Transition::TokenMinted);
    assert_eq!(h.token_ids().await, vec![1, 2]);
}

#[tokio::test]
async fn test_signature_expiry_time() {
    let h = harness();
    h.apply(&record(100, "d"), &signed_deploy("ape", &["expt"])).await;

    let mint_until = |expt: i64| {
        let message = signature::canonical_message("brc-721", "ape", &[(SigField::ExpiredTime, expt.to_string())]);
        format!(
            r#"{{"p":"brc-721","op":"mint","tick":"ape","sig":{{"s":"{}","expt":{expt}}}}}"#,
            signature::sign(&signing_key(), &message)
        )
    };

    let mut late = record(101, "late");
    late.timestamp = at(1_800_000_000);
    assert_eq!(
        h.apply(&late, &mint_until(1_800_000_000)).await,
        Transition::Skipped(SkipReason::SignatureRejected)
    );

    let mut on_time = record(102, "ok");
    on_time.timestamp = at(1_800_000_000);
    assert_eq!(h.apply(&on_time, &mint_until(1_800_000_001)).await, Transition::TokenMinted);
}

#[tokio::test]
async fn test_corrupt_stored_key_is_fatal() {
    let h = harness();
    let now = Utc::now();
    let mut collection = Collection {
        id: None,
        p: "brc-721".into(),
        tick: "ape".into(),
        max: 10,
        supply: 0,
        base_uri: None,
        name: None,
        description: None,
        image: None,
        attributes: None,
        tx_hash: "tx".into(),
        block_height: 1,
        block_time: now,
        address: "bc1p".into(),
        inscription_id: 100,
        inscription_uid: "d".into(),
        signature: Some(SignaturePolicy {
            pub_key: "not-a-key".into(),
            fields: vec![SigField::Uid],
        }),
        created_at: now,
        updated_at: now,
    };
    CollectionRepo::create(h.store.as_ref(), &mut collection).await.unwrap();

    let envelope = h.registry.decode(mint_json("ape").as_bytes());
    let err = h.applier.apply(&record(101, "m"), &envelope).await.unwrap_err();
    assert!(matches!(err, IndexerError::CorruptPublicKey { .. }));
}

#[tokio::test]
async fn test_update_is_opt_in() {
    let h = harness();
    h.apply(&record(100, "d"), &deploy_json("ape", 10)).await;
    let update = r#"{"p":"brc-721","op":"update","tick":"ape","buri":"ipfs://moved/"}"#;
    assert_eq!(
        h.apply(&record(101, "u"), update).await,
        Transition::Skipped(SkipReason::UpdateDisabled)
    );
    assert_eq!(h.collection("ape").await.unwrap().base_uri.as_deref(), Some("ipfs://ape/"));

    let h = h.with_update();
    assert_eq!(h.apply(&record(102, "u2"), update).await, Transition::CollectionUpdated);
    assert_eq!(h.collection("ape").await.unwrap().base_uri.as_deref(), Some("ipfs://moved/"));

    let unknown = r#"{"p":"brc-721","op":"update","tick":"bee","buri":"x"}"#;
    assert_eq!(
        h.apply(&record(103, "u3"), unknown).await,
        Transition::Skipped(SkipReason::CollectionNotFound)
    );
}

#[tokio::test]
async fn test_batch_resumes_after_checkpoint() {
    let h = harness();
    let batch = || {
        vec![
            h.fetched(record(100, "d"), &deploy_json("ape", 10)),
            h.fetched(record(101, "a"), &mint_json("ape")),
            h.fetched(record(102, "b"), &mint_json("ape")),
        ]
    };

    assert_eq!(h.applier.apply_batch(batch(), None).await.unwrap(), 3);
    assert_eq!(h.store.load().unwrap(), Some(102));

    // Replaying the same page after a restart changes nothing.
    assert_eq!(h.applier.apply_batch(batch(), Some(102)).await.unwrap(), 0);
    assert_eq!(h.collection("ape").await.unwrap().supply, 2);

    // Only records above the checkpoint are applied.
    let mut partial = batch();
    partial.push(h.fetched(record(110, "c"), &mint_json("ape")));
    assert_eq!(h.applier.apply_batch(partial, Some(102)).await.unwrap(), 1);
    assert_eq!(h.token_ids().await, vec![1, 2, 3]);
    assert_eq!(h.store.load().unwrap(), Some(110));
}

#[tokio::test]
async fn test_batch_error_handling() {
    let h = harness();
    h.store.save(100).unwrap();

    // A failure ordered before an already-applied record is stale.
    let stale = vec![
        WorkerResult::failed("gone", None, IndexerError::HttpStatus { url: "x".into(), status: 500 }),
        h.fetched(record(100, "d"), &deploy_json("ape", 10)),
    ];
    assert_eq!(h.applier.apply_batch(stale, Some(100)).await.unwrap(), 0);

    // A failure after new records aborts, keeping what was applied.
    let aborted = vec![
        h.fetched(record(101, "t"), "hello"),
        WorkerResult::failed("bad", Some(102), IndexerError::HttpStatus { url: "y".into(), status: 500 }),
        h.fetched(record(103, "u"), "world"),
    ];
    let err = h.applier.apply_batch(aborted, Some(100)).await.unwrap_err();
    assert!(matches!(err, IndexerError::BatchAborted { applied: 1, .. }));
    assert_eq!(h.store.load().unwrap(), Some(101));
}

/// Checkpoint store whose writes always fail.
struct BrokenCheckpoint;

impl CheckpointStore for BrokenCheckpoint {
    fn load(&self) -> ord_indexer::error::Result<Option<i64>> {
        Ok(None)
    }

    fn save(&self, _inscription_id: i64) -> ord_indexer::error::Result<()> {
        Err(IndexerError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
    }
}

#[tokio::test]
async fn test_abort_survives_checkpoint_write_failure() {
    let h = harness();
    let applier = Applier::new(h.store.clone(), h.store.clone(), Arc::new(BrokenCheckpoint));
    let batch = vec![
        h.fetched(record(100, "d"), &deploy_json("ape", 10)),
        WorkerResult::failed("bad", Some(101), IndexerError::HttpStatus { url: "z".into(), status: 502 }),
    ];

    let err = applier.apply_batch(batch, None).await.unwrap_err();
    match err {
        IndexerError::BatchAborted { applied, source } => {
            assert_eq!(applied, 1);
            assert!(matches!(*source, IndexerError::HttpStatus { status: 502, .. }));
        }
        other => panic!("expected BatchAborted, got {other}"),
    }
    assert!(h.collection("ape").await.is_some());
}
