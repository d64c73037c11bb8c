use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{order_for, page, sort_by_order};
use crate::app::ports::{CheckpointStore, CollectionRepo, TokenRepo};
use crate::constants::{COLLECTION_ORDER_FIELDS, TOKEN_ORDER_FIELDS};
use crate::domain::{Collection, ListOptions, Token};
use crate::error::{IndexerError, Result};

/// In-memory storage for development and tests.
///
/// Enforces the same uniqueness rules as the SQLite schema and also serves
/// as a checkpoint store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<Mutex<BTreeMap<i64, Collection>>>,
    tokens: Arc<Mutex<BTreeMap<i64, Token>>>,
    checkpoint: Arc<Mutex<Option<i64>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn next_id<T>(map: &BTreeMap<i64, T>) -> i64 {
    map.keys().next_back().map_or(1, |last| last + 1)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CollectionRepo for InMemoryStore {
    async fn create(&self, collection: &mut Collection) -> Result<()> {
        let mut collections = lock(&self.collections);
        if let Some(existing) = collections.values().find(|c| {
            (c.p == collection.p && c.tick == collection.tick)
                || c.inscription_id == collection.inscription_id
                || c.inscription_uid == collection.inscription_uid
        }) {
            return Err(IndexerError::Conflict {
                entity: "collection",
                key: format!("{}/{} ({})", existing.p, existing.tick, existing.inscription_id),
            });
        }
        let id = next_id(&collections);
        let now = Utc::now();
        collection.id = Some(id);
        collection.created_at = now;
        collection.updated_at = now;
        collections.insert(id, collection.clone());

        debug!("Created collection: {} with id {}", collection.tick, id);
        Ok(())
    }

    async fn update(&self, collection: &Collection) -> Result<()> {
        let id = collection.id.ok_or_else(|| IndexerError::MissingField("collection.id".into()))?;
        let mut collections = lock(&self.collections);
        let stored = collections.get_mut(&id).ok_or_else(|| IndexerError::NotFound {
            entity: "collection",
            key: id.to_string(),
        })?;
        let created_at = stored.created_at;
        *stored = collection.clone();
        stored.created_at = created_at;
        stored.updated_at = Utc::now();

        debug!("Updated collection: {} with id {}", collection.tick, id);
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Collection>> {
        Ok(lock(&self.collections).get(&id).cloned())
    }

    async fn find_by_tick(&self, p: &str, tick: &str) -> Result<Option<Collection>> {
        Ok(lock(&self.collections)
            .values()
            .find(|c| c.p == p && c.tick == tick)
            .cloned())
    }

    async fn find_by_inscription_id(&self, inscription_id: i64) -> Result<Option<Collection>> {
        Ok(lock(&self.collections)
            .values()
            .find(|c| c.inscription_id == inscription_id)
            .cloned())
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<Collection>> {
        let mut items: Vec<Collection> = lock(&self.collections)
            .values()
            .filter(|c| c.matches(opts))
            .cloned()
            .collect();
        sort_by_order(&mut items, &order_for(opts, COLLECTION_ORDER_FIELDS));
        Ok(page(items, opts))
    }

    async fn count(&self, opts: &ListOptions) -> Result<usize> {
        Ok(lock(&self.collections)
            .values()
            .filter(|c| c.matches(opts))
            .count())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        lock(&self.collections)
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| IndexerError::NotFound {
                entity: "collection",
                key: id.to_string(),
            })
    }
}

#[async_trait]
impl TokenRepo for InMemoryStore {
    async fn create(&self, token: &mut Token) -> Result<()> {
        let mut tokens = lock(&self.tokens);
        if let Some(existing) = tokens.values().find(|t| {
            t.inscription_id == token.inscription_id
                || t.inscription_uid == token.inscription_uid
                || (t.p == token.p && t.tick == token.tick && t.token_id == token.token_id)
        }) {
            return Err(IndexerError::Conflict {
                entity: "token",
                key: format!("{}/{}#{} ({})", existing.p, existing.tick, existing.token_id, existing.inscription_id),
            });
        }
        let id = next_id(&tokens);
        let now = Utc::now();
        token.id = Some(id);
        token.created_at = now;
        token.updated_at = now;
        tokens.insert(id, token.clone());

        debug!("Created token: {}#{} with id {}", token.tick, token.token_id, id);
        Ok(())
    }

    async fn update(&self, token: &Token) -> Result<()> {
        let id = token.id.ok_or_else(|| IndexerError::MissingField("token.id".into()))?;
        let mut tokens = lock(&self.tokens);
        let stored = tokens.get_mut(&id).ok_or_else(|| IndexerError::NotFound {
            entity: "token",
            key: id.to_string(),
        })?;
        let created_at = stored.created_at;
        *stored = token.clone();
        stored.created_at = created_at;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Token>> {
        Ok(lock(&self.tokens).get(&id).cloned())
    }

    async fn find_by_tick_token_id(&self, p: &str, tick: &str, token_id: u64) -> Result<Option<Token>> {
        Ok(lock(&self.tokens)
            .values()
            .find(|t| t.p == p && t.tick == tick && t.token_id == token_id)
            .cloned())
    }

    async fn find_by_inscription_id(&self, inscription_id: i64) -> Result<Option<Token>> {
        Ok(lock(&self.tokens)
            .values()
            .find(|t| t.inscription_id == inscription_id)
            .cloned())
    }

    async fn find_by_sig_uid(&self, p: &str, tick: &str, uid: &str) -> Result<Option<Token>> {
        Ok(lock(&self.tokens)
            .values()
            .find(|t| {
                t.p == p
                    && t.tick == tick
                    && t.signature.as_ref().and_then(|s| s.uid.as_deref()) == Some(uid)
            })
            .cloned())
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<Token>> {
        let mut items: Vec<Token> = lock(&self.tokens)
            .values()
            .filter(|t| t.matches(opts))
            .cloned()
            .collect();
        sort_by_order(&mut items, &order_for(opts, TOKEN_ORDER_FIELDS));
        Ok(page(items, opts))
    }

    async fn count(&self, opts: &ListOptions) -> Result<usize> {
        Ok(lock(&self.tokens).values().filter(|t| t.matches(opts)).count())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        lock(&self.tokens)
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| IndexerError::NotFound {
                entity: "token",
                key: id.to_string(),
            })
    }
}

impl CheckpointStore for InMemoryStore {
    fn load(&self) -> Result<Option<i64>> {
        Ok(*lock(&self.checkpoint))
    }

    fn save(&self, inscription_id: i64) -> Result<()> {
        let mut checkpoint = lock(&self.checkpoint);
        if checkpoint.map_or(true, |current| inscription_id > current) {
            *checkpoint = Some(inscription_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MintSignatureRecord;

    fn collection(tick: &str, inscription_id: i64) -> Collection {
        Collection {
            id: None,
            p: "brc-721".into(),
            tick: tick.into(),
            max: 10,
            supply: 0,
            base_uri: None,
            name: None,
            description: None,
            image: None,
            attributes: None,
            tx_hash: "tx".into(),
            block_height: 1,
            block_time: Utc::now(),
            address: "bc1p".into(),
            inscription_id,
            inscription_uid: format!("{inscription_id}i0"),
            signature: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn token(tick: &str, token_id: u64, inscription_id: i64) -> Token {
        Token {
            id: None,
            p: "brc-721".into(),
            tick: tick.into(),
            token_id,
            tx_hash: "tx".into(),
            block_height: 1,
            block_time: Utc::now(),
            address: "bc1p".into(),
            inscription_id,
            inscription_uid: format!("{inscription_id}i0"),
            collection_id: 1,
            signature: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_collection_unique_per_tick() {
        let store = InMemoryStore::new();
        let mut a = collection("ape", 100);
        CollectionRepo::create(&store, &mut a).await.unwrap();
        assert_eq!(a.id, Some(1));

        let mut dup = collection("ape", 200);
        let err = CollectionRepo::create(&store, &mut dup).await.unwrap_err();
        assert!(matches!(err, IndexerError::Conflict { entity: "collection", .. }));
        assert_eq!(CollectionRepo::count(&store, &ListOptions::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_token_unique_per_inscription_and_serial() {
        let store = InMemoryStore::new();
        let mut t = token("ape", 1, 101);
        TokenRepo::create(&store, &mut t).await.unwrap();
        assert!(TokenRepo::create(&store, &mut token("ape", 2, 101)).await.is_err());
        assert!(TokenRepo::create(&store, &mut token("ape", 1, 102)).await.is_err());
        TokenRepo::create(&store, &mut token("bee", 1, 103)).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_filters_orders_and_pages() {
        let store = InMemoryStore::new();
        for (tick, id) in [("b", 3), ("a", 1), ("c", 2)] {
            CollectionRepo::create(&store, &mut collection(tick, id)).await.unwrap();
        }
        let opts = ListOptions {
            order: Some("-inscription_id,bogus".into()),
            ..Default::default()
        };
        let ticks: Vec<String> = CollectionRepo::list(&store, &opts)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.tick)
            .collect();
        assert_eq!(ticks, vec!["b", "c", "a"]);

        let opts = ListOptions {
            limit: 1,
            offset: 1,
            order: Some("tick".into()),
            ..Default::default()
        };
        let page = CollectionRepo::list(&store, &opts).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].tick, "b");

        let opts = ListOptions {
            tick: Some("c".into()),
            ..Default::default()
        };
        assert_eq!(CollectionRepo::count(&store, &opts).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_by_sig_uid() {
        let store = InMemoryStore::new();
        let mut t = token("ape", 1, 101);
        t.signature = Some(MintSignatureRecord {
            signature: "00".into(),
            uid: Some("42".into()),
            ..Default::default()
        });
        TokenRepo::create(&store, &mut t).await.unwrap();
        assert!(store.find_by_sig_uid("brc-721", "ape", "42").await.unwrap().is_some());
        assert!(store.find_by_sig_uid("brc-721", "ape", "43").await.unwrap().is_none());
        assert!(store.find_by_sig_uid("brc-721", "bee", "42").await.unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_is_monotonic() {
        let store = InMemoryStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(10).unwrap();
        store.save(5).unwrap();
        assert_eq!(store.load().unwrap(), Some(10));
    }
}
