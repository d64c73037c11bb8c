use async_trait::async_trait;

use crate::domain::{
    Collection, InscriptionRecord, InscriptionsListing, ListOptions, Page, PageRecord, Token,
};
use crate::error::{IndexerError, Result};
use crate::protocol::ContentEnvelope;

// Fetch-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpGetResult>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub content_length: u64,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Turns an explorer page into a typed record. Retries are the caller's concern.
#[async_trait]
pub trait PageParser: Send + Sync {
    async fn parse(&self, page: &Page) -> Result<PageRecord>;

    async fn inscription(&self, uid: &str) -> Result<InscriptionRecord> {
        let page = Page::Inscription {
            uid: uid.to_string(),
        };
        match self.parse(&page).await? {
            PageRecord::Inscription(record) => Ok(record),
            _ => Err(IndexerError::page(page.url(), "expected an inscription record")),
        }
    }

    async fn content(&self, uid: &str) -> Result<ContentEnvelope> {
        let page = Page::Content {
            uid: uid.to_string(),
        };
        match self.parse(&page).await? {
            PageRecord::Content(envelope) => Ok(envelope),
            _ => Err(IndexerError::page(page.url(), "expected a content record")),
        }
    }

    async fn inscriptions(&self, cursor: Option<i64>) -> Result<InscriptionsListing> {
        let page = Page::Inscriptions { cursor };
        match self.parse(&page).await? {
            PageRecord::Inscriptions(listing) => Ok(listing),
            _ => Err(IndexerError::page(page.url(), "expected an inscriptions listing")),
        }
    }
}

// Storage-side ports. Implementations must tolerate concurrent callers since the
// read API shares them with the indexer.
#[async_trait]
pub trait CollectionRepo: Send + Sync {
    /// Insert and assign `collection.id`; `Conflict` on a duplicate `(p, tick)` or inscription.
    async fn create(&self, collection: &mut Collection) -> Result<()>;
    async fn update(&self, collection: &Collection) -> Result<()>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Collection>>;
    async fn find_by_tick(&self, p: &str, tick: &str) -> Result<Option<Collection>>;
    async fn find_by_inscription_id(&self, inscription_id: i64) -> Result<Option<Collection>>;
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Collection>>;
    async fn count(&self, opts: &ListOptions) -> Result<usize>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait TokenRepo: Send + Sync {
    /// Insert and assign `token.id`; `Conflict` on a duplicate inscription or serial.
    async fn create(&self, token: &mut Token) -> Result<()>;
    async fn update(&self, token: &Token) -> Result<()>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Token>>;
    async fn find_by_tick_token_id(&self, p: &str, tick: &str, token_id: u64) -> Result<Option<Token>>;
    async fn find_by_inscription_id(&self, inscription_id: i64) -> Result<Option<Token>>;
    /// Token whose mint signature carried `uid`, if any.
    async fn find_by_sig_uid(&self, p: &str, tick: &str, uid: &str) -> Result<Option<Token>>;
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Token>>;
    async fn count(&self, opts: &ListOptions) -> Result<usize>;
    async fn delete(&self, id: i64) -> Result<()>;
}

/// Highest inscription id whose transitions are durably applied.
pub trait CheckpointStore: Send + Sync {
    fn load(&self) -> Result<Option<i64>>;
    /// Writes that do not advance the stored value are ignored.
    fn save(&self, inscription_id: i64) -> Result<()>;
}
