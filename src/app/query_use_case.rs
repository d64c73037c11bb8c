use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::app::ports::{CollectionRepo, PageParser, TokenRepo};
use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, PROTOCOL_BRC721};
use crate::domain::{Collection, InscriptionRecord, ListOptions, Token};
use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct Paging {
    pub total_count: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing<T> {
    pub data: Vec<T>,
    pub paging: Paging,
}

/// One listing page of inscriptions fetched live from the explorer.
#[derive(Debug, Clone, Serialize)]
pub struct InscriptionsPage {
    pub data: Vec<InscriptionRecord>,
    pub prev_id: Option<i64>,
    pub next_id: Option<i64>,
}

/// Read side shared by the API: stored collections/tokens plus live explorer lookups.
pub struct QueryUseCase {
    collections: Arc<dyn CollectionRepo>,
    tokens: Arc<dyn TokenRepo>,
    parser: Arc<dyn PageParser>,
}

fn protocol(p: Option<&str>) -> &str {
    p.filter(|p| !p.is_empty()).unwrap_or(PROTOCOL_BRC721)
}

/// Clamp paging to `1..=MAX_PAGE_LIMIT`, defaulting an unset limit.
pub fn normalize_options(mut opts: ListOptions) -> ListOptions {
    opts.limit = match opts.limit {
        0 => DEFAULT_PAGE_LIMIT,
        n => n.min(MAX_PAGE_LIMIT),
    };
    opts.p = opts.p.filter(|p| !p.is_empty());
    opts.tick = opts.tick.filter(|t| !t.is_empty());
    opts
}

impl QueryUseCase {
    pub fn new(
        collections: Arc<dyn CollectionRepo>,
        tokens: Arc<dyn TokenRepo>,
        parser: Arc<dyn PageParser>,
    ) -> Self {
        Self {
            collections,
            tokens,
            parser,
        }
    }

    pub async fn get_collection(&self, p: Option<&str>, tick: &str) -> Result<Collection> {
        let p = protocol(p);
        self.collections
            .find_by_tick(p, tick)
            .await?
            .ok_or_else(|| IndexerError::NotFound {
                entity: "collection",
                key: format!("{p}/{tick}"),
            })
    }

    pub async fn get_inscription_collection(&self, inscription_id: i64) -> Result<Collection> {
        self.collections
            .find_by_inscription_id(inscription_id)
            .await?
            .ok_or_else(|| IndexerError::NotFound {
                entity: "collection",
                key: format!("inscription {inscription_id}"),
            })
    }

    pub async fn list_collections(&self, opts: ListOptions) -> Result<Listing<Collection>> {
        let opts = normalize_options(opts);
        let data = self.collections.list(&opts).await?;
        let total_count = self.collections.count(&opts).await?;
        debug!("listed {} of {} collections", data.len(), total_count);
        Ok(Listing {
            paging: Paging {
                total_count,
                count: data.len(),
            },
            data,
        })
    }

    pub async fn get_token(&self, p: Option<&str>, tick: &str, token_id: u64) -> Result<Token> {
        let p = protocol(p);
        self.tokens
            .find_by_tick_token_id(p, tick, token_id)
            .await?
            .ok_or_else(|| IndexerError::NotFound {
                entity: "token",
                key: format!("{p}/{tick}#{token_id}"),
            })
    }

    pub async fn get_inscription_token(&self, inscription_id: i64) -> Result<Token> {
        self.tokens
            .find_by_inscription_id(inscription_id)
            .await?
            .ok_or_else(|| IndexerError::NotFound {
                entity: "token",
                key: format!("inscription {inscription_id}"),
            })
    }

    pub async fn list_tokens(&self, opts: ListOptions) -> Result<Listing<Token>> {
        let opts = normalize_options(opts);
        let data = self.tokens.list(&opts).await?;
        let total_count = self.tokens.count(&opts).await?;
        Ok(Listing {
            paging: Paging {
                total_count,
                count: data.len(),
            },
            data,
        })
    }

    pub async fn get_inscription(&self, uid: &str) -> Result<InscriptionRecord> {
        self.parser.inscription(uid).await
    }

    /// Fetch a listing page and every inscription on it, newest first as listed.
    pub async fn list_inscriptions(&self, cursor: Option<i64>) -> Result<InscriptionsPage> {
        let listing = self.parser.inscriptions(cursor).await?;
        let mut data = Vec::with_capacity(listing.uids.len());
        for uid in &listing.uids {
            data.push(self.parser.inscription(uid).await?);
        }
        Ok(InscriptionsPage {
            data,
            prev_id: listing.prev_id,
            next_id: listing.next_id,
        })
    }
}
