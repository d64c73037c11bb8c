use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One minted unit of a collection, created exactly once per inscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: Option<i64>,
    pub p: String,
    pub tick: String,
    /// 1-based serial within the collection.
    pub token_id: u64,
    pub tx_hash: String,
    pub block_height: u64,
    pub block_time: DateTime<Utc>,
    pub address: String,
    pub inscription_id: i64,
    pub inscription_uid: String,
    pub collection_id: i64,
    pub signature: Option<MintSignatureRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The verified signature and the field values it was checked against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintSignatureRecord {
    pub signature: String,
    pub receiver: Option<String>,
    pub uid: Option<String>,
    pub expired_time: Option<i64>,
    pub expired_height: Option<u64>,
}
