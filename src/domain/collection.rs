use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A deployed BRC-721 collection, unique per `(p, tick)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Surrogate key assigned by the store on create.
    pub id: Option<i64>,
    pub p: String,
    pub tick: String,
    pub max: u64,
    pub supply: u64,
    pub base_uri: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub attributes: Option<serde_json::Value>,
    pub tx_hash: String,
    pub block_height: u64,
    pub block_time: DateTime<Utc>,
    pub address: String,
    pub inscription_id: i64,
    pub inscription_uid: String,
    pub signature: Option<SignaturePolicy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn is_exhausted(&self) -> bool {
        self.supply >= self.max
    }
}

/// Mint authorization declared at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePolicy {
    /// Hex SEC1 secp256k1 public key.
    pub pub_key: String,
    /// Fields covered by the signature, in signing order.
    pub fields: Vec<SigField>,
}

impl SignaturePolicy {
    /// Mints are only checked when both a key and at least one field are declared.
    pub fn is_enforced(&self) -> bool {
        !self.pub_key.is_empty() && !self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigField {
    #[serde(rename = "rec")]
    Receiver,
    #[serde(rename = "uid")]
    Uid,
    #[serde(rename = "expt")]
    ExpiredTime,
    #[serde(rename = "exph")]
    ExpiredHeight,
}

impl SigField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigField::Receiver => "rec",
            SigField::Uid => "uid",
            SigField::ExpiredTime => "expt",
            SigField::ExpiredHeight => "exph",
        }
    }
}

impl fmt::Display for SigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rec" => Ok(SigField::Receiver),
            "uid" => Ok(SigField::Uid),
            "expt" => Ok(SigField::ExpiredTime),
            "exph" => Ok(SigField::ExpiredHeight),
            other => Err(format!("unknown signature field: {other}")),
        }
    }
}
