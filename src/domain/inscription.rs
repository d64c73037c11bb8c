use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of one inscription as rendered by the explorer's inscription page.
///
/// `id` orders inscriptions by creation but is not contiguous; `uid` is the
/// content-addressed identifier used in explorer URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InscriptionRecord {
    pub id: i64,
    pub uid: String,
    pub address: String,
    pub output_value: u64,
    pub content_length: u64,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
    pub genesis_height: u64,
    pub genesis_fee: u64,
    pub genesis_tx: String,
    pub location: String,
    pub output: String,
    pub offset: u64,
}

/// One page of the inscriptions listing, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InscriptionsListing {
    pub uids: Vec<String>,
    /// Cursor of the page holding newer inscriptions.
    pub next_id: Option<i64>,
    /// Cursor of the page holding older inscriptions.
    pub prev_id: Option<i64>,
}

impl InscriptionsListing {
    /// UIDs in ascending inscription order with duplicates removed.
    pub fn ascending_uids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.uids
            .iter()
            .rev()
            .filter(|uid| seen.insert(uid.as_str()))
            .cloned()
            .collect()
    }
}
