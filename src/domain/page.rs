use super::inscription::{InscriptionRecord, InscriptionsListing};
use crate::protocol::ContentEnvelope;

/// A logical explorer page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Inscription { uid: String },
    Content { uid: String },
    /// `None` means the most recent listing page.
    Inscriptions { cursor: Option<i64> },
}

impl Page {
    pub fn url(&self) -> String {
        match self {
            Page::Inscription { uid } => format!("/inscription/{uid}"),
            Page::Content { uid } => format!("/content/{uid}"),
            Page::Inscriptions { cursor: None } => "/inscriptions".to_string(),
            Page::Inscriptions { cursor: Some(c) } => format!("/inscriptions/{c}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Page::Inscription { .. } => "inscription",
            Page::Content { .. } => "content",
            Page::Inscriptions { .. } => "inscriptions",
        }
    }
}

/// Parsed result of a [`Page`], one variant per page kind.
#[derive(Debug, Clone)]
pub enum PageRecord {
    Inscription(InscriptionRecord),
    Content(ContentEnvelope),
    Inscriptions(InscriptionsListing),
}
