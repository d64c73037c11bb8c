/// Protocol and storage constants shared across the indexer.
// Protocol id carried in the `p` field of every BRC-721 message
pub const PROTOCOL_BRC721: &str = "brc-721";

// Operations carried in the `op` field
pub const OP_DEPLOY: &str = "deploy";
pub const OP_MINT: &str = "mint";
pub const OP_UPDATE: &str = "update";

// Decoder names, also used as the envelope tag in logs and metrics
pub const DECODER_BRC721_DEPLOY: &str = "brc-721-deploy";
pub const DECODER_BRC721_MINT: &str = "brc-721-mint";
pub const DECODER_BRC721_UPDATE: &str = "brc-721-update";
pub const DECODER_RAW: &str = "raw";

// Durable crawl marker, relative to the data root
pub const CHECKPOINT_FILE: &str = ".last_inscription_id";

// ORDER BY whitelists; anything else is dropped from the clause
pub const COLLECTION_ORDER_FIELDS: &[&str] = &[
    "id",
    "created_at",
    "p",
    "tick",
    "block_height",
    "block_time",
    "inscription_id",
];
pub const TOKEN_ORDER_FIELDS: &[&str] = &[
    "id",
    "created_at",
    "p",
    "tick",
    "token_id",
    "block_height",
    "block_time",
    "inscription_id",
];

// Read API paging
pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Explorer timestamp format, e.g. "2023-05-09 07:13:59 UTC"
pub const EXPLORER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
