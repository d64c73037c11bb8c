//! Protocol messages carried in inscription content and the decoders that recognise them.

pub mod brc721;
pub mod registry;
pub mod signature;

pub use brc721::{DeployMessage, MintMessage, UpdateMessage};
pub use registry::DecoderRegistry;

use crate::constants::{DECODER_RAW, OP_DEPLOY, OP_MINT, OP_UPDATE};

/// Typed payload of an inscription's content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPayload {
    Deploy(DeployMessage),
    Mint(MintMessage),
    Update(UpdateMessage),
    /// Content no decoder accepted, kept verbatim.
    Raw(Vec<u8>),
}

/// Decoded content tagged with the decoder that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentEnvelope {
    pub decoder: &'static str,
    pub payload: ContentPayload,
}

impl ContentEnvelope {
    pub fn raw(bytes: Vec<u8>) -> Self {
        Self {
            decoder: DECODER_RAW,
            payload: ContentPayload::Raw(bytes),
        }
    }

    /// `deploy`, `mint`, `update` or `raw`.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            ContentPayload::Deploy(_) => OP_DEPLOY,
            ContentPayload::Mint(_) => OP_MINT,
            ContentPayload::Update(_) => OP_UPDATE,
            ContentPayload::Raw(_) => DECODER_RAW,
        }
    }
}

/// Structural and semantic checks a decoded message must pass to be accepted.
pub trait Validate {
    fn validate(&self) -> bool;
}

/// A protocol-message decoder.
///
/// `decode` returns the payload and whether it passed validation; a parse
/// error means the bytes are not this message at all.
pub trait ContentDecoder: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, bytes: &[u8]) -> Result<(ContentPayload, bool), serde_json::Error>;
}
