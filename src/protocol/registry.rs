use tracing::trace;

use super::brc721::{DeployDecoder, MintDecoder, UpdateDecoder};
use super::{ContentDecoder, ContentEnvelope};

/// Ordered list of content decoders; the first decoder that parses and validates wins.
///
/// Built once at startup and shared read-only (behind an `Arc`) by the workers.
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn ContentDecoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_brc721()
    }
}

impl DecoderRegistry {
    /// An empty registry; everything decodes as raw.
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Registry with the BRC-721 deploy, mint and update decoders, in that order.
    pub fn with_brc721() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DeployDecoder));
        registry.register(Box::new(MintDecoder));
        registry.register(Box::new(UpdateDecoder));
        registry
    }

    /// Append a decoder; it is tried after every decoder registered before it.
    pub fn register(&mut self, decoder: Box<dyn ContentDecoder>) {
        self.decoders.push(decoder);
    }

    pub fn decode(&self, bytes: &[u8]) -> ContentEnvelope {
        for decoder in &self.decoders {
            match decoder.decode(bytes) {
                Ok((payload, true)) => {
                    return ContentEnvelope {
                        decoder: decoder.name(),
                        payload,
                    }
                }
                Ok((_, false)) => trace!("decoder {} rejected content", decoder.name()),
                Err(e) => trace!("decoder {} could not parse content: {}", decoder.name(), e),
            }
        }
        ContentEnvelope::raw(bytes.to_vec())
    }

    /// Registered decoder names in match order.
    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }
}
