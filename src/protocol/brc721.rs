use serde::{Deserialize, Serialize};

use super::{ContentDecoder, ContentPayload, Validate};
use crate::constants::{
    DECODER_BRC721_DEPLOY, DECODER_BRC721_MINT, DECODER_BRC721_UPDATE, OP_DEPLOY, OP_MINT,
    OP_UPDATE, PROTOCOL_BRC721,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub attributes: Vec<serde_json::Value>,
}

/// Signature policy as written in a deploy message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySig {
    #[serde(default)]
    pub pk: String,
    /// Raw field names; checked against the known set when the deploy is applied.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Signature attached to a mint message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintSig {
    #[serde(default)]
    pub s: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exph: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployMessage {
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub tick: String,
    #[serde(default)]
    pub max: String,
    #[serde(default, rename = "buri", skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<CollectionMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<DeploySig>,
}

impl Validate for DeployMessage {
    fn validate(&self) -> bool {
        self.p == PROTOCOL_BRC721
            && self.op == OP_DEPLOY
            && !self.tick.is_empty()
            && !self.max.is_empty()
            && (self.base_uri.is_some() || self.meta.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MintMessage {
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub tick: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<MintSig>,
}

impl Validate for MintMessage {
    fn validate(&self) -> bool {
        self.p == PROTOCOL_BRC721 && self.op == OP_MINT && !self.tick.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub tick: String,
    #[serde(default, rename = "buri", skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<String>,
}

impl Validate for UpdateMessage {
    fn validate(&self) -> bool {
        self.p == PROTOCOL_BRC721
            && self.op == OP_UPDATE
            && !self.tick.is_empty()
            && self.base_uri.is_some()
    }
}

pub struct DeployDecoder;
pub struct MintDecoder;
pub struct UpdateDecoder;

impl ContentDecoder for DeployDecoder {
    fn name(&self) -> &'static str {
        DECODER_BRC721_DEPLOY
    }

    fn decode(&self, bytes: &[u8]) -> Result<(ContentPayload, bool), serde_json::Error> {
        let msg: DeployMessage = serde_json::from_slice(bytes)?;
        let valid = msg.validate();
        Ok((ContentPayload::Deploy(msg), valid))
    }
}

impl ContentDecoder for MintDecoder {
    fn name(&self) -> &'static str {
        DECODER_BRC721_MINT
    }

    fn decode(&self, bytes: &[u8]) -> Result<(ContentPayload, bool), serde_json::Error> {
        let msg: MintMessage = serde_json::from_slice(bytes)?;
        let valid = msg.validate();
        Ok((ContentPayload::Mint(msg), valid))
    }
}

impl ContentDecoder for UpdateDecoder {
    fn name(&self) -> &'static str {
        DECODER_BRC721_UPDATE
    }

    fn decode(&self, bytes: &[u8]) -> Result<(ContentPayload, bool), serde_json::Error> {
        let msg: UpdateMessage = serde_json::from_slice(bytes)?;
        let valid = msg.validate();
        Ok((ContentPayload::Update(msg), valid))
    }
}
