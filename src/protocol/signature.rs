//! Mint authorization: secp256k1 ECDSA over a canonical `key=value` message.
//!
//! A deploy may declare a public key plus the ordered list of fields a mint must
//! sign. A mint signs `p=<p>&tick=<tick>&<field>=<value>...` with the values taken
//! from the mint itself (`uid`, `expt`, `exph`) or from its inscription (`rec`).

use chrono::{DateTime, Utc};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use std::collections::HashSet;

use super::brc721::{DeploySig, MintSig};
use crate::domain::{MintSignatureRecord, SigField, SignaturePolicy};

pub fn parse_public_key(pub_key: &str) -> Result<VerifyingKey, String> {
    let bytes = hex::decode(pub_key.trim()).map_err(|e| format!("public key is not hex: {e}"))?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|e| format!("invalid public key: {e}"))
}

/// Accepts the 64-byte `r||s` form, falling back to DER.
pub fn parse_signature(sig: &str) -> Option<Signature> {
    let bytes = hex::decode(sig.trim()).ok()?;
    let sig = Signature::from_slice(&bytes)
        .or_else(|_| Signature::from_der(&bytes))
        .ok()?;
    Some(sig.normalize_s().unwrap_or(sig))
}

/// Turn a deploy's `sig` object into a stored policy.
///
/// An empty key yields an unenforced policy. A key that does not parse, an
/// unknown field name or a repeated field rejects the deploy.
pub fn policy_from_deploy(sig: &DeploySig) -> Result<SignaturePolicy, String> {
    if !sig.pk.is_empty() {
        parse_public_key(&sig.pk)?;
    }
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(sig.fields.len());
    for name in &sig.fields {
        let field: SigField = name.parse()?;
        if !seen.insert(field) {
            return Err(format!("duplicate signature field: {name}"));
        }
        fields.push(field);
    }
    Ok(SignaturePolicy {
        pub_key: sig.pk.trim().to_string(),
        fields,
    })
}

pub fn canonical_message(p: &str, tick: &str, values: &[(SigField, String)]) -> String {
    let mut message = format!("p={p}&tick={tick}");
    for (field, value) in values {
        message.push('&');
        message.push_str(field.as_str());
        message.push('=');
        message.push_str(value);
    }
    message
}

/// What a mint is checked against besides its own signature object.
#[derive(Debug, Clone, Copy)]
pub struct MintContext<'a> {
    pub receiver: &'a str,
    pub timestamp: DateTime<Utc>,
    pub genesis_height: u64,
}

/// Field values resolved for one mint, ready to verify.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMint {
    pub message: String,
    pub record: MintSignatureRecord,
}

/// Resolve every field the policy requires.
///
/// `Err` carries the reason the mint is rejected; the `uid` uniqueness check
/// needs the token store and is left to the caller.
pub fn resolve_fields(
    policy: &SignaturePolicy,
    p: &str,
    tick: &str,
    sig: &MintSig,
    ctx: MintContext<'_>,
) -> Result<ResolvedMint, String> {
    let mut record = MintSignatureRecord {
        signature: sig.s.clone(),
        ..Default::default()
    };
    let mut values = Vec::with_capacity(policy.fields.len());
    for field in &policy.fields {
        let value = match field {
            SigField::Receiver => {
                record.receiver = Some(ctx.receiver.to_string());
                ctx.receiver.to_string()
            }
            SigField::Uid => {
                let uid = sig
                    .uid
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or("mint signature has no uid")?;
                record.uid = Some(uid.to_string());
                uid.to_string()
            }
            SigField::ExpiredTime => {
                let expt = sig.expt.ok_or("mint signature has no expiry time")?;
                if ctx.timestamp.timestamp() >= expt {
                    return Err(format!("mint signature expired at {expt}"));
                }
                record.expired_time = Some(expt);
                expt.to_string()
            }
            SigField::ExpiredHeight => {
                let exph = sig.exph.ok_or("mint signature has no expiry height")?;
                if ctx.genesis_height >= exph {
                    return Err(format!("mint signature expired at height {exph}"));
                }
                record.expired_height = Some(exph);
                exph.to_string()
            }
        };
        values.push((*field, value));
    }
    Ok(ResolvedMint {
        message: canonical_message(p, tick, &values),
        record,
    })
}

pub fn verify(key: &VerifyingKey, message: &str, sig: &str) -> bool {
    match parse_signature(sig) {
        Some(signature) => key.verify(message.as_bytes(), &signature).is_ok(),
        None => false,
    }
}

/// Hex `r||s` signature of `message`; the counterpart of [`verify`].
pub fn sign(key: &SigningKey, message: &str) -> String {
    let signature: Signature = key.sign(message.as_bytes());
    hex::encode(signature.to_bytes())
}

/// Hex compressed SEC1 encoding of the key's public half.
pub fn public_key_hex(key: &SigningKey) -> String {
    hex::encode(key.verifying_key().to_sec1_bytes())
}
