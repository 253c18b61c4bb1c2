//! HMAC-SHA256 actor signatures over the canonical signature payload.
//!
//! The key is the authenticated actor's identity string (e.g. a verified
//! email) supplied by the identity provider.  The core never validates that
//! identity; it only binds it to the block fields.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::block::Block;
use crate::canonical::{self, BlockFields, Encoding};

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Signer trait
// ---------------------------------------------------------------------------

/// Trait boundary for all signer implementations.
pub trait Signer {
    /// Identity the signature is attributed to.  Safe to log.
    fn identity(&self) -> &str;
    /// Hex-encoded signature over `msg`.
    fn sign(&self, msg: &[u8]) -> String;
}

/// Signs with HMAC-SHA256 keyed by the actor identity string.
pub struct IdentitySigner {
    identity: String,
    key: SecretString,
}

impl std::fmt::Debug for IdentitySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySigner")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl IdentitySigner {
    pub fn new(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        let key = SecretString::new(identity.clone().into());
        Self { identity, key }
    }
}

impl Signer for IdentitySigner {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn sign(&self, msg: &[u8]) -> String {
        hmac_hex(msg, self.key.expose_secret())
    }
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

fn mac_for(key: &str) -> HmacSha256 {
    // HMAC is defined for keys of any length, so this cannot fail.
    <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length")
}

/// `HMAC-SHA256(key, msg)` as lowercase hex.
pub fn hmac_hex(msg: &[u8], key: &str) -> String {
    let mut mac = mac_for(key);
    mac.update(msg);
    hex::encode(mac.finalize().into_bytes())
}

/// Recompute the MAC and compare in constant time.  Malformed hex is `false`.
pub fn verify_hmac(msg: &[u8], signature_hex: &str, key: &str) -> bool {
    let Ok(sig) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = mac_for(key);
    mac.update(msg);
    mac.verify_slice(&sig).is_ok()
}

// ---------------------------------------------------------------------------
// Block signatures
// ---------------------------------------------------------------------------

pub fn sign_fields(fields: &BlockFields<'_>, signer: &dyn Signer, encoding: Encoding) -> String {
    signer.sign(&canonical::signature_payload(fields, encoding))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureCheck {
    Valid,
    Invalid,
    Unsigned,
}

/// Check a stored block's signature against a claimed signer key.
pub fn verify_block_signature(block: &Block, signer_key: &str, encoding: Encoding) -> SignatureCheck {
    let Some(ref sig) = block.signature else {
        return SignatureCheck::Unsigned;
    };
    let payload = canonical::signature_payload(&BlockFields::from(block), encoding);
    if verify_hmac(&payload, sig, signer_key) {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}
