//! Canonical block encoding and the block content hash.
//!
//! Two byte layouts exist for the same semantic fields:
//!
//! - **content** (hashed into the next block's `previousHash`):
//!   `caseId, from, to, timestamp, fileHash, previousHash, action`
//! - **signature payload** (HMAC input): the same minus `previousHash`
//!
//! `id`, `signature`, `fileName` and `fileSize` never participate.
//!
//! [`Encoding::LengthPrefixed`] writes a domain tag and then every field as a
//! big-endian `u64` length followed by its UTF-8 bytes, so no two field
//! tuples share an encoding.  [`Encoding::Legacy`] reproduces raw
//! concatenation (content) and `|`-joined fields (signature payload) for
//! chains written before length prefixing; there, callers must keep field
//! values from bleeding across boundaries themselves.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::util;

const CONTENT_TAG: &[u8] = b"trustvault.block.v3";
const SIGNATURE_TAG: &[u8] = b"trustvault.sig.v3";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    #[default]
    LengthPrefixed,
    Legacy,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LengthPrefixed => "length-prefixed",
            Self::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "length-prefixed" => Ok(Self::LengthPrefixed),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown encoding '{other}' (expected length-prefixed|legacy)")),
        }
    }
}

/// Borrowed view over the hashed fields of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFields<'a> {
    pub case_id: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub timestamp: &'a str,
    pub file_hash: &'a str,
    pub previous_hash: &'a str,
    pub action: &'a str,
}

impl<'a> From<&'a Block> for BlockFields<'a> {
    fn from(b: &'a Block) -> Self {
        Self {
            case_id: &b.case_id,
            from: &b.from,
            to: &b.to,
            timestamp: &b.timestamp,
            file_hash: &b.file_hash,
            previous_hash: &b.previous_hash,
            action: &b.action,
        }
    }
}

impl BlockFields<'_> {
    fn content_order(&self) -> [&str; 7] {
        [
            self.case_id,
            self.from,
            self.to,
            self.timestamp,
            self.file_hash,
            self.previous_hash,
            self.action,
        ]
    }

    fn signature_order(&self) -> [&str; 6] {
        [
            self.case_id,
            self.from,
            self.to,
            self.timestamp,
            self.file_hash,
            self.action,
        ]
    }
}

fn length_prefixed(tag: &[u8], fields: &[&str]) -> Vec<u8> {
    const PREFIX: usize = std::mem::size_of::<u64>();
    let body: usize = fields.iter().map(|f| PREFIX + f.len()).sum();
    let mut out = Vec::with_capacity(PREFIX + tag.len() + body);
    push_prefixed(&mut out, tag);
    for f in fields {
        push_prefixed(&mut out, f.as_bytes());
    }
    out
}

// usize never exceeds 64 bits on supported targets, so the prefix is exact.
fn len_prefix(len: usize) -> [u8; 8] {
    (len as u64).to_be_bytes()
}

fn push_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&len_prefix(bytes.len()));
    out.extend_from_slice(bytes);
}

/// Bytes hashed to produce a block's content hash.
pub fn content_bytes(fields: &BlockFields<'_>, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::LengthPrefixed => length_prefixed(CONTENT_TAG, &fields.content_order()),
        Encoding::Legacy => fields.content_order().concat().into_bytes(),
    }
}

/// Bytes the signer authenticates.
pub fn signature_payload(fields: &BlockFields<'_>, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::LengthPrefixed => length_prefixed(SIGNATURE_TAG, &fields.signature_order()),
        Encoding::Legacy => fields.signature_order().join("|").into_bytes(),
    }
}

/// SHA-256 content hash of a block, lowercase hex.
pub fn hash_fields(fields: &BlockFields<'_>, encoding: Encoding) -> String {
    util::sha256_hex(&content_bytes(fields, encoding))
}

pub fn block_hash(block: &Block, encoding: Encoding) -> String {
    hash_fields(&BlockFields::from(block), encoding)
}
