//! Constructs the next block of a case chain.
//!
//! The builder never persists anything.  It links a draft to the chain's
//! current tail, stamps id and timestamp, and signs when a signer is given.

use tracing::debug;

use crate::block::{Block, BlockDraft, GENESIS_PREV_HASH};
use crate::canonical::{self, BlockFields, Encoding};
use crate::error::Result;
use crate::signing::{self, Signer};
use crate::store::BlockStore;
use crate::util;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChainBuilder {
    encoding: Encoding,
}

impl ChainBuilder {
    pub fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Look up the case tail in `store` and build the block that follows it.
    ///
    /// A store failure is returned as an error.  Only a successful lookup that
    /// finds nothing produces a genesis block.
    pub fn next_block<S: BlockStore + ?Sized>(
        &self,
        store: &S,
        draft: BlockDraft,
        signer: Option<&dyn Signer>,
    ) -> Result<Block> {
        let last = store.last_block(&draft.case_id)?;
        Ok(self.build_after(last.as_ref(), draft, signer))
    }

    /// Build the block following `last` (or a genesis block when `None`).
    pub fn build_after(
        &self,
        last: Option<&Block>,
        draft: BlockDraft,
        signer: Option<&dyn Signer>,
    ) -> Block {
        self.build_at(last, draft, signer, util::now_utc_rfc3339())
    }

    /// Same as [`Self::build_after`] with a caller-chosen timestamp.
    pub fn build_at(
        &self,
        last: Option<&Block>,
        draft: BlockDraft,
        signer: Option<&dyn Signer>,
        timestamp: String,
    ) -> Block {
        let previous_hash = match last {
            Some(prev) => canonical::block_hash(prev, self.encoding),
            None => GENESIS_PREV_HASH.to_string(),
        };

        let signature = signer.map(|s| {
            let fields = BlockFields {
                case_id: &draft.case_id,
                from: &draft.from,
                to: &draft.to,
                timestamp: &timestamp,
                file_hash: &draft.file_hash,
                previous_hash: &previous_hash,
                action: &draft.action,
            };
            signing::sign_fields(&fields, s, self.encoding)
        });

        let block = Block {
            id: util::new_block_id(),
            case_id: draft.case_id,
            from: draft.from,
            to: draft.to,
            timestamp,
            file_hash: draft.file_hash,
            previous_hash,
            action: draft.action,
            file_name: draft.file_name,
            file_size: draft.file_size,
            signature,
        };
        debug!(
            case_id = %block.case_id,
            block_id = %block.id,
            genesis = block.is_genesis_link(),
            signed = block.signature.is_some(),
            "built block"
        );
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CustodyError;
    use crate::signing::{verify_block_signature, IdentitySigner, SignatureCheck};
    use crate::store::MemoryStore;

    fn draft(action: &str) -> BlockDraft {
        BlockDraft::new("C1", "Police", "Lab", action, "abc123")
    }

    #[test]
    fn first_block_is_genesis() {
        let b = ChainBuilder::default().build_after(None, draft("Case Created"), None);
        assert_eq!(b.previous_hash, "0");
        assert!(b.signature.is_none());
        assert!(!b.id.is_empty());
        assert!(!b.timestamp.is_empty());
    }

    #[test]
    fn next_block_links_to_hash_of_tail() {
        let builder = ChainBuilder::new(Encoding::Legacy);
        let b0 = builder.build_after(None, draft("Case Created"), None);
        let b1 = builder.build_after(Some(&b0), draft("Transferred to Lab"), None);
        assert_eq!(b1.previous_hash, canonical::block_hash(&b0, Encoding::Legacy));
        assert_ne!(b0.id, b1.id);
    }

    #[test]
    fn signed_block_verifies_under_signer_key_only() {
        let signer = IdentitySigner::new("police@trustvault.com");
        let builder = ChainBuilder::default();
        let b = builder.build_after(None, draft("Case Created"), Some(&signer));
        assert_eq!(
            verify_block_signature(&b, "police@trustvault.com", builder.encoding()),
            SignatureCheck::Valid
        );
        assert_eq!(
            verify_block_signature(&b, "lab@trustvault.com", builder.encoding()),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn signature_does_not_cover_previous_hash() {
        let signer = IdentitySigner::new("lab@trustvault.com");
        let builder = ChainBuilder::default();
        let ts = "2024-05-01T10:00:00Z".to_string();
        let genesis = builder.build_at(None, draft("Case Created"), Some(&signer), ts.clone());
        let linked = builder.build_at(Some(&genesis), draft("Case Created"), Some(&signer), ts);
        assert_ne!(genesis.previous_hash, linked.previous_hash);
        assert_eq!(genesis.signature, linked.signature);
    }

    #[test]
    fn next_block_reads_tail_from_store() {
        let store = MemoryStore::new();
        let builder = ChainBuilder::default();
        let b0 = builder.next_block(&store, draft("Case Created"), None).unwrap();
        assert!(b0.is_genesis_link());
        store.append_block(&b0).unwrap();
        let b1 = builder.next_block(&store, draft("Transferred to Lab"), None).unwrap();
        assert_eq!(b1.previous_hash, canonical::block_hash(&b0, builder.encoding()));
    }

    #[test]
    fn store_outage_is_not_treated_as_genesis() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = ChainBuilder::default()
            .next_block(&store, draft("Transferred to Lab"), None)
            .unwrap_err();
        assert!(matches!(err, CustodyError::Store(_)));
    }
}
