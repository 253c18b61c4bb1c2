use proptest::prelude::*;

use trustvault_core::{
    block::{Block, BlockDraft},
    builder::ChainBuilder,
    canonical::Encoding,
    signing::{hmac_hex, verify_hmac},
    verify::{verify_chain, FindingKind},
};

fn build_chain(n: usize, encoding: Encoding) -> Vec<Block> {
    let builder = ChainBuilder::new(encoding);
    let holders = ["Police", "Lab", "Hospital", "Court"];
    let mut chain: Vec<Block> = Vec::with_capacity(n);
    for i in 0..n {
        let draft = BlockDraft::new(
            "CASE-PROP",
            holders[i % holders.len()],
            holders[(i + 1) % holders.len()],
            format!("Transferred to {}", holders[(i + 1) % holders.len()]),
            "abc123",
        );
        let b = builder.build_at(chain.last(), draft, None, format!("2024-01-01T00:00:{:02}Z", i % 60));
        chain.push(b);
    }
    chain
}

fn encodings() -> impl Strategy<Value = Encoding> {
    prop_oneof![Just(Encoding::LengthPrefixed), Just(Encoding::Legacy)]
}

proptest! {
    #[test]
    fn builder_chains_always_verify(n in 0usize..24, enc in encodings()) {
        let chain = build_chain(n, enc);
        let report = verify_chain(&chain, enc);
        prop_assert!(report.valid);
        prop_assert!(report.findings.is_empty());
        prop_assert_eq!(report.block_count, n);
    }

    #[test]
    fn single_field_edit_breaks_next_link_only(
        n in 2usize..20,
        k_seed in any::<usize>(),
        field in 0usize..4,
        suffix in "[a-z0-9]{1,8}",
        enc in encodings(),
    ) {
        let mut chain = build_chain(n, enc);
        let k = k_seed % (n - 1);
        let target = &mut chain[k];
        match field {
            0 => target.timestamp.push_str(&suffix),
            1 => target.action.push_str(&suffix),
            2 => target.file_hash.push_str(&suffix),
            _ => target.to.push_str(&suffix),
        }

        let report = verify_chain(&chain, enc);
        prop_assert!(!report.valid);
        prop_assert_eq!(report.first_break(), Some(k + 1));
        prop_assert!(report.findings.iter().all(|f| f.index > k));
        prop_assert_eq!(report.findings[0].kind, FindingKind::Linkage);
    }

    #[test]
    fn genesis_edit_reported_at_zero(n in 1usize..12, bogus in "[0-9a-f]{1,64}", enc in encodings()) {
        prop_assume!(bogus != "0");
        let mut chain = build_chain(n, enc);
        chain[0].previous_hash = bogus;
        let report = verify_chain(&chain, enc);
        prop_assert_eq!(report.findings[0].index, 0);
        prop_assert_eq!(report.findings[0].kind, FindingKind::Genesis);
    }

    #[test]
    fn hmac_verifies_only_under_signing_key(
        msg in proptest::collection::vec(any::<u8>(), 0..256),
        key in "[a-z]{1,12}@trustvault\\.com",
        other in "[a-z]{1,12}@trustvault\\.com",
    ) {
        let sig = hmac_hex(&msg, &key);
        prop_assert_eq!(&sig, &hmac_hex(&msg, &key));
        prop_assert!(verify_hmac(&msg, &sig, &key));
        prop_assert_eq!(verify_hmac(&msg, &sig, &other), key == other);
    }
}
