//! Property-based tests for cairn-core using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use cairn_core::{
    satisfies, verify_chain, Action, Argument, Consistency, Darc, Direction, Expr, Identity, InstanceId,
    Instruction, Leaf, Nonce, Point, ProofOutcome, Scalar, SignatureScheme, Signer, StateTrie,
    BlockHeader, RULE_EVOLVE,
};
use proptest::prelude::*;

const POOL: usize = 5;

/// Fixed identities so strategies can refer to them by index
fn pool() -> Vec<Identity> {
    (1..=POOL as u64)
        .map(|i| Identity::ecdsa(Point::mul_base(&Scalar::from_u64(i))))
        .collect()
}

// ============================================
// Arbitrary Implementations
// ============================================

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = (0..POOL).prop_map(|i| Expr::Id(pool()[i]));
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Expr::And),
            prop::collection::vec(inner, 0..4).prop_map(Expr::Or),
        ]
    })
}

fn arb_flags() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), POOL)
}

fn arb_action() -> impl Strategy<Value = Action> {
    let args = prop::collection::vec(
        ("[a-z]{1,8}", prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(name, value)| Argument::new(&name, value)),
        0..4,
    );
    prop_oneof![
        ("[a-zA-Z]{1,12}", args.clone())
            .prop_map(|(contract_id, args)| Action::Spawn { contract_id, args }),
        ("[a-zA-Z]{1,12}", "[a-z]{1,12}", args).prop_map(|(contract_id, command, args)| {
            Action::Invoke {
                contract_id,
                command,
                args,
            }
        }),
        "[a-zA-Z]{1,12}".prop_map(|contract_id| Action::Delete { contract_id }),
    ]
}

fn arb_instruction() -> impl Strategy<Value = Instruction> {
    (any::<[u8; 32]>(), any::<[u8; 32]>(), 0u32..8, arb_action()).prop_map(
        |(id, nonce, index, action)| {
            Instruction::with_nonce(InstanceId::new(id), Nonce::new(nonce), action, index, index + 1)
        },
    )
}

fn darc_with(expr: Expr) -> Darc {
    let mut darc = Darc::genesis(&[], &[], b"prop");
    darc.update_rule(RULE_EVOLVE, expr).unwrap();
    darc
}

// ============================================
// Authorization
// ============================================

proptest! {
    #[test]
    fn prop_satisfies_is_monotonic(expr in arb_expr(), flags in arb_flags(), extra in 0..POOL) {
        let ids = pool();
        let darc = darc_with(expr);
        let before = satisfies(&darc, RULE_EVOLVE, &ids, &flags);

        let mut more = flags.clone();
        more[extra] = true;
        let after = satisfies(&darc, RULE_EVOLVE, &ids, &more);
        prop_assert!(!before || after);
    }

    #[test]
    fn prop_and_or_semantics(a in 0..POOL, b in 0..POOL, flags in arb_flags()) {
        let ids = pool();
        let both = flags[a] && flags[b];
        let either = flags[a] || flags[b];
        let and = darc_with(Expr::all_of(vec![ids[a], ids[b]]));
        let or = darc_with(Expr::any_of(vec![ids[a], ids[b]]));
        prop_assert_eq!(satisfies(&and, RULE_EVOLVE, &ids, &flags), both);
        prop_assert_eq!(satisfies(&or, RULE_EVOLVE, &ids, &flags), either);
    }

    #[test]
    fn prop_unpresented_identity_never_counts(expr in arb_expr()) {
        let darc = darc_with(expr);
        prop_assert!(!satisfies(&darc, RULE_EVOLVE, &[], &[]));
    }

    #[test]
    fn prop_expression_text_preserves_meaning(expr in arb_expr(), flags in arb_flags()) {
        let ids = pool();
        let parsed: Expr = expr.to_string().parse().unwrap();
        let verified = |id: &Identity| ids.iter().zip(&flags).any(|(i, f)| *f && i == id);
        prop_assert_eq!(parsed.eval(&verified), expr.eval(&verified));
    }
}

// ============================================
// Darc Chains
// ============================================

proptest! {
    #[test]
    fn prop_darc_chain_is_one_way(len in 2usize..8, drop in 1usize..7) {
        let mut versions = vec![Darc::genesis(&pool()[..1], &pool()[..1], b"chain")];
        for _ in 1..len {
            let next = versions.last().unwrap().next_version().unwrap();
            versions.push(next);
        }
        prop_assert!(verify_chain(&versions).is_ok());
        for pair in versions.windows(2) {
            prop_assert_eq!(pair[1].previous_id(), Some(pair[0].id()));
            prop_assert_eq!(pair[1].version(), pair[0].version() + 1);
        }

        let drop = drop % len;
        if drop > 0 && drop < len - 1 {
            let mut gapped = versions.clone();
            gapped.remove(drop);
            prop_assert!(verify_chain(&gapped).is_err());
        }
    }
}

// ============================================
// Instructions
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_hash_excludes_signatures(
        instr in arb_instruction(),
        sigs in prop::collection::vec((0..POOL, prop::collection::vec(any::<u8>(), 0..72)), 0..4),
    ) {
        let ids = pool();
        let mut signed = instr.clone();
        for (i, sig) in sigs {
            signed.attach_signature(ids[i], sig);
        }
        prop_assert_eq!(signed.hash(), instr.hash());
    }

    #[test]
    fn prop_signature_over_hash_verifies(instr in arb_instruction(), schnorr in any::<bool>()) {
        let scheme = if schnorr { SignatureScheme::Schnorr } else { SignatureScheme::Ecdsa };
        let signer = Signer::generate(scheme);
        let mut signed = instr;
        signed.sign_by(&[&signer]).unwrap();
        let (identity, sig) = &signed.signatures[0];
        prop_assert!(identity.verify(signed.hash().as_bytes(), sig));
    }
}

// ============================================
// Proofs
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_proof_roundtrip_and_tamper(
        keys in prop::collection::btree_set(prop::collection::vec(any::<u8>(), 1..16), 1..6),
        step in 0usize..256,
        bit in 0u8..8,
        byte in 0usize..32,
    ) {
        let keys: Vec<Vec<u8>> = keys.into_iter().collect();
        let mut trie = StateTrie::new();
        for key in &keys {
            trie.insert(key, vec![key.clone(), b"value".to_vec()]);
        }
        let header = BlockHeader::genesis(trie.root(), 7);
        let head = header.id();
        let key = &keys[0];
        let proof = trie.prove(key, Consistency::at_head(header));

        prop_assert_eq!(
            proof.verify(key, &head),
            ProofOutcome::Included(vec![key.clone(), b"value".to_vec()])
        );

        let mut sibling = proof.clone();
        sibling.path[step].sibling.0[byte] ^= 1 << bit;
        prop_assert!(!sibling.verify(key, &head).is_valid());

        let mut turned = proof.clone();
        turned.path[step].direction = match turned.path[step].direction {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        };
        prop_assert!(!turned.verify(key, &head).is_valid());

        let mut leaf_key = proof.clone();
        if let Leaf::Occupied { key: k, .. } = &mut leaf_key.leaf {
            k[0] ^= 1 << bit;
        }
        prop_assert!(!leaf_key.verify(key, &head).is_valid());

        let mut value = proof;
        if let Leaf::Occupied { values, .. } = &mut value.leaf {
            values[1][byte % 5] ^= 1 << bit;
        }
        prop_assert!(!value.verify(key, &head).is_valid());
    }
}
