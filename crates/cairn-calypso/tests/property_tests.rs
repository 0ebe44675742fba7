//! Property-based tests for cairn-calypso using proptest

use cairn_calypso::{combine, reconstruct, reencrypt_share, LongTermSecret, Read, Write};
use cairn_core::{DarcId, InstanceId, Point, Scalar, SignatureScheme, Signer};
use proptest::prelude::*;
use rand::rngs::OsRng;

// ============================================
// Key Reconstruction
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_reconstruct_recovers_key(
        key in prop::collection::vec(any::<u8>(), 1..100),
        threshold in 1usize..4,
        extra in 0usize..3,
    ) {
        let lts = LongTermSecret::deal(InstanceId::new([1; 32]), threshold + extra, threshold, &mut OsRng).unwrap();
        let darc = DarcId::new([2; 32]);
        let write = Write::new(lts.id(), &darc, &lts.public_key(), &key, vec![], &mut OsRng).unwrap();
        let reader = Signer::generate(SignatureScheme::Ecdsa);
        let reply = lts.reencrypt(&write, &Read::new(InstanceId::new([3; 32]), &reader), &darc).unwrap();

        let recovered = reconstruct(&write, &reply, reader.secret()).unwrap();
        prop_assert_eq!(recovered.as_bytes(), key.as_slice());
    }

    #[test]
    fn prop_wrong_reader_never_recovers(key in prop::collection::vec(any::<u8>(), 1..64)) {
        let lts = LongTermSecret::deal(InstanceId::new([1; 32]), 3, 2, &mut OsRng).unwrap();
        let darc = DarcId::new([2; 32]);
        let write = Write::new(lts.id(), &darc, &lts.public_key(), &key, vec![], &mut OsRng).unwrap();
        let reader = Signer::generate(SignatureScheme::Ecdsa);
        let reply = lts.reencrypt(&write, &Read::new(InstanceId::new([3; 32]), &reader), &darc).unwrap();

        let other = Scalar::random(&mut OsRng);
        if let Ok(recovered) = reconstruct(&write, &reply, &other) {
            prop_assert_ne!(recovered.as_bytes(), key.as_slice());
        }
    }
}

// ============================================
// Threshold Combination
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_combine_independent_of_subset(threshold in 1usize..5, rotate in 0usize..5) {
        let participants = threshold + 2;
        let lts = LongTermSecret::deal(InstanceId::new([1; 32]), participants, threshold, &mut OsRng).unwrap();
        let p = Point::mul_base(&Scalar::random(&mut OsRng));
        let mut shares: Vec<_> = lts
            .shares()
            .iter()
            .map(|s| reencrypt_share(s, &p, &Point::identity()))
            .collect();

        let first = combine(&shares, threshold).unwrap();
        shares.rotate_left(rotate % participants);
        prop_assert_eq!(combine(&shares, threshold).unwrap(), first);
    }
}
