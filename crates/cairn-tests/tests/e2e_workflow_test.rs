//! End-to-end workflow tests for Cairn
//!
//! These tests drive a client session against an in-memory ledger: Darc
//! evolution, multi-signature rules, proof checking and a complete Calypso
//! write/read round.

use cairn_calypso::{
    CalypsoError, LongTermSecret, Quorum, ReadFlow, ReadState, SecretManager, Write,
};
use cairn_core::{
    Action, Argument, ClientTransaction, Darc, EngineConfig, Error, Evaluator, Expr, Identity,
    InstanceId, Ledger, NoDelegation, ProofOutcome, Session, SignatureScheme, Signer,
    SubmitOutcome, ARG_DARC, CONTRACT_DARC, RULE_EVOLVE,
};
use cairn_tests::{MockLedger, ARG_VALUE, CONTRACT_VALUE};
use rand::rngs::OsRng;

fn user() -> Signer {
    Signer::generate(SignatureScheme::Ecdsa)
}

/// Single-instruction transaction against `target`, signed by `signers`
fn signed_tx(target: InstanceId, action: Action, signers: &[&Signer]) -> ClientTransaction {
    let mut tx = ClientTransaction::from_actions(target, vec![action]).unwrap();
    tx.instructions[0].sign_by(signers).unwrap();
    tx
}

fn evolve(next: &Darc) -> Action {
    Action::Invoke {
        contract_id: CONTRACT_DARC.to_string(),
        command: "evolve".to_string(),
        args: vec![Argument::new(ARG_DARC, next.to_bytes())],
    }
}

fn spawn_value(value: &[u8]) -> Action {
    Action::Spawn {
        contract_id: CONTRACT_VALUE.to_string(),
        args: vec![Argument::new(ARG_VALUE, value.to_vec())],
    }
}

/// Submit through the session and move its trust to the new head
fn commit(session: &mut Session<&MockLedger>, ledger: &MockLedger, tx: &ClientTransaction) -> SubmitOutcome {
    let outcome = session.submit(tx).unwrap();
    if outcome.is_accepted() {
        session.set_trusted_head(ledger.head());
    }
    outcome
}

// ==========================================
// Darc evolution
// ==========================================

#[test]
fn test_evolve_transfers_ownership() {
    let user_a = user();
    let user_b = user();
    let d0 = Darc::genesis(&[user_a.identity()], &[user_a.identity()], b"owned by A");
    let ledger = MockLedger::new(&d0);
    let mut session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();

    // STEP 1: A hands the evolve rule to B
    let mut d1 = d0.next_version().unwrap();
    d1.update_rule(RULE_EVOLVE, Expr::any_of(vec![user_b.identity()]))
        .unwrap();
    let tx = signed_tx(d0.instance_id(), evolve(&d1), &[&user_a]);
    assert_eq!(commit(&mut session, &ledger, &tx), SubmitOutcome::Accepted);

    // STEP 2: the verified ledger state is D1
    let current = session.darc(&d0.base_id()).unwrap();
    assert_eq!(current, d1);
    assert_eq!(current.version(), 1);
    assert_eq!(current.previous_id(), Some(d0.id()));
    assert_eq!(
        current.rule(RULE_EVOLVE),
        Some(&Expr::any_of(vec![user_b.identity()]))
    );

    // STEP 3: only B may evolve D1 now
    let d2 = current.next_version().unwrap();
    let by_a = signed_tx(d0.instance_id(), evolve(&d2), &[&user_a]);
    assert!(matches!(
        session.authorize(&by_a.instructions[0]).unwrap(),
        cairn_core::Authorization::Denied(_)
    ));
    let by_b = signed_tx(d0.instance_id(), evolve(&d2), &[&user_b]);
    assert!(session.authorize(&by_b.instructions[0]).unwrap().is_granted());
    assert_eq!(commit(&mut session, &ledger, &by_b), SubmitOutcome::Accepted);
    assert_eq!(session.darc(&d0.base_id()).unwrap().version(), 2);
}

#[test]
fn test_stale_evolution_rejected() {
    let owner = user();
    let d0 = Darc::genesis(&[owner.identity()], &[owner.identity()], b"root");
    let ledger = MockLedger::new(&d0);
    let mut session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();

    let d1 = d0.next_version().unwrap();
    let tx = signed_tx(d0.instance_id(), evolve(&d1), &[&owner]);
    assert!(commit(&mut session, &ledger, &tx).is_accepted());

    // A second successor of D0 no longer chains onto the current version
    let mut fork = d0.next_version().unwrap();
    fork.set_description(b"fork");
    let stale = signed_tx(d0.instance_id(), evolve(&fork), &[&owner]);
    assert!(matches!(session.submit(&stale), Err(Error::DarcChain(_))));

    // The ledger refuses it too when the session is bypassed
    let height = ledger.height();
    assert!(matches!(
        ledger.submit(&stale).unwrap(),
        SubmitOutcome::Rejected(_)
    ));
    assert_eq!(ledger.height(), height);
}

// ==========================================
// Multi-signature rules
// ==========================================

#[test]
fn test_and_rule_needs_both_signers() {
    let user_a = user();
    let user_b = user();
    let mut darc = Darc::genesis(&[user_a.identity()], &[user_a.identity()], b"shared");
    darc.add_rule(
        "spawn:value",
        Expr::all_of(vec![user_a.identity(), user_b.identity()]),
    )
    .unwrap();
    let ledger = MockLedger::new(&darc);
    let mut session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();

    let only_a = signed_tx(darc.instance_id(), spawn_value(b"42"), &[&user_a]);
    assert!(matches!(
        session.submit(&only_a).unwrap(),
        SubmitOutcome::Denied { index: 0, .. }
    ));
    assert_eq!(ledger.height(), 0);
    assert!(matches!(
        ledger.submit(&only_a).unwrap(),
        SubmitOutcome::Rejected(_)
    ));

    let both = signed_tx(darc.instance_id(), spawn_value(b"42"), &[&user_a, &user_b]);
    assert_eq!(commit(&mut session, &ledger, &both), SubmitOutcome::Accepted);

    let value_id = both.instructions[0].derive_id("");
    let state = session.instance(&value_id).unwrap().unwrap();
    assert_eq!(state.state, b"42");
    assert_eq!(state.contract_id, CONTRACT_VALUE);
    assert_eq!(state.darc_id, darc.base_id());
}

#[test]
fn test_delegation_to_team_darc() {
    let owner = user();
    let member = user();
    let outsider = user();

    let team = Darc::genesis(&[owner.identity()], &[member.identity()], b"team");
    let mut root = Darc::genesis(&[owner.identity()], &[owner.identity()], b"root");
    root.add_rule("spawn:darc", Expr::Id(owner.identity())).unwrap();
    root.add_rule("spawn:value", Expr::Id(Identity::darc(team.base_id())))
        .unwrap();

    let ledger = MockLedger::new(&root);
    let mut session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();

    // Before the team Darc exists the reference cannot be satisfied
    let early = signed_tx(root.instance_id(), spawn_value(b"early"), &[&member]);
    assert!(matches!(
        session.submit(&early).unwrap(),
        SubmitOutcome::Denied { .. }
    ));

    let spawn_team = Action::Spawn {
        contract_id: CONTRACT_DARC.to_string(),
        args: vec![Argument::new(ARG_DARC, team.to_bytes())],
    };
    let tx = signed_tx(root.instance_id(), spawn_team, &[&owner]);
    assert!(commit(&mut session, &ledger, &tx).is_accepted());
    assert_eq!(session.darc(&team.base_id()).unwrap(), team);

    let by_member = signed_tx(root.instance_id(), spawn_value(b"v"), &[&member]);
    assert!(commit(&mut session, &ledger, &by_member).is_accepted());

    let by_outsider = signed_tx(root.instance_id(), spawn_value(b"v"), &[&outsider]);
    assert!(matches!(
        session.submit(&by_outsider).unwrap(),
        SubmitOutcome::Denied { .. }
    ));

    // Without a resolver the same signatures are not enough
    let evaluator = Evaluator::new(NoDelegation, session.config());
    let instr = &by_member.instructions[0];
    assert!(!evaluator
        .authorize(&root, "spawn:value", instr.hash().as_bytes(), &instr.signatures)
        .unwrap()
        .is_granted());
}

// ==========================================
// Proofs
// ==========================================

#[test]
fn test_tampered_sibling_is_invalid() {
    let owner = user();
    let darc = Darc::genesis(&[owner.identity()], &[owner.identity()], b"root");
    let ledger = MockLedger::new(&darc);
    let key = darc.instance_id();

    let proof = ledger.fetch_proof(&key).unwrap();
    let outcome = proof.verify(key.as_bytes(), &ledger.head());
    assert!(matches!(outcome, ProofOutcome::Included(_)));

    let mut tampered = proof;
    tampered.path[128].sibling.0[0] ^= 0x01;
    assert!(matches!(
        tampered.verify(key.as_bytes(), &ledger.head()),
        ProofOutcome::Invalid(_)
    ));
}

#[test]
fn test_old_block_proof_links_to_head() {
    let owner = user();
    let d0 = Darc::genesis(&[owner.identity()], &[owner.identity()], b"root");
    let ledger = MockLedger::new(&d0);
    let mut session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();
    let stale_head = ledger.head();

    for _ in 0..3 {
        let current = session.darc(&d0.base_id()).unwrap();
        let tx = signed_tx(d0.instance_id(), evolve(&current.next_version().unwrap()), &[&owner]);
        assert!(commit(&mut session, &ledger, &tx).is_accepted());
    }
    assert_eq!(ledger.height(), 3);

    // Block 0 still proves D0, chained through three headers to the head
    let key = d0.instance_id();
    let old = ledger.proof_at(&key, 0).unwrap();
    assert_eq!(old.consistency.links.len(), 3);
    let state = old
        .verify(key.as_bytes(), &ledger.head())
        .into_instance()
        .unwrap()
        .unwrap();
    assert_eq!(Darc::from_bytes(&state.state).unwrap(), d0);

    // A session still trusting the first head cannot accept newer state
    let lagging = Session::new(&ledger, EngineConfig::default(), stale_head).unwrap();
    assert!(matches!(
        lagging.darc(&d0.base_id()),
        Err(Error::ProofRejected(_))
    ));

    // Nor can one that caps the chain length below three links
    let config = EngineConfig {
        max_chain_links: 2,
        ..EngineConfig::default()
    };
    assert!(!old
        .verify_bounded(key.as_bytes(), &ledger.head(), config.max_chain_links)
        .is_valid());
}

#[test]
fn test_missing_instance_is_absent() {
    let owner = user();
    let darc = Darc::genesis(&[owner.identity()], &[owner.identity()], b"root");
    let ledger = MockLedger::new(&darc);
    let session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();

    let missing = InstanceId::new([0xee; 32]);
    assert!(session.instance(&missing).unwrap().is_none());
    assert!(matches!(session.proof(&missing), Err(Error::NotFound(_))));
}

// ==========================================
// Configuration
// ==========================================

#[test]
fn test_session_from_config_file() {
    let owner = user();
    let mut darc = Darc::genesis(&[owner.identity()], &[owner.identity()], b"root");
    darc.add_rule("spawn:value", Expr::Id(owner.identity())).unwrap();
    let ledger = MockLedger::new(&darc);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cairn.toml");
    std::fs::write(&path, "max_instructions = 1\n").unwrap();
    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.max_delegation_depth, 16);

    let session = Session::new(&ledger, config, ledger.head()).unwrap();
    let mut tx = ClientTransaction::from_actions(
        darc.instance_id(),
        vec![spawn_value(b"1"), spawn_value(b"2")],
    )
    .unwrap();
    for instr in &mut tx.instructions {
        instr.sign_by(&[&owner]).unwrap();
    }
    assert!(matches!(session.submit(&tx), Err(Error::Structural(_))));
}

// ==========================================
// Calypso
// ==========================================

struct CalypsoSetup {
    writer: Signer,
    reader: Signer,
    darc: Darc,
    ledger: MockLedger,
}

fn calypso_setup() -> CalypsoSetup {
    let writer = user();
    let reader = Signer::generate(SignatureScheme::Schnorr);
    let mut darc = Darc::genesis(&[writer.identity()], &[writer.identity()], b"documents");
    darc.add_rule("spawn:calypsoWrite", Expr::Id(writer.identity()))
        .unwrap();
    darc.add_rule("spawn:calypsoRead", Expr::Id(reader.identity()))
        .unwrap();
    let ledger = MockLedger::new(&darc);
    CalypsoSetup {
        writer,
        reader,
        darc,
        ledger,
    }
}

#[test]
fn test_calypso_write_read_roundtrip() {
    let CalypsoSetup {
        writer,
        reader,
        darc,
        ledger,
    } = calypso_setup();
    let mut session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();
    let lts = LongTermSecret::deal(InstanceId::new([0x1c; 32]), 4, 3, &mut OsRng).unwrap();

    // ==========================================
    // STEP 1: Writer commits the encrypted document
    // ==========================================
    let (write, key) = Write::seal(
        lts.id(),
        &darc.base_id(),
        &lts.public_key(),
        b"quarterly report",
        &mut OsRng,
    )
    .unwrap();
    let tx = signed_tx(darc.instance_id(), write.spawn_action(), &[&writer]);
    assert!(commit(&mut session, &ledger, &tx).is_accepted());
    let write_id = tx.instructions[0].derive_id("");

    // ==========================================
    // STEP 2: Reader commits a read request
    // ==========================================
    let mut flow = ReadFlow::new(write_id, write);
    let request = flow.request(&reader).unwrap();
    let tx = ClientTransaction::new(vec![request]);
    assert!(commit(&mut session, &ledger, &tx).is_accepted());
    let read_id = flow.read_id().unwrap();
    assert_eq!(read_id, tx.instructions[0].derive_id(""));

    // ==========================================
    // STEP 3: Quorum re-encrypts against verified proofs
    // ==========================================
    let quorum = Quorum::new(lts, ledger.head(), EngineConfig::default());
    let write_proof = session.proof(&write_id).unwrap();
    let read_proof = session.proof(&read_id).unwrap();
    flow.fetch_reply(&quorum, &write_proof, &read_proof).unwrap();
    assert_eq!(flow.state(), ReadState::SharesReceived);

    // ==========================================
    // STEP 4: Reader recovers key and document
    // ==========================================
    let recovered = flow.reconstruct(reader.secret()).unwrap();
    assert_eq!(recovered.as_bytes(), key.as_bytes());
    assert_eq!(flow.decrypt_payload().unwrap(), b"quarterly report");
    assert_eq!(flow.state(), ReadState::KeyReconstructed);
}

#[test]
fn test_calypso_unauthorized_reader_denied() {
    let CalypsoSetup {
        writer,
        darc,
        ledger,
        ..
    } = calypso_setup();
    let mut session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();
    let lts = LongTermSecret::deal(InstanceId::new([0x1c; 32]), 3, 2, &mut OsRng).unwrap();

    let (write, _) = Write::seal(lts.id(), &darc.base_id(), &lts.public_key(), b"doc", &mut OsRng)
        .unwrap();
    let tx = signed_tx(darc.instance_id(), write.spawn_action(), &[&writer]);
    assert!(commit(&mut session, &ledger, &tx).is_accepted());
    let write_id = tx.instructions[0].derive_id("");

    let intruder = user();
    let mut flow = ReadFlow::new(write_id, write);
    let request = flow.request(&intruder).unwrap();
    let tx = ClientTransaction::new(vec![request]);
    assert!(matches!(
        session.submit(&tx).unwrap(),
        SubmitOutcome::Denied { .. }
    ));

    // Without a committed read the quorum has nothing to answer
    let quorum = Quorum::new(lts, ledger.head(), EngineConfig::default());
    let write_proof = session.proof(&write_id).unwrap();
    let absent = ledger.fetch_proof(&flow.read_id().unwrap()).unwrap();
    assert!(flow.fetch_reply(&quorum, &write_proof, &absent).is_err());
}

#[test]
fn test_quorum_checks_proofs() {
    let CalypsoSetup {
        writer,
        reader,
        darc,
        ledger,
    } = calypso_setup();
    let mut session = Session::new(&ledger, EngineConfig::default(), ledger.head()).unwrap();
    let lts = LongTermSecret::deal(InstanceId::new([0x1c; 32]), 3, 2, &mut OsRng).unwrap();
    let stale_head = ledger.head();

    let (write, _) = Write::seal(lts.id(), &darc.base_id(), &lts.public_key(), b"doc", &mut OsRng)
        .unwrap();
    let tx = signed_tx(darc.instance_id(), write.spawn_action(), &[&writer]);
    assert!(commit(&mut session, &ledger, &tx).is_accepted());
    let write_id = tx.instructions[0].derive_id("");

    let mut flow = ReadFlow::new(write_id, write);
    let tx = ClientTransaction::new(vec![flow.request(&reader).unwrap()]);
    assert!(commit(&mut session, &ledger, &tx).is_accepted());

    let write_proof = session.proof(&write_id).unwrap();
    let read_proof = session.proof(&flow.read_id().unwrap()).unwrap();
    let read = flow.read().unwrap().clone();

    let mut quorum = Quorum::new(lts, stale_head, EngineConfig::default());
    assert!(matches!(
        quorum.request_reencryption(&read, &write_proof, &read_proof),
        Err(CalypsoError::Core(Error::ProofRejected(_)))
    ));

    quorum.set_trusted_head(ledger.head());
    assert!(matches!(
        quorum.request_reencryption(&read, &read_proof, &write_proof),
        Err(CalypsoError::InvalidState(_))
    ));
    assert!(quorum
        .request_reencryption(&read, &write_proof, &read_proof)
        .is_ok());

    // The write as committed one block before the head needs one chain link
    let linked = ledger.proof_at(&write_id, ledger.height() - 1).unwrap();
    assert_eq!(linked.consistency.links.len(), 1);
    assert!(quorum.request_reencryption(&read, &linked, &read_proof).is_ok());

    let strict_config = EngineConfig {
        max_chain_links: 0,
        ..EngineConfig::default()
    };
    let other = LongTermSecret::deal(InstanceId::new([0x1d; 32]), 3, 2, &mut OsRng).unwrap();
    let strict = Quorum::new(other, ledger.head(), strict_config);
    assert!(matches!(
        strict.request_reencryption(&read, &linked, &read_proof),
        Err(CalypsoError::Core(Error::ProofRejected(_)))
    ));
}
