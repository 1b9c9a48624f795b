//! End-to-end redemption flows: deposits replayed through the tree
//! builder, roots submitted, vouchers redeemed against a stub verifier.

use std::sync::{Arc, RwLock};

use ghostpool_protocol::builder;
use ghostpool_protocol::verifier::PROOF_BYTES;
use ghostpool_protocol::{
    Address, CommitmentLedger, NullifierRegistry, ProtocolError, RedemptionCoordinator,
    SharedLedger, SharedNullifiers, StubVerifier, Voucher, ZkProof,
};

const OWNER: Address = Address([1u8; 32]);
const RELAYER: Address = Address([2u8; 32]);
const ALICE: Address = Address([3u8; 32]);
const BOB: Address = Address([4u8; 32]);

const ASSET: [u8; 32] = [9u8; 32];

struct Harness {
    ledger: SharedLedger,
    nullifiers: SharedNullifiers,
    coordinator: RedemptionCoordinator,
}

fn harness() -> Harness {
    let mut ledger = CommitmentLedger::new(OWNER, RELAYER);
    ledger.authorize_inserter(OWNER, RELAYER).unwrap();
    let mut nullifiers = NullifierRegistry::new(OWNER);
    nullifiers.authorize_spender(OWNER, RELAYER).unwrap();

    let ledger: SharedLedger = Arc::new(RwLock::new(ledger));
    let nullifiers: SharedNullifiers = Arc::new(RwLock::new(nullifiers));

    let mut coordinator = RedemptionCoordinator::new(
        RELAYER,
        OWNER,
        ASSET,
        ledger.clone(),
        nullifiers.clone(),
        Arc::new(StubVerifier::accept_all()),
    );
    coordinator.fund(OWNER, ALICE, 1_000_000).unwrap();

    Harness {
        ledger,
        nullifiers,
        coordinator,
    }
}

fn proof() -> ZkProof {
    ZkProof::from_bytes(&[0u8; PROOF_BYTES]).unwrap()
}

/// Rebuild the root from the ledger's range-read interface and submit it,
/// exactly as an off-chain builder would.
fn publish_root(ledger: &SharedLedger) -> [u8; 32] {
    let (commitments, count) = {
        let ledger = ledger.read().unwrap();
        (ledger.commitments(0, u64::MAX), ledger.next_leaf_index())
    };
    let root = builder::compute_root(&commitments).unwrap();
    ledger
        .write()
        .unwrap()
        .submit_root(RELAYER, root, count)
        .unwrap();
    root
}

#[test]
fn deposit_then_replay_then_redeem() {
    let mut h = harness();

    // Empty ledger: the initial root is already known.
    let initial_root = h.ledger.read().unwrap().root();
    assert!(h.ledger.read().unwrap().is_known_root(&initial_root));

    let mut voucher = Voucher::new(1_000, ASSET);
    let commitment = voucher.commitment().unwrap();
    let leaf_index = h.coordinator.ghost(ALICE, 1_000, commitment).unwrap();
    voucher.set_leaf_index(leaf_index);
    assert_eq!(leaf_index, 0);

    // Builder replay over [C1].
    let root = publish_root(&h.ledger);
    assert!(h.ledger.read().unwrap().is_known_root(&root));

    // A second submission of the same root is a duplicate.
    assert_eq!(
        h.ledger.write().unwrap().submit_root(RELAYER, root, 1),
        Err(ProtocolError::DuplicateSubmission)
    );

    // Redeem with the path material the builder serves to provers.
    let commitments = h.ledger.read().unwrap().commitments(0, u64::MAX);
    let (path, indices) = builder::merkle_path(&commitments, leaf_index).unwrap();
    let nullifier = voucher.nullifier().unwrap();

    h.coordinator
        .redeem(RELAYER, 1_000, BOB, nullifier, root, &path, &indices, &proof())
        .unwrap();
    assert_eq!(h.coordinator.balance_of(BOB), 1_000);

    // Retry fails with AlreadySpent, for any caller.
    assert_eq!(
        h.coordinator
            .redeem(ALICE, 1_000, BOB, nullifier, root, &path, &indices, &proof()),
        Err(ProtocolError::AlreadySpent)
    );
    assert!(h.nullifiers.read().unwrap().is_spent(&nullifier));
}

#[test]
fn independent_replays_agree() {
    let mut h = harness();
    for i in 0..10u64 {
        let voucher = Voucher::new(100 + i, ASSET);
        h.coordinator
            .ghost(ALICE, 100 + i, voucher.commitment().unwrap())
            .unwrap();
    }

    let commitments = h.ledger.read().unwrap().commitments(0, u64::MAX);
    assert_eq!(commitments.len(), 10);

    // Two independent replays of the same range read.
    let a = builder::compute_root(&commitments).unwrap();
    let b = builder::compute_root(&h.ledger.read().unwrap().commitments(0, 10)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn partial_redemption_carries_change_forward() {
    let mut h = harness();

    let voucher = Voucher::new(1_000, ASSET);
    h.coordinator
        .ghost(ALICE, 1_000, voucher.commitment().unwrap())
        .unwrap();
    let root = publish_root(&h.ledger);

    let change_voucher = Voucher::new(400, ASSET);
    let change_commitment = change_voucher.commitment().unwrap();
    let old_nullifier = voucher.nullifier().unwrap();

    let change_leaf = h
        .coordinator
        .redeem_partial(
            RELAYER,
            600,
            1_000,
            BOB,
            old_nullifier,
            change_commitment,
            root,
            &[],
            &[],
            &proof(),
        )
        .unwrap();

    assert_eq!(change_leaf, Some(1));
    assert_eq!(h.coordinator.balance_of(BOB), 600);
    assert_eq!(h.coordinator.total_ghosted(), 1_000);
    assert_eq!(h.coordinator.total_redeemed(), 600);

    // The change commitment is a fresh, independently redeemable voucher.
    let root2 = publish_root(&h.ledger);
    let change_nullifier = change_voucher.nullifier().unwrap();
    h.coordinator
        .redeem(RELAYER, 400, BOB, change_nullifier, root2, &[], &[], &proof())
        .unwrap();
    assert_eq!(h.coordinator.balance_of(BOB), 1_000);
    assert_eq!(h.coordinator.outstanding(), 0);
}

#[test]
fn early_root_stays_known_after_many_submissions() {
    let mut h = harness();

    let voucher = Voucher::new(1, ASSET);
    h.coordinator
        .ghost(ALICE, 1, voucher.commitment().unwrap())
        .unwrap();
    let early_root = publish_root(&h.ledger);

    // 150 further insertions, each followed by a root submission.
    for i in 0..150u64 {
        let v = Voucher::new(1 + i, ASSET);
        h.coordinator
            .ghost(ALICE, 1 + i, v.commitment().unwrap())
            .unwrap();
        publish_root(&h.ledger);
    }

    assert!(h.ledger.read().unwrap().is_known_root(&early_root));

    // The early root is still redeemable against.
    h.coordinator
        .redeem(
            RELAYER,
            1,
            BOB,
            voucher.nullifier().unwrap(),
            early_root,
            &[],
            &[],
            &proof(),
        )
        .unwrap();
}

#[test]
fn counters_hold_under_interleaving() {
    let mut h = harness();
    let mut outstanding_amounts: Vec<u64> = Vec::new();

    // Interleave ghosts, full redemptions, and partial redemptions.
    let vouchers: Vec<Voucher> = (0..6).map(|i| Voucher::new(500 + i * 10, ASSET)).collect();
    for v in &vouchers {
        h.coordinator.ghost(ALICE, v.amount, v.commitment().unwrap()).unwrap();
        outstanding_amounts.push(v.amount);
    }
    let root = publish_root(&h.ledger);

    // Full redemption of voucher 0.
    h.coordinator
        .redeem(
            RELAYER,
            vouchers[0].amount,
            BOB,
            vouchers[0].nullifier().unwrap(),
            root,
            &[],
            &[],
            &proof(),
        )
        .unwrap();
    outstanding_amounts.remove(0);

    // Partial redemption of voucher 1: 300 out, remainder carried.
    let change = Voucher::new(vouchers[1].amount - 300, ASSET);
    h.coordinator
        .redeem_partial(
            RELAYER,
            300,
            vouchers[1].amount,
            BOB,
            vouchers[1].nullifier().unwrap(),
            change.commitment().unwrap(),
            root,
            &[],
            &[],
            &proof(),
        )
        .unwrap();
    outstanding_amounts.remove(0);
    outstanding_amounts.push(change.amount);

    // Another ghost after redemptions.
    let late = Voucher::new(777, ASSET);
    h.coordinator.ghost(ALICE, 777, late.commitment().unwrap()).unwrap();
    outstanding_amounts.push(777);

    assert!(h.coordinator.total_ghosted() >= h.coordinator.total_redeemed());
    assert_eq!(
        h.coordinator.outstanding(),
        outstanding_amounts.iter().sum::<u64>()
    );
}

#[test]
fn third_party_relayer_can_submit_for_any_recipient() {
    let mut h = harness();

    let voucher = Voucher::new(1_000, ASSET);
    h.coordinator
        .ghost(ALICE, 1_000, voucher.commitment().unwrap())
        .unwrap();
    let root = publish_root(&h.ledger);

    // The submitter is neither the depositor nor the recipient.
    let carol = Address([7u8; 32]);
    h.coordinator
        .redeem(
            carol,
            1_000,
            BOB,
            voucher.nullifier().unwrap(),
            root,
            &[],
            &[],
            &proof(),
        )
        .unwrap();
    assert_eq!(h.coordinator.balance_of(BOB), 1_000);
}
