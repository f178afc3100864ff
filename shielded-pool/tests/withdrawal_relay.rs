mod common;

use ark_bn254::Fr;
use chrono::{DateTime, Duration, Utc};
use common::*;
use shielded_pool::client::build_input;
use shielded_pool::state::WithdrawalStatus;
use shielded_pool::verifier::VerifierFamily;
use shielded_pool::withdrawal::MessageError;
use shielded_pool::{
    Envelope, FinalizeOutcome, InMemoryLedger, Note, Pool, PoolEvent, PoolError, TokenLedger, WithdrawalMessage,
};

fn initiate(pool: &mut Pool, wallet: &Wallet, note: &Note, now: DateTime<Utc>) -> Result<Fr, PoolError> {
    let input = build_input(&wallet.tree, note, &wallet.keypair, RECIPIENT).unwrap();
    let fields = input.to_field_elements();
    let proof = BindingVerifier::prove(VerifierFamily::Input, &fields);
    pool.trustless_withdraw_init(&USER, &proof, &fields, now)
}

fn single_envelope(pool: &mut Pool) -> Envelope {
    let mut out = pool.drain_outbox();
    assert_eq!(out.len(), 1, "expected exactly one queued envelope");
    out.remove(0)
}

struct Domains {
    origin: Pool,
    origin_ledger: InMemoryLedger,
    dest: Pool,
    dest_ledger: InMemoryLedger,
    wallet: Wallet,
}

fn two_domains() -> Domains {
    let mut origin_cfg = config(1);
    origin_cfg.withdrawal_destination = Some(2);
    let mut origin = Pool::deploy(origin_cfg, binding_verifiers()).unwrap();
    let mut dest = Pool::deploy(config(2), binding_verifiers()).unwrap();
    assert_ne!(origin.address(), dest.address());

    origin.enroll_remote(&OWNER, 2, dest.address()).unwrap();
    dest.enroll_remote(&OWNER, 1, origin.address()).unwrap();

    let mut dest_ledger = InMemoryLedger::new();
    dest_ledger.mint(&TOKEN, &dest.address(), 1_000).unwrap();

    Domains {
        origin,
        origin_ledger: InMemoryLedger::new(),
        dest,
        dest_ledger,
        wallet: Wallet::new(11),
    }
}

#[test]
fn loopback_withdrawal_round_trip() {
    let mut pool = Pool::deploy(config(1), binding_verifiers()).unwrap();
    let mut ledger = InMemoryLedger::new();
    let mut wallet = Wallet::new(10);
    let note = deposit(&mut pool, &mut ledger, &mut wallet, 100);
    let nullifier = note.nullifier(&wallet.keypair);

    let key = initiate(&mut pool, &wallet, &note, t0()).unwrap();
    assert!(pool.is_reserved(&nullifier));
    assert!(!pool.is_spent(&nullifier));
    assert!(matches!(
        pool.events().last(),
        Some(PoolEvent::TrustlessWithdrawInit { amount: 100, .. })
    ));

    let release = single_envelope(&mut pool);
    assert_eq!(release.origin_domain, 1);
    assert_eq!(release.destination_domain, 1);
    assert_eq!(release.recipient, pool.address());

    let outcome = pool.handle_message(&mut ledger, &release, t0() + Duration::hours(1)).unwrap();
    assert_eq!(outcome, FinalizeOutcome::Released { key });
    assert_eq!(ledger.balance_of(&TOKEN, &RECIPIENT), 100);
    assert_eq!(pool.custody(&ledger, &TOKEN), 0);

    // Same domain: the release settles the origin side too and nothing is queued.
    assert!(pool.outbox().is_empty());
    assert!(pool.is_spent(&nullifier));
    assert!(!pool.is_reserved(&nullifier));
    assert_eq!(pool.pending_withdrawal(&key).map(|w| w.status), Some(WithdrawalStatus::Finalized));
    let kinds: Vec<_> = pool.events().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "transacted",
            "trustless_withdraw_init",
            "trustless_withdraw_finalized",
            "trustless_withdraw_acknowledged"
        ]
    );

    // At-least-once delivery: a replayed release changes nothing.
    let before = observe(&pool, &ledger);
    assert_eq!(
        pool.handle_message(&mut ledger, &release, t0() + Duration::hours(3)),
        Ok(FinalizeOutcome::Duplicate { key })
    );
    assert_eq!(observe(&pool, &ledger), before);
    assert_eq!(ledger.balance_of(&TOKEN, &RECIPIENT), 100);
}

#[test]
fn loopback_release_cannot_be_cancelled_and_spent_again() {
    let mut pool = Pool::deploy(config(1), binding_verifiers()).unwrap();
    let mut ledger = InMemoryLedger::new();
    let mut wallet = Wallet::new(15);
    let note = deposit(&mut pool, &mut ledger, &mut wallet, 100);
    // Another user's funds share the custody.
    ledger.mint(&TOKEN, &pool.address(), 100).unwrap();

    let key = initiate(&mut pool, &wallet, &note, t0()).unwrap();
    let release = single_envelope(&mut pool);
    pool.handle_message(&mut ledger, &release, t0() + Duration::hours(1))
        .unwrap();

    let late = t0() + pool.config().withdrawal_window() + pool.config().ack_grace();
    assert_eq!(
        pool.trustless_withdraw_cancel(&key, late),
        Err(PoolError::UnknownWithdrawal(key))
    );

    let tx = wallet.transaction(&[note.clone()], &[], -100, RECIPIENT);
    assert_eq!(
        submit(&mut pool, &mut ledger, &tx),
        Err(PoolError::NullifierAlreadySpent(note.nullifier(&wallet.keypair)))
    );
    assert_eq!(ledger.balance_of(&TOKEN, &RECIPIENT), 100);
    assert_eq!(pool.custody(&ledger, &TOKEN), 100);
}

#[test]
fn reserved_note_cannot_be_spent_twice() {
    let mut pool = Pool::deploy(config(1), binding_verifiers()).unwrap();
    let mut ledger = InMemoryLedger::new();
    let mut wallet = Wallet::new(12);
    let note = deposit(&mut pool, &mut ledger, &mut wallet, 40);
    let nullifier = note.nullifier(&wallet.keypair);

    initiate(&mut pool, &wallet, &note, t0()).unwrap();

    assert_eq!(
        initiate(&mut pool, &wallet, &note, t0()),
        Err(PoolError::NullifierAlreadySpent(nullifier))
    );

    let tx = wallet.transaction(&[note], &[], -40, RECIPIENT);
    assert_eq!(
        submit(&mut pool, &mut ledger, &tx),
        Err(PoolError::NullifierAlreadySpent(nullifier))
    );
}

#[test]
fn init_checks_root_amount_and_proof() {
    let mut pool = Pool::deploy(config(1), binding_verifiers()).unwrap();
    let mut ledger = InMemoryLedger::new();
    let mut wallet = Wallet::new(13);
    let note = deposit(&mut pool, &mut ledger, &mut wallet, 40);

    let input = build_input(&wallet.tree, &note, &wallet.keypair, RECIPIENT).unwrap();
    let before = observe(&pool, &ledger);

    let fields = input.to_field_elements();
    assert_eq!(
        pool.trustless_withdraw_init(&USER, b"garbage", &fields, t0()),
        Err(PoolError::InvalidProof(VerifierFamily::Input))
    );

    let mut stale = input;
    stale.root = Fr::from(1u64);
    let fields = stale.to_field_elements();
    let proof = BindingVerifier::prove(VerifierFamily::Input, &fields);
    assert!(matches!(
        pool.trustless_withdraw_init(&USER, &proof, &fields, t0()),
        Err(PoolError::RootMismatch { .. })
    ));

    let mut empty = input;
    empty.amount = 0;
    let fields = empty.to_field_elements();
    let proof = BindingVerifier::prove(VerifierFamily::Input, &fields);
    assert!(matches!(
        pool.trustless_withdraw_init(&USER, &proof, &fields, t0()),
        Err(PoolError::InvalidAmount(_))
    ));

    assert!(matches!(
        pool.trustless_withdraw_init(&USER, &proof, &fields[..3], t0()),
        Err(PoolError::MalformedPublicInputs(_))
    ));

    assert_eq!(observe(&pool, &ledger), before);
}

#[test]
fn cross_domain_round_trip() {
    let mut d = two_domains();
    let note = deposit(&mut d.origin, &mut d.origin_ledger, &mut d.wallet, 100);
    let nullifier = note.nullifier(&d.wallet.keypair);

    let key = initiate(&mut d.origin, &d.wallet, &note, t0()).unwrap();
    let release = single_envelope(&mut d.origin);
    assert_eq!(release.destination_domain, 2);
    assert_eq!(release.recipient, d.dest.address());

    assert_eq!(
        d.dest.handle_message(&mut d.dest_ledger, &release, t0() + Duration::minutes(5)),
        Ok(FinalizeOutcome::Released { key })
    );
    assert_eq!(d.dest_ledger.balance_of(&TOKEN, &RECIPIENT), 100);
    assert!(d.dest.is_processed(&key));
    // Origin custody is untouched: value left through the destination's liquidity.
    assert_eq!(d.origin.custody(&d.origin_ledger, &TOKEN), 100);

    let ack = single_envelope(&mut d.dest);
    assert_eq!(ack.destination_domain, 1);
    assert_eq!(
        d.origin.handle_message(&mut d.origin_ledger, &ack, t0() + Duration::minutes(10)),
        Ok(FinalizeOutcome::Acknowledged { key })
    );
    assert!(d.origin.is_spent(&nullifier));

    let kinds: Vec<_> = d.origin.events().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "remote_enrolled",
            "transacted",
            "trustless_withdraw_init",
            "trustless_withdraw_acknowledged"
        ]
    );
}

#[test]
fn release_from_unenrolled_pool_is_rejected() {
    let mut d = two_domains();
    let mut stranger_cfg = config(3);
    stranger_cfg.withdrawal_destination = Some(2);
    let mut stranger = Pool::deploy(stranger_cfg, binding_verifiers()).unwrap();
    stranger.enroll_remote(&OWNER, 2, d.dest.address()).unwrap();

    let mut ledger = InMemoryLedger::new();
    let mut wallet = Wallet::new(14);
    let note = deposit(&mut stranger, &mut ledger, &mut wallet, 500);
    initiate(&mut stranger, &wallet, &note, t0()).unwrap();
    let forged = single_envelope(&mut stranger);

    let before = observe(&d.dest, &d.dest_ledger);
    assert!(matches!(
        d.dest.handle_message(&mut d.dest_ledger, &forged, t0()),
        Err(PoolError::Message(MessageError::UntrustedOrigin { domain: 3, .. }))
    ));
    assert_eq!(observe(&d.dest, &d.dest_ledger), before);
    assert_eq!(d.dest_ledger.balance_of(&TOKEN, &RECIPIENT), 0);
}

#[test]
fn release_retries_after_liquidity_arrives() {
    let mut d = two_domains();
    let note = deposit(&mut d.origin, &mut d.origin_ledger, &mut d.wallet, 5_000);
    let key = initiate(&mut d.origin, &d.wallet, &note, t0()).unwrap();
    let release = single_envelope(&mut d.origin);

    let before = observe(&d.dest, &d.dest_ledger);
    assert!(matches!(
        d.dest.handle_message(&mut d.dest_ledger, &release, t0()),
        Err(PoolError::TokenTransferFailed(_))
    ));
    assert_eq!(observe(&d.dest, &d.dest_ledger), before);
    assert!(!d.dest.is_processed(&key));

    d.dest_ledger.mint(&TOKEN, &d.dest.address(), 4_000).unwrap();
    assert_eq!(
        d.dest.handle_message(&mut d.dest_ledger, &release, t0() + Duration::hours(1)),
        Ok(FinalizeOutcome::Released { key })
    );
}

#[test]
fn expired_release_is_refused_and_the_note_recovered() {
    let mut d = two_domains();
    let note = deposit(&mut d.origin, &mut d.origin_ledger, &mut d.wallet, 70);
    let nullifier = note.nullifier(&d.wallet.keypair);
    let key = initiate(&mut d.origin, &d.wallet, &note, t0()).unwrap();
    let release = single_envelope(&mut d.origin);

    let window = d.origin.config().withdrawal_window();
    let grace = d.origin.config().ack_grace();
    let expires_at = t0() + window;

    assert_eq!(
        d.dest.handle_message(&mut d.dest_ledger, &release, expires_at + Duration::seconds(1)),
        Err(PoolError::WithdrawalExpired {
            key,
            expires_at: expires_at.to_rfc3339()
        })
    );
    assert!(d.dest.outbox().is_empty());

    assert!(matches!(
        d.origin.trustless_withdraw_cancel(&key, expires_at),
        Err(PoolError::WithdrawalNotExpired { .. })
    ));
    assert!(d.origin.is_reserved(&nullifier));

    d.origin.trustless_withdraw_cancel(&key, expires_at + grace).unwrap();
    assert!(!d.origin.is_reserved(&nullifier));
    assert_eq!(
        d.origin.pending_withdrawal(&key).map(|w| w.status),
        Some(WithdrawalStatus::Expired)
    );
    assert_eq!(
        d.origin.trustless_withdraw_cancel(&key, expires_at + grace),
        Err(PoolError::UnknownWithdrawal(key))
    );

    // The note is spendable again through the ordinary path.
    let tx = d.wallet.transaction(&[note], &[], -70, RECIPIENT);
    submit(&mut d.origin, &mut d.origin_ledger, &tx).unwrap();
    assert_eq!(d.origin_ledger.balance_of(&TOKEN, &RECIPIENT), 70);
}

#[test]
fn acknowledgement_after_cancel_is_refused() {
    let mut d = two_domains();
    let note = deposit(&mut d.origin, &mut d.origin_ledger, &mut d.wallet, 10);
    let key = initiate(&mut d.origin, &d.wallet, &note, t0()).unwrap();
    let release = single_envelope(&mut d.origin);

    d.dest
        .handle_message(&mut d.dest_ledger, &release, t0() + Duration::days(1))
        .unwrap();
    let ack = single_envelope(&mut d.dest);

    let late = t0() + d.origin.config().withdrawal_window() + d.origin.config().ack_grace();
    d.origin.trustless_withdraw_cancel(&key, late).unwrap();

    let before = observe(&d.origin, &d.origin_ledger);
    assert!(matches!(
        d.origin.handle_message(&mut d.origin_ledger, &ack, late),
        Err(PoolError::WithdrawalExpired { .. })
    ));
    assert_eq!(observe(&d.origin, &d.origin_ledger), before);
}

#[test]
fn acknowledgement_from_the_wrong_domain_is_refused() {
    let mut d = two_domains();
    let mut bystander = Pool::deploy(config(3), binding_verifiers()).unwrap();
    d.origin.enroll_remote(&OWNER, 3, bystander.address()).unwrap();
    bystander.enroll_remote(&OWNER, 1, d.origin.address()).unwrap();

    let note = deposit(&mut d.origin, &mut d.origin_ledger, &mut d.wallet, 60);
    let nullifier = note.nullifier(&d.wallet.keypair);
    let key = initiate(&mut d.origin, &d.wallet, &note, t0()).unwrap();
    single_envelope(&mut d.origin);

    // Domain 3 is trusted, but the release went to domain 2.
    let ack = Envelope {
        origin_domain: 3,
        sender: bystander.address(),
        destination_domain: 1,
        recipient: d.origin.address(),
        nonce: 0,
        body: WithdrawalMessage::Acknowledge { key }.encode().unwrap(),
    };
    let before = observe(&d.origin, &d.origin_ledger);
    assert_eq!(
        d.origin.handle_message(&mut d.origin_ledger, &ack, t0()),
        Err(PoolError::Message(MessageError::WrongAcknowledger { domain: 3, expected: 2 }))
    );
    assert_eq!(observe(&d.origin, &d.origin_ledger), before);
    assert!(d.origin.is_reserved(&nullifier));
    assert!(!d.origin.is_spent(&nullifier));
}

#[test]
fn cancel_requires_a_pending_withdrawal() {
    let mut pool = Pool::deploy(config(1), binding_verifiers()).unwrap();
    assert_eq!(
        pool.trustless_withdraw_cancel(&Fr::from(9u64), t0()),
        Err(PoolError::UnknownWithdrawal(Fr::from(9u64)))
    );
}

#[test]
fn only_the_owner_enrolls_remotes() {
    let mut pool = Pool::deploy(config(1), binding_verifiers()).unwrap();
    assert_eq!(
        pool.enroll_remote(&USER, 2, RECIPIENT),
        Err(PoolError::Unauthorized(USER))
    );
    assert_eq!(pool.remote(2), None);
    assert!(pool.events().is_empty());

    pool.enroll_remote(&OWNER, 2, RECIPIENT).unwrap();
    assert_eq!(pool.remote(2), Some(RECIPIENT));
    assert!(matches!(
        pool.enroll_remote(&OWNER, 1, RECIPIENT),
        Err(PoolError::Config(_))
    ));
}
