//! End-to-end funding, milestone, verification and loan scenarios driven
//! through the public services.

use std::sync::Arc;

use equinex_ledger::{
    Address, Amount, ErrorKind, LedgerBook, LedgerError, LoanPhase, Profile, VerificationStatus,
};
use marketplace::amount::parse_units;
use marketplace::assets::StartupDraft;
use marketplace::clock::ManualClock;
use marketplace::errors::MarketError;
use marketplace::evidence::MemoryEvidenceStore;
use marketplace::gateway::Caller;
use marketplace::ledger::LocalLedger;
use marketplace::loans::LoanApplication;
use marketplace::writer::Timeouts;
use marketplace::Marketplace;

const T: u64 = 1_700_000_000;

fn avax(raw: &str) -> Amount {
    parse_units(raw).unwrap()
}

fn setup() -> (Arc<ManualClock>, Marketplace) {
    let clock = Arc::new(ManualClock::at(T - 1_000));
    let book = LedgerBook::with_verifiers([Address::new("0xverifier")]);
    let ledger = Arc::new(LocalLedger::new(book, clock.clone()));
    let evidence = Arc::new(MemoryEvidenceStore::new("ipfs.io"));
    let market = Marketplace::new(ledger, evidence, clock.clone(), Timeouts::default());
    (clock, market)
}

async fn listed(market: &Marketplace, target: &str) -> u64 {
    market
        .assets
        .create_startup(
            &Address::new("0xowner"),
            StartupDraft {
                title: "Bluegrass Stud".into(),
                summary: "Breeding programme".into(),
                target: target.into(),
                deadline: T,
                image: String::new(),
                video: String::new(),
                equity_holders: Vec::new(),
            },
        )
        .await
        .unwrap()
}

fn kind_of(err: &MarketError) -> ErrorKind {
    err.kind()
}

#[tokio::test]
async fn successful_round_releases_once() {
    let (clock, market) = setup();
    let owner = Address::new("0xowner");
    let id = listed(&market, "10").await;

    market.funding.invest(&Address::new("0xa"), id, avax("4")).await.unwrap();
    let inv = market.funding.invest(&Address::new("0xb"), id, avax("6")).await.unwrap();
    assert_eq!(inv.amount_collected, avax("10"));

    clock.set(T + 1);
    assert_eq!(market.funding.withdraw(&owner, id).await.unwrap(), avax("10"));
    assert_eq!(market.funding.withdraw(&owner, id).await.unwrap(), 0);

    let detail = market.gateway.asset_detail(id).await.unwrap();
    assert_eq!(detail.asset.amount_released, avax("10"));
    assert_eq!(detail.funders.value.len(), 2);
}

#[tokio::test]
async fn failed_round_refunds_investor() {
    let (clock, market) = setup();
    let owner = Address::new("0xowner");
    let investor = Address::new("0xa");
    let id = listed(&market, "10").await;

    market.funding.invest(&investor, id, avax("3")).await.unwrap();
    assert!(market.funding.has_invested_in(&investor, id).await.unwrap());

    // Refund is not available while the round is open.
    let err = market.funding.refund(&investor, id).await.unwrap_err();
    assert!(matches!(err, MarketError::Ledger(LedgerError::RefundNotEligible)));

    clock.set(T + 1);
    assert_eq!(market.funding.refund(&investor, id).await.unwrap(), avax("3"));
    assert_eq!(market.funding.investment_amount(&investor, id).await.unwrap(), 0);

    let err = market.funding.withdraw(&owner, id).await.unwrap_err();
    assert!(matches!(err, MarketError::Ledger(LedgerError::TargetNotMet)));

    let err = market.funding.refund(&investor, id).await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::StateConflict);
}

#[tokio::test]
async fn investing_after_deadline_is_rejected() {
    let (clock, market) = setup();
    let id = listed(&market, "10").await;
    clock.set(T);
    let err = market
        .funding
        .invest(&Address::new("0xa"), id, avax("1"))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Ledger(LedgerError::DeadlinePassed)));
}

#[tokio::test]
async fn milestone_allocation_respects_collected() {
    let (_, market) = setup();
    let owner = Address::new("0xowner");
    let id = listed(&market, "10").await;
    market.funding.invest(&Address::new("0xa"), id, avax("5")).await.unwrap();

    let err = market
        .milestones
        .create(&owner, id, "Stables", "", avax("6"))
        .await
        .unwrap_err();
    match err {
        MarketError::Ledger(LedgerError::InsufficientAvailableFunds { requested, available }) => {
            assert_eq!(requested, avax("6"));
            assert_eq!(available, avax("5"));
        }
        other => panic!("unexpected {other:?}"),
    }

    market.milestones.create(&owner, id, "Stables", "", avax("5")).await.unwrap();
    let err = market
        .milestones
        .create(&owner, id, "Fencing", "", avax("0.01"))
        .await
        .unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::InsufficientFunds);

    let allocation = market.milestones.available(id).await.unwrap();
    assert_eq!(allocation.allocated, avax("5"));
    assert_eq!(allocation.available, 0);
}

#[tokio::test]
async fn racing_milestones_never_overallocate() {
    let (_, market) = setup();
    let owner = Address::new("0xowner");
    let id = listed(&market, "10").await;
    market.funding.invest(&Address::new("0xa"), id, avax("5")).await.unwrap();

    let (a, b) = tokio::join!(
        market.milestones.create(&owner, id, "Barn", "", avax("3")),
        market.milestones.create(&owner, id, "Track", "", avax("3")),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = a.err().or(b.err()).unwrap();
    assert_eq!(kind_of(&loser), ErrorKind::InsufficientFunds);

    let allocation = market.milestones.available(id).await.unwrap();
    assert!(allocation.allocated <= allocation.collected);
}

#[tokio::test]
async fn milestone_completion_requires_proof_and_verifier() {
    let (_, market) = setup();
    let owner = Address::new("0xowner");
    let verifier = Address::new("0xverifier");
    let id = listed(&market, "10").await;
    market.funding.invest(&Address::new("0xa"), id, avax("5")).await.unwrap();
    let m = market.milestones.create(&owner, id, "Barn", "", avax("2")).await.unwrap();

    let err = market.milestones.complete(&verifier, id, m, "  ").await.unwrap_err();
    assert!(matches!(err, MarketError::Ledger(LedgerError::ProofRequired)));

    let err = market.milestones.complete(&owner, id, m, "QmProof").await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Unauthorized);

    let completed_at = market.milestones.complete(&verifier, id, m, "QmProof").await.unwrap();
    assert_eq!(completed_at, T - 1_000);

    let err = market.milestones.complete(&verifier, id, m, "QmOther").await.unwrap_err();
    assert!(matches!(err, MarketError::Ledger(LedgerError::AlreadyCompleted(_))));

    let milestones = market.milestones.list(id).await.unwrap();
    assert_eq!(milestones[0].proof.as_deref(), Some("QmProof"));
}

#[tokio::test]
async fn verification_rejection_and_resubmission() {
    let (_, market) = setup();
    let user = Address::new("0xuser");
    let verifier = Address::new("0xverifier");
    let profile = Profile {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        contact_info: "+1 555 0100".into(),
        social_link: "https://x.com/ada".into(),
    };

    market.verification.submit_request(&user, profile.clone()).await.unwrap();
    market.verification.reject(&verifier, &user).await.unwrap();
    assert_eq!(
        market.verification.status(&user).await.unwrap(),
        VerificationStatus::Rejected
    );

    market.verification.submit_request(&user, profile).await.unwrap();
    assert_eq!(
        market.verification.status(&user).await.unwrap(),
        VerificationStatus::Pending
    );
    assert!(!market.verification.approve(&verifier, &user).await.unwrap());

    let overview = market.gateway.verification_overview().await;
    assert_eq!(overview.requests.value.len(), 1);
    assert_eq!(overview.verified.value.len(), 1);
    assert_eq!(overview.pending().count(), 0);
}

#[tokio::test]
async fn asset_verification_happens_once() {
    let (_, market) = setup();
    let verifier = Address::new("0xverifier");
    let id = listed(&market, "10").await;

    let err = market.assets.verify(&Address::new("0xowner"), id).await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Unauthorized);

    market.assets.verify(&verifier, id).await.unwrap();
    let err = market.assets.verify(&verifier, id).await.unwrap_err();
    assert!(matches!(err, MarketError::Ledger(LedgerError::AlreadyVerified(_))));
}

#[tokio::test]
async fn racing_lenders_never_overfund_a_loan() {
    let (clock, market) = setup();
    let rancher = Address::new("0xrancher");
    let application = LoanApplication {
        name: "Horse trailer".into(),
        purpose: "Transport to shows".into(),
        amount: "10".into(),
        duration_days: 7,
    };
    let id = market.loans.request(&rancher, application).await.unwrap();

    let lender_a = Address::new("0xa");
    let lender_b = Address::new("0xb");
    let (a, b) = tokio::join!(
        market.loans.fund(&lender_a, id, avax("6")),
        market.loans.fund(&lender_b, id, avax("6")),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = a.err().or(b.err()).unwrap();
    assert_eq!(kind_of(&loser), ErrorKind::InsufficientFunds);

    market.loans.fund(&Address::new("0xc"), id, avax("4")).await.unwrap();
    assert_eq!(market.loans.withdraw(&rancher, id).await.unwrap(), avax("10"));

    clock.advance(8 * 86_400);
    let loans = market.gateway.list_loans(&Caller::Anonymous).await.unwrap();
    assert!(loans.is_complete());
    assert_eq!(loans.value[0].phase, LoanPhase::Overdue);
    assert_eq!(loans.value[0].loan.amount_collected, avax("10"));

    let err = market.loans.repay(&rancher, id, avax("11")).await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Validation);
    assert_eq!(market.loans.repay(&rancher, id, avax("10")).await.unwrap(), 0);
    assert_eq!(market.loans.loan(id).await.unwrap().phase, LoanPhase::Repaid);
}
