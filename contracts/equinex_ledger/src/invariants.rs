#![allow(dead_code)]

use crate::rules;
use crate::types::{
    AssetRecord, Certificate, FunderRecord, LoanRequest, Milestone, MilestoneStatus,
};
use crate::{LedgerBook, VerificationStatus};

/// INV-1: Released funds never exceed collected funds.
pub fn assert_released_within_collected(asset: &AssetRecord) {
    assert!(
        asset.amount_released <= asset.amount_collected,
        "INV-1 violated: asset {} released {} of {} collected",
        asset.id,
        asset.amount_released,
        asset.amount_collected
    );
}

/// INV-2: Asset target must always be positive.
pub fn assert_target_positive(asset: &AssetRecord) {
    assert!(asset.target > 0, "INV-2 violated: asset {} has zero target", asset.id);
}

/// INV-3: `amount_collected` equals the sum of live funder records.
pub fn assert_collected_matches_funders(asset: &AssetRecord, funders: &[FunderRecord]) {
    let live: u128 = funders.iter().filter(|f| !f.refunded).map(|f| f.amount).sum();
    assert_eq!(
        asset.amount_collected, live,
        "INV-3 violated: asset {} collected {} but live funder records sum to {}",
        asset.id, asset.amount_collected, live
    );
}

/// INV-4: Milestone allocations never exceed collected funds.
pub fn assert_allocation_within_collected(asset: &AssetRecord, milestones: &[Milestone]) {
    let allocated = rules::allocated(milestones);
    assert!(
        allocated <= asset.amount_collected,
        "INV-4 violated: asset {} allocated {} of {} collected",
        asset.id,
        allocated,
        asset.amount_collected
    );
}

/// INV-5: Completed milestones carry a proof and a completion date;
/// in-progress ones carry neither.
pub fn assert_milestone_completion_consistent(milestone: &Milestone) {
    match milestone.status {
        MilestoneStatus::Completed => assert!(
            milestone.proof.is_some() && milestone.completion_date.is_some(),
            "INV-5 violated: completed milestone {} lacks proof or date",
            milestone.id
        ),
        MilestoneStatus::InProgress => assert!(
            milestone.proof.is_none() && milestone.completion_date.is_none(),
            "INV-5 violated: open milestone {} already has proof or date",
            milestone.id
        ),
    }
}

/// INV-6: Certificate token ids are unique and sequential from 0.
pub fn assert_sequential_tokens(certificates: &[Certificate]) {
    let mut ids: Vec<u64> = certificates.iter().map(|c| c.token_id).collect();
    ids.sort_unstable();
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(*id, i as u64, "INV-6 violated: expected token {}, got {}", i, id);
    }
}

/// INV-7: Every verified user corresponds to an approved request, exactly once.
pub fn assert_verified_users_unique(book: &LedgerBook) {
    let users = book.verified_users();
    for (i, user) in users.iter().enumerate() {
        assert_eq!(
            book.verification_status(&user.address),
            VerificationStatus::Approved,
            "INV-7 violated: verified user {} is not approved",
            user.address
        );
        assert!(
            users[i + 1..].iter().all(|u| u.address != user.address),
            "INV-7 violated: {} verified twice",
            user.address
        );
    }
}

/// INV-8: A loan's lenders cover at most its principal, and repayments
/// never exceed what was disbursed.
pub fn assert_loan_totals(loan: &LoanRequest) {
    let lent: u128 = loan.lenders.iter().map(|c| c.amount).sum();
    assert_eq!(
        loan.amount_collected, lent,
        "INV-8 violated: loan {} collected {} but contributions sum to {}",
        loan.id, loan.amount_collected, lent
    );
    assert!(
        loan.amount_collected <= loan.amount,
        "INV-8 violated: loan {} collected {} of {} requested",
        loan.id,
        loan.amount_collected,
        loan.amount
    );
    let disbursed = if loan.is_disbursed() { loan.amount_collected } else { 0 };
    assert!(
        loan.amount_repaid <= disbursed,
        "INV-8 violated: loan {} repaid {} of {} disbursed",
        loan.id,
        loan.amount_repaid,
        disbursed
    );
}

/// Run every per-asset invariant against the current book.
pub fn assert_all_asset_invariants(book: &LedgerBook) {
    for id in 0..book.asset_count() {
        let asset = book.asset(id).unwrap();
        let funders = book.funders(id).unwrap();
        let milestones = book.milestones(id).unwrap();

        assert_released_within_collected(&asset);
        assert_target_positive(&asset);
        assert_collected_matches_funders(&asset, &funders);
        for m in &milestones {
            assert_milestone_completion_consistent(m);
        }
    }
    for id in 0..book.loan_count() {
        assert_loan_totals(&book.loan(id).unwrap());
    }
    assert_verified_users_unique(book);
}
