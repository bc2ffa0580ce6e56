//! # Rules
//!
//! Pure precondition checks for every state transition. They take the
//! current state by reference and either describe the effect or reject.
//!
//! [`LedgerBook`](crate::LedgerBook) runs them inside its critical section,
//! which makes it the arbiter of every invariant. Application services run
//! the same checks against freshly read state before submitting, but only to
//! surface errors early: between the read and the submission another writer
//! may have changed the state, so a passing pre-check guarantees nothing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{LedgerError, Result};
use crate::types::{
    Address, Amount, AssetPhase, AssetRecord, FunderRecord, LoanRequest, Milestone, Profile,
    Timestamp, VerificationStatus,
};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"));

// ─────────────────────────────────────────────────────────
// Verification
// ─────────────────────────────────────────────────────────

/// Reject profiles with blank fields or a malformed email.
pub fn validate_profile(profile: &Profile) -> Result<()> {
    let fields = [
        ("name", &profile.name),
        ("email", &profile.email),
        ("contact info", &profile.contact_info),
        ("social link", &profile.social_link),
    ];
    for (label, value) in fields {
        if value.trim().is_empty() {
            return Err(LedgerError::InvalidProfile(format!("{label} is required")));
        }
    }
    if !EMAIL_RE.is_match(profile.email.trim()) {
        return Err(LedgerError::InvalidProfile(
            "email address is malformed".to_string(),
        ));
    }
    Ok(())
}

/// Reject `actor` unless it holds the verifier capability.
pub fn check_verifier(is_verifier: bool, actor: &Address, operation: &str) -> Result<()> {
    if !is_verifier {
        return Err(LedgerError::unauthorized(actor, operation));
    }
    Ok(())
}

/// A request may be submitted from `Unverified` or `Rejected` only.
pub fn check_submission(current: VerificationStatus) -> Result<()> {
    match current {
        VerificationStatus::Unverified | VerificationStatus::Rejected => Ok(()),
        VerificationStatus::Pending => Err(LedgerError::AlreadyPending),
        VerificationStatus::Approved => Err(LedgerError::AlreadyApproved),
    }
}

/// What an approval does to an address in a given state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Approval {
    /// `Pending → Approved`; a verified-user record is created.
    Grant,
    /// Already approved; nothing changes.
    Unchanged,
}

pub fn check_approval(address: &Address, current: VerificationStatus) -> Result<Approval> {
    match current {
        VerificationStatus::Pending => Ok(Approval::Grant),
        VerificationStatus::Approved => Ok(Approval::Unchanged),
        VerificationStatus::Unverified | VerificationStatus::Rejected => {
            Err(LedgerError::NoPendingRequest(address.to_string()))
        }
    }
}

pub fn check_rejection(address: &Address, current: VerificationStatus) -> Result<()> {
    match current {
        VerificationStatus::Pending => Ok(()),
        _ => Err(LedgerError::NoPendingRequest(address.to_string())),
    }
}

// ─────────────────────────────────────────────────────────
// Assets
// ─────────────────────────────────────────────────────────

pub fn check_new_asset(
    title: &str,
    target: Amount,
    deadline: Timestamp,
    now: Timestamp,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(LedgerError::InvalidInput("title is required".to_string()));
    }
    if target == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if deadline <= now {
        return Err(LedgerError::InvalidInput(
            "deadline must be in the future".to_string(),
        ));
    }
    Ok(())
}

pub fn check_asset_verification(asset: &AssetRecord) -> Result<()> {
    if asset.is_verified {
        return Err(LedgerError::AlreadyVerified(asset.id));
    }
    Ok(())
}

pub fn check_owner(asset: &AssetRecord, actor: &Address, operation: &str) -> Result<()> {
    if &asset.owner != actor {
        return Err(LedgerError::unauthorized(actor, operation));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Funding
// ─────────────────────────────────────────────────────────

/// Investments close at the deadline and once the target is reached.
/// The contribution that crosses the target is accepted in full.
pub fn check_investment(asset: &AssetRecord, amount: Amount, now: Timestamp) -> Result<()> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if asset.deadline_passed(now) {
        return Err(LedgerError::DeadlinePassed);
    }
    if asset.target_met() {
        return Err(LedgerError::TargetReached);
    }
    asset
        .amount_collected
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;
    Ok(())
}

/// Returns the amount a withdrawal would release right now. Zero means the
/// owner already withdrew everything, which is not an error.
pub fn check_withdrawal(asset: &AssetRecord, actor: &Address, now: Timestamp) -> Result<Amount> {
    check_owner(asset, actor, "withdraw funds")?;
    if !asset.deadline_passed(now) {
        return Err(LedgerError::DeadlineNotReached);
    }
    if !asset.target_met() {
        return Err(LedgerError::TargetNotMet);
    }
    Ok(asset.amount_collected.saturating_sub(asset.amount_released))
}

/// Sum of an investor's live (non-refunded) contributions to one asset.
pub fn contributed_by(funders: &[FunderRecord], investor: &Address) -> Amount {
    funders
        .iter()
        .filter(|f| &f.funder == investor && !f.refunded)
        .map(|f| f.amount)
        .sum()
}

/// Returns the amount refundable to `investor`.
pub fn check_refund(
    asset: &AssetRecord,
    funders: &[FunderRecord],
    investor: &Address,
    now: Timestamp,
) -> Result<Amount> {
    if asset.phase(now) != AssetPhase::Failed {
        return Err(LedgerError::RefundNotEligible);
    }
    match contributed_by(funders, investor) {
        0 => Err(LedgerError::RefundNotEligible),
        amount => Ok(amount),
    }
}

// ─────────────────────────────────────────────────────────
// Milestones
// ─────────────────────────────────────────────────────────

/// Total already carved out across all milestones of an asset.
pub fn allocated(milestones: &[Milestone]) -> Amount {
    milestones.iter().map(|m| m.fund_amount).sum()
}

/// Collected funds not yet carved out by any milestone.
pub fn available(asset: &AssetRecord, milestones: &[Milestone]) -> Amount {
    asset.amount_collected.saturating_sub(allocated(milestones))
}

pub fn check_new_milestone(
    asset: &AssetRecord,
    milestones: &[Milestone],
    actor: &Address,
    title: &str,
    fund_amount: Amount,
    now: Timestamp,
) -> Result<()> {
    check_owner(asset, actor, "create milestones")?;
    if title.trim().is_empty() {
        return Err(LedgerError::InvalidInput("milestone title is required".to_string()));
    }
    if fund_amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if asset.phase(now) == AssetPhase::Failed {
        return Err(LedgerError::AssetClosed(asset.id));
    }
    let headroom = available(asset, milestones);
    if fund_amount > headroom {
        return Err(LedgerError::InsufficientAvailableFunds {
            requested: fund_amount,
            available: headroom,
        });
    }
    Ok(())
}

pub fn check_completion(milestone: &Milestone, proof: &str) -> Result<()> {
    if proof.trim().is_empty() {
        return Err(LedgerError::ProofRequired);
    }
    if milestone.is_completed() {
        return Err(LedgerError::AlreadyCompleted(milestone.id));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Loans
// ─────────────────────────────────────────────────────────

pub fn check_loan_request(name: &str, purpose: &str, amount: Amount, duration: u64) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidInput("loan name is required".to_string()));
    }
    if purpose.trim().is_empty() {
        return Err(LedgerError::InvalidInput("loan purpose is required".to_string()));
    }
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if duration == 0 {
        return Err(LedgerError::InvalidInput(
            "loan duration must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Lenders fund until the principal is covered, never beyond it.
pub fn check_loan_funding(loan: &LoanRequest, lender: &Address, amount: Amount) -> Result<()> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if &loan.requester == lender {
        return Err(LedgerError::unauthorized(lender, "fund their own loan"));
    }
    if loan.fully_funded() {
        return Err(LedgerError::LoanFullyFunded(loan.id));
    }
    let remaining = loan.remaining();
    if amount > remaining {
        return Err(LedgerError::LoanOverfunded {
            loan: loan.id,
            requested: amount,
            remaining,
        });
    }
    Ok(())
}

/// Returns the principal a withdrawal would disburse. Zero means the
/// borrower already withdrew, which is not an error.
pub fn check_loan_withdrawal(loan: &LoanRequest, actor: &Address) -> Result<Amount> {
    if &loan.requester != actor {
        return Err(LedgerError::unauthorized(actor, "withdraw loan funds"));
    }
    if !loan.fully_funded() {
        return Err(LedgerError::LoanNotFunded(loan.id));
    }
    if loan.is_disbursed() {
        return Ok(0);
    }
    Ok(loan.amount_collected)
}

/// Any address may repay on the borrower's behalf. Returns the principal
/// still owed after this repayment.
pub fn check_repayment(loan: &LoanRequest, amount: Amount) -> Result<Amount> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if !loan.is_disbursed() {
        return Err(LedgerError::LoanNotDisbursed(loan.id));
    }
    let outstanding = loan.outstanding();
    if outstanding == 0 {
        return Err(LedgerError::LoanRepaid(loan.id));
    }
    if amount > outstanding {
        return Err(LedgerError::RepaymentExceedsBalance {
            requested: amount,
            outstanding,
        });
    }
    Ok(outstanding - amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LoanPhase, MilestoneStatus};

    fn asset(target: Amount, collected: Amount, deadline: Timestamp) -> AssetRecord {
        AssetRecord {
            id: 7,
            owner: Address::new("0xowner"),
            title: "Solar farm".to_string(),
            description: String::new(),
            target,
            deadline,
            amount_collected: collected,
            amount_released: 0,
            is_verified: false,
            created_at: 0,
        }
    }

    fn milestone(id: u64, fund_amount: Amount) -> Milestone {
        Milestone {
            id,
            title: format!("m{id}"),
            description: String::new(),
            fund_amount,
            status: MilestoneStatus::InProgress,
            proof: None,
            completion_date: None,
            created_at: 0,
        }
    }

    fn loan(amount: Amount, collected: Amount, disbursed_at: Option<Timestamp>) -> LoanRequest {
        LoanRequest {
            id: 4,
            requester: Address::new("0xborrower"),
            name: "Feed".to_string(),
            purpose: "Winter hay".to_string(),
            amount,
            duration: 100,
            amount_collected: collected,
            amount_repaid: 0,
            lenders: Vec::new(),
            created_at: 0,
            disbursed_at,
        }
    }

    fn profile() -> Profile {
        Profile {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            contact_info: "+1 555 0100".to_string(),
            social_link: "https://linkedin.com/in/ada".to_string(),
        }
    }

    #[test]
    fn profile_requires_every_field() {
        assert!(validate_profile(&profile()).is_ok());

        let mut p = profile();
        p.contact_info = "   ".to_string();
        assert!(matches!(
            validate_profile(&p),
            Err(LedgerError::InvalidProfile(msg)) if msg.contains("contact")
        ));
    }

    #[test]
    fn profile_rejects_malformed_email() {
        for bad in ["ada", "ada@example", "ada @example.com", "@example.com"] {
            let mut p = profile();
            p.email = bad.to_string();
            assert!(validate_profile(&p).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn submission_only_from_unverified_or_rejected() {
        assert!(check_submission(VerificationStatus::Unverified).is_ok());
        assert!(check_submission(VerificationStatus::Rejected).is_ok());
        assert_eq!(
            check_submission(VerificationStatus::Pending),
            Err(LedgerError::AlreadyPending)
        );
        assert_eq!(
            check_submission(VerificationStatus::Approved),
            Err(LedgerError::AlreadyApproved)
        );
    }

    #[test]
    fn approval_is_idempotent() {
        let who = Address::new("0xabc");
        assert_eq!(
            check_approval(&who, VerificationStatus::Pending),
            Ok(Approval::Grant)
        );
        assert_eq!(
            check_approval(&who, VerificationStatus::Approved),
            Ok(Approval::Unchanged)
        );
        assert!(check_approval(&who, VerificationStatus::Unverified).is_err());
    }

    #[test]
    fn investment_closes_at_deadline_and_target() {
        let open = asset(100, 40, 1_000);
        assert!(check_investment(&open, 80, 999).is_ok());
        assert_eq!(check_investment(&open, 0, 10), Err(LedgerError::InvalidAmount));
        assert_eq!(
            check_investment(&open, 5, 1_000),
            Err(LedgerError::DeadlinePassed)
        );

        let full = asset(100, 100, 1_000);
        assert_eq!(check_investment(&full, 1, 10), Err(LedgerError::TargetReached));
    }

    #[test]
    fn withdrawal_requires_owner_deadline_and_target() {
        let owner = Address::new("0xowner");
        let stranger = Address::new("0xstranger");
        let a = asset(100, 120, 1_000);

        assert!(matches!(
            check_withdrawal(&a, &stranger, 2_000),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert_eq!(
            check_withdrawal(&a, &owner, 10),
            Err(LedgerError::DeadlineNotReached)
        );
        assert_eq!(check_withdrawal(&a, &owner, 2_000), Ok(120));

        let short = asset(100, 30, 1_000);
        assert_eq!(
            check_withdrawal(&short, &owner, 2_000),
            Err(LedgerError::TargetNotMet)
        );
    }

    #[test]
    fn headroom_reported_exactly() {
        let a = asset(100, 50, 1_000);
        let ms = vec![milestone(0, 20), milestone(1, 25)];
        assert_eq!(available(&a, &ms), 5);

        let err = check_new_milestone(&a, &ms, &Address::new("0xowner"), "next", 6, 10);
        assert_eq!(
            err,
            Err(LedgerError::InsufficientAvailableFunds {
                requested: 6,
                available: 5
            })
        );
        assert!(check_new_milestone(&a, &ms, &Address::new("0xowner"), "next", 5, 10).is_ok());
    }

    #[test]
    fn available_never_underflows() {
        // Refunds may shrink the collected amount below existing allocations.
        let a = asset(100, 10, 1_000);
        assert_eq!(available(&a, &[milestone(0, 40)]), 0);
    }

    #[test]
    fn completion_needs_proof_then_in_progress() {
        let mut m = milestone(3, 10);
        assert_eq!(check_completion(&m, ""), Err(LedgerError::ProofRequired));
        assert_eq!(check_completion(&m, "  "), Err(LedgerError::ProofRequired));
        assert!(check_completion(&m, "bafyproof").is_ok());

        m.status = MilestoneStatus::Completed;
        assert_eq!(
            check_completion(&m, "bafyproof"),
            Err(LedgerError::AlreadyCompleted(3))
        );
    }

    #[test]
    fn loan_request_needs_every_field() {
        assert!(check_loan_request("Feed", "Hay", 10, 30).is_ok());
        assert!(check_loan_request(" ", "Hay", 10, 30).is_err());
        assert!(check_loan_request("Feed", "", 10, 30).is_err());
        assert_eq!(check_loan_request("Feed", "Hay", 0, 30), Err(LedgerError::InvalidAmount));
        assert!(check_loan_request("Feed", "Hay", 10, 0).is_err());
    }

    #[test]
    fn loan_funding_stops_at_principal() {
        let lender = Address::new("0xlender");
        let open = loan(100, 70, None);
        assert!(check_loan_funding(&open, &lender, 30).is_ok());
        assert_eq!(
            check_loan_funding(&open, &lender, 31),
            Err(LedgerError::LoanOverfunded {
                loan: 4,
                requested: 31,
                remaining: 30
            })
        );
        assert!(matches!(
            check_loan_funding(&open, &Address::new("0xborrower"), 1),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert_eq!(
            check_loan_funding(&loan(100, 100, None), &lender, 1),
            Err(LedgerError::LoanFullyFunded(4))
        );
    }

    #[test]
    fn loan_withdrawal_once_funded() {
        let borrower = Address::new("0xborrower");
        assert_eq!(
            check_loan_withdrawal(&loan(100, 60, None), &borrower),
            Err(LedgerError::LoanNotFunded(4))
        );
        assert_eq!(check_loan_withdrawal(&loan(100, 100, None), &borrower), Ok(100));
        assert_eq!(check_loan_withdrawal(&loan(100, 100, Some(5)), &borrower), Ok(0));
        assert!(check_loan_withdrawal(&loan(100, 100, None), &Address::new("0xlender")).is_err());
    }

    #[test]
    fn repayment_bounded_by_outstanding() {
        assert_eq!(
            check_repayment(&loan(100, 100, None), 10),
            Err(LedgerError::LoanNotDisbursed(4))
        );
        let active = loan(100, 100, Some(5));
        assert_eq!(check_repayment(&active, 40), Ok(60));
        assert_eq!(
            check_repayment(&active, 101),
            Err(LedgerError::RepaymentExceedsBalance {
                requested: 101,
                outstanding: 100
            })
        );

        let mut settled = active;
        settled.amount_repaid = 100;
        assert_eq!(check_repayment(&settled, 1), Err(LedgerError::LoanRepaid(4)));
    }

    #[test]
    fn loan_phase_follows_disbursal_and_due_date() {
        assert_eq!(loan(100, 40, None).phase(0), LoanPhase::Open);
        assert_eq!(loan(100, 100, None).phase(0), LoanPhase::Funded);

        let mut active = loan(100, 100, Some(1_000));
        assert_eq!(active.phase(1_099), LoanPhase::Active);
        assert_eq!(active.phase(1_100), LoanPhase::Overdue);
        active.amount_repaid = 100;
        assert_eq!(active.phase(1_100), LoanPhase::Repaid);
    }
}
