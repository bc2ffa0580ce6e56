//! # EquineX Ledger
//!
//! Canonical rules of the EquineX investment marketplace. [`LedgerBook`] is a
//! deterministic, in-process ledger whose entry points cover the full
//! lifecycle of assets, investments, milestones and identity verification:
//!
//! | Phase          | Entry Point(s)                                         |
//! |----------------|--------------------------------------------------------|
//! | Listing        | [`LedgerBook::create_asset`], `add_document`           |
//! | Funding        | [`LedgerBook::fund`], `withdraw`, `refund`             |
//! | Milestones     | [`LedgerBook::add_milestone`], `complete_milestone`    |
//! | Verification   | `submit_verification_request`, `approve_verification`, `reject_verification`, `verify_asset` |
//! | Loans          | [`LedgerBook::request_loan`], `fund_loan`, `withdraw_loan`, `repay_loan` |
//! | Queries        | `asset`, `funders`, `milestones`, `certificates_of`, … |
//!
//! ## Architecture
//!
//! Preconditions live in [`rules`] as pure functions. Collections live in
//! `storage`. This file contains only the entry points: each one runs the
//! rule check and then performs the write, with no await point in between,
//! so a caller holding `&mut LedgerBook` is the single serialization point
//! for every invariant.
//!
//! Every entry point takes the ledger timestamp `now` explicitly; replaying
//! the same calls with the same timestamps rebuilds the same book.

mod call;
mod errors;
pub mod rules;
mod storage;
mod types;

#[cfg(test)]
mod invariants;

pub use call::{CallOutcome, LedgerCall};
pub use errors::{ErrorKind, LedgerError, Result};
pub use types::{
    base_units, Address, Amount, AssetId, AssetPhase, AssetRecord, Certificate, DocumentRecord,
    FunderRecord, LoanContribution, LoanId, LoanPhase, LoanRequest, Milestone, MilestoneId,
    MilestoneStatus, Profile, Timestamp, TokenId, VerificationRequest, VerificationStatus,
    VerifiedUser, AMOUNT_DECIMALS,
};

use rules::Approval;
use storage::Storage;

#[derive(Debug, Default)]
pub struct LedgerBook {
    storage: Storage,
}

impl LedgerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a book in which each of `verifiers` holds the verifier capability.
    pub fn with_verifiers<I>(verifiers: I) -> Self
    where
        I: IntoIterator<Item = Address>,
    {
        let mut book = Self::new();
        for v in verifiers {
            book.storage.grant_verifier(v);
        }
        book
    }

    pub fn grant_verifier(&mut self, address: Address) {
        self.storage.grant_verifier(address);
    }

    /// Dispatch a [`LedgerCall`] issued by `actor` at ledger time `now`.
    pub fn apply(
        &mut self,
        actor: &Address,
        call: LedgerCall,
        now: Timestamp,
    ) -> Result<CallOutcome> {
        match call {
            LedgerCall::CreateAsset {
                title,
                description,
                target,
                deadline,
            } => self
                .create_asset(actor, title, description, target, deadline, now)
                .map(|asset_id| CallOutcome::AssetCreated { asset_id }),
            LedgerCall::Fund { asset_id, amount } => self.fund(actor, asset_id, amount, now),
            LedgerCall::Withdraw { asset_id } => self
                .withdraw(actor, asset_id, now)
                .map(|released| CallOutcome::Withdrawn { asset_id, released }),
            LedgerCall::Refund { asset_id } => self
                .refund(actor, asset_id, now)
                .map(|amount| CallOutcome::Refunded { asset_id, amount }),
            LedgerCall::AddDocument {
                asset_id,
                content_hash,
                document_type,
            } => self
                .add_document(actor, asset_id, content_hash, document_type, now)
                .map(|index| CallOutcome::DocumentAdded { asset_id, index }),
            LedgerCall::AddMilestone {
                asset_id,
                title,
                description,
                fund_amount,
            } => self
                .add_milestone(actor, asset_id, title, description, fund_amount, now)
                .map(|milestone_id| CallOutcome::MilestoneAdded {
                    asset_id,
                    milestone_id,
                }),
            LedgerCall::CompleteMilestone {
                asset_id,
                milestone_id,
                proof,
            } => self
                .complete_milestone(actor, asset_id, milestone_id, proof, now)
                .map(|completed_at| CallOutcome::MilestoneCompleted {
                    asset_id,
                    milestone_id,
                    completed_at,
                }),
            LedgerCall::VerifyAsset { asset_id } => self
                .verify_asset(actor, asset_id)
                .map(|()| CallOutcome::AssetVerified { asset_id }),
            LedgerCall::SubmitVerificationRequest { profile } => self
                .submit_verification_request(actor, profile, now)
                .map(|()| CallOutcome::VerificationSubmitted {
                    address: actor.clone(),
                }),
            LedgerCall::ApproveVerification { address } => self
                .approve_verification(actor, &address, now)
                .map(|already_approved| CallOutcome::VerificationApproved {
                    address,
                    already_approved,
                }),
            LedgerCall::RejectVerification { address } => self
                .reject_verification(actor, &address)
                .map(|()| CallOutcome::VerificationRejected { address }),
            LedgerCall::RequestLoan {
                name,
                purpose,
                amount,
                duration,
            } => self
                .request_loan(actor, name, purpose, amount, duration, now)
                .map(|loan_id| CallOutcome::LoanRequested { loan_id }),
            LedgerCall::FundLoan { loan_id, amount } => self.fund_loan(actor, loan_id, amount, now),
            LedgerCall::WithdrawLoan { loan_id } => self
                .withdraw_loan(actor, loan_id, now)
                .map(|disbursed| CallOutcome::LoanWithdrawn { loan_id, disbursed }),
            LedgerCall::RepayLoan { loan_id, amount } => self
                .repay_loan(loan_id, amount)
                .map(|outstanding| CallOutcome::LoanRepaid {
                    loan_id,
                    outstanding,
                }),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Listing
    // ─────────────────────────────────────────────────────────

    /// Register a new asset owned by `owner`. Returns its id.
    pub fn create_asset(
        &mut self,
        owner: &Address,
        title: String,
        description: String,
        target: Amount,
        deadline: Timestamp,
        now: Timestamp,
    ) -> Result<AssetId> {
        rules::check_new_asset(&title, target, deadline, now)?;

        let id = self.storage.next_asset_id();
        self.storage.push_asset(AssetRecord {
            id,
            owner: owner.clone(),
            title,
            description,
            target,
            deadline,
            amount_collected: 0,
            amount_released: 0,
            is_verified: false,
            created_at: now,
        });
        Ok(id)
    }

    /// Attach a content-addressed document. Owner only.
    pub fn add_document(
        &mut self,
        actor: &Address,
        asset_id: AssetId,
        content_hash: String,
        document_type: String,
        now: Timestamp,
    ) -> Result<u64> {
        let asset = self.storage.load_asset(asset_id)?;
        rules::check_owner(asset, actor, "add documents")?;
        if content_hash.trim().is_empty() {
            return Err(LedgerError::InvalidInput(
                "document content hash is required".to_string(),
            ));
        }

        Ok(self.storage.push_document(
            asset_id,
            DocumentRecord {
                content_hash,
                document_type,
                uploaded_by: actor.clone(),
                timestamp: now,
            },
        ))
    }

    /// Flip `is_verified` on an asset. Verifier only, once.
    pub fn verify_asset(&mut self, actor: &Address, asset_id: AssetId) -> Result<()> {
        self.require_verifier(actor, "verify assets")?;
        let asset = self.storage.load_asset_mut(asset_id)?;
        rules::check_asset_verification(asset)?;
        asset.is_verified = true;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Funding
    // ─────────────────────────────────────────────────────────

    /// Invest `amount` into an asset and mint a certificate for it.
    pub fn fund(
        &mut self,
        investor: &Address,
        asset_id: AssetId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<CallOutcome> {
        rules::check_investment(self.storage.load_asset(asset_id)?, amount, now)?;

        let token_id = self.storage.get_and_increment_token_id();
        self.storage.save_certificate(Certificate {
            token_id,
            asset_id,
            investor: investor.clone(),
            amount,
            timestamp: now,
        });
        self.storage.funders_mut(asset_id).push(FunderRecord {
            funder: investor.clone(),
            amount,
            token_id,
            timestamp: now,
            refunded: false,
        });

        let asset = self.storage.load_asset_mut(asset_id)?;
        asset.amount_collected += amount;

        Ok(CallOutcome::Funded {
            asset_id,
            token_id,
            amount_collected: asset.amount_collected,
        })
    }

    /// Release everything not yet released to the owner. Returns the amount
    /// released by this call; a repeated call releases zero.
    pub fn withdraw(
        &mut self,
        actor: &Address,
        asset_id: AssetId,
        now: Timestamp,
    ) -> Result<Amount> {
        let asset = self.storage.load_asset_mut(asset_id)?;
        let releasable = rules::check_withdrawal(asset, actor, now)?;
        asset.amount_released = asset.amount_collected;
        Ok(releasable)
    }

    /// Return an investor's live contributions to a failed asset.
    pub fn refund(
        &mut self,
        investor: &Address,
        asset_id: AssetId,
        now: Timestamp,
    ) -> Result<Amount> {
        let amount = rules::check_refund(
            self.storage.load_asset(asset_id)?,
            self.storage.funders(asset_id),
            investor,
            now,
        )?;

        for record in self
            .storage
            .funders_mut(asset_id)
            .iter_mut()
            .filter(|f| &f.funder == investor)
        {
            record.refunded = true;
        }
        let asset = self.storage.load_asset_mut(asset_id)?;
        asset.amount_collected -= amount;
        Ok(amount)
    }

    // ─────────────────────────────────────────────────────────
    // Milestones
    // ─────────────────────────────────────────────────────────

    /// Carve `fund_amount` out of the asset's collected funds. Owner only.
    pub fn add_milestone(
        &mut self,
        actor: &Address,
        asset_id: AssetId,
        title: String,
        description: String,
        fund_amount: Amount,
        now: Timestamp,
    ) -> Result<MilestoneId> {
        rules::check_new_milestone(
            self.storage.load_asset(asset_id)?,
            self.storage.milestones(asset_id),
            actor,
            &title,
            fund_amount,
            now,
        )?;

        let milestones = self.storage.milestones_mut(asset_id);
        let id = milestones.len() as MilestoneId;
        milestones.push(Milestone {
            id,
            title,
            description,
            fund_amount,
            status: MilestoneStatus::InProgress,
            proof: None,
            completion_date: None,
            created_at: now,
        });
        Ok(id)
    }

    /// Mark a milestone completed with its evidence. Verifier only, once.
    pub fn complete_milestone(
        &mut self,
        actor: &Address,
        asset_id: AssetId,
        milestone_id: MilestoneId,
        proof: String,
        now: Timestamp,
    ) -> Result<Timestamp> {
        self.require_verifier(actor, "complete milestones")?;
        self.storage.load_asset(asset_id)?;

        let milestone = self.storage.load_milestone_mut(asset_id, milestone_id)?;
        rules::check_completion(milestone, &proof)?;
        milestone.status = MilestoneStatus::Completed;
        milestone.proof = Some(proof);
        milestone.completion_date = Some(now);
        Ok(now)
    }

    // ─────────────────────────────────────────────────────────
    // Identity verification
    // ─────────────────────────────────────────────────────────

    pub fn submit_verification_request(
        &mut self,
        actor: &Address,
        profile: Profile,
        now: Timestamp,
    ) -> Result<()> {
        rules::validate_profile(&profile)?;
        rules::check_submission(self.storage.verification_status(actor))?;

        self.storage.upsert_request(VerificationRequest {
            address: actor.clone(),
            profile,
            timestamp: now,
            status: VerificationStatus::Pending,
        });
        Ok(())
    }

    /// Approve a pending request. Returns `true` when the address was
    /// already approved and nothing changed.
    pub fn approve_verification(
        &mut self,
        actor: &Address,
        address: &Address,
        now: Timestamp,
    ) -> Result<bool> {
        self.require_verifier(actor, "approve verification requests")?;
        match rules::check_approval(address, self.storage.verification_status(address))? {
            Approval::Unchanged => Ok(true),
            Approval::Grant => {
                let request = self
                    .storage
                    .request_mut(address)
                    .ok_or_else(|| LedgerError::NoPendingRequest(address.to_string()))?;
                request.status = VerificationStatus::Approved;
                let name = request.profile.name.clone();
                self.storage.push_verified(VerifiedUser {
                    address: address.clone(),
                    name,
                    verification_date: now,
                });
                Ok(false)
            }
        }
    }

    pub fn reject_verification(&mut self, actor: &Address, address: &Address) -> Result<()> {
        self.require_verifier(actor, "reject verification requests")?;
        rules::check_rejection(address, self.storage.verification_status(address))?;
        if let Some(request) = self.storage.request_mut(address) {
            request.status = VerificationStatus::Rejected;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Loans
    // ─────────────────────────────────────────────────────────

    /// Open a loan request for `amount`, due `duration` seconds after
    /// disbursal. Returns its id.
    pub fn request_loan(
        &mut self,
        requester: &Address,
        name: String,
        purpose: String,
        amount: Amount,
        duration: u64,
        now: Timestamp,
    ) -> Result<LoanId> {
        rules::check_loan_request(&name, &purpose, amount, duration)?;

        let id = self.storage.next_loan_id();
        self.storage.push_loan(LoanRequest {
            id,
            requester: requester.clone(),
            name,
            purpose,
            amount,
            duration,
            amount_collected: 0,
            amount_repaid: 0,
            lenders: Vec::new(),
            created_at: now,
            disbursed_at: None,
        });
        Ok(id)
    }

    pub fn fund_loan(
        &mut self,
        lender: &Address,
        loan_id: LoanId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<CallOutcome> {
        let loan = self.storage.load_loan_mut(loan_id)?;
        rules::check_loan_funding(loan, lender, amount)?;

        loan.amount_collected += amount;
        loan.lenders.push(LoanContribution {
            lender: lender.clone(),
            amount,
            timestamp: now,
        });
        Ok(CallOutcome::LoanFunded {
            loan_id,
            amount_collected: loan.amount_collected,
            phase: loan.phase(now),
        })
    }

    /// Disburse the collected principal to the borrower and start the
    /// repayment clock. A repeated call disburses zero.
    pub fn withdraw_loan(
        &mut self,
        actor: &Address,
        loan_id: LoanId,
        now: Timestamp,
    ) -> Result<Amount> {
        let loan = self.storage.load_loan_mut(loan_id)?;
        let disbursed = rules::check_loan_withdrawal(loan, actor)?;
        if disbursed > 0 {
            loan.disbursed_at = Some(now);
        }
        Ok(disbursed)
    }

    /// Record a repayment. Returns the principal still owed.
    pub fn repay_loan(&mut self, loan_id: LoanId, amount: Amount) -> Result<Amount> {
        let loan = self.storage.load_loan_mut(loan_id)?;
        let outstanding = rules::check_repayment(loan, amount)?;
        loan.amount_repaid += amount;
        Ok(outstanding)
    }

    fn require_verifier(&self, actor: &Address, operation: &str) -> Result<()> {
        rules::check_verifier(self.storage.is_verifier(actor), actor, operation)
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    pub fn asset_count(&self) -> u64 {
        self.storage.asset_count()
    }

    pub fn asset(&self, id: AssetId) -> Result<AssetRecord> {
        self.storage.load_asset(id).cloned()
    }

    pub fn funders(&self, id: AssetId) -> Result<Vec<FunderRecord>> {
        self.storage.load_asset(id)?;
        Ok(self.storage.funders(id).to_vec())
    }

    pub fn documents(&self, id: AssetId) -> Result<Vec<DocumentRecord>> {
        self.storage.load_asset(id)?;
        Ok(self.storage.documents(id).to_vec())
    }

    pub fn milestones(&self, id: AssetId) -> Result<Vec<Milestone>> {
        self.storage.load_asset(id)?;
        Ok(self.storage.milestones(id).to_vec())
    }

    pub fn certificate(&self, token_id: TokenId) -> Option<Certificate> {
        self.storage.certificate(token_id).cloned()
    }

    pub fn certificates_of(&self, investor: &Address) -> Vec<Certificate> {
        self.storage.certificates_of(investor)
    }

    pub fn verification_status(&self, address: &Address) -> VerificationStatus {
        self.storage.verification_status(address)
    }

    pub fn verification_requests(&self) -> Vec<VerificationRequest> {
        self.storage.requests().to_vec()
    }

    pub fn verified_users(&self) -> Vec<VerifiedUser> {
        self.storage.verified().to_vec()
    }

    pub fn is_verifier(&self, address: &Address) -> bool {
        self.storage.is_verifier(address)
    }

    pub fn loan_count(&self) -> u64 {
        self.storage.loans().len() as u64
    }

    pub fn loan(&self, id: LoanId) -> Result<LoanRequest> {
        self.storage.load_loan(id).cloned()
    }
}
