//! Identity verification lifecycle:
//! `unverified → pending → {approved, rejected}`, `rejected → pending`.

use equinex_ledger::{rules, Address, CallOutcome, LedgerCall, Profile, VerificationStatus};

use crate::errors::Result;
use crate::writer::{unexpected_outcome, LedgerWriter};

#[derive(Clone)]
pub struct VerificationService {
    writer: LedgerWriter,
}

impl VerificationService {
    pub fn new(writer: LedgerWriter) -> Self {
        Self { writer }
    }

    /// Current status of `address`; unknown addresses are `Unverified`.
    pub async fn status(&self, address: &Address) -> Result<VerificationStatus> {
        self.writer
            .read("verification_status", self.writer.ledger().verification_status(address))
            .await
    }

    /// Submit (or resubmit after rejection) a verification request for `actor`.
    pub async fn submit_request(&self, actor: &Address, profile: Profile) -> Result<()> {
        rules::validate_profile(&profile)?;
        rules::check_submission(self.status(actor).await?)?;

        let call = LedgerCall::SubmitVerificationRequest { profile };
        match self.writer.execute(actor, call).await? {
            CallOutcome::VerificationSubmitted { .. } => Ok(()),
            other => Err(unexpected_outcome("submit_verification_request", &other)),
        }
    }

    /// Approve a pending request. Returns `true` if the address had already
    /// been approved, in which case nothing changed.
    pub async fn approve(&self, verifier: &Address, address: &Address) -> Result<bool> {
        self.require_verifier(verifier, "approve verification requests").await?;
        rules::check_approval(address, self.status(address).await?)?;

        let call = LedgerCall::ApproveVerification {
            address: address.clone(),
        };
        match self.writer.execute(verifier, call).await? {
            CallOutcome::VerificationApproved {
                already_approved, ..
            } => Ok(already_approved),
            other => Err(unexpected_outcome("approve_verification_request", &other)),
        }
    }

    pub async fn reject(&self, verifier: &Address, address: &Address) -> Result<()> {
        self.require_verifier(verifier, "reject verification requests").await?;
        rules::check_rejection(address, self.status(address).await?)?;

        let call = LedgerCall::RejectVerification {
            address: address.clone(),
        };
        match self.writer.execute(verifier, call).await? {
            CallOutcome::VerificationRejected { .. } => Ok(()),
            other => Err(unexpected_outcome("reject_verification_request", &other)),
        }
    }

    pub(crate) async fn require_verifier(&self, actor: &Address, operation: &str) -> Result<()> {
        let holds = self
            .writer
            .read("is_verifier", self.writer.ledger().is_verifier(actor))
            .await?;
        Ok(rules::check_verifier(holds, actor, operation)?)
    }
}
