//! State-transition requests accepted by the ledger and the outcomes they
//! produce. Both are serializable so that applied calls can be journaled
//! and replayed.

use serde::{Deserialize, Serialize};

use crate::types::{
    Address, Amount, AssetId, LoanId, LoanPhase, MilestoneId, Profile, Timestamp, TokenId,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum LedgerCall {
    CreateAsset {
        title: String,
        description: String,
        #[serde(with = "crate::types::base_units")]
        target: Amount,
        deadline: Timestamp,
    },
    Fund {
        asset_id: AssetId,
        #[serde(with = "crate::types::base_units")]
        amount: Amount,
    },
    Withdraw {
        asset_id: AssetId,
    },
    Refund {
        asset_id: AssetId,
    },
    AddDocument {
        asset_id: AssetId,
        content_hash: String,
        document_type: String,
    },
    AddMilestone {
        asset_id: AssetId,
        title: String,
        description: String,
        #[serde(with = "crate::types::base_units")]
        fund_amount: Amount,
    },
    CompleteMilestone {
        asset_id: AssetId,
        milestone_id: MilestoneId,
        proof: String,
    },
    VerifyAsset {
        asset_id: AssetId,
    },
    SubmitVerificationRequest {
        profile: Profile,
    },
    ApproveVerification {
        address: Address,
    },
    RejectVerification {
        address: Address,
    },
    RequestLoan {
        name: String,
        purpose: String,
        #[serde(with = "crate::types::base_units")]
        amount: Amount,
        duration: u64,
    },
    FundLoan {
        loan_id: LoanId,
        #[serde(with = "crate::types::base_units")]
        amount: Amount,
    },
    WithdrawLoan {
        loan_id: LoanId,
    },
    RepayLoan {
        loan_id: LoanId,
        #[serde(with = "crate::types::base_units")]
        amount: Amount,
    },
}

impl LedgerCall {
    /// Contract entry-point name, used in logs and journal rows.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAsset { .. } => "create_asset",
            Self::Fund { .. } => "fund_asset",
            Self::Withdraw { .. } => "withdraw_funds",
            Self::Refund { .. } => "refund_investment",
            Self::AddDocument { .. } => "add_document",
            Self::AddMilestone { .. } => "add_milestone",
            Self::CompleteMilestone { .. } => "complete_milestone",
            Self::VerifyAsset { .. } => "verify_asset",
            Self::SubmitVerificationRequest { .. } => "submit_verification_request",
            Self::ApproveVerification { .. } => "approve_verification_request",
            Self::RejectVerification { .. } => "reject_verification_request",
            Self::RequestLoan { .. } => "request_loan",
            Self::FundLoan { .. } => "fund_loan",
            Self::WithdrawLoan { .. } => "withdraw_loan_funds",
            Self::RepayLoan { .. } => "repay_loan",
        }
    }

    /// Identifier of the entity the call targets, for logging.
    pub fn target(&self) -> String {
        match self {
            Self::CreateAsset { title, .. } => format!("new:{title}"),
            Self::Fund { asset_id, .. }
            | Self::Withdraw { asset_id }
            | Self::Refund { asset_id }
            | Self::AddDocument { asset_id, .. }
            | Self::AddMilestone { asset_id, .. }
            | Self::VerifyAsset { asset_id } => format!("asset:{asset_id}"),
            Self::CompleteMilestone {
                asset_id,
                milestone_id,
                ..
            } => format!("asset:{asset_id}/milestone:{milestone_id}"),
            Self::SubmitVerificationRequest { .. } => "verification:self".to_string(),
            Self::ApproveVerification { address } | Self::RejectVerification { address } => {
                format!("verification:{address}")
            }
            Self::RequestLoan { name, .. } => format!("new-loan:{name}"),
            Self::FundLoan { loan_id, .. }
            | Self::WithdrawLoan { loan_id }
            | Self::RepayLoan { loan_id, .. } => format!("loan:{loan_id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    AssetCreated {
        asset_id: AssetId,
    },
    Funded {
        asset_id: AssetId,
        token_id: TokenId,
        #[serde(with = "crate::types::base_units")]
        amount_collected: Amount,
    },
    Withdrawn {
        asset_id: AssetId,
        #[serde(with = "crate::types::base_units")]
        released: Amount,
    },
    Refunded {
        asset_id: AssetId,
        #[serde(with = "crate::types::base_units")]
        amount: Amount,
    },
    DocumentAdded {
        asset_id: AssetId,
        index: u64,
    },
    MilestoneAdded {
        asset_id: AssetId,
        milestone_id: MilestoneId,
    },
    MilestoneCompleted {
        asset_id: AssetId,
        milestone_id: MilestoneId,
        completed_at: Timestamp,
    },
    AssetVerified {
        asset_id: AssetId,
    },
    VerificationSubmitted {
        address: Address,
    },
    VerificationApproved {
        address: Address,
        already_approved: bool,
    },
    VerificationRejected {
        address: Address,
    },
    LoanRequested {
        loan_id: LoanId,
    },
    LoanFunded {
        loan_id: LoanId,
        #[serde(with = "crate::types::base_units")]
        amount_collected: Amount,
        phase: LoanPhase,
    },
    LoanWithdrawn {
        loan_id: LoanId,
        #[serde(with = "crate::types::base_units")]
        disbursed: Amount,
    },
    LoanRepaid {
        loan_id: LoanId,
        #[serde(with = "crate::types::base_units")]
        outstanding: Amount,
    },
}
