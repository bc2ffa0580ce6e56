//! Ledger rejection reasons and their coarse taxonomy.

use serde::Serialize;
use thiserror::Error;

use crate::types::{Amount, AssetId, LoanId, MilestoneId};

/// Coarse classification every error in the system maps onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape or range.
    Validation,
    /// Capability check failed.
    Unauthorized,
    /// Operation invalid in the current lifecycle state.
    StateConflict,
    /// Allocation or withdrawal exceeds the available balance.
    InsufficientFunds,
    /// Ledger or evidence store unreachable, or timed out.
    ExternalUnavailable,
    /// Referenced entity absent.
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::StateConflict => "state_conflict",
            Self::InsufficientFunds => "insufficient_funds",
            Self::ExternalUnavailable => "external_unavailable",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a proof reference is required to complete a milestone")]
    ProofRequired,

    #[error("{actor} is not allowed to {operation}")]
    Unauthorized { actor: String, operation: String },

    #[error("a verification request is already pending for this address")]
    AlreadyPending,

    #[error("address is already verified")]
    AlreadyApproved,

    #[error("no pending verification request for {0}")]
    NoPendingRequest(String),

    #[error("funding deadline has passed")]
    DeadlinePassed,

    #[error("funding target already reached")]
    TargetReached,

    #[error("funding deadline has not been reached yet")]
    DeadlineNotReached,

    #[error("funding target was not met")]
    TargetNotMet,

    #[error("not eligible for a refund")]
    RefundNotEligible,

    #[error("milestone {0} is already completed")]
    AlreadyCompleted(MilestoneId),

    #[error("asset {0} is already verified")]
    AlreadyVerified(AssetId),

    #[error("asset {0} failed to reach its target and is closed")]
    AssetClosed(AssetId),

    #[error(
        "not enough funds available: requested {requested}, remaining headroom is {available}"
    )]
    InsufficientAvailableFunds { requested: Amount, available: Amount },

    #[error("amount overflow")]
    Overflow,

    #[error("asset {0} not found")]
    AssetNotFound(AssetId),

    #[error("milestone {milestone} not found on asset {asset}")]
    MilestoneNotFound { asset: AssetId, milestone: MilestoneId },

    #[error("loan {0} is already fully funded")]
    LoanFullyFunded(LoanId),

    #[error("loan {loan} needs only {remaining} more, {requested} offered")]
    LoanOverfunded {
        loan: LoanId,
        requested: Amount,
        remaining: Amount,
    },

    #[error("loan {0} is not fully funded yet")]
    LoanNotFunded(LoanId),

    #[error("loan {0} has not been disbursed")]
    LoanNotDisbursed(LoanId),

    #[error("loan {0} is already repaid")]
    LoanRepaid(LoanId),

    #[error("repayment of {requested} exceeds the outstanding {outstanding}")]
    RepaymentExceedsBalance { requested: Amount, outstanding: Amount },

    #[error("loan {0} not found")]
    LoanNotFound(LoanId),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidProfile(_)
            | Self::InvalidAmount
            | Self::InvalidInput(_)
            | Self::ProofRequired
            | Self::RepaymentExceedsBalance { .. }
            | Self::Overflow => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::AlreadyPending
            | Self::AlreadyApproved
            | Self::NoPendingRequest(_)
            | Self::DeadlinePassed
            | Self::TargetReached
            | Self::DeadlineNotReached
            | Self::TargetNotMet
            | Self::RefundNotEligible
            | Self::AlreadyCompleted(_)
            | Self::AlreadyVerified(_)
            | Self::AssetClosed(_)
            | Self::LoanFullyFunded(_)
            | Self::LoanNotFunded(_)
            | Self::LoanNotDisbursed(_)
            | Self::LoanRepaid(_) => ErrorKind::StateConflict,
            Self::InsufficientAvailableFunds { .. } | Self::LoanOverfunded { .. } => {
                ErrorKind::InsufficientFunds
            }
            Self::AssetNotFound(_) | Self::MilestoneNotFound { .. } | Self::LoanNotFound(_) => {
                ErrorKind::NotFound
            }
        }
    }

    pub(crate) fn unauthorized(actor: &crate::Address, operation: &str) -> Self {
        Self::Unauthorized {
            actor: actor.to_string(),
            operation: operation.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
