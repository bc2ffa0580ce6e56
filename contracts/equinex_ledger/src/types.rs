//! # Types
//!
//! Shared data structures used across all modules of the EquineX ledger.
//!
//! ## Design decisions
//!
//! ### Amounts
//!
//! Every monetary value is an [`Amount`]: an unsigned integer in the ledger's
//! fixed-point base unit (18 decimals). Decimal strings only exist at the edges
//! of the system.
//!
//! ### Verification as a Finite-State Machine
//!
//! [`VerificationStatus`] enforces the per-address identity lifecycle:
//!
//! ```text
//! Unverified ──► Pending ──► Approved
//!                  │  ▲
//!                  ▼  │
//!               Rejected
//! ```
//!
//! `Approved` is terminal. A rejected address may resubmit, which overwrites
//! its previous request record.
//!
//! ### Asset phase
//!
//! An asset's [`AssetPhase`] is derived on every read from its deadline and
//! totals; it is never stored.
//!
//! ```text
//! Funding ──► Succeeded   (deadline passed, target met)
//!    └──────► Failed      (deadline passed, target missed)
//! ```
//!
//! ### Loan phase
//!
//! Loans follow the same rule: [`LoanPhase`] is derived from the totals and
//! the disbursal time.
//!
//! ```text
//! Open ──► Funded ──► Active ──► Repaid
//!                       └──► Overdue ──► Repaid
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed-point amount in ledger base units.
pub type Amount = u128;

/// Sequential asset identifier, starting at 0.
pub type AssetId = u64;

/// Milestone identifier, sequential per asset.
pub type MilestoneId = u64;

/// Investment certificate identifier, unique across the ledger.
pub type TokenId = u64;

/// Sequential loan request identifier, starting at 0.
pub type LoanId = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Number of fractional digits in a base-unit amount.
pub const AMOUNT_DECIMALS: u32 = 18;

/// Serializes [`Amount`]s as decimal strings of base units so that values
/// above 2^53 survive JSON consumers and serde's buffered enum decoding.
pub mod base_units {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// An account identity on the ledger (hex-encoded felt or any opaque string).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ─────────────────────────────────────────────────────────
// Assets
// ─────────────────────────────────────────────────────────

/// A fundable entity as the ledger stores it.
///
/// Title and description are opaque strings here; structured metadata is
/// layered on top by the application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub owner: Address,
    pub title: String,
    pub description: String,
    /// Funding target in base units.
    #[serde(with = "base_units")]
    pub target: Amount,
    /// Ledger timestamp after which funding closes.
    pub deadline: Timestamp,
    /// Sum of live (non-refunded) investments.
    #[serde(with = "base_units")]
    pub amount_collected: Amount,
    /// Amount already released to the owner. Never exceeds `amount_collected`.
    #[serde(with = "base_units")]
    pub amount_released: Amount,
    pub is_verified: bool,
    pub created_at: Timestamp,
}

impl AssetRecord {
    /// `true` once the ledger clock has reached the deadline.
    pub fn deadline_passed(&self, now: Timestamp) -> bool {
        now >= self.deadline
    }

    pub fn target_met(&self) -> bool {
        self.amount_collected >= self.target
    }

    pub fn phase(&self, now: Timestamp) -> AssetPhase {
        if !self.deadline_passed(now) {
            AssetPhase::Funding
        } else if self.target_met() {
            AssetPhase::Succeeded
        } else {
            AssetPhase::Failed
        }
    }
}

/// Derived lifecycle phase of an asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetPhase {
    /// Deadline not reached; accepting investments.
    Funding,
    /// Deadline passed with the target met; owner may withdraw.
    Succeeded,
    /// Deadline passed with the target missed; investors may claim refunds.
    Failed,
}

/// One investment into an asset. An investor may hold several.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunderRecord {
    pub funder: Address,
    #[serde(with = "base_units")]
    pub amount: Amount,
    pub token_id: TokenId,
    pub timestamp: Timestamp,
    /// Set once the investor has been refunded for this record.
    pub refunded: bool,
}

/// Investment certificate minted for every successful investment.
///
/// Immutable once minted; binds the investment to its asset and investor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub token_id: TokenId,
    pub asset_id: AssetId,
    pub investor: Address,
    #[serde(with = "base_units")]
    pub amount: Amount,
    pub timestamp: Timestamp,
}

/// A supporting document referenced by content hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub content_hash: String,
    pub document_type: String,
    pub uploaded_by: Address,
    pub timestamp: Timestamp,
}

// ─────────────────────────────────────────────────────────
// Milestones
// ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    InProgress,
    Completed,
}

/// A carve-out of an asset's collected funds, released on verified completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub title: String,
    pub description: String,
    #[serde(with = "base_units")]
    pub fund_amount: Amount,
    pub status: MilestoneStatus,
    /// Content hash of the completion evidence.
    pub proof: Option<String>,
    pub completion_date: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Milestone {
    pub fn is_completed(&self) -> bool {
        self.status == MilestoneStatus::Completed
    }
}

// ─────────────────────────────────────────────────────────
// Identity verification
// ─────────────────────────────────────────────────────────

/// Identity verification lifecycle of an address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Pending,
    Approved,
    Rejected,
}

/// Identity fields submitted with a verification request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub contact_info: String,
    pub social_link: String,
}

/// The current (latest) verification request of an address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub address: Address,
    pub profile: Profile,
    pub timestamp: Timestamp,
    pub status: VerificationStatus,
}

/// An address whose verification has been approved. Permanent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub address: Address,
    pub name: String,
    pub verification_date: Timestamp,
}

// ─────────────────────────────────────────────────────────
// Loans
// ─────────────────────────────────────────────────────────

/// One lender's contribution to a loan request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanContribution {
    pub lender: Address,
    #[serde(with = "base_units")]
    pub amount: Amount,
    pub timestamp: Timestamp,
}

/// A borrower's request for `amount`, funded by lenders and repaid after
/// disbursal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub id: LoanId,
    pub requester: Address,
    pub name: String,
    pub purpose: String,
    /// Principal requested. Lenders can never collectively exceed it.
    #[serde(with = "base_units")]
    pub amount: Amount,
    /// Seconds from disbursal until repayment is due.
    pub duration: u64,
    #[serde(with = "base_units")]
    pub amount_collected: Amount,
    #[serde(with = "base_units")]
    pub amount_repaid: Amount,
    pub lenders: Vec<LoanContribution>,
    pub created_at: Timestamp,
    /// Set when the borrower withdraws the collected principal.
    pub disbursed_at: Option<Timestamp>,
}

impl LoanRequest {
    pub fn fully_funded(&self) -> bool {
        self.amount_collected >= self.amount
    }

    pub fn remaining(&self) -> Amount {
        self.amount.saturating_sub(self.amount_collected)
    }

    pub fn is_disbursed(&self) -> bool {
        self.disbursed_at.is_some()
    }

    /// Principal still owed. Zero before disbursal.
    pub fn outstanding(&self) -> Amount {
        if self.is_disbursed() {
            self.amount_collected.saturating_sub(self.amount_repaid)
        } else {
            0
        }
    }

    pub fn due_at(&self) -> Option<Timestamp> {
        self.disbursed_at.map(|t| t.saturating_add(self.duration))
    }

    pub fn phase(&self, now: Timestamp) -> LoanPhase {
        match self.due_at() {
            None if self.fully_funded() => LoanPhase::Funded,
            None => LoanPhase::Open,
            Some(_) if self.outstanding() == 0 => LoanPhase::Repaid,
            Some(due) if now >= due => LoanPhase::Overdue,
            Some(_) => LoanPhase::Active,
        }
    }
}

/// Derived lifecycle phase of a loan request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanPhase {
    /// Accepting lender contributions.
    Open,
    /// Fully funded; the borrower may withdraw.
    Funded,
    /// Disbursed and not yet due.
    Active,
    /// Disbursed, past due and not fully repaid.
    Overdue,
    Repaid,
}
