//! Ledger client boundary.
//!
//! [`Ledger`] is the capability-gated interface the services talk to. Writes
//! are two-phase: [`Ledger::submit`] hands a [`LedgerCall`] over and returns a
//! [`TxHash`] once the ledger accepted it for processing, and
//! [`Ledger::confirm`] waits for and returns the typed [`CallOutcome`].
//!
//! Implementations must not retry internally. Timeouts are applied by the
//! caller (see [`crate::writer::LedgerWriter`]).

#[cfg(test)]
pub(crate) mod fault;
mod local;

pub use local::LocalLedger;

use std::fmt;

use async_trait::async_trait;
use equinex_ledger::{
    Address, AssetId, AssetRecord, CallOutcome, Certificate, DocumentRecord, FunderRecord,
    LedgerCall, LoanId, LoanRequest, Milestone, VerificationRequest, VerificationStatus,
    VerifiedUser,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::Result;

/// Transaction hash returned by a submission, `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Derive a hash from the submission sequence number, the signer and the
    /// serialized call.
    pub fn derive(seq: u64, actor: &Address, call_json: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seq.to_be_bytes());
        hasher.update(actor.as_str().as_bytes());
        hasher.update(call_json.as_bytes());
        Self(format!("0x{}", hex::encode(hasher.finalize())))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    // ── Writes ──────────────────────────────────────────────

    /// Submit a state transition signed by `actor`.
    ///
    /// Domain rejections surface here as [`crate::errors::MarketError::Ledger`].
    async fn submit(&self, actor: &Address, call: LedgerCall) -> Result<TxHash>;

    /// Wait for a submitted transition and return its outcome.
    async fn confirm(&self, tx: &TxHash) -> Result<CallOutcome>;

    // ── Reads ───────────────────────────────────────────────

    async fn asset_count(&self) -> Result<u64>;
    async fn asset(&self, id: AssetId) -> Result<AssetRecord>;
    async fn funders(&self, id: AssetId) -> Result<Vec<FunderRecord>>;
    async fn documents(&self, id: AssetId) -> Result<Vec<DocumentRecord>>;
    async fn milestones(&self, id: AssetId) -> Result<Vec<Milestone>>;
    async fn certificates(&self, investor: &Address) -> Result<Vec<Certificate>>;
    async fn verification_status(&self, address: &Address) -> Result<VerificationStatus>;
    async fn verification_requests(&self) -> Result<Vec<VerificationRequest>>;
    async fn verified_users(&self) -> Result<Vec<VerifiedUser>>;
    async fn is_verifier(&self, address: &Address) -> Result<bool>;
    async fn loan_count(&self) -> Result<u64>;
    async fn loan(&self, id: LoanId) -> Result<LoanRequest>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_hash_is_stable_and_sequence_dependent() {
        let actor = Address::new("0xabc");
        let a = TxHash::derive(1, &actor, "{}");
        let b = TxHash::derive(1, &actor, "{}");
        let c = TxHash::derive(2, &actor, "{}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("0x"));
        assert_eq!(a.as_str().len(), 66);
    }
}
