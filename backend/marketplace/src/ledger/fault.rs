//! Test ledger that fails or stalls chosen operations on demand.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use equinex_ledger::{
    Address, AssetId, AssetRecord, CallOutcome, Certificate, DocumentRecord, FunderRecord,
    LedgerCall, LoanId, LoanRequest, Milestone, VerificationRequest, VerificationStatus,
    VerifiedUser,
};

use super::{Ledger, LocalLedger, TxHash};
use crate::errors::{MarketError, Result};

pub struct FaultyLedger {
    inner: LocalLedger,
    failing: Mutex<HashSet<&'static str>>,
    stalled: Mutex<HashSet<&'static str>>,
}

impl FaultyLedger {
    pub fn new(inner: LocalLedger) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            stalled: Mutex::new(HashSet::new()),
        }
    }

    /// Make `op` return `Unavailable`.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Make `op` hang for an hour.
    pub fn stall(&self, op: &'static str) {
        self.stalled.lock().unwrap().insert(op);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.stalled.lock().unwrap().clear();
    }

    async fn gate(&self, op: &'static str) -> Result<()> {
        let stalled = self.stalled.lock().unwrap().contains(op);
        if stalled {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        if self.failing.lock().unwrap().contains(op) {
            return Err(MarketError::Unavailable(format!("{op} unreachable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for FaultyLedger {
    async fn submit(&self, actor: &Address, call: LedgerCall) -> Result<TxHash> {
        self.gate("submit").await?;
        self.inner.submit(actor, call).await
    }

    async fn confirm(&self, tx: &TxHash) -> Result<CallOutcome> {
        self.gate("confirm").await?;
        self.inner.confirm(tx).await
    }

    async fn asset_count(&self) -> Result<u64> {
        self.gate("asset_count").await?;
        self.inner.asset_count().await
    }

    async fn asset(&self, id: AssetId) -> Result<AssetRecord> {
        self.gate("asset").await?;
        self.inner.asset(id).await
    }

    async fn funders(&self, id: AssetId) -> Result<Vec<FunderRecord>> {
        self.gate("funders").await?;
        self.inner.funders(id).await
    }

    async fn documents(&self, id: AssetId) -> Result<Vec<DocumentRecord>> {
        self.gate("documents").await?;
        self.inner.documents(id).await
    }

    async fn milestones(&self, id: AssetId) -> Result<Vec<Milestone>> {
        self.gate("milestones").await?;
        self.inner.milestones(id).await
    }

    async fn certificates(&self, investor: &Address) -> Result<Vec<Certificate>> {
        self.gate("certificates").await?;
        self.inner.certificates(investor).await
    }

    async fn verification_status(&self, address: &Address) -> Result<VerificationStatus> {
        self.gate("verification_status").await?;
        self.inner.verification_status(address).await
    }

    async fn verification_requests(&self) -> Result<Vec<VerificationRequest>> {
        self.gate("verification_requests").await?;
        self.inner.verification_requests().await
    }

    async fn verified_users(&self) -> Result<Vec<VerifiedUser>> {
        self.gate("verified_users").await?;
        self.inner.verified_users().await
    }

    async fn is_verifier(&self, address: &Address) -> Result<bool> {
        self.gate("is_verifier").await?;
        self.inner.is_verifier(address).await
    }

    async fn loan_count(&self) -> Result<u64> {
        self.gate("loan_count").await?;
        self.inner.loan_count().await
    }

    async fn loan(&self, id: LoanId) -> Result<LoanRequest> {
        self.gate("loan").await?;
        self.inner.loan(id).await
    }
}
