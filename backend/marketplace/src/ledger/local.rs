//! In-process ledger backed by [`LedgerBook`] and an optional SQLite journal.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use equinex_ledger::{
    Address, AssetId, AssetRecord, CallOutcome, Certificate, DocumentRecord, FunderRecord,
    LedgerBook, LedgerCall, LoanId, LoanRequest, Milestone, VerificationRequest,
    VerificationStatus, VerifiedUser,
};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Ledger, TxHash};
use crate::clock::Clock;
use crate::db::{self, JournalEntry};
use crate::errors::{MarketError, Result};

/// Unconfirmed outcomes kept before the oldest are dropped.
const RECEIPT_CAPACITY: usize = 4_096;

/// Outcomes of applied calls awaiting confirmation. Confirming removes the
/// entry; abandoned ones age out once `capacity` newer calls arrive.
struct Receipts {
    by_tx: HashMap<TxHash, CallOutcome>,
    order: VecDeque<TxHash>,
    capacity: usize,
}

impl Receipts {
    fn new(capacity: usize) -> Self {
        Self {
            by_tx: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn insert(&mut self, tx: TxHash, outcome: CallOutcome) {
        self.order.push_back(tx.clone());
        self.by_tx.insert(tx, outcome);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.by_tx.remove(&oldest);
            }
        }
    }

    fn take(&mut self, tx: &TxHash) -> Option<CallOutcome> {
        self.by_tx.remove(tx)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_tx.len()
    }
}

struct Shared {
    /// Held across the journal write so journal order equals apply order.
    book: Mutex<LedgerBook>,
    receipts: StdMutex<Receipts>,
    seq: AtomicU64,
    clock: Arc<dyn Clock>,
    journal: Option<SqlitePool>,
}

impl Shared {
    fn receipts(&self) -> Result<std::sync::MutexGuard<'_, Receipts>> {
        self.receipts
            .lock()
            .map_err(|_| MarketError::Unavailable("receipt store lock poisoned".to_string()))
    }

    /// Journal `call`, then apply it. Runs on its own task so that a
    /// journaled call is always applied or its row removed.
    async fn journal_and_apply(&self, actor: &Address, call: LedgerCall) -> Result<TxHash> {
        let mut book = self.book.lock().await;
        let now = self.clock.now();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let call_json = serde_json::to_string(&call)?;
        let tx = TxHash::derive(seq, actor, &call_json);
        let operation = call.name();

        if let Some(pool) = &self.journal {
            let entry = JournalEntry {
                seq: seq as i64,
                tx_hash: tx.as_str().to_string(),
                actor: actor.as_str().to_string(),
                operation: operation.to_string(),
                call_json,
                applied_at: now as i64,
            };
            db::append_entry(pool, &entry).await?;
        }

        match book.apply(actor, call, now) {
            Ok(outcome) => {
                debug!(%tx, operation, "Call applied");
                self.receipts()?.insert(tx.clone(), outcome);
                Ok(tx)
            }
            Err(e) => {
                // A rejected call is rejected again on replay, so a failed
                // delete leaves the journal correct.
                if let Some(pool) = &self.journal {
                    if let Err(db_err) = db::delete_entry(pool, tx.as_str()).await {
                        warn!(%tx, operation, "Could not drop rejected journal entry: {db_err}");
                    }
                }
                Err(e.into())
            }
        }
    }
}

pub struct LocalLedger {
    shared: Arc<Shared>,
}

impl LocalLedger {
    /// A ledger that keeps its state in memory only.
    pub fn new(book: LedgerBook, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(book, 0, clock, None)
    }

    /// Rebuild ledger state by replaying the journal on top of `book`, then
    /// keep journaling every accepted call.
    pub async fn restore(
        pool: SqlitePool,
        mut book: LedgerBook,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let entries = db::load_entries(&pool).await?;
        let mut replayed = 0usize;

        for entry in &entries {
            let call: LedgerCall = serde_json::from_str(&entry.call_json)?;
            let actor = Address::new(entry.actor.as_str());
            match book.apply(&actor, call, entry.applied_at.max(0) as u64) {
                Ok(_) => replayed += 1,
                Err(e) => warn!(
                    seq = entry.seq,
                    operation = %entry.operation,
                    "Journal entry rejected on replay: {e}"
                ),
            }
        }

        let last = db::last_seq(&pool).await?;
        info!("Replayed {replayed}/{} journal entries", entries.len());
        Ok(Self::assemble(book, last.max(0) as u64, clock, Some(pool)))
    }

    fn assemble(
        book: LedgerBook,
        seq: u64,
        clock: Arc<dyn Clock>,
        journal: Option<SqlitePool>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                book: Mutex::new(book),
                receipts: StdMutex::new(Receipts::new(RECEIPT_CAPACITY)),
                seq: AtomicU64::new(seq),
                clock,
                journal,
            }),
        }
    }

    async fn book(&self) -> tokio::sync::MutexGuard<'_, LedgerBook> {
        self.shared.book.lock().await
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    async fn submit(&self, actor: &Address, call: LedgerCall) -> Result<TxHash> {
        // Dropping this future only stops the wait; the task still finishes.
        let shared = self.shared.clone();
        let actor = actor.clone();
        tokio::spawn(async move { shared.journal_and_apply(&actor, call).await })
            .await
            .map_err(|e| MarketError::Unavailable(format!("ledger submission aborted: {e}")))?
    }

    async fn confirm(&self, tx: &TxHash) -> Result<CallOutcome> {
        self.shared
            .receipts()?
            .take(tx)
            .ok_or_else(|| MarketError::UnknownTransaction(tx.to_string()))
    }

    async fn asset_count(&self) -> Result<u64> {
        Ok(self.book().await.asset_count())
    }

    async fn asset(&self, id: AssetId) -> Result<AssetRecord> {
        Ok(self.book().await.asset(id)?)
    }

    async fn funders(&self, id: AssetId) -> Result<Vec<FunderRecord>> {
        Ok(self.book().await.funders(id)?)
    }

    async fn documents(&self, id: AssetId) -> Result<Vec<DocumentRecord>> {
        Ok(self.book().await.documents(id)?)
    }

    async fn milestones(&self, id: AssetId) -> Result<Vec<Milestone>> {
        Ok(self.book().await.milestones(id)?)
    }

    async fn certificates(&self, investor: &Address) -> Result<Vec<Certificate>> {
        Ok(self.book().await.certificates_of(investor))
    }

    async fn verification_status(&self, address: &Address) -> Result<VerificationStatus> {
        Ok(self.book().await.verification_status(address))
    }

    async fn verification_requests(&self) -> Result<Vec<VerificationRequest>> {
        Ok(self.book().await.verification_requests())
    }

    async fn verified_users(&self) -> Result<Vec<VerifiedUser>> {
        Ok(self.book().await.verified_users())
    }

    async fn is_verifier(&self, address: &Address) -> Result<bool> {
        Ok(self.book().await.is_verifier(address))
    }

    async fn loan_count(&self) -> Result<u64> {
        Ok(self.book().await.loan_count())
    }

    async fn loan(&self, id: LoanId) -> Result<LoanRequest> {
        Ok(self.book().await.loan(id)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use equinex_ledger::{ErrorKind, LedgerError};

    const NOW: u64 = 1_700_000_000;

    fn create(title: &str) -> LedgerCall {
        LedgerCall::CreateAsset {
            title: title.to_string(),
            description: "desc".to_string(),
            target: 10,
            deadline: NOW + 100,
        }
    }

    #[tokio::test]
    async fn submit_then_confirm() {
        let ledger = LocalLedger::new(LedgerBook::new(), Arc::new(ManualClock::at(NOW)));
        let owner = Address::new("0xowner");

        let tx = ledger.submit(&owner, create("Farm")).await.unwrap();
        let outcome = ledger.confirm(&tx).await.unwrap();
        assert_eq!(outcome, CallOutcome::AssetCreated { asset_id: 0 });
        assert_eq!(ledger.asset(0).await.unwrap().created_at, NOW);
    }

    #[tokio::test]
    async fn confirmation_consumes_the_receipt() {
        let ledger = LocalLedger::new(LedgerBook::new(), Arc::new(ManualClock::at(NOW)));
        let tx = ledger.submit(&Address::new("0xowner"), create("Farm")).await.unwrap();
        ledger.confirm(&tx).await.unwrap();

        let err = ledger.confirm(&tx).await.unwrap_err();
        assert!(matches!(err, MarketError::UnknownTransaction(_)));
        assert_eq!(ledger.shared.receipts().unwrap().len(), 0);
    }

    #[test]
    fn abandoned_receipts_age_out() {
        let mut receipts = Receipts::new(2);
        for id in 0..3 {
            receipts.insert(
                TxHash::from_raw(format!("0x{id}")),
                CallOutcome::AssetCreated { asset_id: id },
            );
        }
        assert_eq!(receipts.len(), 2);
        assert!(receipts.take(&TxHash::from_raw("0x0")).is_none());
        assert_eq!(
            receipts.take(&TxHash::from_raw("0x2")),
            Some(CallOutcome::AssetCreated { asset_id: 2 })
        );
    }

    #[tokio::test]
    async fn abandoned_submission_is_applied_with_its_journal_row() {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        let clock = Arc::new(ManualClock::at(NOW));
        let owner = Address::new("0xowner");
        let ledger = LocalLedger::restore(pool.clone(), LedgerBook::new(), clock.clone())
            .await
            .unwrap();

        // Poll the submission once, then drop it as a timed-out caller would.
        let finished = {
            let submit = ledger.submit(&owner, create("Farm"));
            tokio::pin!(submit);
            tokio::select! {
                biased;
                _ = &mut submit => true,
                _ = std::future::ready(()) => false,
            }
        };
        assert!(!finished);

        for _ in 0..400 {
            if ledger.asset_count().await.unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ledger.asset_count().await.unwrap(), 1);
        assert_eq!(db::load_entries(&pool).await.unwrap().len(), 1);

        drop(ledger);
        let restored = LocalLedger::restore(pool, LedgerBook::new(), clock).await.unwrap();
        assert_eq!(restored.asset_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let ledger = LocalLedger::new(LedgerBook::new(), Arc::new(ManualClock::at(NOW)));
        let err = ledger.confirm(&TxHash::from_raw("0xdead")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn rejected_calls_surface_ledger_errors() {
        let ledger = LocalLedger::new(LedgerBook::new(), Arc::new(ManualClock::at(NOW)));
        let err = ledger
            .submit(&Address::new("0xa"), LedgerCall::Withdraw { asset_id: 9 })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Ledger(LedgerError::AssetNotFound(9))));
    }

    #[tokio::test]
    async fn restore_replays_accepted_calls_only() {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        let clock = Arc::new(ManualClock::at(NOW));
        let owner = Address::new("0xowner");
        let investor = Address::new("0xinvestor");

        let ledger = LocalLedger::restore(pool.clone(), LedgerBook::new(), clock.clone())
            .await
            .unwrap();
        ledger.submit(&owner, create("Farm")).await.unwrap();
        let fund_tx = ledger
            .submit(&investor, LedgerCall::Fund { asset_id: 0, amount: 4 })
            .await
            .unwrap();
        ledger
            .submit(&investor, LedgerCall::Fund { asset_id: 0, amount: 0 })
            .await
            .unwrap_err();
        drop(ledger);

        assert_eq!(db::load_entries(&pool).await.unwrap().len(), 2);

        clock.advance(1_000);
        let restored = LocalLedger::restore(pool, LedgerBook::new(), clock).await.unwrap();
        let asset = restored.asset(0).await.unwrap();
        assert_eq!(asset.amount_collected, 4);
        assert_eq!(asset.created_at, NOW);
        // Receipts belong to the process that submitted the call.
        assert!(restored.confirm(&fund_tx).await.is_err());

        // Sequence continues after the replayed entries.
        let tx = restored
            .submit(&investor, LedgerCall::Refund { asset_id: 0 })
            .await
            .unwrap();
        assert!(matches!(
            restored.confirm(&tx).await.unwrap(),
            CallOutcome::Refunded { amount: 4, .. }
        ));
    }
}
