//! Peer loans: requests, lender contributions, disbursal and repayment.

use std::sync::Arc;

use equinex_ledger::{
    rules, Address, Amount, CallOutcome, LedgerCall, LedgerError, LoanId, LoanPhase, LoanRequest,
    Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::amount::parse_units;
use crate::clock::Clock;
use crate::errors::Result;
use crate::writer::{unexpected_outcome, LedgerWriter};

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct LoanApplication {
    pub name: String,
    pub purpose: String,
    /// Decimal string, e.g. `"250"`.
    pub amount: String,
    pub duration_days: u64,
}

/// A loan request with its derived state at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: LoanRequest,
    pub phase: LoanPhase,
    pub due_at: Option<Timestamp>,
    #[serde(with = "equinex_ledger::base_units")]
    pub outstanding: Amount,
}

impl LoanView {
    pub fn of(loan: LoanRequest, now: Timestamp) -> Self {
        Self {
            phase: loan.phase(now),
            due_at: loan.due_at(),
            outstanding: loan.outstanding(),
            loan,
        }
    }
}

#[derive(Clone)]
pub struct LoanService {
    writer: LedgerWriter,
    clock: Arc<dyn Clock>,
}

impl LoanService {
    pub fn new(writer: LedgerWriter, clock: Arc<dyn Clock>) -> Self {
        Self { writer, clock }
    }

    pub async fn request(
        &self,
        requester: &Address,
        application: LoanApplication,
    ) -> Result<LoanId> {
        let amount = parse_units(&application.amount)?;
        let duration = application
            .duration_days
            .checked_mul(SECONDS_PER_DAY)
            .ok_or_else(|| LedgerError::InvalidInput("loan duration is too long".to_string()))?;
        rules::check_loan_request(&application.name, &application.purpose, amount, duration)?;

        let call = LedgerCall::RequestLoan {
            name: application.name.trim().to_string(),
            purpose: application.purpose.trim().to_string(),
            amount,
            duration,
        };
        match self.writer.execute(requester, call).await? {
            CallOutcome::LoanRequested { loan_id } => Ok(loan_id),
            other => Err(unexpected_outcome("request_loan", &other)),
        }
    }

    /// Lend `amount` base units. Returns the loan as it stands afterwards.
    pub async fn fund(
        &self,
        lender: &Address,
        loan_id: LoanId,
        amount: Amount,
    ) -> Result<LoanView> {
        let loan = self.loan_record(loan_id).await?;
        rules::check_loan_funding(&loan, lender, amount)?;

        match self
            .writer
            .execute(lender, LedgerCall::FundLoan { loan_id, amount })
            .await?
        {
            CallOutcome::LoanFunded { .. } => self.loan(loan_id).await,
            other => Err(unexpected_outcome("fund_loan", &other)),
        }
    }

    /// Disburse the collected principal to the requester. Zero once disbursed.
    pub async fn withdraw(&self, requester: &Address, loan_id: LoanId) -> Result<Amount> {
        let loan = self.loan_record(loan_id).await?;
        rules::check_loan_withdrawal(&loan, requester)?;

        match self
            .writer
            .execute(requester, LedgerCall::WithdrawLoan { loan_id })
            .await?
        {
            CallOutcome::LoanWithdrawn { disbursed, .. } => Ok(disbursed),
            other => Err(unexpected_outcome("withdraw_loan_funds", &other)),
        }
    }

    /// Repay part of a disbursed loan. Returns what is still outstanding.
    pub async fn repay(&self, payer: &Address, loan_id: LoanId, amount: Amount) -> Result<Amount> {
        let loan = self.loan_record(loan_id).await?;
        rules::check_repayment(&loan, amount)?;

        match self
            .writer
            .execute(payer, LedgerCall::RepayLoan { loan_id, amount })
            .await?
        {
            CallOutcome::LoanRepaid { outstanding, .. } => Ok(outstanding),
            other => Err(unexpected_outcome("repay_loan", &other)),
        }
    }

    pub async fn loan(&self, loan_id: LoanId) -> Result<LoanView> {
        let loan = self.loan_record(loan_id).await?;
        Ok(LoanView::of(loan, self.clock.now()))
    }

    async fn loan_record(&self, loan_id: LoanId) -> Result<LoanRequest> {
        self.writer
            .read("loan", self.writer.ledger().loan(loan_id))
            .await
    }
}
