//! Investments, owner withdrawals and investor refunds.

use std::sync::Arc;

use equinex_ledger::{
    rules, Address, Amount, AssetId, CallOutcome, Certificate, LedgerCall, TokenId,
};
use serde::Serialize;

use crate::clock::Clock;
use crate::errors::Result;
use crate::writer::{unexpected_outcome, LedgerWriter};

/// Result of a confirmed investment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Investment {
    pub asset_id: AssetId,
    pub token_id: TokenId,
    #[serde(with = "equinex_ledger::base_units")]
    pub amount_collected: Amount,
}

#[derive(Clone)]
pub struct FundingService {
    writer: LedgerWriter,
    clock: Arc<dyn Clock>,
}

impl FundingService {
    pub fn new(writer: LedgerWriter, clock: Arc<dyn Clock>) -> Self {
        Self { writer, clock }
    }

    /// Invest `amount` base units and mint a certificate.
    pub async fn invest(
        &self,
        investor: &Address,
        asset_id: AssetId,
        amount: Amount,
    ) -> Result<Investment> {
        let asset = self
            .writer
            .read("asset", self.writer.ledger().asset(asset_id))
            .await?;
        rules::check_investment(&asset, amount, self.clock.now())?;

        let call = LedgerCall::Fund { asset_id, amount };
        match self.writer.execute(investor, call).await? {
            CallOutcome::Funded {
                asset_id,
                token_id,
                amount_collected,
            } => Ok(Investment {
                asset_id,
                token_id,
                amount_collected,
            }),
            other => Err(unexpected_outcome("fund_asset", &other)),
        }
    }

    /// Release everything collected to the owner. Returns the amount released
    /// by this call; zero once everything has been withdrawn.
    pub async fn withdraw(&self, owner: &Address, asset_id: AssetId) -> Result<Amount> {
        let asset = self
            .writer
            .read("asset", self.writer.ledger().asset(asset_id))
            .await?;
        rules::check_withdrawal(&asset, owner, self.clock.now())?;

        match self
            .writer
            .execute(owner, LedgerCall::Withdraw { asset_id })
            .await?
        {
            CallOutcome::Withdrawn { released, .. } => Ok(released),
            other => Err(unexpected_outcome("withdraw_funds", &other)),
        }
    }

    /// Return the investor's contributions to an asset that missed its target.
    pub async fn refund(&self, investor: &Address, asset_id: AssetId) -> Result<Amount> {
        let ledger = self.writer.ledger();
        let asset = self.writer.read("asset", ledger.asset(asset_id)).await?;
        let funders = self.writer.read("funders", ledger.funders(asset_id)).await?;
        rules::check_refund(&asset, &funders, investor, self.clock.now())?;

        match self
            .writer
            .execute(investor, LedgerCall::Refund { asset_id })
            .await?
        {
            CallOutcome::Refunded { amount, .. } => Ok(amount),
            other => Err(unexpected_outcome("refund_investment", &other)),
        }
    }

    /// Sum of the investor's live contributions to `asset_id`.
    pub async fn investment_amount(&self, investor: &Address, asset_id: AssetId) -> Result<Amount> {
        let funders = self
            .writer
            .read("funders", self.writer.ledger().funders(asset_id))
            .await?;
        Ok(rules::contributed_by(&funders, investor))
    }

    pub async fn has_invested_in(&self, investor: &Address, asset_id: AssetId) -> Result<bool> {
        Ok(self.investment_amount(investor, asset_id).await? > 0)
    }

    pub async fn certificates(&self, investor: &Address) -> Result<Vec<Certificate>> {
        self.writer
            .read("certificates", self.writer.ledger().certificates(investor))
            .await
    }
}
