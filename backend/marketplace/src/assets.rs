//! Listing startups and IP assets, and asset verification.

use std::sync::Arc;

use equinex_ledger::{rules, Address, Amount, AssetId, CallOutcome, LedgerCall, Timestamp};
use serde::Deserialize;

use crate::amount::parse_units;
use crate::clock::Clock;
use crate::errors::{MarketError, Result};
use crate::metadata::{self, EquityHolder, IpMetadata, StartupMetadata};
use crate::verification::VerificationService;
use crate::writer::{unexpected_outcome, LedgerWriter};

#[derive(Debug, Clone, Deserialize)]
pub struct StartupDraft {
    pub title: String,
    pub summary: String,
    /// Decimal string, e.g. `"10.5"`.
    pub target: String,
    pub deadline: Timestamp,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub video: String,
    #[serde(default)]
    pub equity_holders: Vec<EquityHolder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpAssetDraft {
    pub title: String,
    pub summary: String,
    pub target: String,
    pub deadline: Timestamp,
    #[serde(default)]
    pub metadata: IpMetadata,
}

#[derive(Clone)]
pub struct AssetService {
    writer: LedgerWriter,
    verification: VerificationService,
    clock: Arc<dyn Clock>,
}

impl AssetService {
    pub fn new(writer: LedgerWriter, clock: Arc<dyn Clock>) -> Self {
        Self {
            verification: VerificationService::new(writer.clone()),
            writer,
            clock,
        }
    }

    pub async fn create_startup(&self, owner: &Address, draft: StartupDraft) -> Result<AssetId> {
        let target = parse_units(&draft.target)?;
        rules::check_new_asset(&draft.title, target, draft.deadline, self.clock.now())?;
        check_equity(&draft.equity_holders)?;

        let description = metadata::encode_startup(
            &draft.summary,
            &StartupMetadata {
                image: draft.image,
                video: draft.video,
                equity_holders: draft.equity_holders,
            },
        )?;
        self.create(owner, draft.title.trim().to_string(), description, target, draft.deadline)
            .await
    }

    pub async fn create_ip_asset(&self, owner: &Address, draft: IpAssetDraft) -> Result<AssetId> {
        let target = parse_units(&draft.target)?;
        rules::check_new_asset(&draft.title, target, draft.deadline, self.clock.now())?;
        if draft.metadata.category.trim().is_empty() {
            return Err(MarketError::Metadata("IP category is required".to_string()));
        }

        let (title, description) =
            metadata::encode_ip(&draft.title, &draft.summary, &draft.metadata)?;
        self.create(owner, title, description, target, draft.deadline)
            .await
    }

    /// Mark an asset verified. Verifier only; a second call is a conflict.
    pub async fn verify(&self, verifier: &Address, asset_id: AssetId) -> Result<()> {
        self.verification
            .require_verifier(verifier, "verify assets")
            .await?;
        let asset = self
            .writer
            .read("asset", self.writer.ledger().asset(asset_id))
            .await?;
        rules::check_asset_verification(&asset)?;

        match self
            .writer
            .execute(verifier, LedgerCall::VerifyAsset { asset_id })
            .await?
        {
            CallOutcome::AssetVerified { .. } => Ok(()),
            other => Err(unexpected_outcome("verify_asset", &other)),
        }
    }

    async fn create(
        &self,
        owner: &Address,
        title: String,
        description: String,
        target: Amount,
        deadline: Timestamp,
    ) -> Result<AssetId> {
        let call = LedgerCall::CreateAsset {
            title,
            description,
            target,
            deadline,
        };
        match self.writer.execute(owner, call).await? {
            CallOutcome::AssetCreated { asset_id } => Ok(asset_id),
            other => Err(unexpected_outcome("create_asset", &other)),
        }
    }
}

fn check_equity(holders: &[EquityHolder]) -> Result<()> {
    if holders.iter().any(|h| h.name.trim().is_empty()) {
        return Err(MarketError::Metadata("equity holder name is required".to_string()));
    }
    let total: u64 = holders.iter().map(|h| u64::from(h.percentage)).sum();
    if total > 100 {
        return Err(MarketError::Metadata(format!(
            "equity percentages sum to {total}, more than 100"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(name: &str, percentage: u32) -> EquityHolder {
        EquityHolder {
            name: name.into(),
            percentage,
        }
    }

    #[test]
    fn equity_may_not_exceed_whole() {
        assert!(check_equity(&[]).is_ok());
        assert!(check_equity(&[holder("a", 60), holder("b", 40)]).is_ok());
        assert!(check_equity(&[holder("a", 60), holder("b", 41)]).is_err());
        assert!(check_equity(&[holder(" ", 10)]).is_err());
        assert!(check_equity(&[holder("a", u32::MAX), holder("b", 1)]).is_err());
        let maxed = [holder("a", u32::MAX), holder("b", u32::MAX), holder("c", u32::MAX)];
        assert!(check_equity(&maxed).is_err());
    }
}
