//! Milestone carve-outs of collected funds and their verified completion.
//!
//! The headroom check here runs against a snapshot read moments earlier, so
//! two owners' sessions racing on the same asset can both pass it. The ledger
//! repeats the check under its own lock and rejects the loser; this service
//! only reports the error sooner in the common case.

use std::sync::Arc;

use equinex_ledger::{
    rules, Address, Amount, AssetId, CallOutcome, LedgerCall, LedgerError, Milestone, MilestoneId,
    Timestamp,
};
use serde::Serialize;

use crate::clock::Clock;
use crate::errors::Result;
use crate::evidence::EvidenceStore;
use crate::writer::{unexpected_outcome, LedgerWriter};

/// How an asset's collected funds are split between milestones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Allocation {
    #[serde(with = "equinex_ledger::base_units")]
    pub collected: Amount,
    #[serde(with = "equinex_ledger::base_units")]
    pub allocated: Amount,
    #[serde(with = "equinex_ledger::base_units")]
    pub available: Amount,
}

impl Allocation {
    pub fn of(collected: Amount, milestones: &[Milestone]) -> Self {
        let allocated = rules::allocated(milestones);
        Self {
            collected,
            allocated,
            available: collected.saturating_sub(allocated),
        }
    }
}

#[derive(Clone)]
pub struct MilestoneService {
    writer: LedgerWriter,
    evidence: Arc<dyn EvidenceStore>,
    clock: Arc<dyn Clock>,
}

impl MilestoneService {
    pub fn new(
        writer: LedgerWriter,
        evidence: Arc<dyn EvidenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            writer,
            evidence,
            clock,
        }
    }

    pub async fn list(&self, asset_id: AssetId) -> Result<Vec<Milestone>> {
        self.writer
            .read("milestones", self.writer.ledger().milestones(asset_id))
            .await
    }

    /// Funds not yet carved out. Read fresh from the ledger on every call.
    pub async fn available(&self, asset_id: AssetId) -> Result<Allocation> {
        let ledger = self.writer.ledger();
        let (asset, milestones) = tokio::try_join!(
            self.writer.read("asset", ledger.asset(asset_id)),
            self.writer.read("milestones", ledger.milestones(asset_id)),
        )?;
        Ok(Allocation::of(asset.amount_collected, &milestones))
    }

    pub async fn create(
        &self,
        owner: &Address,
        asset_id: AssetId,
        title: &str,
        description: &str,
        fund_amount: Amount,
    ) -> Result<MilestoneId> {
        let ledger = self.writer.ledger();
        let (asset, milestones) = tokio::try_join!(
            self.writer.read("asset", ledger.asset(asset_id)),
            self.writer.read("milestones", ledger.milestones(asset_id)),
        )?;
        let now = self.clock.now();
        rules::check_new_milestone(&asset, &milestones, owner, title, fund_amount, now)?;

        let call = LedgerCall::AddMilestone {
            asset_id,
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            fund_amount,
        };
        match self.writer.execute(owner, call).await? {
            CallOutcome::MilestoneAdded { milestone_id, .. } => Ok(milestone_id),
            other => Err(unexpected_outcome("add_milestone", &other)),
        }
    }

    /// Complete a milestone against an existing proof reference.
    pub async fn complete(
        &self,
        verifier: &Address,
        asset_id: AssetId,
        milestone_id: MilestoneId,
        proof: &str,
    ) -> Result<Timestamp> {
        self.precheck_completion(verifier, asset_id, milestone_id, Some(proof))
            .await?;

        let call = LedgerCall::CompleteMilestone {
            asset_id,
            milestone_id,
            proof: proof.trim().to_string(),
        };
        match self.writer.execute(verifier, call).await? {
            CallOutcome::MilestoneCompleted { completed_at, .. } => Ok(completed_at),
            other => Err(unexpected_outcome("complete_milestone", &other)),
        }
    }

    /// Upload the evidence file, then complete the milestone with its hash.
    /// Returns the proof hash and completion time.
    pub async fn complete_with_evidence(
        &self,
        verifier: &Address,
        asset_id: AssetId,
        milestone_id: MilestoneId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(String, Timestamp)> {
        if bytes.is_empty() {
            return Err(LedgerError::ProofRequired.into());
        }
        // Check before uploading so a doomed completion stores nothing.
        self.precheck_completion(verifier, asset_id, milestone_id, None)
            .await?;
        let proof = self.evidence.store(file_name, bytes).await?;
        let completed_at = self.complete(verifier, asset_id, milestone_id, &proof).await?;
        Ok((proof, completed_at))
    }

    async fn precheck_completion(
        &self,
        verifier: &Address,
        asset_id: AssetId,
        milestone_id: MilestoneId,
        proof: Option<&str>,
    ) -> Result<()> {
        let ledger = self.writer.ledger();
        let (holds, milestones) = tokio::try_join!(
            self.writer.read("is_verifier", ledger.is_verifier(verifier)),
            self.writer.read("milestones", ledger.milestones(asset_id)),
        )?;
        rules::check_verifier(holds, verifier, "complete milestones")?;
        let milestone = milestones
            .iter()
            .find(|m| m.id == milestone_id)
            .ok_or(LedgerError::MilestoneNotFound {
                asset: asset_id,
                milestone: milestone_id,
            })?;
        match proof {
            Some(proof) => rules::check_completion(milestone, proof)?,
            None if milestone.is_completed() => {
                return Err(LedgerError::AlreadyCompleted(milestone_id).into())
            }
            None => {}
        }
        Ok(())
    }
}
