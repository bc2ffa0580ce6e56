//! Ledger query gateway: de-normalized read views with partial results.
//!
//! Aggregate reads are assembled from independent sub-fetches. Each one runs
//! under the read timeout; a failed sub-fetch yields the slice's default value
//! tagged [`FetchStatus::Failed`] instead of failing the whole view, so callers
//! can tell "genuinely empty" from "could not fetch".

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use equinex_ledger::{
    Address, Amount, AssetId, AssetPhase, AssetRecord, Certificate, FunderRecord, Milestone,
    Timestamp, VerificationRequest, VerificationStatus, VerifiedUser,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::documents::DocumentView;
use crate::errors::{MarketError, Result};
use crate::evidence::EvidenceStore;
use crate::loans::LoanView;
use crate::metadata::{self, AssetMetadata};
use crate::milestones::Allocation;
use crate::writer::LedgerWriter;

// ─────────────────────────────────────────────────────────
// Partial results
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum FetchStatus {
    Complete,
    Failed(String),
}

/// A slice of an aggregate view together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partial<T> {
    pub value: T,
    pub status: FetchStatus,
}

impl<T> Partial<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            status: FetchStatus::Complete,
        }
    }

    pub fn failed(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            status: FetchStatus::Failed(reason.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == FetchStatus::Complete
    }
}

// ─────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────

/// An asset with its listing metadata decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetView {
    pub id: AssetId,
    pub owner: Address,
    pub title: String,
    pub summary: String,
    pub metadata: AssetMetadata,
    #[serde(with = "equinex_ledger::base_units")]
    pub target: Amount,
    #[serde(with = "equinex_ledger::base_units")]
    pub amount_collected: Amount,
    #[serde(with = "equinex_ledger::base_units")]
    pub amount_released: Amount,
    pub deadline: Timestamp,
    pub is_verified: bool,
    pub phase: AssetPhase,
    pub created_at: Timestamp,
}

impl AssetView {
    pub fn from_record(record: AssetRecord, now: Timestamp) -> Self {
        let listing = metadata::decode(&record.title, &record.description);
        Self {
            id: record.id,
            phase: record.phase(now),
            owner: record.owner,
            title: listing.title,
            summary: listing.summary,
            metadata: listing.metadata,
            target: record.target,
            amount_collected: record.amount_collected,
            amount_released: record.amount_released,
            deadline: record.deadline,
            is_verified: record.is_verified,
            created_at: record.created_at,
        }
    }

    pub fn is_ip_asset(&self) -> bool {
        self.metadata.is_ip_asset()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    #[default]
    All,
    Startup,
    Ip,
}

impl ListingKind {
    fn admits(self, view: &AssetView) -> bool {
        match self {
            Self::All => true,
            Self::Startup => !view.is_ip_asset(),
            Self::Ip => view.is_ip_asset(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetDetail {
    pub asset: AssetView,
    pub funders: Partial<Vec<FunderRecord>>,
    pub documents: Partial<Vec<DocumentView>>,
    pub milestones: Partial<Vec<Milestone>>,
    pub allocation: Partial<Allocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioStats {
    #[serde(with = "equinex_ledger::base_units")]
    pub total_invested: Amount,
    pub investment_count: usize,
    pub asset_count: usize,
    pub earliest_investment: Option<Timestamp>,
}

impl PortfolioStats {
    pub fn of(certificates: &[Certificate]) -> Self {
        let assets: BTreeSet<AssetId> = certificates.iter().map(|c| c.asset_id).collect();
        Self {
            total_invested: certificates.iter().map(|c| c.amount).sum(),
            investment_count: certificates.len(),
            asset_count: assets.len(),
            earliest_investment: certificates.iter().map(|c| c.timestamp).min(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub investor: Address,
    pub certificates: Partial<Vec<Certificate>>,
    pub startups: Partial<Vec<AssetView>>,
    pub ip_assets: Partial<Vec<AssetView>>,
    pub stats: Partial<PortfolioStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOverview {
    pub requests: Partial<Vec<VerificationRequest>>,
    pub verified: Partial<Vec<VerifiedUser>>,
}

impl VerificationOverview {
    pub fn pending(&self) -> impl Iterator<Item = &VerificationRequest> {
        self.requests
            .value
            .iter()
            .filter(|r| r.status == VerificationStatus::Pending)
    }
}

// ─────────────────────────────────────────────────────────
// In-flight guard
// ─────────────────────────────────────────────────────────

/// Who is asking for an aggregate read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caller {
    /// A client instance, identified by the id it presents.
    Client(String),
    /// A caller without an id. Its reads are never deduplicated.
    Anonymous,
}

impl Caller {
    pub fn client(id: impl Into<String>) -> Self {
        Self::Client(id.into())
    }
}

type InFlightKey = (String, String);
type InFlightSet = Arc<Mutex<HashSet<InFlightKey>>>;

/// Marks an aggregate read of one client as running until dropped.
struct InFlight {
    key: InFlightKey,
    set: InFlightSet,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.key);
    }
}

// ─────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct QueryGateway {
    writer: LedgerWriter,
    evidence: Arc<dyn EvidenceStore>,
    clock: Arc<dyn Clock>,
    in_flight: InFlightSet,
}

impl QueryGateway {
    pub fn new(
        writer: LedgerWriter,
        evidence: Arc<dyn EvidenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            writer,
            evidence,
            clock,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Refuse a read `caller` already has running for `resource`.
    fn begin(&self, caller: &Caller, resource: String) -> Result<Option<InFlight>> {
        let client = match caller {
            Caller::Client(id) => id.clone(),
            Caller::Anonymous => return Ok(None),
        };
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (client, resource);
        if !set.insert(key.clone()) {
            return Err(MarketError::FetchInProgress(key.1));
        }
        Ok(Some(InFlight {
            key,
            set: self.in_flight.clone(),
        }))
    }

    /// Run one sub-fetch, falling back to the default on failure.
    async fn slice<T, F>(&self, name: &'static str, fut: F) -> Partial<T>
    where
        T: Default,
        F: Future<Output = Result<T>>,
    {
        match self.writer.read(name, fut).await {
            Ok(value) => Partial::complete(value),
            Err(e) => {
                warn!(slice = name, "Sub-fetch failed, using default: {e}");
                Partial::failed(T::default(), e.to_string())
            }
        }
    }

    /// Fetch the given assets one by one; failed ids are reported in the status.
    async fn assets_by_id<I>(&self, ids: I, kind: ListingKind) -> Partial<Vec<AssetView>>
    where
        I: IntoIterator<Item = AssetId>,
    {
        let now = self.clock.now();
        let mut views = Vec::new();
        let mut failed = Vec::new();
        for id in ids {
            match self.writer.read("asset", self.writer.ledger().asset(id)).await {
                Ok(record) => {
                    let view = AssetView::from_record(record, now);
                    if kind.admits(&view) {
                        views.push(view);
                    }
                }
                Err(e) => {
                    warn!(asset_id = id, "Asset fetch failed, omitting from list: {e}");
                    failed.push((id, e));
                }
            }
        }
        match failed.first() {
            None => Partial::complete(views),
            Some((_, first)) => {
                let ids: Vec<String> = failed.iter().map(|(id, _)| id.to_string()).collect();
                let reason = format!("assets {} unavailable: {first}", ids.join(", "));
                Partial::failed(views, reason)
            }
        }
    }

    /// All listed assets of the requested kind.
    pub async fn list_assets(
        &self,
        caller: &Caller,
        kind: ListingKind,
    ) -> Result<Partial<Vec<AssetView>>> {
        let _guard = self.begin(caller, format!("assets:{kind:?}"))?;
        let count = match self
            .writer
            .read("asset_count", self.writer.ledger().asset_count())
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(slice = "asset_count", "Sub-fetch failed, using default: {e}");
                return Ok(Partial::failed(Vec::new(), e.to_string()));
            }
        };
        debug!(count, "Listing assets");
        Ok(self.assets_by_id(0..count, kind).await)
    }

    /// One asset with its funders, documents and milestones. Fails only if
    /// the asset itself cannot be read.
    pub async fn asset_detail(&self, asset_id: AssetId) -> Result<AssetDetail> {
        let ledger = self.writer.ledger();
        let record = self.writer.read("asset", ledger.asset(asset_id)).await?;
        let collected = record.amount_collected;

        let (funders, documents, milestones) = tokio::join!(
            self.slice("funders", ledger.funders(asset_id)),
            self.slice("documents", ledger.documents(asset_id)),
            self.slice("milestones", ledger.milestones(asset_id)),
        );

        let documents = Partial {
            value: DocumentView::from_records(documents.value, self.evidence.as_ref()),
            status: documents.status,
        };
        let allocation = Partial {
            value: Allocation::of(collected, &milestones.value),
            status: milestones.status.clone(),
        };

        Ok(AssetDetail {
            asset: AssetView::from_record(record, self.clock.now()),
            funders,
            documents,
            milestones,
            allocation,
        })
    }

    /// An investor's certificates, the assets behind them and summary stats.
    pub async fn portfolio(&self, caller: &Caller, investor: &Address) -> Result<Portfolio> {
        let _guard = self.begin(caller, format!("portfolio:{investor}"))?;

        let certificates = self
            .slice("certificates", self.writer.ledger().certificates(investor))
            .await;

        let (startups, ip_assets, stats) = match &certificates.status {
            FetchStatus::Complete => {
                let ids: BTreeSet<AssetId> =
                    certificates.value.iter().map(|c| c.asset_id).collect();
                let assets = self.assets_by_id(ids, ListingKind::All).await;
                let (ip, startups): (Vec<_>, Vec<_>) =
                    assets.value.into_iter().partition(AssetView::is_ip_asset);
                (
                    Partial {
                        value: startups,
                        status: assets.status.clone(),
                    },
                    Partial {
                        value: ip,
                        status: assets.status,
                    },
                    Partial::complete(PortfolioStats::of(&certificates.value)),
                )
            }
            FetchStatus::Failed(reason) => {
                let reason = format!("certificates unavailable: {reason}");
                (
                    Partial::failed(Vec::new(), reason.clone()),
                    Partial::failed(Vec::new(), reason.clone()),
                    Partial::failed(PortfolioStats::default(), reason),
                )
            }
        };

        Ok(Portfolio {
            investor: investor.clone(),
            certificates,
            startups,
            ip_assets,
            stats,
        })
    }

    pub async fn verification_requests(&self) -> Partial<Vec<VerificationRequest>> {
        self.slice("verification_requests", self.writer.ledger().verification_requests())
            .await
    }

    pub async fn verified_users(&self) -> Partial<Vec<VerifiedUser>> {
        self.slice("verified_users", self.writer.ledger().verified_users())
            .await
    }

    pub async fn verification_overview(&self) -> VerificationOverview {
        let (requests, verified) =
            tokio::join!(self.verification_requests(), self.verified_users());
        VerificationOverview { requests, verified }
    }

    /// Every loan request, newest last. Failed ids are reported in the status.
    pub async fn list_loans(&self, caller: &Caller) -> Result<Partial<Vec<LoanView>>> {
        let _guard = self.begin(caller, "loans".to_string())?;
        let ledger = self.writer.ledger();
        let count = match self.writer.read("loan_count", ledger.loan_count()).await {
            Ok(count) => count,
            Err(e) => {
                warn!(slice = "loan_count", "Sub-fetch failed, using default: {e}");
                return Ok(Partial::failed(Vec::new(), e.to_string()));
            }
        };

        let now = self.clock.now();
        let mut views = Vec::new();
        let mut failed = Vec::new();
        for id in 0..count {
            match self.writer.read("loan", ledger.loan(id)).await {
                Ok(loan) => views.push(LoanView::of(loan, now)),
                Err(e) => {
                    warn!(loan_id = id, "Loan fetch failed, omitting from list: {e}");
                    failed.push(id.to_string());
                }
            }
        }
        if failed.is_empty() {
            Ok(Partial::complete(views))
        } else {
            let reason = format!("loans {} unavailable", failed.join(", "));
            Ok(Partial::failed(views, reason))
        }
    }
}
