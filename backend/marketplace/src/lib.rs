//! # EquineX Marketplace
//!
//! Application layer over the EquineX ledger. Each service takes its ledger
//! client explicitly; there is no ambient state beyond what is wired here.
//!
//! ```text
//!   HTTP (api) ──► services ──► LedgerWriter ──► dyn Ledger ──► LedgerBook
//!                     │              (timeouts, logging)        (+ journal)
//!                     └──► dyn EvidenceStore (IPFS / memory)
//! ```
//!
//! Services pre-check every write against freshly read state using the same
//! rules the ledger enforces. The ledger remains the only arbiter: after a
//! write, callers re-read instead of patching local state.

pub mod amount;
pub mod api;
pub mod assets;
pub mod clock;
pub mod config;
pub mod db;
pub mod documents;
pub mod errors;
pub mod evidence;
pub mod funding;
pub mod gateway;
pub mod ledger;
pub mod loans;
pub mod metadata;
pub mod milestones;
pub mod verification;
pub mod writer;

use std::sync::Arc;

use assets::AssetService;
use clock::Clock;
use documents::DocumentService;
use evidence::EvidenceStore;
use funding::FundingService;
use gateway::QueryGateway;
use ledger::Ledger;
use loans::LoanService;
use milestones::MilestoneService;
use verification::VerificationService;
use writer::{LedgerWriter, Timeouts};

/// Every service, wired to one ledger, evidence store and clock.
#[derive(Clone)]
pub struct Marketplace {
    pub verification: VerificationService,
    pub funding: FundingService,
    pub milestones: MilestoneService,
    pub assets: AssetService,
    pub documents: DocumentService,
    pub loans: LoanService,
    pub gateway: QueryGateway,
}

impl Marketplace {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        evidence: Arc<dyn EvidenceStore>,
        clock: Arc<dyn Clock>,
        timeouts: Timeouts,
    ) -> Self {
        let writer = LedgerWriter::new(ledger, timeouts);
        Self {
            verification: VerificationService::new(writer.clone()),
            funding: FundingService::new(writer.clone(), clock.clone()),
            milestones: MilestoneService::new(writer.clone(), evidence.clone(), clock.clone()),
            assets: AssetService::new(writer.clone(), clock.clone()),
            documents: DocumentService::new(writer.clone(), evidence.clone()),
            loans: LoanService::new(writer.clone(), clock.clone()),
            gateway: QueryGateway::new(writer, evidence, clock),
        }
    }
}
