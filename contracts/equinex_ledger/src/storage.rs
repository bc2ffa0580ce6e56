//! # Storage
//!
//! Typed helpers over the ledger's in-memory collections.
//!
//! | Collection        | Key                  | Value                     |
//! |-------------------|----------------------|---------------------------|
//! | `assets`          | `AssetId` (index)    | [`AssetRecord`]           |
//! | `funders`         | `AssetId`            | `Vec<FunderRecord>`       |
//! | `documents`       | `AssetId`            | `Vec<DocumentRecord>`     |
//! | `milestones`      | `AssetId`            | `Vec<Milestone>`          |
//! | `certificates`    | `TokenId`            | [`Certificate`]           |
//! | `holdings`        | `Address`            | `Vec<TokenId>`            |
//! | `requests`        | index                | [`VerificationRequest`]   |
//! | `request_index`   | `Address`            | index into `requests`     |
//! | `verified`        | index                | [`VerifiedUser`]          |
//! | `verifiers`       | `Address`            | verifier capability       |
//! | `loans`           | `LoanId` (index)     | [`LoanRequest`]           |
//!
//! Asset ids, loan ids and certificate token ids are auto-incremented from 0 and never
//! reused. A resubmitted verification request overwrites the slot its
//! address already occupies, so `requests` holds one record per address.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::{LedgerError, Result};
use crate::types::{
    Address, AssetId, AssetRecord, Certificate, DocumentRecord, FunderRecord, LoanId,
    LoanRequest, Milestone, MilestoneId, TokenId, VerificationRequest, VerificationStatus,
    VerifiedUser,
};

#[derive(Debug, Default)]
pub(crate) struct Storage {
    assets: Vec<AssetRecord>,
    funders: HashMap<AssetId, Vec<FunderRecord>>,
    documents: HashMap<AssetId, Vec<DocumentRecord>>,
    milestones: HashMap<AssetId, Vec<Milestone>>,
    certificates: BTreeMap<TokenId, Certificate>,
    holdings: HashMap<Address, Vec<TokenId>>,
    next_token_id: TokenId,
    requests: Vec<VerificationRequest>,
    request_index: HashMap<Address, usize>,
    verified: Vec<VerifiedUser>,
    verifiers: BTreeSet<Address>,
    loans: Vec<LoanRequest>,
}

impl Storage {
    // ── Assets ───────────────────────────────────────────────────────

    pub fn next_asset_id(&self) -> AssetId {
        self.assets.len() as AssetId
    }

    pub fn push_asset(&mut self, asset: AssetRecord) {
        self.assets.push(asset);
    }

    pub fn asset_count(&self) -> u64 {
        self.assets.len() as u64
    }

    pub fn load_asset(&self, id: AssetId) -> Result<&AssetRecord> {
        self.assets
            .get(id as usize)
            .ok_or(LedgerError::AssetNotFound(id))
    }

    pub fn load_asset_mut(&mut self, id: AssetId) -> Result<&mut AssetRecord> {
        self.assets
            .get_mut(id as usize)
            .ok_or(LedgerError::AssetNotFound(id))
    }

    // ── Funders & certificates ───────────────────────────────────────

    pub fn funders(&self, id: AssetId) -> &[FunderRecord] {
        self.funders.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn funders_mut(&mut self, id: AssetId) -> &mut Vec<FunderRecord> {
        self.funders.entry(id).or_default()
    }

    /// Reads, increments and stores the certificate counter.
    /// Returns the token id to use for the current investment.
    pub fn get_and_increment_token_id(&mut self) -> TokenId {
        let current = self.next_token_id;
        self.next_token_id += 1;
        current
    }

    pub fn save_certificate(&mut self, certificate: Certificate) {
        self.holdings
            .entry(certificate.investor.clone())
            .or_default()
            .push(certificate.token_id);
        self.certificates.insert(certificate.token_id, certificate);
    }

    pub fn certificate(&self, token_id: TokenId) -> Option<&Certificate> {
        self.certificates.get(&token_id)
    }

    pub fn certificates_of(&self, investor: &Address) -> Vec<Certificate> {
        self.holdings
            .get(investor)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|id| self.certificates.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Documents ────────────────────────────────────────────────────

    pub fn documents(&self, id: AssetId) -> &[DocumentRecord] {
        self.documents.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push_document(&mut self, id: AssetId, document: DocumentRecord) -> u64 {
        let docs = self.documents.entry(id).or_default();
        docs.push(document);
        (docs.len() - 1) as u64
    }

    // ── Milestones ───────────────────────────────────────────────────

    pub fn milestones(&self, id: AssetId) -> &[Milestone] {
        self.milestones.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn milestones_mut(&mut self, id: AssetId) -> &mut Vec<Milestone> {
        self.milestones.entry(id).or_default()
    }

    pub fn load_milestone_mut(
        &mut self,
        asset: AssetId,
        milestone: MilestoneId,
    ) -> Result<&mut Milestone> {
        self.milestones
            .get_mut(&asset)
            .and_then(|ms| ms.get_mut(milestone as usize))
            .ok_or(LedgerError::MilestoneNotFound { asset, milestone })
    }

    // ── Verification ─────────────────────────────────────────────────

    pub fn verification_status(&self, address: &Address) -> VerificationStatus {
        self.request(address)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    pub fn request(&self, address: &Address) -> Option<&VerificationRequest> {
        self.request_index
            .get(address)
            .and_then(|&i| self.requests.get(i))
    }

    pub fn request_mut(&mut self, address: &Address) -> Option<&mut VerificationRequest> {
        match self.request_index.get(address) {
            Some(&i) => self.requests.get_mut(i),
            None => None,
        }
    }

    /// Insert a request, overwriting the address's previous record in place.
    pub fn upsert_request(&mut self, request: VerificationRequest) {
        match self.request_index.get(&request.address) {
            Some(&i) => self.requests[i] = request,
            None => {
                self.request_index
                    .insert(request.address.clone(), self.requests.len());
                self.requests.push(request);
            }
        }
    }

    pub fn requests(&self) -> &[VerificationRequest] {
        &self.requests
    }

    pub fn push_verified(&mut self, user: VerifiedUser) {
        self.verified.push(user);
    }

    pub fn verified(&self) -> &[VerifiedUser] {
        &self.verified
    }

    pub fn grant_verifier(&mut self, address: Address) {
        self.verifiers.insert(address);
    }

    pub fn is_verifier(&self, address: &Address) -> bool {
        self.verifiers.contains(address)
    }

    // ── Loans ────────────────────────────────────────────────────────

    pub fn next_loan_id(&self) -> LoanId {
        self.loans.len() as LoanId
    }

    pub fn push_loan(&mut self, loan: LoanRequest) {
        self.loans.push(loan);
    }

    pub fn loans(&self) -> &[LoanRequest] {
        &self.loans
    }

    pub fn load_loan(&self, id: LoanId) -> Result<&LoanRequest> {
        self.loans
            .get(id as usize)
            .ok_or(LedgerError::LoanNotFound(id))
    }

    pub fn load_loan_mut(&mut self, id: LoanId) -> Result<&mut LoanRequest> {
        self.loans
            .get_mut(id as usize)
            .ok_or(LedgerError::LoanNotFound(id))
    }
}
