//! Supporting documents and IP metadata revisions.
//!
//! Files go to the evidence store; the ledger records only the content hash,
//! the document type and the upload time. IP metadata revisions are ordinary
//! documents of type [`IP_METADATA_DOCUMENT`] holding the merged JSON.

use std::sync::Arc;

use equinex_ledger::{
    rules, Address, AssetId, CallOutcome, DocumentRecord, LedgerCall, LedgerError, Timestamp,
};
use serde::Serialize;
use tracing::warn;

use crate::errors::{MarketError, Result};
use crate::evidence::EvidenceStore;
use crate::metadata::{self, AssetMetadata, IpMetadata, IpMetadataPatch};
use crate::writer::{unexpected_outcome, LedgerWriter};

pub const IP_METADATA_DOCUMENT: &str = "ip_metadata_update";

/// A ledger document record with its resolved gateway URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub index: u64,
    pub content_hash: String,
    pub document_type: String,
    pub uploaded_by: Address,
    pub timestamp: Timestamp,
    pub url: String,
}

impl DocumentView {
    pub fn from_records(records: Vec<DocumentRecord>, evidence: &dyn EvidenceStore) -> Vec<Self> {
        records
            .into_iter()
            .enumerate()
            .map(|(index, d)| Self {
                index: index as u64,
                url: evidence.resolve(&d.content_hash),
                content_hash: d.content_hash,
                document_type: d.document_type,
                uploaded_by: d.uploaded_by,
                timestamp: d.timestamp,
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct DocumentService {
    writer: LedgerWriter,
    evidence: Arc<dyn EvidenceStore>,
}

impl DocumentService {
    pub fn new(writer: LedgerWriter, evidence: Arc<dyn EvidenceStore>) -> Self {
        Self { writer, evidence }
    }

    pub async fn documents(&self, asset_id: AssetId) -> Result<Vec<DocumentView>> {
        let records = self
            .writer
            .read("documents", self.writer.ledger().documents(asset_id))
            .await?;
        Ok(DocumentView::from_records(records, self.evidence.as_ref()))
    }

    /// Upload a file and attach it to the asset. Owner only.
    pub async fn add_document(
        &self,
        owner: &Address,
        asset_id: AssetId,
        file_name: &str,
        bytes: Vec<u8>,
        document_type: &str,
    ) -> Result<DocumentView> {
        if bytes.is_empty() {
            return Err(LedgerError::InvalidInput("document is empty".to_string()).into());
        }
        if document_type.trim().is_empty() {
            return Err(LedgerError::InvalidInput("document type is required".to_string()).into());
        }
        let asset = self
            .writer
            .read("asset", self.writer.ledger().asset(asset_id))
            .await?;
        rules::check_owner(&asset, owner, "add documents")?;

        let content_hash = self.evidence.store(file_name, bytes).await?;
        self.attach(owner, asset_id, content_hash, document_type.trim())
            .await
    }

    /// Effective IP metadata: the latest revision document if one exists,
    /// otherwise what was encoded at listing time.
    pub async fn current_ip_metadata(&self, asset_id: AssetId) -> Result<IpMetadata> {
        let ledger = self.writer.ledger();
        let (asset, documents) = tokio::try_join!(
            self.writer.read("asset", ledger.asset(asset_id)),
            self.writer.read("documents", ledger.documents(asset_id)),
        )?;

        let listed = match metadata::decode(&asset.title, &asset.description).metadata {
            AssetMetadata::IpAsset(m) => m,
            AssetMetadata::Startup(_) => {
                return Err(MarketError::Metadata(format!(
                    "asset {asset_id} is not an IP asset"
                )))
            }
        };

        let latest = documents
            .iter()
            .rev()
            .find(|d| d.document_type == IP_METADATA_DOCUMENT);
        let Some(latest) = latest else {
            return Ok(listed);
        };

        let bytes = self.evidence.fetch(&latest.content_hash).await?;
        match serde_json::from_slice::<IpMetadata>(&bytes) {
            Ok(m) => Ok(m),
            Err(e) => {
                warn!(
                    asset_id,
                    hash = %latest.content_hash,
                    "Unreadable metadata revision, using listing: {e}"
                );
                Ok(listed)
            }
        }
    }

    /// Merge `patch` over the current metadata and store the result as a new
    /// revision. Owner only.
    pub async fn update_ip_metadata(
        &self,
        owner: &Address,
        asset_id: AssetId,
        patch: IpMetadataPatch,
    ) -> Result<IpMetadata> {
        if patch.is_empty() {
            return Err(MarketError::Metadata("nothing to update".to_string()));
        }
        let asset = self
            .writer
            .read("asset", self.writer.ledger().asset(asset_id))
            .await?;
        rules::check_owner(&asset, owner, "add documents")?;

        let merged = patch.apply_to(self.current_ip_metadata(asset_id).await?);
        let bytes = serde_json::to_vec(&merged)?;
        let content_hash = self.evidence.store("metadata.json", bytes).await?;
        self.attach(owner, asset_id, content_hash, IP_METADATA_DOCUMENT)
            .await?;
        Ok(merged)
    }

    async fn attach(
        &self,
        owner: &Address,
        asset_id: AssetId,
        content_hash: String,
        document_type: &str,
    ) -> Result<DocumentView> {
        let call = LedgerCall::AddDocument {
            asset_id,
            content_hash: content_hash.clone(),
            document_type: document_type.to_string(),
        };
        match self.writer.execute(owner, call).await? {
            CallOutcome::DocumentAdded { index, .. } => {
                let records = self
                    .writer
                    .read("documents", self.writer.ledger().documents(asset_id))
                    .await?;
                let record = records.into_iter().nth(index as usize).ok_or_else(|| {
                    MarketError::Unavailable(format!("document {index} missing after confirmation"))
                })?;
                Ok(DocumentView {
                    index,
                    url: self.evidence.resolve(&content_hash),
                    content_hash,
                    document_type: record.document_type,
                    uploaded_by: record.uploaded_by,
                    timestamp: record.timestamp,
                })
            }
            other => Err(unexpected_outcome("add_document", &other)),
        }
    }
}
