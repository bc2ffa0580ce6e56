//! Content-addressed storage for documents and milestone evidence.
//!
//! The store is opaque: `store` returns a content hash, `resolve` turns the
//! hash into a gateway URL of the form `https://<gateway>/ipfs/<hash>`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::errors::{MarketError, Result};

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Upload `bytes` and return their content hash.
    async fn store(&self, file_name: &str, bytes: Vec<u8>) -> Result<String>;

    /// Download the bytes behind a content hash.
    async fn fetch(&self, content_hash: &str) -> Result<Vec<u8>>;

    /// Public URL of a content hash.
    fn resolve(&self, content_hash: &str) -> String;
}

fn gateway_url(gateway: &str, content_hash: &str) -> String {
    let gateway = gateway.trim_end_matches('/');
    if gateway.starts_with("http://") || gateway.starts_with("https://") {
        format!("{gateway}/ipfs/{content_hash}")
    } else {
        format!("https://{gateway}/ipfs/{content_hash}")
    }
}

// ─────────────────────────────────────────────────────────
// IPFS HTTP API
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

pub struct IpfsStore {
    client: Client,
    api_url: String,
    gateway: String,
    api_token: Option<String>,
}

impl IpfsStore {
    pub fn new(client: Client, api_url: &str, gateway: &str, api_token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            gateway: gateway.to_string(),
            api_token,
        }
    }
}

#[async_trait]
impl EvidenceStore for IpfsStore {
    async fn store(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let size = bytes.len();
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let mut request = self
            .client
            .post(format!("{}/api/v0/add", self.api_url))
            .multipart(form);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(MarketError::Evidence(format!(
                "IPFS add returned {}",
                resp.status()
            )));
        }
        let added: AddResponse = resp.json().await?;
        info!(file_name, size, hash = %added.hash, "Stored evidence on IPFS");
        Ok(added.hash)
    }

    async fn fetch(&self, content_hash: &str) -> Result<Vec<u8>> {
        let url = self.resolve(content_hash);
        debug!(%url, "Fetching evidence");
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(MarketError::Evidence(format!(
                "gateway returned {} for {content_hash}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    fn resolve(&self, content_hash: &str) -> String {
        gateway_url(&self.gateway, content_hash)
    }
}

// ─────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────

/// Process-local store keyed by the SHA-256 of the content.
pub struct MemoryEvidenceStore {
    gateway: String,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryEvidenceStore {
    pub fn new(gateway: &str) -> Self {
        Self {
            gateway: gateway.to_string(),
            blobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn store(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let hash = hex::encode(Sha256::digest(&bytes));
        debug!(file_name, %hash, "Stored evidence in memory");
        self.blobs
            .lock()
            .map_err(|_| MarketError::Evidence("evidence store lock poisoned".to_string()))?
            .insert(hash.clone(), bytes);
        Ok(hash)
    }

    async fn fetch(&self, content_hash: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .map_err(|_| MarketError::Evidence("evidence store lock poisoned".to_string()))?
            .get(content_hash)
            .cloned()
            .ok_or_else(|| MarketError::Evidence(format!("no content for {content_hash}")))
    }

    fn resolve(&self, content_hash: &str) -> String {
        gateway_url(&self.gateway, content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    #[test]
    fn resolves_gateway_template() {
        assert_eq!(gateway_url("ipfs.io", "Qm1"), "https://ipfs.io/ipfs/Qm1");
        assert_eq!(
            gateway_url("http://127.0.0.1:8080/", "Qm1"),
            "http://127.0.0.1:8080/ipfs/Qm1"
        );
    }

    #[tokio::test]
    async fn memory_store_is_content_addressed() {
        let store = MemoryEvidenceStore::new("ipfs.io");
        let a = store.store("a.pdf", b"proof".to_vec()).await.unwrap();
        let b = store.store("b.pdf", b"proof".to_vec()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.fetch(&a).await.unwrap(), b"proof");
        assert!(store.fetch("missing").await.is_err());
    }

    async fn spawn_fake_ipfs() -> String {
        let app = Router::new()
            .route(
                "/api/v0/add",
                post(|headers: HeaderMap| async move {
                    if headers.get("authorization").is_none() {
                        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
                    }
                    Json(json!({ "Name": "proof.pdf", "Hash": "QmFake", "Size": "5" }))
                        .into_response()
                }),
            )
            .route(
                "/ipfs/:hash",
                get(|Path(hash): Path<String>| async move { format!("bytes of {hash}") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn ipfs_store_uploads_and_fetches() {
        let base = spawn_fake_ipfs().await;
        let store = IpfsStore::new(Client::new(), &base, &base, Some("secret".into()));

        let hash = store.store("proof.pdf", b"proof".to_vec()).await.unwrap();
        assert_eq!(hash, "QmFake");
        assert_eq!(store.fetch(&hash).await.unwrap(), b"bytes of QmFake");
    }

    #[tokio::test]
    async fn ipfs_rejection_is_an_evidence_error() {
        let base = spawn_fake_ipfs().await;
        let store = IpfsStore::new(Client::new(), &base, &base, None);
        let err = store.store("proof.pdf", b"proof".to_vec()).await.unwrap_err();
        assert!(matches!(err, MarketError::Evidence(_)));
    }
}
