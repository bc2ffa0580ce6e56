//! Application configuration loaded from environment variables.

use std::time::Duration;

use equinex_ledger::Address;

use crate::errors::{MarketError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceBackend {
    /// IPFS HTTP API (`/api/v0/add`).
    Ipfs,
    /// In-process content-addressed store; contents are lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database holding the ledger call journal
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// IPFS HTTP API endpoint used to store evidence (e.g. http://127.0.0.1:5001)
    pub ipfs_api_url: String,
    /// Gateway host used to resolve content hashes (e.g. ipfs.io)
    pub ipfs_gateway: String,
    /// Optional bearer token for the IPFS upload API
    pub ipfs_api_token: Option<String>,
    pub evidence_backend: EvidenceBackend,
    /// Upper bound on every ledger read, including each gateway sub-fetch
    pub read_timeout: Duration,
    /// Upper bound on submitting a write
    pub write_timeout: Duration,
    /// Upper bound on waiting for a submitted write to confirm
    pub confirm_timeout: Duration,
    /// Addresses holding the verifier capability
    pub verifiers: Vec<Address>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./equinex_ledger.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| MarketError::Config("Invalid API_PORT".to_string()))?,
            ipfs_api_url: env_var("IPFS_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string()),
            ipfs_gateway: env_var("IPFS_GATEWAY").unwrap_or_else(|_| "ipfs.io".to_string()),
            ipfs_api_token: env_var("IPFS_API_TOKEN").ok().filter(|t| !t.is_empty()),
            evidence_backend: parse_backend(
                &env_var("EVIDENCE_BACKEND").unwrap_or_else(|_| "ipfs".to_string()),
            )?,
            read_timeout: secs_var("READ_TIMEOUT_SECS", 30)?,
            write_timeout: secs_var("WRITE_TIMEOUT_SECS", 30)?,
            confirm_timeout: secs_var("CONFIRM_TIMEOUT_SECS", 30)?,
            verifiers: parse_addresses(&env_var("VERIFIER_ADDRESSES").unwrap_or_default()),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| MarketError::Config(format!("Missing env var: {key}")))
}

fn secs_var(key: &str, default: u64) -> Result<Duration> {
    let secs: u64 = env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| MarketError::Config(format!("Invalid {key}")))?;
    if secs == 0 {
        return Err(MarketError::Config(format!("{key} must be at least 1")));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_backend(raw: &str) -> Result<EvidenceBackend> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ipfs" => Ok(EvidenceBackend::Ipfs),
        "memory" => Ok(EvidenceBackend::Memory),
        other => Err(MarketError::Config(format!(
            "Invalid EVIDENCE_BACKEND: {other}"
        ))),
    }
}

fn parse_addresses(raw: &str) -> Vec<Address> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Address::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_list_skips_blanks() {
        let parsed = parse_addresses(" 0xAAA, ,0xbbb,");
        assert_eq!(parsed, vec![Address::new("0xaaa"), Address::new("0xbbb")]);
        assert!(parse_addresses("").is_empty());
    }

    #[test]
    fn backend_names() {
        assert_eq!(parse_backend("IPFS").unwrap(), EvidenceBackend::Ipfs);
        assert_eq!(parse_backend("memory").unwrap(), EvidenceBackend::Memory);
        assert!(parse_backend("s3").is_err());
    }
}
