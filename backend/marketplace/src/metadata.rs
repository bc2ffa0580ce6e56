//! Structured asset metadata and its description-field encoding.
//!
//! The ledger stores only a title and a free-text description per asset.
//! Listings carry richer metadata, so it is appended to the description as a
//! JSON blob:
//!
//! ```text
//! startup:   "<summary> #METADATA:<json>#"
//! IP asset:  "<summary> #IP_ASSET #IPMETADATA:<json>#"   (title prefixed "IP: ")
//! ```
//!
//! Only the asset service and the query gateway call into this module.
//! Decoding never fails: a malformed blob degrades to plain text with default
//! metadata.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::errors::Result;

const STARTUP_MARKER: &str = " #METADATA:";
const IP_MARKER: &str = " #IP_ASSET #IPMETADATA:";
const IP_TITLE_PREFIX: &str = "IP: ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityHolder {
    pub name: String,
    #[serde(deserialize_with = "percentage_compat")]
    pub percentage: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartupMetadata {
    pub image: String,
    pub video: String,
    #[serde(deserialize_with = "holders_compat")]
    pub equity_holders: Vec<EquityHolder>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpMetadata {
    /// patent, trademark, copyright, trade secret, ...
    pub category: String,
    /// Legal status, e.g. "pending" or "registered".
    pub status: String,
    pub registration_number: String,
    pub filing_date: String,
    pub jurisdiction: String,
    pub expiration_date: String,
    pub inventors: String,
    pub applications: Vec<String>,
}

/// Partial update of [`IpMetadata`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpMetadataPatch {
    pub category: Option<String>,
    pub status: Option<String>,
    pub registration_number: Option<String>,
    pub filing_date: Option<String>,
    pub jurisdiction: Option<String>,
    pub expiration_date: Option<String>,
    pub inventors: Option<String>,
    pub applications: Option<Vec<String>>,
}

impl IpMetadataPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(self, mut base: IpMetadata) -> IpMetadata {
        macro_rules! merge {
            ($($field:ident),*) => {
                $( if let Some(v) = self.$field { base.$field = v; } )*
            };
        }
        merge!(
            category,
            status,
            registration_number,
            filing_date,
            jurisdiction,
            expiration_date,
            inventors,
            applications
        );
        base
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetMetadata {
    Startup(StartupMetadata),
    IpAsset(IpMetadata),
}

impl AssetMetadata {
    pub fn is_ip_asset(&self) -> bool {
        matches!(self, Self::IpAsset(_))
    }
}

/// A ledger title/description pair split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedListing {
    pub title: String,
    pub summary: String,
    pub metadata: AssetMetadata,
}

// ─────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────

pub fn encode_startup(summary: &str, metadata: &StartupMetadata) -> Result<String> {
    let json = serde_json::to_string(metadata)?;
    Ok(format!("{}{STARTUP_MARKER}{json}#", summary.trim()))
}

/// Returns the ledger `(title, description)` pair for an IP asset.
pub fn encode_ip(title: &str, summary: &str, metadata: &IpMetadata) -> Result<(String, String)> {
    let json = serde_json::to_string(metadata)?;
    Ok((
        format!("{IP_TITLE_PREFIX}{}", title.trim()),
        format!("{}{IP_MARKER}{json}#", summary.trim()),
    ))
}

// ─────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────

pub fn decode(title: &str, description: &str) -> DecodedListing {
    // The IP marker only counts under an "IP: " title; a startup summary may
    // contain either marker as plain text, so the blob is the last match.
    if let Some(clean_title) = title.strip_prefix(IP_TITLE_PREFIX) {
        let (summary, metadata) = match description.rsplit_once(IP_MARKER) {
            Some((summary, blob)) => (summary, parse_blob(blob, title).unwrap_or_default()),
            None => (description, IpMetadata::default()),
        };
        return DecodedListing {
            title: clean_title.to_string(),
            summary: summary.to_string(),
            metadata: AssetMetadata::IpAsset(metadata),
        };
    }

    let (summary, metadata) = match description.rsplit_once(STARTUP_MARKER) {
        Some((summary, blob)) => (summary, parse_blob(blob, title).unwrap_or_default()),
        None => (description, StartupMetadata::default()),
    };
    DecodedListing {
        title: title.to_string(),
        summary: summary.to_string(),
        metadata: AssetMetadata::Startup(metadata),
    }
}

fn parse_blob<T: for<'de> Deserialize<'de>>(blob: &str, title: &str) -> Option<T> {
    let json = blob.trim_end().strip_suffix('#').unwrap_or(blob);
    match serde_json::from_str(json) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(%title, "Malformed listing metadata, using defaults: {e}");
            None
        }
    }
}

// Older listings store the holder list as a JSON string and percentages as
// decimal strings.

fn holders_compat<'de, D>(d: D) -> std::result::Result<Vec<EquityHolder>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Holders {
        List(Vec<EquityHolder>),
        Encoded(String),
    }
    match Holders::deserialize(d)? {
        Holders::List(list) => Ok(list),
        Holders::Encoded(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom),
    }
}

fn percentage_compat<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Percentage {
        Number(u32),
        Text(String),
    }
    match Percentage::deserialize(d)? {
        Percentage::Number(n) => Ok(n),
        Percentage::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
