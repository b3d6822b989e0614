//! Core data models shared by the search controller, the projector and the
//! report view.
//!
//! [`Record`] mirrors the backend's document metadata. The core only relies on
//! the hash (navigation), the coordinates (map view), the file path (display
//! name) and the full text (snippets); everything else is carried through for
//! rendering and unknown fields are kept verbatim in [`Record::extra`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of records the search backend returns per page.
pub const PAGE_SIZE: u64 = 10;

/// A field the backend sends either as a single string or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    /// Non-blank items, in order.
    pub fn items(&self) -> Vec<&str> {
        match self {
            TextOrList::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Vec::new()
                } else {
                    vec![s]
                }
            }
            TextOrList::List(items) => items
                .iter()
                .map(|s| s.as_str())
                .filter(|s| !s.trim().is_empty())
                .collect(),
        }
    }
}

/// One search hit / report as delivered by the search backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "SHA256_hash", default)]
    pub hash: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub highest_classification: Option<String>,
    #[serde(default)]
    pub caveats: Option<String>,
    #[serde(default)]
    pub locations: Option<TextOrList>,
    #[serde(default)]
    pub timeframes: Option<TextOrList>,
    /// `|`-separated.
    #[serde(default)]
    pub subjects: Option<String>,
    /// `|`-separated.
    #[serde(default)]
    pub topics: Option<String>,
    /// `,`-separated.
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(rename = "MGRS", default)]
    pub mgrs: Option<TextOrList>,
    #[serde(default)]
    pub processed_time: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub full_text: Option<String>,
    /// Base64-encoded JPEG images, only present on full reports.
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Wire shape of `GET /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub total_hits: u64,
}

/// Free-text query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Query {
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One retrieval attempt: a committed query at a 1-based page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageRequest {
    pub query: Query,
    pub page: u64,
}

/// The records of one page plus the backend's paging metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub records: Vec<Record>,
    pub total_hits: u64,
}

impl ResultPage {
    pub fn total_pages(&self) -> u64 {
        total_pages(self.total_hits)
    }
}

impl From<SearchResponse> for ResultPage {
    fn from(resp: SearchResponse) -> Self {
        Self {
            records: resp.records,
            total_hits: resp.total_hits,
        }
    }
}

/// `max(1, ceil(total_hits / PAGE_SIZE))`.
pub fn total_pages(total_hits: u64) -> u64 {
    total_hits.div_ceil(PAGE_SIZE).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Map,
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Ok(ViewMode::List),
            "map" => Ok(ViewMode::Map),
            other => Err(format!("unknown view mode '{}': use list or map", other)),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::List => f.write_str("list"),
            ViewMode::Map => f.write_str("map"),
        }
    }
}
