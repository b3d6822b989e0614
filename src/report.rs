//! Full report retrieval by content hash.
//!
//! Fetches one record from `GET /report/{hash}` on the search service and
//! projects it into a [`ReportDetail`] for display. Used by the
//! `corectl report` command and by `open <i>` in the browse session.

use anyhow::Result;
use base64::Engine;
use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use crate::backend::{BackendClient, Service};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::models::{Record, TextOrList};
use crate::project::{display_name, format_list, format_text, NOT_AVAILABLE};

/// Display-ready view of a full report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDetail {
    pub hash: String,
    pub name: String,
    pub classification: String,
    pub caveats: String,
    pub locations: String,
    pub timeframes: String,
    pub subjects: String,
    pub topics: String,
    pub keywords: String,
    pub mgrs: String,
    pub processed_time: String,
    pub full_text: String,
    /// Decoded JPEG bytes, in backend order.
    #[serde(skip)]
    pub images: Vec<Vec<u8>>,
}

impl ReportDetail {
    /// Build the detail view. Fails if any embedded image is not valid base64.
    pub fn from_record(record: &Record) -> ClientResult<Self> {
        let name = match record.file_path.as_deref() {
            Some(path) if !path.trim().is_empty() => display_name(path).to_string(),
            _ => NOT_AVAILABLE.to_string(),
        };

        Ok(Self {
            hash: format_text(Some(record.hash.as_str())),
            name,
            classification: format_text(record.highest_classification.as_deref()),
            caveats: format_text(record.caveats.as_deref()),
            locations: format_list(&items(record.locations.as_ref())),
            timeframes: format_list(&items(record.timeframes.as_ref())),
            subjects: format_list(&split(record.subjects.as_deref(), '|')),
            topics: format_list(&split(record.topics.as_deref(), '|')),
            keywords: format_list(&split(record.keywords.as_deref(), ',')),
            mgrs: format_list(&items(record.mgrs.as_ref())),
            processed_time: record
                .processed_time
                .as_deref()
                .map(format_timestamp)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            full_text: format_text(record.full_text.as_deref()),
            images: decode_images(record.images.as_deref().unwrap_or_default())?,
        })
    }
}

fn items(field: Option<&TextOrList>) -> Vec<&str> {
    field.map(|f| f.items()).unwrap_or_default()
}

fn split(text: Option<&str>, sep: char) -> Vec<&str> {
    text.map(|t| t.split(sep).collect()).unwrap_or_default()
}

/// Render a backend timestamp in local time. Unparseable values pass through.
pub fn format_timestamp(raw: &str) -> String {
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Local).format(FORMAT).to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, pattern) {
            return naive.format(FORMAT).to_string();
        }
    }
    raw.to_string()
}

fn decode_images(encoded: &[String]) -> ClientResult<Vec<Vec<u8>>> {
    let engine = base64::engine::general_purpose::STANDARD;
    encoded
        .iter()
        .enumerate()
        .map(|(i, data)| {
            engine.decode(data.trim()).map_err(|e| {
                ClientError::Backend(format!("image {} is not valid base64: {}", i, e))
            })
        })
        .collect()
}

/// Fetch the raw record for `hash`.
pub async fn fetch_report(client: &BackendClient, hash: &str) -> ClientResult<Record> {
    let hash = hash.trim();
    if hash.is_empty() {
        return Err(ClientError::Validation("report hash must not be empty".into()));
    }
    tracing::debug!(hash, "fetching report");
    client.get_json(&format!("/report/{}", hash), &[]).await
}

/// Fetch and project in one step.
pub async fn fetch_detail(client: &BackendClient, hash: &str) -> ClientResult<ReportDetail> {
    let record = fetch_report(client, hash).await?;
    ReportDetail::from_record(&record)
}

/// CLI entry point: fetch the report and print it to stdout.
pub async fn run_report(config: &Config, hash: &str) -> Result<()> {
    let client = BackendClient::for_service(config, Service::Search)?;
    match fetch_detail(&client, hash).await {
        Ok(detail) => {
            print_detail(&detail);
            Ok(())
        }
        Err(e) => anyhow::bail!("An error occurred: {}", e),
    }
}

pub fn print_detail(detail: &ReportDetail) {
    println!("--- {} Details ---", detail.name);
    println!("hash:            {}", detail.hash);
    println!("classification:  {}", detail.classification);
    println!("caveats:         {}", detail.caveats);
    println!("report name:     {}", detail.name);
    println!("locations:       {}", detail.locations);
    println!("timeframes:      {}", detail.timeframes);
    println!("subjects:        {}", detail.subjects);
    println!("topics:          {}", detail.topics);
    println!("keywords:        {}", detail.keywords);
    println!("MGRS:            {}", detail.mgrs);
    println!("processed time:  {}", detail.processed_time);
    if !detail.images.is_empty() {
        let sizes: Vec<String> = detail
            .images
            .iter()
            .map(|img| format!("{} bytes", img.len()))
            .collect();
        println!("images:          {} ({})", detail.images.len(), sizes.join(", "));
    }
    println!();
    println!("--- Full Text ---");
    println!("{}", detail.full_text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            hash: "abc".into(),
            file_path: Some("/share/intel/weekly.summary.docx".into()),
            highest_classification: Some("SECRET".into()),
            caveats: Some("none_found".into()),
            locations: Some(TextOrList::List(vec![])),
            timeframes: Some(TextOrList::Text("2021-08".into())),
            subjects: Some("logistics|fuel".into()),
            topics: None,
            keywords: Some("convoy, route".into()),
            images: Some(vec!["/9j/4AAQ".into()]),
            processed_time: Some("2024-01-02T03:04:05".into()),
            ..Default::default()
        }
    }

    #[test]
    fn detail_projection() {
        let d = ReportDetail::from_record(&sample()).unwrap();
        assert_eq!(d.name, "weekly.summary");
        assert_eq!(d.caveats, "N/A");
        assert_eq!(d.locations, "N/A");
        assert_eq!(d.timeframes, "2021-08");
        assert_eq!(d.subjects, "logistics, fuel");
        assert_eq!(d.topics, "N/A");
        assert_eq!(d.keywords, "convoy, route");
        assert_eq!(d.processed_time, "2024-01-02 03:04:05");
        assert_eq!(d.full_text, "N/A");
        assert_eq!(d.images, vec![vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]]);
    }

    #[test]
    fn invalid_image_is_an_error() {
        let mut r = sample();
        r.images = Some(vec!["/9j/4AAQ".into(), "not base64!".into()]);
        let err = ReportDetail::from_record(&r).unwrap_err();
        assert!(matches!(err, ClientError::Backend(ref m) if m.starts_with("image 1")));
    }

    #[test]
    fn missing_path_and_time() {
        let d = ReportDetail::from_record(&Record::default()).unwrap();
        assert_eq!(d.name, "N/A");
        assert_eq!(d.hash, "N/A");
        assert_eq!(d.processed_time, "N/A");
        assert!(d.images.is_empty());
    }

    #[test]
    fn unparseable_timestamp_passes_through() {
        assert_eq!(format_timestamp("last tuesday"), "last tuesday");
        assert_eq!(
            format_timestamp("2024-05-06 07:08:09.123"),
            "2024-05-06 07:08:09"
        );
    }

    #[tokio::test]
    async fn blank_hash_is_rejected_without_request() {
        let client =
            BackendClient::new("http://127.0.0.1:9/api", std::time::Duration::from_secs(1))
                .unwrap();
        let err = fetch_report(&client, "  ").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }
}
