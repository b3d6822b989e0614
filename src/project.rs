//! View projections over result records.
//!
//! Everything here is a pure function of borrowed [`Record`]s: no network
//! access and no mutation. The list view and the map view are derived from the
//! same page of records; a record without coordinates is dropped from the map
//! only, never from the list or the totals.

use serde::Serialize;

use crate::models::{Record, TextOrList};
use crate::search::SearchState;

/// Characters kept in a list snippet before the ellipsis.
pub const SNIPPET_LEN: usize = 200;
pub const ELLIPSIS: &str = "...";
pub const NO_SNIPPET: &str = "No snippet available";
pub const NOT_AVAILABLE: &str = "N/A";

/// First [`SNIPPET_LEN`] characters of the full text, with [`ELLIPSIS`] if
/// anything was cut, or [`NO_SNIPPET`] when there is no text.
pub fn snippet(record: &Record) -> String {
    let text = match record.full_text.as_deref() {
        Some(t) if !t.trim().is_empty() => t,
        _ => return NO_SNIPPET.to_string(),
    };

    match text.char_indices().nth(SNIPPET_LEN) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Last non-empty path segment with its final extension removed.
///
/// Both `/` and `\` separate segments, and trailing separators are ignored.
/// A name that would be empty after stripping (`".env"`) is returned
/// unchanged. A path with no segment at all gives [`NOT_AVAILABLE`].
pub fn display_name(path: &str) -> &str {
    let Some(segment) = path.rsplit(['/', '\\']).find(|s| !s.trim().is_empty()) else {
        return NOT_AVAILABLE;
    };
    match segment.rfind('.') {
        Some(dot) if dot > 0 => &segment[..dot],
        _ => segment,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
}

pub fn map_markers(records: &[Record]) -> Vec<MapMarker> {
    records
        .iter()
        .filter_map(|r| {
            let (lat, lng) = (r.lat?, r.lng?);
            Some(MapMarker {
                lat,
                lng,
                label: record_label(r),
            })
        })
        .collect()
}

fn record_label(record: &Record) -> String {
    match record.file_path.as_deref() {
        Some(path) if !path.trim().is_empty() => display_name(path).to_string(),
        _ => record.hash.clone(),
    }
}

/// One row of the list view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEntry {
    /// Navigation key for the full report.
    pub hash: String,
    pub classification: String,
    pub name: String,
    pub timeframes: String,
    pub locations: String,
    pub mgrs: String,
    pub subjects: String,
    pub snippet: String,
}

pub fn list_entries(records: &[Record]) -> Vec<ListEntry> {
    records.iter().map(list_entry).collect()
}

pub fn list_entry(record: &Record) -> ListEntry {
    ListEntry {
        hash: record.hash.clone(),
        classification: format_text(record.highest_classification.as_deref()),
        name: record_label(record),
        timeframes: format_field(record.timeframes.as_ref()),
        locations: format_field(record.locations.as_ref()),
        mgrs: format_field(record.mgrs.as_ref()),
        subjects: format_text(record.subjects.as_deref()),
        snippet: snippet(record),
    }
}

/// Text value or [`NOT_AVAILABLE`] when absent, blank, or the backend's
/// `"none_found"` marker.
pub fn format_text(text: Option<&str>) -> String {
    match text.map(str::trim) {
        Some(t) if !t.is_empty() && t != "none_found" => t.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Comma-joined items or [`NOT_AVAILABLE`] when there are none.
pub fn format_list<S: AsRef<str>>(items: &[S]) -> String {
    let items: Vec<&str> = items
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        items.join(", ")
    }
}

fn format_field(field: Option<&TextOrList>) -> String {
    match field {
        Some(value) => format_list(&value.items()),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Pagination controls for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pager {
    pub page: u64,
    pub total_pages: u64,
    pub total_hits: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

pub fn pager(state: &SearchState) -> Pager {
    Pager {
        page: state.page,
        total_pages: state.total_pages(),
        total_hits: state.total_hits(),
        has_previous: state.has_previous(),
        has_next: state.has_next(),
    }
}
