use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: String,
    pub subject_id: Option<String>,
    pub date: Date,
    pub content: String,
}

/// Stored fields without the content, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub title: String,
    pub subject_id: Option<String>,
    pub date: Date,
}

impl From<&Document> for DocumentSummary {
    fn from(d: &Document) -> Self {
        Self { doc_id: d.doc_id.clone(), title: d.title.clone(), subject_id: d.subject_id.clone(), date: d.date }
    }
}

/// Authoritative stored fields, keyed by `doc_id`. Enumeration is in `doc_id` order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocStore {
    docs: BTreeMap<String, Document>,
}

impl DocStore {
    pub fn new() -> Self { Self::default() }

    /// Insert or overwrite by `doc_id`; returns the previous record.
    pub fn put(&mut self, document: Document) -> Option<Document> {
        self.docs.insert(document.doc_id.clone(), document)
    }

    pub fn get(&self, doc_id: &str) -> Result<&Document> {
        self.docs.get(doc_id).ok_or_else(|| SearchError::NotFound(format!("document '{doc_id}'")))
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.docs.contains_key(doc_id)
    }

    pub fn list(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn clear(&mut self) {
        self.docs.clear();
    }
}

pub fn parse_date(s: &str) -> Result<Date> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| SearchError::Validation(format!("invalid date '{s}', expected YYYY-MM-DD: {e}")))
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]")).unwrap_or_else(|_| date.to_string())
}

pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Build a fresh identifier from a human name and the current UTC time, e.g.
/// `chest_xray.txt_20240105103000123456`.
pub fn make_doc_id(name: &str, at: OffsetDateTime) -> String {
    let mut base: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if base.is_empty() {
        base.push_str("doc");
    }
    let stamp = at.format(format_description!("[year][month][day][hour][minute][second][subsecond digits:6]")).unwrap_or_else(|_| at.unix_timestamp_nanos().to_string());
    format!("{base}_{stamp}")
}
