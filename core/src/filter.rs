use serde::{Deserialize, Serialize};
use time::Date;

use crate::document::{DocStore, Document};
use crate::error::{Result, SearchError};

/// Post-ranking constraints. Absent fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub subject_id: Option<String>,
    /// Inclusive lower bound.
    pub date_from: Option<Date>,
    /// Inclusive upper bound.
    pub date_to: Option<Date>,
}

impl FilterPredicate {
    pub fn is_empty(&self) -> bool {
        self.subject_id.is_none() && self.date_from.is_none() && self.date_to.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(SearchError::Validation(format!("date_from {from} is after date_to {to}")));
            }
        }
        Ok(())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(want) = self.subject_id.as_deref() {
            match doc.subject_id.as_deref() {
                Some(have) if have.trim().to_lowercase() == want.trim().to_lowercase() => {}
                _ => return false,
            }
        }
        if self.date_from.is_some_and(|from| doc.date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| doc.date > to) {
            return false;
        }
        true
    }
}

/// Keep the ranked items whose document satisfies `predicate`, in their original order.
/// Items whose document is no longer stored are dropped.
pub fn apply<T, F>(ranked: Vec<T>, predicate: &FilterPredicate, store: &DocStore, doc_id: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    if predicate.is_empty() {
        return ranked;
    }
    ranked
        .into_iter()
        .filter(|item| store.get(doc_id(item)).map(|d| predicate.matches(d)).unwrap_or(false))
        .collect()
}
