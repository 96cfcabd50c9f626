use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bumped whenever the persisted segment layout changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    DocId,
    Title,
    SubjectId,
    Date,
    Content,
}

/// How a field's value reaches the inverted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexing {
    /// Not searchable by free text.
    None,
    /// Run through the analyzer (tokenized, stemmed).
    Analyzed,
    /// Stored as one casefolded term.
    Keyword,
}

impl Field {
    pub const ALL: [Field; 5] = [Field::DocId, Field::Title, Field::SubjectId, Field::Date, Field::Content];

    /// Fields a bare query word is matched against.
    pub const DEFAULT_SEARCH: [Field; 3] = [Field::Title, Field::Content, Field::SubjectId];

    pub const fn name(self) -> &'static str {
        match self {
            Field::DocId => "doc_id",
            Field::Title => "title",
            Field::SubjectId => "subject_id",
            Field::Date => "date",
            Field::Content => "content",
        }
    }

    pub const fn indexing(self) -> Indexing {
        match self {
            Field::Title | Field::Content => Indexing::Analyzed,
            Field::SubjectId => Indexing::Keyword,
            Field::DocId | Field::Date => Indexing::None,
        }
    }

    pub const fn is_searchable(self) -> bool {
        !matches!(self.indexing(), Indexing::None)
    }

    /// Every field is stored in the document store.
    pub const fn is_stored(self) -> bool {
        true
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}
