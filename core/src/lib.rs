pub mod blob;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod extract;
pub mod filter;
pub mod index;
pub mod manager;
pub mod persist;
pub mod query;
pub mod schema;
pub mod scorer;
pub mod snippet;
pub mod tokenizer;

pub use config::{EngineConfig, IdfMode};
pub use document::{DocStore, Document, DocumentSummary};
pub use engine::{IndexStats, IngestOutcome, IngestRequest, NewDocument, SearchEngine, SearchHit, SearchRequest};
pub use error::{ExtractionError, Result, SearchError};
pub use filter::FilterPredicate;
pub use index::{DocOrd, InvertedIndex, Posting, TermId};
pub use manager::{IndexManager, RecoveryEvent};
pub use schema::Field;
