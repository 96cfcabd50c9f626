use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use time::{Date, OffsetDateTime};

use crate::blob::{BlobStore, SledBlobStore};
use crate::config::EngineConfig;
use crate::document::{make_doc_id, today, Document, DocumentSummary};
use crate::error::{Result, SearchError};
use crate::extract::{PlainTextExtractor, TextExtractor};
use crate::filter::{self, FilterPredicate};
use crate::manager::{IndexManager, IndexWriter, RecoveryEvent};
use crate::query::{Query, QueryParser};
use crate::schema::Field;
use crate::scorer;
use crate::snippet::make_snippet;
use crate::tokenizer::{Analyzer, StemmingAnalyzer};

/// Already-extracted text plus metadata.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    /// Human name used as the `doc_id` prefix; defaults to the title.
    pub name: Option<String>,
    pub title: String,
    pub subject_id: Option<String>,
    /// Defaults to the ingestion date.
    pub date: Option<Date>,
    pub content: String,
}

/// Raw uploaded bytes plus metadata; text is extracted during ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub title: String,
    pub subject_id: Option<String>,
    pub date: Option<Date>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub doc_id: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub filter: FilterPredicate,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self { query: query.into(), limit, filter: FilterPredicate::default() }
    }

    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.filter.subject_id = Some(subject_id.into());
        self
    }

    pub fn date_from(mut self, date: Date) -> Self {
        self.filter.date_from = Some(date);
        self
    }

    pub fn date_to(mut self, date: Date) -> Self {
        self.filter.date_to = Some(date);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub title: String,
    pub subject_id: Option<String>,
    pub date: Date,
    pub score: f32,
    pub content_snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub num_docs: usize,
    pub num_terms: usize,
    pub generation: u64,
    pub location: PathBuf,
}

/// Explicit engine context: owns the index manager and the external collaborators.
/// Create one per process and share it (`Arc<SearchEngine>`) between front-end handlers.
pub struct SearchEngine {
    config: EngineConfig,
    manager: IndexManager,
    extractor: Box<dyn TextExtractor>,
    blobs: Option<Box<dyn BlobStore>>,
}

fn clean_subject(subject_id: Option<String>) -> Option<String> {
    subject_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn require_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(SearchError::Validation("title must not be empty".into()));
    }
    Ok(())
}

/// A `doc_id` that exists neither in the committed store nor in the current batch.
fn unique_doc_id(writer: &IndexWriter<'_>, name: &str) -> String {
    let base = make_doc_id(name, OffsetDateTime::now_utc());
    if !writer.contains(&base) {
        return base;
    }
    (1u32..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !writer.contains(candidate))
        .unwrap_or(base)
}

impl SearchEngine {
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::open_with_analyzer(config, Arc::new(StemmingAnalyzer))
    }

    pub fn open_with_analyzer(config: EngineConfig, analyzer: Arc<dyn Analyzer>) -> Result<Self> {
        let manager = IndexManager::open_or_create(&config.index_dir, analyzer)?;
        let blobs: Option<Box<dyn BlobStore>> = match &config.blob_dir {
            Some(dir) => Some(Box::new(SledBlobStore::open(dir)?)),
            None => None,
        };
        Ok(Self { config, manager, extractor: Box::new(PlainTextExtractor), blobs })
    }

    pub fn with_extractor(mut self, extractor: Box<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_blob_store(mut self, blobs: Box<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set when the persisted index was corrupt and had to be recreated on open.
    pub fn recovery(&self) -> Option<&RecoveryEvent> {
        self.manager.recovery()
    }

    pub fn index_document(&self, raw_text: &str, title: &str, subject_id: Option<&str>, date: Option<Date>) -> Result<String> {
        let ids = self.index_documents(vec![NewDocument {
            name: None,
            title: title.to_string(),
            subject_id: subject_id.map(str::to_string),
            date,
            content: raw_text.to_string(),
        }])?;
        ids.into_iter().next().ok_or_else(|| SearchError::Validation("nothing to index".into()))
    }

    /// Index a batch; either every document becomes visible or none does.
    pub fn index_documents(&self, docs: Vec<NewDocument>) -> Result<Vec<String>> {
        for d in &docs {
            require_title(&d.title)?;
        }
        let mut writer = self.manager.writer();
        let mut ids = Vec::with_capacity(docs.len());
        for d in docs {
            let name = d.name.as_deref().unwrap_or(&d.title);
            let doc_id = unique_doc_id(&writer, name);
            writer.add(Document {
                doc_id: doc_id.clone(),
                title: d.title.trim().to_string(),
                subject_id: clean_subject(d.subject_id),
                date: d.date.unwrap_or_else(today),
                content: d.content,
            });
            ids.push(doc_id);
        }
        writer.commit()?;
        Ok(ids)
    }

    pub fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let mut outcomes = self.ingest_batch(vec![request])?;
        outcomes.pop().ok_or_else(|| SearchError::Validation("nothing to ingest".into()))
    }

    /// Extract, store originals, and index a batch of uploads in one commit.
    /// Extraction failures index the document with empty content and a warning;
    /// storage or commit failures abort the batch with nothing committed and
    /// the originals stored so far removed again.
    pub fn ingest_batch(&self, requests: Vec<IngestRequest>) -> Result<Vec<IngestOutcome>> {
        for r in &requests {
            require_title(&r.title)?;
        }
        let mut writer = self.manager.writer();
        let mut stored = Vec::new();
        let result = self
            .stage_uploads(&mut writer, requests, &mut stored)
            .and_then(|outcomes| writer.commit().map(|_| outcomes));
        if result.is_err() {
            self.discard_originals(&stored);
        }
        result
    }

    fn stage_uploads(
        &self,
        writer: &mut IndexWriter<'_>,
        requests: Vec<IngestRequest>,
        stored: &mut Vec<String>,
    ) -> Result<Vec<IngestOutcome>> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for r in requests {
            let mut warnings = Vec::new();
            let hint = r.content_type.as_deref().or(Some(r.name.as_str())).filter(|h| !h.is_empty());
            let content = match self.extractor.extract_text(&r.bytes, hint) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(name = %r.name, %err, "text extraction failed, indexing with empty content");
                    warnings.push(format!("{}: {}", r.name, SearchError::from(err)));
                    String::new()
                }
            };

            let name = if r.name.trim().is_empty() { r.title.as_str() } else { r.name.as_str() };
            let doc_id = unique_doc_id(writer, name);
            if let Some(blobs) = &self.blobs {
                blobs.store(&doc_id, &r.bytes)?;
                stored.push(doc_id.clone());
            }
            writer.add(Document {
                doc_id: doc_id.clone(),
                title: r.title.trim().to_string(),
                subject_id: clean_subject(r.subject_id),
                date: r.date.unwrap_or_else(today),
                content,
            });
            outcomes.push(IngestOutcome { doc_id, warnings });
        }
        Ok(outcomes)
    }

    fn discard_originals(&self, doc_ids: &[String]) {
        let Some(blobs) = &self.blobs else { return };
        for doc_id in doc_ids {
            if let Err(err) = blobs.remove(doc_id) {
                tracing::warn!(%doc_id, %err, "failed to remove original of an aborted upload");
            }
        }
    }

    /// Parse query text with the index's analyzer, as `search` does.
    pub fn parse_query(&self, text: &str) -> Result<Query> {
        QueryParser::new(&Field::DEFAULT_SEARCH, self.manager.analyzer()).parse(text)
    }

    /// Ranked, filtered search. The limit caps the ranked list before filtering,
    /// so filtered results are always a subsequence of the unfiltered ones.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let text = request.query.trim();
        if text.is_empty() {
            return Err(SearchError::Validation("query text must not be empty".into()));
        }
        if request.limit == 0 {
            return Err(SearchError::Validation("limit must be a positive integer".into()));
        }
        request.filter.validate()?;
        let limit = request.limit.min(self.config.max_limit);

        let snapshot = self.manager.searcher();
        let query = self.parse_query(text)?;
        let ranked = scorer::score(&query, &snapshot.segment.index, self.config.idf, limit);
        let total_ranked = ranked.len();
        let filtered = filter::apply(ranked, &request.filter, &snapshot.segment.store, |r| r.doc_id.as_str());

        let mut hits = Vec::with_capacity(filtered.len());
        for r in filtered {
            let doc = snapshot.segment.store.get(&r.doc_id)?;
            hits.push(SearchHit {
                doc_id: r.doc_id,
                title: doc.title.clone(),
                subject_id: doc.subject_id.clone(),
                date: doc.date,
                score: r.score,
                content_snippet: make_snippet(&doc.content, &query.raw_terms, self.config.snippet_chars),
            });
        }
        tracing::debug!(query = text, generation = snapshot.generation, ranked = total_ranked, returned = hits.len(), "search");
        Ok(hits)
    }

    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.manager.searcher().segment.store.list().map(DocumentSummary::from).collect()
    }

    pub fn get_document(&self, doc_id: &str) -> Result<Document> {
        self.manager.searcher().segment.store.get(doc_id).cloned()
    }

    pub fn retrieve_original(&self, doc_id: &str) -> Result<Vec<u8>> {
        match &self.blobs {
            Some(blobs) => blobs.retrieve(doc_id),
            None => Err(SearchError::NotFound(format!("original content for '{doc_id}'"))),
        }
    }

    /// Destructive: drops every document and posting. Safe to repeat.
    pub fn rebuild_index(&self) -> Result<()> {
        self.manager.rebuild()
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.manager.searcher();
        IndexStats {
            num_docs: snapshot.segment.store.len(),
            num_terms: snapshot.segment.index.num_terms(),
            generation: snapshot.generation,
            location: self.manager.location().clone(),
        }
    }
}
