use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::document::Document;
use crate::error::{Result, SearchError};
use crate::persist::{load_committed, save_generation, wipe, IndexPaths, Loaded, Segment};
use crate::tokenizer::Analyzer;

/// An immutable view of one committed generation. Searches hold an `Arc` to it
/// for their whole duration, so later commits never change what they see.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub generation: u64,
    pub segment: Segment,
}

/// Why `open_or_create` discarded the persisted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryEvent {
    pub reason: String,
}

/// Sole owner of the on-disk index. Writers are serialized by `writer_lock`;
/// readers only touch `committed` long enough to clone the `Arc`.
pub struct IndexManager {
    paths: IndexPaths,
    analyzer: Arc<dyn Analyzer>,
    committed: RwLock<Arc<Snapshot>>,
    writer_lock: Mutex<()>,
    recovery: Option<RecoveryEvent>,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

impl IndexManager {
    /// Open the index at `location`, creating an empty one if absent. A corrupt
    /// index is wiped and recreated; the event is logged and kept in [`Self::recovery`].
    pub fn open_or_create<P: AsRef<Path>>(location: P, analyzer: Arc<dyn Analyzer>) -> Result<Self> {
        let paths = IndexPaths::new(location);
        create_dir_all(&paths.root)?;

        let (snapshot, recovery) = match load_committed(&paths) {
            Ok(Loaded::Committed(meta, segment)) => {
                tracing::info!(root = %paths.root.display(), generation = meta.generation, num_docs = meta.num_docs, "opened index");
                (Snapshot { generation: meta.generation, segment }, None)
            }
            Ok(Loaded::Missing) => {
                save_generation(&paths, 0, now_rfc3339(), &Segment::default())?;
                tracing::info!(root = %paths.root.display(), "created empty index");
                (Snapshot::default(), None)
            }
            Err(SearchError::IndexCorruption(reason)) => {
                tracing::warn!(root = %paths.root.display(), %reason, "index corrupted, recreating empty index");
                wipe(&paths)?;
                save_generation(&paths, 0, now_rfc3339(), &Segment::default())?;
                (Snapshot::default(), Some(RecoveryEvent { reason }))
            }
            Err(other) => return Err(other),
        };

        Ok(Self {
            paths,
            analyzer,
            committed: RwLock::new(Arc::new(snapshot)),
            writer_lock: Mutex::new(()),
            recovery,
        })
    }

    pub fn location(&self) -> &PathBuf {
        &self.paths.root
    }

    pub fn recovery(&self) -> Option<&RecoveryEvent> {
        self.recovery.as_ref()
    }

    pub fn analyzer(&self) -> &dyn Analyzer {
        self.analyzer.as_ref()
    }

    /// Latest committed snapshot.
    pub fn searcher(&self) -> Arc<Snapshot> {
        self.committed.read().clone()
    }

    /// Start a write batch. Blocks while another writer is active.
    pub fn writer(&self) -> IndexWriter<'_> {
        let guard = self.writer_lock.lock();
        let base = self.searcher();
        IndexWriter {
            manager: self,
            _guard: guard,
            generation: base.generation,
            working: base.segment.clone(),
            pending: 0,
        }
    }

    /// Discard every document and posting. Rebuilding an empty index is a no-op success.
    pub fn rebuild(&self) -> Result<()> {
        let _guard = self.writer_lock.lock();
        let current = self.searcher();
        if current.segment.store.is_empty() && current.segment.index.num_docs() == 0 {
            tracing::info!("rebuild requested on empty index");
            return Ok(());
        }
        self.publish(current.generation + 1, Segment::default())?;
        tracing::info!(discarded = current.segment.store.len(), "index rebuilt empty");
        Ok(())
    }

    fn publish(&self, generation: u64, segment: Segment) -> Result<()> {
        save_generation(&self.paths, generation, now_rfc3339(), &segment)?;
        *self.committed.write() = Arc::new(Snapshot { generation, segment });
        Ok(())
    }
}

/// A batch of additions. Nothing is visible to readers until [`IndexWriter::commit`];
/// dropping the writer discards the batch.
pub struct IndexWriter<'a> {
    manager: &'a IndexManager,
    _guard: MutexGuard<'a, ()>,
    generation: u64,
    working: Segment,
    pending: usize,
}

impl<'a> IndexWriter<'a> {
    pub fn add(&mut self, document: Document) {
        self.working.index.add(&document, self.manager.analyzer.as_ref());
        self.working.store.put(document);
        self.pending += 1;
    }

    /// True if `doc_id` exists in the committed state or in this batch.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.working.store.contains(doc_id)
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Atomically publish the batch. On error the previous generation stays
    /// committed and the batch is dropped.
    pub fn commit(self) -> Result<u64> {
        let generation = self.generation + 1;
        let pending = self.pending;
        self.manager.publish(generation, self.working)?;
        tracing::info!(generation, added = pending, "committed index batch");
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::StemmingAnalyzer;
    use tempfile::tempdir;
    use time::macros::date;

    fn doc(id: &str) -> Document {
        Document { doc_id: id.into(), title: "Chest Xray".into(), subject_id: None, date: date!(2024 - 01 - 05), content: "rib".into() }
    }

    fn open(path: &Path) -> IndexManager {
        IndexManager::open_or_create(path, Arc::new(StemmingAnalyzer)).unwrap()
    }

    #[test]
    fn uncommitted_batches_are_invisible() {
        let dir = tempdir().unwrap();
        let mgr = open(dir.path());
        {
            let mut w = mgr.writer();
            w.add(doc("a"));
            assert!(w.contains("a"));
            assert!(mgr.searcher().segment.store.is_empty());
        }
        assert!(mgr.searcher().segment.store.is_empty());

        let mut w = mgr.writer();
        w.add(doc("a"));
        w.add(doc("b"));
        assert_eq!(w.commit().unwrap(), 1);
        assert_eq!(mgr.searcher().segment.store.len(), 2);
    }

    #[test]
    fn readers_keep_their_snapshot_across_commits() {
        let dir = tempdir().unwrap();
        let mgr = open(dir.path());
        let before = mgr.searcher();
        let mut w = mgr.writer();
        w.add(doc("a"));
        w.commit().unwrap();
        assert!(before.segment.store.is_empty());
        assert_eq!(mgr.searcher().segment.store.len(), 1);
    }

    #[test]
    fn committed_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let mgr = open(dir.path());
            let mut w = mgr.writer();
            w.add(doc("a"));
            w.commit().unwrap();
        }
        let mgr = open(dir.path());
        assert!(mgr.recovery().is_none());
        assert!(mgr.searcher().segment.store.get("a").is_ok());
    }

    #[test]
    fn corrupt_index_is_recreated_with_a_recovery_event() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("meta.json"), "\u{0}\u{1}broken").unwrap();
        let mgr = open(dir.path());
        assert!(mgr.recovery().is_some());
        assert!(mgr.searcher().segment.store.is_empty());
        // recovered index is healthy on the next open
        drop(mgr);
        assert!(open(dir.path()).recovery().is_none());
    }

    #[test]
    fn rebuild_is_idempotent() {
        let dir = tempdir().unwrap();
        let mgr = open(dir.path());
        let mut w = mgr.writer();
        w.add(doc("a"));
        w.commit().unwrap();
        mgr.rebuild().unwrap();
        assert!(mgr.searcher().segment.store.is_empty());
        mgr.rebuild().unwrap();
        assert!(mgr.searcher().segment.store.is_empty());
        assert_eq!(mgr.searcher().segment.index.num_docs(), 0);
    }

    #[test]
    fn failed_commit_keeps_the_previous_generation() {
        let dir = tempdir().unwrap();
        let mgr = open(dir.path());
        let mut w = mgr.writer();
        w.add(doc("a"));
        w.commit().unwrap();

        // meta.json.tmp cannot be created while a directory occupies its path
        std::fs::create_dir(dir.path().join("meta.json.tmp")).unwrap();
        let mut w = mgr.writer();
        w.add(doc("b"));
        assert!(w.commit().is_err());
        let snapshot = mgr.searcher();
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.segment.store.get("b").is_err());
        assert!(snapshot.segment.store.get("a").is_ok());

        std::fs::remove_dir(dir.path().join("meta.json.tmp")).unwrap();
        drop(mgr);
        let mgr = open(dir.path());
        assert!(mgr.recovery().is_none());
        assert_eq!(mgr.searcher().generation, 1);
        assert_eq!(mgr.searcher().segment.store.len(), 1);

        let mut w = mgr.writer();
        w.add(doc("b"));
        assert_eq!(w.commit().unwrap(), 2);
        assert_eq!(std::fs::read_dir(dir.path().join("segments")).unwrap().count(), 1);
    }
}
