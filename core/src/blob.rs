use sha1::{Digest, Sha1};
use std::path::Path;

use crate::error::{Result, SearchError};

/// Storage for original uploaded bytes, keyed by `doc_id`.
pub trait BlobStore: Send + Sync {
    fn store(&self, doc_id: &str, bytes: &[u8]) -> Result<()>;
    fn retrieve(&self, doc_id: &str) -> Result<Vec<u8>>;
    /// Forget `doc_id`. Removing an unknown id is not an error.
    fn remove(&self, doc_id: &str) -> Result<()>;
}

/// Content-addressable blob store on sled: identical uploads share one blob.
pub struct SledBlobStore {
    db: sled::Db,
    blobs: sled::Tree,
    refs: sled::Tree,
}

impl SledBlobStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store that disappears on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let blobs = db.open_tree("blobs")?;
        let refs = db.open_tree("refs")?;
        Ok(Self { db, blobs, refs })
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl BlobStore for SledBlobStore {
    fn store(&self, doc_id: &str, bytes: &[u8]) -> Result<()> {
        let hash = Sha1::digest(bytes);
        if !self.blobs.contains_key(hash.as_slice())? {
            self.blobs.insert(hash.as_slice(), bytes)?;
        }
        self.refs.insert(doc_id.as_bytes(), hash.as_slice())?;
        self.db.flush()?;
        Ok(())
    }

    fn retrieve(&self, doc_id: &str) -> Result<Vec<u8>> {
        let missing = || SearchError::NotFound(format!("original content for '{doc_id}'"));
        let hash = self.refs.get(doc_id.as_bytes())?.ok_or_else(missing)?;
        let bytes = self.blobs.get(&hash)?.ok_or_else(missing)?;
        Ok(bytes.to_vec())
    }

    fn remove(&self, doc_id: &str) -> Result<()> {
        let Some(hash) = self.refs.remove(doc_id.as_bytes())? else {
            return Ok(());
        };
        let mut shared = false;
        for entry in self.refs.iter() {
            let (_, other) = entry?;
            if other == hash {
                shared = true;
                break;
            }
        }
        if !shared {
            self.blobs.remove(&hash)?;
        }
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_retrieves_by_doc_id() {
        let store = SledBlobStore::temporary().unwrap();
        store.store("a", b"report body").unwrap();
        assert_eq!(store.retrieve("a").unwrap(), b"report body");
        assert!(matches!(store.retrieve("b"), Err(SearchError::NotFound(_))));
    }

    #[test]
    fn identical_content_is_shared() {
        let store = SledBlobStore::temporary().unwrap();
        store.store("a", b"same").unwrap();
        store.store("b", b"same").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.blobs.len(), 1);
    }

    #[test]
    fn removing_keeps_blobs_other_ids_still_reference() {
        let store = SledBlobStore::temporary().unwrap();
        store.store("a", b"same").unwrap();
        store.store("b", b"same").unwrap();
        store.remove("a").unwrap();
        assert!(matches!(store.retrieve("a"), Err(SearchError::NotFound(_))));
        assert_eq!(store.retrieve("b").unwrap(), b"same");

        store.remove("b").unwrap();
        store.remove("b").unwrap();
        assert!(store.is_empty());
        assert!(store.blobs.is_empty());
    }
}
