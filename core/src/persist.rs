use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fs::{self, create_dir_all, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::document::DocStore;
use crate::error::{Result, SearchError};
use crate::index::InvertedIndex;
use crate::schema::SCHEMA_VERSION;

/// Table of contents for the committed state; replaced atomically on every commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub generation: u64,
    pub num_docs: u32,
    pub committed_at: String,
    pub segment: String,
    pub checksum: String,
}

/// One committed generation: the inverted index plus stored fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    pub index: InvertedIndex,
    pub store: DocStore,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn meta_tmp(&self) -> PathBuf { self.root.join("meta.json.tmp") }
    fn segments_dir(&self) -> PathBuf { self.root.join("segments") }
    fn segment_name(generation: u64) -> String { format!("{generation:08}.seg") }
}

/// Outcome of reading the committed state from disk.
pub enum Loaded {
    Missing,
    Committed(MetaFile, Segment),
}

fn checksum(bytes: &[u8]) -> String {
    Sha1::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

/// Persist `segment` as generation `generation` and make it the committed state.
///
/// The segment file is written first; `meta.json` is swapped in by rename, so a
/// failure at any point leaves the previous generation in effect.
pub fn save_generation(paths: &IndexPaths, generation: u64, committed_at: String, segment: &Segment) -> Result<MetaFile> {
    create_dir_all(paths.segments_dir())?;
    let bytes = bincode::serialize(segment)?;
    let name = IndexPaths::segment_name(generation);
    write_synced(&paths.segments_dir().join(&name), &bytes)?;

    let meta = MetaFile {
        version: SCHEMA_VERSION,
        generation,
        num_docs: segment.store.len() as u32,
        committed_at,
        segment: name,
        checksum: checksum(&bytes),
    };
    let json = serde_json::to_string_pretty(&meta)?;
    write_synced(&paths.meta_tmp(), json.as_bytes())?;
    fs::rename(paths.meta_tmp(), paths.meta())?;

    prune_segments(paths, &meta.segment);
    Ok(meta)
}

fn prune_segments(paths: &IndexPaths, keep: &str) {
    let Ok(entries) = fs::read_dir(paths.segments_dir()) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        if entry.file_name().to_string_lossy() == keep {
            continue;
        }
        if let Err(err) = fs::remove_file(entry.path()) {
            tracing::warn!(path = %entry.path().display(), %err, "failed to remove stale segment");
        }
    }
}

/// Read the committed state. Anything that cannot be trusted is reported as
/// [`SearchError::IndexCorruption`]; other I/O failures stay [`SearchError::StorageIo`].
pub fn load_committed(paths: &IndexPaths) -> Result<Loaded> {
    let mut buf = String::new();
    match File::open(paths.meta()) {
        Ok(mut f) => {
            f.read_to_string(&mut buf).map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => SearchError::IndexCorruption(format!("meta.json is not UTF-8: {e}")),
                _ => SearchError::StorageIo(e),
            })?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if paths.segments_dir().exists() {
                return Err(SearchError::IndexCorruption("segments present without meta.json".into()));
            }
            return Ok(Loaded::Missing);
        }
        Err(e) => return Err(e.into()),
    }

    let meta: MetaFile = serde_json::from_str(&buf)
        .map_err(|e| SearchError::IndexCorruption(format!("unreadable meta.json: {e}")))?;
    if meta.version != SCHEMA_VERSION {
        return Err(SearchError::IndexCorruption(format!(
            "unsupported index version {} (expected {SCHEMA_VERSION})",
            meta.version
        )));
    }

    if !is_segment_file_name(&meta.segment) {
        return Err(SearchError::IndexCorruption(format!("invalid segment name {:?}", meta.segment)));
    }
    let seg_path = paths.segments_dir().join(&meta.segment);
    let bytes = match fs::read(&seg_path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SearchError::IndexCorruption(format!("missing segment {}", meta.segment)));
        }
        Err(e) => return Err(e.into()),
    };
    if checksum(&bytes) != meta.checksum {
        return Err(SearchError::IndexCorruption(format!("checksum mismatch in segment {}", meta.segment)));
    }
    let segment: Segment = bincode::deserialize(&bytes)
        .map_err(|e| SearchError::IndexCorruption(format!("undecodable segment {}: {e}", meta.segment)))?;
    Ok(Loaded::Committed(meta, segment))
}

/// A bare file name inside `segments/`; anything that could leave it is rejected.
fn is_segment_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && !name.contains(['/', '\\']) && !name.contains("..")
}

/// Remove everything under the index root, keeping the directory itself.
pub fn wipe(paths: &IndexPaths) -> Result<()> {
    if !paths.root.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(&paths.root)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
