//! Static content sources.
//!
//! # Responsibilities
//! - In-memory blob stores (embedded production assets, always-resident
//!   large assets) with a fixed origin timestamp
//! - Filesystem source rooted at the docroot, with a metadata-only probe
//!   mode that never reads file contents
//!
//! # Design Decisions
//! - Blob stores hold `&'static [u8]` so served embedded bytes are borrowed,
//!   not copied; the asset-embedding step is an external collaborator and
//!   registers entries at startup
//! - A candidate path starting with `/` bypasses the docroot join (the
//!   external extension root is the only caller that produces one)

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// In-memory blob store with a single origin timestamp for all entries.
///
/// The embedded store reports the server build time (the binary is the
/// origin of the data); the always-resident store reports a timestamp
/// captured once per process start.
pub struct BlobStore {
    entries: HashMap<String, &'static [u8]>,
    mtime: u64,
}

impl BlobStore {
    /// Create an empty store whose entries all carry `mtime`.
    pub fn new(mtime: u64) -> Self {
        Self {
            entries: HashMap::new(),
            mtime,
        }
    }

    /// Register a blob under `path`.
    pub fn insert(&mut self, path: impl Into<String>, bytes: &'static [u8]) {
        self.entries.insert(path.into(), bytes);
    }

    /// Look up a blob. No separate probe step: the fixed origin timestamp
    /// and the slice length are already in hand.
    pub fn get(&self, path: &str) -> Option<&'static [u8]> {
        self.entries.get(path).copied()
    }

    /// Fixed origin timestamp for every entry (seconds since epoch).
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Filesystem-backed content source.
pub struct FilesystemSource {
    docroot: PathBuf,
}

impl FilesystemSource {
    pub fn new(docroot: impl Into<PathBuf>) -> Self {
        Self {
            docroot: docroot.into(),
        }
    }

    /// Map a resolver candidate onto a concrete filesystem path.
    fn locate(&self, candidate: &str) -> PathBuf {
        if Path::new(candidate).is_absolute() {
            PathBuf::from(candidate)
        } else {
            self.docroot.join(candidate)
        }
    }

    /// Stat a candidate without reading it: `(size, mtime)` if it is a file.
    pub fn probe(&self, candidate: &str) -> std::io::Result<Option<(u64, u64)>> {
        match fs::metadata(self.locate(candidate)) {
            Ok(meta) if meta.is_file() => {
                let mtime = unix_mtime(&meta);
                Ok(Some((meta.len(), mtime)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read a candidate in full: `(bytes, mtime)` if it is a file.
    pub fn fetch(&self, candidate: &str) -> std::io::Result<Option<(Vec<u8>, u64)>> {
        let path = self.locate(candidate);
        let mut file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Ok(None);
        }
        let mut bytes = Vec::with_capacity(meta.len() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(Some((bytes, unix_mtime(&meta))))
    }
}

fn unix_mtime(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Seconds since epoch right now; used for the resident store's per-process
/// origin timestamp.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
