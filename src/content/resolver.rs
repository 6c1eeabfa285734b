//! URI-to-content resolution.
//!
//! # Responsibilities
//! - Refuse configuration-file paths and directory escapes before any lookup
//! - Route recognized virtual-root prefixes via an ordered rule list
//! - Qualify bare paths under the active interface's own subdirectory
//! - Try each candidate against embedded blob → resident blob → filesystem
//! - Fall back to the dynamic-response hook outside the probe phase
//!
//! # Design Decisions
//! - Normalization happens exactly once, before any source is consulted;
//!   a path that needed parent components stripped is refused outright
//! - Prefix routing is an ordered (prefix, class) rule list ending in the
//!   interface-subdirectory default, so the order is independently testable
//! - Probe mode returns metadata only; filesystem content is never read
//! - Only extension-prefixed paths may resolve outside the docroot, and only
//!   under the configured external extension root

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::content::sources::{BlobStore, FilesystemSource};

/// Where resolved bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Compiled-in production asset.
    Embedded,
    /// Large seldom-changed asset kept in memory even in development.
    Resident,
    /// Read from the docroot (or the external extension root).
    Filesystem,
    /// Synthesized per-request by the dynamic-response hook.
    Dynamic,
}

/// Fully resolved content for one request. Never cached beyond the request.
#[derive(Debug)]
pub struct ContentDescriptor {
    /// Borrowed for blob-backed assets, owned for filesystem and dynamic
    /// responses (the owned buffer is released when the descriptor drops).
    pub bytes: Cow<'static, [u8]>,
    /// Origin timestamp, seconds since epoch. Zero for dynamic responses.
    pub mtime: u64,
    pub origin: Origin,
    /// The candidate path that matched (qualified form).
    pub path: String,
}

/// Resolution result: metadata only in probe mode, full bytes otherwise.
#[derive(Debug)]
pub enum Resolved {
    Meta {
        size: u64,
        mtime: u64,
        origin: Origin,
        path: String,
    },
    Full(ContentDescriptor),
}

impl Resolved {
    /// Path of the matching candidate.
    pub fn path(&self) -> &str {
        match self {
            Resolved::Meta { path, .. } => path,
            Resolved::Full(desc) => &desc.path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("forbidden path: {path}")]
    Forbidden { path: String },
    #[error("no content source matched {original} ({qualified})")]
    NotFound { original: String, qualified: String },
    #[error("error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// One request as seen by the resolver.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    /// Request path as received (leading slash intact).
    pub path: &'a str,
    /// Raw query string, handed to the dynamic hook.
    pub query: &'a str,
    /// Name of the interface the request arrived on.
    pub interface: &'a str,
    /// Peer address, for policy/not-found logging.
    pub peer: &'a str,
}

/// Hook for per-request synthesized responses (status pages, uploads).
///
/// Invoked only after every static source has missed, never during the
/// probe phase. A response is an ephemeral owned buffer served as
/// `text/plain` and never marked cacheable.
pub trait DynamicResponder: Send + Sync {
    fn respond(&self, path: &str, query: &str) -> Option<Vec<u8>>;
}

/// Responder that never answers; the default when no hook is installed.
pub struct NoDynamic;

impl DynamicResponder for NoDynamic {
    fn respond(&self, _path: &str, _query: &str) -> Option<Vec<u8>> {
        None
    }
}

/// How a recognized prefix routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootClass {
    /// Use the path verbatim (the prefix already names a content subtree).
    Verbatim,
    /// Verbatim, and additionally allowed to fall back to the external
    /// extension root.
    Extension,
    /// Configuration-file root: refused before resolution.
    Rejected,
}

/// One entry of the ordered prefix-routing rule list.
#[derive(Debug, Clone)]
pub struct PrefixRule {
    pub prefix: &'static str,
    pub class: RootClass,
}

/// Core-assets root, also the default fallback for unprefixed paths.
pub const DEFAULT_ROOT: &str = "app";

/// The fixed closed set of recognized virtual roots, in evaluation order.
pub fn default_rules() -> Vec<PrefixRule> {
    vec![
        PrefixRule {
            prefix: "app/",
            class: RootClass::Verbatim,
        },
        PrefixRule {
            prefix: "extensions/",
            class: RootClass::Extension,
        },
        PrefixRule {
            prefix: "pkgs/",
            class: RootClass::Verbatim,
        },
        PrefixRule {
            prefix: "config/",
            class: RootClass::Rejected,
        },
        PrefixRule {
            prefix: "app.config/",
            class: RootClass::Rejected,
        },
    ]
}

/// Resolves request paths to content, first source wins.
pub struct Resolver {
    embedded: Arc<BlobStore>,
    resident: Arc<BlobStore>,
    fs: FilesystemSource,
    extension_root: PathBuf,
    forbidden_suffixes: Vec<String>,
    rules: Vec<PrefixRule>,
    dynamic: Arc<dyn DynamicResponder>,
}

/// One lookup candidate: `key` is matched against the blob stores and shown
/// in logs; the filesystem source derives its own path from it.
#[derive(Debug, Clone)]
struct Candidate {
    key: String,
}

impl Resolver {
    pub fn new(
        embedded: Arc<BlobStore>,
        resident: Arc<BlobStore>,
        docroot: impl Into<PathBuf>,
        extension_root: impl Into<PathBuf>,
        forbidden_suffixes: Vec<String>,
        dynamic: Arc<dyn DynamicResponder>,
    ) -> Self {
        Self {
            embedded,
            resident,
            fs: FilesystemSource::new(docroot.into()),
            extension_root: extension_root.into(),
            forbidden_suffixes,
            rules: default_rules(),
            dynamic,
        }
    }

    /// Resolve a request path.
    ///
    /// With `probe` set, filesystem sources answer from metadata only and
    /// the dynamic hook is skipped (a would-be dynamic response reports
    /// `NotFound`, which the cache negotiator maps to "not cacheable").
    pub fn resolve(&self, req: &ResolveRequest<'_>, probe: bool) -> Result<Resolved, ResolveError> {
        // "/" and "index.html" must behave identically.
        let raw = if req.path == "/" {
            "index.html"
        } else {
            req.path.trim_start_matches('/')
        };

        let (original, escaped) = normalize_path(raw);
        if escaped {
            tracing::warn!(peer = req.peer, path = req.path, "path escapes content tree");
            return Err(ResolveError::Forbidden {
                path: req.path.to_string(),
            });
        }
        if let Some(suffix) = self.forbidden_suffix(&original) {
            tracing::warn!(
                peer = req.peer,
                path = %original,
                query = req.query,
                suffix,
                "attempt to fetch configuration file"
            );
            return Err(ResolveError::Forbidden { path: original });
        }

        // Ordered prefix routing; unmatched paths fall through to the
        // interface's own subdirectory.
        let rule = self
            .rules
            .iter()
            .find(|r| original.starts_with(r.prefix));
        let (qualified, has_prefix, is_extension) = match rule.map(|r| r.class) {
            Some(RootClass::Rejected) => {
                tracing::warn!(peer = req.peer, path = %original, "configuration root refused");
                return Err(ResolveError::Forbidden { path: original });
            }
            Some(RootClass::Extension) => (original.clone(), true, true),
            Some(RootClass::Verbatim) => (original.clone(), true, false),
            None => (format!("{}/{}", req.interface, original), false, false),
        };

        let mut candidates = vec![
            Candidate {
                key: qualified.clone(),
            },
            Candidate {
                key: format!("{}.html", qualified),
            },
        ];
        if !has_prefix {
            candidates.push(Candidate {
                key: format!("{}/{}", DEFAULT_ROOT, original),
            });
            candidates.push(Candidate {
                key: format!("{}/{}.html", DEFAULT_ROOT, original),
            });
        }
        if is_extension {
            // The only path class permitted outside the docroot; `original`
            // has already passed escape normalization.
            let ext = self.extension_root.join(&original);
            candidates.push(Candidate {
                key: path_to_key(&ext),
            });
            candidates.push(Candidate {
                key: format!("{}.html", path_to_key(&ext)),
            });
        }

        for candidate in &candidates {
            if let Some(resolved) = self.try_candidate(candidate, probe)? {
                return Ok(resolved);
            }
        }

        if !probe {
            if let Some(bytes) = self.dynamic.respond(&original, req.query) {
                tracing::debug!(peer = req.peer, path = %original, "dynamic response");
                return Ok(Resolved::Full(ContentDescriptor {
                    bytes: Cow::Owned(bytes),
                    mtime: 0,
                    origin: Origin::Dynamic,
                    path: original,
                }));
            }
        }

        tracing::info!(
            peer = req.peer,
            original = %original,
            qualified = %qualified,
            query = req.query,
            "no content source matched"
        );
        Err(ResolveError::NotFound {
            original,
            qualified,
        })
    }

    fn forbidden_suffix(&self, path: &str) -> Option<&str> {
        self.forbidden_suffixes
            .iter()
            .find(|s| path.ends_with(s.as_str()))
            .map(String::as_str)
    }

    /// Try one candidate against every source in priority order.
    fn try_candidate(
        &self,
        candidate: &Candidate,
        probe: bool,
    ) -> Result<Option<Resolved>, ResolveError> {
        for (store, origin) in [
            (&self.embedded, Origin::Embedded),
            (&self.resident, Origin::Resident),
        ] {
            if let Some(bytes) = store.get(&candidate.key) {
                return Ok(Some(if probe {
                    Resolved::Meta {
                        size: bytes.len() as u64,
                        mtime: store.mtime(),
                        origin,
                        path: candidate.key.clone(),
                    }
                } else {
                    Resolved::Full(ContentDescriptor {
                        bytes: Cow::Borrowed(bytes),
                        mtime: store.mtime(),
                        origin,
                        path: candidate.key.clone(),
                    })
                }));
            }
        }

        if probe {
            // Stat only; file contents are never read in the probe phase.
            if let Some((size, mtime)) = self
                .fs
                .probe(&candidate.key)
                .map_err(|e| io_error(&candidate.key, e))?
            {
                return Ok(Some(Resolved::Meta {
                    size,
                    mtime,
                    origin: Origin::Filesystem,
                    path: candidate.key.clone(),
                }));
            }
        } else if let Some((bytes, mtime)) = self
            .fs
            .fetch(&candidate.key)
            .map_err(|e| io_error(&candidate.key, e))?
        {
            return Ok(Some(Resolved::Full(ContentDescriptor {
                bytes: Cow::Owned(bytes),
                mtime,
                origin: Origin::Filesystem,
                path: candidate.key.clone(),
            })));
        }

        Ok(None)
    }
}

fn io_error(path: &str, source: std::io::Error) -> ResolveError {
    ResolveError::Io {
        path: path.to_string(),
        source,
    }
}

fn path_to_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Collapse duplicate separators, `.` segments and parent references.
///
/// Returns the cleaned path and whether a `..` tried to pop past the root —
/// the latter marks a directory-escape attempt and the caller refuses it.
pub fn normalize_path(path: &str) -> (String, bool) {
    let mut segments: Vec<&str> = Vec::new();
    let mut escaped = false;
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    escaped = true;
                }
            }
            s => segments.push(s),
        }
    }
    (segments.join("/"), escaped)
}
