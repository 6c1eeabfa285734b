//! Cache negotiation over the content resolver.
//!
//! # Responsibilities
//! - Probe phase: freshness metadata only, no content read
//! - Decision phase: evaluate client validators against probe metadata and
//!   log the outcome (the decision never alters resolution)
//! - Fetch phase: full bytes, substitution and version stamping applied
//!
//! # Design Decisions
//! - Script assets and dynamic responses are excluded from cacheability
//!   unconditionally: scripts carry a per-fetch version stamp and dynamic
//!   responses depend on live query parameters
//! - Static assets cache by origin mtime even though substitution can change
//!   the body without touching mtime; consequently the ETag (derived from
//!   size+mtime) can mismatch while not-modified-since still holds, so the
//!   two validators are OR-ed
//! - No `must-revalidate` is emitted; the historical policy is the contract

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use crate::config::schema::VersionConfig;
use crate::content::resolver::{ResolveError, ResolveRequest, Resolved, Resolver};
use crate::content::rewrite::{asset_kind, substitute, version_trailer, AssetKind};
use crate::content::Origin;
use crate::params::Params;

/// Probe-phase answer: metadata for cacheable assets, or an unconditional
/// refusal to be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheProbe {
    NotCacheable,
    Cacheable { size: u64, mtime: u64 },
}

/// Outcome of evaluating the client's validators. Computed per request,
/// never persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheDecision {
    pub etag_match: bool,
    pub not_modified_since: bool,
    /// OR of the two validators; answers 304 when set.
    pub not_modified: bool,
}

/// Fully prepared response content from the fetch phase.
#[derive(Debug)]
pub struct ServedContent {
    /// Final bytes after substitution and version stamping.
    pub bytes: Vec<u8>,
    /// Origin timestamp; zero for dynamic responses.
    pub mtime: u64,
    pub origin: Origin,
    pub kind: AssetKind,
    /// The qualified path that matched.
    pub path: String,
    /// Whether standard cache validators may be attached to the response.
    pub cacheable: bool,
}

/// Drives the probe/decision/fetch protocol over the resolver.
pub struct Negotiator {
    resolver: Arc<Resolver>,
    params: Params,
    version: VersionConfig,
}

impl Negotiator {
    pub fn new(resolver: Arc<Resolver>, params: Params, version: VersionConfig) -> Self {
        Self {
            resolver,
            params,
            version,
        }
    }

    /// Probe phase: resolve metadata only.
    ///
    /// A path no static source matches answers `NotCacheable` (it may still
    /// be served dynamically in the fetch phase); policy rejections
    /// propagate as errors.
    pub fn probe(&self, req: &ResolveRequest<'_>) -> Result<CacheProbe, ResolveError> {
        match self.resolver.resolve(req, true) {
            Ok(resolved) => {
                if asset_kind(resolved.path()) == AssetKind::Script {
                    // Version stamping makes every script fetch unique.
                    return Ok(CacheProbe::NotCacheable);
                }
                match resolved {
                    Resolved::Meta { size, mtime, .. } => {
                        Ok(CacheProbe::Cacheable { size, mtime })
                    }
                    // Probe resolution never returns content.
                    Resolved::Full(desc) => Ok(CacheProbe::Cacheable {
                        size: desc.bytes.len() as u64,
                        mtime: desc.mtime,
                    }),
                }
            }
            Err(ResolveError::NotFound { .. }) => Ok(CacheProbe::NotCacheable),
            Err(e) => Err(e),
        }
    }

    /// Decision phase: evaluate the client's validators against the probe.
    ///
    /// Logged but otherwise side-effect free; the fetch phase re-resolves
    /// regardless of the outcome reported here.
    pub fn decide(
        &self,
        req: &ResolveRequest<'_>,
        probe: CacheProbe,
        if_none_match: Option<&str>,
        if_modified_since: Option<&str>,
    ) -> CacheDecision {
        let decision = match probe {
            CacheProbe::NotCacheable => CacheDecision::default(),
            CacheProbe::Cacheable { size, mtime } => {
                let etag_match = if_none_match
                    .map(|header| etag_header_matches(header, &etag(size, mtime)))
                    .unwrap_or(false);
                let not_modified_since = if_modified_since
                    .map(|header| not_modified_since(header, mtime))
                    .unwrap_or(false);
                CacheDecision {
                    etag_match,
                    not_modified_since,
                    not_modified: etag_match || not_modified_since,
                }
            }
        };

        tracing::debug!(
            peer = req.peer,
            path = req.path,
            cached = decision.not_modified,
            etag_match = decision.etag_match,
            not_modified_since = decision.not_modified_since,
            "cache decision"
        );
        decision
    }

    /// Fetch phase: full content with substitution and version stamping.
    pub fn fetch(&self, req: &ResolveRequest<'_>) -> Result<ServedContent, ResolveError> {
        let resolved = self.resolver.resolve(req, false)?;
        let desc = match resolved {
            Resolved::Full(desc) => desc,
            Resolved::Meta { path, .. } => {
                // Fetch resolution always carries bytes; treat a bare stat
                // as a miss rather than serving an empty body.
                return Err(ResolveError::NotFound {
                    original: req.path.to_string(),
                    qualified: path,
                });
            }
        };

        if desc.origin == Origin::Dynamic {
            return Ok(ServedContent {
                bytes: desc.bytes.into_owned(),
                mtime: 0,
                origin: Origin::Dynamic,
                kind: AssetKind::Other,
                path: desc.path,
                cacheable: false,
            });
        }

        let kind = asset_kind(&desc.path);
        let mut bytes = if kind.substitutable() {
            // One snapshot for the whole pass; never rescan the output.
            let table = self.params.snapshot();
            substitute(&desc.bytes, &table)
        } else {
            desc.bytes.into_owned()
        };

        if kind == AssetKind::Script {
            bytes.extend_from_slice(&version_trailer(
                self.version.major,
                self.version.minor,
                &desc.path,
            ));
        }

        Ok(ServedContent {
            bytes,
            mtime: desc.mtime,
            origin: desc.origin,
            kind,
            path: desc.path,
            cacheable: kind != AssetKind::Script,
        })
    }
}

/// Entity tag derived from probe metadata.
pub fn etag(size: u64, mtime: u64) -> String {
    format!("\"{:x}-{:x}\"", mtime, size)
}

/// Format an origin timestamp as an HTTP date.
pub fn http_date(mtime: u64) -> String {
    httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(mtime))
}

/// Compare an If-None-Match header against our tag (weak markers and
/// comma-separated lists tolerated, `*` matches anything).
fn etag_header_matches(header: &str, our_etag: &str) -> bool {
    if header.trim() == "*" {
        return true;
    }
    let ours = strip_etag_wrapper(our_etag);
    header
        .split(',')
        .any(|candidate| strip_etag_wrapper(candidate.trim()) == ours)
}

fn strip_etag_wrapper(etag: &str) -> &str {
    let trimmed = etag.trim();
    trimmed.strip_prefix("W/").unwrap_or(trimmed).trim_matches('"')
}

/// If-Modified-Since check at HTTP's one-second resolution. An unparseable
/// date conservatively counts as modified.
fn not_modified_since(header: &str, mtime: u64) -> bool {
    match httpdate::parse_http_date(header) {
        Ok(client_time) => UNIX_EPOCH + Duration::from_secs(mtime) <= client_time,
        Err(_) => false,
    }
}
