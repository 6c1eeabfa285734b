//! Content resolution and transformation.
//!
//! Turns a requested path into bytes plus freshness metadata, trying the
//! in-memory blob stores first and the filesystem last, then rewrites text
//! assets (`%[KEY]` substitution, script version stamping) before serving.

pub mod resolver;
pub mod rewrite;
pub mod sources;

pub use resolver::{
    ContentDescriptor, DynamicResponder, NoDynamic, Origin, ResolveError, ResolveRequest,
    Resolved, Resolver,
};
pub use rewrite::{asset_kind, substitute, version_trailer, AssetKind};
pub use sources::{BlobStore, FilesystemSource};
