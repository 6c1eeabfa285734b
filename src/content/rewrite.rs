//! Served-content rewriting: `%[KEY]` substitution and script version
//! stamping.
//!
//! Substitution applies only to markup/stylesheet assets and runs exactly
//! once per response; replaced output is never rescanned, so a value that
//! itself contains marker syntax passes through literally. The version
//! trailer is appended after all existing bytes so line numbers reported in
//! script errors are unaffected.

use crate::params::ParamTable;

/// Asset classes relevant to rewriting and cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Markup,
    Stylesheet,
    Script,
    Other,
}

impl AssetKind {
    /// Substitution targets.
    pub fn substitutable(self) -> bool {
        matches!(self, AssetKind::Markup | AssetKind::Stylesheet)
    }
}

/// Classify an asset by its final suffix.
pub fn asset_kind(path: &str) -> AssetKind {
    match path.rsplit('.').next() {
        _ if !path.contains('.') => AssetKind::Other,
        Some("html") => AssetKind::Markup,
        Some("css") => AssetKind::Stylesheet,
        Some("js") => AssetKind::Script,
        _ => AssetKind::Other,
    }
}

/// Rewrite `%[IDENT]` markers using the given parameter table snapshot.
///
/// Single left-to-right scan over the input. A known identifier is spliced
/// in (output may grow past the input length); an unknown identifier is
/// reproduced byte for byte including its delimiters. An unterminated
/// marker at end of input is copied through verbatim.
pub fn substitute(input: &[u8], params: &ParamTable) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%' && input.get(i + 1) == Some(&b'[') {
            let ident_start = i + 2;
            match input[ident_start..].iter().position(|&b| b == b']') {
                Some(rel) => {
                    let ident_end = ident_start + rel;
                    let value = std::str::from_utf8(&input[ident_start..ident_end])
                        .ok()
                        .and_then(|ident| params.get(ident));
                    match value {
                        Some(v) => out.extend_from_slice(v.as_bytes()),
                        None => out.extend_from_slice(&input[i..=ident_end]),
                    }
                    i = ident_end + 1;
                }
                None => {
                    // No closing delimiter; the rest is literal.
                    out.extend_from_slice(&input[i..]);
                    break;
                }
            }
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    out
}

/// Version trailer appended to every served script asset.
pub fn version_trailer(major: u32, minor: u32, path: &str) -> Vec<u8> {
    format!(
        "webfront_check_js_version.push({{ VERSION_MAJ:{}, VERSION_MIN:{}, file:'{}' }});\n",
        major, minor, path
    )
    .into_bytes()
}
