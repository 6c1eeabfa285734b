//! Process-wide substitution parameter table.
//!
//! # Responsibilities
//! - Map `%[KEY]` identifiers to their current string values
//! - Rebuild the whole table atomically on every config (re)load
//! - Hand readers a consistent snapshot for the length of one substitution pass
//!
//! # Design Decisions
//! - Versioned immutable snapshot behind `ArcSwap`: the rebuild constructs a
//!   complete new table and swaps it in; a reader never observes a partially
//!   written table, and old snapshots are freed when the last reader drops
//!   its `Arc`.
//! - `EXT_LIST_JS` and `OWNER_INFO` are synthesized during rebuild from the
//!   extension list and owner string rather than stored as ordinary params.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::WebConfig;

/// One immutable generation of the parameter table.
#[derive(Debug, Default)]
pub struct ParamTable {
    entries: HashMap<String, String>,
}

impl ParamTable {
    /// Look up the value for a substitution identifier.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of entries in this generation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to the current parameter table generation.
#[derive(Clone)]
pub struct Params {
    inner: Arc<ArcSwap<ParamTable>>,
}

impl Params {
    /// Create a handle holding an empty table.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(ParamTable::default())),
        }
    }

    /// Rebuild the entire table from a configuration and swap it in.
    ///
    /// Exclusively called by the startup/reload path; every key from
    /// `index_params` is carried over, then the synthesized entries are added.
    pub fn rebuild(&self, config: &WebConfig) {
        let mut entries = HashMap::with_capacity(config.index_params.len() + 2);
        for (key, value) in &config.index_params {
            entries.insert(key.clone(), value.clone());
        }
        entries.insert("EXT_LIST_JS".to_string(), ext_list_js(&config.extensions));
        entries.insert("OWNER_INFO".to_string(), config.owner_info.clone());

        let table = ParamTable { entries };
        tracing::info!(params = table.len(), "Parameter table rebuilt");
        self.inner.store(Arc::new(table));
    }

    /// Get the current snapshot. Hold it for one whole substitution pass.
    pub fn snapshot(&self) -> Arc<ParamTable> {
        self.inner.load_full()
    }
}

/// Render the extension list as a JavaScript array literal, one generation
/// per rebuild so newly installed extensions appear on the next reload.
fn ext_list_js(extensions: &[String]) -> String {
    let quoted: Vec<String> = extensions
        .iter()
        .map(|e| format!("'{}'", e.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("[{}]", quoted.join(","))
}
