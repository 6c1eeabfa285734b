//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the web
//! front end. All types derive Serde traits for deserialization from TOML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the appliance web front end.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WebConfig {
    /// Listening interfaces. Each interface owns one virtual content root
    /// named after it (requests without a recognized prefix are qualified
    /// under the interface's own subdirectory).
    pub interfaces: Vec<InterfaceConfig>,

    /// Content tree locations and path policy.
    pub content: ContentConfig,

    /// Server version, stamped onto every served script asset.
    pub version: VersionConfig,

    /// Delivery loop settings.
    pub delivery: DeliveryConfig,

    /// Owner/contact string exposed to pages via the `OWNER_INFO` parameter.
    pub owner_info: String,

    /// Raw substitution parameters for `%[KEY]` markers in served pages.
    pub index_params: BTreeMap<String, String>,

    /// Installed extension identifiers, exposed via the `EXT_LIST_JS`
    /// parameter and permitted to resolve under the external extension root.
    pub extensions: Vec<String>,
}

/// One listening interface (name + port).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterfaceConfig {
    /// Interface name; doubles as the interface's virtual-root subdirectory.
    pub name: String,

    /// TCP port to listen on.
    pub port: u16,
}

/// Content tree configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Document root for filesystem-backed assets.
    pub docroot: String,

    /// External extension directory, outside the document root. Only
    /// extension-prefixed requests may resolve here.
    pub extension_root: String,

    /// Path suffixes reserved for configuration files; requests for them
    /// are refused before any source is consulted.
    pub forbidden_suffixes: Vec<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            docroot: "web".to_string(),
            extension_root: "/opt/webfront/extensions".to_string(),
            forbidden_suffixes: vec![".json".to_string()],
        }
    }
}

/// Server version, reported in the script-asset trailer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct VersionConfig {
    pub major: u32,
    pub minor: u32,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self { major: 1, minor: 0 }
    }
}

/// Delivery loop configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Fixed interval between delivery passes, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
        }
    }
}

impl WebConfig {
    /// Find the interface listening on `port`.
    pub fn interface_for_port(&self, port: u16) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.port == port)
    }
}
