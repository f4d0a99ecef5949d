//! Cache metadata.
//!
//! Every binary cache advertises itself under `/nix-cache-info`:
//!
//! ```text
//! StoreDir: /nix/store
//! WantMassQuery: 1
//! Priority: 40
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::BargeResult;
use crate::manifest;

/// Self-description of a binary cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NixCacheInfo {
    /// The store directory the cached objects were built in.
    ///
    /// Objects are only substitutable into a store rooted at the same
    /// directory.
    #[serde(rename = "StoreDir")]
    pub store_dir: PathBuf,

    /// Whether the cache is willing to answer bulk existence queries.
    #[serde(rename = "WantMassQuery")]
    #[serde(default)]
    pub want_mass_query: bool,

    /// Relative priority among substituters. Lower is preferred.
    #[serde(rename = "Priority")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u64>,
}

impl NixCacheInfo {
    /// Parses cache metadata from a manifest string.
    pub fn from_str(manifest: &str) -> BargeResult<Self> {
        manifest::from_str(manifest)
    }

    /// Returns the serialized representation of the cache metadata.
    pub fn to_manifest(&self) -> BargeResult<String> {
        manifest::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let s = "StoreDir: /nix/store\nWantMassQuery: 1\nPriority: 40\n";

        let info = NixCacheInfo::from_str(s).expect("Could not parse cache info");

        assert_eq!(PathBuf::from("/nix/store"), info.store_dir);
        assert!(info.want_mass_query);
        assert_eq!(Some(40), info.priority);

        let round_trip = info.to_manifest().expect("Could not serialize cache info");
        assert_eq!(s, round_trip);
    }

    #[test]
    fn test_minimal() {
        let s = "StoreDir: /nix/store\n";

        let info = NixCacheInfo::from_str(s).expect("Could not parse cache info");

        assert_eq!(PathBuf::from("/nix/store"), info.store_dir);
        assert!(!info.want_mass_query);
        assert_eq!(None, info.priority);
    }
}
