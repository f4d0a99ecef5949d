//! NAR info.
//!
//! A `.narinfo` is the sidecar metadata describing one archive on a
//! binary cache. An example of a valid `.narinfo`:
//!
//! ```text
//! StorePath: /nix/store/p4pclmv1gyja5kzc26npqpia1qqxrf0l-ruby-2.7.3
//! FileHash: sha256:1w1fff338fvdw53sqgamddn1b2xgds473pv6y13gizdbqjv4i5p3
//! FileSize: 4029176
//! NarHash: sha256:1impfw8zdgisxkghq9a3q7cn7jb9zyzgxdydiamp8z2nlyyl0h5h
//! NarSize: 18735072
//! References: 0d71ygfwbmy1xjlbj1v027dfmy9cqavy-libffi-3.3 a4yw1svqqk4d8lhwinn9xp847zz9gfma-bash-4.4-p23
//! Deriver: bidkcs01mww363s4s7akdhbl6ws66b0z-ruby-2.7.3.drv
//! ```
//!
//! Caches in the wild carry additional keys (`URL`, `Compression`,
//! `Sig`); they are ignored here since the upload protocol does not
//! consume them.

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use serde::{de, Deserialize, Serialize};
use serde_with::serde_as;

use crate::error::BargeResult;
use crate::hash::FileHash;
use crate::manifest::{self, SpaceDelimitedList};

/// NAR information.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarInfo {
    /// The full store path being cached, including the store directory.
    ///
    /// Example: `/nix/store/p4pclmv1gyja5kzc26npqpia1qqxrf0l-ruby-2.7.3`.
    #[serde(rename = "StorePath")]
    pub store_path: PathBuf,

    /// The hash of the NAR archive.
    #[serde(rename = "NarHash")]
    pub nar_hash: FileHash,

    /// The size of the NAR archive.
    #[serde(rename = "NarSize")]
    pub nar_size: u64,

    /// The hash of the file served by the cache.
    ///
    /// This differs from `NarHash` when the cache stores the archive
    /// compressed.
    #[serde(rename = "FileHash")]
    pub file_hash: FileHash,

    /// The size of the file served by the cache.
    #[serde(rename = "FileSize")]
    pub file_size: u64,

    /// Other store paths this object directly references.
    ///
    /// This only includes the base names, not the store directory
    /// itself.
    #[serde(rename = "References")]
    #[serde_as(as = "SpaceDelimitedList")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    /// The derivation that produced this object.
    #[serde(rename = "Deriver")]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_deriver")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deriver: Option<PathBuf>,
}

impl NarInfo {
    /// Parses a narinfo from a manifest string.
    pub fn from_str(manifest: &str) -> BargeResult<Self> {
        manifest::from_str(manifest)
    }

    /// Returns the serialized representation of the narinfo.
    pub fn to_manifest(&self) -> BargeResult<String> {
        manifest::to_string(self)
    }

    /// Returns the name of the archive file on the cache.
    ///
    /// Caches key archives by their file hash in Base32.
    pub fn nar_name(&self) -> String {
        format!("{}.nar", self.file_hash.body_base32())
    }
}

fn deserialize_deriver<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.as_str() {
        "unknown-deriver" => Ok(None),
        _ => Ok(Some(PathBuf::from(s))),
    }
}
