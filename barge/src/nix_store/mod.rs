//! Nix store paths and operations.
//!
//! A store path is identified by its *base name*, a fixed-length hash
//! prefix followed by a human-readable name. All operations that touch
//! the actual store go through the `nix-store` command-line tool; see
//! [`NixStore`].

mod store;

use std::fmt;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{ser, Serialize};

use crate::error::{BargeError, BargeResult};

pub use store::NixStore;

#[cfg(test)]
mod tests;

/// Length of the hash prefix in a store path.
pub const STORE_PATH_PREFIX_LEN: usize = 32;

lazy_static! {
    /// Regex for a valid store path base name.
    ///
    /// A base name consists of two parts: a 32-character alphanumeric
    /// hash prefix and a human-readable name, separated by a dash. The
    /// name must be non-empty and cannot cross directory boundaries.
    static ref STORE_BASE_NAME_REGEX: Regex = {
        Regex::new(r"^[A-Za-z0-9]{32}-[^/]+$").unwrap()
    };
}

/// A path in a Nix store.
///
/// This identifies a direct child of the store directory, which may or
/// may not actually exist. The pair of hash prefix and name is
/// guaranteed to be of valid format.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorePath {
    /// The hash prefix.
    ///
    /// For example, for `ia70ss13m22znbl8khrf2hq72qmh5drr-ruby-2.7.5`,
    /// this would be `ia70ss13m22znbl8khrf2hq72qmh5drr`.
    prefix: String,

    /// The human-readable name.
    ///
    /// For the path above, this would be `ruby-2.7.5`.
    name: String,
}

/// A store path qualified with the directory of the store containing it.
///
/// For example, `/nix/store/ia70ss13m22znbl8khrf2hq72qmh5drr-ruby-2.7.5`
/// is the store path `ia70ss13m22znbl8khrf2hq72qmh5drr-ruby-2.7.5` in
/// the store rooted at `/nix/store`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FullStorePath {
    store_dir: PathBuf,
    path: StorePath,
}

impl StorePath {
    /// Parses a store path base name.
    pub fn parse(base_name: &str) -> BargeResult<Self> {
        if base_name.len() < STORE_PATH_PREFIX_LEN + 2 {
            return Err(BargeError::BadStorePath {
                text: base_name.to_string(),
                reason: "Base name is too short",
            });
        }

        if !STORE_BASE_NAME_REGEX.is_match(base_name) {
            return Err(BargeError::BadStorePath {
                text: base_name.to_string(),
                reason: "Base name is of invalid format",
            });
        }

        let (prefix, rest) = base_name.split_at(STORE_PATH_PREFIX_LEN);

        Ok(Self {
            prefix: prefix.to_string(),
            name: rest[1..].to_string(),
        })
    }

    /// Parses either a base name or a full store path.
    ///
    /// Both errors are reported when the input is neither.
    pub fn parse_permissive(text: &str) -> BargeResult<Self> {
        let base_err = match Self::parse(text) {
            Ok(path) => return Ok(path),
            Err(e) => e,
        };

        match FullStorePath::parse(Path::new(text)) {
            Ok(full) => Ok(full.into_path()),
            Err(full_err) => Err(BargeError::BadStorePathAnyForm {
                text: text.to_string(),
                as_base_name: base_err.to_string(),
                as_full_path: full_err.to_string(),
            }),
        }
    }

    /// Returns the hash prefix of the store path.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a shortened form for diagnostics.
    ///
    /// Only the first six characters of the hash prefix are kept, which
    /// is plenty to find the path again while keeping log lines short.
    pub fn abbreviate(&self) -> String {
        format!("{}-{}", &self.prefix[..6], self.name)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.name)
    }
}

impl Serialize for StorePath {
    /// Serializes the base name form.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl FullStorePath {
    /// Creates a full store path from a store directory and a base name.
    pub fn new(store_dir: PathBuf, path: StorePath) -> Self {
        Self { store_dir, path }
    }

    /// Parses an absolute path into its store directory and base name.
    pub fn parse(path: &Path) -> BargeResult<Self> {
        let file_name = path.file_name().ok_or_else(|| BargeError::EmptyBasename {
            path: path.to_owned(),
        })?;

        let store_dir = match path.parent() {
            Some(parent) if parent.is_absolute() => parent.to_owned(),
            _ => {
                return Err(BargeError::NotAbsolute {
                    path: path.to_owned(),
                })
            }
        };

        let base_name = file_name.to_str().ok_or_else(|| BargeError::BadStorePath {
            text: path.display().to_string(),
            reason: "Base name contains non-UTF-8 characters",
        })?;

        Ok(Self {
            store_dir,
            path: StorePath::parse(base_name)?,
        })
    }

    /// Returns the directory of the containing store.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Returns the store path.
    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Discards the store directory.
    pub fn into_path(self) -> StorePath {
        self.path
    }

    /// Returns the filesystem form of the path.
    pub fn to_path_buf(&self) -> PathBuf {
        self.store_dir.join(self.path.to_string())
    }
}

impl fmt::Display for FullStorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_dir.display(), self.path)
    }
}
