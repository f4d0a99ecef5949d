//! Error handling.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use displaydoc::Display;

pub type BargeResult<T> = Result<T, BargeError>;

/// An error.
#[derive(Debug, Display)]
pub enum BargeError {
    /// Invalid store path base name "{text}": {reason}
    BadStorePath { text: String, reason: &'static str },

    /// Store path {path:?} is not absolute
    NotAbsolute { path: PathBuf },

    /// Store path {path:?} has no base name
    EmptyBasename { path: PathBuf },

    /// "{text}" is neither a base name ({as_base_name}) nor a full store path ({as_full_path})
    BadStorePathAnyForm {
        text: String,
        as_base_name: String,
        as_full_path: String,
    },

    /// Hashing error: {0}
    HashError(crate::hash::Error),

    /// Manifest error: {0}
    ManifestError(crate::manifest::Error),

    /// Invalid derivation: {0}
    DerivationError(crate::derivation::ParseError),

    /// I/O error: {error}
    IoError { error: io::Error },

    /// Failed to spawn {program}: {error}
    SpawnFailed { program: String, error: io::Error },

    /// {program} exited with code {code}: {stderr}
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },

    /// Archive import failed ({stderr}); input saved to {saved_to:?}
    ImportFailed { saved_to: PathBuf, stderr: String },
}

impl StdError for BargeError {}

impl From<io::Error> for BargeError {
    fn from(error: io::Error) -> Self {
        Self::IoError { error }
    }
}

impl From<crate::hash::Error> for BargeError {
    fn from(error: crate::hash::Error) -> Self {
        Self::HashError(error)
    }
}

impl From<crate::manifest::Error> for BargeError {
    fn from(error: crate::manifest::Error) -> Self {
        Self::ManifestError(error)
    }
}

impl From<crate::derivation::ParseError> for BargeError {
    fn from(error: crate::derivation::ParseError) -> Self {
        Self::DerivationError(error)
    }
}
