//! High-level Nix store interface.
//!
//! All store operations shell out to the `nix-store` command-line
//! tool. The alternative would be linking against `libnixstore`, but
//! the handful of operations the uploader needs (archive framing and
//! reference queries) map one-to-one onto subcommands, and the
//! subprocess boundary keeps the store's locking out of this process.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{FullStorePath, StorePath};
use crate::error::{BargeError, BargeResult};

/// The store command-line tool.
const NIX_STORE_PROGRAM: &str = "nix-store";

/// High-level interface to a local Nix store.
#[derive(Debug)]
pub struct NixStore {
    /// Path to the Nix store itself.
    store_dir: PathBuf,
}

impl NixStore {
    /// Opens the store rooted at a directory.
    pub fn new(store_dir: PathBuf) -> BargeResult<Self> {
        if !store_dir.is_absolute() {
            return Err(BargeError::NotAbsolute { path: store_dir });
        }

        Ok(Self { store_dir })
    }

    /// Returns the Nix store directory.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Returns the full path for a base store path.
    pub fn get_full_path(&self, store_path: &StorePath) -> FullStorePath {
        FullStorePath::new(self.store_dir.clone(), store_path.clone())
    }

    /// Parses either a base name or a full path in this store.
    ///
    /// A full path belonging to a different store directory is
    /// rejected: the subprocess could not operate on it anyway.
    pub fn parse_store_path(&self, text: &str) -> BargeResult<StorePath> {
        if let Ok(path) = StorePath::parse(text) {
            return Ok(path);
        }

        let full = FullStorePath::parse(Path::new(text))?;
        if full.store_dir() != self.store_dir {
            return Err(BargeError::BadStorePath {
                text: text.to_string(),
                reason: "Path is not in the store directory",
            });
        }

        Ok(full.into_path())
    }

    /// Creates a NAR archive from a path.
    ///
    /// This is `nix-store --dump`.
    pub async fn dump(&self, store_path: &StorePath) -> BargeResult<Vec<u8>> {
        let full = self.get_full_path(store_path).to_path_buf();
        run_nix_store(&["--dump".as_ref(), full.as_os_str()], None).await
    }

    /// Creates an exportable archive from a path.
    ///
    /// Unlike `dump`, the result embeds the path's metadata (references,
    /// deriver, signature) and can be fed back through `import`.
    pub async fn export(&self, store_path: &StorePath) -> BargeResult<Vec<u8>> {
        let full = self.get_full_path(store_path).to_path_buf();
        run_nix_store(&["--export".as_ref(), full.as_os_str()], None).await
    }

    /// Imports an exported archive into the store.
    ///
    /// On failure the archive is kept in a temporary file so the input
    /// can be examined afterwards.
    pub async fn import(&self, archive: &[u8]) -> BargeResult<()> {
        match run_nix_store(&["--import".as_ref()], Some(archive)).await {
            Ok(_) => Ok(()),
            Err(BargeError::NonZeroExit { stderr, .. }) => {
                let saved_to = save_rejected_archive(archive)?;
                log::error!("Archive import failed; input saved to {:?}", saved_to);
                Err(BargeError::ImportFailed { saved_to, stderr })
            }
            Err(e) => Err(e),
        }
    }

    /// Queries the immediate references of a path.
    ///
    /// The path itself is filtered from the result, so self-references
    /// never show up.
    pub async fn query_references(
        &self,
        store_path: &StorePath,
    ) -> BargeResult<BTreeSet<StorePath>> {
        let full = self.get_full_path(store_path).to_path_buf();
        let stdout = run_nix_store(
            &[
                "--query".as_ref(),
                "--references".as_ref(),
                full.as_os_str(),
            ],
            None,
        )
        .await?;

        let stdout = String::from_utf8_lossy(&stdout);

        let mut references = BTreeSet::new();
        for word in stdout.split_whitespace() {
            let reference = FullStorePath::parse(Path::new(word))?.into_path();
            if &reference != store_path {
                references.insert(reference);
            }
        }

        Ok(references)
    }
}

/// Runs `nix-store` to completion, returning its standard output.
async fn run_nix_store(
    args: &[&std::ffi::OsStr],
    stdin: Option<&[u8]>,
) -> BargeResult<Vec<u8>> {
    log::debug!("Running {} {:?}", NIX_STORE_PROGRAM, args);

    let mut command = Command::new(NIX_STORE_PROGRAM);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|error| BargeError::SpawnFailed {
        program: NIX_STORE_PROGRAM.to_string(),
        error,
    })?;

    // Feed stdin while draining stdout, or a large archive can fill
    // the pipe and wedge both sides.
    let stdin_handle = child.stdin.take();
    let write = async {
        if let (Some(mut handle), Some(bytes)) = (stdin_handle, stdin) {
            handle.write_all(bytes).await?;
            handle.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };

    let (write_result, output) = tokio::join!(write, child.wait_with_output());
    write_result?;
    let output = output?;

    if !output.status.success() {
        return Err(BargeError::NonZeroExit {
            program: NIX_STORE_PROGRAM.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Writes a rejected archive to a temporary file for post-mortem
/// inspection, returning its location.
fn save_rejected_archive(archive: &[u8]) -> BargeResult<PathBuf> {
    let mut file = NamedTempFile::with_prefix("barge-rejected-")?;
    file.write_all(archive)?;

    let (_, path) = file.keep().map_err(|e| BargeError::IoError {
        error: e.error,
    })?;

    Ok(path)
}
