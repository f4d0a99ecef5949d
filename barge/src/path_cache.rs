//! On-disk reference cache.
//!
//! Reference queries are slow (one subprocess each) while the answers
//! never change, so the computed graph is persisted between
//! invocations.
//!
//! The layout is deliberately primitive: one subdirectory per known
//! store path, holding one empty file per reference:
//!
//! ```text
//! .nix-path-cache/
//!   ia70ss13m22znbl8khrf2hq72qmh5drr-ruby-2.7.5/
//!     0d71ygfwbmy1xjlbj1v027dfmy9cqavy-libffi-3.3
//!     a4yw1svqqk4d8lhwinn9xp847zz9gfma-bash-4.4-p23
//! ```
//!
//! A subdirectory is built next to its final location and atomically
//! renamed into place, so a crash mid-write leaves either the old
//! state or the new state, never a partial entry. Entries are never
//! rewritten: the reference tree is append-only.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::error::BargeResult;
use crate::nix_store::StorePath;

/// A set of store paths.
pub type PathSet = BTreeSet<StorePath>;

/// The immediate references of each known store path.
///
/// The key is never a member of its own value set.
pub type PathTree = BTreeMap<StorePath, PathSet>;

/// Directory mode for finished entries.
const ENTRY_MODE: u32 = 0o555;

/// An on-disk cache of the reference tree.
#[derive(Debug)]
pub struct PathCache {
    dir: PathBuf,
}

impl PathCache {
    /// Opens a cache at a directory, which need not exist yet.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Loads the entire cached tree.
    ///
    /// A missing cache directory is an empty tree. Anything in the
    /// directory that does not parse as a store path is an error:
    /// the cache is not a place for other files.
    pub fn load(&self) -> BargeResult<PathTree> {
        let mut tree = PathTree::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(tree);
            }
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let key = parse_file_name(&entry)?;

            let mut references = PathSet::new();
            for child in fs::read_dir(entry.path())? {
                references.insert(parse_file_name(&child?)?);
            }

            tree.insert(key, references);
        }

        log::debug!("Loaded {} reference sets from {:?}", tree.len(), self.dir);

        Ok(tree)
    }

    /// Persists every tree entry that is not already on disk.
    ///
    /// Existing entries are left untouched; the in-memory tree is
    /// monotonic so they cannot have changed.
    pub fn store(&self, tree: &PathTree) -> BargeResult<()> {
        fs::create_dir_all(&self.dir)?;

        let mut written = 0usize;
        for (key, references) in tree {
            let target = self.dir.join(key.to_string());
            if target.exists() {
                continue;
            }

            let staging = tempfile::Builder::new()
                .prefix(".tmp-")
                .tempdir_in(&self.dir)?;

            for reference in references {
                fs::File::create(staging.path().join(reference.to_string()))?;
            }

            // The rename publishes the entry; everything before it is
            // invisible to concurrent readers.
            fs::rename(staging.keep(), &target)?;
            fs::set_permissions(&target, fs::Permissions::from_mode(ENTRY_MODE))?;

            written += 1;
        }

        if written > 0 {
            log::debug!("Stored {} new reference sets to {:?}", written, self.dir);
        }

        Ok(())
    }
}

fn parse_file_name(entry: &fs::DirEntry) -> BargeResult<StorePath> {
    let file_name = entry.file_name();
    StorePath::parse(&file_name.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::BargeError;

    fn path(prefix_char: char, name: &str) -> StorePath {
        let base_name = format!("{}-{}", String::from(prefix_char).repeat(32), name);
        StorePath::parse(&base_name).unwrap()
    }

    fn sample_tree() -> PathTree {
        let mut tree = PathTree::new();
        tree.insert(
            path('a', "app-1.0"),
            [path('b', "lib-2.0"), path('c', "dep-3.0")].into(),
        );
        tree.insert(path('b', "lib-2.0"), PathSet::new());
        tree
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().join("does-not-exist"));

        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().join("path-cache"));

        let tree = sample_tree();
        cache.store(&tree).unwrap();

        assert_eq!(tree, cache.load().unwrap());
    }

    #[test]
    fn test_store_is_incremental() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().join("path-cache"));

        let mut tree = sample_tree();
        cache.store(&tree).unwrap();

        tree.insert(path('d', "extra-1.0"), [path('b', "lib-2.0")].into());
        cache.store(&tree).unwrap();

        assert_eq!(tree, cache.load().unwrap());
    }

    #[test]
    fn test_existing_entries_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().join("path-cache"));

        let tree = sample_tree();
        cache.store(&tree).unwrap();

        // Storing a conflicting tree must not rewrite what's on disk.
        let mut conflicting = PathTree::new();
        conflicting.insert(path('a', "app-1.0"), PathSet::new());
        cache.store(&conflicting).unwrap();

        assert_eq!(tree, cache.load().unwrap());
    }

    #[test]
    fn test_foreign_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("path-cache");
        let cache = PathCache::new(cache_dir.clone());

        cache.store(&sample_tree()).unwrap();
        fs::create_dir(cache_dir.join("not-a-store-path")).unwrap();

        assert!(matches!(
            cache.load(),
            Err(BargeError::BadStorePath { .. })
        ));
    }

    #[test]
    fn test_entries_are_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().join("path-cache"));

        cache.store(&sample_tree()).unwrap();

        let entry = dir
            .path()
            .join("path-cache")
            .join(path('a', "app-1.0").to_string());
        let mode = fs::metadata(entry).unwrap().permissions().mode();
        assert_eq!(ENTRY_MODE, mode & 0o777);
    }
}
