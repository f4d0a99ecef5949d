use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use crate::api::CacheClient;
use crate::cli::Opts;
use crate::config::Config;
use barge::hash::FileHash;
use barge::nix_store::{NixStore, StorePath};

/// Fetch a path from the binary cache.
///
/// The archive is verified against the hash advertised in its narinfo
/// and then imported into the local store, or written to a file.
#[derive(Debug, Parser)]
pub struct Fetch {
    /// The store path to fetch.
    ///
    /// A base name, a full store path, or just the 32-character hash
    /// prefix.
    path: String,

    /// Write the archive to a file instead of importing it.
    #[clap(short = 'o', long)]
    output: Option<PathBuf>,
}

pub async fn run(opts: Opts) -> Result<()> {
    let sub = opts.command.as_fetch().unwrap();

    let config = Config::load()?;
    let api = CacheClient::from_config(&config)?;

    let narinfo = api.narinfo(&resolve_store_path(&sub.path)?).await?;

    let nar = api.nar(&narinfo.nar_name()).await?;

    if nar.len() as u64 != narinfo.nar_size {
        return Err(anyhow!(
            "Archive is {} bytes but its narinfo advertises {}",
            nar.len(),
            narinfo.nar_size,
        ));
    }

    let actual_hash = FileHash::sha256_from_bytes(&nar);
    if !actual_hash.same_digest(&narinfo.nar_hash) {
        return Err(anyhow!(
            "Archive hashes to {} but its narinfo advertises {}",
            actual_hash,
            narinfo.nar_hash,
        ));
    }

    match &sub.output {
        Some(output) => {
            tokio::fs::write(output, &nar).await?;
            eprintln!("Fetched {} to {}", narinfo.store_path.display(), output.display());
        }
        None => {
            let store = NixStore::new(config.store_dir.clone())?;
            store.import(&nar).await?;
            eprintln!("Imported {}", narinfo.store_path.display());
        }
    }

    Ok(())
}

/// Accepts a base name, a full path, or a bare hash prefix.
fn resolve_store_path(text: &str) -> Result<StorePath> {
    if text.len() == 32 && text.bytes().all(|b| b.is_ascii_alphanumeric()) {
        // A bare prefix is enough to locate the narinfo; the name part
        // is irrelevant to the cache.
        return Ok(StorePath::parse(&format!("{}-unknown", text))?);
    }

    Ok(StorePath::parse_permissive(text)?)
}
