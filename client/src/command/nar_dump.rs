use anyhow::Result;
use clap::Parser;
use tokio::io::AsyncWriteExt;

use crate::cli::Opts;
use crate::config::Config;
use barge::nix_store::NixStore;

/// Writes the raw NAR of a store path to stdout (test).
///
/// This is similar to `nix-store --dump`.
#[derive(Debug, Parser)]
pub struct NarDump {
    store_path: String,
}

pub async fn run(opts: Opts) -> Result<()> {
    let sub = opts.command.as_nar_dump().unwrap();

    let config = Config::load()?;
    let store = NixStore::new(config.store_dir.clone())?;

    let path = store.parse_store_path(&sub.store_path)?;
    let nar = store.dump(&path).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&nar).await?;
    stdout.flush().await?;

    Ok(())
}
