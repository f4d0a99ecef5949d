use anyhow::Result;
use clap::Parser;

use crate::api::CacheClient;
use crate::cli::Opts;
use crate::config::Config;

/// Show the self-description of the binary cache.
#[derive(Debug, Parser)]
pub struct CacheInfo {}

pub async fn run(_opts: Opts) -> Result<()> {
    let config = Config::load()?;
    let api = CacheClient::from_config(&config)?;

    let info = api.cache_info().await?;

    println!("StoreDir: {}", info.store_dir.display());
    println!("WantMassQuery: {}", if info.want_mass_query { 1 } else { 0 });
    if let Some(priority) = info.priority {
        println!("Priority: {}", priority);
    }

    Ok(())
}
