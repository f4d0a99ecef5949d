use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::api::CacheClient;
use crate::cli::Opts;
use crate::config::Config;
use crate::push::{self, CachePushTarget, Pusher};
use barge::nix_store::NixStore;
use barge::path_cache::PathCache;

/// List closure members the cache does not hold yet.
///
/// This is the first phase of `push` without the uploads.
#[derive(Debug, Parser)]
pub struct QueryMissing {
    /// The store paths whose closures to check.
    #[clap(required = true)]
    paths: Vec<String>,

    /// The maximum number of parallel reference queries.
    #[clap(short = 'j', long, default_value = "5")]
    jobs: usize,
}

pub async fn run(opts: Opts) -> Result<()> {
    let sub = opts.command.as_query_missing().unwrap();

    let config = Config::load()?;
    let store = Arc::new(NixStore::new(config.store_dir.clone())?);
    let api = CacheClient::from_config(&config)?;

    let roots = sub
        .paths
        .iter()
        .map(|p| store.parse_store_path(p))
        .collect::<Result<Vec<_>, _>>()?;

    let path_cache = PathCache::new(config.path_cache_dir.clone());
    let pusher = Pusher::new(
        CachePushTarget {
            store: store.clone(),
            api: api.clone(),
        },
        path_cache.load()?,
        sub.jobs,
    );

    let plan = push::query_store_paths(&pusher, &api, &store, &roots).await?;

    for path in &plan.missing {
        println!("{}", store.get_full_path(path));
    }

    if let Err(e) = path_cache.store(&pusher.path_tree()) {
        tracing::warn!("Could not persist the path cache: {}", e);
    }

    Ok(())
}
