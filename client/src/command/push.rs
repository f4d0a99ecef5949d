use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;

use crate::api::CacheClient;
use crate::cli::Opts;
use crate::config::Config;
use crate::push::{self, CachePushTarget, Pusher};
use barge::nix_store::NixStore;
use barge::path_cache::PathCache;

/// Push closures to the binary cache.
#[derive(Debug, Parser)]
pub struct Push {
    /// The store paths to push.
    ///
    /// Either base names or full paths under the store directory.
    #[clap(required = true)]
    paths: Vec<String>,

    /// The maximum number of parallel upload processes.
    #[clap(short = 'j', long, default_value = "5")]
    jobs: usize,
}

pub async fn run(opts: Opts) -> Result<()> {
    let sub = opts.command.as_push().unwrap();
    if sub.jobs == 0 {
        return Err(anyhow!("The number of jobs cannot be 0"));
    }

    let config = Config::load()?;
    let store = Arc::new(NixStore::new(config.store_dir.clone())?);
    let api = CacheClient::from_config(&config)?;

    let roots = sub
        .paths
        .iter()
        .map(|p| store.parse_store_path(p))
        .collect::<Result<Vec<_>, _>>()?;

    // The advertised store directory must match ours, or every path
    // we push would be unusable on the other side.
    let cache_info = api.cache_info().await?;
    if cache_info.store_dir != config.store_dir {
        return Err(anyhow!(
            "Cache serves store {} but the local store is {}",
            cache_info.store_dir.display(),
            config.store_dir.display(),
        ));
    }

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

    let result = if plan.missing.is_empty() {
        eprintln!(
            "All done! ({} paths, all already cached)",
            plan.closure.len()
        );
        Ok(())
    } else {
        eprintln!(
            "Pushing {} of {} paths ({} already cached)...",
            plan.missing.len(),
            plan.closure.len(),
            plan.present.len(),
        );

        pusher.mark_sent(plan.present);
        pusher.send_all(&roots).await
    };

    // Whatever happened above, keep the reference queries we paid for.
    if let Err(e) = path_cache.store(&pusher.path_tree()) {
        tracing::warn!("Could not persist the path cache: {}", e);
    }

    result
}
