use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::api::CacheClient;
use crate::cli::Opts;
use crate::config::Config;
use crate::push::{CachePushTarget, Pusher};
use barge::nix_store::NixStore;
use barge::path_cache::PathCache;

/// Returns the closure of a store path (test).
///
/// This is similar to `nix-store -qR`.
#[derive(Debug, Parser)]
pub struct GetClosure {
    store_path: String,
}

pub async fn run(opts: Opts) -> Result<()> {
    let sub = opts.command.as_get_closure().unwrap();

    let config = Config::load()?;
    let store = Arc::new(NixStore::new(config.store_dir.clone())?);
    let api = CacheClient::from_config(&config)?;

    let root = store.parse_store_path(&sub.store_path)?;

    let path_cache = PathCache::new(config.path_cache_dir.clone());
    let pusher = Pusher::new(
        CachePushTarget {
            store: store.clone(),
            api,
        },
        path_cache.load()?,
        5,
    );

    let closure = pusher.closure(&[root]).await?;

    for path in &closure {
        println!("{}", store.get_full_path(path));
    }

    if let Err(e) = path_cache.store(&pusher.path_tree()) {
        tracing::warn!("Could not persist the path cache: {}", e);
    }

    Ok(())
}
