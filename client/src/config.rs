//! Client configuration.
//!
//! Everything comes from the environment; there is no configuration
//! file. This matches how the uploader is deployed: a CI job exports a
//! handful of variables and invokes the binary.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// The environment variable holding the local store directory.
const ENV_STORE: &str = "NIX_STORE";

/// The environment variable holding the remote cache endpoint.
const ENV_ENDPOINT: &str = "NIX_REPO_HTTP";

/// The environment variables holding basic-auth credentials.
const ENV_USERNAME: &str = "NIX_BINARY_CACHE_USERNAME";
const ENV_PASSWORD: &str = "NIX_BINARY_CACHE_PASSWORD";

/// Name of the on-disk reference cache under `$HOME`.
const PATH_CACHE_NAME: &str = ".nix-path-cache";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the local object store.
    pub store_dir: PathBuf,

    /// Base URL of the remote cache.
    pub endpoint: String,

    /// Location of the on-disk reference cache.
    pub path_cache_dir: PathBuf,

    /// Basic-auth credentials, if configured.
    pub auth: Option<BasicAuth>,
}

/// Basic-auth credentials.
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl Config {
    /// Loads the configuration from the environment.
    pub fn load() -> Result<Self> {
        let store_dir = PathBuf::from(require_env(ENV_STORE)?);
        if !store_dir.is_absolute() {
            return Err(anyhow!("{} must be an absolute path", ENV_STORE));
        }

        let endpoint = require_env(ENV_ENDPOINT)?;

        let home = require_env("HOME")?;
        let path_cache_dir = PathBuf::from(home).join(PATH_CACHE_NAME);

        // Credentials are all-or-nothing.
        let auth = match (env::var(ENV_USERNAME).ok(), env::var(ENV_PASSWORD).ok()) {
            (Some(username), Some(password)) => Some(BasicAuth { username, password }),
            _ => None,
        };

        Ok(Self {
            store_dir,
            endpoint,
            path_cache_dir,
            auth,
        })
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The password stays out of logs.
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| anyhow!("{} must be set in the environment", name))
}
