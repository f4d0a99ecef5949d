//! Cache API client.
//!
//! The remote cache speaks a small HTTP protocol:
//!
//! | Route                | Method | Body                               |
//! |----------------------|--------|------------------------------------|
//! | `/nix-cache-info`    | GET    | manifest → [`NixCacheInfo`]        |
//! | `/<prefix>.narinfo`  | GET    | manifest → [`NarInfo`]             |
//! | `/<nar-name>.nar`    | GET    | raw archive bytes, maybe compressed |
//! | `/query-paths`       | POST   | JSON list → JSON map path → bool   |
//! | `/import-paths`      | POST   | exported archive                   |

use std::collections::HashMap;
use std::error::Error as StdError;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use const_format::concatcp;
use displaydoc::Display;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    Client as HttpClient, Response, StatusCode, Url,
};
use tokio::io::AsyncReadExt;

use crate::config::Config;
use barge::cache_info::NixCacheInfo;
use barge::narinfo::NarInfo;
use barge::nix_store::StorePath;

/// The User-Agent string sent with every request.
const BARGE_USER_AGENT: &str = concatcp!("barge/", env!("CARGO_PKG_VERSION"));

/// The cache API client.
#[derive(Debug, Clone)]
pub struct CacheClient {
    /// Base endpoint of the cache, with a trailing slash.
    endpoint: Url,

    /// An initialized HTTP client.
    client: HttpClient,
}

/// An API error.
#[derive(Debug, Display)]
pub enum ApiError {
    /// HTTP {0}: {1}
    HttpStatus(StatusCode, String),

    /// Unexpected content type "{0}"
    BadContentType(String),

    /// Cache rejected upload of {path}: {reason}
    RejectedUpload { path: String, reason: String },
}

impl StdError for ApiError {}

impl CacheClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        // A trailing slash matters to Url::join.
        let endpoint = if config.endpoint.ends_with('/') {
            config.endpoint.clone()
        } else {
            format!("{}/", config.endpoint)
        };

        let auth = config
            .auth
            .as_ref()
            .map(|auth| format!("{}:{}", auth.username, auth.password));

        Ok(Self {
            endpoint: Url::parse(&endpoint)?,
            client: build_http_client(auth.as_deref())?,
        })
    }

    /// Returns the cache's self-description.
    pub async fn cache_info(&self) -> Result<NixCacheInfo> {
        let endpoint = self.endpoint.join("nix-cache-info")?;

        let res = self.client.get(endpoint).send().await?;
        let res = ensure_success(res).await?;

        let info = NixCacheInfo::from_str(&res.text().await?)?;
        Ok(info)
    }

    /// Returns the metadata of a cached path.
    pub async fn narinfo(&self, path: &StorePath) -> Result<NarInfo> {
        let endpoint = self
            .endpoint
            .join(&format!("{}.narinfo", path.prefix()))?;

        let res = self.client.get(endpoint).send().await?;
        let res = ensure_success(res).await?;

        let narinfo = NarInfo::from_str(&res.text().await?)?;
        Ok(narinfo)
    }

    /// Fetches an archive, decompressing it according to the response
    /// content type.
    pub async fn nar(&self, nar_name: &str) -> Result<Vec<u8>> {
        let endpoint = self.endpoint.join(nar_name)?;

        let res = self.client.get(endpoint).send().await?;
        let res = ensure_success(res).await?;

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = res.bytes().await?;

        match content_type.as_str() {
            "application/x-gzip" => {
                let mut decoder =
                    async_compression::tokio::bufread::GzipDecoder::new(&body[..]);
                let mut nar = Vec::new();
                decoder.read_to_end(&mut nar).await?;
                Ok(nar)
            }
            "application/x-xz" => {
                let mut decoder = async_compression::tokio::bufread::XzDecoder::new(&body[..]);
                let mut nar = Vec::new();
                decoder.read_to_end(&mut nar).await?;
                Ok(nar)
            }
            t if t.starts_with("text/") => {
                // A misconfigured server answering with an HTML page.
                Err(ApiError::BadContentType(content_type).into())
            }
            _ => Ok(body.to_vec()),
        }
    }

    /// Asks the cache which of the given full store paths it holds.
    pub async fn query_paths(&self, paths: &[String]) -> Result<HashMap<String, bool>> {
        let endpoint = self.endpoint.join("query-paths")?;

        let res = self.client.post(endpoint).json(&paths).send().await?;
        let res = ensure_success(res).await?;

        Ok(res.json().await?)
    }

    /// Uploads one exported archive.
    ///
    /// The cache may reject the upload, most notably when it does not
    /// yet hold all of the path's references.
    pub async fn upload(&self, path: &StorePath, archive: Vec<u8>) -> Result<()> {
        let endpoint = self.endpoint.join("import-paths")?;

        let res = self.client.post(endpoint).body(archive).send().await?;

        let status = res.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(ApiError::RejectedUpload {
                path: path.abbreviate(),
                reason: response_reason(res).await,
            }
            .into())
        } else {
            Err(ApiError::HttpStatus(status, response_reason(res).await).into())
        }
    }
}

/// Turns a non-success response into an `HttpStatus` error.
async fn ensure_success(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        Ok(res)
    } else {
        Err(ApiError::HttpStatus(status, response_reason(res).await).into())
    }
}

async fn response_reason(res: Response) -> String {
    match res.text().await {
        Ok(text) => text.trim_end().to_string(),
        Err(_) => String::new(),
    }
}

fn build_http_client(auth: Option<&str>) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(BARGE_USER_AGENT));

    if let Some(credentials) = auth {
        let value = format!("Basic {}", BASE64.encode(credentials));
        let mut value = HeaderValue::from_str(&value)?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .build()?)
}
